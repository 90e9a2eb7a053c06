//! Языковые определения: алфавит целевых символов и предобработка текста.
//!
//! Алфавит содержит только строчные символы плюс подстановочный знак `*` —
//! он остается кодируемым, когда нормализация выфильтровала весь текст.

/// Определение языка для кодека меток.
pub trait Lang: Send + Sync {
    /// Код языка (ISO 639-1).
    fn code(&self) -> &'static str;

    /// Алфавит целевых символов (нижний регистр, включая `*`).
    fn alphabet(&self) -> &'static str;

    /// Орфографические замены уровня всего текста (до разбиения на слова).
    fn preprocess_text(&self, text: &str) -> String {
        text.to_string()
    }

    /// Замены уровня отдельного слова.
    fn preprocess_word(&self, word: &str) -> String {
        word.to_string()
    }
}

/// Русский язык: 32 буквы (ё сведена к е) + `*`.
#[derive(Debug, Default)]
pub struct Russian;

impl Lang for Russian {
    fn code(&self) -> &'static str {
        "ru"
    }

    fn alphabet(&self) -> &'static str {
        "абвгдежзийклмнопрстуфхцчшщъыьэюя*"
    }

    fn preprocess_text(&self, text: &str) -> String {
        text.replace('ё', "е").replace('Ё', "Е")
    }
}

/// Английский язык: a-z, апостроф + `*`.
#[derive(Debug, Default)]
pub struct English;

impl Lang for English {
    fn code(&self) -> &'static str {
        "en"
    }

    fn alphabet(&self) -> &'static str {
        "abcdefghijklmnopqrstuvwxyz'*"
    }

    fn preprocess_word(&self, word: &str) -> String {
        // Типографский апостроф сводится к машинописному.
        word.replace('\u{2019}', "'")
    }
}

/// Язык по коду ISO 639-1.
pub fn by_code(code: &str) -> Option<Box<dyn Lang>> {
    match code {
        "ru" => Some(Box::new(Russian)),
        "en" => Some(Box::new(English)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_russian_yo_folding() {
        let lang = Russian;
        assert_eq!(lang.preprocess_text("ёлка Ёж"), "елка Еж");
    }

    #[test]
    fn test_alphabets_contain_wildcard() {
        assert!(Russian.alphabet().contains('*'));
        assert!(English.alphabet().contains('*'));
    }

    #[test]
    fn test_by_code() {
        assert_eq!(by_code("ru").map(|l| l.code()), Some("ru"));
        assert!(by_code("xx").is_none());
    }
}
