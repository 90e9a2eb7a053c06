//! Кодек текст ⟷ последовательность индексов меток.
//!
//! Таблица символов = алфавит языка (или sub-word словарь) + три
//! служебных символа в фиксированном порядке сверху: repeat (len-3),
//! space (len-2), blank (len-1). Повтор соседнего символа кодируется
//! индексом repeat, иначе CTC-декодирование схлопнуло бы дубль.

use std::collections::HashMap;

use data_core::{DataError, DataResult};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::lang::Lang;
use crate::vocab::SubwordVocab;

/// Служебный символ blank (CTC).
pub const BLANK: char = '|';
/// Служебный символ пробела.
pub const SPACE: char = ' ';
/// Служебный символ повтора соседней буквы.
pub const REPEAT: char = '2';
/// Маркер пробела в sub-word piece (SentencePiece).
pub const SUBWORD_SPACE: char = '\u{2581}';

/// Токены слов: числа (включая отрицательные), числа с буквенным
/// суффиксом через дефис, обычные слова. Альтернативы проверяются
/// слева направо.
static WORD_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"-?\d+|-?\d+-\w+|\w+").unwrap());

/// Хвостовая двойка после буквенного слова — артефакт repeat-кодирования
/// в исходных расшифровках, отбрасывается при нормализации.
static TRAILING_REPEAT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"([\w--\d]+)2").unwrap());

/// Кодек меток: нормализация текста, кодирование и декодирование.
pub struct Labels {
    name: String,
    lang: Box<dyn Lang>,
    alphabet: Vec<char>,
    symbol_to_idx: HashMap<char, u32>,
    vocab: Option<SubwordVocab>,
}

impl Labels {
    /// Посимвольный кодек над алфавитом языка.
    pub fn new(lang: Box<dyn Lang>, name: impl Into<String>) -> Self {
        let alphabet: Vec<char> = lang.alphabet().chars().collect();
        let mut symbol_to_idx = HashMap::with_capacity(alphabet.len() + 3);
        for (i, &c) in alphabet.iter().enumerate() {
            symbol_to_idx.insert(c, i as u32);
        }
        let base = alphabet.len() as u32;
        symbol_to_idx.insert(REPEAT, base);
        symbol_to_idx.insert(SPACE, base + 1);
        symbol_to_idx.insert(BLANK, base + 2);

        Self {
            name: name.into(),
            lang,
            alphabet,
            symbol_to_idx,
            vocab: None,
        }
    }

    /// Sub-word кодек: нормализация остается посимвольной, кодирование
    /// делегируется словарю.
    pub fn with_subword(lang: Box<dyn Lang>, vocab: SubwordVocab, name: impl Into<String>) -> Self {
        let mut labels = Self::new(lang, name);
        labels.vocab = Some(vocab);
        labels
    }

    /// Имя кодека (для логов при нескольких целевых словарях).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Количество индексов: алфавит (или словарь) + 3 служебных.
    pub fn len(&self) -> usize {
        let base = match &self.vocab {
            Some(vocab) => vocab.len(),
            None => self.alphabet.len(),
        };
        base + 3
    }

    /// Кодек не содержит ни одного символа (не бывает на практике).
    pub fn is_empty(&self) -> bool {
        self.len() == 3
    }

    /// Индекс blank (последний).
    pub fn blank_idx(&self) -> u32 {
        self.len() as u32 - 1
    }

    /// Индекс пробела (предпоследний).
    pub fn space_idx(&self) -> u32 {
        self.len() as u32 - 2
    }

    /// Индекс повтора (третий с конца).
    pub fn repeat_idx(&self) -> u32 {
        self.len() as u32 - 3
    }

    /// Проверка принадлежности алфавиту без учета регистра.
    /// Служебные символы алфавиту не принадлежат.
    pub fn contains(&self, c: char) -> bool {
        let lowered = c.to_lowercase().next().unwrap_or(c);
        self.alphabet.contains(&lowered)
    }

    /// Полная таблица символов посимвольного режима.
    pub fn symbols(&self) -> String {
        let mut symbols: String = self.alphabet.iter().collect();
        symbols.push(REPEAT);
        symbols.push(SPACE);
        symbols.push(BLANK);
        symbols
    }

    /// Символ по индексу (строка: sub-word piece может быть многобуквенным).
    pub fn symbol(&self, idx: u32) -> DataResult<String> {
        if idx == self.blank_idx() {
            return Ok(BLANK.to_string());
        }
        if idx == self.space_idx() {
            return Ok(SPACE.to_string());
        }
        if idx == self.repeat_idx() {
            return Ok(REPEAT.to_string());
        }
        match &self.vocab {
            Some(vocab) => vocab.id_to_piece(idx).ok_or_else(|| {
                DataError::Label(format!("id {idx} вне словаря ({})", self.name))
            }),
            None => self
                .alphabet
                .get(idx as usize)
                .map(|c| c.to_string())
                .ok_or_else(|| {
                    DataError::Label(format!("индекс {idx} вне алфавита ({})", self.name))
                }),
        }
    }

    /// Разбить сегмент текста на нормализованные слова.
    fn find_words(&self, text: &str) -> Vec<String> {
        let text = TRAILING_REPEAT_RE.replace_all(text, "$1");
        let text = self.lang.preprocess_text(&text);
        WORD_RE
            .find_iter(&text)
            .filter_map(|m| {
                let word = self.lang.preprocess_word(m.as_str());
                let cleaned: String = word.chars().filter(|&c| self.contains(c)).collect();
                let cleaned = cleaned.trim();
                if cleaned.is_empty() {
                    None
                } else {
                    Some(cleaned.to_string())
                }
            })
            .collect()
    }

    /// Нормализация текста.
    ///
    /// Сегменты через `;` — независимые альтернативные расшифровки;
    /// каждый нормализуется отдельно. Пустой итог заменяется на `*`
    /// (деградировавшая, но валидная цель обучения).
    pub fn normalize_text(&self, text: &str) -> String {
        let normalized = text
            .split(';')
            .map(|part| {
                self.find_words(part)
                    .join(" ")
                    .to_lowercase()
                    .trim()
                    .to_string()
            })
            .collect::<Vec<_>>()
            .join(";");

        if normalized.is_empty() {
            "*".to_string()
        } else {
            normalized
        }
    }

    /// Кодирование: нормализованный текст + индексы первой альтернативы.
    ///
    /// Посимвольный режим подставляет индекс repeat вместо символа,
    /// совпадающего с предыдущим; sub-word режим кодирует словарем как есть.
    pub fn encode(&self, text: &str) -> DataResult<(String, Vec<u32>)> {
        let normalized = self.normalize_text(text);
        let first = normalized.split(';').next().unwrap_or("");

        if let Some(vocab) = &self.vocab {
            let ids = vocab.encode_as_ids(first)?;
            return Ok((normalized, ids));
        }

        let chars: Vec<char> = first.chars().collect();
        let mut ids = Vec::with_capacity(chars.len());
        for (i, &c) in chars.iter().enumerate() {
            if i > 0 && c == chars[i - 1] {
                ids.push(self.repeat_idx());
            } else {
                let idx = self.symbol_to_idx.get(&c).copied().ok_or_else(|| {
                    DataError::Label(format!("символ {c:?} вне таблицы символов ({})", self.name))
                })?;
                ids.push(idx);
            }
        }
        Ok((normalized, ids))
    }

    /// Декодирование батча последовательностей индексов.
    ///
    /// `collapse_repeats` схлопывает соседние одинаковые ДЕКОДИРОВАННЫЕ
    /// символы (выход модели); это не обращение encode-повторов.
    /// `blank`/`space` подменяют служебные маркеры в итоговой строке.
    pub fn decode(
        &self,
        seqs: &[Vec<u32>],
        blank: Option<&str>,
        space: Option<&str>,
        collapse_repeats: bool,
    ) -> DataResult<Vec<String>> {
        seqs.iter()
            .map(|seq| self.decode_one(seq, blank, space, collapse_repeats))
            .collect()
    }

    fn decode_one(
        &self,
        seq: &[u32],
        blank: Option<&str>,
        space: Option<&str>,
        collapse_repeats: bool,
    ) -> DataResult<String> {
        let mut out = String::new();
        let mut prev: Option<String> = None;
        for &idx in seq {
            let sym = self.symbol(idx)?;
            let duplicate = collapse_repeats && prev.as_deref() == Some(sym.as_str());
            if !duplicate {
                out.push_str(&sym);
            }
            prev = Some(sym);
        }

        if let Some(blank) = blank {
            out = out.replace(BLANK, blank);
        }
        if let Some(space) = space {
            out = out.replace(SPACE, space);
        }
        Ok(out)
    }

    /// Постобработка сырого вывода модели.
    ///
    /// Фиксированный конвейер чистых стадий; порядок значим — каждая
    /// стадия рассчитывает на форму вывода предыдущей.
    pub fn postprocess_transcript(&self, text: &str, phonetic_replace_groups: &[&str]) -> String {
        let fold = phonetic_fold_table(phonetic_replace_groups);
        let stages: Vec<Box<dyn Fn(&str) -> String + '_>> = vec![
            Box::new(strip_punctuation),
            Box::new(subword_space_to_space),
            Box::new(space_after_capitals),
            Box::new(|s| collapse_blank_runs(s, BLANK)),
            Box::new(|s| expand_repeat_markers(s, REPEAT)),
            Box::new(collapse_adjacent_duplicates),
            Box::new(strip_wildcard),
            Box::new(move |s| apply_phonetic_fold(s, &fold)),
            Box::new(|s| s.trim().to_string()),
        ];
        stages
            .iter()
            .fold(text.to_string(), |text, stage| stage(&text))
    }
}

impl std::fmt::Debug for Labels {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Labels")
            .field("name", &self.name)
            .field("lang", &self.lang.code())
            .field("len", &self.len())
            .field("subword", &self.vocab.is_some())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Стадии постобработки
// ---------------------------------------------------------------------------

/// Убрать запятые и точки.
fn strip_punctuation(s: &str) -> String {
    s.replace(',', "").replace('.', "")
}

/// Маркер пробела SentencePiece → обычный пробел.
fn subword_space_to_space(s: &str) -> String {
    s.replace(SUBWORD_SPACE, " ")
}

/// Пробел после каждой заглавной буквы.
fn space_after_capitals(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        out.push(c);
        if c.is_uppercase() {
            out.push(' ');
        }
    }
    out
}

/// Длинные серии blank (10+) → один пробел, одиночные blank удаляются.
fn collapse_blank_runs(s: &str, blank: char) -> String {
    let run: String = std::iter::repeat(blank).take(10).collect();
    s.replace(&run, " ").replace(blank, "")
}

/// Маркер повтора → предыдущий символ входа.
fn expand_repeat_markers(s: &str, repeat: char) -> String {
    let chars: Vec<char> = s.chars().collect();
    let mut out = String::with_capacity(chars.len());
    for (i, &c) in chars.iter().enumerate() {
        if i > 0 && c == repeat {
            out.push(chars[i - 1]);
        } else {
            out.push(c);
        }
    }
    out
}

/// Удалить символ, совпадающий с предыдущим символом входа.
fn collapse_adjacent_duplicates(s: &str) -> String {
    let chars: Vec<char> = s.chars().collect();
    let mut out = String::with_capacity(chars.len());
    for (i, &c) in chars.iter().enumerate() {
        if i == 0 || c != chars[i - 1] {
            out.push(c);
        }
    }
    out
}

/// Удалить подстановочный знак `*`.
fn strip_wildcard(s: &str) -> String {
    s.replace('*', "")
}

/// Таблица фонетического сведения: каждый символ группы → первый символ группы.
fn phonetic_fold_table(groups: &[&str]) -> HashMap<char, char> {
    let mut table = HashMap::new();
    for group in groups {
        if let Some(representative) = group.chars().next() {
            for c in group.to_lowercase().chars() {
                table.insert(c, representative);
            }
        }
    }
    table
}

/// Применить таблицу фонетического сведения.
fn apply_phonetic_fold(s: &str, table: &HashMap<char, char>) -> String {
    s.chars()
        .map(|c| table.get(&c).copied().unwrap_or(c))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lang::{Lang, Russian};

    /// Трехбуквенный алфавит для точечных проверок кодирования.
    struct TestLang;

    impl Lang for TestLang {
        fn code(&self) -> &'static str {
            "xx"
        }

        fn alphabet(&self) -> &'static str {
            "ab*"
        }
    }

    fn test_labels() -> Labels {
        Labels::new(Box::new(TestLang), "char")
    }

    #[test]
    fn test_len_and_reserved_layout() {
        let labels = test_labels();
        assert_eq!(labels.len(), 3 + 3);
        assert_eq!(labels.blank_idx(), 5);
        assert_eq!(labels.space_idx(), 4);
        assert_eq!(labels.repeat_idx(), 3);
        assert_eq!(labels.symbol(5).unwrap(), "|");
        assert_eq!(labels.symbol(4).unwrap(), " ");
        assert_eq!(labels.symbol(3).unwrap(), "2");
    }

    #[test]
    fn test_out_of_alphabet_text_normalizes_to_wildcard() {
        let labels = Labels::new(Box::new(Russian), "ru");
        assert_eq!(labels.normalize_text("xyz 123!!!"), "*");
        assert_eq!(labels.normalize_text(""), "*");
    }

    #[test]
    fn test_adjacent_duplicate_encodes_as_repeat() {
        let labels = test_labels();
        let (normalized, ids) = labels.encode("aab").unwrap();
        assert_eq!(normalized, "aab");
        // второй 'a' равен предыдущему символу → индекс repeat
        assert_eq!(ids, vec![0, labels.repeat_idx(), 1]);
    }

    #[test]
    fn test_encode_only_first_alternative() {
        let labels = test_labels();
        let (normalized, ids) = labels.encode("ab;ba").unwrap();
        assert_eq!(normalized, "ab;ba");
        assert_eq!(ids, vec![0, 1]);
    }

    #[test]
    fn test_normalize_keeps_alternatives() {
        let labels = Labels::new(Box::new(Russian), "ru");
        let normalized = labels.normalize_text("Алло; АЛЛО же");
        assert_eq!(normalized, "алло;алло же");
    }

    #[test]
    fn test_round_trip_without_repeats() {
        let labels = Labels::new(Box::new(Russian), "ru");
        let (normalized, ids) = labels.encode("Привет, мир!").unwrap();
        assert_eq!(normalized, "привет мир");
        let decoded = labels.decode(&[ids], None, None, false).unwrap();
        assert_eq!(decoded[0], normalized);
    }

    #[test]
    fn test_round_trip_with_repeats() {
        let labels = Labels::new(Box::new(Russian), "ru");
        let (normalized, ids) = labels.encode("алло мир").unwrap();
        assert_eq!(normalized, "алло мир");
        // повтор кодируется маркером; разворот маркера восстанавливает текст
        let decoded = labels.decode(&[ids], None, None, false).unwrap();
        assert_eq!(decoded[0], "ал2о мир");
        assert_eq!(expand_repeat_markers(&decoded[0], REPEAT), normalized);
    }

    #[test]
    fn test_decode_collapses_model_repeats() {
        let labels = test_labels();
        // "aa" из модели — один символ после схлопывания
        let decoded = labels.decode(&[vec![0, 0, 1]], None, None, true).unwrap();
        assert_eq!(decoded[0], "ab");

        let verbatim = labels.decode(&[vec![0, 0, 1]], None, None, false).unwrap();
        assert_eq!(verbatim[0], "aab");
    }

    #[test]
    fn test_decode_substitutes_markers() {
        let labels = test_labels();
        let seq = vec![0, labels.blank_idx(), labels.space_idx(), 1];
        let decoded = labels.decode(&[seq], Some("_"), Some("#"), false).unwrap();
        assert_eq!(decoded[0], "a_#b");
    }

    #[test]
    fn test_contains_is_case_insensitive() {
        let labels = Labels::new(Box::new(Russian), "ru");
        assert!(labels.contains('б'));
        assert!(labels.contains('Б'));
        assert!(!labels.contains('q'));
        // служебные символы алфавиту не принадлежат
        assert!(!labels.contains('|'));
    }

    #[test]
    fn test_trailing_repeat_digit_stripped() {
        let labels = Labels::new(Box::new(Russian), "ru");
        // хвостовая "2" после буквенного слова — артефакт кодирования
        assert_eq!(labels.normalize_text("алло2 мир"), "алло мир");
    }

    #[test]
    fn test_postprocess_stage_order() {
        let labels = Labels::new(Box::new(Russian), "ru");
        // '2' разворачивается в 'л', после чего дубль схлопывается стадией ниже;
        // серия blank дает пробел, одиночный blank исчезает.
        let raw = "ал2о||||||||||мир|";
        assert_eq!(labels.postprocess_transcript(raw, &[]), "ало мир");
    }

    #[test]
    fn test_postprocess_phonetic_fold() {
        let labels = Labels::new(Box::new(Russian), "ru");
        assert_eq!(labels.postprocess_transcript("финт", &["фв"]), "финт");
        assert_eq!(labels.postprocess_transcript("винт", &["фв"]), "финт");
    }

    #[test]
    fn test_postprocess_subword_and_capitals() {
        let labels = Labels::new(Box::new(Russian), "ru");
        let raw = "\u{2581}приветМир";
        // маркер piece → пробел, заглавная буква отделяется пробелом
        assert_eq!(labels.postprocess_transcript(raw, &[]), "приветМ ир");
    }

    #[test]
    fn test_wildcard_removed_from_transcript() {
        let labels = Labels::new(Box::new(Russian), "ru");
        assert_eq!(labels.postprocess_transcript("при*вет", &[]), "привет");
    }
}
