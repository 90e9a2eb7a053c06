//! Sub-word словарь поверх крейта tokenizers.
//!
//! Словарь обучается внешним инструментом (SentencePiece/BPE); здесь
//! только загрузка готовой модели, кодирование в id и обратное
//! отображение id → piece.

use std::path::Path;

use data_core::{DataError, DataResult};
use tokenizers::Tokenizer;

/// Обученный sub-word словарь.
pub struct SubwordVocab {
    tokenizer: Tokenizer,
}

impl SubwordVocab {
    /// Загрузить модель словаря из файла tokenizer.json.
    pub fn from_file(path: impl AsRef<Path>) -> DataResult<Self> {
        let path = path.as_ref();
        let tokenizer = Tokenizer::from_file(path).map_err(|e| {
            DataError::Label(format!(
                "Не удалось загрузить словарь из {}: {e}",
                path.display()
            ))
        })?;
        Ok(Self { tokenizer })
    }

    /// Кодировать строку в последовательность id.
    pub fn encode_as_ids(&self, text: &str) -> DataResult<Vec<u32>> {
        let encoding = self
            .tokenizer
            .encode(text, false)
            .map_err(|e| DataError::Label(format!("Ошибка кодирования словарем: {e}")))?;
        Ok(encoding.get_ids().to_vec())
    }

    /// Строковое представление piece по id.
    pub fn id_to_piece(&self, id: u32) -> Option<String> {
        self.tokenizer.id_to_token(id)
    }

    /// Размер словаря (включая added tokens).
    pub fn len(&self) -> usize {
        self.tokenizer.get_vocab_size(true)
    }

    /// Словарь пуст.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for SubwordVocab {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubwordVocab")
            .field("len", &self.len())
            .finish()
    }
}
