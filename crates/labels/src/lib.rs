//! # labels
//!
//! Алфавиты, нормализация текста и кодек текст ⟷ индексы меток.
//!
//! - [`lang`] — языковые определения (алфавит + предобработка)
//! - [`Labels`] — кодирование/декодирование c repeat-символом (CTC)
//! - [`SubwordVocab`] — sub-word словарь поверх крейта tokenizers

pub mod lang;
mod labels;
mod vocab;

pub use crate::labels::{Labels, BLANK, REPEAT, SPACE, SUBWORD_SPACE};
pub use crate::vocab::SubwordVocab;
pub use lang::{by_code, English, Lang, Russian};
