//! # data-core
//!
//! Базовые типы, конфигурация и определения ошибок для asr-datapipe.
//!
//! Этот крейт предоставляет фундаментальные абстракции для всех остальных
//! крейтов в workspace:
//!
//! - Общие типы данных (`AudioBuffer`, `Features`, `Utterance`)
//! - Конфигурационные структуры датасета и экстрактора признаков
//! - Унифицированная обработка ошибок через `DataError`

pub mod config;
pub mod debug;
pub mod error;
pub mod types;

pub use config::{DatasetConfig, FeatureExtractorConfig, WindowFn};
pub use error::{DataError, DataResult};
pub use types::{AudioBuffer, Features, Utterance};
