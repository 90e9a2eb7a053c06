//! Типы ошибок для asr-datapipe.

use thiserror::Error;

/// Основной тип ошибки для операций пайплайна данных.
#[derive(Error, Debug)]
pub enum DataError {
    /// Audio decoding/processing errors.
    #[error("Audio error: {0}")]
    Audio(String),

    /// Manifest parsing errors (fatal at load time).
    #[error("Manifest error: {0}")]
    Manifest(String),

    /// Label encoding/decoding errors.
    #[error("Label error: {0}")]
    Label(String),

    /// Sampler configuration errors.
    #[error("Sampler error: {0}")]
    Sampler(String),

    /// Feature extraction errors.
    #[error("Feature error: {0}")]
    Feature(String),

    /// Batch collation errors.
    #[error("Collate error: {0}")]
    Collate(String),

    /// I/O errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Candle tensor errors.
    #[error("Tensor error: {0}")]
    Candle(#[from] candle_core::Error),

    /// JSON parsing errors.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV parsing errors.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// Result type alias for data pipeline operations.
pub type DataResult<T> = Result<T, DataError>;
