//! Конфигурационные структуры пайплайна данных.

use serde::{Deserialize, Serialize};

/// Конфигурация загрузки корпусов и декодирования аудио.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetConfig {
    /// Целевая частота дискретизации в Гц.
    pub sample_rate: usize,

    /// Порог длительности: записи с объявленной длительностью >= порога
    /// отбрасываются при загрузке манифеста.
    pub max_duration: Option<f64>,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            sample_rate: 8000,
            max_duration: None,
        }
    }
}

/// Оконная функция STFT.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WindowFn {
    /// Окно Ханна (периодическое).
    Hann,
    /// Окно Хэмминга.
    Hamming,
}

/// Конфигурация лог-фильтробанк экстрактора.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureExtractorConfig {
    /// Частота дискретизации входного сигнала в Гц.
    pub sample_rate: usize,

    /// Размер окна анализа в секундах.
    pub window_size: f64,

    /// Шаг между окнами в секундах.
    pub window_stride: f64,

    /// Оконная функция.
    pub window: WindowFn,

    /// Количество мел-бинов (частотных признаков).
    pub num_features: usize,

    /// Per-utterance нормализация (вычитание среднего, деление на σ).
    pub normalize: bool,
}

impl Default for FeatureExtractorConfig {
    fn default() -> Self {
        Self::telephony_8k()
    }
}

impl FeatureExtractorConfig {
    /// Конфигурация для телефонных корпусов (8 кГц, 64 бина, окно 40 мс).
    pub fn telephony_8k() -> Self {
        Self {
            sample_rate: 8000,
            window_size: 0.04,
            window_stride: 0.01,
            window: WindowFn::Hann,
            num_features: 64,
            normalize: true,
        }
    }

    /// Конфигурация для широкополосных корпусов (16 кГц, окно 25 мс).
    pub fn broadband_16k() -> Self {
        Self {
            sample_rate: 16000,
            window_size: 0.025,
            window_stride: 0.01,
            window: WindowFn::Hann,
            num_features: 64,
            normalize: true,
        }
    }

    /// Длина окна в сэмплах.
    pub fn win_length(&self) -> usize {
        (self.window_size * self.sample_rate as f64) as usize
    }

    /// Шаг окна в сэмплах.
    pub fn hop_length(&self) -> usize {
        (self.window_stride * self.sample_rate as f64) as usize
    }
}
