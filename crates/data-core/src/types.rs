//! Общие типы данных пайплайна.
//!
//! Содержит базовые структуры, используемые всеми крейтами workspace:
//! буферы аудио, тензоры признаков и записи манифеста.

use std::path::PathBuf;

use candle_core::Tensor;

// ---------------------------------------------------------------------------
// Аудио-буфер
// ---------------------------------------------------------------------------

/// Буфер необработанного аудио.
///
/// Сэмплы хранятся в interleaved-виде (канал за каналом внутри фрейма).
#[derive(Debug, Clone)]
pub struct AudioBuffer {
    /// Аудио-сэмплы (нормализованы к [-1.0, 1.0]).
    pub samples: Vec<f32>,

    /// Частота дискретизации в Гц.
    pub sample_rate: usize,

    /// Количество каналов.
    pub channels: usize,
}

impl AudioBuffer {
    /// Создать новый буфер аудио.
    pub fn new(samples: Vec<f32>, sample_rate: usize, channels: usize) -> Self {
        Self {
            samples,
            sample_rate,
            channels,
        }
    }

    /// Пустой буфер — сентинел при ошибке декодирования.
    pub fn empty(sample_rate: usize) -> Self {
        Self::new(Vec::new(), sample_rate, 1)
    }

    /// Длительность в секундах.
    pub fn duration(&self) -> f64 {
        self.samples.len() as f64 / (self.sample_rate * self.channels.max(1)) as f64
    }

    /// Количество сэмплов на канал.
    pub fn num_samples(&self) -> usize {
        self.samples.len() / self.channels.max(1)
    }

    /// Буфер не содержит ни одного сэмпла (декодирование не удалось).
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Тензор признаков
// ---------------------------------------------------------------------------

/// Лог-фильтробанк признаки одной записи.
#[derive(Debug, Clone)]
pub struct Features {
    /// Тензор формы [num_features, num_frames].
    pub tensor: Tensor,

    /// Количество частотных бинов.
    pub num_features: usize,

    /// Количество временных фреймов.
    pub num_frames: usize,
}

impl Features {
    /// Создать новые признаки.
    pub fn new(tensor: Tensor, num_features: usize, num_frames: usize) -> Self {
        Self {
            tensor,
            num_features,
            num_frames,
        }
    }
}

// ---------------------------------------------------------------------------
// Запись манифеста
// ---------------------------------------------------------------------------

/// Одна запись манифеста: аудиофайл + эталонная расшифровка.
#[derive(Debug, Clone, PartialEq)]
pub struct Utterance {
    /// Путь к аудиофайлу.
    pub audio_path: PathBuf,

    /// Эталонный текст (уже подставленный, если манифест ссылался на .txt).
    pub reference: String,

    /// Длительность в секундах; -1.0, если манифест её не объявляет.
    pub duration: f64,
}

impl Utterance {
    /// Запись манифеста объявляет длительность.
    pub fn has_duration(&self) -> bool {
        self.duration >= 0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_duration() {
        let buffer = AudioBuffer::new(vec![0.0; 16000], 8000, 2);
        assert!((buffer.duration() - 1.0).abs() < 1e-9);
        assert_eq!(buffer.num_samples(), 8000);
    }

    #[test]
    fn test_empty_buffer() {
        let buffer = AudioBuffer::empty(8000);
        assert!(buffer.is_empty());
        assert_eq!(buffer.sample_rate, 8000);
        assert_eq!(buffer.channels, 1);
    }

    #[test]
    fn test_utterance_duration_flag() {
        let utt = Utterance {
            audio_path: "a.wav".into(),
            reference: "привет".into(),
            duration: -1.0,
        };
        assert!(!utt.has_duration());
    }
}
