//! Лог-фильтробанк — экстрактор входных признаков для обучения.
//!
//! STFT (power spectrum) → треугольный mel-фильтробанк → ln(x + 1e-20)
//! → опциональная per-utterance нормализация (μ/σ).

use data_core::{DataResult, FeatureExtractorConfig, Features, WindowFn};
use candle_core::{Device, Tensor};
use rustfft::{num_complex::Complex, FftPlanner};
use std::f32::consts::PI;

const LOG_FLOOR: f32 = 1e-20;

/// Параметризованный лог-фильтробанк экстрактор.
///
/// Окно и фильтры предвычисляются один раз; `extract` может вызываться
/// конкурентно из нескольких worker-ов (`&self`, без общего состояния).
#[derive(Debug)]
pub struct LogFilterbank {
    config: FeatureExtractorConfig,
    window: Vec<f32>,
    filters: Vec<Vec<f32>>,
}

impl LogFilterbank {
    /// Создать экстрактор с фильтрами, сгенерированными по конфигурации.
    pub fn new(config: FeatureExtractorConfig) -> Self {
        let win_length = config.win_length();
        let window = match config.window {
            WindowFn::Hann => hann_window(win_length),
            WindowFn::Hamming => hamming_window(win_length),
        };
        let filters = mel_filterbank(
            config.num_features,
            win_length,
            config.sample_rate as f32,
            0.0,
            config.sample_rate as f32 / 2.0,
        );

        Self {
            config,
            window,
            filters,
        }
    }

    /// Конфигурация экстрактора.
    pub fn config(&self) -> &FeatureExtractorConfig {
        &self.config
    }

    /// Extract log-filterbank features from mono samples.
    ///
    /// Возвращает `Features` с тензором формы [num_features, num_frames].
    /// Пустой сигнал (сентинел неудачного декодирования) дает валидный
    /// пустой тензор [num_features, 0].
    pub fn extract(&self, samples: &[f32], device: &Device) -> DataResult<Features> {
        let num_features = self.config.num_features;
        if samples.is_empty() {
            let tensor = Tensor::from_vec(Vec::<f32>::new(), (num_features, 0), device)?;
            return Ok(Features::new(tensor, num_features, 0));
        }

        let spectrogram = self.stft(samples);
        let num_frames = spectrogram.len();

        // mel-фильтробанк + логарифм
        let mut log_mel: Vec<Vec<f32>> = spectrogram
            .iter()
            .map(|frame| {
                self.filters
                    .iter()
                    .map(|filter| {
                        let energy: f32 = frame
                            .iter()
                            .zip(filter.iter())
                            .map(|(s, f)| s * f)
                            .sum();
                        (energy + LOG_FLOOR).ln()
                    })
                    .collect()
            })
            .collect();

        if self.config.normalize {
            normalize_per_utterance(&mut log_mel);
        }

        // [frames][features] → [num_features, num_frames]
        let mut flat = vec![0.0_f32; num_features * num_frames];
        for (t, frame) in log_mel.iter().enumerate() {
            for (f, &value) in frame.iter().enumerate() {
                flat[f * num_frames + t] = value;
            }
        }
        let tensor = Tensor::from_vec(flat, (num_features, num_frames), device)?;

        Ok(Features::new(tensor, num_features, num_frames))
    }

    /// STFT с power spectrum (magnitude^2), center-паддинг отражением.
    fn stft(&self, samples: &[f32]) -> Vec<Vec<f32>> {
        let n_fft = self.window.len();
        let hop_length = self.config.hop_length();
        let num_frames = samples.len() / hop_length + 1;
        let pad = (n_fft / 2) as isize;

        let mut planner = FftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(n_fft);

        let n = samples.len() as isize;
        let mut spectrogram = Vec::with_capacity(num_frames);

        for frame_idx in 0..num_frames {
            let start = frame_idx as isize * hop_length as isize - pad;

            let mut buffer: Vec<Complex<f32>> = (0..n_fft)
                .map(|i| {
                    // Значения за границами сигнала берутся отражением.
                    let mut idx = start + i as isize;
                    if idx < 0 {
                        idx = -idx;
                    }
                    if idx >= n {
                        idx = 2 * n - idx - 2;
                    }
                    let sample = if idx >= 0 && idx < n {
                        samples[idx as usize] * self.window[i]
                    } else {
                        0.0
                    };
                    Complex::new(sample, 0.0)
                })
                .collect();

            fft.process(&mut buffer);

            let power: Vec<f32> = buffer
                .iter()
                .take(n_fft / 2 + 1)
                .map(|c| c.re * c.re + c.im * c.im)
                .collect();

            spectrogram.push(power);
        }

        spectrogram
    }
}

impl Default for LogFilterbank {
    fn default() -> Self {
        Self::new(FeatureExtractorConfig::default())
    }
}

/// Per-utterance нормализация: вычитание среднего, деление на σ.
fn normalize_per_utterance(log_mel: &mut [Vec<f32>]) {
    let count = log_mel.iter().map(|f| f.len()).sum::<usize>() as f64;
    if count == 0.0 {
        return;
    }

    let sum: f64 = log_mel
        .iter()
        .flat_map(|f| f.iter())
        .map(|&v| v as f64)
        .sum();
    let mean = sum / count;

    let sum_sq: f64 = log_mel
        .iter()
        .flat_map(|f| f.iter())
        .map(|&v| {
            let d = v as f64 - mean;
            d * d
        })
        .sum();
    let std = (sum_sq / count).sqrt().max(1e-10);

    for frame in log_mel.iter_mut() {
        for value in frame.iter_mut() {
            *value = ((*value as f64 - mean) / std) as f32;
        }
    }
}

/// Create Hann window (periodic for STFT).
fn hann_window(length: usize) -> Vec<f32> {
    (0..length)
        .map(|n| 0.5 * (1.0 - (2.0 * PI * n as f32 / length as f32).cos()))
        .collect()
}

/// Create Hamming window.
fn hamming_window(length: usize) -> Vec<f32> {
    (0..length)
        .map(|n| 0.54 - 0.46 * (2.0 * PI * n as f32 / length as f32).cos())
        .collect()
}

/// Конвертация Hz → mel по HTK шкале.
fn hz_to_mel(hz: f32) -> f32 {
    2595.0 * (1.0 + hz / 700.0).log10()
}

/// Конвертация mel → Hz по HTK шкале.
fn mel_to_hz(mel: f32) -> f32 {
    700.0 * (10.0_f32.powf(mel / 2595.0) - 1.0)
}

/// Треугольный mel-фильтробанк [n_mels][n_fft/2 + 1].
fn mel_filterbank(
    n_mels: usize,
    n_fft: usize,
    sample_rate: f32,
    f_min: f32,
    f_max: f32,
) -> Vec<Vec<f32>> {
    let n_freqs = n_fft / 2 + 1;

    let fft_freqs: Vec<f32> = (0..n_freqs)
        .map(|i| i as f32 * sample_rate / n_fft as f32)
        .collect();

    let mel_min = hz_to_mel(f_min);
    let mel_max = hz_to_mel(f_max);
    let hz_points: Vec<f32> = (0..=n_mels + 1)
        .map(|i| mel_to_hz(mel_min + i as f32 * (mel_max - mel_min) / (n_mels + 1) as f32))
        .collect();

    let mut filterbank = vec![vec![0.0_f32; n_freqs]; n_mels];

    for m in 0..n_mels {
        let f_left = hz_points[m];
        let f_center = hz_points[m + 1];
        let f_right = hz_points[m + 2];

        for (k, &freq) in fft_freqs.iter().enumerate() {
            if freq >= f_left && freq < f_center {
                filterbank[m][k] = (freq - f_left) / (f_center - f_left);
            } else if freq >= f_center && freq <= f_right {
                filterbank[m][k] = (f_right - freq) / (f_right - f_center);
            }
        }
    }

    filterbank
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hann_window() {
        let window = hann_window(320);
        assert_eq!(window.len(), 320);
        assert!(window[0].abs() < 1e-6);
        assert!((window[160] - 1.0).abs() < 0.01);
    }

    #[test]
    fn test_filterbank_shape() {
        let filters = mel_filterbank(64, 320, 8000.0, 0.0, 4000.0);
        assert_eq!(filters.len(), 64);
        assert_eq!(filters[0].len(), 161);
    }

    #[test]
    fn test_extract_shape() {
        let extractor = LogFilterbank::default();
        let samples: Vec<f32> = (0..8000)
            .map(|i| (2.0 * std::f32::consts::PI * 440.0 * i as f32 / 8000.0).sin())
            .collect();

        let features = extractor.extract(&samples, &Device::Cpu).unwrap();
        assert_eq!(features.num_features, 64);
        // 1 секунда при hop 10 мс: len / hop + 1 фреймов.
        assert_eq!(features.num_frames, 8000 / 80 + 1);
        assert_eq!(features.tensor.dims(), &[64, 101]);
    }

    #[test]
    fn test_extract_empty_signal() {
        let extractor = LogFilterbank::default();
        let features = extractor.extract(&[], &Device::Cpu).unwrap();
        assert_eq!(features.num_frames, 0);
        assert_eq!(features.tensor.dims(), &[64, 0]);
    }

    #[test]
    fn test_normalized_features_have_zero_mean() {
        let extractor = LogFilterbank::default();
        let samples: Vec<f32> = (0..4000)
            .map(|i| (2.0 * std::f32::consts::PI * 300.0 * i as f32 / 8000.0).sin())
            .collect();

        let features = extractor.extract(&samples, &Device::Cpu).unwrap();
        let values = features.tensor.flatten_all().unwrap().to_vec1::<f32>().unwrap();
        let mean: f32 = values.iter().sum::<f32>() / values.len() as f32;
        assert!(mean.abs() < 1e-3);
    }
}
