//! Аугментации: волновые и спектральные преобразования.
//!
//! Вся случайность — через явный `&mut StdRng`, который каждый worker
//! держит свой: никаких глобальных генераторов, воспроизводимость
//! гарантируется seed-ом. Спектральные маски работают copy-on-write —
//! вход не модифицируется.

use std::path::{Path, PathBuf};
use std::process::Command;

use audio::source::s16le_to_f32;
use audio::{resample, AudioSource};
use candle_core::Tensor;
use data_core::{AudioBuffer, DataError, DataResult, Features};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::Rng;
use rand_distr::{Distribution, Normal};
use tracing::warn;

/// Скалярный параметр аугментации: фиксированный или равномерный из диапазона.
#[derive(Debug, Clone, Copy)]
pub enum Amount {
    /// Всегда одно значение.
    Fixed(f64),
    /// Равномерная выборка из [lo, hi].
    Uniform(f64, f64),
}

impl Amount {
    /// Выбрать значение параметра.
    pub fn sample(&self, rng: &mut StdRng) -> f64 {
        match *self {
            Amount::Fixed(value) => value,
            Amount::Uniform(lo, hi) => rng.gen_range(lo..=hi),
        }
    }
}

/// Волновое преобразование: сигнал → сигнал.
pub trait WaveformTransform: Send + Sync {
    /// Применить к декодированному сигналу.
    fn apply(
        &self,
        buffer: AudioBuffer,
        dataset_name: &str,
        rng: &mut StdRng,
    ) -> DataResult<AudioBuffer>;

    /// Преобразование само декодирует файл (датасет не читает аудио).
    fn consumes_path(&self) -> bool {
        false
    }

    /// Декодировать и применить, исходя из пути к файлу.
    fn apply_path(
        &self,
        _path: &Path,
        _sample_rate: usize,
        _dataset_name: &str,
        _rng: &mut StdRng,
    ) -> DataResult<AudioBuffer> {
        Err(DataError::Audio(
            "преобразование не принимает путь к файлу".to_string(),
        ))
    }
}

/// Спектральное преобразование: признаки → признаки.
pub trait FeatureTransform: Send + Sync {
    /// Применить к тензору признаков.
    fn apply(
        &self,
        features: Features,
        dataset_name: &str,
        rng: &mut StdRng,
    ) -> DataResult<Features>;
}

// ---------------------------------------------------------------------------
// Волновые аугментации
// ---------------------------------------------------------------------------

/// Случайное усиление/ослабление сигнала в децибелах.
#[derive(Debug, Clone)]
pub struct GainPerturbation {
    /// Усиление в дБ.
    pub gain_db: Amount,
}

impl WaveformTransform for GainPerturbation {
    fn apply(
        &self,
        mut buffer: AudioBuffer,
        _dataset_name: &str,
        rng: &mut StdRng,
    ) -> DataResult<AudioBuffer> {
        let factor = 10.0_f64.powf(self.gain_db.sample(rng) / 20.0) as f32;
        for sample in buffer.samples.iter_mut() {
            *sample *= factor;
        }
        Ok(buffer)
    }
}

/// Аддитивный белый (гауссов) шум.
#[derive(Debug, Clone)]
pub struct AddWhiteNoise {
    /// Амплитуда шума.
    pub noise_level: Amount,
}

impl WaveformTransform for AddWhiteNoise {
    fn apply(
        &self,
        mut buffer: AudioBuffer,
        _dataset_name: &str,
        rng: &mut StdRng,
    ) -> DataResult<AudioBuffer> {
        let level = self.noise_level.sample(rng) as f32;
        let normal = Normal::new(0.0_f32, 1.0).map_err(|e| {
            DataError::Audio(format!("некорректное распределение шума: {e}"))
        })?;
        for sample in buffer.samples.iter_mut() {
            let noise = normal.sample(rng).clamp(-1.0, 1.0);
            *sample += noise * level;
        }
        Ok(buffer)
    }
}

/// Подмешивание внешнего шума из списка файлов.
pub struct MixExternalNoise {
    noise_paths: Vec<PathBuf>,
    noise_level: Amount,
    source: Box<dyn AudioSource>,
}

impl MixExternalNoise {
    /// Создать из готового списка путей.
    pub fn new(
        noise_paths: Vec<PathBuf>,
        noise_level: Amount,
        source: Box<dyn AudioSource>,
    ) -> Self {
        Self {
            noise_paths,
            noise_level,
            source,
        }
    }

    /// Создать из файла-списка (по пути на строку).
    pub fn from_list_file(
        list_path: impl AsRef<Path>,
        noise_level: Amount,
        source: Box<dyn AudioSource>,
    ) -> DataResult<Self> {
        let content = std::fs::read_to_string(list_path.as_ref())?;
        let noise_paths = content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(PathBuf::from)
            .collect();
        Ok(Self::new(noise_paths, noise_level, source))
    }
}

impl WaveformTransform for MixExternalNoise {
    fn apply(
        &self,
        mut buffer: AudioBuffer,
        _dataset_name: &str,
        rng: &mut StdRng,
    ) -> DataResult<AudioBuffer> {
        let Some(noise_path) = self.noise_paths.choose(rng) else {
            return Ok(buffer);
        };
        let level = self.noise_level.sample(rng) as f32;

        let noise = self
            .source
            .read(noise_path, buffer.sample_rate, true)?;
        if noise.is_empty() || buffer.is_empty() {
            return Ok(buffer);
        }

        // Шум длиннее сигнала усекается, короче — повторяется по кругу.
        let max_len = buffer.sample_rate + buffer.samples.len();
        let noise_samples = &noise.samples[..noise.samples.len().min(max_len)];
        for (i, sample) in buffer.samples.iter_mut().enumerate() {
            *sample += noise_samples[i % noise_samples.len()] * level;
        }
        Ok(buffer)
    }
}

/// Изменение скорости речи ресемплингом (kaldi-style speed perturb).
///
/// rate > 1 — быстрее (сигнал короче), rate < 1 — медленнее.
#[derive(Debug, Clone)]
pub struct SpeedPerturbation {
    /// Коэффициент скорости.
    pub rate: Amount,
}

impl WaveformTransform for SpeedPerturbation {
    fn apply(
        &self,
        buffer: AudioBuffer,
        _dataset_name: &str,
        rng: &mut StdRng,
    ) -> DataResult<AudioBuffer> {
        let rate = self.rate.sample(rng);
        if buffer.is_empty() || (rate - 1.0).abs() < 1e-6 {
            return Ok(buffer);
        }
        let intermediate = (buffer.sample_rate as f64 / rate) as usize;
        if intermediate == 0 {
            return Err(DataError::Audio(format!(
                "некорректный коэффициент скорости {rate}"
            )));
        }
        let samples = resample::resample(&buffer.samples, buffer.sample_rate, intermediate)?;
        // Интерпретация результата на исходной частоте меняет темп.
        Ok(AudioBuffer::new(samples, buffer.sample_rate, 1))
    }
}

/// Цепочка эффектов sox, применяемая при декодировании файла.
///
/// Преобразование потребляет путь: sox сам читает исходник и выдает
/// raw s16le на целевой частоте. Одна из цепочек выбирается случайно.
#[derive(Debug, Clone)]
pub struct SoxEffects {
    /// Наборы аргументов-эффектов sox (например, `["pitch", "150"]`).
    pub effect_chains: Vec<Vec<String>>,
}

impl WaveformTransform for SoxEffects {
    fn apply(
        &self,
        buffer: AudioBuffer,
        _dataset_name: &str,
        _rng: &mut StdRng,
    ) -> DataResult<AudioBuffer> {
        // Сигнал уже декодирован кем-то другим — эффекты применить нельзя.
        Ok(buffer)
    }

    fn consumes_path(&self) -> bool {
        true
    }

    fn apply_path(
        &self,
        path: &Path,
        sample_rate: usize,
        _dataset_name: &str,
        rng: &mut StdRng,
    ) -> DataResult<AudioBuffer> {
        let mut command = Command::new("sox");
        command
            .arg("-V0")
            .arg(path)
            .args(["-b", "16", "-e", "signed", "--endian", "little"])
            .args(["-r", &sample_rate.to_string()])
            .args(["-c", "1"])
            .args(["-t", "raw", "-"]);
        if let Some(chain) = self.effect_chains.choose(rng) {
            command.args(chain);
        }

        match command.output() {
            Ok(output) if output.status.success() => Ok(AudioBuffer::new(
                s16le_to_f32(&output.stdout),
                sample_rate,
                1,
            )),
            Ok(output) => {
                warn!(
                    "sox завершился с кодом {:?} для [{}]",
                    output.status.code(),
                    path.display()
                );
                Ok(AudioBuffer::empty(sample_rate))
            }
            Err(err) => {
                warn!("Ошибка запуска sox для [{}]: {}", path.display(), err);
                Ok(AudioBuffer::empty(sample_rate))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Спектральные аугментации
// ---------------------------------------------------------------------------

/// Чем заполнять замаскированные области SpecAugment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplaceStrategy {
    /// Нули.
    Zero,
    /// Среднее по спектрограмме.
    Mean,
}

/// SpecAugment: случайные маски по частоте и времени.
///
/// Вход не модифицируется — возвращается новый тензор (важно при
/// конкурентных worker-ах, деливших бы буфер).
#[derive(Debug, Clone)]
pub struct SpecAugment {
    /// Количество частотных масок.
    pub n_freq_mask: usize,
    /// Количество временных масок.
    pub n_time_mask: usize,
    /// Максимальная ширина частотной маски (бины).
    pub width_freq_mask: usize,
    /// Максимальная ширина временной маски (фреймы).
    pub width_time_mask: usize,
    /// Стратегия заполнения.
    pub replace_strategy: ReplaceStrategy,
}

impl Default for SpecAugment {
    fn default() -> Self {
        Self {
            n_freq_mask: 2,
            n_time_mask: 2,
            width_freq_mask: 6,
            width_time_mask: 6,
            replace_strategy: ReplaceStrategy::Zero,
        }
    }
}

impl FeatureTransform for SpecAugment {
    fn apply(
        &self,
        features: Features,
        _dataset_name: &str,
        rng: &mut StdRng,
    ) -> DataResult<Features> {
        let num_features = features.num_features;
        let num_frames = features.num_frames;
        if num_features == 0 || num_frames == 0 {
            return Ok(features);
        }

        let mut values = features.tensor.to_vec2::<f32>()?;

        let replace_val = match self.replace_strategy {
            ReplaceStrategy::Zero => 0.0,
            ReplaceStrategy::Mean => {
                let sum: f32 = values.iter().flat_map(|row| row.iter()).sum();
                sum / (num_features * num_frames) as f32
            }
        };

        for _ in 0..self.n_freq_mask {
            let f = rng.gen_range(0..=self.width_freq_mask.min(num_features));
            let f0 = rng.gen_range(0..=num_features - f);
            for row in values.iter_mut().skip(f0).take(f) {
                row.fill(replace_val);
            }
        }

        for _ in 0..self.n_time_mask {
            let t = rng.gen_range(0..=self.width_time_mask.min(num_frames));
            let t0 = rng.gen_range(0..=num_frames - t);
            for row in values.iter_mut() {
                for value in row.iter_mut().skip(t0).take(t) {
                    *value = replace_val;
                }
            }
        }

        let flat: Vec<f32> = values.into_iter().flatten().collect();
        let tensor = Tensor::from_vec(flat, (num_features, num_frames), features.tensor.device())?;
        Ok(Features::new(tensor, num_features, num_frames))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Device;
    use rand::SeedableRng;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(42)
    }

    #[test]
    fn test_amount_sampling() {
        let mut rng = rng();
        assert_eq!(Amount::Fixed(3.0).sample(&mut rng), 3.0);
        for _ in 0..100 {
            let v = Amount::Uniform(-1.0, 1.0).sample(&mut rng);
            assert!((-1.0..=1.0).contains(&v));
        }
    }

    #[test]
    fn test_gain_scales_samples() {
        let mut rng = rng();
        let transform = GainPerturbation {
            gain_db: Amount::Fixed(20.0),
        };
        let buffer = AudioBuffer::new(vec![0.01, -0.02], 8000, 1);
        let out = transform.apply(buffer, "test", &mut rng).unwrap();
        assert!((out.samples[0] - 0.1).abs() < 1e-5);
        assert!((out.samples[1] + 0.2).abs() < 1e-5);
    }

    #[test]
    fn test_white_noise_changes_signal() {
        let mut rng = rng();
        let transform = AddWhiteNoise {
            noise_level: Amount::Fixed(0.1),
        };
        let buffer = AudioBuffer::new(vec![0.0; 100], 8000, 1);
        let out = transform.apply(buffer, "test", &mut rng).unwrap();
        assert!(out.samples.iter().any(|&s| s.abs() > 1e-6));
    }

    #[test]
    fn test_speed_perturbation_changes_length() {
        let mut rng = rng();
        let transform = SpeedPerturbation {
            rate: Amount::Fixed(1.25),
        };
        let buffer = AudioBuffer::new(vec![0.1; 8000], 8000, 1);
        let out = transform.apply(buffer, "test", &mut rng).unwrap();
        // в 1.25 раза быстрее → примерно 6400 сэмплов
        assert!((out.samples.len() as f64 - 6400.0).abs() < 256.0);
        assert_eq!(out.sample_rate, 8000);
    }

    #[test]
    fn test_spec_augment_is_copy_on_write() {
        let mut rng = rng();
        let device = Device::Cpu;
        let tensor = Tensor::from_vec(vec![1.0_f32; 64 * 50], (64, 50), &device).unwrap();
        let original = tensor.clone();
        let features = Features::new(tensor, 64, 50);

        // много масок, чтобы хотя бы одна имела ненулевую ширину
        let transform = SpecAugment {
            n_freq_mask: 8,
            n_time_mask: 8,
            ..SpecAugment::default()
        };
        let masked = transform.apply(features, "test", &mut rng).unwrap();

        // вход не тронут
        let before = original.to_vec2::<f32>().unwrap();
        assert!(before.iter().all(|row| row.iter().all(|&v| v == 1.0)));
        // выход содержит замаскированные значения
        let after = masked.tensor.to_vec2::<f32>().unwrap();
        assert!(after.iter().any(|row| row.iter().any(|&v| v == 0.0)));
    }

    #[test]
    fn test_spec_augment_empty_features_pass_through() {
        let mut rng = rng();
        let device = Device::Cpu;
        let tensor = Tensor::from_vec(Vec::<f32>::new(), (64, 0), &device).unwrap();
        let features = Features::new(tensor, 64, 0);
        let out = SpecAugment::default().apply(features, "test", &mut rng).unwrap();
        assert_eq!(out.num_frames, 0);
    }

    #[test]
    fn test_sox_effects_consumes_path() {
        let transform = SoxEffects {
            effect_chains: vec![vec!["pitch".to_string(), "100".to_string()]],
        };
        assert!(transform.consumes_path());
    }
}
