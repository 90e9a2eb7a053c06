//! Датасет аудио+текст: случайный доступ к объединенным корпусам.
//!
//! `get` не имеет побочных эффектов (кроме опционального отладочного
//! дампа волны) и безопасен для конкурентных вызовов из нескольких
//! worker-ов: манифесты только читаются, RNG каждый worker держит свой.

use std::path::PathBuf;

use audio::{to_mono, write_wav, AudioSource, LogFilterbank};
use candle_core::{Device, Tensor};
use data_core::{DataError, DataResult, DatasetConfig, FeatureExtractorConfig};
use labels::Labels;
use rand::rngs::StdRng;
use tracing::debug;

use crate::manifest::Corpus;
use crate::transform::{FeatureTransform, WaveformTransform};

/// Один элемент датасета, готовый к коллации.
#[derive(Debug, Clone)]
pub struct DatasetItem {
    /// Имя корпуса-источника.
    pub dataset_name: String,

    /// Путь к аудиофайлу.
    pub audio_path: PathBuf,

    /// Эталон, нормализованный ПЕРВЫМ кодеком (для логов и метрик).
    pub reference: String,

    /// Признаки формы [num_features, num_frames].
    pub features: Tensor,

    /// Целевые последовательности — по одной на каждый кодек.
    pub targets: Vec<Vec<u32>>,
}

/// Случайный доступ к записям нескольких корпусов.
pub struct AudioTextDataset {
    corpora: Vec<Corpus>,
    labels: Vec<Labels>,
    source: Box<dyn AudioSource>,
    extractor: LogFilterbank,
    config: DatasetConfig,
    waveform_transform: Option<Box<dyn WaveformTransform>>,
    feature_transform: Option<Box<dyn FeatureTransform>>,
    debug_dir: Option<PathBuf>,
    device: Device,
}

impl AudioTextDataset {
    /// Загрузить манифесты и собрать датасет.
    ///
    /// Каждый манифест фильтруется по `config.max_duration` и
    /// сортируется по длительности; дубликаты записей сохраняются.
    pub fn new(
        manifest_paths: &[PathBuf],
        labels: Vec<Labels>,
        source: Box<dyn AudioSource>,
        config: DatasetConfig,
        extractor_config: FeatureExtractorConfig,
    ) -> DataResult<Self> {
        if labels.is_empty() {
            return Err(DataError::Label(
                "датасету нужен хотя бы один кодек меток".to_string(),
            ));
        }
        let corpora = manifest_paths
            .iter()
            .map(|path| Corpus::load(path, config.max_duration))
            .collect::<DataResult<Vec<_>>>()?;

        Ok(Self {
            corpora,
            labels,
            source,
            extractor: LogFilterbank::new(extractor_config),
            config,
            waveform_transform: None,
            feature_transform: None,
            debug_dir: None,
            device: Device::Cpu,
        })
    }

    /// Волновая аугментация.
    pub fn with_waveform_transform(mut self, transform: Box<dyn WaveformTransform>) -> Self {
        self.waveform_transform = Some(transform);
        self
    }

    /// Спектральная аугментация.
    pub fn with_feature_transform(mut self, transform: Box<dyn FeatureTransform>) -> Self {
        self.feature_transform = Some(transform);
        self
    }

    /// Директория для отладочных дампов аугментированных волн.
    pub fn with_debug_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.debug_dir = Some(dir.into());
        self
    }

    /// Устройство для тензоров признаков.
    pub fn with_device(mut self, device: Device) -> Self {
        self.device = device;
        self
    }

    /// Суммарное количество записей по всем корпусам.
    pub fn len(&self) -> usize {
        self.corpora.iter().map(Corpus::len).sum()
    }

    /// Датасет пуст.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Длины корпусов в порядке объявления (вход bucketing-сэмплера).
    pub fn corpus_lens(&self) -> Vec<usize> {
        self.corpora.iter().map(Corpus::len).collect()
    }

    /// Кодеки меток.
    pub fn labels(&self) -> &[Labels] {
        &self.labels
    }

    /// Устройство тензоров.
    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Глобальный индекс → (корпус, локальный индекс).
    fn resolve(&self, index: usize) -> DataResult<(&Corpus, usize)> {
        let mut local = index;
        for corpus in &self.corpora {
            if local < corpus.len() {
                return Ok((corpus, local));
            }
            local -= corpus.len();
        }
        Err(DataError::Manifest(format!(
            "индекс {index} вне датасета из {} записей",
            self.len()
        )))
    }

    /// Получить элемент по глобальному индексу.
    ///
    /// RNG передается явно: стохастические аугментации не трогают
    /// глобальное состояние.
    pub fn get(&self, index: usize, rng: &mut StdRng) -> DataResult<DatasetItem> {
        let (corpus, local) = self.resolve(index)?;
        let utterance = &corpus.entries[local];
        let sample_rate = self.config.sample_rate;

        let buffer = match &self.waveform_transform {
            // Преобразование-декодер (цепочка sox) читает файл само.
            Some(transform) if transform.consumes_path() => {
                transform.apply_path(&utterance.audio_path, sample_rate, &corpus.name, rng)?
            }
            Some(transform) => {
                let buffer = self
                    .source
                    .read(&utterance.audio_path, sample_rate, true)?;
                transform.apply(buffer, &corpus.name, rng)?
            }
            None => self
                .source
                .read(&utterance.audio_path, sample_rate, true)?,
        };
        let buffer = if buffer.channels > 1 {
            to_mono(&buffer)
        } else {
            buffer
        };

        if let Some(dir) = &self.debug_dir {
            // Уникальное имя на запись: конкурентные worker-ы не затирают
            // дампы друг друга.
            let basename = utterance
                .audio_path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "unnamed.wav".to_string());
            let dump_path = dir.join(format!("{index}_{basename}"));
            write_wav(&dump_path, &buffer)?;
            debug!("дамп волны: {}", dump_path.display());
        }

        let features = self.extractor.extract(&buffer.samples, &self.device)?;
        let features = match &self.feature_transform {
            Some(transform) => transform.apply(features, &corpus.name, rng)?,
            None => features,
        };

        if data_core::debug::enabled() {
            // Дорогая статистика признаков: включается через DATAPIPE_DEBUG=1.
            let flat = features.tensor.flatten_all()?.to_vec1::<f32>()?;
            let mean = flat.iter().sum::<f32>() / flat.len().max(1) as f32;
            eprintln!(
                "DEBUG item {index} [{}]: features {:?}, mean={mean:.4}",
                utterance.audio_path.display(),
                features.tensor.dims()
            );
        }

        let reference = self.labels[0].normalize_text(&utterance.reference);
        let targets = self
            .labels
            .iter()
            .map(|codec| codec.encode(&utterance.reference).map(|(_, ids)| ids))
            .collect::<DataResult<Vec<_>>>()?;

        Ok(DatasetItem {
            dataset_name: corpus.name.clone(),
            audio_path: utterance.audio_path.clone(),
            reference,
            features: features.tensor,
            targets,
        })
    }
}
