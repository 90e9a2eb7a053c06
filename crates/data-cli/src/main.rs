//!
//! CLI для инспекции пайплайна данных: манифесты, нормализация, батчи.

use std::path::PathBuf;

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand, ValueEnum};

use audio::{AutoSource, LogFilterbank};
use data_core::{DatasetConfig, FeatureExtractorConfig};
use data_pipeline::{AudioTextDataset, BucketingSampler, Corpus, EpochIterator};
use labels::Labels;
use rand::rngs::StdRng;
use rand::SeedableRng;

/// Язык кодека меток.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum LangArg {
    /// Русский (по умолчанию)
    Ru,
    /// Английский
    En,
}

impl LangArg {
    fn to_labels(self) -> Labels {
        match self {
            LangArg::Ru => Labels::new(Box::new(labels::Russian), "char"),
            LangArg::En => Labels::new(Box::new(labels::English), "char"),
        }
    }
}

#[derive(Parser)]
#[command(name = "datapipe")]
#[command(author, version, about = "asr-datapipe: инспекция корпусов и батчей", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Статистика манифестов после фильтрации по длительности
    Manifest {
        /// Пути к CSV/CSV.gz манифестам
        #[arg(long, required = true, num_args = 1..)]
        manifest: Vec<PathBuf>,

        /// Отбрасывать записи с длительностью >= порога (сек)
        #[arg(long)]
        max_duration: Option<f64>,
    },

    /// Нормализовать текст кодеком меток
    Normalize {
        /// Язык алфавита
        #[arg(long, value_enum, default_value = "ru")]
        lang: LangArg,

        /// Текст для нормализации
        text: String,

        /// Показать также индексы кодирования
        #[arg(long, default_value_t = false)]
        encode: bool,
    },

    /// Предпросмотр батчей bucketing-сэмплера
    Batches {
        /// Пути к CSV/CSV.gz манифестам
        #[arg(long, required = true, num_args = 1..)]
        manifest: Vec<PathBuf>,

        #[arg(long, default_value_t = 32)]
        batch_size: usize,

        /// Эпоха (она же seed перемешивания)
        #[arg(long, default_value_t = 0)]
        epoch: u64,

        /// Доли корпусов в батче (по умолчанию — равные)
        #[arg(long, num_args = 1..)]
        mixing: Option<Vec<f64>>,

        /// Сколько батчей напечатать
        #[arg(long, default_value_t = 4)]
        show: usize,

        #[arg(long)]
        max_duration: Option<f64>,
    },

    /// Прогнать эпоху через датасет и напечатать формы батчей
    Epoch {
        /// Пути к CSV/CSV.gz манифестам
        #[arg(long, required = true, num_args = 1..)]
        manifest: Vec<PathBuf>,

        #[arg(long, value_enum, default_value = "ru")]
        lang: LangArg,

        #[arg(long, default_value_t = 8)]
        batch_size: usize,

        #[arg(long, default_value_t = 8000)]
        sample_rate: usize,

        #[arg(long)]
        max_duration: Option<f64>,

        /// Сколько батчей обработать (0 — всю эпоху)
        #[arg(long, default_value_t = 0)]
        limit: usize,
    },

    /// Извлечь признаки из аудиофайла и показать статистику
    Features {
        /// Путь к аудиофайлу
        #[arg(long)]
        audio: PathBuf,

        #[arg(long, default_value_t = 8000)]
        sample_rate: usize,

        #[arg(long, default_value_t = 64)]
        num_features: usize,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Manifest {
            manifest,
            max_duration,
        } => cmd_manifest(&manifest, max_duration),
        Commands::Normalize { lang, text, encode } => cmd_normalize(lang, &text, encode),
        Commands::Batches {
            manifest,
            batch_size,
            epoch,
            mixing,
            show,
            max_duration,
        } => cmd_batches(&manifest, batch_size, epoch, mixing, show, max_duration),
        Commands::Epoch {
            manifest,
            lang,
            batch_size,
            sample_rate,
            max_duration,
            limit,
        } => cmd_epoch(&manifest, lang, batch_size, sample_rate, max_duration, limit),
        Commands::Features {
            audio,
            sample_rate,
            num_features,
        } => cmd_features(&audio, sample_rate, num_features),
    }
}

fn cmd_manifest(paths: &[PathBuf], max_duration: Option<f64>) -> Result<()> {
    for path in paths {
        let corpus = Corpus::load(path, max_duration)?;
        println!(
            "{}: {} записей, {:.1} ч объявленной длительности",
            corpus.name,
            corpus.len(),
            corpus.total_duration() / 3600.0
        );
    }
    Ok(())
}

fn cmd_normalize(lang: LangArg, text: &str, encode: bool) -> Result<()> {
    let codec = lang.to_labels();
    if encode {
        let (normalized, ids) = codec.encode(text)?;
        println!("{normalized}");
        println!("{ids:?}");
    } else {
        println!("{}", codec.normalize_text(text));
    }
    Ok(())
}

fn cmd_batches(
    paths: &[PathBuf],
    batch_size: usize,
    epoch: u64,
    mixing: Option<Vec<f64>>,
    show: usize,
    max_duration: Option<f64>,
) -> Result<()> {
    let corpora = paths
        .iter()
        .map(|path| Corpus::load(path, max_duration))
        .collect::<Result<Vec<_>, _>>()?;
    let lens: Vec<usize> = corpora.iter().map(Corpus::len).collect();

    let mut sampler = BucketingSampler::new(&lens, batch_size, mixing)?;
    sampler.shuffle(epoch, 0)?;
    println!("эпоха {epoch}: {} батчей", sampler.num_batches());

    for (i, batch) in sampler.iter().take(show).enumerate() {
        println!("батч {i}: {batch:?}");
    }
    Ok(())
}

fn cmd_epoch(
    paths: &[PathBuf],
    lang: LangArg,
    batch_size: usize,
    sample_rate: usize,
    max_duration: Option<f64>,
    limit: usize,
) -> Result<()> {
    let mut extractor_config = FeatureExtractorConfig::telephony_8k();
    extractor_config.sample_rate = sample_rate;

    let dataset = AudioTextDataset::new(
        paths,
        vec![lang.to_labels()],
        Box::new(AutoSource::default()),
        DatasetConfig {
            sample_rate,
            max_duration,
        },
        extractor_config,
    )?;
    println!("датасет: {} записей", dataset.len());

    let mut sampler = BucketingSampler::new(&dataset.corpus_lens(), batch_size, None)?;
    let rng = StdRng::seed_from_u64(sampler.epoch());
    let iterator = EpochIterator::new(&dataset, &mut sampler, rng, data_pipeline::DEFAULT_PAD_TO);

    let limit = if limit == 0 { usize::MAX } else { limit };
    for (i, batch) in iterator.take(limit).enumerate() {
        let batch = batch?;
        println!(
            "батч {i}: inputs {:?}, targets {:?}",
            batch.inputs.dims(),
            batch.targets.dims()
        );
    }
    Ok(())
}

fn cmd_features(audio_path: &PathBuf, sample_rate: usize, num_features: usize) -> Result<()> {
    use audio::AudioSource;

    let mut config = FeatureExtractorConfig::telephony_8k();
    config.sample_rate = sample_rate;
    config.num_features = num_features;

    let buffer = AutoSource::default().read(audio_path, sample_rate, true)?;
    if buffer.is_empty() {
        return Err(anyhow!("не удалось декодировать {}", audio_path.display()));
    }

    let extractor = LogFilterbank::new(config);
    let features = extractor.extract(&buffer.samples, &candle_core::Device::Cpu)?;
    let values = features.tensor.flatten_all()?.to_vec1::<f32>()?;
    let (mut min, mut max) = (f32::INFINITY, f32::NEG_INFINITY);
    for &v in &values {
        min = min.min(v);
        max = max.max(v);
    }
    let mean = values.iter().sum::<f32>() / values.len().max(1) as f32;

    println!(
        "{}: [{} x {}], min={min:.3}, max={max:.3}, mean={mean:.3}",
        audio_path.display(),
        features.num_features,
        features.num_frames
    );
    Ok(())
}
