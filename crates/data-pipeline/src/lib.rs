//! # data-pipeline
//!
//! Пайплайн данных для обучения распознаванию речи:
//!
//! - [`manifest`] — загрузка корпусов из CSV / CSV.gz манифестов
//! - [`dataset`] — случайный доступ: аудио → признаки, текст → индексы
//! - [`sampler`] — детерминированные, возобновляемые батчи с миксованием
//! - [`collate`] — паддированные батчи со служебными длинами
//! - [`transform`] — волновые и спектральные аугментации

pub mod collate;
pub mod dataset;
pub mod manifest;
pub mod sampler;
pub mod transform;

pub use collate::{collate, Batch, EpochIterator, DEFAULT_PAD_TO};
pub use dataset::{AudioTextDataset, DatasetItem};
pub use manifest::Corpus;
pub use sampler::{BucketingSampler, SamplerState};
pub use transform::{
    AddWhiteNoise, Amount, FeatureTransform, GainPerturbation, MixExternalNoise, ReplaceStrategy,
    SoxEffects, SpecAugment, SpeedPerturbation, WaveformTransform,
};
