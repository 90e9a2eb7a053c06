//! # audio
//!
//! Audio processing module for asr-datapipe.
//!
//! This crate handles:
//! - WAV file loading and saving
//! - Audio resampling to target sample rate
//! - Decode backends (hound / sox / ffmpeg) behind the `AudioSource` trait
//! - Log-filterbank feature extraction

pub mod fbank;
pub mod loader;
pub mod resample;
pub mod source;

pub use fbank::LogFilterbank;
pub use loader::{load_wav, to_mono, write_wav};
pub use resample::Resampler;
pub use source::{AudioSource, AutoSource, FfmpegSource, SoxSource, WavSource};
