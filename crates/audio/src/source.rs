//! Источники аудио: стратегия декодирования, выбираемая при конструировании.
//!
//! Каждый backend реализует [`AudioSource`]:
//! - [`WavSource`] — WAV через hound (без внешних процессов)
//! - [`SoxSource`] — одноразовый вызов `sox`, вывод raw s16le
//! - [`FfmpegSource`] — одноразовый вызов `ffmpeg`, вывод raw s16le
//! - [`AutoSource`] — `.wav` через hound, остальное через ffmpeg
//!
//! Ошибка декодирования НЕ прерывает пайплайн: `read()` логирует warning
//! и возвращает пустой буфер, чтобы обучающий цикл мог пропустить запись.

use std::path::Path;
use std::process::Command;

use data_core::{AudioBuffer, DataError, DataResult};
use tracing::warn;

use crate::loader::{load_wav, to_mono};
use crate::resample::Resampler;

/// Стратегия декодирования аудиофайла.
pub trait AudioSource: Send + Sync {
    /// Декодировать файл; любая проблема — ошибка.
    fn try_read(&self, path: &Path, sample_rate: usize, mono: bool) -> DataResult<AudioBuffer>;

    /// Прочитать файл с приведением к целевой частоте и числу каналов.
    ///
    /// При ошибке декодирования возвращает пустой буфер-сентинел
    /// (пайплайн логирует и продолжает работу).
    fn read(&self, path: &Path, sample_rate: usize, mono: bool) -> DataResult<AudioBuffer> {
        match self.try_read(path, sample_rate, mono) {
            Ok(buffer) => Ok(buffer),
            Err(err) => {
                warn!("Ошибка чтения [{}]: {}", path.display(), err);
                Ok(AudioBuffer::empty(sample_rate))
            }
        }
    }
}

/// Декодер WAV-файлов через hound + ресемплинг rubato.
#[derive(Debug, Default)]
pub struct WavSource;

impl AudioSource for WavSource {
    fn try_read(&self, path: &Path, sample_rate: usize, mono: bool) -> DataResult<AudioBuffer> {
        let mut buffer = load_wav(path)?;
        if mono && buffer.channels > 1 {
            buffer = to_mono(&buffer);
        }
        if buffer.sample_rate != sample_rate {
            buffer = Resampler::new(sample_rate).resample(&buffer)?;
        }
        Ok(buffer)
    }
}

/// Декодер через одноразовый subprocess `sox`.
#[derive(Debug, Default)]
pub struct SoxSource;

impl AudioSource for SoxSource {
    fn try_read(&self, path: &Path, sample_rate: usize, mono: bool) -> DataResult<AudioBuffer> {
        let channels = if mono { 1 } else { probe_channels_sox(path)? };
        let output = Command::new("sox")
            .arg("-V0")
            .arg(path)
            .args(["-b", "16", "-e", "signed", "--endian", "little"])
            .args(["-r", &sample_rate.to_string()])
            .args(["-c", &channels.to_string()])
            .args(["-t", "raw", "-"])
            .output()?;
        if !output.status.success() {
            return Err(DataError::Audio(format!(
                "sox завершился с кодом {:?} для {}",
                output.status.code(),
                path.display()
            )));
        }
        Ok(AudioBuffer::new(
            s16le_to_f32(&output.stdout),
            sample_rate,
            channels,
        ))
    }
}

/// Декодер через одноразовый subprocess `ffmpeg`.
#[derive(Debug, Default)]
pub struct FfmpegSource;

impl AudioSource for FfmpegSource {
    fn try_read(&self, path: &Path, sample_rate: usize, mono: bool) -> DataResult<AudioBuffer> {
        let channels = if mono { 1 } else { probe_channels_ffprobe(path)? };
        let output = Command::new("ffmpeg")
            .arg("-i")
            .arg(path)
            .args(["-nostdin", "-hide_banner", "-nostats", "-loglevel", "quiet"])
            .args(["-f", "s16le"])
            .args(["-ar", &sample_rate.to_string()])
            .args(["-ac", &channels.to_string()])
            .arg("-")
            .output()?;
        if !output.status.success() {
            return Err(DataError::Audio(format!(
                "ffmpeg завершился с кодом {:?} для {}",
                output.status.code(),
                path.display()
            )));
        }
        Ok(AudioBuffer::new(
            s16le_to_f32(&output.stdout),
            sample_rate,
            channels,
        ))
    }
}

/// Автовыбор backend: `.wav` — hound, остальные расширения — ffmpeg.
#[derive(Debug, Default)]
pub struct AutoSource {
    wav: WavSource,
    ffmpeg: FfmpegSource,
}

impl AudioSource for AutoSource {
    fn try_read(&self, path: &Path, sample_rate: usize, mono: bool) -> DataResult<AudioBuffer> {
        let is_wav = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("wav"))
            .unwrap_or(false);
        if is_wav {
            self.wav.try_read(path, sample_rate, mono)
        } else {
            self.ffmpeg.try_read(path, sample_rate, mono)
        }
    }
}

/// Число каналов через `soxi -V0 -c`.
fn probe_channels_sox(path: &Path) -> DataResult<usize> {
    let output = Command::new("soxi").args(["-V0", "-c"]).arg(path).output()?;
    parse_channel_count(&output.stdout, path)
}

/// Число каналов через `ffprobe`.
fn probe_channels_ffprobe(path: &Path) -> DataResult<usize> {
    let output = Command::new("ffprobe")
        .arg("-i")
        .arg(path)
        .args(["-show_entries", "stream=channels"])
        .args(["-select_streams", "a:0"])
        .args(["-of", "compact=p=0:nk=1"])
        .args(["-v", "0"])
        .output()?;
    parse_channel_count(&output.stdout, path)
}

fn parse_channel_count(stdout: &[u8], path: &Path) -> DataResult<usize> {
    String::from_utf8_lossy(stdout)
        .trim()
        .parse::<usize>()
        .map_err(|_| {
            DataError::Audio(format!(
                "не удалось определить число каналов для {}",
                path.display()
            ))
        })
}

/// Interleaved s16le → f32 в диапазоне [-1.0, 1.0].
pub fn s16le_to_f32(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(2)
        .map(|chunk| i16::from_le_bytes([chunk[0], chunk[1]]) as f32 / i16::MAX as f32)
        .collect()
}
