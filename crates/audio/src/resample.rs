//! Audio resampling.

use data_core::{AudioBuffer, DataError, DataResult};
use rubato::{FftFixedInOut, Resampler as RubatoResampler};

/// Resample mono samples from one rate to another.
///
/// Обрабатывает сигнал фиксированными чанками; хвост дополняется нулями,
/// из результата берется пропорциональная часть.
pub fn resample(samples: &[f32], from_rate: usize, to_rate: usize) -> DataResult<Vec<f32>> {
    if from_rate == to_rate {
        return Ok(samples.to_vec());
    }

    let ratio = to_rate as f64 / from_rate as f64;

    let mut resampler = FftFixedInOut::<f32>::new(from_rate, to_rate, 1024, 1)
        .map_err(|e| DataError::Audio(format!("Failed to create resampler: {}", e)))?;
    // FftFixedInOut подгоняет размер чанка под отношение частот.
    let chunk_size = resampler.input_frames_next();
    let output_chunk_size = resampler.output_frames_next();

    let mut output = Vec::with_capacity((samples.len() as f64 * ratio) as usize);

    let mut pos = 0;
    while pos + chunk_size <= samples.len() {
        let input_chunk = vec![samples[pos..pos + chunk_size].to_vec()];
        let output_chunk = resampler
            .process(&input_chunk, None)
            .map_err(|e| DataError::Audio(format!("Resampling failed: {}", e)))?;
        output.extend_from_slice(&output_chunk[0]);
        pos += chunk_size;
    }

    if pos < samples.len() {
        let mut remaining = samples[pos..].to_vec();
        remaining.resize(chunk_size, 0.0);
        let input_chunk = vec![remaining];
        let output_chunk = resampler
            .process(&input_chunk, None)
            .map_err(|e| DataError::Audio(format!("Resampling failed: {}", e)))?;

        let remaining_ratio = (samples.len() - pos) as f64 / chunk_size as f64;
        let take = (output_chunk_size as f64 * remaining_ratio) as usize;
        output.extend_from_slice(&output_chunk[0][..take.min(output_chunk[0].len())]);
    }

    Ok(output)
}

/// Audio resampler for converting buffers to a target sample rate.
pub struct Resampler {
    target_sample_rate: usize,
}

impl Resampler {
    /// Create a new resampler with target sample rate.
    pub fn new(target_sample_rate: usize) -> Self {
        Self { target_sample_rate }
    }

    /// Resample an audio buffer to the target sample rate.
    ///
    /// Требует mono-аудио: сначала приведите буфер через `to_mono()`.
    pub fn resample(&self, buffer: &AudioBuffer) -> DataResult<AudioBuffer> {
        if buffer.sample_rate == self.target_sample_rate {
            return Ok(buffer.clone());
        }

        if buffer.channels != 1 {
            return Err(DataError::Audio(
                "Resampling requires mono audio. Use to_mono() first.".to_string(),
            ));
        }

        let output = resample(&buffer.samples, buffer.sample_rate, self.target_sample_rate)?;
        Ok(AudioBuffer::new(output, self.target_sample_rate, 1))
    }
}

impl Default for Resampler {
    fn default() -> Self {
        Self::new(8000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resampler_no_change() {
        let buffer = AudioBuffer::new(vec![0.0; 1024], 8000, 1);
        let resampler = Resampler::new(8000);
        let result = resampler.resample(&buffer).unwrap();

        assert_eq!(result.sample_rate, 8000);
        assert_eq!(result.samples.len(), buffer.samples.len());
    }

    #[test]
    fn test_resample_halves_length() {
        let samples = vec![0.1_f32; 4096];
        let output = resample(&samples, 16000, 8000).unwrap();

        // Длина после ресемплинга пропорциональна отношению частот.
        let expected = samples.len() / 2;
        assert!((output.len() as isize - expected as isize).abs() < 64);
    }

    #[test]
    fn test_resample_fractional_ratio() {
        // 8000 → 6400 (speed perturb 1.25x): чанк не равен запрошенным 1024
        let samples = vec![0.1_f32; 8000];
        let output = resample(&samples, 8000, 6400).unwrap();
        assert!((output.len() as isize - 6400).abs() < 256);
    }

    #[test]
    fn test_resample_rejects_stereo() {
        let buffer = AudioBuffer::new(vec![0.0; 2048], 16000, 2);
        let resampler = Resampler::new(8000);
        assert!(resampler.resample(&buffer).is_err());
    }
}
