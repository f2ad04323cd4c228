//! Reference audio utilities.
//!
//! - WAV read (any channel count, integer or float PCM) downmixed to mono f32
//! - WAV write (mono, 32-bit float)
//! - linear resampling and length capping

use std::path::Path;

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use thiserror::Error;

#[derive(Debug, Clone)]
pub struct WavData {
    pub sample_rate_hz: u32,
    pub channels: u16,
    pub samples_mono: Vec<f32>,
}

impl WavData {
    #[must_use]
    pub fn duration_secs(&self) -> f32 {
        if self.sample_rate_hz == 0 {
            return 0.0;
        }
        self.samples_mono.len() as f32 / self.sample_rate_hz as f32
    }
}

#[derive(Debug, Error)]
pub enum AudioError {
    #[error("wav error: {0}")]
    Wav(#[from] hound::Error),
    #[error("unsupported WAV format: {bits}-bit {format:?}")]
    UnsupportedFormat { bits: u16, format: SampleFormat },
    #[error("WAV file has no channels")]
    NoChannels,
}

/// Read a WAV file and downmix it to mono `f32` at the file's sample rate.
pub fn read_wav_mono(path: impl AsRef<Path>) -> Result<WavData, AudioError> {
    let mut reader = WavReader::open(path)?;
    let spec = reader.spec();
    if spec.channels == 0 {
        return Err(AudioError::NoChannels);
    }

    let interleaved: Vec<f32> = match (spec.sample_format, spec.bits_per_sample) {
        (SampleFormat::Float, 32) => reader.samples::<f32>().collect::<Result<_, _>>()?,
        (SampleFormat::Int, bits @ 1..=32) => {
            let scale = 1.0 / (1u64 << (bits - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 * scale))
                .collect::<Result<_, _>>()?
        }
        (format, bits) => return Err(AudioError::UnsupportedFormat { bits, format }),
    };

    let channels = usize::from(spec.channels);
    let samples_mono = if channels == 1 {
        interleaved
    } else {
        interleaved
            .chunks_exact(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect()
    };

    Ok(WavData {
        sample_rate_hz: spec.sample_rate,
        channels: spec.channels,
        samples_mono,
    })
}

/// Write mono `f32` samples as a 32-bit float WAV file.
pub fn write_wav_mono(
    path: impl AsRef<Path>,
    samples: &[f32],
    sample_rate_hz: u32,
) -> Result<(), AudioError> {
    let spec = WavSpec {
        channels: 1,
        sample_rate: sample_rate_hz,
        bits_per_sample: 32,
        sample_format: SampleFormat::Float,
    };
    let mut writer = WavWriter::create(path, spec)?;
    for &s in samples {
        writer.write_sample(s)?;
    }
    writer.finalize()?;
    Ok(())
}

/// Linearly resample `input` from `src_hz` to `dst_hz`.
#[must_use]
pub fn resample_linear_mono_f32(input: &[f32], src_hz: u32, dst_hz: u32) -> Vec<f32> {
    if src_hz == dst_hz || input.is_empty() || src_hz == 0 {
        return input.to_vec();
    }

    let new_n = (input.len() as u64) * u64::from(dst_hz) / u64::from(src_hz);
    let ratio = f64::from(src_hz) / f64::from(dst_hz);

    (0..new_n)
        .map(|i| {
            let src_pos = i as f64 * ratio;
            let idx = src_pos.floor() as usize;
            let frac = (src_pos - idx as f64) as f32;

            let a = input.get(idx).copied().unwrap_or(0.0);
            let b = input.get(idx + 1).copied().unwrap_or(a);
            a * (1.0 - frac) + b * frac
        })
        .collect()
}

/// Keep at most `max_secs` seconds of audio.
pub fn truncate_seconds(samples: &mut Vec<f32>, sample_rate_hz: u32, max_secs: f32) {
    if max_secs <= 0.0 {
        return;
    }
    let max_len = (max_secs * sample_rate_hz as f32) as usize;
    samples.truncate(max_len);
}
