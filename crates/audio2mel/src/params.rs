//! Transform configuration (`MelParams`) and its JSON loader.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants::{
    DEFAULT_FFT_SIZE, DEFAULT_HOP_LENGTH, DEFAULT_MEL_CHANNELS, DEFAULT_MEL_FMAX_HZ,
    DEFAULT_MEL_FMIN_HZ, DEFAULT_SAMPLE_RATE_HZ, DEFAULT_WINDOW_LENGTH,
};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("{field} must be > 0")]
    Zero { field: &'static str },
    #[error("hop_length ({hop}) must not exceed window_length ({window})")]
    HopExceedsWindow { hop: usize, window: usize },
    #[error("window_length ({window}) must not exceed fft_size ({fft})")]
    WindowExceedsFft { window: usize, fft: usize },
    #[error("invalid mel frequency range: fmin={fmin} fmax={fmax}")]
    FrequencyRange { fmin: f32, fmax: f32 },
    #[error("mel_fmax ({fmax}) exceeds the Nyquist frequency ({nyquist})")]
    AboveNyquist { fmax: f32, nyquist: f32 },
}

/// FFT and mel filterbank configuration.
///
/// Field names follow this crate; the names used by common PyTorch
/// `Audio2Mel` configs (`n_fft`, `win_length`, `sampling_rate`,
/// `n_mel_channels`) are accepted as aliases when deserializing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MelParams {
    #[serde(alias = "n_fft")]
    pub fft_size: usize,
    pub hop_length: usize,
    #[serde(alias = "win_length")]
    pub window_length: usize,
    #[serde(alias = "sampling_rate")]
    pub sample_rate: u32,
    #[serde(alias = "n_mel_channels", alias = "n_mels")]
    pub mel_channels: usize,
    pub mel_fmin: f32,
    pub mel_fmax: f32,
}

impl Default for MelParams {
    fn default() -> Self {
        Self {
            fft_size: DEFAULT_FFT_SIZE,
            hop_length: DEFAULT_HOP_LENGTH,
            window_length: DEFAULT_WINDOW_LENGTH,
            sample_rate: DEFAULT_SAMPLE_RATE_HZ,
            mel_channels: DEFAULT_MEL_CHANNELS,
            mel_fmin: DEFAULT_MEL_FMIN_HZ,
            mel_fmax: DEFAULT_MEL_FMAX_HZ,
        }
    }
}

impl MelParams {
    /// Named configurations.
    ///
    /// - `"default"`: 1024-point FFT, 256 hop, 80 mels at 16 kHz
    /// - `"portrait"`: 120 frames/s at 16 kHz (512 FFT, 133 hop, 266 window)
    pub fn from_preset(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "default" => Some(Self::default()),
            "portrait" | "portrait-120fps" => Some(Self::portrait()),
            _ => None,
        }
    }

    pub fn portrait() -> Self {
        Self {
            fft_size: 512,
            hop_length: 16_000 / 120,
            window_length: 16_000 / 60,
            ..Self::default()
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let params: Self = serde_json::from_str(json).context("parse mel params json")?;
        params.validate()?;
        Ok(params)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path_ref = path.as_ref();
        let json = std::fs::read_to_string(path_ref)
            .with_context(|| format!("read {}", path_ref.display()))?;
        Self::from_json_str(&json)
    }

    /// Number of linear-frequency bins produced by the STFT.
    #[must_use]
    pub fn freq_bins(&self) -> usize {
        self.fft_size / 2 + 1
    }

    /// Reflect padding applied to each end of the waveform before framing.
    #[must_use]
    pub fn pad_samples(&self) -> usize {
        self.fft_size.saturating_sub(self.hop_length) / 2
    }

    #[must_use]
    pub fn nyquist_hz(&self) -> f32 {
        self.sample_rate as f32 / 2.0
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.fft_size == 0 {
            return Err(ConfigError::Zero { field: "fft_size" });
        }
        if self.hop_length == 0 {
            return Err(ConfigError::Zero {
                field: "hop_length",
            });
        }
        if self.window_length == 0 {
            return Err(ConfigError::Zero {
                field: "window_length",
            });
        }
        if self.sample_rate == 0 {
            return Err(ConfigError::Zero {
                field: "sample_rate",
            });
        }
        if self.mel_channels == 0 {
            return Err(ConfigError::Zero {
                field: "mel_channels",
            });
        }
        if self.hop_length > self.window_length {
            return Err(ConfigError::HopExceedsWindow {
                hop: self.hop_length,
                window: self.window_length,
            });
        }
        if self.window_length > self.fft_size {
            return Err(ConfigError::WindowExceedsFft {
                window: self.window_length,
                fft: self.fft_size,
            });
        }

        let (fmin, fmax) = (self.mel_fmin, self.mel_fmax);
        if !fmin.is_finite() || !fmax.is_finite() || fmin < 0.0 || fmin >= fmax {
            return Err(ConfigError::FrequencyRange { fmin, fmax });
        }
        if fmax > self.nyquist_hz() {
            return Err(ConfigError::AboveNyquist {
                fmax,
                nyquist: self.nyquist_hz(),
            });
        }
        Ok(())
    }
}
