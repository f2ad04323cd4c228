//! Log-mel spectrogram transform for speech-model conditioning.
//!
//! This crate provides:
//! - `MelTransform`: waveform -> log-mel, Griffin-Lim inversion, frame energy
//! - Slaney mel filterbank and Hann window construction
//! - WAV loading and resampling for reference audio

pub mod audio;
pub mod constants;
pub mod filters;
pub mod griffin_lim;
pub mod mel;
pub mod pad;
pub mod params;
pub mod stft;

pub use mel::{MelTransform, ShapeError, audio_to_mel};
pub use params::{ConfigError, MelParams};

/// Any failure of the one-shot [`audio_to_mel`] path.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MelError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("invalid input shape: {0}")]
    Shape(#[from] ShapeError),
}
