//! Signal-processing defaults and numeric policy constants.

// Default transform configuration.
pub const DEFAULT_FFT_SIZE: usize = 1024;
pub const DEFAULT_HOP_LENGTH: usize = 256;
pub const DEFAULT_WINDOW_LENGTH: usize = 1024;
pub const DEFAULT_SAMPLE_RATE_HZ: u32 = 16_000;
pub const DEFAULT_MEL_CHANNELS: usize = 80;
pub const DEFAULT_MEL_FMIN_HZ: f32 = 90.0;
pub const DEFAULT_MEL_FMAX_HZ: f32 = 7600.0;

/// Floor applied before every logarithm.
pub const LOG_FLOOR: f32 = 1e-5;

// Griffin-Lim phase reconstruction.
pub const GRIFFIN_LIM_ITERS: usize = 32;
pub const GRIFFIN_LIM_MOMENTUM: f32 = 0.99;

// Non-negative least squares used to invert the mel filterbank.
pub const NNLS_ITERS: usize = 64;
