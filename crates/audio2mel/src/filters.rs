//! Analysis window and Slaney mel filterbank construction.
//!
//! The filterbank matches librosa's `filters.mel(htk=False, norm="slaney")`:
//! - Slaney mel scale (linear below 1 kHz, logarithmic above)
//! - triangular filters between consecutive mel points
//! - area normalisation `2 / (f_upper - f_lower)`

use ndarray::Array2;

const F_SP: f64 = 200.0 / 3.0;
const MIN_LOG_HZ: f64 = 1000.0;
const MIN_LOG_MEL: f64 = MIN_LOG_HZ / F_SP;
// ln(6.4) / 27
const LOGSTEP: f64 = 0.068_751_777_420_949_12;

#[inline]
#[must_use]
pub fn hz_to_mel(freq: f64) -> f64 {
    if freq >= MIN_LOG_HZ {
        MIN_LOG_MEL + (freq / MIN_LOG_HZ).ln() / LOGSTEP
    } else {
        freq / F_SP
    }
}

#[inline]
#[must_use]
pub fn mel_to_hz(mel: f64) -> f64 {
    if mel >= MIN_LOG_MEL {
        MIN_LOG_HZ * (LOGSTEP * (mel - MIN_LOG_MEL)).exp()
    } else {
        mel * F_SP
    }
}

/// `n` frequencies (Hz) evenly spaced on the mel scale between `fmin` and `fmax`.
#[must_use]
pub fn mel_frequencies(n: usize, fmin: f64, fmax: f64) -> Vec<f64> {
    let mel_min = hz_to_mel(fmin);
    let mel_max = hz_to_mel(fmax);
    let denom = n.saturating_sub(1).max(1) as f64;
    (0..n)
        .map(|i| mel_to_hz(mel_min + (mel_max - mel_min) * (i as f64) / denom))
        .collect()
}

/// Periodic Hann window: `0.5 - 0.5 * cos(2*pi*n/N)`.
#[must_use]
pub fn hann_window(len: usize) -> Vec<f32> {
    let factor = 2.0 * std::f64::consts::PI / len as f64;
    (0..len)
        .map(|i| (0.5 - 0.5 * (i as f64 * factor).cos()) as f32)
        .collect()
}

/// Slaney-normalised mel filterbank of shape `[n_mels, n_fft / 2 + 1]`.
#[must_use]
pub fn mel_filterbank(
    sample_rate: u32,
    n_fft: usize,
    n_mels: usize,
    fmin: f64,
    fmax: f64,
) -> Array2<f32> {
    let n_freqs = n_fft / 2 + 1;
    let fft_freqs: Vec<f64> = (0..n_freqs)
        .map(|k| (k as f64) * f64::from(sample_rate) / (n_fft as f64))
        .collect();

    let mel_f = mel_frequencies(n_mels + 2, fmin, fmax);
    let fdiff: Vec<f64> = mel_f.windows(2).map(|w| w[1] - w[0]).collect();

    let mut weights = Array2::<f32>::zeros((n_mels, n_freqs));
    for (m, mut row) in weights.outer_iter_mut().enumerate() {
        let enorm = 2.0 / (mel_f[m + 2] - mel_f[m]);
        for (out, &freq) in row.iter_mut().zip(&fft_freqs) {
            let lower = (freq - mel_f[m]) / fdiff[m];
            let upper = (mel_f[m + 2] - freq) / fdiff[m + 1];
            let val = lower.min(upper).max(0.0);
            *out = (val * enorm) as f32;
        }
    }

    weights
}
