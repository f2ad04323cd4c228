//! Short-time Fourier transform without implicit centering, and its
//! overlap-add inverse.
//!
//! Frame `t` starts at `t * hop` and spans `n_fft` samples; callers pad the
//! signal themselves. A window shorter than `n_fft` is zero-padded on both
//! sides so it sits in the middle of the frame.

use std::fmt;
use std::sync::Arc;

use ndarray::Array2;
use rustfft::num_complex::Complex32;
use rustfft::{Fft, FftPlanner};

use crate::pad::frame_count;

pub struct Stft {
    n_fft: usize,
    hop: usize,
    window: Vec<f32>, // [n_fft], centred
    forward: Arc<dyn Fft<f32>>,
    inverse: Arc<dyn Fft<f32>>,
}

impl fmt::Debug for Stft {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stft")
            .field("n_fft", &self.n_fft)
            .field("hop", &self.hop)
            .finish_non_exhaustive()
    }
}

impl Stft {
    /// `window.len()` must not exceed `n_fft`.
    #[must_use]
    pub fn new(n_fft: usize, hop: usize, window: &[f32]) -> Self {
        debug_assert!(window.len() <= n_fft);
        let offset = (n_fft - window.len()) / 2;
        let mut padded = vec![0.0f32; n_fft];
        padded[offset..offset + window.len()].copy_from_slice(window);

        let mut planner = FftPlanner::<f32>::new();
        let forward = planner.plan_fft_forward(n_fft);
        let inverse = planner.plan_fft_inverse(n_fft);

        Self {
            n_fft,
            hop,
            window: padded,
            forward,
            inverse,
        }
    }

    #[must_use]
    pub fn n_fft(&self) -> usize {
        self.n_fft
    }

    #[must_use]
    pub fn hop(&self) -> usize {
        self.hop
    }

    #[must_use]
    pub fn freq_bins(&self) -> usize {
        self.n_fft / 2 + 1
    }

    /// The analysis window, zero-padded to `n_fft`.
    #[must_use]
    pub fn window(&self) -> &[f32] {
        &self.window
    }

    /// Number of frames produced for a signal of `len` samples.
    #[must_use]
    pub fn frames(&self, len: usize) -> usize {
        frame_count(len, self.n_fft, self.hop)
    }

    /// Complex spectrum `[n_fft / 2 + 1, frames]`.
    #[must_use]
    pub fn forward(&self, signal: &[f32]) -> Array2<Complex32> {
        let n_frames = self.frames(signal.len());
        let n_freqs = self.freq_bins();
        let mut out = Array2::<Complex32>::zeros((n_freqs, n_frames));

        let mut buf = vec![Complex32::new(0.0, 0.0); self.n_fft];
        let mut scratch =
            vec![Complex32::new(0.0, 0.0); self.forward.get_inplace_scratch_len()];

        for t in 0..n_frames {
            let frame = &signal[t * self.hop..t * self.hop + self.n_fft];
            for ((b, &s), &w) in buf.iter_mut().zip(frame).zip(&self.window) {
                *b = Complex32::new(s * w, 0.0);
            }
            self.forward.process_with_scratch(&mut buf, &mut scratch);
            for (k, &c) in buf[..n_freqs].iter().enumerate() {
                out[[k, t]] = c;
            }
        }

        out
    }

    /// Magnitude spectrum `[n_fft / 2 + 1, frames]`.
    #[must_use]
    pub fn magnitude(&self, signal: &[f32]) -> Array2<f32> {
        self.forward(signal).mapv(|c| c.norm())
    }

    /// Windowed overlap-add inverse of [`Stft::forward`].
    ///
    /// Output length is `n_fft + hop * (frames - 1)`. Samples are divided by
    /// the summed squared window wherever that sum is non-negligible.
    #[must_use]
    pub fn inverse(&self, spec: &Array2<Complex32>) -> Vec<f32> {
        let (n_freqs, n_frames) = spec.dim();
        debug_assert_eq!(n_freqs, self.freq_bins());
        if n_frames == 0 {
            return Vec::new();
        }

        let len = self.n_fft + self.hop * (n_frames - 1);
        let mut out = vec![0.0f32; len];
        let mut win_sq = vec![0.0f32; len];

        let n = self.n_fft;
        let scale = 1.0 / n as f32;
        let mut buf = vec![Complex32::new(0.0, 0.0); n];
        let mut scratch =
            vec![Complex32::new(0.0, 0.0); self.inverse.get_inplace_scratch_len()];

        for t in 0..n_frames {
            // Rebuild the Hermitian-symmetric full spectrum.
            for k in 0..n_freqs {
                buf[k] = spec[[k, t]];
            }
            buf[0].im = 0.0;
            if n % 2 == 0 {
                buf[n / 2].im = 0.0;
            }
            for k in n_freqs..n {
                buf[k] = buf[n - k].conj();
            }

            self.inverse.process_with_scratch(&mut buf, &mut scratch);

            let start = t * self.hop;
            for (i, (&c, &w)) in buf.iter().zip(&self.window).enumerate() {
                out[start + i] += c.re * scale * w;
                win_sq[start + i] += w * w;
            }
        }

        for (y, &ws) in out.iter_mut().zip(&win_sq) {
            if ws > f32::MIN_POSITIVE {
                *y /= ws;
            }
        }

        out
    }
}
