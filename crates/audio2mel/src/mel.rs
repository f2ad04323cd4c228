//! Log-mel spectrogram transform.
//!
//! `MelTransform` turns batches of mono waveforms into log-mel spectrograms,
//! reconstructs (approximately) a waveform from a log-mel spectrogram, and
//! estimates per-frame energy. Construction validates the configuration and
//! precomputes the Hann window, the Slaney mel filterbank and the FFT plans;
//! nothing is mutated afterwards, so one instance can be shared across threads.
//!
//! Pipeline for [`MelTransform::forward`]:
//! - reflect pad by `(fft_size - hop_length) / 2` on each side
//! - STFT with no implicit centering, magnitude
//! - mel projection, `ln(max(x, 1e-5))`
//! - optional normalisation `(x - ln(1e-5)) / -ln(1e-5)`

use ndarray::{Array1, Array2, Array3, ArrayView2, ArrayView3, ArrayViewD, Axis, Ix2, Ix3};
use thiserror::Error;

use crate::MelError;
use crate::constants::{GRIFFIN_LIM_ITERS, GRIFFIN_LIM_MOMENTUM, LOG_FLOOR, NNLS_ITERS};
use crate::filters::{hann_window, mel_filterbank};
use crate::griffin_lim::{griffin_lim, nnls};
use crate::pad::{frame_count, reflect_pad};
use crate::params::{ConfigError, MelParams};
use crate::stft::Stft;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ShapeError {
    #[error("expected a single audio channel, got {got}")]
    Channels { got: usize },
    #[error("expected a 1-D mono waveform, got {ndim} dimensions")]
    NotMono { ndim: usize },
    #[error("expected a mel spectrogram of rank 2 or 3, got rank {ndim}")]
    Rank { ndim: usize },
    #[error("expected {expected} mel channels, got {got}")]
    MelChannels { expected: usize, got: usize },
    #[error("batch is empty")]
    EmptyBatch,
    #[error("mel spectrogram has no frames")]
    NoFrames,
    #[error("signal of {samples} samples is too short, need at least {min_samples}")]
    TooShort { samples: usize, min_samples: usize },
}

#[derive(Debug)]
pub struct MelTransform {
    params: MelParams,
    min_mel: f32,
    window: Vec<f32>,        // [window_length]
    filterbank: Array2<f32>, // [mel_channels, fft_size / 2 + 1]
    stft: Stft,
}

impl MelTransform {
    pub fn new(params: MelParams) -> Result<Self, ConfigError> {
        params.validate()?;

        let window = hann_window(params.window_length);
        let filterbank = mel_filterbank(
            params.sample_rate,
            params.fft_size,
            params.mel_channels,
            f64::from(params.mel_fmin),
            f64::from(params.mel_fmax),
        );
        let empty = filterbank
            .outer_iter()
            .filter(|row| row.iter().all(|&v| v == 0.0))
            .count();
        if empty > 0 {
            tracing::warn!(
                empty,
                mel_channels = params.mel_channels,
                fft_size = params.fft_size,
                "mel filters without any FFT bin; use fewer mel channels or a larger FFT"
            );
        }

        let stft = Stft::new(params.fft_size, params.hop_length, &window);
        tracing::debug!(?params, "mel transform ready");

        Ok(Self {
            min_mel: LOG_FLOOR.ln(),
            params,
            window,
            filterbank,
            stft,
        })
    }

    #[must_use]
    pub fn params(&self) -> &MelParams {
        &self.params
    }

    /// `ln(1e-5)`: the log value that normalises to 0.
    #[must_use]
    pub fn min_mel(&self) -> f32 {
        self.min_mel
    }

    /// Hann window of length `window_length`.
    #[must_use]
    pub fn window(&self) -> &[f32] {
        &self.window
    }

    /// Mel filterbank, `[mel_channels, fft_size / 2 + 1]`.
    #[must_use]
    pub fn filterbank(&self) -> &Array2<f32> {
        &self.filterbank
    }

    #[must_use]
    pub fn stft(&self) -> &Stft {
        &self.stft
    }

    /// Frames produced by [`forward`](Self::forward) and
    /// [`get_energy`](Self::get_energy) for `samples` input samples.
    pub fn frame_count(&self, samples: usize) -> Result<usize, ShapeError> {
        let pad = self.params.pad_samples();
        let padded = if samples == 0 { 0 } else { samples + 2 * pad };
        match frame_count(padded, self.params.fft_size, self.params.hop_length) {
            0 => Err(ShapeError::TooShort {
                samples,
                min_samples: self.params.fft_size.saturating_sub(2 * pad).max(1),
            }),
            frames => Ok(frames),
        }
    }

    #[inline]
    fn log_scale(&self, v: f32, normalize: bool) -> f32 {
        let v = v.max(LOG_FLOOR).ln();
        if normalize {
            (v - self.min_mel) / -self.min_mel
        } else {
            v
        }
    }

    fn padded_rows(
        &self,
        audio: ArrayView3<'_, f32>,
    ) -> Result<(Vec<Vec<f32>>, usize), ShapeError> {
        let (_, channels, samples) = audio.dim();
        if channels != 1 {
            return Err(ShapeError::Channels { got: channels });
        }
        let frames = self.frame_count(samples)?;
        let pad = self.params.pad_samples();
        let rows = audio
            .index_axis(Axis(1), 0)
            .outer_iter()
            .map(|row| reflect_pad(&row.to_vec(), pad))
            .collect();
        Ok((rows, frames))
    }

    /// Log-mel spectrogram of `audio` (`[batch, 1, samples]`), shaped
    /// `[batch, mel_channels, frames]`.
    pub fn forward(
        &self,
        audio: ArrayView3<'_, f32>,
        normalize: bool,
    ) -> Result<Array3<f32>, ShapeError> {
        let (rows, frames) = self.padded_rows(audio)?;
        let mut out = Array3::<f32>::zeros((rows.len(), self.params.mel_channels, frames));

        for (padded, mut dst) in rows.iter().zip(out.outer_iter_mut()) {
            let magnitude = self.stft.magnitude(padded);
            debug_assert_eq!(magnitude.ncols(), frames);
            let mel = self.filterbank.dot(&magnitude);
            dst.zip_mut_with(&mel, |o, &m| *o = self.log_scale(m, normalize));
        }

        Ok(out)
    }

    /// Approximate waveform for a normalised log-mel spectrogram.
    ///
    /// Accepts `[mel_channels, frames]` or `[batch, mel_channels, frames]`;
    /// with a batch only the first item is reconstructed. The magnitude
    /// spectrum is recovered with non-negative least squares against the
    /// filterbank and the phase with Griffin-Lim, so the result is lossy.
    ///
    /// The output is the full overlap-add length, `fft_size + hop_length *
    /// (frames - 1)`; the reflect padding added by [`forward`](Self::forward)
    /// is not removed, so it starts `pad_samples()` ahead of the source.
    pub fn mel_to_audio(&self, mel: ArrayViewD<'_, f32>) -> Result<Array1<f32>, ShapeError> {
        let ndim = mel.ndim();
        let mel: ArrayView2<'_, f32> = match ndim {
            2 => mel
                .into_dimensionality::<Ix2>()
                .map_err(|_| ShapeError::Rank { ndim })?,
            3 => {
                let batch = mel
                    .into_dimensionality::<Ix3>()
                    .map_err(|_| ShapeError::Rank { ndim })?;
                match batch.len_of(Axis(0)) {
                    0 => return Err(ShapeError::EmptyBatch),
                    1 => {}
                    n => tracing::warn!(
                        batch = n,
                        "mel_to_audio reconstructs only the first batch item"
                    ),
                }
                batch.index_axis_move(Axis(0), 0)
            }
            _ => return Err(ShapeError::Rank { ndim }),
        };

        let (channels, frames) = mel.dim();
        if channels != self.params.mel_channels {
            return Err(ShapeError::MelChannels {
                expected: self.params.mel_channels,
                got: channels,
            });
        }
        if frames == 0 {
            return Err(ShapeError::NoFrames);
        }

        let min_mel = self.min_mel;
        let mel_power = mel.mapv(|v| (v * -min_mel + min_mel).exp().powi(2));
        let magnitude = nnls(&self.filterbank, &mel_power, NNLS_ITERS).mapv(f32::sqrt);
        let wave = griffin_lim(&self.stft, &magnitude, GRIFFIN_LIM_ITERS, GRIFFIN_LIM_MOMENTUM);
        tracing::debug!(frames, samples = wave.len(), "griffin-lim reconstruction");
        Ok(Array1::from(wave))
    }

    /// Per-frame log RMS energy of `audio` (`[batch, 1, samples]`), shaped
    /// `[batch, frames]` with the same frame count as [`forward`](Self::forward).
    ///
    /// Frame `t` covers the `window_length` samples the Hann window spans
    /// inside STFT frame `t`, i.e. it starts at `t * hop_length +
    /// (fft_size - window_length) / 2` in the padded signal. A plain sliding
    /// window starting at `t * hop_length` would yield more frames than the
    /// STFT whenever `window_length < fft_size`; with equal lengths the two
    /// coincide.
    pub fn get_energy(
        &self,
        audio: ArrayView3<'_, f32>,
        normalize: bool,
    ) -> Result<Array2<f32>, ShapeError> {
        let (rows, frames) = self.padded_rows(audio)?;
        let win = self.params.window_length;
        let hop = self.params.hop_length;
        let offset = (self.params.fft_size - win) / 2;

        let mut out = Array2::<f32>::zeros((rows.len(), frames));
        for (padded, mut dst) in rows.iter().zip(out.outer_iter_mut()) {
            for (t, e) in dst.iter_mut().enumerate() {
                let start = t * hop + offset;
                let frame = &padded[start..start + win];
                let rms = (frame.iter().map(|s| s * s).sum::<f32>() / win as f32).sqrt();
                *e = self.log_scale(rms, normalize);
            }
        }

        Ok(out)
    }

    /// Per-frame energy estimated from a log-mel spectrogram
    /// (`[batch, mel_channels, frames]`): `ln(mean(exp(mels)))` over the mel axis.
    ///
    /// Unlike [`get_energy`](Self::get_energy) no floor clamp or normalisation
    /// is applied; `_normalize` is accepted for signature parity and ignored.
    pub fn get_energy_mel(
        &self,
        mels: ArrayView3<'_, f32>,
        _normalize: bool,
    ) -> Result<Array2<f32>, ShapeError> {
        let channels = mels.len_of(Axis(1));
        if channels != self.params.mel_channels {
            return Err(ShapeError::MelChannels {
                expected: self.params.mel_channels,
                got: channels,
            });
        }

        let mean = mels
            .mapv(f32::exp)
            .mean_axis(Axis(1))
            .ok_or(ShapeError::MelChannels {
                expected: self.params.mel_channels,
                got: 0,
            })?;
        Ok(mean.mapv(f32::ln))
    }
}

/// Log-mel spectrogram `[mel_channels, frames]` of a single 1-D waveform.
///
/// Builds a transient [`MelTransform`] for `params`; nothing is kept between calls.
pub fn audio_to_mel(
    audio: ArrayViewD<'_, f32>,
    params: &MelParams,
    normalize: bool,
) -> Result<Array2<f32>, MelError> {
    if audio.ndim() != 1 {
        return Err(ShapeError::NotMono { ndim: audio.ndim() }.into());
    }

    let transform = MelTransform::new(params.clone())?;
    let batch = Array1::from_iter(audio.iter().copied())
        .insert_axis(Axis(0))
        .insert_axis(Axis(0));
    let mel = transform.forward(batch.view(), normalize)?;
    Ok(mel.index_axis_move(Axis(0), 0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array, IxDyn};

    fn small_params() -> MelParams {
        MelParams {
            fft_size: 256,
            hop_length: 64,
            window_length: 256,
            sample_rate: 8_000,
            mel_channels: 20,
            mel_fmin: 0.0,
            mel_fmax: 4_000.0,
        }
    }

    fn noise(len: usize, seed: u32) -> Vec<f32> {
        // xorshift; enough to avoid silent frames
        let mut s = seed.max(1);
        (0..len)
            .map(|_| {
                s ^= s << 13;
                s ^= s >> 17;
                s ^= s << 5;
                (s as f32 / u32::MAX as f32) * 2.0 - 1.0
            })
            .collect()
    }

    fn batch(rows: &[Vec<f32>]) -> Array3<f32> {
        let len = rows[0].len();
        let flat: Vec<f32> = rows.iter().flatten().copied().collect();
        Array3::from_shape_vec((rows.len(), 1, len), flat).expect("batch shape")
    }

    #[test]
    fn transform_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<MelTransform>();
    }

    #[test]
    fn rejects_invalid_config() {
        let params = MelParams {
            window_length: 512,
            ..small_params()
        };
        assert!(matches!(
            MelTransform::new(params),
            Err(ConfigError::WindowExceedsFft { .. })
        ));
    }

    #[test]
    fn forward_shape() {
        let t = MelTransform::new(small_params()).expect("transform");
        let audio = batch(&[noise(1000, 1), noise(1000, 2)]);
        let mel = t.forward(audio.view(), true).expect("forward");
        // padded = 1000 + 2 * 96 = 1192 -> (1192 - 256) / 64 + 1 = 15
        assert_eq!(mel.dim(), (2, 20, 15));
        assert_eq!(t.frame_count(1000), Ok(15));
    }

    #[test]
    fn batch_items_are_independent() {
        let t = MelTransform::new(small_params()).expect("transform");
        let a = noise(800, 3);
        let b = noise(800, 4);
        let both = t.forward(batch(&[a.clone(), b]).view(), true).expect("forward");
        let single = t.forward(batch(&[a]).view(), true).expect("forward");
        assert_eq!(both.index_axis(Axis(0), 0), single.index_axis(Axis(0), 0));
    }

    #[test]
    fn forward_rejects_stereo_and_short_input() {
        let t = MelTransform::new(small_params()).expect("transform");
        let stereo = Array3::<f32>::zeros((1, 2, 1000));
        assert_eq!(
            t.forward(stereo.view(), true).unwrap_err(),
            ShapeError::Channels { got: 2 }
        );

        // 2 * 96 padding; need 256 padded samples -> at least 64 input samples.
        let short = Array3::<f32>::zeros((1, 1, 63));
        assert_eq!(
            t.forward(short.view(), true).unwrap_err(),
            ShapeError::TooShort {
                samples: 63,
                min_samples: 64
            }
        );
        let empty = Array3::<f32>::zeros((1, 1, 0));
        assert!(matches!(
            t.get_energy(empty.view(), true),
            Err(ShapeError::TooShort { samples: 0, .. })
        ));
        assert_eq!(t.frame_count(64), Ok(1));
    }

    #[test]
    fn unnormalized_silence_sits_at_log_floor() {
        let t = MelTransform::new(small_params()).expect("transform");
        let audio = Array3::<f32>::zeros((1, 1, 500));
        let mel = t.forward(audio.view(), false).expect("forward");
        assert!(mel.iter().all(|&v| v == LOG_FLOOR.ln()));
        let energy = t.get_energy(audio.view(), false).expect("energy");
        assert!(energy.iter().all(|&v| v == t.min_mel()));
    }

    #[test]
    fn normalization_is_affine() {
        let t = MelTransform::new(small_params()).expect("transform");
        let audio = batch(&[noise(700, 9)]);
        let raw = t.forward(audio.view(), false).expect("forward");
        let norm = t.forward(audio.view(), true).expect("forward");
        let m = t.min_mel();
        for (&r, &n) in raw.iter().zip(norm.iter()) {
            assert!(((r - m) / -m - n).abs() < 1e-6);
        }
    }

    #[test]
    fn energy_of_constant_signal() {
        let t = MelTransform::new(small_params()).expect("transform");
        let audio = Array3::<f32>::from_elem((1, 1, 600), 0.5);
        let energy = t.get_energy(audio.view(), false).expect("energy");
        for &e in &energy {
            assert!((e - 0.5f32.ln()).abs() < 1e-5);
        }
    }

    #[test]
    fn energy_from_mel_is_log_mean_exp() {
        let t = MelTransform::new(small_params()).expect("transform");
        let mut mels = Array3::<f32>::zeros((1, 20, 3));
        mels.index_axis_mut(Axis(2), 1).fill(1.0);
        let e = t.get_energy_mel(mels.view(), true).expect("energy");
        assert_eq!(e.dim(), (1, 3));
        assert!(e[[0, 0]].abs() < 1e-6);
        assert!((e[[0, 1]] - 1.0).abs() < 1e-6);

        let wrong = Array3::<f32>::zeros((1, 7, 3));
        assert_eq!(
            t.get_energy_mel(wrong.view(), true).unwrap_err(),
            ShapeError::MelChannels {
                expected: 20,
                got: 7
            }
        );
    }

    #[test]
    fn mel_to_audio_shapes() {
        let t = MelTransform::new(small_params()).expect("transform");
        let audio = batch(&[noise(1000, 5)]);
        let mel = t.forward(audio.view(), true).expect("forward");

        // [batch, mels, frames] and [mels, frames] give the same reconstruction.
        let from_3d = t.mel_to_audio(mel.view().into_dyn()).expect("invert 3d");
        let from_2d = t
            .mel_to_audio(mel.index_axis(Axis(0), 0).into_dyn())
            .expect("invert 2d");
        assert_eq!(from_3d, from_2d);
        // 15 frames, no trimming: 256 + 64 * 14
        assert_eq!(from_3d.len(), 256 + 64 * 14);
        assert!(from_3d.iter().all(|v| v.is_finite()));

        let rank1 = Array::<f32, _>::zeros(IxDyn(&[20]));
        assert_eq!(
            t.mel_to_audio(rank1.view()).unwrap_err(),
            ShapeError::Rank { ndim: 1 }
        );
        let wrong = Array2::<f32>::zeros((10, 4));
        assert!(matches!(
            t.mel_to_audio(wrong.view().into_dyn()),
            Err(ShapeError::MelChannels { .. })
        ));
        let empty = Array3::<f32>::zeros((0, 20, 4));
        assert_eq!(
            t.mel_to_audio(empty.view().into_dyn()).unwrap_err(),
            ShapeError::EmptyBatch
        );
    }

    #[test]
    fn mel_to_audio_uses_first_batch_item_only() {
        let t = MelTransform::new(small_params()).expect("transform");
        let first = noise(1000, 21);
        let second = noise(1000, 22);

        let pair = t
            .forward(batch(&[first.clone(), second]).view(), true)
            .expect("forward");
        assert_eq!(pair.len_of(Axis(0)), 2);
        let single = t.forward(batch(&[first]).view(), true).expect("forward");

        let from_pair = t.mel_to_audio(pair.view().into_dyn()).expect("invert pair");
        let from_single = t.mel_to_audio(single.view().into_dyn()).expect("invert single");
        assert_eq!(from_pair, from_single);
    }

    #[test]
    fn audio_to_mel_requires_mono() {
        let params = small_params();
        let stereo = Array::<f32, _>::zeros(IxDyn(&[2, 500]));
        assert!(matches!(
            audio_to_mel(stereo.view(), &params, true),
            Err(MelError::Shape(ShapeError::NotMono { ndim: 2 }))
        ));

        let bad = MelParams {
            hop_length: 0,
            ..params.clone()
        };
        let mono = Array::<f32, _>::zeros(IxDyn(&[500]));
        assert!(matches!(
            audio_to_mel(mono.view(), &bad, true),
            Err(MelError::Config(_))
        ));
    }

    #[test]
    fn audio_to_mel_matches_forward() {
        let params = small_params();
        let signal = noise(900, 11);
        let mel = audio_to_mel(
            Array1::from(signal.clone()).view().into_dyn(),
            &params,
            true,
        )
        .expect("audio_to_mel");

        let t = MelTransform::new(params).expect("transform");
        let expected = t.forward(batch(&[signal]).view(), true).expect("forward");
        assert_eq!(mel, expected.index_axis(Axis(0), 0));
    }
}
