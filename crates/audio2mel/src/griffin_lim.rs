//! Phase reconstruction: mel filterbank inversion and Griffin-Lim.

use ndarray::{Array1, Array2, Zip};
use rustfft::num_complex::Complex32;

use crate::stft::Stft;

/// Largest eigenvalue of `a * a^T` (squared spectral norm of `a`), by power iteration.
fn spectral_norm_sq(a: &Array2<f32>) -> f32 {
    let gram = a.dot(&a.t());
    let mut v = Array1::<f32>::ones(gram.nrows());
    let mut lambda = 0.0f32;
    for _ in 0..64 {
        let w = gram.dot(&v);
        let norm = w.dot(&w).sqrt();
        if norm <= f32::MIN_POSITIVE {
            return 0.0;
        }
        lambda = v.dot(&w) / v.dot(&v);
        v = w / norm;
    }
    lambda
}

/// Solve `min ||A X - B||^2` subject to `X >= 0`, column by column.
///
/// Accelerated projected gradient (FISTA) with step `1 / ||A||^2`, starting
/// from zero. `a` is `[m, n]`, `b` is `[m, frames]`, the result is `[n, frames]`.
pub fn nnls(a: &Array2<f32>, b: &Array2<f32>, iters: usize) -> Array2<f32> {
    let n = a.ncols();
    let frames = b.ncols();
    let mut x = Array2::<f32>::zeros((n, frames));

    let lipschitz = spectral_norm_sq(a);
    if lipschitz <= 0.0 {
        return x;
    }
    let step = 1.0 / lipschitz;

    let at = a.t();
    let mut y = x.clone();
    let mut t = 1.0f32;
    for _ in 0..iters {
        let residual = a.dot(&y) - b;
        let grad = at.dot(&residual);

        let mut x_next = &y - &(grad * step);
        x_next.mapv_inplace(|v| v.max(0.0));

        let t_next = (1.0 + (1.0 + 4.0 * t * t).sqrt()) / 2.0;
        let beta = (t - 1.0) / t_next;
        y = &x_next + &((&x_next - &x) * beta);
        y.mapv_inplace(|v| v.max(0.0));

        x = x_next;
        t = t_next;
    }
    x
}

/// Estimate a waveform whose STFT magnitude approximates `magnitude`
/// (`[n_fft / 2 + 1, frames]`).
///
/// Fast Griffin-Lim: zero-phase start, `momentum`-weighted phase updates.
/// Output length is `n_fft + hop * (frames - 1)`.
pub fn griffin_lim(stft: &Stft, magnitude: &Array2<f32>, iters: usize, momentum: f32) -> Vec<f32> {
    let mut angles = magnitude.mapv(|_| Complex32::new(1.0, 0.0));
    let mut rebuilt: Option<Array2<Complex32>> = None;
    let accel = momentum / (1.0 + momentum);

    for _ in 0..iters {
        let prev = rebuilt.take();

        let spec = Zip::from(magnitude)
            .and(&angles)
            .map_collect(|&m, &a| a * m);
        let inverse = stft.inverse(&spec);
        let next = stft.forward(&inverse);

        angles.assign(&next);
        if let Some(prev) = &prev {
            Zip::from(&mut angles)
                .and(prev)
                .for_each(|a, &p| *a -= p * accel);
        }
        angles.mapv_inplace(|a| a / (a.norm() + 1e-16));

        rebuilt = Some(next);
    }

    let spec = Zip::from(magnitude)
        .and(&angles)
        .map_collect(|&m, &a| a * m);
    stft.inverse(&spec)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::hann_window;
    use ndarray::array;

    #[test]
    fn nnls_recovers_nonnegative_solution() {
        let a = array![[1.0f32, 0.0], [0.0, 2.0], [1.0, 1.0]];
        let x_true = array![[1.0f32], [3.0]];
        let b = a.dot(&x_true);
        let x = nnls(&a, &b, 500);
        assert!((x[[0, 0]] - 1.0).abs() < 1e-3, "{x:?}");
        assert!((x[[1, 0]] - 3.0).abs() < 1e-3, "{x:?}");
    }

    #[test]
    fn nnls_clamps_negative_directions() {
        // Unconstrained optimum is x = -1; the constrained one is 0.
        let a = array![[1.0f32]];
        let b = array![[-1.0f32, 2.0]];
        let x = nnls(&a, &b, 200);
        assert_eq!(x[[0, 0]], 0.0);
        assert!((x[[0, 1]] - 2.0).abs() < 1e-4);
    }

    #[test]
    fn nnls_zero_matrix() {
        let a = Array2::<f32>::zeros((3, 4));
        let b = Array2::<f32>::ones((3, 2));
        assert!(nnls(&a, &b, 10).iter().all(|&v| v == 0.0));
    }

    #[test]
    fn griffin_lim_output_length() {
        let stft = Stft::new(256, 64, &hann_window(256));
        let mag = Array2::<f32>::ones((129, 10));
        let y = griffin_lim(&stft, &mag, 4, 0.99);
        assert_eq!(y.len(), 256 + 64 * 9);
        assert!(y.iter().all(|v| v.is_finite()));
    }
}
