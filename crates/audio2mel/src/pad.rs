//! Reflect padding and frame arithmetic shared by the mel and energy paths.

/// Map a (possibly out-of-range) index onto `0..n` by mirroring across the
/// edges without repeating the edge sample. Offsets longer than the signal
/// keep reflecting back and forth.
#[inline]
fn reflect_index(i: isize, n: usize) -> usize {
    if n == 1 {
        return 0;
    }
    let period = 2 * (n as isize - 1);
    let m = i.rem_euclid(period);
    if m >= n as isize {
        (period - m) as usize
    } else {
        m as usize
    }
}

/// Reflect-pad `samples` by `pad` on both ends.
///
/// `[1, 2, 3, 4]` padded by 2 becomes `[3, 2, 1, 2, 3, 4, 3, 2]`.
/// A single-sample signal is replicated; an empty signal is returned as-is.
#[must_use]
pub fn reflect_pad(samples: &[f32], pad: usize) -> Vec<f32> {
    let n = samples.len();
    if n == 0 || pad == 0 {
        return samples.to_vec();
    }

    let mut out = Vec::with_capacity(n + 2 * pad);
    let start = -(pad as isize);
    let end = (n + pad) as isize;
    for i in start..end {
        out.push(samples[reflect_index(i, n)]);
    }
    out
}

/// Number of full frames of length `frame_len` at stride `hop` in `len` samples.
#[inline]
#[must_use]
pub fn frame_count(len: usize, frame_len: usize, hop: usize) -> usize {
    if len < frame_len || hop == 0 {
        0
    } else {
        (len - frame_len) / hop + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reflect_excludes_edge_sample() {
        let padded = reflect_pad(&[1.0, 2.0, 3.0, 4.0], 2);
        assert_eq!(padded, vec![3.0, 2.0, 1.0, 2.0, 3.0, 4.0, 3.0, 2.0]);
    }

    #[test]
    fn reflect_longer_than_signal() {
        // Bounces back and forth: ... 2 1 2 3 2 1 [1 2 3] 2 1 2 3 2 ...
        let padded = reflect_pad(&[1.0, 2.0, 3.0], 5);
        assert_eq!(
            padded,
            vec![2.0, 1.0, 2.0, 3.0, 2.0, 1.0, 2.0, 3.0, 2.0, 1.0, 2.0, 3.0, 2.0]
        );
    }

    #[test]
    fn single_sample_is_replicated() {
        assert_eq!(reflect_pad(&[0.5], 3), vec![0.5; 7]);
    }

    #[test]
    fn empty_and_zero_pad() {
        assert!(reflect_pad(&[], 4).is_empty());
        assert_eq!(reflect_pad(&[1.0, 2.0], 0), vec![1.0, 2.0]);
    }

    #[test]
    fn frame_count_edges() {
        assert_eq!(frame_count(1023, 1024, 256), 0);
        assert_eq!(frame_count(1024, 1024, 256), 1);
        assert_eq!(frame_count(1279, 1024, 256), 1);
        assert_eq!(frame_count(1280, 1024, 256), 2);
    }
}
