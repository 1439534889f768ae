//! Fractional-sample reads from circular delay buffers.
//!
//! A fractional delay asks for the signal value at a non-integer position.
//! [`sample_at`] answers with a 4-point cubic interpolation whose taps sit
//! entirely behind the requested position, so it is safe to call right up to
//! the write frontier of a delay line; the price is a constant latency of
//! [`LATENCY`] samples. [`sample_at_truncated`] is the low-quality
//! alternative: truncate to the nearest earlier sample, zero latency.
//!
//! Buffers are addressed as `buffer[(pos % len) * stride + channel]`, which
//! covers both plain mono buffers (`channel = 0`, `stride = 1`) and
//! interleaved multi-channel layouts.

/// Latency of the cubic interpolator in samples.
///
/// [`sample_at`] returns the signal value at `fpos - LATENCY`: the 4-tap
/// kernel is placed fully behind the read index and the interpolation point
/// falls between its two middle taps.
pub const LATENCY: usize = 2;

/// Extra delay-line headroom a caller must budget for interpolated reads.
pub const fn additional_delay_required() -> usize {
    LATENCY
}

#[inline]
fn tap(buffer: &[f32], channel: usize, stride: usize, len: usize, pos: usize) -> f32 {
    buffer[(pos % len) * stride + channel]
}

/// Reads the value at fractional position `fpos` in a circular buffer of
/// `len` frames using 4-point cubic interpolation.
///
/// The result corresponds to the signal at `fpos - LATENCY`; integer
/// positions reproduce stored samples exactly. `fpos` must be non-negative.
#[inline]
pub fn sample_at(buffer: &[f32], channel: usize, stride: usize, len: usize, fpos: f64) -> f32 {
    debug_assert!(fpos >= 0.0);
    debug_assert!(len >= 4);

    let base = fpos as usize;
    let t = (fpos - base as f64) as f32;

    // Taps at base-3 .. base; the interpolation runs between the middle pair,
    // hence the 2-sample latency.
    let pos = base % len;
    let y0 = tap(buffer, channel, stride, len, pos + len - 3);
    let y1 = tap(buffer, channel, stride, len, pos + len - 2);
    let y2 = tap(buffer, channel, stride, len, pos + len - 1);
    let y3 = tap(buffer, channel, stride, len, pos);

    let t2 = t * t;
    let t3 = t2 * t;

    let a0 = y3 - y2 - y0 + y1;
    let a1 = y0 - y1 - a0;
    let a2 = y2 - y0;

    a0 * t3 + a1 * t2 + a2 * t + y1
}

/// Low-quality read: the sample at `floor(fpos) mod len`, no interpolation
/// and no latency.
#[inline]
pub fn sample_at_truncated(
    buffer: &[f32],
    channel: usize,
    stride: usize,
    len: usize,
    fpos: f64,
) -> f32 {
    debug_assert!(fpos >= 0.0);
    tap(buffer, channel, stride, len, fpos as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_positions_reproduce_samples() {
        let buffer: Vec<f32> = (0..16).map(|i| (i * i) as f32).collect();
        for i in 0..16 {
            let fpos = (i + LATENCY) as f64;
            assert_eq!(sample_at(&buffer, 0, 1, 16, fpos), buffer[i]);
        }
    }

    #[test]
    fn test_cubic_midpoints_on_ramps() {
        // The kernel is exact at t = 0 and t = 0.5; in between it stays
        // within a fraction of one sample step on a linear ramp.
        let buffer: Vec<f32> = (0..32).map(|i| i as f32 * 0.5).collect();
        for k in [4.0, 7.5, 10.5, 20.5] {
            let expected = (k - LATENCY as f64) as f32 * 0.5;
            let got = sample_at(&buffer, 0, 1, 32, k);
            assert!((got - expected).abs() < 1e-5, "fpos {k}: {got} vs {expected}");
        }
        for k in [6.25, 13.75] {
            let expected = (k - LATENCY as f64) as f32 * 0.5;
            let got = sample_at(&buffer, 0, 1, 32, k);
            assert!((got - expected).abs() < 0.25, "fpos {k}: {got} vs {expected}");
        }
    }

    #[test]
    fn test_wraps_around_buffer_end() {
        let mut buffer = vec![0.0f32; 8];
        buffer[7] = 1.0;
        // Reading at position 7 + LATENCY = 9 wraps and lands on the impulse.
        assert_eq!(sample_at(&buffer, 0, 1, 8, 9.0), 1.0);
        // Positions past the buffer keep wrapping.
        assert_eq!(sample_at(&buffer, 0, 1, 8, 17.0), 1.0);
    }

    #[test]
    fn test_interleaved_channel_addressing() {
        // Two interleaved channels: left is a ramp, right its negation.
        let buffer: Vec<f32> = (0..10).flat_map(|i| [i as f32, -(i as f32)]).collect();
        let fpos = (6 + LATENCY) as f64;
        assert_eq!(sample_at(&buffer, 0, 2, 10, fpos), 6.0);
        assert_eq!(sample_at(&buffer, 1, 2, 10, fpos), -6.0);
    }

    #[test]
    fn test_truncated_read() {
        let buffer: Vec<f32> = (0..8).map(|i| i as f32).collect();
        assert_eq!(sample_at_truncated(&buffer, 0, 1, 8, 3.0), 3.0);
        assert_eq!(sample_at_truncated(&buffer, 0, 1, 8, 3.999), 3.0);
        assert_eq!(sample_at_truncated(&buffer, 0, 1, 8, 11.0), 3.0);
    }

    #[test]
    fn test_smooth_signal_midpoints() {
        let buffer: Vec<f32> = (0..64)
            .map(|i| (i as f32 * std::f32::consts::TAU / 32.0).sin())
            .collect();
        // Halfway between samples the cubic stays close to the true sine.
        for i in 8..24 {
            let fpos = i as f64 + 0.5 + LATENCY as f64;
            let expected = ((i as f32 + 0.5) * std::f32::consts::TAU / 32.0).sin();
            let got = sample_at(&buffer, 0, 1, 64, fpos);
            assert!((got - expected).abs() < 0.01, "i {i}: {got} vs {expected}");
        }
    }
}
