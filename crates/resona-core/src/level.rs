//! Short-window level estimation for impulse responses.

/// Window length, in samples, of the sliding energy sum (10 ms at 48 kHz).
const WINDOW: usize = 480;

/// Estimates a representative level for a filter.
///
/// Runs a sliding sum of squares over a 480-sample window and returns the
/// RMS of the loudest window position. The reciprocal is a reasonable
/// normalization gain for the filter.
///
/// Returns 0 for an empty buffer.
pub fn estimate_level(data: &[f32]) -> f32 {
    if data.is_empty() {
        return 0.0;
    }

    let mut sum = 0.0f32;
    let mut max = 0.0f32;

    for (i, &x) in data.iter().enumerate() {
        sum += x * x;
        if i >= WINDOW {
            let old = data[i - WINDOW];
            sum -= old * old;
        }
        max = max.max(sum);
    }

    (max / WINDOW.min(data.len()) as f32).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_is_zero() {
        assert_eq!(estimate_level(&[]), 0.0);
    }

    #[test]
    fn test_constant_signal() {
        // A long constant signal fills the window completely: RMS = value.
        let data = vec![0.5f32; 2 * WINDOW];
        let level = estimate_level(&data);
        assert!((level - 0.5).abs() < 1e-4, "{level}");
    }

    #[test]
    fn test_short_buffer_normalizes_by_length() {
        // A single unit sample in a 4-sample buffer: max sum 1, window 4.
        let level = estimate_level(&[1.0, 0.0, 0.0, 0.0]);
        assert!((level - 0.5).abs() < 1e-6, "{level}");
    }

    #[test]
    fn test_picks_loudest_window() {
        let mut data = vec![0.0f32; 4 * WINDOW];
        // A quiet early region and a louder late region.
        data[0] = 0.1;
        for s in &mut data[2 * WINDOW..2 * WINDOW + 100] {
            *s = 1.0;
        }
        let level = estimate_level(&data);
        let expected = (100.0f32 / WINDOW as f32).sqrt();
        assert!((level - expected).abs() < 1e-4, "{level} vs {expected}");
    }
}
