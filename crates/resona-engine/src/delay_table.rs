//! Per-IR delay pairs.
//!
//! Each impulse response can carry a delay split into a *dynamic* part,
//! scaled by the manager-wide delay scale (e.g. for interaural time
//! difference adjustment), and a *fixed* part applied as-is. The effective
//! delay of IR `i` is `fixed + scale * dynamic`, in samples.

use resona_io::SofaData;

/// Delay pair for one impulse response, in samples.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct IrDelay {
    /// Part scaled by the manager's delay scale.
    pub dynamic: f64,
    /// Static part, never scaled.
    pub fixed: f64,
}

/// Delay pairs for a filter library, parallel to the library's indices.
///
/// An empty table means "no delay data": every IR gets an effective delay
/// of 0. A non-empty table is expected to match the library length.
#[derive(Debug, Clone, Default)]
pub struct DelayTable {
    entries: Vec<IrDelay>,
    max_delay: f64,
}

impl DelayTable {
    /// An empty table (all delays 0).
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a table from `(dynamic, static)` pairs in samples, as read
    /// from a delay text file.
    pub fn from_pairs<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (f64, f64)>,
    {
        let entries: Vec<IrDelay> = pairs
            .into_iter()
            .map(|(dynamic, fixed)| IrDelay { dynamic, fixed })
            .collect();
        let max_delay = entries
            .iter()
            .map(|d| d.dynamic + d.fixed)
            .fold(0.0, f64::max);

        Self { entries, max_delay }
    }

    /// Builds a table from parallel dynamic/static arrays in samples.
    ///
    /// # Panics
    ///
    /// Panics if the arrays differ in length.
    pub fn from_parts(dynamic: &[f64], fixed: &[f64]) -> Self {
        assert_eq!(dynamic.len(), fixed.len(), "delay array length mismatch");
        Self::from_pairs(dynamic.iter().copied().zip(fixed.iter().copied()))
    }

    /// Builds a table from a SOFA measurement set.
    ///
    /// Iterates measurements, receivers, emitters in the same order the
    /// filter loader does, so entry `m*nr*ne + r*ne + e` belongs to the
    /// filter at the same library index. Delays are converted from seconds
    /// to samples; per emitter, the mean over all `(measurement, receiver)`
    /// pairs becomes the static part and the remainder the dynamic part, so
    /// scaling stretches arrival-time differences around each emitter's
    /// mean.
    // TODO: weight the emitter mean by quadrature weights of the
    // measurement positions instead of uniformly.
    pub fn from_sofa(sofa: &SofaData) -> Self {
        let nm = sofa.num_measurements();
        let nr = sofa.num_receivers();
        let ne = sofa.num_emitters();
        let sr = sofa.sample_rate();

        let mut raw = Vec::with_capacity(nm * nr * ne);
        let mut sums = vec![0.0f64; ne];
        let mut max_delay = 0.0f64;

        for m in 0..nm {
            for r in 0..nr {
                for e in 0..ne {
                    let delay = sofa.delay_seconds(m, r, e) * sr;
                    raw.push(delay);
                    sums[e] += delay;
                    max_delay = max_delay.max(delay);
                }
            }
        }

        let means: Vec<f64> = sums.iter().map(|s| s / (nm * nr) as f64).collect();

        let entries = raw
            .iter()
            .enumerate()
            .map(|(i, &delay)| {
                let mean = means[i % ne];
                IrDelay {
                    dynamic: delay - mean,
                    fixed: mean,
                }
            })
            .collect();

        Self { entries, max_delay }
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Effective delay of IR `index` in samples: `fixed + scale * dynamic`.
    ///
    /// Out-of-range indices (including every index of an empty table) yield
    /// 0.
    pub fn delay(&self, index: usize, scale: f64) -> f64 {
        self.entries
            .get(index)
            .map_or(0.0, |d| d.fixed + scale * d.dynamic)
    }

    /// Largest unscaled delay (`dynamic + fixed`) seen at load time.
    pub fn max_delay(&self) -> f64 {
        self.max_delay
    }

    /// The raw entry at `index`, if present.
    pub fn entry(&self, index: usize) -> Option<IrDelay> {
        self.entries.get(index).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_table_yields_zero() {
        let table = DelayTable::new();
        assert!(table.is_empty());
        assert_eq!(table.delay(0, 1.0), 0.0);
        assert_eq!(table.max_delay(), 0.0);
    }

    #[test]
    fn test_delay_scaling() {
        let table = DelayTable::from_parts(&[3.0], &[5.0]);
        assert_eq!(table.delay(0, 1.0), 8.0);
        assert_eq!(table.delay(0, 2.0), 11.0);
        assert_eq!(table.delay(0, 0.0), 5.0);
        // Out of range is 0 regardless of scale.
        assert_eq!(table.delay(1, 2.0), 0.0);
    }

    #[test]
    fn test_max_delay_tracks_unscaled_sum() {
        let table = DelayTable::from_pairs([(1.0, 2.0), (10.0, 5.0), (0.0, 7.0)]);
        assert_eq!(table.len(), 3);
        assert_eq!(table.max_delay(), 15.0);
    }

    #[test]
    fn test_from_sofa_splits_mean() {
        // 2 measurements, 1 receiver, 2 emitters at 1 kHz; delays in ms so
        // the sample values are easy: e0 sees 10 and 30, e1 sees 20 and 20.
        let irs = vec![0.0f32; 2 * 1 * 2 * 1];
        let delays = vec![0.010f32, 0.020, 0.030, 0.020];
        let sofa = SofaData::new(2, 1, 2, 2, 1000.0, 1, irs, delays).unwrap();

        let table = DelayTable::from_sofa(&sofa);
        assert_eq!(table.len(), 4);

        // Emitter 0: mean 20, dynamics -10 and +10. Emitter 1: mean 20,
        // dynamics 0. Tolerances absorb the f32 storage of the seconds.
        let e = |i: usize| table.entry(i).unwrap();
        assert!((e(0).fixed - 20.0).abs() < 1e-4 && (e(0).dynamic + 10.0).abs() < 1e-4);
        assert!((e(2).fixed - 20.0).abs() < 1e-4 && (e(2).dynamic - 10.0).abs() < 1e-4);
        assert!((e(1).fixed - 20.0).abs() < 1e-4 && e(1).dynamic.abs() < 1e-4);
        assert!((e(3).fixed - 20.0).abs() < 1e-4 && e(3).dynamic.abs() < 1e-4);

        assert!((table.max_delay() - 30.0).abs() < 1e-4);
    }

    #[test]
    fn test_from_sofa_dynamic_sums_to_zero() {
        // Arbitrary delays: per emitter, the dynamic parts must cancel.
        let nm = 3;
        let nr = 2;
        let ne = 2;
        let irs = vec![0.0f32; nm * nr * ne];
        let delays: Vec<f32> = (0..nm * nr * ne).map(|i| 0.001 * (i * i % 7) as f32).collect();
        let sofa = SofaData::new(nm, nr, ne, nm, 48000.0, 1, irs, delays).unwrap();

        let table = DelayTable::from_sofa(&sofa);
        for e in 0..ne {
            let sum: f64 = (0..nm * nr)
                .map(|mr| table.entry(mr * ne + e).unwrap().dynamic)
                .sum();
            assert!(sum.abs() < 1e-6, "emitter {e}: {sum}");
        }
    }

    #[test]
    #[should_panic]
    fn test_from_parts_length_mismatch_panics() {
        DelayTable::from_parts(&[1.0, 2.0], &[1.0]);
    }
}
