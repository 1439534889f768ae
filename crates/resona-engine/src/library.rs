//! The filter library: partitioned filters built from IR sources.
//!
//! All filters in the library share one block size and one partition count,
//! so any of them can be installed into any worker. Filters are handed out
//! as `Arc`s: workers alias them read-only, and a rebuilt library simply
//! drops its references while in-flight clones keep old filters alive until
//! the last worker lets go.

use resona_core::{ConvContext, FadeSpec, Filter};
use resona_io::{IrWavFile, Result, SofaData};
use std::path::Path;
use std::sync::Arc;

/// Owns the partitioned filters a manager renders with.
///
/// Indices are stable for the life of a load: filter `i` keeps meaning the
/// same IR until the library is rebuilt.
pub struct FilterLibrary {
    ctx: Arc<ConvContext>,
    filters: Vec<Arc<Filter>>,
    partitions: usize,
}

impl FilterLibrary {
    /// Creates an empty library over the given convolution context.
    pub fn new(ctx: Arc<ConvContext>) -> Self {
        Self {
            ctx,
            filters: Vec::new(),
            partitions: 0,
        }
    }

    /// The shared convolution context.
    pub fn context(&self) -> &Arc<ConvContext> {
        &self.ctx
    }

    /// Removes all filters.
    pub fn clear(&mut self) {
        self.reset(0);
    }

    /// Clears the library and fixes the partition count for the filters
    /// about to be added.
    pub(crate) fn reset(&mut self, partitions: usize) {
        self.filters.clear();
        self.partitions = partitions;
    }

    /// Appends a filter, returning its index.
    pub(crate) fn push(&mut self, filter: Filter) -> usize {
        self.filters.push(Arc::new(filter));
        self.filters.len() - 1
    }

    /// Builds one filter per IR from contiguous raw sample data:
    /// `num_irs` responses of `ir_length` samples each, back to back.
    ///
    /// Replaces the library contents. `sample_rate` converts the fade times
    /// to samples.
    ///
    /// # Panics
    ///
    /// Panics if `ir_data` is shorter than `num_irs * ir_length`.
    pub fn create_irs(
        &mut self,
        ir_data: &[f32],
        num_irs: usize,
        ir_length: usize,
        fade: &FadeSpec,
        sample_rate: f64,
    ) {
        assert!(
            ir_data.len() >= num_irs * ir_length,
            "IR data holds {} samples, need {}",
            ir_data.len(),
            num_irs * ir_length
        );

        self.clear();
        if num_irs == 0 || ir_length == 0 {
            return;
        }

        let trim = fade.trim(sample_rate, ir_length, self.ctx.block_size());
        let windows = fade.windows(sample_rate);
        self.partitions = trim.partitions;

        log::debug!(
            "creating {num_irs} filters of {} samples ({} partitions)",
            trim.len,
            trim.partitions
        );

        let mut buffer = vec![0.0f32; trim.len];
        for i in 0..num_irs {
            let ir = &ir_data[i * ir_length..(i + 1) * ir_length];
            buffer.copy_from_slice(&ir[trim.start..trim.start + trim.len]);
            windows.apply(&mut buffer);
            self.filters.push(Arc::new(Filter::new(&self.ctx, &buffer)));
        }
    }

    /// Loads a WAV file, one filter per channel.
    ///
    /// Replaces the library contents; on error the library is left empty.
    pub fn load_wav<P: AsRef<Path>>(&mut self, path: P, fade: &FadeSpec) -> Result<()> {
        self.clear();

        let wav = IrWavFile::open(path)?;
        let trim = fade.trim(wav.sample_rate(), wav.frames(), self.ctx.block_size());
        let windows = fade.windows(wav.sample_rate());
        self.partitions = trim.partitions;

        log::debug!(
            "file has {} channels of {} frames, trimmed to {} samples ({} partitions)",
            wav.channels(),
            wav.frames(),
            trim.len,
            trim.partitions
        );

        let mut buffer = vec![0.0f32; trim.len];
        for channel in 0..wav.channels() {
            wav.extract_channel(channel, trim.start, &mut buffer);
            windows.apply(&mut buffer);
            self.filters.push(Arc::new(Filter::new(&self.ctx, &buffer)));
        }

        Ok(())
    }

    /// Loads a SOFA measurement set, one filter per
    /// `(measurement, receiver, emitter)` tuple.
    ///
    /// The iteration runs measurements outermost and emitters innermost, so
    /// the filter at library index `m*nr*ne + r*ne + e` is the IR at that
    /// tuple — the same layout the delay table uses.
    pub fn load_sofa(&mut self, sofa: &SofaData, fade: &FadeSpec) {
        self.clear();

        let trim = fade.trim(sofa.sample_rate(), sofa.ir_length(), self.ctx.block_size());
        let windows = fade.windows(sofa.sample_rate());
        self.partitions = trim.partitions;

        let (nm, nr, ne) = (
            sofa.num_measurements(),
            sofa.num_receivers(),
            sofa.num_emitters(),
        );
        log::debug!(
            "creating {} filters of {} samples ({} partitions)",
            nm * nr * ne,
            trim.len,
            trim.partitions
        );

        let mut buffer = vec![0.0f32; trim.len];
        for m in 0..nm {
            for r in 0..nr {
                for e in 0..ne {
                    let ir = sofa.ir(sofa.offset(m, r, e));
                    buffer.copy_from_slice(&ir[trim.start..trim.start + trim.len]);
                    windows.apply(&mut buffer);
                    self.filters.push(Arc::new(Filter::new(&self.ctx, &buffer)));
                }
            }
        }
    }

    /// The filter at `index`, if present.
    pub fn get(&self, index: usize) -> Option<&Arc<Filter>> {
        self.filters.get(index)
    }

    /// Number of filters.
    pub fn len(&self) -> usize {
        self.filters.len()
    }

    /// Whether the library holds no filters.
    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Partition count shared by all filters of the current load.
    pub fn partitions(&self) -> usize {
        self.partitions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn library(block: usize) -> FilterLibrary {
        FilterLibrary::new(Arc::new(ConvContext::new(block)))
    }

    #[test]
    fn test_create_irs_from_raw_data() {
        let mut lib = library(4);
        // Two IRs of 6 samples each.
        let data: Vec<f32> = (0..12).map(|i| i as f32).collect();
        lib.create_irs(&data, 2, 6, &FadeSpec::NONE, 48000.0);

        assert_eq!(lib.len(), 2);
        assert_eq!(lib.partitions(), 2);
        assert_eq!(lib.get(0).unwrap().partitions(), 2);
        assert!(lib.get(2).is_none());
    }

    #[test]
    fn test_create_irs_zero_count_clears() {
        let mut lib = library(4);
        lib.create_irs(&[1.0, 0.0, 0.0, 0.0], 1, 4, &FadeSpec::NONE, 48000.0);
        assert_eq!(lib.len(), 1);

        lib.create_irs(&[], 0, 0, &FadeSpec::NONE, 48000.0);
        assert!(lib.is_empty());
        assert_eq!(lib.partitions(), 0);
    }

    #[test]
    fn test_create_irs_applies_trim() {
        let mut lib = library(4);
        // Keep 4 samples starting at sample 2 (sample rate 1 Hz makes the
        // fade times read as sample counts).
        let fade = FadeSpec {
            fade_in_start: 2.0,
            fade_in_length: 0.0,
            fade_out_start: 0.0,
            fade_out_length: 6.0,
        };
        let data: Vec<f32> = (0..10).map(|i| i as f32).collect();
        lib.create_irs(&data, 1, 10, &fade, 1.0);

        assert_eq!(lib.len(), 1);
        assert_eq!(lib.partitions(), 1);
        assert_eq!(lib.get(0).unwrap().partitions(), 1);
    }

    #[test]
    fn test_load_sofa_ordering() {
        let mut lib = library(4);
        // 2 measurements, 1 receiver, 2 emitters, IR length 4.
        let mut irs = Vec::new();
        for m in 0..2 {
            for _r in 0..1 {
                for e in 0..2 {
                    let mut ir = [0.0f32; 4];
                    ir[0] = (10 * m + e) as f32;
                    irs.extend(ir);
                }
            }
        }
        let sofa = SofaData::new(2, 1, 2, 0, 48000.0, 4, irs, Vec::new()).unwrap();
        lib.load_sofa(&sofa, &FadeSpec::NONE);

        assert_eq!(lib.len(), 4);
        assert_eq!(lib.partitions(), 1);
    }

    #[test]
    fn test_load_wav_missing_file_leaves_empty() {
        let mut lib = library(4);
        lib.create_irs(&[1.0, 0.0, 0.0, 0.0], 1, 4, &FadeSpec::NONE, 48000.0);
        assert!(lib.load_wav("/nonexistent/ir.wav", &FadeSpec::NONE).is_err());
        assert!(lib.is_empty());
    }
}
