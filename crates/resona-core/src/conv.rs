//! Uniformly partitioned frequency-domain block convolution.
//!
//! An impulse response is split into block-sized partitions and each
//! partition is stored as the spectrum of a zero-padded segment
//! ([`Filter`]). A [`BlockConvolver`] keeps the spectra of the most recent
//! input windows (one per partition slot) and produces one output block per
//! input block by multiply-accumulating the two sets and inverse
//! transforming the sum, so the processing latency is exactly one block.
//!
//! The overlap handling is overlap-save: each input window spans the
//! previous and the current block (`2 * block_size` samples) and the valid
//! second half of the inverse transform is the output. All state that
//! depends on the *filter* therefore lives in the [`Filter`] itself, which
//! is what makes [`BlockConvolver::crossfade_filter`] exact — the outgoing
//! and incoming filter are both run over the same input history and their
//! outputs blended linearly across a single block.
//!
//! Shared FFT plans live in a [`ConvContext`]; [`Filter`]s are immutable and
//! may be aliased by any number of convolvers.

use realfft::{ComplexToReal, RealFftPlanner, RealToComplex};
use rustfft::num_complex::Complex;
use std::sync::Arc;
use thiserror::Error;

/// Errors raised when a [`Filter`] does not fit a [`BlockConvolver`].
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ConvError {
    /// The filter was built against a context with a different block size.
    #[error("filter built for block size {filter} but convolver runs at {expected}")]
    BlockSizeMismatch {
        /// Block size the filter was partitioned with.
        filter: usize,
        /// Block size of the rejecting convolver.
        expected: usize,
    },

    /// The filter has more partitions than the convolver holds history for.
    #[error("filter needs {filter} partitions but convolver holds {capacity}")]
    TooManyPartitions {
        /// Partition count of the filter.
        filter: usize,
        /// Partition capacity of the rejecting convolver.
        capacity: usize,
    },
}

/// Shared FFT plans for one block size.
///
/// The transform length is `2 * block_size` (one block of history plus the
/// current block). One context is shared by a filter library and all of its
/// convolvers.
pub struct ConvContext {
    block_size: usize,
    fft_size: usize,
    bins: usize,
    forward: Arc<dyn RealToComplex<f32>>,
    inverse: Arc<dyn ComplexToReal<f32>>,
}

impl ConvContext {
    /// Plans forward and inverse transforms for the given block size.
    ///
    /// # Panics
    ///
    /// Panics if `block_size` is 0.
    pub fn new(block_size: usize) -> Self {
        assert!(block_size > 0, "block size must be > 0");

        let fft_size = 2 * block_size;
        let mut planner = RealFftPlanner::<f32>::new();

        Self {
            block_size,
            fft_size,
            bins: fft_size / 2 + 1,
            forward: planner.plan_fft_forward(fft_size),
            inverse: planner.plan_fft_inverse(fft_size),
        }
    }

    /// Block size the plans were built for.
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    fn empty_spectrum(&self) -> Vec<Complex<f32>> {
        vec![Complex::new(0.0, 0.0); self.bins]
    }
}

impl std::fmt::Debug for ConvContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConvContext")
            .field("block_size", &self.block_size)
            .finish()
    }
}

/// Immutable frequency-domain representation of one impulse response,
/// partitioned for a fixed block size.
///
/// Built once by a filter library and shared read-only (via `Arc`) by any
/// number of convolvers.
#[derive(Debug, Clone)]
pub struct Filter {
    block_size: usize,
    segments: Vec<Vec<Complex<f32>>>,
}

impl Filter {
    /// Partitions `data` into block-sized segments and transforms each.
    pub fn new(ctx: &ConvContext, data: &[f32]) -> Self {
        let mut time = vec![0.0f32; ctx.fft_size];
        let mut segments = Vec::with_capacity(data.len().div_ceil(ctx.block_size));

        for chunk in data.chunks(ctx.block_size) {
            time[..chunk.len()].copy_from_slice(chunk);
            time[chunk.len()..].fill(0.0);

            let mut segment = ctx.empty_spectrum();
            // Infallible: buffer lengths are fixed by the context.
            ctx.forward.process(&mut time, &mut segment).unwrap();
            segments.push(segment);
        }

        Self {
            block_size: ctx.block_size,
            segments,
        }
    }

    /// Number of partitions (blocks) this filter spans.
    pub fn partitions(&self) -> usize {
        self.segments.len()
    }

    /// Block size this filter was partitioned with.
    pub fn block_size(&self) -> usize {
        self.block_size
    }
}

/// Streaming partitioned convolver for one channel.
///
/// Holds the spectra of the last `partitions` input windows and the
/// currently installed [`Filter`]. [`filter_block`](Self::filter_block)
/// consumes exactly one block of input and produces one block of output.
pub struct BlockConvolver {
    ctx: Arc<ConvContext>,
    capacity: usize,
    /// Ring of input-window spectra, newest at `current`.
    history: Vec<Vec<Complex<f32>>>,
    current: usize,
    /// Sliding time-domain window: previous block followed by current block.
    window: Vec<f32>,
    filter: Option<Arc<Filter>>,
    /// Outgoing filter during a one-block crossfade.
    fade_from: Option<Arc<Filter>>,
    spectrum: Vec<Complex<f32>>,
    time: Vec<f32>,
    time_fade: Vec<f32>,
}

impl BlockConvolver {
    /// Creates a convolver with history for `partitions` partitions.
    ///
    /// A convolver with zero partitions is valid and outputs silence.
    pub fn new(ctx: Arc<ConvContext>, partitions: usize) -> Self {
        let history = (0..partitions).map(|_| ctx.empty_spectrum()).collect();
        let spectrum = ctx.empty_spectrum();
        let fft_size = ctx.fft_size;

        Self {
            ctx,
            capacity: partitions,
            history,
            current: 0,
            window: vec![0.0; fft_size],
            filter: None,
            fade_from: None,
            spectrum,
            time: vec![0.0; fft_size],
            time_fade: vec![0.0; fft_size],
        }
    }

    /// Partition capacity of this convolver.
    pub fn partitions(&self) -> usize {
        self.capacity
    }

    fn check(&self, filter: &Filter) -> Result<(), ConvError> {
        if filter.block_size != self.ctx.block_size {
            return Err(ConvError::BlockSizeMismatch {
                filter: filter.block_size,
                expected: self.ctx.block_size,
            });
        }
        if filter.partitions() > self.capacity {
            return Err(ConvError::TooManyPartitions {
                filter: filter.partitions(),
                capacity: self.capacity,
            });
        }
        Ok(())
    }

    /// Installs `filter` immediately, replacing any previous filter without
    /// blending. Any crossfade in flight is cancelled.
    pub fn set_filter(&mut self, filter: &Arc<Filter>) -> Result<(), ConvError> {
        self.check(filter)?;
        self.filter = Some(Arc::clone(filter));
        self.fade_from = None;
        Ok(())
    }

    /// Schedules a crossfade to `filter`: the next processed block is
    /// computed under both the currently sounding filter and `filter`, and
    /// the two outputs are blended linearly across that one block.
    /// Subsequent blocks use `filter` alone.
    pub fn crossfade_filter(&mut self, filter: &Arc<Filter>) -> Result<(), ConvError> {
        self.check(filter)?;

        match self.filter.take() {
            Some(prev) if Arc::ptr_eq(&prev, filter) => {
                self.filter = Some(prev);
            }
            Some(prev) => {
                // If a crossfade is already pending, keep fading from the
                // filter that is actually sounding.
                self.fade_from.get_or_insert(prev);
                self.filter = Some(Arc::clone(filter));
            }
            None => {
                self.filter = Some(Arc::clone(filter));
            }
        }
        Ok(())
    }

    /// Convolves one input block, writing exactly one block of output.
    ///
    /// With no filter installed the output is zeroed; input history is
    /// accumulated regardless, so a later filter change behaves as if the
    /// filter had heard the past input.
    pub fn filter_block(&mut self, input: &[f32], output: &mut [f32]) {
        let block = self.ctx.block_size;
        debug_assert_eq!(input.len(), block);
        debug_assert_eq!(output.len(), block);

        if self.capacity == 0 {
            output.fill(0.0);
            return;
        }

        // Slide the window and push the new window's spectrum into the ring.
        self.window.copy_within(block.., 0);
        self.window[block..].copy_from_slice(input);
        self.current = (self.current + self.capacity - 1) % self.capacity;

        self.time.copy_from_slice(&self.window);
        if self
            .ctx
            .forward
            .process(&mut self.time, &mut self.history[self.current])
            .is_err()
        {
            output.fill(0.0);
            return;
        }

        let Some(filter) = self.filter.clone() else {
            self.fade_from = None;
            output.fill(0.0);
            return;
        };

        let norm = 1.0 / self.ctx.fft_size as f32;

        match self.fade_from.take() {
            None => {
                self.accumulate(&filter);
                if self.inverse_into_time(false).is_err() {
                    output.fill(0.0);
                    return;
                }
                for (out, &y) in output.iter_mut().zip(&self.time[block..]) {
                    *out = y * norm;
                }
            }
            Some(outgoing) => {
                self.accumulate(&outgoing);
                let fade_ok = self.inverse_into_time(true).is_ok();
                self.accumulate(&filter);
                if self.inverse_into_time(false).is_err() || !fade_ok {
                    output.fill(0.0);
                    return;
                }

                let old = &self.time_fade[block..];
                let new = &self.time[block..];
                for (i, out) in output.iter_mut().enumerate() {
                    let t = i as f32 / block as f32;
                    *out = ((1.0 - t) * old[i] + t * new[i]) * norm;
                }
            }
        }
    }

    /// Sums `history[n-p] * segment[p]` over all partitions of `filter`
    /// into the spectrum scratch buffer.
    fn accumulate(&mut self, filter: &Filter) {
        self.spectrum.fill(Complex::new(0.0, 0.0));

        for (p, segment) in filter.segments.iter().enumerate() {
            let window = &self.history[(self.current + p) % self.capacity];
            for ((acc, &w), &h) in self.spectrum.iter_mut().zip(window).zip(segment) {
                *acc += w * h;
            }
        }

        // Products of r2c spectra keep DC and Nyquist purely real; pin them
        // so the c2r transform's input contract holds exactly.
        self.spectrum[0].im = 0.0;
        let last = self.spectrum.len() - 1;
        self.spectrum[last].im = 0.0;
    }

    /// Inverse transforms the spectrum scratch into `time` (or `time_fade`).
    /// The result is unnormalized.
    fn inverse_into_time(&mut self, fade: bool) -> Result<(), realfft::FftError> {
        let dest = if fade { &mut self.time_fade } else { &mut self.time };
        self.ctx.inverse.process(&mut self.spectrum, dest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context(block: usize) -> Arc<ConvContext> {
        Arc::new(ConvContext::new(block))
    }

    /// Direct-form linear convolution for reference.
    fn direct_convolve(signal: &[f32], ir: &[f32], len: usize) -> Vec<f32> {
        let mut out = vec![0.0f32; len];
        for (n, o) in out.iter_mut().enumerate() {
            for (j, &h) in ir.iter().enumerate() {
                if n >= j && n - j < signal.len() {
                    *o += h * signal[n - j];
                }
            }
        }
        out
    }

    #[test]
    fn test_unit_impulse_is_identity() {
        let ctx = context(4);
        let filter = Arc::new(Filter::new(&ctx, &[1.0, 0.0, 0.0, 0.0]));
        let mut conv = BlockConvolver::new(ctx, filter.partitions());
        conv.set_filter(&filter).unwrap();

        let mut out = [0.0f32; 4];
        conv.filter_block(&[1.0, 2.0, 3.0, 4.0], &mut out);
        for (o, e) in out.iter().zip([1.0, 2.0, 3.0, 4.0]) {
            assert!((o - e).abs() < 1e-5, "{out:?}");
        }

        conv.filter_block(&[5.0, 6.0, 7.0, 8.0], &mut out);
        for (o, e) in out.iter().zip([5.0, 6.0, 7.0, 8.0]) {
            assert!((o - e).abs() < 1e-5, "{out:?}");
        }
    }

    #[test]
    fn test_delay_crosses_block_boundary() {
        // A 6-sample delay pushes an impulse at sample 3 out to sample 9,
        // two blocks after it went in.
        let ctx = context(4);
        let mut ir = [0.0f32; 8];
        ir[6] = 1.0;
        let filter = Arc::new(Filter::new(&ctx, &ir));
        assert_eq!(filter.partitions(), 2);

        let mut conv = BlockConvolver::new(ctx, 2);
        conv.set_filter(&filter).unwrap();

        let mut out = [0.0f32; 4];
        conv.filter_block(&[0.0, 0.0, 0.0, 1.0], &mut out);
        assert!(out.iter().all(|v| v.abs() < 1e-5), "{out:?}");

        conv.filter_block(&[0.0; 4], &mut out);
        assert!(out.iter().all(|v| v.abs() < 1e-5), "{out:?}");

        conv.filter_block(&[0.0; 4], &mut out);
        // Sample 9 is index 1 of this block.
        for (i, o) in out.iter().enumerate() {
            let expected = if i == 1 { 1.0 } else { 0.0 };
            assert!((o - expected).abs() < 1e-5, "{out:?}");
        }
    }

    #[test]
    fn test_matches_direct_convolution() {
        let block = 8;
        let ctx = context(block);

        let ir: Vec<f32> = (0..20).map(|i| ((i * 7 % 13) as f32 - 6.0) * 0.1).collect();
        let signal: Vec<f32> = (0..64).map(|i| ((i * 5 % 17) as f32 - 8.0) * 0.05).collect();

        let filter = Arc::new(Filter::new(&ctx, &ir));
        let mut conv = BlockConvolver::new(ctx, filter.partitions());
        conv.set_filter(&filter).unwrap();

        let mut out = vec![0.0f32; signal.len()];
        for (inp, outp) in signal.chunks(block).zip(out.chunks_mut(block)) {
            conv.filter_block(inp, outp);
        }

        let expected = direct_convolve(&signal, &ir, signal.len());
        for (i, (o, e)) in out.iter().zip(&expected).enumerate() {
            assert!((o - e).abs() < 1e-4, "sample {i}: {o} vs {e}");
        }
    }

    #[test]
    fn test_crossfade_blends_linearly() {
        // Identity filter, then crossfade to a one-sample delay with gain 2.
        // Under constant input the old response is 1, the new is 2, and the
        // crossfade block ramps between them.
        let ctx = context(4);
        let a = Arc::new(Filter::new(&ctx, &[1.0, 0.0, 0.0, 0.0]));
        let b = Arc::new(Filter::new(&ctx, &[0.0, 2.0, 0.0, 0.0]));
        let mut conv = BlockConvolver::new(ctx, 1);
        conv.set_filter(&a).unwrap();

        let ones = [1.0f32; 4];
        let mut out = [0.0f32; 4];
        conv.filter_block(&ones, &mut out);
        conv.filter_block(&ones, &mut out);
        for o in out {
            assert!((o - 1.0).abs() < 1e-5);
        }

        conv.crossfade_filter(&b).unwrap();
        conv.filter_block(&ones, &mut out);
        for (i, o) in out.iter().enumerate() {
            let t = i as f32 / 4.0;
            let expected = (1.0 - t) * 1.0 + t * 2.0;
            assert!((o - expected).abs() < 1e-5, "sample {i}: {o} vs {expected}");
        }

        // Next block is fully on the new filter.
        conv.filter_block(&ones, &mut out);
        for o in out {
            assert!((o - 2.0).abs() < 1e-5);
        }
    }

    #[test]
    fn test_crossfade_carries_tail_of_new_filter() {
        // The incoming filter sees the shared input history: an impulse fed
        // while the old filter was active still excites the new filter's
        // delayed tap after the switch.
        let ctx = context(4);
        let identity = Arc::new(Filter::new(&ctx, &[1.0, 0.0, 0.0, 0.0]));
        let mut delayed = [0.0f32; 8];
        delayed[6] = 1.0;
        let delayed = Arc::new(Filter::new(&ctx, &delayed));

        let mut conv = BlockConvolver::new(ctx, 2);
        conv.set_filter(&identity).unwrap();

        let mut out = [0.0f32; 4];
        conv.filter_block(&[0.0, 0.0, 0.0, 1.0], &mut out);
        conv.crossfade_filter(&delayed).unwrap();

        // Crossfade block: neither filter produces output at samples 4..=7.
        conv.filter_block(&[0.0; 4], &mut out);
        assert!(out.iter().all(|v| v.abs() < 1e-5), "{out:?}");

        // Next block: the impulse fed at sample 3, before the switch, fires
        // the new filter's 6-sample tap at sample 9 — the input history
        // survived the filter change.
        conv.filter_block(&[0.0; 4], &mut out);
        let expected = [0.0, 1.0, 0.0, 0.0];
        for (i, (o, e)) in out.iter().zip(expected).enumerate() {
            assert!((o - e).abs() < 1e-5, "sample {i}: {out:?}");
        }
    }

    #[test]
    fn test_no_filter_outputs_silence_but_keeps_history() {
        let ctx = context(4);
        let mut delayed = [0.0f32; 8];
        delayed[4] = 1.0;
        let delayed = Arc::new(Filter::new(&ctx, &delayed));

        let mut conv = BlockConvolver::new(ctx, 2);

        let mut out = [9.0f32; 4];
        conv.filter_block(&[1.0, 2.0, 3.0, 4.0], &mut out);
        assert_eq!(out, [0.0; 4]);

        // Install a 4-sample delay: the previous block re-emerges.
        conv.set_filter(&delayed).unwrap();
        conv.filter_block(&[0.0; 4], &mut out);
        for (o, e) in out.iter().zip([1.0, 2.0, 3.0, 4.0]) {
            assert!((o - e).abs() < 1e-5, "{out:?}");
        }
    }

    #[test]
    fn test_shape_mismatches_are_rejected() {
        let ctx4 = context(4);
        let ctx8 = context(8);
        let long = Arc::new(Filter::new(&ctx4, &[0.25; 12]));
        let other_block = Arc::new(Filter::new(&ctx8, &[1.0]));

        let mut conv = BlockConvolver::new(ctx4, 2);
        assert_eq!(
            conv.set_filter(&long),
            Err(ConvError::TooManyPartitions {
                filter: 3,
                capacity: 2
            })
        );
        assert_eq!(
            conv.crossfade_filter(&other_block),
            Err(ConvError::BlockSizeMismatch {
                filter: 8,
                expected: 4
            })
        );
    }

    #[test]
    fn test_zero_partition_convolver_is_silent() {
        let ctx = context(4);
        let mut conv = BlockConvolver::new(ctx, 0);
        let mut out = [1.0f32; 4];
        conv.filter_block(&[1.0; 4], &mut out);
        assert_eq!(out, [0.0; 4]);
    }
}
