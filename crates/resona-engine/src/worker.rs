//! Per-channel convolver worker.
//!
//! Each output channel is rendered by a dedicated OS thread that runs one
//! partitioned convolution per block, writes the result into a rotating
//! delay line, and reads the line back at a linearly ramping fractional
//! position with a linearly ramping gain. The caller (the manager) talks to
//! the thread through a pair of bounded rendezvous channels: jobs carrying
//! the input and output block buffers travel in, finished blocks travel
//! back, and buffer ownership rides along — the caller can only touch a
//! block buffer while the worker does not hold it, which is exactly the
//! access window the block protocol requires.
//!
//! Silence gating: after enough all-zero input blocks the convolver tail
//! and the delayed tail are both provably drained, and the caller stops
//! signalling the thread entirely.

use crossbeam_channel::{Receiver, Sender, bounded};
use resona_core::{BlockConvolver, ConvContext, Filter, interp};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Upper bound on the per-channel output delay, in samples (50 ms at
/// 48 kHz). Requested delays are clamped to the delay line this implies.
pub const MAX_DELAY_SAMPLES: usize = 2400;

/// Parameter set a worker applies at the start of a block.
#[derive(Debug, Clone)]
pub(crate) struct RenderParams {
    pub filter: Option<Arc<Filter>>,
    pub level: f64,
    pub delay: f64,
    pub hq: bool,
}

struct BlockJob {
    input: Vec<f32>,
    output: Vec<f32>,
    params: Option<RenderParams>,
    /// Consecutive all-zero input blocks, including this one (0 = signal).
    zero_run: u32,
}

enum Command {
    Block(BlockJob),
    Quit,
}

struct BlockDone {
    input: Vec<f32>,
    output: Vec<f32>,
}

/// Handle to one render thread, owned by the manager.
///
/// The handle tracks the silence run, holds parameter updates for delivery
/// with the next job, and keeps the block buffers between flights.
pub(crate) struct ChannelWorker {
    index: usize,
    jobs: Option<Sender<Command>>,
    done: Receiver<BlockDone>,
    thread: Option<JoinHandle<()>>,
    alive: bool,
    /// Input/output block buffers, present whenever no job is in flight.
    buffers: Option<(Vec<f32>, Vec<f32>)>,
    pending: Option<RenderParams>,
    zero_blocks: u32,
    max_zero_blocks: u32,
    in_flight: bool,
}

impl ChannelWorker {
    /// Creates the worker and spawns its render thread.
    ///
    /// `initial_delay` seeds the requested output delay (used by static
    /// workers whose delay is known at construction). If the thread cannot
    /// be spawned the failure is logged and the worker becomes a silent
    /// sink: it never signals and never waits.
    pub(crate) fn new(
        ctx: Arc<ConvContext>,
        index: usize,
        block_size: usize,
        partitions: usize,
        initial_delay: f64,
    ) -> Self {
        let (job_tx, job_rx) = bounded::<Command>(1);
        let (done_tx, done_rx) = bounded::<BlockDone>(1);

        let max_zero_blocks = (partitions + MAX_DELAY_SAMPLES.div_ceil(block_size) + 1) as u32;

        let spawned = thread::Builder::new()
            .name(format!("convolver-{index}"))
            .spawn(move || {
                let mut state = RenderState::new(ctx, index, block_size, partitions, initial_delay);
                while let Ok(command) = job_rx.recv() {
                    match command {
                        Command::Quit => break,
                        Command::Block(mut job) => {
                            state.render(&job.input, &mut job.output, job.params.take(), job.zero_run);
                            let done = BlockDone {
                                input: job.input,
                                output: job.output,
                            };
                            if done_tx.send(done).is_err() {
                                break;
                            }
                        }
                    }
                }
            });

        let (thread, alive) = match spawned {
            Ok(handle) => (Some(handle), true),
            Err(err) => {
                log::error!("failed to spawn convolver thread {index}: {err}");
                (None, false)
            }
        };

        Self {
            index,
            jobs: Some(job_tx),
            done: done_rx,
            thread,
            alive,
            buffers: Some((vec![0.0; block_size], vec![0.0; block_size])),
            pending: None,
            zero_blocks: 0,
            max_zero_blocks,
            in_flight: false,
        }
    }

    /// Stores parameters for delivery with the next job this worker is
    /// actually sent. A newer update replaces an undelivered older one.
    pub(crate) fn set_pending(&mut self, params: RenderParams) {
        self.pending = Some(params);
    }

    /// De-interleaves one input block (column `column` of an interleaved
    /// buffer with `channels` columns), updates the silence run, and signals
    /// the render thread unless the block is silence-elided.
    pub(crate) fn begin_block(&mut self, input: &[f32], channels: usize, column: usize) {
        if !self.alive || self.in_flight {
            return;
        }
        let Some((mut in_buf, out_buf)) = self.buffers.take() else {
            return;
        };

        let mut nonzero = false;
        for (i, sample) in in_buf.iter_mut().enumerate() {
            let value = input[i * channels + column];
            nonzero |= value != 0.0;
            *sample = value;
        }

        if nonzero {
            self.zero_blocks = 0;
        } else if self.zero_blocks < self.max_zero_blocks {
            self.zero_blocks += 1;
        }

        if self.zero_blocks >= self.max_zero_blocks {
            self.buffers = Some((in_buf, out_buf));
            return;
        }

        let Some(jobs) = &self.jobs else {
            self.buffers = Some((in_buf, out_buf));
            return;
        };
        let job = BlockJob {
            input: in_buf,
            output: out_buf,
            params: self.pending.take(),
            zero_run: self.zero_blocks,
        };
        match jobs.send(Command::Block(job)) {
            Ok(()) => self.in_flight = true,
            Err(err) => {
                log::error!("convolver thread {} is gone; muting worker", self.index);
                if let Command::Block(job) = err.0 {
                    self.buffers = Some((job.input, job.output));
                }
                self.alive = false;
            }
        }
    }

    /// Waits for the block started by [`begin_block`](Self::begin_block)
    /// and mixes `level * output` into column `column` of the interleaved
    /// output buffer. A no-op when the block was silence-elided.
    pub(crate) fn finish_block(
        &mut self,
        output: &mut [f32],
        channels: usize,
        column: usize,
        level: f32,
    ) {
        if !self.in_flight {
            return;
        }
        self.in_flight = false;

        match self.done.recv() {
            Ok(done) => {
                for (i, &sample) in done.output.iter().enumerate() {
                    output[i * channels + column] += sample * level;
                }
                self.buffers = Some((done.input, done.output));
            }
            Err(_) => {
                log::error!("convolver thread {} died; worker is now silent", self.index);
                self.alive = false;
            }
        }
    }

    /// Whether the worker still has signal (or tail) to render.
    pub(crate) fn is_processing(&self) -> bool {
        self.zero_blocks < self.max_zero_blocks
    }
}

impl Drop for ChannelWorker {
    fn drop(&mut self) {
        if let Some(jobs) = self.jobs.take() {
            let _ = jobs.try_send(Command::Quit);
            // Dropping the sender disconnects the channel, so the thread
            // leaves its recv loop even if the quit message did not fit.
            drop(jobs);
        }
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

/// Thread-side render state: the convolver, the rotating delay line, and
/// the ramp endpoints carried across blocks.
struct RenderState {
    index: usize,
    block_size: usize,
    partitions: usize,
    convolver: BlockConvolver,
    delay_line: Vec<f32>,
    delay_len: usize,
    delay_pos: usize,
    /// Largest delay the line can serve, after interpolator headroom.
    max_delay: f64,
    /// Gain and delay at the end of the previous block.
    level1: f64,
    delay1: f64,
    /// Requested gain/delay/quality, ramped to over one block.
    level: f64,
    delay: f64,
    hq: bool,
    selected: Option<Arc<Filter>>,
    installed: Option<Arc<Filter>>,
}

impl RenderState {
    fn new(
        ctx: Arc<ConvContext>,
        index: usize,
        block_size: usize,
        partitions: usize,
        initial_delay: f64,
    ) -> Self {
        // Delay capacity plus one working block, rounded up to whole blocks,
        // plus one block of slack for the read ramp.
        let delay_len = ((MAX_DELAY_SAMPLES + block_size).div_ceil(block_size) + 1) * block_size;
        let max_delay = (delay_len - block_size - 1 - interp::additional_delay_required()) as f64;

        Self {
            index,
            block_size,
            partitions,
            convolver: BlockConvolver::new(ctx, partitions),
            delay_line: vec![0.0; delay_len],
            delay_len,
            delay_pos: 0,
            max_delay,
            level1: 1.0,
            delay1: 0.0,
            level: 1.0,
            delay: initial_delay,
            hq: true,
            selected: None,
            installed: None,
        }
    }

    /// Installs a changed filter selection: plain install the first time, a
    /// one-block crossfade on every later change.
    fn install_filter(&mut self) {
        let Some(selected) = &self.selected else {
            return;
        };
        if self
            .installed
            .as_ref()
            .is_some_and(|installed| Arc::ptr_eq(installed, selected))
        {
            return;
        }

        let result = if self.installed.is_none() {
            self.convolver.set_filter(selected)
        } else {
            self.convolver.crossfade_filter(selected)
        };

        match result {
            Ok(()) => self.installed = Some(Arc::clone(selected)),
            Err(err) => log::error!("convolver {}: filter rejected: {err}", self.index),
        }
    }

    /// Renders one block: convolve (or zero) into the delay line, then read
    /// it back through the gain/delay ramp.
    fn render(
        &mut self,
        input: &[f32],
        output: &mut [f32],
        params: Option<RenderParams>,
        zero_run: u32,
    ) {
        if let Some(params) = params {
            self.selected = params.filter;
            self.level = params.level;
            self.delay = params.delay;
            self.hq = params.hq;
        }

        let block = self.block_size;

        if (zero_run as usize) < self.partitions {
            self.install_filter();
            self.convolver
                .filter_block(input, &mut self.delay_line[self.delay_pos..self.delay_pos + block]);
        } else {
            // Convolver tail has drained; only the delayed tail remains.
            self.delay_line[self.delay_pos..self.delay_pos + block].fill(0.0);
        }

        // Read positions are kept in "virtual samples" offset by the line
        // length; the interpolator reduces them modulo the line.
        let pos1 = (self.delay_pos + self.delay_len) as f64;
        let level2 = self.level;
        let delay2 = self.delay.min(self.max_delay);
        let fpos1 = pos1 - self.delay1;
        let fpos2 = pos1 + block as f64 - delay2;

        let step = 1.0 / block as f64;
        for (i, out) in output.iter_mut().enumerate() {
            let b = i as f64 * step;
            let a = 1.0 - b;
            let fpos = a * fpos1 + b * fpos2;
            let gain = a * self.level1 + b * level2;

            let sample = if self.hq {
                interp::sample_at(&self.delay_line, 0, 1, self.delay_len, fpos)
            } else {
                interp::sample_at_truncated(&self.delay_line, 0, 1, self.delay_len, fpos)
            };
            *out = (gain * sample as f64) as f32;
        }

        self.delay_pos = (self.delay_pos + block) % self.delay_len;
        self.delay1 = delay2;
        self.level1 = level2;
    }
}
