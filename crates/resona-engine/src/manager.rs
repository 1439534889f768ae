//! Manager dispatch: one block in, all channels out.
//!
//! A [`ConvolverManager`] owns the filter library, the per-IR delay table
//! and a vector of channel workers. Each [`ConvolverManager::process`] call
//! fans one interleaved input block out across all workers in parallel and
//! mixes their mono results back into the interleaved output buffer.
//!
//! Error policy: recoverable failures (bad indices, unreadable files,
//! library rebuilds at the wrong time) are reported through the log sink
//! and signalled with a `false` return; the manager itself always stays
//! usable and renders silence when it has nothing to play.

use crate::delay_table::DelayTable;
use crate::library::FilterLibrary;
use crate::worker::{ChannelWorker, MAX_DELAY_SAMPLES, RenderParams};
use resona_core::{ConvContext, FadeSpec, FadeWindows, Filter, Trim};
use resona_io::read_delay_file;
use std::path::Path;
use std::sync::Arc;

/// Rendering parameters for one worker, as selected by the caller.
#[derive(Debug, Clone, Copy)]
struct Selection {
    ir: usize,
    level: f64,
    extra_delay: f64,
}

impl Default for Selection {
    fn default() -> Self {
        Self {
            ir: 0,
            level: 1.0,
            extra_delay: 0.0,
        }
    }
}

/// Shared trim and fade data for a batch of static workers, produced by
/// [`ConvolverManager::prepare_static_filters`].
#[derive(Debug)]
pub struct StaticFilterPrep {
    sample_rate: f64,
    trim: Trim,
    windows: FadeWindows,
}

/// Top-level coordinator for multi-channel partitioned convolution.
///
/// # Example
///
/// ```rust
/// use resona_core::FadeSpec;
/// use resona_engine::ConvolverManager;
///
/// let mut manager = ConvolverManager::new(4);
/// let ir = [1.0, 0.0, 0.0, 0.0];
/// manager.create_irs(&ir, 1, 4, &FadeSpec::NONE);
/// manager.set_worker_count(1);
/// manager.select_ir(0, 0, 1.0, 0.0);
///
/// let input = [1.0, 2.0, 3.0, 4.0];
/// let mut output = [0.0f32; 4];
/// manager.process(&input, &mut output, 1, 1);
/// ```
pub struct ConvolverManager {
    block_size: usize,
    ctx: Arc<ConvContext>,
    library: FilterLibrary,
    delays: DelayTable,
    workers: Vec<ChannelWorker>,
    selections: Vec<Selection>,
    delay_scale: f64,
    audio_scale: f32,
    hq: bool,
    update_params: bool,
}

impl ConvolverManager {
    /// Creates a manager processing `block_size`-sample blocks.
    ///
    /// # Panics
    ///
    /// Panics if `block_size` is 0.
    pub fn new(block_size: usize) -> Self {
        let ctx = Arc::new(ConvContext::new(block_size));
        Self {
            block_size,
            library: FilterLibrary::new(Arc::clone(&ctx)),
            ctx,
            delays: DelayTable::new(),
            workers: Vec::new(),
            selections: Vec::new(),
            delay_scale: 1.0,
            audio_scale: 1.0,
            hq: true,
            update_params: true,
        }
    }

    /// Creates a manager and loads an IR file; load failures are logged and
    /// leave the library empty.
    pub fn with_ir_file<P: AsRef<Path>>(path: P, block_size: usize, fade: &FadeSpec) -> Self {
        let mut manager = Self::new(block_size);
        manager.load_irs(path, fade);
        manager
    }

    /// Creates a manager, loads an IR file and an IR-delay text file.
    pub fn with_ir_and_delay_files<P: AsRef<Path>, Q: AsRef<Path>>(
        ir_path: P,
        delay_path: Q,
        block_size: usize,
        fade: &FadeSpec,
    ) -> Self {
        let mut manager = Self::new(block_size);
        manager.load_irs(ir_path, fade);
        manager.load_ir_delays(delay_path);
        manager
    }

    /// True (with a usage-error log) when a library-replacing operation is
    /// attempted while workers hold filter references.
    fn library_locked(&self, operation: &str) -> bool {
        if self.workers.is_empty() {
            false
        } else {
            log::error!(
                "cannot {operation} while {} workers are running; set the worker count to 0 first",
                self.workers.len()
            );
            true
        }
    }

    /// Changes the block size. Usage error once workers exist.
    ///
    /// Rebuilds the convolution context and clears the library: existing
    /// filters are partitioned for the old block size.
    pub fn set_block_size(&mut self, block_size: usize) -> bool {
        if self.library_locked("change the block size") {
            return false;
        }

        self.block_size = block_size;
        self.ctx = Arc::new(ConvContext::new(block_size));
        self.library = FilterLibrary::new(Arc::clone(&self.ctx));
        true
    }

    /// Loads IRs from a file. `.sofa` containers need an external reader
    /// and are reported as errors here; everything else is read as WAV.
    ///
    /// Returns `false` (library left empty, failure logged) on error.
    pub fn load_irs<P: AsRef<Path>>(&mut self, path: P, fade: &FadeSpec) -> bool {
        if self.library_locked("load impulse responses") {
            return false;
        }

        let path = path.as_ref();
        if path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("sofa"))
        {
            log::error!(
                "'{}' is a SOFA container; decode it externally and use load_sofa",
                path.display()
            );
            self.library.clear();
            return false;
        }

        match self.library.load_wav(path, fade) {
            Ok(()) => {
                log::debug!("loaded {} IRs from '{}'", self.library.len(), path.display());
                self.update_params = true;
                true
            }
            Err(err) => {
                log::error!("failed to load IRs from '{}': {err}", path.display());
                false
            }
        }
    }

    /// Builds filters from contiguous raw IR data at the default 48 kHz.
    ///
    /// See [`create_irs_with_rate`](Self::create_irs_with_rate) when the
    /// data has a different rate.
    pub fn create_irs(
        &mut self,
        ir_data: &[f32],
        num_irs: usize,
        ir_length: usize,
        fade: &FadeSpec,
    ) -> bool {
        self.create_irs_with_rate(ir_data, num_irs, ir_length, fade, 48_000.0)
    }

    /// Builds filters from contiguous raw IR data with an explicit sample
    /// rate for the fade times.
    pub fn create_irs_with_rate(
        &mut self,
        ir_data: &[f32],
        num_irs: usize,
        ir_length: usize,
        fade: &FadeSpec,
        sample_rate: f64,
    ) -> bool {
        if self.library_locked("rebuild impulse responses") {
            return false;
        }
        if ir_data.len() < num_irs * ir_length {
            log::error!(
                "IR data holds {} samples but {num_irs} IRs of {ir_length} need {}",
                ir_data.len(),
                num_irs * ir_length
            );
            return false;
        }

        self.library
            .create_irs(ir_data, num_irs, ir_length, fade, sample_rate);
        self.update_params = true;
        true
    }

    /// Loads filters and delays from a SOFA measurement set.
    pub fn load_sofa(&mut self, sofa: &resona_io::SofaData, fade: &FadeSpec) -> bool {
        if self.library_locked("load a SOFA measurement set") {
            return false;
        }

        self.library.load_sofa(sofa, fade);
        self.delays = if sofa.has_delays() {
            DelayTable::from_sofa(sofa)
        } else {
            DelayTable::new()
        };
        self.update_params = true;
        true
    }

    /// Loads per-IR `(dynamic, static)` delays, in samples, from a text
    /// file. On error the table is zeroed and `false` returned.
    pub fn load_ir_delays<P: AsRef<Path>>(&mut self, path: P) -> bool {
        if self.library_locked("replace IR delays") {
            return false;
        }

        match read_delay_file(path.as_ref()) {
            Ok(pairs) => {
                self.delays = DelayTable::from_pairs(pairs);
                log::debug!(
                    "loaded {} IR delays from '{}'",
                    self.delays.len(),
                    path.as_ref().display()
                );
                self.update_params = true;
                true
            }
            Err(err) => {
                log::warn!(
                    "failed to read IR delays from '{}', zeroing delays: {err}",
                    path.as_ref().display()
                );
                self.delays = DelayTable::new();
                false
            }
        }
    }

    /// Sets per-IR delays from parallel dynamic/static arrays, in samples.
    pub fn set_ir_delays(&mut self, dynamic: &[f64], fixed: &[f64]) -> bool {
        if self.library_locked("replace IR delays") {
            return false;
        }
        if dynamic.len() != fixed.len() {
            log::error!(
                "delay arrays differ in length: {} dynamic vs {} static",
                dynamic.len(),
                fixed.len()
            );
            return false;
        }

        self.delays = DelayTable::from_parts(dynamic, fixed);
        self.update_params = true;
        true
    }

    /// Scales the dynamic part of every IR delay (e.g. for ITD
    /// adjustment). Takes effect from the next block.
    pub fn set_delay_scale(&mut self, scale: f64) {
        self.delay_scale = scale;
        self.update_params = true;
    }

    /// Switches between interpolated (high-quality) and truncated delay
    /// reads. Takes effect from the next block.
    pub fn enable_hq_processing(&mut self, enable: bool) {
        self.hq = enable;
        self.update_params = true;
    }

    /// Sets the output mix scale from a measured filter level (see
    /// [`resona_core::estimate_level`]); the scale is its reciprocal.
    /// Non-positive levels are ignored.
    pub fn set_audio_scale(&mut self, max_level: f32) {
        if max_level > 0.0 {
            self.audio_scale = 1.0 / max_level;
            log::debug!(
                "max filter level {max_level}, audio scale {}",
                self.audio_scale
            );
        }
    }

    /// Grows or shrinks the worker vector. New workers default to IR 0,
    /// level 1 and no extra delay; removed workers are joined.
    pub fn set_worker_count(&mut self, count: usize) {
        log::debug!(
            "setting up for {count} workers (from {})",
            self.workers.len()
        );

        self.selections.resize_with(count, Selection::default);

        while self.workers.len() < count {
            let index = self.workers.len();
            self.workers.push(ChannelWorker::new(
                Arc::clone(&self.ctx),
                index,
                self.block_size,
                self.library.partitions(),
                0.0,
            ));
        }
        self.workers.truncate(count);

        self.update_params = true;
    }

    /// Selects an IR, output level and extra delay (in samples) for one
    /// worker. The change is applied at the start of the next block.
    ///
    /// Returns `false` (logged) for out-of-range worker or IR indices.
    pub fn select_ir(&mut self, worker: usize, ir: usize, level: f64, extra_delay: f64) -> bool {
        if worker >= self.workers.len() {
            log::error!(
                "worker {worker} out of range ({} workers)",
                self.workers.len()
            );
            return false;
        }
        if ir >= self.library.len() {
            log::error!("IR {ir} out of range ({} IRs loaded)", self.library.len());
            return false;
        }

        self.selections[worker] = Selection {
            ir,
            level,
            extra_delay,
        };
        self.update_params = true;
        true
    }

    /// Resolves a worker's selection into concrete render parameters and
    /// stashes them on the worker for its next block.
    fn refresh_worker_params(&mut self, worker: usize) {
        let selection = self.selections[worker];
        let Some(filter) = self.library.get(selection.ir) else {
            return;
        };

        let delay = self.delays.delay(selection.ir, self.delay_scale) + selection.extra_delay;
        log::trace!(
            "worker[{worker}]: IR {} at level {} with {delay:.3} samples delay",
            selection.ir,
            selection.level
        );

        self.workers[worker].set_pending(RenderParams {
            filter: Some(Arc::clone(filter)),
            level: selection.level,
            delay,
            hq: self.hq,
        });
    }

    /// Renders one block on all workers in parallel.
    ///
    /// `input` is row-major interleaved, `input_channels` wide and one
    /// block long; worker `i` reads column `i / output_channels`. `output`
    /// has the same shape with `output_channels` columns; worker `i` mixes
    /// into column `i % output_channels`. **The output buffer is not
    /// cleared here** — contributions are added to whatever it holds, so
    /// zero it before the call.
    ///
    /// Synchronous: returns once every non-elided worker has finished its
    /// block. Shape violations are logged and leave the output untouched.
    pub fn process(
        &mut self,
        input: &[f32],
        output: &mut [f32],
        input_channels: usize,
        output_channels: usize,
    ) {
        if input_channels == 0 || output_channels == 0 {
            log::error!("process called with zero input or output channels");
            return;
        }
        if input.len() < self.block_size * input_channels
            || output.len() < self.block_size * output_channels
        {
            log::error!(
                "process buffers too small: {} input / {} output samples for block size {}",
                input.len(),
                output.len(),
                self.block_size
            );
            return;
        }
        if !self.workers.is_empty() {
            let needed = (self.workers.len() - 1) / output_channels + 1;
            if needed > input_channels {
                log::error!(
                    "{} workers over {output_channels} output channels need {needed} \
                     input channels, got {input_channels}",
                    self.workers.len()
                );
                return;
            }
        }

        if self.update_params {
            for worker in 0..self.workers.len() {
                self.refresh_worker_params(worker);
            }
            self.update_params = false;
        }

        for (i, worker) in self.workers.iter_mut().enumerate() {
            worker.begin_block(input, input_channels, i / output_channels);
        }

        for (i, worker) in self.workers.iter_mut().enumerate() {
            worker.finish_block(output, output_channels, i % output_channels, self.audio_scale);
        }
    }

    /// Prepares shared trim and fade data for a batch of static workers.
    ///
    /// Clears any existing workers (with a warning) and fixes the library's
    /// partition count for the filters the batch will add.
    pub fn prepare_static_filters(
        &mut self,
        ir_length: usize,
        sample_rate: f64,
        fade: &FadeSpec,
    ) -> StaticFilterPrep {
        if !self.workers.is_empty() {
            log::warn!("removing {} existing workers", self.workers.len());
            self.workers.clear();
        }
        self.selections.clear();

        let trim = fade.trim(sample_rate, ir_length, self.block_size);
        self.library.reset(trim.partitions);

        StaticFilterPrep {
            sample_rate,
            trim,
            windows: fade.windows(sample_rate),
        }
    }

    /// Builds one filter from `ir_data` and a worker permanently bound to
    /// it, delayed by `delay_seconds` (converted with the prep's sample
    /// rate). Silence elision applies to static workers like any other.
    pub fn create_static_worker(
        &mut self,
        ir_data: &[f32],
        delay_seconds: f64,
        prep: &StaticFilterPrep,
    ) -> bool {
        let Trim { start, len, .. } = prep.trim;
        if ir_data.len() < start + len {
            log::error!(
                "static IR holds {} samples, trim needs {}",
                ir_data.len(),
                start + len
            );
            return false;
        }

        let mut buffer = ir_data[start..start + len].to_vec();
        prep.windows.apply(&mut buffer);
        let ir = self.library.push(Filter::new(&self.ctx, &buffer));

        let delay = delay_seconds * prep.sample_rate;
        self.selections.push(Selection {
            ir,
            level: 1.0,
            extra_delay: delay,
        });

        let index = self.workers.len();
        self.workers.push(ChannelWorker::new(
            Arc::clone(&self.ctx),
            index,
            self.block_size,
            self.library.partitions(),
            delay,
        ));
        self.update_params = true;
        true
    }

    /// Number of IRs loaded.
    pub fn num_irs(&self) -> usize {
        self.library.len()
    }

    /// Processing block size in samples.
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Partition count of the current filter load.
    pub fn partitions(&self) -> usize {
        self.library.partitions()
    }

    /// Number of workers.
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Whether a worker currently has signal or tail to render; `false`
    /// for out-of-range indices and for silence-elided workers.
    pub fn is_processing(&self, worker: usize) -> bool {
        self.workers.get(worker).is_some_and(ChannelWorker::is_processing)
    }

    /// Approximate amount of audio the renderer holds, in samples: the
    /// filter span plus the delay-line headroom.
    pub fn samples_buffered(&self) -> usize {
        self.block_size * self.library.partitions() + MAX_DELAY_SAMPLES
    }
}
