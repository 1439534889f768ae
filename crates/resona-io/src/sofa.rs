//! SOFA measurement-set data model.
//!
//! SOFA containers store impulse responses indexed by measurement, receiver
//! and emitter, plus per-tuple onset delays. Parsing the container itself
//! (NetCDF) is outside this crate; a reader produces a [`SofaData`], which
//! is the validated in-memory form the engine consumes.
//!
//! Layout contract: the IR block is ordered `[measurement][receiver]
//! [emitter][time]` and the delay block `[measurement][receiver][emitter]`,
//! so the flat offset of a tuple is `m*nr*ne + r*ne + e`. The delay block
//! may hold fewer measurements than the IR block (`ndm <= nm`); lookups wrap
//! with `m % ndm`.

use crate::{Error, Result};

/// An in-memory SOFA measurement set.
#[derive(Debug, Clone)]
pub struct SofaData {
    measurements: usize,
    receivers: usize,
    emitters: usize,
    delay_measurements: usize,
    sample_rate: f64,
    ir_length: usize,
    irs: Vec<f32>,
    delays: Vec<f32>,
}

impl SofaData {
    /// Builds a measurement set, validating the block shapes.
    ///
    /// `irs` holds `measurements * receivers * emitters * ir_length` samples
    /// in `[m][r][e][t]` order; `delays` holds `delay_measurements *
    /// receivers * emitters` values in seconds, `[m][r][e]` order. An empty
    /// `delays` block is allowed and means "no delay data".
    ///
    /// # Errors
    ///
    /// Returns [`Error::SofaShape`] when a block does not match its
    /// dimensions and [`Error::SofaDelayCount`] when `delay_measurements`
    /// exceeds `measurements`.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        measurements: usize,
        receivers: usize,
        emitters: usize,
        delay_measurements: usize,
        sample_rate: f64,
        ir_length: usize,
        irs: Vec<f32>,
        delays: Vec<f32>,
    ) -> Result<Self> {
        let expected_irs = measurements * receivers * emitters * ir_length;
        if irs.len() != expected_irs {
            return Err(Error::SofaShape {
                field: "IR",
                actual: irs.len(),
                expected: expected_irs,
            });
        }

        if delay_measurements > measurements {
            return Err(Error::SofaDelayCount {
                ndm: delay_measurements,
                nm: measurements,
            });
        }

        let expected_delays = delay_measurements * receivers * emitters;
        if !delays.is_empty() && delays.len() != expected_delays {
            return Err(Error::SofaShape {
                field: "delay",
                actual: delays.len(),
                expected: expected_delays,
            });
        }

        Ok(Self {
            measurements,
            receivers,
            emitters,
            delay_measurements,
            sample_rate,
            ir_length,
            irs,
            delays,
        })
    }

    /// Number of measurements.
    pub fn num_measurements(&self) -> usize {
        self.measurements
    }

    /// Number of receivers.
    pub fn num_receivers(&self) -> usize {
        self.receivers
    }

    /// Number of emitters.
    pub fn num_emitters(&self) -> usize {
        self.emitters
    }

    /// Number of delay measurements; may be smaller than
    /// [`num_measurements`](Self::num_measurements).
    pub fn num_delay_measurements(&self) -> usize {
        self.delay_measurements
    }

    /// Sample rate of the impulse responses in Hz.
    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    /// Length of each impulse response in samples.
    pub fn ir_length(&self) -> usize {
        self.ir_length
    }

    /// Whether the set carries delay data.
    pub fn has_delays(&self) -> bool {
        !self.delays.is_empty()
    }

    /// Flat offset of a `(measurement, receiver, emitter)` tuple.
    pub fn offset(&self, measurement: usize, receiver: usize, emitter: usize) -> usize {
        measurement * self.receivers * self.emitters + receiver * self.emitters + emitter
    }

    /// The impulse response at a flat [`offset`](Self::offset).
    pub fn ir(&self, offset: usize) -> &[f32] {
        &self.irs[offset * self.ir_length..(offset + 1) * self.ir_length]
    }

    /// Onset delay in seconds for a tuple.
    ///
    /// The measurement index wraps with the delay measurement count, and 0
    /// is returned when the set carries no delay data.
    pub fn delay_seconds(&self, measurement: usize, receiver: usize, emitter: usize) -> f64 {
        if self.delays.is_empty() {
            return 0.0;
        }
        let m = measurement % self.delay_measurements;
        self.delays[self.offset(m, receiver, emitter)] as f64
    }
}
