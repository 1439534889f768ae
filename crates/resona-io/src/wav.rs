//! WAV impulse-response reading.
//!
//! Impulse-response banks are commonly shipped as multi-channel WAV files,
//! one response per channel. Unlike ordinary audio loading, the channels are
//! kept separate: each becomes its own filter.

use crate::{Error, Result};
use hound::{SampleFormat, WavReader};
use std::path::Path;

/// A fully decoded WAV impulse-response file.
///
/// Samples are stored interleaved as f32 regardless of the on-disk format;
/// integer PCM is normalized by `2^(bits-1)`.
#[derive(Debug, Clone)]
pub struct IrWavFile {
    channels: usize,
    frames: usize,
    sample_rate: f64,
    samples: Vec<f32>,
}

impl IrWavFile {
    /// Opens and fully decodes a WAV file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Wav`] for unreadable or malformed files and
    /// [`Error::EmptyAudioFile`] when the file holds no frames or channels.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let reader = WavReader::open(path)?;
        let spec = reader.spec();
        let channels = spec.channels as usize;
        let total_samples = reader.len() as usize;

        if channels == 0 || total_samples == 0 {
            return Err(Error::EmptyAudioFile);
        }

        let samples: Vec<f32> = match spec.sample_format {
            SampleFormat::Float => reader
                .into_samples::<f32>()
                .collect::<std::result::Result<Vec<_>, _>>()?,
            SampleFormat::Int => {
                let max_val = (1i64 << (spec.bits_per_sample - 1)) as f32;
                reader
                    .into_samples::<i32>()
                    .map(|s| s.map(|v| v as f32 / max_val))
                    .collect::<std::result::Result<Vec<_>, _>>()?
            }
        };

        Ok(Self {
            channels,
            frames: samples.len() / channels,
            sample_rate: spec.sample_rate as f64,
            samples,
        })
    }

    /// Number of audio channels (one impulse response per channel).
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Number of sample frames per channel.
    pub fn frames(&self) -> usize {
        self.frames
    }

    /// Sample rate in Hz.
    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    /// The interleaved sample block.
    pub fn interleaved(&self) -> &[f32] {
        &self.samples
    }

    /// Copies one channel into `dest`, starting at frame `start`.
    ///
    /// Copies `dest.len()` frames; the caller is responsible for keeping
    /// `start + dest.len()` within [`frames`](Self::frames).
    pub fn extract_channel(&self, channel: usize, start: usize, dest: &mut [f32]) {
        debug_assert!(channel < self.channels);
        debug_assert!(start + dest.len() <= self.frames);

        for (i, out) in dest.iter_mut().enumerate() {
            *out = self.samples[(start + i) * self.channels + channel];
        }
    }
}
