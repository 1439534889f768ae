//! Raised-cosine fade envelopes for trimming impulse responses.
//!
//! An impulse response taken from a measurement usually carries a leading
//! air gap and a long noisy tail. A [`FadeSpec`] describes which part of the
//! response to keep and how to window the cut points so the truncation does
//! not ring. [`FadeSpec::trim`] derives the sample range and the number of
//! convolution partitions it occupies; [`FadeSpec::windows`] builds the
//! envelopes; [`FadeWindows::apply`] multiplies them onto the trimmed data.

use std::f64::consts::PI;

/// Fade profile for trimming an impulse response, all times in seconds.
///
/// `fade_out_start + fade_out_length == 0.0` means "no fade out": the whole
/// tail from the trim start is kept.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FadeSpec {
    /// Where the kept part of the response begins.
    pub fade_in_start: f64,
    /// Length of the raised-cosine ramp applied at the start.
    pub fade_in_length: f64,
    /// Where the fade-out begins, measured from the start of the response.
    pub fade_out_start: f64,
    /// Length of the raised-cosine ramp applied at the end.
    pub fade_out_length: f64,
}

impl FadeSpec {
    /// No trimming and no windowing: the response is used as-is.
    pub const NONE: FadeSpec = FadeSpec {
        fade_in_start: 0.0,
        fade_in_length: 0.0,
        fade_out_start: 0.0,
        fade_out_length: 0.0,
    };

    /// Returns true if the profile specifies a fade-out.
    fn has_fade_out(&self) -> bool {
        self.fade_out_start + self.fade_out_length != 0.0
    }

    /// Derives the trim window for a response of `filter_len` samples.
    ///
    /// The start sample is `floor(fade_in_start * sample_rate)`; the kept
    /// length is the remainder of the response, shortened to
    /// `ceil((fade_out_start + fade_out_length - fade_in_start) * sample_rate)`
    /// when a fade-out is specified. The partition count is the kept length
    /// rounded up to whole blocks.
    pub fn trim(&self, sample_rate: f64, filter_len: usize, block_size: usize) -> Trim {
        let start = ((self.fade_in_start.max(0.0) * sample_rate).floor() as usize).min(filter_len);

        let len = if self.has_fade_out() {
            let span = (self.fade_out_start + self.fade_out_length - self.fade_in_start).max(0.0);
            let span = (span * sample_rate).ceil() as usize;
            span.min(filter_len - start)
        } else {
            filter_len - start
        };

        Trim {
            start,
            len,
            partitions: len.div_ceil(block_size),
        }
    }

    /// Builds the fade-in and fade-out envelopes for this profile.
    pub fn windows(&self, sample_rate: f64) -> FadeWindows {
        FadeWindows {
            fade_in: raised_cosine(self.fade_in_length, sample_rate),
            fade_out: raised_cosine(self.fade_out_length, sample_rate),
        }
    }
}

impl Default for FadeSpec {
    fn default() -> Self {
        Self::NONE
    }
}

/// Sample range an impulse response is trimmed to, plus the number of
/// convolution partitions that range occupies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Trim {
    /// First kept sample of the original response.
    pub start: usize,
    /// Number of kept samples.
    pub len: usize,
    /// Kept length rounded up to whole processing blocks.
    pub partitions: usize,
}

/// Raised-cosine ramp of `length * sample_rate` seconds, rounded up.
///
/// `w[i] = 0.5 - 0.5*cos(pi * min(i/L, 1))`, rising from 0 towards 1.
fn raised_cosine(length: f64, sample_rate: f64) -> Vec<f32> {
    let samples = length * sample_rate;
    let len = samples.ceil() as usize;
    if len == 0 {
        return Vec::new();
    }

    let scale = 1.0 / samples;
    (0..len)
        .map(|i| {
            let v = (i as f64 * scale).min(1.0);
            (0.5 - 0.5 * (v * PI).cos()) as f32
        })
        .collect()
}

/// Fade envelopes built from a [`FadeSpec`].
///
/// The fade-out is stored in reversed order: applying it multiplies sample
/// `len - 1 - i` by coefficient `i`, so the ramp runs towards zero at the
/// very end of the buffer.
#[derive(Debug, Clone, Default)]
pub struct FadeWindows {
    fade_in: Vec<f32>,
    fade_out: Vec<f32>,
}

impl FadeWindows {
    /// Applies both envelopes to `data` in place.
    ///
    /// Zero-length envelopes are a no-op. Envelopes longer than `data`
    /// overlap; the product of both ramps is applied where they meet.
    pub fn apply(&self, data: &mut [f32]) {
        let len = data.len();

        for (sample, w) in data.iter_mut().zip(&self.fade_in) {
            *sample *= w;
        }

        for (i, w) in self.fade_out.iter().enumerate().take(len) {
            data[len - 1 - i] *= w;
        }
    }

    /// Length of the fade-in ramp in samples.
    pub fn fade_in_len(&self) -> usize {
        self.fade_in.len()
    }

    /// Length of the fade-out ramp in samples.
    pub fn fade_out_len(&self) -> usize {
        self.fade_out.len()
    }
}
