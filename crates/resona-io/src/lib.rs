//! Impulse-response sources for the resona rendering engine.
//!
//! This crate provides:
//! - WAV impulse-response reading via [`wav`]
//! - The SOFA measurement-set data model via [`sofa`]
//! - IR delay text-file parsing via [`delays`]

pub mod delays;
pub mod sofa;
pub mod wav;

pub use delays::read_delay_file;
pub use sofa::SofaData;
pub use wav::IrWavFile;

/// Error types for impulse-response sources.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("WAV file error: {0}")]
    Wav(#[from] hound::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("audio file has no frames or no channels")]
    EmptyAudioFile,

    #[error("SOFA {field} block holds {actual} values, expected {expected}")]
    SofaShape {
        /// Which block is malformed (`"IR"` or `"delay"`).
        field: &'static str,
        /// Number of values found.
        actual: usize,
        /// Number of values the dimensions require.
        expected: usize,
    },

    #[error("SOFA delay measurement count {ndm} exceeds measurement count {nm}")]
    SofaDelayCount {
        /// Number of delay measurements.
        ndm: usize,
        /// Number of IR measurements.
        nm: usize,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
