//! Resona Engine - multi-channel partitioned-convolution rendering
//!
//! The engine holds a library of impulse responses as frequency-domain
//! filters, binds each rendering channel to one of them, and renders every
//! audio block by running all channels' convolutions in parallel while
//! smoothly ramping per-channel gain and fractional-sample delay.
//!
//! - [`ConvolverManager`] — the top-level coordinator: loading, channel
//!   setup and block dispatch
//! - [`FilterLibrary`] — the partitioned filters, shared read-only with the
//!   render threads
//! - [`DelayTable`] — per-IR `(dynamic, static)` delay pairs
//!
//! ## Example
//!
//! ```rust
//! use resona_core::FadeSpec;
//! use resona_engine::ConvolverManager;
//!
//! // A one-tap (identity) IR, one render channel.
//! let mut manager = ConvolverManager::new(256);
//! let ir = {
//!     let mut ir = vec![0.0f32; 256];
//!     ir[0] = 1.0;
//!     ir
//! };
//! manager.create_irs(&ir, 1, 256, &FadeSpec::NONE);
//! manager.set_worker_count(1);
//! manager.select_ir(0, 0, 0.5, 0.0);
//!
//! let input = vec![1.0f32; 256];
//! let mut output = vec![0.0f32; 256];
//! manager.process(&input, &mut output, 1, 1);
//! ```

mod delay_table;
mod library;
mod manager;
mod worker;

pub use delay_table::{DelayTable, IrDelay};
pub use library::FilterLibrary;
pub use manager::{ConvolverManager, StaticFilterPrep};
pub use worker::MAX_DELAY_SAMPLES;

// The fade and level types appear in the manager API; re-export them so
// engine users don't need a direct resona-core dependency.
pub use resona_core::{FadeSpec, estimate_level};
