//! Resona Core - DSP primitives for partitioned-convolution rendering
//!
//! This crate provides the signal-processing building blocks used by the
//! resona rendering engine:
//!
//! - [`FadeSpec`] and [`FadeWindows`] for trimming impulse responses with
//!   raised-cosine envelopes
//! - [`ConvContext`], [`Filter`] and [`BlockConvolver`] for uniformly
//!   partitioned FFT convolution with one-block filter crossfades
//! - [`interp`] for fractional-sample reads from circular delay buffers
//! - [`estimate_level`] for short-window filter level estimation
//!
//! ## Example
//!
//! ```rust
//! use resona_core::{BlockConvolver, ConvContext, Filter};
//! use std::sync::Arc;
//!
//! let ctx = Arc::new(ConvContext::new(256));
//! let filter = Arc::new(Filter::new(&ctx, &[1.0, 0.5, 0.25]));
//!
//! let mut conv = BlockConvolver::new(Arc::clone(&ctx), filter.partitions());
//! conv.set_filter(&filter).unwrap();
//!
//! let input = vec![0.0f32; 256];
//! let mut output = vec![0.0f32; 256];
//! conv.filter_block(&input, &mut output);
//! ```

pub mod conv;
pub mod fade;
pub mod interp;
pub mod level;

// Re-export main types at crate root
pub use conv::{BlockConvolver, ConvContext, ConvError, Filter};
pub use fade::{FadeSpec, FadeWindows, Trim};
pub use level::estimate_level;
