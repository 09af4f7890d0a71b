#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]
//!
//! The entry point is [`denoise_sequence`]: a window of `K` consecutive frames
//! slides over every sample of a `[B, T, C, H, W]` batch and a [`Denoiser`] turns
//! each window into one restored frame, yielding `T - K + 1` frames per sample.

/// The denoiser capability and a closure adapter.
pub mod denoiser;

/// Error types of the crate.
pub mod error;

/// Deterministic temporal filters usable as denoisers.
pub mod filters;

/// Image quality metrics.
pub mod metrics;

/// Synthetic Gaussian noise for video batches.
pub mod noise;

/// Sliding-window orchestration over frame sequences.
pub mod sequence;

pub use crate::denoiser::{Denoiser, FnDenoiser};
pub use crate::error::{DenoiseError, FilterError, MetricsError, NoiseError};
pub use crate::filters::{TemporalMeanDenoiser, TemporalWienerDenoiser};
pub use crate::sequence::{
    denoise_sequence, denoise_sequence_with, denoised_length, ExecutionStrategy,
    SequenceDenoiseConfig,
};
