#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

/// Error types for the io module.
pub mod error;

/// Parsing of video file lists.
pub mod file_list;

/// Batched frame sequence loader.
pub mod loader;

/// PNG image encoding and decoding utilities.
pub mod png;

pub use crate::error::IoError;
pub use crate::loader::{LoaderConfig, SequenceBatch, SequenceLoader};
