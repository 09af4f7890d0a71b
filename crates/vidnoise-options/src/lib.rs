#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

/// Accepted values of the choice options.
pub mod choices;

/// Error types for the options module.
pub mod error;

/// Option structs, formatting and persistence.
pub mod options;

pub use crate::choices::{Dataset, LrPolicy, ModelKind};
pub use crate::error::OptionsError;
pub use crate::options::{Options, Phase, TestOptions, TrainOptions};
