#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

/// image representation for computer vision purposes.
pub mod image;

/// Error types for the image module.
pub mod error;

/// conversions between tensor frames and images.
pub mod convert;

/// basic image operations.
pub mod ops;

pub use crate::convert::{ConvertError, FrameImage};
pub use crate::error::ImageError;
pub use crate::image::{Image, ImageSize};
