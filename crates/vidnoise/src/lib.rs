#![doc = include_str!(concat!("../", env!("CARGO_PKG_README")))]

#[doc(inline)]
pub use vidnoise_tensor as tensor;

#[doc(inline)]
pub use vidnoise_image as image;

#[doc(inline)]
pub use vidnoise_io as io;

#[doc(inline)]
pub use vidnoise_denoise as denoise;

#[doc(inline)]
pub use vidnoise_options as options;
