use vidnoise_tensor::TensorError;

/// An error type for the image module.
#[derive(thiserror::Error, Debug, PartialEq)]
pub enum ImageError {
    /// Error when the data length does not match the image size.
    #[error("Data length ({0}) does not match the image size ({1})")]
    InvalidChannelShape(usize, usize),

    /// Error when a region does not fit inside the image.
    #[error("Region at ({0}, {1}) of size {2}x{3} exceeds the image bounds")]
    RegionOutOfBounds(usize, usize, usize, usize),

    /// Error with the underlying tensor.
    #[error("Error with the tensor: {0}")]
    TensorError(#[from] TensorError),
}
