use vidnoise_tensor::TensorError;

/// An error type for sliding-window sequence denoising.
///
/// `E` is the error type of the denoiser, returned untouched in
/// [`DenoiseError::Denoiser`].
#[derive(thiserror::Error, Debug)]
pub enum DenoiseError<E> {
    /// The sequence is shorter than the denoiser window.
    #[error("Sequence of {time} frames is shorter than the window of {window_size} frames")]
    InvalidWindow {
        /// Number of frames per sample.
        time: usize,
        /// Number of frames the denoiser consumes.
        window_size: usize,
    },

    /// The denoiser reports a window of zero frames.
    #[error("Denoiser window size must be positive")]
    EmptyWindow,

    /// The window stride is zero.
    #[error("Window stride must be positive, got {0}")]
    InvalidStride(usize),

    /// The frames and the noise map disagree on the batch dimension.
    #[error("Batch mismatch: frames hold {batch} samples, noise map holds {noise_map}")]
    ShapeMismatch {
        /// Batch dimension of the frames.
        batch: usize,
        /// Batch dimension of the noise map.
        noise_map: usize,
    },

    /// The denoiser failed.
    #[error(transparent)]
    Denoiser(E),

    /// The denoiser returned a frame with an unexpected shape.
    #[error("Denoiser returned shape {actual:?}, expected {expected:?}")]
    OutputShape {
        /// The `[batch, channels, height, width]` shape of an input frame.
        expected: [usize; 4],
        /// The shape returned by the denoiser.
        actual: [usize; 4],
    },

    /// Error allocating or slicing a tensor.
    #[error(transparent)]
    Tensor(#[from] TensorError),

    /// Error building the worker pool.
    #[error("Failed to build thread pool: {0}")]
    ThreadPool(String),
}

/// An error type for the built-in temporal filters.
#[derive(thiserror::Error, Debug, PartialEq)]
pub enum FilterError {
    /// The window does not hold the number of frames the filter expects.
    #[error("Filter expects windows of {expected} frames, got {actual}")]
    WindowSize {
        /// Frames the filter was configured for.
        expected: usize,
        /// Frames in the window.
        actual: usize,
    },

    /// The noise map does not match the window.
    #[error("Noise map has shape {actual:?}, expected {expected:?}")]
    NoiseMapShape {
        /// The expected `[batch, 1, height, width]` shape.
        expected: [usize; 4],
        /// The noise map shape.
        actual: [usize; 4],
    },

    /// Error creating the output tensor.
    #[error(transparent)]
    Tensor(#[from] TensorError),
}

/// An error type for noise injection.
#[derive(thiserror::Error, Debug, PartialEq)]
pub enum NoiseError {
    /// The standard deviation is negative or not finite.
    #[error("Noise standard deviation must be finite and non negative, got {0}")]
    InvalidStd(f32),

    /// The lower bound of the noise range exceeds the upper bound.
    #[error("Invalid noise range [{min}, {max}]")]
    InvalidRange {
        /// Lower bound.
        min: f32,
        /// Upper bound.
        max: f32,
    },

    /// Error creating the output tensors.
    #[error(transparent)]
    Tensor(#[from] TensorError),
}

/// An error type for image quality metrics.
#[derive(thiserror::Error, Debug, PartialEq)]
pub enum MetricsError {
    /// The tensors have different shapes.
    #[error("Shape mismatch: {left:?} vs {right:?}")]
    ShapeMismatch {
        /// Shape of the first tensor.
        left: Vec<usize>,
        /// Shape of the second tensor.
        right: Vec<usize>,
    },

    /// The batch holds no sample.
    #[error("Cannot compute a metric over an empty batch")]
    EmptyBatch,
}
