use std::path::PathBuf;

use vidnoise_image::{ImageError, ImageSize};
use vidnoise_tensor::TensorError;

/// An error type for the io module.
#[derive(thiserror::Error, Debug)]
pub enum IoError {
    /// Error when the file does not exist.
    #[error("File does not exist: {0}")]
    FileDoesNotExist(PathBuf),

    /// Invalid file extension.
    #[error("File is does not have a valid extension: {0}")]
    InvalidFileExtension(PathBuf),

    /// Error to open the file.
    #[error("Failed to manipulate the file. {0}")]
    FileError(#[from] std::io::Error),

    /// Error to walk a frames directory.
    #[error("Failed to list the frames directory. {0}")]
    WalkDirError(#[from] walkdir::Error),

    /// Error to create the image.
    #[error("Failed to create image. {0}")]
    ImageCreationError(#[from] ImageError),

    /// Error to build a batch tensor.
    #[error("Failed to create tensor. {0}")]
    TensorError(#[from] TensorError),

    /// Error to encode the PNG image.
    #[error("Failed to encode the png image. {0}")]
    PngEncodingError(String),

    /// Error to decode the PNG image.
    #[error("Failed to decode the png image. {0}")]
    PngDecodeError(String),

    /// A line of a file list could not be parsed.
    #[error("Failed to parse line {line} of {path}: {reason}")]
    FileListParse {
        /// The file list path.
        path: PathBuf,
        /// The 1-based line number.
        line: usize,
        /// What went wrong.
        reason: String,
    },

    /// The file list has no entries.
    #[error("File list does not contain any video: {0}")]
    EmptyFileList(PathBuf),

    /// A frames directory holds no png frame.
    #[error("Directory does not contain any png frame: {0}")]
    NoFrames(PathBuf),

    /// No video is long enough for a single sequence.
    #[error("No video holds a sequence of {sequence_length} frames with stride {stride}")]
    NoSequences {
        /// Frames per sequence.
        sequence_length: usize,
        /// Distance between consecutive frames.
        stride: usize,
    },

    /// Frames of one batch do not share a size.
    #[error("Frame {path} has size {actual}, expected {expected}")]
    FrameSizeMismatch {
        /// The offending frame.
        path: PathBuf,
        /// The size of the first frame.
        expected: ImageSize,
        /// The size of the offending frame.
        actual: ImageSize,
    },

    /// The crop window does not fit in a frame.
    #[error("Crop of {crop} pixels exceeds frame of {size}")]
    CropTooLarge {
        /// The crop side in pixels.
        crop: usize,
        /// The frame size.
        size: ImageSize,
    },

    /// The loader configuration is not usable.
    #[error("Invalid loader configuration: {0}")]
    InvalidConfig(String),
}
