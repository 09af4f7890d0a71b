use crate::error::IoError;

/// Configuration of a [`SequenceLoader`](super::SequenceLoader).
#[derive(Clone, Debug, PartialEq)]
pub struct LoaderConfig {
    /// Number of sequences per batch.
    pub batch_size: usize,
    /// Number of frames per sequence.
    pub sequence_length: usize,
    /// Side of the square crop taken from every frame, or `None` to keep full frames.
    pub crop_size: Option<usize>,
    /// Frames between the starts of consecutive sequences of a video.
    ///
    /// Non positive values use `sequence_length`, so sequences do not overlap.
    pub step: i64,
    /// Distance between consecutive frames of a sequence.
    pub stride: usize,
    /// Shuffle the sequences at the start of every epoch.
    pub random_shuffle: bool,
    /// Number of sequences per epoch.
    ///
    /// Non positive values use the number of available sequences.
    pub epoch_size: i64,
    /// Scale pixel values to `[0, 1]`.
    pub normalized: bool,
    /// Seed of the shuffling and cropping generator.
    pub seed: u64,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            batch_size: 1,
            sequence_length: 5,
            crop_size: None,
            step: -1,
            stride: 1,
            random_shuffle: true,
            epoch_size: -1,
            normalized: true,
            seed: 12,
        }
    }
}

impl LoaderConfig {
    /// The effective distance between sequence starts.
    pub fn effective_step(&self) -> usize {
        if self.step <= 0 {
            self.sequence_length
        } else {
            self.step as usize
        }
    }

    /// Check that the configuration can produce batches.
    pub fn validate(&self) -> Result<(), IoError> {
        if self.batch_size == 0 {
            return Err(IoError::InvalidConfig("batch_size must be positive".into()));
        }
        if self.sequence_length == 0 {
            return Err(IoError::InvalidConfig(
                "sequence_length must be positive".into(),
            ));
        }
        if self.stride == 0 {
            return Err(IoError::InvalidConfig("stride must be positive".into()));
        }
        if self.crop_size == Some(0) {
            return Err(IoError::InvalidConfig("crop_size must be positive".into()));
        }
        Ok(())
    }
}
