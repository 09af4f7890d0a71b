mod config;
mod plan;

use std::path::{Path, PathBuf};

use rand::{rngs::StdRng, seq::SliceRandom, Rng, SeedableRng};
use rayon::prelude::*;
use vidnoise_image::{convert::image_to_frame, ops::crop_image, Image, ImageSize};
use vidnoise_tensor::{Tensor5, TensorAllocator};

use crate::{
    error::IoError,
    file_list::{list_frames, read_file_list, VideoEntry},
    png::read_image_png_rgb8,
};

pub use config::LoaderConfig;
pub use plan::{crop_origin, plan_sequences, SequenceIndex};

// range of the normalized crop position
const CROP_POS_MIN: f32 = 0.2;
const CROP_POS_MAX: f32 = 1.0;

/// A batch of frame sequences.
pub struct SequenceBatch<A: TensorAllocator> {
    /// Frames with shape `[N, F, 3, H, W]`.
    pub frames: Tensor5<f32, A>,
    /// Label of the video of every sequence.
    pub labels: Vec<i64>,
}

impl<A: TensorAllocator> SequenceBatch<A> {
    /// Number of sequences in the batch.
    pub fn len(&self) -> usize {
        self.frames.shape[0]
    }

    /// Whether the batch holds no sequence.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

struct Video {
    frames: Vec<PathBuf>,
    label: i64,
}

/// Loads batches of fixed length frame sequences from directories of png frames.
///
/// The loader is an iterator over batches. After `len()` sequences it yields
/// `None` once and then starts a new epoch on the next call.
///
/// # Example
///
/// ```no_run
/// use vidnoise_io::{LoaderConfig, SequenceLoader};
/// use vidnoise_tensor::CpuAllocator;
///
/// let config = LoaderConfig {
///     batch_size: 4,
///     sequence_length: 5,
///     crop_size: Some(96),
///     ..Default::default()
/// };
/// let mut loader = SequenceLoader::new("trainlist.txt", config, CpuAllocator).unwrap();
/// for batch in loader.by_ref() {
///     let batch = batch.unwrap();
///     assert_eq!(batch.frames.shape[1..3], [5, 3]);
/// }
/// ```
pub struct SequenceLoader<A: TensorAllocator> {
    config: LoaderConfig,
    videos: Vec<Video>,
    sequences: Vec<SequenceIndex>,
    order: Vec<usize>,
    epoch_size: usize,
    cursor: usize,
    epoch: usize,
    rng: StdRng,
    alloc: A,
}

impl<A: TensorAllocator> SequenceLoader<A> {
    /// Create a loader over the videos of a file list.
    ///
    /// # Arguments
    ///
    /// * `file_list` - Path to the file list, see [`read_file_list`].
    /// * `config` - The loader configuration.
    /// * `alloc` - Allocator of the batch tensors.
    pub fn new(
        file_list: impl AsRef<Path>,
        config: LoaderConfig,
        alloc: A,
    ) -> Result<Self, IoError> {
        let entries = read_file_list(file_list)?;
        Self::from_entries(&entries, config, alloc)
    }

    /// Create a loader over already parsed video entries.
    pub fn from_entries(
        entries: &[VideoEntry],
        config: LoaderConfig,
        alloc: A,
    ) -> Result<Self, IoError> {
        config.validate()?;

        let videos = entries
            .iter()
            .map(|entry| {
                Ok(Video {
                    frames: list_frames(&entry.frames_dir)?,
                    label: entry.label,
                })
            })
            .collect::<Result<Vec<_>, IoError>>()?;

        let frame_counts = videos.iter().map(|v| v.frames.len()).collect::<Vec<_>>();
        let sequences = plan_sequences(
            &frame_counts,
            config.sequence_length,
            config.effective_step(),
            config.stride,
        );
        if sequences.is_empty() {
            return Err(IoError::NoSequences {
                sequence_length: config.sequence_length,
                stride: config.stride,
            });
        }

        let epoch_size = if config.epoch_size <= 0 {
            sequences.len()
        } else {
            config.epoch_size as usize
        };

        log::debug!(
            "sequence loader: {} videos, {} sequences, epoch of {} samples",
            videos.len(),
            sequences.len(),
            epoch_size
        );

        let mut loader = Self {
            rng: StdRng::seed_from_u64(config.seed),
            config,
            videos,
            sequences,
            order: Vec::new(),
            epoch_size,
            cursor: 0,
            epoch: 0,
            alloc,
        };
        loader.order = loader.epoch_order();
        Ok(loader)
    }

    /// Number of sequences per epoch.
    pub fn len(&self) -> usize {
        self.epoch_size
    }

    /// Whether an epoch holds no sequence.
    pub fn is_empty(&self) -> bool {
        self.epoch_size == 0
    }

    /// Number of batches per epoch, counting a trailing partial batch.
    pub fn num_batches(&self) -> usize {
        self.epoch_size.div_ceil(self.config.batch_size)
    }

    /// Number of sequences found in the dataset.
    pub fn num_sequences(&self) -> usize {
        self.sequences.len()
    }

    /// Index of the current epoch, starting at 0.
    pub fn epoch(&self) -> usize {
        self.epoch
    }

    /// The loader configuration.
    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    /// Start a new epoch, discarding what is left of the current one.
    pub fn reset(&mut self) {
        self.cursor = 0;
        self.epoch += 1;
        self.order = self.epoch_order();
    }

    // the epoch cycles through the sequences, reshuffled on every pass
    fn epoch_order(&mut self) -> Vec<usize> {
        let num_sequences = self.sequences.len();
        let mut order = Vec::with_capacity(self.epoch_size);
        while order.len() < self.epoch_size {
            let mut pass = (0..num_sequences).collect::<Vec<_>>();
            if self.config.random_shuffle {
                pass.shuffle(&mut self.rng);
            }
            let take = (self.epoch_size - order.len()).min(num_sequences);
            order.extend_from_slice(&pass[..take]);
        }
        order
    }

    fn load_batch(&mut self, picks: &[usize]) -> Result<SequenceBatch<A>, IoError> {
        let jobs = picks
            .iter()
            .map(|&i| {
                let pos = self.config.crop_size.map(|_| {
                    let px = self.rng.random_range(CROP_POS_MIN..CROP_POS_MAX);
                    let py = self.rng.random_range(CROP_POS_MIN..CROP_POS_MAX);
                    (px, py)
                });
                (self.sequences[i], pos)
            })
            .collect::<Vec<_>>();

        let videos = &self.videos;
        let config = &self.config;
        let samples = jobs
            .par_iter()
            .map(|(seq, pos)| read_sequence(&videos[seq.video], seq.start, config, *pos))
            .collect::<Result<Vec<_>, IoError>>()?;

        // full frames of different videos may differ in size
        let size = samples[0].1;
        for (job, (_, sample_size)) in jobs.iter().zip(samples.iter()) {
            if *sample_size != size {
                let video = &self.videos[job.0.video];
                return Err(IoError::FrameSizeMismatch {
                    path: video.frames[job.0.start].clone(),
                    expected: size,
                    actual: *sample_size,
                });
            }
        }

        let shape = [
            samples.len(),
            self.config.sequence_length,
            3,
            size.height,
            size.width,
        ];
        let mut data = Vec::with_capacity(shape.iter().product());
        for (sample, _) in samples {
            data.extend(sample);
        }

        let labels = jobs
            .iter()
            .map(|(seq, _)| self.videos[seq.video].label)
            .collect();

        Ok(SequenceBatch {
            frames: Tensor5::from_shape_vec(shape, data, self.alloc.clone())?,
            labels,
        })
    }
}

impl<A: TensorAllocator> Iterator for SequenceLoader<A> {
    type Item = Result<SequenceBatch<A>, IoError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.cursor >= self.epoch_size {
            log::debug!("sequence loader: epoch {} done", self.epoch);
            self.reset();
            return None;
        }

        let end = (self.cursor + self.config.batch_size).min(self.epoch_size);
        let picks = self.order[self.cursor..end].to_vec();
        self.cursor = end;

        log::trace!("sequence loader: batch of {} sequences", picks.len());
        Some(self.load_batch(&picks))
    }
}

// decode one sequence into planar [F, 3, H, W] data
fn read_sequence(
    video: &Video,
    start: usize,
    config: &LoaderConfig,
    crop_pos: Option<(f32, f32)>,
) -> Result<(Vec<f32>, ImageSize), IoError> {
    let mut data = Vec::new();
    let mut first_size: Option<ImageSize> = None;

    for k in 0..config.sequence_length {
        let path = &video.frames[start + k * config.stride];
        let image = read_image_png_rgb8(path)?;

        let size = image.size();
        match first_size {
            None => first_size = Some(size),
            Some(expected) if expected != size => {
                return Err(IoError::FrameSizeMismatch {
                    path: path.clone(),
                    expected,
                    actual: size,
                })
            }
            Some(_) => {}
        }

        let frame = match (config.crop_size, crop_pos) {
            (Some(crop), Some((px, py))) => {
                if crop > size.width || crop > size.height {
                    return Err(IoError::CropTooLarge { crop, size });
                }
                let x = crop_origin(px, size.width, crop);
                let y = crop_origin(py, size.height, crop);
                let mut cropped = Image::<u8, 3>::from_size_val([crop, crop].into(), 0)?;
                crop_image(&image, &mut cropped, x, y)?;
                cropped
            }
            _ => image,
        };

        data.extend(image_to_frame(&frame, config.normalized));
    }

    let size = match (config.crop_size, first_size) {
        (Some(crop), _) => ImageSize {
            width: crop,
            height: crop,
        },
        (None, Some(size)) => size,
        (None, None) => ImageSize {
            width: 0,
            height: 0,
        },
    };
    Ok((data, size))
}
