use rand::Rng;
use rand_distr::StandardNormal;
use vidnoise_tensor::{Tensor4, Tensor5, TensorAllocator};

use crate::error::NoiseError;

/// Standard deviation of the Gaussian noise added to a batch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NoiseLevel {
    /// The same standard deviation for every sample.
    Fixed(f32),
    /// One standard deviation per sample, drawn uniformly in `[min, max)`.
    Range {
        /// Lower bound.
        min: f32,
        /// Upper bound.
        max: f32,
    },
}

impl NoiseLevel {
    /// Check that the level describes a valid standard deviation.
    pub fn validate(&self) -> Result<(), NoiseError> {
        let check = |std: f32| {
            if std.is_finite() && std >= 0.0 {
                Ok(())
            } else {
                Err(NoiseError::InvalidStd(std))
            }
        };

        match *self {
            NoiseLevel::Fixed(std) => check(std),
            NoiseLevel::Range { min, max } => {
                check(min)?;
                check(max)?;
                if min > max {
                    return Err(NoiseError::InvalidRange { min, max });
                }
                Ok(())
            }
        }
    }

    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f32 {
        match *self {
            NoiseLevel::Fixed(std) => std,
            NoiseLevel::Range { min, max } if min == max => min,
            NoiseLevel::Range { min, max } => rng.random_range(min..max),
        }
    }
}

/// Add zero-mean Gaussian noise to a batch of frame sequences.
///
/// Every sample gets its own standard deviation, see [`NoiseLevel`]. Values are not
/// clamped.
///
/// # Arguments
///
/// * `frames` - Clean frames with shape `[N, T, C, H, W]`.
/// * `level` - The noise standard deviation.
/// * `rng` - The random number generator.
///
/// # Returns
///
/// The noisy frames and the noise map with shape `[N, 1, H, W]`, filled with the
/// standard deviation of each sample.
///
/// # Example
///
/// ```
/// use rand::{rngs::StdRng, SeedableRng};
/// use vidnoise_denoise::noise::{add_video_gaussian_noise, NoiseLevel};
/// use vidnoise_tensor::{CpuAllocator, Tensor5};
///
/// let frames = Tensor5::<f32, _>::zeros([2, 5, 3, 8, 8], CpuAllocator).unwrap();
/// let mut rng = StdRng::seed_from_u64(0);
/// let (noisy, noise_map) =
///     add_video_gaussian_noise(&frames, NoiseLevel::Fixed(25.0 / 255.0), &mut rng).unwrap();
/// assert_eq!(noisy.shape, frames.shape);
/// assert_eq!(noise_map.shape, [2, 1, 8, 8]);
/// ```
pub fn add_video_gaussian_noise<A, R>(
    frames: &Tensor5<f32, A>,
    level: NoiseLevel,
    rng: &mut R,
) -> Result<(Tensor5<f32, A>, Tensor4<f32, A>), NoiseError>
where
    A: TensorAllocator,
    R: Rng + ?Sized,
{
    level.validate()?;

    let [n, t, c, h, w] = frames.shape;
    let stds = (0..n).map(|_| level.sample(rng)).collect::<Vec<_>>();

    let sample_numel = t * c * h * w;
    let mut noisy = frames.as_slice().to_vec();
    for (chunk, &std) in noisy.chunks_exact_mut(sample_numel.max(1)).zip(stds.iter()) {
        for v in chunk.iter_mut() {
            let z: f32 = rng.sample(StandardNormal);
            *v += z * std;
        }
    }

    let noisy = Tensor5::from_shape_vec(frames.shape, noisy, frames.alloc().clone())?;
    let noise_map = Tensor4::from_shape_fn([n, 1, h, w], frames.alloc().clone(), |[i, ..]| {
        stds[i]
    })?;

    Ok((noisy, noise_map))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::{rngs::StdRng, SeedableRng};
    use vidnoise_tensor::CpuAllocator;

    fn mean_std(data: &[f32]) -> (f32, f32) {
        let n = data.len() as f32;
        let mean = data.iter().sum::<f32>() / n;
        let var = data.iter().map(|v| (v - mean).powi(2)).sum::<f32>() / n;
        (mean, var.sqrt())
    }

    #[test]
    fn fixed_noise_statistics() -> Result<(), Box<dyn std::error::Error>> {
        let frames = Tensor5::from_shape_val([2, 4, 3, 32, 32], 0.5f32, CpuAllocator)?;
        let mut rng = StdRng::seed_from_u64(42);

        let (noisy, noise_map) = add_video_gaussian_noise(&frames, NoiseLevel::Fixed(0.1), &mut rng)?;
        assert_eq!(noise_map.shape, [2, 1, 32, 32]);
        assert!(noise_map.as_slice().iter().all(|&s| s == 0.1));

        let (mean, std) = mean_std(noisy.as_slice());
        assert_relative_eq!(mean, 0.5, epsilon = 0.01);
        assert_relative_eq!(std, 0.1, epsilon = 0.01);
        Ok(())
    }

    #[test]
    fn range_noise_per_sample() -> Result<(), Box<dyn std::error::Error>> {
        let frames = Tensor5::<f32, _>::zeros([3, 2, 1, 16, 16], CpuAllocator)?;
        let mut rng = StdRng::seed_from_u64(7);

        let level = NoiseLevel::Range { min: 0.05, max: 0.2 };
        let (noisy, noise_map) = add_video_gaussian_noise(&frames, level, &mut rng)?;

        let plane = 16 * 16;
        let sample = 2 * plane;
        for i in 0..3 {
            let std = noise_map.as_slice()[i * plane];
            assert!((0.05..0.2).contains(&std));
            assert!(noise_map.as_slice()[i * plane..(i + 1) * plane]
                .iter()
                .all(|&s| s == std));

            let (_, measured) = mean_std(&noisy.as_slice()[i * sample..(i + 1) * sample]);
            assert_relative_eq!(measured, std, epsilon = 0.03);
        }
        Ok(())
    }

    #[test]
    fn degenerate_range_and_zero_noise() -> Result<(), Box<dyn std::error::Error>> {
        let frames = Tensor5::from_shape_val([1, 1, 1, 2, 2], 0.25f32, CpuAllocator)?;
        let mut rng = StdRng::seed_from_u64(0);

        let level = NoiseLevel::Range { min: 0.0, max: 0.0 };
        let (noisy, noise_map) = add_video_gaussian_noise(&frames, level, &mut rng)?;
        assert_eq!(noisy.as_slice(), frames.as_slice());
        assert_eq!(noise_map.as_slice(), &[0.0; 4]);
        Ok(())
    }

    #[test]
    fn invalid_levels() {
        assert_eq!(
            NoiseLevel::Fixed(-0.1).validate(),
            Err(NoiseError::InvalidStd(-0.1))
        );
        assert_eq!(
            NoiseLevel::Range { min: 0.3, max: 0.1 }.validate(),
            Err(NoiseError::InvalidRange { min: 0.3, max: 0.1 })
        );
        assert!(NoiseLevel::Fixed(f32::NAN).validate().is_err());
    }
}
