use rayon::prelude::*;
use vidnoise_tensor::{Tensor4, Tensor5, TensorAllocator};

use crate::{denoiser::Denoiser, error::FilterError};

fn check_window<A: TensorAllocator>(
    window: &Tensor5<f32, A>,
    window_size: usize,
) -> Result<(), FilterError> {
    if window.shape[1] != window_size {
        return Err(FilterError::WindowSize {
            expected: window_size,
            actual: window.shape[1],
        });
    }
    Ok(())
}

// apply `f` to the temporal samples of every pixel, writing a [B, C, H, W] frame
fn reduce_window<A, F>(window: &Tensor5<f32, A>, f: F) -> Result<Tensor4<f32, A>, FilterError>
where
    A: TensorAllocator,
    F: Fn(usize, usize, &[f32]) -> f32 + Send + Sync,
{
    let [b, k, c, h, w] = window.shape;
    let numel = c * h * w;
    let src = window.as_slice();

    let mut data = vec![0.0f32; b * numel];
    data.par_chunks_exact_mut(numel.max(1))
        .enumerate()
        .for_each(|(sample, dst)| {
            let base = sample * k * numel;
            let mut samples = vec![0.0f32; k];
            for (p, out) in dst.iter_mut().enumerate() {
                for (t, v) in samples.iter_mut().enumerate() {
                    *v = src[base + t * numel + p];
                }
                *out = f(sample, p, &samples);
            }
        });

    Ok(Tensor4::from_shape_vec(
        [b, c, h, w],
        data,
        window.alloc().clone(),
    )?)
}

/// Per-pixel temporal average of the window.
///
/// The noise map is ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TemporalMeanDenoiser {
    /// Number of frames averaged per output frame.
    pub window_size: usize,
}

impl TemporalMeanDenoiser {
    /// Create a filter averaging `window_size` frames.
    pub fn new(window_size: usize) -> Self {
        Self { window_size }
    }
}

impl<A: TensorAllocator> Denoiser<A> for TemporalMeanDenoiser {
    type Error = FilterError;

    fn window_size(&self) -> usize {
        self.window_size
    }

    fn denoise(
        &self,
        window: &Tensor5<f32, A>,
        _noise_map: &Tensor4<f32, A>,
    ) -> Result<Tensor4<f32, A>, Self::Error> {
        check_window(window, self.window_size)?;
        reduce_window(window, |_, _, samples| {
            samples.iter().sum::<f32>() / samples.len() as f32
        })
    }
}

/// Temporal Wiener shrinkage of the centre frame of the window.
///
/// For every pixel with temporal mean `m`, temporal variance `var` and noise
/// standard deviation `sigma` read from the noise map, the output is
///
/// $ out = m + \frac{\max(var - \sigma^2, 0)}{var} (centre - m) $
///
/// and `m` when `var` is zero. Flat regions collapse to the mean while moving
/// edges, whose variance exceeds the noise level, keep the centre value.
///
/// The noise map must have shape `[B, 1, H, W]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TemporalWienerDenoiser {
    /// Number of frames per window, the centre frame is `window_size / 2`.
    pub window_size: usize,
}

impl TemporalWienerDenoiser {
    /// Create a filter over windows of `window_size` frames.
    pub fn new(window_size: usize) -> Self {
        Self { window_size }
    }
}

impl<A: TensorAllocator> Denoiser<A> for TemporalWienerDenoiser {
    type Error = FilterError;

    fn window_size(&self) -> usize {
        self.window_size
    }

    fn denoise(
        &self,
        window: &Tensor5<f32, A>,
        noise_map: &Tensor4<f32, A>,
    ) -> Result<Tensor4<f32, A>, Self::Error> {
        check_window(window, self.window_size)?;

        let [b, _, _, h, w] = window.shape;
        if noise_map.shape != [b, 1, h, w] {
            return Err(FilterError::NoiseMapShape {
                expected: [b, 1, h, w],
                actual: noise_map.shape,
            });
        }

        let sigma = noise_map.as_slice();
        let plane = h * w;
        let centre = self.window_size / 2;

        reduce_window(window, |sample, p, samples| {
            let n = samples.len() as f32;
            let mean = samples.iter().sum::<f32>() / n;
            let var = samples.iter().map(|v| (v - mean).powi(2)).sum::<f32>() / n;
            if var == 0.0 {
                return mean;
            }
            let s = sigma[sample * plane + p % plane];
            let gain = (var - s * s).max(0.0) / var;
            mean + gain * (samples[centre] - mean)
        })
    }
}
