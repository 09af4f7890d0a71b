use rayon::prelude::*;
use vidnoise_tensor::{Tensor4, Tensor5, TensorAllocator};

use crate::{denoiser::Denoiser, error::DenoiseError};

/// Controls how the windows of a sequence are executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionStrategy {
    /// Run the windows one after the other on the current thread.
    #[default]
    Serial,

    /// Use the global Rayon thread pool, one task per window.
    Parallel,

    /// Run on a local thread pool with `n` threads.
    ///
    /// # Warning
    /// Creates a new thread pool on every call.
    Fixed(usize),
}

/// Options of [`denoise_sequence_with`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequenceDenoiseConfig {
    /// Frames between the starts of consecutive windows.
    pub stride: usize,
    /// How the windows are executed.
    pub strategy: ExecutionStrategy,
}

impl Default for SequenceDenoiseConfig {
    fn default() -> Self {
        Self {
            stride: 1,
            strategy: ExecutionStrategy::Serial,
        }
    }
}

/// Number of frames produced from `time` input frames.
///
/// Returns `None` when not even one window fits or when `window_size` or
/// `stride` is zero.
pub fn denoised_length(time: usize, window_size: usize, stride: usize) -> Option<usize> {
    if window_size == 0 || stride == 0 || time < window_size {
        return None;
    }
    Some((time - window_size) / stride + 1)
}

/// Denoise every sample of a batch of frame sequences with a sliding window.
///
/// Output frame `i` is the denoiser result on input frames `[i, i + K)`, where `K`
/// is the denoiser window size, so each sample of `T` frames yields `T - K + 1`
/// frames. Windows run one after the other; see [`denoise_sequence_with`] for
/// strides and parallel execution.
///
/// # Arguments
///
/// * `batch` - Noisy frames with shape `[B, T, C, H, W]`.
/// * `noise_map` - Noise description with batch dimension `B`, forwarded to every
///   denoiser call.
/// * `denoiser` - The model applied to every window.
///
/// # Returns
///
/// The denoised frames with shape `[B, T - K + 1, C, H, W]`, allocated from the
/// allocator of `batch`.
///
/// # Errors
///
/// Shapes are validated before the denoiser is called. Denoiser failures are
/// returned in [`DenoiseError::Denoiser`] without interpretation.
///
/// # Example
///
/// ```
/// use vidnoise_denoise::{denoise_sequence, TemporalMeanDenoiser};
/// use vidnoise_tensor::{CpuAllocator, Tensor4, Tensor5};
///
/// let batch = Tensor5::from_shape_fn([1, 4, 1, 1, 1], CpuAllocator, |[_, t, ..]| t as f32).unwrap();
/// let noise_map = Tensor4::<f32, _>::zeros([1, 1, 1, 1], CpuAllocator).unwrap();
///
/// let out = denoise_sequence(&batch, &noise_map, &TemporalMeanDenoiser::new(3)).unwrap();
/// assert_eq!(out.shape, [1, 2, 1, 1, 1]);
/// assert_eq!(out.as_slice(), &[1.0, 2.0]);
/// ```
pub fn denoise_sequence<A, D>(
    batch: &Tensor5<f32, A>,
    noise_map: &Tensor4<f32, A>,
    denoiser: &D,
) -> Result<Tensor5<f32, A>, DenoiseError<D::Error>>
where
    A: TensorAllocator,
    D: Denoiser<A> + ?Sized,
{
    let plan = WindowPlan::new::<A, D::Error>(batch, noise_map, denoiser.window_size(), 1)?;
    let result = run_serial(&plan, batch, noise_map, denoiser);
    release_cache(&plan, batch, result)
}

/// Denoise a batch of frame sequences with a configurable stride and execution
/// strategy.
///
/// Window `i` covers input frames `[i * stride, i * stride + K)`. All strategies
/// return the same frames; parallel strategies compute windows concurrently and
/// place each result at its own index.
///
/// # Errors
///
/// Besides the errors of [`denoise_sequence`], fails with
/// [`DenoiseError::InvalidStride`] for a zero stride and with
/// [`DenoiseError::ThreadPool`] when a local pool cannot be built.
pub fn denoise_sequence_with<A, D>(
    batch: &Tensor5<f32, A>,
    noise_map: &Tensor4<f32, A>,
    denoiser: &D,
    config: &SequenceDenoiseConfig,
) -> Result<Tensor5<f32, A>, DenoiseError<D::Error>>
where
    A: TensorAllocator + Send + Sync,
    D: Denoiser<A> + Sync + ?Sized,
    D::Error: Send,
{
    let plan =
        WindowPlan::new::<A, D::Error>(batch, noise_map, denoiser.window_size(), config.stride)?;

    let result = match config.strategy {
        ExecutionStrategy::Serial => run_serial(&plan, batch, noise_map, denoiser),
        ExecutionStrategy::Parallel => run_parallel(&plan, batch, noise_map, denoiser),
        ExecutionStrategy::Fixed(0) => {
            return Err(DenoiseError::ThreadPool(
                "thread count must be > 0".to_string(),
            ))
        }
        ExecutionStrategy::Fixed(n) => {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(n)
                .build()
                .map_err(|e| DenoiseError::ThreadPool(e.to_string()))?;
            pool.install(|| run_parallel(&plan, batch, noise_map, denoiser))
        }
    };

    release_cache(&plan, batch, result)
}

// validated geometry of one call
struct WindowPlan {
    window_size: usize,
    stride: usize,
    length: usize,
    // [batch, channels, height, width] of one output frame
    frame_shape: [usize; 4],
}

impl WindowPlan {
    fn new<A: TensorAllocator, E>(
        batch: &Tensor5<f32, A>,
        noise_map: &Tensor4<f32, A>,
        window_size: usize,
        stride: usize,
    ) -> Result<Self, DenoiseError<E>> {
        let [b, time, c, h, w] = batch.shape;

        if noise_map.shape[0] != b {
            return Err(DenoiseError::ShapeMismatch {
                batch: b,
                noise_map: noise_map.shape[0],
            });
        }
        if window_size == 0 {
            return Err(DenoiseError::EmptyWindow);
        }
        if stride == 0 {
            return Err(DenoiseError::InvalidStride(stride));
        }

        let length = denoised_length(time, window_size, stride)
            .ok_or(DenoiseError::InvalidWindow { time, window_size })?;

        Ok(Self {
            window_size,
            stride,
            length,
            frame_shape: [b, c, h, w],
        })
    }

    fn output_shape(&self) -> [usize; 5] {
        let [b, c, h, w] = self.frame_shape;
        [b, self.length, c, h, w]
    }

    fn frame_numel(&self) -> usize {
        self.frame_shape[1..].iter().product()
    }
}

// the window is dropped as soon as the denoiser returns
fn denoise_window<A, D>(
    plan: &WindowPlan,
    batch: &Tensor5<f32, A>,
    noise_map: &Tensor4<f32, A>,
    denoiser: &D,
    index: usize,
) -> Result<Tensor4<f32, A>, DenoiseError<D::Error>>
where
    A: TensorAllocator,
    D: Denoiser<A> + ?Sized,
{
    let window = batch.narrow(1, index * plan.stride, plan.window_size)?;
    let frame = denoiser
        .denoise(&window, noise_map)
        .map_err(DenoiseError::Denoiser)?;

    if frame.shape != plan.frame_shape {
        return Err(DenoiseError::OutputShape {
            expected: plan.frame_shape,
            actual: frame.shape,
        });
    }
    Ok(frame)
}

// copy the [B, C, H, W] frame to output[:, index]
fn write_frame(plan: &WindowPlan, output: &mut [f32], frame: &[f32], index: usize) {
    let numel = plan.frame_numel();
    for (b, src) in frame.chunks_exact(numel.max(1)).enumerate() {
        let offset = (b * plan.length + index) * numel;
        output[offset..offset + numel].copy_from_slice(src);
    }
}

fn run_serial<A, D>(
    plan: &WindowPlan,
    batch: &Tensor5<f32, A>,
    noise_map: &Tensor4<f32, A>,
    denoiser: &D,
) -> Result<Tensor5<f32, A>, DenoiseError<D::Error>>
where
    A: TensorAllocator,
    D: Denoiser<A> + ?Sized,
{
    let mut output = Tensor5::zeros(plan.output_shape(), batch.alloc().clone())?;

    for index in 0..plan.length {
        let frame = denoise_window(plan, batch, noise_map, denoiser, index)?;
        write_frame(plan, output.as_slice_mut(), frame.as_slice(), index);
        log::trace!("denoised window {}/{}", index + 1, plan.length);
    }

    Ok(output)
}

fn run_parallel<A, D>(
    plan: &WindowPlan,
    batch: &Tensor5<f32, A>,
    noise_map: &Tensor4<f32, A>,
    denoiser: &D,
) -> Result<Tensor5<f32, A>, DenoiseError<D::Error>>
where
    A: TensorAllocator + Send + Sync,
    D: Denoiser<A> + Sync + ?Sized,
    D::Error: Send,
{
    let mut output = Tensor5::zeros(plan.output_shape(), batch.alloc().clone())?;

    let frames = (0..plan.length)
        .into_par_iter()
        .map(|index| denoise_window(plan, batch, noise_map, denoiser, index))
        .collect::<Result<Vec<_>, _>>()?;

    for (index, frame) in frames.into_iter().enumerate() {
        write_frame(plan, output.as_slice_mut(), frame.as_slice(), index);
    }

    Ok(output)
}

// runs on success and on failure alike
fn release_cache<A: TensorAllocator, T, E>(
    plan: &WindowPlan,
    batch: &Tensor5<f32, A>,
    result: Result<T, DenoiseError<E>>,
) -> Result<T, DenoiseError<E>> {
    let released = batch.alloc().empty_cache();
    match &result {
        Ok(_) => log::debug!(
            "denoised {} windows of {} frames, released {} cached bytes",
            plan.length,
            plan.window_size,
            released
        ),
        Err(_) => log::debug!(
            "sequence denoising failed, released {} cached bytes",
            released
        ),
    }
    result
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::denoiser::FnDenoiser;
    use vidnoise_tensor::{CachingAllocator, CpuAllocator, TensorError};

    #[derive(Debug, PartialEq, thiserror::Error)]
    #[error("stub failed on window starting with {0}")]
    struct StubError(f32);

    // per-sample mean of the first frame of the window, broadcast to [B, C, H, W]
    fn first_frame_mean<A: TensorAllocator>(
        window: &Tensor5<f32, A>,
    ) -> Result<Tensor4<f32, A>, TensorError> {
        let [b, k, c, h, w] = window.shape;
        let numel = c * h * w;
        let data = window.as_slice();
        let means = (0..b)
            .map(|i| {
                let start = i * k * numel;
                data[start..start + numel].iter().sum::<f32>() / numel as f32
            })
            .collect::<Vec<_>>();
        Tensor4::from_shape_fn([b, c, h, w], window.alloc().clone(), |[i, ..]| means[i])
    }

    fn mean_stub<A: TensorAllocator>(
        window_size: usize,
    ) -> FnDenoiser<
        impl Fn(&Tensor5<f32, A>, &Tensor4<f32, A>) -> Result<Tensor4<f32, A>, TensorError>,
    > {
        FnDenoiser::new(window_size, |window: &Tensor5<f32, A>, _: &Tensor4<f32, A>| {
            first_frame_mean(window)
        })
    }

    fn ramp_batch<A: TensorAllocator>(
        shape: [usize; 5],
        alloc: A,
    ) -> Result<Tensor5<f32, A>, TensorError> {
        let numel = shape.iter().product::<usize>();
        Tensor5::from_shape_vec(shape, (0..numel).map(|v| v as f32).collect(), alloc)
    }

    #[test]
    fn output_frames_follow_input_windows() -> Result<(), Box<dyn std::error::Error>> {
        let batch = ramp_batch([2, 5, 1, 2, 2], CpuAllocator)?;
        let noise_map = Tensor4::<f32, _>::zeros([2, 1, 2, 2], CpuAllocator)?;
        let stub = mean_stub::<CpuAllocator>(3);

        let out = denoise_sequence(&batch, &noise_map, &stub)?;
        assert_eq!(out.shape, [2, 3, 1, 2, 2]);

        // input frame t of sample b holds 20 * b + 4 * t + [0, 1, 2, 3]
        for b in 0..2 {
            for i in 0..3 {
                let mean = (20 * b + 4 * i) as f32 + 1.5;
                for y in 0..2 {
                    for x in 0..2 {
                        assert_eq!(out.get([b, i, 0, y, x]), Some(&mean));
                    }
                }
            }
        }
        Ok(())
    }

    #[test]
    fn batch_mismatch_skips_denoiser() -> Result<(), Box<dyn std::error::Error>> {
        let calls = AtomicUsize::new(0);
        let stub = FnDenoiser::new(
            3,
            |window: &Tensor5<f32, CpuAllocator>, _: &Tensor4<f32, CpuAllocator>| {
                calls.fetch_add(1, Ordering::SeqCst);
                first_frame_mean(window)
            },
        );

        let batch = ramp_batch([2, 5, 1, 2, 2], CpuAllocator)?;
        let noise_map = Tensor4::<f32, _>::zeros([3, 1, 2, 2], CpuAllocator)?;

        let res = denoise_sequence(&batch, &noise_map, &stub);
        assert!(matches!(
            res,
            Err(DenoiseError::ShapeMismatch {
                batch: 2,
                noise_map: 3
            })
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        Ok(())
    }

    #[test]
    fn short_sequence_skips_denoiser() -> Result<(), Box<dyn std::error::Error>> {
        let calls = AtomicUsize::new(0);
        let stub = FnDenoiser::new(
            5,
            |window: &Tensor5<f32, CpuAllocator>, _: &Tensor4<f32, CpuAllocator>| {
                calls.fetch_add(1, Ordering::SeqCst);
                first_frame_mean(window)
            },
        );

        let batch = ramp_batch([1, 4, 1, 2, 2], CpuAllocator)?;
        let noise_map = Tensor4::<f32, _>::zeros([1, 1, 2, 2], CpuAllocator)?;

        let res = denoise_sequence(&batch, &noise_map, &stub);
        assert!(matches!(
            res,
            Err(DenoiseError::InvalidWindow {
                time: 4,
                window_size: 5
            })
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        Ok(())
    }

    #[test]
    fn window_as_long_as_sequence() -> Result<(), Box<dyn std::error::Error>> {
        let batch = ramp_batch([1, 5, 1, 2, 2], CpuAllocator)?;
        let noise_map = Tensor4::<f32, _>::zeros([1, 1, 2, 2], CpuAllocator)?;
        let stub = mean_stub::<CpuAllocator>(5);

        let out = denoise_sequence(&batch, &noise_map, &stub)?;
        assert_eq!(out.shape, [1, 1, 1, 2, 2]);
        assert_eq!(out.as_slice(), &[1.5; 4]);
        Ok(())
    }

    #[test]
    fn zero_window_and_stride() -> Result<(), Box<dyn std::error::Error>> {
        let batch = ramp_batch([1, 5, 1, 1, 1], CpuAllocator)?;
        let noise_map = Tensor4::<f32, _>::zeros([1, 1, 1, 1], CpuAllocator)?;

        let empty = mean_stub::<CpuAllocator>(0);
        assert!(matches!(
            denoise_sequence(&batch, &noise_map, &empty),
            Err(DenoiseError::EmptyWindow)
        ));

        let stub = mean_stub::<CpuAllocator>(3);
        let config = SequenceDenoiseConfig {
            stride: 0,
            ..Default::default()
        };
        assert!(matches!(
            denoise_sequence_with(&batch, &noise_map, &stub, &config),
            Err(DenoiseError::InvalidStride(0))
        ));
        Ok(())
    }

    #[test]
    fn windows_are_isolated() -> Result<(), Box<dyn std::error::Error>> {
        let noise_map = Tensor4::<f32, _>::zeros([1, 1, 1, 1], CpuAllocator)?;
        let stub = mean_stub::<CpuAllocator>(3);

        let batch = ramp_batch([1, 6, 1, 1, 1], CpuAllocator)?;
        let reference = denoise_sequence(&batch, &noise_map, &stub)?;

        // frame 5 only belongs to the last window
        let mut data = batch.into_vec();
        data[5] = 100.0;
        let changed = Tensor5::from_shape_vec([1, 6, 1, 1, 1], data, CpuAllocator)?;
        let out = denoise_sequence(&changed, &noise_map, &stub)?;

        assert_eq!(out.as_slice()[..3], reference.as_slice()[..3]);
        Ok(())
    }

    #[test]
    fn stride_selects_windows() -> Result<(), Box<dyn std::error::Error>> {
        let batch = ramp_batch([1, 7, 1, 1, 1], CpuAllocator)?;
        let noise_map = Tensor4::<f32, _>::zeros([1, 1, 1, 1], CpuAllocator)?;
        let stub = mean_stub::<CpuAllocator>(3);

        let config = SequenceDenoiseConfig {
            stride: 2,
            ..Default::default()
        };
        let out = denoise_sequence_with(&batch, &noise_map, &stub, &config)?;
        assert_eq!(out.shape, [1, 3, 1, 1, 1]);
        assert_eq!(out.as_slice(), &[0.0, 2.0, 4.0]);
        Ok(())
    }

    #[test]
    fn strategies_agree() -> Result<(), Box<dyn std::error::Error>> {
        let batch = ramp_batch([3, 9, 2, 3, 4], CpuAllocator)?;
        let noise_map = Tensor4::<f32, _>::zeros([3, 1, 3, 4], CpuAllocator)?;
        let stub = mean_stub::<CpuAllocator>(5);

        let serial = denoise_sequence(&batch, &noise_map, &stub)?;
        for strategy in [ExecutionStrategy::Parallel, ExecutionStrategy::Fixed(3)] {
            let config = SequenceDenoiseConfig {
                stride: 1,
                strategy,
            };
            let out = denoise_sequence_with(&batch, &noise_map, &stub, &config)?;
            assert_eq!(out.shape, serial.shape);
            assert_eq!(out.as_slice(), serial.as_slice());
        }

        let config = SequenceDenoiseConfig {
            stride: 1,
            strategy: ExecutionStrategy::Fixed(0),
        };
        assert!(matches!(
            denoise_sequence_with(&batch, &noise_map, &stub, &config),
            Err(DenoiseError::ThreadPool(_))
        ));
        Ok(())
    }

    #[test]
    fn denoiser_error_is_returned_unchanged() -> Result<(), Box<dyn std::error::Error>> {
        let batch = ramp_batch([1, 5, 1, 1, 1], CpuAllocator)?;
        let noise_map = Tensor4::<f32, _>::zeros([1, 1, 1, 1], CpuAllocator)?;
        let failing = FnDenoiser::new(
            2,
            |window: &Tensor5<f32, CpuAllocator>, _: &Tensor4<f32, CpuAllocator>| {
                let first = window.as_slice()[0];
                if first >= 2.0 {
                    return Err(StubError(first));
                }
                first_frame_mean(window).map_err(|_| StubError(-1.0))
            },
        );

        match denoise_sequence(&batch, &noise_map, &failing) {
            Err(DenoiseError::Denoiser(err)) => {
                assert_eq!(err, StubError(2.0));
                assert_eq!(
                    DenoiseError::Denoiser(err).to_string(),
                    "stub failed on window starting with 2"
                );
            }
            _ => return Err("expected a denoiser error".into()),
        }
        Ok(())
    }

    #[test]
    fn output_shape_is_checked() -> Result<(), Box<dyn std::error::Error>> {
        let batch = ramp_batch([1, 3, 1, 2, 2], CpuAllocator)?;
        let noise_map = Tensor4::<f32, _>::zeros([1, 1, 2, 2], CpuAllocator)?;
        let wrong = FnDenoiser::new(
            3,
            |_: &Tensor5<f32, CpuAllocator>, _: &Tensor4<f32, CpuAllocator>| {
                Tensor4::<f32, _>::zeros([1, 1, 1, 1], CpuAllocator)
            },
        );

        assert!(matches!(
            denoise_sequence(&batch, &noise_map, &wrong),
            Err(DenoiseError::OutputShape {
                expected: [1, 1, 2, 2],
                actual: [1, 1, 1, 1]
            })
        ));
        Ok(())
    }

    #[test]
    fn cache_is_emptied() -> Result<(), Box<dyn std::error::Error>> {
        let _ = env_logger::builder().is_test(true).try_init();

        let alloc = CachingAllocator::new();
        let batch = ramp_batch([2, 6, 1, 4, 4], alloc.clone())?;
        let noise_map = Tensor4::<f32, _>::zeros([2, 1, 4, 4], alloc.clone())?;
        let stub = mean_stub::<CachingAllocator>(3);

        let out = denoise_sequence(&batch, &noise_map, &stub)?;
        assert_eq!(out.shape, [2, 4, 1, 4, 4]);

        let stats = alloc.stats();
        assert_eq!(stats.cached_bytes, 0);
        assert!(stats.releases >= 1);

        // also after a failing denoiser
        let failing = FnDenoiser::new(
            3,
            |window: &Tensor5<f32, CachingAllocator>,
             _: &Tensor4<f32, CachingAllocator>|
             -> Result<Tensor4<f32, CachingAllocator>, StubError> {
                let _ = first_frame_mean(window);
                Err(StubError(0.0))
            },
        );
        assert!(denoise_sequence(&batch, &noise_map, &failing).is_err());
        let after = alloc.stats();
        assert_eq!(after.cached_bytes, 0);
        assert!(after.releases > stats.releases);
        Ok(())
    }
}
