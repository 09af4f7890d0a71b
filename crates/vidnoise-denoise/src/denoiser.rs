use vidnoise_tensor::{Tensor4, Tensor5, TensorAllocator};

/// A model that restores the centre frame of a short window of noisy frames.
///
/// The sequence denoiser treats implementors as opaque. Every call receives a
/// window of shape `[batch, window_size, channels, height, width]` and the noise map
/// of the whole batch, and must return one frame per sample with shape
/// `[batch, channels, height, width]`.
pub trait Denoiser<A: TensorAllocator> {
    /// The error returned by a failed invocation.
    type Error;

    /// Number of consecutive frames consumed per invocation.
    fn window_size(&self) -> usize;

    /// Denoise one window of frames.
    ///
    /// # Arguments
    ///
    /// * `window` - Noisy frames with shape `[B, K, C, H, W]`.
    /// * `noise_map` - Per-sample noise description with batch dimension `B`.
    fn denoise(
        &self,
        window: &Tensor5<f32, A>,
        noise_map: &Tensor4<f32, A>,
    ) -> Result<Tensor4<f32, A>, Self::Error>;
}

impl<A: TensorAllocator, D: Denoiser<A> + ?Sized> Denoiser<A> for &D {
    type Error = D::Error;

    fn window_size(&self) -> usize {
        (**self).window_size()
    }

    fn denoise(
        &self,
        window: &Tensor5<f32, A>,
        noise_map: &Tensor4<f32, A>,
    ) -> Result<Tensor4<f32, A>, Self::Error> {
        (**self).denoise(window, noise_map)
    }
}

/// A denoiser backed by a closure.
///
/// # Example
///
/// ```
/// use vidnoise_denoise::{Denoiser, FnDenoiser};
/// use vidnoise_tensor::{CpuAllocator, Tensor4, Tensor5};
///
/// // pass the first frame of the window through
/// let first = FnDenoiser::new(3, |window: &Tensor5<f32, CpuAllocator>, _: &Tensor4<f32, CpuAllocator>| {
///     let [b, _, c, h, w] = window.shape;
///     let frame = window.narrow(1, 0, 1)?;
///     Tensor4::from_shape_vec([b, c, h, w], frame.into_vec(), CpuAllocator)
/// });
/// assert_eq!(Denoiser::<CpuAllocator>::window_size(&first), 3);
/// ```
pub struct FnDenoiser<F> {
    window_size: usize,
    f: F,
}

impl<F> FnDenoiser<F> {
    /// Wrap `f` as a denoiser consuming `window_size` frames.
    pub fn new(window_size: usize, f: F) -> Self {
        Self { window_size, f }
    }
}

impl<A, F, E> Denoiser<A> for FnDenoiser<F>
where
    A: TensorAllocator,
    F: Fn(&Tensor5<f32, A>, &Tensor4<f32, A>) -> Result<Tensor4<f32, A>, E>,
{
    type Error = E;

    fn window_size(&self) -> usize {
        self.window_size
    }

    fn denoise(
        &self,
        window: &Tensor5<f32, A>,
        noise_map: &Tensor4<f32, A>,
    ) -> Result<Tensor4<f32, A>, Self::Error> {
        (self.f)(window, noise_map)
    }
}
