use vidnoise_tensor::{Tensor, TensorAllocator};

use crate::error::MetricsError;

fn check_shapes<const N: usize, A: TensorAllocator>(
    a: &Tensor<f32, N, A>,
    b: &Tensor<f32, N, A>,
) -> Result<(), MetricsError> {
    if a.shape != b.shape {
        return Err(MetricsError::ShapeMismatch {
            left: a.shape.to_vec(),
            right: b.shape.to_vec(),
        });
    }
    Ok(())
}

fn mse_slice(a: &[f32], b: &[f32]) -> f32 {
    let sum = a
        .iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y).powi(2))
        .sum::<f32>();
    sum / a.len().max(1) as f32
}

fn psnr_from_mse(mse: f32, max_value: f32) -> f32 {
    if mse == 0.0 {
        return f32::INFINITY;
    }
    20.0 * (max_value / mse.sqrt()).log10()
}

/// Compute the mean squared error (MSE) between two tensors.
///
/// $ MSE = \frac{1}{n} \sum_{i=1}^{n} (a_i - b_i)^2 $
pub fn mse<const N: usize, A: TensorAllocator>(
    a: &Tensor<f32, N, A>,
    b: &Tensor<f32, N, A>,
) -> Result<f32, MetricsError> {
    check_shapes(a, b)?;
    Ok(mse_slice(a.as_slice(), b.as_slice()))
}

/// Compute the peak signal-to-noise ratio (PSNR) between two tensors.
///
/// $ PSNR = 20 \log_{10} \left( \frac{MAX}{\sqrt{MSE}} \right) $
///
/// Identical tensors give `f32::INFINITY`.
///
/// # Example
///
/// ```
/// use vidnoise_denoise::metrics::psnr;
/// use vidnoise_tensor::{CpuAllocator, Tensor2};
///
/// let a = Tensor2::from_shape_vec([1, 2], vec![0.0f32, 1.0], CpuAllocator).unwrap();
/// let b = Tensor2::from_shape_vec([1, 2], vec![0.1f32, 0.9], CpuAllocator).unwrap();
/// assert!((psnr(&a, &b, 1.0).unwrap() - 20.0).abs() < 1e-4);
/// ```
pub fn psnr<const N: usize, A: TensorAllocator>(
    a: &Tensor<f32, N, A>,
    b: &Tensor<f32, N, A>,
    max_value: f32,
) -> Result<f32, MetricsError> {
    Ok(psnr_from_mse(mse(a, b)?, max_value))
}

/// Mean over the first axis of the per-sample PSNR.
///
/// A sample identical in both tensors has infinite PSNR, which makes the mean
/// infinite as well.
pub fn batch_psnr<const N: usize, A: TensorAllocator>(
    a: &Tensor<f32, N, A>,
    b: &Tensor<f32, N, A>,
    max_value: f32,
) -> Result<f32, MetricsError> {
    check_shapes(a, b)?;

    let n = a.shape.first().copied().unwrap_or(0);
    if n == 0 {
        return Err(MetricsError::EmptyBatch);
    }

    let sample = (a.numel() / n).max(1);
    let total = a
        .as_slice()
        .chunks_exact(sample)
        .zip(b.as_slice().chunks_exact(sample))
        .map(|(x, y)| psnr_from_mse(mse_slice(x, y), max_value))
        .sum::<f32>();

    Ok(total / n as f32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use vidnoise_tensor::{CpuAllocator, Tensor2, Tensor4};

    #[test]
    fn test_mse() -> Result<(), Box<dyn std::error::Error>> {
        let a = Tensor2::from_shape_vec([2, 2], vec![0.0f32, 1.0, 2.0, 3.0], CpuAllocator)?;
        let b = Tensor2::from_shape_vec([2, 2], vec![1.0f32, 1.0, 2.0, 5.0], CpuAllocator)?;
        assert_eq!(mse(&a, &b)?, 1.25);
        assert_eq!(mse(&a, &a)?, 0.0);
        Ok(())
    }

    #[test]
    fn test_psnr() -> Result<(), Box<dyn std::error::Error>> {
        let a = Tensor2::from_shape_vec([1, 2], vec![0.0f32, 1.0], CpuAllocator)?;
        let b = Tensor2::from_shape_vec([1, 2], vec![0.1f32, 0.9], CpuAllocator)?;
        assert_relative_eq!(psnr(&a, &b, 1.0)?, 20.0, epsilon = 1e-4);
        assert_eq!(psnr(&a, &a, 1.0)?, f32::INFINITY);
        Ok(())
    }

    #[test]
    fn test_batch_psnr() -> Result<(), Box<dyn std::error::Error>> {
        // sample 0 has mse 0.01, sample 1 has mse 0.0001
        let a = Tensor4::from_shape_vec([2, 1, 1, 1], vec![0.5f32, 0.5], CpuAllocator)?;
        let b = Tensor4::from_shape_vec([2, 1, 1, 1], vec![0.6f32, 0.51], CpuAllocator)?;
        assert_relative_eq!(batch_psnr(&a, &b, 1.0)?, 30.0, epsilon = 1e-3);

        let c = Tensor4::from_shape_vec([2, 1, 1, 1], vec![0.5f32, 0.6], CpuAllocator)?;
        assert_eq!(batch_psnr(&a, &c, 1.0)?, f32::INFINITY);
        Ok(())
    }

    #[test]
    fn metrics_shape_mismatch() -> Result<(), Box<dyn std::error::Error>> {
        let a = Tensor2::<f32, _>::zeros([1, 2], CpuAllocator)?;
        let b = Tensor2::<f32, _>::zeros([2, 1], CpuAllocator)?;
        assert_eq!(
            mse(&a, &b),
            Err(MetricsError::ShapeMismatch {
                left: vec![1, 2],
                right: vec![2, 1]
            })
        );

        let empty = Tensor4::<f32, _>::zeros([0, 1, 1, 1], CpuAllocator)?;
        assert_eq!(
            batch_psnr(&empty, &empty, 1.0),
            Err(MetricsError::EmptyBatch)
        );
        Ok(())
    }
}
