use num_traits::Zero;
use thiserror::Error;

use crate::{
    allocator::{TensorAllocator, TensorAllocatorError},
    storage::TensorStorage,
};

/// An error type for tensor operations.
#[derive(Error, Debug, PartialEq)]
pub enum TensorError {
    /// Tensor shape does not match the provided data.
    #[error("Shape mismatch: expected {expected} elements for shape, but got {actual} elements in data")]
    InvalidShape {
        /// Expected number of elements based on shape
        expected: usize,
        /// Actual number of elements in the data
        actual: usize,
    },

    /// Index exceeds tensor bounds.
    #[error("Index {index} out of bounds for dimension of size {size}")]
    IndexOutOfBounds {
        /// The invalid index that was attempted
        index: usize,
        /// The size of the dimension being indexed
        size: usize,
    },

    /// The requested axis does not exist.
    #[error("Dimension {dim} out of bounds for a tensor with {ndim} dimensions")]
    DimOutOfBounds {
        /// The requested axis
        dim: usize,
        /// The number of axes of the tensor
        ndim: usize,
    },

    /// Underlying storage operation failed.
    #[error("Storage error: {0}")]
    StorageError(#[from] TensorAllocatorError),

    /// Tensor dimensions incompatible for the requested operation.
    #[error("Dimension mismatch: {message}. Expected shape: {expected}, got: {actual}")]
    DimensionMismatch {
        /// Human-readable description of the mismatch
        message: String,
        /// Expected shape description
        expected: String,
        /// Actual shape description
        actual: String,
    },
}

impl TensorError {
    /// Creates an InvalidShape error with clear context.
    pub fn invalid_shape(expected: usize, actual: usize) -> Self {
        Self::InvalidShape { expected, actual }
    }

    /// Creates an IndexOutOfBounds error with clear context.
    pub fn index_out_of_bounds(index: usize, size: usize) -> Self {
        Self::IndexOutOfBounds { index, size }
    }

    /// Creates a DimensionMismatch error with formatted shapes.
    pub fn dimension_mismatch(
        message: impl Into<String>,
        expected: &[usize],
        actual: &[usize],
    ) -> Self {
        Self::DimensionMismatch {
            message: message.into(),
            expected: format!("{:?}", expected),
            actual: format!("{:?}", actual),
        }
    }
}

/// Computes the strides for a row-major (C-contiguous) tensor layout.
///
/// # Examples
///
/// ```rust
/// use vidnoise_tensor::tensor::get_strides_from_shape;
///
/// let strides = get_strides_from_shape([2, 3, 4]);
/// assert_eq!(strides, [12, 4, 1]);
/// ```
pub fn get_strides_from_shape<const N: usize>(shape: [usize; N]) -> [usize; N] {
    let mut strides: [usize; N] = [0; N];
    let mut stride = 1;
    for i in (0..shape.len()).rev() {
        strides[i] = stride;
        stride *= shape[i];
    }
    strides
}

/// A multi-dimensional array (tensor) with owned data.
///
/// Data is always kept in row-major (C-contiguous) order inside a block obtained
/// from the allocator `A`.
///
/// # Type Parameters
///
/// * `T` - The element type stored in the tensor
/// * `N` - The number of dimensions
/// * `A` - The allocator owning the memory block
///
/// # Examples
///
/// ```rust
/// use vidnoise_tensor::{CpuAllocator, Tensor};
///
/// let t = Tensor::<u8, 2, _>::from_shape_vec([2, 2], vec![1, 2, 3, 4], CpuAllocator).unwrap();
/// assert_eq!(t.shape, [2, 2]);
/// assert_eq!(t.get([1, 0]), Some(&3));
/// ```
pub struct Tensor<T, const N: usize, A: TensorAllocator> {
    /// The storage of the tensor.
    pub storage: TensorStorage<T, A>,
    /// The shape of the tensor.
    pub shape: [usize; N],
    /// The strides of the tensor data in memory.
    pub strides: [usize; N],
}

impl<T, const N: usize, A: TensorAllocator> Tensor<T, N, A> {
    /// Get the data of the tensor as a slice.
    #[inline]
    pub fn as_slice(&self) -> &[T] {
        self.storage.as_slice()
    }

    /// Get the data of the tensor as a mutable slice.
    #[inline]
    pub fn as_slice_mut(&mut self) -> &mut [T] {
        self.storage.as_mut_slice()
    }

    /// Get the data of the tensor as a pointer.
    #[inline]
    pub fn as_ptr(&self) -> *const T {
        self.storage.as_ptr()
    }

    /// Consumes the tensor and returns the underlying vector.
    #[inline]
    pub fn into_vec(self) -> Vec<T> {
        self.storage.into_vec()
    }

    /// Returns the allocator owning the tensor memory.
    #[inline]
    pub fn alloc(&self) -> &A {
        self.storage.alloc()
    }

    /// Creates a new `Tensor` with the given shape and data.
    ///
    /// # Arguments
    ///
    /// * `shape` - An array containing the shape of the tensor.
    /// * `data` - A vector containing the data of the tensor.
    /// * `alloc` - The allocator to use.
    ///
    /// # Errors
    ///
    /// If the number of elements in the data does not match the shape of the tensor, an error is returned.
    pub fn from_shape_vec(shape: [usize; N], data: Vec<T>, alloc: A) -> Result<Self, TensorError> {
        let numel = shape.iter().product::<usize>();
        if numel != data.len() {
            return Err(TensorError::invalid_shape(numel, data.len()));
        }
        let storage = TensorStorage::from_vec(data, alloc)?;
        let strides = get_strides_from_shape(shape);
        Ok(Self {
            storage,
            shape,
            strides,
        })
    }

    /// Creates a new `Tensor` with the given shape and slice of data.
    pub fn from_shape_slice(shape: [usize; N], data: &[T], alloc: A) -> Result<Self, TensorError>
    where
        T: Clone,
    {
        Self::from_shape_vec(shape, data.to_vec(), alloc)
    }

    /// Creates a new `Tensor` with the given shape and a default value.
    pub fn from_shape_val(shape: [usize; N], value: T, alloc: A) -> Result<Self, TensorError>
    where
        T: Clone,
    {
        let numel = shape.iter().product::<usize>();
        let storage = TensorStorage::from_val(numel, value, alloc)?;
        let strides = get_strides_from_shape(shape);
        Ok(Self {
            storage,
            shape,
            strides,
        })
    }

    /// Create a new `Tensor` with the given shape and a function to generate the data.
    ///
    /// The function `f` is called with the index of the element to generate.
    ///
    /// # Example
    ///
    /// ```
    /// use vidnoise_tensor::{CpuAllocator, Tensor};
    ///
    /// let t = Tensor::<u8, 1, _>::from_shape_fn([4], CpuAllocator, |[i]| i as u8).unwrap();
    /// assert_eq!(t.as_slice(), vec![0, 1, 2, 3].as_slice());
    /// ```
    pub fn from_shape_fn<F>(shape: [usize; N], alloc: A, f: F) -> Result<Self, TensorError>
    where
        F: Fn([usize; N]) -> T,
    {
        let numel = shape.iter().product::<usize>();
        let strides = get_strides_from_shape(shape);
        let data = (0..numel)
            .map(|offset| f(index_from_offset(offset, &strides)))
            .collect::<Vec<T>>();
        Self::from_shape_vec(shape, data, alloc)
    }

    /// Creates a new `Tensor` filled with zeros.
    pub fn zeros(shape: [usize; N], alloc: A) -> Result<Self, TensorError>
    where
        T: Zero + Clone,
    {
        Self::from_shape_val(shape, T::zero(), alloc)
    }

    /// Returns the number of elements in the tensor.
    #[inline]
    pub fn numel(&self) -> usize {
        self.storage.len()
    }

    /// Get the offset of the element at the given index.
    ///
    /// Returns `None` when any component of the index is out of bounds.
    pub fn get_iter_offset(&self, index: [usize; N]) -> Option<usize> {
        let mut offset = 0;
        for ((&idx, &dim_size), &stride) in index.iter().zip(self.shape.iter()).zip(&self.strides)
        {
            if idx >= dim_size {
                return None;
            }
            offset += idx * stride;
        }
        Some(offset)
    }

    /// Get the element at the given index, or `None` if it is out of bounds.
    pub fn get(&self, index: [usize; N]) -> Option<&T> {
        self.get_iter_offset(index)
            .and_then(|offset| self.as_slice().get(offset))
    }

    /// Apply a function to each element of the tensor.
    pub fn map<U, F>(&self, f: F) -> Result<Tensor<U, N, A>, TensorError>
    where
        F: Fn(&T) -> U,
    {
        let data = self.as_slice().iter().map(f).collect::<Vec<U>>();
        Tensor::from_shape_vec(self.shape, data, self.alloc().clone())
    }

    /// Copy a contiguous range along one axis into a new tensor.
    ///
    /// The result keeps the rank of the tensor and has `len` entries along `axis`,
    /// taken from `start..start + len`.
    ///
    /// # Example
    ///
    /// ```
    /// use vidnoise_tensor::{CpuAllocator, Tensor};
    ///
    /// let t = Tensor::<u8, 2, _>::from_shape_vec([2, 3], vec![0, 1, 2, 3, 4, 5], CpuAllocator).unwrap();
    /// let n = t.narrow(1, 1, 2).unwrap();
    /// assert_eq!(n.shape, [2, 2]);
    /// assert_eq!(n.as_slice(), &[1, 2, 4, 5]);
    /// ```
    pub fn narrow(&self, axis: usize, start: usize, len: usize) -> Result<Self, TensorError>
    where
        T: Clone,
    {
        if axis >= N {
            return Err(TensorError::DimOutOfBounds { dim: axis, ndim: N });
        }
        let end = start + len;
        if end > self.shape[axis] {
            return Err(TensorError::index_out_of_bounds(end, self.shape[axis]));
        }

        let outer = self.shape[..axis].iter().product::<usize>();
        let inner = self.strides[axis];
        let src_block = self.shape[axis] * inner;

        let mut data = Vec::with_capacity(outer * len * inner);
        for chunk in self.as_slice().chunks_exact(src_block.max(1)).take(outer) {
            data.extend_from_slice(&chunk[start * inner..end * inner]);
        }

        let mut shape = self.shape;
        shape[axis] = len;
        Self::from_shape_vec(shape, data, self.alloc().clone())
    }

    /// Copy the tensor into a new block of the same allocator.
    pub fn try_clone(&self) -> Result<Self, TensorError>
    where
        T: Clone,
    {
        Self::from_shape_slice(self.shape, self.as_slice(), self.alloc().clone())
    }
}

fn index_from_offset<const N: usize>(offset: usize, strides: &[usize; N]) -> [usize; N] {
    let mut index = [0; N];
    let mut remainder = offset;
    for (i, &stride) in strides.iter().enumerate() {
        if stride == 0 {
            continue;
        }
        index[i] = remainder / stride;
        remainder %= stride;
    }
    index
}

impl<T, const N: usize, A: TensorAllocator> std::fmt::Debug for Tensor<T, N, A>
where
    T: std::fmt::Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tensor")
            .field("shape", &self.shape)
            .field("strides", &self.strides)
            .field("data", &self.as_slice())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocator::{CachingAllocator, CpuAllocator};

    #[test]
    fn constructor_1d() -> Result<(), TensorError> {
        let data: Vec<u8> = vec![1];
        let t = Tensor::<u8, 1, _>::from_shape_vec([1], data, CpuAllocator)?;
        assert_eq!(t.shape, [1]);
        assert_eq!(t.as_slice(), vec![1]);
        assert_eq!(t.strides, [1]);
        assert_eq!(t.numel(), 1);
        Ok(())
    }

    #[test]
    fn constructor_invalid_shape() {
        let res = Tensor::<u8, 2, _>::from_shape_vec([2, 2], vec![1, 2, 3], CpuAllocator);
        assert_eq!(res.err(), Some(TensorError::invalid_shape(4, 3)));
    }

    #[test]
    fn get_5d() -> Result<(), TensorError> {
        let t = Tensor::<usize, 5, _>::from_shape_fn([2, 3, 1, 2, 2], CpuAllocator, |idx| {
            idx[0] * 100 + idx[1] * 10 + idx[3] * 2 + idx[4]
        })?;
        assert_eq!(t.strides, [12, 4, 4, 2, 1]);
        assert_eq!(t.get([1, 2, 0, 1, 1]), Some(&123));
        assert_eq!(t.get([0, 1, 0, 0, 1]), Some(&11));
        assert_eq!(t.get([2, 0, 0, 0, 0]), None);
        Ok(())
    }

    #[test]
    fn zeros_and_map() -> Result<(), TensorError> {
        let t = Tensor::<f32, 2, _>::zeros([2, 3], CpuAllocator)?;
        assert!(t.as_slice().iter().all(|&v| v == 0.0));
        let m = t.map(|v| v + 1.5)?;
        assert_eq!(m.as_slice(), &[1.5; 6]);
        Ok(())
    }

    #[test]
    fn narrow_middle_axis() -> Result<(), TensorError> {
        // [batch=2, time=4, pixels=2]
        let t = Tensor::<u32, 3, _>::from_shape_fn([2, 4, 2], CpuAllocator, |[b, t, p]| {
            (b * 100 + t * 10 + p) as u32
        })?;
        let w = t.narrow(1, 1, 2)?;
        assert_eq!(w.shape, [2, 2, 2]);
        assert_eq!(w.as_slice(), &[10, 11, 20, 21, 110, 111, 120, 121]);
        Ok(())
    }

    #[test]
    fn narrow_out_of_bounds() -> Result<(), TensorError> {
        let t = Tensor::<u8, 2, _>::zeros([2, 3], CpuAllocator)?;
        assert_eq!(
            t.narrow(1, 2, 2).err(),
            Some(TensorError::index_out_of_bounds(4, 3))
        );
        assert_eq!(
            t.narrow(2, 0, 1).err(),
            Some(TensorError::DimOutOfBounds { dim: 2, ndim: 2 })
        );
        Ok(())
    }

    #[test]
    fn narrow_uses_same_allocator() -> Result<(), TensorError> {
        let alloc = CachingAllocator::new();
        let t = Tensor::<f32, 2, _>::zeros([4, 4], alloc.clone())?;
        let n = t.narrow(0, 0, 2)?;
        assert_eq!(alloc.stats().live_bytes, 64 + 32);
        drop(n);
        drop(t);
        assert_eq!(alloc.stats().live_bytes, 0);
        assert_eq!(alloc.empty_cache(), 96);
        Ok(())
    }

    #[test]
    fn try_clone() -> Result<(), TensorError> {
        let t = Tensor::<i32, 2, _>::from_shape_vec([1, 3], vec![1, 2, 3], CpuAllocator)?;
        let c = t.try_clone()?;
        drop(t);
        assert_eq!(c.as_slice(), &[1, 2, 3]);
        Ok(())
    }
}
