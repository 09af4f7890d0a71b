#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]
//!
//! # Overview
//!
//! Tensors own a single row-major block obtained from a [`TensorAllocator`]. Two
//! allocators are provided:
//!
//! - [`CpuAllocator`]: plain system allocations.
//! - [`CachingAllocator`]: a shared block pool that keeps freed blocks for reuse until
//!   [`TensorAllocator::empty_cache`] is called, mirroring the caching allocators of
//!   accelerator runtimes.
//!
//! ```rust
//! use vidnoise_tensor::{CpuAllocator, Tensor5};
//!
//! // [batch, time, channels, height, width]
//! let seq = Tensor5::<f32, _>::zeros([1, 5, 3, 4, 4], CpuAllocator).unwrap();
//! let window = seq.narrow(1, 1, 3).unwrap();
//! assert_eq!(window.shape, [1, 3, 3, 4, 4]);
//! ```

/// Allocator module containing memory management utilities.
pub mod allocator;

/// Storage module containing low-level memory buffer implementations.
pub mod storage;

/// Tensor module containing the main tensor implementation and error types.
pub mod tensor;

pub use crate::allocator::{
    CachingAllocator, CpuAllocator, MemoryStats, TensorAllocator, TensorAllocatorError,
};
pub use crate::tensor::{Tensor, TensorError};

/// Type alias for a 1-dimensional tensor.
pub type Tensor1<T, A> = Tensor<T, 1, A>;

/// Type alias for a 2-dimensional tensor.
pub type Tensor2<T, A> = Tensor<T, 2, A>;

/// Type alias for a 3-dimensional tensor.
pub type Tensor3<T, A> = Tensor<T, 3, A>;

/// Type alias for a 4-dimensional tensor.
pub type Tensor4<T, A> = Tensor<T, 4, A>;

/// Type alias for a 5-dimensional tensor.
pub type Tensor5<T, A> = Tensor<T, 5, A>;
