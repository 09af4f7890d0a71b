use std::alloc;
use std::alloc::Layout;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use thiserror::Error;

/// An error type for tensor allocator operations.
#[derive(Debug, Error, PartialEq)]
pub enum TensorAllocatorError {
    /// An error occurred during memory allocation.
    #[error("Invalid tensor layout {0}")]
    LayoutError(core::alloc::LayoutError),

    /// An error occurred during memory allocation.
    #[error("Null pointer")]
    NullPointer,

    /// The shared block pool was poisoned by a panicking thread.
    #[error("Memory pool is poisoned")]
    PoolPoisoned,
}

/// A trait for allocating and deallocating memory for tensors.
///
/// # Safety
///
/// The tensor allocator must be thread-safe.
///
/// # Methods
///
/// * `alloc` - Allocates memory for a tensor with the given layout.
/// * `dealloc` - Deallocates memory for a tensor with the given layout.
/// * `empty_cache` - Returns every cached, unused block to the system.
pub trait TensorAllocator: Clone {
    /// Allocates memory for a tensor with the given layout.
    fn alloc(&self, layout: Layout) -> Result<*mut u8, TensorAllocatorError>;

    /// Deallocates memory for a tensor with the given layout.
    fn dealloc(&self, ptr: *mut u8, layout: Layout);

    /// Releases the memory held in the allocator cache, if any.
    ///
    /// Live allocations are never touched. Returns the number of bytes handed back
    /// to the system.
    fn empty_cache(&self) -> usize {
        0
    }
}

#[derive(Clone)]
/// A tensor allocator that uses the system allocator.
pub struct CpuAllocator;

/// Implement the `Default` trait for the `CpuAllocator` struct.
impl Default for CpuAllocator {
    fn default() -> Self {
        Self
    }
}

/// Implement the `TensorAllocator` trait for the `CpuAllocator` struct.
impl TensorAllocator for CpuAllocator {
    /// Allocates memory for a tensor with the given layout.
    ///
    /// # Arguments
    ///
    /// * `layout` - The layout of the tensor.
    ///
    /// # Returns
    ///
    /// A non-null pointer to the allocated memory if successful, otherwise an error.
    fn alloc(&self, layout: Layout) -> Result<*mut u8, TensorAllocatorError> {
        let ptr = unsafe { alloc::alloc(layout) };
        if ptr.is_null() {
            Err(TensorAllocatorError::NullPointer)?
        }
        Ok(ptr)
    }

    /// Deallocates memory for a tensor with the given layout.
    ///
    /// # Arguments
    ///
    /// * `ptr` - A non-null pointer to the allocated memory.
    /// * `layout` - The layout of the tensor.
    ///
    /// # Safety
    ///
    /// The pointer must be non-null and the layout must be correct.
    #[allow(clippy::not_unsafe_ptr_arg_deref)]
    fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        if !ptr.is_null() {
            unsafe { alloc::dealloc(ptr, layout) }
        }
    }
}

/// Memory accounting of a [`CachingAllocator`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoryStats {
    /// Bytes currently handed out to tensors.
    pub live_bytes: usize,
    /// Bytes kept in the pool for reuse.
    pub cached_bytes: usize,
    /// Highest value reached by `live_bytes`.
    pub peak_bytes: usize,
    /// Number of allocations served from the pool.
    pub cache_hits: usize,
    /// Number of times the cache was emptied.
    pub releases: usize,
}

// blocks are keyed by (size, align) and stored as addresses so the pool stays Send
#[derive(Default)]
struct BlockPool {
    free: HashMap<(usize, usize), Vec<usize>>,
    stats: MemoryStats,
}

impl BlockPool {
    fn release_all(&mut self) -> usize {
        let mut released = 0;
        for ((size, align), blocks) in self.free.drain() {
            let Ok(layout) = Layout::from_size_align(size, align) else {
                continue;
            };
            for addr in blocks {
                // SAFETY: the block was obtained from the system allocator with this layout
                unsafe { alloc::dealloc(addr as *mut u8, layout) };
                released += size;
            }
        }
        self.stats.cached_bytes = self.stats.cached_bytes.saturating_sub(released);
        released
    }
}

impl Drop for BlockPool {
    fn drop(&mut self) {
        self.release_all();
    }
}

/// A pooling allocator modelled after device caching allocators.
///
/// Freed blocks are kept in a pool keyed by their layout and handed out again to
/// requests of the same layout. The pool only shrinks when
/// [`TensorAllocator::empty_cache`] is called or when the last clone is dropped.
///
/// Clones share the same pool.
///
/// # Example
///
/// ```
/// use vidnoise_tensor::{CachingAllocator, Tensor, TensorAllocator};
///
/// let alloc = CachingAllocator::new();
/// let t = Tensor::<f32, 2, _>::zeros([4, 4], alloc.clone()).unwrap();
/// drop(t);
/// assert_eq!(alloc.stats().cached_bytes, 64);
/// assert_eq!(alloc.empty_cache(), 64);
/// assert_eq!(alloc.stats().cached_bytes, 0);
/// ```
#[derive(Clone, Default)]
pub struct CachingAllocator {
    pool: Arc<Mutex<BlockPool>>,
}

impl CachingAllocator {
    /// Creates an allocator with an empty pool.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of the pool accounting.
    pub fn stats(&self) -> MemoryStats {
        match self.pool.lock() {
            Ok(pool) => pool.stats,
            Err(poisoned) => poisoned.into_inner().stats,
        }
    }
}

impl std::fmt::Debug for CachingAllocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachingAllocator")
            .field("stats", &self.stats())
            .finish()
    }
}

impl TensorAllocator for CachingAllocator {
    fn alloc(&self, layout: Layout) -> Result<*mut u8, TensorAllocatorError> {
        let mut pool = self
            .pool
            .lock()
            .map_err(|_| TensorAllocatorError::PoolPoisoned)?;

        let key = (layout.size(), layout.align());
        let reused = pool.free.get_mut(&key).and_then(|blocks| blocks.pop());
        let ptr = match reused {
            Some(addr) => {
                pool.stats.cached_bytes -= layout.size();
                pool.stats.cache_hits += 1;
                addr as *mut u8
            }
            None => {
                let ptr = unsafe { alloc::alloc(layout) };
                if ptr.is_null() {
                    return Err(TensorAllocatorError::NullPointer);
                }
                ptr
            }
        };

        pool.stats.live_bytes += layout.size();
        pool.stats.peak_bytes = pool.stats.peak_bytes.max(pool.stats.live_bytes);

        Ok(ptr)
    }

    #[allow(clippy::not_unsafe_ptr_arg_deref)]
    fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        if ptr.is_null() {
            return;
        }
        match self.pool.lock() {
            Ok(mut pool) => {
                pool.stats.live_bytes = pool.stats.live_bytes.saturating_sub(layout.size());
                pool.stats.cached_bytes += layout.size();
                pool.free
                    .entry((layout.size(), layout.align()))
                    .or_default()
                    .push(ptr as usize);
            }
            // nobody can reuse the block anymore, hand it straight back
            Err(_) => unsafe { alloc::dealloc(ptr, layout) },
        }
    }

    fn empty_cache(&self) -> usize {
        let Ok(mut pool) = self.pool.lock() else {
            return 0;
        };
        let released = pool.release_all();
        pool.stats.releases += 1;
        log::trace!("memory pool released {released} bytes");
        released
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cpu_allocator() -> Result<(), TensorAllocatorError> {
        let allocator = CpuAllocator;
        let layout = Layout::from_size_align(1024, 64).unwrap();
        let ptr = allocator.alloc(layout)?;
        allocator.dealloc(ptr, layout);
        assert_eq!(allocator.empty_cache(), 0);
        Ok(())
    }

    #[test]
    fn test_caching_allocator_reuses_blocks() -> Result<(), TensorAllocatorError> {
        let allocator = CachingAllocator::new();
        let layout = Layout::from_size_align(256, 8).unwrap();

        let ptr = allocator.alloc(layout)?;
        assert_eq!(allocator.stats().live_bytes, 256);
        allocator.dealloc(ptr, layout);
        assert_eq!(allocator.stats().live_bytes, 0);
        assert_eq!(allocator.stats().cached_bytes, 256);

        let again = allocator.alloc(layout)?;
        assert_eq!(again, ptr);
        assert_eq!(allocator.stats().cache_hits, 1);
        assert_eq!(allocator.stats().cached_bytes, 0);
        allocator.dealloc(again, layout);
        Ok(())
    }

    #[test]
    fn test_caching_allocator_layouts_do_not_mix() -> Result<(), TensorAllocatorError> {
        let allocator = CachingAllocator::new();
        let small = Layout::from_size_align(64, 8).unwrap();
        let large = Layout::from_size_align(128, 8).unwrap();

        let ptr = allocator.alloc(small)?;
        allocator.dealloc(ptr, small);

        let other = allocator.alloc(large)?;
        assert_eq!(allocator.stats().cache_hits, 0);
        assert_eq!(allocator.stats().cached_bytes, 64);
        allocator.dealloc(other, large);
        Ok(())
    }

    #[test]
    fn test_caching_allocator_empty_cache() -> Result<(), TensorAllocatorError> {
        let allocator = CachingAllocator::new();
        let shared = allocator.clone();
        let layout = Layout::from_size_align(512, 16).unwrap();

        let a = allocator.alloc(layout)?;
        let b = shared.alloc(layout)?;
        assert_eq!(allocator.stats().peak_bytes, 1024);

        allocator.dealloc(a, layout);
        shared.dealloc(b, layout);
        assert_eq!(shared.stats().cached_bytes, 1024);

        assert_eq!(shared.empty_cache(), 1024);
        let stats = allocator.stats();
        assert_eq!(stats.cached_bytes, 0);
        assert_eq!(stats.live_bytes, 0);
        assert_eq!(stats.releases, 1);
        Ok(())
    }
}
