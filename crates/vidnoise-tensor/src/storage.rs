use std::{alloc::Layout, mem::ManuallyDrop, ptr, ptr::NonNull};

use crate::allocator::{TensorAllocator, TensorAllocatorError};

/// A contiguous block of memory for a tensor.
///
/// # Safety
///
/// The tensor storage must be properly aligned and have the correct size.
///
/// # Fields
///
/// * `ptr` - A pointer to the first element of the tensor storage.
/// * `len` - The number of elements in the tensor storage.
/// * `alloc` - The allocator used to allocate and deallocate the tensor storage.
pub struct TensorStorage<T, A: TensorAllocator> {
    ptr: NonNull<T>,
    len: usize,
    alloc: A,
}

impl<T, A: TensorAllocator> TensorStorage<T, A> {
    // zero-sized buffers never reach the allocator
    fn allocate(len: usize, alloc: &A) -> Result<NonNull<T>, TensorAllocatorError> {
        let layout = Layout::array::<T>(len).map_err(TensorAllocatorError::LayoutError)?;
        if layout.size() == 0 {
            return Ok(NonNull::dangling());
        }
        let raw = alloc.alloc(layout)?;
        NonNull::new(raw.cast::<T>()).ok_or(TensorAllocatorError::NullPointer)
    }

    fn release(ptr: NonNull<T>, len: usize, alloc: &A) {
        if let Ok(layout) = Layout::array::<T>(len) {
            if layout.size() != 0 {
                alloc.dealloc(ptr.as_ptr().cast::<u8>(), layout);
            }
        }
    }

    /// Creates a new tensor storage from a vector with the given allocator.
    ///
    /// The elements are moved into a block obtained from `alloc`.
    ///
    /// # Arguments
    ///
    /// * `vec` - The vector to move to the tensor storage.
    /// * `alloc` - The allocator used to allocate the tensor storage.
    ///
    /// # Returns
    ///
    /// A new tensor storage if successful, otherwise an error.
    pub fn from_vec(mut vec: Vec<T>, alloc: A) -> Result<Self, TensorAllocatorError> {
        let len = vec.len();
        let ptr = Self::allocate(len, &alloc)?;

        // SAFETY: both regions hold `len` elements and do not overlap. Setting the
        // length to zero hands ownership of the elements to the new block.
        unsafe {
            ptr::copy_nonoverlapping(vec.as_ptr(), ptr.as_ptr(), len);
            vec.set_len(0);
        }

        Ok(Self { ptr, len, alloc })
    }

    /// Creates a new tensor storage from a value with the given length and allocator.
    ///
    /// # Arguments
    ///
    /// * `len` - The number of elements in the tensor storage.
    /// * `val` - The value to copy to the tensor storage.
    /// * `alloc` - The allocator used to allocate the tensor storage.
    ///
    /// # Returns
    ///
    /// A new tensor storage if successful, otherwise an error.
    pub fn from_val(len: usize, val: T, alloc: A) -> Result<Self, TensorAllocatorError>
    where
        T: Clone,
    {
        let ptr = Self::allocate(len, &alloc)?;
        for i in 0..len {
            // SAFETY: `i < len` and the block holds `len` uninitialized elements
            unsafe {
                ptr.as_ptr().add(i).write(val.clone());
            }
        }
        Ok(Self { ptr, len, alloc })
    }

    /// Returns the number of elements in the tensor storage.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true if the storage holds no elements.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns a pointer to the first element of the tensor storage.
    #[inline]
    pub fn as_ptr(&self) -> *const T {
        self.ptr.as_ptr()
    }

    /// Returns a mutable pointer to the first element of the tensor storage.
    #[inline]
    pub fn as_mut_ptr(&mut self) -> *mut T {
        self.ptr.as_ptr()
    }

    /// Returns the storage data as a slice.
    pub fn as_slice(&self) -> &[T] {
        // SAFETY: the block holds `len` initialized elements
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    /// Returns the storage data as a mutable slice.
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        // SAFETY: the block holds `len` initialized elements and `self` is borrowed mutably
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }

    /// Returns the allocator used to allocate the tensor storage.
    #[inline]
    pub fn alloc(&self) -> &A {
        &self.alloc
    }

    /// Consumes the storage and returns the data as a vector.
    ///
    /// The block is handed back to the allocator.
    pub fn into_vec(self) -> Vec<T> {
        let this = ManuallyDrop::new(self);

        let mut vec = Vec::with_capacity(this.len);
        // SAFETY: the elements are moved out once; the block is released below without
        // dropping them and `this` is never dropped.
        let alloc = unsafe {
            ptr::copy_nonoverlapping(this.ptr.as_ptr(), vec.as_mut_ptr(), this.len);
            vec.set_len(this.len);
            ptr::read(&this.alloc)
        };

        Self::release(this.ptr, this.len, &alloc);
        vec
    }
}

// SAFETY: the storage owns its elements exclusively.
unsafe impl<T: Send, A: TensorAllocator + Send> Send for TensorStorage<T, A> {}

// SAFETY: shared access only hands out `&[T]`.
unsafe impl<T: Sync, A: TensorAllocator + Sync> Sync for TensorStorage<T, A> {}

impl<T, A: TensorAllocator> Drop for TensorStorage<T, A> {
    fn drop(&mut self) {
        // SAFETY: the block holds `len` initialized elements that are dropped exactly once
        unsafe {
            ptr::drop_in_place(ptr::slice_from_raw_parts_mut(self.ptr.as_ptr(), self.len));
        }
        Self::release(self.ptr, self.len, &self.alloc);
    }
}

impl<T, A: TensorAllocator> std::fmt::Debug for TensorStorage<T, A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TensorStorage")
            .field("ptr", &self.ptr)
            .field("len", &self.len)
            .finish()
    }
}
