use std::{
    fmt,
    marker::PhantomData,
    ops::{Deref, DerefMut},
    ptr::{self, NonNull},
    slice,
};

use crate::{Allocator, Error, Global, Result};

/// An owning, contiguous and growable array.
///
/// Elements in `[0, len)` are initialized, the rest of the `capacity`
/// slots are raw storage obtained from the allocator `A`.
pub struct Buffer<T, A: Allocator = Global> {
    data: NonNull<T>,
    capacity: usize,
    len: usize,
    _marker: PhantomData<(T, fn() -> A)>,
}

impl<T, A: Allocator> Buffer<T, A> {
    /// Creates an empty buffer without allocating.
    pub const fn new() -> Self {
        Buffer {
            data: NonNull::dangling(),
            capacity: 0,
            len: 0,
            _marker: PhantomData,
        }
    }

    /// Creates an empty buffer with room for `capacity` elements.
    pub fn with_capacity(capacity: usize) -> Result<Self> {
        let mut res = Self::new();
        res.reserve(capacity)?;
        Ok(res)
    }

    /// Number of live elements
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the buffer holds no live element
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of slots currently allocated
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Makes sure at least `capacity` slots are allocated.
    ///
    /// Live elements are moved in order to the new block, the old block
    /// is returned to the allocator. Never shrinks.
    pub fn reserve(&mut self, capacity: usize) -> Result<()> {
        if capacity <= self.capacity {
            return Ok(());
        }
        let new_data = A::allocate::<T>(capacity)?;
        // Safety:
        // - the first len slots of data are initialized
        // - new_data is a fresh block of capacity > len slots
        unsafe { ptr::copy_nonoverlapping(self.data.as_ptr(), new_data.as_ptr(), self.len) };
        self.release();
        #[cfg(feature = "tracing")]
        tracing::trace!(from = self.capacity, to = capacity, len = self.len, "buffer reallocated");
        self.data = new_data;
        self.capacity = capacity;
        Ok(())
    }

    // Gives the block back without touching the elements, which must
    // have been moved out or dropped already
    fn release(&mut self) {
        if self.capacity > 0 {
            // Safety: data was allocated by A with this capacity
            unsafe { A::deallocate(self.data, self.capacity) };
        }
    }

    /// Appends `value`, doubling the storage when it is full.
    ///
    /// On failure the buffer is left untouched and `value` is dropped.
    pub fn push(&mut self, value: T) -> Result<()> {
        if self.len == self.capacity {
            self.reserve(self.len.saturating_add(1).saturating_mul(2))?;
        }
        // Safety: len < capacity, so the slot is allocated and uninitialized
        unsafe { self.data.as_ptr().add(self.len).write(value) };
        self.len += 1;
        Ok(())
    }

    /// Removes the last element and returns it
    pub fn pop(&mut self) -> Option<T> {
        if self.len == 0 {
            return None;
        }
        self.len -= 1;
        // Safety: the slot was live, and is now outside the live range
        Some(unsafe { self.data.as_ptr().add(self.len).read() })
    }

    /// Checked access to a live element.
    pub fn at(&self, index: usize) -> Result<&T> {
        self.as_slice()
            .get(index)
            .ok_or(Error::out_of_bounds(index, self.len))
    }

    /// Checked mutable access to a live element.
    pub fn at_mut(&mut self, index: usize) -> Result<&mut T> {
        let len = self.len;
        self.as_mut_slice()
            .get_mut(index)
            .ok_or(Error::out_of_bounds(index, len))
    }

    /// The live elements
    #[inline]
    pub fn as_slice(&self) -> &[T] {
        // Safety: data is aligned, non null, and its first len slots are
        // initialized
        unsafe { slice::from_raw_parts(self.data.as_ptr(), self.len) }
    }

    /// The live elements, mutably
    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        // Safety: same as as_slice, and we hold the only reference
        unsafe { slice::from_raw_parts_mut(self.data.as_ptr(), self.len) }
    }

    /// Fills every remaining reserved slot with a clone of `value`.
    ///
    /// Afterwards `len() == capacity()`.
    pub fn construct(&mut self, value: T)
    where
        T: Clone,
    {
        self.construct_with(|| value.clone())
    }

    /// Fills every remaining reserved slot with values produced by `f`.
    pub fn construct_with(&mut self, mut f: impl FnMut() -> T) {
        while self.len < self.capacity {
            // Safety: len < capacity, the slot is uninitialized
            unsafe { self.data.as_ptr().add(self.len).write(f()) };
            self.len += 1;
        }
    }

    /// Sets the number of live elements to `len`.
    ///
    /// New elements are produced by `f`, surplus elements are dropped.
    /// The capacity never shrinks.
    pub fn resize_with(&mut self, len: usize, mut f: impl FnMut() -> T) -> Result<()> {
        if len <= self.len {
            self.truncate(len);
            return Ok(());
        }
        self.reserve(len)?;
        while self.len < len {
            // Safety: reserve made the slot available and it is uninitialized
            unsafe { self.data.as_ptr().add(self.len).write(f()) };
            self.len += 1;
        }
        Ok(())
    }

    /// Drops every element past `len`.
    pub fn truncate(&mut self, len: usize) {
        if len >= self.len {
            return;
        }
        let tail = ptr::slice_from_raw_parts_mut(
            // Safety: len < self.len, still inside the allocation
            unsafe { self.data.as_ptr().add(len) },
            self.len - len,
        );
        // Shrink first so a panicking destructor cannot cause a double drop
        self.len = len;
        // Safety: the tail was the end of the live range
        unsafe { ptr::drop_in_place(tail) };
    }

    /// Drops every element, keeping the storage.
    pub fn clear(&mut self) {
        self.truncate(0)
    }

    /// Appends clones of every element of `other`.
    pub fn extend_from_slice(&mut self, other: &[T]) -> Result<()>
    where
        T: Clone,
    {
        self.reserve(self.len.saturating_add(other.len()))?;
        for value in other {
            self.push(value.clone())?;
        }
        Ok(())
    }

    /// Deep copy of the live elements into a buffer of the same length.
    pub fn try_clone(&self) -> Result<Self>
    where
        T: Clone,
    {
        let mut res = Self::with_capacity(self.len)?;
        res.extend_from_slice(self.as_slice())?;
        Ok(res)
    }
}

impl<T, A: Allocator> Drop for Buffer<T, A> {
    fn drop(&mut self) {
        self.clear();
        self.release();
    }
}

impl<T, A: Allocator> Default for Buffer<T, A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, A: Allocator> Deref for Buffer<T, A> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        self.as_slice()
    }
}

impl<T, A: Allocator> DerefMut for Buffer<T, A> {
    fn deref_mut(&mut self) -> &mut [T] {
        self.as_mut_slice()
    }
}

impl<T: Clone, A: Allocator> Clone for Buffer<T, A> {
    fn clone(&self) -> Self {
        match self.try_clone() {
            Ok(res) => res,
            Err(err) => panic!("cloning a Buffer failed: {err}"),
        }
    }
}

impl<T: fmt::Debug, A: Allocator> fmt::Debug for Buffer<T, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

impl<T: PartialEq, A: Allocator, B: Allocator> PartialEq<Buffer<T, B>> for Buffer<T, A> {
    fn eq(&self, other: &Buffer<T, B>) -> bool {
        self.as_slice() == other.as_slice()
    }
}

impl<T: Eq, A: Allocator> Eq for Buffer<T, A> {}

impl<'a, T, A: Allocator> IntoIterator for &'a Buffer<T, A> {
    type Item = &'a T;
    type IntoIter = slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<'a, T, A: Allocator> IntoIterator for &'a mut Buffer<T, A> {
    type Item = &'a mut T;
    type IntoIter = slice::IterMut<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter_mut()
    }
}
