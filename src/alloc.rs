use std::{
    alloc::{alloc, dealloc, Layout},
    mem::align_of,
    ptr::NonNull,
};

use crate::{Error, Result};

/// A stateless source of uninitialized, typed storage.
///
/// Containers of this crate take their allocator as a type parameter
/// and never hold an instance of it.
///
/// # Safety
///
/// A successful `allocate::<T>(n)` must return a pointer aligned for `T`
/// and valid for reads and writes of `n` values of `T`, which stays valid
/// until it is handed back to `deallocate::<T>(_, n)` of the same
/// allocator.
pub unsafe trait Allocator {
    /// Allocate uninitialized storage for exactly `n` values of `T`.
    ///
    /// Zero sized requests (`n == 0` or a zero sized `T`) succeed and
    /// return a dangling, well aligned pointer.
    fn allocate<T>(n: usize) -> Result<NonNull<T>>;

    /// Return storage obtained from [`Allocator::allocate`].
    ///
    /// Does not run any destructor.
    ///
    /// # Safety
    ///
    /// `ptr` must come from `Self::allocate::<T>(n)` with the same `n`,
    /// and must not have been deallocated already.
    unsafe fn deallocate<T>(ptr: NonNull<T>, n: usize);
}

fn array_layout<T>(n: usize) -> Result<Layout> {
    Layout::array::<T>(n).map_err(|_| Error::AllocationFailure {
        size: n.saturating_mul(std::mem::size_of::<T>()),
        align: align_of::<T>(),
    })
}

/// The allocator backed by the global Rust heap.
#[derive(Debug, Clone, Copy, Default)]
pub struct Global;

// Safety: memory comes from the global allocator with the array layout
// of the request, which is aligned and sized for n values of T
unsafe impl Allocator for Global {
    fn allocate<T>(n: usize) -> Result<NonNull<T>> {
        let layout = array_layout::<T>(n)?;
        if layout.size() == 0 {
            return Ok(NonNull::dangling());
        }
        // Safety: layout has a non zero size
        let ptr = unsafe { alloc(layout) };
        NonNull::new(ptr.cast::<T>()).ok_or(Error::AllocationFailure {
            size: layout.size(),
            align: layout.align(),
        })
    }

    unsafe fn deallocate<T>(ptr: NonNull<T>, n: usize) {
        // The layout was already computed successfully by allocate
        let Ok(layout) = array_layout::<T>(n) else {
            return;
        };
        if layout.size() == 0 {
            return;
        }
        // Safety: the caller guarantees ptr was allocated by Global
        // with this very layout
        unsafe { dealloc(ptr.as_ptr().cast(), layout) }
    }
}
