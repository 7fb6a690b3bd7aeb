use std::{
    fmt,
    marker::PhantomData,
    mem,
    ops::{Deref, DerefMut},
    ptr::{drop_in_place, NonNull},
};

use crate::{Allocator, Global, Result};

// Allocates a single T and moves value into it
fn alloc_value<T, A: Allocator>(value: T) -> Result<NonNull<T>> {
    let data = A::allocate::<T>(1)?;
    // Safety: data is valid for the write of one T
    unsafe { data.as_ptr().write(value) };
    Ok(data)
}

// # Safety
// - data comes from alloc_value::<T, A>
// - the pointee is not accessed afterwards
unsafe fn destroy_value<T, A: Allocator>(data: NonNull<T>) {
    // Safety: data points to a live T owned by the caller
    unsafe { drop_in_place(data.as_ptr()) };
    // Safety: data was allocated by A for one T
    unsafe { A::deallocate(data, 1) };
}

/// A pointer owning a single value allocated through `A`, like a Box.
///
/// It cannot be cloned. An empty pointer owns nothing.
pub struct SmartPtr<T, A: Allocator = Global> {
    data: Option<NonNull<T>>,
    _marker: PhantomData<(T, fn() -> A)>,
}

impl<T, A: Allocator> SmartPtr<T, A> {
    /// Moves `value` into a fresh allocation.
    pub fn new(value: T) -> Result<Self> {
        Ok(SmartPtr {
            data: Some(alloc_value::<T, A>(value)?),
            _marker: PhantomData,
        })
    }

    /// A pointer owning nothing
    pub const fn empty() -> Self {
        SmartPtr {
            data: None,
            _marker: PhantomData,
        }
    }

    /// Whether the pointer owns nothing
    pub fn is_empty(&self) -> bool {
        self.data.is_none()
    }

    /// The pointee, if any
    pub fn get(&self) -> Option<&T> {
        // Safety: data points to a live T we own
        self.data.map(|data| unsafe { &*data.as_ptr() })
    }

    /// The pointee, mutably
    pub fn get_mut(&mut self) -> Option<&mut T> {
        // Safety: data points to a live T we own exclusively
        self.data.map(|data| unsafe { &mut *data.as_ptr() })
    }

    /// Moves the ownership out, leaving `self` empty.
    pub fn take(&mut self) -> Self {
        mem::take(self)
    }

    /// Frees the allocation and returns the value it held.
    pub fn into_inner(mut self) -> Option<T> {
        let data = self.data.take()?;
        // Safety: data points to a live T we own, which is moved out here
        let value = unsafe { data.as_ptr().read() };
        // Safety: allocated by A for one T, the T was moved out
        unsafe { A::deallocate(data, 1) };
        Some(value)
    }
}

impl<T, A: Allocator> Drop for SmartPtr<T, A> {
    fn drop(&mut self) {
        if let Some(data) = self.data.take() {
            // Safety: data comes from alloc_value and we are its only owner
            unsafe { destroy_value::<T, A>(data) };
        }
    }
}

impl<T, A: Allocator> Default for SmartPtr<T, A> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<T, A: Allocator> Deref for SmartPtr<T, A> {
    type Target = T;

    fn deref(&self) -> &T {
        match self.get() {
            Some(value) => value,
            None => panic!("dereferenced an empty SmartPtr"),
        }
    }
}

impl<T, A: Allocator> DerefMut for SmartPtr<T, A> {
    fn deref_mut(&mut self) -> &mut T {
        match self.get_mut() {
            Some(value) => value,
            None => panic!("dereferenced an empty SmartPtr"),
        }
    }
}

impl<T: fmt::Debug, A: Allocator> fmt::Debug for SmartPtr<T, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SmartPtr").field(&self.get()).finish()
    }
}

struct Shared<T> {
    data: NonNull<T>,
    // Separate allocation, not next to the data
    count: NonNull<usize>,
}

impl<T> Clone for Shared<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Shared<T> {}

impl<T> Shared<T> {
    // # Safety
    // - self must not be dangling
    // - No live reference to the count must exist
    unsafe fn decrement_and_drop<A: Allocator>(self) {
        // Safety: the count is live as long as one owner exists
        let count = unsafe { &mut *self.count.as_ptr() };
        *count -= 1;
        if *count == 0 {
            // Safety: we were the last owner
            unsafe { destroy_value::<T, A>(self.data) };
            // Safety: allocated by A for one usize
            unsafe { A::deallocate(self.count, 1) };
        }
    }
}

/// A pointer sharing ownership of a value, similar to [`std::rc::Rc`].
///
/// The value and its reference count live in two separate allocations
/// of `A`. Counts are not atomic, so the pointer is neither `Send` nor
/// `Sync`.
///
/// The value is dropped, and both blocks freed, once every pointer is
/// dropped.
pub struct RefCounted<T, A: Allocator = Global> {
    shared: Option<Shared<T>>,
    _marker: PhantomData<(T, fn() -> A)>,
}

impl<T, A: Allocator> RefCounted<T, A> {
    /// Moves `value` into a fresh allocation with a count of one.
    pub fn new(value: T) -> Result<Self> {
        let data = alloc_value::<T, A>(value)?;
        let count = match alloc_value::<usize, A>(1) {
            Ok(count) => count,
            Err(err) => {
                // Safety: data was just allocated and is owned by nobody else
                unsafe { destroy_value::<T, A>(data) };
                return Err(err);
            }
        };
        Ok(RefCounted {
            shared: Some(Shared { data, count }),
            _marker: PhantomData,
        })
    }

    /// A pointer sharing nothing
    pub const fn empty() -> Self {
        RefCounted {
            shared: None,
            _marker: PhantomData,
        }
    }

    /// Whether the pointer shares nothing
    pub fn is_empty(&self) -> bool {
        self.shared.is_none()
    }

    /// Number of pointers sharing the value, 0 when empty
    pub fn ref_count(&self) -> usize {
        // Safety: the count is live while we are an owner
        self.shared.map_or(0, |shared| unsafe { *shared.count.as_ptr() })
    }

    /// The shared value, if any
    pub fn get(&self) -> Option<&T> {
        // Safety: data is live while we are an owner
        self.shared.map(|shared| unsafe { &*shared.data.as_ptr() })
    }

    /// The value, mutably, if no other pointer shares it
    pub fn get_mut(&mut self) -> Option<&mut T> {
        if self.ref_count() != 1 {
            return None;
        }
        // Safety: we are the only owner
        self.shared.map(|shared| unsafe { &mut *shared.data.as_ptr() })
    }

    /// Whether both pointers share the same allocation
    pub fn ptr_eq(&self, other: &Self) -> bool {
        match (self.shared, other.shared) {
            (Some(a), Some(b)) => a.data == b.data,
            (None, None) => true,
            _ => false,
        }
    }

    /// Moves the share out, leaving `self` empty.
    pub fn take(&mut self) -> Self {
        mem::take(self)
    }
}

impl<T, A: Allocator> Clone for RefCounted<T, A> {
    fn clone(&self) -> Self {
        if let Some(shared) = self.shared {
            // Safety: the count is live while we are an owner
            unsafe { *shared.count.as_ptr() += 1 };
        }
        RefCounted {
            shared: self.shared,
            _marker: PhantomData,
        }
    }
}

impl<T, A: Allocator> Drop for RefCounted<T, A> {
    fn drop(&mut self) {
        if let Some(shared) = self.shared.take() {
            // Safety:
            // shared is live, and no reference to the count escapes
            unsafe { shared.decrement_and_drop::<A>() };
        }
    }
}

impl<T, A: Allocator> Default for RefCounted<T, A> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<T, A: Allocator> Deref for RefCounted<T, A> {
    type Target = T;

    fn deref(&self) -> &T {
        match self.get() {
            Some(value) => value,
            None => panic!("dereferenced an empty RefCounted"),
        }
    }
}

impl<T: fmt::Debug, A: Allocator> fmt::Debug for RefCounted<T, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefCounted")
            .field("value", &self.get())
            .field("count", &self.ref_count())
            .finish()
    }
}

#[cfg(test)]
mod test {
    use std::{cell::Cell, rc::Rc};

    use super::*;
    use crate::{
        alloc::testing::{Budgeted, Counting, Failing, Tracked},
        Error,
    };

    #[test]
    fn smart_ptr_owns_its_value() {
        let drops = Rc::new(Cell::new(0));
        {
            let mut ptr: SmartPtr<Tracked> = SmartPtr::new(Tracked::new(4, &drops)).unwrap();
            assert_eq!(ptr.id, 4);
            ptr.id = 5;
            assert_eq!(ptr.get().map(|t| t.id), Some(5));
        }
        assert_eq!(drops.get(), 1);
    }

    #[test]
    fn smart_ptr_moves() {
        let drops = Rc::new(Cell::new(0));
        let before = Counting::live_blocks();
        {
            let mut a: SmartPtr<Tracked, Counting> =
                SmartPtr::new(Tracked::new(1, &drops)).unwrap();
            let b = a.take();
            assert!(a.is_empty());
            assert_eq!(b.id, 1);
            let c = b;
            assert_eq!(drops.get(), 0);
            drop(c);
            assert_eq!(drops.get(), 1);
        }
        assert_eq!(drops.get(), 1);
        assert_eq!(Counting::live_blocks(), before);
    }

    #[test]
    fn smart_ptr_into_inner() {
        let before = Counting::live_blocks();
        let ptr: SmartPtr<Vec<u8>, Counting> = SmartPtr::new(vec![1, 2]).unwrap();
        assert_eq!(ptr.into_inner(), Some(vec![1, 2]));
        assert_eq!(Counting::live_blocks(), before);
        assert_eq!(SmartPtr::<u8>::empty().into_inner(), None);
    }

    #[test]
    #[should_panic(expected = "empty SmartPtr")]
    fn smart_ptr_empty_deref_panics() {
        let ptr: SmartPtr<u32> = SmartPtr::default();
        let _value: u32 = *ptr;
    }

    #[test]
    fn smart_ptr_allocation_failure() {
        let drops = Rc::new(Cell::new(0));
        let res: Result<SmartPtr<Tracked, Failing>> = SmartPtr::new(Tracked::new(0, &drops));
        assert!(matches!(res, Err(Error::AllocationFailure { .. })));
        assert_eq!(drops.get(), 1);
    }

    #[test]
    fn ref_counted_counts_copies() {
        let a: RefCounted<u32> = RefCounted::new(12).unwrap();
        assert_eq!(a.ref_count(), 1);
        let copies: Vec<_> = (0..5).map(|_| a.clone()).collect();
        assert_eq!(a.ref_count(), 6);
        assert!(copies.iter().all(|copy| copy.ptr_eq(&a) && **copy == 12));
        drop(copies);
        assert_eq!(a.ref_count(), 1);
    }

    #[test]
    fn ref_counted_releases_once() {
        let drops = Rc::new(Cell::new(0));
        let before = Counting::live_blocks();
        {
            let a: RefCounted<Tracked, Counting> =
                RefCounted::new(Tracked::new(3, &drops)).unwrap();
            // data and count are two blocks
            assert_eq!(Counting::live_blocks(), before + 2);
            let b = a.clone();
            let c = b.clone();
            drop(a);
            drop(b);
            assert_eq!(drops.get(), 0);
            assert_eq!(c.ref_count(), 1);
            assert_eq!(c.id, 3);
        }
        assert_eq!(drops.get(), 1);
        assert_eq!(Counting::live_blocks(), before);
    }

    #[test]
    fn ref_counted_take_moves_without_counting() {
        let mut a: RefCounted<&str> = RefCounted::new("mesh").unwrap();
        let b = a.clone();
        let c = a.take();
        assert!(a.is_empty());
        assert_eq!(a.ref_count(), 0);
        assert_eq!(c.ref_count(), 2);
        assert!(c.ptr_eq(&b));
        assert!(!a.ptr_eq(&b));
        assert!(RefCounted::<u8>::empty().ptr_eq(&RefCounted::empty()));
    }

    #[test]
    fn ref_counted_get_mut_when_unique() {
        let mut a: RefCounted<Vec<u8>> = RefCounted::new(vec![]).unwrap();
        a.get_mut().unwrap().push(1);
        let b = a.clone();
        assert!(a.get_mut().is_none());
        drop(b);
        a.get_mut().unwrap().push(2);
        assert_eq!(*a, [1, 2]);
    }

    #[test]
    fn ref_counted_empty() {
        let a: RefCounted<u8> = RefCounted::default();
        let b = a.clone();
        assert_eq!(b.ref_count(), 0);
        assert_eq!(b.get(), None);
    }

    #[test]
    #[should_panic(expected = "empty RefCounted")]
    fn ref_counted_empty_deref_panics() {
        let a: RefCounted<u8> = RefCounted::empty();
        let _value: u8 = *a;
    }

    #[test]
    fn ref_counted_count_allocation_failure() {
        let drops = Rc::new(Cell::new(0));
        let before = Counting::live_blocks();
        // the data block succeeds, the count block does not
        Budgeted::set_budget(1);
        let res: Result<RefCounted<Tracked, Budgeted>> =
            RefCounted::new(Tracked::new(9, &drops));
        assert!(matches!(res, Err(Error::AllocationFailure { .. })));
        assert_eq!(drops.get(), 1);
        assert_eq!(Counting::live_blocks(), before);
    }
}
