use std::{
    borrow::Borrow,
    ffi::c_char,
    fmt,
    hash::{Hash, Hasher},
    marker::PhantomData,
    ops::{Add, AddAssign},
    ptr::{self, NonNull},
    slice,
};

use crate::{Allocator, Error, Global, Result};

/// What happens to the current bytes when the storage is replaced
#[derive(Clone, Copy, PartialEq, Eq)]
enum Realloc {
    /// Keep the bytes, they are extended afterwards
    Preserve,
    /// Drop the bytes, they are overwritten afterwards
    Discard,
}

static EMPTY: [u8; 1] = [0];

/// An owned, null terminated byte string.
///
/// Once storage is allocated, the byte at `len()` is always zero, so the
/// contents can be handed to C APIs through [`String::cstr`]. No encoding
/// is enforced.
pub struct String<A: Allocator = Global> {
    data: Option<NonNull<u8>>,
    len: usize,
    // Allocated bytes, terminator included
    reserved: usize,
    _marker: PhantomData<fn() -> A>,
}

impl<A: Allocator> String<A> {
    /// Creates an empty string without allocating.
    pub const fn new() -> Self {
        String {
            data: None,
            len: 0,
            reserved: 0,
            _marker: PhantomData,
        }
    }

    /// Creates a string holding a copy of `bytes`.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut res = Self::new();
        res.assign(bytes)?;
        Ok(res)
    }

    /// Number of bytes, terminator excluded
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the string has no byte
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of bytes the string can hold without reallocating
    #[inline]
    pub fn capacity(&self) -> usize {
        self.reserved.saturating_sub(1)
    }

    fn reallocate(&mut self, reserved: usize, mode: Realloc) -> Result<()> {
        let new_data = A::allocate::<u8>(reserved)?;
        if let Some(old) = self.data {
            if mode == Realloc::Preserve {
                // Safety: the old block holds len + 1 initialized bytes,
                // and reserved > len + 1
                unsafe { ptr::copy_nonoverlapping(old.as_ptr(), new_data.as_ptr(), self.len + 1) };
            }
            // Safety: old was allocated by A with self.reserved bytes
            unsafe { A::deallocate(old, self.reserved) };
        }
        #[cfg(feature = "tracing")]
        tracing::trace!(from = self.reserved, to = reserved, "string reallocated");
        self.data = Some(new_data);
        self.reserved = reserved;
        if mode == Realloc::Discard || self.len == 0 {
            self.len = 0;
            // Safety: reserved > 0
            unsafe { new_data.as_ptr().write(0) };
        }
        Ok(())
    }

    /// Makes room for at least `capacity` bytes, keeping the contents.
    pub fn reserve(&mut self, capacity: usize) -> Result<()> {
        let reserved = capacity.saturating_add(1);
        if reserved <= self.reserved {
            return Ok(());
        }
        self.reallocate(reserved, Realloc::Preserve)
    }

    // Writes len and the terminator, the storage must hold len + 1 bytes
    fn set_len(&mut self, len: usize) {
        self.len = len;
        if let Some(data) = self.data {
            // Safety: len < reserved
            unsafe { data.as_ptr().add(len).write(0) };
        }
    }

    /// Replaces the contents with a copy of `bytes`.
    ///
    /// The current bytes are not copied when the storage has to grow.
    pub fn assign(&mut self, bytes: &[u8]) -> Result<()> {
        if bytes.is_empty() {
            self.clear();
            return Ok(());
        }
        let reserved = bytes.len().saturating_add(1);
        if reserved > self.reserved {
            self.reallocate(reserved, Realloc::Discard)?;
        }
        if let Some(data) = self.data {
            // Safety: data holds at least bytes.len() + 1 bytes, and bytes
            // cannot alias a block we own exclusively
            unsafe { ptr::copy_nonoverlapping(bytes.as_ptr(), data.as_ptr(), bytes.len()) };
        }
        self.set_len(bytes.len());
        Ok(())
    }

    /// Appends a copy of `bytes`.
    pub fn push_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        if bytes.is_empty() {
            return Ok(());
        }
        let len = self.len.saturating_add(bytes.len());
        if len + 1 > self.reserved {
            let reserved = (len + 1).max(self.reserved.saturating_mul(2));
            self.reallocate(reserved, Realloc::Preserve)?;
        }
        if let Some(data) = self.data {
            // Safety: data holds at least len + 1 bytes, the first
            // self.len are ours, bytes goes right after them
            unsafe {
                ptr::copy_nonoverlapping(bytes.as_ptr(), data.as_ptr().add(self.len), bytes.len())
            };
        }
        self.set_len(len);
        Ok(())
    }

    /// Appends the bytes of `s`.
    pub fn push_str(&mut self, s: &str) -> Result<()> {
        self.push_bytes(s.as_bytes())
    }

    /// Copy of the bytes in `[offset, offset + len)`.
    ///
    /// `len` is clamped to the end of the string, `None` meaning "up to the
    /// end". Fails when `offset` is past the end.
    pub fn substr(&self, offset: usize, len: Option<usize>) -> Result<Self> {
        if offset > self.len {
            return Err(Error::out_of_bounds(offset, self.len));
        }
        let rest = &self.as_bytes()[offset..];
        let count = len.map_or(rest.len(), |len| len.min(rest.len()));
        Self::from_bytes(&rest[..count])
    }

    /// Empties the string, keeping its storage.
    pub fn clear(&mut self) {
        self.set_len(0)
    }

    /// Checked access to a byte.
    pub fn at(&self, index: usize) -> Result<u8> {
        self.as_bytes()
            .get(index)
            .copied()
            .ok_or(Error::out_of_bounds(index, self.len))
    }

    /// The bytes, terminator excluded
    pub fn as_bytes(&self) -> &[u8] {
        match self.data {
            // Safety: the first len bytes of data are initialized
            Some(data) => unsafe { slice::from_raw_parts(data.as_ptr(), self.len) },
            None => &[],
        }
    }

    /// The bytes, terminator included
    pub fn as_bytes_with_nul(&self) -> &[u8] {
        match self.data {
            // Safety: the first len + 1 bytes of data are initialized
            Some(data) => unsafe { slice::from_raw_parts(data.as_ptr(), self.len + 1) },
            None => &EMPTY,
        }
    }

    /// A pointer to the null terminated contents.
    ///
    /// Never null: an unallocated string points to a static zero byte.
    /// Valid until the next mutation of the string.
    pub fn cstr(&self) -> *const c_char {
        self.as_bytes_with_nul().as_ptr().cast()
    }

    /// The contents as text, if they are valid UTF-8
    pub fn to_str(&self) -> Option<&str> {
        std::str::from_utf8(self.as_bytes()).ok()
    }

    /// Deep copy
    pub fn try_clone(&self) -> Result<Self> {
        Self::from_bytes(self.as_bytes())
    }
}

impl<A: Allocator> Drop for String<A> {
    fn drop(&mut self) {
        if let Some(data) = self.data {
            // Safety: data was allocated by A with self.reserved bytes
            unsafe { A::deallocate(data, self.reserved) };
        }
    }
}

impl<A: Allocator> Default for String<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: Allocator> Clone for String<A> {
    fn clone(&self) -> Self {
        match self.try_clone() {
            Ok(res) => res,
            Err(err) => panic!("cloning a String failed: {err}"),
        }
    }
}

impl<A: Allocator> From<&str> for String<A> {
    fn from(s: &str) -> Self {
        match Self::from_bytes(s.as_bytes()) {
            Ok(res) => res,
            Err(err) => panic!("creating a String failed: {err}"),
        }
    }
}

impl<A: Allocator, B: Allocator> PartialEq<String<B>> for String<A> {
    fn eq(&self, other: &String<B>) -> bool {
        self.len == other.len && self.as_bytes() == other.as_bytes()
    }
}

impl<A: Allocator> Eq for String<A> {}

impl<A: Allocator> PartialEq<str> for String<A> {
    fn eq(&self, other: &str) -> bool {
        self.as_bytes() == other.as_bytes()
    }
}

impl<A: Allocator> PartialEq<&str> for String<A> {
    fn eq(&self, other: &&str) -> bool {
        self.as_bytes() == other.as_bytes()
    }
}

// Must agree with the Hash of [u8] for Borrow<[u8]>
impl<A: Allocator> Hash for String<A> {
    fn hash<S: Hasher>(&self, state: &mut S) {
        self.as_bytes().hash(state)
    }
}

impl<A: Allocator> Borrow<[u8]> for String<A> {
    fn borrow(&self) -> &[u8] {
        self.as_bytes()
    }
}

impl<A: Allocator> AddAssign<&str> for String<A> {
    fn add_assign(&mut self, rhs: &str) {
        if let Err(err) = self.push_str(rhs) {
            panic!("appending to a String failed: {err}")
        }
    }
}

impl<A: Allocator, B: Allocator> AddAssign<&String<B>> for String<A> {
    fn add_assign(&mut self, rhs: &String<B>) {
        if let Err(err) = self.push_bytes(rhs.as_bytes()) {
            panic!("appending to a String failed: {err}")
        }
    }
}

impl<A: Allocator, B: Allocator> Add<&String<B>> for &String<A> {
    type Output = String<A>;

    fn add(self, rhs: &String<B>) -> String<A> {
        let mut res = String::new();
        let concat = res
            .reserve(self.len.saturating_add(rhs.len))
            .and_then(|()| res.push_bytes(self.as_bytes()))
            .and_then(|()| res.push_bytes(rhs.as_bytes()));
        if let Err(err) = concat {
            panic!("concatenating Strings failed: {err}")
        }
        res
    }
}

impl<A: Allocator> Add<&str> for String<A> {
    type Output = String<A>;

    fn add(mut self, rhs: &str) -> String<A> {
        self += rhs;
        self
    }
}

impl<A: Allocator> fmt::Display for String<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&std::string::String::from_utf8_lossy(self.as_bytes()), f)
    }
}

impl<A: Allocator> fmt::Debug for String<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&std::string::String::from_utf8_lossy(self.as_bytes()), f)
    }
}
