use std::{
    fmt,
    ops::{Deref, DerefMut},
};

use crate::{Allocator, Buffer, Error, Global, Result};

/// An unsigned integer used as the storage word of a bitset.
pub trait BitUnit: Copy + Eq + fmt::Debug {
    /// Number of bits in one unit
    const BITS: usize;
    /// The unit with no bit set
    const ZERO: Self;
    /// The unit with every bit set
    const ONES: Self;

    /// The unit with only `bit` set, `bit < BITS`
    fn single(bit: usize) -> Self;
    /// The unit with the `bits` lowest bits set, `bits < BITS`
    fn low(bits: usize) -> Self;
    /// Sets the bits of `mask` to `value`, leaving the others untouched
    fn assign(self, mask: Self, value: bool) -> Self;
    /// Bitwise and
    fn and(self, other: Self) -> Self;
    /// Number of set bits
    fn count_ones(self) -> u32;
    /// Zero extension to 64 bits, `BITS <= 64`
    fn widen(self) -> u64;
}

macro_rules! impl_bit_unit {
    ($($t:ty),*) => {$(
        impl BitUnit for $t {
            const BITS: usize = <$t>::BITS as usize;
            const ZERO: Self = 0;
            const ONES: Self = <$t>::MAX;

            #[inline]
            fn single(bit: usize) -> Self {
                1 << bit
            }

            #[inline]
            fn low(bits: usize) -> Self {
                (1 << bits) - 1
            }

            // Branchless: -value is either all ones or all zeros
            #[inline]
            fn assign(self, mask: Self, value: bool) -> Self {
                self ^ ((<$t>::from(value).wrapping_neg() ^ self) & mask)
            }

            #[inline]
            fn and(self, other: Self) -> Self {
                self & other
            }

            #[inline]
            fn count_ones(self) -> u32 {
                <$t>::count_ones(self)
            }

            #[inline]
            #[allow(clippy::cast_lossless)]
            fn widen(self) -> u64 {
                self as u64
            }
        }
    )*};
}

impl_bit_unit!(u8, u16, u32, u64, usize);

fn units_for<U: BitUnit>(len: usize) -> usize {
    len.div_ceil(U::BITS)
}

/// A fixed-length vector of booleans packed in units of type `U`.
pub struct Bitset<U: BitUnit = u32, A: Allocator = Global> {
    len: usize,
    units: Buffer<U, A>,
}

impl<U: BitUnit, A: Allocator> Bitset<U, A> {
    /// Creates a bitset of `len` bits, all false.
    pub fn new(len: usize) -> Result<Self> {
        let mut units = Buffer::with_capacity(units_for::<U>(len))?;
        units.construct(U::ZERO);
        Ok(Bitset { len, units })
    }

    /// Number of addressable bits
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the bitset has no addressable bit
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of bits of the underlying storage
    #[inline]
    pub fn max_bits(&self) -> usize {
        self.units.len() * U::BITS
    }

    fn locate(&self, index: usize) -> Result<(usize, U)> {
        if index >= self.len {
            return Err(Error::out_of_bounds(index, self.len));
        }
        Ok((index / U::BITS, U::single(index % U::BITS)))
    }

    // index < len
    fn test(&self, index: usize) -> bool {
        let unit = self.units[index / U::BITS];
        unit.and(U::single(index % U::BITS)) != U::ZERO
    }

    /// Sets bit `index` to `value`.
    pub fn set(&mut self, index: usize, value: bool) -> Result<()> {
        let (unit, mask) = self.locate(index)?;
        let slot = &mut self.units[unit];
        *slot = slot.assign(mask, value);
        Ok(())
    }

    /// Reads bit `index`.
    pub fn get(&self, index: usize) -> Result<bool> {
        let (unit, mask) = self.locate(index)?;
        Ok(self.units[unit].and(mask) != U::ZERO)
    }

    /// Whether every bit in `[0, len)` is set.
    ///
    /// False for an empty bitset. Storage bits past `len` are ignored.
    pub fn all(&self) -> bool {
        if self.len == 0 {
            return false;
        }
        let full = self.len / U::BITS;
        if self.units[..full].iter().any(|&unit| unit != U::ONES) {
            return false;
        }
        match self.len % U::BITS {
            0 => true,
            active => {
                let mask = U::low(active);
                self.units[full].and(mask) == mask
            }
        }
    }

    /// Number of set bits
    pub fn count_ones(&self) -> usize {
        self.units.iter().map(|unit| unit.count_ones() as usize).sum()
    }

    /// Sets every bit in `[0, len)` to `value`.
    pub fn set_all(&mut self, value: bool) {
        let fill = if value { U::ONES } else { U::ZERO };
        for unit in self.units.iter_mut() {
            *unit = fill;
        }
        self.clear_tail();
    }

    /// Sets every bit to false.
    pub fn clear(&mut self) {
        self.set_all(false)
    }

    /// Indices of the set bits, in increasing order
    pub fn iter_ones(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.len).filter(move |&index| self.test(index))
    }

    /// Packs the units little-endian into an integer.
    ///
    /// Fails with [`Error::Overflow`] when the storage is wider than 64 bits.
    pub fn to_u64(&self) -> Result<u64> {
        let bits = self.max_bits();
        if bits > u64::BITS as usize {
            return Err(Error::Overflow { bits });
        }
        Ok(self
            .units
            .iter()
            .enumerate()
            .fold(0, |acc, (i, unit)| acc | (unit.widen() << (i * U::BITS))))
    }

    // Zeroes the storage bits past len
    fn clear_tail(&mut self) {
        let active = self.len % U::BITS;
        if active != 0 {
            let last = &mut self.units[self.len / U::BITS];
            *last = last.and(U::low(active));
        }
    }

    /// Deep copy
    pub fn try_clone(&self) -> Result<Self> {
        Ok(Bitset {
            len: self.len,
            units: self.units.try_clone()?,
        })
    }
}

impl<U: BitUnit, A: Allocator> fmt::Debug for Bitset<U, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Bitset(")?;
        for index in 0..self.len {
            f.write_str(if self.test(index) { "1" } else { "0" })?;
        }
        f.write_str(")")
    }
}

/// A [`Bitset`] whose length can change after construction.
///
/// Bits below the new length survive a [`DynBitset::resize`], bits
/// uncovered by growing read false.
pub struct DynBitset<U: BitUnit = u32, A: Allocator = Global> {
    inner: Bitset<U, A>,
}

impl<U: BitUnit, A: Allocator> DynBitset<U, A> {
    /// Creates an empty bitset without allocating.
    pub const fn empty() -> Self {
        DynBitset {
            inner: Bitset {
                len: 0,
                units: Buffer::new(),
            },
        }
    }

    /// Creates a bitset of `len` bits, all false.
    pub fn new(len: usize) -> Result<Self> {
        let mut res = Self::empty();
        res.resize(len)?;
        Ok(res)
    }

    /// Changes the number of addressable bits.
    pub fn resize(&mut self, len: usize) -> Result<()> {
        self.inner
            .units
            .resize_with(units_for::<U>(len), || U::ZERO)?;
        let shrinking = len < self.inner.len;
        self.inner.len = len;
        if shrinking {
            self.inner.clear_tail();
        }
        Ok(())
    }

    /// Deep copy
    pub fn try_clone(&self) -> Result<Self> {
        Ok(DynBitset {
            inner: self.inner.try_clone()?,
        })
    }
}

impl<U: BitUnit, A: Allocator> Default for DynBitset<U, A> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<U: BitUnit, A: Allocator> Deref for DynBitset<U, A> {
    type Target = Bitset<U, A>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl<U: BitUnit, A: Allocator> DerefMut for DynBitset<U, A> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.inner
    }
}

impl<U: BitUnit, A: Allocator> fmt::Debug for DynBitset<U, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.inner, f)
    }
}
