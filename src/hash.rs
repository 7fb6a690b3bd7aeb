use std::hash::{Hash, Hasher};

use rustc_hash::FxHasher;

/// A stateless hash function over keys of type `K`.
pub trait KeyHash<K: ?Sized> {
    /// Hash of `key`
    fn hash(key: &K) -> usize;
}

/// A stateless probe sequence for open addressing.
pub trait ProbingPolicy {
    /// The slot to try on the `attempt`-th collision from the home `slot`.
    ///
    /// Must return a value below `capacity`.
    fn probe(slot: usize, attempt: usize, capacity: usize) -> usize;
}

/// Hashes any [`Hash`] key with [`FxHasher`].
///
/// Keys and their borrowed forms must hash alike, as with
/// `std::collections::HashMap`.
#[derive(Debug, Clone, Copy, Default)]
pub struct FxHash;

impl<K: Hash + ?Sized> KeyHash<K> for FxHash {
    fn hash(key: &K) -> usize {
        let mut hasher = FxHasher::default();
        key.hash(&mut hasher);
        hasher.finish() as usize
    }
}

/// Uses an integer key as its own hash.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityHash;

macro_rules! impl_identity_hash {
    ($($t:ty),*) => {$(
        impl KeyHash<$t> for IdentityHash {
            #[inline]
            fn hash(key: &$t) -> usize {
                *key as usize
            }
        }
    )*};
}

impl_identity_hash!(u8, u16, u32, u64, usize);

/// Tries the next slot, wrapping around: `(slot + attempt) % capacity`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinearProbing;

impl ProbingPolicy for LinearProbing {
    #[inline]
    fn probe(slot: usize, attempt: usize, capacity: usize) -> usize {
        slot.wrapping_add(attempt) % capacity
    }
}

/// Jumps by the square of the attempt: `(slot + attempt²) % capacity`.
///
/// Does not visit every slot of every capacity, so insertion may fail
/// with [`Error::CollisionResolutionFailure`](crate::Error::CollisionResolutionFailure)
/// before the table is full.
#[derive(Debug, Clone, Copy, Default)]
pub struct QuadraticProbing;

impl ProbingPolicy for QuadraticProbing {
    #[inline]
    fn probe(slot: usize, attempt: usize, capacity: usize) -> usize {
        slot.wrapping_add(attempt.wrapping_mul(attempt)) % capacity
    }
}
