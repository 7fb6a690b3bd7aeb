#![warn(missing_docs)]
#![warn(
    clippy::undocumented_unsafe_blocks,
    clippy::missing_safety_doc,
    clippy::multiple_unsafe_ops_per_block
)]
#![warn(clippy::cast_lossless)]

//! This crate offers the containers a game engine is built upon:
//! a growable [`Buffer`], packed [`Bitset`]s, an open addressing
//! [`Hashmap`], a null terminated [`String`] and the [`SmartPtr`] and
//! [`RefCounted`] ownership pointers.
//!
//! Every container takes its [`Allocator`] as a type parameter, and the
//! hash table also its [`GrowthPolicy`], [`KeyHash`] and
//! [`ProbingPolicy`]. None of them is thread-safe.

mod error;
pub use error::*;

mod alloc;
pub use alloc::{Allocator, Global};

mod growth;
pub use growth::*;

mod buffer;
pub use buffer::*;

mod bitset;
pub use bitset::*;

mod hash;
pub use hash::*;

mod hashmap;
pub use hashmap::*;

mod string;
pub use string::*;

mod ptr;
pub use ptr::*;
