use thiserror::Error;

/// Every way an operation of this crate can fail.
///
/// Errors are returned at the point of detection and never recovered
/// from internally.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// An index was not below the logical length of the container
    #[error("index {index} is out of bounds for length {len}")]
    OutOfBounds {
        /// The offending index
        index: usize,
        /// The logical length at the time of the access
        len: usize,
    },

    /// A bit-packed value does not fit the requested integer width
    #[error("{bits} bits of storage do not fit in the target integer")]
    Overflow {
        /// Number of storage bits that were to be packed
        bits: usize,
    },

    /// The key is already present in the table
    #[error("key is already present")]
    DuplicateKey,

    /// Probing visited every candidate slot without finding a free one
    #[error("no free slot found while probing a table of capacity {capacity}")]
    CollisionResolutionFailure {
        /// Capacity of the table that was probed
        capacity: usize,
    },

    /// The underlying allocator could not provide the requested block
    #[error("allocation of {size} bytes aligned to {align} failed")]
    AllocationFailure {
        /// Requested size in bytes
        size: usize,
        /// Requested alignment in bytes
        align: usize,
    },
}

/// Result type of the fallible operations of this crate
pub type Result<T> = core::result::Result<T, Error>;

impl Error {
    pub(crate) fn out_of_bounds(index: usize, len: usize) -> Self {
        Error::OutOfBounds { index, len }
    }
}
