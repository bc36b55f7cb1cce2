//! Allocation and integrity errors.

use thiserror::Error;

use super::tier::Tier;
use crate::mmap::MapError;

/// Failure of a public allocator operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AllocError {
    /// The size (or one calloc operand) is negative when read as signed.
    #[error("invalid size {requested:#x}: negative when interpreted as signed")]
    InvalidSize { requested: usize },
    /// Every tier that could hold the request is at its block cap.
    #[error("no tier has room for a {size}-byte region")]
    OutOfCapacity { size: usize },
    /// The request does not fit in a block of the largest tier.
    #[error("{size}-byte request exceeds the largest block payload of {max} bytes")]
    OversizeRequest { size: usize, max: usize },
    /// The OS refused to map a new block.
    #[error("mapping a {len}-byte block failed (errno {errno})")]
    MapFailure { len: usize, errno: i32 },
    /// The handle does not name a live region.
    #[error("handle does not refer to a live region")]
    CorruptedHandle,
}

impl AllocError {
    /// The `errno` value the C ABI reports for this failure.
    #[must_use]
    pub const fn errno(&self) -> i32 {
        match self {
            Self::CorruptedHandle => libc::EINVAL,
            Self::InvalidSize { .. }
            | Self::OutOfCapacity { .. }
            | Self::OversizeRequest { .. }
            | Self::MapFailure { .. } => libc::ENOMEM,
        }
    }
}

impl From<MapError> for AllocError {
    fn from(err: MapError) -> Self {
        let len = match err {
            MapError::Map { len, .. } | MapError::Unmap { len, .. } => len,
            MapError::ZeroLength => 0,
        };
        Self::MapFailure {
            len,
            errno: err.errno(),
        }
    }
}

/// A violated structural invariant, reported by `verify_integrity`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum IntegrityError {
    #[error("{tier} block {slot}: region at {offset} has a bad tag")]
    BadTag {
        tier: Tier,
        slot: usize,
        offset: usize,
    },
    #[error("{tier} block {slot}: region at {offset}, expected one at {expected}")]
    Discontiguous {
        tier: Tier,
        slot: usize,
        offset: usize,
        expected: usize,
    },
    #[error("{tier} block {slot}: region at {offset} has a stale back link")]
    BrokenBackLink {
        tier: Tier,
        slot: usize,
        offset: usize,
    },
    #[error("{tier} block {slot}: free regions meet at {offset}")]
    AdjacentFree {
        tier: Tier,
        slot: usize,
        offset: usize,
    },
    #[error("{tier} block {slot}: regions cover {covered} of {len} bytes")]
    SizeMismatch {
        tier: Tier,
        slot: usize,
        covered: usize,
        len: usize,
    },
    #[error("{tier} tier: {counted} blocks linked, {recorded} recorded live")]
    LiveCountMismatch {
        tier: Tier,
        counted: usize,
        recorded: usize,
    },
    #[error("{counted} regions walked, {recorded} recorded live")]
    RegionCountMismatch { counted: usize, recorded: usize },
    #[error("{tier} tier: block list is not doubly linked at slot {slot}")]
    BrokenBlockList { tier: Tier, slot: usize },
}
