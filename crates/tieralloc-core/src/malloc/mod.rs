//! Memory allocation.
//!
//! Implements the malloc family over a three-tier block design:
//! - Blocks of 16 KiB, 1 MiB and 32 MiB are mapped on demand, each tier
//!   capped at a fixed number of live blocks.
//! - Each block holds an address-ordered chain of regions that is split on
//!   allocation and coalesced on release; a block whose chain collapses to a
//!   single free region is unmapped.
//! - A first-fit or best-fit search, fixed per instance, reuses free regions
//!   before new blocks are mapped.

pub mod allocator;
pub mod error;
mod fit;
pub mod layout;
pub mod log;
mod region;
pub mod stats;
pub mod tier;

pub use allocator::{Handle, TieredAllocator};
pub use error::{AllocError, IntegrityError};
pub use log::{AllocatorLogLevel, AllocatorLogRecord};
pub use stats::MallocStats;
pub use tier::Tier;
