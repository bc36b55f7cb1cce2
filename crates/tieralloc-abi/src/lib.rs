// All extern "C" ABI exports accept raw pointers from C callers; the engine
// validates handles at runtime, so per-function safety docs would be redundant.
#![allow(clippy::missing_safety_doc)]
//! # tieralloc-abi
//!
//! C boundary for the tiered allocator.
//!
//! This crate produces a `cdylib` that exports `malloc`, `free`, `calloc`,
//! `realloc` and `get_stats`. Every call goes through one process-wide
//! [`TieredAllocator`](tieralloc_core::TieredAllocator), created on first use
//! with the configuration read from the environment.
//!
//! ```text
//! C caller -> ABI entry (this crate) -> process-wide engine -> mmap
//!                  |
//!                  +-- reentrant call -> host libc allocator
//! ```
//!
//! Failures surface the C way: a null return plus `errno`.

pub mod allocator_state;
pub mod errno_abi;

// Gated behind cfg(not(test)) because release builds export these as
// #[no_mangle] malloc/free/calloc/realloc, which would replace the allocator
// of the unit-test binary itself.
#[cfg(not(test))]
pub mod malloc_abi;
