//! # tieralloc-core
//!
//! The allocation engine behind the `malloc`/`free`/`calloc`/`realloc`
//! replacement exported by `tieralloc-abi`.
//!
//! Memory is requested from the OS in fixed-size blocks of three tiers
//! (16 KiB, 1 MiB, 32 MiB). Each block is carved into an address-ordered
//! chain of regions that are split on allocation and coalesced on release.
//! The engine is a plain value ([`TieredAllocator`]) with no global state, so
//! every caller (and every test) owns an isolated instance.
//!
//! `unsafe` is denied at the crate level. The only exception is [`mmap`],
//! which owns the mapped spans and exposes bounds-checked accessors to the
//! rest of the engine.

#![deny(unsafe_code)]

pub mod config;
pub mod malloc;
#[allow(unsafe_code)]
pub mod mmap;

pub use config::{AllocatorConfig, FitPolicy};
pub use malloc::{
    AllocError, AllocatorLogLevel, AllocatorLogRecord, Handle, IntegrityError, MallocStats, Tier,
    TieredAllocator,
};
