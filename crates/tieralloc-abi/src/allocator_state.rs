//! Process-wide allocator instance.
//!
//! The engine itself is single-threaded. The lock exists so the instance can
//! live in a `static`; callers get exclusive access for the duration of one
//! operation and no ordering guarantee beyond that.

use parking_lot::{Mutex, const_mutex};
use tieralloc_core::{AllocatorConfig, AllocatorLogRecord, MallocStats, TieredAllocator};

static ALLOCATOR: Mutex<Option<TieredAllocator>> = const_mutex(None);

/// Runs `f` on the process-wide allocator, creating it on first use.
///
/// Must not be re-entered from the same thread; the ABI's reentry guard
/// routes nested allocations to the host allocator before they get here.
pub fn with_allocator<R>(f: impl FnOnce(&mut TieredAllocator) -> R) -> R {
    let mut slot = ALLOCATOR.lock();
    let alloc = slot.get_or_insert_with(|| TieredAllocator::new(AllocatorConfig::from_env()));
    f(alloc)
}

/// Snapshot of the process-wide counters; all zero before first use.
#[must_use]
pub fn stats() -> MallocStats {
    ALLOCATOR
        .lock()
        .as_ref()
        .map(TieredAllocator::stats)
        .unwrap_or_default()
}

/// Configuration of the process-wide allocator, if it has been created.
#[must_use]
pub fn active_config() -> Option<AllocatorConfig> {
    ALLOCATOR.lock().as_ref().map(|alloc| *alloc.config())
}

/// Drains the lifecycle records of the process-wide allocator.
pub fn drain_lifecycle_logs() -> Vec<AllocatorLogRecord> {
    ALLOCATOR
        .lock()
        .as_mut()
        .map(TieredAllocator::drain_lifecycle_logs)
        .unwrap_or_default()
}
