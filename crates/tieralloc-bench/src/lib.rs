//! Shared workloads for the allocator benchmarks.

#![forbid(unsafe_code)]

use tieralloc_core::{Handle, TieredAllocator};

/// Request sizes spanning all three tiers.
pub const SIZE_CLASSES: &[usize] = &[16, 256, 1024, 4096, 15 * 1024, 64 * 1024, 2 * 1024 * 1024];

/// Deterministic pseudo-random sizes in `[lo, hi)`.
#[must_use]
pub fn size_stream(seed: u64, count: usize, lo: usize, hi: usize) -> Vec<usize> {
    let mut state = seed | 1;
    let span = (hi - lo).max(1) as u64;
    (0..count)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            lo + (state % span) as usize
        })
        .collect()
}

/// Allocates every size, then frees every other handle, leaving holes.
pub fn fragment(alloc: &mut TieredAllocator, sizes: &[usize]) -> Vec<Handle> {
    let handles: Vec<Handle> = sizes
        .iter()
        .filter_map(|&size| alloc.allocate(size).ok())
        .collect();
    let mut kept = Vec::with_capacity(handles.len() / 2 + 1);
    for (i, handle) in handles.into_iter().enumerate() {
        if i % 2 == 0 {
            alloc.release(handle);
        } else {
            kept.push(handle);
        }
    }
    kept
}
