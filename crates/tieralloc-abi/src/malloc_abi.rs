//! ABI layer for memory allocation functions (`malloc`, `free`, `calloc`,
//! `realloc`) and the `get_stats` introspection entry point.
//!
//! Each entry point takes the process-wide engine for one operation. A call
//! that arrives while the engine is already active on the same thread (for
//! example an allocation made by lifecycle logging or by reading the
//! environment during first use) is served by the host libc allocator.
//! `free` and `realloc` hand pointers that do not belong to any live block
//! back to the host allocator for the same reason.
//!
//! Symbols are only unmangled in release builds, so debug test binaries keep
//! their own allocator and call these functions by path.

use std::cell::Cell;
use std::ffi::{c_int, c_void};
use std::io::Write;

use tieralloc_core::{AllocError, Handle, MallocStats};

use crate::allocator_state;
use crate::errno_abi::set_abi_errno;

unsafe extern "C" {
    #[link_name = "__libc_malloc@GLIBC_2.2.5"]
    fn native_libc_malloc_sym(size: usize) -> *mut c_void;
    #[link_name = "__libc_calloc@GLIBC_2.2.5"]
    fn native_libc_calloc_sym(nmemb: usize, size: usize) -> *mut c_void;
    #[link_name = "__libc_realloc@GLIBC_2.2.5"]
    fn native_libc_realloc_sym(ptr: *mut c_void, size: usize) -> *mut c_void;
    #[link_name = "__libc_free@GLIBC_2.2.5"]
    fn native_libc_free_sym(ptr: *mut c_void);
}

#[inline]
unsafe fn native_libc_malloc(size: usize) -> *mut c_void {
    // SAFETY: direct call to libc allocator symbol.
    unsafe { native_libc_malloc_sym(size) }
}

#[inline]
unsafe fn native_libc_calloc(nmemb: usize, size: usize) -> *mut c_void {
    // SAFETY: direct call to libc allocator symbol.
    unsafe { native_libc_calloc_sym(nmemb, size) }
}

#[inline]
unsafe fn native_libc_realloc(ptr: *mut c_void, size: usize) -> *mut c_void {
    // SAFETY: direct call to libc allocator symbol.
    unsafe { native_libc_realloc_sym(ptr, size) }
}

#[inline]
unsafe fn native_libc_free(ptr: *mut c_void) {
    // SAFETY: direct call to libc allocator symbol.
    unsafe { native_libc_free_sym(ptr) }
}

thread_local! {
    static ALLOCATOR_REENTRY_DEPTH: Cell<u32> = const { Cell::new(0) };
}

struct AllocatorReentryGuard;

impl Drop for AllocatorReentryGuard {
    fn drop(&mut self) {
        ALLOCATOR_REENTRY_DEPTH.with(|depth| {
            let current = depth.get();
            depth.set(current.saturating_sub(1));
        });
    }
}

#[inline]
fn enter_allocator_reentry_guard() -> Option<AllocatorReentryGuard> {
    ALLOCATOR_REENTRY_DEPTH.with(|depth| {
        let current = depth.get();
        if current > 0 {
            None
        } else {
            depth.set(current + 1);
            Some(AllocatorReentryGuard)
        }
    })
}

/// Sets `errno` for a failed call. Mapping failures also get one line on
/// stderr.
fn report_failure(err: &AllocError) {
    if matches!(err, AllocError::MapFailure { .. }) {
        let _ = writeln!(std::io::stderr(), "tieralloc: {err}");
    }
    set_abi_errno(err.errno());
}

#[inline]
fn handle_ptr(result: Result<Handle, AllocError>) -> *mut c_void {
    match result {
        Ok(handle) => handle.as_ptr().cast(),
        Err(err) => {
            report_failure(&err);
            std::ptr::null_mut()
        }
    }
}

// ---------------------------------------------------------------------------
// malloc
// ---------------------------------------------------------------------------

/// POSIX `malloc` -- allocates at least `size` bytes of uninitialized memory.
///
/// Returns null and sets `errno` to `ENOMEM` when `size` is negative as a
/// signed value, too large for any tier, or no tier has room.
#[cfg_attr(not(debug_assertions), unsafe(no_mangle))]
pub unsafe extern "C" fn malloc(size: usize) -> *mut c_void {
    let Some(_reentry_guard) = enter_allocator_reentry_guard() else {
        // SAFETY: reentrant path bypasses the engine to avoid lock recursion.
        return unsafe { native_libc_malloc(size) };
    };
    handle_ptr(allocator_state::with_allocator(|alloc| alloc.allocate(size)))
}

// ---------------------------------------------------------------------------
// free
// ---------------------------------------------------------------------------

/// POSIX `free` -- returns memory obtained from `malloc`, `calloc` or
/// `realloc`.
///
/// Null is ignored and not counted. A pointer inside a live block that does
/// not name a live region is counted and otherwise ignored.
#[cfg_attr(not(debug_assertions), unsafe(no_mangle))]
pub unsafe extern "C" fn free(ptr: *mut c_void) {
    let Some(_reentry_guard) = enter_allocator_reentry_guard() else {
        // SAFETY: reentrant path bypasses the engine to avoid lock recursion.
        unsafe { native_libc_free(ptr) };
        return;
    };
    let Some(handle) = Handle::from_ptr(ptr.cast()) else {
        return;
    };

    let foreign = allocator_state::with_allocator(|alloc| {
        if alloc.owns(handle.addr()) {
            alloc.release(handle);
            false
        } else {
            true
        }
    });
    if foreign {
        // SAFETY: the pointer came from the host allocator (reentrant path).
        unsafe { native_libc_free(ptr) };
    }
}

// ---------------------------------------------------------------------------
// calloc
// ---------------------------------------------------------------------------

/// POSIX `calloc` -- allocates `nmemb * size` zeroed bytes.
///
/// The product wraps on overflow; only a negative operand is rejected.
#[cfg_attr(not(debug_assertions), unsafe(no_mangle))]
pub unsafe extern "C" fn calloc(nmemb: usize, size: usize) -> *mut c_void {
    let Some(_reentry_guard) = enter_allocator_reentry_guard() else {
        // SAFETY: reentrant path bypasses the engine to avoid lock recursion.
        return unsafe { native_libc_calloc(nmemb, size) };
    };
    handle_ptr(allocator_state::with_allocator(|alloc| {
        alloc.zero_allocate(nmemb, size)
    }))
}

// ---------------------------------------------------------------------------
// realloc
// ---------------------------------------------------------------------------

enum ReallocRoute {
    Engine(Result<Option<Handle>, AllocError>),
    Foreign,
}

/// POSIX `realloc` -- resizes an allocation.
///
/// - `realloc(NULL, size)` behaves like `malloc(size)`.
/// - `realloc(ptr, 0)` releases `ptr` and returns null.
/// - Shrinking keeps the pointer; growing returns a new pointer with the old
///   contents and leaves `ptr` allocated.
/// - A negative `size` returns null with `errno = ENOMEM`; an invalid `ptr`
///   returns null with `errno = EINVAL`. `ptr` stays valid in both cases.
#[cfg_attr(not(debug_assertions), unsafe(no_mangle))]
pub unsafe extern "C" fn realloc(ptr: *mut c_void, size: usize) -> *mut c_void {
    let Some(_reentry_guard) = enter_allocator_reentry_guard() else {
        // SAFETY: reentrant path bypasses the engine to avoid lock recursion.
        return unsafe { native_libc_realloc(ptr, size) };
    };
    let handle = Handle::from_ptr(ptr.cast());

    let route = allocator_state::with_allocator(|alloc| match handle {
        Some(handle) if !alloc.owns(handle.addr()) => ReallocRoute::Foreign,
        _ => ReallocRoute::Engine(alloc.reallocate(handle, size)),
    });
    match route {
        // SAFETY: the pointer came from the host allocator (reentrant path).
        ReallocRoute::Foreign => unsafe { native_libc_realloc(ptr, size) },
        ReallocRoute::Engine(Ok(Some(handle))) => handle.as_ptr().cast(),
        ReallocRoute::Engine(Ok(None)) => std::ptr::null_mut(),
        ReallocRoute::Engine(Err(err)) => {
            report_failure(&err);
            std::ptr::null_mut()
        }
    }
}

// ---------------------------------------------------------------------------
// get_stats
// ---------------------------------------------------------------------------

/// C view of the allocator counters.
#[allow(non_camel_case_types)]
#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct malloc_stats {
    pub mallocs: c_int,
    pub frees: c_int,
    pub requested_memory: c_int,
    pub amount_of_regions: c_int,
    pub amount_of_little_blocks: c_int,
    pub amount_of_mid_blocks: c_int,
    pub amount_of_large_blocks: c_int,
}

fn saturate<T: TryInto<c_int>>(value: T) -> c_int {
    value.try_into().unwrap_or(c_int::MAX)
}

impl From<MallocStats> for malloc_stats {
    fn from(stats: MallocStats) -> Self {
        Self {
            mallocs: saturate(stats.allocate_count),
            frees: saturate(stats.release_count),
            requested_memory: saturate(stats.requested_bytes),
            amount_of_regions: saturate(stats.live_region_count),
            amount_of_little_blocks: saturate(stats.live_block_count_small),
            amount_of_mid_blocks: saturate(stats.live_block_count_medium),
            amount_of_large_blocks: saturate(stats.live_block_count_large),
        }
    }
}

/// Copies the current counters into `*stats`. Null is ignored.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn get_stats(stats: *mut malloc_stats) {
    if stats.is_null() {
        return;
    }
    let snapshot = malloc_stats::from(allocator_state::stats());
    // SAFETY: caller provides a valid, writable malloc_stats.
    unsafe { stats.write(snapshot) };
}
