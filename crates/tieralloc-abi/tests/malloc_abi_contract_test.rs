//! Integration tests for the C allocator boundary.
//!
//! Release builds export the entry points unmangled, which replaces the
//! allocator of this very test binary and lets the harness's own allocations
//! reach the counters; the checks below only make sense in debug builds.
#![cfg(debug_assertions)]

use std::ffi::c_void;
use std::ptr;
use std::sync::Mutex;

use tieralloc_abi::errno_abi::{abi_errno, set_abi_errno};
use tieralloc_abi::malloc_abi::{calloc, free, get_stats, malloc, malloc_stats, realloc};

static TEST_LOCK: Mutex<()> = Mutex::new(());

fn lock() -> std::sync::MutexGuard<'static, ()> {
    TEST_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn snapshot() -> malloc_stats {
    let mut stats = malloc_stats::default();
    unsafe { get_stats(&mut stats) };
    stats
}

fn neg(n: isize) -> usize {
    n as usize
}

#[test]
fn malloc_returns_writable_memory() {
    let _guard = lock();
    let message = b"tiered malloc is working!\0";
    unsafe {
        let p = malloc(100).cast::<u8>();
        assert!(!p.is_null());
        assert_eq!(p as usize % 4, 0);
        ptr::copy_nonoverlapping(message.as_ptr(), p, message.len());
        assert_eq!(std::slice::from_raw_parts(p, message.len()), message);
        free(p.cast());
    }
}

#[test]
fn counters_follow_malloc_and_free() {
    let _guard = lock();
    let before = snapshot();
    unsafe {
        let p = malloc(100);
        let during = snapshot();
        assert_eq!(during.mallocs, before.mallocs + 1);
        assert_eq!(during.requested_memory, before.requested_memory + 256);
        assert!(during.amount_of_regions > before.amount_of_regions);
        free(p);
    }
    let after = snapshot();
    assert_eq!(after.frees, before.frees + 1);
    assert_eq!(after.amount_of_regions, before.amount_of_regions);
    assert_eq!(after.amount_of_little_blocks, before.amount_of_little_blocks);
}

#[test]
fn free_null_is_not_counted() {
    let _guard = lock();
    let before = snapshot();
    unsafe { free(ptr::null_mut()) };
    assert_eq!(snapshot(), before);
}

#[test]
fn calloc_zeroes_and_counts_once() {
    let _guard = lock();
    let before = snapshot();
    unsafe {
        let p = calloc(100, size_of::<i32>()).cast::<i32>();
        assert!(!p.is_null());
        let values = std::slice::from_raw_parts_mut(p, 100);
        assert!(values.iter().all(|&v| v == 0));
        for (i, v) in values.iter_mut().enumerate() {
            *v = i as i32;
        }
        assert!(values.iter().enumerate().all(|(i, &v)| v == i as i32));
        free(p.cast());
    }
    let after = snapshot();
    assert_eq!(after.mallocs, before.mallocs + 1);
    assert_eq!(after.requested_memory, before.requested_memory + 400);
}

#[test]
fn realloc_cases() {
    let _guard = lock();
    unsafe {
        // NULL -> malloc
        let before = snapshot();
        let p = realloc(ptr::null_mut(), 1000);
        assert!(!p.is_null());
        assert_eq!(snapshot().mallocs, before.mallocs + 1);

        // shrink keeps the pointer
        let same = realloc(p, 200);
        assert_eq!(same, p);

        // grow moves, copies and does not free the source
        p.cast::<u8>().write_bytes(0x7C, 200);
        let before = snapshot();
        let moved = realloc(p, 2000);
        assert!(!moved.is_null());
        assert_ne!(moved, p);
        let after = snapshot();
        assert_eq!(after.mallocs, before.mallocs + 1);
        assert_eq!(after.frees, before.frees);
        assert!(std::slice::from_raw_parts(moved.cast::<u8>(), 200)
            .iter()
            .all(|&b| b == 0x7C));

        // size 0 frees
        let before = snapshot();
        assert!(realloc(moved, 0).is_null());
        assert_eq!(snapshot().frees, before.frees + 1);
        free(p);
    }
}

#[test]
fn invalid_sizes_set_enomem() {
    let _guard = lock();
    unsafe {
        set_abi_errno(0);
        assert!(malloc(neg(-10)).is_null());
        assert_eq!(abi_errno(), libc::ENOMEM);

        for (n, m) in [(neg(-5), 10), (5, neg(-10)), (neg(-3), neg(-10))] {
            set_abi_errno(0);
            assert!(calloc(n, m).is_null());
            assert_eq!(abi_errno(), libc::ENOMEM);
        }

        let p = malloc(5);
        set_abi_errno(0);
        assert!(realloc(p, neg(-5)).is_null());
        assert_eq!(abi_errno(), libc::ENOMEM);
        // The original allocation is untouched.
        p.cast::<u8>().write_bytes(1, 256);
        free(p);
    }
}

#[test]
fn oversize_request_sets_enomem() {
    let _guard = lock();
    unsafe {
        set_abi_errno(0);
        assert!(malloc(64 * 1024 * 1024).is_null());
        assert_eq!(abi_errno(), libc::ENOMEM);
    }
}

#[test]
fn realloc_of_interior_pointer_sets_einval() {
    let _guard = lock();
    unsafe {
        let p = malloc(1000);
        let interior = p.cast::<u8>().add(4).cast::<c_void>();
        set_abi_errno(0);
        assert!(realloc(interior, 2000).is_null());
        assert_eq!(abi_errno(), libc::EINVAL);
        free(p);
    }
}

#[test]
fn foreign_pointers_go_back_to_host_allocator() {
    let _guard = lock();
    let before = snapshot();
    unsafe {
        let host = libc::malloc(64);
        assert!(!host.is_null());
        host.cast::<u8>().write_bytes(0x11, 64);
        let grown = realloc(host, 4096);
        assert!(!grown.is_null());
        assert!(std::slice::from_raw_parts(grown.cast::<u8>(), 64)
            .iter()
            .all(|&b| b == 0x11));
        free(grown);
    }
    assert_eq!(snapshot(), before);
}

#[test]
fn get_stats_ignores_null() {
    let _guard = lock();
    unsafe { get_stats(ptr::null_mut()) };
}
