//! Integration test: allocator contract
//!
//! Every observable property of the four operations and the stats snapshot,
//! checked under both fit policies on fresh allocator instances.
//!
//! Run: cargo test -p tieralloc-core --test allocator_contract_test

use tieralloc_core::{AllocError, FitPolicy, MallocStats, Tier, TieredAllocator};

fn for_each_policy(check: impl Fn(&mut TieredAllocator)) {
    for fit in FitPolicy::ALL {
        let mut alloc = TieredAllocator::with_fit(fit);
        check(&mut alloc);
        if let Err(err) = alloc.verify_integrity() {
            panic!("{fit}: integrity violated: {err}");
        }
    }
}

// ---------------------------------------------------------------------------
// Normalization and counters
// ---------------------------------------------------------------------------

#[test]
fn small_requests_consume_minimum_region() {
    for size in 1..=255 {
        for_each_policy(|alloc| {
            let handle = alloc.allocate(size).unwrap();
            assert_eq!(alloc.stats().requested_bytes, 256, "size {size}");
            assert_eq!(alloc.payload_size(handle), Some(256));
        });
    }
}

#[test]
fn requests_round_up_to_four() {
    for_each_policy(|alloc| {
        alloc.allocate(1001).unwrap();
        alloc.allocate(1004).unwrap();
        assert_eq!(alloc.stats().requested_bytes, 2008);
    });
}

#[test]
fn allocate_and_release_counts() {
    for_each_policy(|alloc| {
        let handle = alloc.allocate(100).unwrap();
        alloc.release(handle);
        let stats = alloc.stats();
        assert_eq!(stats.allocate_count, 1);
        assert_eq!(stats.release_count, 1);
        assert_eq!(stats.requested_bytes, 256);
    });
}

#[test]
fn payload_round_trips_bytes() {
    for_each_policy(|alloc| {
        let message = b"tiered allocator is working!";
        let handle = alloc.allocate(100).unwrap();
        alloc.payload_mut(handle).unwrap()[..message.len()].copy_from_slice(message);
        assert_eq!(&alloc.payload(handle).unwrap()[..message.len()], message);
    });
}

// ---------------------------------------------------------------------------
// Regions and coalescing
// ---------------------------------------------------------------------------

#[test]
fn single_allocation_release_unmaps_block() {
    for_each_policy(|alloc| {
        let handle = alloc.allocate(1000).unwrap();
        alloc.release(handle);
        let stats = alloc.stats();
        assert_eq!(stats.live_region_count, 0);
        assert_eq!(stats.total_live_blocks(), 0);
    });
}

#[test]
fn reuse_after_release_splits_into_three_regions() {
    for_each_policy(|alloc| {
        let first = alloc.allocate(2000).unwrap();
        alloc.release(first);
        alloc.allocate(600).unwrap();
        alloc.allocate(500).unwrap();
        assert_eq!(alloc.stats().live_region_count, 3);
        assert_eq!(alloc.stats().live_block_count_small, 1);
    });
}

#[test]
fn adjacent_releases_coalesce_in_either_order() {
    for (first, second) in [(0, 1), (1, 0)] {
        for_each_policy(|alloc| {
            let handles = [alloc.allocate(300).unwrap(), alloc.allocate(500).unwrap()];
            alloc.release(handles[first]);
            alloc.release(handles[second]);
            assert_eq!(alloc.stats().live_region_count, 0);
            assert_eq!(alloc.stats().total_live_blocks(), 0);
        });
    }
}

#[test]
fn middle_release_merges_both_sides() {
    for_each_policy(|alloc| {
        let a = alloc.allocate(100).unwrap();
        let b = alloc.allocate(200).unwrap();
        let c = alloc.allocate(150).unwrap();
        alloc.release(a);
        alloc.release(c);
        assert_eq!(alloc.stats().live_region_count, 3);
        alloc.release(b);
        assert_eq!(alloc.stats().live_region_count, 0);
    });
}

// ---------------------------------------------------------------------------
// Tiers
// ---------------------------------------------------------------------------

#[test]
fn near_block_sized_requests_take_one_block_each() {
    for_each_policy(|alloc| {
        for _ in 0..3 {
            alloc.allocate(16 * 1000).unwrap();
        }
        let stats = alloc.stats();
        assert_eq!(stats.live_block_count_small, 3);
        assert_eq!(stats.live_region_count, 6);
    });
}

#[test]
fn each_tier_serves_its_size_range() {
    for_each_policy(|alloc| {
        let handles = [
            alloc.allocate(500).unwrap(),
            alloc.allocate(1000 * 1000).unwrap(),
            alloc.allocate(1000 * 1000 * 10).unwrap(),
        ];
        let stats = alloc.stats();
        assert_eq!(stats.live_block_count_small, 1);
        assert_eq!(stats.live_block_count_medium, 1);
        assert_eq!(stats.live_block_count_large, 1);
        assert_eq!(stats.live_region_count, 6);
        for handle in handles {
            alloc.release(handle);
        }
        assert_eq!(alloc.stats().total_live_blocks(), 0);
    });
}

#[test]
fn small_tier_cap_spills_into_medium() {
    for_each_policy(|alloc| {
        for _ in 0..26 {
            alloc.allocate(15 * 1024).unwrap();
        }
        let stats = alloc.stats();
        assert_eq!(stats.live_block_count_small, Tier::Small.cap());
        assert_eq!(stats.live_block_count_medium, 1);
    });
}

#[test]
fn every_tier_unmaps_when_emptied() {
    for_each_policy(|alloc| {
        for size in [1000, 17 * 1024, 2 * 1024 * 1024] {
            let handle = alloc.allocate(size).unwrap();
            alloc.release(handle);
        }
        assert_eq!(alloc.stats().total_live_blocks(), 0);
        assert_eq!(alloc.stats().live_region_count, 0);
    });
}

#[test]
fn exhausted_tiers_report_out_of_capacity() {
    let mut alloc = TieredAllocator::with_fit(FitPolicy::FirstFit);
    let size = 20 * 1024 * 1024;
    for _ in 0..Tier::Large.cap() {
        alloc.allocate(size).unwrap();
    }
    assert_eq!(
        alloc.allocate(size),
        Err(AllocError::OutOfCapacity { size })
    );
    let stats = alloc.stats();
    assert_eq!(stats.allocate_count, 26);
    assert_eq!(stats.live_block_count_large, 25);
    alloc.verify_integrity().unwrap();
}

#[test]
fn free_space_is_reused_before_mapping() {
    for_each_policy(|alloc| {
        let big = alloc.allocate(15 * 1024).unwrap();
        let _pin = alloc.allocate(256).unwrap();
        alloc.release(big);
        alloc.allocate(8 * 1024).unwrap();
        alloc.allocate(4 * 1024).unwrap();
        assert_eq!(alloc.stats().live_block_count_small, 1);
    });
}

// ---------------------------------------------------------------------------
// zero_allocate
// ---------------------------------------------------------------------------

#[test]
fn zero_allocate_returns_zeroed_payload() {
    for_each_policy(|alloc| {
        let handle = alloc.zero_allocate(100, 1).unwrap();
        let payload = alloc.payload(handle).unwrap();
        assert!(payload.len() >= 100);
        assert!(payload.iter().all(|&b| b == 0));
    });
}

#[test]
fn zero_allocate_integers_round_trip() {
    for_each_policy(|alloc| {
        let width = size_of::<i32>();
        let handle = alloc.zero_allocate(100, width).unwrap();
        let payload = alloc.payload_mut(handle).unwrap();
        assert!(payload[..100 * width].iter().all(|&b| b == 0));
        for (i, chunk) in payload[..100 * width].chunks_exact_mut(width).enumerate() {
            chunk.copy_from_slice(&(i as i32).to_ne_bytes());
        }
        let payload = alloc.payload(handle).unwrap();
        for (i, chunk) in payload[..100 * width].chunks_exact(width).enumerate() {
            assert_eq!(i32::from_ne_bytes(chunk.try_into().unwrap()), i as i32);
        }
    });
}

// ---------------------------------------------------------------------------
// reallocate
// ---------------------------------------------------------------------------

#[test]
fn reallocate_null_behaves_like_allocate() {
    for_each_policy(|alloc| {
        let handle = alloc.reallocate(None, 1000).unwrap();
        assert!(handle.is_some());
        let stats = alloc.stats();
        assert_eq!(stats.allocate_count, 1);
        assert_eq!(stats.requested_bytes, 1000);
    });
}

#[test]
fn reallocate_to_zero_releases() {
    for_each_policy(|alloc| {
        let handle = alloc.allocate(500).unwrap();
        assert_eq!(alloc.reallocate(Some(handle), 0), Ok(None));
        assert_eq!(alloc.stats().release_count, 1);
    });
}

#[test]
fn reallocate_smaller_keeps_handle() {
    for_each_policy(|alloc| {
        let handle = alloc.allocate(1000).unwrap();
        assert_eq!(alloc.reallocate(Some(handle), 200), Ok(Some(handle)));
        assert_eq!(alloc.stats().allocate_count, 1);
    });
}

#[test]
fn reallocate_larger_moves_without_release() {
    for_each_policy(|alloc| {
        let handle = alloc.allocate(1000).unwrap();
        for (i, byte) in alloc.payload_mut(handle).unwrap().iter_mut().enumerate() {
            *byte = (i % 97) as u8;
        }
        let moved = alloc.reallocate(Some(handle), 2000).unwrap().unwrap();
        assert_ne!(moved, handle);

        let stats = alloc.stats();
        assert_eq!(stats.allocate_count, 2);
        assert_eq!(stats.release_count, 0);
        assert_eq!(stats.requested_bytes, 3000);

        let copied = &alloc.payload(moved).unwrap()[..1000];
        assert!(copied.iter().enumerate().all(|(i, &b)| b == (i % 97) as u8));
        assert_eq!(alloc.payload_size(handle), Some(1000));
    });
}

#[test]
fn reallocate_into_another_tier() {
    for_each_policy(|alloc| {
        let handle = alloc.allocate(500).unwrap();
        alloc.payload_mut(handle).unwrap().fill(0x42);
        let moved = alloc.reallocate(Some(handle), 100_000).unwrap().unwrap();
        assert_eq!(alloc.stats().live_block_count_medium, 1);
        assert!(alloc.payload(moved).unwrap()[..500].iter().all(|&b| b == 0x42));
    });
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[test]
fn negative_sizes_fail_with_enomem_and_no_side_effects() {
    for_each_policy(|alloc| {
        let neg = |n: isize| n as usize;
        let errors = [
            alloc.allocate(neg(-10)).unwrap_err(),
            alloc.zero_allocate(neg(-5), 10).unwrap_err(),
            alloc.zero_allocate(5, neg(-10)).unwrap_err(),
            alloc.zero_allocate(neg(-3), neg(-10)).unwrap_err(),
        ];
        for err in errors {
            assert!(matches!(err, AllocError::InvalidSize { .. }));
            assert_eq!(err.errno(), libc::ENOMEM);
        }
        assert_eq!(alloc.stats(), MallocStats::default());

        let handle = alloc.allocate(5).unwrap();
        let err = alloc.reallocate(Some(handle), neg(-5)).unwrap_err();
        assert_eq!(err.errno(), libc::ENOMEM);
        assert_eq!(alloc.payload_size(handle), Some(256));
        assert_eq!(alloc.stats().allocate_count, 1);
    });
}

#[test]
fn sizes_negative_as_c_int_are_rejected_before_counting() {
    for_each_policy(|alloc| {
        assert!(matches!(
            alloc.allocate(0x8000_0000),
            Err(AllocError::InvalidSize { .. })
        ));
        assert!(matches!(
            alloc.zero_allocate(0x8000_0000, 1),
            Err(AllocError::InvalidSize { .. })
        ));
        assert_eq!(alloc.stats(), MallocStats::default());

        // Below bit 31 the request is counted and then fails on size.
        let err = alloc.allocate(0x7FFF_FFFC).unwrap_err();
        assert!(matches!(err, AllocError::OversizeRequest { .. }));
        assert_eq!(err.errno(), libc::ENOMEM);
        assert_eq!(alloc.stats().allocate_count, 1);
    });
}

#[test]
fn stats_snapshot_is_a_pure_read() {
    for_each_policy(|alloc| {
        alloc.allocate(700).unwrap();
        assert_eq!(alloc.stats(), alloc.stats());
    });
}
