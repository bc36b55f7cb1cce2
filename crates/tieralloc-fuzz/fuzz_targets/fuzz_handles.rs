#![no_main]
use libfuzzer_sys::fuzz_target;
use tieralloc_core::{Handle, TieredAllocator};

fuzz_target!(|data: &[u8]| {
    // Arbitrary offsets from live payloads must never corrupt the heap.
    if data.len() < 8 {
        return;
    }

    let mut alloc = TieredAllocator::default();
    let anchors: Vec<Handle> = [300usize, 700, 5000]
        .iter()
        .filter_map(|&size| alloc.allocate(size).ok())
        .collect();
    if anchors.is_empty() {
        return;
    }

    for chunk in data.chunks_exact(4) {
        let anchor = anchors[chunk[0] as usize % anchors.len()];
        let delta = i16::from_le_bytes([chunk[1], chunk[2]]) as isize;
        let addr = anchor.addr().wrapping_add_signed(delta);
        let Some(guess) = Handle::from_ptr(addr as *mut u8) else {
            continue;
        };
        if anchors.contains(&guess) {
            continue;
        }
        if chunk[3] & 1 == 0 {
            alloc.release(guess);
        } else {
            let _ = alloc.reallocate(Some(guess), chunk[3] as usize * 8);
        }
        for &anchor in &anchors {
            assert!(alloc.payload_size(anchor).is_some(), "anchor lost");
        }
        if let Err(err) = alloc.verify_integrity() {
            panic!("integrity violated: {err}");
        }
    }
});
