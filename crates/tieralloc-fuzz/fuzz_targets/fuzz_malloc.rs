#![no_main]
use libfuzzer_sys::fuzz_target;
use tieralloc_core::{FitPolicy, Handle, TieredAllocator};

fuzz_target!(|data: &[u8]| {
    // Each 4-byte chunk is one operation: op, size (u16 LE, scaled), fill byte.
    if data.len() < 5 {
        return;
    }

    let fit = if data[0] & 1 == 0 {
        FitPolicy::FirstFit
    } else {
        FitPolicy::BestFit
    };
    let mut alloc = TieredAllocator::with_fit(fit);
    let mut live: Vec<(Handle, u8)> = Vec::new();

    for chunk in data[1..].chunks_exact(4) {
        let raw = u16::from_le_bytes([chunk[1], chunk[2]]) as usize;
        // High bit of the op byte selects the medium tier range.
        let size = if chunk[0] & 0x80 != 0 { raw * 16 } else { raw };
        let fill = chunk[3];

        match chunk[0] % 5 {
            0 | 1 => {
                if let Ok(handle) = alloc.allocate(size) {
                    if let Some(payload) = alloc.payload_mut(handle) {
                        payload.fill(fill);
                    }
                    live.push((handle, fill));
                }
            }
            2 => {
                if !live.is_empty() {
                    let (handle, _) = live.swap_remove(raw % live.len());
                    alloc.release(handle);
                }
            }
            3 => {
                if let Ok(handle) = alloc.zero_allocate(chunk[3] as usize + 1, raw) {
                    let zeroed = alloc
                        .payload(handle)
                        .is_some_and(|payload| payload.iter().all(|&b| b == 0));
                    assert!(zeroed, "zero_allocate returned dirty memory");
                    alloc.release(handle);
                }
            }
            _ => {
                if !live.is_empty() {
                    let index = raw % live.len();
                    let (handle, old_fill) = live[index];
                    let old_len = alloc.payload_size(handle).unwrap_or(0);
                    match alloc.reallocate(Some(handle), size) {
                        Ok(Some(next)) if next != handle => {
                            let copied = alloc
                                .payload(next)
                                .is_some_and(|payload| {
                                    payload[..old_len].iter().all(|&b| b == old_fill)
                                });
                            assert!(copied, "grow lost payload bytes");
                            if let Some(payload) = alloc.payload_mut(next) {
                                payload.fill(old_fill);
                            }
                            live.push((next, old_fill));
                        }
                        Ok(Some(_)) => {}
                        Ok(None) => {
                            live.swap_remove(index);
                        }
                        Err(_) => {}
                    }
                }
            }
        }

        // Every live payload keeps its fill pattern.
        for &(handle, fill) in &live {
            let intact = alloc
                .payload(handle)
                .is_some_and(|payload| payload.iter().all(|&b| b == fill));
            assert!(intact, "live payload was overwritten");
        }
        if let Err(err) = alloc.verify_integrity() {
            panic!("integrity violated: {err}");
        }
    }

    for (handle, _) in live {
        alloc.release(handle);
    }
    assert_eq!(alloc.stats().total_live_blocks(), 0);
});
