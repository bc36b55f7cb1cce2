//! Reference scenario catalogue.
//!
//! Every scenario runs against a fresh [`TieredAllocator`], so its counter
//! checks are absolute. Numbered 1 through 26 are the classic allocator
//! acceptance cases; the rest pin down edge behavior around them.

use std::fmt;

use serde::{Deserialize, Serialize};
use tieralloc_core::{AllocError, FitPolicy, Handle, MallocStats, Tier, TieredAllocator};

/// One labelled assertion inside a scenario.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckResult {
    pub label: String,
    pub passed: bool,
    /// What was observed when the check failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Collects the checks made by one scenario run.
#[derive(Debug, Default)]
pub struct Checks {
    results: Vec<CheckResult>,
}

impl Checks {
    pub fn expect(&mut self, label: impl Into<String>, passed: bool) {
        self.results.push(CheckResult {
            label: label.into(),
            passed,
            detail: None,
        });
    }

    pub fn expect_eq<T>(&mut self, label: impl Into<String>, actual: T, expected: T)
    where
        T: PartialEq + fmt::Debug,
    {
        let passed = actual == expected;
        self.results.push(CheckResult {
            label: label.into(),
            passed,
            detail: (!passed).then(|| format!("expected {expected:?}, got {actual:?}")),
        });
    }

    /// Unwraps `result`, recording a failed check named `what` on error.
    pub fn ok<T, E: fmt::Display>(&mut self, what: &str, result: Result<T, E>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(err) => {
                self.results.push(CheckResult {
                    label: format!("{what} succeeds"),
                    passed: false,
                    detail: Some(err.to_string()),
                });
                None
            }
        }
    }

    #[must_use]
    pub fn into_results(self) -> Vec<CheckResult> {
        self.results
    }
}

/// A named, self-contained allocator scenario.
#[derive(Clone, Copy)]
pub struct Scenario {
    pub id: u32,
    pub name: &'static str,
    run: fn(&mut TieredAllocator, &mut Checks),
}

impl fmt::Debug for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scenario")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Outcome of one scenario under one fit policy.
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioResult {
    pub id: u32,
    pub name: String,
    pub fit: FitPolicy,
    pub passed: bool,
    pub checks: Vec<CheckResult>,
    /// Counters after the scenario body finished.
    pub stats: MallocStats,
}

impl Scenario {
    /// Runs the scenario on a fresh allocator using `fit`.
    ///
    /// A structural integrity check is appended after the body.
    #[must_use]
    pub fn run(&self, fit: FitPolicy) -> ScenarioResult {
        let mut alloc = TieredAllocator::with_fit(fit);
        let mut checks = Checks::default();
        (self.run)(&mut alloc, &mut checks);
        let integrity = alloc.verify_integrity();
        checks.expect("heap structure is consistent", integrity.is_ok());
        let mut results = checks.into_results();
        if let (Err(err), Some(last)) = (integrity, results.last_mut()) {
            last.detail = Some(err.to_string());
        }
        ScenarioResult {
            id: self.id,
            name: self.name.to_string(),
            fit,
            passed: results.iter().all(|check| check.passed),
            checks: results,
            stats: alloc.stats(),
        }
    }
}

/// The full catalogue, in id order.
#[must_use]
pub fn catalogue() -> Vec<Scenario> {
    vec![
        scenario(1, "malloc_returns_handle", malloc_returns_handle),
        scenario(2, "payload_holds_copied_value", payload_holds_copied_value),
        scenario(3, "malloc_is_counted", malloc_is_counted),
        scenario(4, "free_is_counted", free_is_counted),
        scenario(5, "requested_memory_is_recorded", requested_memory_is_recorded),
        scenario(6, "small_requests_are_raised_to_minimum", minimum_request),
        scenario(7, "sole_region_release_unmaps_block", sole_region_release),
        scenario(8, "split_leaves_free_tail", split_leaves_free_tail),
        scenario(9, "right_coalescing", right_coalescing),
        scenario(10, "left_coalescing", left_coalescing),
        scenario(11, "left_and_right_coalescing", left_and_right_coalescing),
        scenario(12, "one_block_per_large_small_request", small_block_count),
        scenario(13, "one_block_per_tier", one_block_per_tier),
        scenario(14, "full_small_tier_spills_to_medium", small_tier_spill),
        scenario(15, "released_blocks_are_unmapped", released_blocks_unmapped),
        scenario(16, "calloc_bytes_are_zero", calloc_bytes_zero),
        scenario(17, "calloc_integers_are_zero", calloc_integers_zero),
        scenario(18, "calloc_integers_are_writable", calloc_integers_writable),
        scenario(19, "realloc_null_allocates", realloc_null_allocates),
        scenario(20, "realloc_zero_releases", realloc_zero_releases),
        scenario(21, "realloc_grow_copies_content", realloc_grow_copies),
        scenario(22, "realloc_shrink_keeps_handle", realloc_shrink_keeps_handle),
        scenario(23, "realloc_grow_counts_new_request", realloc_grow_counts),
        scenario(24, "malloc_rejects_negative_size", malloc_rejects_negative),
        scenario(25, "calloc_rejects_negative_operands", calloc_rejects_negative),
        scenario(26, "realloc_rejects_negative_size", realloc_rejects_negative),
        scenario(27, "double_free_is_counted_noop", double_free_noop),
        scenario(28, "oversize_request_is_rejected", oversize_rejected),
        scenario(29, "realloc_of_freed_handle_is_rejected", realloc_freed_rejected),
        scenario(30, "realloc_null_zero_is_noop", realloc_null_zero_noop),
        scenario(31, "fit_policy_picks_expected_hole", fit_policy_hole),
        scenario(32, "freed_region_is_reused", freed_region_reused),
    ]
}

const fn scenario(
    id: u32,
    name: &'static str,
    run: fn(&mut TieredAllocator, &mut Checks),
) -> Scenario {
    Scenario { id, name, run }
}

fn neg(n: isize) -> usize {
    n as usize
}

fn write_bytes(a: &mut TieredAllocator, handle: Handle, bytes: &[u8]) -> bool {
    match a.payload_mut(handle) {
        Some(payload) if payload.len() >= bytes.len() => {
            payload[..bytes.len()].copy_from_slice(bytes);
            true
        }
        _ => false,
    }
}

fn read_bytes(a: &TieredAllocator, handle: Handle, len: usize) -> Option<Vec<u8>> {
    a.payload(handle)
        .filter(|payload| payload.len() >= len)
        .map(|payload| payload[..len].to_vec())
}

fn read_i32s(a: &TieredAllocator, handle: Handle, count: usize) -> Option<Vec<i32>> {
    read_bytes(a, handle, count * 4).map(|bytes| {
        bytes
            .chunks_exact(4)
            .map(|chunk| i32::from_ne_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect()
    })
}

// ---------------------------------------------------------------------------
// Basic operation and counters
// ---------------------------------------------------------------------------

fn malloc_returns_handle(a: &mut TieredAllocator, c: &mut Checks) {
    let result = a.allocate(100);
    c.expect("malloc(100) returns a handle", result.is_ok());
    if let Ok(p) = result {
        a.release(p);
    }
}

fn payload_holds_copied_value(a: &mut TieredAllocator, c: &mut Checks) {
    let message = b"tiered malloc is working!";
    let Some(p) = c.ok("malloc(100)", a.allocate(100)) else {
        return;
    };
    c.expect("message fits in payload", write_bytes(a, p, message));
    c.expect_eq(
        "payload holds the copied value",
        read_bytes(a, p, message.len()),
        Some(message.to_vec()),
    );
    a.release(p);
}

fn malloc_is_counted(a: &mut TieredAllocator, c: &mut Checks) {
    if let Some(p) = c.ok("malloc(100)", a.allocate(100)) {
        a.release(p);
    }
    c.expect_eq("mallocs", a.stats().allocate_count, 1);
}

fn free_is_counted(a: &mut TieredAllocator, c: &mut Checks) {
    if let Some(p) = c.ok("malloc(100)", a.allocate(100)) {
        a.release(p);
    }
    c.expect_eq("frees", a.stats().release_count, 1);
}

fn requested_memory_is_recorded(a: &mut TieredAllocator, c: &mut Checks) {
    if let Some(p) = c.ok("malloc(1000)", a.allocate(1000)) {
        a.release(p);
    }
    c.expect_eq("requested memory", a.stats().requested_bytes, 1000);
}

fn minimum_request(a: &mut TieredAllocator, c: &mut Checks) {
    if let Some(p) = c.ok("malloc(100)", a.allocate(100)) {
        c.expect_eq("payload capacity", a.payload_size(p), Some(256));
        a.release(p);
    }
    c.expect_eq("requested memory", a.stats().requested_bytes, 256);
}

// ---------------------------------------------------------------------------
// Splitting and coalescing
// ---------------------------------------------------------------------------

fn sole_region_release(a: &mut TieredAllocator, c: &mut Checks) {
    if let Some(p) = c.ok("malloc(1000)", a.allocate(1000)) {
        a.release(p);
    }
    c.expect_eq("regions", a.stats().live_region_count, 0);
}

fn split_leaves_free_tail(a: &mut TieredAllocator, c: &mut Checks) {
    if let Some(p) = c.ok("malloc(2000)", a.allocate(2000)) {
        a.release(p);
    }
    let p2 = c.ok("malloc(600)", a.allocate(600));
    let p3 = c.ok("malloc(500)", a.allocate(500));
    c.expect_eq("regions", a.stats().live_region_count, 3);
    for p in [p2, p3].into_iter().flatten() {
        a.release(p);
    }
}

fn right_coalescing(a: &mut TieredAllocator, c: &mut Checks) {
    let p = c.ok("malloc(300)", a.allocate(300));
    let p2 = c.ok("malloc(500)", a.allocate(500));
    for p in [p2, p].into_iter().flatten() {
        a.release(p);
    }
    c.expect_eq("regions", a.stats().live_region_count, 0);
}

fn left_coalescing(a: &mut TieredAllocator, c: &mut Checks) {
    let p = c.ok("malloc(100)", a.allocate(100));
    let p2 = c.ok("malloc(200)", a.allocate(200));
    for p in [p, p2].into_iter().flatten() {
        a.release(p);
    }
    c.expect_eq("regions", a.stats().live_region_count, 0);
}

fn left_and_right_coalescing(a: &mut TieredAllocator, c: &mut Checks) {
    let p = c.ok("malloc(100)", a.allocate(100));
    let p2 = c.ok("malloc(200)", a.allocate(200));
    let p3 = c.ok("malloc(150)", a.allocate(150));
    for p in [p, p3, p2].into_iter().flatten() {
        a.release(p);
    }
    c.expect_eq("regions", a.stats().live_region_count, 0);
}

// ---------------------------------------------------------------------------
// Tiers and blocks
// ---------------------------------------------------------------------------

fn small_block_count(a: &mut TieredAllocator, c: &mut Checks) {
    let handles: Vec<_> = (0..3)
        .filter_map(|_| c.ok("malloc(16000)", a.allocate(16 * 1000)))
        .collect();
    let stats = a.stats();
    c.expect_eq("small blocks", stats.live_block_count_small, 3);
    c.expect_eq("regions", stats.live_region_count, 6);
    for p in handles {
        a.release(p);
    }
}

fn one_block_per_tier(a: &mut TieredAllocator, c: &mut Checks) {
    let handles: Vec<_> = [500, 1000 * 1000, 1000 * 1000 * 10]
        .into_iter()
        .filter_map(|size| c.ok(&format!("malloc({size})"), a.allocate(size)))
        .collect();
    let stats = a.stats();
    for tier in Tier::ALL {
        c.expect_eq(format!("{tier} blocks"), stats.live_blocks(tier), 1);
    }
    c.expect_eq("regions", stats.live_region_count, 6);
    for p in handles {
        a.release(p);
    }
}

fn small_tier_spill(a: &mut TieredAllocator, c: &mut Checks) {
    for _ in 0..26 {
        let _ = c.ok("malloc(15360)", a.allocate(15 * 1024));
    }
    let stats = a.stats();
    c.expect_eq("small blocks", stats.live_block_count_small, Tier::Small.cap());
    c.expect_eq("medium blocks", stats.live_block_count_medium, 1);
}

fn released_blocks_unmapped(a: &mut TieredAllocator, c: &mut Checks) {
    for size in [1000, 17 * 1024, 2 * 1024 * 1024] {
        if let Some(p) = c.ok(&format!("malloc({size})"), a.allocate(size)) {
            a.release(p);
        }
    }
    let stats = a.stats();
    for tier in Tier::ALL {
        c.expect_eq(format!("{tier} blocks"), stats.live_blocks(tier), 0);
    }
}

// ---------------------------------------------------------------------------
// calloc
// ---------------------------------------------------------------------------

fn calloc_bytes_zero(a: &mut TieredAllocator, c: &mut Checks) {
    let Some(p) = c.ok("calloc(100, 1)", a.zero_allocate(100, 1)) else {
        return;
    };
    c.expect(
        "every byte is zero",
        a.payload(p).is_some_and(|bytes| bytes.iter().all(|&b| b == 0)),
    );
    a.release(p);
}

fn calloc_integers_zero(a: &mut TieredAllocator, c: &mut Checks) {
    let Some(p) = c.ok("calloc(100, 4)", a.zero_allocate(100, 4)) else {
        return;
    };
    c.expect(
        "every integer is zero",
        read_i32s(a, p, 100).is_some_and(|values| values.iter().all(|&v| v == 0)),
    );
    a.release(p);
}

fn calloc_integers_writable(a: &mut TieredAllocator, c: &mut Checks) {
    let Some(p) = c.ok("calloc(100, 4)", a.zero_allocate(100, 4)) else {
        return;
    };
    let bytes: Vec<u8> = (0..100i32).flat_map(i32::to_ne_bytes).collect();
    c.expect("integers fit in payload", write_bytes(a, p, &bytes));
    c.expect_eq(
        "integers read back",
        read_i32s(a, p, 100),
        Some((0..100).collect()),
    );
    a.release(p);
}

// ---------------------------------------------------------------------------
// realloc
// ---------------------------------------------------------------------------

fn realloc_null_allocates(a: &mut TieredAllocator, c: &mut Checks) {
    let result = c.ok("realloc(NULL, 1000)", a.reallocate(None, 1000));
    c.expect("a handle is returned", matches!(result, Some(Some(_))));
    c.expect_eq("requested memory", a.stats().requested_bytes, 1000);
    if let Some(Some(p)) = result {
        a.release(p);
    }
}

fn realloc_zero_releases(a: &mut TieredAllocator, c: &mut Checks) {
    let Some(p) = c.ok("malloc(500)", a.allocate(500)) else {
        return;
    };
    let result = c.ok("realloc(p, 0)", a.reallocate(Some(p), 0));
    c.expect_eq("frees", a.stats().release_count, 1);
    c.expect("no handle is returned", matches!(result, Some(None)));
}

fn realloc_grow_copies(a: &mut TieredAllocator, c: &mut Checks) {
    let message = b"content that survives a move";
    let Some(p) = c.ok("malloc(500)", a.allocate(500)) else {
        return;
    };
    write_bytes(a, p, message);
    let Some(Some(moved)) = c.ok("realloc(p, 1000)", a.reallocate(Some(p), 1000)) else {
        a.release(p);
        return;
    };
    c.expect_eq(
        "content is equal",
        read_bytes(a, moved, message.len()),
        read_bytes(a, p, message.len()),
    );
    a.release(p);
    a.release(moved);
}

fn realloc_shrink_keeps_handle(a: &mut TieredAllocator, c: &mut Checks) {
    let Some(p) = c.ok("malloc(1000)", a.allocate(1000)) else {
        return;
    };
    let result = c.ok("realloc(p, 200)", a.reallocate(Some(p), 200));
    c.expect_eq("same handle", result, Some(Some(p)));
    a.release(p);
}

fn realloc_grow_counts(a: &mut TieredAllocator, c: &mut Checks) {
    let Some(p) = c.ok("malloc(1000)", a.allocate(1000)) else {
        return;
    };
    let moved = c.ok("realloc(p, 2000)", a.reallocate(Some(p), 2000));
    let stats = a.stats();
    c.expect_eq("requested memory", stats.requested_bytes, 3000);
    c.expect_eq("mallocs", stats.allocate_count, 2);
    c.expect_eq("frees", stats.release_count, 0);
    a.release(p);
    if let Some(Some(moved)) = moved {
        a.release(moved);
    }
}

// ---------------------------------------------------------------------------
// Invalid sizes
// ---------------------------------------------------------------------------

fn is_invalid_size<T>(result: &Result<T, AllocError>) -> bool {
    matches!(result, Err(AllocError::InvalidSize { .. }))
}

fn malloc_rejects_negative(a: &mut TieredAllocator, c: &mut Checks) {
    c.expect("malloc(-10) fails with invalid size", is_invalid_size(&a.allocate(neg(-10))));
    c.expect_eq("mallocs", a.stats().allocate_count, 0);
}

fn calloc_rejects_negative(a: &mut TieredAllocator, c: &mut Checks) {
    for (count, size, label) in [
        (neg(-5), 10, "calloc(-5, 10)"),
        (5, neg(-10), "calloc(5, -10)"),
        (neg(-3), neg(-10), "calloc(-3, -10)"),
    ] {
        c.expect(
            format!("{label} fails with invalid size"),
            is_invalid_size(&a.zero_allocate(count, size)),
        );
    }
    c.expect_eq("mallocs", a.stats().allocate_count, 0);
}

fn realloc_rejects_negative(a: &mut TieredAllocator, c: &mut Checks) {
    let Some(p) = c.ok("malloc(5)", a.allocate(5)) else {
        return;
    };
    c.expect(
        "realloc(p, -5) fails with invalid size",
        is_invalid_size(&a.reallocate(Some(p), neg(-5))),
    );
    c.expect_eq("original stays live", a.payload_size(p), Some(256));
    a.release(p);
}

// ---------------------------------------------------------------------------
// Edges
// ---------------------------------------------------------------------------

fn double_free_noop(a: &mut TieredAllocator, c: &mut Checks) {
    let Some(p) = c.ok("malloc(100)", a.allocate(100)) else {
        return;
    };
    let _keep = c.ok("malloc(100)", a.allocate(100));
    a.release(p);
    let before = a.stats();
    a.release(p);
    let after = a.stats();
    c.expect_eq("frees", after.release_count, before.release_count + 1);
    c.expect_eq("regions", after.live_region_count, before.live_region_count);
}

fn oversize_rejected(a: &mut TieredAllocator, c: &mut Checks) {
    let result = a.allocate(Tier::Large.max_payload() + 1);
    c.expect(
        "request above the large payload fails as oversize",
        matches!(result, Err(AllocError::OversizeRequest { .. })),
    );
    c.expect_eq("blocks", a.stats().total_live_blocks(), 0);
    let exact = c.ok("largest request", a.allocate(Tier::Large.max_payload()));
    c.expect_eq("regions", a.stats().live_region_count, 1);
    if let Some(p) = exact {
        a.release(p);
    }
}

fn realloc_freed_rejected(a: &mut TieredAllocator, c: &mut Checks) {
    let Some(p) = c.ok("malloc(300)", a.allocate(300)) else {
        return;
    };
    let _keep = c.ok("malloc(300)", a.allocate(300));
    a.release(p);
    c.expect_eq(
        "realloc of freed handle",
        a.reallocate(Some(p), 600),
        Err(AllocError::CorruptedHandle),
    );
}

fn realloc_null_zero_noop(a: &mut TieredAllocator, c: &mut Checks) {
    c.expect_eq("realloc(NULL, 0)", a.reallocate(None, 0), Ok(None));
    c.expect_eq("counters", a.stats(), MallocStats::default());
}

fn fit_policy_hole(a: &mut TieredAllocator, c: &mut Checks) {
    // Holes of 1000 and 400 bytes separated by live regions.
    let sizes = [1000, 256, 400, 256];
    let handles: Vec<_> = sizes
        .iter()
        .filter_map(|&size| c.ok(&format!("malloc({size})"), a.allocate(size)))
        .collect();
    if handles.len() != sizes.len() {
        return;
    }
    a.release(handles[0]);
    a.release(handles[2]);
    let Some(p) = c.ok("malloc(400)", a.allocate(400)) else {
        return;
    };
    let expected = match a.config().fit {
        FitPolicy::FirstFit => handles[0],
        FitPolicy::BestFit => handles[2],
    };
    c.expect_eq("chosen hole", p, expected);
}

fn freed_region_reused(a: &mut TieredAllocator, c: &mut Checks) {
    let Some(p) = c.ok("malloc(512)", a.allocate(512)) else {
        return;
    };
    let _keep = c.ok("malloc(512)", a.allocate(512));
    a.release(p);
    let again = c.ok("malloc(512)", a.allocate(512));
    c.expect_eq("freed region is handed out again", again, Some(p));
    c.expect_eq("small blocks", a.stats().live_block_count_small, 1);
}
