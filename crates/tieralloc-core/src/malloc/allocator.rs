//! Allocator facade.
//!
//! [`TieredAllocator`] owns the tier registry and the counters, and drives
//! the fit strategy, the region engine and the map provider for the four
//! public operations. It is a plain value: no global state and no locking.

use std::fmt;
use std::ptr::NonNull;

use super::error::{AllocError, IntegrityError};
use super::fit::FitStrategy;
use super::layout::{self, REGION_HEADER_SIZE, REGION_TAG, RegionHeader};
use super::log::{self, AllocatorLogLevel, AllocatorLogRecord};
use super::region;
use super::stats::MallocStats;
use super::tier::{BlockTierRegistry, MAX_TIER_CAP, RegionLoc, Tier};
use crate::config::{AllocatorConfig, FitPolicy};

/// Address of a payload handed out by the allocator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle(NonNull<u8>);

impl Handle {
    /// Wraps a raw pointer; `None` for null.
    #[must_use]
    pub fn from_ptr(ptr: *mut u8) -> Option<Self> {
        NonNull::new(ptr).map(Self)
    }

    #[must_use]
    pub const fn as_ptr(self) -> *mut u8 {
        self.0.as_ptr()
    }

    #[must_use]
    pub fn addr(self) -> usize {
        self.0.as_ptr() as usize
    }
}

/// Sizes are rejected when they are negative as a C `int`, i.e. bit 31 of
/// the low 32 bits is set. Higher bits are not looked at.
fn is_negative(size: usize) -> bool {
    (size as u32 as i32) < 0
}

/// Tiered mmap-backed allocator.
///
/// Single-threaded: the value is `Send` but not `Sync`, and callers that
/// share it must provide their own exclusion.
#[derive(Debug)]
pub struct TieredAllocator {
    config: AllocatorConfig,
    registry: BlockTierRegistry,
    /// Successful size checks in allocate (including nested calls).
    allocate_count: u64,
    /// Calls to release, valid or not.
    release_count: u64,
    /// Sum of normalized request sizes.
    requested_bytes: u64,
    /// Regions across all live blocks.
    live_regions: usize,
    /// Monotonic lifecycle decision id.
    next_decision_id: u64,
    /// Structured allocator lifecycle records.
    lifecycle_logs: Vec<AllocatorLogRecord>,
}

impl TieredAllocator {
    /// Creates an empty allocator. No memory is mapped until the first
    /// allocation.
    #[must_use]
    pub fn new(config: AllocatorConfig) -> Self {
        Self {
            config,
            registry: BlockTierRegistry::new(),
            allocate_count: 0,
            release_count: 0,
            requested_bytes: 0,
            live_regions: 0,
            next_decision_id: 1,
            lifecycle_logs: Vec::new(),
        }
    }

    /// Shorthand for an allocator with `fit` and logging off.
    #[must_use]
    pub fn with_fit(fit: FitPolicy) -> Self {
        Self::new(AllocatorConfig::new(fit))
    }

    #[must_use]
    pub const fn config(&self) -> &AllocatorConfig {
        &self.config
    }

    #[allow(clippy::too_many_arguments)]
    fn record_lifecycle(
        &mut self,
        level: AllocatorLogLevel,
        symbol: &'static str,
        event: &'static str,
        ptr: Option<usize>,
        size: Option<usize>,
        tier: Option<Tier>,
        outcome: &'static str,
        details: fmt::Arguments<'_>,
    ) {
        if !self.config.lifecycle_log {
            return;
        }
        let decision_id = self.next_decision_id;
        self.next_decision_id = self.next_decision_id.wrapping_add(1);
        self.lifecycle_logs.push(AllocatorLogRecord {
            decision_id,
            trace_id: log::trace_id(symbol, decision_id),
            level,
            symbol,
            event,
            ptr,
            size,
            tier,
            outcome,
            details: details.to_string(),
            live_regions: self.live_regions,
            requested_bytes: self.requested_bytes,
        });
    }

    fn reject_size(&mut self, symbol: &'static str, size: usize) -> AllocError {
        self.record_lifecycle(
            AllocatorLogLevel::Warn,
            symbol,
            "invalid_size",
            None,
            Some(size),
            None,
            "rejected",
            format_args!("size {size:#x} is negative as signed"),
        );
        AllocError::InvalidSize { requested: size }
    }

    // -----------------------------------------------------------------------
    // Public operations
    // -----------------------------------------------------------------------

    /// Allocates at least `size` bytes.
    ///
    /// The request is clamped to 256 bytes and rounded up to a multiple of 4
    /// before the counters are bumped, so a failure after that point is
    /// still counted.
    pub fn allocate(&mut self, size: usize) -> Result<Handle, AllocError> {
        self.allocate_region("malloc", size).map(|(_, handle)| handle)
    }

    /// Returns a region to its block.
    ///
    /// A handle without a valid tag in front of it is ignored; so is a
    /// handle whose region is already free. Both still count as a release.
    pub fn release(&mut self, handle: Handle) {
        self.release_as("free", handle);
    }

    /// Allocates `count * size` bytes, all zero.
    ///
    /// The product wraps on overflow; only the sign of each operand is
    /// checked.
    pub fn zero_allocate(&mut self, count: usize, size: usize) -> Result<Handle, AllocError> {
        if is_negative(count) {
            return Err(self.reject_size("calloc", count));
        }
        if is_negative(size) {
            return Err(self.reject_size("calloc", size));
        }
        let (loc, handle) = self.allocate_region("calloc", count.wrapping_mul(size))?;
        if let Some(span) = self.registry.span_mut(loc.tier, loc.slot) {
            let payload = RegionHeader::read(span, loc.offset).size;
            span.fill(layout::payload_offset(loc.offset), payload, 0);
        }
        Ok(handle)
    }

    /// Resizes an allocation.
    ///
    /// - `None` with a non-zero size allocates; `None` with zero is a no-op.
    /// - A zero size releases the handle and returns `None`.
    /// - A smaller size shrinks in place and returns the same handle.
    /// - Otherwise a new region is allocated and the whole old payload is
    ///   copied into it. The old region is left allocated.
    pub fn reallocate(
        &mut self,
        handle: Option<Handle>,
        new_size: usize,
    ) -> Result<Option<Handle>, AllocError> {
        if is_negative(new_size) {
            return Err(self.reject_size("realloc", new_size));
        }
        let Some(handle) = handle else {
            if new_size == 0 {
                return Ok(None);
            }
            return self
                .allocate_region("realloc", new_size)
                .map(|(_, handle)| Some(handle));
        };
        if new_size == 0 {
            self.release_as("realloc", handle);
            return Ok(None);
        }

        let addr = handle.addr();
        let Some((loc, header)) = self.validate(addr).filter(|(_, header)| !header.free) else {
            self.record_lifecycle(
                AllocatorLogLevel::Warn,
                "realloc",
                "corrupted_handle",
                Some(addr),
                Some(new_size),
                None,
                "rejected",
                format_args!("no live region behind pointer"),
            );
            return Err(AllocError::CorruptedHandle);
        };

        if header.size > new_size {
            self.split_claimed("realloc", loc, layout::normalize_request(new_size));
            self.record_lifecycle(
                AllocatorLogLevel::Trace,
                "realloc",
                "realloc_shrink_in_place",
                Some(addr),
                Some(new_size),
                Some(loc.tier),
                "same_handle",
                format_args!("old_size={}", header.size),
            );
            return Ok(Some(handle));
        }

        let (dst, moved) = self.allocate_region("realloc", new_size)?;
        self.registry.copy_payload(loc, dst, header.size);
        self.record_lifecycle(
            AllocatorLogLevel::Trace,
            "realloc",
            "realloc_grow",
            Some(moved.addr()),
            Some(new_size),
            Some(dst.tier),
            "copied",
            format_args!("from={addr:#x} copied={}", header.size),
        );
        Ok(Some(moved))
    }

    /// Snapshot of the counters.
    #[must_use]
    pub fn stats(&self) -> MallocStats {
        MallocStats {
            allocate_count: self.allocate_count,
            release_count: self.release_count,
            requested_bytes: self.requested_bytes,
            live_region_count: self.live_regions,
            live_block_count_small: self.registry.tier(Tier::Small).live(),
            live_block_count_medium: self.registry.tier(Tier::Medium).live(),
            live_block_count_large: self.registry.tier(Tier::Large).live(),
        }
    }

    // -----------------------------------------------------------------------
    // Inspection
    // -----------------------------------------------------------------------

    /// Whether `addr` lies inside any live block.
    #[must_use]
    pub fn owns(&self, addr: usize) -> bool {
        self.registry.block_containing(addr).is_some()
    }

    /// Payload capacity of a live allocation.
    #[must_use]
    pub fn payload_size(&self, handle: Handle) -> Option<usize> {
        self.live_region(handle).map(|(_, header)| header.size)
    }

    /// Borrows the payload of a live allocation.
    #[must_use]
    pub fn payload(&self, handle: Handle) -> Option<&[u8]> {
        let (loc, header) = self.live_region(handle)?;
        let span = self.registry.span(loc.tier, loc.slot)?;
        Some(span.bytes(layout::payload_offset(loc.offset), header.size))
    }

    /// Mutably borrows the payload of a live allocation.
    pub fn payload_mut(&mut self, handle: Handle) -> Option<&mut [u8]> {
        let (loc, header) = self.live_region(handle)?;
        let span = self.registry.span_mut(loc.tier, loc.slot)?;
        Some(span.bytes_mut(layout::payload_offset(loc.offset), header.size))
    }

    /// Walks every block and checks the structural invariants.
    pub fn verify_integrity(&self) -> Result<(), IntegrityError> {
        let mut regions = 0;
        for tier in Tier::ALL {
            let collection = self.registry.tier(tier);
            let mut linked = 0;
            let mut prev = None;
            let mut cursor = collection.head();
            while let Some(slot) = cursor {
                let block = collection
                    .block(slot)
                    .filter(|block| block.prev == prev && linked < MAX_TIER_CAP)
                    .ok_or(IntegrityError::BrokenBlockList { tier, slot })?;
                regions += region::verify_chain(&block.span, tier, slot)?;
                linked += 1;
                prev = Some(slot);
                cursor = block.next;
            }
            let recorded = collection.live();
            if linked != recorded || collection.occupied().count() != recorded {
                return Err(IntegrityError::LiveCountMismatch {
                    tier,
                    counted: linked,
                    recorded,
                });
            }
        }
        if regions != self.live_regions {
            return Err(IntegrityError::RegionCountMismatch {
                counted: regions,
                recorded: self.live_regions,
            });
        }
        Ok(())
    }

    /// Returns a view of allocator lifecycle log records.
    pub fn lifecycle_logs(&self) -> &[AllocatorLogRecord] {
        &self.lifecycle_logs
    }

    /// Drains allocator lifecycle log records.
    pub fn drain_lifecycle_logs(&mut self) -> Vec<AllocatorLogRecord> {
        std::mem::take(&mut self.lifecycle_logs)
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn allocate_region(
        &mut self,
        symbol: &'static str,
        size: usize,
    ) -> Result<(RegionLoc, Handle), AllocError> {
        if is_negative(size) {
            return Err(self.reject_size(symbol, size));
        }
        let size = layout::normalize_request(size);
        self.allocate_count += 1;
        self.requested_bytes = self.requested_bytes.saturating_add(size as u64);

        let loc = match self.search(size) {
            Some(loc) => loc,
            None => self.grow(symbol, size)?,
        };
        self.split_claimed(symbol, loc, size);
        let handle = self
            .registry
            .span(loc.tier, loc.slot)
            .map(|span| Handle(span.ptr_at(layout::payload_offset(loc.offset))))
            .ok_or(AllocError::CorruptedHandle)?;

        let fit = self.config.fit.name();
        self.record_lifecycle(
            AllocatorLogLevel::Trace,
            symbol,
            "alloc",
            Some(handle.addr()),
            Some(size),
            Some(loc.tier),
            "ok",
            format_args!("fit={fit} slot={} offset={}", loc.slot, loc.offset),
        );
        Ok((loc, handle))
    }

    /// Claims a free region from the first tier whose blocks can hold `size`.
    fn search(&mut self, size: usize) -> Option<RegionLoc> {
        let fit = self.config.fit;
        let registry = &mut self.registry;
        Tier::ALL
            .into_iter()
            .filter(|tier| size <= tier.max_payload())
            .find_map(|tier| fit.select(registry.tier_mut(tier), size))
    }

    fn grow(&mut self, symbol: &'static str, size: usize) -> Result<RegionLoc, AllocError> {
        let tier = match self.registry.select_tier(size) {
            Ok(tier) => tier,
            Err(err) => {
                let event = if matches!(err, AllocError::OversizeRequest { .. }) {
                    "oversize"
                } else {
                    "out_of_capacity"
                };
                self.record_lifecycle(
                    AllocatorLogLevel::Warn,
                    symbol,
                    event,
                    None,
                    Some(size),
                    None,
                    "rejected",
                    format_args!("{err}"),
                );
                return Err(err);
            }
        };

        match self.registry.create_block(tier) {
            Ok(loc) => {
                self.live_regions += 1;
                let live = self.registry.tier(tier).live();
                self.record_lifecycle(
                    AllocatorLogLevel::Debug,
                    symbol,
                    "block_created",
                    None,
                    Some(tier.block_size()),
                    Some(tier),
                    "mapped",
                    format_args!("slot={} live_blocks={live}", loc.slot),
                );
                Ok(loc)
            }
            Err(err) => {
                self.record_lifecycle(
                    AllocatorLogLevel::Error,
                    symbol,
                    "map_failed",
                    None,
                    Some(tier.block_size()),
                    Some(tier),
                    "failed",
                    format_args!("{err}"),
                );
                Err(err)
            }
        }
    }

    /// Splits the used region at `loc` down to `size` when the leftover can
    /// stand as its own region.
    fn split_claimed(&mut self, symbol: &'static str, loc: RegionLoc, size: usize) {
        let Some(span) = self.registry.span_mut(loc.tier, loc.slot) else {
            return;
        };
        let Some(outcome) = region::split(span, loc.offset, size) else {
            return;
        };
        if !outcome.absorbed_successor {
            self.live_regions += 1;
        }
        self.record_lifecycle(
            AllocatorLogLevel::Trace,
            symbol,
            "split",
            None,
            Some(size),
            Some(loc.tier),
            if outcome.absorbed_successor {
                "tail_merged"
            } else {
                "tail_carved"
            },
            format_args!("offset={} tail={}", loc.offset, outcome.tail),
        );
    }

    fn release_as(&mut self, symbol: &'static str, handle: Handle) {
        self.release_count += 1;
        let addr = handle.addr();
        let Some((loc, header)) = self.validate(addr) else {
            self.record_lifecycle(
                AllocatorLogLevel::Warn,
                symbol,
                "corrupted_handle",
                Some(addr),
                None,
                None,
                "ignored",
                format_args!("no tagged region behind pointer"),
            );
            return;
        };
        if header.free {
            self.record_lifecycle(
                AllocatorLogLevel::Warn,
                symbol,
                "double_release",
                Some(addr),
                Some(header.size),
                Some(loc.tier),
                "ignored",
                format_args!("region already free"),
            );
            return;
        }

        let Some(span) = self.registry.span_mut(loc.tier, loc.slot) else {
            return;
        };
        let merge = region::coalesce_on_release(span, loc.offset);
        self.live_regions -= merge.merged;
        self.record_lifecycle(
            AllocatorLogLevel::Trace,
            symbol,
            "coalesce",
            Some(addr),
            Some(header.size),
            Some(loc.tier),
            "released",
            format_args!("merged={} survivor={}", merge.merged, merge.region),
        );

        if merge.sole {
            self.live_regions -= 1;
            let (level, event, outcome) = match self.registry.destroy_block(loc.tier, loc.slot) {
                Ok(()) => (AllocatorLogLevel::Debug, "block_destroyed", "unmapped"),
                Err(_) => (AllocatorLogLevel::Error, "unmap_failed", "leaked"),
            };
            self.record_lifecycle(
                level,
                symbol,
                event,
                None,
                Some(loc.tier.block_size()),
                Some(loc.tier),
                outcome,
                format_args!("slot={}", loc.slot),
            );
        }
    }

    /// Resolves `addr` to a region whose header carries the tag, fits in
    /// its block and links to plausible neighbours.
    ///
    /// A tag forged by payload bytes is still accepted when its links also
    /// line up; the link checks only keep the walk inside the block.
    fn validate(&self, addr: usize) -> Option<(RegionLoc, RegionHeader)> {
        let loc = self.registry.locate(addr)?;
        let span = self.registry.span(loc.tier, loc.slot)?;
        if layout::read_tag(span, loc.offset) != REGION_TAG {
            return None;
        }
        let header = RegionHeader::read(span, loc.offset);
        let end = layout::payload_offset(loc.offset).checked_add(header.size)?;
        let next_ok = match header.next {
            None => end == span.len(),
            Some(next) => {
                next == end
                    && next
                        .checked_add(REGION_HEADER_SIZE)
                        .is_some_and(|next_end| next_end <= span.len())
            }
        };
        let prev_ok = match header.prev {
            None => loc.offset == region::FIRST_REGION,
            Some(prev) => prev
                .checked_add(REGION_HEADER_SIZE)
                .is_some_and(|prev_end| prev_end <= loc.offset),
        };
        (next_ok && prev_ok).then_some((loc, header))
    }

    fn live_region(&self, handle: Handle) -> Option<(RegionLoc, RegionHeader)> {
        self.validate(handle.addr()).filter(|(_, header)| !header.free)
    }
}

impl Default for TieredAllocator {
    fn default() -> Self {
        Self::new(AllocatorConfig::default())
    }
}
