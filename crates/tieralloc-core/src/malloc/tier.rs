//! Block tier registry.
//!
//! Three independent collections of mapped blocks (small, medium, large),
//! each capped at a fixed number of live blocks. Blocks sit in a fixed slot
//! table per tier and are chained in creation order through slot indices.

use std::fmt;

use serde::Serialize;

use super::error::AllocError;
use super::layout::{self, REGION_HEADER_SIZE};
use super::region;
use crate::mmap::{self, MapError, MappedSpan};

/// Largest per-tier block cap.
pub const MAX_TIER_CAP: usize = 50;

/// Block size class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    /// 16 KiB blocks, at most 25 live.
    Small,
    /// 1 MiB blocks, at most 50 live.
    Medium,
    /// 32 MiB blocks, at most 25 live.
    Large,
}

impl Tier {
    /// All tiers in search order.
    pub const ALL: [Self; 3] = [Self::Small, Self::Medium, Self::Large];

    /// Bytes mapped per block.
    #[must_use]
    pub const fn block_size(self) -> usize {
        match self {
            Self::Small => 16 * 1024,
            Self::Medium => 1024 * 1024,
            Self::Large => 32 * 1024 * 1024,
        }
    }

    /// Maximum number of live blocks.
    #[must_use]
    pub const fn cap(self) -> usize {
        match self {
            Self::Small | Self::Large => 25,
            Self::Medium => MAX_TIER_CAP,
        }
    }

    /// Largest payload a single fresh block can serve.
    #[must_use]
    pub const fn max_payload(self) -> usize {
        self.block_size() - REGION_HEADER_SIZE
    }

    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::Small => 0,
            Self::Medium => 1,
            Self::Large => 2,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Small => "small",
            Self::Medium => "medium",
            Self::Large => "large",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Position of a region: owning tier, block slot, header offset in the span.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionLoc {
    pub tier: Tier,
    pub slot: usize,
    pub offset: usize,
}

/// One mapped block and its links in the tier collection.
#[derive(Debug)]
pub struct Block {
    pub span: MappedSpan,
    pub prev: Option<usize>,
    pub next: Option<usize>,
}

/// The blocks of one tier.
#[derive(Debug)]
pub struct TierCollection {
    tier: Tier,
    slots: [Option<Block>; MAX_TIER_CAP],
    head: Option<usize>,
    tail: Option<usize>,
    live: usize,
}

impl TierCollection {
    pub fn new(tier: Tier) -> Self {
        Self {
            tier,
            slots: std::array::from_fn(|_| None),
            head: None,
            tail: None,
            live: 0,
        }
    }

    #[must_use]
    pub const fn tier(&self) -> Tier {
        self.tier
    }

    /// Live blocks in this tier.
    #[must_use]
    pub const fn live(&self) -> usize {
        self.live
    }

    #[must_use]
    pub const fn has_capacity(&self) -> bool {
        self.live < self.tier.cap()
    }

    /// First block in creation order.
    #[must_use]
    pub const fn head(&self) -> Option<usize> {
        self.head
    }

    #[must_use]
    pub fn block(&self, slot: usize) -> Option<&Block> {
        self.slots.get(slot)?.as_ref()
    }

    #[must_use]
    pub fn block_mut(&mut self, slot: usize) -> Option<&mut Block> {
        self.slots.get_mut(slot)?.as_mut()
    }

    /// Slot of the block after `slot` in creation order.
    #[must_use]
    pub fn next_of(&self, slot: usize) -> Option<usize> {
        self.block(slot)?.next
    }

    /// Occupied slots, in slot order (not creation order).
    pub fn occupied(&self) -> impl Iterator<Item = (usize, &Block)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(slot, block)| block.as_ref().map(|block| (slot, block)))
    }

    /// Maps a new block, carves its initial used region and appends it at
    /// the tail. The caller checks the cap first.
    pub fn create_block(&mut self) -> Result<usize, MapError> {
        let slot = self
            .slots
            .iter()
            .position(Option::is_none)
            .filter(|&slot| slot < self.tier.cap())
            .ok_or(MapError::Map {
                len: self.tier.block_size(),
                errno: libc::ENOMEM,
            })?;

        let mut span = mmap::request_block(self.tier.block_size())?;
        region::carve_initial(&mut span);

        let prev = self.tail;
        if let Some(tail) = prev.and_then(|tail| self.slots[tail].as_mut()) {
            tail.next = Some(slot);
        }
        self.slots[slot] = Some(Block {
            span,
            prev,
            next: None,
        });
        if self.head.is_none() {
            self.head = Some(slot);
        }
        self.tail = Some(slot);
        self.live += 1;
        Ok(slot)
    }

    /// Unlinks the block in `slot` and unmaps it.
    ///
    /// Returns `Ok(())` for an empty slot. The block is unlinked and counted
    /// out even when `munmap` fails.
    pub fn destroy_block(&mut self, slot: usize) -> Result<(), MapError> {
        let Some(block) = self.slots.get_mut(slot).and_then(Option::take) else {
            return Ok(());
        };

        match (block.prev, block.next) {
            (None, None) => {
                self.head = None;
                self.tail = None;
            }
            (Some(prev), Some(next)) => {
                self.link_next(prev, Some(next));
                self.link_prev(next, Some(prev));
            }
            (None, Some(next)) => {
                self.head = Some(next);
                self.link_prev(next, None);
            }
            (Some(prev), None) => {
                self.tail = Some(prev);
                self.link_next(prev, None);
            }
        }
        self.live -= 1;
        mmap::release_block(block.span)
    }

    fn link_next(&mut self, slot: usize, next: Option<usize>) {
        if let Some(block) = self.block_mut(slot) {
            block.next = next;
        }
    }

    fn link_prev(&mut self, slot: usize, prev: Option<usize>) {
        if let Some(block) = self.block_mut(slot) {
            block.prev = prev;
        }
    }
}

/// The three tier collections.
#[derive(Debug)]
pub struct BlockTierRegistry {
    tiers: [TierCollection; 3],
}

impl BlockTierRegistry {
    pub fn new() -> Self {
        Self {
            tiers: Tier::ALL.map(TierCollection::new),
        }
    }

    #[must_use]
    pub fn tier(&self, tier: Tier) -> &TierCollection {
        &self.tiers[tier.index()]
    }

    pub fn tier_mut(&mut self, tier: Tier) -> &mut TierCollection {
        &mut self.tiers[tier.index()]
    }

    /// Smallest tier whose fresh block holds `size` and is under its cap.
    pub fn select_tier(&self, size: usize) -> Result<Tier, AllocError> {
        if let Some(tier) = Tier::ALL
            .into_iter()
            .find(|&tier| size <= tier.max_payload() && self.tier(tier).has_capacity())
        {
            return Ok(tier);
        }
        let max = Tier::Large.max_payload();
        if size > max {
            Err(AllocError::OversizeRequest { size, max })
        } else {
            Err(AllocError::OutOfCapacity { size })
        }
    }

    /// Maps a block in `tier` and returns its initial used region.
    pub fn create_block(&mut self, tier: Tier) -> Result<RegionLoc, AllocError> {
        let slot = self.tier_mut(tier).create_block()?;
        Ok(RegionLoc {
            tier,
            slot,
            offset: region::FIRST_REGION,
        })
    }

    pub fn destroy_block(&mut self, tier: Tier, slot: usize) -> Result<(), MapError> {
        self.tier_mut(tier).destroy_block(slot)
    }

    /// Finds the live block whose span contains `addr`.
    #[must_use]
    pub fn block_containing(&self, addr: usize) -> Option<(Tier, usize)> {
        Tier::ALL.into_iter().find_map(|tier| {
            self.tier(tier)
                .occupied()
                .find(|(_, block)| block.span.contains(addr))
                .map(|(slot, _)| (tier, slot))
        })
    }

    /// Maps a payload address to the header location it implies.
    ///
    /// Only the address range is checked; the caller validates the header.
    #[must_use]
    pub fn locate(&self, addr: usize) -> Option<RegionLoc> {
        let (tier, slot) = self.block_containing(addr)?;
        let base = self.span(tier, slot)?.base_addr();
        let payload = addr - base;
        if payload < REGION_HEADER_SIZE || payload % layout::ALIGNMENT != 0 {
            return None;
        }
        Some(RegionLoc {
            tier,
            slot,
            offset: payload - REGION_HEADER_SIZE,
        })
    }

    #[must_use]
    pub fn span(&self, tier: Tier, slot: usize) -> Option<&MappedSpan> {
        self.tier(tier).block(slot).map(|block| &block.span)
    }

    pub fn span_mut(&mut self, tier: Tier, slot: usize) -> Option<&mut MappedSpan> {
        self.tier_mut(tier).block_mut(slot).map(|block| &mut block.span)
    }

    /// Copies `len` payload bytes from `src` to `dst`.
    pub fn copy_payload(&mut self, src: RegionLoc, dst: RegionLoc, len: usize) {
        let from = layout::payload_offset(src.offset);
        let to = layout::payload_offset(dst.offset);

        if (src.tier, src.slot) == (dst.tier, dst.slot) {
            if let Some(span) = self.span_mut(src.tier, src.slot) {
                let total = span.len();
                span.bytes_mut(0, total).copy_within(from..from + len, to);
            }
            return;
        }

        let mut chunk = [0u8; 4096];
        let mut done = 0;
        while done < len {
            let step = chunk.len().min(len - done);
            let Some(source) = self.span(src.tier, src.slot) else {
                return;
            };
            chunk[..step].copy_from_slice(source.bytes(from + done, step));
            let Some(target) = self.span_mut(dst.tier, dst.slot) else {
                return;
            };
            target.bytes_mut(to + done, step).copy_from_slice(&chunk[..step]);
            done += step;
        }
    }
}

impl Default for BlockTierRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::malloc::layout::{RegionHeader, payload_offset};

    fn creation_order(collection: &TierCollection) -> Vec<usize> {
        let mut order = Vec::new();
        let mut cursor = collection.head();
        while let Some(slot) = cursor {
            order.push(slot);
            cursor = collection.next_of(slot);
        }
        order
    }

    #[test]
    fn tier_constants() {
        assert_eq!(Tier::Small.block_size(), 16_384);
        assert_eq!(Tier::Medium.block_size(), 1_048_576);
        assert_eq!(Tier::Large.block_size(), 33_554_432);
        assert_eq!(Tier::Small.cap(), 25);
        assert_eq!(Tier::Medium.cap(), 50);
        assert_eq!(Tier::Large.cap(), 25);
        assert_eq!(
            Tier::Small.max_payload(),
            Tier::Small.block_size() - REGION_HEADER_SIZE
        );
        for (i, tier) in Tier::ALL.into_iter().enumerate() {
            assert_eq!(tier.index(), i);
            assert!(tier.cap() <= MAX_TIER_CAP);
        }
    }

    #[test]
    fn select_tier_prefers_smallest_fitting() {
        let registry = BlockTierRegistry::new();
        assert_eq!(registry.select_tier(256), Ok(Tier::Small));
        assert_eq!(registry.select_tier(Tier::Small.max_payload()), Ok(Tier::Small));
        assert_eq!(
            registry.select_tier(Tier::Small.max_payload() + 4),
            Ok(Tier::Medium)
        );
        assert_eq!(
            registry.select_tier(Tier::Medium.max_payload() + 4),
            Ok(Tier::Large)
        );
        assert_eq!(
            registry.select_tier(Tier::Large.max_payload() + 4),
            Err(AllocError::OversizeRequest {
                size: Tier::Large.max_payload() + 4,
                max: Tier::Large.max_payload()
            })
        );
    }

    #[test]
    fn select_tier_falls_back_when_capped() {
        let mut registry = BlockTierRegistry::new();
        for _ in 0..Tier::Small.cap() {
            registry.create_block(Tier::Small).unwrap();
        }
        assert!(!registry.tier(Tier::Small).has_capacity());
        assert_eq!(registry.select_tier(256), Ok(Tier::Medium));
    }

    #[test]
    fn create_block_carves_one_used_region() {
        let mut registry = BlockTierRegistry::new();
        let loc = registry.create_block(Tier::Small).unwrap();
        assert_eq!(loc.offset, 0);
        let span = registry.span(Tier::Small, loc.slot).unwrap();
        let header = RegionHeader::read(span, 0);
        assert!(!header.free);
        assert!(header.is_tagged());
        assert_eq!(header.size, Tier::Small.max_payload());
        assert_eq!(registry.tier(Tier::Small).live(), 1);
    }

    #[test]
    fn destroy_handles_all_topologies() {
        let mut collection = TierCollection::new(Tier::Small);
        let slots: Vec<usize> = (0..4).map(|_| collection.create_block().unwrap()).collect();
        assert_eq!(creation_order(&collection), slots);

        // interior
        collection.destroy_block(slots[1]).unwrap();
        assert_eq!(creation_order(&collection), vec![slots[0], slots[2], slots[3]]);
        // head
        collection.destroy_block(slots[0]).unwrap();
        assert_eq!(creation_order(&collection), vec![slots[2], slots[3]]);
        assert_eq!(collection.block(slots[2]).unwrap().prev, None);
        // tail
        collection.destroy_block(slots[3]).unwrap();
        assert_eq!(creation_order(&collection), vec![slots[2]]);
        assert_eq!(collection.block(slots[2]).unwrap().next, None);
        // sole
        collection.destroy_block(slots[2]).unwrap();
        assert!(creation_order(&collection).is_empty());
        assert_eq!(collection.live(), 0);
        assert_eq!(collection.head(), None);
    }

    #[test]
    fn freed_slot_is_reused_and_appended_at_tail() {
        let mut collection = TierCollection::new(Tier::Small);
        let a = collection.create_block().unwrap();
        let b = collection.create_block().unwrap();
        collection.destroy_block(a).unwrap();
        let c = collection.create_block().unwrap();
        assert_eq!(c, a);
        assert_eq!(creation_order(&collection), vec![b, c]);
    }

    #[test]
    fn locate_rejects_addresses_inside_headers() {
        let mut registry = BlockTierRegistry::new();
        let loc = registry.create_block(Tier::Small).unwrap();
        let base = registry.span(Tier::Small, loc.slot).unwrap().base_addr();

        assert_eq!(registry.locate(base), None);
        assert_eq!(registry.locate(base + REGION_HEADER_SIZE + 1), None);
        assert_eq!(registry.locate(base + Tier::Small.block_size()), None);
        assert_eq!(registry.locate(base + REGION_HEADER_SIZE), Some(loc));
        assert_eq!(registry.block_containing(base + 100), Some((Tier::Small, loc.slot)));
    }

    #[test]
    fn copy_payload_across_tiers() {
        let mut registry = BlockTierRegistry::new();
        let src = registry.create_block(Tier::Small).unwrap();
        let dst = registry.create_block(Tier::Medium).unwrap();
        let pattern: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
        let from = payload_offset(src.offset);
        registry
            .span_mut(Tier::Small, src.slot)
            .unwrap()
            .bytes_mut(from, pattern.len())
            .copy_from_slice(&pattern);

        registry.copy_payload(src, dst, pattern.len());

        let to = payload_offset(dst.offset);
        let copied = registry
            .span(Tier::Medium, dst.slot)
            .unwrap()
            .bytes(to, pattern.len());
        assert_eq!(copied, pattern.as_slice());
    }
}
