//! Fit strategies.
//!
//! A strategy searches one tier for a free region of at least the requested
//! size and marks it used. Blocks are visited in creation order and regions
//! in address order.

use super::layout;
use super::region;
use super::tier::{RegionLoc, TierCollection};
use crate::config::FitPolicy;

/// Region search policy over one tier.
pub(crate) trait FitStrategy {
    fn name(&self) -> &'static str;

    /// Claims a free region of at least `size` payload bytes.
    fn select(&self, tier: &mut TierCollection, size: usize) -> Option<RegionLoc>;
}

/// Takes the first free region that fits.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct FirstFit;

/// Takes the free region with the least slack; ties go to the first seen.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct BestFit;

impl FitStrategy for FirstFit {
    fn name(&self) -> &'static str {
        "first-fit"
    }

    fn select(&self, tier: &mut TierCollection, size: usize) -> Option<RegionLoc> {
        let mut cursor = tier.head();
        while let Some(slot) = cursor {
            let block = tier.block(slot)?;
            let hit = region::regions(&block.span)
                .find(|(_, header)| header.free && header.size >= size)
                .map(|(offset, _)| offset);
            if let Some(offset) = hit {
                return claim(tier, slot, offset);
            }
            cursor = block.next;
        }
        None
    }
}

impl FitStrategy for BestFit {
    fn name(&self) -> &'static str {
        "best-fit"
    }

    fn select(&self, tier: &mut TierCollection, size: usize) -> Option<RegionLoc> {
        // (slot, offset, slack)
        let mut best: Option<(usize, usize, usize)> = None;
        let mut cursor = tier.head();
        'blocks: while let Some(slot) = cursor {
            let block = tier.block(slot)?;
            for (offset, header) in region::regions(&block.span) {
                if !header.free || header.size < size {
                    continue;
                }
                let slack = header.size - size;
                if best.is_none_or(|(_, _, least)| slack < least) {
                    best = Some((slot, offset, slack));
                    if slack == 0 {
                        break 'blocks;
                    }
                }
            }
            cursor = block.next;
        }
        let (slot, offset, _) = best?;
        claim(tier, slot, offset)
    }
}

impl FitStrategy for FitPolicy {
    fn name(&self) -> &'static str {
        self.as_str()
    }

    fn select(&self, tier: &mut TierCollection, size: usize) -> Option<RegionLoc> {
        match self {
            Self::FirstFit => FirstFit.select(tier, size),
            Self::BestFit => BestFit.select(tier, size),
        }
    }
}

fn claim(tier: &mut TierCollection, slot: usize, offset: usize) -> Option<RegionLoc> {
    let tier_id = tier.tier();
    let block = tier.block_mut(slot)?;
    layout::set_free(&mut block.span, offset, false);
    Some(RegionLoc {
        tier: tier_id,
        slot,
        offset,
    })
}
