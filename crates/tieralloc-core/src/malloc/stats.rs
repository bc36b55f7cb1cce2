//! Statistics snapshot.

use serde::Serialize;

use super::tier::Tier;

/// Point-in-time copy of the allocator counters.
///
/// All fields start at zero when the allocator is constructed. The counters
/// only grow; the live counts follow the current state of the blocks.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MallocStats {
    /// Calls to allocate that passed the size check, including the ones
    /// issued by zero_allocate and reallocate.
    pub allocate_count: u64,
    /// Calls to release, including rejected handles.
    pub release_count: u64,
    /// Sum of normalized request sizes.
    pub requested_bytes: u64,
    /// Regions currently present across all blocks.
    pub live_region_count: usize,
    /// Live 16 KiB blocks.
    pub live_block_count_small: usize,
    /// Live 1 MiB blocks.
    pub live_block_count_medium: usize,
    /// Live 32 MiB blocks.
    pub live_block_count_large: usize,
}

impl MallocStats {
    /// Live block count for one tier.
    #[must_use]
    pub const fn live_blocks(&self, tier: Tier) -> usize {
        match tier {
            Tier::Small => self.live_block_count_small,
            Tier::Medium => self.live_block_count_medium,
            Tier::Large => self.live_block_count_large,
        }
    }

    /// Live blocks across all tiers.
    #[must_use]
    pub const fn total_live_blocks(&self) -> usize {
        self.live_block_count_small + self.live_block_count_medium + self.live_block_count_large
    }
}
