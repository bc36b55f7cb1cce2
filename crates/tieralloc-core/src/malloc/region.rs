//! Region free-list engine.
//!
//! Regions inside a block form an address-ordered doubly linked chain that
//! starts at offset 0 and covers the span exactly. Allocation splits a
//! right-sized region off the front of a free one; release merges a freed
//! region with its free neighbours.

use super::error::IntegrityError;
use super::layout::{self, REGION_HEADER_SIZE, RegionHeader};
use super::tier::Tier;
use crate::mmap::MappedSpan;

/// Offset of the first region of every block.
pub const FIRST_REGION: usize = 0;

/// Result of a successful [`split`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SplitOutcome {
    /// Offset of the new free region carved from the tail.
    pub tail: usize,
    /// Whether the tail swallowed a free successor (shrink path only).
    pub absorbed_successor: bool,
}

/// Result of [`coalesce_on_release`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Coalesce {
    /// Offset of the free region that survived the merges.
    pub region: usize,
    /// Number of regions that disappeared (0, 1 or 2).
    pub merged: usize,
    /// Whether the survivor is now the only region of its block.
    pub sole: bool,
}

/// Lays out the single used region spanning a fresh block.
pub fn carve_initial(span: &mut MappedSpan) -> usize {
    let size = span.len() - REGION_HEADER_SIZE;
    RegionHeader::new(size, false).write(span, FIRST_REGION);
    FIRST_REGION
}

/// Shrinks the region at `offset` to `requested` payload bytes when the
/// leftover can host another minimum region, turning the leftover into a
/// free region right after it.
///
/// A free successor is folded into the new tail so that two free regions
/// never end up adjacent. Returns `None` and leaves the region oversized when
/// the leftover is too small.
pub fn split(span: &mut MappedSpan, offset: usize, requested: usize) -> Option<SplitOutcome> {
    let mut header = RegionHeader::read(span, offset);
    let leftover = header.size.checked_sub(requested)?;
    if !layout::can_split(leftover) {
        return None;
    }

    let tail_offset = offset + REGION_HEADER_SIZE + requested;
    let mut tail = RegionHeader::new(leftover - REGION_HEADER_SIZE, true);
    tail.prev = Some(offset);
    tail.next = header.next;

    let mut absorbed_successor = false;
    if let Some(next) = header.next {
        let successor = RegionHeader::read(span, next);
        if successor.free {
            tail.size += REGION_HEADER_SIZE + successor.size;
            tail.next = successor.next;
            layout::scrub_tag(span, next);
            absorbed_successor = true;
        }
    }
    if let Some(after) = tail.next {
        layout::set_prev(span, after, Some(tail_offset));
    }
    tail.write(span, tail_offset);

    header.size = requested;
    header.next = Some(tail_offset);
    header.write(span, offset);

    Some(SplitOutcome {
        tail: tail_offset,
        absorbed_successor,
    })
}

/// Marks the region at `offset` free and merges it with free neighbours:
/// first the successor is absorbed, then a free predecessor absorbs the
/// result. Absorbed headers have their tag scrubbed.
pub fn coalesce_on_release(span: &mut MappedSpan, offset: usize) -> Coalesce {
    let mut header = RegionHeader::read(span, offset);
    header.free = true;
    let mut merged = 0;

    if let Some(next) = header.next {
        let successor = RegionHeader::read(span, next);
        if successor.free {
            header.size += REGION_HEADER_SIZE + successor.size;
            header.next = successor.next;
            if let Some(after) = successor.next {
                layout::set_prev(span, after, Some(offset));
            }
            layout::scrub_tag(span, next);
            merged += 1;
        }
    }
    header.write(span, offset);

    let mut survivor = offset;
    if let Some(prev) = header.prev {
        let mut predecessor = RegionHeader::read(span, prev);
        if predecessor.free {
            predecessor.size += REGION_HEADER_SIZE + header.size;
            predecessor.next = header.next;
            if let Some(after) = header.next {
                layout::set_prev(span, after, Some(prev));
            }
            predecessor.write(span, prev);
            layout::scrub_tag(span, offset);
            survivor = prev;
            merged += 1;
        }
    }

    let result = RegionHeader::read(span, survivor);
    Coalesce {
        region: survivor,
        merged,
        sole: result.prev.is_none() && result.next.is_none(),
    }
}

/// Walks the chain of a block in address order.
pub fn regions(span: &MappedSpan) -> RegionIter<'_> {
    RegionIter {
        span,
        cursor: Some(FIRST_REGION),
        remaining: span.len() / REGION_HEADER_SIZE,
    }
}

/// Iterator over `(offset, header)` pairs of one block.
///
/// Stops early on a link that leaves the span or when more steps were taken
/// than the span could possibly hold, so a damaged chain cannot loop.
pub struct RegionIter<'a> {
    span: &'a MappedSpan,
    cursor: Option<usize>,
    remaining: usize,
}

impl Iterator for RegionIter<'_> {
    type Item = (usize, RegionHeader);

    fn next(&mut self) -> Option<Self::Item> {
        let offset = self.cursor?;
        if self.remaining == 0 || offset + REGION_HEADER_SIZE > self.span.len() {
            self.cursor = None;
            return None;
        }
        self.remaining -= 1;
        let header = RegionHeader::read(self.span, offset);
        self.cursor = header.next;
        Some((offset, header))
    }
}

/// Checks the chain of one block and returns its region count.
pub fn verify_chain(span: &MappedSpan, tier: Tier, slot: usize) -> Result<usize, IntegrityError> {
    let mut expected = FIRST_REGION;
    let mut prev: Option<(usize, bool)> = None;
    let mut count = 0;

    for (offset, header) in regions(span) {
        if !header.is_tagged() {
            return Err(IntegrityError::BadTag { tier, slot, offset });
        }
        if offset != expected {
            return Err(IntegrityError::Discontiguous {
                tier,
                slot,
                offset,
                expected,
            });
        }
        if header.prev != prev.map(|(at, _)| at) {
            return Err(IntegrityError::BrokenBackLink { tier, slot, offset });
        }
        if header.free && prev.is_some_and(|(_, was_free)| was_free) {
            return Err(IntegrityError::AdjacentFree { tier, slot, offset });
        }
        expected = header.end(offset);
        if expected > span.len() {
            break;
        }
        prev = Some((offset, header.free));
        count += 1;
    }

    if expected != span.len() {
        return Err(IntegrityError::SizeMismatch {
            tier,
            slot,
            covered: expected,
            len: span.len(),
        });
    }
    Ok(count)
}
