//! Region header layout.
//!
//! Every region starts with a header that sits immediately before the payload
//! handed to the caller. `W` is the native word size:
//!
//! ```text
//! offset  0        W        2W       3W     3W+4    3W+8
//!         +--------+--------+--------+------+-------+-----------------
//!         | size   | prev   | next   | free | tag   | payload ...
//!         +--------+--------+--------+------+-------+-----------------
//! ```
//!
//! `prev` and `next` are byte offsets of the neighbouring headers inside the
//! same block (`usize::MAX` when absent). The tag is the last field, so it is
//! always the four bytes right before the payload. Headers are read and
//! written field by field through [`MappedSpan`], so no alignment beyond the
//! 4-byte payload granularity is assumed.

use crate::mmap::MappedSpan;

const WORD: usize = size_of::<usize>();

const SIZE_FIELD: usize = 0;
const PREV_FIELD: usize = WORD;
const NEXT_FIELD: usize = 2 * WORD;
const FREE_FIELD: usize = 3 * WORD;
const TAG_FIELD: usize = 3 * WORD + 4;

const NO_LINK: usize = usize::MAX;

/// Bytes occupied by a region header.
pub const REGION_HEADER_SIZE: usize = 3 * WORD + 8;

/// Validation tag written into every live region header.
pub const REGION_TAG: u32 = 517_283_971;

/// Smallest payload ever handed out or left behind by a split.
pub const MIN_REGION_PAYLOAD: usize = 256;

/// Payload sizes are multiples of this.
pub const ALIGNMENT: usize = 4;

const _: () = assert!(TAG_FIELD + 4 == REGION_HEADER_SIZE);
const _: () = assert!(REGION_HEADER_SIZE % ALIGNMENT == 0);

/// Decoded region header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionHeader {
    /// Payload bytes, excluding this header.
    pub size: usize,
    /// Offset of the previous region in the block.
    pub prev: Option<usize>,
    /// Offset of the next region in the block.
    pub next: Option<usize>,
    /// Whether the region is available for allocation.
    pub free: bool,
    /// Validation tag; [`REGION_TAG`] for every live region.
    pub tag: u32,
}

impl RegionHeader {
    /// A freshly tagged, unlinked header.
    #[must_use]
    pub const fn new(size: usize, free: bool) -> Self {
        Self {
            size,
            prev: None,
            next: None,
            free,
            tag: REGION_TAG,
        }
    }

    /// Decodes the header stored at `offset`.
    #[must_use]
    pub fn read(span: &MappedSpan, offset: usize) -> Self {
        Self {
            size: span.read_word(offset + SIZE_FIELD),
            prev: decode_link(span.read_word(offset + PREV_FIELD)),
            next: decode_link(span.read_word(offset + NEXT_FIELD)),
            free: span.read_u32(offset + FREE_FIELD) != 0,
            tag: span.read_u32(offset + TAG_FIELD),
        }
    }

    /// Encodes this header at `offset`.
    pub fn write(&self, span: &mut MappedSpan, offset: usize) {
        span.write_word(offset + SIZE_FIELD, self.size);
        span.write_word(offset + PREV_FIELD, encode_link(self.prev));
        span.write_word(offset + NEXT_FIELD, encode_link(self.next));
        span.write_u32(offset + FREE_FIELD, u32::from(self.free));
        span.write_u32(offset + TAG_FIELD, self.tag);
    }

    /// Whether the header carries the validation tag.
    #[must_use]
    pub const fn is_tagged(&self) -> bool {
        self.tag == REGION_TAG
    }

    /// Offset one past this region's payload, i.e. where its successor starts.
    #[must_use]
    pub const fn end(&self, offset: usize) -> usize {
        offset + REGION_HEADER_SIZE + self.size
    }
}

const fn decode_link(raw: usize) -> Option<usize> {
    if raw == NO_LINK { None } else { Some(raw) }
}

const fn encode_link(link: Option<usize>) -> usize {
    match link {
        Some(offset) => offset,
        None => NO_LINK,
    }
}

/// Reads only the tag of the header at `offset`.
#[must_use]
pub fn read_tag(span: &MappedSpan, offset: usize) -> u32 {
    span.read_u32(offset + TAG_FIELD)
}

/// Clears the tag of a header that no longer names a live region.
pub fn scrub_tag(span: &mut MappedSpan, offset: usize) {
    span.write_u32(offset + TAG_FIELD, 0);
}

/// Updates only the free flag of the header at `offset`.
pub fn set_free(span: &mut MappedSpan, offset: usize, free: bool) {
    span.write_u32(offset + FREE_FIELD, u32::from(free));
}

/// Updates only the `prev` link of the header at `offset`.
pub fn set_prev(span: &mut MappedSpan, offset: usize, prev: Option<usize>) {
    span.write_word(offset + PREV_FIELD, encode_link(prev));
}

/// Offset of the payload belonging to the header at `region`.
#[must_use]
pub const fn payload_offset(region: usize) -> usize {
    region + REGION_HEADER_SIZE
}

/// Clamps a request up to [`MIN_REGION_PAYLOAD`] and rounds it to [`ALIGNMENT`].
#[must_use]
pub const fn normalize_request(size: usize) -> usize {
    let size = if size < MIN_REGION_PAYLOAD {
        MIN_REGION_PAYLOAD
    } else {
        size
    };
    size.next_multiple_of(ALIGNMENT)
}

/// Whether `leftover` payload bytes can host another minimum region.
#[must_use]
pub const fn can_split(leftover: usize) -> bool {
    leftover >= REGION_HEADER_SIZE + MIN_REGION_PAYLOAD
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mmap::request_block;

    #[test]
    fn normalize_clamps_and_aligns() {
        for size in 0..=MIN_REGION_PAYLOAD {
            assert_eq!(normalize_request(size), MIN_REGION_PAYLOAD, "size {size}");
        }
        assert_eq!(normalize_request(257), 260);
        assert_eq!(normalize_request(1000), 1000);
        assert_eq!(normalize_request(1001), 1004);
        assert_eq!(normalize_request(1003), 1004);
        assert_eq!(normalize_request(1004), 1004);
    }

    #[test]
    fn header_round_trips_through_span() {
        let mut span = request_block(4096).unwrap();
        let header = RegionHeader {
            size: 1000,
            prev: Some(0),
            next: None,
            free: true,
            tag: REGION_TAG,
        };
        header.write(&mut span, 260);
        assert_eq!(RegionHeader::read(&span, 260), header);
        assert_eq!(read_tag(&span, 260), REGION_TAG);
    }

    #[test]
    fn tag_is_the_word_before_the_payload() {
        let mut span = request_block(4096).unwrap();
        RegionHeader::new(256, false).write(&mut span, 0);
        let payload = payload_offset(0);
        assert_eq!(span.read_u32(payload - 4), REGION_TAG);
    }

    #[test]
    fn field_updates_leave_other_fields_alone() {
        let mut span = request_block(4096).unwrap();
        let mut header = RegionHeader::new(512, false);
        header.next = Some(900);
        header.write(&mut span, 40);

        set_free(&mut span, 40, true);
        set_prev(&mut span, 40, Some(4));
        let read = RegionHeader::read(&span, 40);
        assert!(read.free);
        assert_eq!(read.prev, Some(4));
        assert_eq!(read.next, Some(900));
        assert_eq!(read.size, 512);

        scrub_tag(&mut span, 40);
        assert!(!RegionHeader::read(&span, 40).is_tagged());
    }

    #[test]
    fn split_threshold() {
        assert!(!can_split(REGION_HEADER_SIZE + MIN_REGION_PAYLOAD - 1));
        assert!(can_split(REGION_HEADER_SIZE + MIN_REGION_PAYLOAD));
    }
}
