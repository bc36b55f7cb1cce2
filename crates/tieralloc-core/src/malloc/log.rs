//! Allocator lifecycle records.

use serde::Serialize;

use super::tier::Tier;

/// Allocator lifecycle log level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AllocatorLogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

/// Structured allocator lifecycle record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AllocatorLogRecord {
    /// Monotonic decision/event id.
    pub decision_id: u64,
    /// Correlation id for this lifecycle record.
    pub trace_id: String,
    /// Severity level.
    pub level: AllocatorLogLevel,
    /// API symbol (`malloc`, `free`, `calloc`, `realloc`).
    pub symbol: &'static str,
    /// Event kind (`alloc`, `split`, `block_created`, ...).
    pub event: &'static str,
    /// Payload address involved in the event.
    pub ptr: Option<usize>,
    /// Size value involved in the event.
    pub size: Option<usize>,
    /// Tier of the block involved in the event.
    pub tier: Option<Tier>,
    /// Machine-readable outcome label.
    pub outcome: &'static str,
    /// Free-form details for debugging.
    pub details: String,
    /// Snapshot: live region count after the event.
    pub live_regions: usize,
    /// Snapshot: cumulative requested bytes after the event.
    pub requested_bytes: u64,
}

/// Builds the correlation id carried by every record.
#[must_use]
pub fn trace_id(symbol: &str, decision_id: u64) -> String {
    format!("core::tieralloc::{symbol}::{decision_id:016x}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trace_id_is_zero_padded_hex() {
        assert_eq!(trace_id("malloc", 1), "core::tieralloc::malloc::0000000000000001");
        assert_eq!(trace_id("free", 0xabc), "core::tieralloc::free::0000000000000abc");
    }

    #[test]
    fn levels_are_ordered_by_severity() {
        assert!(AllocatorLogLevel::Trace < AllocatorLogLevel::Debug);
        assert!(AllocatorLogLevel::Warn < AllocatorLogLevel::Error);
    }

    #[test]
    fn record_serializes_with_lowercase_enums() {
        let record = AllocatorLogRecord {
            decision_id: 7,
            trace_id: trace_id("malloc", 7),
            level: AllocatorLogLevel::Debug,
            symbol: "malloc",
            event: "block_created",
            ptr: None,
            size: Some(16_352),
            tier: Some(Tier::Small),
            outcome: "mapped",
            details: String::new(),
            live_regions: 1,
            requested_bytes: 256,
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["level"], "debug");
        assert_eq!(json["tier"], "small");
        assert_eq!(json["ptr"], serde_json::Value::Null);
        assert_eq!(json["trace_id"], "core::tieralloc::malloc::0000000000000007");
    }
}
