//! Time and identity sources for new records.
//!
//! Both are traits so that extraction and reconciliation can be driven with a
//! fixed clock and predictable identities in tests.
//!
//! Identities are UUIDv5 values derived from the file path, line number,
//! discovery time and (for inferred records) the index within the inference
//! batch. A per-generator sequence number is mixed in as well, so two records
//! discovered in the same millisecond for the same file and line never share
//! an identity.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use chrono::{DateTime, TimeZone, Utc};
use uuid::Uuid;

/// Namespace for record identities.
const RECORD_NAMESPACE: Uuid = Uuid::from_bytes([
    0x6e, 0x6f, 0x74, 0x65, // "note"
    0x74, 0x6f, 0x64, 0x6f, // "todo"
    0x2d, 0x72, 0x65, 0x63, // "-rec"
    0x6f, 0x72, 0x64, 0x73, // "ords"
]);

/// Source of record timestamps.
pub trait Clock: Send + Sync {
    /// Current time at millisecond resolution.
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock truncated to milliseconds that never goes backwards.
#[derive(Debug, Default)]
pub struct SystemClock {
    last_millis: AtomicI64,
}

impl SystemClock {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        let wall = Utc::now().timestamp_millis();
        let prev = self.last_millis.fetch_max(wall, Ordering::SeqCst);
        let millis = prev.max(wall);
        Utc.timestamp_millis_opt(millis)
            .single()
            .unwrap_or_else(Utc::now)
    }
}

/// Input to identity generation.
#[derive(Debug, Clone, Copy)]
pub struct IdentitySeed<'a> {
    pub file_path: &'a str,
    pub line_number: u32,
    pub discovered_at: DateTime<Utc>,
    /// Position within an inference batch; `None` for marker records.
    pub batch_index: Option<usize>,
}

/// Source of record identities.
pub trait IdGenerator: Send + Sync {
    fn generate(&self, seed: IdentitySeed<'_>) -> String;
}

/// Default identity generator producing namespaced UUIDv5 strings.
#[derive(Debug, Default)]
pub struct NamespacedIds {
    sequence: AtomicU64,
}

impl NamespacedIds {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl IdGenerator for NamespacedIds {
    fn generate(&self, seed: IdentitySeed<'_>) -> String {
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        let batch = seed
            .batch_index
            .map_or_else(|| "-".to_string(), |i| i.to_string());
        let name = format!(
            "{}\u{0}{}\u{0}{}\u{0}{}\u{0}{}",
            seed.file_path,
            seed.line_number,
            seed.discovered_at.timestamp_millis(),
            batch,
            sequence
        );
        Uuid::new_v5(&RECORD_NAMESPACE, name.as_bytes()).to_string()
    }
}
