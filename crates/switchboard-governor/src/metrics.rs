//! Bounded metric storage.

use std::collections::VecDeque;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::Instant;

/// One completed operation.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricRecord {
    /// Operation name.
    pub operation: String,
    /// Measured duration in milliseconds.
    pub duration_ms: u64,
    /// Wall-clock completion time.
    pub timestamp: DateTime<Utc>,
    /// Whether the operation succeeded.
    pub success: bool,
    /// Whether the result came from the cache.
    pub cache_hit: bool,
    /// Tokens consumed, when reported.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_usage: Option<u64>,
    /// Placeholder for an event whose operation was not in flight. Not a
    /// real execution; analysis ignores it.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub default: bool,
    #[serde(skip)]
    pub(crate) recorded_at: Instant,
}

impl MetricRecord {
    /// A record stamped with the current time.
    #[must_use]
    pub fn now(operation: impl Into<String>, duration_ms: u64, success: bool, cache_hit: bool) -> Self {
        Self {
            operation: operation.into(),
            duration_ms,
            timestamp: Utc::now(),
            success,
            cache_hit,
            token_usage: None,
            default: false,
            recorded_at: Instant::now(),
        }
    }

    /// Attach token usage.
    #[must_use]
    pub fn with_token_usage(mut self, tokens: Option<u64>) -> Self {
        self.token_usage = tokens;
        self
    }

    /// Placeholder record for `operation` when its id was not in flight.
    #[must_use]
    pub fn placeholder(operation: impl Into<String>) -> Self {
        Self {
            default: true,
            ..Self::now(operation, 0, false, false)
        }
    }

    /// Time since the record was taken.
    pub fn age(&self) -> Duration {
        self.recorded_at.elapsed()
    }
}

/// Ring buffer of metric records.
///
/// When a push takes the buffer past capacity it is compacted to the most
/// recent `capacity / 2` records.
#[derive(Debug)]
pub struct MetricsBuffer {
    capacity: usize,
    records: VecDeque<MetricRecord>,
}

impl MetricsBuffer {
    /// Create a buffer holding at most `capacity` records.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(2);
        Self {
            capacity,
            records: VecDeque::with_capacity(capacity),
        }
    }

    /// Append a record, compacting on overflow.
    pub fn push(&mut self, record: MetricRecord) {
        self.records.push_back(record);
        if self.records.len() > self.capacity {
            let keep = self.capacity / 2;
            let excess = self.records.len() - keep;
            let _ = self.records.drain(..excess);
        }
    }

    /// Drop records older than `retention`. Returns how many were dropped.
    pub fn prune_older_than(&mut self, retention: Duration) -> usize {
        let before = self.records.len();
        while self
            .records
            .front()
            .is_some_and(|r| r.age() > retention)
        {
            let _ = self.records.pop_front();
        }
        before - self.records.len()
    }

    /// Records no older than `window`, oldest first.
    pub fn window(&self, window: Duration) -> Vec<MetricRecord> {
        self.records
            .iter()
            .filter(|r| r.age() <= window)
            .cloned()
            .collect()
    }

    /// Whether any stored record belongs to `operation`.
    pub fn contains_operation(&self, operation: &str) -> bool {
        self.records.iter().any(|r| r.operation == operation)
    }

    /// Iterate over all records, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &MetricRecord> {
        self.records.iter()
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Configured capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
