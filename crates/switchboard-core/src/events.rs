//! Observable events and the in-process publish/subscribe bus.
//!
//! Components never call each other to report side effects. Instead each one
//! receives an [`EventBus`] at construction and publishes a
//! [`SwitchboardEvent`]; logging and metrics sinks subscribe to the bus.
//!
//! The bus is a `tokio::sync::broadcast` channel: `emit` never awaits and a
//! slow receiver lags (drops events) rather than blocking the publisher.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::ids::{OperationId, SessionId};
use crate::service::ServiceStatus;

/// Default broadcast channel capacity.
const DEFAULT_CAPACITY: usize = 1024;

/// Which measurement crossed a threshold.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertMetric {
    /// Wall-clock execution time in milliseconds.
    ExecutionTime,
    /// Tokens consumed by the operation.
    TokenUsage,
}

/// Severity tier of a threshold alert.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    /// Above the warning threshold.
    Warning,
    /// Above the critical threshold.
    Critical,
}

/// Events published by the core components.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SwitchboardEvent {
    /// An operation finished and its timing was recorded.
    #[serde(rename_all = "camelCase")]
    OperationCompleted {
        /// Operation id.
        operation_id: OperationId,
        /// Operation name.
        operation: String,
        /// Measured duration in milliseconds.
        duration_ms: u64,
        /// Whether the operation succeeded.
        success: bool,
        /// Whether the result was served from cache.
        cache_hit: bool,
    },
    /// A warning or critical threshold was crossed.
    #[serde(rename_all = "camelCase")]
    PerformanceAlert {
        /// Operation name.
        operation: String,
        /// Measured quantity.
        metric: AlertMetric,
        /// Severity tier.
        level: AlertLevel,
        /// Observed value.
        value: u64,
        /// Threshold that was crossed.
        threshold: u64,
        /// Generated remediation hint.
        recommendation: String,
    },
    /// A cached result was served.
    #[serde(rename_all = "camelCase")]
    CacheHit {
        /// Cache key.
        key: String,
        /// Hits recorded for this entry, including this one.
        hit_count: u64,
    },
    /// A result was stored in the cache.
    #[serde(rename_all = "camelCase")]
    CacheStore {
        /// Cache key.
        key: String,
        /// Entry time-to-live in milliseconds.
        ttl_ms: u64,
    },
    /// Entries were evicted to make room.
    #[serde(rename_all = "camelCase")]
    CacheEviction {
        /// Number of entries evicted.
        evicted: usize,
        /// Entries remaining after eviction.
        remaining: usize,
    },
    /// A capability service changed availability.
    #[serde(rename_all = "camelCase")]
    ServerAvailabilityChanged {
        /// Service id.
        service_id: String,
        /// Status before the probe.
        previous: ServiceStatus,
        /// Status after the probe.
        current: ServiceStatus,
    },
    /// The expiry sweep removed inactive sessions.
    #[serde(rename_all = "camelCase")]
    SessionsCleaned {
        /// Sessions removed.
        removed: usize,
        /// Sessions still live.
        remaining: usize,
    },
    /// A context snapshot was captured.
    #[serde(rename_all = "camelCase")]
    SnapshotCreated {
        /// Owning session.
        session_id: SessionId,
        /// History length at capture time.
        history_len: usize,
        /// Majority-vote domain over the history, if any.
        #[serde(skip_serializing_if = "Option::is_none")]
        dominant_domain: Option<String>,
    },
}

impl SwitchboardEvent {
    /// Wire name of the event (`"operation_completed"`, ...).
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::OperationCompleted { .. } => "operation_completed",
            Self::PerformanceAlert { .. } => "performance_alert",
            Self::CacheHit { .. } => "cache_hit",
            Self::CacheStore { .. } => "cache_store",
            Self::CacheEviction { .. } => "cache_eviction",
            Self::ServerAvailabilityChanged { .. } => "server_availability_changed",
            Self::SessionsCleaned { .. } => "sessions_cleaned",
            Self::SnapshotCreated { .. } => "snapshot_created",
        }
    }
}

/// Broadcast-based event bus.
pub struct EventBus {
    tx: broadcast::Sender<SwitchboardEvent>,
    emit_count: AtomicU64,
}

impl EventBus {
    /// Create a bus with the default channel capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create a bus with a custom channel capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            tx,
            emit_count: AtomicU64::new(0),
        }
    }

    /// Publish an event. Non-blocking.
    ///
    /// Returns the number of receivers that received it (0 with no subscribers).
    pub fn emit(&self, event: SwitchboardEvent) -> usize {
        let _ = self.emit_count.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(event_type = event.event_type(), "event emitted");
        self.tx.send(event).unwrap_or(0)
    }

    /// Subscribe to events emitted after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<SwitchboardEvent> {
        self.tx.subscribe()
    }

    /// Number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Total number of events emitted.
    pub fn emit_count(&self) -> u64 {
        self.emit_count.load(Ordering::Relaxed)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscriber_count())
            .field("emit_count", &self.emit_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sessions_cleaned(removed: usize) -> SwitchboardEvent {
        SwitchboardEvent::SessionsCleaned {
            removed,
            remaining: 0,
        }
    }

    #[test]
    fn emit_with_no_subscribers() {
        let bus = EventBus::new();
        assert_eq!(bus.emit(sessions_cleaned(1)), 0);
        assert_eq!(bus.emit_count(), 1);
    }

    #[tokio::test]
    async fn emit_and_receive() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        assert_eq!(bus.emit(sessions_cleaned(3)), 1);
        let received = rx.recv().await.unwrap();
        assert_eq!(received, sessions_cleaned(3));
    }

    #[tokio::test]
    async fn slow_receiver_lags_instead_of_blocking() {
        let bus = EventBus::with_capacity(2);
        let mut rx = bus.subscribe();
        for i in 0..3 {
            let _ = bus.emit(sessions_cleaned(i));
        }
        assert!(matches!(
            rx.recv().await,
            Err(broadcast::error::RecvError::Lagged(1))
        ));
    }

    #[test]
    fn wire_format_is_tagged_snake_case() {
        let event = SwitchboardEvent::ServerAvailabilityChanged {
            service_id: "quality".into(),
            previous: ServiceStatus::Online,
            current: ServiceStatus::Offline,
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(
            value,
            json!({
                "type": "server_availability_changed",
                "serviceId": "quality",
                "previous": "online",
                "current": "offline"
            })
        );
        assert_eq!(event.event_type(), "server_availability_changed");
    }

    #[test]
    fn alert_levels_are_ordered() {
        assert!(AlertLevel::Critical > AlertLevel::Warning);
    }
}
