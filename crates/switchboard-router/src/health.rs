//! Background service health probing.
//!
//! Routing never waits on a probe; it reads whatever status the last probe
//! pass recorded in the [`ServiceRegistry`].

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use switchboard_core::{EventBus, ServiceStatus, SwitchboardEvent};
use tracing::{debug, info};

use crate::decision::DecisionCache;
use crate::registry::ServiceRegistry;
use crate::transport::ServiceTransport;

/// Probes every registered service and records status changes.
pub struct HealthMonitor {
    registry: Arc<ServiceRegistry>,
    transport: Arc<dyn ServiceTransport>,
    decisions: Arc<DecisionCache>,
    events: Arc<EventBus>,
    probe_timeout: Duration,
}

impl HealthMonitor {
    /// Create a monitor.
    pub fn new(
        registry: Arc<ServiceRegistry>,
        transport: Arc<dyn ServiceTransport>,
        decisions: Arc<DecisionCache>,
        events: Arc<EventBus>,
        probe_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            transport,
            decisions,
            events,
            probe_timeout,
        }
    }

    /// Probe all services concurrently. A probe that exceeds the timeout
    /// counts as `offline`. Returns the number of services whose status changed.
    pub async fn probe_all(&self) -> usize {
        let ids = self.registry.ids();
        let probes = ids.iter().map(|id| async move {
            let status = tokio::time::timeout(self.probe_timeout, self.transport.probe(id))
                .await
                .unwrap_or(ServiceStatus::Offline);
            (id, status)
        });
        let results = join_all(probes).await;

        let mut changed = 0;
        for (id, status) in results {
            if self.apply(id, status) {
                changed += 1;
            }
        }
        debug!(probed = ids.len(), changed, "health probe pass complete");
        changed
    }

    /// Record one probe result. Returns whether the status changed.
    pub fn apply(&self, service_id: &str, status: ServiceStatus) -> bool {
        let Ok(previous) = self.registry.set_status(service_id, status) else {
            return false;
        };
        if previous == status {
            return false;
        }

        info!(service = service_id, %previous, current = %status, "service availability changed");
        if status == ServiceStatus::Online {
            // A recovered service may now match operations cached elsewhere.
            self.decisions.clear();
        } else {
            let dropped = self.decisions.invalidate_service(service_id);
            debug!(service = service_id, dropped, "invalidated cached decisions");
        }
        let _ = self.events.emit(SwitchboardEvent::ServerAvailabilityChanged {
            service_id: service_id.to_string(),
            previous,
            current: status,
        });
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decision::{ExecutionStrategy, RoutingDecision};
    use crate::transport::MockServiceTransport;
    use switchboard_settings::default_services;

    fn monitor(transport: MockServiceTransport) -> (HealthMonitor, Arc<ServiceRegistry>, Arc<DecisionCache>, Arc<EventBus>) {
        let registry = Arc::new(ServiceRegistry::from_settings(&default_services()).unwrap());
        let decisions = Arc::new(DecisionCache::new(10));
        let events = Arc::new(EventBus::new());
        let monitor = HealthMonitor::new(
            Arc::clone(&registry),
            Arc::new(transport),
            Arc::clone(&decisions),
            Arc::clone(&events),
            Duration::from_millis(100),
        );
        (monitor, registry, decisions, events)
    }

    #[tokio::test]
    async fn status_change_emits_event_and_invalidates() {
        let mut transport = MockServiceTransport::new();
        let _ = transport.expect_probe().returning(|id| {
            if id == "ui" {
                ServiceStatus::Offline
            } else {
                ServiceStatus::Online
            }
        });
        let (monitor, registry, decisions, events) = monitor(transport);
        decisions.insert(RoutingDecision {
            target_services: vec!["ui".into()],
            strategy: ExecutionStrategy::Sequential,
            timeout_ms: 1000,
            fallback_services: vec![],
            domain_hints: vec![],
            complexity: 0.1,
            cache_key: "ui-key".into(),
            is_fallback: false,
            circuit_open: false,
        });
        let mut rx = events.subscribe();

        assert_eq!(monitor.probe_all().await, 1);
        assert_eq!(registry.status("ui"), Some(ServiceStatus::Offline));
        assert!(decisions.is_empty());

        let event = rx.try_recv().unwrap();
        assert_eq!(
            event,
            SwitchboardEvent::ServerAvailabilityChanged {
                service_id: "ui".into(),
                previous: ServiceStatus::Online,
                current: ServiceStatus::Offline,
            }
        );
    }

    #[tokio::test]
    async fn unchanged_status_is_silent() {
        let mut transport = MockServiceTransport::new();
        let _ = transport.expect_probe().returning(|_| ServiceStatus::Online);
        let (monitor, _, _, events) = monitor(transport);
        assert_eq!(monitor.probe_all().await, 0);
        assert_eq!(events.emit_count(), 0);
    }

    #[test]
    fn unknown_service_is_ignored() {
        let (monitor, _, _, _) = monitor(MockServiceTransport::new());
        assert!(!monitor.apply("ghost", ServiceStatus::Offline));
    }

    struct HangingTransport;

    #[async_trait::async_trait]
    impl ServiceTransport for HangingTransport {
        async fn issue(
            &self,
            _service_id: &str,
            _request: crate::transport::ServiceRequest,
        ) -> crate::transport::ServiceResponse {
            crate::transport::ServiceResponse::failed("unused")
        }

        async fn probe(&self, service_id: &str) -> ServiceStatus {
            if service_id == "reasoning" {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
            ServiceStatus::Online
        }
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_probe_counts_as_offline() {
        let registry = Arc::new(ServiceRegistry::from_settings(&default_services()).unwrap());
        let monitor = HealthMonitor::new(
            Arc::clone(&registry),
            Arc::new(HangingTransport),
            Arc::new(DecisionCache::new(10)),
            Arc::new(EventBus::new()),
            Duration::from_millis(100),
        );

        let started = tokio::time::Instant::now();
        assert_eq!(monitor.probe_all().await, 1);
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(registry.status("reasoning"), Some(ServiceStatus::Offline));
        assert_eq!(registry.status("general"), Some(ServiceStatus::Online));
    }
}
