//! Capability service registry.
//!
//! Holds one [`ServiceDescriptor`] per backend. Descriptors are mutated only
//! by health probes ([`ServiceRegistry::set_status`]) and by dispatch
//! accounting ([`ServiceRegistry::dispatch`], which hands out a
//! [`DispatchGuard`]). Readers always get clones, so no lock is held across
//! an `await`. A guard dropped before it is finished (the dispatching future
//! was cancelled) still releases its load and counts as a failed call.

use std::collections::BTreeMap;

use parking_lot::RwLock;
use regex::Regex;
use serde::Serialize;
use switchboard_core::ServiceStatus;
use switchboard_settings::{ComplexityRange, ServiceSettings};
use tokio::time::Instant;
use tracing::debug;

use crate::errors::{Result, RouterError};

/// Weight kept from the previous response-time average.
const RESPONSE_TIME_DECAY: f64 = 0.8;
/// Weight kept from the previous success-rate average.
const SUCCESS_RATE_DECAY: f64 = 0.9;

/// What a service can handle.
#[derive(Clone, Debug, Default)]
pub struct CapabilitySet {
    /// Compiled operation-name patterns.
    pub name_patterns: Vec<Regex>,
    /// Domains the service specializes in.
    pub domain_hints: Vec<String>,
    /// Complexity interval the service is suited for.
    pub complexity_range: Option<ComplexityRange>,
}

impl CapabilitySet {
    /// Compile a capability set from settings.
    pub fn from_settings(settings: &ServiceSettings) -> Result<Self> {
        let name_patterns = settings
            .name_patterns
            .iter()
            .map(|p| {
                Regex::new(p).map_err(|source| RouterError::InvalidPattern {
                    service: settings.id.clone(),
                    source,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            name_patterns,
            domain_hints: settings.domain_hints.clone(),
            complexity_range: settings.complexity_range,
        })
    }

    /// Whether an operation matches by name pattern, domain hint, or complexity range.
    pub fn matches(&self, name: &str, domain_hints: &[String], complexity: f64) -> bool {
        self.name_patterns.iter().any(|re| re.is_match(name))
            || domain_hints.iter().any(|h| self.domain_hints.contains(h))
            || self
                .complexity_range
                .is_some_and(|range| range.contains(complexity))
    }
}

/// Runtime view of one capability service.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceDescriptor {
    /// Service id.
    pub id: String,
    /// Last known health.
    pub status: ServiceStatus,
    /// Exponential moving average of response time in milliseconds.
    pub response_time_ms: f64,
    /// Exponential moving average of success (0.0..=1.0).
    pub success_rate: f64,
    /// Requests currently in flight.
    pub current_load: u32,
    /// Failed requests since registration.
    pub error_count: u64,
    /// Declared capabilities.
    #[serde(skip)]
    pub capabilities: CapabilitySet,
}

impl ServiceDescriptor {
    /// A fresh, online descriptor with no history.
    #[must_use]
    pub fn new(id: impl Into<String>, capabilities: CapabilitySet) -> Self {
        Self {
            id: id.into(),
            status: ServiceStatus::Online,
            response_time_ms: 0.0,
            success_rate: 1.0,
            current_load: 0,
            error_count: 0,
            capabilities,
        }
    }

    /// Fold one observed request into the moving averages.
    pub fn record(&mut self, elapsed_ms: f64, success: bool) {
        self.response_time_ms =
            RESPONSE_TIME_DECAY * self.response_time_ms + (1.0 - RESPONSE_TIME_DECAY) * elapsed_ms;
        let outcome = if success { 1.0 } else { 0.0 };
        self.success_rate =
            SUCCESS_RATE_DECAY * self.success_rate + (1.0 - SUCCESS_RATE_DECAY) * outcome;
        if !success {
            self.error_count += 1;
        }
    }
}

/// Registry of capability services, keyed by id.
#[derive(Debug, Default)]
pub struct ServiceRegistry {
    services: RwLock<BTreeMap<String, ServiceDescriptor>>,
}

impl ServiceRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from the configured service catalogue.
    pub fn from_settings(services: &[ServiceSettings]) -> Result<Self> {
        let registry = Self::new();
        for service in services {
            let capabilities = CapabilitySet::from_settings(service)?;
            registry.register(ServiceDescriptor::new(service.id.clone(), capabilities));
        }
        Ok(registry)
    }

    /// Register (or replace) a service.
    pub fn register(&self, descriptor: ServiceDescriptor) {
        debug!(service = %descriptor.id, "registering capability service");
        let _ = self
            .services
            .write()
            .insert(descriptor.id.clone(), descriptor);
    }

    /// Whether `id` is registered.
    pub fn contains(&self, id: &str) -> bool {
        self.services.read().contains_key(id)
    }

    /// Clone of one descriptor.
    pub fn get(&self, id: &str) -> Option<ServiceDescriptor> {
        self.services.read().get(id).cloned()
    }

    /// Last known status of `id`.
    pub fn status(&self, id: &str) -> Option<ServiceStatus> {
        self.services.read().get(id).map(|s| s.status)
    }

    /// Update the status of `id`, returning the previous status.
    pub fn set_status(&self, id: &str, status: ServiceStatus) -> Result<ServiceStatus> {
        let mut services = self.services.write();
        let service = services
            .get_mut(id)
            .ok_or_else(|| RouterError::UnknownService(id.to_string()))?;
        Ok(std::mem::replace(&mut service.status, status))
    }

    /// Clones of every descriptor, ordered by id.
    pub fn snapshot(&self) -> Vec<ServiceDescriptor> {
        self.services.read().values().cloned().collect()
    }

    /// Registered ids, ordered.
    pub fn ids(&self) -> Vec<String> {
        self.services.read().keys().cloned().collect()
    }

    /// `(id, status)` for every service, ordered by id.
    pub fn statuses(&self) -> Vec<(String, ServiceStatus)> {
        self.services
            .read()
            .values()
            .map(|s| (s.id.clone(), s.status))
            .collect()
    }

    /// Mark a request to `id` as in flight until the returned guard is
    /// finished or dropped.
    pub fn dispatch(&self, id: &str) -> DispatchGuard<'_> {
        self.begin_dispatch(id);
        DispatchGuard {
            registry: self,
            service_id: id.to_string(),
            started: Instant::now(),
            finished: false,
        }
    }

    /// Mark a request to `id` as in flight.
    pub fn begin_dispatch(&self, id: &str) {
        if let Some(service) = self.services.write().get_mut(id) {
            service.current_load += 1;
        }
    }

    /// Mark a request to `id` as finished and update its averages.
    pub fn finish_dispatch(&self, id: &str, elapsed_ms: f64, success: bool) {
        if let Some(service) = self.services.write().get_mut(id) {
            service.current_load = service.current_load.saturating_sub(1);
            service.record(elapsed_ms, success);
        }
    }

    /// Number of registered services.
    pub fn len(&self) -> usize {
        self.services.read().len()
    }

    /// Whether no services are registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Load held on one service for one in-flight request.
#[must_use = "dropping the guard immediately records a failed dispatch"]
pub struct DispatchGuard<'a> {
    registry: &'a ServiceRegistry,
    service_id: String,
    started: Instant,
    finished: bool,
}

impl DispatchGuard<'_> {
    /// Release the load and record the call's outcome. Returns the elapsed
    /// time in milliseconds.
    pub fn finish(mut self, success: bool) -> f64 {
        self.finished = true;
        let elapsed_ms = self.elapsed_ms();
        self.registry.finish_dispatch(&self.service_id, elapsed_ms, success);
        elapsed_ms
    }

    fn elapsed_ms(&self) -> f64 {
        self.started.elapsed().as_secs_f64() * 1000.0
    }
}

impl Drop for DispatchGuard<'_> {
    fn drop(&mut self) {
        if !self.finished {
            debug!(service = %self.service_id, "dispatch cancelled before completion");
            self.registry
                .finish_dispatch(&self.service_id, self.elapsed_ms(), false);
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
