//! TTL result cache for idempotent operations.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value};
use switchboard_core::canonical::canonical_hash;
use switchboard_core::{EventBus, SwitchboardEvent};
use switchboard_settings::CacheSettings;
use tokio::time::Instant;
use tracing::debug;

use crate::errors::{GovernorError, Result};

/// Argument keys that never contribute to a cache key.
const VOLATILE_KEYS: &[&str] = &[
    "timestamp",
    "sessionId",
    "session_id",
    "executionId",
    "execution_id",
    "requestId",
    "request_id",
];

#[derive(Debug)]
struct CacheEntry {
    value: Value,
    stored_at: Instant,
    hit_count: u64,
    ttl: Duration,
}

impl CacheEntry {
    fn is_expired(&self) -> bool {
        self.stored_at.elapsed() >= self.ttl
    }
}

#[derive(Debug, Default)]
struct Counters {
    hits: u64,
    misses: u64,
    evictions: u64,
}

/// Cache counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    /// Live entries.
    pub size: usize,
    /// Configured capacity.
    pub capacity: usize,
    /// Lookups that returned a value.
    pub hits: u64,
    /// Lookups that found nothing or an expired entry.
    pub misses: u64,
    /// Entries evicted for capacity.
    pub evictions: u64,
    /// `hits / (hits + misses)`, 0 with no lookups.
    pub hit_rate: f64,
}

/// Capacity-bounded TTL cache.
///
/// On overflow the oldest tenth of the entries (at least one) is evicted.
pub struct ResultCache {
    enabled: bool,
    capacity: usize,
    ttl: Duration,
    patterns: Vec<Regex>,
    entries: Mutex<HashMap<String, CacheEntry>>,
    counters: Mutex<Counters>,
    events: Arc<EventBus>,
}

impl ResultCache {
    /// Create a cache, compiling the cacheable-name allow-list.
    pub fn new(settings: &CacheSettings, events: Arc<EventBus>) -> Result<Self> {
        let patterns = settings
            .cacheable_patterns
            .iter()
            .map(|p| {
                Regex::new(p).map_err(|source| GovernorError::InvalidPattern {
                    pattern: p.clone(),
                    source,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            enabled: settings.enabled,
            capacity: settings.capacity.max(1),
            ttl: Duration::from_millis(settings.ttl_ms),
            patterns,
            entries: Mutex::new(HashMap::new()),
            counters: Mutex::new(Counters::default()),
            events,
        })
    }

    /// Whether results of `operation` may be cached.
    pub fn should_cache(&self, operation: &str) -> bool {
        self.enabled && self.patterns.iter().any(|re| re.is_match(operation))
    }

    /// Deterministic key over the operation name and its sanitized arguments.
    pub fn generate_key(&self, operation: &str, arguments: &Map<String, Value>) -> String {
        let sanitized = sanitize(&Value::Object(arguments.clone()));
        canonical_hash(&serde_json::json!({
            "operation": operation,
            "arguments": sanitized,
        }))
    }

    /// Look up `key`. Expired entries are dropped and count as a miss.
    pub fn get(&self, key: &str) -> Option<Value> {
        let hit = {
            let mut entries = self.entries.lock();
            if entries.get(key).is_some_and(CacheEntry::is_expired) {
                let _ = entries.remove(key);
            }
            entries.get_mut(key).map(|entry| {
                entry.hit_count += 1;
                (entry.value.clone(), entry.hit_count)
            })
        };

        let mut counters = self.counters.lock();
        if let Some((value, hit_count)) = hit {
            counters.hits += 1;
            drop(counters);
            debug!(key, hit_count, "cache hit");
            let _ = self.events.emit(SwitchboardEvent::CacheHit {
                key: key.to_string(),
                hit_count,
            });
            Some(value)
        } else {
            counters.misses += 1;
            None
        }
    }

    /// Store `value` under `key`, evicting the oldest entries on overflow.
    pub fn store(&self, key: &str, value: Value) {
        let eviction = {
            let mut entries = self.entries.lock();
            let evicted = if !entries.contains_key(key) && entries.len() >= self.capacity {
                evict_oldest(&mut entries, (self.capacity / 10).max(1))
            } else {
                0
            };
            let _ = entries.insert(
                key.to_string(),
                CacheEntry {
                    value,
                    stored_at: Instant::now(),
                    hit_count: 0,
                    ttl: self.ttl,
                },
            );
            (evicted > 0).then_some((evicted, entries.len()))
        };

        if let Some((evicted, remaining)) = eviction {
            self.counters.lock().evictions += evicted as u64;
            debug!(evicted, remaining, "cache eviction");
            let _ = self.events.emit(SwitchboardEvent::CacheEviction { evicted, remaining });
        }
        #[allow(clippy::cast_possible_truncation)]
        let ttl_ms = self.ttl.as_millis() as u64;
        let _ = self.events.emit(SwitchboardEvent::CacheStore {
            key: key.to_string(),
            ttl_ms,
        });
    }

    /// Drop expired entries. Returns how many were dropped.
    pub fn cleanup_expired(&self) -> usize {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, e| !e.is_expired());
        before - entries.len()
    }

    /// Snapshot of the counters.
    #[allow(clippy::cast_precision_loss)]
    pub fn stats(&self) -> CacheStats {
        let size = self.entries.lock().len();
        let counters = self.counters.lock();
        let lookups = counters.hits + counters.misses;
        CacheStats {
            size,
            capacity: self.capacity,
            hits: counters.hits,
            misses: counters.misses,
            evictions: counters.evictions,
            hit_rate: if lookups == 0 {
                0.0
            } else {
                counters.hits as f64 / lookups as f64
            },
        }
    }

    /// Number of stored entries, including expired ones not yet cleaned.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every entry.
    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

/// Remove the `count` entries with the oldest `stored_at`. Returns how many were removed.
fn evict_oldest(entries: &mut HashMap<String, CacheEntry>, count: usize) -> usize {
    let mut by_age: Vec<(Instant, String)> = entries
        .iter()
        .map(|(k, e)| (e.stored_at, k.clone()))
        .collect();
    by_age.sort();
    by_age
        .into_iter()
        .take(count)
        .filter(|(_, key)| entries.remove(key).is_some())
        .count()
}

fn sanitize(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .filter(|(k, _)| !VOLATILE_KEYS.contains(&k.as_str()))
                .map(|(k, v)| (k.clone(), sanitize(v)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(sanitize).collect()),
        other => other.clone(),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
