//! Session store: create, update, enrich, predict, end, and expire sessions.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use switchboard_core::{BackgroundTasks, EventBus, Operation, SessionId, SwitchboardEvent};
use switchboard_settings::{SessionSettings, deep_merge};
use tracing::{debug, info, instrument};

use crate::enrichment::enrich;
use crate::errors::{Result, SessionError};
use crate::prediction::{Prediction, predict};
use crate::snapshot::{ContextSnapshot, dominant_domain};
use crate::state::{HistoryEntry, SessionAggregate, SessionState};

/// Outcome of appending to a session.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionUpdate {
    /// Session updated.
    pub session_id: SessionId,
    /// History length after the append.
    pub history_len: usize,
    /// Aggregates after the append.
    pub aggregate: SessionAggregate,
    /// Whether this append captured a snapshot.
    pub snapshot_created: bool,
}

/// Final statistics returned when a session ends.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    /// Session ended.
    pub session_id: SessionId,
    /// Wall-clock start.
    pub started_at: DateTime<Utc>,
    /// Session lifetime in milliseconds.
    pub duration_ms: u64,
    /// Operations recorded over the lifetime.
    pub operations: u64,
    /// Final aggregates.
    pub aggregate: SessionAggregate,
    /// Snapshots held at the end.
    pub snapshots: usize,
    /// Majority-vote domain over the retained history.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dominant_domain: Option<String>,
}

/// Owns every live session.
pub struct SessionStore {
    settings: SessionSettings,
    sessions: DashMap<SessionId, SessionState>,
    events: Arc<EventBus>,
    tasks: Mutex<Option<BackgroundTasks>>,
}

impl SessionStore {
    /// Create an empty store.
    pub fn new(settings: SessionSettings, events: Arc<EventBus>) -> Self {
        Self {
            settings,
            sessions: DashMap::new(),
            events,
            tasks: Mutex::new(None),
        }
    }

    /// Start the expiry sweep. Calling twice is a no-op.
    pub fn init(self: &Arc<Self>) {
        let mut tasks = self.tasks.lock();
        if tasks.is_some() {
            return;
        }
        let supervisor = BackgroundTasks::new();
        let store = Arc::clone(self);
        supervisor.spawn_periodic(
            "session-sweep",
            Duration::from_millis(self.settings.sweep_interval_ms),
            move || {
                let store = Arc::clone(&store);
                async move {
                    let _ = store.sweep_expired();
                }
            },
        );
        *tasks = Some(supervisor);
    }

    /// Stop the expiry sweep. Sessions are kept.
    pub async fn cleanup(&self) {
        let tasks = self.tasks.lock().take();
        if let Some(tasks) = tasks {
            tasks.shutdown().await;
        }
    }

    /// Create the session, or refresh its activity if it exists.
    /// Returns `true` when a new session was created.
    #[instrument(skip_all, fields(session_id = %id))]
    pub fn initialize_session(&self, id: &SessionId) -> bool {
        match self.sessions.entry(id.clone()) {
            Entry::Occupied(mut existing) => {
                existing.get_mut().touch();
                false
            }
            Entry::Vacant(slot) => {
                let _ = slot.insert(SessionState::new(id.clone()));
                debug!("session created");
                true
            }
        }
    }

    /// Append `entry` to the session's history, fold it into the aggregates
    /// and merge `state_updates` into the context. Creates the session if absent.
    pub fn update_session_context(
        &self,
        id: &SessionId,
        entry: HistoryEntry,
        state_updates: Option<&Value>,
    ) -> SessionUpdate {
        let interval = u64::try_from(self.settings.snapshot_interval.max(1)).unwrap_or(u64::MAX);
        let (update, snapshot) = {
            let mut state = self
                .sessions
                .entry(id.clone())
                .or_insert_with(|| SessionState::new(id.clone()));
            state.touch();
            state.aggregate.record(entry.duration_ms, entry.success);
            state.push_history(entry, self.settings.history_limit, self.settings.history_compact_to);
            if let Some(updates) = state_updates {
                merge_into(&mut state, updates);
            }

            let snapshot = (state.appends % interval == 0).then(|| {
                let snapshot = ContextSnapshot::capture(&state);
                state.snapshots.push_back(snapshot.clone());
                while state.snapshots.len() > self.settings.snapshot_limit {
                    let _ = state.snapshots.pop_front();
                }
                snapshot
            });
            let update = SessionUpdate {
                session_id: id.clone(),
                history_len: state.history_len(),
                aggregate: state.aggregate,
                snapshot_created: snapshot.is_some(),
            };
            (update, snapshot)
        };

        if let Some(snapshot) = snapshot {
            debug!(
                session_id = %id,
                history_len = snapshot.history_len,
                dominant_domain = ?snapshot.dominant_domain,
                "snapshot created"
            );
            let _ = self.events.emit(SwitchboardEvent::SnapshotCreated {
                session_id: id.clone(),
                history_len: snapshot.history_len,
                dominant_domain: snapshot.dominant_domain,
            });
        }
        update
    }

    /// Deep-merge `updates` into the session context, creating the session if absent.
    pub fn merge_state(&self, id: &SessionId, updates: &Value) {
        let mut state = self
            .sessions
            .entry(id.clone())
            .or_insert_with(|| SessionState::new(id.clone()));
        state.touch();
        merge_into(&mut state, updates);
    }

    /// Fill budget and priority absent from `base` from the session's track record.
    pub fn get_enriched_context(&self, id: &SessionId, base: Operation) -> Operation {
        let aggregate = self.sessions.get(id).map(|s| s.aggregate);
        enrich(base, aggregate.as_ref(), &self.settings)
    }

    /// Predict the session's next operation.
    pub fn predict_next_operation(&self, id: &SessionId) -> Option<Prediction> {
        self.sessions.get(id).and_then(|s| predict(s.history.iter()))
    }

    /// Retire the session and return its final statistics.
    #[instrument(skip_all, fields(session_id = %id))]
    pub fn end_session(&self, id: &SessionId) -> Result<SessionSummary> {
        let (_, state) = self
            .sessions
            .remove(id)
            .ok_or_else(|| SessionError::NotFound(id.clone()))?;
        #[allow(clippy::cast_possible_truncation)]
        let duration_ms = state.age().as_millis() as u64;
        let summary = SessionSummary {
            session_id: state.id.clone(),
            started_at: state.started_at,
            duration_ms,
            operations: state.appends,
            aggregate: state.aggregate,
            snapshots: state.snapshots.len(),
            dominant_domain: dominant_domain(state.history()),
        };
        debug!(operations = summary.operations, duration_ms, "session ended");
        Ok(summary)
    }

    /// Remove sessions idle longer than the configured maximum age.
    /// Their snapshots go with them.
    pub fn sweep_expired(&self) -> usize {
        let max_age = Duration::from_millis(self.settings.max_age_ms);
        let mut removed = 0;
        self.sessions.retain(|_, state| {
            let keep = state.idle_for() <= max_age;
            if !keep {
                removed += 1;
            }
            keep
        });
        if removed > 0 {
            let remaining = self.sessions.len();
            info!(removed, remaining, "expired sessions cleaned");
            let _ = self
                .events
                .emit(SwitchboardEvent::SessionsCleaned { removed, remaining });
        }
        removed
    }

    /// Copy of the session's state.
    pub fn get(&self, id: &SessionId) -> Option<SessionState> {
        self.sessions.get(id).map(|s| s.clone())
    }

    /// The session's snapshots, oldest first.
    pub fn snapshots(&self, id: &SessionId) -> Vec<ContextSnapshot> {
        self.sessions
            .get(id)
            .map(|s| s.snapshots().cloned().collect())
            .unwrap_or_default()
    }

    /// Whether the session exists.
    pub fn contains(&self, id: &SessionId) -> bool {
        self.sessions.contains_key(id)
    }

    /// Live session count.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether no sessions are live.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

fn merge_into(state: &mut SessionState, updates: &Value) {
    if !updates.is_object() {
        debug!(session_id = %state.id, "ignoring non-object state update");
        return;
    }
    let current = Value::Object(std::mem::take(&mut state.context));
    if let Value::Object(merged) = deep_merge(current, updates.clone()) {
        state.context = merged;
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
