//! Immutable context snapshots.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use switchboard_core::{Priority, SessionId};

use crate::state::{HistoryEntry, SessionState};

/// Operations captured in a snapshot's tool sequence.
const SEQUENCE_LEN: usize = 10;

/// Periodic capture of session-derived metadata.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextSnapshot {
    /// Owning session.
    pub session_id: SessionId,
    /// Capture time.
    pub timestamp: DateTime<Utc>,
    /// Copy of the merged session context.
    pub context: Map<String, Value>,
    /// Most recent operation names, oldest first.
    pub tool_sequence: Vec<String>,
    /// Most common domain across the history.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dominant_domain: Option<String>,
    /// Priority of the latest operation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_priority: Option<Priority>,
    /// Complexity of the latest operation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_complexity: Option<f64>,
    /// History length at capture.
    pub history_len: usize,
}

impl ContextSnapshot {
    /// Capture `state` as it is now.
    #[must_use]
    pub fn capture(state: &SessionState) -> Self {
        let history: Vec<&HistoryEntry> = state.history().collect();
        let start = history.len().saturating_sub(SEQUENCE_LEN);
        let last = history.last();
        Self {
            session_id: state.id.clone(),
            timestamp: Utc::now(),
            context: state.context.clone(),
            tool_sequence: history[start..].iter().map(|e| e.operation.clone()).collect(),
            dominant_domain: dominant_domain(history.iter().copied()),
            last_priority: last.map(|e| e.priority),
            last_complexity: last.and_then(|e| e.complexity),
            history_len: history.len(),
        }
    }
}

/// Majority vote over entry domains. Ties go to the domain seen most recently.
pub fn dominant_domain<'a>(entries: impl Iterator<Item = &'a HistoryEntry>) -> Option<String> {
    let mut votes: HashMap<&str, (usize, usize)> = HashMap::new();
    for (idx, entry) in entries.enumerate() {
        if let Some(domain) = entry.domain.as_deref() {
            let vote = votes.entry(domain).or_insert((0, idx));
            vote.0 += 1;
            vote.1 = idx;
        }
    }
    votes
        .into_iter()
        .max_by_key(|(_, (count, last_seen))| (*count, *last_seen))
        .map(|(domain, _)| domain.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use switchboard_core::OperationId;

    fn entry(name: &str, domain: Option<&str>) -> HistoryEntry {
        HistoryEntry::new(OperationId::new(), name, 10, true).with_domain(domain.map(String::from))
    }

    #[test]
    fn majority_domain_wins() {
        let entries = [
            entry("Edit", Some("code")),
            entry("Read", Some("filesystem")),
            entry("Edit", Some("code")),
            entry("Bash", None),
        ];
        assert_eq!(dominant_domain(entries.iter()), Some("code".into()));
    }

    #[test]
    fn tie_goes_to_most_recent() {
        let entries = [entry("Edit", Some("code")), entry("Read", Some("filesystem"))];
        assert_eq!(dominant_domain(entries.iter()), Some("filesystem".into()));
    }

    #[test]
    fn no_domains_means_none() {
        let entries = [entry("Bash", None)];
        assert_eq!(dominant_domain(entries.iter()), None);
    }

    #[tokio::test]
    async fn capture_keeps_last_ten_tools() {
        let mut state = SessionState::new(SessionId::from("s"));
        for i in 0..12 {
            state.push_history(
                entry(&format!("T{i}"), Some("code")).with_routing(Priority::High, Some(0.4)),
                100,
                50,
            );
        }
        let _ = state.context.insert("branch".into(), serde_json::json!("main"));
        let snap = ContextSnapshot::capture(&state);
        assert_eq!(snap.tool_sequence.len(), 10);
        assert_eq!(snap.tool_sequence[0], "T2");
        assert_eq!(snap.dominant_domain.as_deref(), Some("code"));
        assert_eq!(snap.last_priority, Some(Priority::High));
        assert_eq!(snap.last_complexity, Some(0.4));
        assert_eq!(snap.context["branch"], "main");
        assert_eq!(snap.history_len, 12);
    }
}
