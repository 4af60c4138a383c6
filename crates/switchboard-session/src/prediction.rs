//! Next-operation prediction from session history.
//!
//! Looks at the last ten operations. The candidate comes from a static
//! common-successor map keyed by the last operation, then from observed
//! adjacent transitions, then from raw frequency. Confidence is
//! `strength / 10 - variety_penalty`, clamped to `[0.1, 0.9]`.

use std::collections::HashMap;

use serde::Serialize;

use crate::state::HistoryEntry;

/// History entries required before predicting.
pub const MIN_HISTORY: usize = 3;
/// Trailing entries considered.
const WINDOW: usize = 10;
/// Strength contributed by a static successor match.
const STATIC_WEIGHT: f64 = 3.0;
/// Strength contributed per observed transition.
const TRANSITION_WEIGHT: f64 = 2.0;
/// Penalty per distinct tool beyond the first.
const VARIETY_STEP: f64 = 0.05;
/// Largest variety penalty.
const VARIETY_CAP: f64 = 0.3;

/// Where a prediction came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PredictionBasis {
    /// Static common-successor map.
    CommonSuccessor,
    /// Observed adjacent pairs in this session.
    Transition,
    /// Most frequent recent operation.
    Frequency,
}

/// Predicted next operation.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Prediction {
    /// Predicted operation name.
    pub operation: String,
    /// Confidence in `[0.1, 0.9]`.
    pub confidence: f64,
    /// How the candidate was chosen.
    pub basis: PredictionBasis,
}

/// Typical follow-up for common tools.
fn common_successor(operation: &str) -> Option<&'static str> {
    match operation {
        "Read" => Some("Edit"),
        "Glob" | "Grep" | "LS" | "Edit" | "MultiEdit" => Some("Read"),
        "Write" => Some("Bash"),
        "Bash" => Some("Read"),
        "TodoWrite" => Some("Task"),
        _ => None,
    }
}

/// Predict the operation most likely to follow `history`.
#[allow(clippy::cast_precision_loss)]
pub fn predict<'a>(history: impl DoubleEndedIterator<Item = &'a HistoryEntry> + ExactSizeIterator) -> Option<Prediction> {
    if history.len() < MIN_HISTORY {
        return None;
    }
    let mut recent: Vec<&str> = history.rev().take(WINDOW).map(|e| e.operation.as_str()).collect();
    recent.reverse();
    let last = *recent.last()?;

    let mut frequency: HashMap<&str, usize> = HashMap::new();
    for name in &recent {
        *frequency.entry(*name).or_default() += 1;
    }
    let mut transitions: HashMap<(&str, &str), usize> = HashMap::new();
    for pair in recent.windows(2) {
        *transitions.entry((pair[0], pair[1])).or_default() += 1;
    }

    let (candidate, basis) = if let Some(next) = common_successor(last) {
        (next, PredictionBasis::CommonSuccessor)
    } else if let Some(next) = most_common(
        transitions
            .iter()
            .filter(|((from, _), _)| *from == last)
            .map(|((_, to), count)| (*to, *count)),
    ) {
        (next, PredictionBasis::Transition)
    } else {
        let next = most_common(frequency.iter().map(|(name, count)| (*name, *count)))?;
        (next, PredictionBasis::Frequency)
    };

    let static_hit = if basis == PredictionBasis::CommonSuccessor {
        STATIC_WEIGHT
    } else {
        0.0
    };
    let support = transitions.get(&(last, candidate)).copied().unwrap_or(0) as f64;
    let seen = frequency.get(candidate).copied().unwrap_or(0) as f64;
    let strength = static_hit + TRANSITION_WEIGHT * support + seen;

    let penalty = (VARIETY_STEP * frequency.len().saturating_sub(1) as f64).min(VARIETY_CAP);
    let confidence = (strength / 10.0 - penalty).clamp(0.1, 0.9);

    Some(Prediction {
        operation: candidate.to_string(),
        confidence,
        basis,
    })
}

/// Highest count; ties go to the lexicographically smallest name.
fn most_common<'a>(counts: impl Iterator<Item = (&'a str, usize)>) -> Option<&'a str> {
    counts
        .max_by(|a, b| a.1.cmp(&b.1).then_with(|| b.0.cmp(a.0)))
        .map(|(name, _)| name)
}
