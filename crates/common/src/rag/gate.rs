//! Relevance gate
//!
//! Decides whether retrieved text is close enough to the question to be put
//! into the prompt.

use crate::models::RetrievalResult;
use serde::{Deserialize, Serialize};

/// Default distance threshold
pub const DEFAULT_RELEVANCE_THRESHOLD: f32 = 0.7;

/// Only the nearest neighbour's distance is compared against the threshold.
/// When it passes, every retrieved text goes into the context.
pub const GATE_ON_NEAREST_ONLY: bool = true;

/// Which distances the gate looks at
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GatePolicy {
    #[default]
    NearestOnly,
}

/// Outcome of the gate for one question
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum RelevanceDecision {
    /// Retrieved text goes into the prompt
    UseContext { nearest_distance: f32 },
    /// Prompt carries an empty context
    NoContext { nearest_distance: Option<f32> },
}

impl RelevanceDecision {
    pub fn uses_context(&self) -> bool {
        matches!(self, RelevanceDecision::UseContext { .. })
    }

    pub fn nearest_distance(&self) -> Option<f32> {
        match self {
            RelevanceDecision::UseContext { nearest_distance } => Some(*nearest_distance),
            RelevanceDecision::NoContext { nearest_distance } => *nearest_distance,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RelevanceGate {
    pub threshold: f32,
    pub policy: GatePolicy,
}

impl Default for RelevanceGate {
    fn default() -> Self {
        Self::new(DEFAULT_RELEVANCE_THRESHOLD)
    }
}

impl RelevanceGate {
    pub fn new(threshold: f32) -> Self {
        Self {
            threshold,
            policy: GatePolicy::NearestOnly,
        }
    }

    /// Context is used iff the result is non-empty and the nearest distance
    /// is strictly below the threshold.
    pub fn decide(&self, result: &RetrievalResult) -> RelevanceDecision {
        match self.policy {
            GatePolicy::NearestOnly => match result.nearest() {
                Some(nearest) if nearest.distance < self.threshold => RelevanceDecision::UseContext {
                    nearest_distance: nearest.distance,
                },
                Some(nearest) => RelevanceDecision::NoContext {
                    nearest_distance: Some(nearest.distance),
                },
                None => RelevanceDecision::NoContext {
                    nearest_distance: None,
                },
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RetrievedDocument;

    fn result(distances: &[f32]) -> RetrievalResult {
        RetrievalResult::new(
            distances
                .iter()
                .enumerate()
                .map(|(i, d)| RetrievedDocument {
                    id: format!("doc{}", i),
                    text: format!("text {}", i),
                    distance: *d,
                })
                .collect(),
        )
    }

    #[test]
    fn test_empty_result_has_no_context() {
        let decision = RelevanceGate::default().decide(&RetrievalResult::empty());
        assert_eq!(decision, RelevanceDecision::NoContext { nearest_distance: None });
        assert!(!decision.uses_context());
    }

    #[test]
    fn test_threshold_is_strict() {
        let gate = RelevanceGate::default();
        assert!(gate.decide(&result(&[0.6999])).uses_context());
        assert!(!gate.decide(&result(&[0.7])).uses_context());
        assert!(!gate.decide(&result(&[0.95])).uses_context());
    }

    #[test]
    fn test_only_nearest_is_gated() {
        let gate = RelevanceGate::default();
        let decision = gate.decide(&result(&[0.3, 0.9, 1.4]));
        assert_eq!(decision, RelevanceDecision::UseContext { nearest_distance: 0.3 });
        assert!(GATE_ON_NEAREST_ONLY);
    }
}
