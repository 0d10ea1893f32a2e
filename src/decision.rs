use crate::config::DecisionConfig;
use crate::shared::SharedState;
use crate::votes::VoteBuffer;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// Outcome of a completed vote window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Accept,
    Reject,
    Skip,
}

/// Maps vote windows onto decisions and decisions onto controller codes
#[derive(Debug, Clone)]
pub struct DecisionPolicy {
    positive_label: String,
    negative_label: String,
    positive_code: String,
    negative_code: String,
    skip_code: String,
}

impl DecisionPolicy {
    pub fn new(config: &DecisionConfig) -> Self {
        Self {
            positive_label: config.positive_label.clone(),
            negative_label: config.negative_label.clone(),
            positive_code: config.positive_code.clone(),
            negative_code: config.negative_code.clone(),
            skip_code: config.skip_code.clone(),
        }
    }

    pub fn classify_label(&self, label: Option<&str>) -> Decision {
        match label {
            Some(label) if label == self.positive_label => Decision::Accept,
            Some(label) if label == self.negative_label => Decision::Reject,
            _ => Decision::Skip,
        }
    }

    /// Decide on a window; a window that is not full is insufficient data
    pub fn decide(&self, votes: &VoteBuffer) -> Decision {
        if !votes.is_full() {
            return Decision::Skip;
        }
        self.classify_label(votes.majority().as_deref())
    }

    pub fn code(&self, decision: Decision) -> &str {
        match decision {
            Decision::Accept => &self.positive_code,
            Decision::Reject => &self.negative_code,
            Decision::Skip => &self.skip_code,
        }
    }
}

/// A decision ready to be written to the controller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecisionOutcome {
    pub decision: Decision,
    pub majority: Option<String>,
    pub code: String,
}

/// Couples the collection flag and the vote window to outgoing decisions
#[derive(Clone)]
pub struct DecisionCoordinator {
    shared: Arc<SharedState>,
    policy: DecisionPolicy,
}

impl DecisionCoordinator {
    pub fn new(shared: Arc<SharedState>, config: &DecisionConfig) -> Self {
        Self {
            shared,
            policy: DecisionPolicy::new(config),
        }
    }

    pub fn policy(&self) -> &DecisionPolicy {
        &self.policy
    }

    /// Take the vote window once collection is active and the window is full.
    ///
    /// The window is reset and collection closed before this returns, so the
    /// outcome is produced at most once per window even if sending fails.
    pub fn poll(&self) -> Option<DecisionOutcome> {
        let window = self.shared.take_window_if_full()?;
        let majority = window.majority();
        let decision = self.policy.decide(&window);
        let code = self.policy.code(decision).to_string();

        debug!(
            "Vote window closed: counts={:?} majority={:?} decision={:?}",
            window.counts(),
            majority,
            decision
        );

        Some(DecisionOutcome {
            decision,
            majority,
            code,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SortcamConfig;

    fn window(labels: &[&str], capacity: usize) -> VoteBuffer {
        let mut votes = VoteBuffer::new(capacity);
        for label in labels {
            votes.record(*label);
        }
        votes
    }

    #[test]
    fn test_label_mapping() {
        let policy = DecisionPolicy::new(&SortcamConfig::default().decision);

        let decision = policy.decide(&window(&["good", "good", "bad"], 3));
        assert_eq!(decision, Decision::Accept);
        assert_eq!(policy.code(decision), "GOOD");

        let decision = policy.decide(&window(&["bad", "good", "bad"], 3));
        assert_eq!(decision, Decision::Reject);
        assert_eq!(policy.code(decision), "BAD");

        let decision = policy.decide(&window(&["empty", "empty", "bad"], 3));
        assert_eq!(decision, Decision::Skip);
        assert_eq!(policy.code(decision), "SKIP");
    }

    #[test]
    fn test_partial_window_is_skip() {
        let policy = DecisionPolicy::new(&SortcamConfig::default().decision);
        let decision = policy.decide(&window(&["good", "good"], 3));
        assert_eq!(decision, Decision::Skip);
    }

    #[test]
    fn test_coordinator_waits_for_active_full_window() {
        let shared = Arc::new(SharedState::new(2, 20));
        let coordinator =
            DecisionCoordinator::new(shared.clone(), &SortcamConfig::default().decision);

        assert!(coordinator.poll().is_none());

        shared.activate();
        shared.record_vote("bad");
        assert!(coordinator.poll().is_none());

        shared.record_vote("bad");
        let outcome = coordinator.poll().unwrap();
        assert_eq!(outcome.decision, Decision::Reject);
        assert_eq!(outcome.code, "BAD");
        assert_eq!(outcome.majority.as_deref(), Some("bad"));

        assert!(!shared.is_active());
        assert_eq!(shared.vote_len(), 0);
        assert!(coordinator.poll().is_none());
    }
}
