//! Rollout state machine

use std::fmt;

use serde::Serialize;

/// Phase of the rollout against one target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RolloutPhase {
    #[default]
    Idle,
    Submitting,
    AwaitingConfirmation,
    Confirmed,
    Exhausted,
    Failed,
}

impl RolloutPhase {
    /// Whether moving to `next` is a legal transition
    ///
    /// A new submission may start from any phase; re-targeting a host with
    /// an in-flight chain supersedes that chain.
    #[must_use]
    pub fn can_transition_to(self, next: RolloutPhase) -> bool {
        use RolloutPhase::{AwaitingConfirmation, Confirmed, Exhausted, Failed, Idle, Submitting};

        match (self, next) {
            (_, Submitting) => true,
            (Idle | Confirmed | Exhausted | Failed, Failed) => true,
            (Submitting, AwaitingConfirmation | Failed) => true,
            (AwaitingConfirmation, Confirmed | Exhausted) => true,
            (_, Idle) => false,
            _ => false,
        }
    }

    /// A request or confirmation chain is outstanding
    #[must_use]
    pub fn is_in_flight(self) -> bool {
        matches!(
            self,
            RolloutPhase::Submitting | RolloutPhase::AwaitingConfirmation
        )
    }

    /// Rollout ended, successfully or not
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RolloutPhase::Confirmed | RolloutPhase::Exhausted | RolloutPhase::Failed
        )
    }
}

impl fmt::Display for RolloutPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RolloutPhase::Idle => "idle",
            RolloutPhase::Submitting => "submitting",
            RolloutPhase::AwaitingConfirmation => "awaiting_confirmation",
            RolloutPhase::Confirmed => "confirmed",
            RolloutPhase::Exhausted => "exhausted",
            RolloutPhase::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path() {
        assert!(RolloutPhase::Idle.can_transition_to(RolloutPhase::Submitting));
        assert!(RolloutPhase::Submitting.can_transition_to(RolloutPhase::AwaitingConfirmation));
        assert!(RolloutPhase::AwaitingConfirmation.can_transition_to(RolloutPhase::Confirmed));
        assert!(RolloutPhase::AwaitingConfirmation.can_transition_to(RolloutPhase::Exhausted));
    }

    #[test]
    fn test_precondition_failure_from_idle() {
        assert!(RolloutPhase::Idle.can_transition_to(RolloutPhase::Failed));
        assert!(!RolloutPhase::Idle.can_transition_to(RolloutPhase::AwaitingConfirmation));
    }

    #[test]
    fn test_confirmation_requires_submission() {
        assert!(!RolloutPhase::Submitting.can_transition_to(RolloutPhase::Confirmed));
        assert!(!RolloutPhase::AwaitingConfirmation.can_transition_to(RolloutPhase::Failed));
        assert!(!RolloutPhase::Confirmed.can_transition_to(RolloutPhase::Idle));
    }

    #[test]
    fn test_resubmission_supersedes() {
        assert!(RolloutPhase::AwaitingConfirmation.can_transition_to(RolloutPhase::Submitting));
        assert!(RolloutPhase::Exhausted.can_transition_to(RolloutPhase::Submitting));
    }

    #[test]
    fn test_display() {
        assert_eq!(
            RolloutPhase::AwaitingConfirmation.to_string(),
            "awaiting_confirmation"
        );
        assert!(RolloutPhase::Failed.is_terminal());
        assert!(RolloutPhase::Submitting.is_in_flight());
    }
}
