//! Rollout planning and confirmation scheduling
//!
//! A rollout has two halves: submitting the apply, and confirming that the
//! node came back. The node restarts its service mid-apply, so confirmation
//! is a bounded series of delayed descriptor re-fetches.

use std::time::Duration;

use serde::Serialize;

use molfleet_client::{ApplyRequest, ArtifactBundle};

use crate::error::CoreError;
use crate::registry::HostId;
use crate::staging::{StagingState, is_applicable};

/// Target of a rollout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum RolloutTarget {
    /// The coordinator's own node; addressed without an IP
    SelfHost,
    Remote(HostId),
}

impl RolloutTarget {
    #[must_use]
    pub fn host_id(self) -> HostId {
        match self {
            RolloutTarget::SelfHost => HostId::SELF,
            RolloutTarget::Remote(id) => id,
        }
    }

    #[must_use]
    pub fn from_host(id: HostId) -> Self {
        if id.is_self() {
            RolloutTarget::SelfHost
        } else {
            RolloutTarget::Remote(id)
        }
    }
}

/// What gets applied
#[derive(Debug, Clone)]
pub enum RolloutPayload {
    /// A version already in staging
    Staged { version: String },
    /// Artifact and config submitted with the apply
    Inline(ArtifactBundle),
}

impl RolloutPayload {
    /// Version the node will run afterwards, when known up front
    #[must_use]
    pub fn known_version(&self) -> Option<&str> {
        match self {
            RolloutPayload::Staged { version } => Some(version.as_str()),
            RolloutPayload::Inline(_) => None,
        }
    }

    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            RolloutPayload::Staged { version } => format!("version {version}"),
            RolloutPayload::Inline(bundle) => format!("artifact {}", bundle.file_name),
        }
    }

    /// Build the wire request; `ip` is `None` for the own node
    #[must_use]
    pub fn into_request(self, ip: Option<String>) -> ApplyRequest {
        match self {
            RolloutPayload::Staged { version } => ApplyRequest::Version { version, ip },
            RolloutPayload::Inline(bundle) => ApplyRequest::Inline { ip, bundle },
        }
    }
}

/// Choose the payload for a remote host
///
/// The latest staged version wins when it differs from what the host runs;
/// otherwise a complete inline selection is used.
///
/// # Errors
/// Returns `CoreError::Precondition` when neither applies.
pub fn plan_remote(
    host_version: &str,
    staging: &StagingState,
    inline: Option<&ArtifactBundle>,
) -> Result<RolloutPayload, CoreError> {
    let has_inline = inline.is_some_and(ArtifactBundle::is_ready);
    if !is_applicable(host_version, staging, has_inline) {
        return Err(CoreError::Precondition(format!(
            "nothing to apply: no staged version newer than {} and no artifact selected",
            if host_version.is_empty() { "the current one" } else { host_version }
        )));
    }

    match (staging.latest(), inline) {
        (Some(latest), _) if latest != host_version => Ok(RolloutPayload::Staged {
            version: latest.to_string(),
        }),
        (_, Some(bundle)) => Ok(RolloutPayload::Inline(bundle.clone())),
        _ => Err(CoreError::Precondition("nothing to apply".to_string())),
    }
}

/// Choose the payload for the own node
///
/// Only the staged path exists for the own node, and only when the server
/// says the staged version may be applied.
///
/// # Errors
/// Returns `CoreError::Precondition` when the server does not allow it.
pub fn plan_self(staging: &StagingState) -> Result<RolloutPayload, CoreError> {
    match (&staging.apply_version, staging.can_apply_self) {
        (Some(version), true) => Ok(RolloutPayload::Staged {
            version: version.clone(),
        }),
        _ => Err(CoreError::Precondition(
            "no staged version can be applied to this node".to_string(),
        )),
    }
}

/// Delays between confirmation attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelaySchedule {
    /// Before the first attempt
    pub initial: Duration,
    /// Before every later attempt
    pub retry: Duration,
}

impl DelaySchedule {
    /// Delay before the 1-based `attempt`
    #[must_use]
    pub fn delay_before(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            self.initial
        } else {
            self.retry
        }
    }
}

/// Bookkeeping for one confirmation chain
#[derive(Debug, Clone)]
pub struct RolloutAttempt {
    pub rollout_id: u64,
    pub target: RolloutTarget,
    /// Address polled for the descriptor
    pub ip: String,
    /// Version expected afterwards, when known
    pub expected_version: Option<String>,
    pub attempt_count: u32,
    pub max_attempts: u32,
    pub schedule: DelaySchedule,
}

impl RolloutAttempt {
    #[must_use]
    pub fn new(
        rollout_id: u64,
        target: RolloutTarget,
        ip: String,
        expected_version: Option<String>,
        max_attempts: u32,
        schedule: DelaySchedule,
    ) -> Self {
        Self {
            rollout_id,
            target,
            ip,
            expected_version,
            attempt_count: 0,
            max_attempts,
            schedule,
        }
    }

    /// Count the next attempt and return the delay to wait before it
    ///
    /// Returns `None` once `max_attempts` have been made.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.is_exhausted() {
            return None;
        }
        self.attempt_count += 1;
        Some(self.schedule.delay_before(self.attempt_count))
    }

    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.attempt_count >= self.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn staging(versions: &[&str]) -> StagingState {
        StagingState {
            staged_versions: versions.iter().map(|v| (*v).to_string()).collect(),
            ..Default::default()
        }
    }

    fn bundle() -> ArtifactBundle {
        ArtifactBundle::new("mol", vec![0x7f, b'E', b'L', b'F'], "version: 1.5.0\n")
    }

    #[test]
    fn test_plan_prefers_staged() {
        let payload = plan_remote("1.3.0", &staging(&["1.4.0"]), Some(&bundle())).unwrap();
        assert_eq!(payload.known_version(), Some("1.4.0"));
    }

    #[test]
    fn test_plan_falls_back_to_inline() {
        let payload = plan_remote("1.4.0", &staging(&["1.4.0"]), Some(&bundle())).unwrap();
        assert!(matches!(payload, RolloutPayload::Inline(_)));
        assert_eq!(payload.known_version(), None);
    }

    #[test]
    fn test_plan_rejects_when_up_to_date() {
        let err = plan_remote("1.4.0", &staging(&["1.4.0"]), None).unwrap_err();
        assert!(matches!(err, CoreError::Precondition(_)));

        let incomplete = ArtifactBundle::new("mol", vec![1], "");
        let err = plan_remote("1.4.0", &staging(&[]), Some(&incomplete)).unwrap_err();
        assert!(matches!(err, CoreError::Precondition(_)));
    }

    #[test]
    fn test_plan_agrees_with_applicability() {
        let cases = [
            ("1.3.0", staging(&["1.4.0"]), None),
            ("1.4.0", staging(&["1.4.0"]), None),
            ("1.4.0", staging(&[]), Some(bundle())),
            ("", staging(&[]), None),
        ];
        for (version, state, inline) in cases {
            let has_inline = inline.as_ref().is_some_and(ArtifactBundle::is_ready);
            assert_eq!(
                plan_remote(version, &state, inline.as_ref()).is_ok(),
                is_applicable(version, &state, has_inline),
                "version {version:?}"
            );
        }
    }

    #[test]
    fn test_plan_self_requires_permission() {
        let mut state = staging(&["1.4.0"]);
        state.apply_version = Some("1.4.0".to_string());
        assert!(plan_self(&state).is_err());

        state.can_apply_self = true;
        let payload = plan_self(&state).unwrap();
        assert_eq!(payload.known_version(), Some("1.4.0"));

        state.apply_version = None;
        assert!(plan_self(&state).is_err());
    }

    #[test]
    fn test_request_shape() {
        let request = RolloutPayload::Staged {
            version: "1.4.0".to_string(),
        }
        .into_request(Some("10.0.0.7".to_string()));
        assert_eq!(request.ip(), Some("10.0.0.7"));

        let request = RolloutPayload::Inline(bundle()).into_request(None);
        assert!(matches!(request, ApplyRequest::Inline { ip: None, .. }));
    }

    #[test]
    fn test_attempts_are_bounded() {
        let schedule = DelaySchedule {
            initial: Duration::from_secs(5),
            retry: Duration::from_secs(3),
        };
        let mut attempt = RolloutAttempt::new(
            1,
            RolloutTarget::SelfHost,
            "10.0.0.7".to_string(),
            None,
            4,
            schedule,
        );

        let delays: Vec<_> = std::iter::from_fn(|| attempt.next_delay()).collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_secs(5),
                Duration::from_secs(3),
                Duration::from_secs(3),
                Duration::from_secs(3)
            ]
        );
        assert!(attempt.is_exhausted());
        assert_eq!(attempt.attempt_count, 4);
    }
}
