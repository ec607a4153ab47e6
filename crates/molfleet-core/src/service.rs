//! Managed service status and control
//!
//! Status arrives as raw service-manager text. Only the `Active:` field is
//! interpreted; everything else is passed through for display.

use std::fmt;

use serde::Serialize;
use tracing::{debug, warn};

use molfleet_api::ServiceAction;
use molfleet_client::{ClientError, FleetApi};

/// Coarse state of the managed service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceState {
    #[default]
    Unknown,
    Active,
    Inactive,
}

impl ServiceState {
    /// Controls to offer for this state
    #[must_use]
    pub fn controls(self) -> ControlAvailability {
        match self {
            ServiceState::Active => ControlAvailability {
                start_enabled: false,
                stop_enabled: true,
            },
            ServiceState::Inactive => ControlAvailability {
                start_enabled: true,
                stop_enabled: false,
            },
            ServiceState::Unknown => ControlAvailability {
                start_enabled: true,
                stop_enabled: true,
            },
        }
    }

    /// One-line operator summary
    #[must_use]
    pub fn summary(self) -> &'static str {
        match self {
            ServiceState::Active => "service running",
            ServiceState::Inactive => "service stopped",
            ServiceState::Unknown => "service state unknown",
        }
    }
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ServiceState::Unknown => "unknown",
            ServiceState::Active => "active",
            ServiceState::Inactive => "inactive",
        };
        write!(f, "{s}")
    }
}

/// Which start/stop controls are enabled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ControlAvailability {
    pub start_enabled: bool,
    pub stop_enabled: bool,
}

impl From<ServiceState> for ControlAvailability {
    fn from(state: ServiceState) -> Self {
        state.controls()
    }
}

/// Parsed status output
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceStatus {
    pub state: ServiceState,
    /// The `Active:` line, trimmed, when present
    pub active_line: Option<String>,
    pub raw: String,
}

impl ServiceStatus {
    #[must_use]
    pub fn parse(output: &str) -> Self {
        let active_line = output
            .lines()
            .map(str::trim)
            .find(|line| line.to_ascii_lowercase().starts_with("active:"))
            .map(str::to_string);

        Self {
            state: classify(output),
            active_line,
            raw: output.to_string(),
        }
    }
}

/// Classify raw status text
///
/// Active when the text contains `Active:` followed by `active (running)`,
/// case-insensitive, with any whitespace between the tokens. Anything else,
/// including empty text, is inactive.
#[must_use]
pub fn classify(output: &str) -> ServiceState {
    let lower = output.to_ascii_lowercase();
    let running = lower.match_indices("active:").any(|(pos, field)| {
        lower[pos + field.len()..]
            .trim_start()
            .strip_prefix("active")
            .is_some_and(|rest| rest.trim_start().starts_with("(running)"))
    });

    if running {
        ServiceState::Active
    } else {
        ServiceState::Inactive
    }
}

/// Outcome of a start/stop request
#[derive(Debug)]
pub struct ControlOutcome {
    /// Acknowledgement text, or the display message of a failed request
    pub acknowledgement: Result<String, String>,
    /// Status fetched after the request
    pub status: Result<ServiceStatus, ClientError>,
}

/// Service control proxy for one target
///
/// `None` addresses the coordinator's own node.
pub struct ServiceControl<'a> {
    api: &'a dyn FleetApi,
    ip: Option<&'a str>,
}

impl<'a> ServiceControl<'a> {
    pub fn new(api: &'a dyn FleetApi, ip: Option<&'a str>) -> Self {
        Self { api, ip }
    }

    /// Fetch and classify the current status
    ///
    /// # Errors
    /// Returns the transport or application error of the status request.
    pub async fn status(&self) -> Result<ServiceStatus, ClientError> {
        let output = self.api.service_status(self.ip).await?;
        Ok(ServiceStatus::parse(&output))
    }

    /// Start or stop, then re-query status
    ///
    /// The acknowledgement does not decide the outcome; the follow-up status
    /// query runs either way.
    pub async fn control(&self, action: ServiceAction) -> ControlOutcome {
        let acknowledgement = match self.api.service_control(self.ip, action).await {
            Ok(text) => {
                debug!(target_ip = ?self.ip, %action, "service control acknowledged");
                Ok(text)
            }
            Err(e) => {
                warn!(target_ip = ?self.ip, %action, error = %e, "service control failed");
                Err(e.user_message())
            }
        };

        ControlOutcome {
            acknowledgement,
            status: self.status().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RUNNING: &str = "● mol.service - Mol agent\n     Loaded: loaded (/etc/systemd/system/mol.service; enabled)\n     Active: active (running) since Tue 2024-05-07 10:00:00 UTC; 2h ago\n   Main PID: 812 (mol)\n";
    const STOPPED: &str = "● mol.service - Mol agent\n     Active: inactive (dead) since Tue 2024-05-07 12:00:00 UTC\n";

    #[test]
    fn test_running_is_active() {
        let status = ServiceStatus::parse(RUNNING);
        assert_eq!(status.state, ServiceState::Active);
        assert!(
            status
                .active_line
                .as_deref()
                .is_some_and(|l| l.starts_with("Active: active (running)"))
        );
    }

    #[test]
    fn test_dead_is_inactive() {
        assert_eq!(classify(STOPPED), ServiceState::Inactive);
        assert_eq!(classify("Active: failed (Result: exit-code)"), ServiceState::Inactive);
        assert_eq!(classify("Active: active (exited)"), ServiceState::Inactive);
    }

    #[test]
    fn test_case_and_whitespace_tolerant() {
        assert_eq!(classify("ACTIVE:\tActive   (Running)"), ServiceState::Active);
        assert_eq!(classify("active:active(running)"), ServiceState::Active);
    }

    #[test]
    fn test_empty_is_inactive() {
        let status = ServiceStatus::parse("");
        assert_eq!(status.state, ServiceState::Inactive);
        assert_eq!(status.active_line, None);
    }

    #[test]
    fn test_controls() {
        assert_eq!(
            ControlAvailability::from(ServiceState::Active),
            ControlAvailability {
                start_enabled: false,
                stop_enabled: true
            }
        );
        assert!(!ServiceState::Inactive.controls().stop_enabled);
        let unknown = ServiceState::Unknown.controls();
        assert!(unknown.start_enabled && unknown.stop_enabled);
    }
}
