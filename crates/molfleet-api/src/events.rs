//! Change notifications emitted by the coordinator

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "type")]
pub enum FleetEvent {
    DiscoveryProgress {
        count: usize,
    },
    DiscoveryCompleted {
        count: usize,
    },
    DiscoveryFailed {
        message: String,
    },
    HostDiscovered {
        host: String,
    },
    HostUpdated {
        host: String,
    },
    RolloutStateChanged {
        target: String,
        from: String,
        to: String,
    },
    RolloutMessage {
        target: String,
        message: String,
    },
    ServiceStatusChanged {
        target: String,
        state: String,
        summary: String,
    },
    StagingRefreshed {
        staged_versions: Vec<String>,
        can_apply_self: bool,
    },
    ActivityLog {
        output: String,
        fetched_at: DateTime<Utc>,
    },
    ReloadCountdown {
        remaining: u32,
    },
    SessionReloaded,
}
