//! Message types for actor communication
//!
//! Message handlers are implemented in the fleet actor module.

use kameo_macros::Reply;
use serde::Serialize;

use molfleet_api::{HostDescriptor, ServiceAction};
use molfleet_client::{ArtifactBundle, ClientError};

use crate::discovery::DiscoveryEnd;
use crate::registry::{HostId, HostRecord};
use crate::rollout::RolloutTarget;
use crate::service::{ControlAvailability, ServiceStatus};
use crate::staging::StagingState;
use crate::state::RolloutPhase;

/// Selects a host by handle, address, or as the own node
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostSelector {
    SelfHost,
    Ip(String),
    Id(HostId),
}

// ============================================================================
// Registry
// ============================================================================

/// Fill the own-node record from the self query
#[derive(Debug)]
pub struct LoadSelf;

/// Re-fetch one host's descriptor and service status
#[derive(Debug)]
pub struct RefreshHost {
    pub target: HostSelector,
}

/// Look up one host record
#[derive(Debug)]
pub struct GetHost {
    pub target: HostSelector,
}

/// Read the whole client-side state
#[derive(Debug)]
pub struct GetSnapshot;

/// Rollout phase of one host
#[derive(Debug, Clone, Serialize)]
pub struct RolloutStatus {
    pub host: HostId,
    pub phase: RolloutPhase,
}

/// Client-side state at one point in time
#[derive(Debug, Clone, Serialize, Reply)]
pub struct FleetSnapshot {
    pub self_host: HostRecord,
    pub hosts: Vec<HostRecord>,
    pub staging: StagingState,
    pub last_uploaded: Option<String>,
    pub discovery_running: bool,
    pub rollouts: Vec<RolloutStatus>,
}

// ============================================================================
// Discovery
// ============================================================================

/// Start a discovery run; replies with the run id
#[derive(Debug)]
pub struct RunDiscovery;

/// One descriptor read from the discovery stream
#[derive(Debug)]
pub struct DiscoveryDescriptor {
    pub run_id: u64,
    pub descriptor: HostDescriptor,
}

/// The discovery stream stopped
#[derive(Debug)]
pub struct DiscoveryFinished {
    pub run_id: u64,
    pub end: DiscoveryEnd,
}

// ============================================================================
// Staging
// ============================================================================

/// Re-fetch staging state
#[derive(Debug)]
pub struct RefreshStaging;

/// Upload an artifact into staging; replies with the staged version
#[derive(Debug)]
pub struct UploadArtifact {
    pub bundle: ArtifactBundle,
}

/// Remove the current remove candidate from staging
#[derive(Debug)]
pub struct RemoveStagedVersion;

/// Fetch the own node's last update output
#[derive(Debug)]
pub struct FetchUpdateLog;

// ============================================================================
// Rollouts
// ============================================================================

/// Apply to one host
///
/// `inline` is used for remote hosts when no newer version is staged.
#[derive(Debug)]
pub struct ApplyUpdate {
    pub target: HostSelector,
    pub inline: Option<ArtifactBundle>,
}

/// Apply to every remote host for which an apply is meaningful; replies
/// with the number of rollouts started
#[derive(Debug)]
pub struct ApplyToAll {
    pub inline: Option<ArtifactBundle>,
}

/// The apply request returned
#[derive(Debug)]
pub struct ApplySubmitted {
    pub target: RolloutTarget,
    pub rollout_id: u64,
    pub result: Result<String, ClientError>,
}

/// A confirmation attempt fetched a descriptor
#[derive(Debug)]
pub struct ConfirmationSucceeded {
    pub target: RolloutTarget,
    pub rollout_id: u64,
    pub attempts: u32,
    pub descriptor: HostDescriptor,
}

/// Every confirmation attempt failed
#[derive(Debug)]
pub struct ConfirmationExhausted {
    pub target: RolloutTarget,
    pub rollout_id: u64,
    pub attempts: u32,
}

/// The self-reload countdown ran out
#[derive(Debug)]
pub struct CountdownElapsed;

/// Drop all client-side state and reload it from the server
#[derive(Debug)]
pub struct ReloadSession;

// ============================================================================
// Service control
// ============================================================================

/// Start or stop the managed service
#[derive(Debug)]
pub struct ControlService {
    pub target: HostSelector,
    pub action: ServiceAction,
}

/// Result of a start/stop request
#[derive(Debug, Clone, Serialize)]
pub struct ControlReport {
    /// Acknowledgement text, or why the request failed
    pub acknowledgement: Result<String, String>,
    pub status: ServiceStatus,
    pub controls: ControlAvailability,
}

/// Re-query the managed service's status
#[derive(Debug)]
pub struct RefreshServiceStatus {
    pub target: HostSelector,
}

/// A background status query returned
#[derive(Debug)]
pub struct ServiceStatusFetched {
    pub host: HostId,
    /// Session the query was issued in; host ids are reused after a reload
    pub session: u64,
    pub result: Result<ServiceStatus, ClientError>,
}
