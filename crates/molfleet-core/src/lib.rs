//! molfleet-core: Client-side coordination logic
//!
//! Implements the `FleetActor` using the kameo framework, together with the
//! host registry, discovery bookkeeping, staging tracker, rollout planning
//! and service status parsing it is built from.

pub mod actor;
pub mod config;
pub mod discovery;
pub mod error;
pub mod message;
pub mod registry;
pub mod rollout;
pub mod service;
pub mod staging;
pub mod state;

pub use actor::fleet::{FleetActor, FleetActorArgs};
pub use config::RolloutConfig;
pub use discovery::{DiscoveryEnd, DiscoveryOutcome, DiscoveryRun, Ingested};
pub use error::CoreError;
pub use message::{
    ApplyToAll, ApplyUpdate, ControlReport, ControlService, FetchUpdateLog, FleetSnapshot,
    GetHost, GetSnapshot, HostSelector, LoadSelf, RefreshHost, RefreshServiceStatus,
    RefreshStaging, ReloadSession, RemoveStagedVersion, RolloutStatus, RunDiscovery,
    UploadArtifact,
};
pub use registry::{HostId, HostRecord, HostRegistry, Upsert};
pub use rollout::{
    DelaySchedule, RolloutAttempt, RolloutPayload, RolloutTarget, plan_remote, plan_self,
};
pub use service::{
    ControlAvailability, ControlOutcome, ServiceControl, ServiceState, ServiceStatus, classify,
};
pub use staging::{StagingState, StagingTracker, is_applicable};
pub use state::RolloutPhase;
