//! Transport seam between orchestration and the coordinator's HTTP API

use async_trait::async_trait;

use molfleet_api::{HostDescriptor, ServiceAction, StagingStatus, UploadResponse};

use crate::artifact::ArtifactBundle;
use crate::error::Result;
use crate::sse::DiscoveryStream;

/// Body of an apply request
#[derive(Debug, Clone)]
pub enum ApplyRequest {
    /// Apply a version already present in the staging area
    Version {
        version: String,
        /// Remote node address; `None` targets the coordinator's own node
        ip: Option<String>,
    },
    /// Stage and apply in one submission
    Inline {
        ip: Option<String>,
        bundle: ArtifactBundle,
    },
}

impl ApplyRequest {
    /// Target address, if remote
    #[must_use]
    pub fn ip(&self) -> Option<&str> {
        match self {
            ApplyRequest::Version { ip, .. } | ApplyRequest::Inline { ip, .. } => ip.as_deref(),
        }
    }
}

/// Every endpoint the coordinator consumes
///
/// `HttpClient` is the production implementation; tests substitute mocks.
#[async_trait]
pub trait FleetApi: Send + Sync {
    /// Descriptor of the coordinator's own node
    async fn self_descriptor(&self) -> Result<HostDescriptor>;

    /// Descriptor of a remote node, fetched by unicast probe
    async fn host_descriptor(&self, ip: &str) -> Result<HostDescriptor>;

    /// Raw service-manager status text; `None` queries the own node
    async fn service_status(&self, ip: Option<&str>) -> Result<String>;

    /// Start or stop the managed service; returns the acknowledgement text
    async fn service_control(&self, ip: Option<&str>, action: ServiceAction) -> Result<String>;

    /// Open the server-push discovery stream
    async fn discovery_stream(&self) -> Result<DiscoveryStream>;

    /// Current staging area state
    async fn staging_status(&self) -> Result<StagingStatus>;

    /// Upload an artifact and its config into staging
    async fn upload_artifact(&self, bundle: &ArtifactBundle) -> Result<UploadResponse>;

    /// Remove a version from staging
    async fn remove_staged(&self, version: &str) -> Result<String>;

    /// Submit an apply request
    async fn apply_update(&self, request: &ApplyRequest) -> Result<String>;

    /// Output of the last update run on the own node
    async fn update_log(&self) -> Result<String>;
}
