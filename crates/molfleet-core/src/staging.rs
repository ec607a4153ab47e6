//! Staging area tracking
//!
//! The coordinator's node holds uploaded versions in a staging area until
//! they are applied. This module mirrors that state and decides which
//! hosts an apply makes sense for.

use serde::Serialize;
use tracing::{debug, info, warn};

use molfleet_api::StagingStatus;
use molfleet_client::{ArtifactBundle, ClientError, FleetApi};

use crate::error::CoreError;

/// Client-side view of the staging area
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StagingState {
    /// Staged versions, latest first
    pub staged_versions: Vec<String>,
    /// The own node may apply `apply_version`
    pub can_apply_self: bool,
    pub apply_version: Option<String>,
    /// Version a remove request would target
    pub remove_candidate: Option<String>,
    /// Version the own node currently runs, as seen by the server
    pub current_version: Option<String>,
}

impl From<StagingStatus> for StagingState {
    fn from(status: StagingStatus) -> Self {
        Self {
            staged_versions: status
                .staging_versions
                .into_iter()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .collect(),
            can_apply_self: status.can_apply,
            apply_version: normalize(status.apply_version),
            remove_candidate: normalize(status.remove_version),
            current_version: normalize(status.current_version),
        }
    }
}

fn normalize(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl StagingState {
    /// Latest staged version
    #[must_use]
    pub fn latest(&self) -> Option<&str> {
        self.staged_versions.first().map(String::as_str)
    }

    /// Whether nothing is staged
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.staged_versions.is_empty()
    }
}

/// Whether an apply against a host running `host_version` is meaningful
///
/// True when the latest staged version differs from the host's, or when the
/// operator has a complete inline artifact selected.
#[must_use]
pub fn is_applicable(host_version: &str, staging: &StagingState, has_inline: bool) -> bool {
    staging.latest().is_some_and(|latest| latest != host_version) || has_inline
}

/// Tracks staging state and the last upload
#[derive(Debug, Default)]
pub struct StagingTracker {
    state: StagingState,
    last_uploaded: Option<String>,
}

impl StagingTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn state(&self) -> &StagingState {
        &self.state
    }

    /// Version reported by the most recent successful upload
    #[must_use]
    pub fn last_uploaded(&self) -> Option<&str> {
        self.last_uploaded.as_deref()
    }

    /// Replace the tracked state wholesale
    pub fn replace(&mut self, status: StagingStatus) -> &StagingState {
        self.state = StagingState::from(status);
        &self.state
    }

    /// Re-fetch from the server; on failure the previous state stays
    ///
    /// # Errors
    /// Returns the error of the status request.
    pub async fn refresh(&mut self, api: &dyn FleetApi) -> Result<&StagingState, ClientError> {
        let status = api.staging_status().await?;
        let state = self.replace(status);
        debug!(staged = state.staged_versions.len(), can_apply_self = state.can_apply_self, "staging refreshed");
        Ok(state)
    }

    /// Upload an artifact into staging, then refresh
    ///
    /// # Errors
    /// Returns `CoreError::Precondition` without a request when the bundle is
    /// incomplete, or the upload's own error.
    pub async fn upload(
        &mut self,
        api: &dyn FleetApi,
        bundle: &ArtifactBundle,
    ) -> Result<String, CoreError> {
        if !bundle.is_ready() {
            return Err(CoreError::Precondition(
                "select both an artifact and its config before uploading".to_string(),
            ));
        }

        let response = api.upload_artifact(bundle).await?;
        info!(version = %response.version, "artifact staged");
        self.last_uploaded = Some(response.version.clone());

        if let Err(e) = self.refresh(api).await {
            warn!(error = %e, "failed to refresh staging after upload");
        }
        Ok(response.version)
    }

    /// Remove the server's remove candidate from staging
    ///
    /// Staging is refreshed afterwards whether or not the removal succeeded.
    ///
    /// # Errors
    /// Returns `CoreError::Precondition` when nothing is staged, or the
    /// remove request's own error.
    pub async fn remove(&mut self, api: &dyn FleetApi) -> Result<String, CoreError> {
        let Some(version) = self
            .state
            .remove_candidate
            .clone()
            .or_else(|| self.state.latest().map(str::to_string))
            .filter(|_| !self.state.is_empty())
        else {
            return Err(CoreError::Precondition(
                "no staged version to remove".to_string(),
            ));
        };

        let result = api.remove_staged(&version).await;
        match &result {
            Ok(_) => info!(%version, "staged version removed"),
            Err(e) => warn!(%version, error = %e, "failed to remove staged version"),
        }

        if let Err(e) = self.refresh(api).await {
            warn!(error = %e, "failed to refresh staging after removal");
        }

        result
            .map(|text| if text.is_empty() { version } else { text })
            .map_err(CoreError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn staged(versions: &[&str]) -> StagingState {
        StagingState {
            staged_versions: versions.iter().map(|v| (*v).to_string()).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_blank_fields_normalize_to_none() {
        let state = StagingState::from(StagingStatus {
            can_apply: false,
            apply_version: Some(String::new()),
            staging_versions: vec!["1.4.0".to_string(), " ".to_string()],
            remove_version: Some("1.4.0".to_string()),
            current_version: Some("  ".to_string()),
        });

        assert_eq!(state.apply_version, None);
        assert_eq!(state.current_version, None);
        assert_eq!(state.staged_versions, vec!["1.4.0"]);
        assert_eq!(state.remove_candidate.as_deref(), Some("1.4.0"));
    }

    #[test]
    fn test_applicable_when_latest_differs() {
        let state = staged(&["1.4.0", "1.3.0"]);
        assert!(is_applicable("1.3.0", &state, false));
        assert!(!is_applicable("1.4.0", &state, false));
    }

    #[test]
    fn test_inline_selection_makes_applicable() {
        let state = staged(&[]);
        assert!(!is_applicable("1.3.0", &state, false));
        assert!(is_applicable("1.3.0", &state, true));
        assert!(is_applicable("1.4.0", &staged(&["1.4.0"]), true));
    }

    #[test]
    fn test_plain_inequality_not_ordering() {
        assert!(is_applicable("1.2.0", &staged(&["1.3.0"]), false));
        assert!(!is_applicable("1.2.0", &staged(&["1.2.0"]), false));
        assert!(is_applicable("1.2.0", &staged(&[]), true));
        // Downgrades look the same as upgrades
        assert!(is_applicable("2.0.0", &staged(&["1.9.0"]), false));
    }

    #[test]
    fn test_unknown_version_is_applicable() {
        assert!(is_applicable("", &staged(&["1.4.0"]), false));
    }
}
