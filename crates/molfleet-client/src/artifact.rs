//! Deployable artifact plus configuration, as selected by an operator

use std::path::Path;

use crate::error::Result;

/// Artifact binary with its YAML configuration
#[derive(Debug, Clone, Default)]
pub struct ArtifactBundle {
    /// File name sent with the artifact part
    pub file_name: String,
    /// Artifact contents
    pub bytes: Vec<u8>,
    /// Configuration text; the server reads the version from it
    pub config: String,
}

impl ArtifactBundle {
    /// Create a bundle from in-memory parts
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>, config: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes,
            config: config.into(),
        }
    }

    /// Read artifact and config from disk
    ///
    /// # Errors
    /// Returns an error if either file cannot be read.
    pub async fn from_files(artifact: &Path, config: &Path) -> Result<Self> {
        let bytes = tokio::fs::read(artifact).await?;
        let config = tokio::fs::read_to_string(config).await?;
        let file_name = artifact
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "mol".to_string());

        Ok(Self {
            file_name,
            bytes,
            config,
        })
    }

    /// Both an artifact and a non-blank config are present
    #[must_use]
    pub fn is_ready(&self) -> bool {
        !self.bytes.is_empty() && !self.config.trim().is_empty()
    }
}
