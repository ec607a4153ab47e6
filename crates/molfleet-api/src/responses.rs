//! Response types for the API

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use utoipa::ToSchema;

/// Fallback text when the server reports an error without a message
pub const DEFAULT_ERROR_MESSAGE: &str = "request failed";

/// Uniform `{status, data}` envelope returned by every endpoint
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ApiResponse {
    pub status: String,
    #[serde(default)]
    pub data: Value,
}

/// Envelope could not be turned into a typed payload
#[derive(Error, Debug)]
pub enum EnvelopeError {
    /// Server reported a non-success status; the text is display-ready
    #[error("{0}")]
    Application(String),

    /// Success payload did not match the expected shape
    #[error("unexpected payload: {0}")]
    Payload(#[from] serde_json::Error),
}

impl ApiResponse {
    /// Whether the server reported success
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == "success"
    }

    /// Decode `data` as `T` on success, or return `data` as display text
    ///
    /// # Errors
    /// Returns `EnvelopeError::Application` for any non-success status and
    /// `EnvelopeError::Payload` if `data` does not deserialize into `T`.
    pub fn into_result<T: DeserializeOwned>(self) -> Result<T, EnvelopeError> {
        if !self.is_success() {
            return Err(EnvelopeError::Application(message_text(&self.data)));
        }
        Ok(serde_json::from_value(self.data)?)
    }
}

fn message_text(data: &Value) -> String {
    match data {
        Value::String(s) if !s.trim().is_empty() => s.clone(),
        Value::Null => DEFAULT_ERROR_MESSAGE.to_string(),
        Value::String(_) => DEFAULT_ERROR_MESSAGE.to_string(),
        other => other.to_string(),
    }
}

/// `{output}` payload of the status and update-log endpoints
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct OutputPayload {
    #[serde(default)]
    pub output: String,
}

/// Staging area state as computed by the server
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct StagingStatus {
    pub can_apply: bool,
    pub apply_version: Option<String>,
    pub staging_versions: Vec<String>,
    pub remove_version: Option<String>,
    pub current_version: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UploadResponse {
    pub version: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_payload() {
        let response: ApiResponse = serde_json::from_str(
            r#"{"status":"success","data":{"output":"Active: active (running)"}}"#,
        )
        .unwrap();

        let payload: OutputPayload = response.into_result().unwrap();
        assert_eq!(payload.output, "Active: active (running)");
    }

    #[test]
    fn test_error_message_is_verbatim() {
        let response: ApiResponse =
            serde_json::from_str(r#"{"status":"fail","data":"version is required"}"#).unwrap();

        let err = response.into_result::<OutputPayload>().unwrap_err();
        assert_eq!(err.to_string(), "version is required");
    }

    #[test]
    fn test_blank_error_message_uses_default() {
        for data in [r#""   ""#, "null"] {
            let response: ApiResponse =
                serde_json::from_str(&format!(r#"{{"status":"error","data":{data}}}"#)).unwrap();
            let err = response.into_result::<String>().unwrap_err();
            assert_eq!(err.to_string(), DEFAULT_ERROR_MESSAGE);
        }
    }

    #[test]
    fn test_null_success_text_decodes_as_none() {
        let response: ApiResponse =
            serde_json::from_str(r#"{"status":"success","data":null}"#).unwrap();

        let text: Option<String> = response.into_result().unwrap();
        assert!(text.is_none());
    }

    #[test]
    fn test_staging_status_defaults() {
        let status: StagingStatus =
            serde_json::from_str(r#"{"can_apply":true,"staging_versions":["1.4.0"]}"#).unwrap();

        assert!(status.can_apply);
        assert_eq!(status.staging_versions, vec!["1.4.0"]);
        assert_eq!(status.apply_version, None);
    }
}
