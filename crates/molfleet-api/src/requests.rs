//! Request types for the API

use std::fmt;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Service control verb
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ServiceAction {
    Start,
    Stop,
}

impl fmt::Display for ServiceAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceAction::Start => write!(f, "start"),
            ServiceAction::Stop => write!(f, "stop"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ServiceControlRequest {
    /// Target address; `"self"` or empty addresses the coordinator's own node
    pub ip: String,
    pub action: ServiceAction,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ApplyVersionRequest {
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RemoveVersionRequest {
    pub version: String,
}
