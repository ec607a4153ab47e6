//! molfleet-api: Shared wire types
//!
//! Contains the response envelope, host descriptors, request bodies and the
//! change-notification events emitted by the coordinator.

pub mod descriptor;
pub mod events;
pub mod requests;
pub mod responses;

pub use descriptor::HostDescriptor;
pub use events::FleetEvent;
pub use requests::{ApplyVersionRequest, RemoveVersionRequest, ServiceAction, ServiceControlRequest};
pub use responses::{ApiResponse, EnvelopeError, OutputPayload, StagingStatus, UploadResponse};
