//! Error types for the molfleet client

use molfleet_api::EnvelopeError;
use thiserror::Error;

/// Display text for any failure that never reached the application layer
pub const TRANSPORT_FAILURE_MESSAGE: &str = "request failed; the node may be restarting";

/// Errors that can occur when using the molfleet client
#[derive(Error, Debug)]
pub enum ClientError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid URL
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    /// Server answered with a non-envelope body and an error status
    #[error("API error ({status}): {message}")]
    Api {
        /// HTTP status code
        status: u16,
        /// Raw body
        message: String,
    },

    /// Server reported `status != "success"`; the text is shown verbatim
    #[error("{0}")]
    Application(String),

    /// Push stream closed before its completion signal
    #[error("Connection closed: {0}")]
    ConnectionClosed(String),

    /// Invalid response format
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Local I/O failed while preparing a request
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ClientError {
    /// Whether the failure came from the server's application layer
    #[must_use]
    pub fn is_application(&self) -> bool {
        matches!(self, ClientError::Application(_))
    }

    /// Text suitable for showing to an operator
    ///
    /// Application errors carry the server's own message; everything else
    /// collapses to a generic transport message.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            ClientError::Application(message) => message.clone(),
            _ => TRANSPORT_FAILURE_MESSAGE.to_string(),
        }
    }
}

impl From<EnvelopeError> for ClientError {
    fn from(err: EnvelopeError) -> Self {
        match err {
            EnvelopeError::Application(message) => ClientError::Application(message),
            EnvelopeError::Payload(e) => ClientError::InvalidResponse(e.to_string()),
        }
    }
}

/// Result type for client operations
pub type Result<T> = std::result::Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_application_message_is_verbatim() {
        let err = ClientError::Application("version is not staged: 9.9.9".to_string());
        assert!(err.is_application());
        assert_eq!(err.user_message(), "version is not staged: 9.9.9");
    }

    #[test]
    fn test_transport_message_is_generic() {
        let err = ClientError::ConnectionClosed("eof".to_string());
        assert!(!err.is_application());
        assert_eq!(err.user_message(), TRANSPORT_FAILURE_MESSAGE);

        let err = ClientError::InvalidResponse("not json".to_string());
        assert_eq!(err.user_message(), TRANSPORT_FAILURE_MESSAGE);
    }
}
