//! Error types for sevensegments-core

use thiserror::Error;

use crate::transport::TransportError;

/// Main error type for the sevensegments-core library
#[derive(Error, Debug)]
pub enum Error {
    /// Caller passed a value the API cannot accept (empty token, bad customer shape, ...)
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// The transport could not deliver a synchronous request
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Server answered with a non-success status
    #[error("API error ({status}): {body}")]
    Api { status: u16, body: String },

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Response parsed as JSON but lacks the expected structure
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for sevensegments-core
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_display() {
        let err = Error::Api {
            status: 403,
            body: "forbidden".to_string(),
        };
        assert_eq!(err.to_string(), "API error (403): forbidden");
    }

    #[test]
    fn test_transport_error_converts() {
        let err: Error = TransportError::ShortResponse(2).into();
        assert!(matches!(err, Error::Transport(TransportError::ShortResponse(2))));
    }
}
