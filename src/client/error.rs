//! Error types for BI platform client operations.

use thiserror::Error;

/// Result type alias for BI platform client operations
pub type Result<T> = std::result::Result<T, BiError>;

/// Errors that can occur while talking to the BI platform REST API.
///
/// [`Protocol`](Self::Protocol) and [`Request`](Self::Request) are the two
/// failures the server itself can cause. The remaining variants cover the
/// transport and local input.
#[derive(Error, Debug)]
pub enum BiError {
    /// The response did not have the expected shape (content type, token header)
    #[error("API did not return {expected}, got {found}")]
    Protocol { expected: String, found: String },

    /// The server answered with a non-success status
    #[error("request failed [{status}]: {message}")]
    Request { status: u16, message: String },

    /// HTTP transport failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// A token or cookie could not be turned into a header value
    #[error("invalid header value: {0}")]
    InvalidHeader(String),

    /// Unknown authentication type name
    #[error("unknown authentication type '{0}' (expected secEnterprise, secLDAP, secWinAD or secSAPR3)")]
    InvalidAuthType(String),

    /// JSON encoding or decoding failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error while reading a file to upload
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BiError {
    pub fn protocol(expected: impl Into<String>, found: impl Into<String>) -> Self {
        Self::Protocol {
            expected: expected.into(),
            found: found.into(),
        }
    }

    pub fn request(status: u16, message: impl Into<String>) -> Self {
        Self::Request {
            status,
            message: message.into(),
        }
    }

    /// HTTP status of a [`Request`](Self::Request) error.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Request { status, .. } => Some(*status),
            _ => None,
        }
    }
}
