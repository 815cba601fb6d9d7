//! Cloud adapter error types.

use thiserror::Error;

/// Result type alias for cloud operations.
pub type CloudResult<T> = Result<T, CloudError>;

/// Errors returned by cloud capability calls.
#[derive(Debug, Error)]
pub enum CloudError {
    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("no {0} endpoint in service catalog")]
    EndpointNotFound(String),

    #[error("request failed: {0}")]
    Request(String),

    #[error("{method} {url} returned {status}: {body}")]
    Http {
        method: String,
        url: String,
        status: u16,
        body: String,
    },

    #[error("failed to decode response: {0}")]
    Decode(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("cloud handle initialization failed: {0}")]
    Init(String),

    #[error("provider unavailable: {0}")]
    Unavailable(String),
}

impl From<reqwest::Error> for CloudError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            CloudError::Decode(e.to_string())
        } else {
            CloudError::Request(e.to_string())
        }
    }
}
