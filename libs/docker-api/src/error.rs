//! Error types for the runtime API client.

use thiserror::Error;

/// Errors from the container runtime API.
#[derive(Debug, Error)]
pub enum DockerError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("invalid node endpoint: {0}")]
    InvalidEndpoint(String),
}

impl DockerError {
    /// HTTP status of the failure, when the runtime answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            DockerError::Api { status, .. } => Some(*status),
            DockerError::Http(err) => err.status().map(|s| s.as_u16()),
            DockerError::InvalidEndpoint(_) => None,
        }
    }

    /// True when the runtime reported the resource as missing.
    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }
}
