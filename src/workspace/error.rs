//! Error types for the workspace REST client.

use thiserror::Error;

use crate::backend::{ClusterApiError, IdentityError};
use crate::command::CommandError;

const NOT_FOUND_CODES: [&str; 2] = ["RESOURCE_DOES_NOT_EXIST", "NOT_FOUND"];

/// Errors raised by [`super::WorkspaceClient`].
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum WorkspaceError {
    /// Raised when the HTTP client cannot be constructed.
    #[error("failed to build HTTP client: {0}")]
    Client(String),
    /// Raised when a request never produced a response.
    #[error("request to {endpoint} failed: {message}")]
    Transport {
        /// Endpoint path.
        endpoint: String,
        /// Transport error message.
        message: String,
    },
    /// Raised when the workspace answered with an error status.
    #[error("{endpoint} returned {status} {error_code}: {message}")]
    Api {
        /// Endpoint path.
        endpoint: String,
        /// HTTP status code.
        status: u16,
        /// Provider error code, possibly empty.
        error_code: String,
        /// Provider error message.
        message: String,
    },
    /// Raised when a successful response cannot be decoded.
    #[error("failed to decode response from {endpoint}: {message}")]
    Decode {
        /// Endpoint path.
        endpoint: String,
        /// Decoder message.
        message: String,
    },
    /// Raised when a remote command does not finish in time.
    #[error("timeout after {waited_secs}s waiting for {what}")]
    Timeout {
        /// What was being waited on.
        what: String,
        /// Seconds spent waiting.
        waited_secs: u64,
    },
}

impl WorkspaceError {
    /// Returns `true` when the workspace reported a missing resource.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::Api {
                status, error_code, ..
            } => *status == 404 || NOT_FOUND_CODES.contains(&error_code.as_str()),
            Self::Client(_)
            | Self::Transport { .. }
            | Self::Decode { .. }
            | Self::Timeout { .. } => false,
        }
    }

    /// Returns `true` when the workspace reported an existing resource.
    #[must_use]
    pub fn is_already_exists(&self) -> bool {
        match self {
            Self::Api {
                error_code,
                message,
                ..
            } => error_code == "RESOURCE_ALREADY_EXISTS" || message.contains("already exists"),
            Self::Client(_)
            | Self::Transport { .. }
            | Self::Decode { .. }
            | Self::Timeout { .. } => false,
        }
    }
}

impl From<WorkspaceError> for ClusterApiError {
    fn from(err: WorkspaceError) -> Self {
        Self::Request {
            message: err.to_string(),
        }
    }
}

impl From<WorkspaceError> for CommandError {
    fn from(err: WorkspaceError) -> Self {
        match err {
            WorkspaceError::Api { message, .. } => Self::new(message),
            other => Self::new(other.to_string()),
        }
    }
}

impl WorkspaceError {
    pub(super) fn into_identity_error(self, arn: &str) -> IdentityError {
        IdentityError {
            arn: arn.to_owned(),
            message: self.to_string(),
        }
    }
}
