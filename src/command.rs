//! Remote command channel used to run mount scripts inside a cluster.

use thiserror::Error;

use crate::backend::BackendFuture;

/// Failure reported by the remote command channel.
///
/// The message is kept verbatim; mount operations classify it by content.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
#[error("{message}")]
pub struct CommandError {
    /// Raw error text from the transport or the remote interpreter.
    pub message: String,
}

impl CommandError {
    /// Wraps a raw error message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Executes script text on a cluster and returns its raw output.
pub trait CommandExecutor: Send + Sync {
    /// Runs `script` on `cluster_id` and returns the captured result text.
    fn execute<'a>(
        &'a self,
        cluster_id: &'a str,
        script: &'a str,
    ) -> BackendFuture<'a, String, CommandError>;
}
