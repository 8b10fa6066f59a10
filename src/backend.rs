//! Collaborator seams for cluster management and credential registration.
//!
//! The orchestrator never talks to a provider directly. It depends on the
//! traits below so the REST adapter in [`crate::workspace`] and the scripted
//! doubles in [`crate::test_support`] can be swapped freely.

use std::future::Future;
use std::pin::Pin;

use thiserror::Error;

use crate::cluster::{ClusterInfo, ClusterRequest, ClusterState, WaitPolicy, poll_until_running};
use crate::credentials::InstanceProfileArn;

/// Future returned by collaborator operations.
pub type BackendFuture<'a, T, E> = Pin<Box<dyn Future<Output = Result<T, E>> + Send + 'a>>;

/// Errors raised by the cluster management collaborator.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ClusterApiError {
    /// Raised when the requested cluster does not exist.
    #[error("cluster {cluster_id} does not exist")]
    NotFound {
        /// Identifier that was looked up.
        cluster_id: String,
    },
    /// Raised when a cluster stops making progress towards running.
    #[error("cluster {cluster_id} entered state {state}: {message}")]
    TerminalState {
        /// Cluster identifier.
        cluster_id: String,
        /// State reported by the provider.
        state: ClusterState,
        /// Provider supplied explanation, possibly empty.
        message: String,
    },
    /// Raised when a cluster does not become ready before the deadline.
    #[error("timeout after {waited_secs}s waiting for cluster {cluster_id} to run")]
    WaitTimeout {
        /// Cluster identifier.
        cluster_id: String,
        /// Seconds spent waiting before giving up.
        waited_secs: u64,
    },
    /// Wrapper for transport or provider level failures.
    #[error("cluster API request failed: {message}")]
    Request {
        /// Message returned by the transport or provider.
        message: String,
    },
}

/// Cluster management operations required by the resolver.
pub trait ClusterApi: Send + Sync {
    /// Fetches a single cluster by identifier.
    fn get<'a>(&'a self, cluster_id: &'a str) -> BackendFuture<'a, ClusterInfo, ClusterApiError>;

    /// Lists every cluster visible to the caller.
    fn list(&self) -> BackendFuture<'_, Vec<ClusterInfo>, ClusterApiError>;

    /// Requests a new cluster and returns its identifier without waiting.
    fn create<'a>(
        &'a self,
        request: &'a ClusterRequest,
    ) -> BackendFuture<'a, String, ClusterApiError>;

    /// Asks a terminated cluster to start again without waiting.
    fn start<'a>(&'a self, cluster_id: &'a str) -> BackendFuture<'a, (), ClusterApiError>;

    /// Blocks until the cluster is ready to run commands.
    ///
    /// The default implementation polls [`ClusterApi::get`] with exponential
    /// backoff as described by `policy`.
    fn wait_until_running<'a>(
        &'a self,
        cluster_id: &'a str,
        policy: &'a WaitPolicy,
    ) -> BackendFuture<'a, ClusterInfo, ClusterApiError> {
        Box::pin(poll_until_running(self, cluster_id, policy))
    }

    /// Terminates the cluster and removes it from the workspace.
    fn permanent_delete<'a>(&'a self, cluster_id: &'a str)
    -> BackendFuture<'a, (), ClusterApiError>;
}

/// Errors raised by the identity collaborator.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
#[error("instance profile {arn}: {message}")]
pub struct IdentityError {
    /// Instance profile the operation targeted.
    pub arn: String,
    /// Message returned by the provider.
    pub message: String,
}

/// Registration of shared credential objects that mounts depend on.
///
/// `create` must behave as "create if absent": registering an already known
/// instance profile succeeds.
pub trait InstanceProfileApi: Send + Sync {
    /// Registers the instance profile with the workspace.
    fn create<'a>(&'a self, arn: &'a InstanceProfileArn) -> BackendFuture<'a, (), IdentityError>;

    /// Removes the instance profile. Removing an unknown profile succeeds.
    fn delete<'a>(&'a self, arn: &'a InstanceProfileArn) -> BackendFuture<'a, (), IdentityError>;
}
