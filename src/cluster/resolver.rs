//! Finds a credentialed cluster for a mount, provisioning one when needed.

use std::fmt::Display;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::backend::{ClusterApi, ClusterApiError};

use super::{
    ClusterAttributes, ClusterDefaults, ClusterInfo, ClusterRequest, ClusterState,
    CredentialRequirement, WaitPolicy,
};

const CLUSTER_NAME_PREFIX: &str = "lakemount";

/// What the caller needs from a cluster.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ClusterTarget {
    /// Cluster the caller insists on, if any.
    pub cluster_id: Option<String>,
    /// Credential attributes the cluster must carry.
    pub requirement: CredentialRequirement,
}

impl ClusterTarget {
    /// Targets a specific cluster.
    #[must_use]
    pub fn explicit(cluster_id: impl Into<String>, requirement: CredentialRequirement) -> Self {
        Self {
            cluster_id: Some(cluster_id.into()),
            requirement,
        }
    }

    /// Targets any cluster that satisfies `requirement`.
    #[must_use]
    pub const fn any(requirement: CredentialRequirement) -> Self {
        Self {
            cluster_id: None,
            requirement,
        }
    }

    /// Deterministic name used when the resolver provisions a cluster.
    #[must_use]
    pub fn provisioned_cluster_name(&self) -> String {
        self.requirement.instance_profile().map_or_else(
            || format!("{CLUSTER_NAME_PREFIX}-default"),
            |arn| format!("{CLUSTER_NAME_PREFIX}-{}", arn.profile_name()),
        )
    }
}

/// Errors raised while resolving a cluster.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ResolveError {
    /// The named cluster is missing, not ready, or lacks credentials.
    #[error("cluster {cluster_id} is unavailable: {reason}")]
    Unavailable {
        /// Cluster identifier.
        cluster_id: String,
        /// Why the cluster cannot be used.
        reason: String,
    },
    /// Provisioning a new cluster failed or timed out.
    #[error("failed to provision cluster: {message}")]
    ProvisioningFailed {
        /// Failure description, including any teardown note.
        message: String,
    },
}

/// Resolves [`ClusterTarget`]s to ready clusters.
#[derive(Debug)]
pub struct ClusterResolver<C> {
    api: C,
    defaults: ClusterDefaults,
    wait_policy: WaitPolicy,
}

impl<C: ClusterApi> ClusterResolver<C> {
    /// Creates a resolver using the default wait policy.
    #[must_use]
    pub fn new(api: C, defaults: ClusterDefaults) -> Self {
        Self {
            api,
            defaults,
            wait_policy: WaitPolicy::default(),
        }
    }

    /// Overrides the polling bounds used while provisioning.
    #[must_use]
    pub const fn with_wait_policy(mut self, policy: WaitPolicy) -> Self {
        self.wait_policy = policy;
        self
    }

    /// Returns a ready cluster satisfying `target`.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::Unavailable`] when an explicit cluster cannot be
    /// used, or [`ResolveError::ProvisioningFailed`] when a new or restarted
    /// cluster does not become ready.
    pub async fn resolve(&self, target: &ClusterTarget) -> Result<ClusterInfo, ResolveError> {
        if let Some(cluster_id) = target.cluster_id.as_deref() {
            return self.resolve_explicit(cluster_id, &target.requirement).await;
        }

        if let Some(existing) = self.find_reusable(target).await? {
            if !existing.state.is_ready() {
                return self.restart(&existing.cluster_id).await;
            }
            info!(
                cluster_id = %existing.cluster_id,
                cluster_name = %existing.cluster_name,
                "reusing running cluster"
            );
            return Ok(existing);
        }

        self.provision(target).await
    }

    async fn resolve_explicit(
        &self,
        cluster_id: &str,
        requirement: &CredentialRequirement,
    ) -> Result<ClusterInfo, ResolveError> {
        let info = self
            .api
            .get(cluster_id)
            .await
            .map_err(|err| unavailable(cluster_id, err))?;

        if !info.state.is_ready() {
            return Err(unavailable(
                cluster_id,
                format!("cluster is {}", info.state),
            ));
        }
        if !requirement.is_satisfied_by(&info.attributes) {
            return Err(unavailable(
                cluster_id,
                format!("cluster must have {requirement} attached"),
            ));
        }
        debug!(cluster_id, "using explicit cluster");
        Ok(info)
    }

    async fn find_reusable(
        &self,
        target: &ClusterTarget,
    ) -> Result<Option<ClusterInfo>, ResolveError> {
        let clusters = self
            .api
            .list()
            .await
            .map_err(|err| ResolveError::ProvisioningFailed {
                message: err.to_string(),
            })?;
        let preferred_name = target.provisioned_cluster_name();
        let (mut running, stopped): (Vec<ClusterInfo>, Vec<ClusterInfo>) = clusters
            .into_iter()
            .filter(|cluster| target.requirement.is_satisfied_by(&cluster.attributes))
            .partition(|cluster| cluster.state.is_ready());
        let position = running
            .iter()
            .position(|cluster| cluster.cluster_name == preferred_name);
        if let Some(index) = position {
            return Ok(Some(running.swap_remove(index)));
        }
        if !running.is_empty() {
            return Ok(running.into_iter().next());
        }
        // Only clusters this crate provisioned are restarted.
        Ok(stopped.into_iter().find(|cluster| {
            cluster.state == ClusterState::Terminated && cluster.cluster_name == preferred_name
        }))
    }

    async fn restart(&self, cluster_id: &str) -> Result<ClusterInfo, ResolveError> {
        info!(cluster_id, "restarting terminated mounting cluster");
        self.api
            .start(cluster_id)
            .await
            .map_err(|err| ResolveError::ProvisioningFailed {
                message: err.to_string(),
            })?;
        let info = self
            .api
            .wait_until_running(cluster_id, &self.wait_policy)
            .await
            .map_err(|err| ResolveError::ProvisioningFailed {
                message: err.to_string(),
            })?;
        info!(cluster_id, "mounting cluster is running");
        Ok(info)
    }

    async fn provision(&self, target: &ClusterTarget) -> Result<ClusterInfo, ResolveError> {
        let attributes = match &target.requirement {
            CredentialRequirement::Unrestricted => ClusterAttributes::default(),
            CredentialRequirement::InstanceProfile(arn) => {
                ClusterAttributes::with_instance_profile(arn)
            }
            CredentialRequirement::AnyInstanceProfile => {
                return Err(ResolveError::ProvisioningFailed {
                    message: String::from(
                        "no running cluster has an instance profile and none was named",
                    ),
                });
            }
        };
        let request = ClusterRequest::builder()
            .defaults(&self.defaults)
            .cluster_name(target.provisioned_cluster_name())
            .attributes(attributes)
            .build()
            .map_err(|err| ResolveError::ProvisioningFailed {
                message: err.to_string(),
            })?;

        info!(cluster_name = %request.cluster_name, "provisioning mounting cluster");
        let cluster_id =
            self.api
                .create(&request)
                .await
                .map_err(|err| ResolveError::ProvisioningFailed {
                    message: err.to_string(),
                })?;

        match self
            .api
            .wait_until_running(&cluster_id, &self.wait_policy)
            .await
        {
            Ok(info) => {
                info!(cluster_id = %info.cluster_id, "mounting cluster is running");
                Ok(info)
            }
            Err(err) => {
                let message = self.delete_with_note(&cluster_id, &err).await;
                Err(ResolveError::ProvisioningFailed { message })
            }
        }
    }

    async fn delete_with_note<E: Display>(&self, cluster_id: &str, err: &E) -> String {
        let teardown_error = self.api.permanent_delete(cluster_id).await.err();
        if let Some(teardown) = teardown_error.as_ref() {
            warn!(cluster_id, error = %teardown, "failed to delete half-provisioned cluster");
        }
        append_teardown_note(err.to_string(), teardown_error.as_ref())
    }
}

fn unavailable(cluster_id: &str, reason: impl Display) -> ResolveError {
    ResolveError::Unavailable {
        cluster_id: cluster_id.to_owned(),
        reason: reason.to_string(),
    }
}

fn append_teardown_note(message: String, teardown_error: Option<&ClusterApiError>) -> String {
    let Some(teardown) = teardown_error else {
        return message;
    };
    format!("{message} (teardown also failed: {teardown})")
}
