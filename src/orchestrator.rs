//! End-to-end mount workflow.
//!
//! Every operation validates the request, makes sure any shared credential the
//! mount depends on has been registered exactly once, resolves a cluster, and
//! then delegates to [`MountPoint`].

use std::sync::Arc;

use tracing::{info, instrument, warn};

use crate::backend::{ClusterApi, IdentityError, InstanceProfileApi};
use crate::cluster::{ClusterResolver, ClusterTarget};
use crate::command::CommandExecutor;
use crate::credentials::InstanceProfileArn;
use crate::guard::SharedResourceGuard;
use crate::mount::{MountError, MountName, MountPoint, MountSpec, ReadOutcome, ValidationError};

/// A mount the caller wants to manage.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MountRequest {
    /// Mount name.
    pub name: MountName,
    /// Cluster to use instead of resolving one.
    pub cluster_id: Option<String>,
    /// Storage source and configuration.
    pub spec: MountSpec,
}

impl MountRequest {
    /// Creates a request that lets the resolver pick a cluster.
    #[must_use]
    pub const fn new(name: MountName, spec: MountSpec) -> Self {
        Self {
            name,
            cluster_id: None,
            spec,
        }
    }

    /// Pins the request to `cluster_id`.
    #[must_use]
    pub fn with_cluster_id(mut self, cluster_id: impl Into<String>) -> Self {
        self.cluster_id = Some(cluster_id.into());
        self
    }

    /// Checks the request without contacting any collaborator.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::MissingCredentialMechanism`] when the mount
    /// relies on cluster credentials but no cluster is named, and any error
    /// raised by [`MountSpec::describe`].
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.cluster_id.is_none() && self.spec.needs_cluster_credentials() {
            return Err(ValidationError::MissingCredentialMechanism);
        }
        self.spec.describe().map(|_| ())
    }

    /// Cluster selection derived from the request.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError`] when the declared instance profile is
    /// malformed.
    pub fn cluster_target(&self) -> Result<ClusterTarget, ValidationError> {
        Ok(ClusterTarget {
            cluster_id: self.cluster_id.clone(),
            requirement: self.spec.credential_requirement()?,
        })
    }
}

/// Outcome of a successful create, suitable for persisting.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MountRecord {
    /// Mount name.
    pub name: MountName,
    /// Cluster the mount was created on.
    pub cluster_id: String,
    /// Effective source URI reported by the cluster.
    pub source: String,
}

impl MountRecord {
    /// Canonical path of the mount.
    #[must_use]
    pub fn mount_point(&self) -> String {
        self.name.mount_point()
    }
}

/// Coordinates credential registration, cluster resolution, and mount scripts.
#[derive(Debug)]
pub struct MountOrchestrator<C, E, I> {
    resolver: ClusterResolver<C>,
    executor: E,
    profiles: I,
    guard: Arc<SharedResourceGuard>,
    register_instance_profiles: bool,
}

impl<C, E, I> MountOrchestrator<C, E, I>
where
    C: ClusterApi,
    E: CommandExecutor,
    I: InstanceProfileApi,
{
    /// Creates an orchestrator that shares the process-wide guard and
    /// registers instance profiles before use.
    #[must_use]
    pub fn new(resolver: ClusterResolver<C>, executor: E, profiles: I) -> Self {
        Self {
            resolver,
            executor,
            profiles,
            guard: SharedResourceGuard::global(),
            register_instance_profiles: true,
        }
    }

    /// Uses `guard` instead of the process-wide guard.
    #[must_use]
    pub fn with_guard(mut self, guard: Arc<SharedResourceGuard>) -> Self {
        self.guard = guard;
        self
    }

    /// Enables or disables instance profile registration.
    #[must_use]
    pub const fn with_instance_profile_registration(mut self, enabled: bool) -> Self {
        self.register_instance_profiles = enabled;
        self
    }

    /// Creates the mount and returns what should be persisted.
    ///
    /// # Errors
    ///
    /// Returns [`MountError`] when validation, credential registration,
    /// cluster resolution, or the remote script fails.
    #[instrument(skip_all, fields(mount = %request.name))]
    pub async fn create(&self, request: &MountRequest) -> Result<MountRecord, MountError> {
        let mount = self.prepare(request).await?;
        let source = mount.create(&request.spec).await?;
        info!(cluster_id = mount.cluster_id(), %source, "mount ready");
        Ok(MountRecord {
            name: request.name.clone(),
            cluster_id: mount.cluster_id().to_owned(),
            source,
        })
    }

    /// Reports whether the mount exists.
    ///
    /// # Errors
    ///
    /// Returns [`MountError`] when validation, credential registration,
    /// cluster resolution, or the remote script fails.
    #[instrument(skip_all, fields(mount = %request.name))]
    pub async fn read(&self, request: &MountRequest) -> Result<ReadOutcome, MountError> {
        let mount = self.prepare(request).await?;
        mount.read().await
    }

    /// Removes the mount; removing an absent mount succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`MountError`] when validation, credential registration,
    /// cluster resolution, or the remote script fails.
    #[instrument(skip_all, fields(mount = %request.name))]
    pub async fn delete(&self, request: &MountRequest) -> Result<(), MountError> {
        let mount = self.prepare(request).await?;
        mount.delete().await
    }

    /// Removes a registered instance profile from the workspace.
    ///
    /// The guard keeps its recorded outcome, so later mounts in this process
    /// skip registering `arn` again.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError`] when the workspace rejects the removal.
    #[instrument(skip_all, fields(arn = %arn))]
    pub async fn unregister_instance_profile(
        &self,
        arn: &InstanceProfileArn,
    ) -> Result<(), IdentityError> {
        self.profiles.delete(arn).await?;
        info!("instance profile unregistered");
        Ok(())
    }

    async fn prepare(&self, request: &MountRequest) -> Result<MountPoint<'_, E>, MountError> {
        request.validate()?;
        self.ensure_shared_credential(&request.spec).await?;
        let cluster = self.resolver.resolve(&request.cluster_target()?).await?;
        Ok(MountPoint::new(
            &self.executor,
            cluster.cluster_id,
            request.name.clone(),
        ))
    }

    async fn ensure_shared_credential(&self, spec: &MountSpec) -> Result<(), MountError> {
        if !self.register_instance_profiles {
            return Ok(());
        }
        let Some(arn) = spec.instance_profile()? else {
            return Ok(());
        };
        let registered = self
            .guard
            .synchronized(arn.as_str(), || async {
                match self.profiles.create(&arn).await {
                    Ok(()) => true,
                    Err(err) => {
                        warn!(error = %err, "instance profile registration failed");
                        false
                    }
                }
            })
            .await;
        if registered {
            Ok(())
        } else {
            Err(MountError::SharedResourceUnavailable {
                identity: arn.as_str().to_owned(),
            })
        }
    }
}
