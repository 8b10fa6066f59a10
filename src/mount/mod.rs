//! Mounts that live inside a remote cluster's filesystem namespace.
//!
//! Nothing about a mount is cached locally. [`MountPoint`] derives the state
//! on every call by running a generated script through a
//! [`CommandExecutor`] and classifying the raw result.

use std::fmt;

use tracing::{debug, info};

use crate::command::CommandExecutor;

mod declaration;
mod error;
pub mod script;
mod spec;

pub use declaration::{
    AdlsGen1Declaration, AdlsGen2Declaration, AzureBlobDeclaration, BlobAuthType,
    DeclarationError, GcsDeclaration, MountDeclaration, S3Declaration, load_declaration,
};
pub use error::{MountError, ValidationError};
pub use spec::{
    AdlsGen1Source, AdlsGen2Source, AzureBlobSource, BlobAuth, MountDescription, MountSource,
    MountSpec, S3Credentials, ServicePrincipal,
};

/// Directory under which every mount is placed.
pub const MOUNT_PREFIX: &str = "/mnt/";

const NOT_MOUNTED_MARKER: &str = "not mounted";

/// Validated mount name.
///
/// Names are restricted to ASCII letters, digits, `_`, `-` and `.`, so every
/// name maps to exactly one canonical path directly below [`MOUNT_PREFIX`].
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct MountName(String);

impl MountName {
    /// Validates `value` as a mount name.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidMountName`] when the name is empty,
    /// `.` or `..`, or contains other characters.
    pub fn new(value: &str) -> Result<Self, ValidationError> {
        let valid = !value.is_empty()
            && value != "."
            && value != ".."
            && value
                .chars()
                .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '_' | '-' | '.'));
        if !valid {
            return Err(ValidationError::InvalidMountName {
                value: value.to_owned(),
            });
        }
        Ok(Self(value.to_owned()))
    }

    /// Returns the bare name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Canonical path of the mount inside the cluster.
    #[must_use]
    pub fn mount_point(&self) -> String {
        format!("{MOUNT_PREFIX}{}", self.0)
    }
}

impl fmt::Display for MountName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Result of inspecting a mount.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ReadOutcome {
    /// A mount exists at the canonical path.
    Mounted {
        /// Source URI reported by the cluster.
        source: String,
    },
    /// Nothing is mounted at the canonical path.
    NotFound,
}

/// A named mount bound to one cluster.
#[derive(Debug)]
pub struct MountPoint<'a, E: ?Sized> {
    executor: &'a E,
    cluster_id: String,
    name: MountName,
}

impl<'a, E: CommandExecutor + ?Sized> MountPoint<'a, E> {
    /// Binds `name` to `cluster_id` using `executor` for remote calls.
    #[must_use]
    pub fn new(executor: &'a E, cluster_id: impl Into<String>, name: MountName) -> Self {
        Self {
            executor,
            cluster_id: cluster_id.into(),
            name,
        }
    }

    /// Cluster the mount lives on.
    #[must_use]
    pub fn cluster_id(&self) -> &str {
        &self.cluster_id
    }

    /// Canonical path of the mount.
    #[must_use]
    pub fn path(&self) -> String {
        self.name.mount_point()
    }

    /// Mounts `spec` at the canonical path and returns the effective source.
    ///
    /// # Errors
    ///
    /// Returns [`MountError::Validation`] when the spec is invalid and
    /// [`MountError::CreateFailed`] with the remote message when the script
    /// fails or reports nothing.
    pub async fn create(&self, spec: &MountSpec) -> Result<String, MountError> {
        let description = spec.describe()?;
        let path = self.path();
        let script = script::create_script(&path, &description);
        debug!(cluster_id = %self.cluster_id, mount_point = %path, "creating mount");
        let output = self
            .executor
            .execute(&self.cluster_id, &script)
            .await
            .map_err(|err| MountError::CreateFailed {
                message: err.message,
            })?;
        let source = output.trim();
        if source.is_empty() {
            return Err(MountError::CreateFailed {
                message: format!("mount script for {path} returned no source"),
            });
        }
        info!(cluster_id = %self.cluster_id, mount_point = %path, source, "mount created");
        Ok(source.to_owned())
    }

    /// Reports what is mounted at the canonical path.
    ///
    /// # Errors
    ///
    /// Returns [`MountError::ReadFailed`] when the script fails for a reason
    /// other than the mount being absent.
    pub async fn read(&self) -> Result<ReadOutcome, MountError> {
        let path = self.path();
        let script = script::read_script(&path);
        match self.executor.execute(&self.cluster_id, &script).await {
            Ok(output) => {
                let source = output.trim();
                if source.is_empty() {
                    debug!(mount_point = %path, "read returned no output; treating as absent");
                    return Ok(ReadOutcome::NotFound);
                }
                Ok(ReadOutcome::Mounted {
                    source: source.to_owned(),
                })
            }
            Err(err) if err.message.contains(script::MOUNT_NOT_FOUND) => {
                debug!(mount_point = %path, "mount not found");
                Ok(ReadOutcome::NotFound)
            }
            Err(err) => Err(MountError::ReadFailed {
                message: err.message,
            }),
        }
    }

    /// Unmounts the canonical path; absent mounts are not an error.
    ///
    /// # Errors
    ///
    /// Returns [`MountError::DeleteFailed`] when the script fails for a reason
    /// other than the mount being absent.
    pub async fn delete(&self) -> Result<(), MountError> {
        let path = self.path();
        let script = script::delete_script(&path);
        match self.executor.execute(&self.cluster_id, &script).await {
            Ok(_) => {
                info!(cluster_id = %self.cluster_id, mount_point = %path, "mount deleted");
                Ok(())
            }
            Err(err) if err.message.contains(NOT_MOUNTED_MARKER) => {
                debug!(mount_point = %path, "mount already absent");
                Ok(())
            }
            Err(err) => Err(MountError::DeleteFailed {
                message: err.message,
            }),
        }
    }
}
