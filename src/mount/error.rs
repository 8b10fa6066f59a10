//! Error types for mount validation and mount operations.

use thiserror::Error;

use crate::cluster::ResolveError;

/// Raised when a mount specification or name is rejected before any remote
/// call is made.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ValidationError {
    /// Neither a cluster nor a credential mechanism was supplied.
    #[error("Either cluster_id or instance_profile must be specified")]
    MissingCredentialMechanism,
    /// A required field is empty.
    #[error("{field} must not be empty")]
    EmptyField {
        /// Name of the empty field.
        field: &'static str,
    },
    /// A field contains whitespace, quotes, or other disallowed characters.
    #[error("{field} contains invalid characters: {value:?}")]
    InvalidCharacters {
        /// Name of the offending field.
        field: &'static str,
        /// Rejected value.
        value: String,
    },
    /// The value is not shaped like an ARN.
    #[error("arn: {reason}")]
    InvalidArn {
        /// Which structural check failed.
        reason: String,
    },
    /// The ARN names something other than an IAM instance profile.
    #[error("{value} is not an instance profile ARN")]
    NotInstanceProfile {
        /// Rejected ARN.
        value: String,
    },
    /// A directory does not start with `/`.
    #[error("directory {value:?} must start with '/'")]
    InvalidDirectory {
        /// Rejected directory.
        value: String,
    },
    /// The mount name cannot be mapped to a canonical path.
    #[error("invalid mount name {value:?}: use letters, digits, '_', '-' or '.'")]
    InvalidMountName {
        /// Rejected name.
        value: String,
    },
    /// Both an instance profile and access keys were supplied.
    #[error("instance_profile and access keys are mutually exclusive")]
    ConflictingCredentials,
    /// Only part of an access key pair was supplied.
    #[error("access_key, secret_scope and secret_key must be specified together")]
    IncompleteAccessKeys,
    /// A secret reference cannot be rendered as a placeholder.
    #[error("invalid secret reference {scope:?}/{key:?}")]
    InvalidSecretRef {
        /// Secret scope.
        scope: String,
        /// Secret key.
        key: String,
    },
    /// An extra configuration entry would override a generated key.
    #[error("extra config key {key} conflicts with a generated key")]
    ConflictingConfigKey {
        /// Duplicated key.
        key: String,
    },
    /// The ADLS Gen1 configuration prefix is not supported.
    #[error("spark_conf_prefix must be either 'fs.adl' or 'dfs.adls', got {value:?}")]
    InvalidConfPrefix {
        /// Rejected prefix.
        value: String,
    },
    /// No storage source was declared.
    #[error("exactly one storage source must be declared, found none")]
    MissingSource,
    /// More than one storage source was declared.
    #[error("exactly one storage source must be declared, found {count}")]
    MultipleSources {
        /// Number of declared sources.
        count: usize,
    },
}

/// Errors returned by mount operations.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum MountError {
    /// The request was rejected before any remote call.
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// The requested cluster cannot host the mount.
    #[error("cluster {cluster_id} is unavailable: {reason}")]
    ClusterUnavailable {
        /// Cluster identifier.
        cluster_id: String,
        /// Why the cluster cannot be used.
        reason: String,
    },
    /// No cluster could be provisioned for the mount.
    #[error("failed to provision a mounting cluster: {message}")]
    ClusterProvisioningFailed {
        /// Failure description.
        message: String,
    },
    /// The shared credential object could not be ensured.
    #[error("shared resource {identity} is unavailable")]
    SharedResourceUnavailable {
        /// Identity of the shared resource.
        identity: String,
    },
    /// The create script failed remotely.
    #[error("failed to create mount: {message}")]
    CreateFailed {
        /// Raw remote error text.
        message: String,
    },
    /// The read script failed for a reason other than an absent mount.
    #[error("failed to read mount: {message}")]
    ReadFailed {
        /// Raw remote error text.
        message: String,
    },
    /// The delete script failed for a reason other than an absent mount.
    #[error("failed to delete mount: {message}")]
    DeleteFailed {
        /// Raw remote error text.
        message: String,
    },
}

impl From<ResolveError> for MountError {
    fn from(err: ResolveError) -> Self {
        match err {
            ResolveError::Unavailable { cluster_id, reason } => {
                Self::ClusterUnavailable { cluster_id, reason }
            }
            ResolveError::ProvisioningFailed { message } => {
                Self::ClusterProvisioningFailed { message }
            }
        }
    }
}
