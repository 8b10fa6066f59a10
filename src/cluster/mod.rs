//! Cluster model and the resolver that finds or provisions mount targets.
//!
//! A mount script only means something inside a live cluster that carries the
//! right credentials, so every mount operation first asks the
//! [`ClusterResolver`] for such a cluster.

use std::collections::BTreeMap;
use std::fmt;

use thiserror::Error;

use crate::credentials::InstanceProfileArn;

mod resolver;
mod wait;

pub use resolver::{ClusterResolver, ClusterTarget, ResolveError};
pub use wait::WaitPolicy;
pub(crate) use wait::poll_until_running;

/// Spark configuration applied to provisioned single-node clusters.
const SINGLE_NODE_SPARK_CONF: [(&str, &str); 2] = [
    ("spark.databricks.cluster.profile", "singleNode"),
    ("spark.master", "local[*]"),
];

/// Lifecycle state reported for a cluster.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ClusterState {
    /// The cluster is being created or started.
    Pending,
    /// The cluster can run commands.
    Running,
    /// The cluster is restarting and will come back.
    Restarting,
    /// The cluster is running while its worker count changes.
    Resizing,
    /// The cluster is shutting down.
    Terminating,
    /// The cluster is stopped.
    Terminated,
    /// The cluster failed and will not recover by itself.
    Error,
    /// The provider reported a state this crate does not know.
    Unknown,
}

impl ClusterState {
    /// Maps the provider's state label onto a [`ClusterState`].
    #[must_use]
    pub fn from_api(value: &str) -> Self {
        match value.trim().to_ascii_uppercase().as_str() {
            "PENDING" => Self::Pending,
            "RUNNING" => Self::Running,
            "RESTARTING" => Self::Restarting,
            "RESIZING" => Self::Resizing,
            "TERMINATING" => Self::Terminating,
            "TERMINATED" => Self::Terminated,
            "ERROR" => Self::Error,
            _ => Self::Unknown,
        }
    }

    /// Returns `true` when commands can be executed on the cluster.
    #[must_use]
    pub const fn is_ready(self) -> bool {
        matches!(self, Self::Running | Self::Resizing)
    }

    /// Returns `true` when the cluster will never become ready without an
    /// explicit restart.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Terminating | Self::Terminated | Self::Error)
    }

    /// Returns the provider's label for the state.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Running => "RUNNING",
            Self::Restarting => "RESTARTING",
            Self::Resizing => "RESIZING",
            Self::Terminating => "TERMINATING",
            Self::Terminated => "TERMINATED",
            Self::Error => "ERROR",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for ClusterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Credential attributes attached to a cluster.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ClusterAttributes {
    /// Instance profile the cluster's nodes assume, if any.
    pub instance_profile_arn: Option<String>,
}

impl ClusterAttributes {
    /// Attributes carrying the given instance profile.
    #[must_use]
    pub fn with_instance_profile(arn: &InstanceProfileArn) -> Self {
        Self {
            instance_profile_arn: Some(arn.as_str().to_owned()),
        }
    }
}

/// Observed identity and state of a cluster.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ClusterInfo {
    /// Provider specific identifier; the durable linkage callers persist.
    pub cluster_id: String,
    /// Human readable cluster name.
    pub cluster_name: String,
    /// Current lifecycle state.
    pub state: ClusterState,
    /// Provider explanation for the current state, possibly empty.
    pub state_message: String,
    /// Credential attributes attached to the cluster.
    pub attributes: ClusterAttributes,
}

/// Credential attributes a cluster must carry to host a mount.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub enum CredentialRequirement {
    /// Any cluster will do; credentials travel inside the mount config.
    #[default]
    Unrestricted,
    /// The cluster must carry some instance profile.
    AnyInstanceProfile,
    /// The cluster must carry exactly this instance profile.
    InstanceProfile(InstanceProfileArn),
}

impl CredentialRequirement {
    /// Returns `true` when `attributes` satisfy the requirement.
    #[must_use]
    pub fn is_satisfied_by(&self, attributes: &ClusterAttributes) -> bool {
        let attached = attributes
            .instance_profile_arn
            .as_deref()
            .map(str::trim)
            .filter(|arn| !arn.is_empty());
        match self {
            Self::Unrestricted => true,
            Self::AnyInstanceProfile => attached.is_some(),
            Self::InstanceProfile(required) => attached == Some(required.as_str()),
        }
    }

    /// Instance profile a provisioned cluster must be created with.
    #[must_use]
    pub const fn instance_profile(&self) -> Option<&InstanceProfileArn> {
        match self {
            Self::InstanceProfile(arn) => Some(arn),
            Self::Unrestricted | Self::AnyInstanceProfile => None,
        }
    }
}

impl fmt::Display for CredentialRequirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unrestricted => f.write_str("no credential attributes"),
            Self::AnyInstanceProfile => f.write_str("an instance profile"),
            Self::InstanceProfile(arn) => write!(f, "instance profile {arn}"),
        }
    }
}

/// Defaults used when the resolver has to provision a cluster.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ClusterDefaults {
    /// Runtime version for provisioned clusters.
    pub spark_version: String,
    /// Node type for the single driver node.
    pub node_type_id: String,
    /// Idle minutes before the provider terminates the cluster.
    pub autotermination_minutes: u32,
}

/// Errors raised while building a [`ClusterRequest`].
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ClusterRequestError {
    /// Raised when a required field is empty.
    #[error("missing or empty field: {0}")]
    Validation(String),
}

/// Parameters required to provision a cluster.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ClusterRequest {
    /// Deterministic cluster name, reused across runs.
    pub cluster_name: String,
    /// Runtime version.
    pub spark_version: String,
    /// Node type identifier.
    pub node_type_id: String,
    /// Worker count; zero for single-node clusters.
    pub num_workers: u32,
    /// Idle minutes before automatic termination.
    pub autotermination_minutes: u32,
    /// Credential attributes to attach.
    pub attributes: ClusterAttributes,
    /// Spark configuration entries.
    pub spark_conf: BTreeMap<String, String>,
    /// Tags attached to the cluster's cloud resources.
    pub custom_tags: BTreeMap<String, String>,
}

impl ClusterRequest {
    /// Starts a builder for a [`ClusterRequest`].
    #[must_use]
    pub fn builder() -> ClusterRequestBuilder {
        ClusterRequestBuilder::new()
    }

    /// Validates the request, returning the first empty required field.
    ///
    /// # Errors
    ///
    /// Returns [`ClusterRequestError::Validation`] when a string field is empty.
    pub fn validate(&self) -> Result<(), ClusterRequestError> {
        if self.cluster_name.is_empty() {
            return Err(ClusterRequestError::Validation("cluster_name".to_owned()));
        }
        if self.spark_version.is_empty() {
            return Err(ClusterRequestError::Validation("spark_version".to_owned()));
        }
        if self.node_type_id.is_empty() {
            return Err(ClusterRequestError::Validation("node_type_id".to_owned()));
        }
        Ok(())
    }
}

/// Builder for [`ClusterRequest`] producing single-node mounting clusters.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ClusterRequestBuilder {
    cluster_name: String,
    spark_version: String,
    node_type_id: String,
    autotermination_minutes: u32,
    attributes: ClusterAttributes,
}

impl ClusterRequestBuilder {
    /// Creates an empty builder; fields must be populated before build.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds runtime version, node type, and autotermination from defaults.
    #[must_use]
    pub fn defaults(mut self, defaults: &ClusterDefaults) -> Self {
        self.spark_version.clone_from(&defaults.spark_version);
        self.node_type_id.clone_from(&defaults.node_type_id);
        self.autotermination_minutes = defaults.autotermination_minutes;
        self
    }

    /// Sets the cluster name.
    #[must_use]
    pub fn cluster_name(mut self, value: impl Into<String>) -> Self {
        self.cluster_name = value.into();
        self
    }

    /// Sets the credential attributes.
    #[must_use]
    pub fn attributes(mut self, value: ClusterAttributes) -> Self {
        self.attributes = value;
        self
    }

    /// Builds and validates the [`ClusterRequest`], trimming string inputs.
    ///
    /// # Errors
    ///
    /// Returns [`ClusterRequestError::Validation`] when a required field is
    /// empty.
    pub fn build(self) -> Result<ClusterRequest, ClusterRequestError> {
        let spark_conf = SINGLE_NODE_SPARK_CONF
            .iter()
            .map(|(key, value)| ((*key).to_owned(), (*value).to_owned()))
            .collect();
        let custom_tags = BTreeMap::from([
            (String::from("ResourceClass"), String::from("SingleNode")),
            (String::from("ManagedBy"), String::from("lakemount")),
        ]);
        let request = ClusterRequest {
            cluster_name: self.cluster_name.trim().to_owned(),
            spark_version: self.spark_version.trim().to_owned(),
            node_type_id: self.node_type_id.trim().to_owned(),
            num_workers: 0,
            autotermination_minutes: self.autotermination_minutes,
            attributes: self.attributes,
            spark_conf,
            custom_tags,
        };
        request.validate()?;
        Ok(request)
    }
}
