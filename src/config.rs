//! Configuration loading via `ortho-config`.

use std::time::Duration;

use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;

use crate::cluster::{ClusterDefaults, WaitPolicy};

/// Default runtime version for provisioned mounting clusters.
pub const DEFAULT_SPARK_VERSION: &str = "15.4.x-scala2.12";

/// Default node type for provisioned mounting clusters.
pub const DEFAULT_NODE_TYPE: &str = "i3.xlarge";

/// Workspace connection and provisioning settings derived from configuration
/// files, environment variables, and CLI flags.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "LAKEMOUNT",
    discovery(
        app_name = "lakemount",
        env_var = "LAKEMOUNT_CONFIG_PATH",
        config_file_name = "lakemount.toml",
        dotfile_name = ".lakemount.toml",
        project_file_name = "lakemount.toml"
    )
)]
pub struct WorkspaceConfig {
    /// Workspace URL, for example `https://example.cloud.databricks.com`.
    pub host: String,
    /// Personal access token used as a bearer credential.
    pub token: String,
    /// Runtime version for clusters the resolver provisions.
    #[ortho_config(default = DEFAULT_SPARK_VERSION.to_owned())]
    pub spark_version: String,
    /// Node type for clusters the resolver provisions.
    #[ortho_config(default = DEFAULT_NODE_TYPE.to_owned())]
    pub node_type_id: String,
    /// Idle minutes before a provisioned cluster terminates itself.
    #[ortho_config(default = 10)]
    pub autotermination_minutes: u32,
    /// Seconds to wait for a provisioned cluster to start.
    #[ortho_config(default = 1200)]
    pub provision_timeout_secs: u64,
    /// Initial delay between cluster state polls.
    #[ortho_config(default = 10)]
    pub poll_interval_secs: u64,
    /// Upper bound for the backoff between cluster state polls.
    #[ortho_config(default = 60)]
    pub max_poll_interval_secs: u64,
    /// Seconds allowed for a single remote command.
    #[ortho_config(default = 600)]
    pub command_timeout_secs: u64,
    /// Register instance profiles with the workspace before mounting.
    #[ortho_config(default = false)]
    pub register_instance_profiles: bool,
}

/// Metadata for a configuration field, used to generate actionable error messages.
struct FieldMetadata {
    description: &'static str,
    env_var: &'static str,
    toml_key: &'static str,
}

impl FieldMetadata {
    const fn new(description: &'static str, env_var: &'static str, toml_key: &'static str) -> Self {
        Self {
            description,
            env_var,
            toml_key,
        }
    }

    fn missing(&self) -> ConfigError {
        ConfigError::MissingField(format!(
            "missing {}: set {} or add {} to lakemount.toml",
            self.description, self.env_var, self.toml_key
        ))
    }

    fn invalid(&self, reason: &str) -> ConfigError {
        ConfigError::InvalidField(format!(
            "invalid {} ({} / {}): {reason}",
            self.description, self.env_var, self.toml_key
        ))
    }
}

const HOST: FieldMetadata = FieldMetadata::new("workspace URL", "LAKEMOUNT_HOST", "host");
const TOKEN: FieldMetadata = FieldMetadata::new("access token", "LAKEMOUNT_TOKEN", "token");
const SPARK_VERSION: FieldMetadata =
    FieldMetadata::new("runtime version", "LAKEMOUNT_SPARK_VERSION", "spark_version");
const NODE_TYPE: FieldMetadata =
    FieldMetadata::new("node type", "LAKEMOUNT_NODE_TYPE_ID", "node_type_id");
const POLL_INTERVAL: FieldMetadata = FieldMetadata::new(
    "poll interval",
    "LAKEMOUNT_POLL_INTERVAL_SECS",
    "poll_interval_secs",
);
const MAX_POLL_INTERVAL: FieldMetadata = FieldMetadata::new(
    "maximum poll interval",
    "LAKEMOUNT_MAX_POLL_INTERVAL_SECS",
    "max_poll_interval_secs",
);
const PROVISION_TIMEOUT: FieldMetadata = FieldMetadata::new(
    "provisioning timeout",
    "LAKEMOUNT_PROVISION_TIMEOUT_SECS",
    "provision_timeout_secs",
);
const COMMAND_TIMEOUT: FieldMetadata = FieldMetadata::new(
    "command timeout",
    "LAKEMOUNT_COMMAND_TIMEOUT_SECS",
    "command_timeout_secs",
);

impl WorkspaceConfig {
    /// Loads configuration without attempting to parse CLI arguments. Values
    /// still merge defaults, configuration files, and environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([std::ffi::OsString::from("lakemount")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Performs semantic validation. Error messages include guidance on how
    /// to provide missing values via environment variables or configuration
    /// files.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] when a required field is empty
    /// and [`ConfigError::InvalidField`] when a value is out of range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (value, metadata) in [
            (&self.host, &HOST),
            (&self.token, &TOKEN),
            (&self.spark_version, &SPARK_VERSION),
            (&self.node_type_id, &NODE_TYPE),
        ] {
            if value.trim().is_empty() {
                return Err(metadata.missing());
            }
        }
        let host = self.host.trim();
        if !(host.starts_with("https://") || host.starts_with("http://")) {
            return Err(HOST.invalid("expected an http:// or https:// URL"));
        }
        for (value, metadata) in [
            (self.poll_interval_secs, &POLL_INTERVAL),
            (self.provision_timeout_secs, &PROVISION_TIMEOUT),
            (self.command_timeout_secs, &COMMAND_TIMEOUT),
        ] {
            if value == 0 {
                return Err(metadata.invalid("must be greater than zero"));
            }
        }
        if self.max_poll_interval_secs < self.poll_interval_secs {
            return Err(MAX_POLL_INTERVAL.invalid("must not be smaller than poll_interval_secs"));
        }
        Ok(())
    }

    /// Workspace URL without a trailing slash.
    #[must_use]
    pub fn base_url(&self) -> &str {
        self.host.trim().trim_end_matches('/')
    }

    /// Cluster defaults used when provisioning.
    #[must_use]
    pub fn cluster_defaults(&self) -> ClusterDefaults {
        ClusterDefaults {
            spark_version: self.spark_version.trim().to_owned(),
            node_type_id: self.node_type_id.trim().to_owned(),
            autotermination_minutes: self.autotermination_minutes,
        }
    }

    /// Backoff bounds for cluster state polling.
    #[must_use]
    pub fn wait_policy(&self) -> WaitPolicy {
        WaitPolicy::new(
            Duration::from_secs(self.provision_timeout_secs),
            Duration::from_secs(self.poll_interval_secs),
            Duration::from_secs(self.max_poll_interval_secs),
        )
    }

    /// Time allowed for a single remote command.
    #[must_use]
    pub const fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }
}

/// Errors raised during configuration loading and validation.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    /// Indicates a required configuration field is empty or missing.
    #[error("missing configuration field: {0}")]
    MissingField(String),
    /// Indicates a configuration value is present but unusable.
    #[error("invalid configuration field: {0}")]
    InvalidField(String),
    /// Surfaces errors from the `ortho-config` loader.
    #[error("configuration parsing failed: {0}")]
    Parse(String),
}

impl From<ortho_config::OrthoError> for ConfigError {
    fn from(value: ortho_config::OrthoError) -> Self {
        Self::Parse(value.to_string())
    }
}
