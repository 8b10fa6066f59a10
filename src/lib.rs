//! Core library for the lakemount mount orchestrator.
//!
//! The crate manages filesystem mounts that only exist inside a remote
//! cluster's execution environment. Mount state is never cached locally: every
//! create, read, and delete resolves a suitably credentialed cluster, runs a
//! generated script through a remote command channel, and classifies the
//! result.

pub mod backend;
pub mod cluster;
pub mod command;
pub mod config;
pub mod credentials;
pub mod guard;
pub mod mount;
pub mod orchestrator;
pub mod test_support;
pub mod workspace;

pub use backend::{BackendFuture, ClusterApi, ClusterApiError, IdentityError, InstanceProfileApi};
pub use cluster::{
    ClusterAttributes, ClusterDefaults, ClusterInfo, ClusterRequest, ClusterRequestBuilder,
    ClusterResolver, ClusterState, ClusterTarget, CredentialRequirement, ResolveError, WaitPolicy,
};
pub use command::{CommandError, CommandExecutor};
pub use config::{ConfigError, WorkspaceConfig};
pub use credentials::{InstanceProfileArn, SecretRef};
pub use guard::SharedResourceGuard;
pub use mount::{
    DeclarationError, MountDeclaration, MountDescription, MountError, MountName, MountPoint,
    MountSource, MountSpec, ReadOutcome, ValidationError, load_declaration,
};
pub use orchestrator::{MountOrchestrator, MountRecord, MountRequest};
pub use workspace::{WorkspaceClient, WorkspaceError};
