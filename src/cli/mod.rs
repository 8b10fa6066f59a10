//! Command-line interface definitions for the `lakemount` binary.
//!
//! This module centralises the clap parser structures so both the main binary
//! and the build script can reuse them when generating the manual page.

use camino::Utf8PathBuf;
use clap::{Args, Parser};

/// Top-level CLI for the `lakemount` binary.
#[derive(Debug, Parser)]
#[command(
    name = "lakemount",
    about = "Create, inspect, and remove storage mounts inside remote clusters",
    arg_required_else_help = true
)]
pub(crate) enum Cli {
    /// Create the mount described by a declaration file.
    #[command(name = "create", about = "Create the mount described by a declaration")]
    Create(DeclarationArgs),
    /// Print the source currently bound to the declared mount point.
    #[command(name = "read", about = "Print the source bound to the declared mount")]
    Read(DeclarationArgs),
    /// Remove the declared mount. Removing an absent mount succeeds.
    #[command(name = "delete", about = "Remove the declared mount")]
    Delete(DeclarationArgs),
    /// Remove an instance profile registration from the workspace.
    #[command(
        name = "unregister-profile",
        about = "Remove an instance profile registration from the workspace"
    )]
    UnregisterProfile(ProfileArgs),
}

/// Arguments shared by the mount subcommands.
#[derive(Debug, Args)]
pub(crate) struct DeclarationArgs {
    /// Path to the TOML mount declaration.
    #[arg(value_name = "FILE")]
    pub(crate) declaration: Utf8PathBuf,
    /// Cluster to use instead of the one recorded in the declaration.
    #[arg(long, value_name = "ID")]
    pub(crate) cluster_id: Option<String>,
}

/// Arguments for instance profile maintenance.
#[derive(Debug, Args)]
pub(crate) struct ProfileArgs {
    /// Instance profile ARN.
    #[arg(value_name = "ARN")]
    pub(crate) arn: String,
}
