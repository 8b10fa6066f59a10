//! Binary entry point for the lakemount CLI.

use std::io::{self, Write};
use std::process;

use clap::Parser;
use thiserror::Error;
use tracing::info;
use tracing_subscriber::EnvFilter;

use lakemount::{
    ClusterResolver, ConfigError, DeclarationError, IdentityError, InstanceProfileArn,
    MountError, MountOrchestrator, MountRequest, ReadOutcome, ValidationError, WorkspaceClient,
    WorkspaceConfig, WorkspaceError, load_declaration,
};

mod cli;

use cli::{Cli, DeclarationArgs};

const EXIT_FAILURE: i32 = 1;
const EXIT_NOT_FOUND: i32 = 3;

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Declaration(#[from] DeclarationError),
    #[error("invalid mount declaration: {0}")]
    Validation(#[from] ValidationError),
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("workspace client error: {0}")]
    Workspace(#[from] WorkspaceError),
    #[error(transparent)]
    Mount(#[from] MountError),
    #[error(transparent)]
    Identity(#[from] IdentityError),
}

type Orchestrator = MountOrchestrator<WorkspaceClient, WorkspaceClient, WorkspaceClient>;

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse();
    let exit_code = match dispatch(cli).await {
        Ok(code) => code,
        Err(err) => {
            report_error(&err);
            EXIT_FAILURE
        }
    };

    process::exit(exit_code);
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

async fn dispatch(cli: Cli) -> Result<i32, CliError> {
    match cli {
        Cli::Create(args) => {
            let request = load_request(&args)?;
            let record = build_orchestrator()?.create(&request).await?;
            info!(mount = %record.name, cluster_id = %record.cluster_id, "mount created");
            let mut stdout = io::stdout();
            writeln!(stdout, "mount_point = {}", record.mount_point()).ok();
            writeln!(stdout, "cluster_id = {}", record.cluster_id).ok();
            writeln!(stdout, "source = {}", record.source).ok();
            Ok(0)
        }
        Cli::Read(args) => {
            let request = load_request(&args)?;
            match build_orchestrator()?.read(&request).await? {
                ReadOutcome::Mounted { source } => {
                    writeln!(io::stdout(), "{source}").ok();
                    Ok(0)
                }
                ReadOutcome::NotFound => {
                    writeln!(io::stderr(), "{} is not mounted", request.name.mount_point()).ok();
                    Ok(EXIT_NOT_FOUND)
                }
            }
        }
        Cli::Delete(args) => {
            let request = load_request(&args)?;
            build_orchestrator()?.delete(&request).await?;
            writeln!(io::stdout(), "removed {}", request.name.mount_point()).ok();
            Ok(0)
        }
        Cli::UnregisterProfile(args) => {
            let arn = InstanceProfileArn::parse(&args.arn)?;
            build_orchestrator()?.unregister_instance_profile(&arn).await?;
            writeln!(io::stdout(), "unregistered {arn}").ok();
            Ok(0)
        }
    }
}

/// Loads and validates the declaration before any configuration is read, so
/// malformed declarations fail fast without credentials.
fn load_request(args: &DeclarationArgs) -> Result<MountRequest, CliError> {
    let mut request = load_declaration(&args.declaration)?.into_request()?;
    if let Some(cluster_id) = args
        .cluster_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
    {
        request.cluster_id = Some(cluster_id.to_owned());
    }
    request.validate()?;
    Ok(request)
}

fn build_orchestrator() -> Result<Orchestrator, CliError> {
    let config = WorkspaceConfig::load_without_cli_args()?;
    config.validate()?;
    let client = WorkspaceClient::from_config(&config)?;
    let resolver = ClusterResolver::new(client.clone(), config.cluster_defaults())
        .with_wait_policy(config.wait_policy());
    Ok(
        MountOrchestrator::new(resolver, client.clone(), client)
            .with_instance_profile_registration(config.register_instance_profiles),
    )
}

fn report_error(err: &CliError) {
    write_error(io::stderr(), err);
}

fn write_error(mut target: impl Write, err: &CliError) {
    writeln!(target, "{err}").ok();
}
