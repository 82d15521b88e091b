//! upgrade-test - end-to-end upgrade testing for OLM-managed operators.
//!
//! This is the main entry point that:
//! - Loads the run configuration
//! - Initializes structured logging
//! - Resolves cluster credentials and exports them to subprocesses
//! - Runs every upgrade path and maps the outcome to the exit code

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context as _;
use clap::{Args, Parser, Subcommand};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use upgrade_test::client::{self, KubeResourceClient, KubeconfigSource, ResourceClient};
use upgrade_test::config::{Config, OperatorType};
use upgrade_test::exec::{CommandRunner, ShellRunner};
use upgrade_test::operator::build_backend;
use upgrade_test::orchestrator::UpgradeRunner;

/// Default log level when neither the flag nor the config sets one
const DEFAULT_LOG_LEVEL: &str = "info";

#[derive(Debug, Parser)]
#[command(name = "upgrade-test", version, about, args_conflicts_with_subcommands = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    #[command(flatten)]
    upgrade: UpgradeArgs,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the configured upgrade paths
    Upgrade(UpgradeArgs),
}

#[derive(Debug, Clone, Args)]
struct UpgradeArgs {
    /// Path to the configuration file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Path to a kubeconfig; falls back to KUBECONFIG, ~/.kube/config, then in-cluster
    #[arg(long)]
    kubeconfig: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    /// Override operatorConfig.workspace
    #[arg(long)]
    workspace: Option<PathBuf>,
}

fn init_tracing(level: &str) -> anyhow::Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(format!("upgrade_test={level},kube=warn"))
            .with_context(|| format!("invalid log level {level:?}"))?,
    };
    tracing_subscriber::fmt().with_env_filter(filter).json().init();
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    let args = match cli.command {
        Some(Command::Upgrade(args)) => args,
        None => cli.upgrade,
    };

    let mut config = Config::load(&args.config)?;
    if let Some(workspace) = args.workspace {
        config = config.with_workspace(workspace);
    }

    let level = args
        .log_level
        .as_deref()
        .or(config.log_level.as_deref())
        .unwrap_or(DEFAULT_LOG_LEVEL);
    init_tracing(level)?;

    info!(
        config = %args.config.display(),
        backend = %config.operator_config.kind,
        paths = config.upgrade_paths.len(),
        immediate = config.immediate,
        "Starting upgrade-test"
    );

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            match shutdown_signal().await {
                Ok(()) => {
                    warn!("Received shutdown signal, cancelling run");
                    cancel.cancel();
                }
                Err(e) => error!(error = %e, "Failed to install signal handlers"),
            }
        });
    }

    let env_kubeconfig = std::env::var("KUBECONFIG").ok();
    let home = std::env::var_os("HOME").map(PathBuf::from);
    let source = client::resolve(
        args.kubeconfig.as_deref(),
        env_kubeconfig.as_deref(),
        home.as_deref(),
    );

    let mut shell = ShellRunner::new(cancel.clone());
    if let Some(path) = source.export_path() {
        shell = shell.with_env("KUBECONFIG", path.to_string_lossy());
    }
    let runner: Arc<dyn CommandRunner> = Arc::new(shell);

    let resource_client: Option<Arc<dyn ResourceClient>> =
        match config.operator_config.kind {
            OperatorType::OperatorHub => {
                let kube = client::connect(&source).await?;
                if let KubeconfigSource::File(path) = &source {
                    info!(kubeconfig = %path.display(), "Connected to Kubernetes cluster");
                } else {
                    info!("Connected to Kubernetes cluster");
                }
                let resources: Arc<dyn ResourceClient> = Arc::new(KubeResourceClient::new(kube));
                Some(resources)
            }
            OperatorType::Local => None,
        };

    let backend = build_backend(&config, resource_client, runner.clone(), cancel.clone())?;
    info!(backend = backend.name(), "Operator backend ready");

    let report = UpgradeRunner::new(config, backend, runner, cancel).run().await;
    for outcome in &report.outcomes {
        match &outcome.error {
            None => info!(path = %outcome.name, "PASS"),
            Some(e) => error!(path = %outcome.name, error = %e, "FAIL"),
        }
    }

    Ok(ExitCode::from(report.exit_code()))
}

/// Wait for SIGINT or SIGTERM.
async fn shutdown_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        let mut terminate = signal::unix::signal(signal::unix::SignalKind::terminate())?;
        tokio::select! {
            result = signal::ctrl_c() => result,
            _ = terminate.recv() => Ok(()),
        }
    }

    #[cfg(not(unix))]
    {
        signal::ctrl_c().await
    }
}
