//! Expgate CLI - runs the experiment gateway.
//!
//! Serves the HTTP control plane until the experiment is stopped or the
//! process is interrupted.

use clap::Parser;
use expgate_core::config::{ExpgateConfig, load_config_with_file};
use expgate_core::{
    DataStore, ExperimentManager, ExperimentMode, GatewayServer, InMemoryDataStore,
    InMemoryManager, ProcessLauncher, TensorboardManager,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Expgate: HTTP control plane for ML experiments
#[derive(Parser, Debug)]
#[command(name = "expgate", version, about, long_about = None)]
struct Cli {
    /// Workspace directory
    #[arg(short, long, default_value = ".")]
    workspace: PathBuf,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Host to bind to
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on
    #[arg(short, long)]
    port: Option<u16>,

    /// Resume an existing experiment instead of creating a new one
    #[arg(long)]
    resume: bool,

    /// Id of the experiment to resume
    #[arg(long, requires = "resume")]
    experiment_id: Option<String>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long)]
    quiet: bool,

    /// Subcommand
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Print the resolved configuration as JSON
    ShowConfig,
}

impl Cli {
    fn apply_overrides(&self, config: &mut ExpgateConfig) {
        if let Some(host) = &self.host {
            config.gateway.host = host.clone();
        }
        if let Some(port) = self.port {
            config.gateway.port = port;
        }
        if self.resume {
            config.gateway.mode = ExperimentMode::Resume;
        }
        if let Some(id) = &self.experiment_id {
            config.gateway.experiment_id = Some(id.clone());
        }
    }
}

fn build_gateway(config: &ExpgateConfig) -> Arc<GatewayServer> {
    let manager: Arc<dyn ExperimentManager> =
        match (config.gateway.mode, &config.gateway.experiment_id) {
            (ExperimentMode::Resume, Some(id)) => Arc::new(InMemoryManager::with_experiment(
                id.clone(),
                serde_json::json!({}),
            )),
            _ => Arc::new(InMemoryManager::new()),
        };
    let datastore: Arc<dyn DataStore> = Arc::new(InMemoryDataStore::new());
    let launcher = Arc::new(ProcessLauncher::new(&config.tensorboard));
    let tensorboards = Arc::new(TensorboardManager::new(launcher, &config.tensorboard));
    Arc::new(GatewayServer::new(
        config.gateway.mode,
        manager,
        datastore,
        tensorboards,
    ))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    // Set up tracing: human-readable stderr + JSON file logging
    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::new(filter));

    let log_dir = directories::ProjectDirs::from("dev", "expgate", "expgate")
        .map(|d| d.data_dir().join("logs"))
        .unwrap_or_else(|| PathBuf::from("."));
    let _ = std::fs::create_dir_all(&log_dir);
    let file_appender = tracing_appender::rolling::daily(&log_dir, "expgate.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let json_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(non_blocking)
        .with_filter(EnvFilter::new("debug"));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let workspace = cli
        .workspace
        .canonicalize()
        .unwrap_or_else(|_| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

    let mut config = load_config_with_file(Some(&workspace), cli.config.as_deref(), None)
        .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;
    cli.apply_overrides(&mut config);

    if let Some(Commands::ShowConfig) = cli.command {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    if config.gateway.mode == ExperimentMode::Resume && config.gateway.experiment_id.is_none() {
        warn!("Resume mode without an experiment id; POST /experiment will fail");
    }

    let gw = build_gateway(&config);

    let on_signal = gw.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received, stopping experiment");
            if let Err(e) = on_signal.stop_experiment().await {
                warn!(error = %e, "Experiment teardown incomplete");
            }
            on_signal.shut_down();
        }
    });

    info!(
        host = %config.gateway.host,
        port = config.gateway.port,
        mode = ?config.gateway.mode,
        "Starting expgate"
    );
    expgate_core::gateway::run_gateway(gw, &config.gateway).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::try_parse_from(["expgate"]).unwrap();
        assert_eq!(cli.workspace, PathBuf::from("."));
        assert!(!cli.resume);
        assert_eq!(cli.verbose, 0);
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_cli_overrides_config() {
        let cli = Cli::try_parse_from([
            "expgate",
            "--host",
            "127.0.0.1",
            "--port",
            "51188",
            "--resume",
            "--experiment-id",
            "GcTm9oQ2",
            "-vv",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);

        let mut config = ExpgateConfig::default();
        cli.apply_overrides(&mut config);
        assert_eq!(config.gateway.host, "127.0.0.1");
        assert_eq!(config.gateway.port, 51188);
        assert_eq!(config.gateway.mode, ExperimentMode::Resume);
        assert_eq!(config.gateway.experiment_id.as_deref(), Some("GcTm9oQ2"));
    }

    #[test]
    fn test_experiment_id_requires_resume() {
        assert!(Cli::try_parse_from(["expgate", "--experiment-id", "abc"]).is_err());
    }

    #[test]
    fn test_show_config_subcommand() {
        let cli = Cli::try_parse_from(["expgate", "show-config"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::ShowConfig)));
    }

    #[tokio::test]
    async fn test_build_gateway_resume_knows_experiment() {
        let mut config = ExpgateConfig::default();
        config.gateway.mode = ExperimentMode::Resume;
        config.gateway.experiment_id = Some("GcTm9oQ2".into());

        let gw = build_gateway(&config);
        assert_eq!(gw.mode(), ExperimentMode::Resume);
        gw.manager().resume_experiment().await.unwrap();
        let profile = gw.manager().experiment_profile().await.unwrap();
        assert_eq!(profile.0["id"], "GcTm9oQ2");
    }
}
