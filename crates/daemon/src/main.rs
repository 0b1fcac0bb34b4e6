//! FileVault Daemon
//!
//! Authenticated web file manager for a single directory tree.

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use daemon::config::{default_config_path, AuthConfig, Config};
use daemon::orchestrator::{DaemonOrchestrator, OrchestratorEvent};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Name of the rolling log file inside `log_dir`.
const LOG_FILE_PREFIX: &str = "filevault.log";

/// FileVault Daemon - authenticated web file manager.
#[derive(Parser, Debug)]
#[command(name = "filevault-daemon")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands for the daemon.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Serve the vault until interrupted
    Start {
        /// Vault root directory (overrides config)
        #[arg(long, value_name = "DIR")]
        root: Option<PathBuf>,

        /// Port to listen on (overrides config, 0 picks a free port)
        #[arg(long, short)]
        port: Option<u16>,

        /// Address to bind (overrides config)
        #[arg(long, value_name = "ADDR")]
        bind: Option<String>,
    },

    /// Write a default configuration file with a generated password
    Init {
        /// Overwrite an existing configuration file
        #[arg(long, short)]
        force: bool,
    },

    /// Validate the configuration and print a summary
    Check,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config_path = cli.config.clone().unwrap_or_else(default_config_path);

    match cli.command {
        Commands::Init { force } => {
            let _guard = init_tracing(if cli.verbose { "debug" } else { "info" }, None)?;
            init_config(&config_path, force)?;
        }
        Commands::Start { root, port, bind } => {
            let (mut config, _guard) = load_config(&config_path, cli.verbose)?;
            if let Some(root) = root {
                config.vault.root = root;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            if let Some(bind) = bind {
                config.server.bind_address = bind;
            }
            config.validate()?;
            run(config).await?;
        }
        Commands::Check => {
            let (config, _guard) = load_config(&config_path, cli.verbose)?;
            config.validate()?;
            print_summary(&config_path, &config);
        }
    }

    Ok(())
}

/// Load the config file, set up logging from it, then apply environment
/// overrides.
fn load_config(
    path: &Path,
    verbose: bool,
) -> anyhow::Result<(Config, Option<WorkerGuard>)> {
    let mut config = Config::load(path)?;

    // The level override must be known before the subscriber exists
    let level = if verbose {
        "debug".to_string()
    } else {
        std::env::var("FILEVAULT_LOG_LEVEL")
            .ok()
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| config.daemon.log_level.clone())
    };
    let guard = init_tracing(&level, config.daemon.log_dir.as_deref())?;

    tracing::info!("Using config file: {:?}", path);
    config.apply_env_overrides();

    Ok((config, guard))
}

/// Initialize the global subscriber, adding a daily file log when `log_dir`
/// is set. The returned guard must live until exit to flush the file log.
fn init_tracing(
    level: &str,
    log_dir: Option<&Path>,
) -> anyhow::Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .context("Invalid log level")?;

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory: {}", dir.display()))?;
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .try_init()
        .context("Failed to initialize logging")?;

    Ok(guard)
}

/// Write a fresh configuration file.
fn init_config(path: &Path, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!(
            "Config file already exists: {} (use --force to overwrite)",
            path.display()
        );
    }

    let config = Config {
        auth: AuthConfig::generated(),
        ..Config::default()
    };
    config.save(path)?;

    println!("Wrote configuration to {}", path.display());
    println!("  Username: {}", config.auth.username);
    println!("  Password: {}", config.auth.password);
    Ok(())
}

/// Print the effective configuration, without the password.
fn print_summary(path: &Path, config: &Config) {
    println!("Configuration OK: {}", path.display());
    println!(
        "  Listen:       {}:{}",
        config.server.bind_address, config.server.port
    );
    println!("  Vault root:   {}", config.vault.root.display());
    println!("  Static UI:    {}", config.server.static_dir.display());
    println!("  Max upload:   {} bytes per file", config.vault.max_upload_size);
    println!("  Max request:  {} bytes", config.vault.max_request_size);
    println!(
        "  Page size:    {} (max {})",
        config.vault.default_page_size, config.vault.max_page_size
    );
    println!(
        "  Extensions:   {}",
        config.vault.allowed_extensions.join(", ")
    );
    println!("  Username:     {}", config.auth.username);
}

/// Serve until SIGINT or SIGTERM.
async fn run(config: Config) -> anyhow::Result<()> {
    let orchestrator = DaemonOrchestrator::new(config)?;

    // Subscribe to orchestrator events for logging
    let mut events = orchestrator.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                OrchestratorEvent::StateChanged(state) => {
                    tracing::debug!("Orchestrator state: {:?}", state);
                }
                OrchestratorEvent::Listening { addr } => {
                    tracing::info!("Listening on http://{}", addr);
                }
                OrchestratorEvent::Error { message } => {
                    tracing::error!("Orchestrator error: {}", message);
                }
            }
        }
    });

    orchestrator.start().await?;

    wait_for_shutdown_signal().await?;
    tracing::info!("Received shutdown signal");

    orchestrator.stop().await?;
    Ok(())
}

/// Wait for a shutdown signal (SIGTERM or SIGINT).
#[cfg(unix)]
async fn wait_for_shutdown_signal() -> anyhow::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm =
        signal(SignalKind::terminate()).context("Failed to register SIGTERM handler")?;
    let mut sigint =
        signal(SignalKind::interrupt()).context("Failed to register SIGINT handler")?;

    tokio::select! {
        _ = sigterm.recv() => {
            tracing::info!("Received SIGTERM");
        }
        _ = sigint.recv() => {
            tracing::info!("Received SIGINT");
        }
    }
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() -> anyhow::Result<()> {
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")
}
