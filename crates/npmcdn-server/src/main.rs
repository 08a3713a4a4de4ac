//! # npmcdn
//!
//! Serves files out of npm packages over HTTP.
//!
//! This is the entry point of the `npmcdn` binary. It parses the command
//! line, sets up logging and the panic hook, merges the configuration layers
//! and then runs the requested subcommand.

use std::io::ErrorKind;
use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{anyhow, Context};
use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use npmcdn_config::{CliOverrides, ConfigLayering, ConfigLoader, ConfigSource, ServerConfig, CONFIG_FILE_NAME};
use npmcdn_server::{RequestOrchestrator, Server};

/// Serve files from npm packages over HTTP
#[derive(Parser)]
#[command(name = "npmcdn", version, about = "Serve files from npm packages over HTTP")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Configuration file (defaults to npmcdn.toml in this or a parent directory)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Address to listen on
    #[arg(long, global = true, value_name = "ADDR")]
    pub listen: Option<SocketAddr>,

    /// Upstream npm registry
    #[arg(long, global = true, value_name = "URL")]
    pub registry_url: Option<String>,

    /// Directory unpacked packages are kept in
    #[arg(long, global = true, value_name = "DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Clone, Copy)]
pub enum Commands {
    /// Run the HTTP server (default)
    Serve,
    /// Print the merged configuration and exit
    Check,
    /// Remove the local package cache
    Clean,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose);
    setup_panic_handler();

    info!("Starting npmcdn v{}", env!("CARGO_PKG_VERSION"));

    let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
    rt.block_on(run_cli(cli))
}

async fn run_cli(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(&cli).await?;

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(config).await,
        Commands::Check => {
            print!("{}", npmcdn_config::toml::serialize_config(&config)?);
            Ok(())
        }
        Commands::Clean => clean(&config).await,
    }
}

/// Defaults ← file ← environment ← flags
async fn load_config(cli: &Cli) -> anyhow::Result<ServerConfig> {
    let explicit = cli
        .config
        .clone()
        .map(Utf8PathBuf::from_path_buf)
        .transpose()
        .map_err(|path| anyhow!("Config path {} is not valid UTF-8", path.display()))?;

    let loader = ConfigLoader::from_current_dir()?;
    let (base, source) = loader.load(explicit.as_deref()).await?;
    match &source {
        ConfigSource::Defaults => info!("No {} found, using defaults", CONFIG_FILE_NAME),
        ConfigSource::Explicit(path) | ConfigSource::Discovered(path) => {
            info!("Loaded configuration from {}", path)
        }
    }

    let overrides = CliOverrides {
        listen: cli.listen,
        registry_url: cli.registry_url.clone(),
        cache_dir: cli.cache_dir.clone(),
    };

    let config = ConfigLayering::merge_configs(base, &ConfigLayering::collect_env_overrides(), &overrides)?;
    Ok(config)
}

async fn serve(config: ServerConfig) -> anyhow::Result<()> {
    let listen = config.listen;
    info!(
        "Registry {}, package cache {}",
        config.registry_url,
        config.cache_dir.display()
    );

    let orchestrator = RequestOrchestrator::from_config(config).await?;
    let server = Server::bind(listen, orchestrator).await?;
    info!("Listening on http://{}", server.local_addr()?);

    server.serve(shutdown_signal()).await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}

async fn clean(config: &ServerConfig) -> anyhow::Result<()> {
    match tokio::fs::remove_dir_all(&config.cache_dir).await {
        Ok(()) => info!("Removed {}", config.cache_dir.display()),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            info!("Nothing to clean at {}", config.cache_dir.display())
        }
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to remove {}", config.cache_dir.display()))
        }
    }
    Ok(())
}

fn setup_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("npmcdn={}", level)));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn setup_panic_handler() {
    std::panic::set_hook(Box::new(|panic_info| {
        error!("npmcdn encountered an unexpected error: {}", panic_info);
        eprintln!("npmcdn crashed! This is a bug.");
        eprintln!("Error: {}", panic_info);
    }));
}
