use anyhow::{Context, Result};
use jamboree::{server, state, telemetry};
use clap::Parser;
use jamconf::JamConfig;
use std::path::PathBuf;
use tracing::{info, warn};

/// The Jamboree music-generation server.
///
/// Accepts authenticated generation requests over HTTP, persists them as
/// jobs, and drives the transcoder pipeline from a worker pool.
///
/// Configuration is loaded from (later wins):
/// 1. Compiled defaults
/// 2. ./jamboree.toml (or --config path)
/// 3. Environment variables (PORT, DATABASE_URL, ...)
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to config file (overrides ./jamboree.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Show loaded configuration and exit
    #[arg(long)]
    show_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let (config, sources) = JamConfig::load_with_sources_from(cli.config.as_deref())
        .context("Failed to load configuration")?;

    if cli.show_config {
        println!("# Configuration sources:");
        for path in &sources.files {
            println!("#   - {}", path.display());
        }
        if !sources.env_overrides.is_empty() {
            println!("# Environment overrides:");
            for var in &sources.env_overrides {
                println!("#   - {var}");
            }
        }
        println!();
        println!("{}", config.to_toml());
        return Ok(());
    }

    telemetry::init(&config.telemetry.log_level);

    info!("🎷 Jamboree starting");
    info!("   Port: {}", config.http.port);
    info!("   Database: {}", config.database.path().display());
    info!("   Storage: {:?}", config.storage.backend);

    let state = state::AppState::bootstrap(config)
        .await
        .context("Bootstrap failed")?;

    if !state.boot_capabilities.ready() {
        warn!(
            transcoder = state.boot_capabilities.transcoder_available,
            probe = state.boot_capabilities.probe_available,
            "transcoder not fully available; generation jobs will be degraded until it is"
        );
    }

    server::run(state).await
}
