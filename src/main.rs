use anyhow::{Context, Result};
use clap::Parser;
use get_proxies::{config::DEFAULT_CONFIG_PATH, tui::StatusLine, Config, Harvester};
use std::path::PathBuf;
use tokio::signal;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

/// Fetches public SOCKS5 proxy lists and keeps the proxies that pass every check
#[derive(Parser)]
#[command(name = "get-proxies")]
#[command(about = "Fetches public SOCKS5 proxy lists and keeps the proxies that pass every check")]
struct Cli {
    /// Configuration file
    #[arg(default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Force debug logging regardless of `debug_mode`
    #[arg(short, long)]
    debug: bool,
}

fn init_tracing(debug: bool) {
    let default = if debug { "get_proxies=debug" } else { "get_proxies=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let loaded = Config::load(&cli.config);
    let debug = cli.debug || loaded.as_ref().map(|c| c.io.debug_mode).unwrap_or(false);
    init_tracing(debug);

    info!("Welcome to Get-Proxies!");
    info!("Using config file {:?}.", cli.config);

    let config = match loaded {
        Ok(config) => config,
        Err(e) => {
            error!("Config validation error: {}", e);
            std::process::exit(1);
        }
    };
    debug!(?config, "effective configuration");

    tokio::select! {
        result = run(config) => result,
        _ = signal::ctrl_c() => {
            info!("Ctrl+C detected. Bye.");
            Ok(())
        }
    }
}

async fn run(config: Config) -> Result<()> {
    let harvester = Harvester::new(&config)?;

    let candidates = harvester.fetch_candidates().await;

    info!("Testing proxies... (This may take some time)");
    let mut status = StatusLine::stderr();
    let passed = harvester.test_candidates(candidates, &mut status).await;
    status.finish()?;

    info!("Writing to output file {:?}...", config.io.output_filename);
    tokio::fs::write(&config.io.output_filename, Harvester::format_proxies(&passed))
        .await
        .with_context(|| format!("failed to write {}", config.io.output_filename))?;

    info!("Done.");
    Ok(())
}
