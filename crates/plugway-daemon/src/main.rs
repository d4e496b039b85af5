//! Plugway Daemon - Main entry point
//!
//! Serves the outlet control API and keeps device locations fresh with
//! periodic discovery scans.

mod api;
mod config;
mod error;
mod server;
mod state;

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "plugway")]
#[command(about = "Local HTTP gateway for smart outlets")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "plugway.toml")]
    config: PathBuf,

    /// Host to bind the web server to
    #[arg(long)]
    host: Option<String>,

    /// Port to bind the web server to
    #[arg(short, long)]
    port: Option<u16>,

    /// Serve on a unix domain socket instead of TCP
    #[arg(long, conflicts_with_all = ["host", "port"])]
    unix_socket: Option<PathBuf>,

    /// Path to the device catalog (JSON)
    #[arg(short, long)]
    devices_file: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Run a single scan and exit
    #[arg(long)]
    scan_once: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("Plugway v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let mut config = config::load_config(&args.config)?;

    // Command line overrides
    config.override_bind(args.host.as_deref(), args.port);
    if let Some(path) = args.unix_socket {
        config.daemon.unix_socket = Some(path);
    }
    if let Some(path) = args.devices_file {
        config.catalog.path = path;
    }
    config.validate()?;

    info!(
        catalog = %config.catalog.path.display(),
        reload = ?config.catalog.reload,
        scan_interval_secs = config.scan.interval_secs,
        "Configuration loaded"
    );

    // Create application state
    let state = state::AppState::new(config).await?;

    if args.scan_once {
        // Single scan mode
        info!("Running single discovery scan");
        match state.scanner.trigger_scan(state.scan_timeout()).await? {
            plugway_discovery::ScanOutcome::Completed(report) => {
                println!(
                    "Scan completed at {}: located {} devices ({} unmanaged responders)",
                    report.completed_at.format("%Y-%m-%d %H:%M:%S UTC"),
                    report.devices.len(),
                    report.unmanaged
                );
                for (id, device) in &report.devices {
                    println!(
                        "  - {} ({}) at {} [v{}]",
                        device.name.as_deref().unwrap_or("unnamed"),
                        id,
                        device.ip,
                        device.version
                    );
                }
            }
            plugway_discovery::ScanOutcome::AlreadyInProgress => {
                println!("A scan is already in progress");
            }
        }
    } else {
        // Daemon mode - run web server and periodic discovery
        server::run(state).await?;
    }

    Ok(())
}
