//! cecd Daemon - Main entry point
//!
//! Supervises the CEC adapter, tracks devices on the bus and serves the REST API.

mod api;
mod commands;
mod config;
mod poller;
mod server;
mod state;
mod store;
mod ws;

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "cecd")]
#[command(about = "HDMI-CEC bus monitor and device discovery daemon")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "cecd.toml")]
    config: PathBuf,

    /// Bind address for web server
    #[arg(short, long)]
    bind: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Adapter program to run instead of the configured one
    #[arg(short, long)]
    adapter: Option<String>,

    /// Monitor the bus without serving the API
    #[arg(long)]
    no_server: bool,
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested");
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

    info!("cecd v{}", env!("CARGO_PKG_VERSION"));

    let mut config = config::load_config(&args.config)?;
    if let Some(bind) = args.bind {
        config.daemon.bind = bind;
    }
    if let Some(adapter) = args.adapter {
        config.adapter.program = adapter;
    }

    info!(
        program = %config.adapter.program,
        device_type = ?config.adapter.device_type,
        hdmi_port = config.adapter.hdmi_port,
        "Configuration loaded"
    );

    let bind = config.daemon.bind.clone();
    let ready_timeout = config.ready_timeout();
    let state = state::AppState::new(config);

    // Subscribe before the adapter can print its readiness line
    server::spawn_background(&state);
    let supervisor = state
        .monitor
        .start()
        .context("Could not start the CEC adapter")?;

    if let Err(e) = state.monitor.wait_for_ready(ready_timeout).await {
        state.monitor.stop();
        let _ = supervisor.await;
        return Err(e).context("CEC adapter did not come up");
    }
    info!(own_address = %state.monitor.own_address().await, "CEC adapter ready");

    if args.no_server {
        shutdown_signal().await;
    } else {
        server::run(state.clone(), &bind, shutdown_signal()).await?;
    }

    state.monitor.stop();
    let _ = supervisor.await;
    info!("cecd stopped");
    Ok(())
}
