//! vj-server - Standalone audio-visualization relay server.
//!
//! Arbitrates DJ WebSocket clients, composites server-side patterns and
//! effects with whichever DJ is active, and broadcasts entity state to a
//! downstream renderer and to browser/admin observers.

mod config;

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use vj_core::bootstrap_services;

/// vj-server - DJ arbitration and audio-visualization relay.
#[derive(Parser, Debug)]
#[command(name = "vj-server")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file (YAML).
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(short, long, default_value = "info", env = "VJ_LOG_LEVEL")]
    log_level: log::LevelFilter,

    /// DJ-facing WebSocket port (overrides config file).
    #[arg(long, env = "VJ_SERVER_PORT")]
    dj_port: Option<u16>,

    /// Browser/admin WebSocket port (overrides config file).
    #[arg(long, env = "PREVIEW_PORT")]
    browser_port: Option<u16>,

    /// Health/metrics HTTP port (overrides config file).
    #[arg(long, env = "VJ_METRICS_PORT")]
    metrics_port: Option<u16>,

    /// Data directory for banner profiles and other persistent state.
    #[arg(short = 'd', long, env = "VJ_DATA_DIR")]
    data_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    env_logger::Builder::new()
        .filter_level(args.log_level)
        .format_timestamp_millis()
        .init();

    log::info!("vj-server v{}", env!("CARGO_PKG_VERSION"));

    let mut server_config = config::load(args.config.as_deref()).context("failed to load configuration")?;

    if let Some(port) = args.dj_port {
        server_config.dj_port = port;
    }
    if let Some(port) = args.browser_port {
        server_config.browser_port = port;
    }
    if let Some(port) = args.metrics_port {
        server_config.metrics_port = port;
    }
    if let Some(data_dir) = args.data_dir {
        server_config.data_dir = data_dir;
    }

    log::info!(
        "Configuration: dj_port={} browser_port={} http_port={} metrics_port={} minecraft={}:{}",
        server_config.dj_port,
        server_config.browser_port,
        server_config.http_port,
        server_config.metrics_port,
        server_config.minecraft_host,
        server_config.minecraft_port,
    );

    let services = bootstrap_services(server_config).context("failed to bootstrap services")?;
    services.spawn_background_tasks();
    log::info!("Background tasks started");

    let dj_addr = bind_addr(services.app.config.dj_port);
    let browser_addr = bind_addr(services.app.config.browser_port);
    let metrics_addr = bind_addr(services.app.config.metrics_port);

    let dj_router = vj_core::api::dj_router(services.app.clone());
    let browser_router = vj_core::api::browser_router(services.app.clone(), services.browser_heartbeats.clone());
    let metrics_router = vj_core::metrics_http::router(services.metrics_state.clone());

    let dj_listener = tokio::net::TcpListener::bind(dj_addr)
        .await
        .with_context(|| format!("failed to bind DJ socket on {dj_addr}"))?;
    let browser_listener = tokio::net::TcpListener::bind(browser_addr)
        .await
        .with_context(|| format!("failed to bind browser socket on {browser_addr}"))?;
    let metrics_listener = tokio::net::TcpListener::bind(metrics_addr)
        .await
        .with_context(|| format!("failed to bind metrics HTTP on {metrics_addr}"))?;

    log::info!("DJ socket listening on {dj_addr}");
    log::info!("Browser socket listening on {browser_addr}");
    log::info!("Metrics/health HTTP listening on {metrics_addr}");

    let dj_task = tokio::spawn(async move {
        if let Err(e) = axum::serve(dj_listener, dj_router).await {
            log::error!("DJ socket server error: {e}");
        }
    });
    let browser_task = tokio::spawn(async move {
        if let Err(e) = axum::serve(browser_listener, browser_router).await {
            log::error!("Browser socket server error: {e}");
        }
    });
    let metrics_task = tokio::spawn(async move {
        if let Err(e) = axum::serve(metrics_listener, metrics_router).await {
            log::error!("Metrics HTTP server error: {e}");
        }
    });

    shutdown_signal().await;
    log::info!("Shutdown signal received, cleaning up...");

    services.shutdown();
    dj_task.abort();
    browser_task.abort();
    metrics_task.abort();

    log::info!("Shutdown complete");
    Ok(())
}

fn bind_addr(port: u16) -> SocketAddr {
    SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port)
}

/// Waits for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
