//! Hushcast Receiver - standalone headless receiver for Hushcast.
//!
//! Waits for a sender on the LAN, plays the sounds it asks for, and exits
//! once the sender leaves or nothing has played for the idle window.

mod config;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use hushcast_core::{
    bootstrap_services, start_server, LocalIpDetector, NetworkContext, ServerOptions, SessionEnd,
};
use tokio::signal;

use crate::config::ServerConfig;

/// Hushcast Receiver - ambient sound playback driven by a sender app.
#[derive(Parser, Debug)]
#[command(name = "hushcast-receiver")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file (YAML).
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(short, long, default_value = "info", env = "HUSHCAST_LOG_LEVEL")]
    log_level: log::LevelFilter,

    /// Bind port (overrides config file).
    #[arg(short = 'p', long, env = "HUSHCAST_BIND_PORT")]
    port: Option<u16>,

    /// Advertise IP address (overrides config file).
    #[arg(short = 'a', long, env = "HUSHCAST_ADVERTISE_IP")]
    advertise_ip: Option<std::net::IpAddr>,

    /// Sound library CDN (overrides config file).
    #[arg(long, env = "HUSHCAST_CDN_BASE_URL")]
    cdn_base_url: Option<String>,

    /// Disable mDNS advertisement.
    #[arg(long)]
    no_mdns: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    env_logger::Builder::new()
        .filter_level(args.log_level)
        .format_timestamp_millis()
        .init();

    log::info!("Hushcast Receiver v{}", env!("CARGO_PKG_VERSION"));

    let mut config =
        ServerConfig::load(args.config.as_deref()).context("Failed to load configuration")?;

    if let Some(port) = args.port {
        config.bind_port = port;
    }
    if let Some(ip) = args.advertise_ip {
        config.advertise_ip = Some(ip);
    }
    if let Some(url) = args.cdn_base_url {
        config.receiver.cdn_base_url = url;
    }
    if args.no_mdns {
        config.mdns = false;
    }

    let network = if let Some(ip) = config.advertise_ip {
        log::info!(
            "Configuration: bind_port={}, advertise_ip={}",
            config.bind_port,
            ip
        );
        NetworkContext::explicit(config.bind_port, ip)
    } else {
        log::info!(
            "Configuration: bind_port={}, advertise_ip=auto",
            config.bind_port
        );
        NetworkContext::auto_detect(config.bind_port, &LocalIpDetector).context(
            "Failed to auto-detect local IP address. \
             Please specify --advertise-ip or set HUSHCAST_ADVERTISE_IP to the IP \
             address the sender can reach.",
        )?
    };

    let mut services =
        bootstrap_services(&config.receiver, network).context("Failed to bootstrap services")?;
    let app_state = services.app_state();
    let session_task = services
        .start_session()
        .context("Session was already started")?;

    let options = ServerOptions {
        bind_port: config.bind_port,
        advertise_mdns: config.mdns,
        friendly_name: config.friendly_name.clone(),
    };
    let server_handle = tokio::spawn(async move {
        if let Err(e) = start_server(app_state, options).await {
            log::error!("Server error: {}", e);
        }
    });

    tokio::select! {
        ended = session_task => {
            match ended {
                Ok(SessionEnd::IdleTimeout) => log::info!("Nothing played for the idle window, exiting"),
                Ok(end) => log::info!("Session ended: {:?}", end),
                Err(e) => log::error!("Session task failed: {}", e),
            }
        }
        _ = shutdown_signal() => {
            log::info!("Shutdown signal received, cleaning up...");
        }
    }

    services.shutdown().await;

    // The server stops on its own once the session has ended.
    if let Err(e) = server_handle.await {
        log::warn!("Server task did not finish cleanly: {}", e);
    }

    log::info!("Shutdown complete");
    Ok(())
}

/// Waits for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            log::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                log::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
