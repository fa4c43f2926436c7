//! mgmtd - Management bridge daemon
//!
//! Serves the process's management registries over the bridge wire protocol.
//!
//! Usage:
//!   mgmtd [config.toml]
//!
//! If no config file is provided, a demo configuration is used.

mod config;
mod platform;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use mgmt_api::{create_router, AppState};
use mgmt_core::TracingLogHandler;
use mgmt_gateway::{BridgeConfig, BridgeHandler};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::DaemonConfig;

/// Parsed command-line arguments
struct Args {
    /// Daemon config file (TOML)
    config_path: Option<String>,
}

fn parse_args() -> Args {
    let mut result = Args { config_path: None };

    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            arg if !arg.starts_with('-') => {
                result.config_path = Some(arg.to_string());
            }
            _ => {
                tracing::warn!("Unknown argument: {}", arg);
            }
        }
    }

    result
}

fn print_help() {
    eprintln!(
        r#"mgmtd - Management bridge daemon

Usage: mgmtd [OPTIONS] [config.toml]

Options:
  -h, --help    Print this help message

Examples:
  # Run with the demo registries
  mgmtd

  # Run with config file
  mgmtd bridge.toml
"#
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "mgmtd=info,mgmt_api=info,mgmt_gateway=info,bridge=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting mgmtd (management bridge daemon)");

    let args = parse_args();
    let started = Utc::now();

    let config = match &args.config_path {
        Some(path) => {
            tracing::info!("Loading config from: {}", path);
            DaemonConfig::from_file(path)?
        }
        None => {
            tracing::info!("No config file provided, using demo registries");
            DaemonConfig::demo()?
        }
    };

    let registries = platform::build_registries(&config, started).await?;
    let detectors = platform::build_detectors(&config)?;

    let mut bridge_config = BridgeConfig::default();
    bridge_config.qualifier = config.bridge.qualifier.clone();
    bridge_config.bridge_id = config.bridge.id.clone();

    let handler = BridgeHandler::new(
        bridge_config,
        registries,
        detectors,
        Arc::new(TracingLogHandler),
    )
    .await
    .context("Failed to start the bridge")?;

    let server = handler.server_handle();
    tracing::info!(
        bridge_id = %handler.bridge_id(),
        vendor = server.vendor().unwrap_or("-"),
        product = server.product().unwrap_or("-"),
        version = server.version().unwrap_or("-"),
        "Bridge ready"
    );

    handler
        .register_object(
            Arc::new(platform::config_object(&config)),
            Some(platform::CONFIG_OBJECT_NAME.parse()?),
        )
        .await
        .context("Failed to register the config object")?;

    let app = create_router(AppState::new(handler.clone()));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for Ctrl-C: {}", e);
            }
            tracing::info!("Shutting down");
        })
        .await?;

    handler
        .destroy()
        .await
        .context("Bridge teardown reported failures")?;
    tracing::info!("Bridge destroyed");

    Ok(())
}
