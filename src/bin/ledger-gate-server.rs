// ABOUTME: Server binary wiring config, storage, routes, and tower layers
// ABOUTME: Serves the gate's HTTP surface with graceful shutdown on ctrl-c
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Ledger Gate Contributors

//! # Ledger Gate Server Binary
//!
//! Starts the access-control gate: loads configuration from the
//! environment, connects and migrates the database, and serves the HTTP
//! surface.

use anyhow::{Context, Result};
use clap::Parser;
use ledger_gate::{
    config::ServerConfig, context::ServerResources, database::Database, logging, routes,
};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

#[derive(Parser)]
#[command(name = "ledger-gate-server")]
#[command(about = "Access-control gate for a financial-data API")]
struct Args {
    /// Override HTTP port
    #[arg(long)]
    http_port: Option<u16>,

    /// Override database URL
    #[arg(long)]
    database_url: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = ServerConfig::from_env()?;
    if let Some(port) = args.http_port {
        config.http_port = port;
    }
    if let Some(url) = args.database_url {
        config.database_url = url;
    }

    logging::init_logging(&config.logging)?;

    info!(
        port = config.http_port,
        rate_limiting = config.rate_limit.enabled,
        invite_gating = config.auth.require_invite_code,
        "starting ledger-gate server"
    );

    let database = Arc::new(
        Database::new(&config.database_url)
            .await
            .context("failed to connect to database")?,
    );
    info!(url = %config.database_url, "database connected and migrated");

    let port = config.http_port;
    let resources = Arc::new(ServerResources::new(database, config));

    let app = routes::router(resources)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
        .layer(CorsLayer::permissive());

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to install ctrl-c handler: {e}");
    }
    info!("shutdown signal received");
}
