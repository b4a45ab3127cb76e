// Copyright (c) 2026 Helion Contributors
//
// Licensed under the MIT license. See LICENSE for details.
//
// Process entry point: loads `ServerConfig`, opens the store, starts the clock-driven
// driver (C1) as a background task, and serves the HTTP surface (§6) alongside it in the
// same process.

mod config;
mod error;
mod routes;
mod state;
mod tenant_header;

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use helion_core::driver::Driver;
use helion_core::world::DriverWorld;
use helion_store::Store;
use tracing::info;

use crate::config::ServerConfig;
use crate::state::AppState;

#[derive(Parser, Debug)]
#[command(name = "helion-server", about = "Helion multi-tenant automation controller")]
struct Cli {
    /// Path to the server's TOML configuration file.
    #[arg(long, default_value = "helion.toml")]
    config: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    helion_shared::init_tracing();
    let cli = Cli::parse();

    info!(config_path = %cli.config, "starting helion-server");
    let server_config = ServerConfig::from_file(&cli.config)?;
    let store = Arc::new(Store::open(&server_config.database.path)?);

    let endpoints = server_config.driver_endpoints();
    let cache_ttl_defaults = server_config.cache_ttl_defaults();

    let world = DriverWorld { cache_ttl_defaults, cycle_deadline_ms: server_config.engine.cycle_deadline_ms as i64 };
    let mut driver = Driver::new(store.clone(), endpoints.clone(), world);
    let tick_interval = Duration::from_secs(server_config.engine.tick_interval_secs);

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(tick_interval);
        loop {
            ticker.tick().await;
            if let Err(err) = driver.refresh_tenants() {
                tracing::error!(error = %err, "failed to refresh tenant registry");
                continue;
            }
            driver.tick(chrono::Utc::now()).await;
        }
    });

    let app_state = AppState::new(store, endpoints, cache_ttl_defaults);
    let app = routes::router(app_state).layer(tower_http::cors::CorsLayer::permissive());

    let addr = format!("{}:{}", server_config.server.bind_address, server_config.server.port);
    info!(addr = %addr, "listening");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
