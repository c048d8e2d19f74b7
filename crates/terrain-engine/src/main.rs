//! # Terrain Engine
//!
//! Headless driver for the tile-streaming terrain.
//!
//! Loads the configured tile window, runs the configured number of
//! simulation steps and unloads everything, saving tiles unless the world
//! is read-only.
//!
//! Usage: `terrain [CONFIG]` (default `terrain.toml`, written with the
//! defaults when missing).

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(clippy::unwrap_used)]

mod app;
mod config;

use anyhow::Result;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::TerrainConfig;

/// Main entry point.
fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive("terrain=info".parse()?))
        .init();

    info!("Terrain starting...");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| config::CONFIG_FILE.to_string());
    let mut config = TerrainConfig::load_or_create(&config_path);
    config.validate();

    app::run(&config)?;

    info!("Terrain shutdown complete");
    Ok(())
}
