//! Headless run loop.
//!
//! Streams the configured window in, steps the simulation and unloads
//! everything on shutdown.

use anyhow::{Context, Result};
use std::time::Instant;
use tracing::{debug, info, warn};

use terrain_kernel::{CpuBackend, GpuBackend, SimulationBackend};
use terrain_world::TerrainManager;

use crate::config::{BackendKind, TerrainConfig};

/// Totals of one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Tiles streamed in at startup
    pub loaded: usize,
    /// Steps completed
    pub steps: u32,
    /// Passes whose output differed from their input
    pub changed: usize,
    /// Tiles unloaded on shutdown
    pub unloaded: usize,
}

/// Runs the terrain with the configured backend.
pub fn run(config: &TerrainConfig) -> Result<()> {
    info!("Configuration loaded:");
    info!("  World: {} ({})", config.world_name, config.save_path.display());
    info!("  Window: {:?} ({} tiles)", config.window, config.window.len());
    info!("  Double buffering: {}", config.double_buffering);
    info!("  Read only: {}", config.read_only);

    let summary = match config.backend {
        BackendKind::Gpu => match GpuBackend::headless() {
            Ok(backend) => {
                info!("Using GPU backend");
                simulate(backend, config)?
            },
            Err(e) => {
                warn!("GPU backend unavailable ({e}), falling back to CPU");
                simulate(CpuBackend::new(), config)?
            },
        },
        BackendKind::Cpu => {
            info!("Using CPU backend");
            simulate(CpuBackend::new(), config)?
        },
    };

    info!(
        "Ran {} steps over {} tiles, {} changed passes, {} tiles unloaded",
        summary.steps, summary.loaded, summary.changed, summary.unloaded
    );
    Ok(())
}

/// Loads the window, runs `config.steps` steps and unloads every tile.
pub fn simulate<B: SimulationBackend>(backend: B, config: &TerrainConfig) -> Result<RunSummary> {
    let mut terrain = TerrainManager::new(backend, config.tile_store(), config.terrain_settings());
    let mut summary = RunSummary::default();

    let start = Instant::now();
    summary.loaded = terrain
        .stream_window(config.window)
        .context("Failed to load tile window")?
        .len();
    info!("Loaded {} tiles in {:.2?}", summary.loaded, start.elapsed());

    let start = Instant::now();
    for _ in 0..config.steps {
        let stats = terrain.step_simulation().context("Simulation step failed")?;
        debug!(
            "Frame {}: {} passes, {} changed, {} swapped",
            stats.frame, stats.passes, stats.changed, stats.swapped
        );
        summary.changed += stats.changed;
        summary.steps += 1;
    }
    if summary.steps > 0 {
        let elapsed = start.elapsed();
        info!(
            "Simulated {} steps in {:.2?} ({:.2?}/step)",
            summary.steps,
            elapsed,
            elapsed / summary.steps
        );
    }

    summary.unloaded = terrain.unload_all();
    Ok(summary)
}
