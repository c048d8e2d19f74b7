//! Loaded tile set and the per-frame simulation step.
//!
//! The manager is the only owner of live tiles. It loads and unloads them,
//! wires neighbor links in both directions, and advances every loaded tile
//! exactly once per step.
//!
//! ## Step ordering
//!
//! 1. Destroy tiles unloaded since the last step, snapshot the loaded set
//! 2. Schedule one pass per snapshotted tile, at most one per tile
//! 3. Flush all passes at once
//! 4. Swap buffers; tiles whose front texture changed hand it to their
//!    loaded neighbors
//!
//! Presentation stays paused from step 2 through step 4.
//!
//! Every pass reads the state its neighbors had before the step, so the
//! order tiles are scheduled in never affects the result.

use std::collections::HashMap;
use std::rc::Rc;

use terrain_common::{NeighborSlot, TerrainError, TerrainResult, TileCoord, TileWindow};
use terrain_kernel::{PresentationPause, SimulationBackend, Tile, TileBuffer};
use tracing::{debug, error, info, warn};

use crate::generation::generate_tile;
use crate::persistence::TileStore;
use crate::scratch::ScratchSlot;

/// Simulation settings of a terrain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TerrainSettings {
    /// Give each tile a back texture so passes never write what they read
    pub double_buffering: bool,
    /// Seed mixed into every per-tile pass seed
    pub world_seed: u64,
}

impl Default for TerrainSettings {
    fn default() -> Self {
        Self {
            double_buffering: true,
            world_seed: 0,
        }
    }
}

/// Outcome of one simulation step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StepStats {
    /// Frame the step simulated
    pub frame: u64,
    /// Passes executed
    pub passes: usize,
    /// Passes whose output differed from their input
    pub changed: usize,
    /// Tiles whose front texture was replaced and propagated
    pub swapped: usize,
}

/// Owns the loaded tiles and drives the simulation.
pub struct TerrainManager<B: SimulationBackend> {
    backend: B,
    store: TileStore,
    settings: TerrainSettings,
    tiles: HashMap<TileCoord, Tile<B::Texture>>,
    /// Unloaded tiles waiting for destruction
    pending_destroy: Vec<Tile<B::Texture>>,
    scratch: ScratchSlot,
    frame: u64,
}

impl<B: SimulationBackend> TerrainManager<B> {
    /// Creates a manager with no tiles loaded.
    pub fn new(backend: B, store: TileStore, settings: TerrainSettings) -> Self {
        info!(
            "Creating terrain manager (world: {}, double buffering: {}, read-only: {})",
            store.world_dir().display(),
            settings.double_buffering,
            store.is_read_only()
        );
        Self {
            backend,
            store,
            settings,
            tiles: HashMap::new(),
            pending_destroy: Vec::new(),
            scratch: ScratchSlot::new(),
            frame: 0,
        }
    }

    /// The simulation backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// The simulation backend, mutable.
    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// The tile store.
    pub fn store(&self) -> &TileStore {
        &self.store
    }

    /// Simulation settings.
    pub const fn settings(&self) -> TerrainSettings {
        self.settings
    }

    /// Number of completed steps.
    pub const fn frame(&self) -> u64 {
        self.frame
    }

    /// The loaded tile at `coord`.
    pub fn tile(&self, coord: TileCoord) -> Option<&Tile<B::Texture>> {
        self.tiles.get(&coord)
    }

    /// Whether a tile is loaded at `coord`.
    pub fn is_loaded(&self, coord: TileCoord) -> bool {
        self.tiles.contains_key(&coord)
    }

    /// Number of loaded tiles.
    pub fn loaded_count(&self) -> usize {
        self.tiles.len()
    }

    /// Coordinates of every loaded tile, sorted.
    pub fn loaded_coords(&self) -> Vec<TileCoord> {
        let mut coords: Vec<_> = self.tiles.keys().copied().collect();
        coords.sort_unstable();
        coords
    }

    /// Number of unloaded tiles not yet destroyed.
    pub fn pending_destroy_count(&self) -> usize {
        self.pending_destroy.len()
    }

    /// Unloaded tiles not yet destroyed.
    pub fn unloading_tiles(&self) -> impl Iterator<Item = &Tile<B::Texture>> {
        self.pending_destroy.iter()
    }

    /// Drops the cached scratch buffer.
    pub fn reclaim_scratch(&mut self) -> bool {
        self.scratch.reclaim()
    }

    /// Returns the loaded tiles in the inclusive rectangle, row-major.
    ///
    /// With `force_load`, missing tiles are loaded first; without it, missing
    /// tiles are skipped and nothing is created.
    pub fn load_range(
        &mut self,
        min_x: i32,
        max_x: i32,
        min_y: i32,
        max_y: i32,
        force_load: bool,
    ) -> TerrainResult<Vec<TileCoord>> {
        self.load_window(TileWindow::new(min_x, max_x, min_y, max_y), force_load)
    }

    /// [`Self::load_range`] over a window.
    pub fn load_window(&mut self, window: TileWindow, force_load: bool) -> TerrainResult<Vec<TileCoord>> {
        let mut coords = Vec::with_capacity(window.len());
        let mut loaded = 0;
        for coord in window.coords() {
            if !self.tiles.contains_key(&coord) {
                if !force_load {
                    continue;
                }
                self.load_tile(coord)?;
                loaded += 1;
            }
            coords.push(coord);
        }
        if loaded > 0 {
            info!("Loaded {loaded} tiles ({} total)", self.tiles.len());
        }
        Ok(coords)
    }

    fn load_tile(&mut self, coord: TileCoord) -> TerrainResult<()> {
        assert!(!self.tiles.contains_key(&coord), "tile {coord} is already loaded");

        let buffer = self.scratch.get();
        if !self.store.try_load(coord, buffer) {
            debug!("Generating tile {coord}");
            generate_tile(buffer);
        }

        let front = self.backend.create_texture(buffer)?;
        let back = if self.settings.double_buffering {
            Some(self.backend.create_texture(buffer)?)
        } else {
            None
        };
        let mut tile = Tile::new(coord, front, back);

        for slot in NeighborSlot::ALL {
            let neighbor_coord = coord.neighbor(slot);
            if let Some(neighbor) = self.tiles.get_mut(&neighbor_coord) {
                tile.set_neighbor_texture(neighbor_coord, Some(neighbor.data_texture()));
                neighbor.set_neighbor_texture(coord, Some(tile.data_texture()));
            }
        }

        tile.mark_ready();
        self.tiles.insert(coord, tile);
        Ok(())
    }

    /// Unloads the tile at `coord`, returning whether one was loaded.
    ///
    /// Saves it first unless the store is read-only; a failed save is logged
    /// and does not stop the unload. The tile leaves the loaded set at once
    /// and is destroyed at the next [`Self::collect_unloaded`].
    pub fn unload(&mut self, coord: TileCoord) -> bool {
        let Some(tile) = self.tiles.get(&coord) else {
            warn!("Trying to unload tile {coord}, but it is not loaded");
            return false;
        };

        if !self.store.is_read_only() {
            match persist_tile(&mut self.backend, &self.store, &mut self.scratch, tile) {
                // The store already logged why the file was not written
                Ok(()) | Err(TerrainError::Persistence(_)) => {},
                Err(e) => warn!("Unloading {} without saving: {e}", tile.name()),
            }
        }

        for slot in NeighborSlot::ALL {
            if let Some(neighbor) = self.tiles.get_mut(&coord.neighbor(slot)) {
                neighbor.set_neighbor_texture(coord, None);
            }
        }

        let Some(mut tile) = self.tiles.remove(&coord) else {
            return false;
        };
        tile.begin_unload();
        debug!("Unloaded {}", tile.name());
        self.pending_destroy.push(tile);
        true
    }

    /// Unloads every loaded tile outside `window`, then loads the window.
    pub fn stream_window(&mut self, window: TileWindow) -> TerrainResult<Vec<TileCoord>> {
        let outside: Vec<_> = self
            .loaded_coords()
            .into_iter()
            .filter(|coord| !window.contains(*coord))
            .collect();
        for coord in &outside {
            self.unload(*coord);
        }
        if !outside.is_empty() {
            info!("Unloaded {} tiles outside {:?}", outside.len(), window);
        }
        self.load_window(window, true)
    }

    /// Unloads every tile and destroys them.
    pub fn unload_all(&mut self) -> usize {
        let coords = self.loaded_coords();
        for coord in &coords {
            self.unload(*coord);
        }
        self.collect_unloaded();
        info!("Unloaded all {} tiles", coords.len());
        coords.len()
    }

    /// Destroys tiles unloaded since the last call.
    pub fn collect_unloaded(&mut self) -> usize {
        let count = self.pending_destroy.len();
        self.pending_destroy.clear();
        if count > 0 {
            debug!("Destroyed {count} unloaded tiles");
        }
        count
    }

    /// Copies the current contents of a loaded tile back to the CPU.
    pub fn read_tile(&mut self, coord: TileCoord) -> TerrainResult<TileBuffer> {
        let tile = self.tiles.get(&coord).ok_or(TerrainError::TileNotLoaded(coord))?;
        let buffer = self.scratch.get();
        self.backend.read_back(tile.data_texture(), buffer)?;
        Ok(buffer.clone())
    }

    /// Overwrites the current contents of a loaded tile.
    ///
    /// Neighbors see the new data from the next step on.
    pub fn write_tile(&mut self, coord: TileCoord, data: &TileBuffer) -> TerrainResult<()> {
        let tile = self.tiles.get(&coord).ok_or(TerrainError::TileNotLoaded(coord))?;
        self.backend.upload(tile.data_texture(), data)?;
        debug!("Uploaded new data to {}", tile.name());
        Ok(())
    }

    /// Saves a loaded tile without unloading it.
    pub fn save_tile(&mut self, coord: TileCoord) -> TerrainResult<()> {
        let tile = self.tiles.get(&coord).ok_or(TerrainError::TileNotLoaded(coord))?;
        persist_tile(&mut self.backend, &self.store, &mut self.scratch, tile)
    }

    /// Advances every loaded tile by one pass.
    ///
    /// A backend failure aborts the step: no tile swaps, the frame counter
    /// does not advance, and the error is returned.
    pub fn step_simulation(&mut self) -> TerrainResult<StepStats> {
        self.collect_unloaded();
        let order = self.loaded_coords();
        self.step_in_order(&order)
    }

    /// [`Self::step_simulation`] scheduling tiles in the given order.
    ///
    /// Coordinates that are not loaded are skipped. The result does not
    /// depend on the order.
    pub fn step_simulation_ordered(&mut self, order: &[TileCoord]) -> TerrainResult<StepStats> {
        self.collect_unloaded();
        self.step_in_order(order)
    }

    fn step_in_order(&mut self, order: &[TileCoord]) -> TerrainResult<StepStats> {
        let frame = self.frame;
        let mut backend = PresentationPause::new(&mut self.backend);

        let mut scheduled = Vec::with_capacity(order.len());
        for coord in order {
            let Some(tile) = self.tiles.get_mut(coord) else {
                debug!("Skipping tile {coord}: not loaded");
                continue;
            };
            if tile.has_pending_pass() {
                debug!("Skipping tile {coord}: already scheduled this step");
                continue;
            }
            let seed = tile_seed(self.settings.world_seed, frame, *coord);
            tile.run_simulation_pass(&mut *backend, seed);
            scheduled.push(*coord);
        }

        let report = match backend.flush() {
            Ok(report) => report,
            Err(e) => {
                error!("Simulation step {frame} failed: {e}");
                discard_pending(&mut self.tiles, &scheduled);
                return Err(e.into());
            },
        };

        let mut swapped = Vec::new();
        for coord in &scheduled {
            let Some(tile) = self.tiles.get_mut(coord) else {
                continue;
            };
            match tile.swap_buffer(&report) {
                Ok(true) => swapped.push(*coord),
                Ok(false) => {},
                Err(e) => {
                    error!("Simulation step {frame} failed: {e}");
                    discard_pending(&mut self.tiles, &scheduled);
                    return Err(e.into());
                },
            }
        }

        // Only now hand out new front textures, so no pass above saw them.
        for coord in &swapped {
            let Some(texture) = self.tiles.get(coord).map(|tile| Rc::clone(tile.data_texture())) else {
                continue;
            };
            for slot in NeighborSlot::ALL {
                if let Some(neighbor) = self.tiles.get_mut(&coord.neighbor(slot)) {
                    neighbor.set_neighbor_texture(*coord, Some(&texture));
                }
            }
        }
        drop(backend);

        self.frame += 1;
        let stats = StepStats {
            frame,
            passes: report.pass_count(),
            changed: report.changed_count(),
            swapped: swapped.len(),
        };
        debug!(
            "Step {frame}: {} passes, {} changed, {} swapped",
            stats.passes, stats.changed, stats.swapped
        );
        Ok(stats)
    }
}

fn discard_pending<T>(tiles: &mut HashMap<TileCoord, Tile<T>>, scheduled: &[TileCoord]) {
    for coord in scheduled {
        if let Some(tile) = tiles.get_mut(coord) {
            tile.discard_pending();
        }
    }
}

/// Reads a tile back and saves it.
fn persist_tile<B: SimulationBackend>(
    backend: &mut B,
    store: &TileStore,
    scratch: &mut ScratchSlot,
    tile: &Tile<B::Texture>,
) -> TerrainResult<()> {
    let buffer = scratch.get();
    backend.read_back(tile.data_texture(), buffer)?;
    store.save(tile.coord(), buffer)?;
    Ok(())
}

/// Deterministic pass seed of the tile at `coord` in `frame`.
pub fn tile_seed(world_seed: u64, frame: u64, coord: TileCoord) -> u32 {
    let x = coord.x as u64;
    let y = coord.y as u64;
    let mixed = world_seed
        .wrapping_mul(0x0005_DEEC_E66D)
        .wrapping_add(frame.wrapping_mul(0x2545_F491_4F6C_DD1D))
        .wrapping_add(x.wrapping_mul(0x0123_4567))
        .wrapping_add(y.wrapping_mul(0x0765_4321));
    (mixed ^ (mixed >> 32)) as u32
}
