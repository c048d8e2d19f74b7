//! A streaming tile and its simulation buffers.
//!
//! A tile owns its front texture and, when double buffered, a back texture the
//! kernel writes into. Neighbor boundary textures are held weakly so a tile
//! never keeps an unloaded neighbor's texture alive.

use std::rc::{Rc, Weak};

use terrain_common::{BackendError, NeighborSlot, TileCoord};
use tracing::{debug, trace};

use crate::backend::{KernelPass, PassReport, PassTicket, SimulationBackend};

/// Lifecycle state of a loaded tile.
///
/// A tile that is not in the manager's map is unloaded; there is no state
/// for it here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileState {
    /// Created, data being loaded or generated and neighbors wired
    Loading,
    /// Fully loaded and simulating
    Ready,
    /// Removed from the live set, waiting for destruction
    Unloading,
}

/// Deterministic scene name of the tile at `coord`.
#[must_use]
pub fn tile_name(coord: TileCoord) -> String {
    format!("Tile {coord}")
}

/// A fixed-size streaming unit of the terrain.
pub struct Tile<T> {
    coord: TileCoord,
    name: String,
    state: TileState,
    /// Front and back textures; both entries are the same texture when
    /// single-buffered.
    buffers: [Rc<T>; 2],
    front: usize,
    double_buffering: bool,
    neighbors: [Option<Weak<T>>; 8],
    pending: Option<PassTicket>,
    generation: u64,
}

impl<T> Tile<T> {
    /// Creates a tile in the Loading state.
    ///
    /// `back` enables double buffering.
    #[must_use]
    pub fn new(coord: TileCoord, front: T, back: Option<T>) -> Self {
        let front = Rc::new(front);
        let double_buffering = back.is_some();
        let back = back.map_or_else(|| Rc::clone(&front), Rc::new);

        Self {
            coord,
            name: tile_name(coord),
            state: TileState::Loading,
            buffers: [front, back],
            front: 0,
            double_buffering,
            neighbors: Default::default(),
            pending: None,
            generation: 0,
        }
    }

    /// Tile coordinate.
    #[must_use]
    pub const fn coord(&self) -> TileCoord {
        self.coord
    }

    /// Scene name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Lifecycle state.
    #[must_use]
    pub const fn state(&self) -> TileState {
        self.state
    }

    /// Whether the kernel writes into a separate back texture.
    #[must_use]
    pub const fn is_double_buffered(&self) -> bool {
        self.double_buffering
    }

    /// Number of completed simulation passes.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether a pass is scheduled and not yet swapped.
    #[must_use]
    pub const fn has_pending_pass(&self) -> bool {
        self.pending.is_some()
    }

    /// Current texture: simulation input and render source.
    #[must_use]
    pub fn data_texture(&self) -> &Rc<T> {
        &self.buffers[self.front]
    }

    fn back_texture(&self) -> &Rc<T> {
        &self.buffers[1 - self.front]
    }

    /// Boundary texture linked in `slot`, if its owner is still alive.
    #[must_use]
    pub fn neighbor_texture(&self, slot: NeighborSlot) -> Option<Rc<T>> {
        self.neighbors[slot.index()].as_ref().and_then(Weak::upgrade)
    }

    /// Number of slots holding a live neighbor texture.
    #[must_use]
    pub fn linked_neighbor_count(&self) -> usize {
        NeighborSlot::ALL
            .iter()
            .filter(|slot| self.neighbor_texture(**slot).is_some())
            .count()
    }

    /// Loading → Ready.
    pub fn mark_ready(&mut self) {
        assert_eq!(self.state, TileState::Loading, "{} is not loading", self.name);
        self.state = TileState::Ready;
        debug!("{} ready", self.name);
    }

    /// Ready → Unloading.
    ///
    /// Renames the tile so its name is free for a future load of the same
    /// coordinate, and drops every neighbor link and pending pass.
    pub fn begin_unload(&mut self) {
        assert_eq!(self.state, TileState::Ready, "{} is not ready", self.name);
        self.state = TileState::Unloading;
        self.name = format!("{} (unloading)", tile_name(self.coord));
        self.neighbors = Default::default();
        self.pending = None;
        debug!("{} marked for destruction", self.name);
    }

    /// Updates the texture received from the tile at `coord`.
    ///
    /// `coord == self.coord()` replaces this tile's own front texture. Any
    /// other coordinate must be in the 8-connected ring; `None` clears the
    /// slot.
    pub fn set_neighbor_texture(&mut self, coord: TileCoord, texture: Option<&Rc<T>>) {
        if coord == self.coord {
            let Some(texture) = texture else {
                panic!("{} cannot clear its own texture", self.name);
            };
            self.buffers[self.front] = Rc::clone(texture);
            if !self.double_buffering {
                self.buffers[1 - self.front] = Rc::clone(texture);
            }
            trace!("{} replaced its own texture", self.name);
            return;
        }

        let Some(slot) = self.coord.slot_of(coord) else {
            panic!("{coord} is not a neighbor of {}", self.name);
        };
        self.neighbors[slot.index()] = texture.map(Rc::downgrade);
        trace!(
            "{} {} {}",
            self.name,
            if texture.is_some() { "linked" } else { "cleared" },
            slot.binding_name()
        );
    }

    /// Schedules one kernel pass for this tile.
    ///
    /// Double buffered: reads the front texture and writes the back one.
    /// Single buffered: input and output are the same texture.
    pub fn run_simulation_pass<B>(&mut self, backend: &mut B, seed: u32) -> PassTicket
    where
        B: SimulationBackend<Texture = T> + ?Sized,
    {
        assert_eq!(self.state, TileState::Ready, "{} is not ready", self.name);
        debug_assert!(self.pending.is_none(), "{} already has a pass scheduled", self.name);

        let boundaries =
            std::array::from_fn(|i| self.neighbors[i].as_ref().and_then(Weak::upgrade));
        let ticket = backend.schedule(KernelPass {
            input: Rc::clone(self.data_texture()),
            output: Rc::clone(self.back_texture()),
            boundaries,
            seed,
        });
        self.pending = Some(ticket);
        ticket
    }

    /// Completes the scheduled pass after the backend flushed.
    ///
    /// Promotes the back texture to front when it is a distinct texture and
    /// the pass changed something. Returns whether the front texture changed
    /// identity, which is when neighbors need the new texture.
    pub fn swap_buffer(&mut self, report: &PassReport) -> Result<bool, BackendError> {
        let Some(ticket) = self.pending.take() else {
            return Ok(false);
        };
        let changed = report.changed(ticket)?;
        self.generation += 1;

        if self.double_buffering && changed {
            self.front = 1 - self.front;
            trace!("{} swapped to buffer {}", self.name, self.front);
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// Forgets a scheduled pass whose flush failed.
    pub fn discard_pending(&mut self) {
        self.pending = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::TerrainCell;
    use crate::cpu::{CpuBackend, CpuTexture};
    use crate::material::TerrainMaterial;
    use crate::tile_buffer::TileBuffer;

    fn air() -> TileBuffer {
        let mut buffer = TileBuffer::new();
        buffer.fill(TerrainCell::new(TerrainMaterial::Air, 0, 0));
        buffer
    }

    fn ready_tile(backend: &mut CpuBackend, coord: TileCoord, data: &TileBuffer, double: bool) -> Tile<CpuTexture> {
        let front = backend.create_texture(data).expect("create");
        let back = double.then(|| backend.create_texture(data).expect("create"));
        let mut tile = Tile::new(coord, front, back);
        tile.mark_ready();
        tile
    }

    #[test]
    fn test_name_and_lifecycle() {
        let mut backend = CpuBackend::new();
        let mut tile = ready_tile(&mut backend, TileCoord::new(2, -3), &air(), true);
        assert_eq!(tile.name(), "Tile [2, -3]");
        assert_eq!(tile.state(), TileState::Ready);

        tile.begin_unload();
        assert_eq!(tile.state(), TileState::Unloading);
        assert_eq!(tile.name(), "Tile [2, -3] (unloading)");
    }

    #[test]
    #[should_panic(expected = "is not loading")]
    fn test_ready_twice_panics() {
        let mut backend = CpuBackend::new();
        let mut tile = ready_tile(&mut backend, TileCoord::new(0, 0), &air(), false);
        tile.mark_ready();
    }

    #[test]
    fn test_double_buffered_swap() {
        let mut backend = CpuBackend::new();
        let mut data = air();
        *data.cell_mut(0, 0) = TerrainCell::new(TerrainMaterial::Sand, 0, 0);
        let mut tile = ready_tile(&mut backend, TileCoord::new(0, 0), &data, true);
        let before = Rc::clone(tile.data_texture());

        tile.run_simulation_pass(&mut backend, 1);
        let report = backend.flush().expect("flush");
        assert!(tile.swap_buffer(&report).expect("swap"));
        assert!(!Rc::ptr_eq(&before, tile.data_texture()));
        assert_eq!(tile.generation(), 1);
        assert_eq!(tile.data_texture().snapshot().cell(0, 1).material(), TerrainMaterial::Sand);
    }

    #[test]
    fn test_unchanged_pass_does_not_swap() {
        let mut backend = CpuBackend::new();
        let mut tile = ready_tile(&mut backend, TileCoord::new(0, 0), &air(), true);
        let before = Rc::clone(tile.data_texture());

        tile.run_simulation_pass(&mut backend, 1);
        let report = backend.flush().expect("flush");
        assert!(!tile.swap_buffer(&report).expect("swap"));
        assert!(Rc::ptr_eq(&before, tile.data_texture()));
        assert_eq!(tile.generation(), 1);
    }

    #[test]
    fn test_single_buffered_pass_is_in_place() {
        let mut backend = CpuBackend::new();
        let mut data = air();
        *data.cell_mut(3, 3) = TerrainCell::new(TerrainMaterial::Water, 3, 3);
        let mut tile = ready_tile(&mut backend, TileCoord::new(0, 0), &data, false);
        assert!(!tile.is_double_buffered());

        tile.run_simulation_pass(&mut backend, 0);
        let report = backend.flush().expect("flush");
        assert_eq!(report.changed_count(), 1);
        assert!(!tile.swap_buffer(&report).expect("swap"));
        assert_eq!(tile.data_texture().snapshot().cell(3, 4).material(), TerrainMaterial::Water);
    }

    #[test]
    fn test_neighbor_links_are_weak() {
        let mut backend = CpuBackend::new();
        let mut tile = ready_tile(&mut backend, TileCoord::new(0, 0), &air(), true);
        let neighbor = Rc::new(backend.create_texture(&air()).expect("create"));

        tile.set_neighbor_texture(TileCoord::new(0, -1), Some(&neighbor));
        assert!(tile.neighbor_texture(NeighborSlot::Top).is_some());
        assert_eq!(tile.linked_neighbor_count(), 1);

        drop(neighbor);
        assert!(tile.neighbor_texture(NeighborSlot::Top).is_none());
    }

    #[test]
    fn test_set_own_texture() {
        let mut backend = CpuBackend::new();
        let mut tile = ready_tile(&mut backend, TileCoord::new(4, 4), &air(), false);
        let replacement = Rc::new(backend.create_texture(&TileBuffer::new()).expect("create"));

        tile.set_neighbor_texture(TileCoord::new(4, 4), Some(&replacement));
        assert!(Rc::ptr_eq(tile.data_texture(), &replacement));
        assert!(Rc::ptr_eq(tile.back_texture(), &replacement));
    }

    #[test]
    #[should_panic(expected = "is not a neighbor")]
    fn test_far_neighbor_panics() {
        let mut backend = CpuBackend::new();
        let mut tile = ready_tile(&mut backend, TileCoord::new(0, 0), &air(), false);
        tile.set_neighbor_texture(TileCoord::new(2, 0), None);
    }

    #[test]
    fn test_unload_clears_links() {
        let mut backend = CpuBackend::new();
        let mut tile = ready_tile(&mut backend, TileCoord::new(0, 0), &air(), true);
        let neighbor = Rc::new(backend.create_texture(&air()).expect("create"));
        tile.set_neighbor_texture(TileCoord::new(1, 1), Some(&neighbor));

        tile.begin_unload();
        assert_eq!(tile.linked_neighbor_count(), 0);
    }

    #[test]
    fn test_swap_without_pass_is_noop() {
        let mut backend = CpuBackend::new();
        let mut tile = ready_tile(&mut backend, TileCoord::new(0, 0), &air(), true);
        assert!(!tile.swap_buffer(&PassReport::default()).expect("swap"));
        assert_eq!(tile.generation(), 0);
    }
}
