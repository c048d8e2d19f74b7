//! CPU reference backend.
//!
//! Runs the reference rule on host memory. Used headless when no GPU adapter
//! is available and as the oracle in tests.

use std::cell::RefCell;

use terrain_common::BackendError;
use tracing::{debug, trace};

use crate::backend::{KernelPass, PassReport, PassTicket, SimulationBackend};
use crate::rules::{self, Neighborhood};
use crate::tile_buffer::TileBuffer;

/// A tile texture in host memory.
#[derive(Debug, Default)]
pub struct CpuTexture {
    cells: RefCell<TileBuffer>,
}

impl CpuTexture {
    /// Copy of the current contents.
    #[must_use]
    pub fn snapshot(&self) -> TileBuffer {
        self.cells.borrow().clone()
    }
}

/// Backend executing the reference rule on the CPU.
pub struct CpuBackend {
    pending: Vec<KernelPass<CpuTexture>>,
    presentation_enabled: bool,
    passes_executed: u64,
}

impl Default for CpuBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl CpuBackend {
    /// Creates a backend with presentation enabled.
    #[must_use]
    pub fn new() -> Self {
        Self {
            pending: Vec::new(),
            presentation_enabled: true,
            passes_executed: 0,
        }
    }

    /// Whether the interactive view is currently presented.
    #[must_use]
    pub const fn presentation_enabled(&self) -> bool {
        self.presentation_enabled
    }

    /// Total passes executed since creation.
    #[must_use]
    pub const fn passes_executed(&self) -> u64 {
        self.passes_executed
    }

    /// Number of passes waiting for the next flush.
    #[must_use]
    pub fn pending_passes(&self) -> usize {
        self.pending.len()
    }

    /// Drops every queued pass without running it, returning how many.
    pub fn discard_pending(&mut self) -> usize {
        let discarded = self.pending.len();
        self.pending.clear();
        discarded
    }
}

impl SimulationBackend for CpuBackend {
    type Texture = CpuTexture;

    fn create_texture(&mut self, data: &TileBuffer) -> Result<CpuTexture, BackendError> {
        Ok(CpuTexture {
            cells: RefCell::new(data.clone()),
        })
    }

    fn upload(&mut self, texture: &CpuTexture, data: &TileBuffer) -> Result<(), BackendError> {
        texture
            .cells
            .borrow_mut()
            .import_from(data.as_bytes())
            .map_err(|e| BackendError::KernelFailed(e.to_string()))
    }

    fn read_back(&mut self, texture: &CpuTexture, into: &mut TileBuffer) -> Result<(), BackendError> {
        into.import_from(texture.cells.borrow().as_bytes())
            .map_err(|e| BackendError::ReadbackFailed(e.to_string()))
    }

    fn schedule(&mut self, pass: KernelPass<CpuTexture>) -> PassTicket {
        let ticket = PassTicket::new(self.pending.len());
        trace!("Scheduled CPU pass {}", ticket.index());
        self.pending.push(pass);
        ticket
    }

    fn flush(&mut self) -> Result<PassReport, BackendError> {
        let passes = std::mem::take(&mut self.pending);

        // Compute every output before writing any, so in-place passes and
        // neighbors of in-place tiles still read pre-flush state.
        let mut outputs = Vec::with_capacity(passes.len());
        for pass in &passes {
            let input = pass.input.cells.borrow();
            let boundaries: Vec<_> = pass
                .boundaries
                .iter()
                .map(|b| b.as_ref().map(|t| t.cells.borrow()))
                .collect();
            let links = std::array::from_fn(|i| boundaries[i].as_deref());

            let mut output = TileBuffer::new();
            let changed = rules::step(&Neighborhood::new(&input, links), &mut output);
            outputs.push((output, changed));
        }

        let mut changed = Vec::with_capacity(passes.len());
        for (pass, (output, pass_changed)) in passes.iter().zip(outputs) {
            *pass.output.cells.borrow_mut() = output;
            changed.push(pass_changed);
        }

        self.passes_executed += passes.len() as u64;
        debug!("CPU flush executed {} passes", passes.len());
        Ok(PassReport::new(changed))
    }

    fn set_presentation_enabled(&mut self, enabled: bool) {
        self.presentation_enabled = enabled;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::TerrainCell;
    use crate::material::TerrainMaterial;
    use std::rc::Rc;
    use terrain_common::NeighborSlot;

    fn shared(texture: CpuTexture) -> Rc<CpuTexture> {
        Rc::new(texture)
    }

    fn sand_column_tile() -> TileBuffer {
        let mut tile = TileBuffer::new();
        tile.fill(TerrainCell::new(TerrainMaterial::Air, 0, 0));
        *tile.cell_mut(5, 0) = TerrainCell::new(TerrainMaterial::Sand, 5, 0);
        tile
    }

    #[test]
    fn test_flush_runs_double_buffered_pass() {
        let mut backend = CpuBackend::new();
        let input = shared(backend.create_texture(&sand_column_tile()).expect("create"));
        let output = shared(backend.create_texture(&TileBuffer::new()).expect("create"));

        let ticket = backend.schedule(KernelPass {
            input: Rc::clone(&input),
            output: Rc::clone(&output),
            boundaries: Default::default(),
            seed: 7,
        });
        assert_eq!(backend.pending_passes(), 1);

        let report = backend.flush().expect("flush");
        assert!(report.changed(ticket).expect("ticket"));
        assert_eq!(backend.pending_passes(), 0);
        assert_eq!(backend.passes_executed(), 1);

        assert_eq!(input.snapshot().cell(5, 0).material(), TerrainMaterial::Sand);
        assert_eq!(output.snapshot().cell(5, 1).material(), TerrainMaterial::Sand);
    }

    #[test]
    fn test_in_place_pass_stages_input() {
        let mut backend = CpuBackend::new();
        let texture = shared(backend.create_texture(&sand_column_tile()).expect("create"));

        backend.schedule(KernelPass {
            input: Rc::clone(&texture),
            output: Rc::clone(&texture),
            boundaries: Default::default(),
            seed: 0,
        });
        backend.flush().expect("flush");

        let cells = texture.snapshot();
        assert_eq!(cells.cell(5, 0).material(), TerrainMaterial::Air);
        assert_eq!(cells.cell(5, 1).material(), TerrainMaterial::Sand);
        assert_eq!(cells.cell(5, 2).material(), TerrainMaterial::Air);
    }

    #[test]
    fn test_neighbors_read_pre_flush_state() {
        let mut backend = CpuBackend::new();

        let mut upper = TileBuffer::new();
        upper.fill(TerrainCell::new(TerrainMaterial::Air, 0, 0));
        *upper.cell_mut(3, 255) = TerrainCell::new(TerrainMaterial::Sand, 3, 63);
        let mut lower = TileBuffer::new();
        lower.fill(TerrainCell::new(TerrainMaterial::Air, 0, 0));

        let upper_tex = shared(backend.create_texture(&upper).expect("create"));
        let lower_tex = shared(backend.create_texture(&lower).expect("create"));

        let mut upper_links: [Option<Rc<CpuTexture>>; 8] = Default::default();
        upper_links[NeighborSlot::Bottom.index()] = Some(Rc::clone(&lower_tex));
        let mut lower_links: [Option<Rc<CpuTexture>>; 8] = Default::default();
        lower_links[NeighborSlot::Top.index()] = Some(Rc::clone(&upper_tex));

        // Both in place: the second pass must not observe the first one's write.
        backend.schedule(KernelPass {
            input: Rc::clone(&upper_tex),
            output: Rc::clone(&upper_tex),
            boundaries: upper_links,
            seed: 0,
        });
        backend.schedule(KernelPass {
            input: Rc::clone(&lower_tex),
            output: Rc::clone(&lower_tex),
            boundaries: lower_links,
            seed: 0,
        });
        let report = backend.flush().expect("flush");
        assert_eq!(report.changed_count(), 2);

        assert_eq!(upper_tex.snapshot().cell(3, 255).material(), TerrainMaterial::Air);
        assert_eq!(lower_tex.snapshot().cell(3, 0).material(), TerrainMaterial::Sand);
    }

    #[test]
    fn test_upload_and_read_back() {
        let mut backend = CpuBackend::new();
        let texture = backend.create_texture(&TileBuffer::new()).expect("create");
        let data = sand_column_tile();
        backend.upload(&texture, &data).expect("upload");

        let mut out = TileBuffer::new();
        backend.read_back(&texture, &mut out).expect("read back");
        assert_eq!(out, data);
    }
}
