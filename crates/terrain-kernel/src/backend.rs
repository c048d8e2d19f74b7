//! Simulation backend interface.
//!
//! The backend owns the textures tiles simulate on and executes one kernel
//! pass per tile per step. Passes are only scheduled by [`SimulationBackend::schedule`];
//! nothing runs until the single blocking [`SimulationBackend::flush`], which
//! executes every scheduled pass against the state the textures had before the
//! flush began.

use std::ops::{Deref, DerefMut};
use std::rc::Rc;

use terrain_common::{BackendError, NeighborSlot};
use tracing::debug;

use crate::tile_buffer::TileBuffer;

/// One scheduled kernel invocation.
pub struct KernelPass<T> {
    /// Texture the kernel reads the tile from.
    pub input: Rc<T>,
    /// Texture the kernel writes to. May be `input` itself when the tile is
    /// single-buffered; the backend stages the input in that case.
    pub output: Rc<T>,
    /// Read-only boundary inputs, indexed by [`NeighborSlot::index`].
    pub boundaries: [Option<Rc<T>>; 8],
    /// Per-pass random seed.
    pub seed: u32,
}

impl<T> KernelPass<T> {
    /// Boundary texture in `slot`, if a neighbor is linked there.
    #[must_use]
    pub fn boundary(&self, slot: NeighborSlot) -> Option<&Rc<T>> {
        self.boundaries[slot.index()].as_ref()
    }

    /// Whether the kernel writes into the texture it reads.
    #[must_use]
    pub fn is_in_place(&self) -> bool {
        Rc::ptr_eq(&self.input, &self.output)
    }
}

/// Handle to a scheduled pass, valid until the next flush completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PassTicket(usize);

impl PassTicket {
    /// Creates a ticket for the pass at `index` in schedule order.
    #[must_use]
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    /// Index in schedule order.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

/// Outcome of one flush.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassReport {
    changed: Vec<bool>,
}

impl PassReport {
    /// Creates a report from per-pass change flags, in schedule order.
    #[must_use]
    pub fn new(changed: Vec<bool>) -> Self {
        Self { changed }
    }

    /// Whether the pass wrote output that differs from its input.
    pub fn changed(&self, ticket: PassTicket) -> Result<bool, BackendError> {
        self.changed
            .get(ticket.index())
            .copied()
            .ok_or(BackendError::UnknownTicket(ticket.index()))
    }

    /// Number of executed passes.
    #[must_use]
    pub fn pass_count(&self) -> usize {
        self.changed.len()
    }

    /// Number of passes whose output changed.
    #[must_use]
    pub fn changed_count(&self) -> usize {
        self.changed.iter().filter(|c| **c).count()
    }
}

/// Executes the per-tile simulation kernel.
pub trait SimulationBackend {
    /// Texture resource holding one tile's cells.
    type Texture;

    /// Creates a texture initialized from `data`.
    fn create_texture(&mut self, data: &TileBuffer) -> Result<Self::Texture, BackendError>;

    /// Overwrites a texture with `data`.
    fn upload(&mut self, texture: &Self::Texture, data: &TileBuffer) -> Result<(), BackendError>;

    /// Copies a texture into `into`, overwriting all of it.
    fn read_back(&mut self, texture: &Self::Texture, into: &mut TileBuffer) -> Result<(), BackendError>;

    /// Queues a pass for the next flush.
    fn schedule(&mut self, pass: KernelPass<Self::Texture>) -> PassTicket;

    /// Executes every scheduled pass, blocking until done.
    ///
    /// On error no pass result is reported and the queue is cleared.
    fn flush(&mut self) -> Result<PassReport, BackendError>;

    /// Enables or disables presentation of the interactive view.
    fn set_presentation_enabled(&mut self, enabled: bool);
}

/// Keeps interactive presentation disabled while alive.
///
/// Re-enables presentation on drop, so every exit path (including `?` on a
/// failed flush) restores it.
pub struct PresentationPause<'a, B: SimulationBackend + ?Sized> {
    backend: &'a mut B,
}

impl<'a, B: SimulationBackend + ?Sized> PresentationPause<'a, B> {
    /// Disables presentation until the guard is dropped.
    pub fn new(backend: &'a mut B) -> Self {
        debug!("Pausing interactive presentation");
        backend.set_presentation_enabled(false);
        Self { backend }
    }
}

impl<B: SimulationBackend + ?Sized> Deref for PresentationPause<'_, B> {
    type Target = B;

    fn deref(&self) -> &Self::Target {
        self.backend
    }
}

impl<B: SimulationBackend + ?Sized> DerefMut for PresentationPause<'_, B> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.backend
    }
}

impl<B: SimulationBackend + ?Sized> Drop for PresentationPause<'_, B> {
    fn drop(&mut self) {
        self.backend.set_presentation_enabled(true);
        debug!("Restored interactive presentation");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::CpuBackend;

    #[test]
    fn test_report_lookup() {
        let report = PassReport::new(vec![true, false]);
        assert!(report.changed(PassTicket::new(0)).expect("known ticket"));
        assert!(!report.changed(PassTicket::new(1)).expect("known ticket"));
        assert!(matches!(
            report.changed(PassTicket::new(2)),
            Err(BackendError::UnknownTicket(2))
        ));
        assert_eq!(report.changed_count(), 1);
        assert_eq!(report.pass_count(), 2);
    }

    #[test]
    fn test_pause_restores_presentation() {
        let mut backend = CpuBackend::new();
        {
            let paused = PresentationPause::new(&mut backend);
            assert!(!paused.presentation_enabled());
        }
        assert!(backend.presentation_enabled());
    }

    #[test]
    fn test_in_place_detection() {
        let texture = Rc::new(0_u8);
        let pass = KernelPass {
            input: Rc::clone(&texture),
            output: Rc::clone(&texture),
            boundaries: Default::default(),
            seed: 0,
        };
        assert!(pass.is_in_place());
        assert!(pass.boundary(NeighborSlot::Top).is_none());
    }
}
