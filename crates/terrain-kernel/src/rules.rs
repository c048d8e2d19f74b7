//! Reference simulation rule.
//!
//! Falling materials (sand, water) drop one row per step into air. The rule
//! is written as a gather: every output cell is computed from input cells
//! only, so passes over neighboring tiles agree on which particle crossed an
//! edge without seeing each other's output. The GPU kernel in
//! [`crate::gpu`] implements the same rule.

use terrain_common::{NeighborSlot, TILE_HEIGHT, TILE_WIDTH};

use crate::cell::TerrainCell;
use crate::material::TerrainMaterial;
use crate::tile_buffer::TileBuffer;

/// A tile and its linked boundary tiles, addressed in one coordinate space.
pub struct Neighborhood<'a> {
    center: &'a TileBuffer,
    boundaries: [Option<&'a TileBuffer>; 8],
}

impl<'a> Neighborhood<'a> {
    /// Creates a neighborhood; `boundaries` is indexed by [`NeighborSlot::index`].
    #[must_use]
    pub fn new(center: &'a TileBuffer, boundaries: [Option<&'a TileBuffer>; 8]) -> Self {
        Self { center, boundaries }
    }

    /// Cell at (x, y) relative to the center tile's origin.
    ///
    /// Coordinates one step outside the tile read the matching neighbor;
    /// unlinked neighbors read as Invalid, which nothing moves into.
    #[must_use]
    pub fn cell(&self, x: i32, y: i32) -> TerrainCell {
        let width = TILE_WIDTH as i32;
        let height = TILE_HEIGHT as i32;
        let dx = edge_offset(x, width);
        let dy = edge_offset(y, height);
        let (lx, ly) = (x.rem_euclid(width) as u32, y.rem_euclid(height) as u32);

        match NeighborSlot::from_offset(dx, dy) {
            None => *self.center.cell(lx, ly),
            Some(slot) => self.boundaries[slot.index()]
                .map_or(TerrainCell::INVALID, |tile| *tile.cell(lx, ly)),
        }
    }
}

fn edge_offset(v: i32, size: i32) -> i32 {
    if v < 0 {
        -1
    } else if v >= size {
        1
    } else {
        0
    }
}

/// Next state of the cell at (x, y).
#[must_use]
pub fn next_cell(hood: &Neighborhood<'_>, x: i32, y: i32) -> TerrainCell {
    let cell = hood.cell(x, y);
    let material = cell.material();

    if material == TerrainMaterial::Air {
        let above = hood.cell(x, y - 1);
        if above.material().falls() {
            return above;
        }
    } else if material.falls() {
        let below = hood.cell(x, y + 1);
        if below.material() == TerrainMaterial::Air {
            return below;
        }
    }

    cell
}

/// Runs one step of the rule, returning whether any cell changed.
///
/// `output` is fully overwritten.
pub fn step(hood: &Neighborhood<'_>, output: &mut TileBuffer) -> bool {
    let mut changed = false;
    for y in 0..TILE_HEIGHT {
        for x in 0..TILE_WIDTH {
            let next = next_cell(hood, x as i32, y as i32);
            changed |= next != *hood.center.cell(x, y);
            *output.cell_mut(x, y) = next;
        }
    }
    changed
}
