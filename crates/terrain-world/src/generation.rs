//! Fallback generation for tiles with no saved data.

use terrain_common::{TILE_HEIGHT, TILE_WIDTH};
use terrain_kernel::{TerrainCell, TerrainMaterial, TileBuffer, MAX_COORD};

/// Fills `buffer` with the placeholder terrain: all Air, every cell's
/// original coordinate set to its own position wrapped to the field width.
pub fn generate_tile(buffer: &mut TileBuffer) {
    for y in 0..TILE_HEIGHT {
        let row_y = y as u8 & MAX_COORD;
        for x in 0..TILE_WIDTH {
            *buffer.cell_mut(x, y) = TerrainCell::new(TerrainMaterial::Air, x as u8 & MAX_COORD, row_y);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_tile_is_air() {
        let mut buffer = TileBuffer::new();
        buffer.fill(TerrainCell::from_rgba(0xFF, 0xFF, 0xFF, 0xFF));
        generate_tile(&mut buffer);

        assert!(buffer.cells().iter().all(|c| c.material() == TerrainMaterial::Air));
        assert!(buffer.cells().iter().all(|c| c.extra() == 0));
    }

    #[test]
    fn test_generated_coordinates_wrap() {
        let mut buffer = TileBuffer::new();
        generate_tile(&mut buffer);

        let cell = buffer.cell(5, 9);
        assert_eq!((cell.original_x(), cell.original_y()), (5, 9));
        let cell = buffer.cell(200, 70);
        assert_eq!((cell.original_x(), cell.original_y()), (200 & 63, 70 & 63));
    }
}
