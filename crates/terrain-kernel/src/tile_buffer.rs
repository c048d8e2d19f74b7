//! CPU-side storage for one tile's cells.
//!
//! The buffer is a single contiguous byte array viewed as cells in place
//! (`bytemuck::cast_slice`); indexing hands out references, never copies.

use image::RgbaImage;
use terrain_common::{BufferError, LocalCoord, TILE_HEIGHT, TILE_WIDTH};

use crate::cell::{TerrainCell, BYTES_PER_CELL};

/// Number of cells in a tile.
pub const CELL_COUNT: usize = (TILE_WIDTH * TILE_HEIGHT) as usize;

/// Byte length of a tile buffer.
pub const DATA_LENGTH: usize = CELL_COUNT * BYTES_PER_CELL;

/// Byte length of one row of cells.
pub const BYTES_PER_ROW: usize = TILE_WIDTH as usize * BYTES_PER_CELL;

/// A fixed-size grid of cells backed by one byte array.
#[derive(Clone, PartialEq, Eq)]
pub struct TileBuffer {
    data: Box<[u8]>,
}

impl Default for TileBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TileBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TileBuffer")
            .field("width", &TILE_WIDTH)
            .field("height", &TILE_HEIGHT)
            .finish_non_exhaustive()
    }
}

impl TileBuffer {
    /// Tile width in cells.
    pub const WIDTH: u32 = TILE_WIDTH;
    /// Tile height in cells.
    pub const HEIGHT: u32 = TILE_HEIGHT;

    /// Creates a zeroed (all Invalid) buffer.
    #[must_use]
    pub fn new() -> Self {
        Self {
            data: vec![0; DATA_LENGTH].into_boxed_slice(),
        }
    }

    /// Wraps a foreign byte array, which must be exactly [`DATA_LENGTH`] long.
    pub fn from_bytes(data: Vec<u8>) -> Result<Self, BufferError> {
        check_length(data.len())?;
        Ok(Self {
            data: data.into_boxed_slice(),
        })
    }

    /// Creates a buffer from a tile image, which must be exactly tile-sized.
    pub fn from_image(image: &RgbaImage) -> Result<Self, BufferError> {
        let mut buffer = Self::new();
        buffer.import_image(image)?;
        Ok(buffer)
    }

    /// Raw bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Raw bytes, mutable.
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// All cells in row-major order.
    #[must_use]
    pub fn cells(&self) -> &[TerrainCell] {
        bytemuck::cast_slice(&self.data)
    }

    /// All cells in row-major order, mutable.
    pub fn cells_mut(&mut self) -> &mut [TerrainCell] {
        bytemuck::cast_slice_mut(&mut self.data)
    }

    /// One row of cells.
    #[must_use]
    pub fn row(&self, y: u32) -> &[TerrainCell] {
        assert!(y < TILE_HEIGHT, "row {y} out of range");
        let start = y as usize * TILE_WIDTH as usize;
        &self.cells()[start..start + TILE_WIDTH as usize]
    }

    /// Cell at (x, y). Out-of-range access is a programming error.
    #[must_use]
    pub fn cell(&self, x: u32, y: u32) -> &TerrainCell {
        &self.cells()[index(x, y)]
    }

    /// Mutable cell at (x, y). Out-of-range access is a programming error.
    pub fn cell_mut(&mut self, x: u32, y: u32) -> &mut TerrainCell {
        &mut self.cells_mut()[index(x, y)]
    }

    /// Sets every cell to `cell`.
    pub fn fill(&mut self, cell: TerrainCell) {
        self.cells_mut().fill(cell);
    }

    /// Overwrites the whole buffer in place.
    pub fn import_from(&mut self, data: &[u8]) -> Result<(), BufferError> {
        check_length(data.len())?;
        self.data.copy_from_slice(data);
        Ok(())
    }

    /// Overwrites the whole buffer from a tile-sized image.
    pub fn import_image(&mut self, image: &RgbaImage) -> Result<(), BufferError> {
        let (width, height) = image.dimensions();
        if width != TILE_WIDTH || height != TILE_HEIGHT {
            return Err(BufferError::WrongDimensions {
                expected_width: TILE_WIDTH,
                expected_height: TILE_HEIGHT,
                width,
                height,
            });
        }
        self.import_from(image.as_raw())
    }

    /// Writes the buffer verbatim into `image`, resizing it to the tile size.
    pub fn export_to(&self, image: &mut RgbaImage) {
        if image.dimensions() != (TILE_WIDTH, TILE_HEIGHT) {
            *image = RgbaImage::new(TILE_WIDTH, TILE_HEIGHT);
        }
        image.copy_from_slice(&self.data);
    }

    /// Writes the buffer verbatim into a new image.
    #[must_use]
    pub fn to_image(&self) -> RgbaImage {
        let mut image = RgbaImage::new(TILE_WIDTH, TILE_HEIGHT);
        self.export_to(&mut image);
        image
    }
}

impl std::ops::Index<(u32, u32)> for TileBuffer {
    type Output = TerrainCell;

    fn index(&self, (x, y): (u32, u32)) -> &Self::Output {
        self.cell(x, y)
    }
}

impl std::ops::IndexMut<(u32, u32)> for TileBuffer {
    fn index_mut(&mut self, (x, y): (u32, u32)) -> &mut Self::Output {
        self.cell_mut(x, y)
    }
}

fn index(x: u32, y: u32) -> usize {
    assert!(
        x < TILE_WIDTH && y < TILE_HEIGHT,
        "cell ({x}, {y}) outside {TILE_WIDTH}x{TILE_HEIGHT} tile"
    );
    LocalCoord::new(x, y).to_index()
}

fn check_length(actual: usize) -> Result<(), BufferError> {
    if actual == DATA_LENGTH {
        Ok(())
    } else {
        Err(BufferError::LengthMismatch {
            expected: DATA_LENGTH,
            actual,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::material::TerrainMaterial;

    #[test]
    fn test_data_length() {
        assert_eq!(DATA_LENGTH, 256 * 256 * 4);
        assert_eq!(TileBuffer::new().as_bytes().len(), DATA_LENGTH);
        assert_eq!(TileBuffer::new().cells().len(), CELL_COUNT);
    }

    #[test]
    fn test_from_bytes_rejects_wrong_length() {
        assert_eq!(
            TileBuffer::from_bytes(vec![0; DATA_LENGTH - 1]),
            Err(BufferError::LengthMismatch {
                expected: DATA_LENGTH,
                actual: DATA_LENGTH - 1,
            })
        );
        assert!(TileBuffer::from_bytes(vec![0; DATA_LENGTH]).is_ok());
    }

    #[test]
    fn test_cell_mut_aliases_bytes() {
        let mut buffer = TileBuffer::new();
        *buffer.cell_mut(1, 2) = TerrainCell::from_rgba(9, 8, 7, 6);

        let offset = (2 * 256 + 1) * 4;
        assert_eq!(&buffer.as_bytes()[offset..offset + 4], &[9, 8, 7, 6]);

        buffer[(1, 2)].set_material(TerrainMaterial::Stone);
        assert_eq!(buffer.as_bytes()[offset], 3);
    }

    #[test]
    #[should_panic(expected = "outside")]
    fn test_out_of_range_panics() {
        let buffer = TileBuffer::new();
        let _ = buffer.cell(256, 0);
    }

    #[test]
    fn test_import_overwrites_in_place() {
        let mut buffer = TileBuffer::new();
        let data = vec![0xAB; DATA_LENGTH];
        buffer.import_from(&data).expect("length matches");
        assert!(buffer.as_bytes().iter().all(|&b| b == 0xAB));

        assert!(buffer.import_from(&data[1..]).is_err());
        assert!(buffer.as_bytes().iter().all(|&b| b == 0xAB));
    }

    #[test]
    fn test_image_export_is_verbatim() {
        let mut buffer = TileBuffer::new();
        *buffer.cell_mut(255, 255) = TerrainCell::from_rgba(1, 2, 3, 4);

        let image = buffer.to_image();
        assert_eq!(image.get_pixel(255, 255).0, [1, 2, 3, 4]);

        let restored = TileBuffer::from_image(&image).expect("tile-sized");
        assert_eq!(restored, buffer);
    }

    #[test]
    fn test_import_image_rejects_wrong_dimensions() {
        let image = RgbaImage::new(128, 256);
        assert!(matches!(
            TileBuffer::from_image(&image),
            Err(BufferError::WrongDimensions { width: 128, .. })
        ));
    }

    #[test]
    fn test_row() {
        let mut buffer = TileBuffer::new();
        *buffer.cell_mut(7, 3) = TerrainCell::new(TerrainMaterial::Sand, 0, 0);
        assert_eq!(buffer.row(3)[7].material(), TerrainMaterial::Sand);
        assert_eq!(buffer.row(3).len(), 256);
    }
}
