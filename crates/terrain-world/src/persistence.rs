//! On-disk tile storage.
//!
//! Each tile is one 256x256 RGBA PNG at `<save_path>/<world_name>/<x>_<y>.png`.
//! Load failures of any kind read as "no file" so the caller falls back to
//! generation; save failures are logged and returned.

use std::fs;
use std::path::{Path, PathBuf};

use image::{ImageFormat, RgbaImage};
use serde::{Deserialize, Serialize};
use terrain_common::{BufferError, PersistenceError, TileCoord, TILE_HEIGHT, TILE_WIDTH};
use terrain_kernel::{
    color_of, material_of, Color8, TerrainCell, TerrainMaterial, TileBuffer, MAX_COORD,
};
use tracing::{debug, error, warn};

/// Pixel layout of saved tiles. Fixed per world: the two are not
/// distinguishable on disk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SaveFormat {
    /// File pixels are the packed cells, byte for byte.
    #[default]
    RawCells,
    /// File pixels are material display colors. Loading rebuilds each cell
    /// from its material and own position; provenance and extra bits are lost.
    MaterialColors,
}

/// Reads and writes tile files for one world.
#[derive(Debug, Clone)]
pub struct TileStore {
    save_path: PathBuf,
    world_name: String,
    read_only: bool,
    format: SaveFormat,
}

impl TileStore {
    /// Creates a store rooted at `<save_path>/<world_name>`.
    pub fn new(save_path: impl Into<PathBuf>, world_name: impl Into<String>) -> Self {
        Self {
            save_path: save_path.into(),
            world_name: world_name.into(),
            read_only: false,
            format: SaveFormat::default(),
        }
    }

    /// Sets whether saves are refused.
    pub fn with_read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    /// Sets the pixel layout of tile files.
    pub fn with_format(mut self, format: SaveFormat) -> Self {
        self.format = format;
        self
    }

    /// Whether saves are refused.
    #[must_use]
    pub const fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Pixel layout of tile files.
    #[must_use]
    pub const fn format(&self) -> SaveFormat {
        self.format
    }

    /// Directory holding this world's tiles.
    #[must_use]
    pub fn world_dir(&self) -> PathBuf {
        self.save_path.join(&self.world_name)
    }

    /// File path of the tile at `coord`.
    #[must_use]
    pub fn tile_path(&self, coord: TileCoord) -> PathBuf {
        self.world_dir().join(format!("{}_{}.png", coord.x, coord.y))
    }

    /// Whether a file exists for `coord`. Says nothing about its validity.
    #[must_use]
    pub fn has_tile(&self, coord: TileCoord) -> bool {
        self.tile_path(coord).is_file()
    }

    /// Loads the tile at `coord` into `into`, overwriting all of it.
    ///
    /// Returns false when there is no usable file: missing, undecodable or
    /// of the wrong size. `into` is unspecified in that case.
    pub fn try_load(&self, coord: TileCoord, into: &mut TileBuffer) -> bool {
        let path = self.tile_path(coord);
        if !path.exists() {
            debug!("No saved data for tile {coord}");
            return false;
        }

        let image = match image::open(&path) {
            Ok(image) => image.to_rgba8(),
            Err(e) => {
                warn!("Failed to decode tile {coord} at {}: {e}", path.display());
                return false;
            },
        };

        let loaded = match self.format {
            SaveFormat::RawCells => into.import_image(&image),
            SaveFormat::MaterialColors => import_colors(&image, into),
        };
        if let Err(e) = loaded {
            warn!("Ignoring tile {coord} at {}: {e}", path.display());
            return false;
        }

        debug!("Loaded tile {coord} from {}", path.display());
        true
    }

    /// Writes `data` as the tile at `coord`, creating missing directories.
    pub fn save(&self, coord: TileCoord, data: &TileBuffer) -> Result<(), PersistenceError> {
        if self.read_only {
            let err = PersistenceError::ReadOnly(coord);
            error!("{err}");
            return Err(err);
        }

        let path = self.tile_path(coord);
        let result = self.write_image(&path, data);
        match &result {
            Ok(()) => debug!("Saved tile {coord} to {}", path.display()),
            Err(e) => error!("Failed to save tile {coord}: {e}"),
        }
        result
    }

    fn write_image(&self, path: &Path, data: &TileBuffer) -> Result<(), PersistenceError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| PersistenceError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let image = match self.format {
            SaveFormat::RawCells => data.to_image(),
            SaveFormat::MaterialColors => export_colors(data),
        };
        image
            .save_with_format(path, ImageFormat::Png)
            .map_err(|e| PersistenceError::Encode {
                path: path.to_path_buf(),
                message: e.to_string(),
            })
    }
}

fn export_colors(data: &TileBuffer) -> RgbaImage {
    RgbaImage::from_fn(TILE_WIDTH, TILE_HEIGHT, |x, y| {
        image::Rgba(color_of(data.cell(x, y).material()).to_array())
    })
}

fn import_colors(image: &RgbaImage, into: &mut TileBuffer) -> Result<(), BufferError> {
    into.import_image(image)?;
    for y in 0..TILE_HEIGHT {
        for x in 0..TILE_WIDTH {
            let cell = into.cell_mut(x, y);
            let mut material = material_of(Color8::from_array(cell.to_rgba()));
            if !material.fits_cell() {
                material = TerrainMaterial::Invalid;
            }
            *cell = TerrainCell::new(material, x as u8 & MAX_COORD, y as u8 & MAX_COORD);
        }
    }
    Ok(())
}
