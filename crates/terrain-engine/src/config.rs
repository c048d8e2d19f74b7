//! Terrain configuration.
//!
//! Provides the world location, simulation and streaming settings.
//! Configuration can be loaded from and saved to a TOML file.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use terrain_common::{TileCoord, TileWindow};
use terrain_world::{SaveFormat, TerrainSettings, TileStore};
use tracing::{info, warn};

/// Configuration file name.
pub const CONFIG_FILE: &str = "terrain.toml";

/// Largest tile window edge, in tiles.
pub const MAX_WINDOW_EDGE: i32 = 16;

const DEFAULT_WORLD_NAME: &str = "default";

/// Which simulation backend to run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// wgpu compute, falling back to the CPU when no adapter is available
    #[default]
    Gpu,
    /// Reference CPU implementation
    Cpu,
}

/// Terrain configuration parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TerrainConfig {
    // === World Settings ===
    /// Root directory of saved worlds
    pub save_path: PathBuf,
    /// World directory under `save_path`
    pub world_name: String,
    /// Never write tiles back to disk
    pub read_only: bool,
    /// Pixel layout of tile files
    pub save_format: SaveFormat,
    /// Seed mixed into every simulation pass
    pub world_seed: u64,

    // === Simulation Settings ===
    /// Give each tile a back texture
    pub double_buffering: bool,
    /// Simulation backend
    pub backend: BackendKind,
    /// Steps to run before shutting down
    pub steps: u32,

    // === Streaming Settings ===
    /// Tile window loaded at startup
    pub window: TileWindow,
}

impl Default for TerrainConfig {
    fn default() -> Self {
        Self {
            // World
            save_path: PathBuf::from("saves"),
            world_name: DEFAULT_WORLD_NAME.to_string(),
            read_only: false,
            save_format: SaveFormat::RawCells,
            world_seed: 0,

            // Simulation
            double_buffering: true,
            backend: BackendKind::Gpu,
            steps: 60,

            // Streaming
            window: TileWindow::around(TileCoord::new(0, 0), 1),
        }
    }
}

impl TerrainConfig {
    /// Reads `path`, falling back to defaults when it is missing or invalid.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                info!("No config at {}, using defaults", path.display());
                return Self::default();
            },
            Err(e) => {
                warn!("Failed to read config {}: {e}", path.display());
                return Self::default();
            },
        };

        toml::from_str(&contents).map_or_else(
            |e| {
                warn!("Ignoring invalid config {}: {e}", path.display());
                Self::default()
            },
            |config| {
                info!("Loaded config from {}", path.display());
                config
            },
        )
    }

    /// Like [`Self::load_from`], but writes the defaults out when `path`
    /// does not exist yet. A failed write is logged and ignored.
    pub fn load_or_create<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        let config = Self::load_from(path);
        if !path.exists() {
            if let Err(e) = config.save_to(path) {
                warn!("Failed to write default config {}: {e}", path.display());
            }
        }
        config
    }

    /// Writes the configuration as TOML, creating parent directories.
    pub fn save_to<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        fs::write(path, contents)?;

        info!("Saved config to {}", path.display());
        Ok(())
    }

    /// Validate and clamp configuration values to sensible ranges.
    pub fn validate(&mut self) {
        // World
        if self.world_name.trim().is_empty() {
            warn!("Empty world name, using \"{DEFAULT_WORLD_NAME}\"");
            self.world_name = DEFAULT_WORLD_NAME.to_string();
        }

        // Streaming
        if self.window.is_empty() {
            warn!("Empty tile window {:?}, using default", self.window);
            self.window = TileWindow::default();
        }
        let window = &mut self.window;
        window.max_x = window.max_x.min(window.min_x.saturating_add(MAX_WINDOW_EDGE - 1));
        window.max_y = window.max_y.min(window.min_y.saturating_add(MAX_WINDOW_EDGE - 1));
    }

    /// Tile store for the configured world.
    #[must_use]
    pub fn tile_store(&self) -> TileStore {
        TileStore::new(&self.save_path, &self.world_name)
            .with_read_only(self.read_only)
            .with_format(self.save_format)
    }

    /// Simulation settings for the terrain manager.
    #[must_use]
    pub fn terrain_settings(&self) -> TerrainSettings {
        TerrainSettings {
            double_buffering: self.double_buffering,
            world_seed: self.world_seed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = TerrainConfig::default();
        assert_eq!(config.world_name, "default");
        assert!(config.double_buffering);
        assert!(!config.read_only);
        assert_eq!(config.backend, BackendKind::Gpu);
        assert_eq!(config.window.len(), 9);
    }

    #[test]
    fn test_config_validation() {
        let mut config = TerrainConfig::default();

        // Set invalid values
        config.world_name = "  ".to_string();
        config.window = TileWindow::new(0, 100, -5, 5);

        config.validate();

        // Should be clamped
        assert_eq!(config.world_name, "default");
        assert_eq!(config.window.max_x, 15);
        assert_eq!(config.window.max_y, 5);
    }

    #[test]
    fn test_empty_window_is_replaced() {
        let mut config = TerrainConfig::default();
        config.window = TileWindow::new(3, 2, 0, 0);
        config.validate();
        assert_eq!(config.window, TileWindow::default());
    }

    #[test]
    fn test_config_save_load() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let config_path = temp_dir.path().join("nested").join("terrain.toml");

        // Create and save config
        let mut config = TerrainConfig::default();
        config.world_name = "island".to_string();
        config.read_only = true;
        config.save_format = SaveFormat::MaterialColors;
        config.backend = BackendKind::Cpu;
        config.window = TileWindow::new(-2, 2, 0, 1);

        config.save_to(&config_path).expect("Failed to save config");

        // Load and verify
        let loaded = TerrainConfig::load_from(&config_path);
        assert_eq!(loaded.world_name, "island");
        assert!(loaded.read_only);
        assert_eq!(loaded.save_format, SaveFormat::MaterialColors);
        assert_eq!(loaded.backend, BackendKind::Cpu);
        assert_eq!(loaded.window, TileWindow::new(-2, 2, 0, 1));
    }

    #[test]
    fn test_config_load_missing_file() {
        let config = TerrainConfig::load_from("/nonexistent/path/terrain.toml");
        // Should return defaults
        assert_eq!(config.steps, 60);
    }

    #[test]
    fn test_load_or_create_writes_defaults() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let config_path = temp_dir.path().join("terrain.toml");

        let config = TerrainConfig::load_or_create(&config_path);
        assert!(config_path.is_file());
        assert_eq!(config.world_name, "default");

        let mut edited = TerrainConfig::load_from(&config_path);
        assert_eq!(edited.window, config.window);
        edited.steps = 7;
        edited.save_to(&config_path).expect("Failed to save config");

        // An existing file is read, never overwritten
        assert_eq!(TerrainConfig::load_or_create(&config_path).steps, 7);
    }

    #[test]
    fn test_invalid_config_uses_defaults() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let config_path = temp_dir.path().join("terrain.toml");
        fs::write(&config_path, "steps = \"many\"").expect("write");

        assert_eq!(TerrainConfig::load_from(&config_path).steps, 60);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: TerrainConfig = toml::from_str("backend = \"cpu\"\nsteps = 5\n").expect("parse");
        assert_eq!(config.backend, BackendKind::Cpu);
        assert_eq!(config.steps, 5);
        assert_eq!(config.world_name, "default");
    }

    #[test]
    fn test_tile_store_follows_config() {
        let mut config = TerrainConfig::default();
        config.save_path = PathBuf::from("/data");
        config.world_name = "w".to_string();
        config.read_only = true;

        let store = config.tile_store();
        assert!(store.is_read_only());
        assert_eq!(store.tile_path(TileCoord::new(1, 2)), PathBuf::from("/data/w/1_2.png"));
    }
}
