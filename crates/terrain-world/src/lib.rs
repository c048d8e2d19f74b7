//! # Terrain World
//!
//! The loaded tile set of the tile-streaming terrain:
//! - Tile files on disk (`TileStore`)
//! - Placeholder generation for tiles without saved data
//! - The terrain manager: loading, unloading, neighbor wiring and the
//!   per-frame simulation step

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(clippy::unwrap_used)]

pub mod generation;
pub mod manager;
pub mod persistence;
pub mod scratch;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::generation::*;
    pub use crate::manager::*;
    pub use crate::persistence::*;
    pub use crate::scratch::*;
}

pub use prelude::*;
