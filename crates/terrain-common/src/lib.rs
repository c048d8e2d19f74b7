//! # Terrain Common
//!
//! Common types shared by the terrain crates:
//! - Coordinate types (tile, local cell, neighbor slots, tile windows)
//! - Error taxonomy

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(clippy::unwrap_used)]

pub mod coords;
pub mod error;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::coords::*;
    pub use crate::error::*;
}

pub use prelude::*;
