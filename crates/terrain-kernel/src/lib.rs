//! # Terrain Kernel
//!
//! Per-tile simulation for the tile-streaming terrain.
//!
//! This crate provides:
//! - The packed 4-byte cell format and the material table
//! - Tile buffers: 256x256 cells in one contiguous byte array
//! - The simulation backend interface with CPU and wgpu implementations
//! - Tiles with front/back textures and weak neighbor links
//!
//! ## Double Buffering
//!
//! A double-buffered tile reads its front texture and writes its back one;
//! the two swap only when a pass changed something. Single-buffered tiles
//! simulate in place and the backend stages the input.
//!
//! ## Validation
//!
//! In debug builds, wgpu validation is enabled to catch GPU errors early.
//! Use `create_validated_instance()` to create a wgpu instance with appropriate settings.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(clippy::unwrap_used)]

pub mod backend;
pub mod cell;
pub mod cpu;
pub mod gpu;
pub mod material;
pub mod rules;
pub mod tile;
pub mod tile_buffer;
pub mod validation;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::backend::*;
    pub use crate::cell::*;
    pub use crate::cpu::*;
    pub use crate::gpu::*;
    pub use crate::material::*;
    pub use crate::tile::*;
    pub use crate::tile_buffer::*;
    pub use crate::validation::*;
}

pub use prelude::*;
