//! Bit-packed terrain cell.
//!
//! A cell is stored as the four bytes of one RGBA8 pixel so a tile buffer can
//! be handed to the kernel, and written to disk, without conversion:
//!
//! ```text
//! byte      R         G         B         A
//! bits   76543210  76543210  76543210  76543210
//!        mmmmmmmm  ....mmmm  eexxxxxx  eeyyyyyy
//! ```
//!
//! - `m`: material id, bits [0..11] of the little-endian `R | G << 8`
//! - `x`, `y`: original (spawn-time) local coordinate, 6 bits each
//! - `e`: extra state; bits 2-3 in the top of B, bits 0-1 in the top of A
//! - `.`: reserved, zero when encoded, preserved by the field setters
//!
//! Every accessor works on byte positions, never on a host-endian word.

use bytemuck::{Pod, Zeroable};
use terrain_common::CellError;

use crate::material::TerrainMaterial;

/// Width of the material field in bits.
pub const MATERIAL_BITS: u32 = 12;
/// Width of each original-coordinate field in bits.
pub const COORD_BITS: u32 = 6;
/// Width of the extra field in bits.
pub const EXTRA_BITS: u32 = 4;

/// Largest encodable material id.
pub const MAX_MATERIAL_ID: u16 = (1 << MATERIAL_BITS) - 1;
/// Largest encodable original coordinate.
pub const MAX_COORD: u8 = (1 << COORD_BITS) - 1;
/// Largest encodable extra value.
pub const MAX_EXTRA: u8 = (1 << EXTRA_BITS) - 1;

/// Bytes per cell (one RGBA8 pixel).
pub const BYTES_PER_CELL: usize = 4;

const R: usize = 0;
const G: usize = 1;
const B: usize = 2;
const A: usize = 3;

const LOW6: u8 = 0x3F;
const HIGH2: u8 = 0xC0;
const G_MATERIAL_MASK: u8 = 0x0F;

/// A single terrain cell, packed into one RGBA8 pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Pod, Zeroable)]
#[repr(transparent)]
pub struct TerrainCell([u8; BYTES_PER_CELL]);

/// Unpacked view of a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellFields {
    /// Material occupying the cell
    pub material: TerrainMaterial,
    /// X coordinate at spawn, before moving
    pub original_x: u8,
    /// Y coordinate at spawn, before moving
    pub original_y: u8,
    /// Kernel-defined auxiliary state
    pub extra: u8,
}

impl TerrainCell {
    /// The zeroed cell: Invalid material.
    pub const INVALID: Self = Self([0; BYTES_PER_CELL]);

    /// Creates a cell from raw channel values.
    #[must_use]
    pub const fn from_rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self([r, g, b, a])
    }

    /// Creates a cell with the given material and original coordinate.
    ///
    /// Values wider than their field are a programming error.
    #[must_use]
    pub fn new(material: TerrainMaterial, original_x: u8, original_y: u8) -> Self {
        let mut cell = Self::INVALID;
        cell.set_material(material);
        cell.set_original_x(original_x);
        cell.set_original_y(original_y);
        cell
    }

    /// Encodes all fields, rejecting any value wider than its field.
    pub fn encode(
        material: TerrainMaterial,
        original_x: u8,
        original_y: u8,
        extra: u8,
    ) -> Result<Self, CellError> {
        let id = material.id();
        check_width("material", id, MATERIAL_BITS)?;
        check_width("original_x", u32::from(original_x), COORD_BITS)?;
        check_width("original_y", u32::from(original_y), COORD_BITS)?;
        check_width("extra", u32::from(extra), EXTRA_BITS)?;

        let mut cell = Self::INVALID;
        cell.write_material_id(id as u16);
        cell.write_original_x(original_x);
        cell.write_original_y(original_y);
        cell.write_extra(extra);
        Ok(cell)
    }

    /// Decodes all fields.
    #[must_use]
    pub fn decode(self) -> CellFields {
        CellFields {
            material: self.material(),
            original_x: self.original_x(),
            original_y: self.original_y(),
            extra: self.extra(),
        }
    }

    /// Raw channel bytes, in R, G, B, A order.
    #[must_use]
    pub const fn to_rgba(self) -> [u8; BYTES_PER_CELL] {
        self.0
    }

    /// Red channel.
    #[must_use]
    pub const fn r(self) -> u8 {
        self.0[R]
    }

    /// Green channel.
    #[must_use]
    pub const fn g(self) -> u8 {
        self.0[G]
    }

    /// Blue channel.
    #[must_use]
    pub const fn b(self) -> u8 {
        self.0[B]
    }

    /// Alpha channel.
    #[must_use]
    pub const fn a(self) -> u8 {
        self.0[A]
    }

    /// Material id (12 bits).
    #[must_use]
    pub const fn material_id(self) -> u16 {
        (self.0[R] as u16) | (((self.0[G] & G_MATERIAL_MASK) as u16) << 8)
    }

    /// Material occupying this cell.
    #[must_use]
    pub fn material(self) -> TerrainMaterial {
        TerrainMaterial::from_id(u32::from(self.material_id()))
    }

    /// Sets the material id.
    pub fn set_material_id(&mut self, id: u16) {
        debug_assert!(
            id <= MAX_MATERIAL_ID,
            "material id {id} exceeds {MATERIAL_BITS}-bit field"
        );
        self.write_material_id(id);
    }

    /// Sets the material.
    pub fn set_material(&mut self, material: TerrainMaterial) {
        let id = material.id();
        debug_assert!(
            id <= u32::from(MAX_MATERIAL_ID),
            "material {material:?} does not fit the {MATERIAL_BITS}-bit field"
        );
        self.write_material_id((id & u32::from(MAX_MATERIAL_ID)) as u16);
    }

    /// X coordinate on spawn of the particle occupying this cell.
    #[must_use]
    pub const fn original_x(self) -> u8 {
        self.0[B] & LOW6
    }

    /// Sets the original X coordinate.
    pub fn set_original_x(&mut self, x: u8) {
        debug_assert!(x <= MAX_COORD, "original_x {x} exceeds {COORD_BITS}-bit field");
        self.write_original_x(x);
    }

    /// Y coordinate on spawn of the particle occupying this cell.
    #[must_use]
    pub const fn original_y(self) -> u8 {
        self.0[A] & LOW6
    }

    /// Sets the original Y coordinate.
    pub fn set_original_y(&mut self, y: u8) {
        debug_assert!(y <= MAX_COORD, "original_y {y} exceeds {COORD_BITS}-bit field");
        self.write_original_y(y);
    }

    /// Kernel-defined auxiliary state (4 bits).
    #[must_use]
    pub const fn extra(self) -> u8 {
        ((self.0[B] >> 6) << 2) | (self.0[A] >> 6)
    }

    /// Sets the extra state.
    pub fn set_extra(&mut self, extra: u8) {
        debug_assert!(extra <= MAX_EXTRA, "extra {extra} exceeds {EXTRA_BITS}-bit field");
        self.write_extra(extra);
    }

    /// Whether the cell holds no valid data.
    #[must_use]
    pub const fn is_invalid(self) -> bool {
        self.material_id() == 0
    }

    fn write_material_id(&mut self, id: u16) {
        let id = id & MAX_MATERIAL_ID;
        self.0[R] = (id & 0xFF) as u8;
        self.0[G] = (self.0[G] & !G_MATERIAL_MASK) | ((id >> 8) as u8 & G_MATERIAL_MASK);
    }

    fn write_original_x(&mut self, x: u8) {
        self.0[B] = (self.0[B] & HIGH2) | (x & LOW6);
    }

    fn write_original_y(&mut self, y: u8) {
        self.0[A] = (self.0[A] & HIGH2) | (y & LOW6);
    }

    fn write_extra(&mut self, extra: u8) {
        let extra = extra & MAX_EXTRA;
        self.0[B] = (self.0[B] & LOW6) | ((extra >> 2) << 6);
        self.0[A] = (self.0[A] & LOW6) | ((extra & 0b11) << 6);
    }
}

fn check_width(field: &'static str, value: u32, bits: u32) -> Result<(), CellError> {
    if value >> bits == 0 {
        Ok(())
    } else {
        Err(CellError::FieldOverflow { field, value, bits })
    }
}
