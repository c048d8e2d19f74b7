//! Terrain materials and their display colors.
//!
//! The mapping is invertible for every enumerated material. Ids outside the
//! table travel through an escape color: alpha [`ESCAPE_ALPHA`] marks the
//! color's R, G and B channels as the little-endian bytes of a raw id.

use crate::cell::MAX_MATERIAL_ID;

/// Alpha value reserved for escape-encoded material ids.
pub const ESCAPE_ALPHA: u8 = 254;

/// Largest id an escape color can carry (24 bits).
pub const MAX_ESCAPE_ID: u32 = (1 << 24) - 1;

/// An 8-bit-per-channel RGBA color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Color8 {
    /// Red
    pub r: u8,
    /// Green
    pub g: u8,
    /// Blue
    pub b: u8,
    /// Alpha
    pub a: u8,
}

impl Color8 {
    /// Creates a color from all four channels.
    #[must_use]
    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Creates an opaque color.
    #[must_use]
    pub const fn opaque(r: u8, g: u8, b: u8) -> Self {
        Self::new(r, g, b, 255)
    }

    /// Channels in R, G, B, A order.
    #[must_use]
    pub const fn to_array(self) -> [u8; 4] {
        [self.r, self.g, self.b, self.a]
    }

    /// Creates a color from channels in R, G, B, A order.
    #[must_use]
    pub const fn from_array(rgba: [u8; 4]) -> Self {
        Self::new(rgba[0], rgba[1], rgba[2], rgba[3])
    }
}

/// Substance occupying a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TerrainMaterial {
    /// Unloaded tiles or invalid/corrupted data.
    #[default]
    Invalid,
    /// Nothing, vacant space.
    Air,
    /// Dirt
    Dirt,
    /// Stone
    Stone,
    /// Grass
    Grass,
    /// Wood
    Wood,
    /// Sand
    Sand,
    /// Water
    Water,
    /// A material id with no table entry.
    ///
    /// Only meaningful for ids past the table; build materials with
    /// [`TerrainMaterial::from_id`] so smaller ids come back named.
    Unknown(u32),
}

const TABLE: [(TerrainMaterial, Color8); 8] = [
    (TerrainMaterial::Invalid, Color8::opaque(0, 0, 0)),
    (TerrainMaterial::Air, Color8::new(0, 0, 0, 0)),
    (TerrainMaterial::Dirt, Color8::opaque(156, 68, 0)),
    (TerrainMaterial::Stone, Color8::opaque(134, 134, 134)),
    (TerrainMaterial::Grass, Color8::opaque(0, 95, 0)),
    (TerrainMaterial::Wood, Color8::opaque(95, 20, 0)),
    (TerrainMaterial::Sand, Color8::opaque(207, 156, 110)),
    (TerrainMaterial::Water, Color8::opaque(32, 125, 253)),
];

impl TerrainMaterial {
    /// Every enumerated material, in id order.
    pub const ALL: [TerrainMaterial; 8] = [
        TerrainMaterial::Invalid,
        TerrainMaterial::Air,
        TerrainMaterial::Dirt,
        TerrainMaterial::Stone,
        TerrainMaterial::Grass,
        TerrainMaterial::Wood,
        TerrainMaterial::Sand,
        TerrainMaterial::Water,
    ];

    /// Material for a numeric id. Ids outside the table become `Unknown`.
    #[must_use]
    pub const fn from_id(id: u32) -> Self {
        match id {
            0 => TerrainMaterial::Invalid,
            1 => TerrainMaterial::Air,
            2 => TerrainMaterial::Dirt,
            3 => TerrainMaterial::Stone,
            4 => TerrainMaterial::Grass,
            5 => TerrainMaterial::Wood,
            6 => TerrainMaterial::Sand,
            7 => TerrainMaterial::Water,
            other => TerrainMaterial::Unknown(other),
        }
    }

    /// The named material when `self` is an `Unknown` holding a table id.
    #[must_use]
    pub const fn canonical(self) -> Self {
        Self::from_id(self.id())
    }

    /// Numeric id.
    #[must_use]
    pub const fn id(self) -> u32 {
        match self {
            TerrainMaterial::Invalid => 0,
            TerrainMaterial::Air => 1,
            TerrainMaterial::Dirt => 2,
            TerrainMaterial::Stone => 3,
            TerrainMaterial::Grass => 4,
            TerrainMaterial::Wood => 5,
            TerrainMaterial::Sand => 6,
            TerrainMaterial::Water => 7,
            TerrainMaterial::Unknown(id) => id,
        }
    }

    /// Human-readable name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            TerrainMaterial::Invalid => "Invalid",
            TerrainMaterial::Air => "Air",
            TerrainMaterial::Dirt => "Dirt",
            TerrainMaterial::Stone => "Stone",
            TerrainMaterial::Grass => "Grass",
            TerrainMaterial::Wood => "Wood",
            TerrainMaterial::Sand => "Sand",
            TerrainMaterial::Water => "Water",
            TerrainMaterial::Unknown(_) => "Unknown",
        }
    }

    /// Whether the id fits the cell's material field.
    #[must_use]
    pub const fn fits_cell(self) -> bool {
        self.id() <= MAX_MATERIAL_ID as u32
    }

    /// Whether the reference kernel lets this material fall.
    #[must_use]
    pub const fn falls(self) -> bool {
        matches!(self, TerrainMaterial::Sand | TerrainMaterial::Water)
    }

    /// Display color. Non-enumerated ids produce the escape color.
    #[must_use]
    pub fn color(self) -> Color8 {
        color_of(self)
    }
}

impl std::fmt::Display for TerrainMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TerrainMaterial::Unknown(id) => write!(f, "Unknown({id})"),
            known => f.write_str(known.name()),
        }
    }
}

/// Escape color carrying a raw id (low 24 bits) in R, G, B.
#[must_use]
pub const fn escape_color(id: u32) -> Color8 {
    Color8::new(
        (id & 0xFF) as u8,
        ((id >> 8) & 0xFF) as u8,
        ((id >> 16) & 0xFF) as u8,
        ESCAPE_ALPHA,
    )
}

/// Display color of a material.
#[must_use]
pub fn color_of(material: TerrainMaterial) -> Color8 {
    let material = material.canonical();
    TABLE
        .iter()
        .find(|(m, _)| *m == material)
        .map_or_else(|| escape_color(material.id()), |(_, color)| *color)
}

/// Material for a display color.
///
/// Escape colors decode their id directly; unmatched colors are Invalid.
#[must_use]
pub fn material_of(color: Color8) -> TerrainMaterial {
    if color.a == ESCAPE_ALPHA {
        let id = u32::from(color.r) | (u32::from(color.g) << 8) | (u32::from(color.b) << 16);
        return TerrainMaterial::from_id(id);
    }

    TABLE
        .iter()
        .find(|(_, c)| *c == color)
        .map_or(TerrainMaterial::Invalid, |(m, _)| *m)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_enumerated_round_trip() {
        for material in TerrainMaterial::ALL {
            assert_eq!(material_of(color_of(material)), material, "{material}");
            assert_eq!(TerrainMaterial::from_id(material.id()), material);
        }
    }

    #[test]
    fn test_table_colors_are_distinct() {
        for (i, (_, a)) in TABLE.iter().enumerate() {
            for (_, b) in &TABLE[i + 1..] {
                assert_ne!(a, b);
            }
            assert_ne!(a.a, ESCAPE_ALPHA);
        }
    }

    #[test]
    fn test_unknown_uses_escape() {
        let color = color_of(TerrainMaterial::Unknown(0x01_02_03));
        assert_eq!(color, Color8::new(3, 2, 1, ESCAPE_ALPHA));
        assert_eq!(material_of(color), TerrainMaterial::Unknown(0x01_02_03));
    }

    #[test]
    fn test_unmatched_color_is_invalid() {
        assert_eq!(material_of(Color8::opaque(1, 2, 3)), TerrainMaterial::Invalid);
        assert_eq!(material_of(Color8::new(0, 0, 0, 255)), TerrainMaterial::Invalid);
        assert_eq!(material_of(Color8::new(156, 68, 0, 128)), TerrainMaterial::Invalid);
    }

    #[test]
    fn test_known_colors() {
        assert_eq!(TerrainMaterial::Air.color(), Color8::new(0, 0, 0, 0));
        assert_eq!(TerrainMaterial::Water.color(), Color8::opaque(32, 125, 253));
    }

    #[test]
    fn test_unknown_table_id_is_canonical() {
        assert_eq!(TerrainMaterial::Unknown(3).canonical(), TerrainMaterial::Stone);
        assert_eq!(color_of(TerrainMaterial::Unknown(3)), color_of(TerrainMaterial::Stone));
        assert_eq!(material_of(color_of(TerrainMaterial::Unknown(7))), TerrainMaterial::Water);
        assert_eq!(TerrainMaterial::Unknown(9).canonical(), TerrainMaterial::Unknown(9));
    }

    #[test]
    fn test_fits_cell() {
        assert!(TerrainMaterial::Water.fits_cell());
        assert!(TerrainMaterial::Unknown(0xFFF).fits_cell());
        assert!(!TerrainMaterial::Unknown(0x1000).fits_cell());
    }

    proptest! {
        #[test]
        fn prop_escape_round_trip(id in 0u32..=MAX_ESCAPE_ID) {
            prop_assert_eq!(material_of(escape_color(id)).id(), id);
        }
    }
}
