//! Coordinate types for tiles, cells, and neighbor addressing.
//!
//! Tile space uses screen orientation: `y` grows downwards, so the tile at
//! `y - 1` is the one above (the `Top` neighbor).

use serde::{Deserialize, Serialize};

/// Width of a tile in cells.
pub const TILE_WIDTH: u32 = 256;

/// Height of a tile in cells.
pub const TILE_HEIGHT: u32 = 256;

/// Tile coordinate (identifies a tile in the world grid).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TileCoord {
    /// X coordinate in tile space
    pub x: i32,
    /// Y coordinate in tile space
    pub y: i32,
}

impl TileCoord {
    /// Creates a new tile coordinate.
    #[must_use]
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Returns the coordinate shifted by the given offset.
    #[must_use]
    pub const fn offset(self, dx: i32, dy: i32) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
        }
    }

    /// Returns the tile in the given neighbor slot.
    #[must_use]
    pub const fn neighbor(self, slot: NeighborSlot) -> Self {
        let (dx, dy) = slot.offset();
        self.offset(dx, dy)
    }

    /// Returns all 8 neighbors (including diagonals), in `NeighborSlot::ALL` order.
    #[must_use]
    pub fn neighbors(self) -> [TileCoord; 8] {
        NeighborSlot::ALL.map(|slot| self.neighbor(slot))
    }

    /// Returns the slot `other` occupies relative to `self`.
    ///
    /// `None` when `other` is `self` or lies outside the 8-connected ring.
    #[must_use]
    pub const fn slot_of(self, other: TileCoord) -> Option<NeighborSlot> {
        NeighborSlot::from_offset(other.x - self.x, other.y - self.y)
    }

    /// Returns the world cell position of this tile's top-left corner.
    #[must_use]
    pub const fn world_origin(self) -> (i64, i64) {
        (
            self.x as i64 * TILE_WIDTH as i64,
            self.y as i64 * TILE_HEIGHT as i64,
        )
    }
}

impl std::fmt::Display for TileCoord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {}]", self.x, self.y)
    }
}

/// Local coordinate of a cell within a tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LocalCoord {
    /// X coordinate within the tile
    pub x: u32,
    /// Y coordinate within the tile
    pub y: u32,
}

impl LocalCoord {
    /// Creates a new local coordinate.
    #[must_use]
    pub const fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }

    /// Converts to a linear (row-major) cell index.
    #[must_use]
    pub const fn to_index(self) -> usize {
        (self.y as usize) * (TILE_WIDTH as usize) + (self.x as usize)
    }

    /// Creates from a linear cell index.
    #[must_use]
    pub const fn from_index(index: usize) -> Self {
        let width = TILE_WIDTH as usize;
        Self {
            x: (index % width) as u32,
            y: (index / width) as u32,
        }
    }
}

/// One of the 8 boundary slots around a tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum NeighborSlot {
    /// (-1, -1)
    TopLeft = 0,
    /// (0, -1)
    Top = 1,
    /// (+1, -1)
    TopRight = 2,
    /// (-1, 0)
    Left = 3,
    /// (+1, 0)
    Right = 4,
    /// (-1, +1)
    BottomLeft = 5,
    /// (0, +1)
    Bottom = 6,
    /// (+1, +1)
    BottomRight = 7,
}

impl NeighborSlot {
    /// All slots, indexed by their discriminant.
    pub const ALL: [NeighborSlot; 8] = [
        NeighborSlot::TopLeft,
        NeighborSlot::Top,
        NeighborSlot::TopRight,
        NeighborSlot::Left,
        NeighborSlot::Right,
        NeighborSlot::BottomLeft,
        NeighborSlot::Bottom,
        NeighborSlot::BottomRight,
    ];

    /// Tile offset of this slot.
    #[must_use]
    pub const fn offset(self) -> (i32, i32) {
        match self {
            NeighborSlot::TopLeft => (-1, -1),
            NeighborSlot::Top => (0, -1),
            NeighborSlot::TopRight => (1, -1),
            NeighborSlot::Left => (-1, 0),
            NeighborSlot::Right => (1, 0),
            NeighborSlot::BottomLeft => (-1, 1),
            NeighborSlot::Bottom => (0, 1),
            NeighborSlot::BottomRight => (1, 1),
        }
    }

    /// Slot for a tile offset, `None` for (0, 0) or anything outside the ring.
    #[must_use]
    pub const fn from_offset(dx: i32, dy: i32) -> Option<Self> {
        match (dx, dy) {
            (-1, -1) => Some(NeighborSlot::TopLeft),
            (0, -1) => Some(NeighborSlot::Top),
            (1, -1) => Some(NeighborSlot::TopRight),
            (-1, 0) => Some(NeighborSlot::Left),
            (1, 0) => Some(NeighborSlot::Right),
            (-1, 1) => Some(NeighborSlot::BottomLeft),
            (0, 1) => Some(NeighborSlot::Bottom),
            (1, 1) => Some(NeighborSlot::BottomRight),
            _ => None,
        }
    }

    /// The slot this tile occupies from the neighbor's point of view.
    #[must_use]
    pub const fn opposite(self) -> Self {
        match self {
            NeighborSlot::TopLeft => NeighborSlot::BottomRight,
            NeighborSlot::Top => NeighborSlot::Bottom,
            NeighborSlot::TopRight => NeighborSlot::BottomLeft,
            NeighborSlot::Left => NeighborSlot::Right,
            NeighborSlot::Right => NeighborSlot::Left,
            NeighborSlot::BottomLeft => NeighborSlot::TopRight,
            NeighborSlot::Bottom => NeighborSlot::Top,
            NeighborSlot::BottomRight => NeighborSlot::TopLeft,
        }
    }

    /// Index into an 8-slot array.
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Kernel binding name of this boundary input.
    #[must_use]
    pub const fn binding_name(self) -> &'static str {
        match self {
            NeighborSlot::TopLeft => "TerrainTopLeft",
            NeighborSlot::Top => "TerrainTop",
            NeighborSlot::TopRight => "TerrainTopRight",
            NeighborSlot::Left => "TerrainLeft",
            NeighborSlot::Right => "TerrainRight",
            NeighborSlot::BottomLeft => "TerrainBottomLeft",
            NeighborSlot::Bottom => "TerrainBottom",
            NeighborSlot::BottomRight => "TerrainBottomRight",
        }
    }
}

/// Inclusive rectangle of tile coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileWindow {
    /// Minimum X (inclusive)
    pub min_x: i32,
    /// Maximum X (inclusive)
    pub max_x: i32,
    /// Minimum Y (inclusive)
    pub min_y: i32,
    /// Maximum Y (inclusive)
    pub max_y: i32,
}

impl Default for TileWindow {
    fn default() -> Self {
        Self::around(TileCoord::new(0, 0), 1)
    }
}

impl TileWindow {
    /// Creates a window from inclusive bounds.
    #[must_use]
    pub const fn new(min_x: i32, max_x: i32, min_y: i32, max_y: i32) -> Self {
        Self {
            min_x,
            max_x,
            min_y,
            max_y,
        }
    }

    /// Square window of the given radius around `center`.
    #[must_use]
    pub const fn around(center: TileCoord, radius: i32) -> Self {
        Self::new(
            center.x - radius,
            center.x + radius,
            center.y - radius,
            center.y + radius,
        )
    }

    /// Whether the window contains no tiles.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.min_x > self.max_x || self.min_y > self.max_y
    }

    /// Whether `coord` lies inside the window.
    #[must_use]
    pub const fn contains(&self, coord: TileCoord) -> bool {
        coord.x >= self.min_x && coord.x <= self.max_x && coord.y >= self.min_y && coord.y <= self.max_y
    }

    /// Number of tiles in the window.
    #[must_use]
    pub fn len(&self) -> usize {
        if self.is_empty() {
            return 0;
        }
        let w = (i64::from(self.max_x) - i64::from(self.min_x) + 1) as usize;
        let h = (i64::from(self.max_y) - i64::from(self.min_y) + 1) as usize;
        w * h
    }

    /// Row-major iteration (y outer, x inner).
    pub fn coords(&self) -> impl Iterator<Item = TileCoord> {
        let (min_x, max_x) = (self.min_x, self.max_x);
        (self.min_y..=self.max_y)
            .flat_map(move |y| (min_x..=max_x).map(move |x| TileCoord::new(x, y)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_offsets_round_trip() {
        for slot in NeighborSlot::ALL {
            let (dx, dy) = slot.offset();
            assert_eq!(NeighborSlot::from_offset(dx, dy), Some(slot));
            assert_eq!(NeighborSlot::ALL[slot.index()], slot);
        }
        assert_eq!(NeighborSlot::from_offset(0, 0), None);
        assert_eq!(NeighborSlot::from_offset(2, 0), None);
    }

    #[test]
    fn test_slot_opposite() {
        for slot in NeighborSlot::ALL {
            let (dx, dy) = slot.offset();
            assert_eq!(slot.opposite().offset(), (-dx, -dy));
            assert_eq!(slot.opposite().opposite(), slot);
        }
    }

    #[test]
    fn test_slot_of() {
        let center = TileCoord::new(3, -2);
        assert_eq!(center.slot_of(TileCoord::new(3, -3)), Some(NeighborSlot::Top));
        assert_eq!(center.slot_of(TileCoord::new(2, -1)), Some(NeighborSlot::BottomLeft));
        assert_eq!(center.slot_of(center), None);
        assert_eq!(center.slot_of(TileCoord::new(5, -2)), None);
    }

    #[test]
    fn test_binding_names() {
        assert_eq!(NeighborSlot::Top.binding_name(), "TerrainTop");
        assert_eq!(NeighborSlot::BottomRight.binding_name(), "TerrainBottomRight");
    }

    #[test]
    fn test_window_iteration_is_row_major() {
        let window = TileWindow::new(-1, 0, 5, 6);
        let coords: Vec<_> = window.coords().collect();
        assert_eq!(
            coords,
            vec![
                TileCoord::new(-1, 5),
                TileCoord::new(0, 5),
                TileCoord::new(-1, 6),
                TileCoord::new(0, 6),
            ]
        );
        assert_eq!(window.len(), 4);
    }

    #[test]
    fn test_empty_window() {
        let window = TileWindow::new(1, 0, 0, 0);
        assert!(window.is_empty());
        assert_eq!(window.len(), 0);
        assert_eq!(window.coords().count(), 0);
    }

    #[test]
    fn test_local_index() {
        let local = LocalCoord::new(3, 2);
        assert_eq!(local.to_index(), 2 * 256 + 3);
        assert_eq!(LocalCoord::from_index(local.to_index()), local);
    }

    #[test]
    fn test_world_origin() {
        assert_eq!(TileCoord::new(-1, 2).world_origin(), (-256, 512));
    }
}
