//! Hex coordinate system - the numeric contract between map, feed and renderer.
//!
//! The map uses an isometric "brick" packing: rows are spaced at 3/4 of the
//! hex height and every odd row is shifted by half the horizontal spacing.
//! `world_position` and `hex_from_world` are exact inverses for all integer
//! coordinates; every subsystem converts through these functions and never
//! re-derives the formula.

use serde::{Deserialize, Serialize};

/// Base hex radius in world units. All layout constants derive from it.
pub const HEX_SIZE: f32 = 1.0;

/// Full height of a hex tile.
pub const HEX_HEIGHT: f32 = 2.0 * HEX_SIZE;

/// Full width of a hex tile (the tile art is wider than it is tall).
pub const HEX_WIDTH: f32 = HEX_HEIGHT * 1.6;

/// Vertical distance between adjacent rows.
pub const VERT_DIST: f32 = HEX_HEIGHT * 0.75;

/// Horizontal distance between adjacent columns.
pub const HORIZ_DIST: f32 = HEX_WIDTH;

/// Side length of a square chunk of hexes, in hexes.
pub const CHUNK_SIZE: i32 = 5;

/// Hex grid coordinate (column, row). The universal addressing unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HexCoord {
    pub col: i32,
    pub row: i32,
}

impl HexCoord {
    pub fn new(col: i32, row: i32) -> Self {
        Self { col, row }
    }

    /// Chunk containing this hex.
    pub fn chunk(&self) -> ChunkKey {
        ChunkKey::containing(*self)
    }

    /// The six adjacent hexes, ordered west, east, then the row above and
    /// the row below. Diagonal columns depend on row parity because odd
    /// rows are shifted half a column west.
    pub fn neighbors(&self) -> [HexCoord; 6] {
        let (col, row) = (self.col, self.row);
        let diag = if row % 2 == 0 { col + 1 } else { col - 1 };
        [
            HexCoord::new(col - 1, row),
            HexCoord::new(col + 1, row),
            HexCoord::new(col, row - 1),
            HexCoord::new(diag, row - 1),
            HexCoord::new(col, row + 1),
            HexCoord::new(diag, row + 1),
        ]
    }
}

/// A 3D world-space position (x east, y up, z south).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct WorldPosition {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl WorldPosition {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Linear interpolation between two positions.
    pub fn lerp(&self, other: &WorldPosition, t: f32) -> WorldPosition {
        WorldPosition {
            x: self.x + (other.x - self.x) * t,
            y: self.y + (other.y - self.y) * t,
            z: self.z + (other.z - self.z) * t,
        }
    }

    pub fn distance_to(&self, other: &WorldPosition) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }
}

/// Horizontal shift applied to a row. Odd rows sit half a column to the west.
#[inline]
fn row_offset(row: i32) -> f32 {
    (((row % 2) * row.signum()) as f32 * HORIZ_DIST) / 2.0
}

/// Deterministic terrain jitter in `[0, 1)`, stable for a given (x, z).
///
/// Classic shader hash; reuses the same constants so heights match the
/// original tile art baked against it.
#[inline]
pub fn pseudo_random(x: f32, z: f32) -> f32 {
    let s = ((x as f64) * 12.9898 + (z as f64) * 78.233).sin() * 43758.5453123;
    (s - s.floor()) as f32
}

/// World-space position of a hex center.
///
/// With `flat` set the y coordinate is zero (ground plane, hit testing);
/// otherwise y carries the deterministic cosmetic height jitter.
pub fn world_position(hex: HexCoord, flat: bool) -> WorldPosition {
    let x = hex.col as f32 * HORIZ_DIST - row_offset(hex.row);
    let z = hex.row as f32 * VERT_DIST;
    let y = if flat { 0.0 } else { pseudo_random(x, z) * 2.0 };
    WorldPosition::new(x, y, z)
}

/// Exact numeric inverse of [`world_position`] (round-to-nearest).
pub fn hex_from_world(x: f32, z: f32) -> HexCoord {
    let row = (z / VERT_DIST).round() as i32;
    let col = ((x + row_offset(row)) / HORIZ_DIST).round() as i32;
    HexCoord::new(col, row)
}

/// Chunk identifier: `(floor(col / CHUNK_SIZE), floor(row / CHUNK_SIZE))`.
///
/// Chunks are never materialized; only keys and their fetched/resident
/// status are tracked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChunkKey {
    pub x: i32,
    pub z: i32,
}

impl ChunkKey {
    pub fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }

    pub fn containing(hex: HexCoord) -> Self {
        Self {
            x: hex.col.div_euclid(CHUNK_SIZE),
            z: hex.row.div_euclid(CHUNK_SIZE),
        }
    }

    /// First hex (lowest col/row) of this chunk.
    pub fn origin(&self) -> HexCoord {
        HexCoord::new(self.x * CHUNK_SIZE, self.z * CHUNK_SIZE)
    }

    /// Iterate the `CHUNK_SIZE x CHUNK_SIZE` hexes of this chunk.
    pub fn hexes(&self) -> impl Iterator<Item = HexCoord> {
        let origin = self.origin();
        (0..CHUNK_SIZE).flat_map(move |dr| {
            (0..CHUNK_SIZE).map(move |dc| HexCoord::new(origin.col + dc, origin.row + dr))
        })
    }
}

/// All chunk keys within the rectangular window `center +- (radius_x, radius_z)`.
pub fn chunk_window(center: ChunkKey, radius_x: i32, radius_z: i32) -> Vec<ChunkKey> {
    let mut keys = Vec::with_capacity(((2 * radius_x + 1) * (2 * radius_z + 1)) as usize);
    for dz in -radius_z..=radius_z {
        for dx in -radius_x..=radius_x {
            keys.push(ChunkKey::new(center.x + dx, center.z + dz));
        }
    }
    keys
}

/// Inclusive rectangular hex bounds derived from the resident chunk window.
/// Every renderer and manager consults this to decide scene attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisibleBounds {
    pub min_col: i32,
    pub max_col: i32,
    pub min_row: i32,
    pub max_row: i32,
}

impl VisibleBounds {
    /// Bounds of the chunk window centered on `center`.
    pub fn from_chunk_window(center: ChunkKey, radius_x: i32, radius_z: i32) -> Self {
        let min = ChunkKey::new(center.x - radius_x, center.z - radius_z).origin();
        let max_chunk = ChunkKey::new(center.x + radius_x, center.z + radius_z).origin();
        Self {
            min_col: min.col,
            max_col: max_chunk.col + CHUNK_SIZE - 1,
            min_row: min.row,
            max_row: max_chunk.row + CHUNK_SIZE - 1,
        }
    }

    /// Degenerate bounds containing nothing.
    pub fn empty() -> Self {
        Self {
            min_col: 1,
            max_col: 0,
            min_row: 1,
            max_row: 0,
        }
    }

    pub fn contains(&self, hex: HexCoord) -> bool {
        hex.col >= self.min_col
            && hex.col <= self.max_col
            && hex.row >= self.min_row
            && hex.row <= self.max_row
    }
}

/// Breadth-first shortest path over hexes satisfying `passable`.
///
/// Returns the full path including both endpoints, or `None` when the goal
/// is unreachable within `max_expansions` visited hexes. The start hex is
/// exempt from the passability check (an army stands on it already).
pub fn find_path(
    start: HexCoord,
    goal: HexCoord,
    passable: impl Fn(HexCoord) -> bool,
    max_expansions: usize,
) -> Option<Vec<HexCoord>> {
    use std::collections::{HashMap, VecDeque};

    if start == goal {
        return Some(vec![start]);
    }

    let mut came_from: HashMap<HexCoord, HexCoord> = HashMap::new();
    let mut queue = VecDeque::new();
    queue.push_back(start);
    came_from.insert(start, start);

    let mut expanded = 0usize;
    while let Some(current) = queue.pop_front() {
        expanded += 1;
        if expanded > max_expansions {
            return None;
        }
        for next in current.neighbors() {
            if came_from.contains_key(&next) {
                continue;
            }
            if next != goal && !passable(next) {
                continue;
            }
            came_from.insert(next, current);
            if next == goal {
                let mut path = vec![goal];
                let mut walk = goal;
                while walk != start {
                    walk = came_from[&walk];
                    path.push(walk);
                }
                path.reverse();
                return Some(path);
            }
            queue.push_back(next);
        }
    }
    None
}
