//! Tilemap atlas geometry and UV derivation.
//!
//! Every tile skin draws from a packed sprite sheet: fixed-size tiles laid
//! out left to right, top to bottom, separated by a one-pixel gutter so
//! filtering never bleeds between neighbours. A [`TilemapSpec`] describes
//! one sheet; [`TilemapSpec::uv_rect`] turns a flat tile index into the
//! offset/repeat pair a sprite material samples with.

use serde::{Deserialize, Serialize};

use crate::scene::UvRect;

/// Tile cell width in texels, shared by every sheet.
pub const TILE_WIDTH: f32 = 256.0;
/// Tile cell height in texels, shared by every sheet.
pub const TILE_HEIGHT: f32 = 304.0;
/// Gutter between cells in texels.
pub const TILE_GAP: f32 = 1.0;

// ============================================================================
// Tilemap spec
// ============================================================================

/// Geometry of one packed sprite sheet.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TilemapSpec {
    pub texture_width: f32,
    pub texture_height: f32,
    pub tile_width: f32,
    pub tile_height: f32,
    pub tile_gap: f32,
}

impl TilemapSpec {
    /// Sheet with the standard cell size, sized to hold `tiles` indices at
    /// `per_row` columns.
    pub fn with_layout(tiles: u32, per_row: u32) -> Self {
        let rows = tiles.div_ceil(per_row);
        TilemapSpec {
            texture_width: per_row as f32 * (TILE_WIDTH + TILE_GAP),
            texture_height: rows as f32 * (TILE_HEIGHT + TILE_GAP),
            tile_width: TILE_WIDTH,
            tile_height: TILE_HEIGHT,
            tile_gap: TILE_GAP,
        }
    }

    /// How many cells fit on one row of the sheet.
    pub fn tiles_per_row(&self) -> u32 {
        ((self.texture_width + self.tile_gap) / (self.tile_width + self.tile_gap)).floor() as u32
    }

    /// Offset/repeat rectangle for a flat tile index.
    ///
    /// The offset addresses the bottom-left corner of the cell with V
    /// pointing up, so row zero of the sheet is the top row of the texture.
    pub fn uv_rect(&self, tile_index: u32) -> UvRect {
        let per_row = self.tiles_per_row().max(1);
        let tile_x = (tile_index % per_row) as f32;
        let tile_y = (tile_index / per_row) as f32;
        let step_x = self.tile_width + self.tile_gap;
        let step_y = self.tile_height + self.tile_gap;
        UvRect {
            offset_x: tile_x * step_x / self.texture_width,
            offset_y: 1.0 - ((tile_y + 1.0) * step_y) / self.texture_height,
            repeat_x: self.tile_width / self.texture_width,
            repeat_y: self.tile_height / self.texture_height,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_fits_requested_tiles() {
        let spec = TilemapSpec::with_layout(16, 8);
        assert_eq!(spec.tiles_per_row(), 8);
        let spec = TilemapSpec::with_layout(9, 3);
        assert_eq!(spec.tiles_per_row(), 3);
    }

    #[test]
    fn test_first_tile_sits_top_left() {
        let spec = TilemapSpec::with_layout(16, 8);
        let uv = spec.uv_rect(0);
        assert!(uv.offset_x.abs() < 1e-6);
        // Top row: offset_y + repeat_y reaches the top of the texture minus
        // the gutter.
        let top = uv.offset_y + uv.repeat_y;
        assert!((top - 1.0).abs() < 0.01, "top edge at {top}");
    }

    #[test]
    fn test_indices_advance_across_then_down() {
        let spec = TilemapSpec::with_layout(16, 8);
        let a = spec.uv_rect(0);
        let b = spec.uv_rect(1);
        let below = spec.uv_rect(8);
        assert!(b.offset_x > a.offset_x);
        assert!((b.offset_y - a.offset_y).abs() < 1e-6);
        assert!(below.offset_y < a.offset_y);
        assert!((below.offset_x - a.offset_x).abs() < 1e-6);
    }

    #[test]
    fn test_repeat_matches_cell_fraction() {
        let spec = TilemapSpec::with_layout(16, 8);
        let uv = spec.uv_rect(5);
        assert!((uv.repeat_x - TILE_WIDTH / spec.texture_width).abs() < 1e-6);
        assert!((uv.repeat_y - TILE_HEIGHT / spec.texture_height).abs() < 1e-6);
    }
}
