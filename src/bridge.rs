//! Host Renderer Bridge
//!
//! This module provides the interface between the map core and the rendering
//! host. It converts a [`RenderSnapshot`] into an FFI-friendly flat buffer so
//! a renderer in another language can draw a frame without parsing JSON.
//!
//! # Stable FFI Contract
//!
//! This module defines a **stable binary format** for transferring draw state
//! to the host. The format is designed for:
//! - **Efficiency**: Contiguous f32 array, no allocations on the host side
//! - **Simplicity**: Fixed stride, predictable layout
//! - **Stability**: Field order and count are versioned and documented
//!
//! Labels are not part of the buffer. Text cannot ride an f32 lattice, so
//! hosts that render labels take them from [`RenderSnapshot::labels`].
//!
//! # Buffer Layout (Version 1.0)
//!
//! The flat buffer is a `Vec<f32>` with the following structure:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │ HEADER (2 elements)                                              │
//! ├──────────────────────────────────────────────────────────────────┤
//! │ [0] sprite_count (as f32)                                        │
//! │ [1] ground_count (as f32)                                        │
//! ├──────────────────────────────────────────────────────────────────┤
//! │ SPRITE DATA (sprite_count × SPRITE_STRIDE elements)              │
//! ├──────────────────────────────────────────────────────────────────┤
//! │ For each sprite i (offset = 2 + i * SPRITE_STRIDE):              │
//! │   [+0]  kind_id      - 0.0=sprite, 1.0=highlight                 │
//! │   [+1]  x            - X world position                          │
//! │   [+2]  y            - Y world position                          │
//! │   [+3]  z            - Z world position                          │
//! │   [+4]  scale_x      - Horizontal scale                          │
//! │   [+5]  scale_y      - Vertical scale                            │
//! │   [+6]  render_order - Draw order (i32 as f32)                   │
//! │   [+7]  atlas        - Atlas page index                          │
//! │   [+8]  uv_offset_x  - Atlas window origin U                     │
//! │   [+9]  uv_offset_y  - Atlas window origin V                     │
//! │   [+10] uv_repeat_x  - Atlas window width                        │
//! │   [+11] uv_repeat_y  - Atlas window height                       │
//! │   [+12] color        - Tint as 0xRRGGBB (u32 as f32)             │
//! │   [+13] opacity      - Opacity (0.0-1.0)                         │
//! ├──────────────────────────────────────────────────────────────────┤
//! │ GROUND DATA (ground_count × GROUND_STRIDE elements)              │
//! ├──────────────────────────────────────────────────────────────────┤
//! │ For each instance j                                              │
//! │ (offset = 2 + sprite_count * SPRITE_STRIDE + j * GROUND_STRIDE): │
//! │   [+0] x   - X world position                                    │
//! │   [+1] y   - Y world position                                    │
//! │   [+2] z   - Z world position                                    │
//! │   [+3] col - Hex column (i32 as f32)                             │
//! │   [+4] row - Hex row (i32 as f32)                                │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Constants
//!
//! - `SPRITE_STRIDE = 14` - Number of f32 values per sprite
//! - `GROUND_STRIDE = 5` - Number of f32 values per ground instance
//! - `HEADER_SIZE = 2` - Number of f32 values in header
//!
//! # Kind ID Mapping
//!
//! | Kind      | ID  |
//! |-----------|-----|
//! | sprite    | 0.0 |
//! | highlight | 1.0 |
//!
//! # Usage from the host (JavaScript)
//!
//! ```javascript
//! const SPRITE_STRIDE = 14;
//! const GROUND_STRIDE = 5;
//! const HEADER_SIZE = 2;
//!
//! function parseFrame(buffer) {
//!     const spriteCount = buffer[0];
//!     const groundCount = buffer[1];
//!     for (let i = 0; i < spriteCount; i++) {
//!         const offset = HEADER_SIZE + i * SPRITE_STRIDE;
//!         const isHighlight = buffer[offset + 0] > 0.5;
//!         const x = buffer[offset + 1];
//!         const z = buffer[offset + 3];
//!         const color = buffer[offset + 12];  // 0xRRGGBB
//!         // ... update the instanced mesh / sprite pool
//!     }
//! }
//! ```
//!
//! # Determinism
//!
//! The buffer is deterministic: given the same `RenderSnapshot`, the output
//! is identical. Records are serialized in snapshot order (no sorting).

use crate::snapshot::RenderSnapshot;

// ============================================================================
// CONSTANTS - STABLE FFI CONTRACT
// ============================================================================

/// Number of f32 values per sprite in the flat buffer.
///
/// **This is part of the stable FFI contract. Do not change without versioning.**
///
/// Fields (in order):
/// 0. kind_id, 1. x, 2. y, 3. z, 4. scale_x, 5. scale_y, 6. render_order,
/// 7. atlas, 8. uv_offset_x, 9. uv_offset_y, 10. uv_repeat_x,
/// 11. uv_repeat_y, 12. color, 13. opacity
pub const SPRITE_STRIDE: usize = 14;

/// Number of f32 values per ground instance.
///
/// Fields (in order): 0. x, 1. y, 2. z, 3. col, 4. row
pub const GROUND_STRIDE: usize = 5;

/// Number of f32 values in the buffer header: sprite count, ground count.
pub const HEADER_SIZE: usize = 2;

// Kind ID constants for FFI
/// Kind ID: atlas billboard sprite
pub const KIND_SPRITE: f32 = 0.0;
/// Kind ID: pulsing action-highlight plane
pub const KIND_HIGHLIGHT: f32 = 1.0;

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

/// Convert a snapshot kind string to its numeric ID for FFI.
///
/// # Mapping
/// - "sprite" → 0.0
/// - "highlight" → 1.0
/// - Unknown → 0.0 (defaults to sprite)
#[inline]
pub fn kind_to_id(kind: &str) -> f32 {
    match kind {
        "sprite" => KIND_SPRITE,
        "highlight" => KIND_HIGHLIGHT,
        _ => KIND_SPRITE, // Default to sprite for unknown
    }
}

// ============================================================================
// MAIN SERIALIZATION FUNCTION
// ============================================================================

/// Convert a render snapshot to a flat buffer for FFI transfer to the host.
///
/// # Buffer Format
///
/// See module-level documentation for the complete buffer layout.
///
/// # Layout Summary
///
/// - `buffer[0]` = sprite_count, `buffer[1]` = ground_count
/// - For each sprite `i` at offset `2 + i * SPRITE_STRIDE`:
///   - kind_id, x, y, z, scale_x, scale_y, render_order, atlas,
///     uv_offset_x, uv_offset_y, uv_repeat_x, uv_repeat_y, color, opacity
/// - Ground instances follow the sprite block at `GROUND_STRIDE` each.
///
/// Colors are `0xRRGGBB`, at most `0xFFFFFF`; every such value is below
/// 2^24 and therefore exactly representable as f32.
///
/// # Determinism
///
/// This function is deterministic: the same `RenderSnapshot` always produces
/// the same output buffer. Records are serialized in their existing order.
pub fn snapshot_to_flatbuffer(snapshot: &RenderSnapshot) -> Vec<f32> {
    let sprite_count = snapshot.sprites.len();
    let ground_count = snapshot.ground.as_ref().map_or(0, |g| g.instances.len());
    let buffer_size = calculate_buffer_size(sprite_count, ground_count);

    // Pre-allocate exact capacity
    let mut buffer = Vec::with_capacity(buffer_size);

    // Header: sprite count, ground count
    buffer.push(sprite_count as f32);
    buffer.push(ground_count as f32);

    // Sprite data: fixed stride per sprite
    for sprite in &snapshot.sprites {
        // [+0] kind_id
        buffer.push(kind_to_id(&sprite.kind));
        // [+1] x
        buffer.push(sprite.x);
        // [+2] y
        buffer.push(sprite.y);
        // [+3] z
        buffer.push(sprite.z);
        // [+4] scale_x
        buffer.push(sprite.scale_x);
        // [+5] scale_y
        buffer.push(sprite.scale_y);
        // [+6] render_order
        buffer.push(sprite.render_order as f32);
        // [+7] atlas
        buffer.push(sprite.atlas as f32);
        // [+8] uv_offset_x
        buffer.push(sprite.uv.offset_x);
        // [+9] uv_offset_y
        buffer.push(sprite.uv.offset_y);
        // [+10] uv_repeat_x
        buffer.push(sprite.uv.repeat_x);
        // [+11] uv_repeat_y
        buffer.push(sprite.uv.repeat_y);
        // [+12] color
        buffer.push(sprite.color as f32);
        // [+13] opacity
        buffer.push(sprite.opacity);
    }

    // Ground data: fixed stride per instance
    if let Some(ground) = &snapshot.ground {
        for instance in &ground.instances {
            // [+0] x
            buffer.push(instance.x);
            // [+1] y
            buffer.push(instance.y);
            // [+2] z
            buffer.push(instance.z);
            // [+3] col
            buffer.push(instance.col as f32);
            // [+4] row
            buffer.push(instance.row as f32);
        }
    }

    debug_assert_eq!(buffer.len(), buffer_size, "Buffer size mismatch");
    buffer
}

/// Calculate the required buffer size for the given record counts.
///
/// # Formula
/// `HEADER_SIZE + sprite_count * SPRITE_STRIDE + ground_count * GROUND_STRIDE`
#[inline]
pub fn calculate_buffer_size(sprite_count: usize, ground_count: usize) -> usize {
    HEADER_SIZE + sprite_count * SPRITE_STRIDE + ground_count * GROUND_STRIDE
}

/// Parse the sprite count from a flat buffer.
///
/// Returns `None` if the buffer is shorter than the header.
#[inline]
pub fn parse_sprite_count(buffer: &[f32]) -> Option<usize> {
    if buffer.len() < HEADER_SIZE {
        return None;
    }
    Some(buffer[0] as usize)
}

/// Parse the ground instance count from a flat buffer.
///
/// Returns `None` if the buffer is shorter than the header.
#[inline]
pub fn parse_ground_count(buffer: &[f32]) -> Option<usize> {
    if buffer.len() < HEADER_SIZE {
        return None;
    }
    Some(buffer[1] as usize)
}

/// Get the buffer offset for a specific sprite index.
#[inline]
pub const fn sprite_offset(sprite_index: usize) -> usize {
    HEADER_SIZE + sprite_index * SPRITE_STRIDE
}

/// Get the buffer offset for a specific ground instance. The sprite count
/// comes from the same buffer's header.
#[inline]
pub const fn ground_offset(sprite_count: usize, instance_index: usize) -> usize {
    HEADER_SIZE + sprite_count * SPRITE_STRIDE + instance_index * GROUND_STRIDE
}

// ============================================================================
// FIELD OFFSET CONSTANTS (for host-side parsing)
// ============================================================================

/// Offset within sprite data for: Kind ID
pub const SPRITE_FIELD_KIND: usize = 0;
/// Offset within sprite data for: X position
pub const SPRITE_FIELD_X: usize = 1;
/// Offset within sprite data for: Y position
pub const SPRITE_FIELD_Y: usize = 2;
/// Offset within sprite data for: Z position
pub const SPRITE_FIELD_Z: usize = 3;
/// Offset within sprite data for: Horizontal scale
pub const SPRITE_FIELD_SCALE_X: usize = 4;
/// Offset within sprite data for: Vertical scale
pub const SPRITE_FIELD_SCALE_Y: usize = 5;
/// Offset within sprite data for: Render order
pub const SPRITE_FIELD_RENDER_ORDER: usize = 6;
/// Offset within sprite data for: Atlas page
pub const SPRITE_FIELD_ATLAS: usize = 7;
/// Offset within sprite data for: UV origin U
pub const SPRITE_FIELD_UV_OFFSET_X: usize = 8;
/// Offset within sprite data for: UV origin V
pub const SPRITE_FIELD_UV_OFFSET_Y: usize = 9;
/// Offset within sprite data for: UV window width
pub const SPRITE_FIELD_UV_REPEAT_X: usize = 10;
/// Offset within sprite data for: UV window height
pub const SPRITE_FIELD_UV_REPEAT_Y: usize = 11;
/// Offset within sprite data for: Tint color
pub const SPRITE_FIELD_COLOR: usize = 12;
/// Offset within sprite data for: Opacity
pub const SPRITE_FIELD_OPACITY: usize = 13;

/// Offset within ground data for: X position
pub const GROUND_FIELD_X: usize = 0;
/// Offset within ground data for: Y position
pub const GROUND_FIELD_Y: usize = 1;
/// Offset within ground data for: Z position
pub const GROUND_FIELD_Z: usize = 2;
/// Offset within ground data for: Hex column
pub const GROUND_FIELD_COL: usize = 3;
/// Offset within ground data for: Hex row
pub const GROUND_FIELD_ROW: usize = 4;

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::MapWorld;
    use crate::components::{ObjectId, ObjectKind, ObjectRef, TroopCategory, TroopTier};
    use crate::fetch::TileEntity;
    use crate::feed::FeedUpdate;
    use crate::objects::ArmyData;
    use crate::selection::{ActionPath, ActionType};
    use crate::tiles::Biome;

    fn army(id: u32, col: i32, row: i32) -> ArmyData {
        ArmyData {
            id: ObjectId(id),
            hex: crate::coords::HexCoord::new(col, row),
            category: TroopCategory::Knight,
            tier: TroopTier::T1,
            owner: Some("bastion".into()),
            troop_count: 40,
            stamina: 12,
            max_stamina: 20,
        }
    }

    /// Stream the origin window and explore `explored` of its hexes.
    fn populated_map(explored: usize) -> MapWorld {
        let mut map = MapWorld::new();
        map.register_materials();
        map.update_camera(0.0, 0.0);
        let requests = map.drain_fetch_requests();
        assert_eq!(requests.len(), 1);
        let tiles: Vec<TileEntity> = requests[0]
            .hexes
            .iter()
            .take(explored)
            .map(|&hex| TileEntity {
                hex,
                biome: Biome::Grassland,
            })
            .collect();
        map.deliver_fetched(requests[0].id, Ok(tiles));
        map
    }

    #[test]
    fn test_flatbuffer_empty_world() {
        let mut map = MapWorld::new();
        let snapshot = map.snapshot();
        let buffer = snapshot_to_flatbuffer(&snapshot);

        // No window streamed yet: just the header with both counts 0
        assert_eq!(buffer.len(), HEADER_SIZE);
        assert_eq!(buffer[0], 0.0);
        assert_eq!(buffer[1], 0.0);
    }

    #[test]
    fn test_flatbuffer_carries_sprites_and_ground() {
        let mut map = populated_map(3);
        let snapshot = map.snapshot();
        let buffer = snapshot_to_flatbuffer(&snapshot);

        let sprite_count = snapshot.sprites.len();
        let ground_count = snapshot.ground.as_ref().unwrap().instances.len();
        assert_eq!(sprite_count, 3);
        assert_eq!(
            buffer.len(),
            calculate_buffer_size(sprite_count, ground_count)
        );
        assert_eq!(parse_sprite_count(&buffer), Some(sprite_count));
        assert_eq!(parse_ground_count(&buffer), Some(ground_count));

        // First sprite record matches the snapshot field for field
        let sprite = &snapshot.sprites[0];
        let offset = sprite_offset(0);
        assert_eq!(buffer[offset + SPRITE_FIELD_KIND], KIND_SPRITE);
        assert_eq!(buffer[offset + SPRITE_FIELD_X], sprite.x);
        assert_eq!(buffer[offset + SPRITE_FIELD_Y], sprite.y);
        assert_eq!(buffer[offset + SPRITE_FIELD_Z], sprite.z);
        assert_eq!(buffer[offset + SPRITE_FIELD_ATLAS], sprite.atlas as f32);
        assert_eq!(buffer[offset + SPRITE_FIELD_COLOR], sprite.color as f32);
        assert_eq!(buffer[offset + SPRITE_FIELD_OPACITY], sprite.opacity);

        // First ground record
        let instance = snapshot.ground.as_ref().unwrap().instances[0];
        let offset = ground_offset(sprite_count, 0);
        assert_eq!(buffer[offset + GROUND_FIELD_X], instance.x);
        assert_eq!(buffer[offset + GROUND_FIELD_COL], instance.col as f32);
        assert_eq!(buffer[offset + GROUND_FIELD_ROW], instance.row as f32);
    }

    #[test]
    fn test_flatbuffer_determinism() {
        // Two identically driven worlds must serialize identically
        let drive = || {
            let mut map = populated_map(5);
            map.apply_update(FeedUpdate::ArmyUpsert(army(7, 1, 0)));
            map.apply_update(FeedUpdate::ArmyUpsert(army(7, 3, 0)));
            for _ in 0..6 {
                map.step(0.016);
            }
            map
        };

        let mut map1 = drive();
        let mut map2 = drive();

        let buffer1 = snapshot_to_flatbuffer(&map1.snapshot());
        let buffer2 = snapshot_to_flatbuffer(&map2.snapshot());

        assert_eq!(buffer1.len(), buffer2.len(), "Buffer lengths differ");
        assert_eq!(buffer1, buffer2, "Buffers are not identical");
    }

    #[test]
    fn test_flatbuffer_stays_valid_with_highlights() {
        let mut map = populated_map(6);
        map.apply_update(FeedUpdate::ArmyUpsert(army(4, 1, 0)));
        for _ in 0..3 {
            map.step(0.016);
        }
        map.select_object(ObjectRef::new(ObjectKind::Army, ObjectId(4)));
        map.set_action_paths(vec![ActionPath {
            action: ActionType::Move,
            hexes: vec![
                crate::coords::HexCoord::new(1, 0),
                crate::coords::HexCoord::new(2, 0),
            ],
        }]);
        map.step(0.016);

        let snapshot = map.snapshot();
        let buffer = snapshot_to_flatbuffer(&snapshot);

        let sprite_count = parse_sprite_count(&buffer).unwrap();
        let ground_count = parse_ground_count(&buffer).unwrap();
        assert_eq!(buffer.len(), calculate_buffer_size(sprite_count, ground_count));

        let mut highlights = 0;
        for i in 0..sprite_count {
            let offset = sprite_offset(i);
            let kind = buffer[offset + SPRITE_FIELD_KIND];
            assert!(kind == KIND_SPRITE || kind == KIND_HIGHLIGHT);
            let opacity = buffer[offset + SPRITE_FIELD_OPACITY];
            assert!((0.0..=1.0).contains(&opacity), "opacity out of range");
            assert!(buffer[offset + SPRITE_FIELD_COLOR] <= 0xffffff as f32);
            if kind == KIND_HIGHLIGHT {
                highlights += 1;
            }
        }
        // Both path hexes carry a highlight plane
        assert_eq!(highlights, 2);
    }

    #[test]
    fn test_calculate_buffer_size() {
        assert_eq!(calculate_buffer_size(0, 0), HEADER_SIZE);
        assert_eq!(calculate_buffer_size(1, 0), HEADER_SIZE + SPRITE_STRIDE);
        assert_eq!(
            calculate_buffer_size(3, 10),
            HEADER_SIZE + 3 * SPRITE_STRIDE + 10 * GROUND_STRIDE
        );
    }

    #[test]
    fn test_parse_counts() {
        let buffer: Vec<f32> = vec![];
        assert_eq!(parse_sprite_count(&buffer), None);
        assert_eq!(parse_ground_count(&buffer), None);

        let buffer = vec![5.0];
        assert_eq!(parse_sprite_count(&buffer), None);

        let buffer = vec![5.0, 7.0];
        assert_eq!(parse_sprite_count(&buffer), Some(5));
        assert_eq!(parse_ground_count(&buffer), Some(7));
    }

    #[test]
    fn test_record_offsets() {
        assert_eq!(sprite_offset(0), HEADER_SIZE);
        assert_eq!(sprite_offset(1), HEADER_SIZE + SPRITE_STRIDE);
        assert_eq!(ground_offset(0, 0), HEADER_SIZE);
        assert_eq!(
            ground_offset(4, 2),
            HEADER_SIZE + 4 * SPRITE_STRIDE + 2 * GROUND_STRIDE
        );
    }

    #[test]
    fn test_kind_to_id() {
        assert_eq!(kind_to_id("sprite"), KIND_SPRITE);
        assert_eq!(kind_to_id("highlight"), KIND_HIGHLIGHT);
        assert_eq!(kind_to_id("unknown"), KIND_SPRITE); // Default
    }

    #[test]
    fn test_field_offsets_are_valid() {
        // Ensure all field offsets are within their stride
        assert!(SPRITE_FIELD_KIND < SPRITE_STRIDE);
        assert!(SPRITE_FIELD_X < SPRITE_STRIDE);
        assert!(SPRITE_FIELD_Y < SPRITE_STRIDE);
        assert!(SPRITE_FIELD_Z < SPRITE_STRIDE);
        assert!(SPRITE_FIELD_SCALE_X < SPRITE_STRIDE);
        assert!(SPRITE_FIELD_SCALE_Y < SPRITE_STRIDE);
        assert!(SPRITE_FIELD_RENDER_ORDER < SPRITE_STRIDE);
        assert!(SPRITE_FIELD_ATLAS < SPRITE_STRIDE);
        assert!(SPRITE_FIELD_UV_OFFSET_X < SPRITE_STRIDE);
        assert!(SPRITE_FIELD_UV_OFFSET_Y < SPRITE_STRIDE);
        assert!(SPRITE_FIELD_UV_REPEAT_X < SPRITE_STRIDE);
        assert!(SPRITE_FIELD_UV_REPEAT_Y < SPRITE_STRIDE);
        assert!(SPRITE_FIELD_COLOR < SPRITE_STRIDE);
        assert!(SPRITE_FIELD_OPACITY < SPRITE_STRIDE);
        assert!(GROUND_FIELD_X < GROUND_STRIDE);
        assert!(GROUND_FIELD_COL < GROUND_STRIDE);
        assert!(GROUND_FIELD_ROW < GROUND_STRIDE);

        // Ensure strides match the highest field + 1
        assert_eq!(SPRITE_STRIDE, SPRITE_FIELD_OPACITY + 1);
        assert_eq!(GROUND_STRIDE, GROUND_FIELD_ROW + 1);
    }
}
