//! Pooled, diff-updating tile rendering.
//!
//! A [`TileRenderer`] owns every sprite of one visual layer (terrain,
//! structures, units, quest markers, chests). Each occupied hex gets a group
//! node anchored at the hex center; the tile sprite and any extras a manager
//! hangs off the hex (labels, highlight planes) live inside that group, so
//! moving the group moves everything on the hex together.
//!
//! Sprites are pooled per tile index and recycled on removal. Steady-state
//! updates go through [`TileRenderer::update_tiles_for_hexes`], which diffs
//! the desired tile set against what is already on screen and only touches
//! the difference; the full rebuild path exists for first paint.

use std::collections::{HashMap, HashSet};
use std::fmt::Debug;
use std::hash::Hash;

use bevy_ecs::prelude::Resource;
use tracing::{debug, trace, warn};

use crate::animation::{AnimationScheduler, Easing, MoveCompletion, TaskId};
use crate::components::{ObjectRef, TileLayer};
use crate::coords::{world_position, HexCoord, VisibleBounds, WorldPosition, HEX_SIZE};
use crate::scene::{AttachBatch, Material, MaterialId, NodeHandle, NodeKind, SceneArena};

pub mod atlas;
pub mod biome;
pub mod buildings;
pub mod markers;
pub mod units;

pub use atlas::{TilemapSpec, TILE_GAP, TILE_HEIGHT, TILE_WIDTH};
pub use biome::Biome;
pub use buildings::BuildingSkin;
pub use markers::{ChestSkin, QuestSkin};
pub use units::UnitSkin;

/// Sprites kept warm per tile index.
pub const POOL_SIZE: usize = 100;
/// Uniform sprite width in world units.
pub const SPRITE_SCALE: f32 = HEX_SIZE * 3.2;
/// Sprites are slightly taller than wide to cover the hex art aspect.
pub const SPRITE_SCALE_Y: f32 = SPRITE_SCALE * 1.15;
/// Tile groups sit this far south of the hex center so the art reads as
/// standing on the hex rather than centered in it.
pub const GROUP_Z_OFFSET: f32 = HEX_SIZE * 0.825;
/// Opacity pulse rate for a selected tile.
pub const SELECT_PULSE_SPEED: f32 = 3.0;
/// Opacity pulse depth for a selected tile.
pub const SELECT_PULSE_INTENSITY: f32 = 0.3;

const BASE_SPRITE_HEIGHT: f32 = 0.2;
const OVERLAY_SPRITE_HEIGHT: f32 = 0.25;

// ============================================================================
// Tile skins
// ============================================================================

/// A tile vocabulary: which sheet it draws from and how a kind maps to a
/// cell on that sheet.
pub trait TileSkin: Copy + Eq + Hash + Debug + Send + Sync + 'static {
    /// Layer the skin renders on; fixes render-order bias and completion
    /// routing.
    const LAYER: TileLayer;

    /// Flat cell index on the skin's sheet.
    fn tile_index(&self) -> u32;

    /// Geometry of the skin's sheet.
    fn atlas() -> TilemapSpec;

    /// Every kind worth a prewarmed material and pool.
    fn catalog() -> Vec<Self>;
}

/// Anchor position of the tile group for `hex`.
pub fn group_anchor(hex: HexCoord) -> WorldPosition {
    let p = world_position(hex, true);
    WorldPosition::new(p.x, 0.0, p.z - GROUP_Z_OFFSET)
}

// ============================================================================
// Sprite pool
// ============================================================================

/// Free lists of detached sprite nodes, one per tile index. Backing nodes
/// stay allocated in the scene arena; the pool only tracks who is idle.
#[derive(Debug, Default)]
pub struct SpritePool {
    free: HashMap<u32, Vec<NodeHandle>>,
    cap: usize,
}

impl SpritePool {
    pub fn new(cap: usize) -> Self {
        SpritePool {
            free: HashMap::new(),
            cap,
        }
    }

    /// Pop an idle sprite for `tile_index`, if any.
    pub fn acquire(&mut self, tile_index: u32) -> Option<NodeHandle> {
        self.free.get_mut(&tile_index).and_then(Vec::pop)
    }

    /// Return a sprite to its free list. `false` means the list is at
    /// capacity and the caller must destroy the node instead.
    pub fn release(&mut self, tile_index: u32, sprite: NodeHandle) -> bool {
        let list = self.free.entry(tile_index).or_default();
        if list.len() >= self.cap {
            return false;
        }
        debug_assert!(
            !list.contains(&sprite),
            "sprite released twice into pool for index {tile_index}"
        );
        list.push(sprite);
        true
    }

    /// Total idle sprites across all indices.
    pub fn idle(&self) -> usize {
        self.free.values().map(Vec::len).sum()
    }

    pub fn idle_for(&self, tile_index: u32) -> usize {
        self.free.get(&tile_index).map_or(0, Vec::len)
    }
}

// ============================================================================
// Tile renderer
// ============================================================================

/// Active selection on a renderer: the pulsing clone and what it replaced.
#[derive(Debug)]
struct SelectedTile {
    hex: HexCoord,
    shared: MaterialId,
    clone: MaterialId,
    pulse: TaskId,
}

/// Renders one tile layer. Owns the per-hex groups, the sprite pool and the
/// shared prototype materials for a skin `K`.
#[derive(Resource)]
pub struct TileRenderer<K: TileSkin> {
    materials: HashMap<u32, MaterialId>,
    pool: SpritePool,
    sprites: HashMap<HexCoord, NodeHandle>,
    tile_groups: HashMap<HexCoord, NodeHandle>,
    /// Hexes whose group is currently attached to the scene root.
    visible_keys: HashSet<HexCoord>,
    bounds: Option<VisibleBounds>,
    /// Mid-move tiles, keyed by the hex they left.
    moving: HashMap<HexCoord, TaskId>,
    selected: Option<SelectedTile>,
    _skin: std::marker::PhantomData<K>,
}

impl<K: TileSkin> Default for TileRenderer<K> {
    fn default() -> Self {
        Self::new(POOL_SIZE)
    }
}

impl<K: TileSkin> TileRenderer<K> {
    pub fn new(pool_cap: usize) -> Self {
        TileRenderer {
            materials: HashMap::new(),
            pool: SpritePool::new(pool_cap),
            sprites: HashMap::new(),
            tile_groups: HashMap::new(),
            visible_keys: HashSet::new(),
            bounds: None,
            moving: HashMap::new(),
            selected: None,
            _skin: std::marker::PhantomData,
        }
    }

    /// Create the prototype materials for every catalogued kind and prewarm
    /// the sprite pool. Tile operations before this are ignored with a
    /// warning, mirroring an atlas texture that has not finished loading.
    pub fn register_materials(&mut self, scene: &mut SceneArena, atlas_page: u32) {
        if self.is_ready() {
            return;
        }
        let sheet = K::atlas();
        for kind in K::catalog() {
            let index = kind.tile_index();
            if self.materials.contains_key(&index) {
                continue;
            }
            let material = scene.create_material(Material {
                atlas: atlas_page,
                uv: sheet.uv_rect(index),
                color: 0xffffff,
                opacity: 1.0,
            });
            self.materials.insert(index, material);
            for _ in 0..self.pool.cap {
                let sprite = scene.create_node(NodeKind::Sprite);
                scene.set_material(sprite, material);
                scene.set_scale(sprite, SPRITE_SCALE, SPRITE_SCALE_Y);
                self.pool.release(index, sprite);
            }
        }
        debug!(
            layer = ?K::LAYER,
            kinds = self.materials.len(),
            pooled = self.pool.idle(),
            "tile materials registered"
        );
    }

    pub fn is_ready(&self) -> bool {
        !self.materials.is_empty()
    }

    /// Reverse lookup from a sprite's material to its tile index. Fails for
    /// sprites wearing a cloned (selection) material.
    fn tile_index_of(&self, scene: &SceneArena, sprite: NodeHandle) -> Option<u32> {
        let material = scene.node_material(sprite)?;
        self.materials
            .iter()
            .find(|(_, &id)| id == material)
            .map(|(&index, _)| index)
    }

    fn sprite_height() -> f32 {
        match K::LAYER {
            TileLayer::Biome => BASE_SPRITE_HEIGHT,
            _ => OVERLAY_SPRITE_HEIGHT,
        }
    }

    /// Group for `hex`, created on first use. New groups attach to the
    /// scene root only when the hex is inside the visible bounds.
    fn ensure_tile_group(&mut self, scene: &mut SceneArena, hex: HexCoord) -> NodeHandle {
        if let Some(&group) = self.tile_groups.get(&hex) {
            return group;
        }
        let group = scene.create_node(NodeKind::Group);
        scene.set_local_position(group, group_anchor(hex));
        if self.is_hex_visible(hex) {
            scene.attach(scene.root(), group);
            self.visible_keys.insert(hex);
        }
        self.tile_groups.insert(hex, group);
        group
    }

    /// Whether `hex` falls inside the current visible bounds. Before any
    /// bounds arrive everything counts as visible.
    pub fn is_hex_visible(&self, hex: HexCoord) -> bool {
        self.bounds.map_or(true, |b| b.contains(hex))
    }

    /// Place a tile of `kind` on `hex`. No-op when a sprite already sits
    /// there or the hex is unexplored.
    pub fn add_tile(&mut self, scene: &mut SceneArena, hex: HexCoord, kind: K, explored: bool) {
        if !self.is_ready() {
            warn!(layer = ?K::LAYER, ?hex, "tile materials not registered yet");
            return;
        }
        if !explored || self.sprites.contains_key(&hex) {
            return;
        }
        let index = kind.tile_index();
        let Some(&material) = self.materials.get(&index) else {
            warn!(layer = ?K::LAYER, index, "no material for tile index");
            return;
        };
        let sprite = self
            .pool
            .acquire(index)
            .unwrap_or_else(|| scene.create_node(NodeKind::Sprite));
        scene.set_material(sprite, material);
        scene.set_scale(sprite, SPRITE_SCALE, SPRITE_SCALE_Y);
        scene.set_local_position(sprite, WorldPosition::new(0.0, Self::sprite_height(), 0.0));
        scene.set_render_order(sprite, K::LAYER.render_order(hex.row));
        scene.set_visible(sprite, true);
        let group = self.ensure_tile_group(scene, hex);
        scene.attach(group, sprite);
        self.sprites.insert(hex, sprite);
    }

    /// Remove the tile on `hex`, recycling its sprite. The group survives
    /// while anything else (label, highlight) still hangs off the hex.
    pub fn remove_tile(&mut self, scene: &mut SceneArena, hex: HexCoord) {
        let Some(sprite) = self.sprites.remove(&hex) else {
            return;
        };
        scene.detach(sprite);
        self.recycle_sprite(scene, sprite);
        self.cleanup_group_if_empty(scene, hex);
    }

    fn recycle_sprite(&mut self, scene: &mut SceneArena, sprite: NodeHandle) {
        match self.tile_index_of(scene, sprite) {
            Some(index) => {
                if !self.pool.release(index, sprite) {
                    scene.remove_node(sprite);
                }
            }
            None => {
                // Cloned selection material; free it with the node.
                if let Some(material) = scene.node_material(sprite) {
                    scene.free_material(material);
                }
                scene.remove_node(sprite);
            }
        }
    }

    fn cleanup_group_if_empty(&mut self, scene: &mut SceneArena, hex: HexCoord) {
        let Some(&group) = self.tile_groups.get(&hex) else {
            return;
        };
        let childless = scene.node(group).map_or(true, |n| n.children.is_empty());
        if childless {
            scene.detach(group);
            scene.remove_node(group);
            self.tile_groups.remove(&hex);
            self.visible_keys.remove(&hex);
        }
    }

    /// Reconcile the on-screen tiles with `tiles`: add what is missing,
    /// swap what changed kind, remove what is gone. Mid-move hexes are left
    /// alone; the move completion re-keys them.
    pub fn update_tiles_for_hexes(&mut self, scene: &mut SceneArena, tiles: &[(HexCoord, K)]) {
        let desired: HashMap<HexCoord, K> = tiles.iter().copied().collect();
        let stale: Vec<HexCoord> = self
            .sprites
            .keys()
            .filter(|hex| !desired.contains_key(hex) && !self.moving.contains_key(hex))
            .copied()
            .collect();
        let mut removed = 0usize;
        for hex in stale {
            self.remove_tile(scene, hex);
            removed += 1;
        }
        let mut added = 0usize;
        let mut swapped = 0usize;
        for (&hex, kind) in &desired {
            if self.moving.contains_key(&hex) {
                continue;
            }
            if let Some(&sprite) = self.sprites.get(&hex) {
                if self.tile_index_of(scene, sprite) == Some(kind.tile_index()) {
                    continue;
                }
                self.remove_tile(scene, hex);
                swapped += 1;
            } else {
                added += 1;
            }
            self.add_tile(scene, hex, *kind, true);
        }
        trace!(layer = ?K::LAYER, added, swapped, removed, "tile diff applied");
    }

    /// Tear down and repaint from scratch. First-paint path only; steady
    /// state goes through [`Self::update_tiles_for_hexes`].
    pub fn render_tiles_for_hexes(&mut self, scene: &mut SceneArena, tiles: &[(HexCoord, K)]) {
        self.clear_tiles(scene);
        for &(hex, kind) in tiles {
            self.add_tile(scene, hex, kind, true);
        }
    }

    /// Recycle every sprite and destroy every group.
    pub fn clear_tiles(&mut self, scene: &mut SceneArena) {
        let sprites: Vec<NodeHandle> = self.sprites.drain().map(|(_, s)| s).collect();
        for sprite in sprites {
            scene.detach(sprite);
            self.recycle_sprite(scene, sprite);
        }
        let groups: Vec<NodeHandle> = self.tile_groups.drain().map(|(_, g)| g).collect();
        for group in groups {
            let children = scene
                .node(group)
                .map(|n| n.children.clone())
                .unwrap_or_default();
            for child in children {
                scene.detach(child);
            }
            scene.detach(group);
            scene.remove_node(group);
        }
        self.visible_keys.clear();
        self.moving.clear();
    }

    /// Attach and detach groups to match `bounds`. Returns how many groups
    /// changed state; `(0, 0)` means the pass was a no-op.
    pub fn set_visible_bounds(
        &mut self,
        scene: &mut SceneArena,
        bounds: VisibleBounds,
    ) -> (usize, usize) {
        self.bounds = Some(bounds);
        let mut batch = AttachBatch::default();
        let mut next_visible = HashSet::with_capacity(self.visible_keys.len());
        for (&hex, &group) in &self.tile_groups {
            let should = bounds.contains(hex);
            let was = self.visible_keys.contains(&hex);
            if should {
                next_visible.insert(hex);
            }
            if should && !was {
                batch.queue_attach(group);
            } else if !should && was {
                batch.queue_detach(group);
            }
        }
        if batch.is_empty() {
            trace!(layer = ?K::LAYER, "bounds unchanged for every group");
            return (0, 0);
        }
        let root = scene.root();
        let flipped = batch.flush(scene, root);
        self.visible_keys = next_visible;
        flipped
    }

    /// Hang an extra node (label, highlight plane) off the hex group.
    pub fn add_object_to_tile_group(
        &mut self,
        scene: &mut SceneArena,
        hex: HexCoord,
        node: NodeHandle,
    ) -> NodeHandle {
        let group = self.ensure_tile_group(scene, hex);
        scene.attach(group, node);
        group
    }

    /// Detach an extra node from the hex group, destroying the group if
    /// nothing is left on the hex.
    pub fn remove_object_from_tile_group(
        &mut self,
        scene: &mut SceneArena,
        hex: HexCoord,
        node: NodeHandle,
    ) {
        scene.detach(node);
        self.cleanup_group_if_empty(scene, hex);
    }

    pub fn tile_group(&self, hex: HexCoord) -> Option<NodeHandle> {
        self.tile_groups.get(&hex).copied()
    }

    /// Slide the tile group from `from` to `to` over `duration` seconds.
    /// Maps stay keyed by `from` until the completion is handled.
    pub fn move_tile(
        &mut self,
        scene: &mut SceneArena,
        scheduler: &mut AnimationScheduler,
        from: HexCoord,
        to: HexCoord,
        duration: f32,
        object: Option<ObjectRef>,
    ) -> bool {
        if self.moving.contains_key(&from) {
            warn!(layer = ?K::LAYER, ?from, "tile is already moving");
            return false;
        }
        let Some(&group) = self.tile_groups.get(&from) else {
            warn!(layer = ?K::LAYER, ?from, "no tile group to move");
            return false;
        };
        let start = scene.local_position(group);
        let task = scheduler.start_move(
            group,
            start,
            group_anchor(to),
            duration,
            Easing::CubicOut,
            MoveCompletion {
                layer: K::LAYER,
                from,
                to,
                object,
            },
        );
        self.moving.insert(from, task);
        true
    }

    /// Hop the tile group through `path` (successive target hexes, current
    /// hex excluded) with a rest between steps.
    pub fn move_tile_along_path(
        &mut self,
        scene: &mut SceneArena,
        scheduler: &mut AnimationScheduler,
        from: HexCoord,
        path: &[HexCoord],
        step_duration: f32,
        pause: f32,
        object: Option<ObjectRef>,
    ) -> bool {
        let Some(&last) = path.last() else {
            return false;
        };
        if self.moving.contains_key(&from) {
            warn!(layer = ?K::LAYER, ?from, "tile is already moving");
            return false;
        }
        let Some(&group) = self.tile_groups.get(&from) else {
            warn!(layer = ?K::LAYER, ?from, "no tile group to move");
            return false;
        };
        let mut points = Vec::with_capacity(path.len() + 1);
        points.push(scene.local_position(group));
        points.extend(path.iter().map(|&hex| group_anchor(hex)));
        let task = scheduler.start_path(
            group,
            points,
            step_duration,
            pause,
            MoveCompletion {
                layer: K::LAYER,
                from,
                to: last,
                object,
            },
        );
        self.moving.insert(from, task);
        true
    }

    /// Abort an in-flight move, snapping the group back to its committed
    /// hex. No completion fires.
    pub fn cancel_move(
        &mut self,
        scene: &mut SceneArena,
        scheduler: &mut AnimationScheduler,
        from: HexCoord,
    ) -> bool {
        let Some(task) = self.moving.remove(&from) else {
            return false;
        };
        scheduler.cancel(task);
        if let Some(&group) = self.tile_groups.get(&from) {
            scene.set_local_position(group, group_anchor(from));
        }
        true
    }

    /// Commit a finished move: re-key the sprite and group maps from the
    /// old hex to the new one and fix scene attachment against the bounds.
    pub fn handle_tile_move_complete(&mut self, scene: &mut SceneArena, from: HexCoord, to: HexCoord) {
        self.moving.remove(&from);
        if let Some(sprite) = self.sprites.remove(&from) {
            scene.set_render_order(sprite, K::LAYER.render_order(to.row));
            if let Some(displaced) = self.sprites.insert(to, sprite) {
                warn!(layer = ?K::LAYER, ?to, "move landed on an occupied hex");
                scene.detach(displaced);
                self.recycle_sprite(scene, displaced);
            }
        }
        if let Some(sel) = self.selected.as_mut() {
            if sel.hex == from {
                sel.hex = to;
            }
        }
        let Some(group) = self.tile_groups.remove(&from) else {
            return;
        };
        self.visible_keys.remove(&from);
        if let Some(displaced) = self.tile_groups.insert(to, group) {
            warn!(layer = ?K::LAYER, ?to, "move displaced an existing tile group");
            scene.detach(displaced);
            scene.remove_node(displaced);
        }
        if self.is_hex_visible(to) {
            scene.attach(scene.root(), group);
            self.visible_keys.insert(to);
        } else {
            scene.detach(group);
        }
    }

    pub fn is_tile_moving(&self, hex: HexCoord) -> bool {
        self.moving.contains_key(&hex)
    }

    /// Make the tile on `hex` show `kind`, replacing a mismatched sprite in
    /// place. Used on object refresh when the feed changes appearance
    /// without changing position.
    pub fn sync_tile(&mut self, scene: &mut SceneArena, hex: HexCoord, kind: K) {
        if let Some(&sprite) = self.sprites.get(&hex) {
            if self.tile_index_of(scene, sprite) == Some(kind.tile_index()) {
                return;
            }
            // A selected sprite wears a clone; check what it was cloned from
            // before tearing it down.
            if let Some(sel) = &self.selected {
                if sel.hex == hex && self.materials.get(&kind.tile_index()) == Some(&sel.shared) {
                    return;
                }
            }
            self.remove_tile(scene, hex);
        }
        self.add_tile(scene, hex, kind, true);
    }

    /// Start the selection pulse on the tile at `hex`. The sprite swaps to
    /// a cloned material so the pulse never touches other tiles sharing the
    /// prototype.
    pub fn select_tile(
        &mut self,
        scene: &mut SceneArena,
        scheduler: &mut AnimationScheduler,
        hex: HexCoord,
    ) -> bool {
        self.deselect_tile(scene, scheduler);
        let Some(&sprite) = self.sprites.get(&hex) else {
            return false;
        };
        let Some(shared) = scene.node_material(sprite) else {
            return false;
        };
        let Some(clone) = scene.clone_material(shared) else {
            return false;
        };
        scene.set_material(sprite, clone);
        let pulse = scheduler.start_pulse(clone, SELECT_PULSE_SPEED, SELECT_PULSE_INTENSITY);
        self.selected = Some(SelectedTile {
            hex,
            shared,
            clone,
            pulse,
        });
        true
    }

    /// Stop the selection pulse and restore the shared material.
    pub fn deselect_tile(&mut self, scene: &mut SceneArena, scheduler: &mut AnimationScheduler) {
        let Some(sel) = self.selected.take() else {
            return;
        };
        scheduler.cancel(sel.pulse);
        if let Some(&sprite) = self.sprites.get(&sel.hex) {
            if scene.node_material(sprite) == Some(sel.clone) {
                scene.set_material(sprite, sel.shared);
            }
        }
        scene.free_material(sel.clone);
    }

    pub fn selected_hex(&self) -> Option<HexCoord> {
        self.selected.as_ref().map(|s| s.hex)
    }

    pub fn tile_count(&self) -> usize {
        self.sprites.len()
    }

    pub fn group_count(&self) -> usize {
        self.tile_groups.len()
    }

    pub fn visible_group_count(&self) -> usize {
        self.visible_keys.len()
    }

    pub fn idle_sprites(&self) -> usize {
        self.pool.idle()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{TroopCategory, TroopTier};
    use crate::coords::ChunkKey;

    fn ready_renderer(pool_cap: usize) -> (SceneArena, TileRenderer<Biome>) {
        let mut scene = SceneArena::new();
        let mut renderer = TileRenderer::<Biome>::new(pool_cap);
        renderer.register_materials(&mut scene, 0);
        (scene, renderer)
    }

    #[test]
    fn test_add_tile_places_sprite_in_anchored_group() {
        let (mut scene, mut renderer) = ready_renderer(2);
        let hex = HexCoord::new(5, 5);
        renderer.add_tile(&mut scene, hex, Biome::Grassland, true);

        assert_eq!(renderer.tile_count(), 1);
        let group = renderer.tile_group(hex).unwrap();
        assert!(scene.is_attached_to_root(group));
        let anchor = scene.local_position(group);
        let center = world_position(hex, true);
        assert!((anchor.x - center.x).abs() < 1e-6);
        assert_eq!(anchor.y, 0.0);
        assert!((anchor.z - (center.z - GROUP_Z_OFFSET)).abs() < 1e-6);

        let sprite = scene.node(group).unwrap().children[0];
        let node = scene.node(sprite).unwrap();
        assert_eq!(node.render_order, 105);
        assert!((node.scale.0 - SPRITE_SCALE).abs() < 1e-6);
        assert!((node.local.y - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_add_tile_twice_is_a_no_op() {
        let (mut scene, mut renderer) = ready_renderer(2);
        let hex = HexCoord::new(0, 0);
        renderer.add_tile(&mut scene, hex, Biome::Grassland, true);
        let before = renderer.pool.idle();
        renderer.add_tile(&mut scene, hex, Biome::Ocean, true);
        assert_eq!(renderer.tile_count(), 1);
        assert_eq!(renderer.pool.idle(), before);
    }

    #[test]
    fn test_unexplored_hex_renders_nothing() {
        let (mut scene, mut renderer) = ready_renderer(2);
        renderer.add_tile(&mut scene, HexCoord::new(1, 1), Biome::Snow, false);
        assert_eq!(renderer.tile_count(), 0);
        assert_eq!(renderer.group_count(), 0);
    }

    #[test]
    fn test_add_before_materials_is_ignored() {
        let mut scene = SceneArena::new();
        let mut renderer = TileRenderer::<Biome>::new(2);
        renderer.add_tile(&mut scene, HexCoord::new(0, 0), Biome::Beach, true);
        assert_eq!(renderer.tile_count(), 0);
    }

    #[test]
    fn test_kind_change_recycles_the_old_sprite() {
        let (mut scene, mut renderer) = ready_renderer(2);
        let hex = HexCoord::new(3, 4);
        renderer.add_tile(&mut scene, hex, Biome::Grassland, true);
        let grass_idle = renderer.pool.idle_for(Biome::Grassland.tile_index());

        renderer.update_tiles_for_hexes(&mut scene, &[(hex, Biome::Ocean)]);

        assert_eq!(renderer.tile_count(), 1);
        assert_eq!(
            renderer.pool.idle_for(Biome::Grassland.tile_index()),
            grass_idle + 1
        );
        let sprite = renderer.sprites[&hex];
        assert_eq!(
            renderer.tile_index_of(&scene, sprite),
            Some(Biome::Ocean.tile_index())
        );
    }

    #[test]
    fn test_diff_update_adds_and_removes() {
        let (mut scene, mut renderer) = ready_renderer(4);
        let a = HexCoord::new(0, 0);
        let b = HexCoord::new(1, 0);
        let c = HexCoord::new(2, 0);
        renderer.update_tiles_for_hexes(
            &mut scene,
            &[(a, Biome::Grassland), (b, Biome::Taiga)],
        );
        assert_eq!(renderer.tile_count(), 2);

        renderer.update_tiles_for_hexes(&mut scene, &[(b, Biome::Taiga), (c, Biome::Snow)]);
        assert_eq!(renderer.tile_count(), 2);
        assert!(!renderer.sprites.contains_key(&a));
        assert!(renderer.sprites.contains_key(&c));
    }

    #[test]
    fn test_pool_conserves_sprites_across_churn() {
        let (mut scene, mut renderer) = ready_renderer(3);
        let total_nodes = scene.node_count();
        for round in 0..5 {
            let hex = HexCoord::new(round, 0);
            renderer.add_tile(&mut scene, hex, Biome::Bare, true);
            renderer.remove_tile(&mut scene, hex);
        }
        // Every sprite came from and went back to the pool.
        assert_eq!(scene.node_count(), total_nodes);
        assert_eq!(renderer.pool.idle_for(Biome::Bare.tile_index()), 3);
    }

    #[test]
    fn test_exhausted_pool_creates_and_full_pool_drops() {
        let (mut scene, mut renderer) = ready_renderer(1);
        let a = HexCoord::new(0, 0);
        let b = HexCoord::new(1, 0);
        renderer.add_tile(&mut scene, a, Biome::Ocean, true);
        assert_eq!(renderer.pool.idle_for(Biome::Ocean.tile_index()), 0);

        let before = scene.node_count();
        renderer.add_tile(&mut scene, b, Biome::Ocean, true);
        // Sprite plus its group were freshly created.
        assert_eq!(scene.node_count(), before + 2);

        renderer.remove_tile(&mut scene, a);
        renderer.remove_tile(&mut scene, b);
        // One sprite fits the pool, the other is destroyed.
        assert_eq!(renderer.pool.idle_for(Biome::Ocean.tile_index()), 1);
    }

    #[test]
    fn test_bounds_detach_outside_groups_and_early_out() {
        let (mut scene, mut renderer) = ready_renderer(2);
        let inside = HexCoord::new(1, 1);
        let outside = HexCoord::new(40, 40);
        renderer.add_tile(&mut scene, inside, Biome::Grassland, true);
        renderer.add_tile(&mut scene, outside, Biome::Grassland, true);

        let bounds = VisibleBounds::from_chunk_window(ChunkKey::new(0, 0), 1, 1);
        let (attached, detached) = renderer.set_visible_bounds(&mut scene, bounds);
        assert_eq!((attached, detached), (0, 1));
        assert!(scene.is_attached_to_root(renderer.tile_group(inside).unwrap()));
        assert!(!scene.is_attached_to_root(renderer.tile_group(outside).unwrap()));

        // Same bounds again: nothing flips.
        assert_eq!(renderer.set_visible_bounds(&mut scene, bounds), (0, 0));
    }

    #[test]
    fn test_groups_created_outside_bounds_start_detached() {
        let (mut scene, mut renderer) = ready_renderer(2);
        let bounds = VisibleBounds::from_chunk_window(ChunkKey::new(0, 0), 1, 1);
        renderer.set_visible_bounds(&mut scene, bounds);
        let hex = HexCoord::new(50, 50);
        renderer.add_tile(&mut scene, hex, Biome::Tundra, true);
        assert!(!scene.is_attached_to_root(renderer.tile_group(hex).unwrap()));
    }

    #[test]
    fn test_move_re_keys_maps_on_completion() {
        let (mut scene, mut renderer) = ready_renderer(2);
        let mut scheduler = AnimationScheduler::new();
        let from = HexCoord::new(0, 0);
        let to = HexCoord::new(1, 0);
        renderer.add_tile(&mut scene, from, Biome::Grassland, true);

        assert!(renderer.move_tile(&mut scene, &mut scheduler, from, to, 0.5, None));
        assert!(renderer.is_tile_moving(from));

        scheduler.tick(1.0, &mut scene);
        let done = scheduler.take_finished();
        assert_eq!(done.len(), 1);
        renderer.handle_tile_move_complete(&mut scene, done[0].from, done[0].to);

        assert!(!renderer.is_tile_moving(from));
        assert!(renderer.tile_group(from).is_none());
        let group = renderer.tile_group(to).unwrap();
        assert!(scene.is_attached_to_root(group));
        let at = scene.local_position(group);
        let want = group_anchor(to);
        assert!((at.x - want.x).abs() < 1e-4);
        assert!((at.z - want.z).abs() < 1e-4);
    }

    #[test]
    fn test_cancel_move_snaps_back_and_completes_nothing() {
        let (mut scene, mut renderer) = ready_renderer(2);
        let mut scheduler = AnimationScheduler::new();
        let from = HexCoord::new(0, 0);
        let to = HexCoord::new(3, 0);
        renderer.add_tile(&mut scene, from, Biome::Grassland, true);
        renderer.move_tile(&mut scene, &mut scheduler, from, to, 1.0, None);
        scheduler.tick(0.4, &mut scene);

        assert!(renderer.cancel_move(&mut scene, &mut scheduler, from));
        assert!(!renderer.is_tile_moving(from));
        let group = renderer.tile_group(from).unwrap();
        let at = scene.local_position(group);
        let want = group_anchor(from);
        assert!((at.x - want.x).abs() < 1e-6);

        scheduler.tick(2.0, &mut scene);
        assert!(scheduler.take_finished().is_empty());
        // The group did not drift after cancellation.
        let at = scene.local_position(group);
        assert!((at.x - want.x).abs() < 1e-6);
    }

    #[test]
    fn test_sync_tile_swaps_only_on_kind_change() {
        let (mut scene, mut renderer) = ready_renderer(2);
        let hex = HexCoord::new(2, 1);
        renderer.add_tile(&mut scene, hex, Biome::Grassland, true);
        let sprite = renderer.sprites[&hex];

        renderer.sync_tile(&mut scene, hex, Biome::Grassland);
        assert_eq!(renderer.sprites[&hex], sprite);

        renderer.sync_tile(&mut scene, hex, Biome::Snow);
        let swapped = renderer.sprites[&hex];
        assert_eq!(
            renderer.tile_index_of(&scene, swapped),
            Some(Biome::Snow.tile_index())
        );
    }

    #[test]
    fn test_diff_update_leaves_moving_tiles_alone() {
        let (mut scene, mut renderer) = ready_renderer(2);
        let mut scheduler = AnimationScheduler::new();
        let from = HexCoord::new(0, 0);
        renderer.add_tile(&mut scene, from, Biome::Grassland, true);
        renderer.move_tile(&mut scene, &mut scheduler, from, HexCoord::new(2, 0), 1.0, None);

        // A diff that no longer lists the old hex must not recycle the
        // in-flight sprite.
        renderer.update_tiles_for_hexes(&mut scene, &[(HexCoord::new(5, 5), Biome::Snow)]);
        assert!(renderer.sprites.contains_key(&from));
    }

    #[test]
    fn test_path_move_walks_to_final_hex() {
        let (mut scene, mut renderer) = ready_renderer(2);
        let mut scheduler = AnimationScheduler::new();
        let from = HexCoord::new(0, 0);
        let mid = HexCoord::new(1, 0);
        let last = HexCoord::new(2, 0);
        renderer.add_tile(&mut scene, from, Biome::Grassland, true);

        assert!(renderer.move_tile_along_path(
            &mut scene,
            &mut scheduler,
            from,
            &[mid, last],
            0.3,
            0.05,
            None
        ));
        for step in 1..=40 {
            scheduler.tick(step as f32 * 0.05, &mut scene);
        }
        let done = scheduler.take_finished();
        assert_eq!(done[0].to, last);
        renderer.handle_tile_move_complete(&mut scene, done[0].from, done[0].to);
        assert!(renderer.tile_group(last).is_some());
        assert!(renderer.tile_group(from).is_none());
    }

    #[test]
    fn test_selection_clones_material_and_deselect_restores() {
        let (mut scene, mut renderer) = ready_renderer(2);
        let mut scheduler = AnimationScheduler::new();
        let hex = HexCoord::new(2, 2);
        renderer.add_tile(&mut scene, hex, Biome::Beach, true);
        let sprite = renderer.sprites[&hex];
        let shared = scene.node_material(sprite).unwrap();
        let materials_before = scene.material_count();

        assert!(renderer.select_tile(&mut scene, &mut scheduler, hex));
        assert_eq!(scene.material_count(), materials_before + 1);
        assert_ne!(scene.node_material(sprite), Some(shared));
        assert_eq!(scheduler.active_tasks(), 1);

        // Quarter pulse period: opacity dips below 1.
        scheduler.tick(0.5, &mut scene);
        let clone = scene.node_material(sprite).unwrap();
        assert!(scene.material(clone).unwrap().opacity < 1.0);

        renderer.deselect_tile(&mut scene, &mut scheduler);
        assert_eq!(scene.node_material(sprite), Some(shared));
        assert_eq!(scene.material_count(), materials_before);
        assert_eq!(scheduler.active_tasks(), 0);
        assert!(renderer.selected_hex().is_none());
    }

    #[test]
    fn test_selection_follows_a_completed_move() {
        let (mut scene, mut renderer) = ready_renderer(2);
        let mut scheduler = AnimationScheduler::new();
        let from = HexCoord::new(0, 0);
        let to = HexCoord::new(0, 1);
        renderer.add_tile(&mut scene, from, Biome::Grassland, true);
        renderer.select_tile(&mut scene, &mut scheduler, from);

        renderer.move_tile(&mut scene, &mut scheduler, from, to, 0.2, None);
        scheduler.tick(1.0, &mut scene);
        for done in scheduler.take_finished() {
            renderer.handle_tile_move_complete(&mut scene, done.from, done.to);
        }
        assert_eq!(renderer.selected_hex(), Some(to));

        renderer.deselect_tile(&mut scene, &mut scheduler);
        let sprite = renderer.sprites[&to];
        let material = scene.node_material(sprite).unwrap();
        // Back on a prototype material.
        assert!(renderer.tile_index_of(&scene, sprite).is_some());
        assert_eq!(scene.material(material).unwrap().opacity, 1.0);
    }

    #[test]
    fn test_removing_selected_tile_frees_the_clone() {
        let (mut scene, mut renderer) = ready_renderer(2);
        let mut scheduler = AnimationScheduler::new();
        let hex = HexCoord::new(1, 2);
        renderer.add_tile(&mut scene, hex, Biome::Taiga, true);
        let materials_before = scene.material_count();
        renderer.select_tile(&mut scene, &mut scheduler, hex);

        renderer.remove_tile(&mut scene, hex);
        renderer.deselect_tile(&mut scene, &mut scheduler);
        assert_eq!(scene.material_count(), materials_before);
        // Sprite wore a clone, so it could not be pooled.
        assert_eq!(renderer.pool.idle_for(Biome::Taiga.tile_index()), 1);
    }

    #[test]
    fn test_clear_tiles_recycles_everything() {
        let (mut scene, mut renderer) = ready_renderer(4);
        for col in 0..3 {
            renderer.add_tile(&mut scene, HexCoord::new(col, 0), Biome::Shrubland, true);
        }
        renderer.clear_tiles(&mut scene);
        assert_eq!(renderer.tile_count(), 0);
        assert_eq!(renderer.group_count(), 0);
        assert_eq!(renderer.pool.idle_for(Biome::Shrubland.tile_index()), 4);
    }

    #[test]
    fn test_unit_skin_renders_on_the_unit_layer() {
        let mut scene = SceneArena::new();
        let mut renderer = TileRenderer::<UnitSkin>::new(2);
        renderer.register_materials(&mut scene, 2);
        let hex = HexCoord::new(4, 7);
        renderer.add_tile(
            &mut scene,
            hex,
            UnitSkin::new(TroopCategory::Knight, TroopTier::T2),
            true,
        );
        let group = renderer.tile_group(hex).unwrap();
        let sprite = scene.node(group).unwrap().children[0];
        let node = scene.node(sprite).unwrap();
        assert_eq!(node.render_order, TileLayer::Unit.render_order(7));
        assert!((node.local.y - 0.25).abs() < 1e-6);
    }
}
