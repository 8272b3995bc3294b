//! Per-kind map object management.
//!
//! An [`ObjectManager`] owns every live object of one kind (army, structure,
//! quest, chest): the ECS entity carrying its data, the floating label node,
//! and the movement bookkeeping. Tile visuals are delegated to the
//! [`TileRenderer`] the manager wraps.
//!
//! Object state machine: absent, present and static, present and moving.
//! While an object moves, feed updates merge everything except position;
//! the position is committed once when the move completes. Exactly one move
//! can be in flight per object.

use std::collections::{HashMap, HashSet};
use std::fmt::Debug;

use bevy_ecs::prelude::{Entity, Mut, Resource, World};
use tracing::{debug, warn};

use crate::animation::AnimationScheduler;
use crate::components::{HexPosition, ObjectId, ObjectKind, ObjectRef};
use crate::config::MapConfig;
use crate::coords::{HexCoord, VisibleBounds, WorldPosition, HEX_SIZE};
use crate::scene::{NodeHandle, NodeKind, SceneArena};
use crate::tiles::{TileRenderer, TileSkin};

pub mod kinds;

pub use kinds::{
    ArmyData, ArmyKind, ChestData, ChestKind, QuestData, QuestKind, StructureData, StructureKind,
};

/// Default duration of a feed-driven single-step move, in seconds.
pub const MOVE_DURATION: f32 = 1.0;
/// Per-step duration of a path move.
pub const PATH_STEP_DURATION: f32 = 0.3;
/// Rest between path steps, the "chess piece" beat.
pub const PATH_STEP_PAUSE: f32 = 0.05;
/// Label position above the tile group anchor.
pub const LABEL_OFFSET: WorldPosition = WorldPosition {
    x: 0.0,
    y: 2.1,
    z: -2.0 * HEX_SIZE,
};

// ============================================================================
// Kind binding
// ============================================================================

/// Binds a feed payload type to the components it spawns and the skin it
/// renders with.
pub trait MapObjectKind: Send + Sync + 'static {
    type Skin: TileSkin;
    type Data: Clone + Debug + Send + Sync;

    const KIND: ObjectKind;

    fn id(data: &Self::Data) -> ObjectId;
    fn hex(data: &Self::Data) -> HexCoord;
    fn skin(data: &Self::Data) -> Self::Skin;
    fn label_text(data: &Self::Data) -> String;

    /// Spawn the entity for a newly seen object.
    fn spawn(world: &mut World, data: &Self::Data) -> Entity;

    /// Merge every field except position into the entity's components.
    fn merge(world: &mut World, entity: Entity, data: &Self::Data);

    /// Current skin derived from the entity's components.
    fn skin_of(world: &World, entity: Entity) -> Option<Self::Skin>;
}

struct ObjectEntry {
    entity: Entity,
    label: NodeHandle,
    /// Whether the label currently hangs in the hex's tile group. Tracked
    /// separately from group attachment: a hidden hex keeps its sprite but
    /// drops the label.
    label_attached: bool,
}

// ============================================================================
// Object manager
// ============================================================================

/// Owns all objects of kind `K` and the tile renderer drawing them.
#[derive(Resource)]
pub struct ObjectManager<K: MapObjectKind> {
    renderer: TileRenderer<K::Skin>,
    entries: HashMap<ObjectId, ObjectEntry>,
    moving: HashSet<ObjectId>,
}

impl<K: MapObjectKind> Default for ObjectManager<K> {
    fn default() -> Self {
        Self {
            renderer: TileRenderer::default(),
            entries: HashMap::new(),
            moving: HashSet::new(),
        }
    }
}

impl<K: MapObjectKind> ObjectManager<K> {
    pub fn new(pool_cap: usize) -> Self {
        Self {
            renderer: TileRenderer::new(pool_cap),
            entries: HashMap::new(),
            moving: HashSet::new(),
        }
    }

    pub fn register_materials(&mut self, scene: &mut SceneArena, atlas_page: u32) {
        self.renderer.register_materials(scene, atlas_page);
    }

    pub fn is_ready(&self) -> bool {
        self.renderer.is_ready()
    }

    pub fn renderer(&self) -> &TileRenderer<K::Skin> {
        &self.renderer
    }

    pub fn renderer_mut(&mut self) -> &mut TileRenderer<K::Skin> {
        &mut self.renderer
    }

    fn committed_hex(world: &World, entity: Entity) -> Option<HexCoord> {
        world.get::<HexPosition>(entity).map(|p| p.0)
    }

    /// Committed position of `id`, untouched by any in-flight move.
    pub fn position_of(&self, world: &World, id: ObjectId) -> Option<HexCoord> {
        let entry = self.entries.get(&id)?;
        Self::committed_hex(world, entry.entity)
    }

    pub fn entity_of(&self, id: ObjectId) -> Option<Entity> {
        self.entries.get(&id).map(|e| e.entity)
    }

    pub fn contains(&self, id: ObjectId) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn object_count(&self) -> usize {
        self.entries.len()
    }

    pub fn ids(&self) -> impl Iterator<Item = ObjectId> + '_ {
        self.entries.keys().copied()
    }

    pub fn is_object_moving(&self, id: ObjectId) -> bool {
        self.moving.contains(&id)
    }

    /// Apply a feed report: create the object if unseen, otherwise merge.
    ///
    /// A mid-move object takes only non-positional fields; its position is
    /// authoritative again once the move commits. A static object whose
    /// reported position differs starts an animated move rather than a
    /// teleport.
    pub fn upsert(&mut self, world: &mut World, scene: &mut SceneArena, data: &K::Data) {
        let id = K::id(data);
        let hex = K::hex(data);
        let Some(entity) = self.entries.get(&id).map(|e| e.entity) else {
            self.insert_new(world, scene, data);
            return;
        };
        if self.moving.contains(&id) {
            K::merge(world, entity, data);
            self.refresh_label(scene, id, K::label_text(data));
            return;
        }
        let current = Self::committed_hex(world, entity).unwrap_or(hex);
        K::merge(world, entity, data);
        self.refresh_label(scene, id, K::label_text(data));
        if current != hex {
            let duration = world
                .get_resource::<MapConfig>()
                .map_or(MOVE_DURATION, |c| c.move_duration);
            if !self.start_move(world, scene, id, hex, duration) {
                self.set_position(world, scene, id, hex);
            }
        } else {
            self.renderer.sync_tile(scene, hex, K::skin(data));
        }
    }

    fn insert_new(&mut self, world: &mut World, scene: &mut SceneArena, data: &K::Data) {
        let id = K::id(data);
        let hex = K::hex(data);
        let entity = K::spawn(world, data);
        self.renderer.add_tile(scene, hex, K::skin(data), true);
        let label = scene.create_node(NodeKind::Label {
            text: K::label_text(data),
        });
        scene.set_local_position(label, LABEL_OFFSET);
        let attached = self.renderer.is_hex_visible(hex);
        if attached {
            self.renderer.add_object_to_tile_group(scene, hex, label);
        }
        self.entries.insert(
            id,
            ObjectEntry {
                entity,
                label,
                label_attached: attached,
            },
        );
        debug!(kind = ?K::KIND, id = id.0, ?hex, "object added");
    }

    fn refresh_label(&self, scene: &mut SceneArena, id: ObjectId, text: String) {
        if let Some(entry) = self.entries.get(&id) {
            scene.set_label_text(entry.label, text);
        }
    }

    /// Animate `id` to `to`. Returns false without side effects when the
    /// object is unknown, already moving, or already there.
    pub fn start_move(
        &mut self,
        world: &mut World,
        scene: &mut SceneArena,
        id: ObjectId,
        to: HexCoord,
        duration: f32,
    ) -> bool {
        let Some(entity) = self.entries.get(&id).map(|e| e.entity) else {
            debug!(kind = ?K::KIND, id = id.0, "move for unknown object ignored");
            return false;
        };
        if self.moving.contains(&id) {
            debug!(kind = ?K::KIND, id = id.0, "object already moving");
            return false;
        }
        let Some(from) = Self::committed_hex(world, entity) else {
            return false;
        };
        if from == to {
            return false;
        }
        let started = {
            let mut anim = world.resource_mut::<AnimationScheduler>();
            self.renderer.move_tile(
                scene,
                &mut anim,
                from,
                to,
                duration,
                Some(ObjectRef::new(K::KIND, id)),
            )
        };
        if started {
            self.moving.insert(id);
        }
        started
    }

    /// Animate `id` through `path` (successive targets, current hex
    /// excluded). Only the final hex is committed; intermediate steps are
    /// visual.
    pub fn start_path_move(
        &mut self,
        world: &mut World,
        scene: &mut SceneArena,
        id: ObjectId,
        path: &[HexCoord],
        step_duration: f32,
    ) -> bool {
        let Some(entity) = self.entries.get(&id).map(|e| e.entity) else {
            debug!(kind = ?K::KIND, id = id.0, "path move for unknown object ignored");
            return false;
        };
        if self.moving.contains(&id) || path.is_empty() {
            return false;
        }
        let Some(from) = Self::committed_hex(world, entity) else {
            return false;
        };
        let pause = world
            .get_resource::<MapConfig>()
            .map_or(PATH_STEP_PAUSE, |c| c.path_step_pause);
        let started = {
            let mut anim = world.resource_mut::<AnimationScheduler>();
            self.renderer.move_tile_along_path(
                scene,
                &mut anim,
                from,
                path,
                step_duration,
                pause,
                Some(ObjectRef::new(K::KIND, id)),
            )
        };
        if started {
            self.moving.insert(id);
        }
        started
    }

    /// Re-place the object at `to` without animation. Fallback for feed
    /// jumps with no walkable path.
    pub fn set_position(&mut self, world: &mut World, scene: &mut SceneArena, id: ObjectId, to: HexCoord) {
        let Some((entity, label, label_attached)) = self
            .entries
            .get(&id)
            .map(|e| (e.entity, e.label, e.label_attached))
        else {
            return;
        };
        let Some(from) = Self::committed_hex(world, entity) else {
            return;
        };
        if self.moving.remove(&id) {
            let mut anim = world.resource_mut::<AnimationScheduler>();
            self.renderer.cancel_move(scene, &mut anim, from);
        }
        if from == to {
            return;
        }
        let Some(skin) = K::skin_of(world, entity) else {
            return;
        };
        if label_attached {
            self.renderer.remove_object_from_tile_group(scene, from, label);
        }
        self.renderer.remove_tile(scene, from);
        self.renderer.add_tile(scene, to, skin, true);
        if let Some(mut pos) = world.get_mut::<HexPosition>(entity) {
            pos.0 = to;
        }
        let visible = self.renderer.is_hex_visible(to);
        if visible {
            self.renderer.add_object_to_tile_group(scene, to, label);
        }
        if let Some(entry) = self.entries.get_mut(&id) {
            entry.label_attached = visible;
        }
    }

    /// Commit a finished move: write the new position, re-evaluate label
    /// attachment, clear the moving flag. The renderer's own re-key runs
    /// before this, driven by the same completion.
    pub fn commit_move(&mut self, world: &mut World, scene: &mut SceneArena, id: ObjectId, to: HexCoord) {
        if !self.moving.remove(&id) {
            debug!(kind = ?K::KIND, id = id.0, "completion for object no longer moving");
        }
        let Some((entity, label, was_attached)) = self
            .entries
            .get(&id)
            .map(|e| (e.entity, e.label, e.label_attached))
        else {
            return;
        };
        if let Some(mut pos) = world.get_mut::<HexPosition>(entity) {
            pos.0 = to;
        }
        let visible = self.renderer.is_hex_visible(to);
        if visible && !was_attached {
            self.renderer.add_object_to_tile_group(scene, to, label);
        } else if !visible && was_attached {
            self.renderer.remove_object_from_tile_group(scene, to, label);
        }
        if let Some(entry) = self.entries.get_mut(&id) {
            entry.label_attached = visible;
        }
        debug!(kind = ?K::KIND, id = id.0, ?to, "move committed");
    }

    /// Remove the object and every visual it owns. Unknown ids are a no-op.
    pub fn remove(&mut self, world: &mut World, scene: &mut SceneArena, id: ObjectId) {
        let Some(entry) = self.entries.remove(&id) else {
            return;
        };
        let hex = Self::committed_hex(world, entry.entity);
        if self.moving.remove(&id) {
            if let Some(hex) = hex {
                let mut anim = world.resource_mut::<AnimationScheduler>();
                self.renderer.cancel_move(scene, &mut anim, hex);
            }
        }
        if let Some(hex) = hex {
            if entry.label_attached {
                self.renderer.remove_object_from_tile_group(scene, hex, entry.label);
            }
            self.renderer.remove_tile(scene, hex);
        }
        scene.remove_node(entry.label);
        if !world.despawn(entry.entity) {
            warn!(kind = ?K::KIND, id = id.0, "object entity was already gone");
        }
        debug!(kind = ?K::KIND, id = id.0, "object removed");
    }

    /// Forward bounds to the renderer and re-evaluate every label.
    pub fn set_visible_bounds(&mut self, world: &World, scene: &mut SceneArena, bounds: VisibleBounds) {
        self.renderer.set_visible_bounds(scene, bounds);
        let snapshot: Vec<(ObjectId, Entity, NodeHandle, bool)> = self
            .entries
            .iter()
            .map(|(&id, e)| (id, e.entity, e.label, e.label_attached))
            .collect();
        for (id, entity, label, attached) in snapshot {
            let Some(hex) = Self::committed_hex(world, entity) else {
                continue;
            };
            let visible = self.renderer.is_hex_visible(hex);
            if visible && !attached {
                self.renderer.add_object_to_tile_group(scene, hex, label);
            } else if !visible && attached {
                self.renderer.remove_object_from_tile_group(scene, hex, label);
            }
            if let Some(entry) = self.entries.get_mut(&id) {
                entry.label_attached = visible;
            }
        }
    }

    /// Linear scan for objects committed to `hex`. Fine at per-chunk
    /// density; revisit only if object counts grow by orders of magnitude.
    pub fn objects_at_hex(&self, world: &World, hex: HexCoord) -> Vec<ObjectId> {
        self.entries
            .iter()
            .filter(|(_, e)| Self::committed_hex(world, e.entity) == Some(hex))
            .map(|(&id, _)| id)
            .collect()
    }
}

// ============================================================================
// World-level entry points
// ============================================================================

fn with_manager<K: MapObjectKind, R>(
    world: &mut World,
    f: impl FnOnce(&mut World, &mut ObjectManager<K>, &mut SceneArena) -> R,
) -> R {
    world.resource_scope(|world, mut manager: Mut<ObjectManager<K>>| {
        world.resource_scope(|world, mut scene: Mut<SceneArena>| {
            f(world, &mut manager, &mut scene)
        })
    })
}

/// Apply a feed report for one object of kind `K`.
pub fn upsert_object<K: MapObjectKind>(world: &mut World, data: &K::Data) {
    with_manager::<K, _>(world, |world, manager, scene| {
        manager.upsert(world, scene, data);
    });
}

/// Remove one object of kind `K`.
pub fn remove_object<K: MapObjectKind>(world: &mut World, id: ObjectId) {
    with_manager::<K, _>(world, |world, manager, scene| {
        manager.remove(world, scene, id);
    });
}

/// Animate one object to `to` over `duration` seconds.
pub fn move_object<K: MapObjectKind>(
    world: &mut World,
    id: ObjectId,
    to: HexCoord,
    duration: f32,
) -> bool {
    with_manager::<K, _>(world, |world, manager, scene| {
        manager.start_move(world, scene, id, to, duration)
    })
}

/// Animate one object through `path` at `step_duration` seconds per hex.
pub fn move_object_along_path<K: MapObjectKind>(
    world: &mut World,
    id: ObjectId,
    path: &[HexCoord],
    step_duration: f32,
) -> bool {
    with_manager::<K, _>(world, |world, manager, scene| {
        manager.start_path_move(world, scene, id, path, step_duration)
    })
}

/// Re-place one object without animation.
pub fn set_object_position<K: MapObjectKind>(world: &mut World, id: ObjectId, to: HexCoord) {
    with_manager::<K, _>(world, |world, manager, scene| {
        manager.set_position(world, scene, id, to);
    });
}

/// Route a move completion: re-key the renderer maps, then commit the
/// object's position.
pub fn commit_object_move<K: MapObjectKind>(
    world: &mut World,
    id: ObjectId,
    from: HexCoord,
    to: HexCoord,
) {
    with_manager::<K, _>(world, |world, manager, scene| {
        manager.renderer_mut().handle_tile_move_complete(scene, from, to);
        manager.commit_move(world, scene, id, to);
    });
}

/// Forward new visible bounds to kind `K`'s manager.
pub fn set_object_bounds<K: MapObjectKind>(world: &mut World, bounds: VisibleBounds) {
    with_manager::<K, _>(world, |world, manager, scene| {
        manager.set_visible_bounds(world, scene, bounds);
    });
}

/// Apply selected-visual state to `id`'s tile sprite. Returns false when the
/// object is unknown or its sprite is not realized yet.
pub fn select_object_visual<K: MapObjectKind>(world: &mut World, id: ObjectId) -> bool {
    with_manager::<K, _>(world, |world, manager, scene| {
        let Some(hex) = manager.position_of(world, id) else {
            debug!(id = id.0, kind = K::KIND.as_str(), "select on unknown object");
            return false;
        };
        let mut scheduler = world.resource_mut::<AnimationScheduler>();
        manager.renderer_mut().select_tile(scene, &mut scheduler, hex)
    })
}

/// Drop selected-visual state for kind `K`, restoring the shared material.
pub fn deselect_object_visual<K: MapObjectKind>(world: &mut World) {
    with_manager::<K, _>(world, |world, manager, scene| {
        let mut scheduler = world.resource_mut::<AnimationScheduler>();
        manager.renderer_mut().deselect_tile(scene, &mut scheduler);
    });
}

// ============================================================================
// Tests
// ============================================================================
