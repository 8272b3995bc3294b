//! Render snapshot types.
//!
//! [`RenderSnapshot`] is a serializable view of one frame: every draw the
//! attached scene would paint (sprites, labels, the instanced ground), the
//! committed object state per kind, and the diagnostics counters. Hosts that
//! do not consume the flat buffer from `bridge` read this directly or ship
//! it as JSON.
//!
//! When compiled with `--features parallel`, draw records are resolved with
//! rayon after a sequential tree walk gathers the visible nodes.

use std::collections::HashSet;

use bevy_ecs::prelude::World;
use serde::{Deserialize, Serialize};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::components::{
    ArmyUnit, HexPosition, MapObject, ObjectId, ObjectKind, ObjectRef, StructureCategory,
    StructureSite, TroopCategory, TroopTier,
};
use crate::coords::WorldPosition;
use crate::diagnostics::{DiagnosticsCounters, MapDiagnostics};
use crate::objects::{ArmyKind, ObjectManager};
use crate::scene::{NodeHandle, NodeKind, SceneArena, UvRect};
use crate::selection::SelectionState;

/// One billboard draw. `kind` is `"sprite"` for atlas billboards and
/// `"highlight"` for the pulsing action planes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpriteSnapshot {
    pub kind: String,
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub scale_x: f32,
    pub scale_y: f32,
    pub render_order: i32,
    pub atlas: u32,
    pub uv: UvRect,
    pub color: u32,
    pub opacity: f32,
}

/// One floating text label.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabelSnapshot {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub text: String,
}

/// Per-instance ground placement.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GroundInstanceSnapshot {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub col: i32,
    pub row: i32,
}

/// The instanced ground plane.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GroundSnapshot {
    pub color: u32,
    pub capacity: usize,
    pub instances: Vec<GroundInstanceSnapshot>,
}

/// Committed state of one army.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArmySnapshot {
    pub id: u32,
    pub col: i32,
    pub row: i32,
    pub category: String,
    pub tier: String,
    pub owner: Option<String>,
    pub troop_count: u32,
    pub stamina: u32,
    pub max_stamina: u32,
    /// True while a movement animation is in flight; `col`/`row` then still
    /// hold the origin hex.
    pub moving: bool,
}

/// Committed state of one structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructureSnapshot {
    pub id: u32,
    pub col: i32,
    pub row: i32,
    pub category: String,
    pub level: u8,
    pub has_wonder: bool,
    pub owner: Option<String>,
}

/// Position of one quest or chest marker.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MarkerSnapshot {
    pub id: u32,
    pub col: i32,
    pub row: i32,
}

/// Complete frame snapshot for the host renderer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RenderSnapshot {
    /// Frames stepped since construction.
    pub frame: u64,
    /// Elapsed map time in seconds.
    pub time: f32,
    /// Attached sprite and highlight draws, tree order.
    pub sprites: Vec<SpriteSnapshot>,
    /// Attached labels.
    pub labels: Vec<LabelSnapshot>,
    /// The ground batch, absent until the first window renders.
    pub ground: Option<GroundSnapshot>,
    pub armies: Vec<ArmySnapshot>,
    pub structures: Vec<StructureSnapshot>,
    pub quests: Vec<MarkerSnapshot>,
    pub chests: Vec<MarkerSnapshot>,
    /// The selected object, if any.
    pub selected: Option<ObjectRef>,
    pub counters: DiagnosticsCounters,
}

impl RenderSnapshot {
    /// Create a snapshot from the ECS world.
    pub fn from_world(world: &mut World, frame: u64, time: f32) -> Self {
        let (sprites, labels, ground) = flatten_scene(world.resource::<SceneArena>());

        let moving: HashSet<ObjectId> = {
            let manager = world.resource::<ObjectManager<ArmyKind>>();
            manager
                .ids()
                .filter(|&id| manager.is_object_moving(id))
                .collect()
        };

        let mut armies = Vec::new();
        let mut query = world.query::<(&MapObject, &HexPosition, &ArmyUnit)>();
        for (object, position, unit) in query.iter(world) {
            let category = match unit.category {
                TroopCategory::Knight => "Knight",
                TroopCategory::Paladin => "Paladin",
                TroopCategory::Crossbowman => "Crossbowman",
            };
            let tier = match unit.tier {
                TroopTier::T1 => "T1",
                TroopTier::T2 => "T2",
                TroopTier::T3 => "T3",
            };
            armies.push(ArmySnapshot {
                id: object.id.0,
                col: position.0.col,
                row: position.0.row,
                category: category.to_string(),
                tier: tier.to_string(),
                owner: unit.owner.clone(),
                troop_count: unit.troop_count,
                stamina: unit.stamina,
                max_stamina: unit.max_stamina,
                moving: moving.contains(&object.id),
            });
        }

        let mut structures = Vec::new();
        let mut site_query = world.query::<(&MapObject, &HexPosition, &StructureSite)>();
        for (object, position, site) in site_query.iter(world) {
            let category = match site.category {
                StructureCategory::Realm => "Realm",
                StructureCategory::Hyperstructure => "Hyperstructure",
                StructureCategory::Bank => "Bank",
                StructureCategory::FragmentMine => "FragmentMine",
                StructureCategory::Village => "Village",
            };
            structures.push(StructureSnapshot {
                id: object.id.0,
                col: position.0.col,
                row: position.0.row,
                category: category.to_string(),
                level: site.level,
                has_wonder: site.has_wonder,
                owner: site.owner.clone(),
            });
        }

        // Quests and chests share a shape; one pass covers both.
        let mut quests = Vec::new();
        let mut chests = Vec::new();
        let mut marker_query = world.query::<(&MapObject, &HexPosition)>();
        for (object, position) in marker_query.iter(world) {
            let marker = MarkerSnapshot {
                id: object.id.0,
                col: position.0.col,
                row: position.0.row,
            };
            match object.kind {
                ObjectKind::Quest => quests.push(marker),
                ObjectKind::Chest => chests.push(marker),
                _ => {}
            }
        }

        Self {
            frame,
            time,
            sprites,
            labels,
            ground,
            armies,
            structures,
            quests,
            chests,
            selected: world.resource::<SelectionState>().selected(),
            counters: world.resource::<MapDiagnostics>().counters(),
        }
    }

    /// Serialize snapshot to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Serialize snapshot to pretty JSON string.
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Flatten the attached scene into draw records.
///
/// Gather phase: one sequential walk from the root accumulates world
/// positions and collects visible nodes. Compute phase: material resolution
/// per draw, parallel under the `parallel` feature.
fn flatten_scene(
    scene: &SceneArena,
) -> (Vec<SpriteSnapshot>, Vec<LabelSnapshot>, Option<GroundSnapshot>) {
    let mut draws: Vec<(NodeHandle, WorldPosition)> = Vec::new();
    let mut labels = Vec::new();
    let mut ground = None;
    gather(
        scene,
        scene.root(),
        WorldPosition::default(),
        &mut draws,
        &mut labels,
        &mut ground,
    );

    #[cfg(feature = "parallel")]
    let sprites: Vec<SpriteSnapshot> = draws
        .par_iter()
        .filter_map(|&(handle, position)| sprite_record(scene, handle, position))
        .collect();

    #[cfg(not(feature = "parallel"))]
    let sprites: Vec<SpriteSnapshot> = draws
        .iter()
        .filter_map(|&(handle, position)| sprite_record(scene, handle, position))
        .collect();

    (sprites, labels, ground)
}

fn gather(
    scene: &SceneArena,
    handle: NodeHandle,
    origin: WorldPosition,
    draws: &mut Vec<(NodeHandle, WorldPosition)>,
    labels: &mut Vec<LabelSnapshot>,
    ground: &mut Option<GroundSnapshot>,
) {
    let Some(node) = scene.node(handle) else {
        return;
    };
    if !node.visible {
        return;
    }
    let position = WorldPosition::new(
        origin.x + node.local.x,
        origin.y + node.local.y,
        origin.z + node.local.z,
    );
    match &node.kind {
        NodeKind::Group => {}
        NodeKind::Sprite | NodeKind::HighlightMesh => draws.push((handle, position)),
        NodeKind::Label { text } => labels.push(LabelSnapshot {
            x: position.x,
            y: position.y,
            z: position.z,
            text: text.clone(),
        }),
        NodeKind::InstancedGround(batch) => {
            *ground = Some(GroundSnapshot {
                color: batch.color,
                capacity: batch.capacity,
                instances: batch
                    .instances
                    .iter()
                    .map(|instance| GroundInstanceSnapshot {
                        x: position.x + instance.position.x,
                        y: position.y + instance.position.y,
                        z: position.z + instance.position.z,
                        col: instance.hex.col,
                        row: instance.hex.row,
                    })
                    .collect(),
            });
        }
    }
    for &child in &node.children {
        gather(scene, child, position, draws, labels, ground);
    }
}

/// Resolve one gathered node into a draw record. Pure over the arena.
fn sprite_record(
    scene: &SceneArena,
    handle: NodeHandle,
    position: WorldPosition,
) -> Option<SpriteSnapshot> {
    let node = scene.node(handle)?;
    let (atlas, uv, color, opacity) = match node.material.and_then(|id| scene.material(id)) {
        Some(material) => (material.atlas, material.uv, material.color, material.opacity),
        None => (0, UvRect::default(), 0xffffff, 1.0),
    };
    let kind = match node.kind {
        NodeKind::HighlightMesh => "highlight",
        _ => "sprite",
    };
    Some(SpriteSnapshot {
        kind: kind.to_string(),
        x: position.x,
        y: position.y,
        z: position.z,
        scale_x: node.scale.0,
        scale_y: node.scale.1,
        render_order: node.render_order,
        atlas,
        uv,
        color,
        opacity,
    })
}
