//! ECS components for map objects.
//!
//! Components are pure data containers attached to entities; the managers in
//! `objects/` own the id maps and movement bookkeeping, and all rendering
//! state lives in the scene arena. Nothing here holds a scene handle.

use crate::coords::HexCoord;
use bevy_ecs::prelude::*;
use serde::{Deserialize, Serialize};

// ============================================================================
// IDENTITY COMPONENTS
// ============================================================================

/// Feed-assigned identifier, unique within an object kind.
#[derive(Component, Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectId(pub u32);

/// The four live object kinds the map tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjectKind {
    Army,
    Structure,
    Quest,
    Chest,
}

impl ObjectKind {
    /// Render layer this kind draws on.
    pub fn tile_layer(&self) -> TileLayer {
        match self {
            ObjectKind::Army => TileLayer::Unit,
            ObjectKind::Structure => TileLayer::Structure,
            ObjectKind::Quest => TileLayer::Quest,
            ObjectKind::Chest => TileLayer::Chest,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectKind::Army => "army",
            ObjectKind::Structure => "structure",
            ObjectKind::Quest => "quest",
            ObjectKind::Chest => "chest",
        }
    }
}

/// Kind-qualified object reference, e.g. in animation completions and events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectRef {
    pub kind: ObjectKind,
    pub id: ObjectId,
}

impl ObjectRef {
    pub fn new(kind: ObjectKind, id: ObjectId) -> Self {
        Self { kind, id }
    }
}

/// Identity component: which manager owns this entity.
#[derive(Component, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapObject {
    pub id: ObjectId,
    pub kind: ObjectKind,
}

// ============================================================================
// SPATIAL COMPONENTS
// ============================================================================

/// Committed hex position. During a move this stays at the origin hex and is
/// only rewritten when the movement animation completes.
#[derive(Component, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HexPosition(pub HexCoord);

// ============================================================================
// RENDER LAYERING
// ============================================================================

/// Draw layer of a sprite. Terrain sits under everything; object layers are
/// biased so armies and quest markers read over structures and chests in the
/// same row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TileLayer {
    Biome,
    Structure,
    Unit,
    Quest,
    Chest,
}

impl TileLayer {
    /// Base render order for a sprite at `row`. Overlay sprites add 1000 on
    /// top of this.
    pub fn render_order(&self, row: i32) -> i32 {
        match self {
            TileLayer::Biome => (100 + row).max(1),
            TileLayer::Structure => 10 + row + 500,
            TileLayer::Unit => 10 + row + 1000,
            TileLayer::Quest => 10 + row + 1500,
            TileLayer::Chest => 10 + row,
        }
    }
}

// ============================================================================
// KIND DATA COMPONENTS
// ============================================================================

/// Troop class of an army.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TroopCategory {
    Knight,
    Paladin,
    Crossbowman,
}

/// Troop quality tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TroopTier {
    T1,
    T2,
    T3,
}

/// Army state as the feed reports it.
#[derive(Component, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArmyUnit {
    pub category: TroopCategory,
    pub tier: TroopTier,
    pub owner: Option<String>,
    pub troop_count: u32,
    pub stamina: u32,
    pub max_stamina: u32,
}

/// Structure class reported by the feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StructureCategory {
    Realm,
    Hyperstructure,
    Bank,
    FragmentMine,
    Village,
}

/// Structure state. Level and the wonder flag select the tile art.
#[derive(Component, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructureSite {
    pub category: StructureCategory,
    pub level: u8,
    pub has_wonder: bool,
    pub owner: Option<String>,
}

/// Quest marker. Carries no data beyond identity and position.
#[derive(Component, Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct QuestMarker;

/// Loot chest. Carries no data beyond identity and position.
#[derive(Component, Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ChestCache;

// ============================================================================
// BUNDLES
// ============================================================================

#[derive(Bundle)]
pub struct ArmyBundle {
    pub object: MapObject,
    pub position: HexPosition,
    pub unit: ArmyUnit,
}

#[derive(Bundle)]
pub struct StructureBundle {
    pub object: MapObject,
    pub position: HexPosition,
    pub site: StructureSite,
}

#[derive(Bundle)]
pub struct QuestBundle {
    pub object: MapObject,
    pub position: HexPosition,
    pub marker: QuestMarker,
}

#[derive(Bundle)]
pub struct ChestBundle {
    pub object: MapObject,
    pub position: HexPosition,
    pub cache: ChestCache,
}
