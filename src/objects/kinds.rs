//! Concrete map-object kinds: armies, structures, quests, chests.
//!
//! Each kind binds a feed payload struct to the components it spawns and
//! the tile skin it renders with. The manager never inspects kind data
//! directly; everything flows through [`MapObjectKind`].

use bevy_ecs::prelude::{Entity, World};
use serde::{Deserialize, Serialize};

use super::MapObjectKind;
use crate::components::{
    ArmyBundle, ArmyUnit, ChestBundle, ChestCache, HexPosition, MapObject, ObjectId, ObjectKind,
    QuestBundle, QuestMarker, StructureBundle, StructureCategory, StructureSite, TroopCategory,
    TroopTier,
};
use crate::coords::HexCoord;
use crate::tiles::{BuildingSkin, ChestSkin, QuestSkin, UnitSkin};

// ============================================================================
// Armies
// ============================================================================

/// Army state as delivered by the world feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArmyData {
    pub id: ObjectId,
    pub hex: HexCoord,
    pub category: TroopCategory,
    pub tier: TroopTier,
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub troop_count: u32,
    #[serde(default)]
    pub stamina: u32,
    #[serde(default)]
    pub max_stamina: u32,
}

pub struct ArmyKind;

impl MapObjectKind for ArmyKind {
    type Skin = UnitSkin;
    type Data = ArmyData;

    const KIND: ObjectKind = ObjectKind::Army;

    fn id(data: &ArmyData) -> ObjectId {
        data.id
    }

    fn hex(data: &ArmyData) -> HexCoord {
        data.hex
    }

    fn skin(data: &ArmyData) -> UnitSkin {
        UnitSkin::new(data.category, data.tier)
    }

    fn label_text(data: &ArmyData) -> String {
        match &data.owner {
            Some(owner) => format!("{owner} ({})", data.troop_count),
            None => format!("Army {}", data.id.0),
        }
    }

    fn spawn(world: &mut World, data: &ArmyData) -> Entity {
        world
            .spawn(ArmyBundle {
                object: MapObject {
                    id: data.id,
                    kind: ObjectKind::Army,
                },
                position: HexPosition(data.hex),
                unit: ArmyUnit {
                    category: data.category,
                    tier: data.tier,
                    owner: data.owner.clone(),
                    troop_count: data.troop_count,
                    stamina: data.stamina,
                    max_stamina: data.max_stamina,
                },
            })
            .id()
    }

    fn merge(world: &mut World, entity: Entity, data: &ArmyData) {
        if let Some(mut unit) = world.get_mut::<ArmyUnit>(entity) {
            unit.category = data.category;
            unit.tier = data.tier;
            unit.owner = data.owner.clone();
            unit.troop_count = data.troop_count;
            unit.stamina = data.stamina;
            unit.max_stamina = data.max_stamina;
        }
    }

    fn skin_of(world: &World, entity: Entity) -> Option<UnitSkin> {
        world
            .get::<ArmyUnit>(entity)
            .map(|unit| UnitSkin::new(unit.category, unit.tier))
    }
}

// ============================================================================
// Structures
// ============================================================================

/// Structure state as delivered by the world feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructureData {
    pub id: ObjectId,
    pub hex: HexCoord,
    pub category: StructureCategory,
    #[serde(default)]
    pub level: u8,
    #[serde(default)]
    pub has_wonder: bool,
    #[serde(default)]
    pub owner: Option<String>,
}

pub struct StructureKind;

impl MapObjectKind for StructureKind {
    type Skin = BuildingSkin;
    type Data = StructureData;

    const KIND: ObjectKind = ObjectKind::Structure;

    fn id(data: &StructureData) -> ObjectId {
        data.id
    }

    fn hex(data: &StructureData) -> HexCoord {
        data.hex
    }

    fn skin(data: &StructureData) -> BuildingSkin {
        BuildingSkin::new(data.category, data.level, data.has_wonder)
    }

    fn label_text(data: &StructureData) -> String {
        match &data.owner {
            Some(owner) => owner.clone(),
            None => format!("Structure {}", data.id.0),
        }
    }

    fn spawn(world: &mut World, data: &StructureData) -> Entity {
        world
            .spawn(StructureBundle {
                object: MapObject {
                    id: data.id,
                    kind: ObjectKind::Structure,
                },
                position: HexPosition(data.hex),
                site: StructureSite {
                    category: data.category,
                    level: data.level,
                    has_wonder: data.has_wonder,
                    owner: data.owner.clone(),
                },
            })
            .id()
    }

    fn merge(world: &mut World, entity: Entity, data: &StructureData) {
        if let Some(mut site) = world.get_mut::<StructureSite>(entity) {
            site.category = data.category;
            site.level = data.level;
            site.has_wonder = data.has_wonder;
            site.owner = data.owner.clone();
        }
    }

    fn skin_of(world: &World, entity: Entity) -> Option<BuildingSkin> {
        world
            .get::<StructureSite>(entity)
            .map(|site| BuildingSkin::new(site.category, site.level, site.has_wonder))
    }
}

// ============================================================================
// Quests and chests
// ============================================================================

/// Quest marker position report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestData {
    pub id: ObjectId,
    pub hex: HexCoord,
}

pub struct QuestKind;

impl MapObjectKind for QuestKind {
    type Skin = QuestSkin;
    type Data = QuestData;

    const KIND: ObjectKind = ObjectKind::Quest;

    fn id(data: &QuestData) -> ObjectId {
        data.id
    }

    fn hex(data: &QuestData) -> HexCoord {
        data.hex
    }

    fn skin(_data: &QuestData) -> QuestSkin {
        QuestSkin
    }

    fn label_text(data: &QuestData) -> String {
        format!("Quest {}", data.id.0)
    }

    fn spawn(world: &mut World, data: &QuestData) -> Entity {
        world
            .spawn(QuestBundle {
                object: MapObject {
                    id: data.id,
                    kind: ObjectKind::Quest,
                },
                position: HexPosition(data.hex),
                marker: QuestMarker,
            })
            .id()
    }

    fn merge(_world: &mut World, _entity: Entity, _data: &QuestData) {}

    fn skin_of(world: &World, entity: Entity) -> Option<QuestSkin> {
        world.get::<QuestMarker>(entity).map(|_| QuestSkin)
    }
}

/// Loot chest position report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChestData {
    pub id: ObjectId,
    pub hex: HexCoord,
}

pub struct ChestKind;

impl MapObjectKind for ChestKind {
    type Skin = ChestSkin;
    type Data = ChestData;

    const KIND: ObjectKind = ObjectKind::Chest;

    fn id(data: &ChestData) -> ObjectId {
        data.id
    }

    fn hex(data: &ChestData) -> HexCoord {
        data.hex
    }

    fn skin(_data: &ChestData) -> ChestSkin {
        ChestSkin
    }

    fn label_text(data: &ChestData) -> String {
        format!("Chest {}", data.id.0)
    }

    fn spawn(world: &mut World, data: &ChestData) -> Entity {
        world
            .spawn(ChestBundle {
                object: MapObject {
                    id: data.id,
                    kind: ObjectKind::Chest,
                },
                position: HexPosition(data.hex),
                cache: ChestCache,
            })
            .id()
    }

    fn merge(_world: &mut World, _entity: Entity, _data: &ChestData) {}

    fn skin_of(world: &World, entity: Entity) -> Option<ChestSkin> {
        world.get::<ChestCache>(entity).map(|_| ChestSkin)
    }
}
