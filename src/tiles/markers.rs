//! Quest and chest marker skins. Single-cell sheets.

use super::{TileSkin, TilemapSpec};
use crate::components::TileLayer;

/// Quest marker art. One kind only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct QuestSkin;

impl TileSkin for QuestSkin {
    const LAYER: TileLayer = TileLayer::Quest;

    fn tile_index(&self) -> u32 {
        0
    }

    fn atlas() -> TilemapSpec {
        TilemapSpec::with_layout(1, 1)
    }

    fn catalog() -> Vec<Self> {
        vec![QuestSkin]
    }
}

/// Loot chest art. One kind only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ChestSkin;

impl TileSkin for ChestSkin {
    const LAYER: TileLayer = TileLayer::Chest;

    fn tile_index(&self) -> u32 {
        0
    }

    fn atlas() -> TilemapSpec {
        TilemapSpec::with_layout(1, 1)
    }

    fn catalog() -> Vec<Self> {
        vec![ChestSkin]
    }
}
