//! Structure building skin.

use serde::{Deserialize, Serialize};

use super::{TileSkin, TilemapSpec};
use crate::components::{StructureCategory, TileLayer};

/// Highest level with dedicated art; anything above clamps down to it.
pub const MAX_LEVEL_ART: u8 = 3;

const CATEGORIES: [StructureCategory; 5] = [
    StructureCategory::Realm,
    StructureCategory::Hyperstructure,
    StructureCategory::Bank,
    StructureCategory::FragmentMine,
    StructureCategory::Village,
];

/// Index of the wonder cell, past the category/level grid.
const WONDER_INDEX: u32 = (CATEGORIES.len() as u32) * (MAX_LEVEL_ART as u32 + 1);

/// Sprite selection for a structure.
///
/// The building sheet is a category-by-level grid with a single wonder cell
/// at the end; a realm that holds a wonder uses that cell regardless of
/// level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BuildingSkin {
    pub category: StructureCategory,
    pub level: u8,
    pub has_wonder: bool,
}

impl BuildingSkin {
    pub fn new(category: StructureCategory, level: u8, has_wonder: bool) -> Self {
        BuildingSkin { category, level, has_wonder }
    }
}

fn category_column(category: StructureCategory) -> u32 {
    match category {
        StructureCategory::Realm => 0,
        StructureCategory::Hyperstructure => 1,
        StructureCategory::Bank => 2,
        StructureCategory::FragmentMine => 3,
        StructureCategory::Village => 4,
    }
}

impl TileSkin for BuildingSkin {
    const LAYER: TileLayer = TileLayer::Structure;

    fn tile_index(&self) -> u32 {
        if self.has_wonder {
            return WONDER_INDEX;
        }
        let level = self.level.min(MAX_LEVEL_ART) as u32;
        level * CATEGORIES.len() as u32 + category_column(self.category)
    }

    fn atlas() -> TilemapSpec {
        TilemapSpec::with_layout(WONDER_INDEX + 1, CATEGORIES.len() as u32)
    }

    fn catalog() -> Vec<Self> {
        let mut all = Vec::new();
        for category in CATEGORIES {
            for level in 0..=MAX_LEVEL_ART {
                all.push(BuildingSkin::new(category, level, false));
            }
        }
        all.push(BuildingSkin::new(StructureCategory::Realm, 0, true));
        all
    }
}
