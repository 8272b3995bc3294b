//! Army unit skin.

use serde::{Deserialize, Serialize};

use super::{TileSkin, TilemapSpec};
use crate::components::{TileLayer, TroopCategory, TroopTier};

/// Sprite selection for an army: troop category crossed with tier.
///
/// The unit sheet holds one row per category, tiers left to right.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UnitSkin {
    pub category: TroopCategory,
    pub tier: TroopTier,
}

impl UnitSkin {
    pub fn new(category: TroopCategory, tier: TroopTier) -> Self {
        UnitSkin { category, tier }
    }
}

const CATEGORIES: [TroopCategory; 3] = [
    TroopCategory::Knight,
    TroopCategory::Paladin,
    TroopCategory::Crossbowman,
];
const TIERS: [TroopTier; 3] = [TroopTier::T1, TroopTier::T2, TroopTier::T3];

fn category_row(category: TroopCategory) -> u32 {
    match category {
        TroopCategory::Knight => 0,
        TroopCategory::Paladin => 1,
        TroopCategory::Crossbowman => 2,
    }
}

fn tier_column(tier: TroopTier) -> u32 {
    match tier {
        TroopTier::T1 => 0,
        TroopTier::T2 => 1,
        TroopTier::T3 => 2,
    }
}

impl TileSkin for UnitSkin {
    const LAYER: TileLayer = TileLayer::Unit;

    fn tile_index(&self) -> u32 {
        category_row(self.category) * TIERS.len() as u32 + tier_column(self.tier)
    }

    fn atlas() -> TilemapSpec {
        TilemapSpec::with_layout((CATEGORIES.len() * TIERS.len()) as u32, TIERS.len() as u32)
    }

    fn catalog() -> Vec<Self> {
        let mut all = Vec::with_capacity(CATEGORIES.len() * TIERS.len());
        for category in CATEGORIES {
            for tier in TIERS {
                all.push(UnitSkin { category, tier });
            }
        }
        all
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_combination_has_a_distinct_index() {
        let mut seen = std::collections::HashSet::new();
        for skin in UnitSkin::catalog() {
            assert!(seen.insert(skin.tile_index()));
        }
        assert_eq!(seen.len(), 9);
    }

    #[test]
    fn test_tier_advances_within_a_row() {
        let t1 = UnitSkin::new(TroopCategory::Paladin, TroopTier::T1);
        let t3 = UnitSkin::new(TroopCategory::Paladin, TroopTier::T3);
        assert_eq!(t3.tile_index(), t1.tile_index() + 2);
    }
}
