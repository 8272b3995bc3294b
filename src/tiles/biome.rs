//! Terrain biome skin.

use serde::{Deserialize, Serialize};

use super::{TileSkin, TilemapSpec};
use crate::components::TileLayer;

/// Terrain classification for an explored hex.
///
/// The discriminant doubles as the tile index on the biome sheet, so the
/// sheet must be authored in this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Biome {
    DeepOcean,
    Ocean,
    Beach,
    Scorched,
    Bare,
    Tundra,
    Snow,
    TemperateDesert,
    Shrubland,
    Taiga,
    Grassland,
    TemperateDeciduousForest,
    TemperateRainForest,
    SubtropicalDesert,
    TropicalSeasonalForest,
    TropicalRainForest,
}

impl Biome {
    pub const ALL: [Biome; 16] = [
        Biome::DeepOcean,
        Biome::Ocean,
        Biome::Beach,
        Biome::Scorched,
        Biome::Bare,
        Biome::Tundra,
        Biome::Snow,
        Biome::TemperateDesert,
        Biome::Shrubland,
        Biome::Taiga,
        Biome::Grassland,
        Biome::TemperateDeciduousForest,
        Biome::TemperateRainForest,
        Biome::SubtropicalDesert,
        Biome::TropicalSeasonalForest,
        Biome::TropicalRainForest,
    ];

    /// Hexes an army can walk onto. Open water blocks ground movement.
    pub fn is_passable(&self) -> bool {
        !matches!(self, Biome::DeepOcean | Biome::Ocean)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Biome::DeepOcean => "deep_ocean",
            Biome::Ocean => "ocean",
            Biome::Beach => "beach",
            Biome::Scorched => "scorched",
            Biome::Bare => "bare",
            Biome::Tundra => "tundra",
            Biome::Snow => "snow",
            Biome::TemperateDesert => "temperate_desert",
            Biome::Shrubland => "shrubland",
            Biome::Taiga => "taiga",
            Biome::Grassland => "grassland",
            Biome::TemperateDeciduousForest => "temperate_deciduous_forest",
            Biome::TemperateRainForest => "temperate_rain_forest",
            Biome::SubtropicalDesert => "subtropical_desert",
            Biome::TropicalSeasonalForest => "tropical_seasonal_forest",
            Biome::TropicalRainForest => "tropical_rain_forest",
        }
    }
}

impl TileSkin for Biome {
    const LAYER: TileLayer = TileLayer::Biome;

    fn tile_index(&self) -> u32 {
        *self as u32
    }

    fn atlas() -> TilemapSpec {
        TilemapSpec::with_layout(Biome::ALL.len() as u32, 8)
    }

    fn catalog() -> Vec<Self> {
        Biome::ALL.to_vec()
    }
}
