//! Hexfield - Streaming Hex World-Map Core
//!
//! A headless, engine-agnostic core for hex world maps: streams a chunk
//! window around the camera, tracks explored terrain and map objects from a
//! game feed, and extracts per-frame render snapshots for a host renderer.
//! Uses `bevy_ecs` for the entity-component-system architecture.

pub mod animation;
pub mod api;
pub mod bridge;
pub mod chunks;
pub mod components;
pub mod config;
pub mod coords;
pub mod diagnostics;
pub mod feed;
pub mod fetch;
pub mod highlight;
pub mod objects;
pub mod scene;
pub mod selection;
pub mod snapshot;
pub mod tiles;

pub use api::MapWorld;
pub use components::*;
pub use config::MapConfig;
pub use coords::{ChunkKey, HexCoord, VisibleBounds, WorldPosition};
pub use feed::FeedUpdate;
pub use fetch::{FetchError, FetchId, FetchRequest, TileEntity};
pub use selection::{ActionPath, ActionType, MapEvent};
pub use snapshot::RenderSnapshot;
pub use tiles::Biome;
