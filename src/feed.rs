//! World-feed boundary.
//!
//! Every update arrives as one [`FeedUpdate`] variant and is converted into
//! the strongly typed internal model at this boundary, in arrival order.
//! Army position changes are reconciled into walk animations over explored
//! terrain; a change arriving while the army is already walking is deferred
//! and replayed once the walk commits, so the committed position always
//! converges on the most recent feed state.

use std::collections::HashMap;

use bevy_ecs::prelude::{Mut, Resource, World};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::chunks::ChunkStreamer;
use crate::components::{ObjectId, ObjectKind, ObjectRef};
use crate::config::MapConfig;
use crate::coords::{find_path, HexCoord};
use crate::objects::{
    move_object_along_path, remove_object, set_object_position, upsert_object, ArmyData, ArmyKind,
    ChestData, ChestKind, ObjectManager, QuestData, QuestKind, StructureData, StructureKind,
    PATH_STEP_DURATION,
};
use crate::scene::SceneArena;
use crate::selection::{clear_selection, SelectionState};
use crate::tiles::Biome;

/// Work budget for walk reconciliation. Feed walks stay inside the explored
/// window, which this covers many times over.
const PATH_MAX_EXPANSIONS: usize = 4096;

/// One feed event, tagged for the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum FeedUpdate {
    TileExplored { hex: HexCoord, biome: Biome },
    TileUnexplored { hex: HexCoord },
    ArmyUpsert(ArmyData),
    ArmyRemoved { id: ObjectId },
    StructureUpsert(StructureData),
    QuestUpsert(QuestData),
    QuestRemoved { id: ObjectId },
    ChestUpsert(ChestData),
    ChestRemoved { id: ObjectId },
}

/// Positions suppressed while their army was mid-walk, keyed by army and
/// holding only the most recent state.
#[derive(Resource, Default)]
pub struct FeedReconciler {
    deferred_armies: HashMap<ObjectId, ArmyData>,
}

impl FeedReconciler {
    fn defer(&mut self, data: ArmyData) {
        self.deferred_armies.insert(data.id, data);
    }

    pub fn take_deferred(&mut self, id: ObjectId) -> Option<ArmyData> {
        self.deferred_armies.remove(&id)
    }

    pub fn deferred_count(&self) -> usize {
        self.deferred_armies.len()
    }
}

/// Apply one typed update.
pub fn apply_update(world: &mut World, update: FeedUpdate) {
    match update {
        FeedUpdate::TileExplored { hex, biome } => {
            with_streamer_scene(world, |streamer, scene| {
                streamer.record_explored(scene, hex, biome);
            });
        }
        FeedUpdate::TileUnexplored { hex } => {
            with_streamer_scene(world, |streamer, scene| {
                streamer.record_unexplored(scene, hex);
            });
        }
        FeedUpdate::ArmyUpsert(data) => apply_army_upsert(world, data),
        FeedUpdate::ArmyRemoved { id } => apply_army_removed(world, id),
        FeedUpdate::StructureUpsert(data) => apply_structure_upsert(world, data),
        FeedUpdate::QuestUpsert(data) => apply_marker_upsert::<QuestKind>(world, data.hex, &data),
        FeedUpdate::QuestRemoved { id } => apply_marker_removed::<QuestKind>(world, id),
        FeedUpdate::ChestUpsert(data) => apply_marker_upsert::<ChestKind>(world, data.hex, &data),
        FeedUpdate::ChestRemoved { id } => apply_marker_removed::<ChestKind>(world, id),
    }
}

/// Parse and apply one JSON-encoded update.
pub fn apply_update_json(world: &mut World, json: &str) -> Result<(), serde_json::Error> {
    let update: FeedUpdate = serde_json::from_str(json)?;
    apply_update(world, update);
    Ok(())
}

/// Replay the most recent position suppressed during a walk that just
/// committed. Called by the frame step after move completions are routed.
pub fn reconcile_after_move(world: &mut World, id: ObjectId) {
    let Some(data) = world.resource_mut::<FeedReconciler>().take_deferred(id) else {
        return;
    };
    debug!(id = id.0, "replaying deferred army position");
    apply_army_upsert(world, data);
}

fn with_streamer_scene<R>(
    world: &mut World,
    f: impl FnOnce(&mut ChunkStreamer, &mut SceneArena) -> R,
) -> R {
    world.resource_scope(|world, mut streamer: Mut<ChunkStreamer>| {
        world.resource_scope(|_, mut scene: Mut<SceneArena>| f(&mut streamer, &mut scene))
    })
}

fn apply_army_upsert(world: &mut World, data: ArmyData) {
    let id = data.id;
    let previous = world.resource::<ObjectManager<ArmyKind>>().position_of(world, id);

    // Occupancy mirrors the feed immediately, whatever the animation does.
    with_streamer_scene(world, |streamer, _| {
        if let Some(old) = streamer.find_occupied_hex(ObjectKind::Army, id) {
            if old != data.hex {
                streamer.clear_occupant(ObjectKind::Army, old);
            }
        }
        streamer.set_occupant(ObjectKind::Army, data.hex, id, data.owner.clone());
    });

    let Some(from) = previous else {
        upsert_object::<ArmyKind>(world, &data);
        return;
    };

    if world.resource::<ObjectManager<ArmyKind>>().is_object_moving(id) {
        // The manager merges stats and holds the position; the walk that is
        // already running finishes first, then the deferred state replays.
        upsert_object::<ArmyKind>(world, &data);
        world.resource_mut::<FeedReconciler>().defer(data);
        return;
    }
    if from == data.hex {
        upsert_object::<ArmyKind>(world, &data);
        return;
    }

    // Merge stats at the old hex, then animate the position change.
    let mut held = data.clone();
    held.hex = from;
    upsert_object::<ArmyKind>(world, &held);
    start_army_walk(world, id, from, data.hex);

    if world.resource_mut::<SelectionState>().clear_pending_move(id) {
        debug!(id = id.0, "submitted move confirmed by the feed");
    }
    if world.resource::<SelectionState>().selected() == Some(ObjectRef::new(ObjectKind::Army, id)) {
        clear_selection(world);
    }
}

/// Walk `id` from `from` to `to` along explored terrain, or snap when no
/// route exists.
fn start_army_walk(world: &mut World, id: ObjectId, from: HexCoord, to: HexCoord) {
    let path = {
        let streamer = world.resource::<ChunkStreamer>();
        find_path(from, to, |hex| streamer.is_walkable(hex), PATH_MAX_EXPANSIONS)
    };
    match path {
        Some(mut steps) if steps.len() > 1 => {
            steps.remove(0);
            let step_duration = world
                .get_resource::<MapConfig>()
                .map_or(PATH_STEP_DURATION, |c| c.path_step_duration);
            if !move_object_along_path::<ArmyKind>(world, id, &steps, step_duration) {
                set_object_position::<ArmyKind>(world, id, to);
            }
        }
        _ => {
            debug!(id = id.0, ?from, ?to, "no walkable route, snapping");
            set_object_position::<ArmyKind>(world, id, to);
        }
    }
}

fn apply_army_removed(world: &mut World, id: ObjectId) {
    with_streamer_scene(world, |streamer, _| {
        if let Some(hex) = streamer.find_occupied_hex(ObjectKind::Army, id) {
            streamer.clear_occupant(ObjectKind::Army, hex);
        }
    });
    remove_object::<ArmyKind>(world, id);
    world.resource_mut::<FeedReconciler>().take_deferred(id);
    world.resource_mut::<SelectionState>().clear_pending_move(id);
    if world.resource::<SelectionState>().selected() == Some(ObjectRef::new(ObjectKind::Army, id)) {
        clear_selection(world);
    }
}

fn apply_structure_upsert(world: &mut World, data: StructureData) {
    upsert_object::<StructureKind>(world, &data);
    with_streamer_scene(world, |streamer, scene| {
        if let Some(old) = streamer.find_occupied_hex(ObjectKind::Structure, data.id) {
            if old != data.hex {
                streamer.clear_occupant(ObjectKind::Structure, old);
                streamer.refresh_biome_tile(scene, old);
            }
        }
        streamer.set_occupant(ObjectKind::Structure, data.hex, data.id, data.owner.clone());
        streamer.refresh_biome_tile(scene, data.hex);
    });
}

fn apply_marker_upsert<K>(world: &mut World, hex: HexCoord, data: &K::Data)
where
    K: crate::objects::MapObjectKind,
{
    upsert_object::<K>(world, data);
    let id = K::id(data);
    with_streamer_scene(world, |streamer, _| {
        if let Some(old) = streamer.find_occupied_hex(K::KIND, id) {
            if old != hex {
                streamer.clear_occupant(K::KIND, old);
            }
        }
        streamer.set_occupant(K::KIND, hex, id, None);
    });
}

fn apply_marker_removed<K>(world: &mut World, id: ObjectId)
where
    K: crate::objects::MapObjectKind,
{
    with_streamer_scene(world, |streamer, _| {
        if let Some(hex) = streamer.find_occupied_hex(K::KIND, id) {
            streamer.clear_occupant(K::KIND, hex);
        }
    });
    remove_object::<K>(world, id);
    let selected = world.resource::<SelectionState>().selected();
    if selected == Some(ObjectRef::new(K::KIND, id)) {
        clear_selection(world);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::animation::AnimationScheduler;
    use crate::components::{StructureCategory, TroopCategory, TroopTier};
    use crate::coords::ChunkKey;
    use crate::diagnostics::MapDiagnostics;
    use crate::highlight::HighlightRenderer;
    use crate::objects::commit_object_move;
    use crate::selection::{select_object, MapEvents};

    fn test_world() -> World {
        let mut world = World::new();
        let mut scene = SceneArena::new();
        let mut streamer = ChunkStreamer::new();
        streamer.register_materials(&mut scene, 0);
        let mut armies: ObjectManager<ArmyKind> = ObjectManager::new(8);
        armies.register_materials(&mut scene, 2);
        let mut structures: ObjectManager<StructureKind> = ObjectManager::new(8);
        structures.register_materials(&mut scene, 1);
        let mut quests: ObjectManager<QuestKind> = ObjectManager::new(8);
        quests.register_materials(&mut scene, 3);
        let mut chests: ObjectManager<ChestKind> = ObjectManager::new(8);
        chests.register_materials(&mut scene, 4);
        world.insert_resource(scene);
        world.insert_resource(streamer);
        world.insert_resource(armies);
        world.insert_resource(structures);
        world.insert_resource(quests);
        world.insert_resource(chests);
        world.insert_resource(AnimationScheduler::new());
        world.insert_resource(MapDiagnostics::new());
        world.insert_resource(MapEvents::default());
        world.insert_resource(SelectionState::default());
        world.insert_resource(HighlightRenderer::default());
        world.insert_resource(FeedReconciler::default());
        stream_origin(&mut world);
        world
    }

    fn stream_origin(world: &mut World) {
        world.resource_scope(|world, mut streamer: Mut<ChunkStreamer>| {
            world.resource_scope(|world, mut scene: Mut<SceneArena>| {
                let mut diag = world.resource_mut::<MapDiagnostics>();
                streamer.update_visible_hexes(&mut scene, &mut diag, ChunkKey::new(0, 0), 0.0);
            })
        });
    }

    fn explore_row(world: &mut World, row: i32, cols: std::ops::RangeInclusive<i32>) {
        for col in cols {
            apply_update(
                world,
                FeedUpdate::TileExplored {
                    hex: HexCoord::new(col, row),
                    biome: Biome::Grassland,
                },
            );
        }
    }

    fn army(id: u32, col: i32, row: i32) -> ArmyData {
        ArmyData {
            id: ObjectId(id),
            hex: HexCoord::new(col, row),
            category: TroopCategory::Knight,
            tier: TroopTier::T1,
            owner: Some("velstra".into()),
            troop_count: 50,
            stamina: 10,
            max_stamina: 20,
        }
    }

    /// Advance the frame clock and route completions the way the frame step
    /// does.
    fn tick(world: &mut World, elapsed: f32) {
        world.resource_scope(|world, mut scheduler: Mut<AnimationScheduler>| {
            world.resource_scope(|_, mut scene: Mut<SceneArena>| {
                scheduler.tick(elapsed, &mut scene);
            })
        });
        let finished = world.resource_mut::<AnimationScheduler>().take_finished();
        for completion in finished {
            if let Some(object) = completion.object {
                if object.kind == ObjectKind::Army {
                    commit_object_move::<ArmyKind>(
                        world,
                        object.id,
                        completion.from,
                        completion.to,
                    );
                    reconcile_after_move(world, object.id);
                }
            }
        }
    }

    fn run_until_idle(world: &mut World, mut elapsed: f32) {
        for _ in 0..400 {
            let moving = {
                let manager = world.resource::<ObjectManager<ArmyKind>>();
                manager.ids().any(|id| manager.is_object_moving(id))
            };
            if !moving {
                break;
            }
            elapsed += 0.05;
            tick(world, elapsed);
        }
    }

    #[test]
    fn test_first_exploration_report_wins() {
        let mut world = test_world();
        let hex = HexCoord::new(1, 1);
        apply_update(&mut world, FeedUpdate::TileExplored { hex, biome: Biome::Grassland });
        apply_update(&mut world, FeedUpdate::TileExplored { hex, biome: Biome::Snow });

        let streamer = world.resource::<ChunkStreamer>();
        assert_eq!(streamer.biome_at(hex), Some(Biome::Grassland));
        assert_eq!(streamer.biome_renderer().tile_count(), 1);
    }

    #[test]
    fn test_unexplored_updates_remove_the_record_and_sprite() {
        let mut world = test_world();
        let hex = HexCoord::new(1, 1);
        apply_update(&mut world, FeedUpdate::TileExplored { hex, biome: Biome::Grassland });
        apply_update(&mut world, FeedUpdate::TileUnexplored { hex });

        let streamer = world.resource::<ChunkStreamer>();
        assert!(!streamer.is_explored(hex));
        assert_eq!(streamer.biome_renderer().tile_count(), 0);
    }

    #[test]
    fn test_json_updates_deserialize_and_apply() {
        let mut world = test_world();
        let json = r#"{"type":"TileExplored","hex":{"col":2,"row":1},"biome":"Taiga"}"#;
        apply_update_json(&mut world, json).unwrap();
        assert_eq!(
            world.resource::<ChunkStreamer>().biome_at(HexCoord::new(2, 1)),
            Some(Biome::Taiga)
        );

        assert!(apply_update_json(&mut world, "{\"type\":\"Nope\"}").is_err());
    }

    #[test]
    fn test_feed_updates_serialize_with_a_type_tag() {
        let update = FeedUpdate::ArmyUpsert(army(3, 1, 1));
        let json = serde_json::to_string(&update).unwrap();
        assert!(json.contains("\"type\":\"ArmyUpsert\""));
        assert!(json.contains("\"col\":1"));

        let back: FeedUpdate = serde_json::from_str(&json).unwrap();
        assert_eq!(back, update);
    }

    #[test]
    fn test_army_upsert_registers_object_and_occupancy() {
        let mut world = test_world();
        apply_update(&mut world, FeedUpdate::ArmyUpsert(army(1, 2, 2)));

        assert_eq!(
            world.resource::<ObjectManager<ArmyKind>>().position_of(&world, ObjectId(1)),
            Some(HexCoord::new(2, 2))
        );
        let occupant = world
            .resource::<ChunkStreamer>()
            .occupant(ObjectKind::Army, HexCoord::new(2, 2))
            .cloned()
            .unwrap();
        assert_eq!(occupant.id, ObjectId(1));
        assert_eq!(occupant.owner.as_deref(), Some("velstra"));
    }

    #[test]
    fn test_position_change_walks_the_explored_route() {
        let mut world = test_world();
        explore_row(&mut world, 0, 0..=3);
        apply_update(&mut world, FeedUpdate::ArmyUpsert(army(1, 0, 0)));

        apply_update(&mut world, FeedUpdate::ArmyUpsert(army(1, 3, 0)));
        {
            let manager = world.resource::<ObjectManager<ArmyKind>>();
            assert!(manager.is_object_moving(ObjectId(1)));
            // Commits only when the walk ends.
            assert_eq!(manager.position_of(&world, ObjectId(1)), Some(HexCoord::new(0, 0)));
        }
        // Occupancy already sits at the destination.
        assert!(world
            .resource::<ChunkStreamer>()
            .occupant(ObjectKind::Army, HexCoord::new(3, 0))
            .is_some());
        assert!(world
            .resource::<ChunkStreamer>()
            .occupant(ObjectKind::Army, HexCoord::new(0, 0))
            .is_none());

        run_until_idle(&mut world, 0.0);
        let manager = world.resource::<ObjectManager<ArmyKind>>();
        assert!(!manager.is_object_moving(ObjectId(1)));
        assert_eq!(manager.position_of(&world, ObjectId(1)), Some(HexCoord::new(3, 0)));
    }

    #[test]
    fn test_unreachable_position_change_snaps() {
        let mut world = test_world();
        apply_update(&mut world, FeedUpdate::ArmyUpsert(army(1, 0, 0)));
        // Nothing explored: no route exists.
        apply_update(&mut world, FeedUpdate::ArmyUpsert(army(1, 3, 3)));

        let manager = world.resource::<ObjectManager<ArmyKind>>();
        assert!(!manager.is_object_moving(ObjectId(1)));
        assert_eq!(manager.position_of(&world, ObjectId(1)), Some(HexCoord::new(3, 3)));
    }

    #[test]
    fn test_mid_walk_updates_defer_until_the_walk_commits() {
        let mut world = test_world();
        explore_row(&mut world, 0, 0..=4);
        apply_update(&mut world, FeedUpdate::ArmyUpsert(army(1, 0, 0)));
        apply_update(&mut world, FeedUpdate::ArmyUpsert(army(1, 2, 0)));
        assert!(world
            .resource::<ObjectManager<ArmyKind>>()
            .is_object_moving(ObjectId(1)));

        // A newer position lands mid-walk.
        let mut newer = army(1, 4, 0);
        newer.troop_count = 45;
        apply_update(&mut world, FeedUpdate::ArmyUpsert(newer));
        assert_eq!(world.resource::<FeedReconciler>().deferred_count(), 1);
        // Stats merged immediately, position still the walk's origin.
        assert_eq!(
            world.resource::<ObjectManager<ArmyKind>>().position_of(&world, ObjectId(1)),
            Some(HexCoord::new(0, 0))
        );

        run_until_idle(&mut world, 0.0);
        // The deferred walk replayed and finished at the newest position.
        assert_eq!(world.resource::<FeedReconciler>().deferred_count(), 0);
        assert_eq!(
            world.resource::<ObjectManager<ArmyKind>>().position_of(&world, ObjectId(1)),
            Some(HexCoord::new(4, 0))
        );
    }

    #[test]
    fn test_confirmation_clears_pending_and_selection() {
        let mut world = test_world();
        explore_row(&mut world, 0, 0..=2);
        apply_update(&mut world, FeedUpdate::ArmyUpsert(army(1, 0, 0)));
        select_object(&mut world, ObjectRef::new(ObjectKind::Army, ObjectId(1)));
        world
            .resource_mut::<SelectionState>()
            .mark_pending_move(ObjectId(1));

        apply_update(&mut world, FeedUpdate::ArmyUpsert(army(1, 2, 0)));

        let state = world.resource::<SelectionState>();
        assert!(!state.has_pending_move(ObjectId(1)));
        assert!(state.selected().is_none());
    }

    #[test]
    fn test_army_removal_cleans_occupancy_and_pending_state() {
        let mut world = test_world();
        apply_update(&mut world, FeedUpdate::ArmyUpsert(army(1, 2, 2)));
        world
            .resource_mut::<SelectionState>()
            .mark_pending_move(ObjectId(1));

        apply_update(&mut world, FeedUpdate::ArmyRemoved { id: ObjectId(1) });

        assert_eq!(world.resource::<ObjectManager<ArmyKind>>().object_count(), 0);
        assert!(world
            .resource::<ChunkStreamer>()
            .occupant(ObjectKind::Army, HexCoord::new(2, 2))
            .is_none());
        assert!(!world.resource::<SelectionState>().has_pending_move(ObjectId(1)));

        // Removing again is a quiet no-op.
        apply_update(&mut world, FeedUpdate::ArmyRemoved { id: ObjectId(1) });
    }

    #[test]
    fn test_structure_upsert_suppresses_the_biome_sprite() {
        let mut world = test_world();
        let hex = HexCoord::new(2, 2);
        apply_update(&mut world, FeedUpdate::TileExplored { hex, biome: Biome::Grassland });
        assert_eq!(world.resource::<ChunkStreamer>().biome_renderer().tile_count(), 1);

        apply_update(
            &mut world,
            FeedUpdate::StructureUpsert(StructureData {
                id: ObjectId(10),
                hex,
                category: StructureCategory::Realm,
                level: 2,
                has_wonder: false,
                owner: Some("velstra".into()),
            }),
        );

        let streamer = world.resource::<ChunkStreamer>();
        assert_eq!(streamer.biome_renderer().tile_count(), 0);
        assert!(streamer.occupant(ObjectKind::Structure, hex).is_some());
        assert!(streamer.is_explored(hex));
    }

    #[test]
    fn test_quests_and_chests_track_occupancy_and_removal() {
        let mut world = test_world();
        let hex = HexCoord::new(4, 1);
        apply_update(
            &mut world,
            FeedUpdate::QuestUpsert(QuestData { id: ObjectId(5), hex }),
        );
        apply_update(
            &mut world,
            FeedUpdate::ChestUpsert(ChestData { id: ObjectId(6), hex }),
        );
        {
            let streamer = world.resource::<ChunkStreamer>();
            assert_eq!(streamer.occupant(ObjectKind::Quest, hex).unwrap().id, ObjectId(5));
            assert_eq!(streamer.occupant(ObjectKind::Chest, hex).unwrap().id, ObjectId(6));
        }

        apply_update(&mut world, FeedUpdate::QuestRemoved { id: ObjectId(5) });
        apply_update(&mut world, FeedUpdate::ChestRemoved { id: ObjectId(6) });

        let streamer = world.resource::<ChunkStreamer>();
        assert!(streamer.occupant(ObjectKind::Quest, hex).is_none());
        assert!(streamer.occupant(ObjectKind::Chest, hex).is_none());
        assert_eq!(world.resource::<ObjectManager<QuestKind>>().object_count(), 0);
    }

    #[test]
    fn test_removing_a_selected_chest_clears_the_selection() {
        let mut world = test_world();
        let hex = HexCoord::new(4, 1);
        apply_update(
            &mut world,
            FeedUpdate::ChestUpsert(ChestData { id: ObjectId(6), hex }),
        );
        select_object(&mut world, ObjectRef::new(ObjectKind::Chest, ObjectId(6)));

        apply_update(&mut world, FeedUpdate::ChestRemoved { id: ObjectId(6) });
        assert!(world.resource::<SelectionState>().selected().is_none());
    }
}
