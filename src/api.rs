//! Public API for the map core.
//!
//! This module provides the main interface for the host renderer (a web
//! canvas, a Godot scene, or a headless test) to drive the streaming hex
//! map.
//!
//! ## Frame Pacing
//!
//! The map advances on render frames rather than a fixed timestep. Every
//! animation here eases toward a known target, so a long frame simply lands
//! further along the same curve instead of replaying missed updates.
//! Authoritative state (explored tiles, object positions) comes from the
//! feed and is never time-integrated.
//!
//! ## Embedding Contract
//!
//! One cycle per rendered frame:
//!
//! 1. Forward input as it arrives: `update_camera`, `handle_click`,
//!    `apply_update`
//! 2. Drain `drain_fetch_requests`, resolve them against the feed, and
//!    report each outcome through `deliver_fetched`
//! 3. Call `step(dt)` once with the real frame delta
//! 4. Drain `drain_events`, then read `snapshot` or `flat_buffer` to paint

use crate::animation::{animation_tick_system, AnimationScheduler, FrameClock};
use crate::bridge;
use crate::chunks::{self, ChunkStreamer};
use crate::components::{ObjectId, ObjectKind, ObjectRef};
use crate::config::MapConfig;
use crate::coords::{HexCoord, WorldPosition};
use crate::diagnostics::{DiagnosticsCounters, MapDiagnostics, MetricSummary};
use crate::feed::{self, FeedReconciler, FeedUpdate};
use crate::fetch::{FetchError, FetchId, FetchRequest, TileEntity};
use crate::highlight::HighlightRenderer;
use crate::objects::{
    commit_object_move, remove_object, ArmyKind, ChestKind, MapObjectKind, ObjectManager,
    QuestKind, StructureKind,
};
use crate::scene::SceneArena;
use crate::selection::{self, ActionPath, MapEvent, MapEvents, SelectionState};
use crate::snapshot::RenderSnapshot;
use crate::tiles::Biome;
use bevy_ecs::prelude::*;

/// Atlas page the biome tile sprites sample from.
pub const ATLAS_PAGE_BIOME: u32 = 0;
/// Atlas page for structure sprites.
pub const ATLAS_PAGE_STRUCTURE: u32 = 1;
/// Atlas page for army sprites.
pub const ATLAS_PAGE_UNIT: u32 = 2;
/// Atlas page for quest markers.
pub const ATLAS_PAGE_QUEST: u32 = 3;
/// Atlas page for chest markers.
pub const ATLAS_PAGE_CHEST: u32 = 4;

/// Drain finished move animations and commit each to its owning manager.
///
/// Runs after the animation tick in the same schedule, so a move is
/// committed in the frame its animation ends. Army commits also replay any
/// feed position that arrived mid-walk.
fn route_move_completions(world: &mut World) {
    let finished = world.resource_mut::<AnimationScheduler>().take_finished();
    for completion in finished {
        let Some(object) = completion.object else {
            continue;
        };
        match object.kind {
            ObjectKind::Army => {
                commit_object_move::<ArmyKind>(world, object.id, completion.from, completion.to);
                feed::reconcile_after_move(world, object.id);
            }
            ObjectKind::Structure => {
                commit_object_move::<StructureKind>(world, object.id, completion.from, completion.to);
            }
            ObjectKind::Quest => {
                commit_object_move::<QuestKind>(world, object.id, completion.from, completion.to);
            }
            ObjectKind::Chest => {
                commit_object_move::<ChestKind>(world, object.id, completion.from, completion.to);
            }
        }
    }
}

fn remove_all<K: MapObjectKind>(world: &mut World) {
    let ids: Vec<ObjectId> = world.resource::<ObjectManager<K>>().ids().collect();
    for id in ids {
        remove_object::<K>(world, id);
    }
}

/// The main map world container.
///
/// Holds the ECS world and schedule, providing a clean API for:
/// - Streaming the chunk window around the camera
/// - Applying feed updates and fetch results
/// - Selection, action paths, and click dispatch
/// - Extracting render snapshots
pub struct MapWorld {
    world: World,
    schedule: Schedule,
    frame: u64,
    time: f32,
}

impl MapWorld {
    /// Create a new empty map world with the default configuration.
    pub fn new() -> Self {
        Self::with_config(MapConfig::default())
    }

    /// Create a new map world with custom configuration.
    pub fn with_config(config: MapConfig) -> Self {
        let mut world = World::new();

        let mut streamer = ChunkStreamer::new();
        streamer.set_load_radii(config.chunk_load_radius_x, config.chunk_load_radius_z);
        let mut highlights = HighlightRenderer::default();
        highlights.set_pulse_params(config.highlight_pulse_speed, config.highlight_pulse_intensity);

        // Scene and streaming resources
        world.insert_resource(SceneArena::new());
        world.insert_resource(streamer);
        world.insert_resource(ObjectManager::<ArmyKind>::new(config.pool_size));
        world.insert_resource(ObjectManager::<StructureKind>::new(config.pool_size));
        world.insert_resource(ObjectManager::<QuestKind>::new(config.pool_size));
        world.insert_resource(ObjectManager::<ChestKind>::new(config.pool_size));

        // Interaction and bookkeeping resources
        world.insert_resource(AnimationScheduler::new());
        world.insert_resource(FrameClock::default());
        world.insert_resource(MapDiagnostics::new());
        world.insert_resource(MapEvents::default());
        world.insert_resource(SelectionState::default());
        world.insert_resource(highlights);
        world.insert_resource(FeedReconciler::default());
        world.insert_resource(config);

        // Animations advance first; completions commit in the same frame.
        let mut schedule = Schedule::default();
        schedule.add_systems((animation_tick_system, route_move_completions).chain());

        Self {
            world,
            schedule,
            frame: 0,
            time: 0.0,
        }
    }

    /// Register the sprite materials for every renderer. Call once after the
    /// host has loaded its texture atlases; until then no sprite is realized.
    pub fn register_materials(&mut self) {
        self.world.resource_scope(|world, mut scene: Mut<SceneArena>| {
            world
                .resource_mut::<ChunkStreamer>()
                .register_materials(&mut scene, ATLAS_PAGE_BIOME);
            world
                .resource_mut::<ObjectManager<StructureKind>>()
                .register_materials(&mut scene, ATLAS_PAGE_STRUCTURE);
            world
                .resource_mut::<ObjectManager<ArmyKind>>()
                .register_materials(&mut scene, ATLAS_PAGE_UNIT);
            world
                .resource_mut::<ObjectManager<QuestKind>>()
                .register_materials(&mut scene, ATLAS_PAGE_QUEST);
            world
                .resource_mut::<ObjectManager<ChestKind>>()
                .register_materials(&mut scene, ATLAS_PAGE_CHEST);
        });
    }

    /// True once every renderer holds its registered materials.
    pub fn is_ready(&self) -> bool {
        self.world.resource::<ChunkStreamer>().is_ready()
            && self.world.resource::<ObjectManager<ArmyKind>>().is_ready()
            && self.world.resource::<ObjectManager<StructureKind>>().is_ready()
            && self.world.resource::<ObjectManager<QuestKind>>().is_ready()
            && self.world.resource::<ObjectManager<ChestKind>>().is_ready()
    }

    /// Advance the map by one render frame of `dt` seconds.
    pub fn step(&mut self, dt: f32) {
        self.world.resource_mut::<FrameClock>().advance(dt);
        self.schedule.run(&mut self.world);
        self.frame += 1;
        self.time += dt;
    }

    /// Stream the chunk window for a camera ground target. Cheap when the
    /// camera stayed inside its chunk.
    pub fn update_camera(&mut self, x: f32, z: f32) {
        chunks::update_chunk_loading(&mut self.world, WorldPosition::new(x, 0.0, z));
    }

    /// Recenter the window on `hex`. Returns the camera target so the host
    /// can move its own camera.
    pub fn jump_to_hex(&mut self, hex: HexCoord) -> WorldPosition {
        chunks::jump_to_hex(&mut self.world, hex)
    }

    /// Resolve a ground-plane click to a hex and run the click policy on it.
    /// Returns the hex when the click landed inside the window.
    pub fn handle_click(&mut self, x: f32, z: f32) -> Option<HexCoord> {
        chunks::handle_click(&mut self.world, WorldPosition::new(x, 0.0, z))
    }

    /// Override the chunk load radii. The next camera check restreams.
    pub fn set_load_radii(&mut self, radius_x: i32, radius_z: i32) {
        self.world
            .resource_mut::<ChunkStreamer>()
            .set_load_radii(radius_x, radius_z);
    }

    /// Fit the load radii to the host viewport and camera distance.
    pub fn adjust_load_radii(&mut self, screen_width: f32, screen_height: f32, camera_distance: f32) {
        self.world
            .resource_mut::<ChunkStreamer>()
            .adjust_load_radii(screen_width, screen_height, camera_distance);
    }

    /// Fetch requests issued since the last drain. The host resolves each
    /// against the feed and reports through [`MapWorld::deliver_fetched`].
    pub fn drain_fetch_requests(&mut self) -> Vec<FetchRequest> {
        self.world
            .resource_mut::<ChunkStreamer>()
            .drain_fetch_requests()
    }

    /// Ids of fetches the map no longer wants. The host may abort them.
    pub fn drain_fetch_cancellations(&mut self) -> Vec<FetchId> {
        self.world
            .resource_mut::<ChunkStreamer>()
            .drain_fetch_cancellations()
    }

    /// Report a fetch outcome from the host. Stale ids are dropped.
    pub fn deliver_fetched(&mut self, id: FetchId, result: Result<Vec<TileEntity>, FetchError>) {
        chunks::deliver_fetched(&mut self.world, id, result);
    }

    /// Apply one feed update.
    pub fn apply_update(&mut self, update: FeedUpdate) {
        feed::apply_update(&mut self.world, update);
    }

    /// Apply one feed update from its JSON form.
    pub fn apply_update_json(&mut self, json: &str) -> Result<(), serde_json::Error> {
        feed::apply_update_json(&mut self.world, json)
    }

    /// Select `target`, replacing any current selection. Returns false when
    /// the object is unknown or its sprite is not realized yet.
    pub fn select_object(&mut self, target: ObjectRef) -> bool {
        selection::select_object(&mut self.world, target)
    }

    /// Drop the current selection and its action paths.
    pub fn clear_selection(&mut self) {
        selection::clear_selection(&mut self.world);
    }

    /// The currently selected object, if any.
    pub fn selected(&self) -> Option<ObjectRef> {
        self.world.resource::<SelectionState>().selected()
    }

    /// Install the selected army's reachable action paths and highlight
    /// them. The host computes reachability; the map owns presentation.
    pub fn set_action_paths(&mut self, paths: Vec<ActionPath>) {
        selection::set_action_paths(&mut self.world, paths);
    }

    /// Hand the queued events to the host.
    pub fn drain_events(&mut self) -> Vec<MapEvent> {
        selection::drain_events(&mut self.world)
    }

    /// Get a snapshot of the current frame.
    pub fn snapshot(&mut self) -> RenderSnapshot {
        RenderSnapshot::from_world(&mut self.world, self.frame, self.time)
    }

    /// Get the snapshot as a JSON string.
    pub fn snapshot_json(&mut self) -> String {
        self.snapshot().to_json().unwrap_or_else(|_| "{}".to_string())
    }

    /// Get the current frame as a flat `f32` buffer for zero-copy upload.
    pub fn flat_buffer(&mut self) -> Vec<f32> {
        bridge::snapshot_to_flatbuffer(&self.snapshot())
    }

    /// Cumulative diagnostics counters.
    pub fn diagnostics(&self) -> DiagnosticsCounters {
        self.world.resource::<MapDiagnostics>().counters()
    }

    /// Rolling chunk load timing, `None` until the first delivery.
    pub fn chunk_load_summary(&self) -> Option<MetricSummary> {
        self.world.resource::<MapDiagnostics>().chunk_load_summary()
    }

    /// Frames stepped since construction.
    pub fn current_frame(&self) -> u64 {
        self.frame
    }

    /// Elapsed map time in seconds.
    pub fn current_time(&self) -> f32 {
        self.time
    }

    /// Committed objects of `kind`.
    pub fn object_count(&self, kind: ObjectKind) -> usize {
        match kind {
            ObjectKind::Army => self.world.resource::<ObjectManager<ArmyKind>>().object_count(),
            ObjectKind::Structure => self
                .world
                .resource::<ObjectManager<StructureKind>>()
                .object_count(),
            ObjectKind::Quest => self.world.resource::<ObjectManager<QuestKind>>().object_count(),
            ObjectKind::Chest => self.world.resource::<ObjectManager<ChestKind>>().object_count(),
        }
    }

    /// Hexes in the resident window.
    pub fn resident_count(&self) -> usize {
        self.world.resource::<ChunkStreamer>().resident_count()
    }

    /// Explored tiles currently known to the map.
    pub fn explored_count(&self) -> usize {
        self.world.resource::<ChunkStreamer>().explored_count()
    }

    /// Biome of an explored hex.
    pub fn biome_at(&self, hex: HexCoord) -> Option<Biome> {
        self.world.resource::<ChunkStreamer>().biome_at(hex)
    }

    /// Drop every explored tile, object, and fetch memory while keeping the
    /// registered materials. The next camera check restreams from scratch.
    pub fn clear_cache(&mut self) {
        selection::clear_selection(&mut self.world);
        remove_all::<ArmyKind>(&mut self.world);
        remove_all::<StructureKind>(&mut self.world);
        remove_all::<QuestKind>(&mut self.world);
        remove_all::<ChestKind>(&mut self.world);
        self.world.resource_scope(|world, mut streamer: Mut<ChunkStreamer>| {
            world.resource_scope(|_, mut scene: Mut<SceneArena>| {
                streamer.clear_explored(&mut scene);
            });
            streamer.clear_occupancy();
        });
        self.world.insert_resource(FeedReconciler::default());
    }

    /// Get direct access to the ECS world (for advanced usage).
    pub fn world(&self) -> &World {
        &self.world
    }

    /// Get mutable access to the ECS world (for advanced usage).
    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }
}

impl Default for MapWorld {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{TroopCategory, TroopTier};
    use crate::coords::world_position;
    use crate::objects::ArmyData;
    use crate::selection::ActionType;

    fn army(id: u32, col: i32, row: i32) -> ArmyData {
        ArmyData {
            id: ObjectId(id),
            hex: HexCoord::new(col, row),
            category: TroopCategory::Crossbowman,
            tier: TroopTier::T1,
            owner: Some("meridian".into()),
            troop_count: 60,
            stamina: 20,
            max_stamina: 40,
        }
    }

    /// Materials registered and the default window streamed around origin.
    fn ready_map() -> MapWorld {
        let mut map = MapWorld::new();
        map.register_materials();
        map.update_camera(0.0, 0.0);
        map
    }

    /// Resolve the pending window fetch with every hex explored.
    fn explore_window(map: &mut MapWorld) {
        let mut requests = map.drain_fetch_requests();
        assert_eq!(requests.len(), 1);
        let request = requests.remove(0);
        let tiles: Vec<TileEntity> = request
            .hexes
            .iter()
            .map(|&hex| TileEntity {
                hex,
                biome: Biome::Grassland,
            })
            .collect();
        map.deliver_fetched(request.id, Ok(tiles));
    }

    #[test]
    fn test_new_world_is_idle() {
        let map = MapWorld::new();
        assert_eq!(map.current_frame(), 0);
        assert_eq!(map.current_time(), 0.0);
        assert!(!map.is_ready());
        assert_eq!(map.selected(), None);
        assert_eq!(map.object_count(ObjectKind::Army), 0);
        assert_eq!(map.resident_count(), 0);
    }

    #[test]
    fn test_register_materials_readies_every_renderer() {
        let mut map = MapWorld::new();
        map.register_materials();
        assert!(map.is_ready());
    }

    #[test]
    fn test_step_advances_the_frame_clock() {
        let mut map = MapWorld::new();
        map.step(0.05);
        map.step(0.05);
        assert_eq!(map.current_frame(), 2);
        assert!((map.current_time() - 0.1).abs() < 1e-6);
        assert_eq!(map.world().resource::<FrameClock>().frame, 2);
    }

    #[test]
    fn test_camera_pan_streams_one_window_fetch() {
        let mut map = ready_map();

        let mut requests = map.drain_fetch_requests();
        assert_eq!(requests.len(), 1);
        let first = requests.remove(0);
        assert_eq!(first.hexes.len(), 875);
        // Requests are ordered by (row, col); the far corner leads.
        assert_eq!(first.hexes[0], HexCoord::new(-10, -15));

        // Still inside the origin chunk: no restream.
        map.update_camera(0.1, 0.0);
        assert!(map.drain_fetch_requests().is_empty());

        // Crossing into a far chunk supersedes the in-flight fetch.
        let far = world_position(HexCoord::new(50, 50), true);
        map.update_camera(far.x, far.z);
        assert_eq!(map.drain_fetch_requests().len(), 1);
        assert_eq!(map.drain_fetch_cancellations(), vec![first.id]);
        assert_eq!(map.diagnostics().fetches_cancelled, 1);

        let events = map.drain_events();
        assert!(events
            .iter()
            .any(|e| matches!(e, MapEvent::ChunkWindowChanged { .. })));
    }

    #[test]
    fn test_fetch_delivery_explores_the_window() {
        let mut map = ready_map();
        explore_window(&mut map);

        assert_eq!(map.explored_count(), 875);
        assert_eq!(map.biome_at(HexCoord::new(0, 0)), Some(Biome::Grassland));
        let counters = map.diagnostics();
        assert_eq!(counters.fetches_issued, 1);
        assert_eq!(counters.fetches_completed, 1);
        assert_eq!(counters.resident_hexes, 875);
        assert_eq!(map.chunk_load_summary().unwrap().samples, 1);

        let snapshot = map.snapshot();
        assert_eq!(snapshot.sprites.len(), 875);
        assert_eq!(snapshot.ground.as_ref().unwrap().instances.len(), 875);
    }

    #[test]
    fn test_failed_fetch_stays_retryable() {
        let mut map = ready_map();
        let request = map.drain_fetch_requests().remove(0);
        map.deliver_fetched(request.id, Err(FetchError::Failed("feed offline".into())));
        assert_eq!(map.diagnostics().fetches_failed, 1);
        assert_eq!(map.explored_count(), 0);

        map.jump_to_hex(HexCoord::new(0, 0));
        let retry = map.drain_fetch_requests();
        assert_eq!(retry.len(), 1);
        assert_eq!(retry[0].hexes.len(), 875);
    }

    #[test]
    fn test_click_selects_and_requests_action() {
        let mut map = ready_map();
        explore_window(&mut map);
        map.apply_update(FeedUpdate::ArmyUpsert(army(7, 0, 0)));
        map.drain_events();

        let origin = world_position(HexCoord::new(0, 0), true);
        assert_eq!(map.handle_click(origin.x, origin.z), Some(HexCoord::new(0, 0)));
        let target = ObjectRef::new(ObjectKind::Army, ObjectId(7));
        assert_eq!(map.selected(), Some(target));
        assert!(map.drain_events().iter().any(|e| matches!(
            e,
            MapEvent::SelectionChanged { selected: Some(s) } if *s == target
        )));

        map.set_action_paths(vec![ActionPath {
            action: ActionType::Move,
            hexes: vec![HexCoord::new(1, 0), HexCoord::new(2, 0)],
        }]);
        let destination = world_position(HexCoord::new(2, 0), true);
        assert_eq!(
            map.handle_click(destination.x, destination.z),
            Some(HexCoord::new(2, 0))
        );

        let events = map.drain_events();
        assert!(events.iter().any(|e| matches!(
            e,
            MapEvent::ActionRequested { object, action: ActionType::Move, path }
                if *object == target && path.len() == 2
        )));
        assert_eq!(map.selected(), None);
        assert!(map
            .world()
            .resource::<SelectionState>()
            .has_pending_move(ObjectId(7)));
    }

    #[test]
    fn test_feed_position_change_walks_then_commits() {
        let mut map = ready_map();
        explore_window(&mut map);
        map.apply_update(FeedUpdate::ArmyUpsert(army(1, 0, 0)));
        map.apply_update(FeedUpdate::ArmyUpsert(army(1, 3, 0)));
        assert!(map.snapshot().armies[0].moving);

        let mut guard = 0;
        while map.snapshot().armies[0].moving {
            map.step(0.05);
            guard += 1;
            assert!(guard < 400, "walk never committed");
        }

        let snapshot = map.snapshot();
        assert_eq!((snapshot.armies[0].col, snapshot.armies[0].row), (3, 0));
        let streamer = map.world().resource::<ChunkStreamer>();
        assert_eq!(
            streamer.find_occupied_hex(ObjectKind::Army, ObjectId(1)),
            Some(HexCoord::new(3, 0))
        );
    }

    #[test]
    fn test_config_step_durations_speed_up_walks() {
        let config = MapConfig {
            path_step_duration: 0.1,
            path_step_pause: 0.0,
            ..MapConfig::default()
        };
        let mut map = MapWorld::with_config(config);
        map.register_materials();
        map.update_camera(0.0, 0.0);
        explore_window(&mut map);
        map.apply_update(FeedUpdate::ArmyUpsert(army(1, 0, 0)));
        map.apply_update(FeedUpdate::ArmyUpsert(army(1, 2, 0)));
        assert!(map.snapshot().armies[0].moving);

        // Two segments of 0.1 s each, no pauses.
        for _ in 0..6 {
            map.step(0.05);
        }
        let snapshot = map.snapshot();
        assert!(!snapshot.armies[0].moving);
        assert_eq!((snapshot.armies[0].col, snapshot.armies[0].row), (2, 0));
    }

    #[test]
    fn test_jump_to_hex_recenters_the_window() {
        let mut map = ready_map();
        map.drain_fetch_requests();

        let hex = HexCoord::new(50, 50);
        let target = map.jump_to_hex(hex);
        assert_eq!(target, world_position(hex, true));
        assert!(map.world().resource::<ChunkStreamer>().is_resident(hex));
        assert_eq!(map.resident_count(), 875);
        assert_eq!(map.drain_fetch_requests().len(), 1);
    }

    #[test]
    fn test_clear_cache_forgets_streamed_state() {
        let mut map = ready_map();
        explore_window(&mut map);
        map.apply_update(FeedUpdate::ArmyUpsert(army(3, 1, 1)));
        map.select_object(ObjectRef::new(ObjectKind::Army, ObjectId(3)));

        map.clear_cache();
        assert_eq!(map.selected(), None);
        assert_eq!(map.object_count(ObjectKind::Army), 0);
        assert_eq!(map.explored_count(), 0);
        assert_eq!(
            map.world()
                .resource::<ChunkStreamer>()
                .occupied_count(ObjectKind::Army),
            0
        );

        // The window restreams from scratch on the next camera check.
        map.update_camera(0.0, 0.0);
        assert_eq!(map.drain_fetch_requests().len(), 1);
    }

    #[test]
    fn test_config_radii_shrink_the_window() {
        let config = MapConfig {
            chunk_load_radius_x: 1,
            chunk_load_radius_z: 1,
            ..MapConfig::default()
        };
        let mut map = MapWorld::with_config(config);
        map.register_materials();
        map.update_camera(0.0, 0.0);

        assert_eq!(map.resident_count(), 225);
        let request = map.drain_fetch_requests().remove(0);
        assert_eq!(request.hexes.len(), 225);
    }

    #[test]
    fn test_snapshot_json_carries_the_frame_sections() {
        let mut map = ready_map();
        explore_window(&mut map);
        map.apply_update(FeedUpdate::ArmyUpsert(army(5, 2, 2)));
        map.step(0.016);

        let json = map.snapshot_json();
        assert!(json.contains("\"sprites\""));
        assert!(json.contains("\"armies\""));
        assert!(json.contains("\"counters\""));
        assert!(json.contains("meridian"));
    }

    #[test]
    fn test_stress_full_window_with_armies() {
        use crate::diagnostics::SectionProfiler;
        use std::time::Instant;

        let mut map = ready_map();
        explore_window(&mut map);

        for i in 0..60 {
            let col = (i % 10) as i32 - 5;
            let row = (i / 10) as i32 - 3;
            map.apply_update(FeedUpdate::ArmyUpsert(army(i, col, row)));
        }
        assert_eq!(map.object_count(ObjectKind::Army), 60);

        let mut profiler = SectionProfiler::new();
        let start = Instant::now();
        let frames = 300usize;
        for _ in 0..frames {
            profiler.time_section("step", || map.step(1.0 / 60.0));
            profiler.time_section("flat_buffer", || {
                let _ = map.flat_buffer();
            });
            profiler.frame();
        }
        let elapsed = start.elapsed();

        println!(
            "875 resident hexes, 60 armies, {} frames in {:?} ({:.2} ms/frame)",
            frames,
            elapsed,
            elapsed.as_millis() as f64 / frames as f64
        );
        println!("{}", profiler.format_summary());
        assert!(elapsed.as_secs() < 30, "frame stepping too slow: {:?}", elapsed);

        let snapshot = map.snapshot();
        assert_eq!(snapshot.counters.resident_hexes, 875);
        assert_eq!(snapshot.armies.len(), 60);
    }
}
