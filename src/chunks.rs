//! Chunk-window streaming around the camera.
//!
//! The [`ChunkStreamer`] owns everything keyed by hex residency: the resident
//! hex set and its bounds, the shared instanced ground batch, the biome tile
//! renderer, the explored-tile map, the per-kind hex occupancy index, and the
//! fetch bookkeeping (dedup set, outbox, in-flight request).
//!
//! Camera movement funnels through [`update_chunk_loading`]: world position
//! to hex to chunk key, early-out when the chunk is unchanged, otherwise a
//! window update that rebuilds residency, issues at most one deduplicated
//! fetch, and re-renders ground and biome tiles.

use std::collections::{HashMap, HashSet};

use bevy_ecs::prelude::{Mut, Resource, World};
use tracing::{debug, trace, warn};

use crate::animation::AnimationScheduler;
use crate::components::{ObjectId, ObjectKind};
use crate::coords::{
    chunk_window, hex_from_world, world_position, ChunkKey, HexCoord, VisibleBounds, WorldPosition,
};
use crate::diagnostics::MapDiagnostics;
use crate::fetch::{FetchError, FetchId, FetchOutbox, FetchRequest, FetchedChunkSet, TileEntity};
use crate::objects::{set_object_bounds, ArmyKind, ChestKind, QuestKind, StructureKind};
use crate::scene::{GroundBatch, GroundInstance, NodeHandle, NodeKind, SceneArena};
use crate::selection::{push_event, MapEvent};
use crate::tiles::{Biome, TileRenderer};

/// Chunks loaded around the camera along the columns axis.
pub const CHUNK_LOAD_RADIUS_X: i32 = 2;
/// Chunks loaded around the camera along the rows axis.
pub const CHUNK_LOAD_RADIUS_Z: i32 = 3;
/// The ground batch starts at this capacity regardless of demand.
pub const GROUND_BASE_CAPACITY: usize = 1000;
/// The ground batch never grows past this.
pub const GROUND_MAX_CAPACITY: usize = 5000;
/// Height of ground instances above the tile plane.
pub const GROUND_HEIGHT: f32 = 0.1;
/// Base tint of ground instances.
pub const GROUND_COLOR: u32 = 0x4a90e2;

/// Occupant of a hex for one object kind. One occupant per hex per kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HexOccupant {
    pub id: ObjectId,
    pub owner: Option<String>,
}

#[derive(Debug, Default)]
struct OccupancyIndex {
    army: HashMap<HexCoord, HexOccupant>,
    structure: HashMap<HexCoord, HexOccupant>,
    quest: HashMap<HexCoord, HexOccupant>,
    chest: HashMap<HexCoord, HexOccupant>,
}

impl OccupancyIndex {
    fn map(&self, kind: ObjectKind) -> &HashMap<HexCoord, HexOccupant> {
        match kind {
            ObjectKind::Army => &self.army,
            ObjectKind::Structure => &self.structure,
            ObjectKind::Quest => &self.quest,
            ObjectKind::Chest => &self.chest,
        }
    }

    fn map_mut(&mut self, kind: ObjectKind) -> &mut HashMap<HexCoord, HexOccupant> {
        match kind {
            ObjectKind::Army => &mut self.army,
            ObjectKind::Structure => &mut self.structure,
            ObjectKind::Quest => &mut self.quest,
            ObjectKind::Chest => &mut self.chest,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct InFlightFetch {
    id: FetchId,
    chunk: ChunkKey,
    issued_at: f32,
}

/// Streams the chunk window and everything derived from it.
#[derive(Resource)]
pub struct ChunkStreamer {
    radius_x: i32,
    radius_z: i32,
    /// Chunk the camera sat in at the last loading check.
    last_chunk: Option<ChunkKey>,
    /// Window update in progress; new targets are stashed, not processed.
    updating: bool,
    pending_window: Option<ChunkKey>,
    resident: HashSet<HexCoord>,
    bounds: Option<VisibleBounds>,
    ground: Option<NodeHandle>,
    ground_capacity: usize,
    biomes: TileRenderer<Biome>,
    explored: HashMap<HexCoord, Biome>,
    occupancy: OccupancyIndex,
    fetched: FetchedChunkSet,
    outbox: FetchOutbox,
    in_flight: Option<InFlightFetch>,
    first_paint_done: bool,
}

impl Default for ChunkStreamer {
    fn default() -> Self {
        Self::new()
    }
}

impl ChunkStreamer {
    pub fn new() -> Self {
        Self {
            radius_x: CHUNK_LOAD_RADIUS_X,
            radius_z: CHUNK_LOAD_RADIUS_Z,
            last_chunk: None,
            updating: false,
            pending_window: None,
            resident: HashSet::new(),
            bounds: None,
            ground: None,
            ground_capacity: 0,
            biomes: TileRenderer::default(),
            explored: HashMap::new(),
            occupancy: OccupancyIndex::default(),
            fetched: FetchedChunkSet::default(),
            outbox: FetchOutbox::default(),
            in_flight: None,
            first_paint_done: false,
        }
    }

    pub fn register_materials(&mut self, scene: &mut SceneArena, atlas_page: u32) {
        self.biomes.register_materials(scene, atlas_page);
    }

    pub fn is_ready(&self) -> bool {
        self.biomes.is_ready()
    }

    pub fn load_radii(&self) -> (i32, i32) {
        (self.radius_x, self.radius_z)
    }

    pub fn set_load_radii(&mut self, radius_x: i32, radius_z: i32) {
        self.radius_x = radius_x.max(0);
        self.radius_z = radius_z.max(0);
    }

    /// Fit the load radii to the viewport: wider screens stream more columns,
    /// taller screens more rows, and higher cameras more of both.
    pub fn adjust_load_radii(&mut self, screen_width: f32, screen_height: f32, camera_distance: f32) {
        let aspect = screen_width / screen_height;
        let base = ((camera_distance / 10.0).ceil() as i32).max(1);
        if aspect > 1.0 {
            self.radius_x = (base as f32 * aspect).ceil() as i32;
            self.radius_z = base;
        } else {
            self.radius_x = base;
            self.radius_z = (base as f32 / aspect).ceil() as i32;
        }
        debug!(
            radius_x = self.radius_x,
            radius_z = self.radius_z,
            "adjusted chunk load radii"
        );
    }

    pub fn bounds(&self) -> Option<VisibleBounds> {
        self.bounds
    }

    pub fn is_resident(&self, hex: HexCoord) -> bool {
        self.resident.contains(&hex)
    }

    pub fn resident_count(&self) -> usize {
        self.resident.len()
    }

    pub fn is_explored(&self, hex: HexCoord) -> bool {
        self.explored.contains_key(&hex)
    }

    pub fn biome_at(&self, hex: HexCoord) -> Option<Biome> {
        self.explored.get(&hex).copied()
    }

    pub fn explored_count(&self) -> usize {
        self.explored.len()
    }

    pub fn biome_renderer(&self) -> &TileRenderer<Biome> {
        &self.biomes
    }

    pub fn biome_renderer_mut(&mut self) -> &mut TileRenderer<Biome> {
        &mut self.biomes
    }

    pub fn ground_node(&self) -> Option<NodeHandle> {
        self.ground
    }

    // ------------------------------------------------------------------
    // Occupancy index
    // ------------------------------------------------------------------

    pub fn occupant(&self, kind: ObjectKind, hex: HexCoord) -> Option<&HexOccupant> {
        self.occupancy.map(kind).get(&hex)
    }

    pub fn set_occupant(&mut self, kind: ObjectKind, hex: HexCoord, id: ObjectId, owner: Option<String>) {
        self.occupancy.map_mut(kind).insert(hex, HexOccupant { id, owner });
    }

    pub fn clear_occupant(&mut self, kind: ObjectKind, hex: HexCoord) -> Option<HexOccupant> {
        self.occupancy.map_mut(kind).remove(&hex)
    }

    /// Hex currently occupied by `id`, scanning one kind's index.
    pub fn find_occupied_hex(&self, kind: ObjectKind, id: ObjectId) -> Option<HexCoord> {
        self.occupancy
            .map(kind)
            .iter()
            .find(|(_, occ)| occ.id == id)
            .map(|(&hex, _)| hex)
    }

    pub fn occupied_count(&self, kind: ObjectKind) -> usize {
        self.occupancy.map(kind).len()
    }

    pub fn clear_occupancy(&mut self) {
        self.occupancy = OccupancyIndex::default();
    }

    /// Whether an army can path through `hex`: explored and free of both
    /// structures and other armies.
    pub fn is_walkable(&self, hex: HexCoord) -> bool {
        self.is_explored(hex)
            && self.occupant(ObjectKind::Structure, hex).is_none()
            && self.occupant(ObjectKind::Army, hex).is_none()
    }

    // ------------------------------------------------------------------
    // Exploration
    // ------------------------------------------------------------------

    /// Record a newly explored tile. The first report for a hex wins; a
    /// repeat report is ignored. Resident hexes get their biome sprite
    /// immediately unless a structure sits on top.
    pub fn record_explored(&mut self, scene: &mut SceneArena, hex: HexCoord, biome: Biome) -> bool {
        if self.explored.contains_key(&hex) {
            return false;
        }
        self.explored.insert(hex, biome);
        if self.resident.contains(&hex) && self.occupant(ObjectKind::Structure, hex).is_none() {
            self.biomes.add_tile(scene, hex, biome, true);
        }
        true
    }

    /// Forget an explored tile and drop its sprite.
    pub fn record_unexplored(&mut self, scene: &mut SceneArena, hex: HexCoord) {
        self.explored.remove(&hex);
        self.biomes.remove_tile(scene, hex);
    }

    /// Re-derive the biome sprite at `hex` after occupancy changed there:
    /// structures suppress the sprite, their departure restores it.
    pub fn refresh_biome_tile(&mut self, scene: &mut SceneArena, hex: HexCoord) {
        if self.occupant(ObjectKind::Structure, hex).is_some() {
            self.biomes.remove_tile(scene, hex);
        } else if self.resident.contains(&hex) {
            if let Some(&biome) = self.explored.get(&hex) {
                self.biomes.add_tile(scene, hex, biome, true);
            }
        }
    }

    // ------------------------------------------------------------------
    // Streaming
    // ------------------------------------------------------------------

    /// Camera moved: convert the controls target to a chunk and stream if it
    /// differs from the last checked chunk. Returns the processed window's
    /// center and bounds when anything changed.
    pub fn update_chunk_loading(
        &mut self,
        scene: &mut SceneArena,
        diag: &mut MapDiagnostics,
        camera_target: WorldPosition,
        now: f32,
    ) -> Option<(ChunkKey, VisibleBounds)> {
        let hex = hex_from_world(camera_target.x, camera_target.z);
        let chunk = ChunkKey::containing(hex);
        if self.last_chunk == Some(chunk) {
            trace!(?chunk, "camera still in the same chunk");
            return None;
        }
        debug!(from = ?self.last_chunk, to = ?chunk, "camera crossed a chunk boundary");
        self.last_chunk = Some(chunk);
        self.update_visible_hexes(scene, diag, chunk, now)
    }

    /// Rebuild the window around `center`. Not reentrant: while an update is
    /// running a new target is stashed and replayed afterwards, so rapid
    /// camera movement coalesces into the last requested target.
    pub fn update_visible_hexes(
        &mut self,
        scene: &mut SceneArena,
        diag: &mut MapDiagnostics,
        center: ChunkKey,
        now: f32,
    ) -> Option<(ChunkKey, VisibleBounds)> {
        if self.updating {
            self.pending_window = Some(center);
            return None;
        }
        let mut target = center;
        loop {
            self.updating = true;
            let bounds = self.run_window_update(scene, diag, target, now);
            self.updating = false;
            match self.pending_window.take() {
                Some(next) if next != target => target = next,
                _ => return Some((target, bounds)),
            }
        }
    }

    fn run_window_update(
        &mut self,
        scene: &mut SceneArena,
        diag: &mut MapDiagnostics,
        center: ChunkKey,
        now: f32,
    ) -> VisibleBounds {
        debug!(chunk = ?center, radius_x = self.radius_x, radius_z = self.radius_z, "updating visible hexes");
        self.resident.clear();
        for key in chunk_window(center, self.radius_x, self.radius_z) {
            self.resident.extend(key.hexes());
        }
        let bounds = VisibleBounds::from_chunk_window(center, self.radius_x, self.radius_z);
        self.bounds = Some(bounds);

        self.compute_tile_entities(diag, center, now);
        self.render_hexes(scene, diag);
        diag.chunk_updates += 1;
        bounds
    }

    /// Issue the fetch for a window centered on `center`, at most once per
    /// chunk key. A still-pending request from a previous window move is
    /// cancelled first.
    fn compute_tile_entities(&mut self, diag: &mut MapDiagnostics, center: ChunkKey, now: f32) {
        if self.fetched.contains(center) {
            debug!(chunk = ?center, "chunk already fetched");
            return;
        }
        if let Some(prev) = self.in_flight.take() {
            debug!(chunk = ?prev.chunk, "cancelling superseded fetch");
            self.outbox.cancel(prev.id);
            self.fetched.release(prev.chunk);
            diag.fetches_cancelled += 1;
        }
        self.fetched.mark(center);
        let mut hexes: Vec<HexCoord> = self.resident.iter().copied().collect();
        hexes.sort_unstable_by_key(|h| (h.row, h.col));
        let id = self.outbox.issue(center, hexes);
        self.in_flight = Some(InFlightFetch {
            id,
            chunk: center,
            issued_at: now,
        });
        diag.fetches_issued += 1;
        debug!(chunk = ?center, id = id.0, "tile entity fetch issued");
    }

    /// Host reports a fetch outcome. Stale ids (superseded requests) are
    /// dropped. Returns whether any tiles were applied.
    pub fn deliver_fetched(
        &mut self,
        scene: &mut SceneArena,
        diag: &mut MapDiagnostics,
        id: FetchId,
        result: Result<Vec<TileEntity>, FetchError>,
        now: f32,
    ) -> bool {
        let current = match self.in_flight {
            Some(f) if f.id == id => f,
            _ => {
                debug!(id = id.0, "stale fetch delivery dropped");
                return false;
            }
        };
        self.in_flight = None;
        diag.record_chunk_load(now - current.issued_at);

        match result {
            Ok(tiles) => {
                diag.fetches_completed += 1;
                let mut applied = 0usize;
                for tile in &tiles {
                    if self.record_explored(scene, tile.hex, tile.biome) {
                        applied += 1;
                    }
                }
                debug!(
                    chunk = ?current.chunk,
                    received = tiles.len(),
                    applied,
                    "chunk fetch completed"
                );
                applied > 0
            }
            Err(FetchError::Cancelled) => {
                diag.fetches_cancelled += 1;
                self.fetched.release(current.chunk);
                debug!(chunk = ?current.chunk, "chunk fetch cancelled");
                false
            }
            Err(FetchError::Failed(reason)) => {
                diag.fetches_failed += 1;
                self.fetched.release(current.chunk);
                warn!(chunk = ?current.chunk, %reason, "chunk fetch failed, chunk stays retryable");
                false
            }
        }
    }

    /// Rebuild the ground batch for the resident set and diff the biome
    /// sprites against it. Capacity only grows, up to the hard cap.
    fn render_hexes(&mut self, scene: &mut SceneArena, diag: &mut MapDiagnostics) {
        if self.resident.is_empty() {
            self.biomes.clear_tiles(scene);
            if let Some(ground) = self.ground {
                if let Some(batch) = scene.ground_batch_mut(ground) {
                    batch.instances.clear();
                }
            }
            diag.resident_hexes = 0;
            diag.ground_instances = 0;
            return;
        }

        let mut hexes: Vec<HexCoord> = self.resident.iter().copied().collect();
        hexes.sort_unstable_by_key(|h| (h.row, h.col));

        let capacity = self.ensure_ground_capacity(scene, hexes.len());
        if hexes.len() > capacity {
            warn!(
                required = hexes.len(),
                capacity, "ground instance demand exceeds the hard cap"
            );
        }
        if let Some(ground) = self.ground {
            if let Some(batch) = scene.ground_batch_mut(ground) {
                batch.instances.clear();
                for &hex in hexes.iter().take(capacity) {
                    let mut position = world_position(hex, true);
                    position.y = GROUND_HEIGHT;
                    batch.instances.push(GroundInstance { position, hex });
                }
            }
        }

        if let Some(bounds) = self.bounds {
            self.biomes.set_visible_bounds(scene, bounds);
        }
        if self.biomes.is_ready() {
            let tiles: Vec<(HexCoord, Biome)> = hexes
                .iter()
                .filter(|&&hex| self.occupant(ObjectKind::Structure, hex).is_none())
                .filter_map(|&hex| self.explored.get(&hex).map(|&biome| (hex, biome)))
                .collect();
            if self.first_paint_done {
                self.biomes.update_tiles_for_hexes(scene, &tiles);
            } else {
                self.biomes.render_tiles_for_hexes(scene, &tiles);
                self.first_paint_done = true;
            }
        } else {
            warn!("biome materials not registered, skipping tile pass");
        }

        diag.resident_hexes = self.resident.len();
        diag.ground_instances = hexes.len().min(capacity);
        trace!(
            resident = self.resident.len(),
            ground = diag.ground_instances,
            tiles = self.biomes.tile_count(),
            "rendered hexes"
        );
    }

    fn ensure_ground_capacity(&mut self, scene: &mut SceneArena, required: usize) -> usize {
        let clamp = |n: usize| n.max(GROUND_BASE_CAPACITY).min(GROUND_MAX_CAPACITY);
        match self.ground {
            None => {
                let capacity = clamp(required);
                let node = scene.create_node(NodeKind::InstancedGround(GroundBatch {
                    capacity,
                    instances: Vec::new(),
                    color: GROUND_COLOR,
                }));
                scene.attach(scene.root(), node);
                self.ground = Some(node);
                self.ground_capacity = capacity;
            }
            Some(node) if self.ground_capacity < required => {
                let capacity = clamp(required);
                if let Some(batch) = scene.ground_batch_mut(node) {
                    batch.capacity = capacity;
                }
                debug!(from = self.ground_capacity, to = capacity, "ground batch grown");
                self.ground_capacity = capacity;
            }
            Some(_) => {}
        }
        self.ground_capacity
    }

    /// Resolve a ground-plane point to a clickable hex. Only hexes with a
    /// live ground instance accept clicks.
    pub fn handle_click(&self, world_point: WorldPosition) -> Option<HexCoord> {
        self.ground?;
        let hex = hex_from_world(world_point.x, world_point.z);
        if self.resident.contains(&hex) {
            Some(hex)
        } else {
            trace!(?hex, "click outside the resident window");
            None
        }
    }

    /// Recenter on `hex` and stream its window even when the camera math
    /// lands in the same chunk. Returns the camera target position.
    pub fn jump_to_hex(
        &mut self,
        scene: &mut SceneArena,
        diag: &mut MapDiagnostics,
        hex: HexCoord,
        now: f32,
    ) -> (WorldPosition, Option<(ChunkKey, VisibleBounds)>) {
        let target = world_position(hex, true);
        self.last_chunk = None;
        let changed = self.update_chunk_loading(scene, diag, target, now);
        (target, changed)
    }

    /// Drop all fetch memory so every chunk becomes fetchable again. The
    /// next camera check restreams the current window.
    pub fn clear_fetch_cache(&mut self) {
        if let Some(prev) = self.in_flight.take() {
            self.outbox.cancel(prev.id);
        }
        self.fetched.clear();
        self.last_chunk = None;
        self.pending_window = None;
        self.updating = false;
    }

    /// Forget every explored tile and drop the biome sprites. Fetch memory
    /// is cleared with it so the reissued fetches can repopulate the map.
    pub fn clear_explored(&mut self, scene: &mut SceneArena) {
        self.explored.clear();
        self.biomes.clear_tiles(scene);
        self.clear_fetch_cache();
    }

    pub fn drain_fetch_requests(&mut self) -> Vec<FetchRequest> {
        self.outbox.drain_requests()
    }

    pub fn drain_fetch_cancellations(&mut self) -> Vec<FetchId> {
        self.outbox.drain_cancellations()
    }
}

// ============================================================================
// World-level entry points
// ============================================================================

fn with_streamer<R>(
    world: &mut World,
    f: impl FnOnce(&mut World, &mut ChunkStreamer, &mut SceneArena) -> R,
) -> R {
    world.resource_scope(|world, mut streamer: Mut<ChunkStreamer>| {
        world.resource_scope(|world, mut scene: Mut<SceneArena>| {
            f(world, &mut streamer, &mut scene)
        })
    })
}

fn forward_window_change(world: &mut World, center: ChunkKey, bounds: VisibleBounds) {
    set_object_bounds::<ArmyKind>(world, bounds);
    set_object_bounds::<StructureKind>(world, bounds);
    set_object_bounds::<QuestKind>(world, bounds);
    set_object_bounds::<ChestKind>(world, bounds);
    push_event(world, MapEvent::ChunkWindowChanged { center, bounds });
}

/// Stream chunks for a camera target. Forwards new bounds to every object
/// manager and surfaces a window-change event when the window moved.
pub fn update_chunk_loading(world: &mut World, camera_target: WorldPosition) {
    let changed = with_streamer(world, |world, streamer, scene| {
        let now = world.resource::<AnimationScheduler>().now();
        let mut diag = world.resource_mut::<MapDiagnostics>();
        streamer.update_chunk_loading(scene, &mut diag, camera_target, now)
    });
    if let Some((center, bounds)) = changed {
        forward_window_change(world, center, bounds);
    }
}

/// Report a fetch outcome from the host.
pub fn deliver_fetched(world: &mut World, id: FetchId, result: Result<Vec<TileEntity>, FetchError>) {
    with_streamer(world, |world, streamer, scene| {
        let now = world.resource::<AnimationScheduler>().now();
        let mut diag = world.resource_mut::<MapDiagnostics>();
        streamer.deliver_fetched(scene, &mut diag, id, result, now);
    });
}

/// Recenter the map on `hex` and stream its window. Returns the camera
/// target so the host can move its own camera.
pub fn jump_to_hex(world: &mut World, hex: HexCoord) -> WorldPosition {
    let (target, changed) = with_streamer(world, |world, streamer, scene| {
        let now = world.resource::<AnimationScheduler>().now();
        let mut diag = world.resource_mut::<MapDiagnostics>();
        streamer.jump_to_hex(scene, &mut diag, hex, now)
    });
    if let Some((center, bounds)) = changed {
        forward_window_change(world, center, bounds);
    }
    target
}

/// Resolve a ground-plane click to a hex and run the click policy on it.
/// Returns the hex when it was accepted.
pub fn handle_click(world: &mut World, world_point: WorldPosition) -> Option<HexCoord> {
    let hex = world.resource::<ChunkStreamer>().handle_click(world_point)?;
    crate::selection::handle_hex_click(world, hex);
    Some(hex)
}
