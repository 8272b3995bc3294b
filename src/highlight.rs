//! Pulsing highlight overlays for actionable hexes.
//!
//! Each highlighted hex gets one flat mesh sitting just above the tile art.
//! Materials are pooled by `(color, pulse_speed, pulse_intensity)` and shared
//! across meshes; one tint-pulse task runs per pooled material, not per mesh,
//! and stops when the last mesh using it is cleared. The material cache
//! itself survives clears so re-highlighting reuses slots.

use std::collections::HashMap;

use bevy_ecs::prelude::{Mut, Resource, World};
use tracing::trace;

use crate::animation::{AnimationScheduler, TaskId};
use crate::chunks::ChunkStreamer;
use crate::coords::{world_position, HexCoord, WorldPosition};
use crate::scene::{Material, MaterialId, NodeHandle, NodeKind, SceneArena};

/// Constant opacity of highlight meshes; the pulse runs on brightness.
pub const HIGHLIGHT_OPACITY: f32 = 0.6;
/// Default pulse speed in cycles per two seconds.
pub const HIGHLIGHT_PULSE_SPEED: f32 = 2.0;
/// Default pulse depth.
pub const HIGHLIGHT_PULSE_INTENSITY: f32 = 0.3;
/// Mesh position inside a tile group, just above and ahead of the tile art.
const HIGHLIGHT_LOCAL: WorldPosition = WorldPosition {
    x: 0.0,
    y: 0.35,
    z: 0.785,
};
/// Highlights draw over every tile layer.
const HIGHLIGHT_RENDER_ORDER: i32 = 1500;

/// Material pool key. Pulse parameters are part of the identity because the
/// pulse task writes the material's color every frame.
type MaterialKey = (u32, u32, u32);

fn material_key(color: u32, speed: f32, intensity: f32) -> MaterialKey {
    (color, speed.to_bits(), intensity.to_bits())
}

struct PooledMaterial {
    material: MaterialId,
    pulse: Option<TaskId>,
    users: usize,
}

/// Owns the highlight meshes and their pooled materials.
#[derive(Resource)]
pub struct HighlightRenderer {
    meshes: HashMap<HexCoord, (NodeHandle, MaterialKey)>,
    materials: HashMap<MaterialKey, PooledMaterial>,
    pulse_speed: f32,
    pulse_intensity: f32,
}

impl Default for HighlightRenderer {
    fn default() -> Self {
        Self {
            meshes: HashMap::new(),
            materials: HashMap::new(),
            pulse_speed: HIGHLIGHT_PULSE_SPEED,
            pulse_intensity: HIGHLIGHT_PULSE_INTENSITY,
        }
    }
}

impl HighlightRenderer {
    pub fn set_pulse_params(&mut self, speed: f32, intensity: f32) {
        self.pulse_speed = speed;
        self.pulse_intensity = intensity;
    }

    pub fn highlight_count(&self) -> usize {
        self.meshes.len()
    }

    pub fn is_highlighted(&self, hex: HexCoord) -> bool {
        self.meshes.contains_key(&hex)
    }

    /// Cached material slots, including currently unused ones.
    pub fn material_pool_size(&self) -> usize {
        self.materials.len()
    }

    /// Replace the highlight set. Meshes parent into the hex's tile group
    /// when one exists so they follow tile motion; hexes without a group
    /// fall back to a scene-root mesh at the hex's world position.
    pub fn set_highlights(
        &mut self,
        scene: &mut SceneArena,
        scheduler: &mut AnimationScheduler,
        streamer: &ChunkStreamer,
        entries: &[(HexCoord, u32)],
    ) {
        self.clear_highlights(scene, scheduler);
        for &(hex, color) in entries {
            if self.meshes.contains_key(&hex) {
                continue;
            }
            let key = material_key(color, self.pulse_speed, self.pulse_intensity);
            let speed = self.pulse_speed;
            let intensity = self.pulse_intensity;
            let pooled = self.materials.entry(key).or_insert_with(|| {
                let mut material = Material::solid(color);
                material.opacity = HIGHLIGHT_OPACITY;
                PooledMaterial {
                    material: scene.create_material(material),
                    pulse: None,
                    users: 0,
                }
            });
            pooled.users += 1;
            if pooled.pulse.is_none() {
                pooled.pulse =
                    Some(scheduler.start_tint_pulse(pooled.material, color, speed, intensity));
            }

            let mesh = scene.create_node(NodeKind::HighlightMesh);
            scene.set_material(mesh, pooled.material);
            scene.set_render_order(mesh, HIGHLIGHT_RENDER_ORDER);
            match streamer.biome_renderer().tile_group(hex) {
                Some(group) => {
                    scene.attach(group, mesh);
                    scene.set_local_position(mesh, HIGHLIGHT_LOCAL);
                }
                None => {
                    scene.attach(scene.root(), mesh);
                    let mut position = world_position(hex, true);
                    position.y = HIGHLIGHT_LOCAL.y;
                    position.z += HIGHLIGHT_LOCAL.z;
                    scene.set_local_position(mesh, position);
                }
            }
            self.meshes.insert(hex, (mesh, key));
        }
        trace!(
            highlights = self.meshes.len(),
            materials = self.materials.len(),
            "highlight set replaced"
        );
    }

    /// Remove every highlight mesh and stop pulses whose material lost its
    /// last user. Pooled materials stay cached for the next set.
    pub fn clear_highlights(&mut self, scene: &mut SceneArena, scheduler: &mut AnimationScheduler) {
        for (_, (mesh, key)) in self.meshes.drain() {
            scene.remove_node(mesh);
            if let Some(pooled) = self.materials.get_mut(&key) {
                pooled.users = pooled.users.saturating_sub(1);
                if pooled.users == 0 {
                    if let Some(pulse) = pooled.pulse.take() {
                        scheduler.cancel(pulse);
                    }
                }
            }
        }
    }
}

/// Replace the world's highlight set with `entries` (hex, color).
pub fn set_highlights(world: &mut World, entries: &[(HexCoord, u32)]) {
    world.resource_scope(|world, mut highlights: Mut<HighlightRenderer>| {
        world.resource_scope(|world, mut scene: Mut<SceneArena>| {
            world.resource_scope(|world, mut scheduler: Mut<AnimationScheduler>| {
                let streamer = world.resource::<ChunkStreamer>();
                highlights.set_highlights(&mut scene, &mut scheduler, streamer, entries);
            })
        })
    });
}

/// Drop every highlight.
pub fn clear_highlights(world: &mut World) {
    world.resource_scope(|world, mut highlights: Mut<HighlightRenderer>| {
        world.resource_scope(|world, mut scene: Mut<SceneArena>| {
            world.resource_scope(|_, mut scheduler: Mut<AnimationScheduler>| {
                highlights.clear_highlights(&mut scene, &mut scheduler);
            })
        })
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coords::ChunkKey;
    use crate::diagnostics::MapDiagnostics;
    use crate::tiles::Biome;

    fn harness() -> (HighlightRenderer, SceneArena, AnimationScheduler, ChunkStreamer) {
        let mut scene = SceneArena::new();
        let mut streamer = ChunkStreamer::new();
        streamer.register_materials(&mut scene, 0);
        (
            HighlightRenderer::default(),
            scene,
            AnimationScheduler::new(),
            streamer,
        )
    }

    #[test]
    fn test_meshes_share_one_material_and_pulse_per_color() {
        let (mut highlights, mut scene, mut scheduler, streamer) = harness();
        let entries = [
            (HexCoord::new(0, 0), 0x3fb950),
            (HexCoord::new(1, 0), 0x3fb950),
            (HexCoord::new(2, 0), 0xf85149),
        ];
        let before = scene.material_count();
        highlights.set_highlights(&mut scene, &mut scheduler, &streamer, &entries);

        assert_eq!(highlights.highlight_count(), 3);
        assert_eq!(highlights.material_pool_size(), 2);
        assert_eq!(scene.material_count(), before + 2);
        // One pulse per material, not per mesh.
        assert_eq!(scheduler.active_tasks(), 2);
        assert!(highlights.is_highlighted(HexCoord::new(1, 0)));
    }

    #[test]
    fn test_clearing_stops_pulses_but_keeps_the_material_cache() {
        let (mut highlights, mut scene, mut scheduler, streamer) = harness();
        let nodes_before = scene.node_count();
        let entries = [(HexCoord::new(0, 0), 0x3fb950), (HexCoord::new(1, 0), 0xf85149)];
        highlights.set_highlights(&mut scene, &mut scheduler, &streamer, &entries);
        let materials_after_set = scene.material_count();

        highlights.clear_highlights(&mut scene, &mut scheduler);
        assert_eq!(highlights.highlight_count(), 0);
        assert_eq!(scheduler.active_tasks(), 0);
        assert_eq!(scene.node_count(), nodes_before);
        assert_eq!(highlights.material_pool_size(), 2);

        // A second set reuses the cached materials and restarts pulses.
        highlights.set_highlights(&mut scene, &mut scheduler, &streamer, &entries);
        assert_eq!(scene.material_count(), materials_after_set);
        assert_eq!(scheduler.active_tasks(), 2);
    }

    #[test]
    fn test_mesh_parents_into_the_tile_group_when_one_exists() {
        let (mut highlights, mut scene, mut scheduler, mut streamer) = harness();
        let mut diag = MapDiagnostics::new();
        streamer.update_visible_hexes(&mut scene, &mut diag, ChunkKey::new(0, 0), 0.0);
        streamer.record_explored(&mut scene, HexCoord::new(1, 1), Biome::Grassland);
        let group = streamer.biome_renderer().tile_group(HexCoord::new(1, 1)).unwrap();

        highlights.set_highlights(
            &mut scene,
            &mut scheduler,
            &streamer,
            &[(HexCoord::new(1, 1), 0x3fb950), (HexCoord::new(9, 9), 0x3fb950)],
        );

        let grouped = highlights.meshes[&HexCoord::new(1, 1)].0;
        assert_eq!(scene.node(grouped).unwrap().parent, Some(group));
        assert_eq!(scene.node(grouped).unwrap().local, HIGHLIGHT_LOCAL);
        assert_eq!(scene.node(grouped).unwrap().render_order, HIGHLIGHT_RENDER_ORDER);

        // (9,9) has no biome tile; its mesh hangs off the root at the hex's
        // world position.
        let loose = highlights.meshes[&HexCoord::new(9, 9)].0;
        assert_eq!(scene.node(loose).unwrap().parent, Some(scene.root()));
        let expected = world_position(HexCoord::new(9, 9), true);
        assert_eq!(scene.node(loose).unwrap().local.x, expected.x);
        assert_eq!(scene.node(loose).unwrap().local.y, HIGHLIGHT_LOCAL.y);
    }

    #[test]
    fn test_duplicate_entries_produce_one_mesh() {
        let (mut highlights, mut scene, mut scheduler, streamer) = harness();
        let entries = [(HexCoord::new(4, 4), 0x3fb950), (HexCoord::new(4, 4), 0xf85149)];
        highlights.set_highlights(&mut scene, &mut scheduler, &streamer, &entries);
        assert_eq!(highlights.highlight_count(), 1);
    }

    #[test]
    fn test_replacing_the_set_drops_stale_meshes() {
        let (mut highlights, mut scene, mut scheduler, streamer) = harness();
        highlights.set_highlights(
            &mut scene,
            &mut scheduler,
            &streamer,
            &[(HexCoord::new(0, 0), 0x3fb950)],
        );
        highlights.set_highlights(
            &mut scene,
            &mut scheduler,
            &streamer,
            &[(HexCoord::new(5, 5), 0xf85149)],
        );
        assert!(!highlights.is_highlighted(HexCoord::new(0, 0)));
        assert!(highlights.is_highlighted(HexCoord::new(5, 5)));
        assert_eq!(highlights.highlight_count(), 1);
        assert_eq!(scheduler.active_tasks(), 1);
    }
}
