//! Scene arena - the retained node graph the renderer host consumes.
//!
//! Nodes live in an arena and are addressed by generational handles; each
//! node stores its parent explicitly and attach/detach are index operations.
//! The host never holds pointers into the arena: it reads the flattened
//! snapshot (see `snapshot`/`bridge`) once per frame.
//!
//! Materials live in a side table. Sprites reference materials by id, and
//! material identity is what the tile diffing layer compares to detect a
//! kind change without inspecting texture data.

use crate::coords::{HexCoord, WorldPosition};
use bevy_ecs::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Handle to a scene node. Stale handles (freed slots) are detected by the
/// generation counter and rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeHandle {
    index: u32,
    generation: u32,
}

/// Handle to an entry in the material table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MaterialId(u32);

/// Texture region inside an atlas, in normalized UV space.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct UvRect {
    pub offset_x: f32,
    pub offset_y: f32,
    pub repeat_x: f32,
    pub repeat_y: f32,
}

/// Renderable material: atlas page + UV window + tint + opacity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Material {
    /// Atlas page this material samples from.
    pub atlas: u32,
    pub uv: UvRect,
    /// Tint as 0xRRGGBB.
    pub color: u32,
    pub opacity: f32,
}

impl Material {
    pub fn solid(color: u32) -> Self {
        Self {
            atlas: 0,
            uv: UvRect::default(),
            color,
            opacity: 1.0,
        }
    }
}

/// Per-instance data of the ground batch.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GroundInstance {
    pub position: WorldPosition,
    pub hex: HexCoord,
}

/// Instanced ground-plane batch. Capacity only ever grows (never shrinks)
/// so steady-state camera movement reuses the same backing allocation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GroundBatch {
    pub capacity: usize,
    pub instances: Vec<GroundInstance>,
    pub color: u32,
}

/// What a node is, plus its kind-specific payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum NodeKind {
    /// Composite anchor, e.g. one per occupied hex.
    Group,
    /// Billboard sprite; material carries the texture region.
    Sprite,
    /// Floating text label.
    Label { text: String },
    /// Pulsing action-highlight plane.
    HighlightMesh,
    /// The shared instanced ground batch.
    InstancedGround(GroundBatch),
}

/// A single scene node.
#[derive(Debug, Clone)]
pub struct Node {
    pub kind: NodeKind,
    pub parent: Option<NodeHandle>,
    pub children: Vec<NodeHandle>,
    /// Position relative to the parent (world position for root children).
    pub local: WorldPosition,
    pub scale: (f32, f32),
    pub visible: bool,
    pub render_order: i32,
    pub material: Option<MaterialId>,
}

struct Slot {
    generation: u32,
    node: Option<Node>,
}

/// The scene arena resource. One per map world.
#[derive(Resource)]
pub struct SceneArena {
    slots: Vec<Slot>,
    free: Vec<u32>,
    materials: Vec<Option<Material>>,
    free_materials: Vec<u32>,
    root: NodeHandle,
}

impl Default for SceneArena {
    fn default() -> Self {
        Self::new()
    }
}

impl SceneArena {
    pub fn new() -> Self {
        let mut arena = Self {
            slots: Vec::new(),
            free: Vec::new(),
            materials: Vec::new(),
            free_materials: Vec::new(),
            root: NodeHandle {
                index: 0,
                generation: 0,
            },
        };
        arena.root = arena.create_node(NodeKind::Group);
        arena
    }

    /// The scene root. Attachment to the root (transitively) is what
    /// "visible in the scene" means for groups and sprites.
    pub fn root(&self) -> NodeHandle {
        self.root
    }

    // ------------------------------------------------------------------
    // Node lifecycle
    // ------------------------------------------------------------------

    /// Allocate a detached node.
    pub fn create_node(&mut self, kind: NodeKind) -> NodeHandle {
        let node = Node {
            kind,
            parent: None,
            children: Vec::new(),
            local: WorldPosition::default(),
            scale: (1.0, 1.0),
            visible: true,
            render_order: 0,
            material: None,
        };
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.node = Some(node);
            NodeHandle {
                index,
                generation: slot.generation,
            }
        } else {
            self.slots.push(Slot {
                generation: 0,
                node: Some(node),
            });
            NodeHandle {
                index: (self.slots.len() - 1) as u32,
                generation: 0,
            }
        }
    }

    /// Free a node slot. The node must already be childless; children are
    /// not freed recursively because pooled sprites outlive their groups.
    pub fn remove_node(&mut self, handle: NodeHandle) {
        if self.node(handle).is_none() {
            debug_assert!(false, "remove_node on stale handle {:?}", handle);
            return;
        }
        self.detach(handle);
        let children = self.slots[handle.index as usize]
            .node
            .as_ref()
            .map(|n| n.children.clone())
            .unwrap_or_default();
        debug_assert!(children.is_empty(), "removing node with live children");
        for child in children {
            // Self-heal in release: orphan instead of leaking a stale parent.
            if let Some(node) = self.node_mut_internal(child) {
                node.parent = None;
            }
        }
        let slot = &mut self.slots[handle.index as usize];
        slot.node = None;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(handle.index);
    }

    pub fn node(&self, handle: NodeHandle) -> Option<&Node> {
        let slot = self.slots.get(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.node.as_ref()
    }

    fn node_mut_internal(&mut self, handle: NodeHandle) -> Option<&mut Node> {
        let slot = self.slots.get_mut(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.node.as_mut()
    }

    /// Number of live nodes, the root included.
    pub fn node_count(&self) -> usize {
        self.slots.iter().filter(|s| s.node.is_some()).count()
    }

    // ------------------------------------------------------------------
    // Hierarchy
    // ------------------------------------------------------------------

    /// Attach `child` under `parent`, detaching from any previous parent.
    pub fn attach(&mut self, parent: NodeHandle, child: NodeHandle) {
        if parent == child {
            debug_assert!(false, "node attached to itself");
            return;
        }
        if self.node(parent).is_none() || self.node(child).is_none() {
            warn!(?parent, ?child, "attach on stale scene handle ignored");
            return;
        }
        self.detach(child);
        if let Some(node) = self.node_mut_internal(parent) {
            node.children.push(child);
        }
        if let Some(node) = self.node_mut_internal(child) {
            node.parent = Some(parent);
        }
    }

    /// Detach `child` from its parent, if any. The node stays alive.
    pub fn detach(&mut self, child: NodeHandle) {
        let parent = match self.node(child) {
            Some(node) => node.parent,
            None => return,
        };
        let Some(parent) = parent else { return };
        if let Some(node) = self.node_mut_internal(parent) {
            node.children.retain(|&c| c != child);
        }
        if let Some(node) = self.node_mut_internal(child) {
            node.parent = None;
        }
    }

    /// Whether `handle` is reachable from the scene root.
    pub fn is_attached_to_root(&self, handle: NodeHandle) -> bool {
        let mut current = handle;
        loop {
            if current == self.root {
                return true;
            }
            match self.node(current).and_then(|n| n.parent) {
                Some(parent) => current = parent,
                None => return false,
            }
        }
    }

    /// Position of a node in world space (parent chain composed).
    pub fn world_position(&self, handle: NodeHandle) -> WorldPosition {
        let mut pos = WorldPosition::default();
        let mut current = Some(handle);
        while let Some(h) = current {
            match self.node(h) {
                Some(node) => {
                    pos.x += node.local.x;
                    pos.y += node.local.y;
                    pos.z += node.local.z;
                    current = node.parent;
                }
                None => break,
            }
        }
        pos
    }

    // ------------------------------------------------------------------
    // Node fields
    // ------------------------------------------------------------------

    pub fn set_local_position(&mut self, handle: NodeHandle, local: WorldPosition) {
        if let Some(node) = self.node_mut_internal(handle) {
            node.local = local;
        }
    }

    pub fn local_position(&self, handle: NodeHandle) -> WorldPosition {
        self.node(handle).map(|n| n.local).unwrap_or_default()
    }

    pub fn set_scale(&mut self, handle: NodeHandle, sx: f32, sy: f32) {
        if let Some(node) = self.node_mut_internal(handle) {
            node.scale = (sx, sy);
        }
    }

    pub fn set_visible(&mut self, handle: NodeHandle, visible: bool) {
        if let Some(node) = self.node_mut_internal(handle) {
            node.visible = visible;
        }
    }

    pub fn set_render_order(&mut self, handle: NodeHandle, order: i32) {
        if let Some(node) = self.node_mut_internal(handle) {
            node.render_order = order;
        }
    }

    pub fn set_material(&mut self, handle: NodeHandle, material: MaterialId) {
        if let Some(node) = self.node_mut_internal(handle) {
            node.material = Some(material);
        }
    }

    pub fn node_material(&self, handle: NodeHandle) -> Option<MaterialId> {
        self.node(handle).and_then(|n| n.material)
    }

    pub fn set_label_text(&mut self, handle: NodeHandle, text: String) {
        if let Some(node) = self.node_mut_internal(handle) {
            match &mut node.kind {
                NodeKind::Label { text: current } => *current = text,
                _ => {
                    debug_assert!(false, "set_label_text on non-label node");
                }
            }
        }
    }

    /// Typed access to the instanced ground payload.
    pub fn ground_batch_mut(&mut self, handle: NodeHandle) -> Option<&mut GroundBatch> {
        match self.node_mut_internal(handle).map(|n| &mut n.kind) {
            Some(NodeKind::InstancedGround(batch)) => Some(batch),
            _ => None,
        }
    }

    pub fn ground_batch(&self, handle: NodeHandle) -> Option<&GroundBatch> {
        match self.node(handle).map(|n| &n.kind) {
            Some(NodeKind::InstancedGround(batch)) => Some(batch),
            _ => None,
        }
    }

    // ------------------------------------------------------------------
    // Materials
    // ------------------------------------------------------------------

    pub fn create_material(&mut self, material: Material) -> MaterialId {
        if let Some(index) = self.free_materials.pop() {
            self.materials[index as usize] = Some(material);
            MaterialId(index)
        } else {
            self.materials.push(Some(material));
            MaterialId((self.materials.len() - 1) as u32)
        }
    }

    /// Duplicate a material, e.g. so a selected sprite can pulse without
    /// affecting every sprite sharing the original.
    pub fn clone_material(&mut self, id: MaterialId) -> Option<MaterialId> {
        let material = self.material(id)?.clone();
        Some(self.create_material(material))
    }

    pub fn free_material(&mut self, id: MaterialId) {
        if let Some(slot) = self.materials.get_mut(id.0 as usize) {
            if slot.take().is_some() {
                self.free_materials.push(id.0);
            }
        }
    }

    pub fn material(&self, id: MaterialId) -> Option<&Material> {
        self.materials.get(id.0 as usize).and_then(|m| m.as_ref())
    }

    pub fn set_material_opacity(&mut self, id: MaterialId, opacity: f32) {
        if let Some(Some(material)) = self.materials.get_mut(id.0 as usize) {
            material.opacity = opacity;
        }
    }

    pub fn set_material_color(&mut self, id: MaterialId, color: u32) {
        if let Some(Some(material)) = self.materials.get_mut(id.0 as usize) {
            material.color = color;
        }
    }

    pub fn material_count(&self) -> usize {
        self.materials.iter().filter(|m| m.is_some()).count()
    }
}

/// Collects attach/detach intents during a visibility pass and applies them
/// in one flush. A node queued for both directions cancels out, so rapid
/// bounds changes produce a bounded set of graph mutations.
#[derive(Debug, Default)]
pub struct AttachBatch {
    adds: Vec<NodeHandle>,
    removes: Vec<NodeHandle>,
}

impl AttachBatch {
    pub fn queue_attach(&mut self, handle: NodeHandle) {
        if let Some(pos) = self.removes.iter().position(|&h| h == handle) {
            self.removes.swap_remove(pos);
            return;
        }
        if !self.adds.contains(&handle) {
            self.adds.push(handle);
        }
    }

    pub fn queue_detach(&mut self, handle: NodeHandle) {
        if let Some(pos) = self.adds.iter().position(|&h| h == handle) {
            self.adds.swap_remove(pos);
            return;
        }
        if !self.removes.contains(&handle) {
            self.removes.push(handle);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.adds.is_empty() && self.removes.is_empty()
    }

    /// Apply all queued operations against `parent` and clear the batch.
    /// Returns `(attached, detached)` counts.
    pub fn flush(&mut self, scene: &mut SceneArena, parent: NodeHandle) -> (usize, usize) {
        let attached = self.adds.len();
        let detached = self.removes.len();
        for handle in self.adds.drain(..) {
            scene.attach(parent, handle);
        }
        for handle in self.removes.drain(..) {
            scene.detach(handle);
        }
        (attached, detached)
    }
}
