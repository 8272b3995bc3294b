//! Single selection, action paths, and click dispatch.
//!
//! At most one object across all kinds is selected at a time. While an army
//! is selected the host supplies its reachable action paths; clicking a
//! path's destination emits the action instead of re-selecting. Everything
//! user-visible that happens here surfaces through the [`MapEvents`] queue.

use std::collections::{HashMap, HashSet};

use bevy_ecs::prelude::{Resource, World};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::chunks::ChunkStreamer;
use crate::components::{ObjectId, ObjectKind, ObjectRef};
use crate::coords::{ChunkKey, HexCoord, VisibleBounds};
use crate::diagnostics::MapDiagnostics;
use crate::highlight;
use crate::objects::{
    deselect_object_visual, select_object_visual, ArmyKind, ChestKind, ObjectManager, QuestKind,
    StructureKind,
};

/// What reaching a hex does. The variant decides the highlight color and
/// which side effects a destination click has.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionType {
    Move,
    Attack,
    Help,
    Explore,
    Quest,
    Build,
}

impl ActionType {
    /// Highlight tint for hexes reachable through this action.
    pub fn color(self) -> u32 {
        match self {
            ActionType::Move => 0x3fb950,
            ActionType::Attack => 0xf85149,
            ActionType::Help => 0x58a6ff,
            ActionType::Explore => 0xd29922,
            ActionType::Quest => 0xa371f7,
            ActionType::Build => 0x8b949e,
        }
    }

    /// Rank used when a hex is reachable through several actions. Lower wins.
    fn precedence(self) -> u8 {
        match self {
            ActionType::Move => 0,
            ActionType::Attack => 1,
            ActionType::Help => 2,
            ActionType::Explore => 3,
            ActionType::Quest => 4,
            ActionType::Build => 5,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ActionType::Move => "move",
            ActionType::Attack => "attack",
            ActionType::Help => "help",
            ActionType::Explore => "explore",
            ActionType::Quest => "quest",
            ActionType::Build => "build",
        }
    }
}

/// One reachable destination and the steps to it. `hexes` runs from the
/// first step to the destination and excludes the hex the selected object
/// stands on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionPath {
    pub action: ActionType,
    pub hexes: Vec<HexCoord>,
}

impl ActionPath {
    pub fn destination(&self) -> Option<HexCoord> {
        self.hexes.last().copied()
    }
}

/// Outcomes the host consumes after each call into the map.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum MapEvent {
    SelectionChanged {
        selected: Option<ObjectRef>,
    },
    /// The player clicked an action destination. The map has already cleared
    /// the selection; executing the action is the host's job.
    ActionRequested {
        object: ObjectRef,
        action: ActionType,
        path: Vec<HexCoord>,
    },
    ChunkWindowChanged {
        center: ChunkKey,
        bounds: VisibleBounds,
    },
}

/// FIFO queue of pending [`MapEvent`]s.
#[derive(Resource, Default)]
pub struct MapEvents {
    queue: Vec<MapEvent>,
}

impl MapEvents {
    pub fn push(&mut self, event: MapEvent) {
        self.queue.push(event);
    }

    pub fn drain(&mut self) -> Vec<MapEvent> {
        std::mem::take(&mut self.queue)
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

/// Selection state machine.
#[derive(Resource, Default)]
pub struct SelectionState {
    selected: Option<ObjectRef>,
    paths: Vec<ActionPath>,
    /// Destination hex to index into `paths`. First match by action
    /// precedence when two paths end on the same hex.
    by_destination: HashMap<HexCoord, usize>,
    /// Armies whose move action was submitted but not yet confirmed by the
    /// feed. Not selectable until the confirmation lands.
    pending_moves: HashSet<ObjectId>,
}

impl SelectionState {
    pub fn selected(&self) -> Option<ObjectRef> {
        self.selected
    }

    pub fn action_path(&self, destination: HexCoord) -> Option<&ActionPath> {
        self.by_destination
            .get(&destination)
            .map(|&index| &self.paths[index])
    }

    pub fn path_count(&self) -> usize {
        self.paths.len()
    }

    pub fn has_pending_move(&self, id: ObjectId) -> bool {
        self.pending_moves.contains(&id)
    }

    pub fn mark_pending_move(&mut self, id: ObjectId) {
        self.pending_moves.insert(id);
    }

    pub fn clear_pending_move(&mut self, id: ObjectId) -> bool {
        self.pending_moves.remove(&id)
    }

    fn set_paths(&mut self, paths: Vec<ActionPath>) {
        self.paths = paths;
        self.by_destination.clear();
        for (index, path) in self.paths.iter().enumerate() {
            let Some(destination) = path.destination() else {
                continue;
            };
            let replace = match self.by_destination.get(&destination) {
                Some(&held) => self.paths[held].action.precedence() > path.action.precedence(),
                None => true,
            };
            if replace {
                self.by_destination.insert(destination, index);
            }
        }
    }

    fn clear_paths(&mut self) {
        self.paths.clear();
        self.by_destination.clear();
    }

    /// Highlight entries for the current path set: every hex of every path,
    /// deduplicated, colored by that path's action with precedence deciding
    /// contested hexes.
    fn highlight_entries(&self) -> Vec<(HexCoord, u32)> {
        let mut chosen: HashMap<HexCoord, ActionType> = HashMap::new();
        for path in &self.paths {
            for &hex in &path.hexes {
                let replace = match chosen.get(&hex) {
                    Some(held) => held.precedence() > path.action.precedence(),
                    None => true,
                };
                if replace {
                    chosen.insert(hex, path.action);
                }
            }
        }
        let mut entries: Vec<(HexCoord, u32)> = chosen
            .into_iter()
            .map(|(hex, action)| (hex, action.color()))
            .collect();
        entries.sort_unstable_by_key(|&(hex, _)| (hex.row, hex.col));
        entries
    }
}

/// Queue an event and count it.
pub fn push_event(world: &mut World, event: MapEvent) {
    world.resource_mut::<MapDiagnostics>().events_emitted += 1;
    world.resource_mut::<MapEvents>().push(event);
}

/// Hand the queued events to the host.
pub fn drain_events(world: &mut World) -> Vec<MapEvent> {
    world.resource_mut::<MapEvents>().drain()
}

fn deselect_visual(world: &mut World, kind: ObjectKind) {
    match kind {
        ObjectKind::Army => deselect_object_visual::<ArmyKind>(world),
        ObjectKind::Structure => deselect_object_visual::<StructureKind>(world),
        ObjectKind::Quest => deselect_object_visual::<QuestKind>(world),
        ObjectKind::Chest => deselect_object_visual::<ChestKind>(world),
    }
}

fn select_visual(world: &mut World, target: ObjectRef) -> bool {
    match target.kind {
        ObjectKind::Army => select_object_visual::<ArmyKind>(world, target.id),
        ObjectKind::Structure => select_object_visual::<StructureKind>(world, target.id),
        ObjectKind::Quest => select_object_visual::<QuestKind>(world, target.id),
        ObjectKind::Chest => select_object_visual::<ChestKind>(world, target.id),
    }
}

/// Select `target`, clearing any prior selection through its own kind's
/// manager first. Returns false when the target is unknown, leaving nothing
/// selected.
pub fn select_object(world: &mut World, target: ObjectRef) -> bool {
    let current = world.resource::<SelectionState>().selected();
    if current == Some(target) {
        return true;
    }
    if let Some(prior) = current {
        deselect_visual(world, prior.kind);
    }
    // Paths belong to the prior selection either way.
    world.resource_mut::<SelectionState>().clear_paths();
    highlight::clear_highlights(world);

    if select_visual(world, target) {
        world.resource_mut::<SelectionState>().selected = Some(target);
        debug!(kind = target.kind.as_str(), id = target.id.0, "object selected");
        push_event(world, MapEvent::SelectionChanged { selected: Some(target) });
        true
    } else {
        world.resource_mut::<SelectionState>().selected = None;
        if current.is_some() {
            push_event(world, MapEvent::SelectionChanged { selected: None });
        }
        false
    }
}

/// Drop the selection, its visual state, and its highlights.
pub fn clear_selection(world: &mut World) {
    let current = world.resource::<SelectionState>().selected();
    if let Some(prior) = current {
        deselect_visual(world, prior.kind);
    }
    {
        let mut state = world.resource_mut::<SelectionState>();
        state.selected = None;
        state.clear_paths();
    }
    highlight::clear_highlights(world);
    if current.is_some() {
        push_event(world, MapEvent::SelectionChanged { selected: None });
    }
}

/// Replace the selected object's action paths and re-render highlights.
pub fn set_action_paths(world: &mut World, paths: Vec<ActionPath>) {
    let entries = {
        let mut state = world.resource_mut::<SelectionState>();
        state.set_paths(paths);
        state.highlight_entries()
    };
    highlight::set_highlights(world, &entries);
}

/// An army is selectable unless it is animating a move or waiting for the
/// feed to confirm a submitted one.
pub fn is_army_selectable(world: &World, id: ObjectId) -> bool {
    if world.resource::<SelectionState>().has_pending_move(id) {
        return false;
    }
    !world.resource::<ObjectManager<ArmyKind>>().is_object_moving(id)
}

fn run_action(world: &mut World, object: ObjectRef, path: ActionPath) {
    debug!(
        kind = object.kind.as_str(),
        id = object.id.0,
        action = path.action.as_str(),
        steps = path.hexes.len(),
        "action destination clicked"
    );
    if matches!(path.action, ActionType::Move | ActionType::Explore) {
        world.resource_mut::<SelectionState>().mark_pending_move(object.id);
    }
    push_event(
        world,
        MapEvent::ActionRequested {
            object,
            action: path.action,
            path: path.hexes,
        },
    );
    clear_selection(world);
}

/// Click policy for a resolved hex. An action destination wins over
/// everything; otherwise occupants are tried in army, structure, quest,
/// chest order; an empty hex clears the selection.
pub fn handle_hex_click(world: &mut World, hex: HexCoord) {
    let selected = world.resource::<SelectionState>().selected();
    if let Some(object) = selected {
        let path = world.resource::<SelectionState>().action_path(hex).cloned();
        if let Some(path) = path {
            run_action(world, object, path);
            return;
        }
    }

    let occupant = |world: &World, kind: ObjectKind| {
        world
            .resource::<ChunkStreamer>()
            .occupant(kind, hex)
            .map(|occ| occ.id)
    };

    if let Some(id) = occupant(world, ObjectKind::Army) {
        if is_army_selectable(world, id) {
            select_object(world, ObjectRef::new(ObjectKind::Army, id));
        } else {
            debug!(id = id.0, "clicked army is mid-move, selection unchanged");
        }
        return;
    }
    if let Some(id) = occupant(world, ObjectKind::Structure) {
        select_object(world, ObjectRef::new(ObjectKind::Structure, id));
        return;
    }
    if let Some(id) = occupant(world, ObjectKind::Quest) {
        select_object(world, ObjectRef::new(ObjectKind::Quest, id));
        return;
    }
    if let Some(id) = occupant(world, ObjectKind::Chest) {
        select_object(world, ObjectRef::new(ObjectKind::Chest, id));
        return;
    }
    clear_selection(world);
}
