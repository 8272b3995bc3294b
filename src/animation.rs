//! Central animation scheduler.
//!
//! Every time-based visual behavior (single-step group moves, multi-step path
//! moves, selection/highlight opacity pulses) is an explicit task advanced
//! once per frame by [`AnimationScheduler::tick`]. Owners start tasks and
//! learn about move completion from the drained completion queue; there are
//! no nested per-frame callbacks.

use crate::components::{ObjectRef, TileLayer};
use crate::coords::{HexCoord, WorldPosition};
use crate::scene::{MaterialId, NodeHandle, SceneArena};
use bevy_ecs::prelude::*;
use std::collections::HashMap;
use std::f32::consts::PI;

/// Vertical hop amplitude for path steps, as a fraction of the step.
const PATH_ARC_HEIGHT: f32 = 0.1;

/// Wall-clock frame time, advanced once per `step(dt)` call.
#[derive(Resource, Debug, Default, Clone, Copy)]
pub struct FrameClock {
    /// Seconds since the map world was created.
    pub elapsed: f32,
    /// Seconds covered by the current frame.
    pub delta: f32,
    pub frame: u64,
}

impl FrameClock {
    pub fn advance(&mut self, dt: f32) {
        self.delta = dt;
        self.elapsed += dt;
        self.frame += 1;
    }
}

/// Identifier for a scheduled task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskId(u64);

/// Easing curves used by the map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Easing {
    Linear,
    /// Decelerating arrival for single-step moves.
    CubicOut,
    /// Symmetric acceleration for path steps.
    QuadInOut,
}

impl Easing {
    pub fn apply(&self, t: f32) -> f32 {
        let t = t.clamp(0.0, 1.0);
        match self {
            Easing::Linear => t,
            Easing::CubicOut => 1.0 - (1.0 - t).powi(3),
            Easing::QuadInOut => {
                if t < 0.5 {
                    2.0 * t * t
                } else {
                    1.0 - (-2.0 * t + 2.0).powi(2) / 2.0
                }
            }
        }
    }
}

/// Payload delivered when a move (single or path) finishes. The facade
/// routes it to the owning tile renderer (map re-key) and object manager
/// (position commit).
#[derive(Debug, Clone, PartialEq)]
pub struct MoveCompletion {
    pub layer: TileLayer,
    pub from: HexCoord,
    pub to: HexCoord,
    pub object: Option<ObjectRef>,
}

#[derive(Debug, Clone)]
enum PathPhase {
    Stepping { segment: usize },
    Pausing { next_segment: usize },
}

#[derive(Debug, Clone)]
enum TaskKind {
    Move {
        node: NodeHandle,
        from: WorldPosition,
        to: WorldPosition,
        easing: Easing,
        completion: MoveCompletion,
    },
    PathMove {
        node: NodeHandle,
        points: Vec<WorldPosition>,
        phase: PathPhase,
        step_duration: f32,
        pause: f32,
        completion: MoveCompletion,
    },
    Pulse {
        material: MaterialId,
        speed: f32,
        intensity: f32,
    },
    TintPulse {
        material: MaterialId,
        base_color: u32,
        speed: f32,
        intensity: f32,
    },
}

#[derive(Debug, Clone)]
struct AnimationTask {
    /// Elapsed-time stamp when the current phase began.
    phase_started: f32,
    /// Duration of the current phase (step duration while stepping).
    duration: f32,
    kind: TaskKind,
}

/// Resource owning all in-flight animation tasks.
#[derive(Resource, Default)]
pub struct AnimationScheduler {
    tasks: HashMap<u64, AnimationTask>,
    finished: Vec<MoveCompletion>,
    next_id: u64,
    now: f32,
}

impl AnimationScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate(&mut self, task: AnimationTask) -> TaskId {
        let id = self.next_id;
        self.next_id += 1;
        self.tasks.insert(id, task);
        TaskId(id)
    }

    /// Start an eased translation of `node` from `from` to `to`.
    pub fn start_move(
        &mut self,
        node: NodeHandle,
        from: WorldPosition,
        to: WorldPosition,
        duration: f32,
        easing: Easing,
        completion: MoveCompletion,
    ) -> TaskId {
        self.allocate(AnimationTask {
            phase_started: self.now,
            duration,
            kind: TaskKind::Move {
                node,
                from,
                to,
                easing,
                completion,
            },
        })
    }

    /// Start a strict step sequence along `points` (at least two entries),
    /// with a short rest between steps and a hop arc within each step.
    pub fn start_path(
        &mut self,
        node: NodeHandle,
        points: Vec<WorldPosition>,
        step_duration: f32,
        pause: f32,
        completion: MoveCompletion,
    ) -> TaskId {
        debug_assert!(points.len() >= 2, "path move needs at least two points");
        self.allocate(AnimationTask {
            phase_started: self.now,
            duration: step_duration,
            kind: TaskKind::PathMove {
                node,
                points,
                phase: PathPhase::Stepping { segment: 0 },
                step_duration,
                pause,
                completion,
            },
        })
    }

    /// Start a looping opacity pulse on `material`. Runs until cancelled.
    pub fn start_pulse(&mut self, material: MaterialId, speed: f32, intensity: f32) -> TaskId {
        self.allocate(AnimationTask {
            phase_started: self.now,
            duration: f32::INFINITY,
            kind: TaskKind::Pulse {
                material,
                speed,
                intensity,
            },
        })
    }

    /// Start a looping brightness pulse that scales `base_color`. Used by
    /// highlight materials, which keep a constant opacity.
    pub fn start_tint_pulse(
        &mut self,
        material: MaterialId,
        base_color: u32,
        speed: f32,
        intensity: f32,
    ) -> TaskId {
        self.allocate(AnimationTask {
            phase_started: self.now,
            duration: f32::INFINITY,
            kind: TaskKind::TintPulse {
                material,
                base_color,
                speed,
                intensity,
            },
        })
    }

    /// Drop a task. Returns whether it existed. Cancelling does not emit a
    /// completion and does not restore any visual state.
    pub fn cancel(&mut self, id: TaskId) -> bool {
        self.tasks.remove(&id.0).is_some()
    }

    pub fn active_tasks(&self) -> usize {
        self.tasks.len()
    }

    /// Elapsed time of the most recent tick, the shared frame clock.
    pub fn now(&self) -> f32 {
        self.now
    }

    /// Completions produced since the last drain, in completion order.
    pub fn take_finished(&mut self) -> Vec<MoveCompletion> {
        std::mem::take(&mut self.finished)
    }

    /// Advance every task to `elapsed` and apply node/material mutations.
    pub fn tick(&mut self, elapsed: f32, scene: &mut SceneArena) {
        self.now = elapsed;
        let mut done: Vec<u64> = Vec::new();

        for (&id, task) in self.tasks.iter_mut() {
            match &mut task.kind {
                TaskKind::Move {
                    node,
                    from,
                    to,
                    easing,
                    completion,
                } => {
                    let t = phase_progress(elapsed, task.phase_started, task.duration);
                    let eased = easing.apply(t);
                    scene.set_local_position(*node, from.lerp(to, eased));
                    if t >= 1.0 {
                        scene.set_local_position(*node, *to);
                        self.finished.push(completion.clone());
                        done.push(id);
                    }
                }
                TaskKind::PathMove {
                    node,
                    points,
                    phase,
                    step_duration,
                    pause,
                    completion,
                } => {
                    match phase {
                        PathPhase::Stepping { segment } => {
                            let t = phase_progress(elapsed, task.phase_started, task.duration);
                            let eased = Easing::QuadInOut.apply(t);
                            let from = points[*segment];
                            let to = points[*segment + 1];
                            let mut pos = from.lerp(&to, eased);
                            pos.y += (PI * t).sin() * PATH_ARC_HEIGHT;
                            scene.set_local_position(*node, pos);
                            if t >= 1.0 {
                                scene.set_local_position(*node, to);
                                if *segment + 2 >= points.len() {
                                    self.finished.push(completion.clone());
                                    done.push(id);
                                } else if *pause > 0.0 {
                                    *phase = PathPhase::Pausing {
                                        next_segment: *segment + 1,
                                    };
                                    task.phase_started = elapsed;
                                    task.duration = *pause;
                                } else {
                                    *phase = PathPhase::Stepping {
                                        segment: *segment + 1,
                                    };
                                    task.phase_started = elapsed;
                                    task.duration = *step_duration;
                                }
                            }
                        }
                        PathPhase::Pausing { next_segment } => {
                            if elapsed - task.phase_started >= task.duration {
                                *phase = PathPhase::Stepping {
                                    segment: *next_segment,
                                };
                                task.phase_started = elapsed;
                                task.duration = *step_duration;
                            }
                        }
                    }
                }
                TaskKind::Pulse {
                    material,
                    speed,
                    intensity,
                } => {
                    let t = elapsed - task.phase_started;
                    let opacity = (t * *speed * PI).sin() * *intensity + (1.0 - *intensity);
                    scene.set_material_opacity(*material, opacity);
                }
                TaskKind::TintPulse {
                    material,
                    base_color,
                    speed,
                    intensity,
                } => {
                    let t = elapsed - task.phase_started;
                    let pulse = (t * *speed * PI).sin() * *intensity + (1.0 - *intensity);
                    scene.set_material_color(*material, scale_color(*base_color, pulse));
                }
            }
        }

        for id in done {
            self.tasks.remove(&id);
        }
    }
}

#[inline]
fn phase_progress(elapsed: f32, started: f32, duration: f32) -> f32 {
    if duration <= f32::EPSILON {
        1.0
    } else {
        ((elapsed - started) / duration).clamp(0.0, 1.0)
    }
}

/// Scale each 0xRRGGBB channel by `factor` (clamped to [0, 1]).
fn scale_color(color: u32, factor: f32) -> u32 {
    let factor = factor.clamp(0.0, 1.0);
    let r = (((color >> 16) & 0xff) as f32 * factor) as u32;
    let g = (((color >> 8) & 0xff) as f32 * factor) as u32;
    let b = ((color & 0xff) as f32 * factor) as u32;
    (r << 16) | (g << 8) | b
}

/// Per-frame system: advance all animation tasks.
pub fn animation_tick_system(
    clock: Res<FrameClock>,
    mut scheduler: ResMut<AnimationScheduler>,
    mut scene: ResMut<SceneArena>,
) {
    scheduler.tick(clock.elapsed, &mut scene);
}
