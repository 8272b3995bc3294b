//! Map tuning knobs.
//!
//! A single [`MapConfig`] resource carries every number a host may want to
//! tune: streaming radii, sprite pool capacity, and animation pacing. The
//! resource is inserted at construction and read where the value is used, so
//! changing a field on a live world takes effect on the next operation that
//! consults it. Serde derives let hosts ship the config as JSON alongside
//! their own settings.

use bevy_ecs::prelude::Resource;
use serde::{Deserialize, Serialize};

use crate::chunks::{CHUNK_LOAD_RADIUS_X, CHUNK_LOAD_RADIUS_Z};
use crate::objects::{MOVE_DURATION, PATH_STEP_DURATION, PATH_STEP_PAUSE};
use crate::tiles::POOL_SIZE;

/// Configuration for map streaming and animation pacing.
#[derive(Resource, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MapConfig {
    /// Chunks kept loaded left/right of the camera chunk.
    pub chunk_load_radius_x: i32,
    /// Chunks kept loaded above/below the camera chunk.
    pub chunk_load_radius_z: i32,
    /// Sprites preallocated per tile renderer.
    pub pool_size: usize,
    /// Seconds for a single-hop object move.
    pub move_duration: f32,
    /// Seconds per hex when walking a path.
    pub path_step_duration: f32,
    /// Pause between path steps, in seconds.
    pub path_step_pause: f32,
    /// Highlight pulse frequency scale.
    pub highlight_pulse_speed: f32,
    /// Highlight pulse amplitude, 0..1.
    pub highlight_pulse_intensity: f32,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            chunk_load_radius_x: CHUNK_LOAD_RADIUS_X, // 5x7 chunk window
            chunk_load_radius_z: CHUNK_LOAD_RADIUS_Z,
            pool_size: POOL_SIZE,
            move_duration: MOVE_DURATION,
            path_step_duration: PATH_STEP_DURATION,
            path_step_pause: PATH_STEP_PAUSE,
            highlight_pulse_speed: 2.0,
            highlight_pulse_intensity: 0.3,
        }
    }
}
