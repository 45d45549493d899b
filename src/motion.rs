//! Moving / idle classification of the tracked position.

use bevy::prelude::*;
use serde::{Deserialize, Serialize};

use crate::constants::motion;

/// Where displacement is measured.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, Reflect)]
pub enum MotionSource {
    /// Raw world-space pointer target.
    #[default]
    World,
    /// Raw pointer position in viewport pixels.
    Screen,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Reflect)]
pub struct MotionConfig {
    pub source: MotionSource,
    /// Minimum per-frame displacement that counts as movement.
    pub threshold: f32,
    /// Seconds of stillness before MOVING becomes IDLE. Zero flips on the
    /// first still sample.
    pub dwell: f32,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            source: MotionSource::World,
            threshold: motion::WORLD_THRESHOLD,
            dwell: motion::DWELL,
        }
    }
}

/// Edge reported by [`MotionState::sample`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MotionTransition {
    StartedMoving,
    BecameIdle,
}

#[derive(Clone, Copy, Debug, PartialEq, Reflect)]
pub struct MotionState {
    pub last_position: Vec3,
    /// Seconds since the last moving sample.
    pub idle_timer: f32,
    pub is_moving: bool,
}

impl MotionState {
    /// Idle at `start`.
    pub fn new(start: Vec3) -> Self {
        Self {
            last_position: start,
            idle_timer: 0.0,
            is_moving: false,
        }
    }

    /// Feed one frame's position. Returns the transition this sample caused,
    /// if any.
    pub fn sample(&mut self, config: &MotionConfig, position: Vec3, dt: f32) -> Option<MotionTransition> {
        let displacement_sq = position.distance_squared(self.last_position);
        self.last_position = position;

        if displacement_sq > config.threshold * config.threshold {
            self.idle_timer = 0.0;
            if !self.is_moving {
                self.is_moving = true;
                return Some(MotionTransition::StartedMoving);
            }
            return None;
        }

        self.idle_timer += dt;
        if self.is_moving && self.idle_timer >= config.dwell {
            self.is_moving = false;
            return Some(MotionTransition::BecameIdle);
        }
        None
    }
}
