//! Shared default values for the trail effect.

/// Pointer → world projection defaults
pub mod projection {
    /// Distance in front of the near plane for orthographic cameras
    pub const ORTHO_Z_OFFSET: f32 = 0.1;
    /// Projection depth for perspective cameras
    pub const PERSPECTIVE_DEPTH: f32 = 10.0;
    /// Height of the horizontal fallback plane in raycast mode
    pub const PLANE_HEIGHT: f32 = 0.0;
    /// Maximum collider raycast distance
    pub const MAX_RAY_DISTANCE: f32 = 1000.0;
}

/// Motion classification defaults
pub mod motion {
    /// World units a target must move in one frame to count as moving
    pub const WORLD_THRESHOLD: f32 = 0.01;
    /// Pixels the pointer must move in one frame to count as moving.
    /// Below one so a single-pixel step still counts.
    pub const SCREEN_THRESHOLD: f32 = 0.5;
    /// Seconds of stillness before the trail is considered idle
    pub const DWELL: f32 = 0.4;
}

/// Emission fade defaults
pub mod fade {
    /// Seconds over which emission decays to zero once still
    pub const WINDOW: f32 = 0.4;
}

/// Effect transform smoothing
pub mod follow {
    /// Lerp speed toward the pointer target (0 snaps)
    pub const SPEED: f32 = 15.0;
}

/// Flame line tail defaults
pub mod flame_line {
    pub const MAX_POINTS: usize = 5;
    pub const SEGMENT_SPACING: f32 = 0.08;
    pub const SMOOTH_SPEED: f32 = 14.0;
    pub const START_WIDTH: f32 = 0.09;
    pub const END_WIDTH: f32 = 0.02;
    /// Flicker angular speed (radians per second)
    pub const FLICKER_SPEED: f32 = 25.0;
    /// Flicker phase step between consecutive points
    pub const FLICKER_PHASE: f32 = 0.5;
    /// Flicker amplitude at the head
    pub const FLICKER_AMPLITUDE: f32 = 0.02;
    /// Squared displacement below which the previous direction is reused
    pub const MIN_DIRECTION_SQ: f32 = 1e-6;
}
