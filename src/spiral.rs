//! Orbiting local offset for a trail layer.

use bevy::prelude::*;
use serde::{Deserialize, Serialize};

/// Moves its entity on a circle of `radius` around its parent at `speed`
/// radians per second, creeping along local Z by `height`.
#[derive(Component, Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Reflect)]
#[reflect(Component)]
pub struct SpiralMotion {
    pub radius: f32,
    pub speed: f32,
    pub height: f32,
    /// Current angle in radians.
    #[serde(skip)]
    pub angle: f32,
}

impl Default for SpiralMotion {
    fn default() -> Self {
        Self {
            radius: 1.0,
            speed: 2.0,
            height: 0.5,
            angle: 0.0,
        }
    }
}

impl SpiralMotion {
    /// Advance the angle and return the new local offset.
    pub fn advance(&mut self, dt: f32) -> Vec3 {
        self.angle += self.speed * dt;
        spiral_offset(self.angle, self.radius, self.height)
    }
}

pub fn spiral_offset(angle: f32, radius: f32, height: f32) -> Vec3 {
    Vec3::new(
        angle.cos() * radius,
        angle.sin() * radius,
        angle * height * 0.05,
    )
}

pub fn advance_spirals(time: Res<Time>, mut query: Query<(&mut SpiralMotion, &mut Transform)>) {
    let dt = time.delta_secs();
    for (mut spiral, mut transform) in &mut query {
        transform.translation = spiral.advance(dt);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    #[test]
    fn offset_follows_circle_and_creeps_along_z() {
        let p = spiral_offset(0.0, 1.0, 0.5);
        assert!(p.abs_diff_eq(Vec3::X, 1e-6));

        let p = spiral_offset(PI / 2.0, 2.0, 0.5);
        assert!(p.abs_diff_eq(Vec3::new(0.0, 2.0, PI / 2.0 * 0.025), 1e-5));
    }

    #[test]
    fn advance_accumulates_angle() {
        let mut spiral = SpiralMotion::default();
        for _ in 0..10 {
            spiral.advance(0.1);
        }
        assert!((spiral.angle - 2.0).abs() < 1e-5);
        let p = spiral.advance(0.0);
        assert!((p.truncate().length() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn system_moves_transform() {
        let mut app = App::new();
        app.add_plugins(MinimalPlugins)
            .add_systems(Update, advance_spirals);
        let entity = app
            .world_mut()
            .spawn((SpiralMotion::default(), Transform::default()))
            .id();
        app.update();
        app.update();

        let spiral = app.world().get::<SpiralMotion>(entity).unwrap();
        let transform = app.world().get::<Transform>(entity).unwrap();
        let expected = spiral_offset(spiral.angle, 1.0, 0.5);
        assert!(transform.translation.abs_diff_eq(expected, 1e-6));
    }
}
