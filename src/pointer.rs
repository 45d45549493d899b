//! Pointer → world projection.
//!
//! Engine state for one frame is gathered into a [`FrameContext`]; the view
//! and the collider scene are reached through the [`ViewProjector`] and
//! [`SceneRaycaster`] traits so the projection math runs without an `App`.

use avian3d::prelude::{SpatialQuery, SpatialQueryFilter};
use bevy::prelude::*;
use serde::{Deserialize, Serialize};

use crate::constants::projection;

/// Projection family of the active camera.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ProjectionKind {
    Orthographic { near: f32 },
    Perspective,
}

/// A camera view that can turn a viewport coordinate into a world ray.
pub trait ViewProjector {
    fn viewport_ray(&self, pointer: Vec2) -> Option<Ray3d>;
    /// Camera position.
    fn origin(&self) -> Vec3;
    /// Unit view direction.
    fn forward(&self) -> Vec3;
    fn projection_kind(&self) -> ProjectionKind;
}

/// Casts rays against scene geometry, returning the distance to the first hit.
pub trait SceneRaycaster {
    fn cast(&self, ray: Ray3d, max_distance: f32) -> Option<f32>;
}

/// Per-frame engine state consumed by the tracker and classifier.
#[derive(Clone, Copy, Default)]
pub struct FrameContext<'a> {
    pub delta_secs: f32,
    /// Pointer in viewport pixels, `None` when outside the window.
    pub pointer: Option<Vec2>,
    pub view: Option<&'a dyn ViewProjector>,
    pub raycaster: Option<&'a dyn SceneRaycaster>,
}

/// How the pointer is placed in the world.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, Reflect)]
pub enum ProjectionMode {
    /// Fixed depth in front of the camera.
    #[default]
    ScreenDepth,
    /// First collider hit, then the reference plane, then fixed depth.
    Raycast,
}

impl ProjectionMode {
    pub const ALL: [Self; 2] = [Self::ScreenDepth, Self::Raycast];

    pub fn next(self) -> Self {
        match self {
            Self::ScreenDepth => Self::Raycast,
            Self::Raycast => Self::ScreenDepth,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::ScreenDepth => "Screen depth",
            Self::Raycast => "Raycast",
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Reflect)]
pub struct PointerProjection {
    pub mode: ProjectionMode,
    /// Added to the near plane distance for orthographic cameras.
    pub z_offset: f32,
    /// Projection distance for perspective cameras.
    pub perspective_depth: f32,
    /// Height of the horizontal fallback plane (raycast mode).
    pub plane_height: f32,
    pub max_distance: f32,
}

impl Default for PointerProjection {
    fn default() -> Self {
        Self {
            mode: ProjectionMode::ScreenDepth,
            z_offset: projection::ORTHO_Z_OFFSET,
            perspective_depth: projection::PERSPECTIVE_DEPTH,
            plane_height: projection::PLANE_HEIGHT,
            max_distance: projection::MAX_RAY_DISTANCE,
        }
    }
}

impl PointerProjection {
    /// Depth of the projection plane in front of the camera.
    pub fn depth(&self, kind: ProjectionKind) -> f32 {
        match kind {
            ProjectionKind::Orthographic { near } => near + self.z_offset,
            ProjectionKind::Perspective => self.perspective_depth,
        }
    }
}

/// World position under the pointer, or `None` when there is no pointer or
/// no camera this frame.
pub fn resolve_pointer(ctx: &FrameContext, settings: &PointerProjection) -> Option<Vec3> {
    let pointer = ctx.pointer?;
    let view = ctx.view?;
    let ray = view.viewport_ray(pointer)?;

    if settings.mode == ProjectionMode::Raycast {
        if let Some(distance) = ctx
            .raycaster
            .and_then(|r| r.cast(ray, settings.max_distance))
        {
            return Some(ray.get_point(distance));
        }
        if let Some(point) = intersect_horizontal(ray, settings.plane_height, settings.max_distance) {
            return Some(point);
        }
    }

    let depth = settings.depth(view.projection_kind());
    let forward = view.forward();
    intersect_facing_plane(ray, view.origin() + forward * depth, forward)
}

/// Intersect `ray` with the plane through `point` whose normal is `normal`.
fn intersect_facing_plane(ray: Ray3d, point: Vec3, normal: Vec3) -> Option<Vec3> {
    let denom = ray.direction.dot(normal);
    if denom.abs() < 1e-6 {
        return None;
    }
    let t = (point - ray.origin).dot(normal) / denom;
    Some(ray.get_point(t))
}

/// Intersect `ray` with `y = height`, ahead of the origin and within range.
fn intersect_horizontal(ray: Ray3d, height: f32, max_distance: f32) -> Option<Vec3> {
    let dy = ray.direction.y;
    if dy.abs() < 1e-6 {
        return None;
    }
    let t = (height - ray.origin.y) / dy;
    (t > 0.0 && t <= max_distance).then(|| ray.get_point(t))
}

// ---------------------------------------------------------------------------
// Engine adapters
// ---------------------------------------------------------------------------

/// A Bevy camera as a [`ViewProjector`].
pub struct CameraView<'a> {
    pub camera: &'a Camera,
    pub transform: &'a GlobalTransform,
    pub projection: &'a Projection,
}

impl ViewProjector for CameraView<'_> {
    fn viewport_ray(&self, pointer: Vec2) -> Option<Ray3d> {
        self.camera.viewport_to_world(self.transform, pointer).ok()
    }

    fn origin(&self) -> Vec3 {
        self.transform.translation()
    }

    fn forward(&self) -> Vec3 {
        self.transform.forward().as_vec3()
    }

    fn projection_kind(&self) -> ProjectionKind {
        match self.projection {
            Projection::Orthographic(ortho) => ProjectionKind::Orthographic { near: ortho.near },
            _ => ProjectionKind::Perspective,
        }
    }
}

/// Pick the active camera with the highest render order.
pub fn active_camera<'a>(
    cameras: impl IntoIterator<Item = (&'a Camera, &'a GlobalTransform, &'a Projection)>,
) -> Option<CameraView<'a>> {
    cameras
        .into_iter()
        .filter(|(camera, ..)| camera.is_active)
        .max_by_key(|(camera, ..)| camera.order)
        .map(|(camera, transform, projection)| CameraView {
            camera,
            transform,
            projection,
        })
}

/// avian3d colliders as a [`SceneRaycaster`].
pub struct ColliderRaycaster<'a, 'w, 's> {
    pub spatial: &'a SpatialQuery<'w, 's>,
    pub filter: SpatialQueryFilter,
}

impl SceneRaycaster for ColliderRaycaster<'_, '_, '_> {
    fn cast(&self, ray: Ray3d, max_distance: f32) -> Option<f32> {
        self.spatial
            .cast_ray(ray.origin, ray.direction, max_distance, true, &self.filter)
            .map(|hit| hit.distance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Camera at `origin` looking down -Z. Orthographic rays are parallel and
    /// start at the camera plane; perspective rays fan out from the origin.
    struct FakeView {
        origin: Vec3,
        forward: Vec3,
        kind: ProjectionKind,
    }

    impl FakeView {
        fn looking_down_z(kind: ProjectionKind) -> Self {
            Self {
                origin: Vec3::new(0.0, 0.0, 10.0),
                forward: Vec3::NEG_Z,
                kind,
            }
        }
    }

    impl ViewProjector for FakeView {
        fn viewport_ray(&self, pointer: Vec2) -> Option<Ray3d> {
            let offset = Vec3::new(pointer.x, pointer.y, 0.0) * 0.01;
            let (origin, dir) = match self.kind {
                ProjectionKind::Orthographic { .. } => (self.origin + offset, self.forward),
                ProjectionKind::Perspective => (self.origin, self.forward + offset),
            };
            Dir3::new(dir).ok().map(|d| Ray3d::new(origin, d))
        }

        fn origin(&self) -> Vec3 {
            self.origin
        }

        fn forward(&self) -> Vec3 {
            self.forward
        }

        fn projection_kind(&self) -> ProjectionKind {
            self.kind
        }
    }

    struct FixedHit(Option<f32>);

    impl SceneRaycaster for FixedHit {
        fn cast(&self, _ray: Ray3d, max_distance: f32) -> Option<f32> {
            self.0.filter(|d| *d <= max_distance)
        }
    }

    fn ctx<'a>(view: &'a dyn ViewProjector, pointer: Vec2) -> FrameContext<'a> {
        FrameContext {
            delta_secs: 1.0 / 60.0,
            pointer: Some(pointer),
            view: Some(view),
            ..default()
        }
    }

    #[test]
    fn orthographic_projects_just_past_near_plane() {
        let view = FakeView::looking_down_z(ProjectionKind::Orthographic { near: 0.0 });
        let p = resolve_pointer(&ctx(&view, Vec2::new(100.0, 50.0)), &PointerProjection::default()).unwrap();
        assert!(p.abs_diff_eq(Vec3::new(1.0, 0.5, 9.9), 1e-5));
    }

    #[test]
    fn perspective_projects_onto_fixed_depth_plane() {
        let view = FakeView::looking_down_z(ProjectionKind::Perspective);
        let settings = PointerProjection::default();

        let center = resolve_pointer(&ctx(&view, Vec2::ZERO), &settings).unwrap();
        assert!(center.abs_diff_eq(Vec3::ZERO, 1e-5));

        let off = resolve_pointer(&ctx(&view, Vec2::new(30.0, -20.0)), &settings).unwrap();
        assert!(((off - view.origin).dot(view.forward) - 10.0).abs() < 1e-4);
        assert!(off.x > 0.0 && off.y < 0.0);
    }

    #[test]
    fn raycast_prefers_collider_hit() {
        let view = FakeView::looking_down_z(ProjectionKind::Perspective);
        let hit = FixedHit(Some(3.0));
        let frame = FrameContext {
            raycaster: Some(&hit),
            ..ctx(&view, Vec2::ZERO)
        };
        let settings = PointerProjection {
            mode: ProjectionMode::Raycast,
            ..default()
        };
        let p = resolve_pointer(&frame, &settings).unwrap();
        assert!(p.abs_diff_eq(Vec3::new(0.0, 0.0, 7.0), 1e-5));
    }

    #[test]
    fn raycast_miss_falls_back_to_plane_then_depth() {
        // Camera above the ground looking down and forward.
        let view = FakeView {
            origin: Vec3::new(0.0, 5.0, 0.0),
            forward: Vec3::new(0.0, -1.0, -1.0).normalize(),
            kind: ProjectionKind::Perspective,
        };
        let miss = FixedHit(None);
        let settings = PointerProjection {
            mode: ProjectionMode::Raycast,
            plane_height: 1.0,
            ..default()
        };
        let frame = FrameContext {
            raycaster: Some(&miss),
            ..ctx(&view, Vec2::ZERO)
        };
        let on_plane = resolve_pointer(&frame, &settings).unwrap();
        assert!(on_plane.abs_diff_eq(Vec3::new(0.0, 1.0, -4.0), 1e-4));

        // Looking up: the plane is behind the camera, so use the fixed depth.
        let up = FakeView {
            forward: Vec3::new(0.0, 1.0, -1.0).normalize(),
            ..view
        };
        let frame = FrameContext {
            raycaster: Some(&miss),
            ..ctx(&up, Vec2::ZERO)
        };
        let p = resolve_pointer(&frame, &settings).unwrap();
        assert!((p.distance(up.origin) - 10.0).abs() < 1e-4);
    }

    #[test]
    fn missing_pointer_or_camera_is_a_no_op() {
        let view = FakeView::looking_down_z(ProjectionKind::Perspective);
        let settings = PointerProjection::default();

        let no_pointer = FrameContext {
            pointer: None,
            ..ctx(&view, Vec2::ZERO)
        };
        assert_eq!(resolve_pointer(&no_pointer, &settings), None);

        let no_camera = FrameContext {
            pointer: Some(Vec2::ZERO),
            ..default()
        };
        assert_eq!(resolve_pointer(&no_camera, &settings), None);
    }

    #[test]
    fn projection_mode_cycles() {
        assert_eq!(ProjectionMode::ScreenDepth.next(), ProjectionMode::Raycast);
        assert_eq!(ProjectionMode::Raycast.next(), ProjectionMode::ScreenDepth);
    }
}
