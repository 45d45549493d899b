//! Flickering polyline tail drawn behind the pointer while it moves.
//!
//! [`FlameLine`] owns the point list; [`ribbon_mesh`] turns it into a
//! camera-facing, width-tapered strip with per-vertex colour that is rendered
//! with an unlit additive material.

use bevy::asset::RenderAssetUsages;
use bevy::mesh::{Indices, PrimitiveTopology};
use bevy::prelude::*;
use serde::{Deserialize, Serialize};

use crate::constants::flame_line as defaults;
use crate::trail::TrailState;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Reflect)]
pub struct FlameLineConfig {
    pub max_points: usize,
    pub segment_spacing: f32,
    /// Head follows the target at `clamp01(dt · smooth_speed · 2)`.
    pub smooth_speed: f32,
    pub start_width: f32,
    pub end_width: f32,
    pub head_color: LinearRgba,
    pub tail_color: LinearRgba,
}

impl Default for FlameLineConfig {
    fn default() -> Self {
        Self {
            max_points: defaults::MAX_POINTS,
            segment_spacing: defaults::SEGMENT_SPACING,
            smooth_speed: defaults::SMOOTH_SPEED,
            start_width: defaults::START_WIDTH,
            end_width: defaults::END_WIDTH,
            head_color: LinearRgba::new(1.0, 0.15, 0.0, 1.0),
            tail_color: LinearRgba::new(0.3, 0.0, 0.0, 0.0),
        }
    }
}

impl FlameLineConfig {
    fn fraction(&self, i: usize) -> f32 {
        if self.max_points <= 1 {
            0.0
        } else {
            i as f32 / (self.max_points - 1) as f32
        }
    }

    pub fn width_at(&self, i: usize) -> f32 {
        mix(self.start_width, self.end_width, self.fraction(i))
    }

    pub fn color_at(&self, i: usize) -> LinearRgba {
        let t = self.fraction(i);
        let (a, b) = (self.head_color, self.tail_color);
        LinearRgba::new(
            mix(a.red, b.red, t),
            mix(a.green, b.green, t),
            mix(a.blue, b.blue, t),
            mix(a.alpha, b.alpha, t),
        )
    }
}

fn mix(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

/// Tail state: a straight line of points trailing the head against the
/// direction of motion.
#[derive(Clone, Debug, PartialEq)]
pub struct FlameLine {
    points: Vec<Vec3>,
    previous_direction: Vec3,
    last_target: Option<Vec3>,
}

impl Default for FlameLine {
    fn default() -> Self {
        Self {
            points: Vec::new(),
            previous_direction: Vec3::NEG_Z,
            last_target: None,
        }
    }
}

impl FlameLine {
    pub fn points(&self) -> &[Vec3] {
        &self.points
    }

    /// Advance one frame. `view_axis` is the camera forward; the flicker
    /// displaces points sideways in the plane facing the camera.
    pub fn update(
        &mut self,
        config: &FlameLineConfig,
        target: Vec3,
        moving: bool,
        dt: f32,
        elapsed: f32,
        view_axis: Vec3,
    ) {
        let previous = self.last_target.replace(target).unwrap_or(target);

        if !moving {
            self.points.clear();
            self.previous_direction = Vec3::NEG_Z;
            return;
        }

        let raw = target - previous;
        let dir = if raw.length_squared() > defaults::MIN_DIRECTION_SQ {
            raw.normalize()
        } else {
            self.previous_direction
        };
        self.previous_direction = dir;

        let head_lerp = (dt * config.smooth_speed * 2.0).clamp(0.0, 1.0);
        let head = self
            .points
            .first()
            .map_or(target, |h| h.lerp(target, head_lerp));

        let n = config.max_points;
        if self.points.len() != n {
            self.points = (0..n)
                .map(|i| head - dir * config.segment_spacing * i as f32)
                .collect();
            return;
        }

        let side = dir.cross(view_axis).normalize_or_zero();
        for (i, point) in self.points.iter_mut().enumerate() {
            let wave = (elapsed * defaults::FLICKER_SPEED + i as f32 * defaults::FLICKER_PHASE).sin()
                * defaults::FLICKER_AMPLITUDE
                * (1.0 - i as f32 / n as f32);
            *point = head - dir * config.segment_spacing * i as f32 + side * wave;
        }
    }
}

/// Camera-facing strip through `points`, in the space the points are given in.
pub fn ribbon_mesh(config: &FlameLineConfig, points: &[Vec3], view_axis: Vec3) -> Mesh {
    let mut positions: Vec<[f32; 3]> = Vec::with_capacity(points.len() * 2);
    let mut colors: Vec<[f32; 4]> = Vec::with_capacity(points.len() * 2);
    let mut uvs: Vec<[f32; 2]> = Vec::with_capacity(points.len() * 2);
    let mut indices: Vec<u32> = Vec::new();
    let normal = (-view_axis).normalize_or_zero();

    for (i, p) in points.iter().enumerate() {
        let before = points[i.saturating_sub(1)];
        let after = points[(i + 1).min(points.len() - 1)];
        let tangent = (after - before).normalize_or_zero();
        let side = tangent.cross(view_axis).normalize_or_zero() * config.width_at(i) * 0.5;
        let c = config.color_at(i);
        let color = [c.red, c.green, c.blue, c.alpha];
        let v = i as f32 / (points.len().max(2) - 1) as f32;

        positions.push((*p + side).to_array());
        positions.push((*p - side).to_array());
        colors.extend([color, color]);
        uvs.extend([[0.0, v], [1.0, v]]);

        if i > 0 {
            let base = (i as u32 - 1) * 2;
            indices.extend([base, base + 1, base + 2, base + 1, base + 3, base + 2]);
        }
    }

    let normals = vec![normal.to_array(); positions.len()];
    Mesh::new(PrimitiveTopology::TriangleList, RenderAssetUsages::default())
        .with_inserted_attribute(Mesh::ATTRIBUTE_POSITION, positions)
        .with_inserted_attribute(Mesh::ATTRIBUTE_NORMAL, normals)
        .with_inserted_attribute(Mesh::ATTRIBUTE_UV_0, uvs)
        .with_inserted_attribute(Mesh::ATTRIBUTE_COLOR, colors)
        .with_inserted_indices(Indices::U32(indices))
}

/// Flame line attached to a trail entity; the ribbon is a child entity.
#[derive(Component)]
pub struct FlameTail {
    pub config: FlameLineConfig,
    pub line: FlameLine,
    pub ribbon: Entity,
    pub mesh: Handle<Mesh>,
}

pub fn ribbon_material() -> StandardMaterial {
    StandardMaterial {
        base_color: Color::WHITE,
        unlit: true,
        alpha_mode: AlphaMode::Add,
        double_sided: true,
        cull_mode: None,
        ..default()
    }
}

/// Spawn the ribbon child for a trail and return the tail component.
pub fn spawn_flame_tail(
    commands: &mut Commands,
    trail: Entity,
    config: FlameLineConfig,
    meshes: &mut Assets<Mesh>,
    materials: &mut Assets<StandardMaterial>,
) -> FlameTail {
    let mesh = meshes.add(ribbon_mesh(&config, &[], Vec3::NEG_Z));
    let ribbon = commands
        .spawn((
            Name::new("Flame Line"),
            Mesh3d(mesh.clone()),
            MeshMaterial3d(materials.add(ribbon_material())),
            Transform::default(),
            Visibility::Hidden,
        ))
        .id();
    commands.entity(trail).add_child(ribbon);
    FlameTail {
        config,
        line: FlameLine::default(),
        ribbon,
        mesh,
    }
}

/// Advance every flame tail and rebuild its ribbon.
pub fn update_flame_tails(
    time: Res<Time>,
    cameras: Query<(&Camera, &GlobalTransform)>,
    mut trails: Query<(&TrailState, &GlobalTransform, &mut FlameTail)>,
    mut ribbons: Query<&mut Visibility>,
    mut meshes: ResMut<Assets<Mesh>>,
) {
    let view_axis = cameras
        .iter()
        .filter(|(camera, _)| camera.is_active)
        .max_by_key(|(camera, _)| camera.order)
        .map(|(_, transform)| transform.forward().as_vec3())
        .unwrap_or(Vec3::NEG_Z);

    for (state, transform, mut tail) in &mut trails {
        let tail = &mut *tail;
        tail.line.update(
            &tail.config,
            state.target,
            state.motion.is_moving,
            time.delta_secs(),
            time.elapsed_secs(),
            view_axis,
        );

        let Ok(mut visibility) = ribbons.get_mut(tail.ribbon) else {
            continue;
        };
        if tail.line.points().len() < 2 {
            *visibility = Visibility::Hidden;
            continue;
        }
        *visibility = Visibility::Inherited;

        // Ribbon vertices live in the trail's local space.
        let to_local = transform.affine().inverse();
        let local: Vec<Vec3> = tail
            .line
            .points()
            .iter()
            .map(|p| to_local.transform_point3(*p))
            .collect();
        let local_axis = to_local.transform_vector3(view_axis);
        if let Some(mut mesh) = meshes.get_mut(&tail.mesh) {
            *mesh = ribbon_mesh(&tail.config, &local, local_axis);
        }
    }
}
