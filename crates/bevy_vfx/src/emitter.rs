//! CPU sprite-particle runtime.
//!
//! Every live particle is its own `Mesh3d` quad entity simulated in world
//! space. The owning [`ParticleEmitter`] keeps the authoritative particle list;
//! each particle entity only carries a [`ParticleOwner`] back-reference so
//! orphaned sprites can be swept when their emitter disappears.

use std::f32::consts::{FRAC_PI_2, TAU};

use bevy::prelude::*;

use crate::data::*;
use crate::factory::GRADIENT_BANDS;

/// Standard gravity, scaled per layer by [`EmitterConfig::gravity`].
const GRAVITY: f32 = 9.81;

/// How [`ParticleEmitter::stop`] treats particles already alive.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Reflect, serde::Serialize, serde::Deserialize)]
pub enum StopBehavior {
    /// Stop spawning and let live particles finish their lifetime.
    #[default]
    StopEmitting,
    /// Stop spawning and despawn every live particle.
    StopEmittingAndClear,
}

/// A looping, world-space emitter built from one [`EmitterConfig`].
#[derive(Component)]
pub struct ParticleEmitter {
    config: EmitterConfig,
    bands: Vec<Handle<StandardMaterial>>,
    quad: Handle<Mesh>,
    rate: f32,
    playing: bool,
    clear_requested: bool,
    time_accumulator: f32,
    distance_accumulator: f32,
    last_position: Option<Vec3>,
    particles: Vec<SpriteParticle>,
}

/// One simulated sprite.
#[derive(Clone, Debug)]
pub struct SpriteParticle {
    pub entity: Entity,
    pub position: Vec3,
    pub velocity: Vec3,
    /// Constant velocity added every frame (velocity over lifetime).
    pub drift: Vec3,
    pub age: f32,
    pub lifetime: f32,
    pub size: f32,
    band: usize,
}

/// Back-reference from a particle entity to the emitter that spawned it.
#[derive(Component, Clone, Copy, Debug)]
pub struct ParticleOwner(pub Entity);

impl ParticleEmitter {
    pub fn new(config: EmitterConfig, bands: Vec<Handle<StandardMaterial>>, quad: Handle<Mesh>) -> Self {
        Self {
            rate: config.emission_rate,
            config,
            bands,
            quad,
            playing: true,
            clear_requested: false,
            time_accumulator: 0.0,
            distance_accumulator: 0.0,
            last_position: None,
            particles: Vec::new(),
        }
    }

    /// Current rate over time. Starts at the config's `emission_rate`.
    pub fn emission_rate(&self) -> f32 {
        self.rate
    }

    pub fn set_emission_rate(&mut self, rate: f32) {
        self.rate = rate.max(0.0);
    }

    pub fn play(&mut self) {
        self.playing = true;
    }

    pub fn stop(&mut self, behavior: StopBehavior) {
        self.playing = false;
        self.time_accumulator = 0.0;
        self.distance_accumulator = 0.0;
        if behavior == StopBehavior::StopEmittingAndClear {
            self.clear_requested = true;
        }
    }

    pub fn is_emitting(&self) -> bool {
        self.playing
    }

    pub fn particle_count(&self) -> usize {
        self.particles.len()
    }

    /// Number of particles to spawn this frame given the time step and the
    /// distance the emitter travelled. Fractional remainders carry over;
    /// the result never exceeds the free capacity.
    pub fn spawn_budget(&mut self, dt: f32, travelled: f32) -> u32 {
        if !self.playing {
            return 0;
        }
        self.time_accumulator += self.rate * dt;
        self.distance_accumulator += self.config.rate_over_distance * travelled;

        let from_time = self.time_accumulator as u32;
        let from_distance = self.distance_accumulator as u32;
        self.time_accumulator -= from_time as f32;
        self.distance_accumulator -= from_distance as f32;

        let free = (self.config.max_particles as usize).saturating_sub(self.particles.len());
        (from_time + from_distance).min(free as u32)
    }

    /// Draw the initial state of one particle emitted from `origin`.
    fn sample_particle(&self, origin: Vec3, rotation: Quat, entity: Entity) -> SpriteParticle {
        let (offset, direction) = sample_shape(&self.config.shape, rotation);
        let drift = self
            .config
            .velocity_over_lifetime
            .map(|vol| match vol.space {
                VelocitySpace::Local => rotation * vol.sample(),
                VelocitySpace::World => vol.sample(),
            })
            .unwrap_or(Vec3::ZERO);
        SpriteParticle {
            entity,
            position: origin + offset,
            velocity: direction * self.config.speed.sample(),
            drift,
            age: 0.0,
            lifetime: self.config.lifetime.sample().max(1e-3),
            size: self.config.particle_size.sample(),
            band: 0,
        }
    }
}

/// Gradient band for normalized age `t`.
pub fn band_index(t: f32, bands: usize) -> usize {
    if bands == 0 {
        return 0;
    }
    ((t.clamp(0.0, 1.0) * bands as f32) as usize).min(bands - 1)
}

/// Orientation and scale of a streak facing a camera with rotation
/// `camera`, with its long (local Y) axis along the on-screen velocity.
pub fn stretch(camera: Quat, velocity: Vec3, size: f32, length_scale: f32, speed_scale: f32) -> (Quat, Vec3) {
    let length = size * length_scale + velocity.length() * speed_scale;
    let scale = Vec3::new(size, length, 1.0);
    let on_screen = (camera.inverse() * velocity).truncate();
    if on_screen.length_squared() < 1e-8 {
        return (camera, scale);
    }
    let angle = on_screen.y.atan2(on_screen.x);
    (camera * Quat::from_rotation_z(angle - FRAC_PI_2), scale)
}

// ---------------------------------------------------------------------------
// Systems
// ---------------------------------------------------------------------------

/// Apply pending clears and spawn this frame's particles.
pub fn emit_particles(
    mut commands: Commands,
    time: Res<Time>,
    mut emitters: Query<(Entity, &GlobalTransform, &mut ParticleEmitter)>,
) {
    let dt = time.delta_secs();

    for (owner, transform, mut emitter) in &mut emitters {
        if emitter.clear_requested {
            for p in emitter.particles.drain(..) {
                commands.entity(p.entity).try_despawn();
            }
            emitter.clear_requested = false;
        }

        let position = transform.translation();
        let previous = emitter.last_position.replace(position).unwrap_or(position);
        let count = emitter.spawn_budget(dt, previous.distance(position));
        if count == 0 {
            continue;
        }

        let rotation = transform.rotation();
        let quad = emitter.quad.clone();
        let Some(material) = emitter.bands.first().cloned() else {
            continue;
        };

        for _ in 0..count {
            // Spread spawns along the path travelled this frame.
            let origin = previous.lerp(position, fastrand::f32());
            let entity = commands
                .spawn((
                    ParticleOwner(owner),
                    Mesh3d(quad.clone()),
                    MeshMaterial3d(material.clone()),
                    Transform::from_translation(origin).with_scale(Vec3::ZERO),
                ))
                .id();
            let particle = emitter.sample_particle(origin, rotation, entity);
            emitter.particles.push(particle);
        }
    }
}

/// Age, move and kill particles.
pub fn simulate_particles(
    mut commands: Commands,
    time: Res<Time>,
    mut emitters: Query<&mut ParticleEmitter>,
) {
    let dt = time.delta_secs();

    for mut emitter in &mut emitters {
        let emitter = &mut *emitter;
        let gravity = Vec3::NEG_Y * GRAVITY * emitter.config.gravity;
        let noise = emitter.config.noise;

        emitter.particles.retain_mut(|p| {
            p.age += dt;
            if p.age >= p.lifetime {
                commands.entity(p.entity).try_despawn();
                return false;
            }

            p.velocity += gravity * dt;
            if let Some(noise) = noise {
                let phase = p.position * noise.frequency + Vec3::splat(noise.scroll_speed * p.age);
                let n = Vec3::new(
                    (phase.x * 12.9898 + phase.y * 78.233).sin(),
                    (phase.y * 12.9898 + phase.z * 78.233).sin(),
                    (phase.z * 12.9898 + phase.x * 78.233).sin(),
                );
                p.velocity += n * noise.strength * dt;
            }
            p.position += (p.velocity + p.drift) * dt;
            true
        });
    }
}

/// Write particle state to transforms and swap gradient bands.
pub fn sync_particles(
    cameras: Query<(&Camera, &GlobalTransform)>,
    mut emitters: Query<&mut ParticleEmitter>,
    mut sprites: Query<(&mut Transform, &mut MeshMaterial3d<StandardMaterial>), With<ParticleOwner>>,
) {
    let camera_rotation = cameras
        .iter()
        .filter(|(camera, _)| camera.is_active)
        .max_by_key(|(camera, _)| camera.order)
        .map(|(_, transform)| transform.rotation())
        .unwrap_or(Quat::IDENTITY);

    for mut emitter in &mut emitters {
        let emitter = &mut *emitter;
        let config = &emitter.config;

        for p in emitter.particles.iter_mut() {
            let Ok((mut transform, mut material)) = sprites.get_mut(p.entity) else {
                continue;
            };
            let t = p.age / p.lifetime;
            let size = p.size * config.size_over_lifetime.sample(t);

            transform.translation = p.position;
            match config.render_mode {
                RenderMode::Billboard => {
                    transform.rotation = camera_rotation;
                    transform.scale = Vec3::new(size, size, 1.0);
                }
                RenderMode::Stretch {
                    length_scale,
                    speed_scale,
                } => {
                    let (rotation, scale) =
                        stretch(camera_rotation, p.velocity + p.drift, size, length_scale, speed_scale);
                    transform.rotation = rotation;
                    transform.scale = scale;
                }
            }

            let band = band_index(t, emitter.bands.len().min(GRADIENT_BANDS));
            if band != p.band {
                if let Some(handle) = emitter.bands.get(band) {
                    material.0 = handle.clone();
                    p.band = band;
                }
            }
        }
    }
}

/// Despawn particles whose emitter no longer exists.
pub fn despawn_orphans(
    mut commands: Commands,
    particles: Query<(Entity, &ParticleOwner)>,
    emitters: Query<(), With<ParticleEmitter>>,
) {
    for (entity, owner) in &particles {
        if !emitters.contains(owner.0) {
            commands.entity(entity).try_despawn();
        }
    }
}

// ---------------------------------------------------------------------------
// Shape sampling
// ---------------------------------------------------------------------------

/// Returns `(start offset, unit direction)` in world orientation.
fn sample_shape(shape: &EmitterShape, emitter_rotation: Quat) -> (Vec3, Vec3) {
    match *shape {
        EmitterShape::Cone {
            angle,
            radius,
            rotation,
        } => {
            let local = Quat::from_euler(
                EulerRot::XYZ,
                rotation.x.to_radians(),
                rotation.y.to_radians(),
                rotation.z.to_radians(),
            );
            let orientation = emitter_rotation * local;
            let axis = orientation * Vec3::Y;

            let a = fastrand::f32() * TAU;
            let r = radius * fastrand::f32().sqrt();
            let offset = orientation * Vec3::new(a.cos() * r, 0.0, a.sin() * r);
            (offset, random_cone(axis, angle.to_radians()))
        }
        EmitterShape::Sphere { radius } => {
            let dir = random_unit_sphere();
            (dir * radius * fastrand::f32().cbrt(), dir)
        }
    }
}

fn random_unit_sphere() -> Vec3 {
    loop {
        let v = Vec3::new(
            fastrand::f32() * 2.0 - 1.0,
            fastrand::f32() * 2.0 - 1.0,
            fastrand::f32() * 2.0 - 1.0,
        );
        let len_sq = v.length_squared();
        if len_sq > 0.001 && len_sq <= 1.0 {
            return v / len_sq.sqrt();
        }
    }
}

fn random_cone(direction: Vec3, half_angle: f32) -> Vec3 {
    let dir = direction.normalize_or_zero();
    if dir.length_squared() < 0.001 {
        return random_unit_sphere();
    }

    let up = if dir.y.abs() < 0.99 { Vec3::Y } else { Vec3::X };
    let right = dir.cross(up).normalize();
    let up2 = right.cross(dir).normalize();

    let angle = fastrand::f32() * TAU;
    let cos_theta = 1.0 - fastrand::f32() * (1.0 - half_angle.cos());
    let sin_theta = (1.0 - cos_theta * cos_theta).sqrt();

    (dir * cos_theta + right * sin_theta * angle.cos() + up2 * sin_theta * angle.sin()).normalize()
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use bevy::time::TimeUpdateStrategy;

    use super::*;

    fn emitter(rate: f32, max: u32) -> ParticleEmitter {
        let config = EmitterConfig::new(
            "Embers",
            LinearRgba::WHITE,
            LinearRgba::RED,
            0.05,
            1.0,
            1.0,
            rate,
        )
        .with_max_particles(max);
        ParticleEmitter::new(config, vec![Handle::default(); GRADIENT_BANDS], Handle::default())
    }

    #[test]
    fn fractional_spawns_carry_over() {
        let mut e = emitter(10.0, 100);
        let counts: Vec<u32> = (0..4).map(|_| e.spawn_budget(0.05, 0.0)).collect();
        assert_eq!(counts, vec![0, 1, 0, 1]);
    }

    #[test]
    fn distance_emission_adds_to_time_emission() {
        let mut config = emitter(0.0, 100).config.clone();
        config.rate_over_distance = 20.0;
        let mut e = ParticleEmitter::new(config, Vec::new(), Handle::default());
        assert_eq!(e.spawn_budget(0.016, 0.5), 10);
        assert_eq!(e.spawn_budget(0.016, 0.0), 0);
    }

    #[test]
    fn budget_is_capped_by_free_capacity() {
        let mut e = emitter(1000.0, 3);
        assert_eq!(e.spawn_budget(1.0, 0.0), 3);
    }

    #[test]
    fn stopped_emitter_spawns_nothing_until_played() {
        let mut e = emitter(100.0, 100);
        e.stop(StopBehavior::StopEmitting);
        assert!(!e.is_emitting());
        assert!(!e.clear_requested);
        assert_eq!(e.spawn_budget(1.0, 0.0), 0);

        e.play();
        assert_eq!(e.spawn_budget(0.1, 0.0), 10);

        e.stop(StopBehavior::StopEmittingAndClear);
        assert!(e.clear_requested);
    }

    #[test]
    fn rate_changes_apply_and_clamp() {
        let mut e = emitter(16.0, 100);
        assert_eq!(e.emission_rate(), 16.0);
        e.set_emission_rate(-4.0);
        assert_eq!(e.emission_rate(), 0.0);
        assert_eq!(e.spawn_budget(1.0, 0.0), 0);
    }

    #[test]
    fn band_index_spans_lifetime() {
        assert_eq!(band_index(0.0, 16), 0);
        assert_eq!(band_index(0.5, 16), 8);
        assert_eq!(band_index(1.0, 16), 15);
        assert_eq!(band_index(2.0, 16), 15);
        assert_eq!(band_index(0.7, 0), 0);
    }

    #[test]
    fn stretch_aligns_long_axis_with_screen_velocity() {
        let (rotation, scale) = stretch(Quat::IDENTITY, Vec3::new(2.0, 0.0, 0.0), 0.1, 1.8, 0.5);
        assert!((rotation * Vec3::Y).abs_diff_eq(Vec3::X, 1e-5));
        assert!((scale.y - (0.18 + 1.0)).abs() < 1e-5);
        assert_eq!(scale.x, 0.1);

        // Motion straight along the view axis has no on-screen direction.
        let (rotation, _) = stretch(Quat::IDENTITY, Vec3::Z, 0.1, 1.0, 0.0);
        assert_eq!(rotation, Quat::IDENTITY);
    }

    #[test]
    fn cone_directions_stay_inside_the_rotated_cone() {
        // Pitch the cone 180° so it points down.
        let shape = EmitterShape::Cone {
            angle: 20.0,
            radius: 0.1,
            rotation: Vec3::new(180.0, 0.0, 0.0),
        };
        let min_cos = 20f32.to_radians().cos() - 1e-4;
        for _ in 0..200 {
            let (offset, dir) = sample_shape(&shape, Quat::IDENTITY);
            assert!(dir.dot(Vec3::NEG_Y) >= min_cos);
            assert!(offset.length() <= 0.1 + 1e-5);
        }
    }

    #[test]
    fn world_space_velocity_ignores_emitter_rotation() {
        let mut config = emitter(1.0, 10).config.clone();
        config.speed = ScalarRange::Constant(0.0);
        config.velocity_over_lifetime = Some(VelocityOverLifetime {
            space: VelocitySpace::World,
            x: ScalarRange::Constant(1.0),
            y: ScalarRange::Constant(0.0),
            z: ScalarRange::Constant(0.0),
        });
        let e = ParticleEmitter::new(config, Vec::new(), Handle::default());
        let p = e.sample_particle(Vec3::ZERO, Quat::from_rotation_y(FRAC_PI_2), Entity::PLACEHOLDER);
        assert!(p.drift.abs_diff_eq(Vec3::X, 1e-6));
    }

    fn runtime_app() -> App {
        let mut app = App::new();
        app.add_plugins(MinimalPlugins)
            .init_resource::<Assets<StandardMaterial>>()
            .insert_resource(TimeUpdateStrategy::ManualDuration(Duration::from_millis(100)))
            .add_systems(
                Update,
                (
                    emit_particles,
                    simulate_particles,
                    (sync_particles, despawn_orphans).chain(),
                )
                    .chain(),
            );
        app
    }

    fn spawn_emitter(app: &mut App, emitter: ParticleEmitter) -> Entity {
        app.world_mut()
            .spawn((emitter, Transform::default(), GlobalTransform::default()))
            .id()
    }

    fn counts(app: &mut App, entity: Entity) -> (usize, usize) {
        let live = app
            .world()
            .get::<ParticleEmitter>(entity)
            .map_or(0, ParticleEmitter::particle_count);
        let world = app.world_mut();
        let sprites = world.query::<&ParticleOwner>().iter(world).count();
        (live, sprites)
    }

    #[test]
    fn runtime_spawns_then_clears_sprites() {
        let mut app = runtime_app();
        let mut e = emitter(100.0, 1000);
        e.config.lifetime = ScalarRange::Constant(10.0);
        let entity = spawn_emitter(&mut app, e);

        // The first update only primes the clock.
        for _ in 0..5 {
            app.update();
        }
        assert_eq!(counts(&mut app, entity), (40, 40));

        app.world_mut()
            .get_mut::<ParticleEmitter>(entity)
            .unwrap()
            .stop(StopBehavior::StopEmittingAndClear);
        app.update();
        assert_eq!(counts(&mut app, entity), (0, 0));

        app.update();
        assert_eq!(counts(&mut app, entity), (0, 0));
    }

    #[test]
    fn stopped_particles_expire_on_their_own() {
        let mut app = runtime_app();
        let mut e = emitter(100.0, 1000);
        e.config.lifetime = ScalarRange::Constant(0.25);
        let entity = spawn_emitter(&mut app, e);

        for _ in 0..6 {
            app.update();
        }
        let (live, sprites) = counts(&mut app, entity);
        assert!(live > 0);
        assert_eq!(live, sprites);
        // Nothing outlives the 0.25 s lifetime.
        assert!(live <= 30);

        app.world_mut()
            .get_mut::<ParticleEmitter>(entity)
            .unwrap()
            .stop(StopBehavior::StopEmitting);
        app.update();
        assert!(counts(&mut app, entity).0 > 0);

        for _ in 0..3 {
            app.update();
        }
        assert_eq!(counts(&mut app, entity), (0, 0));
    }

    #[test]
    fn sprites_move_to_later_bands_as_they_age() {
        let mut app = runtime_app();
        let bands: Vec<Handle<StandardMaterial>> = {
            let mut materials = app.world_mut().resource_mut::<Assets<StandardMaterial>>();
            (0..2).map(|_| materials.add(StandardMaterial::default())).collect()
        };
        let mut config = emitter(10.0, 100).config.clone();
        config.lifetime = ScalarRange::Constant(1.0);
        let entity = spawn_emitter(
            &mut app,
            ParticleEmitter::new(config, bands.clone(), Handle::default()),
        );

        for _ in 0..8 {
            app.update();
        }
        assert_eq!(counts(&mut app, entity), (7, 7));

        let world = app.world_mut();
        let used: Vec<Handle<StandardMaterial>> = world
            .query_filtered::<&MeshMaterial3d<StandardMaterial>, With<ParticleOwner>>()
            .iter(world)
            .map(|m| m.0.clone())
            .collect();
        assert!(used.contains(&bands[0]));
        assert!(used.contains(&bands[1]));
    }

    #[test]
    fn sprites_of_a_despawned_emitter_are_swept() {
        let mut app = runtime_app();
        let entity = spawn_emitter(&mut app, emitter(100.0, 1000));
        for _ in 0..3 {
            app.update();
        }
        assert!(counts(&mut app, entity).1 > 0);

        app.world_mut().entity_mut(entity).despawn();
        app.update();
        assert_eq!(counts(&mut app, entity), (0, 0));
    }
}
