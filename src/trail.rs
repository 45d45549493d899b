//! The cursor trail controller.
//!
//! A [`CursorTrail`] entity owns one emitter child per preset layer. Every
//! frame the pointer is projected into the world, the motion classifier is
//! sampled, and each layer's rate and playback are driven from the result.

use avian3d::prelude::{SpatialQuery, SpatialQueryFilter};
use bevy::prelude::*;
use bevy::window::PrimaryWindow;
use bevy_vfx::{LayerAssets, ParticleEmitter, VfxAssetCache, spawn_layer};

use crate::fader::{LayerFade, Playback, drive};
use crate::flame_line::{FlameTail, spawn_flame_tail};
use crate::motion::{MotionSource, MotionState, MotionTransition};
use crate::pointer::{
    ColliderRaycaster, FrameContext, PointerProjection, SceneRaycaster, ViewProjector, active_camera,
    resolve_pointer,
};
use crate::presets::TrailPreset;

/// Per-frame ordering of the trail controller. Runs before the particle
/// runtime so emitters see this frame's rates.
#[derive(SystemSet, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrailSet {
    /// Spawn or rebuild layers for new and changed trails
    Build,
    /// Project the pointer and move the trail
    Track,
    /// Sample the motion classifier
    Classify,
    /// Apply rates and playback to the emitters
    Emit,
}

/// A pointer-following particle trail.
#[derive(Component, Clone, Debug, PartialEq)]
#[require(Transform, Visibility)]
pub struct CursorTrail {
    pub preset: TrailPreset,
    /// Multiplier on every layer's base rate.
    pub emission_scale: f32,
    pub projection: PointerProjection,
}

impl CursorTrail {
    pub fn new(preset: TrailPreset) -> Self {
        Self {
            preset,
            emission_scale: 1.0,
            projection: PointerProjection::default(),
        }
    }

    pub fn with_projection(mut self, projection: PointerProjection) -> Self {
        self.projection = projection;
        self
    }
}

/// An emitter child and the fade parameters it is driven with.
#[derive(Clone, Copy, Debug)]
pub struct TrailLayer {
    pub entity: Entity,
    pub fade: LayerFade,
}

/// Runtime state of a [`CursorTrail`]. Never persisted.
#[derive(Component, Debug)]
pub struct TrailState {
    /// Latest world position under the pointer.
    pub target: Vec3,
    /// Latest pointer position in viewport pixels.
    pub screen: Option<Vec2>,
    pub motion: MotionState,
    /// Transition caused by this frame's sample.
    pub transition: Option<MotionTransition>,
    pub layers: Vec<TrailLayer>,
    /// Preset the current layers were built from.
    built: TrailPreset,
    /// Source of the last classifier sample. A new source re-primes the
    /// classifier with its first position.
    sampled_from: Option<MotionSource>,
}

impl TrailState {
    fn new(start: Vec3, built: TrailPreset) -> Self {
        Self {
            target: start,
            screen: None,
            motion: MotionState::new(start),
            transition: None,
            layers: Vec::new(),
            built,
            sampled_from: None,
        }
    }

    /// Feed this frame's position to the classifier. Frames where the
    /// position is unknown re-feed the last sample and count as still.
    pub fn classify(&mut self, preset: &TrailPreset, dt: f32) -> Option<MotionTransition> {
        let sample = match preset.motion.source {
            MotionSource::World => Some(self.target),
            MotionSource::Screen => self.screen.map(|p| p.extend(0.0)),
        };

        let source = preset.motion.source;
        let position = match sample {
            Some(p) if self.sampled_from != Some(source) => {
                self.sampled_from = Some(source);
                self.motion.last_position = p;
                p
            }
            Some(p) => p,
            None => self.motion.last_position,
        };

        self.transition = self.motion.sample(&preset.motion, position, dt);
        self.transition
    }
}

/// `lerp(current, target, clamp01(dt · speed))`; a speed of zero snaps.
pub fn follow(current: Vec3, target: Vec3, speed: f32, dt: f32) -> Vec3 {
    if speed <= 0.0 {
        return target;
    }
    current.lerp(target, (dt * speed).clamp(0.0, 1.0))
}

/// Spawn the layers of new trails and rebuild trails whose preset changed.
pub(crate) fn build_trail_layers(
    mut commands: Commands,
    mut trails: Query<
        (Entity, &CursorTrail, &Transform, Option<&mut TrailState>, Option<&FlameTail>),
        Changed<CursorTrail>,
    >,
    mut images: ResMut<Assets<Image>>,
    mut materials: ResMut<Assets<StandardMaterial>>,
    mut meshes: ResMut<Assets<Mesh>>,
    mut cache: ResMut<VfxAssetCache>,
) {
    for (entity, trail, transform, mut state, flame) in &mut trails {
        let preset = &trail.preset;
        if state.as_ref().is_some_and(|s| s.built == *preset) {
            continue;
        }

        if let Some(state) = state.as_mut() {
            for layer in state.layers.drain(..) {
                commands.entity(layer.entity).try_despawn();
            }
        }
        if let Some(flame) = flame {
            commands.entity(flame.ribbon).try_despawn();
            commands.entity(entity).remove::<FlameTail>();
        }

        let mut assets = LayerAssets {
            images: &mut images,
            materials: &mut materials,
            meshes: &mut meshes,
            cache: &mut cache,
        };
        let playing = preset.starts_playing() || state.as_ref().is_some_and(|s| s.motion.is_moving);
        let mut layers = Vec::with_capacity(preset.layers.len());
        for spec in &preset.layers {
            match spawn_layer(&mut commands, entity, spec.emitter.clone(), &mut assets, playing) {
                Ok(layer) => {
                    if let Some(orbit) = spec.orbit {
                        commands.entity(layer).insert(orbit);
                    }
                    layers.push(TrailLayer {
                        entity: layer,
                        fade: spec.fade,
                    });
                }
                Err(e) => warn!("Skipping layer of '{}': {}", preset.name, e),
            }
        }

        if let Some(config) = preset.flame_line {
            let tail = spawn_flame_tail(&mut commands, entity, config, assets.meshes, assets.materials);
            commands.entity(entity).insert(tail);
        }

        info!("Built trail '{}' with {} layers", preset.name, layers.len());
        match state {
            Some(mut state) => {
                state.built = preset.clone();
                state.layers = layers;
            }
            None => {
                let mut state = TrailState::new(transform.translation, preset.clone());
                state.layers = layers;
                commands.entity(entity).insert(state);
            }
        }
    }
}

/// Project the pointer into the world and ease each trail toward it.
pub(crate) fn track_pointer(
    time: Res<Time>,
    windows: Query<&Window, With<PrimaryWindow>>,
    cameras: Query<(&Camera, &GlobalTransform, &Projection)>,
    spatial: Option<SpatialQuery>,
    mut trails: Query<(&CursorTrail, &mut TrailState, &mut Transform)>,
) {
    let pointer = windows.single().ok().and_then(Window::cursor_position);
    let view = active_camera(&cameras);
    let raycaster = spatial.as_ref().map(|spatial| ColliderRaycaster {
        spatial,
        filter: SpatialQueryFilter::default(),
    });

    let ctx = FrameContext {
        delta_secs: time.delta_secs(),
        pointer,
        view: view.as_ref().map(|v| v as &dyn ViewProjector),
        raycaster: raycaster.as_ref().map(|r| r as &dyn SceneRaycaster),
    };

    for (trail, mut state, mut transform) in &mut trails {
        state.screen = ctx.pointer.or(state.screen);
        match resolve_pointer(&ctx, &trail.projection) {
            Some(target) => state.target = target,
            None => trace!("No pointer or camera this frame, keeping trail target"),
        }
        transform.translation = follow(
            transform.translation,
            state.target,
            trail.preset.follow_speed,
            ctx.delta_secs,
        );
    }
}

pub(crate) fn classify_motion(time: Res<Time>, mut trails: Query<(&CursorTrail, &mut TrailState)>) {
    let dt = time.delta_secs();
    for (trail, mut state) in &mut trails {
        if let Some(transition) = state.classify(&trail.preset, dt) {
            debug!("Trail '{}': {:?}", trail.preset.name, transition);
        }
    }
}

/// Apply the fader or gate to every layer emitter.
pub(crate) fn drive_emission(
    trails: Query<(&CursorTrail, &TrailState)>,
    mut emitters: Query<&mut ParticleEmitter>,
) {
    for (trail, state) in &trails {
        for layer in &state.layers {
            let Ok(mut emitter) = emitters.get_mut(layer.entity) else {
                continue;
            };
            let command = drive(
                &trail.preset.emission,
                &layer.fade,
                trail.emission_scale,
                state.motion.idle_timer,
                state.transition,
                emitter.is_emitting(),
            );
            if let Some(rate) = command.rate
                && emitter.emission_rate() != rate
            {
                emitter.set_emission_rate(rate);
            }
            match command.playback {
                Some(Playback::Play) => emitter.play(),
                Some(Playback::Stop(behavior)) => emitter.stop(behavior),
                None => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::motion::MotionConfig;
    use crate::presets::TrailLibrary;
    use bevy_vfx::StopBehavior;

    fn preset(name: &str) -> TrailPreset {
        TrailLibrary::with_builtins().get(name).cloned().unwrap()
    }

    fn app() -> App {
        let mut app = App::new();
        app.add_plugins(MinimalPlugins)
            .init_resource::<Assets<Image>>()
            .init_resource::<Assets<StandardMaterial>>()
            .init_resource::<Assets<Mesh>>()
            .init_resource::<VfxAssetCache>()
            .configure_sets(
                Update,
                (TrailSet::Build, TrailSet::Classify, TrailSet::Emit).chain(),
            )
            .add_systems(
                Update,
                (
                    build_trail_layers.in_set(TrailSet::Build),
                    classify_motion.in_set(TrailSet::Classify),
                    drive_emission.in_set(TrailSet::Emit),
                ),
            );
        app
    }

    fn emitters(app: &mut App, entity: Entity) -> Vec<(f32, bool)> {
        let layers: Vec<Entity> = app
            .world()
            .get::<TrailState>(entity)
            .unwrap()
            .layers
            .iter()
            .map(|l| l.entity)
            .collect();
        layers
            .into_iter()
            .map(|e| {
                let emitter = app.world().get::<ParticleEmitter>(e).unwrap();
                (emitter.emission_rate(), emitter.is_emitting())
            })
            .collect()
    }

    #[test]
    fn follow_eases_or_snaps() {
        let halfway = follow(Vec3::ZERO, Vec3::X, 15.0, 1.0 / 30.0);
        assert!((halfway.x - 0.5).abs() < 1e-5);
        assert_eq!(follow(Vec3::ZERO, Vec3::X, 15.0, 1.0), Vec3::X);
        assert_eq!(follow(Vec3::ZERO, Vec3::X, 0.0, 0.001), Vec3::X);
    }

    #[test]
    fn screen_source_primes_on_first_pointer() {
        let preset = preset("Fire Trail");
        let mut state = TrailState::new(Vec3::new(5.0, 5.0, 5.0), preset.clone());

        // No pointer yet: still.
        assert_eq!(state.classify(&preset, 0.1), None);

        state.screen = Some(Vec2::new(400.0, 300.0));
        assert_eq!(state.classify(&preset, 0.1), None);
        assert!(!state.motion.is_moving);

        state.screen = Some(Vec2::new(410.0, 300.0));
        assert_eq!(
            state.classify(&preset, 0.1),
            Some(MotionTransition::StartedMoving)
        );
    }

    #[test]
    fn switching_to_screen_source_reprimes() {
        let screen = preset("Fire Trail");
        let mut world = screen.clone();
        world.motion = MotionConfig::default();
        let mut state = TrailState::new(Vec3::ZERO, world.clone());
        assert_eq!(state.classify(&world, 0.1), None);
        assert_eq!(state.classify(&world, 0.1), None);

        state.screen = Some(Vec2::new(400.0, 300.0));
        assert_eq!(state.classify(&screen, 0.1), None);
        assert!(!state.motion.is_moving);

        state.screen = Some(Vec2::new(401.0, 300.0));
        assert_eq!(
            state.classify(&screen, 0.1),
            Some(MotionTransition::StartedMoving)
        );
    }

    #[test]
    fn lost_pointer_counts_as_still() {
        let preset = preset("Fire Trail");
        let mut state = TrailState::new(Vec3::ZERO, preset.clone());
        state.screen = Some(Vec2::ZERO);
        state.classify(&preset, 0.016);
        state.screen = Some(Vec2::new(50.0, 0.0));
        state.classify(&preset, 0.016);
        assert!(state.motion.is_moving);

        state.screen = None;
        state.classify(&preset, 0.5);
        assert!(!state.motion.is_moving);
    }

    #[test]
    fn fade_trail_spawns_playing_layers() {
        let mut app = app();
        let trail = app
            .world_mut()
            .spawn(CursorTrail::new(preset("Fire Trail")))
            .id();
        app.update();

        let layers = emitters(&mut app, trail);
        assert_eq!(layers.len(), 3);
        assert!(layers.iter().all(|(_, playing)| *playing));
        assert!(app.world().get::<FlameTail>(trail).is_none());

        // Idle past the fade window: every rate reaches zero.
        app.world_mut().get_mut::<TrailState>(trail).unwrap().motion.idle_timer = 1.0;
        app.update();
        assert!(emitters(&mut app, trail).iter().all(|(rate, _)| *rate == 0.0));
    }

    #[test]
    fn gate_trail_plays_on_movement() {
        let mut app = app();
        let trail = app
            .world_mut()
            .spawn(CursorTrail::new(preset("Magic Trail")))
            .id();
        app.update();

        assert!(app.world().get::<FlameTail>(trail).is_some());
        let layers = emitters(&mut app, trail);
        assert_eq!(layers.len(), 4);
        assert!(layers.iter().all(|(_, playing)| !*playing));

        app.world_mut().get_mut::<TrailState>(trail).unwrap().target = Vec3::X;
        app.update();
        assert!(emitters(&mut app, trail).iter().all(|(_, playing)| *playing));

        // Still target with zero dwell: idle on the next frame.
        app.update();
        assert!(emitters(&mut app, trail).iter().all(|(_, playing)| !*playing));
    }

    #[test]
    fn preset_change_rebuilds_layers() {
        let mut app = app();
        let trail = app
            .world_mut()
            .spawn(CursorTrail::new(preset("Magic Trail")))
            .id();
        app.update();
        let old: Vec<Entity> = app.world().get::<TrailState>(trail).unwrap().layers.iter().map(|l| l.entity).collect();

        app.world_mut().get_mut::<CursorTrail>(trail).unwrap().preset = preset("Flame Gate");
        app.update();

        let state = app.world().get::<TrailState>(trail).unwrap();
        assert_eq!(state.layers.len(), 1);
        assert!(old.iter().all(|e| app.world().get_entity(*e).is_err()));
        assert!(app.world().get::<FlameTail>(trail).is_none());
    }

    #[test]
    fn rebuild_while_moving_keeps_gated_layers_playing() {
        let mut app = app();
        let trail = app
            .world_mut()
            .spawn(CursorTrail::new(preset("Magic Trail")))
            .id();
        app.update();
        app.world_mut().get_mut::<TrailState>(trail).unwrap().target = Vec3::X;
        app.update();
        assert!(app.world().get::<TrailState>(trail).unwrap().motion.is_moving);

        // Keep moving while the preset swaps.
        app.world_mut().get_mut::<CursorTrail>(trail).unwrap().preset = preset("Flame Gate");
        app.world_mut().get_mut::<TrailState>(trail).unwrap().target = Vec3::new(2.0, 0.0, 0.0);
        app.update();

        let layers = emitters(&mut app, trail);
        assert_eq!(layers.len(), 1);
        assert!(layers[0].1);
    }

    #[test]
    fn scale_change_keeps_layers() {
        let mut app = app();
        let trail = app
            .world_mut()
            .spawn(CursorTrail::new(preset("Flame Gate")))
            .id();
        app.update();
        let before = app.world().get::<TrailState>(trail).unwrap().layers[0].entity;

        app.world_mut().get_mut::<CursorTrail>(trail).unwrap().emission_scale = 0.5;
        app.update();
        let state = app.world().get::<TrailState>(trail).unwrap();
        assert_eq!(state.layers[0].entity, before);
        assert_eq!(emitters(&mut app, trail)[0].0, 30.0);
    }

    #[test]
    fn clear_behavior_reaches_emitters() {
        let mut app = app();
        let mut preset = preset("Flame Gate");
        preset.emission = crate::fader::EmissionMode::Gate {
            stop: StopBehavior::StopEmittingAndClear,
        };
        preset.motion.dwell = 0.0;
        let trail = app.world_mut().spawn(CursorTrail::new(preset)).id();
        app.update();
        app.world_mut().get_mut::<TrailState>(trail).unwrap().target = Vec3::X;
        app.update();
        app.update();
        assert!(emitters(&mut app, trail).iter().all(|(_, playing)| !*playing));
    }
}
