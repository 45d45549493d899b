//! # bevy_vfx
//!
//! Parametric sprite-particle layers for Bevy.
//!
//! A layer is described by an [`EmitterConfig`]: colours, size, lifetime,
//! speed, emission rate, emission shape and render mode. [`spawn_layer`]
//! validates the config, bakes its lifetime gradient into additive material
//! bands textured with a procedurally generated glow sprite, and spawns a
//! [`ParticleEmitter`]. The emitter runtime is CPU-side: each particle is a
//! camera-facing quad entity.
//!
//! ## Quick Start
//!
//! ```ignore
//! use bevy::prelude::*;
//! use bevy_vfx::*;
//!
//! fn setup(
//!     mut commands: Commands,
//!     mut images: ResMut<Assets<Image>>,
//!     mut materials: ResMut<Assets<StandardMaterial>>,
//!     mut meshes: ResMut<Assets<Mesh>>,
//!     mut cache: ResMut<VfxAssetCache>,
//! ) {
//!     let root = commands.spawn(Transform::default()).id();
//!     let config = EmitterConfig::new(
//!         "Sparks",
//!         LinearRgba::new(1.0, 0.9, 0.4, 1.0),
//!         LinearRgba::new(1.0, 0.5, 0.0, 1.0),
//!         0.03, 0.5, 2.0, 20.0,
//!     );
//!     let mut assets = LayerAssets {
//!         images: &mut images,
//!         materials: &mut materials,
//!         meshes: &mut meshes,
//!         cache: &mut cache,
//!     };
//!     spawn_layer(&mut commands, root, config, &mut assets, true).ok();
//! }
//! ```

pub mod curve;
pub mod data;
pub mod emitter;
pub mod factory;
pub mod glow;

// Re-export core types
pub use curve::{AlphaKey, ColorKey, Curve, CurveError, CurveKey, Gradient, GradientStop};
pub use data::*;
pub use emitter::{ParticleEmitter, ParticleOwner, SpriteParticle, StopBehavior};
pub use factory::{GRADIENT_BANDS, LayerAssets, LayerBlueprint, band_material, build_layer, spawn_layer};
pub use glow::{GlowFalloff, GlowTexture, VfxAssetCache};

use bevy::prelude::*;

/// Ordering of the particle runtime within `Update`.
#[derive(SystemSet, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VfxSet {
    Spawn,
    Simulate,
    Sync,
}

/// Registers the particle runtime and the shared layer asset cache.
pub struct VfxPlugin;

impl Plugin for VfxPlugin {
    fn build(&self, app: &mut App) {
        app.register_type::<EmitterConfig>()
            .register_type::<ScalarRange>()
            .register_type::<EmitterShape>()
            .register_type::<RenderMode>()
            .register_type::<NoiseConfig>()
            .register_type::<VelocityOverLifetime>()
            .register_type::<VelocitySpace>()
            .register_type::<LifetimeGradient>()
            .register_type::<GlowTexture>()
            .register_type::<GlowFalloff>()
            .register_type::<StopBehavior>()
            .register_type::<Curve>()
            .register_type::<CurveKey>()
            .register_type::<Gradient>()
            .register_type::<GradientStop>()
            .init_resource::<VfxAssetCache>()
            .configure_sets(
                Update,
                (VfxSet::Spawn, VfxSet::Simulate, VfxSet::Sync).chain(),
            )
            .add_systems(
                Update,
                (
                    emitter::emit_particles.in_set(VfxSet::Spawn),
                    emitter::simulate_particles.in_set(VfxSet::Simulate),
                    (emitter::sync_particles, emitter::despawn_orphans)
                        .chain()
                        .in_set(VfxSet::Sync),
                ),
            );
    }
}
