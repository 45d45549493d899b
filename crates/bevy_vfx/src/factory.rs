//! Turns an [`EmitterConfig`] into a live emitter entity.
//!
//! Each layer gets its colour-over-lifetime gradient baked into a fixed number
//! of additive material bands. Particles swap bands as they age, so the only
//! per-frame material work is a handle change.

use bevy::prelude::*;

use crate::curve::Gradient;
use crate::data::{EmitterConfig, EmitterConfigError};
use crate::emitter::ParticleEmitter;
use crate::glow::VfxAssetCache;

/// Number of material bands a lifetime gradient is quantized into.
pub const GRADIENT_BANDS: usize = 16;

/// Validated, asset-free description of one layer.
#[derive(Clone, Debug, PartialEq)]
pub struct LayerBlueprint {
    pub gradient: Gradient,
    /// Gradient colour at each band's midpoint, multiplied by the base tint.
    pub band_colors: Vec<LinearRgba>,
}

pub fn build_layer(config: &EmitterConfig) -> Result<LayerBlueprint, EmitterConfigError> {
    config.validate()?;
    let gradient = config.gradient()?;
    let tint = config.base_tint;
    let band_colors = (0..GRADIENT_BANDS)
        .map(|i| {
            let t = (i as f32 + 0.5) / GRADIENT_BANDS as f32;
            let c = gradient.sample(t);
            LinearRgba::new(
                c.red * tint.red,
                c.green * tint.green,
                c.blue * tint.blue,
                c.alpha * tint.alpha,
            )
        })
        .collect();
    Ok(LayerBlueprint {
        gradient,
        band_colors,
    })
}

/// Unlit additive material for one gradient band.
pub fn band_material(color: LinearRgba, glow: Handle<Image>, sorting_order: i32) -> StandardMaterial {
    StandardMaterial {
        base_color: Color::LinearRgba(color),
        base_color_texture: Some(glow),
        unlit: true,
        alpha_mode: AlphaMode::Add,
        double_sided: true,
        cull_mode: None,
        depth_bias: sorting_order as f32,
        ..default()
    }
}

/// Asset stores a layer is built into.
pub struct LayerAssets<'a> {
    pub images: &'a mut Assets<Image>,
    pub materials: &'a mut Assets<StandardMaterial>,
    pub meshes: &'a mut Assets<Mesh>,
    pub cache: &'a mut VfxAssetCache,
}

/// Spawn one emitter as a child of `parent`. Invalid configs spawn nothing.
pub fn spawn_layer(
    commands: &mut Commands,
    parent: Entity,
    config: EmitterConfig,
    assets: &mut LayerAssets,
    playing: bool,
) -> Result<Entity, EmitterConfigError> {
    let blueprint = build_layer(&config)?;
    let glow = assets.cache.glow(&config.glow, assets.images);
    let quad = assets.cache.quad(assets.meshes);
    let bands = blueprint
        .band_colors
        .iter()
        .map(|color| {
            assets
                .materials
                .add(band_material(*color, glow.clone(), config.sorting_order))
        })
        .collect();

    let name = Name::new(format!("{} Layer", config.name));
    let mut emitter = ParticleEmitter::new(config, bands, quad);
    if !playing {
        emitter.stop(crate::StopBehavior::StopEmitting);
    }

    let entity = commands
        .spawn((name, emitter, Transform::default(), Visibility::default()))
        .id();
    commands.entity(parent).add_child(entity);
    Ok(entity)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::EmitterShape;
    use bevy::ecs::world::CommandQueue;

    fn core() -> EmitterConfig {
        EmitterConfig::new(
            "Core",
            LinearRgba::new(1.0, 0.95, 0.7, 1.0),
            LinearRgba::new(1.0, 0.4, 0.0, 1.0),
            0.18,
            0.3,
            0.5,
            16.0,
        )
        .with_base_tint(LinearRgba::new(1.0, 0.5, 1.0, 1.0))
    }

    #[test]
    fn bands_sample_band_midpoints_and_apply_tint() {
        let blueprint = build_layer(&core()).unwrap();
        assert_eq!(blueprint.band_colors.len(), GRADIENT_BANDS);

        let first = blueprint.band_colors[0];
        let expected = blueprint.gradient.sample(0.5 / GRADIENT_BANDS as f32);
        assert!((first.green - expected.green * 0.5).abs() < 1e-5);
        assert!((first.alpha - expected.alpha).abs() < 1e-5);

        // Alpha fades monotonically across bands.
        for pair in blueprint.band_colors.windows(2) {
            assert!(pair[1].alpha <= pair[0].alpha);
        }
    }

    #[test]
    fn invalid_config_builds_nothing() {
        let config = core().with_shape(EmitterShape::cone(120.0, 0.0));
        assert!(build_layer(&config).is_err());
    }

    #[test]
    fn material_is_unlit_additive_and_sorted() {
        let material = band_material(LinearRgba::RED, Handle::default(), 3);
        assert!(material.unlit);
        assert_eq!(material.alpha_mode, AlphaMode::Add);
        assert_eq!(material.depth_bias, 3.0);
        assert!(material.base_color_texture.is_some());
    }

    #[test]
    fn spawn_layer_parents_emitter_and_shares_glow() {
        let mut world = World::new();
        let parent = world.spawn_empty().id();

        let mut images = Assets::<Image>::default();
        let mut materials = Assets::<StandardMaterial>::default();
        let mut meshes = Assets::<Mesh>::default();
        let mut cache = VfxAssetCache::default();
        let mut assets = LayerAssets {
            images: &mut images,
            materials: &mut materials,
            meshes: &mut meshes,
            cache: &mut cache,
        };

        let mut queue = CommandQueue::default();
        let (a, b) = {
            let mut commands = Commands::new(&mut queue, &world);
            let a = spawn_layer(&mut commands, parent, core(), &mut assets, true).unwrap();
            let b = spawn_layer(&mut commands, parent, core(), &mut assets, false).unwrap();
            (a, b)
        };
        queue.apply(&mut world);

        assert_eq!(cache.glow_count(), 1);
        assert_eq!(materials.len(), 2 * GRADIENT_BANDS);

        let first = world.get::<ParticleEmitter>(a).unwrap();
        assert!(first.is_emitting());
        assert!(!world.get::<ParticleEmitter>(b).unwrap().is_emitting());
        assert_eq!(world.get::<ChildOf>(b).map(ChildOf::parent), Some(parent));
    }
}
