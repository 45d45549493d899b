//! Trail presets: every effect variant is a parameter table over the same
//! controller.
//!
//! Built-in presets are registered first; `assets/trails/*.trail.ron` files
//! override or extend them by name.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use bevy::prelude::*;
use bevy_vfx::{
    AlphaKey, ColorKey, EmitterConfig, EmitterConfigError, EmitterShape, GlowFalloff, GlowTexture,
    LifetimeGradient, NoiseConfig, RenderMode, ScalarRange, StopBehavior, VelocityOverLifetime,
    VelocitySpace,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants::{fade, follow, motion};
use crate::fader::{EmissionFader, EmissionMode, LayerFade};
use crate::flame_line::FlameLineConfig;
use crate::motion::{MotionConfig, MotionSource};
use crate::spiral::SpiralMotion;

pub const TRAILS_DIR: &str = "assets/trails";
const PRESET_EXTENSION: &str = ".trail.ron";

#[derive(Error, Debug)]
pub enum PresetError {
    #[error("failed to access {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: ron::error::SpannedError,
    },
    #[error("failed to serialize preset: {0}")]
    Serialize(#[from] ron::Error),
    #[error("preset '{0}' has no layers")]
    NoLayers(String),
    #[error(transparent)]
    Layer(#[from] EmitterConfigError),
}

/// One emitter of a trail with its fade parameters.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Reflect)]
pub struct LayerSpec {
    pub emitter: EmitterConfig,
    pub fade: LayerFade,
    /// Orbit the layer around the trail head.
    #[serde(default)]
    pub orbit: Option<SpiralMotion>,
}

impl LayerSpec {
    /// Layer whose faded rate starts at `base_rate`.
    pub fn new(emitter: EmitterConfig, base_rate: f32) -> Self {
        Self {
            emitter,
            fade: LayerFade::new(base_rate),
            orbit: None,
        }
    }

    pub fn with_orbit(mut self, orbit: SpiralMotion) -> Self {
        self.orbit = Some(orbit);
        self
    }
}

/// Full description of a cursor trail effect.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Reflect)]
pub struct TrailPreset {
    pub name: String,
    /// Lerp speed toward the pointer target; 0 snaps.
    pub follow_speed: f32,
    pub motion: MotionConfig,
    pub emission: EmissionMode,
    pub layers: Vec<LayerSpec>,
    #[serde(default)]
    pub flame_line: Option<FlameLineConfig>,
}

impl TrailPreset {
    pub fn validate(&self) -> Result<(), PresetError> {
        if self.layers.is_empty() {
            return Err(PresetError::NoLayers(self.name.clone()));
        }
        for layer in &self.layers {
            layer.emitter.validate()?;
        }
        Ok(())
    }

    /// Layers start emitting immediately when fading; gated layers wait for
    /// the first movement.
    pub fn starts_playing(&self) -> bool {
        matches!(self.emission, EmissionMode::Fade(_))
    }
}

/// Named trail presets available to the app.
#[derive(Resource, Default)]
pub struct TrailLibrary {
    presets: HashMap<String, TrailPreset>,
    order: Vec<String>,
}

impl TrailLibrary {
    pub fn with_builtins() -> Self {
        let mut library = Self::default();
        for preset in default_presets() {
            library.insert(preset);
        }
        library
    }

    /// Add or replace a preset. New names are appended to the display order.
    pub fn insert(&mut self, preset: TrailPreset) {
        if !self.presets.contains_key(&preset.name) {
            self.order.push(preset.name.clone());
        }
        self.presets.insert(preset.name.clone(), preset);
    }

    pub fn get(&self, name: &str) -> Option<&TrailPreset> {
        self.presets.get(name)
    }

    /// Preset names in registration order.
    pub fn names(&self) -> &[String] {
        &self.order
    }

    /// Name of the `index`th preset (digit hotkeys).
    pub fn nth(&self, index: usize) -> Option<&str> {
        self.order.get(index).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Disk persistence
// ---------------------------------------------------------------------------

fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            _ => c,
        })
        .collect()
}

pub fn read_preset(path: &Path) -> Result<TrailPreset, PresetError> {
    let contents = std::fs::read_to_string(path).map_err(|source| PresetError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let preset: TrailPreset = ron::from_str(&contents).map_err(|source| PresetError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    preset.validate()?;
    Ok(preset)
}

/// Write `preset` as pretty RON into `dir`, returning the file path.
pub fn save_preset(dir: &Path, preset: &TrailPreset) -> Result<PathBuf, PresetError> {
    let io = |source| PresetError::Io {
        path: dir.to_path_buf(),
        source,
    };
    std::fs::create_dir_all(dir).map_err(io)?;
    let path = dir.join(format!("{}{}", sanitize_filename(&preset.name), PRESET_EXTENSION));
    let text = ron::ser::to_string_pretty(preset, ron::ser::PrettyConfig::default())?;
    std::fs::write(&path, text).map_err(|source| PresetError::Io {
        path: path.clone(),
        source,
    })?;
    Ok(path)
}

/// Merge every valid `*.trail.ron` in `dir` into the library. Invalid files
/// are skipped with a warning. Returns the number of presets loaded.
pub fn load_presets_from_dir(library: &mut TrailLibrary, dir: &Path) -> usize {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return 0;
    };

    let mut loaded = 0;
    for entry in entries.flatten() {
        let path = entry.path();
        let is_preset = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.ends_with(PRESET_EXTENSION));
        if !is_preset {
            continue;
        }

        match read_preset(&path) {
            Ok(preset) => {
                info!("Loaded trail preset '{}' from {:?}", preset.name, path);
                library.insert(preset);
                loaded += 1;
            }
            Err(e) => warn!("Skipping trail preset: {}", e),
        }
    }
    loaded
}

pub(crate) fn init_trail_library(mut library: ResMut<TrailLibrary>) {
    for preset in default_presets() {
        library.insert(preset);
    }
    let loaded = load_presets_from_dir(&mut library, Path::new(TRAILS_DIR));
    info!(
        "Trail library ready: {} presets ({} from disk)",
        library.len(),
        loaded
    );
}

// ---------------------------------------------------------------------------
// Built-in presets
// ---------------------------------------------------------------------------

fn rgb(r: f32, g: f32, b: f32) -> LinearRgba {
    LinearRgba::new(r, g, b, 1.0)
}

fn screen_motion() -> MotionConfig {
    MotionConfig {
        source: MotionSource::Screen,
        threshold: motion::SCREEN_THRESHOLD,
        dwell: motion::DWELL,
    }
}

fn fade_mode() -> EmissionMode {
    EmissionMode::Fade(EmissionFader {
        window: fade::WINDOW,
    })
}

/// Three-layer comet: main trail, sparks and slow noisy embers.
fn fire_trail() -> TrailPreset {
    let glow = GlowTexture {
        size: 128,
        falloff: GlowFalloff::Cubic { sharpness: 2.0 },
        gamma: 0.0,
        tint: Vec3::ONE,
    };
    let main = EmitterConfig::new("MainTrail", rgb(1.0, 0.6, 0.2), rgb(1.0, 0.2, 0.0), 0.08, 1.5, 3.0, 12.0)
        .with_rate_over_distance(6.0)
        .with_glow(glow);
    let sparks = EmitterConfig::new("Sparks", rgb(1.0, 0.9, 0.4), rgb(1.0, 0.5, 0.0), 0.03, 0.5, 2.0, 20.0)
        .with_rate_over_distance(10.0)
        .with_shape(EmitterShape::cone(25.0, 0.05))
        .with_glow(glow);
    let embers = EmitterConfig::new("Embers", rgb(1.0, 0.7, 0.3), rgb(0.2, 0.05, 0.0), 0.1, 2.0, 1.0, 5.0)
        .with_rate_over_distance(2.5)
        .with_noise(NoiseConfig::with_strength(0.3))
        .with_glow(glow);

    TrailPreset {
        name: "Fire Trail".into(),
        follow_speed: follow::SPEED,
        motion: screen_motion(),
        emission: fade_mode(),
        layers: vec![
            LayerSpec::new(main, 8.0),
            LayerSpec::new(sparks, 16.0),
            LayerSpec::new(embers, 4.0),
        ],
        flame_line: None,
    }
}

/// Stretched comet core over soft gaussian glows.
fn fire_trail_merged() -> TrailPreset {
    let glow = GlowTexture {
        size: 128,
        falloff: GlowFalloff::Gaussian { sharpness: 5.0 },
        gamma: 0.6,
        tint: Vec3::new(1.0, 0.9, 0.5),
    };
    let core = EmitterConfig::new("Core", rgb(1.0, 0.9, 0.6), rgb(1.0, 0.4, 0.05), 0.25, 1.6, 2.5, 10.0)
        .with_rate_over_distance(5.0)
        .with_shape(EmitterShape::cone(5.0, 0.02))
        .with_render_mode(RenderMode::Stretch {
            length_scale: 1.8,
            speed_scale: 0.0,
        })
        .with_sorting_order(3)
        .with_glow(glow);
    let sparks = EmitterConfig::new("Sparks", rgb(1.0, 0.8, 0.2), rgb(1.0, 0.3, 0.0), 0.06, 0.5, 3.0, 20.0)
        .with_rate_over_distance(10.0)
        .with_shape(EmitterShape::cone(25.0, 0.05))
        .with_sorting_order(2)
        .with_glow(glow);
    let embers = EmitterConfig::new("Embers", rgb(1.0, 0.5, 0.1), rgb(0.2, 0.05, 0.0), 0.12, 2.2, 1.0, 5.0)
        .with_rate_over_distance(3.0)
        .with_shape(EmitterShape::cone(15.0, 0.05))
        .with_noise(NoiseConfig::with_strength(0.3))
        .with_sorting_order(2)
        .with_glow(glow);

    TrailPreset {
        name: "Fire Trail Merged".into(),
        follow_speed: follow::SPEED,
        motion: screen_motion(),
        emission: fade_mode(),
        layers: vec![
            LayerSpec::new(core, 8.0),
            LayerSpec::new(sparks, 16.0),
            LayerSpec::new(embers, 4.0),
        ],
        flame_line: None,
    }
}

/// White-hot core cooling through yellow and orange, with falling sparks.
fn magic_fire() -> TrailPreset {
    let glow = GlowTexture {
        size: 128,
        falloff: GlowFalloff::Gaussian { sharpness: 4.5 },
        gamma: 0.7,
        tint: Vec3::ONE,
    };
    let gradient = LifetimeGradient::Tracks {
        colors: vec![
            ColorKey { time: 0.0, color: LinearRgba::WHITE },
            ColorKey { time: 0.25, color: rgb(1.0, 0.9, 0.4) },
            ColorKey { time: 0.6, color: rgb(1.0, 0.6, 0.1) },
            ColorKey { time: 1.0, color: rgb(1.0, 0.2, 0.0) },
        ],
        alphas: vec![
            AlphaKey { time: 0.0, alpha: 1.0 },
            AlphaKey { time: 0.5, alpha: 0.8 },
            AlphaKey { time: 1.0, alpha: 0.0 },
        ],
    };
    let layer = |name: &str, start: LinearRgba, end: LinearRgba, size: f32, life: f32, speed: f32, rate: f32| {
        EmitterConfig::new(name, start, end, size, life, speed, rate)
            .with_rate_over_distance(rate * 0.5)
            .with_shape(EmitterShape::cone(10.0, 0.03))
            .with_max_particles(800)
            .with_gradient(gradient.clone())
            .with_sorting_order(3)
            .with_base_tint(rgb(1.0, 0.7, 0.3))
            .with_glow(glow)
    };

    let core = layer(
        "CoreTrail",
        LinearRgba::new(1.0, 0.95, 0.8, 1.0),
        LinearRgba::new(1.0, 0.3, 0.0, 0.0),
        0.09,
        1.3,
        3.2,
        15.0,
    );
    let sparks = layer(
        "Sparks",
        LinearRgba::new(1.0, 0.9, 0.4, 1.0),
        LinearRgba::new(1.0, 0.2, 0.0, 0.0),
        0.03,
        0.4,
        2.5,
        25.0,
    )
    .with_shape(EmitterShape::Sphere { radius: 0.05 })
    .with_gravity(0.3)
    .with_noise(NoiseConfig::with_strength(0.5));
    let embers = layer(
        "Embers",
        LinearRgba::new(1.0, 0.7, 0.3, 0.8),
        LinearRgba::new(0.25, 0.05, 0.0, 0.0),
        0.1,
        2.2,
        1.2,
        6.0,
    )
    .with_noise(NoiseConfig::with_strength(0.25));

    TrailPreset {
        name: "Magic Fire".into(),
        follow_speed: follow::SPEED,
        motion: screen_motion(),
        emission: fade_mode(),
        layers: vec![
            LayerSpec::new(core, 10.0),
            LayerSpec::new(sparks, 25.0),
            LayerSpec::new(embers, 5.0),
        ],
        flame_line: None,
    }
}

/// Dense glowing comet gated on movement, with a red flame tongue and line.
fn magic_trail() -> TrailPreset {
    let glow = GlowTexture {
        size: 192,
        falloff: GlowFalloff::Gaussian { sharpness: 2.4 },
        gamma: 0.85,
        tint: Vec3::new(1.0, 0.85, 0.45),
    };
    let layer = |name: &str, start: LinearRgba, end: LinearRgba, size: f32, life: f32, speed: f32, rate: f32| {
        EmitterConfig::new(name, start, end, size, life, speed, rate)
            .with_shape(EmitterShape::cone(12.0, 0.03))
            .with_max_particles(2000)
            .with_gradient(LifetimeGradient::TwoStop)
            .with_sorting_order(2)
            .with_base_tint(rgb(start.red, start.green, start.blue))
            .with_glow(glow)
    };

    let core = layer("Core", rgb(1.0, 0.95, 0.8), rgb(1.0, 0.7, 0.2), 0.25, 0.35, 1.6, 140.0)
        .with_sorting_order(3);
    let trail = layer(
        "Trail",
        LinearRgba::new(1.0, 0.8, 0.4, 0.9),
        LinearRgba::new(1.0, 0.3, 0.0, 0.1),
        0.22,
        0.45,
        1.2,
        100.0,
    );
    let mut sparks = layer("Sparks", rgb(1.0, 0.9, 0.5), rgb(1.0, 0.35, 0.0), 0.09, 0.6, 3.5, 180.0)
        .with_gravity(0.3)
        .with_shape(EmitterShape::cone(40.0, 0.08))
        .with_velocity_over_lifetime(VelocityOverLifetime {
            space: VelocitySpace::Local,
            x: ScalarRange::Random(-1.2, 1.2),
            y: ScalarRange::Random(0.5, 2.4),
            z: ScalarRange::Random(-1.2, 1.2),
        });
    sparks.speed = ScalarRange::Random(2.0, 4.5);
    sparks.particle_size = ScalarRange::Random(0.07, 0.14);
    sparks.lifetime = ScalarRange::Random(0.4, 0.8);

    let mut flame = layer(
        "Flame",
        LinearRgba::new(1.0, 0.15, 0.0, 0.9),
        LinearRgba::new(1.0, 0.02, 0.0, 0.0),
        0.12,
        0.55,
        0.6,
        160.0,
    )
    .with_shape(EmitterShape::Cone {
        angle: 6.0,
        radius: 0.02,
        rotation: Vec3::new(180.0, 0.0, 0.0),
    })
    .with_velocity_over_lifetime(VelocityOverLifetime {
        space: VelocitySpace::World,
        x: ScalarRange::Constant(0.0),
        y: ScalarRange::Constant(0.0),
        z: ScalarRange::Random(-4.5, -6.0),
    })
    .with_noise(NoiseConfig {
        strength: 0.1,
        frequency: 1.5,
        scroll_speed: 0.5,
    });
    flame.speed = ScalarRange::Random(2.2, 3.5);
    flame.particle_size = ScalarRange::Random(0.06, 0.1);
    flame.lifetime = ScalarRange::Random(0.35, 0.55);

    TrailPreset {
        name: "Magic Trail".into(),
        follow_speed: 0.0,
        motion: MotionConfig {
            source: MotionSource::World,
            threshold: motion::WORLD_THRESHOLD,
            dwell: 0.0,
        },
        emission: EmissionMode::Gate {
            stop: StopBehavior::StopEmitting,
        },
        layers: vec![
            LayerSpec::new(core, 140.0),
            LayerSpec::new(trail, 100.0),
            LayerSpec::new(sparks, 180.0),
            LayerSpec::new(flame, 160.0),
        ],
        flame_line: Some(FlameLineConfig::default()),
    }
}

/// Single fire layer switched on and off with a short dwell.
fn flame_gate() -> TrailPreset {
    let fire = EmitterConfig::new("Fire", rgb(1.0, 0.6, 0.1), rgb(1.0, 0.1, 0.0), 0.15, 0.6, 1.5, 60.0)
        .with_shape(EmitterShape::cone(15.0, 0.05))
        .with_noise(NoiseConfig::with_strength(0.2));

    TrailPreset {
        name: "Flame Gate".into(),
        follow_speed: 0.0,
        motion: MotionConfig {
            source: MotionSource::World,
            threshold: motion::WORLD_THRESHOLD,
            dwell: 0.2,
        },
        emission: EmissionMode::Gate {
            stop: StopBehavior::StopEmitting,
        },
        layers: vec![LayerSpec::new(fire, 60.0)],
        flame_line: None,
    }
}

/// Smoothed head with a sparkling layer spiralling around it.
fn spiral_comet() -> TrailPreset {
    let head = EmitterConfig::new("Head", rgb(1.0, 0.95, 0.8), rgb(1.0, 0.5, 0.1), 0.2, 0.5, 0.3, 40.0)
        .with_rate_over_distance(10.0)
        .with_sorting_order(3);
    let orbit = EmitterConfig::new("Orbit", rgb(1.0, 0.8, 0.3), rgb(1.0, 0.3, 0.0), 0.06, 0.6, 0.8, 30.0)
        .with_shape(EmitterShape::Sphere { radius: 0.02 })
        .with_sorting_order(2);

    TrailPreset {
        name: "Spiral Comet".into(),
        follow_speed: 20.0,
        motion: screen_motion(),
        emission: fade_mode(),
        layers: vec![
            LayerSpec::new(head, 40.0),
            LayerSpec::new(orbit, 30.0).with_orbit(SpiralMotion {
                radius: 0.4,
                speed: 6.0,
                height: 0.5,
                angle: 0.0,
            }),
        ],
        flame_line: None,
    }
}

pub fn default_presets() -> Vec<TrailPreset> {
    vec![
        fire_trail(),
        fire_trail_merged(),
        magic_fire(),
        magic_trail(),
        flame_gate(),
        spiral_comet(),
    ]
}
