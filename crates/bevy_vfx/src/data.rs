//! Emitter data model.
//!
//! An [`EmitterConfig`] is the full parameter set of one particle layer. It is
//! serializable (serde + RON) so layers can live in preset files, and it is
//! never mutated once handed to a [`ParticleEmitter`](crate::ParticleEmitter).

use bevy::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::curve::{AlphaKey, ColorKey, Curve, CurveError, Gradient};
use crate::glow::{GlowTexture, MAX_GLOW_SIZE};

/// Problems found by [`EmitterConfig::validate`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EmitterConfigError {
    #[error("layer '{layer}': {field} must be non-negative, got {value}")]
    Negative {
        layer: String,
        field: &'static str,
        value: f32,
    },
    #[error("layer '{layer}': lifetime must be positive")]
    NonPositiveLifetime { layer: String },
    #[error("layer '{layer}': max_particles must be at least 1")]
    ZeroCapacity { layer: String },
    #[error("layer '{layer}': cone angle {angle}° must be in [0, 90)")]
    ConeAngle { layer: String, angle: f32 },
    #[error("layer '{layer}': glow texture size must be at least 1 pixel")]
    EmptyGlow { layer: String },
    #[error("layer '{layer}': glow texture size {size} exceeds {max} pixels")]
    GlowTooLarge { layer: String, size: u32, max: u32 },
    #[error("layer '{layer}': invalid size curve: {source}")]
    SizeCurve {
        layer: String,
        #[source]
        source: CurveError,
    },
    #[error("layer '{layer}': invalid color gradient: {source}")]
    Gradient {
        layer: String,
        #[source]
        source: CurveError,
    },
}

// ---------------------------------------------------------------------------
// Scalar ranges
// ---------------------------------------------------------------------------

/// A scalar that is either constant or drawn uniformly per particle.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Reflect)]
pub enum ScalarRange {
    Constant(f32),
    Random(f32, f32),
}

impl Default for ScalarRange {
    fn default() -> Self {
        Self::Constant(1.0)
    }
}

impl From<f32> for ScalarRange {
    fn from(v: f32) -> Self {
        Self::Constant(v)
    }
}

impl ScalarRange {
    pub fn min_val(&self) -> f32 {
        match self {
            Self::Constant(v) => *v,
            Self::Random(a, b) => a.min(*b),
        }
    }

    pub fn sample(&self) -> f32 {
        match self {
            Self::Constant(v) => *v,
            Self::Random(a, b) => *a + (*b - *a) * fastrand::f32(),
        }
    }
}

// ---------------------------------------------------------------------------
// Shape, render mode, motion modifiers
// ---------------------------------------------------------------------------

/// Emission volume. The emission axis is local +Y, rotated by `rotation`
/// (XYZ Euler angles in degrees).
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Reflect)]
pub enum EmitterShape {
    /// Particles start on a disc of `radius` and fly within `angle` degrees of the axis.
    Cone {
        angle: f32,
        radius: f32,
        rotation: Vec3,
    },
    /// Particles start inside a sphere and fly radially outward.
    Sphere { radius: f32 },
}

impl EmitterShape {
    pub fn cone(angle: f32, radius: f32) -> Self {
        Self::Cone {
            angle,
            radius,
            rotation: Vec3::ZERO,
        }
    }
}

impl Default for EmitterShape {
    fn default() -> Self {
        Self::cone(10.0, 0.02)
    }
}

/// How a layer's sprites are oriented.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Reflect)]
pub enum RenderMode {
    /// Camera-facing quad.
    #[default]
    Billboard,
    /// Quad elongated along the on-screen velocity. Length is
    /// `size * length_scale + speed * speed_scale`.
    Stretch { length_scale: f32, speed_scale: f32 },
}

/// Turbulent velocity perturbation.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Reflect)]
pub struct NoiseConfig {
    pub strength: f32,
    pub frequency: f32,
    pub scroll_speed: f32,
}

impl NoiseConfig {
    pub fn with_strength(strength: f32) -> Self {
        Self {
            strength,
            frequency: 0.5,
            scroll_speed: 0.0,
        }
    }
}

/// Space in which velocity-over-lifetime vectors are expressed.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, Reflect)]
pub enum VelocitySpace {
    /// Rotated by the emitter's orientation at spawn.
    #[default]
    Local,
    World,
}

/// Extra per-particle velocity, drawn per axis at spawn.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Reflect)]
pub struct VelocityOverLifetime {
    pub space: VelocitySpace,
    pub x: ScalarRange,
    pub y: ScalarRange,
    pub z: ScalarRange,
}

impl VelocityOverLifetime {
    pub fn sample(&self) -> Vec3 {
        Vec3::new(self.x.sample(), self.y.sample(), self.z.sample())
    }
}

/// Recipe for the color-over-lifetime gradient.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Reflect)]
pub enum LifetimeGradient {
    /// start → end, alpha 1 → 0.
    TwoStop,
    /// start → end at the midpoint → transparent end, alpha 1 → 0.
    #[default]
    ThreeStop,
    /// Explicit color and alpha tracks; start/end colors are ignored.
    Tracks {
        colors: Vec<ColorKey>,
        alphas: Vec<AlphaKey>,
    },
}

impl LifetimeGradient {
    /// Resolve the recipe against a layer's start and end colors.
    pub fn resolve(&self, start: LinearRgba, end: LinearRgba) -> Result<Gradient, CurveError> {
        let fade_out = [
            AlphaKey {
                time: 0.0,
                alpha: start.alpha,
            },
            AlphaKey {
                time: 1.0,
                alpha: 0.0,
            },
        ];
        match self {
            Self::TwoStop => Gradient::from_tracks(
                &[
                    ColorKey {
                        time: 0.0,
                        color: start,
                    },
                    ColorKey {
                        time: 1.0,
                        color: end,
                    },
                ],
                &fade_out,
            ),
            Self::ThreeStop => Gradient::from_tracks(
                &[
                    ColorKey {
                        time: 0.0,
                        color: start,
                    },
                    ColorKey {
                        time: 0.5,
                        color: end,
                    },
                    ColorKey {
                        time: 1.0,
                        color: end,
                    },
                ],
                &fade_out,
            ),
            Self::Tracks { colors, alphas } => Gradient::from_tracks(colors, alphas),
        }
    }
}

// ---------------------------------------------------------------------------
// Emitter config
// ---------------------------------------------------------------------------

/// Complete parameter set of one particle layer.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Reflect)]
pub struct EmitterConfig {
    pub name: String,
    pub start_color: LinearRgba,
    pub end_color: LinearRgba,
    pub particle_size: ScalarRange,
    /// Seconds.
    pub lifetime: ScalarRange,
    /// Initial speed along the emission direction.
    pub speed: ScalarRange,
    /// Particles per second at full strength.
    pub emission_rate: f32,
    pub render_mode: RenderMode,
    pub shape: EmitterShape,
    /// Particles per world unit travelled by the emitter.
    #[serde(default)]
    pub rate_over_distance: f32,
    /// Multiplier on standard gravity (9.81 down).
    #[serde(default)]
    pub gravity: f32,
    #[serde(default)]
    pub noise: Option<NoiseConfig>,
    #[serde(default)]
    pub velocity_over_lifetime: Option<VelocityOverLifetime>,
    pub max_particles: u32,
    /// Higher values draw on top of lower ones.
    #[serde(default)]
    pub sorting_order: i32,
    #[serde(default)]
    pub color_over_lifetime: LifetimeGradient,
    #[serde(default)]
    pub size_over_lifetime: Curve,
    /// Material color multiplied with every gradient band.
    pub base_tint: LinearRgba,
    #[serde(default)]
    pub glow: GlowTexture,
}

impl EmitterConfig {
    /// A billboard layer with a cone of 10° / 0.02, three-stop gradient and
    /// shrinking size curve.
    pub fn new(
        name: impl Into<String>,
        start_color: LinearRgba,
        end_color: LinearRgba,
        particle_size: impl Into<ScalarRange>,
        lifetime: impl Into<ScalarRange>,
        speed: impl Into<ScalarRange>,
        emission_rate: f32,
    ) -> Self {
        Self {
            name: name.into(),
            start_color,
            end_color,
            particle_size: particle_size.into(),
            lifetime: lifetime.into(),
            speed: speed.into(),
            emission_rate,
            render_mode: RenderMode::Billboard,
            shape: EmitterShape::default(),
            rate_over_distance: 0.0,
            gravity: 0.0,
            noise: None,
            velocity_over_lifetime: None,
            max_particles: 1000,
            sorting_order: 0,
            color_over_lifetime: LifetimeGradient::ThreeStop,
            size_over_lifetime: Curve::shrink(),
            base_tint: LinearRgba::WHITE,
            glow: GlowTexture::default(),
        }
    }

    pub fn with_render_mode(mut self, mode: RenderMode) -> Self {
        self.render_mode = mode;
        self
    }

    pub fn with_shape(mut self, shape: EmitterShape) -> Self {
        self.shape = shape;
        self
    }

    pub fn with_rate_over_distance(mut self, rate: f32) -> Self {
        self.rate_over_distance = rate;
        self
    }

    pub fn with_gravity(mut self, gravity: f32) -> Self {
        self.gravity = gravity;
        self
    }

    pub fn with_noise(mut self, noise: NoiseConfig) -> Self {
        self.noise = Some(noise);
        self
    }

    pub fn with_velocity_over_lifetime(mut self, vol: VelocityOverLifetime) -> Self {
        self.velocity_over_lifetime = Some(vol);
        self
    }

    pub fn with_max_particles(mut self, max: u32) -> Self {
        self.max_particles = max;
        self
    }

    pub fn with_sorting_order(mut self, order: i32) -> Self {
        self.sorting_order = order;
        self
    }

    pub fn with_gradient(mut self, gradient: LifetimeGradient) -> Self {
        self.color_over_lifetime = gradient;
        self
    }

    pub fn with_base_tint(mut self, tint: LinearRgba) -> Self {
        self.base_tint = tint;
        self
    }

    pub fn with_glow(mut self, glow: GlowTexture) -> Self {
        self.glow = glow;
        self
    }

    pub fn validate(&self) -> Result<(), EmitterConfigError> {
        let layer = || self.name.clone();
        for (field, value) in [
            ("emission_rate", self.emission_rate),
            ("rate_over_distance", self.rate_over_distance),
            ("particle_size", self.particle_size.min_val()),
        ] {
            if value < 0.0 {
                return Err(EmitterConfigError::Negative {
                    layer: layer(),
                    field,
                    value,
                });
            }
        }
        if self.lifetime.min_val() <= 0.0 {
            return Err(EmitterConfigError::NonPositiveLifetime { layer: layer() });
        }
        if self.max_particles == 0 {
            return Err(EmitterConfigError::ZeroCapacity { layer: layer() });
        }
        if let EmitterShape::Cone { angle, .. } = self.shape {
            if !(0.0..90.0).contains(&angle) {
                return Err(EmitterConfigError::ConeAngle {
                    layer: layer(),
                    angle,
                });
            }
        }
        if self.glow.size == 0 {
            return Err(EmitterConfigError::EmptyGlow { layer: layer() });
        }
        if self.glow.size > MAX_GLOW_SIZE {
            return Err(EmitterConfigError::GlowTooLarge {
                layer: layer(),
                size: self.glow.size,
                max: MAX_GLOW_SIZE,
            });
        }
        self.size_over_lifetime
            .validate()
            .map_err(|source| EmitterConfigError::SizeCurve {
                layer: layer(),
                source,
            })?;
        self.gradient()?;
        Ok(())
    }

    /// The resolved color-over-lifetime gradient.
    pub fn gradient(&self) -> Result<Gradient, EmitterConfigError> {
        self.color_over_lifetime
            .resolve(self.start_color, self.end_color)
            .map_err(|source| EmitterConfigError::Gradient {
                layer: self.name.clone(),
                source,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sparks() -> EmitterConfig {
        EmitterConfig::new(
            "Sparks",
            LinearRgba::new(1.0, 0.9, 0.4, 1.0),
            LinearRgba::new(1.0, 0.5, 0.0, 1.0),
            0.03,
            0.5,
            2.0,
            20.0,
        )
    }

    #[test]
    fn three_stop_gradient_reaches_end_color_at_midpoint_and_fades_out() {
        let gradient = sparks().gradient().unwrap();
        let mid = gradient.sample(0.5);
        assert!((mid.green - 0.5).abs() < 1e-5);
        assert!((mid.alpha - 0.5).abs() < 1e-5);
        let end = gradient.sample(1.0);
        assert_eq!(end.alpha, 0.0);
        assert!((end.red - 1.0).abs() < 1e-5);
    }

    #[test]
    fn two_stop_gradient_keeps_start_alpha() {
        let config = EmitterConfig::new(
            "Trail",
            LinearRgba::new(1.0, 0.8, 0.4, 0.9),
            LinearRgba::new(1.0, 0.3, 0.0, 0.1),
            0.22,
            0.45,
            1.2,
            100.0,
        )
        .with_gradient(LifetimeGradient::TwoStop);
        let gradient = config.gradient().unwrap();
        assert_eq!(gradient.stops().len(), 2);
        assert!((gradient.sample(0.0).alpha - 0.9).abs() < 1e-5);
    }

    #[test]
    fn validate_reports_the_offending_layer() {
        assert!(sparks().validate().is_ok());

        let mut bad = sparks();
        bad.emission_rate = -1.0;
        assert_eq!(
            bad.validate(),
            Err(EmitterConfigError::Negative {
                layer: "Sparks".into(),
                field: "emission_rate",
                value: -1.0,
            })
        );

        let wide = sparks().with_shape(EmitterShape::cone(95.0, 0.1));
        assert!(matches!(
            wide.validate(),
            Err(EmitterConfigError::ConeAngle { angle, .. }) if angle == 95.0
        ));

        let broken = sparks().with_gradient(LifetimeGradient::Tracks {
            colors: Vec::new(),
            alphas: Vec::new(),
        });
        assert!(matches!(
            broken.validate(),
            Err(EmitterConfigError::Gradient {
                source: CurveError::Empty,
                ..
            })
        ));
    }

    #[test]
    fn oversized_glow_is_rejected() {
        let mut config = sparks();
        config.glow.size = 40_000;
        assert_eq!(
            config.validate(),
            Err(EmitterConfigError::GlowTooLarge {
                layer: "Sparks".into(),
                size: 40_000,
                max: MAX_GLOW_SIZE,
            })
        );

        config.glow.size = MAX_GLOW_SIZE;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn size_curve_from_ron_is_checked() {
        let mut config = sparks();
        config.size_over_lifetime =
            ron::from_str("(keys:[(time:0.9,value:1.0),(time:0.1,value:0.0),(time:4.0,value:7.0)])")
                .unwrap();
        assert!(matches!(
            config.validate(),
            Err(EmitterConfigError::SizeCurve {
                source: CurveError::NotMonotonic { .. },
                ..
            })
        ));

        config.size_over_lifetime = ron::from_str("(keys:[])").unwrap();
        assert!(matches!(
            config.validate(),
            Err(EmitterConfigError::SizeCurve {
                source: CurveError::Empty,
                ..
            })
        ));
    }

    #[test]
    fn config_survives_ron() {
        let config = sparks()
            .with_noise(NoiseConfig::with_strength(0.3))
            .with_render_mode(RenderMode::Stretch {
                length_scale: 1.8,
                speed_scale: 0.0,
            });
        let text = ron::to_string(&config).unwrap();
        let back: EmitterConfig = ron::from_str(&text).unwrap();
        assert_eq!(back, config);
    }
}
