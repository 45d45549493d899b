//! Keyframed curves and color gradients sampled over normalized particle lifetime.

use bevy::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Rejected key layouts for [`Curve`] and [`Gradient`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CurveError {
    #[error("at least one key is required")]
    Empty,
    #[error("key time {0} is outside [0, 1]")]
    OutOfRange(f32),
    #[error("key times must be non-decreasing, got {previous} followed by {next}")]
    NotMonotonic { previous: f32, next: f32 },
}

fn validate_times(times: impl Iterator<Item = f32>) -> Result<(), CurveError> {
    let mut previous: Option<f32> = None;
    let mut seen = false;
    for t in times {
        seen = true;
        if !(0.0..=1.0).contains(&t) {
            return Err(CurveError::OutOfRange(t));
        }
        if let Some(p) = previous {
            if t < p {
                return Err(CurveError::NotMonotonic {
                    previous: p,
                    next: t,
                });
            }
        }
        previous = Some(t);
    }
    if seen { Ok(()) } else { Err(CurveError::Empty) }
}

/// Locate the pair of keys surrounding `t` and the fraction between them.
/// `times` must be non-empty and sorted.
fn bracket(times: &[f32], t: f32) -> (usize, usize, f32) {
    let last = times.len() - 1;
    if t <= times[0] {
        return (0, 0, 0.0);
    }
    if t >= times[last] {
        return (last, last, 0.0);
    }
    for i in 0..last {
        let (a, b) = (times[i], times[i + 1]);
        if t >= a && t <= b {
            let span = b - a;
            if span.abs() < 1e-6 {
                return (i, i, 0.0);
            }
            return (i, i + 1, (t - a) / span);
        }
    }
    (last, last, 0.0)
}

// ---------------------------------------------------------------------------
// Curve — scalar over normalized time [0..1]
// ---------------------------------------------------------------------------

/// Piecewise-linear scalar curve over normalized lifetime.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Reflect)]
pub struct Curve {
    keys: Vec<CurveKey>,
}

/// Single keyframe in a [`Curve`].
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Reflect)]
pub struct CurveKey {
    /// Normalized time (0.0 - 1.0).
    pub time: f32,
    pub value: f32,
}

impl Curve {
    pub fn new(keys: Vec<CurveKey>) -> Result<Self, CurveError> {
        validate_times(keys.iter().map(|k| k.time))?;
        Ok(Self { keys })
    }

    /// Linear ramp from `start` at t=0 to `end` at t=1.
    pub fn linear(start: f32, end: f32) -> Self {
        Self {
            keys: vec![
                CurveKey {
                    time: 0.0,
                    value: start,
                },
                CurveKey {
                    time: 1.0,
                    value: end,
                },
            ],
        }
    }

    /// Full size at birth shrinking to nothing at death.
    pub fn shrink() -> Self {
        Self::linear(1.0, 0.0)
    }

    /// Re-check key times. Curves read from preset files skip [`Curve::new`].
    pub fn validate(&self) -> Result<(), CurveError> {
        validate_times(self.keys.iter().map(|k| k.time))
    }

    /// Sample at normalized time `t` (clamped to [0..1]).
    pub fn sample(&self, t: f32) -> f32 {
        if self.keys.is_empty() {
            return 0.0;
        }
        let times: Vec<f32> = self.keys.iter().map(|k| k.time).collect();
        let (a, b, frac) = bracket(&times, t.clamp(0.0, 1.0));
        let (va, vb) = (self.keys[a].value, self.keys[b].value);
        va + (vb - va) * frac
    }
}

impl Default for Curve {
    fn default() -> Self {
        Self::shrink()
    }
}

// ---------------------------------------------------------------------------
// Gradient — color over normalized time [0..1]
// ---------------------------------------------------------------------------

/// Color/alpha keyframes over normalized lifetime, linearly blended.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Reflect)]
pub struct Gradient {
    stops: Vec<GradientStop>,
}

/// One stop of a [`Gradient`]. Alpha travels in `color.alpha`.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Reflect)]
pub struct GradientStop {
    /// Normalized time (0.0 - 1.0).
    pub position: f32,
    pub color: LinearRgba,
}

/// RGB keyframe used when building a gradient from separate color and alpha tracks.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Reflect)]
pub struct ColorKey {
    pub time: f32,
    pub color: LinearRgba,
}

/// Alpha keyframe used when building a gradient from separate color and alpha tracks.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Reflect)]
pub struct AlphaKey {
    pub time: f32,
    pub alpha: f32,
}

impl Gradient {
    pub fn new(stops: Vec<GradientStop>) -> Result<Self, CurveError> {
        validate_times(stops.iter().map(|s| s.position))?;
        Ok(Self { stops })
    }

    /// Merge independent color and alpha tracks into one gradient.
    ///
    /// Every key time from either track becomes a stop; RGB is sampled from
    /// the color track (its alpha ignored) and alpha from the alpha track.
    pub fn from_tracks(colors: &[ColorKey], alphas: &[AlphaKey]) -> Result<Self, CurveError> {
        validate_times(colors.iter().map(|k| k.time))?;
        validate_times(alphas.iter().map(|k| k.time))?;

        let mut times: Vec<f32> = colors
            .iter()
            .map(|k| k.time)
            .chain(alphas.iter().map(|k| k.time))
            .collect();
        times.sort_by(f32::total_cmp);
        times.dedup_by(|a, b| (*a - *b).abs() < 1e-6);

        let color_times: Vec<f32> = colors.iter().map(|k| k.time).collect();
        let alpha_times: Vec<f32> = alphas.iter().map(|k| k.time).collect();

        let stops = times
            .into_iter()
            .map(|t| {
                let (a, b, frac) = bracket(&color_times, t);
                let rgb = lerp_color(colors[a].color, colors[b].color, frac);
                let (a, b, frac) = bracket(&alpha_times, t);
                let alpha = alphas[a].alpha + (alphas[b].alpha - alphas[a].alpha) * frac;
                GradientStop {
                    position: t,
                    color: LinearRgba::new(rgb.red, rgb.green, rgb.blue, alpha),
                }
            })
            .collect();

        Ok(Self { stops })
    }

    pub fn white_to_transparent() -> Self {
        Self {
            stops: vec![
                GradientStop {
                    position: 0.0,
                    color: LinearRgba::WHITE,
                },
                GradientStop {
                    position: 1.0,
                    color: LinearRgba::new(1.0, 1.0, 1.0, 0.0),
                },
            ],
        }
    }

    pub fn stops(&self) -> &[GradientStop] {
        &self.stops
    }

    /// Sample at normalized time `t` (clamped to [0..1]).
    pub fn sample(&self, t: f32) -> LinearRgba {
        if self.stops.is_empty() {
            return LinearRgba::WHITE;
        }
        let times: Vec<f32> = self.stops.iter().map(|s| s.position).collect();
        let (a, b, frac) = bracket(&times, t.clamp(0.0, 1.0));
        lerp_color(self.stops[a].color, self.stops[b].color, frac)
    }
}

impl Default for Gradient {
    fn default() -> Self {
        Self::white_to_transparent()
    }
}

fn lerp_color(a: LinearRgba, b: LinearRgba, t: f32) -> LinearRgba {
    LinearRgba::new(
        a.red + (b.red - a.red) * t,
        a.green + (b.green - a.green) * t,
        a.blue + (b.blue - a.blue) * t,
        a.alpha + (b.alpha - a.alpha) * t,
    )
}
