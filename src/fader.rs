//! Emission rate control: a linear fade on idle time, or a hard play/stop gate.

use bevy::prelude::*;
use bevy_vfx::StopBehavior;
use serde::{Deserialize, Serialize};

use crate::constants::fade;
use crate::motion::MotionTransition;

/// Maps idle time to an emission multiplier in `[0, 1]`.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Reflect)]
pub struct EmissionFader {
    /// Seconds over which emission decays to zero at `fade_speed = 1`.
    pub window: f32,
}

impl Default for EmissionFader {
    fn default() -> Self {
        Self {
            window: fade::WINDOW,
        }
    }
}

impl EmissionFader {
    /// `clamp01(1 − idle · fade_speed / window)`. A non-positive window cuts
    /// emission as soon as any idle time accrues.
    pub fn alpha(&self, idle: f32, fade_speed: f32) -> f32 {
        if self.window <= 0.0 {
            return if idle > 0.0 { 0.0 } else { 1.0 };
        }
        (1.0 - idle * fade_speed / self.window).clamp(0.0, 1.0)
    }
}

/// Per-layer fade parameters.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Reflect)]
pub struct LayerFade {
    /// Rate over time at full strength.
    pub base_rate: f32,
    #[serde(default = "default_fade_speed")]
    pub fade_speed: f32,
    /// Stop the emitter at alpha 0 and resume once alpha is positive again.
    #[serde(default)]
    pub stop_at_zero: bool,
}

fn default_fade_speed() -> f32 {
    1.0
}

impl LayerFade {
    pub fn new(base_rate: f32) -> Self {
        Self {
            base_rate,
            fade_speed: 1.0,
            stop_at_zero: false,
        }
    }
}

/// How a trail's layers react to motion.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Reflect)]
pub enum EmissionMode {
    /// Scale each layer's rate by the fader alpha every frame.
    Fade(EmissionFader),
    /// Play on `StartedMoving`, stop on `BecameIdle`.
    Gate { stop: StopBehavior },
}

impl Default for EmissionMode {
    fn default() -> Self {
        Self::Fade(EmissionFader::default())
    }
}

/// Emitter playback change requested for this frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Playback {
    Play,
    Stop(StopBehavior),
}

/// What one layer should do this frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LayerDrive {
    /// New rate over time, or `None` to leave it untouched.
    pub rate: Option<f32>,
    pub playback: Option<Playback>,
}

/// Decide a layer's rate and playback from the classifier output.
///
/// `rate_scale` is the trail-wide multiplier; `emitting` is the layer's
/// current playback state.
pub fn drive(
    mode: &EmissionMode,
    layer: &LayerFade,
    rate_scale: f32,
    idle_timer: f32,
    transition: Option<MotionTransition>,
    emitting: bool,
) -> LayerDrive {
    match mode {
        EmissionMode::Fade(fader) => {
            let alpha = fader.alpha(idle_timer, layer.fade_speed);
            let playback = match (layer.stop_at_zero, alpha > 0.0, emitting) {
                (true, false, true) => Some(Playback::Stop(StopBehavior::StopEmitting)),
                (true, true, false) => Some(Playback::Play),
                _ => None,
            };
            LayerDrive {
                rate: Some(layer.base_rate * rate_scale * alpha),
                playback,
            }
        }
        EmissionMode::Gate { stop } => LayerDrive {
            rate: Some(layer.base_rate * rate_scale),
            playback: match transition {
                Some(MotionTransition::StartedMoving) if !emitting => Some(Playback::Play),
                Some(MotionTransition::BecameIdle) if emitting => Some(Playback::Stop(*stop)),
                _ => None,
            },
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alpha_is_non_increasing_and_saturates() {
        let fader = EmissionFader { window: 0.4 };
        let mut previous = f32::INFINITY;
        for i in 0..=60 {
            let idle = i as f32 / 60.0;
            let a = fader.alpha(idle, 1.0);
            assert!(a <= previous);
            assert!((0.0..=1.0).contains(&a));
            previous = a;
        }
        assert_eq!(fader.alpha(0.0, 1.0), 1.0);
        assert_eq!(fader.alpha(0.4, 1.0), 0.0);
        assert_eq!(fader.alpha(5.0, 1.0), 0.0);
    }

    #[test]
    fn fade_speed_shortens_the_window() {
        let fader = EmissionFader { window: 0.4 };
        assert!((fader.alpha(0.1, 2.0) - 0.5).abs() < 1e-6);
        assert_eq!(fader.alpha(0.2, 2.0), 0.0);
    }

    #[test]
    fn fade_scales_base_rate() {
        let mode = EmissionMode::Fade(EmissionFader { window: 0.4 });
        let layer = LayerFade::new(16.0);
        let d = drive(&mode, &layer, 1.0, 0.2, None, true);
        assert!((d.rate.unwrap() - 8.0).abs() < 1e-5);
        assert_eq!(d.playback, None);

        let d = drive(&mode, &layer, 0.5, 0.0, None, true);
        assert_eq!(d.rate, Some(8.0));
    }

    #[test]
    fn stop_at_zero_toggles_playback() {
        let mode = EmissionMode::Fade(EmissionFader { window: 0.4 });
        let layer = LayerFade {
            stop_at_zero: true,
            ..LayerFade::new(10.0)
        };
        let stopped = drive(&mode, &layer, 1.0, 1.0, None, true);
        assert_eq!(stopped.playback, Some(Playback::Stop(StopBehavior::StopEmitting)));
        assert_eq!(stopped.rate, Some(0.0));

        // Already stopped: nothing more to do.
        assert_eq!(drive(&mode, &layer, 1.0, 1.0, None, false).playback, None);

        let resumed = drive(&mode, &layer, 1.0, 0.0, None, false);
        assert_eq!(resumed.playback, Some(Playback::Play));
    }

    #[test]
    fn gate_follows_transitions() {
        let mode = EmissionMode::Gate {
            stop: StopBehavior::StopEmittingAndClear,
        };
        let layer = LayerFade::new(140.0);

        let start = drive(&mode, &layer, 1.0, 0.0, Some(MotionTransition::StartedMoving), false);
        assert_eq!(start.playback, Some(Playback::Play));
        assert_eq!(start.rate, Some(140.0));

        let idle = drive(&mode, &layer, 1.0, 0.5, Some(MotionTransition::BecameIdle), true);
        assert_eq!(
            idle.playback,
            Some(Playback::Stop(StopBehavior::StopEmittingAndClear))
        );

        assert_eq!(drive(&mode, &layer, 1.0, 0.5, None, true).playback, None);
    }
}
