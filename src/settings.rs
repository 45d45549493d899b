use bevy::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::fader::EmissionMode;
use crate::pointer::PointerProjection;
use crate::presets::{TrailLibrary, TrailPreset};
use crate::trail::CursorTrail;

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("could not determine the config directory")]
    NoConfigDir,
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
    #[error("failed to serialize settings: {0}")]
    Serialize(#[from] ron::Error),
}

/// Trail settings that persist to disk
#[derive(Resource, Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct TrailSettings {
    /// Name of the active preset in the `TrailLibrary`
    pub preset: String,
    /// Pointer → world projection
    #[serde(default)]
    pub projection: PointerProjection,
    /// Multiplier on every layer's emission rate
    #[serde(default = "default_emission_scale")]
    pub emission_scale: f32,
    /// Overrides the preset's follow speed
    #[serde(default)]
    pub follow_speed: Option<f32>,
    /// Overrides the preset's fade window (fade presets only)
    #[serde(default)]
    pub fade_window: Option<f32>,
    /// Overrides the preset's motion threshold
    #[serde(default)]
    pub motion_threshold: Option<f32>,
    /// Overrides the preset's idle dwell
    #[serde(default)]
    pub dwell: Option<f32>,
    /// Use an orthographic camera in the demo
    #[serde(default)]
    pub orthographic: bool,
    /// Show the settings panel
    #[serde(default = "default_show_panel")]
    pub show_panel: bool,
}

fn default_emission_scale() -> f32 {
    1.0
}

fn default_show_panel() -> bool {
    true
}

impl Default for TrailSettings {
    fn default() -> Self {
        Self {
            preset: "Fire Trail".to_string(),
            projection: PointerProjection::default(),
            emission_scale: 1.0,
            follow_speed: None,
            fade_window: None,
            motion_threshold: None,
            dwell: None,
            orthographic: false,
            show_panel: true,
        }
    }
}

impl TrailSettings {
    /// Get the settings file path
    fn file_path() -> Option<PathBuf> {
        dirs::config_dir().map(|mut p| {
            p.push("bevy_fire_trail");
            p.push("settings.ron");
            p
        })
    }

    pub fn load_from(path: &Path) -> Result<Self, SettingsError> {
        let content = fs::read_to_string(path).map_err(|source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        ron::from_str(&content).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn save_to(&self, path: &Path) -> Result<(), SettingsError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| SettingsError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let content = ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())?;
        fs::write(path, content).map_err(|source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load settings from disk, or return defaults if missing or invalid
    pub fn load() -> Self {
        let Some(path) = Self::file_path() else {
            return Self::default();
        };
        if !path.exists() {
            return Self::default();
        }
        match Self::load_from(&path) {
            Ok(settings) => settings,
            Err(e) => {
                warn!("Using default trail settings: {}", e);
                Self::default()
            }
        }
    }

    /// Save settings to disk
    pub fn save(&self) {
        let result = Self::file_path()
            .ok_or(SettingsError::NoConfigDir)
            .and_then(|path| self.save_to(&path).map(|_| path));
        match result {
            Ok(path) => info!("Settings saved to: {:?}", path),
            Err(e) => error!("Failed to save settings: {}", e),
        }
    }

    /// The preset with this settings' overrides applied.
    pub fn apply(&self, preset: &TrailPreset) -> TrailPreset {
        let mut out = preset.clone();
        if let Some(speed) = self.follow_speed {
            out.follow_speed = speed.max(0.0);
        }
        if let Some(threshold) = self.motion_threshold {
            out.motion.threshold = threshold.max(0.0);
        }
        if let Some(dwell) = self.dwell {
            out.motion.dwell = dwell.max(0.0);
        }
        if let (Some(window), EmissionMode::Fade(fader)) = (self.fade_window, &mut out.emission) {
            fader.window = window.max(0.0);
        }
        out
    }
}

/// Marks a trail whose preset and tuning come from [`TrailSettings`].
#[derive(Component, Default, Clone, Copy, Debug)]
pub struct SettingsDriven;

/// Push the settings' preset, overrides and projection into driven trails.
pub(crate) fn apply_trail_settings(
    settings: Res<TrailSettings>,
    library: Res<TrailLibrary>,
    mut trails: Query<(&mut CursorTrail, Ref<SettingsDriven>)>,
) {
    let refresh = settings.is_changed() || library.is_changed();
    if !refresh && !trails.iter().any(|(_, marker)| marker.is_added()) {
        return;
    }

    let Some(preset) = library.get(&settings.preset) else {
        warn!("Unknown trail preset '{}'", settings.preset);
        return;
    };
    let preset = settings.apply(preset);
    for (mut trail, marker) in &mut trails {
        if !refresh && !marker.is_added() {
            continue;
        }
        trail.set_if_neq(CursorTrail {
            preset: preset.clone(),
            emission_scale: settings.emission_scale,
            projection: settings.projection,
        });
    }
}
