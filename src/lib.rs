//! # Bevy Fire Trail
//!
//! Layered particle trails that follow the mouse cursor, fading in while the
//! pointer moves and out while it rests.
//!
//! ## Quick Start
//!
//! ```no_run
//! use bevy::prelude::*;
//! use bevy_fire_trail::{FireTrailPlugin, SettingsDriven, CursorTrail, TrailLibrary};
//!
//! fn main() {
//!     App::new()
//!         .add_plugins(DefaultPlugins)
//!         .add_plugins(FireTrailPlugin)
//!         .add_systems(Startup, setup)
//!         .run();
//! }
//!
//! fn setup(mut commands: Commands, library: Res<TrailLibrary>) {
//!     commands.spawn(Camera3d::default());
//!     if let Some(preset) = library.get("Fire Trail") {
//!         commands.spawn((SettingsDriven, CursorTrail::new(preset.clone())));
//!     }
//! }
//! ```
//!
//! ## Presets
//!
//! Every effect is a [`TrailPreset`]: a list of emitter layers, a motion
//! classifier config and an emission mode (linear fade or play/stop gate).
//! Built-ins are registered at startup and `assets/trails/*.trail.ron`
//! files override or extend them by name.
//!
//! Add [`TrailUiPlugin`] (requires `bevy_egui`) for the settings panel and
//! hotkeys: `1`–`9` pick presets, `R` cycles pointer projection, `O` toggles
//! the orthographic camera flag and `F1` toggles the panel.

pub mod constants;
pub mod fader;
pub mod flame_line;
pub mod motion;
pub mod pointer;
pub mod presets;
pub mod settings;
pub mod spiral;
pub mod trail;
pub mod ui;

use bevy::prelude::*;
use bevy_egui::EguiPrimaryContextPass;
use bevy_vfx::{VfxPlugin, VfxSet};

pub use fader::{EmissionFader, EmissionMode, LayerFade};
pub use flame_line::{FlameLine, FlameLineConfig, FlameTail};
pub use motion::{MotionConfig, MotionSource, MotionState, MotionTransition};
pub use pointer::{FrameContext, PointerProjection, ProjectionMode, resolve_pointer};
pub use presets::{LayerSpec, PresetError, TrailLibrary, TrailPreset};
pub use settings::{SettingsDriven, SettingsError, TrailSettings};
pub use spiral::SpiralMotion;
pub use trail::{CursorTrail, TrailSet, TrailState};

/// Trail controller, particle runtime and persisted settings.
pub struct FireTrailPlugin;

impl Plugin for FireTrailPlugin {
    fn build(&self, app: &mut App) {
        // Load settings on startup
        let settings = TrailSettings::load();
        app.add_plugins(VfxPlugin)
            .insert_resource(settings)
            .init_resource::<TrailLibrary>()
            .register_type::<SpiralMotion>()
            .register_type::<PointerProjection>()
            .register_type::<ProjectionMode>()
            .register_type::<MotionConfig>()
            .register_type::<MotionSource>()
            .register_type::<EmissionMode>()
            .register_type::<EmissionFader>()
            .register_type::<LayerFade>()
            .register_type::<FlameLineConfig>()
            .register_type::<TrailPreset>()
            .register_type::<LayerSpec>()
            .configure_sets(
                Update,
                (TrailSet::Build, TrailSet::Track, TrailSet::Classify, TrailSet::Emit)
                    .chain()
                    .before(VfxSet::Spawn),
            )
            .add_systems(PreStartup, presets::init_trail_library)
            .add_systems(
                Update,
                (
                    (settings::apply_trail_settings, trail::build_trail_layers)
                        .chain()
                        .in_set(TrailSet::Build),
                    (trail::track_pointer, spiral::advance_spirals).in_set(TrailSet::Track),
                    trail::classify_motion.in_set(TrailSet::Classify),
                    (trail::drive_emission, flame_line::update_flame_tails).in_set(TrailSet::Emit),
                ),
            );
    }
}

/// Settings panel and hotkeys. Needs `EguiPlugin`.
pub struct TrailUiPlugin;

impl Plugin for TrailUiPlugin {
    fn build(&self, app: &mut App) {
        app.add_systems(Update, ui::handle_hotkeys.before(TrailSet::Build))
            .add_systems(EguiPrimaryContextPass, ui::draw_trail_panel);
    }
}
