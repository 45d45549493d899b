use std::ops::RangeInclusive;
use std::path::Path;

use bevy::prelude::*;
use bevy_egui::{EguiContexts, egui};

use crate::fader::EmissionMode;
use crate::pointer::ProjectionMode;
use crate::presets::{TRAILS_DIR, TrailLibrary, save_preset};
use crate::settings::TrailSettings;
use crate::trail::TrailState;

const PRESET_KEYS: [KeyCode; 9] = [
    KeyCode::Digit1,
    KeyCode::Digit2,
    KeyCode::Digit3,
    KeyCode::Digit4,
    KeyCode::Digit5,
    KeyCode::Digit6,
    KeyCode::Digit7,
    KeyCode::Digit8,
    KeyCode::Digit9,
];

/// Digits pick presets, `R` cycles projection mode, `O` toggles the
/// orthographic camera and `F1` toggles the panel.
pub(crate) fn handle_hotkeys(
    keys: Res<ButtonInput<KeyCode>>,
    library: Res<TrailLibrary>,
    mut settings: ResMut<TrailSettings>,
) {
    let mut changed = false;

    for (index, key) in PRESET_KEYS.iter().enumerate() {
        if keys.just_pressed(*key)
            && let Some(name) = library.nth(index)
            && settings.preset != name
        {
            info!("Trail preset: {}", name);
            settings.preset = name.to_string();
            changed = true;
        }
    }

    if keys.just_pressed(KeyCode::KeyR) {
        settings.projection.mode = settings.projection.mode.next();
        info!("Pointer projection: {}", settings.projection.mode.label());
        changed = true;
    }

    if keys.just_pressed(KeyCode::KeyO) {
        settings.orthographic = !settings.orthographic;
        changed = true;
    }

    if keys.just_pressed(KeyCode::F1) {
        settings.show_panel = !settings.show_panel;
        changed = true;
    }

    if changed {
        settings.save();
    }
}

/// Slider for an optional override. Unchecked means "use the preset value",
/// shown greyed out.
fn override_slider(
    ui: &mut egui::Ui,
    label: &str,
    value: &mut Option<f32>,
    preset_value: f32,
    range: RangeInclusive<f32>,
) -> bool {
    let mut changed = false;
    ui.label(label);
    ui.horizontal(|ui| {
        let mut enabled = value.is_some();
        if ui.checkbox(&mut enabled, "").changed() {
            *value = enabled.then_some(preset_value);
            changed = true;
        }
        let mut shown = value.unwrap_or(preset_value);
        let response = ui.add_enabled(enabled, egui::Slider::new(&mut shown, range));
        if response.changed() {
            *value = Some(shown);
            changed = true;
        }
    });
    ui.end_row();
    changed
}

/// Draw the trail settings window
pub(crate) fn draw_trail_panel(
    mut contexts: EguiContexts,
    mut settings: ResMut<TrailSettings>,
    library: Res<TrailLibrary>,
    trails: Query<&TrailState>,
) -> Result {
    if !settings.show_panel {
        return Ok(());
    }

    let ctx = contexts.ctx_mut()?;
    let Some(base) = library.get(&settings.preset).cloned() else {
        return Ok(());
    };

    let mut open = true;
    let mut changed = false;
    let settings = &mut *settings;

    egui::Window::new("Trail Settings")
        .open(&mut open)
        .resizable(false)
        .show(ctx, |ui| {
            ui.heading("Preset");
            egui::Grid::new("trail_preset_grid")
                .num_columns(2)
                .spacing([10.0, 8.0])
                .show(ui, |ui| {
                    ui.label("Preset:");
                    egui::ComboBox::from_id_salt("trail_preset_combo")
                        .selected_text(settings.preset.as_str())
                        .show_ui(ui, |ui| {
                            for name in library.names() {
                                if ui
                                    .selectable_value(&mut settings.preset, name.clone(), name.as_str())
                                    .changed()
                                {
                                    changed = true;
                                }
                            }
                        });
                    ui.end_row();

                    ui.label("Emission Scale:");
                    changed |= ui
                        .add(egui::Slider::new(&mut settings.emission_scale, 0.0..=3.0).suffix("x"))
                        .changed();
                    ui.end_row();
                });

            ui.add_space(8.0);
            ui.separator();
            ui.add_space(4.0);

            ui.heading("Pointer");
            egui::Grid::new("trail_pointer_grid")
                .num_columns(2)
                .spacing([10.0, 8.0])
                .show(ui, |ui| {
                    ui.label("Projection:");
                    egui::ComboBox::from_id_salt("trail_projection_combo")
                        .selected_text(settings.projection.mode.label())
                        .show_ui(ui, |ui| {
                            for mode in ProjectionMode::ALL {
                                if ui
                                    .selectable_value(&mut settings.projection.mode, mode, mode.label())
                                    .changed()
                                {
                                    changed = true;
                                }
                            }
                        });
                    ui.end_row();

                    ui.label("Ortho Z Offset:");
                    changed |= ui
                        .add(egui::Slider::new(&mut settings.projection.z_offset, 0.0..=5.0))
                        .changed();
                    ui.end_row();

                    ui.label("Perspective Depth:");
                    changed |= ui
                        .add(egui::Slider::new(&mut settings.projection.perspective_depth, 0.5..=50.0))
                        .changed();
                    ui.end_row();

                    ui.label("Plane Height:");
                    changed |= ui
                        .add(egui::Slider::new(&mut settings.projection.plane_height, -10.0..=10.0))
                        .changed();
                    ui.end_row();

                    ui.label("Orthographic:");
                    changed |= ui.checkbox(&mut settings.orthographic, "").changed();
                    ui.end_row();
                });

            ui.add_space(8.0);
            ui.separator();
            ui.add_space(4.0);

            ui.heading("Motion");
            egui::Grid::new("trail_motion_grid")
                .num_columns(2)
                .spacing([10.0, 8.0])
                .show(ui, |ui| {
                    changed |= override_slider(
                        ui,
                        "Follow Speed:",
                        &mut settings.follow_speed,
                        base.follow_speed,
                        0.0..=40.0,
                    );
                    changed |= override_slider(
                        ui,
                        "Move Threshold:",
                        &mut settings.motion_threshold,
                        base.motion.threshold,
                        0.0..=5.0,
                    );
                    changed |= override_slider(
                        ui,
                        "Idle Dwell:",
                        &mut settings.dwell,
                        base.motion.dwell,
                        0.0..=2.0,
                    );
                    if let EmissionMode::Fade(fader) = base.emission {
                        changed |= override_slider(
                            ui,
                            "Fade Window:",
                            &mut settings.fade_window,
                            fader.window,
                            0.0..=2.0,
                        );
                    }
                });

            for state in &trails {
                let status = if state.motion.is_moving { "Moving" } else { "Idle" };
                ui.label(format!("{} (idle {:.2}s)", status, state.motion.idle_timer));
            }

            ui.add_space(8.0);
            ui.horizontal(|ui| {
                if ui.button("Reset Overrides").clicked() {
                    settings.follow_speed = None;
                    settings.motion_threshold = None;
                    settings.dwell = None;
                    settings.fade_window = None;
                    changed = true;
                }
                if ui.button("Save Preset").clicked() {
                    match save_preset(Path::new(TRAILS_DIR), &settings.apply(&base)) {
                        Ok(path) => info!("Saved trail preset to {:?}", path),
                        Err(e) => error!("Failed to save trail preset: {}", e),
                    }
                }
            });
        });

    if !open {
        settings.show_panel = false;
        changed = true;
    }
    if changed {
        settings.save();
    }
    Ok(())
}
