//! Demo scene: a cursor trail over a small collider playground.
//!
//! `1`–`6` switch presets, `R` toggles raycast projection (try it over the
//! blocks), `O` switches to an orthographic camera and `F1` opens the panel.

use avian3d::prelude::{Collider, PhysicsPlugins, RigidBody};
use bevy::prelude::*;
use bevy_egui::EguiPlugin;
use bevy_fire_trail::{CursorTrail, FireTrailPlugin, SettingsDriven, TrailLibrary, TrailSettings, TrailUiPlugin};

/// World units per pixel of the orthographic camera.
const ORTHO_SCALE: f32 = 0.02;

#[derive(Component)]
struct DemoCamera;

fn main() {
    App::new()
        .add_plugins(DefaultPlugins.set(WindowPlugin {
            primary_window: Some(Window {
                title: "Bevy Fire Trail".to_string(),
                ..default()
            }),
            ..default()
        }))
        // Third-party plugins
        .add_plugins(EguiPlugin::default())
        .add_plugins(PhysicsPlugins::default())
        // Trail
        .add_plugins(FireTrailPlugin)
        .add_plugins(TrailUiPlugin)
        .insert_resource(ClearColor(Color::srgb(0.02, 0.02, 0.03)))
        .add_systems(Startup, setup_scene)
        .add_systems(Update, sync_camera_projection)
        .run();
}

fn setup_scene(
    mut commands: Commands,
    mut meshes: ResMut<Assets<Mesh>>,
    mut materials: ResMut<Assets<StandardMaterial>>,
    settings: Res<TrailSettings>,
    library: Res<TrailLibrary>,
) {
    commands.spawn((
        Name::new("Camera"),
        DemoCamera,
        Camera3d::default(),
        Transform::from_xyz(0.0, 6.0, 10.0).looking_at(Vec3::ZERO, Vec3::Y),
    ));

    commands.spawn((
        Name::new("Sun"),
        DirectionalLight {
            illuminance: 8_000.0,
            shadows_enabled: false,
            ..default()
        },
        Transform::from_rotation(Quat::from_euler(EulerRot::XYZ, -0.8, 0.4, 0.0)),
    ));

    let stone = materials.add(StandardMaterial {
        base_color: Color::srgb(0.12, 0.12, 0.14),
        perceptual_roughness: 0.9,
        ..default()
    });

    commands.spawn((
        Name::new("Ground"),
        Mesh3d(meshes.add(Cuboid::new(20.0, 0.1, 20.0))),
        MeshMaterial3d(stone.clone()),
        Transform::from_xyz(0.0, -0.05, 0.0),
        RigidBody::Static,
        Collider::cuboid(20.0, 0.1, 20.0),
    ));

    for (i, height) in [1.0, 2.0, 0.5, 1.5].into_iter().enumerate() {
        let x = i as f32 * 2.5 - 3.75;
        commands.spawn((
            Name::new(format!("Block {}", i + 1)),
            Mesh3d(meshes.add(Cuboid::new(1.0, height, 1.0))),
            MeshMaterial3d(stone.clone()),
            Transform::from_xyz(x, height / 2.0, -2.0),
            RigidBody::Static,
            Collider::cuboid(1.0, height, 1.0),
        ));
    }

    let preset = library
        .get(&settings.preset)
        .or_else(|| library.nth(0).and_then(|name| library.get(name)));
    let Some(preset) = preset else {
        warn!("No trail presets available");
        return;
    };
    commands.spawn((
        Name::new("Cursor Trail"),
        SettingsDriven,
        CursorTrail::new(preset.clone()),
    ));
}

/// Swap the demo camera between perspective and orthographic.
fn sync_camera_projection(
    settings: Res<TrailSettings>,
    mut cameras: Query<&mut Projection, With<DemoCamera>>,
) {
    if !settings.is_changed() {
        return;
    }
    for mut projection in &mut cameras {
        let orthographic = matches!(*projection, Projection::Orthographic(_));
        if orthographic == settings.orthographic {
            continue;
        }
        *projection = if settings.orthographic {
            Projection::Orthographic(OrthographicProjection {
                scale: ORTHO_SCALE,
                ..OrthographicProjection::default_3d()
            })
        } else {
            Projection::Perspective(PerspectiveProjection::default())
        };
        info!(
            "Camera: {}",
            if settings.orthographic { "orthographic" } else { "perspective" }
        );
    }
}
