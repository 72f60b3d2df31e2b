use bevy::{
    diagnostic::{DiagnosticsStore, FrameTimeDiagnosticsPlugin},
    prelude::*,
};

use crate::sync::SyncCoordinator;

#[derive(Component)]
pub struct FpsText;

#[derive(Component)]
pub struct SyncStatusText;

pub fn spawn_status_overlay(mut commands: Commands) {
    let font = TextFont {
        font_size: 14.0,
        ..default()
    };
    let color = TextColor(Color::srgb(1.0, 1.0, 1.0));

    commands
        .spawn((
            Text::new("FPS: "),
            font.clone(),
            color,
            Node {
                position_type: PositionType::Absolute,
                left: Val::Px(12.0),
                top: Val::Px(12.0),
                ..default()
            },
        ))
        .with_children(|parent| {
            parent.spawn((TextSpan::default(), font.clone(), color, FpsText));
            parent.spawn((TextSpan::default(), font.clone(), color, SyncStatusText));
        });
}

pub fn update_fps_text(
    diagnostics: Res<DiagnosticsStore>,
    mut query: Query<&mut TextSpan, With<FpsText>>,
) {
    for mut span in &mut query {
        if let Some(fps) = diagnostics.get(&FrameTimeDiagnosticsPlugin::FPS) {
            if let Some(value) = fps.smoothed() {
                **span = format!("{value:.0}");
            }
        }
    }
}

pub fn update_sync_text(
    time: Res<Time>,
    coordinator: Res<SyncCoordinator>,
    mut query: Query<&mut TextSpan, With<SyncStatusText>>,
) {
    let now = time.elapsed_secs_f64();
    let clock = coordinator.clock();
    let playback = match clock.elapsed(now) {
        Some(elapsed) => format!("playing {elapsed:.2}s ({:?})", clock.start_kind),
        None if coordinator.scheduler().is_pending() => "start scheduled".to_string(),
        None => "stopped".to_string(),
    };
    let status = format!(
        "\nchannels: {} | ready: {} | longest line: {:.2}s | markers: {}\n{playback}",
        coordinator.registry().len(),
        coordinator.is_ready(),
        coordinator.longest_drawing_duration(),
        coordinator.markers().len(),
    );

    for mut span in &mut query {
        **span = status.clone();
    }
}
