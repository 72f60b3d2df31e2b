use bevy::{diagnostic::FrameTimeDiagnosticsPlugin, prelude::*};

pub mod status_overlay;

pub struct DebugPlugin;

impl Plugin for DebugPlugin {
    fn build(&self, app: &mut App) {
        app.add_plugins(FrameTimeDiagnosticsPlugin::default())
            .add_systems(Startup, status_overlay::spawn_status_overlay)
            .add_systems(
                Update,
                (
                    status_overlay::update_fps_text,
                    status_overlay::update_sync_text,
                ),
            );
    }
}
