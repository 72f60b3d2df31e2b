use bevy::{
    prelude::*,
    window::{ExitCondition, PrimaryWindow, WindowPlugin},
};

use beatline::file::config::{AppConfig, ConfigPlugin};
use beatline::sync::{
    MarkerHandle, MarkerPulsed, MarkerSpawned, MarkersCleared, StartMode, SyncCoordinator,
    SyncInput, SyncPlugin, SyncSet,
};

#[cfg(not(feature = "production"))]
use beatline::debug::DebugPlugin;

const CHANNEL_KEYS: [KeyCode; 9] = [
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
const DEMO_BPM: f64 = 120.0;
const MARKER_SIZE: f32 = 18.0;
const PULSE_SECS: f32 = 0.25;

fn main() {
    App::new()
        .add_plugins((
            ConfigPlugin,
            DefaultPlugins.set(WindowPlugin {
                primary_window: Some(Window {
                    title: "beatline".to_string(),
                    ..default()
                }),
                exit_condition: ExitCondition::OnPrimaryClosed,
                ..default()
            }),
            #[cfg(not(feature = "production"))]
            DebugPlugin,
        ))
        .add_plugins(SyncPlugin)
        .init_resource::<Metronome>()
        .add_systems(Startup, setup_camera)
        .add_systems(
            Update,
            (track_cursor, keyboard_lines, metronome_beats)
                .chain()
                .before(SyncSet),
        )
        .add_systems(
            Update,
            (spawn_marker_sprites, pulse_marker_sprites, clear_marker_sprites, animate_pulses)
                .chain()
                .after(SyncSet),
        )
        .run();
}

/// Beat source for the demo: one beat per channel on every tick of a fixed tempo.
#[derive(Resource)]
struct Metronome {
    beat_period: f64,
    next_beat: f64,
}

impl FromWorld for Metronome {
    fn from_world(world: &mut World) -> Self {
        let bpm = match world.get_resource::<AppConfig>().map(|c| c.sync.start_mode) {
            Some(StartMode::NextBeat { bpm }) if bpm > 0.0 => bpm,
            _ => DEMO_BPM,
        };
        Self {
            beat_period: 60.0 / bpm,
            next_beat: 0.0,
        }
    }
}

#[derive(Component)]
struct MarkerSprite {
    handle: MarkerHandle,
}

#[derive(Component)]
struct Pulse {
    remaining: f32,
}

fn setup_camera(mut commands: Commands) {
    commands.spawn(Camera2d);
}

fn keyboard_lines(
    keys: Res<ButtonInput<KeyCode>>,
    coordinator: Res<SyncCoordinator>,
    mut inputs: MessageWriter<SyncInput>,
) {
    for (key, channel) in CHANNEL_KEYS.iter().zip(coordinator.registry().ids()) {
        if keys.just_pressed(*key) {
            inputs.write(SyncInput::line_started(channel));
        }
        if keys.just_released(*key) {
            inputs.write(SyncInput::line_completed(channel));
        }
    }

    if keys.just_pressed(KeyCode::KeyF) {
        inputs.write(SyncInput::ForceStart);
    }
    if keys.just_pressed(KeyCode::KeyR) {
        inputs.write(SyncInput::ResetSession);
    }
    if keys.just_pressed(KeyCode::KeyS) {
        inputs.write(SyncInput::StopPlayback);
    }
}

fn track_cursor(
    window: Single<&Window, With<PrimaryWindow>>,
    camera: Single<(&Camera, &GlobalTransform)>,
    mut inputs: MessageWriter<SyncInput>,
) {
    let Some(cursor) = window.cursor_position() else {
        return;
    };
    let (camera, transform) = *camera;
    if let Ok(position) = camera.viewport_to_world_2d(transform, cursor) {
        inputs.write(SyncInput::CursorMoved { position });
    }
}

fn metronome_beats(
    time: Res<Time>,
    mut metronome: ResMut<Metronome>,
    coordinator: Res<SyncCoordinator>,
    mut inputs: MessageWriter<SyncInput>,
) {
    let now = time.elapsed_secs_f64();
    if now < metronome.next_beat {
        return;
    }
    let beat_time = metronome.next_beat;
    metronome.next_beat = (now / metronome.beat_period).floor() * metronome.beat_period
        + metronome.beat_period;

    for channel in coordinator.registry().ids() {
        inputs.write(SyncInput::beat(channel, beat_time));
    }
}

fn spawn_marker_sprites(mut commands: Commands, mut spawned: MessageReader<MarkerSpawned>) {
    for marker in spawned.read() {
        commands.spawn((
            Sprite::from_color(marker.color, Vec2::splat(MARKER_SIZE)),
            Transform::from_translation(marker.position.extend(1.0)),
            MarkerSprite {
                handle: marker.handle,
            },
        ));
    }
}

fn pulse_marker_sprites(
    mut commands: Commands,
    mut pulsed: MessageReader<MarkerPulsed>,
    sprites: Query<(Entity, &MarkerSprite)>,
) {
    for pulse in pulsed.read() {
        for (entity, sprite) in &sprites {
            if sprite.handle == pulse.handle {
                commands.entity(entity).insert(Pulse {
                    remaining: PULSE_SECS,
                });
            }
        }
    }
}

fn clear_marker_sprites(
    mut commands: Commands,
    mut cleared: MessageReader<MarkersCleared>,
    sprites: Query<(Entity, &MarkerSprite)>,
) {
    for batch in cleared.read() {
        for (entity, sprite) in &sprites {
            if batch.handles.contains(&sprite.handle) {
                commands.entity(entity).despawn();
            }
        }
    }
}

fn animate_pulses(
    mut commands: Commands,
    time: Res<Time>,
    mut pulses: Query<(Entity, &mut Pulse, &mut Transform)>,
) {
    for (entity, mut pulse, mut transform) in &mut pulses {
        pulse.remaining -= time.delta_secs();
        if pulse.remaining <= 0.0 {
            transform.scale = Vec3::ONE;
            commands.entity(entity).remove::<Pulse>();
        } else {
            let progress = pulse.remaining / PULSE_SECS;
            transform.scale = Vec3::splat(1.0 + progress);
        }
    }
}
