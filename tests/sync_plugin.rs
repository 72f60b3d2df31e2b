use std::time::Duration;

use approx::assert_relative_eq;
use bevy::prelude::*;
use bevy::time::TimeUpdateStrategy;

use beatline::audio::{ActiveTrackResolver, PlayableTrack};
use beatline::file::config::{AppConfig, SyncSettings};
use beatline::file::session::ChannelConfig;
use beatline::sync::testing::{FakeResolver, FakeTracks};
use beatline::sync::{
    MarkerPulsed, MarkerSpawned, MarkersCleared, PlaybackStarted, PlaybackStopped, SessionReady,
    StartKind, StartMode, StopReason, SyncCoordinator, SyncInput, SyncPlugin, SyncSet,
};

const FRAME: Duration = Duration::from_millis(100);

#[derive(Resource, Default)]
struct Seen {
    ready: usize,
    started: Vec<StartKind>,
    stopped: Vec<StopReason>,
    spawned: usize,
    pulsed: usize,
    cleared: usize,
}

fn record(
    mut seen: ResMut<Seen>,
    mut ready: MessageReader<SessionReady>,
    mut started: MessageReader<PlaybackStarted>,
    mut stopped: MessageReader<PlaybackStopped>,
    mut spawned: MessageReader<MarkerSpawned>,
    mut pulsed: MessageReader<MarkerPulsed>,
    mut cleared: MessageReader<MarkersCleared>,
) {
    seen.ready += ready.read().count();
    seen.started.extend(started.read().map(|m| m.kind));
    seen.stopped.extend(stopped.read().map(|m| m.reason));
    seen.spawned += spawned.read().count();
    seen.pulsed += pulsed.read().count();
    seen.cleared += cleared.read().map(|m| m.handles.len()).sum::<usize>();
}

fn app_with(mode: StartMode, channels: &[&str]) -> (App, FakeTracks) {
    app_with_settings(
        SyncSettings {
            start_mode: mode,
            ..SyncSettings::default()
        },
        channels,
    )
}

fn app_with_settings(sync: SyncSettings, channels: &[&str]) -> (App, FakeTracks) {
    let mut app = App::new();
    app.add_plugins(MinimalPlugins);
    app.insert_resource(TimeUpdateStrategy::ManualDuration(FRAME));
    app.insert_resource(AppConfig {
        sync,
        ..AppConfig::default()
    });

    let resolver = FakeResolver::default();
    let tracks = resolver.tracks();
    app.insert_resource(ActiveTrackResolver(Box::new(resolver)));
    app.add_plugins(SyncPlugin);
    app.init_resource::<Seen>();
    app.add_systems(Update, record.after(SyncSet));

    send(
        &mut app,
        SyncInput::SetupSession {
            channels: channels
                .iter()
                .map(|id| ChannelConfig::new(*id, format!("{id}.ogg")))
                .collect(),
        },
    );
    app.update();
    (app, tracks)
}

fn send<M: Message>(app: &mut App, message: M) {
    app.world_mut().resource_mut::<Messages<M>>().write(message);
}

fn elapsed(app: &App) -> f64 {
    app.world().resource::<Time>().elapsed_secs_f64()
}

fn start_line(app: &mut App, channel: &str) {
    send(app, SyncInput::line_started(channel));
}

fn complete_line(app: &mut App, channel: &str) {
    send(app, SyncInput::line_completed(channel));
}

fn beat(app: &mut App, channel: &str) {
    let now = elapsed(app);
    send(app, SyncInput::beat(channel, now));
}

fn is_playing(app: &App) -> bool {
    app.world().resource::<SyncCoordinator>().clock().is_playing
}

#[test]
fn session_setup_registers_channels() {
    let (app, tracks) = app_with(StartMode::Immediate, &["a", "b"]);
    let coordinator = app.world().resource::<SyncCoordinator>();
    assert_eq!(coordinator.registry().len(), 2);
    assert!(!coordinator.is_ready());
    assert!(tracks.get("a").is_some());
}

#[test]
fn completing_every_line_starts_playback() {
    let (mut app, tracks) = app_with(StartMode::Immediate, &["a", "b"]);

    start_line(&mut app, "a");
    start_line(&mut app, "b");
    app.update();
    complete_line(&mut app, "a");
    app.update();
    assert!(!is_playing(&app));

    complete_line(&mut app, "b");
    app.update();
    assert!(is_playing(&app));

    let seen = app.world().resource::<Seen>();
    assert_eq!(seen.ready, 1);
    assert_eq!(seen.started, vec![StartKind::Automatic]);
    assert!(tracks.get("a").unwrap().is_playing());
    assert!(tracks.get("b").unwrap().is_playing());
}

#[test]
fn deferred_start_and_watchdog_follow_game_time() {
    let (mut app, _tracks) = app_with(StartMode::FixedDelay { secs: 0.5 }, &["a"]);

    start_line(&mut app, "a");
    app.update();
    for _ in 0..3 {
        app.update();
    }
    complete_line(&mut app, "a");
    app.update();

    let longest = app
        .world()
        .resource::<SyncCoordinator>()
        .longest_drawing_duration();
    assert!(longest > 0.0);
    assert!(!is_playing(&app));

    for _ in 0..8 {
        app.update();
    }
    assert!(is_playing(&app));
    assert_eq!(
        app.world().resource::<SyncCoordinator>().monitor().armed_duration(),
        Some(longest)
    );

    for _ in 0..10 {
        app.update();
    }
    assert!(!is_playing(&app));
    let seen = app.world().resource::<Seen>();
    assert_eq!(seen.started, vec![StartKind::Automatic]);
    assert_eq!(seen.stopped, vec![StopReason::SessionElapsed]);
}

#[test]
fn beats_spawn_while_drawing_and_pulse_during_playback() {
    let (mut app, tracks) = app_with(StartMode::Immediate, &["a"]);

    start_line(&mut app, "a");
    app.update();
    tracks.get("a").unwrap().set_position(0.5);
    beat(&mut app, "a");
    app.update();
    assert_eq!(app.world().resource::<Seen>().spawned, 1);

    complete_line(&mut app, "a");
    app.update();
    assert!(is_playing(&app));

    tracks.get("a").unwrap().set_position(0.52);
    beat(&mut app, "a");
    app.update();
    assert_eq!(app.world().resource::<Seen>().pulsed, 1);

    beat(&mut app, "a");
    app.update();
    assert_eq!(app.world().resource::<Seen>().pulsed, 1);
}

#[test]
fn reset_clears_markers_and_stops_delivery() {
    let (mut app, tracks) = app_with(StartMode::FixedDelay { secs: 0.3 }, &["a"]);

    start_line(&mut app, "a");
    app.update();
    beat(&mut app, "a");
    app.update();
    complete_line(&mut app, "a");
    app.update();
    assert!(app.world().resource::<SyncCoordinator>().scheduler().is_pending());

    send(&mut app, SyncInput::ResetSession);
    app.update();

    let coordinator = app.world().resource::<SyncCoordinator>();
    assert!(!coordinator.is_ready());
    assert_eq!(coordinator.longest_drawing_duration(), 0.0);
    assert!(coordinator.markers().is_empty());
    assert_eq!(app.world().resource::<Seen>().cleared, 1);

    for _ in 0..10 {
        tracks.get("a").unwrap().set_position(0.0);
        beat(&mut app, "a");
        app.update();
    }
    assert!(!is_playing(&app));
    let seen = app.world().resource::<Seen>();
    assert!(seen.started.is_empty());
    assert_eq!(seen.spawned, 1);
    assert_eq!(seen.pulsed, 0);
}

#[test]
fn stop_after_force_start_in_one_frame_wins() {
    let (mut app, tracks) = app_with(StartMode::Immediate, &["a"]);

    send(&mut app, SyncInput::ForceStart);
    send(&mut app, SyncInput::StopPlayback);
    app.update();

    assert!(!is_playing(&app));
    assert!(!tracks.get("a").unwrap().is_playing());
    let seen = app.world().resource::<Seen>();
    assert_eq!(seen.started, vec![StartKind::Forced]);
    assert_eq!(seen.stopped, vec![StopReason::Requested]);
}

#[test]
fn reset_after_force_start_in_one_frame_wins() {
    let (mut app, _tracks) = app_with(StartMode::FixedDelay { secs: 0.2 }, &["a"]);

    send(&mut app, SyncInput::ForceStart);
    send(&mut app, SyncInput::ResetSession);
    for _ in 0..5 {
        app.update();
    }

    assert!(!is_playing(&app));
    assert!(app.world().resource::<Seen>().started.is_empty());
}

#[test]
fn stop_before_force_start_in_one_frame_still_starts() {
    let (mut app, _tracks) = app_with(StartMode::Immediate, &["a"]);

    send(&mut app, SyncInput::StopPlayback);
    send(&mut app, SyncInput::ForceStart);
    app.update();

    assert!(is_playing(&app));
}

#[test]
fn beat_between_start_and_completion_in_one_frame_spawns() {
    let (mut app, _tracks) = app_with(StartMode::FixedDelay { secs: 1.0 }, &["a", "b"]);

    start_line(&mut app, "a");
    beat(&mut app, "a");
    complete_line(&mut app, "a");
    app.update();

    let coordinator = app.world().resource::<SyncCoordinator>();
    assert_eq!(coordinator.markers().markers("a").len(), 1);
    assert_eq!(app.world().resource::<Seen>().spawned, 1);
}

#[test]
fn drawing_markers_use_the_beat_timestamp() {
    let (mut app, _tracks) = app_with_settings(
        SyncSettings {
            start_mode: StartMode::Immediate,
            audition_while_drawing: false,
            ..SyncSettings::default()
        },
        &["a", "b"],
    );

    start_line(&mut app, "a");
    app.update();
    let started_at = elapsed(&app);

    send(&mut app, SyncInput::beat("a", started_at + 0.03));
    app.update();
    assert!(elapsed(&app) - started_at > 0.05);

    let coordinator = app.world().resource::<SyncCoordinator>();
    let markers = coordinator.markers().markers("a");
    assert_eq!(markers.len(), 1);
    assert_relative_eq!(markers[0].spawn_playback_time, 0.03, epsilon = 1e-9);
}
