use bevy::prelude::*;

use crate::audio::TrackResolver;
use crate::file::config::SyncSettings;
use crate::file::session::ChannelConfig;

use super::channel::{ChannelRegistry, SetupReport};
use super::line_session::{LineCompletion, LineSessionTracker};
use super::markers::{BeatOutcome, LanePhase, MarkerRenderer, MarkerTimeline};
use super::monitor::SessionMonitor;
use super::scheduler::{PlaybackScheduler, StartDecision, StartKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StopReason {
    Requested,
    SessionElapsed,
    Reset,
    NewSession,
}

/// Whether synchronized playback is running, and since when.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PlaybackClock {
    pub is_playing: bool,
    pub start_wall_time: Option<f64>,
    pub start_kind: Option<StartKind>,
}

impl PlaybackClock {
    pub fn elapsed(&self, now: f64) -> Option<f64> {
        if !self.is_playing {
            return None;
        }
        self.start_wall_time.map(|start| (now - start).max(0.0))
    }
}

/// Lifecycle notifications for whoever drives the coordinator.
#[derive(Debug, Clone, PartialEq)]
pub enum CoordinatorEvent {
    SessionReady,
    StartScheduled { kind: StartKind, due: f64 },
    PlaybackStarted { kind: StartKind, channels: Vec<String> },
    PlaybackStopped { reason: StopReason },
}

/// Owns every sub-component of a drawing/playback session.
///
/// All mutation goes through the `on_*`/`tick` entry points, which are expected
/// to be called one at a time from a single event loop.
#[derive(Resource)]
pub struct PlaybackCoordinator<R: MarkerRenderer> {
    settings: SyncSettings,
    registry: ChannelRegistry,
    lines: LineSessionTracker,
    scheduler: PlaybackScheduler,
    markers: MarkerTimeline,
    monitor: SessionMonitor,
    clock: PlaybackClock,
    renderer: R,
    cursor: Vec2,
    events: Vec<CoordinatorEvent>,
}

impl<R: MarkerRenderer> PlaybackCoordinator<R> {
    pub fn new(settings: SyncSettings, renderer: R) -> Self {
        Self {
            registry: ChannelRegistry::default(),
            lines: LineSessionTracker::default(),
            scheduler: PlaybackScheduler::new(settings.start_mode, settings.beat_buffer_secs),
            markers: MarkerTimeline::new(settings.marker_tolerance_secs),
            monitor: SessionMonitor::new(settings.fallback_session_secs),
            clock: PlaybackClock::default(),
            renderer,
            cursor: Vec2::ZERO,
            events: Vec::new(),
            settings,
        }
    }

    pub fn setup_session(
        &mut self,
        channels: &[ChannelConfig],
        resolver: &mut dyn TrackResolver,
    ) -> SetupReport {
        if self.clock.is_playing {
            self.stop_all(StopReason::NewSession);
        }
        self.cancel_timers();

        let report = self.registry.setup(channels, resolver);
        self.lines.track_channels(self.registry.ids());
        self.markers
            .track_channels(self.registry.ids(), &mut self.renderer);
        info!(
            "Session set up with {} channel(s), {} skipped",
            report.registered.len(),
            report.skipped.len()
        );
        report
    }

    pub fn update_cursor(&mut self, position: Vec2) {
        self.cursor = position;
    }

    pub fn on_line_started(&mut self, channel: &str, now: f64) {
        if !self.registry.contains(channel) {
            warn!("Ignoring line start for unregistered channel '{channel}'");
            return;
        }
        if !self.lines.on_line_started(channel, now) {
            return;
        }
        if self.clock.is_playing {
            debug!("Line on '{channel}' started during synchronized playback");
            return;
        }

        self.markers.set_phase(channel, LanePhase::Drawing);
        if self.settings.audition_while_drawing {
            if let Some(track) = self.registry.get_mut(channel).map(|c| c.track_mut()) {
                if let Err(err) = track.play() {
                    error!("Could not audition channel '{channel}': {err}");
                }
            }
        }
    }

    pub fn on_line_completed(&mut self, channel: &str, now: f64) -> LineCompletion {
        let completion = self.lines.on_line_completed(channel, now);
        if !completion.newly_completed {
            return completion;
        }

        if self.markers.phase(channel) == Some(LanePhase::Drawing) {
            self.markers.set_phase(channel, LanePhase::Idle);
        }
        if !self.clock.is_playing {
            if let Some(track) = self.registry.get_mut(channel).map(|c| c.track_mut()) {
                track.stop();
            }
        }

        if completion.ready {
            info!(
                "All lines complete; longest drawing took {:.3}s",
                self.lines.longest_drawing_duration()
            );
            self.events.push(CoordinatorEvent::SessionReady);
            if self.clock.is_playing || self.scheduler.is_pending() {
                debug!("Playback already running or scheduled; not requesting another start");
            } else {
                self.request_start(StartKind::Automatic, now);
            }
        }
        completion
    }

    /// Manual override: start even if some lines are incomplete.
    pub fn force_start(&mut self, now: f64) {
        if self.clock.is_playing {
            info!("Force start ignored; playback is already running");
            return;
        }
        let incomplete = self.lines.incomplete_channels();
        if incomplete.is_empty() {
            warn!("Forced synchronized start (all lines were already complete)");
        } else {
            warn!(
                "Forced synchronized start with incomplete lines: {}",
                incomplete.join(", ")
            );
        }
        self.scheduler.cancel();
        self.request_start(StartKind::Forced, now);
    }

    fn request_start(&mut self, kind: StartKind, now: f64) {
        match self.scheduler.request_synchronized_start(kind, now) {
            StartDecision::Now(kind) => self.play_all(kind, now),
            StartDecision::Deferred { kind, due } => {
                self.events.push(CoordinatorEvent::StartScheduled { kind, due });
            }
        }
    }

    /// Advances deferred work: a scheduled start that came due, then the session watchdog.
    pub fn tick(&mut self, now: f64) {
        if let Some(kind) = self.scheduler.poll(now) {
            self.play_all(kind, now);
        }
        if self.monitor.poll(now) {
            info!("Session duration elapsed; stopping synchronized playback");
            self.stop_all(StopReason::SessionElapsed);
        }
    }

    /// Starts every channel's track at the same logical instant.
    pub fn play_all(&mut self, kind: StartKind, now: f64) {
        if self.registry.is_empty() {
            warn!("Synchronized start requested with no registered channels");
            return;
        }

        for channel in self.registry.all_mut() {
            channel.track_mut().stop();
        }
        let mut started = Vec::with_capacity(self.registry.len());
        for channel in self.registry.all_mut() {
            let id = channel.id().to_string();
            match channel.track_mut().play() {
                Ok(()) => started.push(id),
                Err(err) => error!("Channel '{id}' failed to start: {err}"),
            }
        }

        self.clock = PlaybackClock {
            is_playing: true,
            start_wall_time: Some(now),
            start_kind: Some(kind),
        };
        self.markers.rearm();
        self.markers.set_all_phases(LanePhase::Played);

        let duration = self
            .monitor
            .start(self.lines.longest_drawing_duration(), now);
        info!(
            "Synchronized playback started ({kind:?}) on {} channel(s) for {duration:.3}s",
            started.len()
        );
        self.events.push(CoordinatorEvent::PlaybackStarted {
            kind,
            channels: started,
        });
    }

    pub fn stop_all(&mut self, reason: StopReason) {
        for channel in self.registry.all_mut() {
            channel.track_mut().stop();
        }
        self.cancel_timers();

        let was_playing = self.clock.is_playing;
        self.clock = PlaybackClock::default();

        for id in self.registry.ids() {
            let phase = if self.lines.is_drawing(id) {
                LanePhase::Drawing
            } else {
                LanePhase::Idle
            };
            self.markers.set_phase(id, phase);
        }

        if was_playing {
            info!("Synchronized playback stopped ({reason:?})");
            self.events.push(CoordinatorEvent::PlaybackStopped { reason });
        }
    }

    /// Back to a fresh session over the same channels.
    pub fn reset(&mut self) {
        self.stop_all(StopReason::Reset);
        self.lines.reset();
        self.markers.clear_all(&mut self.renderer);
        info!("Session reset");
    }

    pub fn on_beat(&mut self, channel: &str, now: f64) -> BeatOutcome {
        let Some(entry) = self.registry.get(channel) else {
            return BeatOutcome::Ignored;
        };
        let Some(phase) = self.markers.phase(channel) else {
            return BeatOutcome::Ignored;
        };

        let track = entry.track();
        let music_time = match phase {
            LanePhase::Idle => return BeatOutcome::Ignored,
            LanePhase::Drawing if track.is_playing() => track.current_playback_time(),
            LanePhase::Drawing => self.lines.drawing_elapsed(channel, now).unwrap_or(0.0),
            LanePhase::Played if track.is_playing() => track.current_playback_time(),
            LanePhase::Played => self.clock.elapsed(now).unwrap_or(0.0),
        };
        let color = entry.color();

        self.markers
            .on_beat(channel, music_time, self.cursor, color, &mut self.renderer)
    }

    fn cancel_timers(&mut self) {
        self.scheduler.cancel();
        self.monitor.cancel();
    }

    pub fn drain_events(&mut self) -> Vec<CoordinatorEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn is_ready(&self) -> bool {
        self.lines.is_ready()
    }

    pub fn longest_drawing_duration(&self) -> f64 {
        self.lines.longest_drawing_duration()
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    pub fn clock(&self) -> &PlaybackClock {
        &self.clock
    }

    pub fn registry(&self) -> &ChannelRegistry {
        &self.registry
    }

    pub fn lines(&self) -> &LineSessionTracker {
        &self.lines
    }

    pub fn markers(&self) -> &MarkerTimeline {
        &self.markers
    }

    pub fn monitor(&self) -> &SessionMonitor {
        &self.monitor
    }

    pub fn scheduler(&self) -> &PlaybackScheduler {
        &self.scheduler
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    pub fn renderer_mut(&mut self) -> &mut R {
        &mut self.renderer
    }
}
