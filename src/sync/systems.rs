use bevy::prelude::*;

use crate::audio::ActiveTrackResolver;
use crate::file::config::AppConfig;
use crate::file::session::SessionFile;

use super::coordinator::{CoordinatorEvent, PlaybackCoordinator, StopReason};
use super::markers::{MarkerHandle, MarkerRenderer};
use super::messages::*;

pub type SyncCoordinator = PlaybackCoordinator<RenderQueue>;

#[derive(Debug, Clone, PartialEq)]
pub enum RenderRequest {
    Spawn {
        handle: MarkerHandle,
        channel: String,
        position: Vec2,
        color: Color,
    },
    Pulse(MarkerHandle),
    Discard(Vec<MarkerHandle>),
}

/// Buffers render requests until the end of the frame's sync pass.
#[derive(Default)]
pub struct RenderQueue {
    next_handle: u64,
    pending: Vec<RenderRequest>,
}

impl RenderQueue {
    pub fn take(&mut self) -> Vec<RenderRequest> {
        std::mem::take(&mut self.pending)
    }

    pub fn pending(&self) -> &[RenderRequest] {
        &self.pending
    }
}

impl MarkerRenderer for RenderQueue {
    fn spawn_marker(&mut self, channel: &str, position: Vec2, color: Color) -> MarkerHandle {
        self.next_handle += 1;
        let handle = MarkerHandle(self.next_handle);
        self.pending.push(RenderRequest::Spawn {
            handle,
            channel: channel.to_string(),
            position,
            color,
        });
        handle
    }

    fn pulse_marker(&mut self, handle: MarkerHandle) {
        self.pending.push(RenderRequest::Pulse(handle));
    }

    fn discard_markers(&mut self, handles: &[MarkerHandle]) {
        self.pending.retain(|request| match request {
            RenderRequest::Spawn { handle, .. } | RenderRequest::Pulse(handle) => {
                !handles.contains(handle)
            }
            RenderRequest::Discard(_) => true,
        });
        self.pending.push(RenderRequest::Discard(handles.to_vec()));
    }
}

pub fn load_configured_session(
    config: Option<Res<AppConfig>>,
    mut inputs: MessageWriter<SyncInput>,
) {
    let Some(config) = config else {
        return;
    };
    let path = config.paths.session_path();
    match SessionFile::load(&path) {
        Ok(session) => {
            info!("Loaded {} channel(s) from {}", session.channels.len(), path.display());
            inputs.write(SyncInput::SetupSession {
                channels: session.channels,
            });
        }
        Err(err) => warn!("No session loaded: {err}"),
    }
}

/// Applies every input of the frame in arrival order.
pub fn apply_inputs(
    time: Res<Time>,
    mut coordinator: ResMut<SyncCoordinator>,
    mut resolver: ResMut<ActiveTrackResolver>,
    mut inputs: MessageReader<SyncInput>,
) {
    let now = time.elapsed_secs_f64();
    for input in inputs.read() {
        match input {
            SyncInput::SetupSession { channels } => {
                coordinator.setup_session(channels, resolver.0.as_mut());
            }
            SyncInput::LineStarted { channel } => coordinator.on_line_started(channel, now),
            SyncInput::LineCompleted { channel } => {
                coordinator.on_line_completed(channel, now);
            }
            SyncInput::CursorMoved { position } => coordinator.update_cursor(*position),
            SyncInput::Beat { channel, timestamp } => {
                let at = if timestamp.is_finite() {
                    *timestamp
                } else {
                    warn!("Beat for '{channel}' has no usable timestamp; using frame time");
                    now
                };
                coordinator.on_beat(channel, at);
            }
            SyncInput::ForceStart => coordinator.force_start(now),
            SyncInput::ResetSession => coordinator.reset(),
            SyncInput::StopPlayback => coordinator.stop_all(StopReason::Requested),
        }
    }
}

pub fn tick_timers(time: Res<Time>, mut coordinator: ResMut<SyncCoordinator>) {
    coordinator.tick(time.elapsed_secs_f64());
}

pub fn flush_render_requests(
    mut coordinator: ResMut<SyncCoordinator>,
    mut spawned: MessageWriter<MarkerSpawned>,
    mut pulsed: MessageWriter<MarkerPulsed>,
    mut cleared: MessageWriter<MarkersCleared>,
) {
    for request in coordinator.renderer_mut().take() {
        match request {
            RenderRequest::Spawn {
                handle,
                channel,
                position,
                color,
            } => {
                spawned.write(MarkerSpawned {
                    handle,
                    channel,
                    position,
                    color,
                });
            }
            RenderRequest::Pulse(handle) => {
                pulsed.write(MarkerPulsed { handle });
            }
            RenderRequest::Discard(handles) => {
                cleared.write(MarkersCleared { handles });
            }
        }
    }
}

pub fn publish_lifecycle_events(
    mut coordinator: ResMut<SyncCoordinator>,
    mut ready: MessageWriter<SessionReady>,
    mut started: MessageWriter<PlaybackStarted>,
    mut stopped: MessageWriter<PlaybackStopped>,
) {
    for event in coordinator.drain_events() {
        match event {
            CoordinatorEvent::SessionReady => {
                ready.write(SessionReady);
            }
            CoordinatorEvent::StartScheduled { kind, due } => {
                debug!("Synchronized start ({kind:?}) due at {due:.3}s");
            }
            CoordinatorEvent::PlaybackStarted { kind, channels } => {
                started.write(PlaybackStarted { kind, channels });
            }
            CoordinatorEvent::PlaybackStopped { reason } => {
                stopped.write(PlaybackStopped { reason });
            }
        }
    }
}
