use bevy::prelude::*;

use crate::file::session::ChannelConfig;

use super::coordinator::StopReason;
use super::markers::MarkerHandle;
use super::scheduler::StartKind;

/// Everything the input layer, beat source and session control feed into the
/// coordinator.
///
/// A single message type keeps arrival order across kinds of input: each one is
/// applied in full, in the order it was written, before the next.
#[derive(Message, Clone, Debug)]
pub enum SyncInput {
    /// Replace the current session with these channels.
    SetupSession { channels: Vec<ChannelConfig> },
    LineStarted { channel: String },
    LineCompleted { channel: String },
    /// Latest cursor position in world space; drawing markers spawn here.
    CursorMoved { position: Vec2 },
    /// `timestamp` is on the same clock as `Time::elapsed_secs_f64`.
    Beat { channel: String, timestamp: f64 },
    ForceStart,
    ResetSession,
    StopPlayback,
}

impl SyncInput {
    pub fn line_started(channel: impl Into<String>) -> Self {
        Self::LineStarted {
            channel: channel.into(),
        }
    }

    pub fn line_completed(channel: impl Into<String>) -> Self {
        Self::LineCompleted {
            channel: channel.into(),
        }
    }

    pub fn beat(channel: impl Into<String>, timestamp: f64) -> Self {
        Self::Beat {
            channel: channel.into(),
            timestamp,
        }
    }
}

// Outbound: rendering requests and lifecycle.

#[derive(Message, Clone, Debug)]
pub struct MarkerSpawned {
    pub handle: MarkerHandle,
    pub channel: String,
    pub position: Vec2,
    pub color: Color,
}

#[derive(Message, Clone, Copy, Debug)]
pub struct MarkerPulsed {
    pub handle: MarkerHandle,
}

#[derive(Message, Clone, Debug)]
pub struct MarkersCleared {
    pub handles: Vec<MarkerHandle>,
}

#[derive(Message, Clone, Copy, Debug)]
pub struct SessionReady;

#[derive(Message, Clone, Debug)]
pub struct PlaybackStarted {
    pub kind: StartKind,
    pub channels: Vec<String>,
}

#[derive(Message, Clone, Copy, Debug)]
pub struct PlaybackStopped {
    pub reason: StopReason,
}
