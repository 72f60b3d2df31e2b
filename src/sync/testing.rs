//! Deterministic doubles for the external collaborators, shared by unit and
//! integration tests.

use bevy::prelude::*;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::audio::{PlayableTrack, TrackError, TrackResolver};
use crate::file::session::ChannelConfig;
use crate::sync::markers::{MarkerHandle, MarkerRenderer};

#[derive(Debug, Default)]
struct FakeTrackState {
    playing: bool,
    position: f64,
    plays: usize,
}

/// Track whose position is set by the test. Clones share state.
#[derive(Clone, Default)]
pub struct FakeTrack {
    state: Arc<Mutex<FakeTrackState>>,
}

impl FakeTrack {
    pub fn set_position(&self, secs: f64) {
        self.state.lock().position = secs;
    }

    pub fn play_count(&self) -> usize {
        self.state.lock().plays
    }
}

impl PlayableTrack for FakeTrack {
    fn play(&mut self) -> Result<(), TrackError> {
        let mut state = self.state.lock();
        state.playing = true;
        state.position = 0.0;
        state.plays += 1;
        Ok(())
    }

    fn stop(&mut self) {
        let mut state = self.state.lock();
        state.playing = false;
        state.position = 0.0;
    }

    fn is_playing(&self) -> bool {
        self.state.lock().playing
    }

    fn current_playback_time(&self) -> f64 {
        let state = self.state.lock();
        if state.playing {
            state.position
        } else {
            0.0
        }
    }
}

/// Resolves every reference to a [`FakeTrack`] except the ones marked missing.
#[derive(Default)]
pub struct FakeResolver {
    missing: HashSet<String>,
    tracks: Arc<Mutex<HashMap<String, FakeTrack>>>,
}

impl FakeResolver {
    pub fn missing(mut self, track: &str) -> Self {
        self.missing.insert(track.to_string());
        self
    }

    /// The most recently resolved track for a channel id.
    pub fn track(&self, channel: &str) -> Option<FakeTrack> {
        self.tracks.lock().get(channel).cloned()
    }

    /// Handle onto the resolved tracks that stays valid after the resolver is moved.
    pub fn tracks(&self) -> FakeTracks {
        FakeTracks(Arc::clone(&self.tracks))
    }
}

impl TrackResolver for FakeResolver {
    fn resolve(&mut self, config: &ChannelConfig) -> Option<Box<dyn PlayableTrack>> {
        if self.missing.contains(&config.track) {
            return None;
        }
        let track = FakeTrack::default();
        self.tracks.lock().insert(config.id.clone(), track.clone());
        Some(Box::new(track))
    }
}

#[derive(Clone)]
pub struct FakeTracks(Arc<Mutex<HashMap<String, FakeTrack>>>);

impl FakeTracks {
    pub fn get(&self, channel: &str) -> Option<FakeTrack> {
        self.0.lock().get(channel).cloned()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpawnRecord {
    pub handle: MarkerHandle,
    pub channel: String,
    pub position: Vec2,
    pub color: Color,
}

/// Renderer that records every request it receives.
#[derive(Default)]
pub struct RecordingRenderer {
    next_handle: u64,
    pub spawned: Vec<SpawnRecord>,
    pub pulsed: Vec<MarkerHandle>,
    pub discarded: Vec<MarkerHandle>,
}

impl MarkerRenderer for RecordingRenderer {
    fn spawn_marker(&mut self, channel: &str, position: Vec2, color: Color) -> MarkerHandle {
        self.next_handle += 1;
        let handle = MarkerHandle(self.next_handle);
        self.spawned.push(SpawnRecord {
            handle,
            channel: channel.to_string(),
            position,
            color,
        });
        handle
    }

    fn pulse_marker(&mut self, handle: MarkerHandle) {
        self.pulsed.push(handle);
    }

    fn discard_markers(&mut self, handles: &[MarkerHandle]) {
        self.discarded.extend_from_slice(handles);
    }
}
