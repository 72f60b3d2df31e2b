use bevy::prelude::*;
use std::collections::HashMap;

/// Opaque handle returned by the rendering layer, used only for correlation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MarkerHandle(pub u64);

/// Rendering side of the marker timeline.
pub trait MarkerRenderer: Send + Sync + 'static {
    fn spawn_marker(&mut self, channel: &str, position: Vec2, color: Color) -> MarkerHandle;
    fn pulse_marker(&mut self, handle: MarkerHandle);
    /// The handles are dead; anything still queued for them must not be delivered.
    fn discard_markers(&mut self, handles: &[MarkerHandle]);
}

#[derive(Debug, Clone, PartialEq)]
pub struct Marker {
    pub channel: String,
    /// Offset on the channel's playback timeline this marker stands for.
    pub spawn_playback_time: f64,
    pub color: Color,
    pub position: Vec2,
    pub has_fired: bool,
    pub handle: MarkerHandle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LanePhase {
    #[default]
    Idle,
    Drawing,
    Played,
}

#[derive(Default)]
struct Lane {
    phase: LanePhase,
    markers: Vec<Marker>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BeatOutcome {
    Spawned(MarkerHandle),
    Fired(Vec<MarkerHandle>),
    Ignored,
}

/// Per-channel markers: laid down while a line is drawn, replayed during playback.
pub struct MarkerTimeline {
    lanes: HashMap<String, Lane>,
    tolerance: f64,
}

impl MarkerTimeline {
    pub fn new(tolerance: f64) -> Self {
        Self {
            lanes: HashMap::new(),
            tolerance,
        }
    }

    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    pub fn track_channels<'a>(
        &mut self,
        ids: impl IntoIterator<Item = &'a str>,
        renderer: &mut dyn MarkerRenderer,
    ) {
        self.clear_all(renderer);
        self.lanes = ids
            .into_iter()
            .map(|id| (id.to_string(), Lane::default()))
            .collect();
    }

    pub fn phase(&self, channel: &str) -> Option<LanePhase> {
        self.lanes.get(channel).map(|lane| lane.phase)
    }

    pub fn set_phase(&mut self, channel: &str, phase: LanePhase) {
        if let Some(lane) = self.lanes.get_mut(channel) {
            lane.phase = phase;
        }
    }

    pub fn set_all_phases(&mut self, phase: LanePhase) {
        for lane in self.lanes.values_mut() {
            lane.phase = phase;
        }
    }

    /// Applies one beat to a channel according to its phase.
    ///
    /// `music_time` is the channel's current position on its playback timeline;
    /// `position` and `color` are only used when a marker is spawned.
    pub fn on_beat(
        &mut self,
        channel: &str,
        music_time: f64,
        position: Vec2,
        color: Color,
        renderer: &mut dyn MarkerRenderer,
    ) -> BeatOutcome {
        let Some(phase) = self.phase(channel) else {
            return BeatOutcome::Ignored;
        };
        match phase {
            LanePhase::Idle => BeatOutcome::Ignored,
            LanePhase::Drawing => {
                BeatOutcome::Spawned(self.spawn(channel, music_time, position, color, renderer))
            }
            LanePhase::Played => BeatOutcome::Fired(self.fire(channel, music_time, renderer)),
        }
    }

    fn spawn(
        &mut self,
        channel: &str,
        music_time: f64,
        position: Vec2,
        color: Color,
        renderer: &mut dyn MarkerRenderer,
    ) -> MarkerHandle {
        let handle = renderer.spawn_marker(channel, position, color);
        let lane = self.lanes.entry(channel.to_string()).or_default();
        lane.markers.push(Marker {
            channel: channel.to_string(),
            spawn_playback_time: music_time,
            color,
            position,
            has_fired: false,
            handle,
        });
        handle
    }

    // Markers are checked in spawn order so earlier ones are marked before later ones.
    fn fire(
        &mut self,
        channel: &str,
        music_time: f64,
        renderer: &mut dyn MarkerRenderer,
    ) -> Vec<MarkerHandle> {
        let Some(lane) = self.lanes.get_mut(channel) else {
            return Vec::new();
        };
        let mut fired = Vec::new();
        for marker in lane.markers.iter_mut().filter(|marker| !marker.has_fired) {
            if (music_time - marker.spawn_playback_time).abs() < self.tolerance {
                marker.has_fired = true;
                renderer.pulse_marker(marker.handle);
                fired.push(marker.handle);
            }
        }
        fired
    }

    /// Marks every marker unfired so a new playback pass pulses them again.
    pub fn rearm(&mut self) {
        for marker in self.lanes.values_mut().flat_map(|lane| lane.markers.iter_mut()) {
            marker.has_fired = false;
        }
    }

    /// Drops every marker and tells the renderer the handles are gone. Phases reset to idle.
    pub fn clear_all(&mut self, renderer: &mut dyn MarkerRenderer) {
        let handles: Vec<MarkerHandle> = self
            .lanes
            .values_mut()
            .flat_map(|lane| {
                lane.phase = LanePhase::Idle;
                lane.markers.drain(..).map(|marker| marker.handle)
            })
            .collect();
        if !handles.is_empty() {
            renderer.discard_markers(&handles);
        }
    }

    pub fn markers(&self, channel: &str) -> &[Marker] {
        self.lanes
            .get(channel)
            .map(|lane| lane.markers.as_slice())
            .unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.lanes.values().map(|lane| lane.markers.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
