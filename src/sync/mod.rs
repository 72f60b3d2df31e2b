use bevy::prelude::*;

use crate::audio::{drain_audio_errors, ActiveTrackResolver, KiraTrackResolver};
use crate::file::config::AppConfig;

pub mod channel;
pub mod coordinator;
pub mod line_session;
pub mod markers;
pub mod messages;
pub mod monitor;
pub mod scheduler;
pub mod systems;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use channel::{Channel, ChannelRegistry, SetupReport, SkipReason};
pub use coordinator::{CoordinatorEvent, PlaybackClock, PlaybackCoordinator, StopReason};
pub use line_session::{LineSessionTracker, LineState};
pub use markers::{BeatOutcome, LanePhase, Marker, MarkerHandle, MarkerRenderer, MarkerTimeline};
pub use messages::*;
pub use monitor::SessionMonitor;
pub use scheduler::{next_beat_delay, PlaybackScheduler, StartKind, StartMode};
pub use systems::{RenderQueue, RenderRequest, SyncCoordinator};

/// Every sync system runs in this set, in a fixed order, once per frame.
#[derive(SystemSet, Debug, Clone, PartialEq, Eq, Hash)]
pub struct SyncSet;

/// Wires the playback coordinator into the app.
///
/// Uses `AppConfig` when it is already inserted and an `ActiveTrackResolver`
/// when one is provided; otherwise defaults and kira-backed tracks.
pub struct SyncPlugin;

impl Plugin for SyncPlugin {
    fn build(&self, app: &mut App) {
        let config = app
            .world()
            .get_resource::<AppConfig>()
            .cloned()
            .unwrap_or_default();

        if !app.world().contains_resource::<ActiveTrackResolver>() {
            let resolver = KiraTrackResolver::new(config.paths.asset_root.clone());
            app.insert_resource(ActiveTrackResolver(Box::new(resolver)));
        }

        app.insert_resource(SyncCoordinator::new(config.sync, RenderQueue::default()))
            .add_message::<SyncInput>()
            .add_message::<MarkerSpawned>()
            .add_message::<MarkerPulsed>()
            .add_message::<MarkersCleared>()
            .add_message::<SessionReady>()
            .add_message::<PlaybackStarted>()
            .add_message::<PlaybackStopped>()
            .add_systems(Startup, systems::load_configured_session)
            .add_systems(
                Update,
                (
                    systems::apply_inputs,
                    systems::tick_timers,
                    systems::flush_render_requests,
                    systems::publish_lifecycle_events,
                )
                    .chain()
                    .in_set(SyncSet),
            )
            .add_systems(Update, drain_audio_errors.after(SyncSet));
    }
}
