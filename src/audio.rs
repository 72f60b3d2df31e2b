use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bevy::prelude::*;
use kira::sound::streaming::{StreamingSoundData, StreamingSoundHandle};
use kira::sound::{FromFileError, PlaybackState};
use kira::{AudioManager, AudioManagerSettings, Decibels, DefaultBackend, PlaySoundError, Tween};
use parking_lot::Mutex;
use thiserror::Error;

use crate::file::session::ChannelConfig;

/// A track the coordinator can start and stop for one channel.
///
/// Implementations own the underlying playback handle; only the coordinator
/// calls `play`/`stop` on them.
pub trait PlayableTrack: Send + Sync {
    fn play(&mut self) -> Result<(), TrackError>;
    fn stop(&mut self);
    fn is_playing(&self) -> bool;
    /// Seconds since this track's playback started, 0 if not playing.
    fn current_playback_time(&self) -> f64;
}

/// Turns a channel's track reference into something playable.
///
/// Returning `None` marks the reference as unresolvable and the channel is skipped.
pub trait TrackResolver: Send + Sync {
    fn resolve(&mut self, config: &ChannelConfig) -> Option<Box<dyn PlayableTrack>>;

    fn drain_backend_errors(&mut self) {}
}

#[derive(Resource)]
pub struct ActiveTrackResolver(pub Box<dyn TrackResolver>);

#[derive(Debug, Error)]
pub enum TrackError {
    #[error("failed to load streaming audio from {path}: {source}")]
    Load {
        path: PathBuf,
        #[source]
        source: FromFileError,
    },
    #[error("failed to start streaming playback: {0}")]
    Play(#[from] PlaySoundError<FromFileError>),
}

type SharedManager = Arc<Mutex<AudioManager<DefaultBackend>>>;

pub struct KiraTrack {
    path: PathBuf,
    volume_db: f32,
    looping: bool,
    manager: SharedManager,
    handle: Option<StreamingSoundHandle<FromFileError>>,
}

impl KiraTrack {
    const FALLBACK_DURATION_SECS: f64 = 3600.0;

    fn duration_from_codec_params(
        params: &symphonia::core::codecs::CodecParameters,
    ) -> Option<f64> {
        let sample_rate = params.sample_rate?;
        let n_frames = params.n_frames?;
        Some(n_frames as f64 / sample_rate as f64)
    }

    fn estimate_duration_secs(path: &Path) -> Option<f64> {
        use symphonia::core::formats::FormatOptions;
        use symphonia::core::io::MediaSourceStream;
        use symphonia::core::meta::MetadataOptions;
        use symphonia::core::probe::Hint;
        use symphonia::default::get_probe;

        let file = std::fs::File::open(path).ok()?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());
        let mut hint = Hint::new();
        if let Some(ext) = path.extension().and_then(|ext| ext.to_str()) {
            hint.with_extension(ext);
        }

        let probed = get_probe()
            .format(
                &hint,
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .ok()?;
        let track = probed.format.default_track()?;
        Self::duration_from_codec_params(&track.codec_params)
    }

    // A StreamingSoundData can only be played once, so each play() prepares a fresh one.
    fn prepare_stream_data(&self) -> Result<StreamingSoundData<FromFileError>, TrackError> {
        let path = self.path.as_path();
        let mut data =
            StreamingSoundData::from_file(path).map_err(|source| TrackError::Load {
                path: path.to_path_buf(),
                source,
            })?;

        data = data.volume(Decibels(self.volume_db));
        if self.looping {
            data = data.loop_region(..);
        }

        let decoder_duration = data.duration();
        if decoder_duration > Duration::from_secs(0) {
            let secs = decoder_duration.as_secs_f64();
            if secs.is_finite() && secs >= 1.0 {
                return Ok(data);
            }
        }

        if let Some(duration_secs) = Self::estimate_duration_secs(path) {
            debug!(
                "Estimated duration via metadata for {}: {:.3}s",
                path.display(),
                duration_secs
            );
            if duration_secs.is_finite() && duration_secs > 0.0 {
                return Ok(data.slice(0.0..duration_secs));
            }
        } else {
            warn!("Could not estimate duration for {}", path.display());
        }

        warn!(
            "Falling back to default streaming duration of {:.0}s for {}",
            Self::FALLBACK_DURATION_SECS,
            path.display()
        );
        Ok(data.slice(0.0..Self::FALLBACK_DURATION_SECS))
    }
}

impl PlayableTrack for KiraTrack {
    fn play(&mut self) -> Result<(), TrackError> {
        self.stop();
        let data = self.prepare_stream_data()?;
        let handle = self.manager.lock().play(data)?;
        self.handle = Some(handle);
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(mut handle) = self.handle.take() {
            handle.stop(Tween::default());
        }
    }

    fn is_playing(&self) -> bool {
        self.handle
            .as_ref()
            .is_some_and(|handle| handle.state() == PlaybackState::Playing)
    }

    fn current_playback_time(&self) -> f64 {
        match &self.handle {
            Some(handle) if handle.state() == PlaybackState::Playing => handle.position(),
            _ => 0.0,
        }
    }
}

/// Silent track whose position follows the wall clock.
///
/// Stands in for kira tracks when no audio device could be opened.
#[derive(Default)]
pub struct ClockTrack {
    started: Option<Instant>,
}

impl PlayableTrack for ClockTrack {
    fn play(&mut self) -> Result<(), TrackError> {
        self.started = Some(Instant::now());
        Ok(())
    }

    fn stop(&mut self) {
        self.started = None;
    }

    fn is_playing(&self) -> bool {
        self.started.is_some()
    }

    fn current_playback_time(&self) -> f64 {
        self.started
            .as_ref()
            .map(|instant| instant.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

pub struct KiraTrackResolver {
    root: PathBuf,
    manager: Option<SharedManager>,
}

impl KiraTrackResolver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let manager = match AudioManager::<DefaultBackend>::new(AudioManagerSettings::default()) {
            Ok(manager) => Some(Arc::new(Mutex::new(manager))),
            Err(err) => {
                warn!("No audio device available ({err}); channels will play silently");
                None
            }
        };
        Self {
            root: root.into(),
            manager,
        }
    }
}

impl TrackResolver for KiraTrackResolver {
    fn resolve(&mut self, config: &ChannelConfig) -> Option<Box<dyn PlayableTrack>> {
        let path = self.root.join(&config.track);
        if !path.is_file() {
            warn!(
                "Track '{}' for channel '{}' not found at {}",
                config.track,
                config.id,
                path.display()
            );
            return None;
        }

        let Some(manager) = &self.manager else {
            return Some(Box::new(ClockTrack::default()));
        };

        Some(Box::new(KiraTrack {
            path,
            volume_db: config.volume_db,
            looping: config.looping,
            manager: Arc::clone(manager),
            handle: None,
        }))
    }

    fn drain_backend_errors(&mut self) {
        let Some(manager) = &self.manager else {
            return;
        };
        #[cfg(not(target_arch = "wasm32"))]
        while let Some(err) = manager.lock().backend_mut().pop_error() {
            error!("Audio backend error: {err}");
        }
    }
}

pub fn drain_audio_errors(mut resolver: ResMut<ActiveTrackResolver>) {
    resolver.0.drain_backend_errors();
}
