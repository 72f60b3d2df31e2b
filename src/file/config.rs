use bevy::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::sync::StartMode;

pub const CONFIG_FILE_NAME: &str = "beatline.cfg";
const CONFIG_DIR_NAME: &str = "beatline";

#[derive(Debug, Clone, Default, Deserialize, Serialize, Resource)]
pub struct AppConfig {
    #[serde(default)]
    pub sync: SyncSettings,
    #[serde(default)]
    pub paths: PathConfig,
}

/// Tunables for the playback coordinator.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SyncSettings {
    pub start_mode: StartMode,
    /// Added to next-beat delays so playback never starts a fraction of a beat early.
    pub beat_buffer_secs: f64,
    pub marker_tolerance_secs: f64,
    /// Watchdog duration used when no line was ever timed.
    pub fallback_session_secs: f64,
    pub audition_while_drawing: bool,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            start_mode: StartMode::NextBeat { bpm: 120.0 },
            beat_buffer_secs: 0.1,
            marker_tolerance_secs: 0.05,
            fallback_session_secs: 30.0,
            audition_while_drawing: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PathConfig {
    pub asset_root: String,
    pub session_file: String,
}

impl Default for PathConfig {
    fn default() -> Self {
        Self {
            asset_root: "assets".to_string(),
            session_file: "session.yaml".to_string(),
        }
    }
}

impl PathConfig {
    pub fn session_path(&self) -> PathBuf {
        Path::new(&self.asset_root).join(&self.session_file)
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("no config file found")]
    NotFound,
}

pub struct ConfigPlugin;

impl Plugin for ConfigPlugin {
    fn build(&self, app: &mut App) {
        let config = match locate_config().and_then(|path| load_config(&path)) {
            Ok(config) => config,
            Err(err) => {
                warn!("Using default configuration: {err}");
                AppConfig::default()
            }
        };
        info!("Start mode: {:?}", config.sync.start_mode);
        app.insert_resource(config);
    }
}

/// Working directory first, then the user's config directory.
pub fn locate_config() -> Result<PathBuf, ConfigError> {
    let local = PathBuf::from(CONFIG_FILE_NAME);
    if local.is_file() {
        return Ok(local);
    }

    dirs::config_dir()
        .map(|dir| dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
        .filter(|path| path.is_file())
        .ok_or(ConfigError::NotFound)
}

pub fn load_config(path: &Path) -> Result<AppConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_config(&content)
}

pub fn parse_config(content: &str) -> Result<AppConfig, ConfigError> {
    Ok(serde_yaml::from_str(content)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_config_keeps_defaults() {
        let config = parse_config(
            r#"
sync:
  start_mode:
    mode: fixed_delay
    secs: 1.5
  marker_tolerance_secs: 0.08
"#,
        )
        .unwrap();

        assert_eq!(config.sync.start_mode, StartMode::FixedDelay { secs: 1.5 });
        assert_eq!(config.sync.marker_tolerance_secs, 0.08);
        assert_eq!(config.sync.beat_buffer_secs, 0.1);
        assert_eq!(config.sync.fallback_session_secs, 30.0);
        assert!(config.sync.audition_while_drawing);
        assert_eq!(config.paths.session_file, "session.yaml");
    }

    #[test]
    fn parses_every_start_mode() {
        let immediate = parse_config("sync: { start_mode: { mode: immediate } }").unwrap();
        assert_eq!(immediate.sync.start_mode, StartMode::Immediate);

        let beat = parse_config("sync: { start_mode: { mode: next_beat, bpm: 90 } }").unwrap();
        assert_eq!(beat.sync.start_mode, StartMode::NextBeat { bpm: 90.0 });
    }

    #[test]
    fn unknown_mode_is_an_error() {
        let result = parse_config("sync: { start_mode: { mode: whenever } }");
        assert!(matches!(result, Err(ConfigError::Yaml(_))));
    }

    #[test]
    fn empty_document_is_default() {
        let config = parse_config("{}").unwrap();
        assert_eq!(config.sync, SyncSettings::default());
        assert_eq!(config.paths.session_path(), Path::new("assets/session.yaml"));
    }
}
