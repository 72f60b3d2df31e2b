use bevy::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// One entry of a session's channel list.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ChannelConfig {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub track: String,
    #[serde(default)]
    pub volume_db: f32,
    #[serde(default)]
    pub looping: bool,
    #[serde(default = "default_marker_color", with = "srgb_float")]
    pub color: Color,
}

impl ChannelConfig {
    pub fn new(id: impl Into<String>, track: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            track: track.into(),
            volume_db: 0.0,
            looping: false,
            color: default_marker_color(),
        }
    }

    pub fn with_color(mut self, color: Color) -> Self {
        self.color = color;
        self
    }
}

fn default_marker_color() -> Color {
    Color::WHITE
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SessionFile {
    pub channels: Vec<ChannelConfig>,
}

#[derive(Debug, Error)]
pub enum SessionFileError {
    #[error("failed to read session file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse session file: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl SessionFile {
    pub fn from_yaml(content: &str) -> Result<Self, SessionFileError> {
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn load(path: &Path) -> Result<Self, SessionFileError> {
        let content = fs::read_to_string(path).map_err(|source| SessionFileError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&content)
    }
}

mod srgb_float {
    use bevy::prelude::Color;
    use serde::de::Deserializer;
    use serde::ser::{SerializeSeq, Serializer};
    use serde::Deserialize;

    pub fn serialize<S>(color: &Color, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let srgba = color.to_srgba();
        let mut seq = serializer.serialize_seq(Some(3))?;
        seq.serialize_element(&srgba.red)?;
        seq.serialize_element(&srgba.green)?;
        seq.serialize_element(&srgba.blue)?;
        seq.end()
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Color, D::Error>
    where
        D: Deserializer<'de>,
    {
        let rgb: [f32; 3] = <[f32; 3]>::deserialize(deserializer)?;
        Ok(Color::srgb(rgb[0], rgb[1], rgb[2]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_channel_list_with_defaults() {
        let yaml = r#"
channels:
  - id: a
    track: tracks/a.ogg
    color: [1.0, 0.0, 0.0]
  - id: b
    track: tracks/b.ogg
    volume_db: -6.0
    looping: true
  - track: tracks/orphan.ogg
"#;
        let session = SessionFile::from_yaml(yaml).unwrap();
        assert_eq!(session.channels.len(), 3);

        let a = &session.channels[0];
        assert_eq!(a.id, "a");
        assert_eq!(a.color.to_srgba().red, 1.0);
        assert_eq!(a.color.to_srgba().green, 0.0);

        let b = &session.channels[1];
        assert_eq!(b.volume_db, -6.0);
        assert!(b.looping);
        assert_eq!(b.color, Color::WHITE);

        assert!(session.channels[2].id.is_empty());
    }

    #[test]
    fn rejects_malformed_yaml() {
        let result = SessionFile::from_yaml("channels: [ { id: a, volume_db: loud } ]");
        assert!(matches!(result, Err(SessionFileError::Yaml(_))));
    }
}
