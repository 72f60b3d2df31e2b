use bevy::prelude::*;
use std::collections::HashMap;

use crate::audio::{PlayableTrack, TrackResolver};
use crate::file::session::ChannelConfig;

pub struct Channel {
    id: String,
    color: Color,
    track: Box<dyn PlayableTrack>,
}

impl Channel {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn color(&self) -> Color {
        self.color
    }

    pub fn track(&self) -> &dyn PlayableTrack {
        self.track.as_ref()
    }

    pub(crate) fn track_mut(&mut self) -> &mut dyn PlayableTrack {
        self.track.as_mut()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    EmptyId,
    DuplicateId,
    UnresolvableTrack,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedChannel {
    pub index: usize,
    pub id: String,
    pub reason: SkipReason,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SetupReport {
    pub registered: Vec<String>,
    pub skipped: Vec<SkippedChannel>,
}

/// Owns every channel of the current session, in configuration order.
#[derive(Default)]
pub struct ChannelRegistry {
    channels: Vec<Channel>,
    index: HashMap<String, usize>,
}

impl ChannelRegistry {
    /// Replaces the registry contents. Invalid entries are skipped and reported.
    pub fn setup(
        &mut self,
        configs: &[ChannelConfig],
        resolver: &mut dyn TrackResolver,
    ) -> SetupReport {
        self.clear();
        let mut report = SetupReport::default();

        for (position, config) in configs.iter().enumerate() {
            let reason = if config.id.trim().is_empty() {
                Some(SkipReason::EmptyId)
            } else if self.index.contains_key(&config.id) {
                Some(SkipReason::DuplicateId)
            } else {
                None
            };

            let track = match reason {
                Some(reason) => Err(reason),
                None => resolver
                    .resolve(config)
                    .ok_or(SkipReason::UnresolvableTrack),
            };

            match track {
                Ok(track) => {
                    self.index.insert(config.id.clone(), self.channels.len());
                    self.channels.push(Channel {
                        id: config.id.clone(),
                        color: config.color,
                        track,
                    });
                    report.registered.push(config.id.clone());
                }
                Err(reason) => {
                    warn!(
                        "Skipping channel #{position} '{}': {:?}",
                        config.id, reason
                    );
                    report.skipped.push(SkippedChannel {
                        index: position,
                        id: config.id.clone(),
                        reason,
                    });
                }
            }
        }

        report
    }

    pub fn clear(&mut self) {
        for channel in &mut self.channels {
            channel.track.stop();
        }
        self.channels.clear();
        self.index.clear();
    }

    pub fn get(&self, id: &str) -> Option<&Channel> {
        self.index.get(id).map(|&idx| &self.channels[idx])
    }

    pub(crate) fn get_mut(&mut self, id: &str) -> Option<&mut Channel> {
        let idx = *self.index.get(id)?;
        self.channels.get_mut(idx)
    }

    pub fn all(&self) -> impl Iterator<Item = &Channel> {
        self.channels.iter()
    }

    pub(crate) fn all_mut(&mut self) -> impl Iterator<Item = &mut Channel> {
        self.channels.iter_mut()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.channels.iter().map(|channel| channel.id.as_str())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::testing::FakeResolver;

    #[test]
    fn setup_skips_invalid_entries() {
        let mut registry = ChannelRegistry::default();
        let mut resolver = FakeResolver::default().missing("tracks/gone.ogg");

        let configs = vec![
            ChannelConfig::new("a", "tracks/a.ogg"),
            ChannelConfig::new("", "tracks/blank.ogg"),
            ChannelConfig::new("a", "tracks/again.ogg"),
            ChannelConfig::new("b", "tracks/gone.ogg"),
            ChannelConfig::new("c", "tracks/c.ogg"),
        ];
        let report = registry.setup(&configs, &mut resolver);

        assert_eq!(report.registered, vec!["a", "c"]);
        let reasons: Vec<_> = report.skipped.iter().map(|s| (s.index, s.reason)).collect();
        assert_eq!(
            reasons,
            vec![
                (1, SkipReason::EmptyId),
                (2, SkipReason::DuplicateId),
                (3, SkipReason::UnresolvableTrack),
            ]
        );
        assert_eq!(registry.len(), 2);
        assert!(registry.get("b").is_none());
        assert_eq!(registry.ids().collect::<Vec<_>>(), vec!["a", "c"]);
    }

    #[test]
    fn setup_replaces_and_stops_previous_channels() {
        let mut registry = ChannelRegistry::default();
        let mut resolver = FakeResolver::default();
        registry.setup(&[ChannelConfig::new("old", "old.ogg")], &mut resolver);

        let old_track = resolver.track("old").unwrap();
        registry.get_mut("old").unwrap().track_mut().play().unwrap();
        assert!(old_track.is_playing());

        registry.setup(&[ChannelConfig::new("new", "new.ogg")], &mut resolver);
        assert!(!registry.contains("old"));
        assert!(registry.contains("new"));
        assert!(!old_track.is_playing());
    }
}
