use bevy::prelude::*;
use std::collections::HashMap;

/// Progress of one channel's line-drawing interaction.
///
/// `completed` implies `started`, and `completion_time >= start_time` when both are set.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LineState {
    pub started: bool,
    pub start_time: Option<f64>,
    pub completed: bool,
    pub completion_time: Option<f64>,
}

impl LineState {
    pub fn drawing_duration(&self) -> Option<f64> {
        Some(self.completion_time? - self.start_time?)
    }

    pub fn is_drawing(&self) -> bool {
        self.started && !self.completed
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineCompletion {
    /// False when the channel was unknown or had already completed.
    pub newly_completed: bool,
    pub ready: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineAnomaly {
    CompletedWithoutStart { channel: String },
}

#[derive(Default)]
pub struct LineSessionTracker {
    lines: HashMap<String, LineState>,
    longest: f64,
    anomalies: Vec<LineAnomaly>,
}

impl LineSessionTracker {
    /// Starts tracking exactly these channels, discarding all previous state.
    pub fn track_channels<'a>(&mut self, ids: impl IntoIterator<Item = &'a str>) {
        self.lines = ids
            .into_iter()
            .map(|id| (id.to_string(), LineState::default()))
            .collect();
        self.longest = 0.0;
        self.anomalies.clear();
    }

    /// First start wins; repeated starts are ignored. Returns true on the first start.
    pub fn on_line_started(&mut self, channel: &str, now: f64) -> bool {
        let Some(line) = self.lines.get_mut(channel) else {
            warn!("Line started on unknown channel '{channel}'");
            return false;
        };
        if line.started {
            return false;
        }
        line.started = true;
        line.start_time = Some(now);
        true
    }

    pub fn on_line_completed(&mut self, channel: &str, now: f64) -> LineCompletion {
        let Some(line) = self.lines.get_mut(channel) else {
            warn!("Line completed on unknown channel '{channel}'");
            return LineCompletion {
                newly_completed: false,
                ready: self.is_ready(),
            };
        };
        if line.completed {
            return LineCompletion {
                newly_completed: false,
                ready: self.is_ready(),
            };
        }

        if !line.started {
            warn!(
                "Line on channel '{channel}' completed without a recorded start; duration unknown"
            );
            line.started = true;
            self.anomalies.push(LineAnomaly::CompletedWithoutStart {
                channel: channel.to_string(),
            });
        }

        let completion_time = match line.start_time {
            Some(start) if now < start => {
                warn!(
                    "Line on channel '{channel}' completed before it started \
                     ({now:.3} < {start:.3})"
                );
                start
            }
            _ => now,
        };
        line.completed = true;
        line.completion_time = Some(completion_time);

        if let Some(duration) = line.drawing_duration() {
            debug!("Line on channel '{channel}' drawn in {duration:.3}s");
            self.longest = self.longest.max(duration);
        }

        LineCompletion {
            newly_completed: true,
            ready: self.is_ready(),
        }
    }

    /// True iff at least one channel is tracked and every tracked line is complete.
    pub fn is_ready(&self) -> bool {
        !self.lines.is_empty() && self.lines.values().all(|line| line.completed)
    }

    pub fn longest_drawing_duration(&self) -> f64 {
        self.longest
    }

    pub fn state(&self, channel: &str) -> Option<&LineState> {
        self.lines.get(channel)
    }

    pub fn is_drawing(&self, channel: &str) -> bool {
        self.lines.get(channel).is_some_and(LineState::is_drawing)
    }

    pub fn any_drawing(&self) -> bool {
        self.lines.values().any(LineState::is_drawing)
    }

    /// Seconds since the channel's line started, while it is still being drawn.
    pub fn drawing_elapsed(&self, channel: &str, now: f64) -> Option<f64> {
        let line = self.lines.get(channel)?;
        if !line.is_drawing() {
            return None;
        }
        line.start_time.map(|start| (now - start).max(0.0))
    }

    pub fn incomplete_channels(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self
            .lines
            .iter()
            .filter(|(_, line)| !line.completed)
            .map(|(id, _)| id.as_str())
            .collect();
        ids.sort_unstable();
        ids
    }

    pub fn anomalies(&self) -> &[LineAnomaly] {
        &self.anomalies
    }

    /// Clears every line back to "not started"; the tracked channel set is kept.
    pub fn reset(&mut self) {
        for line in self.lines.values_mut() {
            *line = LineState::default();
        }
        self.longest = 0.0;
        self.anomalies.clear();
    }
}
