use bevy::prelude::*;
use serde::{Deserialize, Serialize};

/// How synchronized playback is started once the session is ready.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum StartMode {
    Immediate,
    FixedDelay { secs: f64 },
    NextBeat { bpm: f64 },
}

/// Which path led to synchronized playback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StartKind {
    /// Every line was completed.
    Automatic,
    /// Manual override, possibly with lines still incomplete.
    Forced,
}

/// Seconds until the next beat boundary after `now`, plus `buffer`.
///
/// A request landing exactly on a boundary waits for the following one.
pub fn next_beat_delay(now: f64, bpm: f64, buffer: f64) -> f64 {
    if !bpm.is_finite() || bpm <= 0.0 {
        warn!("Invalid tempo {bpm} bpm; starting without beat alignment");
        return buffer.max(0.0);
    }
    let beat_period = 60.0 / bpm;
    beat_period - now.rem_euclid(beat_period) + buffer
}

struct Deferred<T> {
    due: f64,
    generation: u64,
    task: T,
}

/// Timer queue whose entries are invalidated, not removed, on cancellation.
///
/// Every entry carries the generation it was scheduled under; `cancel_all` bumps
/// the generation so entries already queued are dropped when they come due.
pub struct DeferredQueue<T> {
    generation: u64,
    pending: Vec<Deferred<T>>,
}

impl<T> Default for DeferredQueue<T> {
    fn default() -> Self {
        Self {
            generation: 0,
            pending: Vec::new(),
        }
    }
}

impl<T> DeferredQueue<T> {
    pub fn schedule(&mut self, due: f64, task: T) {
        self.pending.push(Deferred {
            due,
            generation: self.generation,
            task,
        });
    }

    pub fn cancel_all(&mut self) {
        self.generation = self.generation.wrapping_add(1);
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Live entries still waiting to come due.
    pub fn live_len(&self) -> usize {
        self.pending
            .iter()
            .filter(|entry| entry.generation == self.generation)
            .count()
    }

    pub fn is_pending(&self) -> bool {
        self.live_len() > 0
    }

    pub fn next_due(&self) -> Option<f64> {
        self.pending
            .iter()
            .filter(|entry| entry.generation == self.generation)
            .map(|entry| entry.due)
            .reduce(f64::min)
    }

    /// Removes every entry due at `now` and returns the live ones in due order.
    pub fn poll(&mut self, now: f64) -> Vec<T> {
        let mut due = Vec::new();
        let mut idx = 0;
        while idx < self.pending.len() {
            if self.pending[idx].due <= now {
                due.push(self.pending.swap_remove(idx));
            } else {
                idx += 1;
            }
        }
        due.sort_by(|a, b| a.due.total_cmp(&b.due));

        let generation = self.generation;
        due.into_iter()
            .filter_map(|entry| {
                if entry.generation == generation {
                    Some(entry.task)
                } else {
                    debug!(
                        "Discarding stale timer from generation {} (current {generation})",
                        entry.generation
                    );
                    None
                }
            })
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StartDecision {
    Now(StartKind),
    Deferred { kind: StartKind, due: f64 },
}

/// Decides the instant at which every channel starts playing.
///
/// It never starts playback by itself; the coordinator asks it when the
/// session becomes ready or on a forced start.
pub struct PlaybackScheduler {
    mode: StartMode,
    beat_buffer: f64,
    queue: DeferredQueue<StartKind>,
}

impl PlaybackScheduler {
    pub fn new(mode: StartMode, beat_buffer: f64) -> Self {
        Self {
            mode,
            beat_buffer,
            queue: DeferredQueue::default(),
        }
    }

    pub fn mode(&self) -> StartMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: StartMode) {
        self.mode = mode;
    }

    pub fn start_delay(&self, mode: StartMode, now: f64) -> f64 {
        match mode {
            StartMode::Immediate => 0.0,
            StartMode::FixedDelay { secs } => secs.max(0.0),
            StartMode::NextBeat { bpm } => next_beat_delay(now, bpm, self.beat_buffer),
        }
    }

    pub fn request_synchronized_start(&mut self, kind: StartKind, now: f64) -> StartDecision {
        self.request_with_mode(self.mode, kind, now)
    }

    pub fn request_with_mode(
        &mut self,
        mode: StartMode,
        kind: StartKind,
        now: f64,
    ) -> StartDecision {
        let delay = self.start_delay(mode, now);
        if delay <= 0.0 {
            return StartDecision::Now(kind);
        }
        let due = now + delay;
        debug!("Synchronized start ({kind:?}) scheduled in {delay:.3}s via {mode:?}");
        self.queue.schedule(due, kind);
        StartDecision::Deferred { kind, due }
    }

    /// The start that came due, if any. Only one start is ever reported per poll.
    pub fn poll(&mut self, now: f64) -> Option<StartKind> {
        let due = self.queue.poll(now);
        let mut kinds = due.into_iter();
        let first = kinds.next()?;
        if kinds.next().is_some() {
            debug!("Collapsing simultaneous synchronized starts into one");
        }
        // Anything else queued belongs to the start that just fired.
        self.queue.cancel_all();
        Some(first)
    }

    pub fn is_pending(&self) -> bool {
        self.queue.is_pending()
    }

    pub fn pending_due(&self) -> Option<f64> {
        self.queue.next_due()
    }

    pub fn cancel(&mut self) {
        self.queue.cancel_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn next_beat_delay_aligns_to_boundary() {
        assert_relative_eq!(next_beat_delay(1.23, 120.0, 0.1), 0.27 + 0.1, epsilon = 1e-9);
        assert_relative_eq!(next_beat_delay(1.23, 120.0, 0.0), 0.27, epsilon = 1e-9);
    }

    #[test]
    fn next_beat_delay_on_boundary_waits_a_full_beat() {
        assert_relative_eq!(next_beat_delay(2.0, 60.0, 0.0), 1.0, epsilon = 1e-9);
    }

    #[test]
    fn next_beat_delay_rejects_bad_tempo() {
        assert_eq!(next_beat_delay(1.0, 0.0, 0.1), 0.1);
        assert_eq!(next_beat_delay(1.0, f64::NAN, 0.1), 0.1);
    }

    #[test]
    fn start_lands_on_shared_beat() {
        let mut scheduler = PlaybackScheduler::new(StartMode::NextBeat { bpm: 120.0 }, 0.0);
        let decision = scheduler.request_synchronized_start(StartKind::Automatic, 3.1);
        let StartDecision::Deferred { due, .. } = decision else {
            panic!("expected a deferred start, got {decision:?}");
        };
        assert_relative_eq!(due, 3.5, epsilon = 1e-9);
    }

    #[test]
    fn immediate_mode_starts_now() {
        let mut scheduler = PlaybackScheduler::new(StartMode::Immediate, 0.1);
        assert_eq!(
            scheduler.request_synchronized_start(StartKind::Forced, 7.0),
            StartDecision::Now(StartKind::Forced)
        );
        assert!(!scheduler.is_pending());
    }

    #[test]
    fn fixed_delay_fires_once_after_delay() {
        let mut scheduler = PlaybackScheduler::new(StartMode::FixedDelay { secs: 2.0 }, 0.1);
        scheduler.request_synchronized_start(StartKind::Automatic, 1.0);
        assert!(scheduler.is_pending());
        assert_eq!(scheduler.pending_due(), Some(3.0));

        assert_eq!(scheduler.poll(2.9), None);
        assert_eq!(scheduler.poll(3.0), Some(StartKind::Automatic));
        assert_eq!(scheduler.poll(10.0), None);
        assert!(!scheduler.is_pending());
    }

    #[test]
    fn cancelled_start_never_fires() {
        let mut scheduler = PlaybackScheduler::new(StartMode::FixedDelay { secs: 1.0 }, 0.0);
        scheduler.request_synchronized_start(StartKind::Automatic, 0.0);
        scheduler.cancel();
        assert!(!scheduler.is_pending());
        assert_eq!(scheduler.poll(5.0), None);

        scheduler.request_synchronized_start(StartKind::Forced, 5.0);
        assert_eq!(scheduler.poll(6.0), Some(StartKind::Forced));
    }

    #[test]
    fn deferred_queue_drops_stale_generations() {
        let mut queue = DeferredQueue::default();
        queue.schedule(1.0, "old");
        queue.cancel_all();
        queue.schedule(2.0, "new-late");
        queue.schedule(1.5, "new-early");

        assert_eq!(queue.live_len(), 2);
        assert_eq!(queue.next_due(), Some(1.5));
        assert_eq!(queue.poll(3.0), vec!["new-early", "new-late"]);
        assert_eq!(queue.live_len(), 0);
    }
}
