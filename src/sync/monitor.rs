use bevy::prelude::*;

use super::scheduler::DeferredQueue;

/// Watchdog that ends synchronized playback after the observed drawing time.
///
/// Session length follows how long the player took to draw, not the length of
/// the audio assets, so natural "track ended" signals are not used.
pub struct SessionMonitor {
    fallback_secs: f64,
    queue: DeferredQueue<()>,
    armed_for: Option<f64>,
}

impl SessionMonitor {
    pub fn new(fallback_secs: f64) -> Self {
        Self {
            fallback_secs,
            queue: DeferredQueue::default(),
            armed_for: None,
        }
    }

    pub fn fallback_secs(&self) -> f64 {
        self.fallback_secs
    }

    /// Arms the watchdog, replacing any pending one. Returns the duration actually used.
    pub fn start(&mut self, duration: f64, now: f64) -> f64 {
        self.cancel();
        let duration = if duration > 0.0 && duration.is_finite() {
            duration
        } else {
            // Product fallback: nobody finished a timed line in this session.
            warn!(
                "No drawing duration observed; session watchdog falls back to {:.1}s",
                self.fallback_secs
            );
            self.fallback_secs
        };
        self.queue.schedule(now + duration, ());
        self.armed_for = Some(duration);
        duration
    }

    pub fn cancel(&mut self) {
        self.queue.cancel_all();
        self.armed_for = None;
    }

    /// True once, when the armed watchdog elapses.
    pub fn poll(&mut self, now: f64) -> bool {
        let expired = !self.queue.poll(now).is_empty();
        if expired {
            self.armed_for = None;
        }
        expired
    }

    pub fn is_armed(&self) -> bool {
        self.queue.is_pending()
    }

    pub fn armed_duration(&self) -> Option<f64> {
        self.armed_for
    }

    pub fn deadline(&self) -> Option<f64> {
        self.queue.next_due()
    }
}
