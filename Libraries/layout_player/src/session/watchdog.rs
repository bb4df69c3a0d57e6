use crate::config::SessionConfig;
use crate::engine::PlaybackStatus;
use tracing::{debug, warn};

// Sub-millisecond jitter is not progress.
const POSITION_EPSILON: f64 = 0.001;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StallAction {
    /// Local recovery: jump the playhead.
    Seek { target: f64 },
    /// Seeking did not help; reload the active layout.
    Escalate,
}

/// Detects a playhead that stops moving while the engine claims to be playing.
#[derive(Debug, Clone)]
pub struct StallWatchdog {
    miss_threshold: u32,
    live_edge_offset: f64,
    bounded_nudge: f64,
    escalate_after: u32,
    last_position: Option<f64>,
    misses: u32,
    recoveries_without_progress: u32,
    stalled: bool,
}

impl StallWatchdog {
    pub fn new(config: &SessionConfig) -> Self {
        Self {
            miss_threshold: config.stall_miss_threshold.max(1),
            live_edge_offset: config.live_edge_offset_secs,
            bounded_nudge: config.bounded_nudge_secs,
            escalate_after: config.escalate_after_recoveries,
            last_position: None,
            misses: 0,
            recoveries_without_progress: 0,
            stalled: false,
        }
    }

    /// Feeds one position sample and returns the recovery to perform, if any.
    pub fn sample(&mut self, status: &PlaybackStatus) -> Option<StallAction> {
        let previous = self.last_position.replace(status.position);

        let Some(previous) = previous else {
            // First sample after a (re)start only sets the baseline.
            return None;
        };

        if status.position - previous > POSITION_EPSILON {
            if self.misses > 0 || self.recoveries_without_progress > 0 {
                debug!("Playback progressed to {:.3}s, stall counters reset", status.position);
            }
            self.misses = 0;
            self.recoveries_without_progress = 0;
            return None;
        }

        if status.paused || status.buffering {
            return None;
        }

        self.misses += 1;
        debug!("No progress at {:.3}s ({}/{})", status.position, self.misses, self.miss_threshold);
        if self.misses < self.miss_threshold {
            return None;
        }

        self.misses = 0;
        self.stalled = true;
        // The playhead is about to jump; the next sample is a fresh baseline.
        self.last_position = None;

        if self.recoveries_without_progress >= self.escalate_after {
            warn!(
                "Playback still stalled after {} recoveries, escalating to a reload",
                self.recoveries_without_progress
            );
            self.recoveries_without_progress = 0;
            return Some(StallAction::Escalate);
        }

        self.recoveries_without_progress += 1;
        let target = self.recovery_target(status);
        warn!("Playback stalled at {:.3}s, seeking to {:.3}s", status.position, target);
        Some(StallAction::Seek { target })
    }

    fn recovery_target(&self, status: &PlaybackStatus) -> f64 {
        match (status.live, status.seekable_end) {
            (true, Some(edge)) => (edge - self.live_edge_offset).max(0.0),
            (_, Some(end)) => (status.position + self.bounded_nudge).min(end),
            (_, None) => status.position + self.bounded_nudge,
        }
    }

    /// Any explicit buffering notification means the engine knows what it is doing.
    pub fn on_buffering(&mut self, buffering: bool) {
        debug!("Buffering state changed to {}, miss counter reset", buffering);
        self.misses = 0;
    }

    pub fn is_stalled(&self) -> bool {
        self.stalled
    }

    pub fn clear_stalled(&mut self) {
        self.stalled = false;
    }

    pub fn misses(&self) -> u32 {
        self.misses
    }

    /// Forget everything, used whenever a new presentation starts playing.
    pub fn reset(&mut self) {
        self.last_position = None;
        self.misses = 0;
        self.recoveries_without_progress = 0;
        self.stalled = false;
    }
}
