//! Elapsed-treatment accounting across pause/resume.
//!
//! ```text
//!   start(reset)          pause              start(keep)
//!  ──────●━━━━━━━━━━━━━━━━━━●───────────────────●━━━━━━━━━━━━━▶
//!        │◀─ accumulated ──▶│   frozen          │◀─ + running ─▶
//! ```
//!
//! The clock stores only instants handed to it, so it is fully
//! deterministic under a mock [`Clock`](super::ports::Clock).

use std::time::Duration;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TreatmentClock {
    running: bool,
    started_at: Option<Duration>,
    accumulated: Duration,
}

impl TreatmentClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin (or continue) accumulating from `now`.  `reset` discards any
    /// previously accumulated time.
    pub fn start(&mut self, now: Duration, reset: bool) {
        if reset {
            self.accumulated = Duration::ZERO;
            self.running = false;
        }
        if !self.running {
            self.started_at = Some(now);
            self.running = true;
        }
    }

    /// Freeze accumulation at `now`.
    pub fn pause(&mut self, now: Duration) {
        self.accumulated = self.elapsed(now);
        self.started_at = None;
        self.running = false;
    }

    /// Zero elapsed time.  A running clock keeps running from `now`.
    pub fn reset(&mut self, now: Duration) {
        self.accumulated = Duration::ZERO;
        self.started_at = self.running.then_some(now);
    }

    pub fn elapsed(&self, now: Duration) -> Duration {
        match (self.running, self.started_at) {
            (true, Some(start)) => self.accumulated + now.saturating_sub(start),
            _ => self.accumulated,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
    }
}
