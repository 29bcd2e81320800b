//! Waiting for files written by another process.
//!
//! The frame producer runs on its own schedule, possibly in another process
//! or on another machine sharing the workspace, so the only synchronisation
//! available is whether a file exists yet. [`ReadinessWaiter`] is the seam
//! the pipeline blocks on; [`PollingWaiter`] implements it with bounded
//! exponential backoff.
//!
//! Waiting never times out. A producer that stops is an upstream failure and
//! is observable only as the caller never returning; wrap the waiter if a
//! watchdog is needed.

use std::{
    path::Path,
    thread,
    time::{Duration, Instant},
};

/// Blocks until a file exists.
pub trait ReadinessWaiter: Send + Sync {
    /// Block the calling thread until `path` exists.
    fn wait(&self, path: &Path);
}

/// Polls the filesystem with a delay that doubles from `initial_interval`
/// up to `max_interval`.
#[derive(Debug, Clone)]
pub struct PollingWaiter {
    initial_interval: Duration,
    max_interval: Duration,
    report_every: Duration,
}

impl Default for PollingWaiter {
    fn default() -> Self {
        Self::new(Duration::from_millis(50), Duration::from_millis(500))
    }
}

impl PollingWaiter {
    /// Create a waiter. `max_interval` is raised to `initial_interval` if it
    /// is smaller, and a zero initial interval is treated as one millisecond.
    pub fn new(initial_interval: Duration, max_interval: Duration) -> Self {
        let initial_interval = initial_interval.max(Duration::from_millis(1));
        Self {
            initial_interval,
            max_interval: max_interval.max(initial_interval),
            report_every: Duration::from_secs(30),
        }
    }

    /// How often a still-waiting message is logged.
    #[must_use]
    pub fn with_report_interval(mut self, every: Duration) -> Self {
        self.report_every = every;
        self
    }

    /// The delay used after `attempt` unsuccessful polls.
    pub(crate) fn interval_after(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.min(16)).unwrap_or(u32::MAX);
        self.initial_interval
            .saturating_mul(factor)
            .min(self.max_interval)
    }
}

impl ReadinessWaiter for PollingWaiter {
    fn wait(&self, path: &Path) {
        if path.exists() {
            return;
        }

        log::debug!("Waiting for {}", path.display());
        let started = Instant::now();
        let mut last_report = started;
        let mut attempt = 0u32;

        while !path.exists() {
            thread::sleep(self.interval_after(attempt));
            attempt = attempt.saturating_add(1);

            if last_report.elapsed() >= self.report_every {
                log::info!(
                    "Still waiting for {} after {:.0?}",
                    path.display(),
                    started.elapsed()
                );
                last_report = Instant::now();
            }
        }

        log::debug!("{} ready after {:.0?}", path.display(), started.elapsed());
    }
}
