use std::{
    collections::VecDeque,
    sync::{Arc, Mutex, MutexGuard},
    time::{Duration, Instant},
};

/// Default retention window of [`ProgressMeter`].
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(5 * 60);

/// Time source for [`ProgressMeter`].
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Manually advanced clock for tests and simulations.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<Instant>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Mutex::new(Instant::now()),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Sample {
    at: Instant,
    count: u64,
}

#[derive(Debug, Default)]
struct History {
    count: u64,
    /// Oldest first.
    samples: VecDeque<Sample>,
}

/// Thread-safe cumulative completion counter with a sliding retention window.
///
/// The persistence worker calls [`ProgressMeter::log`] once per written item; the orchestrator
/// reads [`ProgressMeter::current`] and [`ProgressMeter::eta`]. Both sides purge samples older
/// than the window under the same lock.
pub struct ProgressMeter {
    target: u64,
    window: Duration,
    clock: Arc<dyn Clock>,
    history: Mutex<History>,
}

impl ProgressMeter {
    pub fn new(target: u64, window: Duration) -> Self {
        Self::with_clock(target, window, Arc::new(SystemClock))
    }

    pub fn with_clock(target: u64, window: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            target,
            window,
            clock,
            history: Mutex::new(History::default()),
        }
    }

    pub fn target(&self) -> u64 {
        self.target
    }

    /// Record one completed item.
    pub fn log(&self) {
        let now = self.clock.now();
        let mut h = self.lock();
        self.purge(&mut h, now);
        h.count += 1;
        let count = h.count;
        h.samples.push_back(Sample { at: now, count });
    }

    /// Newest retained cumulative count, or 0 once every sample has expired.
    pub fn current(&self) -> u64 {
        let now = self.clock.now();
        let mut h = self.lock();
        self.purge(&mut h, now);
        h.samples.back().map_or(0, |s| s.count)
    }

    pub fn finished(&self) -> bool {
        self.current() >= self.target
    }

    /// Estimated time to reach the target at the throughput measured over the window.
    ///
    /// `None` means unknown: fewer than two retained samples, or no measurable progress
    /// between them.
    pub fn eta(&self) -> Option<Duration> {
        let now = self.clock.now();
        let mut h = self.lock();
        self.purge(&mut h, now);
        if h.samples.len() < 2 {
            return None;
        }
        let (oldest, newest) = (*h.samples.front()?, *h.samples.back()?);
        drop(h);

        let done = newest.count.saturating_sub(oldest.count);
        let elapsed = newest.at.saturating_duration_since(oldest.at).as_secs_f64();
        if done == 0 || elapsed <= 0.0 {
            return None;
        }
        let remaining = self.target.saturating_sub(newest.count);
        let secs = remaining as f64 * elapsed / done as f64;
        Duration::try_from_secs_f64(secs).ok()
    }

    fn lock(&self) -> MutexGuard<'_, History> {
        self.history.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn purge(&self, h: &mut History, now: Instant) {
        let Some(cutoff) = now.checked_sub(self.window) else {
            return;
        };
        while h.samples.front().is_some_and(|s| s.at < cutoff) {
            h.samples.pop_front();
        }
    }
}

impl std::fmt::Debug for ProgressMeter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressMeter")
            .field("target", &self.target)
            .field("window", &self.window)
            .field("history", &*self.lock())
            .finish()
    }
}

#[cfg(test)]
#[path = "../tests/unit/progress.rs"]
mod tests;
