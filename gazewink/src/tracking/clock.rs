//! Time sources and time-window gates.
//!
//! Every threshold in the tracker is a deadline comparison against an
//! explicit `now_ms`, so the same code runs against the wall clock in the
//! daemon and against a hand-driven clock in replay and tests.

use std::cell::Cell;
use std::rc::Rc;
use std::time::Instant;

/// Millisecond time source.
pub trait Clock {
    /// Milliseconds since an arbitrary, fixed origin.  Never decreases.
    fn now_ms(&self) -> f64;
}

/// Wall-clock time measured from construction.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now_ms(&self) -> f64 {
        self.origin.elapsed().as_secs_f64() * 1000.0
    }
}

/// Hand-driven clock.  Clones share the same time, so a test or the replay
/// backend can keep a handle while the pipeline owns another.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Rc<Cell<f64>>,
}

impl ManualClock {
    pub fn new(start_ms: f64) -> Self {
        Self {
            now: Rc::new(Cell::new(start_ms)),
        }
    }

    /// Jump to `ms`.  Moving backwards is ignored.
    pub fn set(&self, ms: f64) {
        if ms > self.now.get() {
            self.now.set(ms);
        }
    }

    pub fn advance(&self, ms: f64) {
        if ms > 0.0 {
            self.now.set(self.now.get() + ms);
        }
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> f64 {
        self.now.get()
    }
}

// ── Deadline ────────────────────────────────────────────────

/// A fixed-length window that is active until a deadline.  Raising it again
/// while active restarts the window from the new `now`; windows never stack.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Deadline {
    until_ms: Option<f64>,
}

impl Deadline {
    /// Set deadline = now + duration.
    pub fn raise(&mut self, now_ms: f64, duration_ms: f64) {
        self.until_ms = Some(now_ms + duration_ms);
    }

    pub fn is_active(&self, now_ms: f64) -> bool {
        matches!(self.until_ms, Some(until) if now_ms < until)
    }

    /// Milliseconds left in the window, 0 when inactive.
    pub fn remaining_ms(&self, now_ms: f64) -> f64 {
        match self.until_ms {
            Some(until) if now_ms < until => until - now_ms,
            _ => 0.0,
        }
    }

    pub fn clear(&mut self) {
        self.until_ms = None;
    }
}

// ── Throttle ────────────────────────────────────────────────

/// Leading-edge throttle: the first call in a window runs and its result is
/// served for the rest of the window.
#[derive(Debug, Clone)]
pub struct Throttle<T> {
    pub window_ms: f64,
    last_run_ms: Option<f64>,
    cached: Option<T>,
}

impl<T: Clone> Throttle<T> {
    pub fn new(window_ms: f64) -> Self {
        Self {
            window_ms,
            last_run_ms: None,
            cached: None,
        }
    }

    /// The stored result if `now_ms` is still inside the window of the last
    /// run, otherwise `None` (the caller must do the work and `store`).
    pub fn cached(&self, now_ms: f64) -> Option<T> {
        match self.last_run_ms {
            Some(last) if now_ms - last < self.window_ms => self.cached.clone(),
            _ => None,
        }
    }

    /// Record a fresh result, opening a new window at `now_ms`.
    pub fn store(&mut self, now_ms: f64, value: T) {
        self.last_run_ms = Some(now_ms);
        self.cached = Some(value);
    }

    /// Serve from the window or run `work` and store its result.
    pub fn run<F: FnOnce() -> T>(&mut self, now_ms: f64, work: F) -> T {
        if let Some(value) = self.cached(now_ms) {
            return value;
        }
        let value = work();
        self.store(now_ms, value.clone());
        value
    }

    pub fn reset(&mut self) {
        self.last_run_ms = None;
        self.cached = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_shared() {
        let clock = ManualClock::new(10.0);
        let handle = clock.clone();
        handle.advance(5.0);
        assert_eq!(clock.now_ms(), 15.0);
        handle.set(12.0); // backwards, ignored
        assert_eq!(clock.now_ms(), 15.0);
        handle.set(40.0);
        assert_eq!(clock.now_ms(), 40.0);
    }

    #[test]
    fn test_deadline_restarts_not_stacks() {
        let mut d = Deadline::default();
        assert!(!d.is_active(0.0));

        d.raise(0.0, 1500.0);
        assert!(d.is_active(1499.0));
        assert!(!d.is_active(1500.0));

        // Re-raised at 1000ms: window ends at 2500, not 3000
        d.raise(1000.0, 1500.0);
        assert!(d.is_active(2499.0));
        assert!(!d.is_active(2500.0));
        assert!((d.remaining_ms(2000.0) - 500.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_throttle_leading_edge() {
        let mut t: Throttle<u32> = Throttle::new(100.0);
        let mut calls = 0;

        let v = t.run(0.0, || {
            calls += 1;
            7
        });
        assert_eq!(v, 7);

        let v = t.run(99.0, || {
            calls += 1;
            8
        });
        assert_eq!(v, 7, "call inside the window must serve the cached result");

        let v = t.run(100.0, || {
            calls += 1;
            9
        });
        assert_eq!(v, 9);
        assert_eq!(calls, 2);
    }

    #[test]
    fn test_throttle_reset() {
        let mut t: Throttle<u32> = Throttle::new(100.0);
        t.store(0.0, 1);
        assert_eq!(t.cached(50.0), Some(1));
        t.reset();
        assert_eq!(t.cached(50.0), None);
    }
}
