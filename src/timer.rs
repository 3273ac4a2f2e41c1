//! A single-shot monotonic timer, feeding the event loop's poll timeout.
//!
//! The original kept one global `(timeout_instant, timeout_handler)` pair
//! computed against `CLOCK_MONOTONIC` and fed the remaining time straight
//! into `select()`'s timeout argument. `mio::Poll::poll` takes the same
//! kind of `Option<Duration>`, so the shape carries over directly; only
//! one timer is ever armed at a time (the predecessor connect timeout).

use std::time::{Duration, Instant};

/// What the timer is waiting for, so the event loop knows which handler
/// to invoke once it fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerPurpose {
    /// Waiting for the predecessor to connect after we sent `ENTRY`.
    PredecessorConnect,
    /// Waiting for the directory server's `NODESLIST` response.
    DirectoryNodeList,
}

pub struct Timer {
    armed: Option<(Instant, TimerPurpose)>,
}

impl Timer {
    pub fn new() -> Self {
        Timer { armed: None }
    }

    pub fn set(&mut self, duration: Duration, purpose: TimerPurpose) {
        self.armed = Some((Instant::now() + duration, purpose));
    }

    pub fn cancel(&mut self) {
        self.armed = None;
    }

    pub fn is_armed(&self) -> bool {
        self.armed.is_some()
    }

    /// The duration to pass to `Poll::poll`, or `None` if nothing is
    /// armed (meaning "block indefinitely until I/O activity").
    pub fn poll_timeout(&self) -> Option<Duration> {
        self.armed.map(|(instant, _)| instant.saturating_duration_since(Instant::now()))
    }

    /// If the timer has expired, disarms it and returns what it was for.
    pub fn take_expired(&mut self) -> Option<TimerPurpose> {
        match self.armed {
            Some((instant, purpose)) if Instant::now() >= instant => {
                self.armed = None;
                Some(purpose)
            }
            _ => None,
        }
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unarmed_timer_has_no_timeout() {
        let t = Timer::new();
        assert!(t.poll_timeout().is_none());
        assert!(!t.is_armed());
    }

    #[test]
    fn armed_timer_reports_a_bounded_timeout() {
        let mut t = Timer::new();
        t.set(Duration::from_millis(1000), TimerPurpose::PredecessorConnect);
        assert!(t.is_armed());
        let remaining = t.poll_timeout().unwrap();
        assert!(remaining <= Duration::from_millis(1000));
    }

    #[test]
    fn cancel_disarms() {
        let mut t = Timer::new();
        t.set(Duration::from_millis(1000), TimerPurpose::DirectoryNodeList);
        t.cancel();
        assert!(!t.is_armed());
        assert!(t.take_expired().is_none());
    }

    #[test]
    fn take_expired_fires_once() {
        let mut t = Timer::new();
        t.set(Duration::from_millis(0), TimerPurpose::PredecessorConnect);
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(t.take_expired(), Some(TimerPurpose::PredecessorConnect));
        assert_eq!(t.take_expired(), None);
    }
}
