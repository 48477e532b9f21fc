//! Backend availability tracking (fallback mode).
//!
//! Counts consecutive "backend unreachable or overloaded" outcomes. When the
//! run reaches the threshold the tracker flips to degraded once and sets the
//! `tether_backend_degraded` gauge; the next success flips it back. Other
//! failures (404, 500, timeouts, bad bodies) prove the backend is up enough to
//! answer and leave the run untouched.

use parking_lot::Mutex;
use tether_core::ClassifiedError;
use tracing::{info, warn};

/// A change in degraded state caused by one outcome.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transition {
    /// Threshold reached.
    Degraded {
        /// Length of the failure run.
        consecutive_failures: u32,
    },
    /// First success after being degraded.
    Recovered,
}

/// Consecutive-unavailability counter.
#[derive(Debug)]
pub struct AvailabilityTracker {
    threshold: u32,
    inner: Mutex<State>,
}

#[derive(Debug, Default)]
struct State {
    consecutive: u32,
    degraded: bool,
}

impl AvailabilityTracker {
    /// Tracker that degrades after `threshold` consecutive unavailable outcomes.
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold: threshold.max(1),
            inner: Mutex::new(State::default()),
        }
    }

    /// Whether fallback mode is active.
    pub fn is_degraded(&self) -> bool {
        self.inner.lock().degraded
    }

    /// Current failure run length.
    pub fn consecutive_failures(&self) -> u32 {
        self.inner.lock().consecutive
    }

    /// Feed one settled outcome.
    pub fn record<T>(&self, outcome: &Result<T, ClassifiedError>) -> Option<Transition> {
        match outcome {
            Ok(_) => self.record_success(),
            Err(e) if e.is_unavailable() => self.record_unavailable(),
            Err(_) => None,
        }
    }

    fn record_success(&self) -> Option<Transition> {
        let mut state = self.inner.lock();
        state.consecutive = 0;
        if !state.degraded {
            return None;
        }
        state.degraded = false;
        metrics::gauge!("tether_backend_degraded").set(0.0);
        info!("backend recovered, leaving fallback mode");
        Some(Transition::Recovered)
    }

    fn record_unavailable(&self) -> Option<Transition> {
        let mut state = self.inner.lock();
        state.consecutive = state.consecutive.saturating_add(1);
        if state.degraded || state.consecutive < self.threshold {
            return None;
        }
        state.degraded = true;
        metrics::gauge!("tether_backend_degraded").set(1.0);
        warn!(
            consecutive_failures = state.consecutive,
            "backend repeatedly unavailable, entering fallback mode"
        );
        Some(Transition::Degraded {
            consecutive_failures: state.consecutive,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unavailable() -> Result<(), ClassifiedError> {
        Err(ClassifiedError::http_status(503, "down"))
    }

    #[test]
    fn degrades_once_at_threshold() {
        let tracker = AvailabilityTracker::new(3);
        assert_eq!(tracker.record(&unavailable()), None);
        assert_eq!(tracker.record(&unavailable()), None);
        assert_eq!(
            tracker.record(&unavailable()),
            Some(Transition::Degraded {
                consecutive_failures: 3
            })
        );
        assert!(tracker.is_degraded());
        assert_eq!(tracker.record(&unavailable()), None);
        assert_eq!(tracker.consecutive_failures(), 4);
    }

    #[test]
    fn network_errors_count() {
        let tracker = AvailabilityTracker::new(2);
        let _ = tracker.record::<()>(&Err(ClassifiedError::network("refused")));
        assert!(tracker.record::<()>(&Err(ClassifiedError::network("refused"))).is_some());
    }

    #[test]
    fn other_errors_do_not_break_or_extend_run() {
        let tracker = AvailabilityTracker::new(3);
        let _ = tracker.record(&unavailable());
        let _ = tracker.record::<()>(&Err(ClassifiedError::http_status(404, "nope")));
        assert_eq!(tracker.consecutive_failures(), 1);
    }

    #[test]
    fn success_recovers_only_when_degraded() {
        let tracker = AvailabilityTracker::new(1);
        assert_eq!(tracker.record(&Ok::<_, ClassifiedError>(())), None);
        let _ = tracker.record(&unavailable());
        assert_eq!(
            tracker.record(&Ok::<_, ClassifiedError>(())),
            Some(Transition::Recovered)
        );
        assert!(!tracker.is_degraded());
        assert_eq!(tracker.consecutive_failures(), 0);
    }
}
