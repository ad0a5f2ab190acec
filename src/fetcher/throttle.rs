//! Throttle Detector
//!
//! Recognises block signals (rate-limit statuses and redirects to the block
//! interstitial) and counts them over a rolling window. Reaching the threshold
//! inside the window asks the caller for exactly one identity reset.

use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::RawResponse;
use crate::scraper::config::{RESET_COOLDOWN_MAX, THROTTLE_THRESHOLD, THROTTLE_WINDOW};

/// Redirect targets that indicate automated-traffic detection
const BLOCK_PATHS: &[&str] = &["/sorry", "/interstitial"];

/// Incident bookkeeping for one run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThrottleState {
    /// Incidents counted in the current window
    pub incident_count: u32,
    /// When the first incident of the run was recorded
    pub window_start: Option<Instant>,
    /// When the last incident was recorded
    pub last_incident_at: Option<Instant>,
}

impl ThrottleState {
    fn new() -> Self {
        Self {
            incident_count: 0,
            window_start: None,
            last_incident_at: None,
        }
    }
}

/// Outcome of recording an incident
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThrottleSignal {
    /// Keep backing off with the current identity
    None,
    /// Discard the identity before the next call
    ResetRequired,
}

/// Per-run throttle detector
#[derive(Debug)]
pub struct ThrottleDetector {
    state: ThrottleState,
    window: Duration,
    threshold: u32,
    reset_guard: Duration,
    guard_until: Option<Instant>,
    total_incidents: u64,
}

impl Default for ThrottleDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl ThrottleDetector {
    /// Detector with the standard window and threshold
    pub fn new() -> Self {
        Self::with_limits(THROTTLE_WINDOW, THROTTLE_THRESHOLD)
    }

    /// Detector with a custom window and threshold
    pub fn with_limits(window: Duration, threshold: u32) -> Self {
        Self {
            state: ThrottleState::new(),
            window,
            threshold: threshold.max(1),
            reset_guard: RESET_COOLDOWN_MAX,
            guard_until: None,
            total_incidents: 0,
        }
    }

    /// Whether a response is a block signal
    ///
    /// True for HTTP 429 and for redirects to a known block or interstitial
    /// path.
    pub fn inspect(response: &RawResponse) -> bool {
        if response.status == 429 {
            return true;
        }

        (300..400).contains(&response.status)
            && response
                .location
                .as_deref()
                .map(|location| BLOCK_PATHS.iter().any(|path| location.contains(path)))
                .unwrap_or(false)
    }

    /// Record an incident now
    pub fn record_incident(&mut self) -> ThrottleSignal {
        self.record_incident_at(Instant::now())
    }

    /// Record an incident observed at `now`
    ///
    /// A quiet period longer than the window resets the counter before it is
    /// incremented; `window_start` keeps its first value. At the threshold the counter goes back to 0 and
    /// [`ThrottleSignal::ResetRequired`] is returned, unless a reset was
    /// already signalled within the cooldown guard.
    pub fn record_incident_at(&mut self, now: Instant) -> ThrottleSignal {
        self.total_incidents += 1;

        let stale = self
            .state
            .last_incident_at
            .map(|last| now.saturating_duration_since(last) > self.window)
            .unwrap_or(true);
        if stale {
            if self.state.incident_count > 0 {
                debug!(
                    previous = self.state.incident_count,
                    "Throttle window expired, counter reset"
                );
            }
            self.state.incident_count = 0;
        }
        if self.state.window_start.is_none() {
            self.state.window_start = Some(now);
        }

        self.state.incident_count += 1;
        self.state.last_incident_at = Some(now);

        if self.state.incident_count < self.threshold {
            debug!(
                incidents = self.state.incident_count,
                threshold = self.threshold,
                "Throttle incident recorded"
            );
            return ThrottleSignal::None;
        }

        self.state.incident_count = 0;

        if self.guard_until.is_some_and(|until| now < until) {
            debug!("Reset already signalled within cooldown, suppressing");
            return ThrottleSignal::None;
        }

        self.guard_until = Some(now + self.reset_guard);
        warn!(
            threshold = self.threshold,
            window_secs = self.window.as_secs(),
            "Throttle threshold reached, identity reset required"
        );
        ThrottleSignal::ResetRequired
    }

    /// Current incident bookkeeping
    pub fn state(&self) -> ThrottleState {
        self.state
    }

    /// Incidents counted in the current window
    pub fn incident_count(&self) -> u32 {
        self.state.incident_count
    }

    /// All incidents recorded over the run
    pub fn total_incidents(&self) -> u64 {
        self.total_incidents
    }
}
