//! Sustained-activity filter shared by the microphone gate and the response
//! controller.
//!
//! Turns a noisy per-block "active now" signal into two stable events:
//! activity that lasted at least `sustain`, and inactivity that outlived the
//! `debounce` grace period. Timers are logical: deadlines are compared against
//! the timestamps handed in with each observation, so nothing fires from a
//! foreign thread.

use std::time::{Duration, Instant};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct DebounceConfig {
    /// Continuous activity needed before `SustainedActive` fires.
    pub sustain: Duration,
    /// Inactivity tolerated before the tracked activity is abandoned.
    pub debounce: Duration,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum DebounceEvent {
    SustainedActive { since: Instant },
    SustainedInactiveConfirmed,
}

#[derive(Debug, Clone)]
pub struct ActivityDebouncer {
    cfg: DebounceConfig,
    tracking_since: Option<Instant>,
    cancel_deadline: Option<Instant>,
}

impl ActivityDebouncer {
    pub fn new(cfg: DebounceConfig) -> Self {
        Self {
            cfg,
            tracking_since: None,
            cancel_deadline: None,
        }
    }

    pub fn config(&self) -> DebounceConfig {
        self.cfg
    }

    pub fn tracking_since(&self) -> Option<Instant> {
        self.tracking_since
    }

    pub fn is_tracking(&self) -> bool {
        self.tracking_since.is_some()
    }

    /// Feed one observation.
    ///
    /// A cancel deadline that already passed is honored before the new
    /// observation is applied, so a late active sample cannot revive activity
    /// that the grace period had already given up on.
    pub fn observe(&mut self, active: bool, now: Instant) -> Option<DebounceEvent> {
        let expired = self.poll(now);
        if active {
            self.cancel_deadline = None;
            let since = *self.tracking_since.get_or_insert(now);
            if expired.is_none() && now.saturating_duration_since(since) >= self.cfg.sustain {
                self.tracking_since = None;
                return Some(DebounceEvent::SustainedActive { since });
            }
        } else if self.tracking_since.is_some() && self.cancel_deadline.is_none() {
            self.cancel_deadline = Some(now + self.cfg.debounce);
        }
        expired
    }

    /// Check the cancel deadline without a new observation.
    pub fn poll(&mut self, now: Instant) -> Option<DebounceEvent> {
        match self.cancel_deadline {
            Some(deadline) if now >= deadline => {
                self.cancel_deadline = None;
                self.tracking_since = None;
                Some(DebounceEvent::SustainedInactiveConfirmed)
            }
            _ => None,
        }
    }

    pub fn reset(&mut self) {
        self.tracking_since = None;
        self.cancel_deadline = None;
    }
}
