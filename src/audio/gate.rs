//! One-shot microphone validation latch.
//!
//! The interview may only start once the subject has spoken above the
//! threshold for `required_duration`. Once validated the gate stays validated
//! until `reset()`, which the owner must call on every device change.

use super::debounce::{ActivityDebouncer, DebounceConfig, DebounceEvent};
use crate::config::PipelineConfig;
use std::time::{Duration, Instant};
use tracing::{debug, info};

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct GateConfig {
    pub threshold_dbfs: f32,
    pub required_duration: Duration,
    pub debounce_duration: Duration,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            threshold_dbfs: -40.0,
            required_duration: Duration::from_millis(1500),
            debounce_duration: Duration::from_millis(1000),
        }
    }
}

impl From<&PipelineConfig> for GateConfig {
    fn from(cfg: &PipelineConfig) -> Self {
        Self {
            threshold_dbfs: cfg.validation_threshold_db,
            required_duration: Duration::from_millis(cfg.validation_ms),
            debounce_duration: Duration::from_millis(cfg.validation_debounce_ms),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ActivityState {
    Idle,
    Accumulating { started_at: Instant },
    Validated,
}

pub struct MicValidationGate {
    cfg: GateConfig,
    debouncer: ActivityDebouncer,
    state: ActivityState,
}

impl MicValidationGate {
    pub fn new(cfg: GateConfig) -> Self {
        let debouncer = ActivityDebouncer::new(DebounceConfig {
            sustain: cfg.required_duration,
            debounce: cfg.debounce_duration,
        });
        Self {
            cfg,
            debouncer,
            state: ActivityState::Idle,
        }
    }

    pub fn config(&self) -> GateConfig {
        self.cfg
    }

    pub fn state(&self) -> ActivityState {
        self.state
    }

    pub fn is_validated(&self) -> bool {
        self.state == ActivityState::Validated
    }

    pub fn feed(&mut self, level_dbfs: f32, now: Instant) -> ActivityState {
        if self.is_validated() {
            return self.state;
        }

        let active = level_dbfs >= self.cfg.threshold_dbfs;
        match self.debouncer.observe(active, now) {
            Some(DebounceEvent::SustainedActive { since }) => {
                info!(
                    held_ms = now.saturating_duration_since(since).as_millis() as u64,
                    "microphone validated"
                );
                self.debouncer.reset();
                self.state = ActivityState::Validated;
                return self.state;
            }
            Some(DebounceEvent::SustainedInactiveConfirmed) => {
                debug!("validation activity lapsed; waiting for speech again");
            }
            None => {}
        }

        self.state = match self.debouncer.tracking_since() {
            Some(started_at) => ActivityState::Accumulating { started_at },
            None => ActivityState::Idle,
        };
        self.state
    }

    /// Sustained activity still missing before validation, for status text.
    pub fn remaining(&self, now: Instant) -> Duration {
        match self.state {
            ActivityState::Validated => Duration::ZERO,
            ActivityState::Idle => self.cfg.required_duration,
            ActivityState::Accumulating { started_at } => self
                .cfg
                .required_duration
                .saturating_sub(now.saturating_duration_since(started_at)),
        }
    }

    pub fn reset(&mut self) {
        if self.state != ActivityState::Idle {
            debug!(previous = ?self.state, "validation gate reset");
        }
        self.debouncer.reset();
        self.state = ActivityState::Idle;
    }
}

impl Default for MicValidationGate {
    fn default() -> Self {
        Self::new(GateConfig::default())
    }
}
