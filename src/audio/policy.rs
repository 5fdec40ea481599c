//! Maps a learned noise profile to the termination policy used for every
//! response of a session.

use super::meter::LEVEL_FLOOR_DB;
use super::noise::{EnvironmentClass, NoiseProfile};
use crate::config::PipelineConfig;
use serde::{Deserialize, Serialize};

/// Margin added on top of the environment offset when adapting the threshold.
const ADAPTIVE_BASE_MARGIN_DB: f32 = 6.0;

/// How a response capture reaches `Finished`.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum TerminationPolicy {
    Automatic {
        threshold_dbfs: f32,
        silence_timeout_ms: u64,
    },
    Manual,
}

impl TerminationPolicy {
    pub fn label(&self) -> &'static str {
        match self {
            TerminationPolicy::Automatic { .. } => "automatic",
            TerminationPolicy::Manual => "manual",
        }
    }

    pub fn is_manual(&self) -> bool {
        matches!(self, TerminationPolicy::Manual)
    }
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct PolicyConfig {
    /// Lower bound for any adapted threshold.
    pub default_threshold_dbfs: f32,
    pub quiet_offset_db: f32,
    pub moderate_offset_db: f32,
    pub quiet_silence_timeout_ms: u64,
    pub moderate_silence_timeout_ms: u64,
    pub meter_floor_db: f32,
    pub force_manual: bool,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            default_threshold_dbfs: -40.0,
            quiet_offset_db: 3.0,
            moderate_offset_db: 6.0,
            quiet_silence_timeout_ms: 800,
            moderate_silence_timeout_ms: 1200,
            meter_floor_db: LEVEL_FLOOR_DB,
            force_manual: false,
        }
    }
}

impl From<&PipelineConfig> for PolicyConfig {
    fn from(cfg: &PipelineConfig) -> Self {
        Self {
            default_threshold_dbfs: cfg.validation_threshold_db,
            quiet_offset_db: cfg.quiet_offset_db,
            moderate_offset_db: cfg.moderate_offset_db,
            quiet_silence_timeout_ms: cfg.quiet_silence_timeout_ms,
            moderate_silence_timeout_ms: cfg.moderate_silence_timeout_ms,
            meter_floor_db: cfg.meter_floor_db,
            force_manual: cfg.force_manual,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PolicySelector {
    cfg: PolicyConfig,
}

impl PolicySelector {
    pub fn new(cfg: PolicyConfig) -> Self {
        Self { cfg }
    }

    pub fn select(&self, profile: &NoiseProfile) -> TerminationPolicy {
        if self.cfg.force_manual {
            return TerminationPolicy::Manual;
        }
        let (offset, timeout) = match profile.classification {
            EnvironmentClass::Quiet => (self.cfg.quiet_offset_db, self.cfg.quiet_silence_timeout_ms),
            EnvironmentClass::Moderate => (
                self.cfg.moderate_offset_db,
                self.cfg.moderate_silence_timeout_ms,
            ),
            EnvironmentClass::Noisy => return TerminationPolicy::Manual,
        };
        TerminationPolicy::Automatic {
            threshold_dbfs: self.adapted_threshold(profile.floor_estimate_dbfs, offset),
            silence_timeout_ms: timeout,
        }
    }

    /// A floor at the meter floor means nothing measurable was heard, so the
    /// default threshold applies.
    pub fn adapted_threshold(&self, floor_dbfs: f32, offset_db: f32) -> f32 {
        if !floor_dbfs.is_finite() || floor_dbfs <= self.cfg.meter_floor_db {
            return self.cfg.default_threshold_dbfs;
        }
        let adapted = floor_dbfs + offset_db + ADAPTIVE_BASE_MARGIN_DB;
        adapted.max(self.cfg.default_threshold_dbfs)
    }
}

impl Default for PolicySelector {
    fn default() -> Self {
        Self::new(PolicyConfig::default())
    }
}
