//! Ambient noise learning.
//!
//! A short window of levels recorded before any speech gating is reduced to a
//! robust floor estimate (75th percentile) and its spread, then classified so
//! the policy selector can pick thresholds and a termination mode.

use super::meter::{LevelSample, LEVEL_FLOOR_DB};
use crate::config::PipelineConfig;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering as CmpOrdering;
use std::time::{Duration, Instant};
use tracing::{info, warn};

const QUIET_MAX_VARIATION_DB: f32 = 3.0;
const QUIET_MAX_FLOOR_DB: f32 = -50.0;
const NOISY_MIN_VARIATION_DB: f32 = 8.0;
const NOISY_MIN_FLOOR_DB: f32 = -35.0;
const FLOOR_PERCENTILE: f32 = 0.75;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvironmentClass {
    Quiet,
    Moderate,
    Noisy,
}

impl EnvironmentClass {
    pub fn label(self) -> &'static str {
        match self {
            EnvironmentClass::Quiet => "quiet",
            EnvironmentClass::Moderate => "moderate",
            EnvironmentClass::Noisy => "noisy",
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoiseProfile {
    pub floor_estimate_dbfs: f32,
    pub variation_dbfs: f32,
    pub classification: EnvironmentClass,
    pub sample_count: usize,
}

impl NoiseProfile {
    /// True when the profile came from too few samples to be trusted.
    pub fn is_unreliable(&self, min_samples: usize) -> bool {
        self.sample_count < min_samples
    }
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct NoiseConfig {
    pub learning_window: Duration,
    pub min_samples: usize,
    pub floor_db: f32,
}

impl Default for NoiseConfig {
    fn default() -> Self {
        Self {
            learning_window: Duration::from_millis(2000),
            min_samples: 10,
            floor_db: LEVEL_FLOOR_DB,
        }
    }
}

impl From<&PipelineConfig> for NoiseConfig {
    fn from(cfg: &PipelineConfig) -> Self {
        Self {
            learning_window: Duration::from_millis(cfg.learning_ms),
            min_samples: cfg.min_learning_samples,
            floor_db: cfg.meter_floor_db,
        }
    }
}

/// Reduce a learning window to a profile. Never fails: too few usable samples
/// degrade to `Noisy`, which routes the session to manual stopping.
pub fn estimate(window: &[LevelSample], cfg: &NoiseConfig) -> NoiseProfile {
    let all_silent = window.iter().all(LevelSample::is_silent_sentinel);
    let mut values: Vec<f32> = if all_silent {
        Vec::new()
    } else {
        window
            .iter()
            .map(|sample| {
                if sample.is_silent_sentinel() {
                    cfg.floor_db
                } else {
                    sample.value_dbfs
                }
            })
            .filter(|v| v.is_finite())
            .collect()
    };

    if values.is_empty() {
        warn!(
            collected = window.len(),
            "noise learning produced no usable levels; treating environment as noisy"
        );
        return NoiseProfile {
            floor_estimate_dbfs: cfg.floor_db,
            variation_dbfs: 0.0,
            classification: EnvironmentClass::Noisy,
            sample_count: 0,
        };
    }

    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(CmpOrdering::Equal));
    let floor = percentile(&values, FLOOR_PERCENTILE);
    let variation = std_dev(&values);

    let classification = if values.len() < cfg.min_samples {
        warn!(
            usable = values.len(),
            required = cfg.min_samples,
            "too few noise samples; treating environment as noisy"
        );
        EnvironmentClass::Noisy
    } else {
        classify(floor, variation)
    };

    NoiseProfile {
        floor_estimate_dbfs: floor,
        variation_dbfs: variation,
        classification,
        sample_count: values.len(),
    }
}

pub(super) fn classify(floor_db: f32, variation_db: f32) -> EnvironmentClass {
    if variation_db < QUIET_MAX_VARIATION_DB && floor_db < QUIET_MAX_FLOOR_DB {
        EnvironmentClass::Quiet
    } else if variation_db > NOISY_MIN_VARIATION_DB || floor_db > NOISY_MIN_FLOOR_DB {
        EnvironmentClass::Noisy
    } else {
        EnvironmentClass::Moderate
    }
}

/// Linear interpolation between closest ranks; `sorted` must be ascending and
/// non-empty.
pub(super) fn percentile(sorted: &[f32], fraction: f32) -> f32 {
    let last = sorted.len() - 1;
    let rank = fraction.clamp(0.0, 1.0) * last as f32;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let weight = rank - lower as f32;
    sorted[lower] + (sorted[upper] - sorted[lower]) * weight
}

fn std_dev(values: &[f32]) -> f32 {
    let n = values.len() as f64;
    let mean = values.iter().map(|&v| f64::from(v)).sum::<f64>() / n;
    let var = values
        .iter()
        .map(|&v| {
            let d = f64::from(v) - mean;
            d * d
        })
        .sum::<f64>()
        / n;
    var.sqrt() as f32
}

/// Collects levels for one learning window, then yields a profile.
///
/// A new estimator is created for every calibration; profiles are never
/// updated in place.
pub struct NoiseFloorEstimator {
    cfg: NoiseConfig,
    samples: Vec<LevelSample>,
    started_at: Option<Instant>,
}

impl NoiseFloorEstimator {
    pub fn new(cfg: NoiseConfig) -> Self {
        Self {
            cfg,
            samples: Vec::with_capacity(256),
            started_at: None,
        }
    }

    pub fn collected(&self) -> usize {
        self.samples.len()
    }

    /// Record a level; returns the profile once the window has elapsed.
    pub fn push(&mut self, sample: LevelSample) -> Option<NoiseProfile> {
        let started_at = *self.started_at.get_or_insert(sample.timestamp);
        self.samples.push(sample);
        if sample.timestamp.saturating_duration_since(started_at) < self.cfg.learning_window {
            return None;
        }
        let profile = estimate(&self.samples, &self.cfg);
        info!(
            floor_dbfs = profile.floor_estimate_dbfs,
            variation_db = profile.variation_dbfs,
            samples = profile.sample_count,
            class = profile.classification.label(),
            "noise floor learned"
        );
        Some(profile)
    }
}
