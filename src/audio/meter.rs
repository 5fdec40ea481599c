use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Lowest level the meter reports for a block that still carries signal.
pub const LEVEL_FLOOR_DB: f32 = -80.0;

/// Reported for blocks that are numerically silent (RMS at or below
/// [`SILENCE_RMS_EPSILON`]) or empty.
pub const SILENT_SENTINEL_DB: f32 = f32::NEG_INFINITY;

const SILENCE_RMS_EPSILON: f64 = 1e-10;

/// One loudness observation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LevelSample {
    pub value_dbfs: f32,
    pub timestamp: Instant,
}

impl LevelSample {
    pub fn new(value_dbfs: f32, timestamp: Instant) -> Self {
        Self {
            value_dbfs,
            timestamp,
        }
    }

    pub fn is_silent_sentinel(&self) -> bool {
        is_silent_sentinel(self.value_dbfs)
    }
}

pub fn is_silent_sentinel(db: f32) -> bool {
    db == SILENT_SENTINEL_DB
}

/// RMS level of a block in dBFS, clamped into `[floor_db, 0.0]`.
///
/// Runs once per audio block, so it never allocates.
pub fn level_dbfs(samples: &[f32], floor_db: f32) -> f32 {
    if samples.is_empty() {
        return SILENT_SENTINEL_DB;
    }
    let energy: f64 = samples
        .iter()
        .map(|&s| f64::from(s) * f64::from(s))
        .sum::<f64>()
        / samples.len() as f64;
    let rms = energy.sqrt();
    if rms <= SILENCE_RMS_EPSILON || !rms.is_finite() {
        return SILENT_SENTINEL_DB;
    }
    let db = (20.0 * rms.log10()) as f32;
    db.clamp(floor_db, 0.0)
}

/// Map a level onto `[0, 1]` for meter bars.
pub fn normalized_level(db: f32, floor_db: f32) -> f32 {
    if is_silent_sentinel(db) || floor_db >= 0.0 {
        return 0.0;
    }
    ((db - floor_db) / -floor_db).clamp(0.0, 1.0)
}

/// Latest level published by the audio side for the control thread.
#[derive(Clone, Debug)]
pub struct LiveMeter {
    level_bits: Arc<AtomicU32>,
}

impl LiveMeter {
    pub fn new() -> Self {
        Self {
            level_bits: Arc::new(AtomicU32::new(SILENT_SENTINEL_DB.to_bits())),
        }
    }

    pub fn set_db(&self, db: f32) {
        self.level_bits.store(db.to_bits(), Ordering::Relaxed);
    }

    pub fn level_db(&self) -> f32 {
        f32::from_bits(self.level_bits.load(Ordering::Relaxed))
    }
}

impl Default for LiveMeter {
    fn default() -> Self {
        Self::new()
    }
}
