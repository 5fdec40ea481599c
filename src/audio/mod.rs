//! Voice-activity and adaptive-recording core.
//!
//! Frames arrive from the input device as mono f32 blocks. Each block is
//! reduced to one dBFS level which feeds the microphone validation gate, the
//! noise floor estimator during calibration, and the response controller
//! while a response is being captured.

use std::time::Duration;

mod capture;
mod debounce;
mod dispatch;
mod gate;
mod meter;
mod noise;
mod policy;
mod recorder;
mod resample;
#[cfg(test)]
mod tests;

pub use capture::{
    ControllerConfig, FinishedRecording, FrameOutcome, ResponseController, SessionId,
    SessionState, SessionTicket, StopReason,
};
pub use debounce::{ActivityDebouncer, DebounceConfig, DebounceEvent};
pub use gate::{ActivityState, GateConfig, MicValidationGate};
pub use meter::{
    is_silent_sentinel, level_dbfs, normalized_level, LevelSample, LiveMeter, LEVEL_FLOOR_DB,
    SILENT_SENTINEL_DB,
};
pub use noise::{estimate, EnvironmentClass, NoiseConfig, NoiseFloorEstimator, NoiseProfile};
pub use policy::{PolicyConfig, PolicySelector, TerminationPolicy};
pub use recorder::{mic_permission_hint, DeviceUnavailable, LiveInput, Recorder};
pub use resample::resample;

/// One block of mono samples copied out of the device callback.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl AudioFrame {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Media time covered by this block.
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        let nanos = self.samples.len() as u128 * 1_000_000_000 / u128::from(self.sample_rate);
        Duration::from_nanos(nanos as u64)
    }
}
