//! Command-line parsing and validation helpers.

mod defaults;
mod validation;

use clap::Parser;
use std::path::PathBuf;

pub use defaults::{
    DEFAULT_BLOCK_SIZE, DEFAULT_CHANNEL_CAPACITY, DEFAULT_FALLBACK_SAMPLE_RATE,
    DEFAULT_LEARNING_MS, DEFAULT_METER_FLOOR_DB, DEFAULT_MIN_LEARNING_SAMPLES,
    DEFAULT_MODERATE_OFFSET_DB, DEFAULT_MODERATE_SILENCE_TIMEOUT_MS, DEFAULT_QUESTIONS,
    DEFAULT_QUIET_OFFSET_DB, DEFAULT_QUIET_SILENCE_TIMEOUT_MS, DEFAULT_RESPONSES_DIR,
    DEFAULT_SPEECH_CONFIRM_MS, DEFAULT_SPEECH_TOLERANCE_MS, DEFAULT_VALIDATION_DEBOUNCE_MS,
    DEFAULT_VALIDATION_MS, DEFAULT_VALIDATION_THRESHOLD_DB, MAX_QUESTIONS,
    MAX_SILENCE_TIMEOUT_MS, MIN_SILENCE_TIMEOUT_MS,
};

/// CLI options for the interview runner.
#[derive(Debug, Parser, Clone)]
#[command(about = "Unattended audio interview recorder", author, version)]
pub struct AppConfig {
    /// Preferred audio input device name
    #[arg(long, env = "NOVAQA_INPUT_DEVICE")]
    pub input_device: Option<String>,

    /// Print detected audio input devices and exit
    #[arg(long = "list-input-devices", default_value_t = false)]
    pub list_input_devices: bool,

    /// Number of questions in the interview
    #[arg(long, default_value_t = DEFAULT_QUESTIONS)]
    pub questions: usize,

    /// Directory receiving response_NN.wav files
    #[arg(long = "responses-dir", env = "NOVAQA_RESPONSES_DIR", default_value = DEFAULT_RESPONSES_DIR)]
    pub responses_dir: PathBuf,

    /// Samples per analysis block sent from the device callback
    #[arg(long = "block-size", default_value_t = DEFAULT_BLOCK_SIZE)]
    pub block_size: usize,

    /// Block channel capacity between the device callback and the pipeline
    #[arg(long = "channel-capacity", default_value_t = DEFAULT_CHANNEL_CAPACITY)]
    pub channel_capacity: usize,

    /// Lowest level reported by the meter (dBFS)
    #[arg(long = "meter-floor-db", default_value_t = DEFAULT_METER_FLOOR_DB, allow_hyphen_values = true)]
    pub meter_floor_db: f32,

    /// Level the subject must reach to validate the microphone (dBFS)
    #[arg(
        long = "validation-threshold-db",
        default_value_t = DEFAULT_VALIDATION_THRESHOLD_DB,
        allow_hyphen_values = true
    )]
    pub validation_threshold_db: f32,

    /// Sustained speech required to validate the microphone (milliseconds)
    #[arg(long = "validation-ms", default_value_t = DEFAULT_VALIDATION_MS)]
    pub validation_ms: u64,

    /// Pause tolerated while validating (milliseconds)
    #[arg(long = "validation-debounce-ms", default_value_t = DEFAULT_VALIDATION_DEBOUNCE_MS)]
    pub validation_debounce_ms: u64,

    /// Ambient noise learning window (milliseconds)
    #[arg(long = "learning-ms", default_value_t = DEFAULT_LEARNING_MS)]
    pub learning_ms: u64,

    /// Levels needed for a trustworthy noise estimate
    #[arg(long = "min-learning-samples", default_value_t = DEFAULT_MIN_LEARNING_SAMPLES)]
    pub min_learning_samples: usize,

    /// Trailing silence that ends a response in a quiet room (milliseconds)
    #[arg(
        long = "quiet-silence-timeout-ms",
        default_value_t = DEFAULT_QUIET_SILENCE_TIMEOUT_MS
    )]
    pub quiet_silence_timeout_ms: u64,

    /// Trailing silence that ends a response in a moderate room (milliseconds)
    #[arg(
        long = "moderate-silence-timeout-ms",
        default_value_t = DEFAULT_MODERATE_SILENCE_TIMEOUT_MS
    )]
    pub moderate_silence_timeout_ms: u64,

    /// Always require Enter to end a response
    #[arg(long = "force-manual", env = "NOVAQA_FORCE_MANUAL", default_value_t = false)]
    pub force_manual: bool,

    /// Resample saved responses to this rate (Hz); device rate when omitted
    #[arg(long = "response-sample-rate")]
    pub response_sample_rate: Option<u32>,

    /// Enable file logging (debug)
    #[arg(long = "logs", env = "NOVAQA_LOGS", default_value_t = false)]
    pub logs: bool,

    /// Disable all file logging (overrides --logs and log env vars)
    #[arg(long = "no-logs", env = "NOVAQA_NO_LOGS", default_value_t = false)]
    pub no_logs: bool,
}

/// Immutable tuning values every pipeline component is built from.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub block_size: usize,
    pub channel_capacity: usize,
    pub meter_floor_db: f32,
    pub validation_threshold_db: f32,
    pub validation_ms: u64,
    pub validation_debounce_ms: u64,
    pub learning_ms: u64,
    pub min_learning_samples: usize,
    pub quiet_offset_db: f32,
    pub moderate_offset_db: f32,
    pub quiet_silence_timeout_ms: u64,
    pub moderate_silence_timeout_ms: u64,
    pub force_manual: bool,
    pub speech_confirm_ms: u64,
    pub speech_tolerance_ms: u64,
    pub fallback_sample_rate: u32,
    pub response_sample_rate: Option<u32>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            meter_floor_db: DEFAULT_METER_FLOOR_DB,
            validation_threshold_db: DEFAULT_VALIDATION_THRESHOLD_DB,
            validation_ms: DEFAULT_VALIDATION_MS,
            validation_debounce_ms: DEFAULT_VALIDATION_DEBOUNCE_MS,
            learning_ms: DEFAULT_LEARNING_MS,
            min_learning_samples: DEFAULT_MIN_LEARNING_SAMPLES,
            quiet_offset_db: DEFAULT_QUIET_OFFSET_DB,
            moderate_offset_db: DEFAULT_MODERATE_OFFSET_DB,
            quiet_silence_timeout_ms: DEFAULT_QUIET_SILENCE_TIMEOUT_MS,
            moderate_silence_timeout_ms: DEFAULT_MODERATE_SILENCE_TIMEOUT_MS,
            force_manual: false,
            speech_confirm_ms: DEFAULT_SPEECH_CONFIRM_MS,
            speech_tolerance_ms: DEFAULT_SPEECH_TOLERANCE_MS,
            fallback_sample_rate: DEFAULT_FALLBACK_SAMPLE_RATE,
            response_sample_rate: None,
        }
    }
}
