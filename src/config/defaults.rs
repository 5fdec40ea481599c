pub const DEFAULT_QUESTIONS: usize = 10;
pub const MAX_QUESTIONS: usize = 200;
pub const DEFAULT_RESPONSES_DIR: &str = "responses";

pub const DEFAULT_BLOCK_SIZE: usize = 1024;
pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;
pub const DEFAULT_METER_FLOOR_DB: f32 = -80.0;

pub const DEFAULT_VALIDATION_THRESHOLD_DB: f32 = -40.0;
pub const DEFAULT_VALIDATION_MS: u64 = 1500;
pub const DEFAULT_VALIDATION_DEBOUNCE_MS: u64 = 1000;

pub const DEFAULT_LEARNING_MS: u64 = 2000;
pub const DEFAULT_MIN_LEARNING_SAMPLES: usize = 10;

pub const DEFAULT_QUIET_OFFSET_DB: f32 = 3.0;
pub const DEFAULT_MODERATE_OFFSET_DB: f32 = 6.0;
pub const DEFAULT_QUIET_SILENCE_TIMEOUT_MS: u64 = 800;
pub const DEFAULT_MODERATE_SILENCE_TIMEOUT_MS: u64 = 1200;

pub const DEFAULT_SPEECH_CONFIRM_MS: u64 = 300;
pub const DEFAULT_SPEECH_TOLERANCE_MS: u64 = 500;
pub const DEFAULT_FALLBACK_SAMPLE_RATE: u32 = 44_100;

pub const MIN_SILENCE_TIMEOUT_MS: u64 = 200;
pub const MAX_SILENCE_TIMEOUT_MS: u64 = 10_000;

/// Characters that never appear in a real device name.
pub(super) const FORBIDDEN_DEVICE_CHARS: &[char] = &['\0', '\n', '\r', '\t'];
pub(super) const MAX_DEVICE_NAME_BYTES: usize = 256;
