use super::defaults::{FORBIDDEN_DEVICE_CHARS, MAX_DEVICE_NAME_BYTES};
use super::{
    AppConfig, PipelineConfig, MAX_QUESTIONS, MAX_SILENCE_TIMEOUT_MS, MIN_SILENCE_TIMEOUT_MS,
};
use anyhow::{bail, Result};
use clap::Parser;

impl AppConfig {
    /// Parse CLI arguments and validate them right away.
    pub fn parse_args() -> Result<Self> {
        let mut config = Self::parse();
        config.validate()?;
        Ok(config)
    }

    /// Check CLI values against their supported ranges.
    pub fn validate(&mut self) -> Result<()> {
        if !(1..=MAX_QUESTIONS).contains(&self.questions) {
            bail!(
                "--questions must be between 1 and {MAX_QUESTIONS}, got {}",
                self.questions
            );
        }
        if self.responses_dir.as_os_str().is_empty() {
            bail!("--responses-dir cannot be empty");
        }
        if !(64..=8192).contains(&self.block_size) {
            bail!(
                "--block-size must be between 64 and 8192 samples, got {}",
                self.block_size
            );
        }
        if !(8..=1024).contains(&self.channel_capacity) {
            bail!(
                "--channel-capacity must be between 8 and 1024, got {}",
                self.channel_capacity
            );
        }
        if !(-120.0..=-20.0).contains(&self.meter_floor_db) {
            bail!(
                "--meter-floor-db must be between -120.0 and -20.0 dB, got {}",
                self.meter_floor_db
            );
        }
        if !(-80.0..=0.0).contains(&self.validation_threshold_db) {
            bail!(
                "--validation-threshold-db must be between -80.0 and 0.0 dB, got {}",
                self.validation_threshold_db
            );
        }
        if self.validation_threshold_db <= self.meter_floor_db {
            bail!(
                "--validation-threshold-db ({}) must be above --meter-floor-db ({})",
                self.validation_threshold_db,
                self.meter_floor_db
            );
        }
        if !(200..=10_000).contains(&self.validation_ms) {
            bail!(
                "--validation-ms must be between 200 and 10000 ms, got {}",
                self.validation_ms
            );
        }
        if self.validation_debounce_ms > 5_000 {
            bail!(
                "--validation-debounce-ms must be between 0 and 5000 ms, got {}",
                self.validation_debounce_ms
            );
        }
        if !(500..=10_000).contains(&self.learning_ms) {
            bail!(
                "--learning-ms must be between 500 and 10000 ms, got {}",
                self.learning_ms
            );
        }
        if !(1..=1000).contains(&self.min_learning_samples) {
            bail!(
                "--min-learning-samples must be between 1 and 1000, got {}",
                self.min_learning_samples
            );
        }
        for (flag, value) in [
            ("--quiet-silence-timeout-ms", self.quiet_silence_timeout_ms),
            ("--moderate-silence-timeout-ms", self.moderate_silence_timeout_ms),
        ] {
            if !(MIN_SILENCE_TIMEOUT_MS..=MAX_SILENCE_TIMEOUT_MS).contains(&value) {
                bail!(
                    "{flag} must be between {MIN_SILENCE_TIMEOUT_MS} and {MAX_SILENCE_TIMEOUT_MS} ms, got {value}"
                );
            }
        }
        if let Some(rate) = self.response_sample_rate {
            if !(8_000..=192_000).contains(&rate) {
                bail!("--response-sample-rate must be between 8000 and 192000 Hz, got {rate}");
            }
        }

        if let Some(device) = &self.input_device {
            let trimmed = device.trim();
            if trimmed.is_empty()
                || trimmed.len() > MAX_DEVICE_NAME_BYTES
                || trimmed.chars().any(|ch| FORBIDDEN_DEVICE_CHARS.contains(&ch))
            {
                bail!(
                    "--input-device must be 1-{MAX_DEVICE_NAME_BYTES} bytes with no control characters"
                );
            }
            self.input_device = Some(trimmed.to_string());
        }

        Ok(())
    }

    /// True when file logging should be installed.
    pub fn logging_enabled(&self) -> bool {
        self.logs && !self.no_logs
    }

    /// Snapshot the CLI-controlled tuning values for the pipeline.
    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            block_size: self.block_size,
            channel_capacity: self.channel_capacity,
            meter_floor_db: self.meter_floor_db,
            validation_threshold_db: self.validation_threshold_db,
            validation_ms: self.validation_ms,
            validation_debounce_ms: self.validation_debounce_ms,
            learning_ms: self.learning_ms,
            min_learning_samples: self.min_learning_samples,
            quiet_silence_timeout_ms: self.quiet_silence_timeout_ms,
            moderate_silence_timeout_ms: self.moderate_silence_timeout_ms,
            force_manual: self.force_manual,
            response_sample_rate: self.response_sample_rate,
            ..PipelineConfig::default()
        }
    }
}
