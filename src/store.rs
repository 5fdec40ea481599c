//! Response persistence and resume detection.
//!
//! Answers live in one directory as `response_NN.wav` (NN is the 1-based
//! question number). An interview resumes at the first question whose file is
//! missing.

use crate::audio::{resample, FinishedRecording, NoiseProfile, TerminationPolicy};
use anyhow::{Context, Result};
use hound::{SampleFormat, WavSpec, WavWriter};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const ENVIRONMENT_FILE: &str = "environment.json";

/// Calibration result recorded next to the responses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentManifest {
    pub profile: NoiseProfile,
    pub policy: TerminationPolicy,
}

#[derive(Debug, Clone)]
pub struct ResponseStore {
    dir: PathBuf,
    output_rate: Option<u32>,
}

impl ResponseStore {
    /// Open (and create if needed) the responses directory. `output_rate`
    /// forces every saved file to that sample rate.
    pub fn open(dir: impl Into<PathBuf>, output_rate: Option<u32>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create responses directory {}", dir.display()))?;
        Ok(Self { dir, output_rate })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the answer to the zero-based question `index`.
    pub fn response_path(&self, index: usize) -> PathBuf {
        self.dir.join(format!("response_{:02}.wav", index + 1))
    }

    /// Answers present without a gap from the first question.
    pub fn count_existing(&self, total: usize) -> usize {
        (0..total)
            .take_while(|&index| self.response_path(index).is_file())
            .count()
    }

    /// First unanswered question, or `total` when the interview is complete.
    pub fn resume_index(&self, total: usize) -> usize {
        let index = self.count_existing(total);
        if index == total {
            info!(total, "all questions already answered");
        } else if index > 0 {
            info!(answered = index, next = index + 1, "resuming interview");
        }
        index
    }

    /// Write one answer as 16-bit mono PCM. Empty recordings still produce a
    /// valid file so the question counts as answered.
    pub fn save(&self, index: usize, recording: &FinishedRecording) -> Result<PathBuf> {
        let mut samples = recording.to_samples();
        let mut sample_rate = recording.sample_rate;
        if let Some(target) = self.output_rate {
            if target != sample_rate {
                samples = resample(&samples, sample_rate, target);
                sample_rate = target;
            }
        }

        let path = self.response_path(index);
        // Written under a temporary name so a crash never leaves a truncated
        // file that resume detection would count.
        let partial = path.with_extension("wav.partial");
        write_wav(&partial, &samples, sample_rate)?;
        fs::rename(&partial, &path)
            .with_context(|| format!("failed to move response into {}", path.display()))?;

        info!(
            question = index + 1,
            samples = samples.len(),
            sample_rate,
            reason = recording.reason.label(),
            path = %path.display(),
            "response saved"
        );
        Ok(path)
    }

    pub fn environment_path(&self) -> PathBuf {
        self.dir.join(ENVIRONMENT_FILE)
    }

    pub fn write_environment(
        &self,
        profile: &NoiseProfile,
        policy: &TerminationPolicy,
    ) -> Result<PathBuf> {
        let manifest = EnvironmentManifest {
            profile: *profile,
            policy: *policy,
        };
        let path = self.environment_path();
        let json = serde_json::to_string_pretty(&manifest)
            .context("failed to serialize environment manifest")?;
        fs::write(&path, json).with_context(|| format!("failed to write {}", path.display()))?;
        debug!(path = %path.display(), "environment manifest written");
        Ok(path)
    }

    /// Last recorded calibration, if any.
    pub fn read_environment(&self) -> Result<Option<EnvironmentManifest>> {
        let path = self.environment_path();
        if !path.is_file() {
            return Ok(None);
        }
        let raw =
            fs::read_to_string(&path).with_context(|| format!("failed to read {}", path.display()))?;
        let manifest = serde_json::from_str(&raw)
            .with_context(|| format!("invalid environment manifest {}", path.display()))?;
        Ok(Some(manifest))
    }
}

fn write_wav(path: &Path, samples: &[f32], sample_rate: u32) -> Result<()> {
    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut writer = WavWriter::create(path, spec)
        .with_context(|| format!("failed to create {}", path.display()))?;
    for &sample in samples {
        let pcm = (sample.clamp(-1.0, 1.0) * f32::from(i16::MAX)) as i16;
        writer.write_sample(pcm).context("failed to write sample")?;
    }
    writer.finalize().context("failed to finalize wav file")?;
    Ok(())
}
