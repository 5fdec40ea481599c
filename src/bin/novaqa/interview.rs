//! Question loop: validate the microphone, learn the room, then record one
//! answer per remaining question.

use anyhow::{bail, Context, Result};
use crossbeam_channel::{never, select, Receiver};
use novaqa::audio::{DeviceUnavailable, NoiseProfile, TerminationPolicy};
use novaqa::events::CoreEvent;
use novaqa::pipeline::PipelineHandle;
use novaqa::store::ResponseStore;
use std::io::{self, Write};
use std::time::Duration;
use tracing::{info, warn};

use crate::level_bar::{format_level_bar, BAR_WIDTH};

const METER_UPDATE_MS: u64 = 80;

pub(crate) struct Interview<'a> {
    pub(crate) handle: &'a PipelineHandle,
    pub(crate) store: &'a ResponseStore,
    pub(crate) events: Receiver<CoreEvent>,
    pub(crate) lines: Receiver<String>,
    pub(crate) errors: Receiver<DeviceUnavailable>,
    pub(crate) floor_db: f32,
    pub(crate) validation_threshold_db: f32,
    pub(crate) validation_ms: u64,
}

/// What the wait loop does with a line typed on stdin.
#[derive(Clone, Copy, PartialEq, Eq)]
enum EnterAction {
    Ignore,
    StopCapture,
}

impl Interview<'_> {
    pub(crate) fn run(&mut self, first: usize, total: usize) -> Result<()> {
        self.validate_microphone()?;
        let policy = self.calibrate()?;
        for index in first..total {
            self.ask(index, total, policy)?;
        }
        println!("Interview complete: {total} answers in {}.", self.store.dir().display());
        Ok(())
    }

    fn validate_microphone(&mut self) -> Result<()> {
        println!(
            "Microphone check: speak for {:.1}s above {:.0} dBFS.",
            self.validation_ms as f32 / 1000.0,
            self.validation_threshold_db
        );
        self.wait_for(true, EnterAction::Ignore, |event| {
            matches!(event, CoreEvent::Validated).then_some(())
        })?;
        println!("\nMicrophone validated.");
        Ok(())
    }

    fn calibrate(&mut self) -> Result<TerminationPolicy> {
        println!("Measuring room noise: please stay quiet...");
        self.handle.calibrate()?;
        let (profile, policy) = self.wait_for(false, EnterAction::Ignore, |event| match event {
            CoreEvent::EnvironmentCalibrated { profile, policy } => Some((profile, policy)),
            _ => None,
        })?;
        print_environment(&profile, &policy);
        self.store.write_environment(&profile, &policy)?;
        Ok(policy)
    }

    fn ask(&mut self, index: usize, total: usize, policy: TerminationPolicy) -> Result<()> {
        println!("\nQuestion {}/{}", index + 1, total);
        match policy {
            TerminationPolicy::Manual => println!("Answer now, then press Enter."),
            TerminationPolicy::Automatic { .. } => {
                println!("Answer now; a pause ends the answer (Enter ends it right away).")
            }
        }
        self.handle.start_recording()?;
        let recording = self.wait_for(false, EnterAction::StopCapture, |event| match event {
            CoreEvent::RecordingFinished(recording) => Some(recording),
            _ => None,
        })?;
        if recording.is_empty() {
            warn!(question = index + 1, "empty answer recorded");
        }
        let path = self.store.save(index, &recording)?;
        println!(
            "Saved {:.1}s answer to {}",
            recording.duration_ms() as f32 / 1000.0,
            path.display()
        );
        Ok(())
    }

    /// Block until `pick` accepts an event. Device errors force a manual stop
    /// and end the interview.
    fn wait_for<T>(
        &mut self,
        show_meter: bool,
        enter: EnterAction,
        mut pick: impl FnMut(CoreEvent) -> Option<T>,
    ) -> Result<T> {
        let tick = Duration::from_millis(METER_UPDATE_MS);
        loop {
            let wake = select! {
                recv(self.events) -> event => Wake::Event(event.ok()),
                recv(self.lines) -> line => Wake::Line(line.is_ok()),
                recv(self.errors) -> err => Wake::Device(err.ok()),
                default(tick) => Wake::Tick,
            };
            match wake {
                Wake::Event(None) => bail!("pipeline stopped unexpectedly"),
                Wake::Event(Some(CoreEvent::Rejected { reason })) => {
                    bail!("pipeline rejected command: {reason}")
                }
                Wake::Event(Some(CoreEvent::SpeechConfirmed { session })) => {
                    info!(session, "speech detected");
                }
                Wake::Event(Some(event)) => {
                    if let Some(value) = pick(event) {
                        return Ok(value);
                    }
                }
                Wake::Line(true) if enter == EnterAction::StopCapture => self.handle.stop_manual(),
                Wake::Line(true) => {}
                Wake::Line(false) => self.lines = never(),
                Wake::Device(Some(err)) => {
                    self.handle.stop_manual();
                    return Err(err).context("audio input failed");
                }
                Wake::Device(None) => self.errors = never(),
                Wake::Tick => {
                    if show_meter {
                        let bar = format_level_bar(self.handle.level_db(), self.floor_db, BAR_WIDTH);
                        print!("\r{bar}");
                        io::stdout().flush().ok();
                    }
                }
            }
        }
    }
}

enum Wake {
    Event(Option<CoreEvent>),
    /// `false` once stdin reached EOF.
    Line(bool),
    Device(Option<DeviceUnavailable>),
    Tick,
}

fn print_environment(profile: &NoiseProfile, policy: &TerminationPolicy) {
    println!(
        "Room is {} (noise floor {:.1} dBFS, variation {:.1} dB).",
        profile.classification.label(),
        profile.floor_estimate_dbfs,
        profile.variation_dbfs
    );
    match policy {
        TerminationPolicy::Automatic {
            threshold_dbfs,
            silence_timeout_ms,
        } => println!(
            "Answers end after {silence_timeout_ms} ms below {threshold_dbfs:.0} dBFS."
        ),
        TerminationPolicy::Manual => println!("Room too noisy for automatic stop: press Enter after each answer."),
    }
}
