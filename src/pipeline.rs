//! Pipeline worker that owns every piece of per-block audio state.
//!
//! The device callback only cuts blocks; this thread measures each block once
//! and routes the level to the validation gate, the noise estimator and the
//! response controller. The control thread talks to it through a
//! [`PipelineHandle`]: commands over a bounded channel, manual stop over an
//! atomic flag, results back over the [`EventBus`].

use crate::audio::{
    level_dbfs, ActivityState, AudioFrame, ControllerConfig, GateConfig, LevelSample, LiveMeter,
    MicValidationGate, NoiseConfig, NoiseFloorEstimator, NoiseProfile, PolicyConfig,
    PolicySelector, ResponseController, TerminationPolicy,
};
use crate::config::PipelineConfig;
use crate::events::{CoreEvent, EventBus};
use anyhow::{anyhow, Context, Result};
use crossbeam_channel::{bounded, Receiver, Sender, TryRecvError, TrySendError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;
use tracing::{debug, info, warn};

const COMMAND_CAPACITY: usize = 16;

/// Requests applied at the start of the next block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineCommand {
    StartRecording,
    /// The input device changed: validation, calibration and any running
    /// capture are discarded.
    ResetDevice,
    Calibrate,
}

impl PipelineCommand {
    fn label(self) -> &'static str {
        match self {
            PipelineCommand::StartRecording => "start_recording",
            PipelineCommand::ResetDevice => "reset_device",
            PipelineCommand::Calibrate => "calibrate",
        }
    }
}

pub struct FramePipeline {
    floor_db: f32,
    noise_cfg: NoiseConfig,
    bus: EventBus,
    meter: LiveMeter,
    gate: MicValidationGate,
    estimator: Option<NoiseFloorEstimator>,
    selector: PolicySelector,
    profile: Option<NoiseProfile>,
    policy: Option<TerminationPolicy>,
    controller: ResponseController,
    commands: Receiver<PipelineCommand>,
    stop_requested: Arc<AtomicBool>,
}

/// Control-thread side of a pipeline.
pub struct PipelineHandle {
    commands: Sender<PipelineCommand>,
    stop_requested: Arc<AtomicBool>,
    bus: EventBus,
    meter: LiveMeter,
    worker: Option<thread::JoinHandle<()>>,
}

/// Build a pipeline and its handle without spawning a thread.
pub fn pipeline_pair(cfg: &PipelineConfig, bus: EventBus) -> (FramePipeline, PipelineHandle) {
    let (cmd_tx, cmd_rx) = bounded(COMMAND_CAPACITY);
    let stop_requested = Arc::new(AtomicBool::new(false));
    let meter = LiveMeter::new();
    let pipeline = FramePipeline {
        floor_db: cfg.meter_floor_db,
        noise_cfg: NoiseConfig::from(cfg),
        bus: bus.clone(),
        meter: meter.clone(),
        gate: MicValidationGate::new(GateConfig::from(cfg)),
        estimator: None,
        selector: PolicySelector::new(PolicyConfig::from(cfg)),
        profile: None,
        policy: None,
        controller: ResponseController::new(ControllerConfig::from(cfg), bus.clone()),
        commands: cmd_rx,
        stop_requested: stop_requested.clone(),
    };
    let handle = PipelineHandle {
        commands: cmd_tx,
        stop_requested,
        bus,
        meter,
        worker: None,
    };
    (pipeline, handle)
}

/// Spawn the worker. It runs until the frame source disconnects or the
/// handle is dropped.
pub fn spawn_pipeline(
    frames: Receiver<AudioFrame>,
    cfg: &PipelineConfig,
    bus: EventBus,
) -> Result<PipelineHandle> {
    let (mut pipeline, mut handle) = pipeline_pair(cfg, bus);
    let worker = thread::Builder::new()
        .name("novaqa-pipeline".to_string())
        .spawn(move || {
            info!("pipeline worker started");
            while let Ok(frame) = frames.recv() {
                if !pipeline.process(frame, Instant::now()) {
                    break;
                }
            }
            info!("pipeline worker stopped");
        })
        .context("failed to spawn pipeline worker")?;
    handle.worker = Some(worker);
    Ok(handle)
}

impl FramePipeline {
    pub fn is_validated(&self) -> bool {
        self.gate.is_validated()
    }

    pub fn gate_state(&self) -> ActivityState {
        self.gate.state()
    }

    pub fn policy(&self) -> Option<TerminationPolicy> {
        self.policy
    }

    pub fn profile(&self) -> Option<NoiseProfile> {
        self.profile
    }

    pub fn is_calibrating(&self) -> bool {
        self.estimator.is_some()
    }

    pub fn is_capturing(&self) -> bool {
        self.controller.is_capturing()
    }

    /// Handle one block. Returns `false` once the control side is gone.
    pub fn process(&mut self, frame: AudioFrame, now: Instant) -> bool {
        if !self.drain_commands(now) {
            return false;
        }

        let level = level_dbfs(&frame.samples, self.floor_db);
        self.meter.set_db(level);

        if !self.gate.is_validated()
            && self.gate.feed(level, now) == ActivityState::Validated
        {
            self.bus.publish(CoreEvent::Validated);
        }

        if let Some(estimator) = self.estimator.as_mut() {
            if let Some(profile) = estimator.push(LevelSample::new(level, now)) {
                self.estimator = None;
                let policy = self.selector.select(&profile);
                info!(
                    class = profile.classification.label(),
                    policy = policy.label(),
                    "environment calibrated"
                );
                self.profile = Some(profile);
                self.policy = Some(policy);
                self.bus
                    .publish(CoreEvent::EnvironmentCalibrated { profile, policy });
            }
        }

        if self.stop_requested.swap(false, Ordering::AcqRel) {
            self.controller.stop_manual();
        }
        if self.controller.is_capturing() {
            self.controller.on_frame(frame);
        }
        true
    }

    fn drain_commands(&mut self, now: Instant) -> bool {
        loop {
            match self.commands.try_recv() {
                Ok(command) => self.apply(command, now),
                Err(TryRecvError::Empty) => return true,
                Err(TryRecvError::Disconnected) => return false,
            }
        }
    }

    fn apply(&mut self, command: PipelineCommand, now: Instant) {
        debug!(command = command.label(), "pipeline command");
        match command {
            PipelineCommand::StartRecording => {
                let reason = if !self.gate.is_validated() {
                    Some("microphone not validated")
                } else if self.controller.is_capturing() {
                    Some("a response is already being recorded")
                } else {
                    None
                };
                if let Some(reason) = reason {
                    self.reject(reason);
                    return;
                }
                let Some(policy) = self.policy else {
                    self.reject("environment not calibrated");
                    return;
                };
                self.stop_requested.store(false, Ordering::Release);
                self.controller.start(policy, now);
            }
            PipelineCommand::Calibrate => {
                self.estimator = Some(NoiseFloorEstimator::new(self.noise_cfg));
            }
            PipelineCommand::ResetDevice => {
                self.controller.stop_manual();
                self.gate.reset();
                self.estimator = None;
                self.profile = None;
                self.policy = None;
            }
        }
    }

    fn reject(&self, reason: &'static str) {
        warn!(reason, "pipeline command rejected");
        self.bus.publish(CoreEvent::Rejected { reason });
    }
}

impl PipelineHandle {
    pub fn start_recording(&self) -> Result<()> {
        self.send(PipelineCommand::StartRecording)
    }

    pub fn reset_device(&self) -> Result<()> {
        self.send(PipelineCommand::ResetDevice)
    }

    pub fn calibrate(&self) -> Result<()> {
        self.send(PipelineCommand::Calibrate)
    }

    /// Observed at the next block; a no-op when nothing is capturing.
    pub fn stop_manual(&self) {
        self.stop_requested.store(true, Ordering::Release);
    }

    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.bus.subscribe()
    }

    pub fn level_db(&self) -> f32 {
        self.meter.level_db()
    }

    /// Wait for the worker to exit. The frame source must be closed first.
    pub fn join(mut self) {
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("pipeline worker panicked");
            }
        }
    }

    fn send(&self, command: PipelineCommand) -> Result<()> {
        self.commands.try_send(command).map_err(|err| match err {
            TrySendError::Full(_) => anyhow!("pipeline command queue full ({})", command.label()),
            TrySendError::Disconnected(_) => anyhow!("pipeline worker has stopped"),
        })
    }
}
