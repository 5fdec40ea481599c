//! Response recording state machine.
//!
//! One controller drives every question of an interview, but each `start`
//! creates a fresh session so nothing leaks between answers. Capture begins
//! immediately on `start` for both policies; the policy only decides how the
//! session reaches `Finished`:
//! - `Automatic`: the frame level stayed below the threshold for the silence
//!   timeout, measured on the sample clock.
//! - `Manual`: only `stop_manual()`.
//!
//! `stop_manual()` is accepted under either policy and is the abort path for
//! device errors and forced advances.

use super::debounce::{ActivityDebouncer, DebounceConfig, DebounceEvent};
use super::meter::{level_dbfs, LEVEL_FLOOR_DB};
use super::policy::TerminationPolicy;
use super::AudioFrame;
use crate::config::PipelineConfig;
use crate::events::{CoreEvent, EventBus};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

pub type SessionId = u64;

/// Explains why a capture ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    SilenceTimeout { tail_ms: u64 },
    ManualStop,
}

impl StopReason {
    pub fn label(&self) -> &'static str {
        match self {
            StopReason::SilenceTimeout { .. } => "silence_timeout",
            StopReason::ManualStop => "manual_stop",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Capturing,
    Finished,
}

/// Handed back by `start` so the caller can correlate later events.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionTicket {
    pub id: SessionId,
    pub policy: TerminationPolicy,
    pub started_at: Instant,
}

/// The buffer of one finished response, ready for persistence.
#[derive(Debug, Clone, PartialEq)]
pub struct FinishedRecording {
    pub session_id: SessionId,
    pub policy: TerminationPolicy,
    pub frames: Vec<AudioFrame>,
    pub sample_rate: u32,
    pub total_samples: usize,
    pub reason: StopReason,
    pub speech_confirmed: bool,
}

impl FinishedRecording {
    pub fn is_empty(&self) -> bool {
        self.total_samples == 0
    }

    pub fn duration_ms(&self) -> u64 {
        if self.sample_rate == 0 {
            return 0;
        }
        (self.total_samples as u64 * 1000) / u64::from(self.sample_rate)
    }

    /// Concatenate all frames into one mono buffer.
    pub fn to_samples(&self) -> Vec<f32> {
        let mut audio = Vec::with_capacity(self.total_samples);
        for frame in &self.frames {
            audio.extend_from_slice(&frame.samples);
        }
        audio
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControllerConfig {
    /// Rate reported for a session that finished before any frame arrived.
    pub fallback_sample_rate: u32,
    pub floor_db: f32,
    /// Sustained speech needed before `SpeechConfirmed` is published.
    pub speech_confirm: Duration,
    /// Pause tolerated inside that sustained speech.
    pub speech_tolerance: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            fallback_sample_rate: 44_100,
            floor_db: LEVEL_FLOOR_DB,
            speech_confirm: Duration::from_millis(300),
            speech_tolerance: Duration::from_millis(500),
        }
    }
}

impl From<&PipelineConfig> for ControllerConfig {
    fn from(cfg: &PipelineConfig) -> Self {
        Self {
            fallback_sample_rate: cfg.fallback_sample_rate,
            floor_db: cfg.meter_floor_db,
            speech_confirm: Duration::from_millis(cfg.speech_confirm_ms),
            speech_tolerance: Duration::from_millis(cfg.speech_tolerance_ms),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FrameOutcome {
    Buffered,
    Finished(Arc<FinishedRecording>),
    /// The frame arrived while no session was capturing.
    Ignored,
}

struct RecordingSession {
    id: SessionId,
    started_at: Instant,
    policy: TerminationPolicy,
    frames: Vec<AudioFrame>,
    total_samples: usize,
    sample_rate: Option<u32>,
    media_elapsed: Duration,
    silence_started: Option<Duration>,
    speech: ActivityDebouncer,
    speech_confirmed: bool,
}

impl RecordingSession {
    fn new(id: SessionId, policy: TerminationPolicy, started_at: Instant, cfg: &ControllerConfig) -> Self {
        Self {
            id,
            started_at,
            policy,
            frames: Vec::new(),
            total_samples: 0,
            sample_rate: None,
            media_elapsed: Duration::ZERO,
            silence_started: None,
            speech: ActivityDebouncer::new(DebounceConfig {
                sustain: cfg.speech_confirm,
                debounce: cfg.speech_tolerance,
            }),
            speech_confirmed: false,
        }
    }

    /// Append the frame and advance the sample clock; returns the media time
    /// at the start and end of the frame.
    fn append(&mut self, frame: AudioFrame) -> (Duration, Duration) {
        let frame_start = self.media_elapsed;
        self.media_elapsed += frame.duration();
        self.sample_rate.get_or_insert(frame.sample_rate);
        self.total_samples = self.total_samples.saturating_add(frame.samples.len());
        self.frames.push(frame);
        (frame_start, self.media_elapsed)
    }
}

pub struct ResponseController {
    cfg: ControllerConfig,
    bus: EventBus,
    session: Option<RecordingSession>,
    state: SessionState,
    next_id: SessionId,
}

impl ResponseController {
    pub fn new(cfg: ControllerConfig, bus: EventBus) -> Self {
        Self {
            cfg,
            bus,
            session: None,
            state: SessionState::Idle,
            next_id: 1,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_capturing(&self) -> bool {
        self.state == SessionState::Capturing
    }

    /// Frames buffered in the current session so far.
    pub fn buffered_samples(&self) -> usize {
        self.session.as_ref().map_or(0, |s| s.total_samples)
    }

    /// Begin capturing a new response right away.
    ///
    /// Starting while a session is still capturing is a caller bug: it panics
    /// in debug builds and is ignored in release builds.
    pub fn start(&mut self, policy: TerminationPolicy, now: Instant) -> Option<SessionTicket> {
        if self.is_capturing() {
            precondition_violation("start called while a response is still capturing");
            return None;
        }
        let id = self.next_id;
        self.next_id += 1;
        self.session = Some(RecordingSession::new(id, policy, now, &self.cfg));
        self.state = SessionState::Capturing;
        info!(session = id, policy = policy.label(), "response capture started");
        self.bus.publish(CoreEvent::RecordingStarted {
            session: id,
            policy,
        });
        Some(SessionTicket {
            id,
            policy,
            started_at: now,
        })
    }

    /// Buffer one frame; under the automatic policy this may finish the session.
    pub fn on_frame(&mut self, frame: AudioFrame) -> FrameOutcome {
        let floor_db = self.cfg.floor_db;
        let session = match self.session.as_mut() {
            Some(session) if self.state == SessionState::Capturing => session,
            _ => {
                precondition_violation("on_frame called while no response is capturing");
                return FrameOutcome::Ignored;
            }
        };

        let TerminationPolicy::Automatic {
            threshold_dbfs,
            silence_timeout_ms,
        } = session.policy
        else {
            session.append(frame);
            return FrameOutcome::Buffered;
        };

        let level = level_dbfs(&frame.samples, floor_db);
        let (frame_start, frame_end) = session.append(frame);
        let active = level >= threshold_dbfs;

        let speech_now = session.started_at + frame_end;
        if let Some(DebounceEvent::SustainedActive { .. }) = session.speech.observe(active, speech_now) {
            if !session.speech_confirmed {
                session.speech_confirmed = true;
                debug!(session = session.id, "speech confirmed");
                self.bus.publish(CoreEvent::SpeechConfirmed {
                    session: session.id,
                });
            }
        }

        if active {
            session.silence_started = None;
            return FrameOutcome::Buffered;
        }
        let silence_started = *session.silence_started.get_or_insert(frame_start);
        let tail = frame_end.saturating_sub(silence_started);
        if tail >= Duration::from_millis(silence_timeout_ms) {
            let tail_ms = tail.as_millis() as u64;
            return match self.finish(StopReason::SilenceTimeout { tail_ms }) {
                Some(recording) => FrameOutcome::Finished(recording),
                None => FrameOutcome::Ignored,
            };
        }
        FrameOutcome::Buffered
    }

    /// Finish the current session with whatever has been buffered.
    ///
    /// Returns `None` when nothing is capturing, which is expected when a
    /// manual stop races an automatic finish.
    pub fn stop_manual(&mut self) -> Option<Arc<FinishedRecording>> {
        if !self.is_capturing() {
            debug!("manual stop with no active capture");
            return None;
        }
        self.finish(StopReason::ManualStop)
    }

    fn finish(&mut self, reason: StopReason) -> Option<Arc<FinishedRecording>> {
        let session = self.session.take()?;
        self.state = SessionState::Finished;
        let recording = Arc::new(FinishedRecording {
            session_id: session.id,
            policy: session.policy,
            sample_rate: session.sample_rate.unwrap_or(self.cfg.fallback_sample_rate),
            total_samples: session.total_samples,
            frames: session.frames,
            reason,
            speech_confirmed: session.speech_confirmed,
        });
        info!(
            session = recording.session_id,
            reason = reason.label(),
            samples = recording.total_samples,
            duration_ms = recording.duration_ms(),
            "response capture finished"
        );
        self.bus
            .publish(CoreEvent::RecordingFinished(Arc::clone(&recording)));
        Some(recording)
    }
}

fn precondition_violation(msg: &'static str) {
    if cfg!(debug_assertions) {
        panic!("{msg}");
    }
    error!(msg, "response controller precondition violated; call ignored");
}
