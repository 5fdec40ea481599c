//! Typed notifications from the audio side to any number of listeners.
//!
//! Publishing never blocks: each subscriber owns a bounded channel and a full
//! channel drops the event for that subscriber only (counted, then logged).

use crate::audio::{FinishedRecording, NoiseProfile, SessionId, TerminationPolicy};
use crate::lock_or_recover;
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tracing::warn;

#[derive(Debug, Clone)]
pub enum CoreEvent {
    /// The microphone gate latched.
    Validated,
    /// A noise learning window completed and the session policy was chosen.
    EnvironmentCalibrated {
        profile: NoiseProfile,
        policy: TerminationPolicy,
    },
    RecordingStarted {
        session: SessionId,
        policy: TerminationPolicy,
    },
    /// Sustained speech observed during an automatic-policy capture.
    SpeechConfirmed { session: SessionId },
    RecordingFinished(Arc<FinishedRecording>),
    /// A command could not be honored in the current pipeline state.
    Rejected { reason: &'static str },
}

impl CoreEvent {
    pub fn label(&self) -> &'static str {
        match self {
            CoreEvent::Validated => "validated",
            CoreEvent::EnvironmentCalibrated { .. } => "environment_calibrated",
            CoreEvent::RecordingStarted { .. } => "recording_started",
            CoreEvent::SpeechConfirmed { .. } => "speech_confirmed",
            CoreEvent::RecordingFinished(_) => "recording_finished",
            CoreEvent::Rejected { .. } => "rejected",
        }
    }
}

const DEFAULT_SUBSCRIBER_CAPACITY: usize = 64;

#[derive(Clone, Default)]
pub struct EventBus {
    subscribers: Arc<Mutex<Vec<Sender<CoreEvent>>>>,
    dropped: Arc<AtomicUsize>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.subscribe_with_capacity(DEFAULT_SUBSCRIBER_CAPACITY)
    }

    pub fn subscribe_with_capacity(&self, capacity: usize) -> Receiver<CoreEvent> {
        let (tx, rx) = bounded(capacity.max(1));
        lock_or_recover(&self.subscribers, "event bus subscribe").push(tx);
        rx
    }

    /// Deliver to every live subscriber; disconnected ones are pruned.
    pub fn publish(&self, event: CoreEvent) {
        let mut subscribers = lock_or_recover(&self.subscribers, "event bus publish");
        subscribers.retain(|tx| match tx.try_send(event.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                let total = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(event = event.label(), total, "event subscriber full; event dropped");
                true
            }
            Err(TrySendError::Disconnected(_)) => false,
        });
    }

    pub fn subscriber_count(&self) -> usize {
        lock_or_recover(&self.subscribers, "event bus count").len()
    }

    pub fn dropped(&self) -> usize {
        self.dropped.load(Ordering::Relaxed)
    }
}
