//! Microphone input via CPAL.
//!
//! Opens the device at its native rate, converts every sample format to f32,
//! downmixes to mono and ships fixed-size blocks to the pipeline thread over a
//! bounded channel. Stream failures travel on a separate channel as
//! [`DeviceUnavailable`].

use super::dispatch::FrameDispatcher;
use super::AudioFrame;
use anyhow::{Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, StreamConfig};
use crossbeam_channel::{bounded, Receiver, Sender};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Conditions under which no usable frames can be produced.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeviceUnavailable {
    #[error("no input devices available")]
    NoDevices,
    #[error("no default input device available")]
    NoDefaultDevice,
    #[error("input device '{0}' not found")]
    NotFound(String),
    #[error("unsupported sample format: {0}")]
    UnsupportedFormat(String),
    #[error("input device disconnected")]
    Disconnected,
    #[error("audio stream failed: {0}")]
    StreamFailed(String),
}

/// Audio input device wrapper.
pub struct Recorder {
    device: cpal::Device,
}

/// A running input stream. Dropping it stops capture.
pub struct LiveInput {
    _stream: cpal::Stream,
    pub frames: Receiver<AudioFrame>,
    pub errors: Receiver<DeviceUnavailable>,
    pub sample_rate: u32,
    pub channels: usize,
    dropped: Arc<AtomicUsize>,
}

impl LiveInput {
    /// Blocks discarded because the pipeline fell behind.
    pub fn dropped_frames(&self) -> usize {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl Recorder {
    pub fn list_devices() -> Result<Vec<String>> {
        let host = cpal::default_host();
        let devices = host
            .input_devices()
            .map_err(|_| DeviceUnavailable::NoDevices)?;
        let mut names = Vec::new();
        for device in devices {
            if let Ok(name) = device.name() {
                names.push(name);
            }
        }
        Ok(names)
    }

    pub fn new(preferred_device: Option<&str>) -> Result<Self> {
        let host = cpal::default_host();
        let device = match preferred_device {
            Some(name) => {
                let mut devices = host
                    .input_devices()
                    .map_err(|_| DeviceUnavailable::NoDevices)?;
                devices
                    .find(|d| d.name().map(|n| n == name).unwrap_or(false))
                    .ok_or_else(|| DeviceUnavailable::NotFound(name.to_string()))?
            }
            None => host
                .default_input_device()
                .ok_or(DeviceUnavailable::NoDefaultDevice)?,
        };
        Ok(Self { device })
    }

    pub fn device_name(&self) -> String {
        self.device
            .name()
            .unwrap_or_else(|_| "Unknown Device".to_string())
    }

    /// Start streaming `block_samples`-long mono frames at the device rate.
    pub fn open(&self, block_samples: usize, channel_capacity: usize) -> Result<LiveInput> {
        let default_config = self
            .device
            .default_input_config()
            .context("failed to query default input config")?;
        let format = default_config.sample_format();
        let device_config: StreamConfig = default_config.into();
        let sample_rate = device_config.sample_rate.0;
        let channels = usize::from(device_config.channels.max(1));

        info!(
            device = %self.device_name(),
            ?format,
            sample_rate,
            channels,
            block_samples,
            "opening input stream"
        );

        let (frame_tx, frame_rx) = bounded::<AudioFrame>(channel_capacity.max(1));
        let (error_tx, error_rx) = bounded::<DeviceUnavailable>(4);
        let dropped = Arc::new(AtomicUsize::new(0));
        let mut dispatcher =
            FrameDispatcher::new(block_samples, sample_rate, frame_tx, dropped.clone());
        let err_fn = stream_error_handler(error_tx);

        let stream = match format {
            SampleFormat::F32 => self.device.build_input_stream(
                &device_config,
                move |data: &[f32], _| dispatcher.push(data, channels, |sample| sample),
                err_fn,
                None,
            ),
            SampleFormat::I16 => self.device.build_input_stream(
                &device_config,
                move |data: &[i16], _| {
                    dispatcher.push(data, channels, |sample| sample as f32 / 32_768.0)
                },
                err_fn,
                None,
            ),
            SampleFormat::U16 => self.device.build_input_stream(
                &device_config,
                move |data: &[u16], _| {
                    dispatcher.push(data, channels, |sample| {
                        (sample as f32 - 32_768.0) / 32_768.0
                    })
                },
                err_fn,
                None,
            ),
            other => {
                return Err(DeviceUnavailable::UnsupportedFormat(format!("{other:?}")).into());
            }
        }
        .map_err(|err| DeviceUnavailable::StreamFailed(err.to_string()))?;

        stream
            .play()
            .map_err(|err| DeviceUnavailable::StreamFailed(err.to_string()))?;

        Ok(LiveInput {
            _stream: stream,
            frames: frame_rx,
            errors: error_rx,
            sample_rate,
            channels,
            dropped,
        })
    }
}

fn stream_error_handler(errors: Sender<DeviceUnavailable>) -> impl FnMut(cpal::StreamError) + Send + 'static {
    move |err| {
        let condition = match err {
            cpal::StreamError::DeviceNotAvailable => DeviceUnavailable::Disconnected,
            other => DeviceUnavailable::StreamFailed(other.to_string()),
        };
        error!(%condition, "audio stream error");
        if errors.try_send(condition).is_err() {
            warn!("device error channel full; error not forwarded");
        }
    }
}

pub fn mic_permission_hint() -> &'static str {
    #[cfg(target_os = "macos")]
    {
        "macOS: System Settings > Privacy & Security > Microphone (enable your terminal)."
    }
    #[cfg(target_os = "linux")]
    {
        "Linux: check PipeWire/PulseAudio permissions and ensure the device is not muted."
    }
    #[cfg(target_os = "windows")]
    {
        "Windows: Settings > Privacy & Security > Microphone (allow access for your terminal)."
    }
    #[cfg(not(any(target_os = "macos", target_os = "linux", target_os = "windows")))]
    {
        "Check OS microphone permissions."
    }
}
