use super::AudioFrame;
use crossbeam_channel::{Sender, TrySendError};
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

/// Downmix interleaved input to mono while converting each sample to f32.
pub(super) fn append_downmixed_samples<T, F>(
    buf: &mut Vec<f32>,
    data: &[T],
    channels: usize,
    mut convert: F,
) where
    T: Copy,
    F: FnMut(T) -> f32,
{
    if channels <= 1 {
        buf.extend(data.iter().copied().map(&mut convert));
        return;
    }

    let mut acc = 0.0f32;
    let mut count = 0usize;
    for sample in data.iter().copied() {
        acc += convert(sample);
        count += 1;
        if count == channels {
            buf.push(acc / channels as f32);
            acc = 0.0;
            count = 0;
        }
    }
    if count > 0 {
        buf.push(acc / count as f32);
    }
}

/// Cuts the callback stream into fixed-size blocks and hands them to the
/// pipeline thread without ever blocking the callback.
pub(super) struct FrameDispatcher {
    block_samples: usize,
    sample_rate: u32,
    pending: Vec<f32>,
    scratch: Vec<f32>,
    sender: Sender<AudioFrame>,
    dropped: Arc<AtomicUsize>,
}

impl FrameDispatcher {
    pub(super) fn new(
        block_samples: usize,
        sample_rate: u32,
        sender: Sender<AudioFrame>,
        dropped: Arc<AtomicUsize>,
    ) -> Self {
        Self {
            block_samples: block_samples.max(1),
            sample_rate,
            pending: Vec::with_capacity(block_samples * 2),
            scratch: Vec::new(),
            sender,
            dropped,
        }
    }

    pub(super) fn push<T, F>(&mut self, data: &[T], channels: usize, convert: F)
    where
        T: Copy,
        F: FnMut(T) -> f32,
    {
        self.scratch.clear();
        append_downmixed_samples(&mut self.scratch, data, channels, convert);
        self.pending.extend_from_slice(&self.scratch);

        while self.pending.len() >= self.block_samples {
            let samples: Vec<f32> = self.pending.drain(..self.block_samples).collect();
            let frame = AudioFrame::new(samples, self.sample_rate);
            match self.sender.try_send(frame) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                }
                Err(TrySendError::Disconnected(_)) => break,
            }
        }
    }
}
