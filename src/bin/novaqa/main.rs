//! Interview runner entrypoint.
//!
//! # Architecture
//!
//! - Audio callback: downmixes and cuts fixed-size blocks
//! - Pipeline worker: gate, noise learning and response capture
//! - Input thread: forwards stdin lines (Enter ends an answer)
//! - Main thread: question loop and WAV persistence

mod cli_utils;
mod input;
mod interview;
mod level_bar;

use anyhow::Result;
use crossbeam_channel::bounded;
use novaqa::audio::{mic_permission_hint, Recorder};
use novaqa::config::AppConfig;
use novaqa::events::EventBus;
use novaqa::pipeline::spawn_pipeline;
use novaqa::store::ResponseStore;
use novaqa::telemetry::{init_tracing, tracing_log_path};
use tracing::info;

use crate::cli_utils::list_input_devices;
use crate::input::spawn_input_thread;
use crate::interview::Interview;

/// Max pending stdin lines before backpressure.
const INPUT_CHANNEL_CAPACITY: usize = 8;

fn main() -> Result<()> {
    let config = AppConfig::parse_args()?;
    init_tracing(&config);
    if config.logging_enabled() {
        eprintln!("Trace log: {}", tracing_log_path().display());
    }

    if config.list_input_devices {
        return list_input_devices();
    }

    let total = config.questions;
    let store = ResponseStore::open(&config.responses_dir, config.response_sample_rate)?;
    let first = store.resume_index(total);
    if first >= total {
        println!("Interview already complete: all {total} answers are in {}.", store.dir().display());
        return Ok(());
    }
    if first > 0 {
        println!("Resuming at question {} ({first} already answered).", first + 1);
    }

    let pipeline_cfg = config.pipeline_config();
    let recorder = Recorder::new(config.input_device.as_deref()).inspect_err(|_| {
        eprintln!("{}", mic_permission_hint());
    })?;
    println!("Using input device: {}", recorder.device_name());
    let live = recorder
        .open(pipeline_cfg.block_size, pipeline_cfg.channel_capacity)
        .inspect_err(|_| eprintln!("{}", mic_permission_hint()))?;

    let bus = EventBus::new();
    let events = bus.subscribe();
    let handle = spawn_pipeline(live.frames.clone(), &pipeline_cfg, bus)?;

    let (line_tx, line_rx) = bounded(INPUT_CHANNEL_CAPACITY);
    let _input = spawn_input_thread(line_tx);

    let result = Interview {
        handle: &handle,
        store: &store,
        events,
        lines: line_rx,
        errors: live.errors.clone(),
        floor_db: pipeline_cfg.meter_floor_db,
        validation_threshold_db: pipeline_cfg.validation_threshold_db,
        validation_ms: pipeline_cfg.validation_ms,
    }
    .run(first, total);

    let dropped = live.dropped_frames();
    drop(live);
    handle.join();
    info!(dropped_frames = dropped, ok = result.is_ok(), "interview ended");
    result
}
