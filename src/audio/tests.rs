use super::capture::{ControllerConfig, FrameOutcome, ResponseController, SessionState, StopReason};
use super::debounce::{ActivityDebouncer, DebounceConfig, DebounceEvent};
use super::dispatch::{append_downmixed_samples, FrameDispatcher};
use super::gate::{ActivityState, GateConfig, MicValidationGate};
use super::meter::{LevelSample, LEVEL_FLOOR_DB, SILENT_SENTINEL_DB};
use super::noise::{classify, estimate, percentile, EnvironmentClass, NoiseConfig, NoiseFloorEstimator, NoiseProfile};
use super::policy::{PolicyConfig, PolicySelector, TerminationPolicy};
use super::resample::{
    basic_resample, downsampling_tap_count, resample, resample_linear, MAX_RATE, MIN_RATE,
};
use super::AudioFrame;
use crate::events::{CoreEvent, EventBus};
use crossbeam_channel::bounded;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

const RATE: u32 = 16_000;
/// 10 ms at `RATE`.
const BLOCK: usize = 160;

fn ms(value: u64) -> Duration {
    Duration::from_millis(value)
}

fn loud_frame() -> AudioFrame {
    AudioFrame::new(vec![0.5; BLOCK], RATE)
}

fn silent_frame() -> AudioFrame {
    AudioFrame::new(vec![0.0; BLOCK], RATE)
}

fn automatic(threshold_dbfs: f32, silence_timeout_ms: u64) -> TerminationPolicy {
    TerminationPolicy::Automatic {
        threshold_dbfs,
        silence_timeout_ms,
    }
}

fn controller() -> (ResponseController, crossbeam_channel::Receiver<CoreEvent>) {
    let bus = EventBus::new();
    let rx = bus.subscribe_with_capacity(256);
    (ResponseController::new(ControllerConfig::default(), bus), rx)
}

fn profile(floor: f32, class: EnvironmentClass) -> NoiseProfile {
    NoiseProfile {
        floor_estimate_dbfs: floor,
        variation_dbfs: 1.0,
        classification: class,
        sample_count: 20,
    }
}

fn levels(values: &[f32], t0: Instant) -> Vec<LevelSample> {
    values
        .iter()
        .enumerate()
        .map(|(i, &v)| LevelSample::new(v, t0 + ms(i as u64 * 100)))
        .collect()
}

#[test]
fn downmixes_multi_channel_audio() {
    let mut buf = Vec::new();
    let samples = [1.0f32, -1.0, 0.5, 0.5];
    append_downmixed_samples(&mut buf, &samples, 2, |sample| sample);
    assert_eq!(buf, vec![0.0, 0.5]);
}

#[test]
fn downmix_keeps_trailing_partial_frame() {
    let mut buf = Vec::new();
    let samples = [0.2f32, 0.4, 0.6];
    append_downmixed_samples(&mut buf, &samples, 2, |sample| sample);
    assert_eq!(buf.len(), 2);
    assert!((buf[1] - 0.6).abs() < 1e-6);
}

#[test]
fn dispatcher_cuts_fixed_blocks_and_counts_drops() {
    let (tx, rx) = bounded(1);
    let dropped = Arc::new(AtomicUsize::new(0));
    let mut dispatcher = FrameDispatcher::new(4, RATE, tx, dropped.clone());
    dispatcher.push(&[0.1f32; 14], 1, |s| s);

    let frame = rx.try_recv().expect("first block delivered");
    assert_eq!(frame.len(), 4);
    assert_eq!(frame.sample_rate, RATE);
    assert!(rx.try_recv().is_err());
    assert_eq!(dropped.load(Ordering::Relaxed), 2);

    // The two leftover samples complete the next block.
    dispatcher.push(&[0.1f32; 2], 1, |s| s);
    assert_eq!(rx.try_recv().map(|f| f.len()), Ok(4));
}

#[test]
fn frame_duration_uses_sample_clock() {
    assert_eq!(loud_frame().duration(), ms(10));
    assert_eq!(AudioFrame::new(vec![0.0; 441], 44_100).duration(), ms(10));
    assert_eq!(AudioFrame::new(vec![0.0; 10], 0).duration(), Duration::ZERO);
}

#[test]
fn debouncer_fires_after_sustain() {
    let t0 = Instant::now();
    let mut d = ActivityDebouncer::new(DebounceConfig {
        sustain: ms(300),
        debounce: ms(200),
    });
    assert_eq!(d.observe(true, t0), None);
    assert_eq!(d.observe(true, t0 + ms(200)), None);
    assert_eq!(
        d.observe(true, t0 + ms(300)),
        Some(DebounceEvent::SustainedActive { since: t0 })
    );
    assert!(!d.is_tracking());
}

#[test]
fn debouncer_poll_confirms_inactivity() {
    let t0 = Instant::now();
    let mut d = ActivityDebouncer::new(DebounceConfig {
        sustain: ms(1000),
        debounce: ms(200),
    });
    d.observe(true, t0);
    d.observe(false, t0 + ms(100));
    assert_eq!(d.poll(t0 + ms(250)), None);
    assert_eq!(
        d.poll(t0 + ms(300)),
        Some(DebounceEvent::SustainedInactiveConfirmed)
    );
    assert!(!d.is_tracking());
}

#[test]
fn debouncer_late_activity_restarts_tracking() {
    let t0 = Instant::now();
    let mut d = ActivityDebouncer::new(DebounceConfig {
        sustain: ms(1000),
        debounce: ms(200),
    });
    d.observe(true, t0);
    d.observe(false, t0 + ms(100));
    assert_eq!(
        d.observe(true, t0 + ms(400)),
        Some(DebounceEvent::SustainedInactiveConfirmed)
    );
    assert_eq!(d.tracking_since(), Some(t0 + ms(400)));
}

#[test]
fn gate_validates_after_required_duration() {
    let t0 = Instant::now();
    let mut gate = MicValidationGate::default();
    for step in 0..15u64 {
        gate.feed(-20.0, t0 + ms(step * 100));
    }
    assert_eq!(gate.state(), ActivityState::Accumulating { started_at: t0 });
    assert!(!gate.is_validated());
    assert_eq!(gate.feed(-20.0, t0 + ms(1500)), ActivityState::Validated);
}

#[test]
fn gate_threshold_is_inclusive() {
    let t0 = Instant::now();
    let mut gate = MicValidationGate::default();
    gate.feed(-40.0, t0);
    assert!(matches!(gate.state(), ActivityState::Accumulating { .. }));

    let mut gate = MicValidationGate::default();
    gate.feed(-40.5, t0);
    assert_eq!(gate.state(), ActivityState::Idle);
}

#[test]
fn gate_tolerates_micro_pause() {
    let t0 = Instant::now();
    let mut gate = MicValidationGate::default();
    for step in 0..=6u64 {
        gate.feed(-20.0, t0 + ms(step * 100));
    }
    gate.feed(-70.0, t0 + ms(700));
    gate.feed(-70.0, t0 + ms(800));
    for step in 9..=15u64 {
        gate.feed(-20.0, t0 + ms(step * 100));
    }
    assert!(gate.is_validated());
}

#[test]
fn gate_long_pause_restarts_accumulation() {
    let t0 = Instant::now();
    let mut gate = MicValidationGate::default();
    for step in 0..=5u64 {
        gate.feed(-20.0, t0 + ms(step * 100));
    }
    for step in 6..=17u64 {
        gate.feed(-70.0, t0 + ms(step * 100));
    }
    assert_eq!(gate.state(), ActivityState::Idle);

    for step in 18..=32u64 {
        gate.feed(-20.0, t0 + ms(step * 100));
    }
    assert!(!gate.is_validated());
    assert_eq!(gate.feed(-20.0, t0 + ms(3300)), ActivityState::Validated);
}

#[test]
fn gate_validation_is_sticky_until_reset() {
    let t0 = Instant::now();
    let mut gate = MicValidationGate::default();
    for step in 0..=15u64 {
        gate.feed(-20.0, t0 + ms(step * 100));
    }
    assert!(gate.is_validated());
    for step in 16..=80u64 {
        gate.feed(SILENT_SENTINEL_DB, t0 + ms(step * 100));
    }
    assert!(gate.is_validated());

    gate.reset();
    assert_eq!(gate.state(), ActivityState::Idle);
    let t1 = t0 + ms(10_000);
    for step in 0..15u64 {
        gate.feed(-20.0, t1 + ms(step * 100));
    }
    assert!(!gate.is_validated());
    gate.feed(-20.0, t1 + ms(1500));
    assert!(gate.is_validated());
}

#[test]
fn gate_reports_remaining_time() {
    let t0 = Instant::now();
    let mut gate = MicValidationGate::new(GateConfig::default());
    assert_eq!(gate.remaining(t0), ms(1500));
    gate.feed(-20.0, t0);
    gate.feed(-20.0, t0 + ms(500));
    assert_eq!(gate.remaining(t0 + ms(500)), ms(1000));
}

#[test]
fn percentile_interpolates_between_ranks() {
    let sorted = [1.0f32, 2.0, 3.0, 4.0];
    assert!((percentile(&sorted, 0.75) - 3.25).abs() < 1e-6);
    assert!((percentile(&sorted, 0.0) - 1.0).abs() < 1e-6);
    assert!((percentile(&[7.0], 0.75) - 7.0).abs() < 1e-6);
}

#[test]
fn classification_boundaries() {
    assert_eq!(classify(-60.0, 1.0), EnvironmentClass::Quiet);
    assert_eq!(classify(-50.0, 1.0), EnvironmentClass::Moderate);
    assert_eq!(classify(-45.0, 5.0), EnvironmentClass::Moderate);
    assert_eq!(classify(-45.0, 8.5), EnvironmentClass::Noisy);
    assert_eq!(classify(-30.0, 1.0), EnvironmentClass::Noisy);
}

#[test]
fn estimate_classifies_quiet_room() {
    let values: Vec<f32> = (0..20).map(|i| if i % 2 == 0 { -60.0 } else { -61.0 }).collect();
    let profile = estimate(&levels(&values, Instant::now()), &NoiseConfig::default());
    assert_eq!(profile.classification, EnvironmentClass::Quiet);
    assert_eq!(profile.sample_count, 20);
    assert!((profile.variation_dbfs - 0.5).abs() < 1e-4);
    assert!((profile.floor_estimate_dbfs - -60.0).abs() < 1e-4);
}

#[test]
fn estimate_classifies_fluctuating_room_as_noisy() {
    let values: Vec<f32> = (0..20).map(|i| if i % 2 == 0 { -20.0 } else { -50.0 }).collect();
    let profile = estimate(&levels(&values, Instant::now()), &NoiseConfig::default());
    assert_eq!(profile.classification, EnvironmentClass::Noisy);
    assert!(profile.variation_dbfs > 8.0);
}

#[test]
fn estimate_classifies_steady_hum_as_moderate() {
    let profile = estimate(&levels(&[-45.0; 20], Instant::now()), &NoiseConfig::default());
    assert_eq!(profile.classification, EnvironmentClass::Moderate);
    assert!(profile.variation_dbfs.abs() < 1e-6);
}

#[test]
fn estimate_with_too_few_samples_fails_safe() {
    let profile = estimate(&levels(&[-60.0; 5], Instant::now()), &NoiseConfig::default());
    assert_eq!(profile.classification, EnvironmentClass::Noisy);
    assert_eq!(profile.sample_count, 5);
    assert!(profile.is_unreliable(10));
}

#[test]
fn estimate_of_digital_silence_is_degenerate() {
    let profile = estimate(
        &levels(&[SILENT_SENTINEL_DB; 20], Instant::now()),
        &NoiseConfig::default(),
    );
    assert_eq!(profile.classification, EnvironmentClass::Noisy);
    assert_eq!(profile.sample_count, 0);
    assert_eq!(profile.floor_estimate_dbfs, LEVEL_FLOOR_DB);

    let empty = estimate(&[], &NoiseConfig::default());
    assert_eq!(empty.classification, EnvironmentClass::Noisy);
}

#[test]
fn estimate_counts_sentinels_at_floor() {
    let mut values = vec![-60.0f32; 10];
    values.extend([SILENT_SENTINEL_DB; 10]);
    let profile = estimate(&levels(&values, Instant::now()), &NoiseConfig::default());
    assert_eq!(profile.sample_count, 20);
    assert!(profile.floor_estimate_dbfs.is_finite());
    assert!(profile.floor_estimate_dbfs <= -60.0);
}

#[test]
fn estimator_yields_profile_after_learning_window() {
    let t0 = Instant::now();
    let mut estimator = NoiseFloorEstimator::new(NoiseConfig::default());
    for step in 0..20u64 {
        assert!(estimator
            .push(LevelSample::new(-60.0, t0 + ms(step * 100)))
            .is_none());
    }
    let profile = estimator
        .push(LevelSample::new(-60.0, t0 + ms(2000)))
        .expect("window elapsed");
    assert_eq!(profile.sample_count, 21);
    assert_eq!(estimator.collected(), 21);
    assert_eq!(profile.classification, EnvironmentClass::Quiet);
}

#[test]
fn policy_maps_environment_classes() {
    let selector = PolicySelector::default();
    assert_eq!(
        selector.select(&profile(-60.0, EnvironmentClass::Quiet)),
        automatic(-40.0, 800)
    );
    assert_eq!(
        selector.select(&profile(-40.0, EnvironmentClass::Moderate)),
        automatic(-28.0, 1200)
    );
    assert_eq!(
        selector.select(&profile(-20.0, EnvironmentClass::Noisy)),
        TerminationPolicy::Manual
    );
}

#[test]
fn policy_threshold_never_drops_below_default() {
    let selector = PolicySelector::new(PolicyConfig {
        default_threshold_dbfs: -60.0,
        ..PolicyConfig::default()
    });
    assert_eq!(selector.adapted_threshold(-65.0, 3.0), -56.0);
    assert_eq!(selector.adapted_threshold(-70.0, 3.0), -60.0);
    assert_eq!(selector.adapted_threshold(LEVEL_FLOOR_DB, 3.0), -60.0);
    assert_eq!(selector.adapted_threshold(f32::NEG_INFINITY, 3.0), -60.0);
}

#[test]
fn policy_force_manual_overrides_quiet_room() {
    let selector = PolicySelector::new(PolicyConfig {
        force_manual: true,
        ..PolicyConfig::default()
    });
    assert!(selector
        .select(&profile(-70.0, EnvironmentClass::Quiet))
        .is_manual());
}

#[test]
fn policy_serializes_with_mode_tag() {
    let json = serde_json::to_value(automatic(-40.0, 800)).expect("serialize");
    assert_eq!(json["mode"], "automatic");
    assert_eq!(json["silence_timeout_ms"], 800);
    let manual = serde_json::to_value(TerminationPolicy::Manual).expect("serialize");
    assert_eq!(manual["mode"], "manual");
}

#[test]
fn automatic_finishes_within_one_block_of_timeout() {
    let (mut ctl, _rx) = controller();
    ctl.start(automatic(-40.0, 800), Instant::now());
    for _ in 0..50 {
        assert_eq!(ctl.on_frame(loud_frame()), FrameOutcome::Buffered);
    }
    for _ in 0..79 {
        assert_eq!(ctl.on_frame(silent_frame()), FrameOutcome::Buffered);
    }
    let FrameOutcome::Finished(recording) = ctl.on_frame(silent_frame()) else {
        panic!("expected automatic finish after 800 ms of silence");
    };
    let StopReason::SilenceTimeout { tail_ms } = recording.reason else {
        panic!("unexpected stop reason {:?}", recording.reason);
    };
    assert!((800..810).contains(&tail_ms));
    assert_eq!(recording.total_samples, 130 * BLOCK);
    assert_eq!(recording.to_samples().len(), recording.total_samples);
    assert_eq!(recording.duration_ms(), 1300);
    assert_eq!(ctl.state(), SessionState::Finished);
}

#[test]
fn active_block_resets_silence_timer() {
    let (mut ctl, _rx) = controller();
    ctl.start(automatic(-40.0, 800), Instant::now());
    for _ in 0..10 {
        ctl.on_frame(loud_frame());
    }
    for _ in 0..70 {
        ctl.on_frame(silent_frame());
    }
    assert_eq!(ctl.on_frame(loud_frame()), FrameOutcome::Buffered);
    for _ in 0..79 {
        assert_eq!(ctl.on_frame(silent_frame()), FrameOutcome::Buffered);
    }
    assert!(matches!(
        ctl.on_frame(silent_frame()),
        FrameOutcome::Finished(_)
    ));
}

#[test]
fn single_silent_block_does_not_finish() {
    let (mut ctl, _rx) = controller();
    ctl.start(automatic(-40.0, 800), Instant::now());
    assert_eq!(ctl.on_frame(silent_frame()), FrameOutcome::Buffered);
    assert!(ctl.is_capturing());
    assert_eq!(ctl.buffered_samples(), BLOCK);
}

#[test]
fn manual_policy_never_finishes_on_its_own() {
    let (mut ctl, _rx) = controller();
    ctl.start(TerminationPolicy::Manual, Instant::now());
    for i in 0..500 {
        let frame = if i % 2 == 0 { silent_frame() } else { loud_frame() };
        assert_eq!(ctl.on_frame(frame), FrameOutcome::Buffered);
    }
    let recording = ctl.stop_manual().expect("manual stop while capturing");
    assert_eq!(recording.reason, StopReason::ManualStop);
    assert_eq!(recording.total_samples, 500 * BLOCK);
    assert_eq!(recording.sample_rate, RATE);
    assert!(!recording.speech_confirmed);
}

#[test]
fn manual_stop_works_under_automatic_policy() {
    let (mut ctl, _rx) = controller();
    ctl.start(automatic(-40.0, 800), Instant::now());
    for _ in 0..3 {
        ctl.on_frame(loud_frame());
    }
    let recording = ctl.stop_manual().expect("capturing");
    assert_eq!(recording.reason, StopReason::ManualStop);
    assert_eq!(recording.total_samples, 3 * BLOCK);
}

#[test]
fn empty_capture_is_a_valid_result() {
    let (mut ctl, rx) = controller();
    ctl.start(TerminationPolicy::Manual, Instant::now());
    let recording = ctl.stop_manual().expect("capturing");
    assert!(recording.is_empty());
    assert_eq!(recording.sample_rate, ControllerConfig::default().fallback_sample_rate);

    let labels: Vec<&str> = rx.try_iter().map(|e| e.label()).collect();
    assert_eq!(labels, vec!["recording_started", "recording_finished"]);
}

#[test]
fn stop_manual_when_idle_is_ignored() {
    let (mut ctl, rx) = controller();
    assert!(ctl.stop_manual().is_none());
    assert!(rx.try_recv().is_err());
}

#[test]
fn speech_confirmed_once_per_session() {
    let (mut ctl, rx) = controller();
    ctl.start(automatic(-40.0, 800), Instant::now());
    for _ in 0..100 {
        ctl.on_frame(loud_frame());
    }
    let confirmed = rx
        .try_iter()
        .filter(|e| matches!(e, CoreEvent::SpeechConfirmed { .. }))
        .count();
    assert_eq!(confirmed, 1);
}

#[test]
fn sessions_get_fresh_ids_and_buffers() {
    let (mut ctl, _rx) = controller();
    let first = ctl.start(TerminationPolicy::Manual, Instant::now()).expect("idle");
    ctl.on_frame(loud_frame());
    let done = ctl.stop_manual().expect("capturing");
    assert_eq!(done.session_id, first.id);

    let second = ctl.start(TerminationPolicy::Manual, Instant::now()).expect("finished");
    assert_ne!(second.id, first.id);
    assert_eq!(ctl.buffered_samples(), 0);
}

#[cfg(debug_assertions)]
#[test]
#[should_panic(expected = "no response is capturing")]
fn frame_without_capture_panics_in_debug() {
    let (mut ctl, _rx) = controller();
    ctl.on_frame(loud_frame());
}

#[cfg(debug_assertions)]
#[test]
#[should_panic(expected = "still capturing")]
fn double_start_panics_in_debug() {
    let (mut ctl, _rx) = controller();
    ctl.start(TerminationPolicy::Manual, Instant::now());
    ctl.start(TerminationPolicy::Manual, Instant::now());
}

#[test]
fn resample_same_rate_is_identity() {
    let input = vec![0.1f32, 0.2, 0.3];
    assert_eq!(resample(&input, RATE, RATE), input);
    assert!(resample(&[], 48_000, RATE).is_empty());
}

#[test]
fn resample_produces_expected_length() {
    let input: Vec<f32> = (0..4800).map(|i| (i as f32 * 0.01).sin() * 0.3).collect();
    assert_eq!(resample(&input, 48_000, RATE).len(), 1600);
    assert_eq!(resample(&input, 48_000, 96_000).len(), 9600);
}

#[test]
fn basic_resample_rejects_out_of_range_rates() {
    assert!(basic_resample(&[0.0; 16], MIN_RATE - 1, RATE).is_err());
    assert!(basic_resample(&[0.0; 16], RATE, MAX_RATE + 1).is_err());
    let input = vec![0.25f32; 32];
    assert_eq!(resample(&input, 1_000, RATE), input);
}

#[test]
fn resample_linear_scales_length() {
    let input = vec![0.0f32, 1.0, 2.0, 3.0];
    let result = resample_linear(&input, 0.5);
    assert_eq!(result.len(), 2);
    assert!(result[0].abs() < 1e-6);
}

#[test]
fn downsampling_taps_are_odd_and_bounded() {
    for (from, to) in [(48_000, 16_000), (44_100, 8_000), (384_000, 2_000)] {
        let taps = downsampling_tap_count(from, to);
        assert_eq!(taps % 2, 1);
        assert!((11..=129).contains(&taps));
    }
}
