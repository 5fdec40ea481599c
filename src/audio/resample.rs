//! Rate conversion for persisted responses.
//!
//! Capture always runs at the device rate; conversion only happens off the
//! audio thread when a fixed output rate was requested.

use anyhow::{anyhow, Result};
#[cfg(feature = "high-quality-audio")]
use rubato::{InterpolationParameters, InterpolationType, Resampler, SincFixedIn, WindowFunction};
use std::cmp::Ordering as CmpOrdering;
use std::f32::consts::PI;
use tracing::warn;

pub(super) const MIN_RATE: u32 = 2_000;
pub(super) const MAX_RATE: u32 = 384_000;
const MAX_DOWNSAMPLING_TAPS: usize = 129;

/// Convert `input` from `from_rate` to `to_rate`. Falls back to the FIR +
/// linear path if the sinc resampler is unavailable or fails.
pub fn resample(input: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if input.is_empty() || from_rate == to_rate || from_rate == 0 || to_rate == 0 {
        return input.to_vec();
    }

    #[cfg(feature = "high-quality-audio")]
    {
        match resample_with_rubato(input, from_rate, to_rate) {
            Ok(output) => return output,
            Err(err) => {
                warn!(%err, from_rate, to_rate, "sinc resampler failed; using linear path");
            }
        }
    }

    basic_resample(input, from_rate, to_rate).unwrap_or_else(|err| {
        warn!(%err, from_rate, to_rate, "resampling skipped");
        input.to_vec()
    })
}

fn check_rates(from_rate: u32, to_rate: u32) -> Result<()> {
    for rate in [from_rate, to_rate] {
        if !(MIN_RATE..=MAX_RATE).contains(&rate) {
            return Err(anyhow!("unsupported sample rate {rate}Hz for resampling"));
        }
    }
    Ok(())
}

fn expected_len(input_len: usize, from_rate: u32, to_rate: u32) -> usize {
    ((input_len as f64) * f64::from(to_rate) / f64::from(from_rate)).round() as usize
}

#[cfg(feature = "high-quality-audio")]
pub(super) fn resample_with_rubato(input: &[f32], from_rate: u32, to_rate: u32) -> Result<Vec<f32>> {
    check_rates(from_rate, to_rate)?;
    let ratio = f64::from(to_rate) / f64::from(from_rate);

    let chunk = 1024usize;
    let params = InterpolationParameters {
        sinc_len: 128,
        f_cutoff: 0.92,
        interpolation: InterpolationType::Cubic,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };
    let mut rs = SincFixedIn::<f32>::new(ratio, 1.0, params, chunk, 1)
        .map_err(|e| anyhow!("failed to construct sinc resampler: {e:?}"))?;

    let expect = expected_len(input.len(), from_rate, to_rate).max(1);
    let mut out = Vec::with_capacity(expect + chunk);
    let mut seg = vec![0.0f32; chunk];
    for block in input.chunks(chunk) {
        seg.fill(0.0);
        seg[..block.len()].copy_from_slice(block);
        let produced = rs
            .process(std::slice::from_ref(&seg), None)
            .map_err(|e| anyhow!("resampler process failed: {e:?}"))?;
        out.extend_from_slice(&produced[0]);
    }
    Ok(fit_length(out, expect))
}

pub(super) fn basic_resample(input: &[f32], from_rate: u32, to_rate: u32) -> Result<Vec<f32>> {
    check_rates(from_rate, to_rate)?;
    let filtered = if from_rate > to_rate {
        let taps = downsampling_tap_count(from_rate, to_rate);
        low_pass_fir(input, from_rate, to_rate, taps)
    } else {
        input.to_vec()
    };
    let ratio = f64::from(to_rate) / f64::from(from_rate);
    let out = resample_linear(&filtered, ratio);
    Ok(fit_length(out, expected_len(input.len(), from_rate, to_rate)))
}

pub(super) fn resample_linear(input: &[f32], ratio: f64) -> Vec<f32> {
    let output_len = (input.len() as f64 * ratio).round() as usize;
    let mut output = Vec::with_capacity(output_len);
    for i in 0..output_len {
        let src = i as f64 / ratio;
        let idx = src.floor() as usize;
        let frac = (src - idx as f64) as f32;
        match (input.get(idx), input.get(idx + 1)) {
            (Some(&a), Some(&b)) => output.push(a * (1.0 - frac) + b * frac),
            _ => output.push(input.last().copied().unwrap_or(0.0)),
        }
    }
    output
}

/// Longer filters for steeper decimation, always odd so the filter is centered.
pub(super) fn downsampling_tap_count(from_rate: u32, to_rate: u32) -> usize {
    let ratio = from_rate as f32 / to_rate.max(1) as f32;
    let mut taps = (ratio * 4.0).ceil().max(11.0) as usize;
    if taps % 2 == 0 {
        taps += 1;
    }
    taps.min(MAX_DOWNSAMPLING_TAPS)
}

/// Windowed-sinc low-pass below the target Nyquist, applied before decimating.
pub(super) fn low_pass_fir(input: &[f32], from_rate: u32, to_rate: u32, taps: usize) -> Vec<f32> {
    if input.is_empty() || taps <= 1 {
        return input.to_vec();
    }
    let cutoff = (to_rate as f32 * 0.5 / from_rate as f32).min(0.499);
    let coeffs = design_low_pass(cutoff, taps);
    let half = taps / 2;
    (0..input.len())
        .map(|n| {
            coeffs
                .iter()
                .enumerate()
                .filter_map(|(k, c)| {
                    (n + k)
                        .checked_sub(half)
                        .and_then(|idx| input.get(idx))
                        .map(|s| s * c)
                })
                .sum()
        })
        .collect()
}

fn design_low_pass(normalized_cutoff: f32, taps: usize) -> Vec<f32> {
    let m = (taps - 1) as f32;
    let mut coeffs: Vec<f32> = (0..taps)
        .map(|n| {
            let centered = n as f32 - m / 2.0;
            let x = 2.0 * PI * normalized_cutoff * centered;
            let sinc = if centered == 0.0 {
                2.0 * normalized_cutoff
            } else {
                (2.0 * normalized_cutoff * x.sin()) / x
            };
            let hamming = 0.54 - 0.46 * ((2.0 * PI * n as f32) / m).cos();
            sinc * hamming
        })
        .collect();
    let sum: f32 = coeffs.iter().sum();
    if sum != 0.0 {
        coeffs.iter_mut().for_each(|c| *c /= sum);
    }
    coeffs
}

fn fit_length(mut data: Vec<f32>, desired: usize) -> Vec<f32> {
    match data.len().cmp(&desired) {
        CmpOrdering::Greater => data.truncate(desired),
        CmpOrdering::Less => {
            let pad = data.last().copied().unwrap_or(0.0);
            data.resize(desired, pad);
        }
        CmpOrdering::Equal => {}
    }
    data
}
