//! Per-chunk filter chain and chunk stitching.
//!
//! Chain order is fixed: high-pass, low-pass, then noise gate, so the gate
//! only sees energy that survived filtering. Nothing here is stochastic.

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TtsError};

/// Noise gate smoothing window, in samples.
const GATE_KERNEL: usize = 101;
/// Thresholds at or below this disable the gate.
const GATE_DISABLED_DB: f32 = -100.0;
/// Peak level used by [`normalize_peak`] in the pipeline.
pub const NORMALIZE_TARGET_DB: f32 = -3.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    pub highpass_hz: f32,
    pub lowpass_hz: f32,
    pub noise_gate_db: f32,
    pub normalize: bool,
    pub silence_ms: u32,
    pub fade_ms: u32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            highpass_hz: 80.0,
            lowpass_hz: 10_000.0,
            noise_gate_db: -45.0,
            normalize: true,
            silence_ms: 150,
            fade_ms: 30,
        }
    }
}

/// Post-processing pipeline bound to one configuration.
#[derive(Debug, Clone, Default)]
pub struct AudioProcessor {
    config: AudioConfig,
}

impl AudioProcessor {
    pub fn new(config: AudioConfig) -> Self {
        Self { config }
    }

    /// Run the filter chain over one chunk of raw engine output.
    pub fn process(&self, raw: &[f32], sample_rate: u32) -> Result<Vec<f32>> {
        process(
            raw,
            sample_rate,
            self.config.highpass_hz,
            self.config.lowpass_hz,
            self.config.noise_gate_db,
        )
    }

    /// Stitch processed chunks and apply the final peak normalization.
    pub fn assemble(&self, chunks: &[Vec<f32>], sample_rate: u32) -> Vec<f32> {
        let mut out = stitch(chunks, sample_rate, self.config.silence_ms, self.config.fade_ms);
        if self.config.normalize {
            normalize_peak(&mut out, NORMALIZE_TARGET_DB);
        }
        out
    }
}

/// High-pass, low-pass, then noise gate.
pub fn process(
    raw: &[f32],
    sample_rate: u32,
    highpass_hz: f32,
    lowpass_hz: f32,
    gate_threshold_db: f32,
) -> Result<Vec<f32>> {
    if raw.is_empty() {
        return Err(TtsError::Filter("engine returned no samples".to_string()));
    }
    if sample_rate == 0 {
        return Err(TtsError::Filter("sample rate must be positive".to_string()));
    }
    if let Some(pos) = raw.iter().position(|s| !s.is_finite()) {
        return Err(TtsError::Filter(format!(
            "non-finite sample at index {pos}"
        )));
    }

    let mut samples = raw.to_vec();
    highpass(&mut samples, sample_rate, highpass_hz)?;
    lowpass(&mut samples, sample_rate, lowpass_hz)?;
    noise_gate(&mut samples, gate_threshold_db);
    Ok(samples)
}

/// Remove content below `cutoff_hz`. A non-positive cutoff is a no-op.
pub fn highpass(samples: &mut [f32], sample_rate: u32, cutoff_hz: f32) -> Result<()> {
    if cutoff_hz <= 0.0 {
        return Ok(());
    }
    let nyquist = sample_rate as f32 / 2.0;
    if cutoff_hz >= nyquist {
        return Err(TtsError::Filter(format!(
            "high-pass cutoff {cutoff_hz} Hz is not below Nyquist ({nyquist} Hz)"
        )));
    }
    Biquad::highpass(sample_rate, cutoff_hz).run(samples);
    Ok(())
}

/// Remove content above `cutoff_hz`. A cutoff at or above Nyquist has nothing
/// to remove and is a no-op.
pub fn lowpass(samples: &mut [f32], sample_rate: u32, cutoff_hz: f32) -> Result<()> {
    if cutoff_hz <= 0.0 {
        return Err(TtsError::Filter(format!(
            "low-pass cutoff must be positive, got {cutoff_hz}"
        )));
    }
    if cutoff_hz >= sample_rate as f32 / 2.0 {
        return Ok(());
    }
    Biquad::lowpass(sample_rate, cutoff_hz).run(samples);
    Ok(())
}

/// Zero out segments quieter than `threshold_db`.
///
/// The open/closed mask is smoothed with a centered moving average so the
/// gate ramps instead of clicking.
pub fn noise_gate(samples: &mut [f32], threshold_db: f32) {
    if threshold_db <= GATE_DISABLED_DB || samples.is_empty() {
        return;
    }
    let threshold = db_to_linear(threshold_db);
    let mask: Vec<f32> = samples
        .iter()
        .map(|s| if s.abs() > threshold { 1.0 } else { 0.0 })
        .collect();

    let gains = if samples.len() > GATE_KERNEL {
        smooth(&mask, GATE_KERNEL)
    } else {
        mask
    };

    for (s, g) in samples.iter_mut().zip(gains) {
        *s *= g;
    }
}

/// Centered moving average; positions outside the buffer count as zero.
fn smooth(mask: &[f32], kernel: usize) -> Vec<f32> {
    let half = kernel / 2;
    let mut prefix = Vec::with_capacity(mask.len() + 1);
    prefix.push(0.0f64);
    for &m in mask {
        let last = prefix[prefix.len() - 1];
        prefix.push(last + m as f64);
    }

    (0..mask.len())
        .map(|i| {
            let lo = i.saturating_sub(half);
            let hi = (i + half + 1).min(mask.len());
            let avg = (prefix[hi] - prefix[lo]) / kernel as f64;
            avg.clamp(0.0, 1.0) as f32
        })
        .collect()
}

/// Concatenate chunks in order with `silence_ms` of digital silence between
/// neighbours. No silence is added before the first or after the last chunk.
///
/// With a non-zero `fade_ms`, every chunk fades out at its end and every chunk
/// after the first fades in at its start. Fades never change the length.
pub fn stitch(chunks: &[Vec<f32>], sample_rate: u32, silence_ms: u32, fade_ms: u32) -> Vec<f32> {
    let gap = ms_to_samples(sample_rate, silence_ms);
    let fade = ms_to_samples(sample_rate, fade_ms);
    let total: usize =
        chunks.iter().map(Vec::len).sum::<usize>() + gap * chunks.len().saturating_sub(1);

    let mut out = Vec::with_capacity(total);
    for (i, chunk) in chunks.iter().enumerate() {
        if i > 0 {
            out.resize(out.len() + gap, 0.0);
        }
        let start = out.len();
        out.extend_from_slice(chunk);
        if chunks.len() > 1 && fade > 0 && chunk.len() > fade {
            apply_fades(&mut out[start..], fade, i > 0);
        }
    }
    out
}

fn apply_fades(segment: &mut [f32], fade: usize, fade_in: bool) {
    let len = segment.len();
    let step = if fade > 1 { 1.0 / (fade - 1) as f32 } else { 1.0 };
    for k in 0..fade {
        // Linear ramp from 1.0 down to 0.0 over the last `fade` samples.
        segment[len - fade + k] *= 1.0 - k as f32 * step;
    }
    if fade_in {
        for k in 0..fade {
            segment[k] *= k as f32 * step;
        }
    }
}

/// Scale so the absolute peak sits at `target_db`. Silence is left alone.
pub fn normalize_peak(samples: &mut [f32], target_db: f32) {
    let peak = samples.iter().fold(0.0f32, |acc, s| acc.max(s.abs()));
    if peak > 0.0 {
        let gain = db_to_linear(target_db) / peak;
        for s in samples.iter_mut() {
            *s *= gain;
        }
    }
}

pub fn ms_to_samples(sample_rate: u32, ms: u32) -> usize {
    (sample_rate as u64 * ms as u64 / 1000) as usize
}

pub fn duration_ms(sample_count: usize, sample_rate: u32) -> u64 {
    if sample_rate == 0 {
        return 0;
    }
    sample_count as u64 * 1000 / sample_rate as u64
}

fn db_to_linear(db: f32) -> f32 {
    10f32.powf(db / 20.0)
}

/// Second-order section using the RBJ cookbook coefficients.
struct Biquad {
    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,
}

impl Biquad {
    const Q: f64 = std::f64::consts::FRAC_1_SQRT_2;

    fn lowpass(sample_rate: u32, cutoff_hz: f32) -> Self {
        let (cos_w0, alpha) = Self::prewarp(sample_rate, cutoff_hz);
        let b1 = 1.0 - cos_w0;
        Self::normalized(b1 / 2.0, b1, b1 / 2.0, cos_w0, alpha)
    }

    fn highpass(sample_rate: u32, cutoff_hz: f32) -> Self {
        let (cos_w0, alpha) = Self::prewarp(sample_rate, cutoff_hz);
        let b0 = (1.0 + cos_w0) / 2.0;
        Self::normalized(b0, -(1.0 + cos_w0), b0, cos_w0, alpha)
    }

    fn prewarp(sample_rate: u32, cutoff_hz: f32) -> (f64, f64) {
        let w0 = 2.0 * PI * cutoff_hz as f64 / sample_rate as f64;
        (w0.cos(), w0.sin() / (2.0 * Self::Q))
    }

    fn normalized(b0: f64, b1: f64, b2: f64, cos_w0: f64, alpha: f64) -> Self {
        let a0 = 1.0 + alpha;
        Self {
            b0: b0 / a0,
            b1: b1 / a0,
            b2: b2 / a0,
            a1: -2.0 * cos_w0 / a0,
            a2: (1.0 - alpha) / a0,
        }
    }

    /// Direct form I, output clamped to [-1, 1].
    fn run(&self, samples: &mut [f32]) {
        let (mut x1, mut x2, mut y1, mut y2) = (0.0f64, 0.0f64, 0.0f64, 0.0f64);
        for s in samples.iter_mut() {
            let x0 = *s as f64;
            let y0 = self.b0 * x0 + self.b1 * x1 + self.b2 * x2 - self.a1 * y1 - self.a2 * y2;
            x2 = x1;
            x1 = x0;
            y2 = y1;
            y1 = y0;
            *s = y0.clamp(-1.0, 1.0) as f32;
        }
    }
}
