//! Output quality enforcement.
//!
//! Every buffer an engine produces goes through [`postprocess`] before it
//! reaches a caller:
//!
//! 1. resample to [`OUTPUT_SAMPLE_RATE`],
//! 2. scale loud buffers down so the peak sits at [`TARGET_PEAK_DBFS`],
//! 3. trim trailing near-silence to at most [`MAX_TRAILING_SILENCE_MS`],
//! 4. reject non-finite samples and empty results.
//!
//! The measured peak and trailing silence are returned with the samples.

use crate::error::{Result, TtsError};
use crate::{RawAudio, SynthesisResult};

use super::{linear_to_dbfs, resample};

/// Sample rate of every synthesized output.
pub const OUTPUT_SAMPLE_RATE: u32 = 24_000;

/// Loudest permitted peak.
pub const TARGET_PEAK_DBFS: f32 = -1.0;

/// `10^(-1/20)` rounded down to the nearest `f32`, so a peak at this level
/// measures at or below -1.0 dBFS.
const TARGET_PEAK_LINEAR: f32 = 0.891_250_9;

/// Amplitude at or below which a sample counts as silence.
pub const NOISE_FLOOR: f32 = 1e-3;

/// Longest stretch of near-silence kept after the last audible sample.
pub const MAX_TRAILING_SILENCE_MS: u32 = 200;

/// Run the full post-processing chain over raw engine output.
pub fn postprocess(raw: RawAudio) -> Result<SynthesisResult> {
    ensure_finite(&raw.samples, "engine output")?;
    if raw.samples.is_empty() {
        return Err(TtsError::integrity("engine produced no samples"));
    }

    let mut samples = if raw.sample_rate != OUTPUT_SAMPLE_RATE {
        log::debug!(
            "Resampling {} samples from {}Hz to {}Hz",
            raw.samples.len(),
            raw.sample_rate,
            OUTPUT_SAMPLE_RATE
        );
        resample(&raw.samples, raw.sample_rate, OUTPUT_SAMPLE_RATE)?
    } else {
        raw.samples
    };

    let peak = limit_peak(&mut samples)?;
    let trailing_silence_ms = trim_trailing_silence(&mut samples, OUTPUT_SAMPLE_RATE);

    ensure_finite(&samples, "processed audio")?;
    if samples.is_empty() {
        return Err(TtsError::integrity(
            "no audible samples above the noise floor",
        ));
    }

    let result = SynthesisResult {
        samples,
        sample_rate: OUTPUT_SAMPLE_RATE,
        peak_dbfs: linear_to_dbfs(peak),
        trailing_silence_ms,
    };
    log::debug!(
        "Post-processed {:.2}s: peak {:.2} dBFS, trailing silence {:.1}ms",
        result.duration_secs(),
        result.peak_dbfs,
        result.trailing_silence_ms
    );
    Ok(result)
}

fn ensure_finite(samples: &[f32], stage: &str) -> Result<()> {
    match samples.iter().position(|s| !s.is_finite()) {
        Some(idx) => Err(TtsError::integrity(format!(
            "{stage} contains a non-finite sample at index {idx}"
        ))),
        None => Ok(()),
    }
}

/// Apply a single gain so the peak does not exceed the target. Returns the
/// resulting peak amplitude.
fn limit_peak(samples: &mut [f32]) -> Result<f32> {
    let peak = samples.iter().fold(0.0f32, |acc, s| acc.max(s.abs()));
    if peak <= TARGET_PEAK_LINEAR {
        return Ok(peak);
    }

    let gain = TARGET_PEAK_LINEAR / peak;
    log::debug!(
        "Limiting peak {:.2} dBFS by {:.2} dB",
        linear_to_dbfs(peak),
        linear_to_dbfs(gain)
    );
    for s in samples.iter_mut() {
        // Rounding in the multiply can land one ulp above the target.
        *s = (*s * gain).clamp(-TARGET_PEAK_LINEAR, TARGET_PEAK_LINEAR);
    }

    if let Some(idx) = samples.iter().position(|s| s.abs() > 1.0) {
        return Err(TtsError::integrity(format!(
            "sample {idx} clipped after limiting"
        )));
    }
    Ok(TARGET_PEAK_LINEAR)
}

/// Truncate so at most [`MAX_TRAILING_SILENCE_MS`] of near-silence follows
/// the last audible sample. Returns the silence left, in milliseconds.
///
/// A buffer with nothing above the noise floor is emptied.
fn trim_trailing_silence(samples: &mut Vec<f32>, sample_rate: u32) -> f32 {
    let Some(last_audible) = samples.iter().rposition(|s| s.abs() > NOISE_FLOOR) else {
        samples.clear();
        return 0.0;
    };

    let max_tail = (sample_rate as u64 * MAX_TRAILING_SILENCE_MS as u64 / 1000) as usize;
    let keep = samples.len().min(last_audible + 1 + max_tail);
    samples.truncate(keep);

    let tail = keep - (last_audible + 1);
    tail as f32 * 1000.0 / sample_rate as f32
}
