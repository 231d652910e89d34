//! Audio utilities: channel mixing, resampling, WAV encode/decode and the
//! post-processing stage that every synthesized buffer passes through.

pub mod postprocess;
pub mod wav;

pub use postprocess::{
    postprocess, MAX_TRAILING_SILENCE_MS, NOISE_FLOOR, OUTPUT_SAMPLE_RATE, TARGET_PEAK_DBFS,
};
pub use wav::{encode_wav, read_wav_mono, WavEncoding};

use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};

use crate::error::{Result, TtsError};

/// Mix interleaved multi-channel audio down to mono by averaging all channels.
pub fn downmix(samples: &[f32], channels: u16) -> Vec<f32> {
    match channels {
        0 => Vec::new(),
        1 => samples.to_vec(),
        n => {
            let n = n as usize;
            samples
                .chunks_exact(n)
                .map(|frame| frame.iter().sum::<f32>() / n as f32)
                .collect()
        }
    }
}

const SINC_LEN: usize = 256;

/// Resample mono `samples` from `source_rate` to `target_rate` with a
/// windowed-sinc filter, which also removes content above the new Nyquist
/// frequency. Identical rates return the input unchanged.
///
/// The output holds exactly `ceil(len * target_rate / source_rate)` samples,
/// aligned with the input (the filter delay is removed).
pub fn resample(samples: &[f32], source_rate: u32, target_rate: u32) -> Result<Vec<f32>> {
    if source_rate == target_rate || samples.is_empty() {
        return Ok(samples.to_vec());
    }
    if source_rate == 0 || target_rate == 0 {
        return Err(TtsError::integrity(format!(
            "cannot resample from {source_rate}Hz to {target_rate}Hz"
        )));
    }

    let ratio = target_rate as f64 / source_rate as f64;
    let expected = (samples.len() as f64 * ratio).ceil() as usize;

    let params = SincInterpolationParameters {
        sinc_len: SINC_LEN,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };

    // Zero tail flushes the filter so the last input samples reach the output.
    let mut padded = Vec::with_capacity(samples.len() + SINC_LEN);
    padded.extend_from_slice(samples);
    padded.resize(samples.len() + SINC_LEN, 0.0);

    let mut resampler = SincFixedIn::<f32>::new(ratio, 1.0, params, padded.len(), 1)
        .map_err(|e| TtsError::integrity(format!("resampler setup failed: {e}")))?;
    let delay = resampler.output_delay();
    let output = resampler
        .process(&[padded], None)
        .map_err(|e| TtsError::integrity(format!("resampling failed: {e}")))?;

    let channel = output.into_iter().next().unwrap_or_default();
    let mut aligned: Vec<f32> = channel.into_iter().skip(delay).take(expected).collect();
    aligned.resize(expected, 0.0);
    Ok(aligned)
}

/// Peak level of `samples` in dBFS. Silence reports negative infinity.
pub fn peak_dbfs(samples: &[f32]) -> f32 {
    let peak = samples.iter().fold(0.0f32, |acc, s| acc.max(s.abs()));
    linear_to_dbfs(peak)
}

pub(crate) fn linear_to_dbfs(level: f32) -> f32 {
    if level <= 0.0 {
        return f32::NEG_INFINITY;
    }
    (20.0 * (level as f64).log10()) as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn downmix_averages_frames() {
        let out = downmix(&[1.0, -1.0, 0.5, 0.5], 2);
        assert_eq!(out, vec![0.0, 0.5]);
        assert!(downmix(&[1.0, 2.0], 0).is_empty());
        assert_eq!(downmix(&[0.1, 0.2], 1), vec![0.1, 0.2]);
    }

    fn sine(freq: f32, rate: u32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| 0.5 * (2.0 * std::f32::consts::PI * freq * i as f32 / rate as f32).sin())
            .collect()
    }

    fn rms(samples: &[f32]) -> f32 {
        (samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32).sqrt()
    }

    #[test]
    fn resample_same_rate_is_identity() {
        let input: Vec<f32> = (0..100).map(|i| i as f32 / 100.0).collect();
        assert_eq!(resample(&input, 24_000, 24_000).unwrap(), input);
    }

    #[test]
    fn resample_lengths_follow_the_ratio() {
        let out = resample(&vec![0.25f32; 22_050], 22_050, 24_000).unwrap();
        assert_eq!(out.len(), 24_000);
        // Away from the edges a constant stays constant.
        assert!(out[1_000..23_000].iter().all(|s| (s - 0.25).abs() < 1e-2));

        assert_eq!(resample(&vec![0.0f32; 480], 48_000, 24_000).unwrap().len(), 240);
    }

    #[test]
    fn downsampling_removes_content_above_nyquist() {
        // 18 kHz cannot be represented at 24 kHz and must not fold down to 6 kHz.
        let input = sine(18_000.0, 48_000, 48_000);
        let out = resample(&input, 48_000, 24_000).unwrap();
        assert_eq!(out.len(), 24_000);
        assert!(rms(&out[1_000..23_000]) < 0.01, "rms {}", rms(&out));
    }

    #[test]
    fn in_band_tone_survives_and_stays_aligned() {
        let input = sine(250.0, 48_000, 48_000);
        let out = resample(&input, 48_000, 24_000).unwrap();
        let expected = sine(250.0, 24_000, 24_000);
        let level = rms(&out[1_000..23_000]);
        assert!((level - rms(&expected)).abs() < 0.01, "rms {level}");
        let max_err = out[1_000..23_000]
            .iter()
            .zip(&expected[1_000..23_000])
            .fold(0.0f32, |m, (a, b)| m.max((a - b).abs()));
        assert!(max_err < 0.05, "max error {max_err}");
    }

    #[test]
    fn zero_rate_is_an_integrity_error() {
        let err = resample(&[0.1, 0.2], 0, 24_000).unwrap_err();
        assert!(matches!(err, TtsError::AudioIntegrity(_)));
    }

    #[test]
    fn peak_dbfs_of_full_scale_and_silence() {
        assert!((peak_dbfs(&[0.0, -1.0, 0.5]) - 0.0).abs() < 1e-6);
        assert!((peak_dbfs(&[0.5]) - (-6.0206)).abs() < 1e-3);
        assert_eq!(peak_dbfs(&[0.0, 0.0]), f32::NEG_INFINITY);
    }
}
