use std::io::Cursor;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::downmix;

/// Full-scale value for 16-bit PCM, shared by encode and decode.
const PCM16_SCALE: f32 = 32_768.0;

/// Sample format used when encoding output WAV files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WavEncoding {
    /// 16-bit signed integer PCM.
    #[default]
    Pcm16,
    /// 32-bit IEEE float.
    Float32,
}

/// Decode a WAV file into mono `f32` samples in `[-1, 1]`.
///
/// Integer PCM of any bit depth is scaled by its full-scale value and all
/// channels are averaged. Returns the samples and the file's sample rate.
pub fn read_wav_mono(path: &Path) -> Result<(Vec<f32>, u32), hound::Error> {
    let mut reader = hound::WavReader::open(path)?;
    let spec = reader.spec();

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader.samples::<f32>().collect::<Result<_, _>>()?,
        hound::SampleFormat::Int => {
            let scale = (1u64 << (spec.bits_per_sample.saturating_sub(1))) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<Result<_, _>>()?
        }
    };

    Ok((downmix(&interleaved, spec.channels), spec.sample_rate))
}

/// Encode mono samples as an in-memory WAV file.
pub fn encode_wav(
    samples: &[f32],
    sample_rate: u32,
    encoding: WavEncoding,
) -> Result<Vec<u8>, hound::Error> {
    let spec = match encoding {
        WavEncoding::Pcm16 => hound::WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        },
        WavEncoding::Float32 => hound::WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        },
    };

    let mut buf = Vec::with_capacity(44 + samples.len() * spec.bits_per_sample as usize / 8);
    {
        let mut writer = hound::WavWriter::new(Cursor::new(&mut buf), spec)?;
        match encoding {
            WavEncoding::Pcm16 => {
                for &sample in samples {
                    let scaled = (sample * PCM16_SCALE)
                        .round()
                        .clamp(i16::MIN as f32, i16::MAX as f32) as i16;
                    writer.write_sample(scaled)?;
                }
            }
            WavEncoding::Float32 => {
                for &sample in samples {
                    writer.write_sample(sample)?;
                }
            }
        }
        writer.finalize()?;
    }
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(bytes: &[u8]) -> (hound::WavSpec, Vec<f32>) {
        let mut reader = hound::WavReader::new(Cursor::new(bytes)).unwrap();
        let spec = reader.spec();
        let samples = match spec.sample_format {
            hound::SampleFormat::Float => reader.samples::<f32>().map(Result::unwrap).collect(),
            hound::SampleFormat::Int => reader
                .samples::<i16>()
                .map(|s| s.unwrap() as f32 / PCM16_SCALE)
                .collect(),
        };
        (spec, samples)
    }

    #[test]
    fn encodes_mono_pcm16_at_given_rate() {
        let bytes = encode_wav(&[0.0, 0.5, -0.5], 24_000, WavEncoding::Pcm16).unwrap();
        let (spec, samples) = decode(&bytes);
        assert_eq!(spec.channels, 1);
        assert_eq!(spec.sample_rate, 24_000);
        assert_eq!(spec.bits_per_sample, 16);
        assert_eq!(samples.len(), 3);
        assert!((samples[1] - 0.5).abs() < 1e-3);
    }

    #[test]
    fn pcm16_keeps_a_limited_peak_at_or_below_minus_one_dbfs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("peak.wav");
        let peak = 0.891_250_9f32;
        let bytes = encode_wav(&[0.0, peak, -peak, 0.2], 24_000, WavEncoding::Pcm16).unwrap();
        std::fs::write(&path, bytes).unwrap();

        let (samples, _) = read_wav_mono(&path).unwrap();
        assert!(crate::audio::peak_dbfs(&samples) <= -1.0);
    }

    #[test]
    fn pcm16_clips_full_scale_without_wrapping() {
        let bytes = encode_wav(&[1.0, -1.0, 1.5], 24_000, WavEncoding::Pcm16).unwrap();
        let mut reader = hound::WavReader::new(Cursor::new(bytes)).unwrap();
        let raw: Vec<i16> = reader.samples::<i16>().map(Result::unwrap).collect();
        assert_eq!(raw, [i16::MAX, i16::MIN, i16::MAX]);
    }

    #[test]
    fn encodes_float32_losslessly() {
        let input = [0.125f32, -0.75, 0.3];
        let bytes = encode_wav(&input, 24_000, WavEncoding::Float32).unwrap();
        let (spec, samples) = decode(&bytes);
        assert_eq!(spec.sample_format, hound::SampleFormat::Float);
        assert_eq!(samples, input);
    }

    #[test]
    fn reads_stereo_int_file_as_mono() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stereo.wav");
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 16_000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for _ in 0..10 {
            writer.write_sample(16_384i16).unwrap();
            writer.write_sample(0i16).unwrap();
        }
        writer.finalize().unwrap();

        let (samples, rate) = read_wav_mono(&path).unwrap();
        assert_eq!(rate, 16_000);
        assert_eq!(samples.len(), 10);
        assert!(samples.iter().all(|s| (s - 0.25).abs() < 1e-4));
    }
}
