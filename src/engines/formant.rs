//! Deterministic formant synthesizer.
//!
//! Produces a speech-like signal (three moving formants under a decaying
//! envelope, plus a little seeded noise) whose length follows the text. It
//! needs no model files, so it serves as the fallback backend when no
//! cloning model is installed and as a stand-in engine for tests. Voice
//! references and language are accepted but ignored.

use std::f32::consts::PI;

use crate::{EngineFailure, RawAudio, SynthesisEngine, VoiceReference};

/// Native output rate of the formant synthesizer.
pub const SAMPLE_RATE: u32 = 22_050;

const SECS_PER_CHAR: f32 = 0.08;
const BASE_SECS: f32 = 0.5;
const MAX_SECS: f32 = 8.0;

#[derive(Debug, Clone)]
pub struct FormantEngine {
    gain: f32,
}

impl Default for FormantEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl FormantEngine {
    pub fn new() -> Self {
        Self { gain: 1.0 }
    }

    /// Scale the output; values above ~4 push peaks past full scale.
    pub fn with_gain(mut self, gain: f32) -> Self {
        self.gain = gain;
        self
    }

    /// Length of the audio produced for `text`, in seconds.
    pub fn duration_for(text: &str) -> f32 {
        (text.chars().count() as f32 * SECS_PER_CHAR + BASE_SECS).min(MAX_SECS)
    }

    fn render(&self, text: &str) -> Vec<f32> {
        let duration = Self::duration_for(text);
        let n = (SAMPLE_RATE as f32 * duration) as usize;
        let mut noise = NoiseSource::seeded(text);

        (0..n)
            .map(|i| {
                let t = i as f32 / SAMPLE_RATE as f32;
                let f1 = 500.0 + 200.0 * (t * 3.0).sin();
                let f2 = 1500.0 + 300.0 * (t * 5.0).sin();
                let f3 = 2500.0 + 400.0 * (t * 7.0).sin();

                let envelope = 0.2 * (1.0 - t / duration) * (-t * 0.5).exp();
                let signal = 0.5 * (2.0 * PI * f1 * t).sin()
                    + 0.3 * (2.0 * PI * f2 * t).sin()
                    + 0.2 * (2.0 * PI * f3 * t).sin();

                self.gain * envelope * (signal + 0.05 * noise.next())
            })
            .collect()
    }
}

impl SynthesisEngine for FormantEngine {
    fn name(&self) -> &str {
        "formant"
    }

    fn native_sample_rate(&self) -> u32 {
        SAMPLE_RATE
    }

    fn synthesize(
        &mut self,
        text: &str,
        _language: &str,
        _references: &[VoiceReference],
    ) -> Result<RawAudio, EngineFailure> {
        Ok(RawAudio {
            samples: self.render(text),
            sample_rate: SAMPLE_RATE,
        })
    }
}

/// Small xorshift generator seeded from the text so output is reproducible.
struct NoiseSource(u32);

impl NoiseSource {
    fn seeded(text: &str) -> Self {
        // FNV-1a
        let seed = text
            .bytes()
            .fold(0x811c_9dc5u32, |h, b| (h ^ b as u32).wrapping_mul(0x0100_0193));
        Self(seed.max(1))
    }

    /// Next value in `[-1, 1)`.
    fn next(&mut self) -> f32 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        self.0 = x;
        (x as f64 / u32::MAX as f64 * 2.0 - 1.0) as f32
    }
}
