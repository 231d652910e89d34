//! # naija-tts
//!
//! Text-to-speech synthesis for Nigerian English and Pidgin with zero-shot
//! voice cloning.
//!
//! ## Features
//!
//! - **Pidgin-aware normalization**: reduplicated intensifiers, particles and
//!   repetition spam are rewritten into text the acoustic model reads well
//! - **Voice cloning**: every request is conditioned on one or more local
//!   reference recordings, falling back to a configured voice directory
//! - **Quality enforcement**: output is always 24 kHz mono with the peak at or
//!   below -1 dBFS and at most 200 ms of trailing silence
//! - **Batch synthesis**: up to 50 items per call, packaged as a ZIP archive or
//!   NDJSON, with failures isolated per item
//! - **Nigerian languages**: `pcm`, `yor`, `hau` and `ibo` can be routed to a
//!   dedicated engine such as an MMS checkpoint
//!
//! Enable the ONNX cloning engine via Cargo features:
//!
//! ```toml
//! [dependencies]
//! naija-tts = { version = "0.1", features = ["onnx"] }
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use naija_tts::{engines::formant::FormantEngine, ServiceConfig, SpeechRequest, Synthesizer};
//!
//! let config = ServiceConfig::load(None)?;
//! let synth = Synthesizer::with_engine(config, Box::new(FormantEngine::new()))?;
//!
//! let result = synth.speak(&SpeechRequest::new("How you dey? Today go sweet well-well!"))?;
//! result.write_wav(std::path::Path::new("speech.wav"))?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod audio;
pub mod batch;
pub mod cache;
pub mod config;
pub mod engines;
pub mod error;
pub mod request;
pub mod response;
pub mod synthesizer;
pub mod text;
pub mod voices;

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

pub use audio::WavEncoding;
pub use batch::{BatchOutcome, ItemFailure, ItemOutcome, MAX_BATCH_ITEMS};
pub use config::{ServiceConfig, ServiceConfigBuilder};
pub use error::{ErrorKind, TtsError};
pub use request::{BatchItem, SpeechRequest};
pub use response::{Artifact, ErrorEnvelope, ReturnFormat};
pub use synthesizer::{EngineState, Health, SynthesisStats, Synthesizer};
pub use text::{normalize, NormalizedText};
pub use voices::{VoiceInfo, VoiceReference, VoiceResolver};

/// Unprocessed audio straight out of an engine, at the engine's native rate.
#[derive(Debug, Clone, PartialEq)]
pub struct RawAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

/// The result of a synthesis (text-to-speech) operation after post-processing.
///
/// `peak_dbfs` and `trailing_silence_ms` are measured when the audio is
/// produced and are never re-derived later.
#[derive(Debug, Clone)]
pub struct SynthesisResult {
    /// Mono f32 samples in `[-1, 1]`
    pub samples: Vec<f32>,
    /// Always [`audio::OUTPUT_SAMPLE_RATE`]
    pub sample_rate: u32,
    /// Peak level, at most -1.0
    pub peak_dbfs: f32,
    /// Near-silence after the last audible sample, at most 200
    pub trailing_silence_ms: f32,
}

impl SynthesisResult {
    /// Write the audio to a 32-bit float WAV file.
    pub fn write_wav(&self, path: &Path) -> Result<(), hound::Error> {
        let bytes = self.to_wav_bytes(WavEncoding::Float32)?;
        std::fs::write(path, bytes)?;
        Ok(())
    }

    /// Encode the audio as an in-memory WAV file.
    pub fn to_wav_bytes(&self, encoding: WavEncoding) -> Result<Vec<u8>, hound::Error> {
        audio::encode_wav(&self.samples, self.sample_rate, encoding)
    }

    /// Duration of the audio in seconds.
    pub fn duration_secs(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// Compute device an engine runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    #[default]
    Cpu,
    Gpu,
}

impl Device {
    pub fn as_str(&self) -> &'static str {
        match self {
            Device::Cpu => "cpu",
            Device::Gpu => "gpu",
        }
    }

    /// Probe once for an accelerator. Without the `onnx` feature there is
    /// nothing to accelerate, so this is always [`Device::Cpu`].
    pub fn probe() -> Self {
        #[cfg(feature = "onnx")]
        {
            engines::onnx::probe_device()
        }
        #[cfg(not(feature = "onnx"))]
        {
            Device::Cpu
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error type returned by engines. Engine failures are reported, never retried.
pub type EngineFailure = Box<dyn std::error::Error + Send + Sync>;

/// Common interface for acoustic backends.
///
/// Text in, samples out. Callers never invoke an engine directly: the
/// [`Synthesizer`] holds each engine behind a device lease, so one generation
/// runs per device at a time and `synthesize` may take `&mut self`.
pub trait SynthesisEngine: Send {
    /// Short identifier used in logs and health reports.
    fn name(&self) -> &str;

    /// Device this engine was loaded on.
    fn device(&self) -> Device {
        Device::Cpu
    }

    /// Whether model weights are resident and ready.
    fn is_loaded(&self) -> bool {
        true
    }

    /// Sample rate of the buffers returned by [`synthesize`](Self::synthesize).
    fn native_sample_rate(&self) -> u32;

    /// Whether output follows the reference voice. Engines that answer
    /// `false` are called with no references and none are resolved for them.
    fn clones_voice(&self) -> bool {
        true
    }

    /// Generate speech for already-normalized `text`, cloning the voice in
    /// `references`.
    fn synthesize(
        &mut self,
        text: &str,
        language: &str,
        references: &[VoiceReference],
    ) -> Result<RawAudio, EngineFailure>;
}
