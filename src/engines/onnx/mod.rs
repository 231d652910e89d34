//! Zero-shot voice cloning through ONNX Runtime.
//!
//! The engine conditions an exported cloning model on the request's reference
//! recordings, so any voice can be spoken without fine-tuning.
//!
//! # Model Directory Layout
//!
//! ```text
//! models/naija-clone/
//! ├── model.onnx     # exported cloning model (any *.onnx is accepted)
//! └── config.json    # sample rates, character vocabulary, languages
//! ```
//!
//! `config.json`:
//!
//! ```json
//! {
//!   "sample_rate": 24000,
//!   "reference_sample_rate": 22050,
//!   "languages": ["en", "fr"],
//!   "vocab": { " ": 1, "a": 2, "b": 3 }
//! }
//! ```
//!
//! `languages` is only needed when the graph takes a `language` input.
//!
//! # Example
//!
//! ```rust,no_run
//! use naija_tts::engines::onnx::{OnnxCloneEngine, OnnxModelParams};
//! use naija_tts::{ServiceConfig, SpeechRequest, Synthesizer};
//! use std::path::Path;
//!
//! let engine = OnnxCloneEngine::load(Path::new("models/naija-clone"), OnnxModelParams::default())?;
//! let synth = Synthesizer::with_engine(ServiceConfig::load(None)?, Box::new(engine))?;
//! let result = synth.speak(&SpeechRequest::new("Wetin dey happen?"))?;
//! println!("{:.2}s at {}Hz", result.duration_secs(), result.sample_rate);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod engine;
pub mod model;
pub mod vocab;

pub use engine::{probe_device, OnnxCloneEngine, OnnxModelParams};
pub use model::OnnxError;
