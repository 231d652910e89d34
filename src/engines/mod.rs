//! Speech synthesis engines.
//!
//! Every engine implements [`crate::SynthesisEngine`] and returns raw audio at
//! its native rate; resampling and level control happen afterwards.
//!
//! # Available Engines
//!
//! - [`formant`] - deterministic formant synthesizer, always available
//! - `onnx` - zero-shot voice cloning through ONNX Runtime (enable the `onnx` feature)

pub mod formant;

#[cfg(feature = "onnx")]
pub mod onnx;
