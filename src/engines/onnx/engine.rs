use std::path::{Path, PathBuf};

use ort::execution_providers::{CUDAExecutionProvider, ExecutionProvider};

use crate::audio::resample;
use crate::{Device, EngineFailure, RawAudio, SynthesisEngine, VoiceReference};

use super::model::{CloneModel, OnnxError};
use super::vocab::tokenize;

/// Parameters for loading a cloning model.
#[derive(Debug, Clone, Default)]
pub struct OnnxModelParams {
    /// Number of CPU threads to use for inference.
    /// `None` uses the ORT default (typically all available cores).
    pub num_threads: Option<usize>,
    /// Where to keep the Level3-optimized graph between runs. Must be writable.
    pub optimized_model_cache_path: Option<PathBuf>,
    /// Force a device instead of probing.
    pub device: Option<Device>,
}

/// Whether ONNX Runtime can run on a CUDA device here.
pub fn probe_device() -> Device {
    match CUDAExecutionProvider::default().is_available() {
        Ok(true) => Device::Gpu,
        Ok(false) => Device::Cpu,
        Err(e) => {
            log::warn!("CUDA probe failed, using CPU: {e}");
            Device::Cpu
        }
    }
}

/// Engine backed by an ONNX export: either a zero-shot cloning model or a
/// single-speaker model such as an MMS checkpoint for Pidgin or Yoruba.
///
/// The model is loaded once, on construction, onto the probed device.
pub struct OnnxCloneEngine {
    model: CloneModel,
    model_dir: PathBuf,
    device: Device,
}

impl OnnxCloneEngine {
    pub fn load(model_dir: &Path, params: OnnxModelParams) -> Result<Self, OnnxError> {
        let device = params.device.unwrap_or_else(probe_device);
        let model = CloneModel::load(
            model_dir,
            device,
            params.num_threads,
            params.optimized_model_cache_path.as_deref(),
        )?;
        Ok(Self {
            model,
            model_dir: model_dir.to_path_buf(),
            device,
        })
    }

    pub fn model_dir(&self) -> &Path {
        &self.model_dir
    }

    /// Concatenate the references as one mono buffer at the model's reference rate.
    fn conditioning_audio(&self, references: &[VoiceReference]) -> Result<Vec<f32>, OnnxError> {
        if references.is_empty() {
            return Err(OnnxError::NoReferences);
        }
        let target = self.model.config().reference_sample_rate;
        let mut audio = Vec::new();
        for reference in references {
            let samples = reference
                .load_mono()
                .map_err(|e| OnnxError::Reference(e.to_string()))?;
            let resampled = resample(&samples, reference.sample_rate, target)
                .map_err(|e| OnnxError::Reference(e.to_string()))?;
            audio.extend(resampled);
        }
        Ok(audio)
    }
}

impl SynthesisEngine for OnnxCloneEngine {
    fn name(&self) -> &str {
        "onnx-clone"
    }

    fn device(&self) -> Device {
        self.device
    }

    fn clones_voice(&self) -> bool {
        self.model.takes_reference()
    }

    fn native_sample_rate(&self) -> u32 {
        self.model.config().sample_rate
    }

    fn synthesize(
        &mut self,
        text: &str,
        language: &str,
        references: &[VoiceReference],
    ) -> Result<RawAudio, EngineFailure> {
        let language_id = self.model.language_id(language)?;
        let tokens = tokenize(text, &self.model.config().vocab);
        if tokens.is_empty() {
            return Err(OnnxError::NoTokens.into());
        }
        let reference = if self.model.takes_reference() {
            self.conditioning_audio(references)?
        } else {
            Vec::new()
        };

        log::debug!(
            "Generating {} tokens against {} reference samples",
            tokens.len(),
            reference.len()
        );
        let samples = self.model.generate(&tokens, &reference, language_id)?;

        Ok(RawAudio {
            samples,
            sample_rate: self.model.config().sample_rate,
        })
    }
}
