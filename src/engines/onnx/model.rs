use std::path::{Path, PathBuf};

use ndarray::Array2;
use ort::execution_providers::{CPUExecutionProvider, CUDAExecutionProvider};
use ort::inputs;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::TensorRef;

use super::vocab::{load_config, ModelConfig};
use crate::Device;

#[derive(thiserror::Error, Debug)]
pub enum OnnxError {
    #[error("ONNX runtime error: {0}")]
    Ort(#[from] ort::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Array shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),
    #[error("Invalid config.json: {0}")]
    Config(String),
    #[error("Language '{0}' is not in the model's language list")]
    UnsupportedLanguage(String),
    #[error("Text produced no tokens the model knows")]
    NoTokens,
    #[error("At least one reference recording is required")]
    NoReferences,
    #[error("Cannot read reference audio: {0}")]
    Reference(String),
}

/// Loaded session plus what was learned about its inputs.
///
/// Graphs without a reference input are single-speaker exports (MMS/VITS
/// checkpoints for the Nigerian languages) and speak in their own voice.
pub struct CloneModel {
    session: Session,
    config: ModelConfig,
    /// "input_ids" or "tokens"
    tokens_input_name: String,
    /// "speaker_wav" or "reference_audio", when the graph clones a voice
    reference_input_name: Option<String>,
    /// "language" or "lang_id", when the graph is multilingual
    language_input_name: Option<String>,
}

impl CloneModel {
    /// Load the model from a directory holding an `.onnx` file and `config.json`.
    pub fn load(
        model_dir: &Path,
        device: Device,
        num_threads: Option<usize>,
        optimized_cache_path: Option<&Path>,
    ) -> Result<Self, OnnxError> {
        let onnx_path = find_onnx_file(model_dir)?;
        log::info!("Loading ONNX model from {} on {device}", onnx_path.display());

        let config_path = model_dir.join("config.json");
        if !config_path.exists() {
            return Err(OnnxError::Config(format!(
                "config.json not found in {}",
                model_dir.display()
            )));
        }
        let config = load_config(&config_path)?;

        let session = init_session(&onnx_path, device, num_threads, optimized_cache_path)?;

        let tokens_input_name = detect_input(&session, &["input_ids", "tokens"])
            .unwrap_or_else(|| "input_ids".to_string());
        let reference_input_name = detect_input(&session, &["speaker_wav", "reference_audio"]);
        let language_input_name = detect_input(&session, &["language", "lang_id"]);

        log::info!(
            "Detected: tokens_input='{}', reference_input={:?}, language_input={:?}",
            tokens_input_name,
            reference_input_name,
            language_input_name
        );

        if language_input_name.is_some() && config.languages.is_empty() {
            return Err(OnnxError::Config(
                "model takes a language input but config.json lists no languages".to_string(),
            ));
        }

        Ok(Self {
            session,
            config,
            tokens_input_name,
            reference_input_name,
            language_input_name,
        })
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    /// Whether generation is conditioned on reference audio.
    pub fn takes_reference(&self) -> bool {
        self.reference_input_name.is_some()
    }

    /// Language id for `language`, or `None` when the graph ignores language.
    pub fn language_id(&self, language: &str) -> Result<Option<i64>, OnnxError> {
        if self.language_input_name.is_none() {
            return Ok(None);
        }
        self.config
            .languages
            .iter()
            .position(|l| l.eq_ignore_ascii_case(language))
            .map(|i| Some(i as i64))
            .ok_or_else(|| OnnxError::UnsupportedLanguage(language.to_string()))
    }

    /// Run one generation. `reference` is mono audio at the reference rate and
    /// is ignored by single-speaker graphs.
    pub fn generate(
        &mut self,
        tokens: &[i64],
        reference: &[f32],
        language_id: Option<i64>,
    ) -> Result<Vec<f32>, OnnxError> {
        let tokens_arr = Array2::from_shape_vec((1, tokens.len()), tokens.to_vec())?;
        let reference_view = ndarray::ArrayView2::from_shape((1, reference.len()), reference)?;
        let language_arr = ndarray::arr1(&[language_id.unwrap_or(0)]);
        let tokens_input = self.tokens_input_name.as_str();

        let output = match (
            self.reference_input_name.as_deref(),
            self.language_input_name.as_deref().zip(language_id),
        ) {
            (Some(reference_input), Some((language_input, _))) => {
                let inputs = inputs![
                    tokens_input => TensorRef::from_array_view(tokens_arr.view())?,
                    reference_input => TensorRef::from_array_view(reference_view)?,
                    language_input => TensorRef::from_array_view(language_arr.view())?,
                ];
                self.session.run(inputs)?
            }
            (Some(reference_input), None) => {
                let inputs = inputs![
                    tokens_input => TensorRef::from_array_view(tokens_arr.view())?,
                    reference_input => TensorRef::from_array_view(reference_view)?,
                ];
                self.session.run(inputs)?
            }
            (None, Some((language_input, _))) => {
                let inputs = inputs![
                    tokens_input => TensorRef::from_array_view(tokens_arr.view())?,
                    language_input => TensorRef::from_array_view(language_arr.view())?,
                ];
                self.session.run(inputs)?
            }
            (None, None) => {
                let inputs = inputs![
                    tokens_input => TensorRef::from_array_view(tokens_arr.view())?,
                ];
                self.session.run(inputs)?
            }
        };

        // First output is the waveform
        let first_output = output
            .iter()
            .next()
            .ok_or_else(|| OnnxError::Ort(ort::Error::new("No output from model")))?;
        let waveform = first_output.1.try_extract_array::<f32>()?;

        Ok(waveform.iter().copied().collect())
    }
}

/// Find the ONNX model file in the given directory.
///
/// Prefers `model.onnx`, then the first `.onnx` file in name order.
fn find_onnx_file(model_dir: &Path) -> Result<PathBuf, OnnxError> {
    let preferred = model_dir.join("model.onnx");
    if preferred.exists() {
        return Ok(preferred);
    }

    let mut found: Vec<PathBuf> = std::fs::read_dir(model_dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("onnx"))
        .collect();
    found.sort();

    match found.into_iter().next() {
        Some(path) => {
            log::info!("Using ONNX file: {}", path.display());
            Ok(path)
        }
        None => Err(OnnxError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("No .onnx file found in {}", model_dir.display()),
        ))),
    }
}

/// Initialize an ONNX session with optional on-disk graph caching.
///
/// The first load runs Level3 optimization and writes the optimized graph to
/// `optimized_cache_path`; later loads read that file with optimization
/// disabled.
fn init_session(
    onnx_path: &Path,
    device: Device,
    num_threads: Option<usize>,
    optimized_cache_path: Option<&Path>,
) -> Result<Session, OnnxError> {
    let mut providers = Vec::new();
    if device == Device::Gpu {
        providers.push(CUDAExecutionProvider::default().build());
    }
    providers.push(CPUExecutionProvider::default().build());

    let (load_path, opt_level, write_cache) = match optimized_cache_path {
        Some(cache) if cache.exists() => {
            log::info!(
                "Loading pre-optimized graph ({:.1} MB) from {:?}",
                cache
                    .metadata()
                    .map(|m| m.len() as f64 / 1_048_576.0)
                    .unwrap_or(0.0),
                cache
            );
            (cache, GraphOptimizationLevel::Disable, None)
        }
        Some(cache) => {
            log::info!("First load: running Level3 optimization; saving graph to {:?}", cache);
            (onnx_path, GraphOptimizationLevel::Level3, Some(cache))
        }
        None => (onnx_path, GraphOptimizationLevel::Level3, None),
    };

    let mut builder = Session::builder()?
        .with_optimization_level(opt_level)?
        .with_execution_providers(providers)?;

    if let Some(cache) = write_cache {
        builder = builder.with_optimized_model_path(cache)?;
    }

    if let Some(threads) = num_threads {
        builder = builder
            .with_intra_threads(threads)?
            .with_inter_threads(threads)?;
    }

    Ok(builder.commit_from_file(load_path)?)
}

/// First session input whose name is one of `candidates`.
fn detect_input(session: &Session, candidates: &[&str]) -> Option<String> {
    session
        .inputs()
        .iter()
        .map(|input| input.name())
        .find(|name| candidates.contains(name))
        .map(|name| name.to_string())
}
