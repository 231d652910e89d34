use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Serialize;

use crate::audio::read_wav_mono;
use crate::config::ServiceConfig;
use crate::error::{Result, TtsError};

/// A reference recording that passed validation and can condition a cloning model.
#[derive(Debug, Clone, PartialEq)]
pub struct VoiceReference {
    pub path: PathBuf,
    pub sample_rate: u32,
    pub channels: u16,
    pub duration: Duration,
}

impl VoiceReference {
    /// Decode the recording to mono f32 at its own sample rate.
    pub fn load_mono(&self) -> Result<Vec<f32>> {
        read_wav_mono(&self.path)
            .map(|(samples, _)| samples)
            .map_err(|e| TtsError::Engine(format!("cannot decode {}: {e}", self.path.display())))
    }
}

/// One WAV file in the voice directory, as reported by
/// [`VoiceResolver::list_voices`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VoiceInfo {
    /// File stem, e.g. `lexi_01`.
    pub id: String,
    pub path: PathBuf,
    pub usable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sample_rate: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channels: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<f32>,
    /// Why the file cannot be used, when it cannot.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub problem: Option<String>,
}

/// Why a candidate file cannot be used as a reference.
#[derive(Debug, Clone, PartialEq)]
enum Rejection {
    Remote,
    Missing,
    NotAFile,
    Unreadable(String),
    Channels(u16),
    SampleRate,
    Duration(f32),
}

impl Rejection {
    fn describe(&self, path: &str, window: (f32, f32)) -> String {
        match self {
            Self::Remote => format!("{path}: only local files can be used as voice references"),
            Self::Missing => format!("{path}: file not found"),
            Self::NotAFile => format!("{path}: not a regular file"),
            Self::Unreadable(e) => format!("{path}: not a readable WAV file ({e})"),
            Self::Channels(n) => format!("{path}: unsupported channel count {n}"),
            Self::SampleRate => format!("{path}: sample rate is zero"),
            Self::Duration(secs) => format!(
                "{path}: duration {secs:.1}s outside the {:.0}-{:.0}s cloning window",
                window.0, window.1
            ),
        }
    }
}

const MAX_CHANNELS: u16 = 8;

/// Turns the references named by a request into validated [`VoiceReference`]s.
///
/// Resolution only ever touches the local filesystem.
#[derive(Debug, Clone)]
pub struct VoiceResolver {
    fallback_dir: PathBuf,
    default_speaker: Option<PathBuf>,
    max_references: usize,
    min_secs: f32,
    max_secs: f32,
}

impl VoiceResolver {
    pub fn new(fallback_dir: impl Into<PathBuf>) -> Self {
        let defaults = ServiceConfig::default();
        Self {
            fallback_dir: fallback_dir.into(),
            default_speaker: None,
            max_references: defaults.max_references,
            min_secs: defaults.reference_min_secs,
            max_secs: defaults.reference_max_secs,
        }
    }

    pub fn from_config(config: &ServiceConfig) -> Self {
        Self {
            fallback_dir: config.voice_dir.clone(),
            default_speaker: config.default_speaker.clone(),
            max_references: config.max_references,
            min_secs: config.reference_min_secs,
            max_secs: config.reference_max_secs,
        }
    }

    pub fn with_default_speaker(mut self, path: impl Into<PathBuf>) -> Self {
        self.default_speaker = Some(path.into());
        self
    }

    pub fn with_duration_window(mut self, min_secs: f32, max_secs: f32) -> Self {
        self.min_secs = min_secs;
        self.max_secs = max_secs;
        self
    }

    pub fn fallback_dir(&self) -> &Path {
        &self.fallback_dir
    }

    /// Resolve `speaker_references`, or the configured voice when empty.
    ///
    /// Explicit references must all be usable, otherwise the request is
    /// invalid. A missing or unusable configured voice is a deployment
    /// problem and reported as [`TtsError::Configuration`].
    pub fn resolve(&self, speaker_references: &[String]) -> Result<Vec<VoiceReference>> {
        if !speaker_references.is_empty() {
            return self.resolve_explicit(speaker_references);
        }
        if let Some(default) = &self.default_speaker {
            return self
                .inspect(default)
                .map(|r| vec![r])
                .map_err(|why| {
                    TtsError::configuration(format!(
                        "default speaker {}",
                        why.describe(&default.display().to_string(), self.window())
                    ))
                });
        }
        self.resolve_fallback()
    }

    fn window(&self) -> (f32, f32) {
        (self.min_secs, self.max_secs)
    }

    fn resolve_explicit(&self, references: &[String]) -> Result<Vec<VoiceReference>> {
        if references.len() > self.max_references {
            return Err(TtsError::validation(format!(
                "{} speaker references given, at most {} allowed",
                references.len(),
                self.max_references
            )));
        }

        references
            .iter()
            .map(|raw| {
                self.inspect_explicit(raw)
                    .map_err(|why| TtsError::validation(why.describe(raw, self.window())))
            })
            .collect()
    }

    fn inspect_explicit(&self, raw: &str) -> std::result::Result<VoiceReference, Rejection> {
        if raw.contains("://") {
            return Err(Rejection::Remote);
        }
        self.inspect(Path::new(raw))
    }

    /// Every WAV in the voice directory in name order, with whether it
    /// can serve as a reference and why not.
    pub fn list_voices(&self) -> Result<Vec<VoiceInfo>> {
        let voices = self
            .wav_files()?
            .into_iter()
            .map(|path| {
                let id = path
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_default();
                match self.inspect(&path) {
                    Ok(reference) => VoiceInfo {
                        id,
                        usable: true,
                        sample_rate: Some(reference.sample_rate),
                        channels: Some(reference.channels),
                        duration_secs: Some(reference.duration.as_secs_f32()),
                        problem: None,
                        path,
                    },
                    Err(why) => VoiceInfo {
                        id,
                        usable: false,
                        sample_rate: None,
                        channels: None,
                        duration_secs: None,
                        problem: Some(why.describe(&path.display().to_string(), self.window())),
                        path,
                    },
                }
            })
            .collect();
        Ok(voices)
    }

    fn wav_files(&self) -> Result<Vec<PathBuf>> {
        let dir = &self.fallback_dir;
        if !dir.is_dir() {
            return Err(TtsError::configuration(format!(
                "voice directory {} does not exist",
                dir.display()
            )));
        }

        let mut candidates: Vec<PathBuf> = std::fs::read_dir(dir)
            .map_err(|e| {
                TtsError::configuration(format!("cannot list {}: {e}", dir.display()))
            })?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| {
                p.extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|e| e.eq_ignore_ascii_case("wav"))
            })
            .collect();
        candidates.sort();
        Ok(candidates)
    }

    fn resolve_fallback(&self) -> Result<Vec<VoiceReference>> {
        let dir = &self.fallback_dir;
        let candidates = self.wav_files()?;

        let mut resolved = Vec::new();
        for path in candidates {
            match self.inspect(&path) {
                Ok(reference) => resolved.push(reference),
                Err(why) => log::warn!(
                    "Skipping fallback voice: {}",
                    why.describe(&path.display().to_string(), self.window())
                ),
            }
            if resolved.len() == self.max_references {
                break;
            }
        }

        if resolved.is_empty() {
            return Err(TtsError::configuration(format!(
                "no speaker references given and no usable WAV files in {}",
                dir.display()
            )));
        }
        log::debug!(
            "Resolved {} fallback voice(s) from {}",
            resolved.len(),
            dir.display()
        );
        Ok(resolved)
    }

    fn inspect(&self, path: &Path) -> std::result::Result<VoiceReference, Rejection> {
        let meta = std::fs::metadata(path).map_err(|_| Rejection::Missing)?;
        if !meta.is_file() {
            return Err(Rejection::NotAFile);
        }

        let reader =
            hound::WavReader::open(path).map_err(|e| Rejection::Unreadable(e.to_string()))?;
        let spec = reader.spec();
        if spec.channels == 0 || spec.channels > MAX_CHANNELS {
            return Err(Rejection::Channels(spec.channels));
        }
        if spec.sample_rate == 0 {
            return Err(Rejection::SampleRate);
        }

        // `duration()` counts frames, i.e. samples per channel.
        let secs = reader.duration() as f32 / spec.sample_rate as f32;
        if secs < self.min_secs || secs > self.max_secs {
            return Err(Rejection::Duration(secs));
        }

        Ok(VoiceReference {
            path: path.to_path_buf(),
            sample_rate: spec.sample_rate,
            channels: spec.channels,
            duration: Duration::from_secs_f32(secs),
        })
    }
}
