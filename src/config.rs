//! Service configuration.
//!
//! [`ServiceConfig`] can be built in code through [`ServiceConfigBuilder`],
//! read from a TOML file, or both, and is then adjusted by environment
//! variables:
//!
//! | Variable | Field |
//! |---|---|
//! | `NAIJA_VOICE_DIR` | `voice_dir` |
//! | `NAIJA_DEFAULT_SPEAKER` | `default_speaker` |
//! | `NAIJA_LOCK_TIMEOUT_MS` | `lock_timeout_ms` |
//! | `NAIJA_CACHE_ENTRIES` | `cache_entries` |
//!
//! ```toml
//! voice_dir = "data/voices/lexi"
//! lock_timeout_ms = 15000
//! wav_encoding = "float32"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use derive_builder::Builder;
use serde::{Deserialize, Serialize};

use crate::audio::WavEncoding;
use crate::error::{Result, TtsError};

pub const ENV_VOICE_DIR: &str = "NAIJA_VOICE_DIR";
pub const ENV_DEFAULT_SPEAKER: &str = "NAIJA_DEFAULT_SPEAKER";
pub const ENV_LOCK_TIMEOUT_MS: &str = "NAIJA_LOCK_TIMEOUT_MS";
pub const ENV_CACHE_ENTRIES: &str = "NAIJA_CACHE_ENTRIES";

/// Languages accepted by the XTTS v2 family of cloning models.
pub const XTTS_LANGUAGES: &[&str] = &[
    "en", "es", "fr", "de", "it", "pt", "pl", "tr", "ru", "nl", "cs", "ar", "zh-cn", "ja", "hu",
    "ko", "hi",
];

/// Nigerian languages covered by the MMS single-speaker checkpoints:
/// Pidgin, Yoruba, Hausa and Igbo (under both of its codes).
pub const MMS_LANGUAGES: &[&str] = &["pcm", "yor", "hau", "ibo", "igb"];

/// Language spoken by the primary engine when a Nigerian language has no
/// routed engine.
pub const FALLBACK_LANGUAGE: &str = "en";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Builder)]
#[serde(default)]
#[builder(default, setter(into))]
pub struct ServiceConfig {
    /// Directory scanned for fallback reference WAVs.
    pub voice_dir: PathBuf,
    /// Reference used before falling back to `voice_dir` when a request names none.
    #[builder(setter(into, strip_option))]
    pub default_speaker: Option<PathBuf>,
    /// Maximum characters of text per request or batch item.
    pub max_text_chars: usize,
    /// Maximum items per batch call.
    pub max_batch_items: usize,
    /// Maximum reference recordings per request.
    pub max_references: usize,
    /// Shortest usable reference recording, in seconds.
    pub reference_min_secs: f32,
    /// Longest usable reference recording, in seconds.
    pub reference_max_secs: f32,
    /// How long a request may wait for a free device.
    pub lock_timeout_ms: u64,
    pub supported_languages: Vec<String>,
    pub wav_encoding: WavEncoding,
    /// Finished results kept in memory; 0 disables the cache.
    pub cache_entries: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            voice_dir: PathBuf::from("data/voices/lexi"),
            default_speaker: None,
            max_text_chars: 500,
            max_batch_items: crate::batch::MAX_BATCH_ITEMS,
            max_references: 5,
            reference_min_secs: 5.0,
            reference_max_secs: 30.0,
            lock_timeout_ms: 30_000,
            supported_languages: XTTS_LANGUAGES
                .iter()
                .chain(MMS_LANGUAGES)
                .map(|l| l.to_string())
                .collect(),
            wav_encoding: WavEncoding::default(),
            cache_entries: 128,
        }
    }
}

impl ServiceConfig {
    pub fn builder() -> ServiceConfigBuilder {
        ServiceConfigBuilder::default()
    }

    /// Load from an optional TOML file, apply environment overrides and validate.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_toml_file(path)?,
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        log::info!(
            "Configuration loaded: voice_dir={}, lock_timeout={}ms",
            config.voice_dir.display(),
            config.lock_timeout_ms
        );
        Ok(config)
    }

    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            TtsError::configuration(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| TtsError::configuration(format!("invalid configuration: {e}")))
    }

    /// Apply overrides from `lookup`, normally the process environment.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup(ENV_VOICE_DIR).filter(|v| !v.is_empty()) {
            self.voice_dir = PathBuf::from(dir);
        }
        if let Some(speaker) = lookup(ENV_DEFAULT_SPEAKER).filter(|v| !v.is_empty()) {
            self.default_speaker = Some(PathBuf::from(speaker));
        }
        if let Some(ms) = lookup(ENV_LOCK_TIMEOUT_MS).filter(|v| !v.is_empty()) {
            self.lock_timeout_ms = ms.trim().parse().map_err(|_| {
                TtsError::configuration(format!("{ENV_LOCK_TIMEOUT_MS} must be an integer, got {ms:?}"))
            })?;
        }
        if let Some(entries) = lookup(ENV_CACHE_ENTRIES).filter(|v| !v.is_empty()) {
            self.cache_entries = entries.trim().parse().map_err(|_| {
                TtsError::configuration(format!("{ENV_CACHE_ENTRIES} must be an integer, got {entries:?}"))
            })?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_text_chars == 0 || self.max_text_chars > crate::text::MAX_NORMALIZED_CHARS {
            return Err(TtsError::configuration(format!(
                "max_text_chars must be between 1 and {}",
                crate::text::MAX_NORMALIZED_CHARS
            )));
        }
        if self.max_batch_items == 0 {
            return Err(TtsError::configuration("max_batch_items must be positive"));
        }
        if self.max_references == 0 {
            return Err(TtsError::configuration("max_references must be positive"));
        }
        if !(self.reference_min_secs > 0.0 && self.reference_min_secs <= self.reference_max_secs)
        {
            return Err(TtsError::configuration(format!(
                "invalid reference window {}s..{}s",
                self.reference_min_secs, self.reference_max_secs
            )));
        }
        if self.supported_languages.is_empty() {
            return Err(TtsError::configuration("supported_languages is empty"));
        }
        Ok(())
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    pub fn supports_language(&self, language: &str) -> bool {
        self.supported_languages
            .iter()
            .any(|l| l.eq_ignore_ascii_case(language))
    }
}
