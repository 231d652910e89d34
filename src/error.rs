use std::time::Duration;

use serde::Serialize;

/// Errors produced by the synthesis pipeline.
///
/// Every variant maps to a stable [`ErrorKind`] tag and a client-facing
/// status code so that a transport layer can render failures without
/// inspecting messages.
#[derive(thiserror::Error, Debug)]
pub enum TtsError {
    /// Malformed or out-of-bound request. Never retried.
    #[error("Invalid request: {0}")]
    Validation(String),
    /// Deployment problem, e.g. the fallback voice directory is missing or empty.
    #[error("Configuration error: {0}")]
    Configuration(String),
    /// The acoustic model failed during generation.
    #[error("Engine failed: {0}")]
    Engine(String),
    /// Post-processing found invalid samples or nothing left after trimming.
    #[error("Audio integrity check failed: {0}")]
    AudioIntegrity(String),
    /// No device became free within the configured budget. The model was never invoked.
    #[error("Timed out after {}ms waiting for a free device", .waited.as_millis())]
    Timeout { waited: Duration },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Serializable tag identifying a [`TtsError`] variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ValidationError,
    ConfigurationError,
    EngineError,
    AudioIntegrityError,
    Timeout,
    IoError,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ValidationError => "validation_error",
            Self::ConfigurationError => "configuration_error",
            Self::EngineError => "engine_error",
            Self::AudioIntegrityError => "audio_integrity_error",
            Self::Timeout => "timeout",
            Self::IoError => "io_error",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TtsError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::ValidationError,
            Self::Configuration(_) => ErrorKind::ConfigurationError,
            Self::Engine(_) => ErrorKind::EngineError,
            Self::AudioIntegrity(_) => ErrorKind::AudioIntegrityError,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Io(_) => ErrorKind::IoError,
        }
    }

    /// HTTP-style status a transport should answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Validation(_) => 400,
            Self::Configuration(_) => 503,
            Self::Engine(_) | Self::AudioIntegrity(_) | Self::Io(_) => 500,
            Self::Timeout { .. } => 504,
        }
    }

    pub(crate) fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub(crate) fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub(crate) fn integrity(msg: impl Into<String>) -> Self {
        Self::AudioIntegrity(msg.into())
    }
}

pub type Result<T, E = TtsError> = std::result::Result<T, E>;
