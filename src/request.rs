use serde::{Deserialize, Serialize};

fn default_language() -> String {
    "en".to_string()
}

/// A single synthesis request as received from a transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpeechRequest {
    pub text: String,
    /// Language code understood by the engine.
    #[serde(default = "default_language")]
    pub language: String,
    /// Local paths of reference recordings, in priority order. Empty means
    /// "use the configured voice".
    #[serde(default, alias = "speaker_files")]
    pub speaker_references: Vec<String>,
}

impl SpeechRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            language: default_language(),
            speaker_references: Vec::new(),
        }
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.speaker_references.push(reference.into());
        self
    }
}

/// One entry of a batch call. Items without an `id` are named by their
/// 0-based position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchItem {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(flatten)]
    pub request: SpeechRequest,
}

impl BatchItem {
    pub fn new(request: SpeechRequest) -> Self {
        Self { id: None, request }
    }

    pub fn with_id(id: impl Into<String>, request: SpeechRequest) -> Self {
        Self {
            id: Some(id.into()),
            request,
        }
    }

    /// Identifier used for archive entries and result lines.
    pub fn identifier(&self, position: usize) -> String {
        self.id.clone().unwrap_or_else(|| position.to_string())
    }
}
