use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use super::model::OnnxError;

/// Contents of a model directory's `config.json`.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelConfig {
    /// Rate of the waveform the model produces.
    pub sample_rate: u32,
    /// Rate the model expects its reference audio in.
    pub reference_sample_rate: u32,
    pub vocab: HashMap<char, i64>,
    /// Position in this list is the language id fed to the model.
    pub languages: Vec<String>,
}

#[derive(Deserialize)]
struct RawConfig {
    sample_rate: u32,
    reference_sample_rate: u32,
    vocab: HashMap<String, i64>,
    #[serde(default)]
    languages: Vec<String>,
}

pub fn load_config(config_path: &Path) -> Result<ModelConfig, OnnxError> {
    let content = std::fs::read_to_string(config_path)?;
    parse_config(&content)
}

pub fn parse_config(content: &str) -> Result<ModelConfig, OnnxError> {
    let raw: RawConfig = serde_json::from_str(content)
        .map_err(|e| OnnxError::Config(format!("Failed to parse JSON: {e}")))?;

    if raw.sample_rate == 0 || raw.reference_sample_rate == 0 {
        return Err(OnnxError::Config("sample rates must be positive".to_string()));
    }

    let mut vocab = HashMap::with_capacity(raw.vocab.len());
    for (k, id) in raw.vocab {
        let mut chars = k.chars();
        let ch = match (chars.next(), chars.next()) {
            (Some(ch), None) => ch,
            _ => {
                return Err(OnnxError::Config(format!(
                    "vocab keys must be single characters, got {k:?}"
                )))
            }
        };
        vocab.insert(ch, id);
    }
    if vocab.is_empty() {
        return Err(OnnxError::Config("'vocab' is empty".to_string()));
    }

    Ok(ModelConfig {
        sample_rate: raw.sample_rate,
        reference_sample_rate: raw.reference_sample_rate,
        vocab,
        languages: raw.languages,
    })
}

/// Map text to token ids character by character. Characters missing from the
/// vocabulary are retried lowercased, then dropped.
pub fn tokenize(text: &str, vocab: &HashMap<char, i64>) -> Vec<i64> {
    text.chars()
        .filter_map(|ch| {
            vocab
                .get(&ch)
                .or_else(|| ch.to_lowercase().next().and_then(|lc| vocab.get(&lc)))
                .copied()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &str = r#"{
        "sample_rate": 24000,
        "reference_sample_rate": 22050,
        "languages": ["en", "fr"],
        "vocab": {" ": 1, "a": 2, "b": 3, ",": 4}
    }"#;

    #[test]
    fn parses_config() {
        let config = parse_config(CONFIG).unwrap();
        assert_eq!(config.sample_rate, 24_000);
        assert_eq!(config.reference_sample_rate, 22_050);
        assert_eq!(config.languages, vec!["en", "fr"]);
        assert_eq!(config.vocab[&'b'], 3);
    }

    #[test]
    fn rejects_multi_char_keys() {
        let err = parse_config(
            r#"{"sample_rate": 1, "reference_sample_rate": 1, "vocab": {"ab": 1}}"#,
        )
        .unwrap_err();
        assert!(matches!(err, OnnxError::Config(_)));
    }

    #[test]
    fn tokenize_lowercases_and_drops_unknown() {
        let vocab = parse_config(CONFIG).unwrap().vocab;
        assert_eq!(tokenize("Ab, z", &vocab), vec![2, 3, 4, 1]);
    }
}
