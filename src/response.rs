//! Packaging synthesized audio for a transport.
//!
//! Single requests become one WAV file. Batches become either a ZIP archive
//! (`<id>.wav` per successful item followed by `manifest.json`) or NDJSON with
//! one line per item and the audio inlined as base64.

use std::io::{self, Cursor, Write};
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::audio::WavEncoding;
use crate::batch::{BatchOutcome, ItemFailure, ItemOutcome};
use crate::error::{ErrorKind, Result, TtsError};
use crate::request::{BatchItem, SpeechRequest};
use crate::synthesizer::Synthesizer;
use crate::SynthesisResult;

pub const MANIFEST_NAME: &str = "manifest.json";

/// Container used for batch results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReturnFormat {
    #[default]
    Zip,
    #[serde(alias = "json")]
    Ndjson,
}

/// Encoded payload ready to hand to a client or write to disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub bytes: Vec<u8>,
    pub content_type: &'static str,
    pub filename: String,
}

impl Artifact {
    /// Write into `dir` under [`Artifact::filename`].
    pub fn write_to(&self, dir: &Path) -> Result<PathBuf> {
        let path = dir.join(&self.filename);
        std::fs::write(&path, &self.bytes)?;
        Ok(path)
    }
}

/// Body returned for a failed single request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorEnvelope {
    pub error: ErrorBody,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorBody {
    pub kind: ErrorKind,
    pub message: String,
    pub status: u16,
}

impl From<&TtsError> for ErrorEnvelope {
    fn from(err: &TtsError) -> Self {
        Self {
            error: ErrorBody {
                kind: err.kind(),
                message: err.to_string(),
                status: err.status_code(),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "lowercase")]
enum ItemStatus {
    Success,
    Error,
}

/// One line of NDJSON output, and one entry of a ZIP manifest.
#[derive(Serialize)]
struct ItemRecord<'a> {
    id: &'a str,
    status: ItemStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    duration_secs: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    peak_dbfs: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    trailing_silence_ms: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    sample_rate: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    audio_base64: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a ItemFailure>,
}

impl<'a> ItemRecord<'a> {
    fn success(id: &'a str, result: &SynthesisResult) -> Self {
        Self {
            id,
            status: ItemStatus::Success,
            file: None,
            duration_secs: Some(result.duration_secs()),
            peak_dbfs: Some(result.peak_dbfs),
            trailing_silence_ms: Some(result.trailing_silence_ms),
            sample_rate: None,
            audio_base64: None,
            error: None,
        }
    }

    fn failure(id: &'a str, failure: &'a ItemFailure) -> Self {
        Self {
            id,
            status: ItemStatus::Error,
            file: None,
            duration_secs: None,
            peak_dbfs: None,
            trailing_silence_ms: None,
            sample_rate: None,
            audio_base64: None,
            error: Some(failure),
        }
    }
}

#[derive(Serialize)]
struct Manifest<'a> {
    total: usize,
    succeeded: usize,
    items: Vec<ItemRecord<'a>>,
}

fn wav_bytes(result: &SynthesisResult, encoding: WavEncoding) -> Result<Vec<u8>> {
    result.to_wav_bytes(encoding).map_err(|e| TtsError::Io(io::Error::other(e)))
}

fn archive_error(e: zip::result::ZipError) -> TtsError {
    TtsError::Io(io::Error::other(e))
}

/// A single result as a WAV file.
pub fn speech_artifact(result: &SynthesisResult, encoding: WavEncoding) -> Result<Artifact> {
    Ok(Artifact {
        bytes: wav_bytes(result, encoding)?,
        content_type: "audio/wav",
        filename: "speech.wav".to_string(),
    })
}

/// Package batch outcomes in `format`.
pub fn batch_artifact(
    outcomes: &[BatchOutcome],
    format: ReturnFormat,
    encoding: WavEncoding,
) -> Result<Artifact> {
    match format {
        ReturnFormat::Zip => zip_artifact(outcomes, encoding),
        ReturnFormat::Ndjson => ndjson_artifact(outcomes, encoding),
    }
}

fn zip_artifact(outcomes: &[BatchOutcome], encoding: WavEncoding) -> Result<Artifact> {
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let mut records = Vec::with_capacity(outcomes.len());

    for item in outcomes {
        match &item.outcome {
            ItemOutcome::Success(result) => {
                let name = format!("{}.wav", item.id);
                writer.start_file(name.as_str(), options).map_err(archive_error)?;
                writer.write_all(&wav_bytes(result, encoding)?)?;

                let mut record = ItemRecord::success(&item.id, result);
                record.file = Some(name);
                records.push(record);
            }
            ItemOutcome::Failure(failure) => records.push(ItemRecord::failure(&item.id, failure)),
        }
    }

    let manifest = Manifest {
        total: outcomes.len(),
        succeeded: outcomes.iter().filter(|o| o.outcome.is_success()).count(),
        items: records,
    };
    let manifest = serde_json::to_vec_pretty(&manifest).map_err(io::Error::from)?;
    writer
        .start_file(MANIFEST_NAME, options)
        .map_err(archive_error)?;
    writer.write_all(&manifest)?;

    let bytes = writer.finish().map_err(archive_error)?.into_inner();
    Ok(Artifact {
        bytes,
        content_type: "application/zip",
        filename: "batch.zip".to_string(),
    })
}

fn ndjson_artifact(outcomes: &[BatchOutcome], encoding: WavEncoding) -> Result<Artifact> {
    let mut bytes = Vec::new();
    for item in outcomes {
        let record = match &item.outcome {
            ItemOutcome::Success(result) => {
                let mut record = ItemRecord::success(&item.id, result);
                record.sample_rate = Some(result.sample_rate);
                record.audio_base64 = Some(STANDARD.encode(wav_bytes(result, encoding)?));
                record
            }
            ItemOutcome::Failure(failure) => ItemRecord::failure(&item.id, failure),
        };
        serde_json::to_writer(&mut bytes, &record).map_err(io::Error::from)?;
        bytes.push(b'\n');
    }
    Ok(Artifact {
        bytes,
        content_type: "application/x-ndjson",
        filename: "batch.ndjson".to_string(),
    })
}

impl Synthesizer {
    /// [`Synthesizer::speak`] packaged as a WAV artifact in the configured encoding.
    pub fn speak_artifact(&self, request: &SpeechRequest) -> Result<Artifact> {
        let result = self.speak(request)?;
        speech_artifact(&result, self.config().wav_encoding)
    }

    /// [`Synthesizer::batch_speak`] packaged in `format`.
    pub fn batch_speak_artifact(
        &self,
        items: Vec<BatchItem>,
        format: ReturnFormat,
    ) -> Result<Artifact> {
        let outcomes = self.batch_speak(items)?;
        batch_artifact(&outcomes, format, self.config().wav_encoding)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Read;

    use zip::ZipArchive;

    use super::*;
    use crate::audio::OUTPUT_SAMPLE_RATE;

    fn result(secs: f32) -> SynthesisResult {
        let n = (OUTPUT_SAMPLE_RATE as f32 * secs) as usize;
        SynthesisResult {
            samples: (0..n).map(|i| 0.5 * ((i as f32) * 0.05).sin()).collect(),
            sample_rate: OUTPUT_SAMPLE_RATE,
            peak_dbfs: -6.0,
            trailing_silence_ms: 0.0,
        }
    }

    fn outcomes() -> Vec<BatchOutcome> {
        vec![
            BatchOutcome {
                id: "first".to_string(),
                outcome: ItemOutcome::Success(result(0.5)),
            },
            BatchOutcome {
                id: "1".to_string(),
                outcome: ItemOutcome::Failure(ItemFailure {
                    kind: ErrorKind::ValidationError,
                    message: "Invalid request: text is required".to_string(),
                }),
            },
            BatchOutcome {
                id: "third".to_string(),
                outcome: ItemOutcome::Success(result(0.25)),
            },
        ]
    }

    #[test]
    fn speech_artifact_is_a_wav() {
        let artifact = speech_artifact(&result(0.1), WavEncoding::Pcm16).unwrap();
        assert_eq!(artifact.content_type, "audio/wav");
        assert_eq!(artifact.filename, "speech.wav");
        let reader = hound::WavReader::new(Cursor::new(artifact.bytes)).unwrap();
        assert_eq!(reader.spec().sample_rate, 24_000);
        assert_eq!(reader.spec().bits_per_sample, 16);
        assert_eq!(reader.len(), 2_400);
    }

    #[test]
    fn zip_holds_successes_then_manifest() {
        let artifact = batch_artifact(&outcomes(), ReturnFormat::Zip, WavEncoding::Pcm16).unwrap();
        assert_eq!(artifact.content_type, "application/zip");

        let mut archive = ZipArchive::new(Cursor::new(artifact.bytes)).unwrap();
        let names: Vec<String> = (0..archive.len())
            .map(|i| archive.by_index(i).unwrap().name().to_string())
            .collect();
        assert_eq!(names, ["first.wav", "third.wav", "manifest.json"]);

        let mut manifest = String::new();
        archive
            .by_name(MANIFEST_NAME)
            .unwrap()
            .read_to_string(&mut manifest)
            .unwrap();
        let manifest: serde_json::Value = serde_json::from_str(&manifest).unwrap();
        assert_eq!(manifest["total"], 3);
        assert_eq!(manifest["succeeded"], 2);

        let items = manifest["items"].as_array().unwrap();
        assert_eq!(items[0]["status"], "success");
        assert_eq!(items[0]["file"], "first.wav");
        assert_eq!(items[1]["status"], "error");
        assert_eq!(items[1]["error"]["kind"], "validation_error");
        assert!(items[1].get("file").is_none());
        assert_eq!(items[2]["id"], "third");

        let mut wav = Vec::new();
        archive
            .by_name("third.wav")
            .unwrap()
            .read_to_end(&mut wav)
            .unwrap();
        let reader = hound::WavReader::new(Cursor::new(wav)).unwrap();
        assert_eq!(reader.len(), 6_000);
    }

    #[test]
    fn ndjson_has_one_line_per_item() {
        let artifact =
            batch_artifact(&outcomes(), ReturnFormat::Ndjson, WavEncoding::Float32).unwrap();
        assert_eq!(artifact.content_type, "application/x-ndjson");

        let text = String::from_utf8(artifact.bytes).unwrap();
        let lines: Vec<serde_json::Value> = text
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0]["id"], "first");
        assert_eq!(lines[0]["sample_rate"], 24_000);
        assert!(lines[1].get("audio_base64").is_none());
        assert_eq!(lines[1]["error"]["kind"], "validation_error");

        let wav = STANDARD
            .decode(lines[2]["audio_base64"].as_str().unwrap())
            .unwrap();
        let reader = hound::WavReader::new(Cursor::new(wav)).unwrap();
        assert_eq!(reader.spec().sample_format, hound::SampleFormat::Float);
        assert_eq!(reader.len(), 6_000);
    }

    #[test]
    fn return_format_accepts_json_alias() {
        let format: ReturnFormat = serde_json::from_str("\"json\"").unwrap();
        assert_eq!(format, ReturnFormat::Ndjson);
        assert_eq!(ReturnFormat::default(), ReturnFormat::Zip);
    }

    #[test]
    fn error_envelope_carries_kind_and_status() {
        let err = TtsError::Timeout {
            waited: std::time::Duration::from_millis(1500),
        };
        let json = serde_json::to_value(ErrorEnvelope::from(&err)).unwrap();
        assert_eq!(json["error"]["kind"], "timeout");
        assert_eq!(json["error"]["status"], 504);
        assert!(json["error"]["message"].as_str().unwrap().contains("1500ms"));
    }
}
