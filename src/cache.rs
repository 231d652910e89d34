//! Content-addressed cache of finished results.
//!
//! A key covers everything that shapes the audio: the normalized text, the
//! language, the engine that will speak it and the identity of every
//! reference recording (path, size and modification time). Editing or
//! replacing a reference file therefore misses the cache.

use std::fs;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::UNIX_EPOCH;

use lru::LruCache;
use parking_lot::Mutex;
use xxhash_rust::xxh3::xxh3_128;

use crate::text::NormalizedText;
use crate::voices::VoiceReference;
use crate::SynthesisResult;

/// Bounded LRU of post-processed results, keyed by [`ResultCache::key`].
pub struct ResultCache {
    entries: Mutex<LruCache<String, Arc<SynthesisResult>>>,
}

impl ResultCache {
    /// `None` when `capacity` is zero, which disables caching.
    pub fn new(capacity: usize) -> Option<Self> {
        let capacity = NonZeroUsize::new(capacity)?;
        Some(Self {
            entries: Mutex::new(LruCache::new(capacity)),
        })
    }

    pub fn key(
        text: &NormalizedText,
        language: &str,
        engine: &str,
        references: &[VoiceReference],
    ) -> String {
        let mut s = String::new();
        s.push_str(engine);
        s.push('|');
        s.push_str(&language.to_ascii_lowercase());
        s.push('|');
        s.push_str(text.as_str());
        for reference in references {
            s.push('|');
            s.push_str(&reference.path.to_string_lossy());
            if let Ok(meta) = fs::metadata(&reference.path) {
                let modified = meta
                    .modified()
                    .ok()
                    .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                    .map(|d| d.as_nanos())
                    .unwrap_or_default();
                s.push_str(&format!(":{}:{modified}", meta.len()));
            }
        }
        let hash = xxh3_128(s.as_bytes());
        format!("{hash:032x}")
    }

    pub fn get(&self, key: &str) -> Option<Arc<SynthesisResult>> {
        self.entries.lock().get(key).cloned()
    }

    pub fn insert(&self, key: String, result: SynthesisResult) -> Arc<SynthesisResult> {
        let result = Arc::new(result);
        self.entries.lock().put(key, Arc::clone(&result));
        result
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use std::path::{Path, PathBuf};

    use super::*;
    use crate::text::normalize;

    fn result(value: f32) -> SynthesisResult {
        SynthesisResult {
            samples: vec![value; 240],
            sample_rate: 24_000,
            peak_dbfs: -6.0,
            trailing_silence_ms: 0.0,
        }
    }

    fn reference(path: &Path) -> VoiceReference {
        VoiceReference {
            path: path.to_path_buf(),
            sample_rate: 16_000,
            channels: 1,
            duration: std::time::Duration::from_secs(6),
        }
    }

    #[test]
    fn zero_capacity_disables_the_cache() {
        assert!(ResultCache::new(0).is_none());
    }

    #[test]
    fn keys_are_hex_and_depend_on_every_part() {
        let text = normalize("How you dey?");
        let refs = [reference(&PathBuf::from("/voices/a.wav"))];
        let base = ResultCache::key(&text, "en", "formant", &refs);
        assert_eq!(base.len(), 32);
        assert!(base.bytes().all(|b| b.is_ascii_hexdigit()));

        assert_eq!(base, ResultCache::key(&text, "EN", "formant", &refs));
        assert_ne!(base, ResultCache::key(&text, "pcm", "formant", &refs));
        assert_ne!(base, ResultCache::key(&text, "en", "onnx-clone", &refs));
        assert_ne!(base, ResultCache::key(&normalize("Abeg"), "en", "formant", &refs));
        assert_ne!(base, ResultCache::key(&text, "en", "formant", &[]));
    }

    #[test]
    fn rewriting_a_reference_changes_the_key() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lexi.wav");
        std::fs::write(&path, [0u8; 16]).unwrap();
        let text = normalize("How you dey?");
        let before = ResultCache::key(&text, "en", "formant", &[reference(&path)]);

        std::fs::write(&path, [0u8; 32]).unwrap();
        let after = ResultCache::key(&text, "en", "formant", &[reference(&path)]);
        assert_ne!(before, after);
    }

    #[test]
    fn evicts_least_recently_used() {
        let cache = ResultCache::new(2).unwrap();
        cache.insert("a".into(), result(0.1));
        cache.insert("b".into(), result(0.2));
        assert!(cache.get("a").is_some());
        cache.insert("c".into(), result(0.3));

        assert_eq!(cache.len(), 2);
        assert!(cache.get("b").is_none());
        assert_eq!(cache.get("a").unwrap().samples[0], 0.1);

        cache.clear();
        assert!(cache.is_empty());
    }
}
