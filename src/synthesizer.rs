//! Single-request synthesis and the device discipline around the engines.
//!
//! [`EngineState`] owns one engine per physical device together with a pool
//! of free devices. A request leases a device right before generation and
//! hands it back right after, so at most one generation is ever in flight
//! per device. Leasing waits at most `lock_timeout`; a request that cannot
//! get a device in time fails with [`TtsError::Timeout`] without touching
//! the model.
//!
//! Validation, normalization, voice resolution and post-processing all run
//! outside the lease. Requests in a routed language (for example Pidgin on an
//! MMS checkpoint) go to that route's engine on the leased device; finished
//! results are kept in a content-addressed [`ResultCache`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use serde::Serialize;

use crate::audio::postprocess;
use crate::cache::ResultCache;
use crate::config::{ServiceConfig, FALLBACK_LANGUAGE, MMS_LANGUAGES};
use crate::error::{Result, TtsError};
use crate::request::SpeechRequest;
use crate::text::{normalize, NormalizedText};
use crate::voices::{VoiceInfo, VoiceReference, VoiceResolver};
use crate::{Device, RawAudio, SynthesisEngine, SynthesisResult};

/// What is known about an engine without locking it.
struct EngineInfo {
    name: String,
    loaded: bool,
    native_rate: u32,
    clones_voice: bool,
}

impl EngineInfo {
    fn of(engine: &dyn SynthesisEngine) -> Self {
        Self {
            name: engine.name().to_string(),
            loaded: engine.is_loaded(),
            native_rate: engine.native_sample_rate(),
            clones_voice: engine.clones_voice(),
        }
    }
}

/// Engines resident on one device. Index 0 is the primary engine, the rest
/// follow [`EngineState::route`] order.
struct DeviceSlot {
    device: Device,
    info: Vec<EngineInfo>,
    engines: Mutex<Vec<Box<dyn SynthesisEngine>>>,
}

impl DeviceSlot {
    fn new(engine: Box<dyn SynthesisEngine>) -> Self {
        Self {
            device: engine.device(),
            info: vec![EngineInfo::of(engine.as_ref())],
            engines: Mutex::new(vec![engine]),
        }
    }
}

/// Process-wide engine handles, one set per device, plus the pool of free
/// devices.
///
/// Every device carries the same engines: a primary engine and, optionally,
/// engines routed by language. Leasing a device grants exclusive use of all
/// of them. Device kind and load status are captured once at construction
/// and never re-probed.
pub struct EngineState {
    slots: Vec<DeviceSlot>,
    /// Languages of each routed engine, in slot order after the primary.
    routes: Vec<Vec<String>>,
    free: Mutex<Vec<usize>>,
    available: Condvar,
}

impl EngineState {
    /// One engine per device. At least one engine is required.
    pub fn new(engines: Vec<Box<dyn SynthesisEngine>>) -> Result<Self> {
        if engines.is_empty() {
            return Err(TtsError::configuration("at least one engine is required"));
        }

        let slots: Vec<DeviceSlot> = engines.into_iter().map(DeviceSlot::new).collect();
        for (i, slot) in slots.iter().enumerate() {
            let info = &slot.info[0];
            log::info!(
                "Device {i}: engine '{}' on {} at {} Hz (loaded: {})",
                info.name,
                slot.device,
                info.native_rate,
                info.loaded
            );
        }
        Ok(Self::from_slots(slots))
    }

    pub fn single(engine: Box<dyn SynthesisEngine>) -> Self {
        let slot = DeviceSlot::new(engine);
        let info = &slot.info[0];
        log::info!(
            "Engine '{}' on {} at {} Hz (loaded: {})",
            info.name,
            slot.device,
            info.native_rate,
            info.loaded
        );
        Self::from_slots(vec![slot])
    }

    fn from_slots(slots: Vec<DeviceSlot>) -> Self {
        // Popped from the back, so device 0 is handed out first.
        let free = (0..slots.len()).rev().collect();
        Self {
            slots,
            routes: Vec::new(),
            free: Mutex::new(free),
            available: Condvar::new(),
        }
    }

    /// Send requests in `languages` to `engines`, one engine per device in
    /// device order. Languages already routed keep their first engine.
    pub fn route(
        mut self,
        languages: &[&str],
        engines: Vec<Box<dyn SynthesisEngine>>,
    ) -> Result<Self> {
        if languages.is_empty() {
            return Err(TtsError::configuration("a route needs at least one language"));
        }
        if engines.len() != self.slots.len() {
            return Err(TtsError::configuration(format!(
                "a route needs one engine per device: {} devices, {} engines",
                self.slots.len(),
                engines.len()
            )));
        }

        for (i, (slot, engine)) in self.slots.iter_mut().zip(engines).enumerate() {
            let info = EngineInfo::of(engine.as_ref());
            log::info!(
                "Device {i}: routing {languages:?} to '{}' at {} Hz (loaded: {}, clones voice: {})",
                info.name,
                info.native_rate,
                info.loaded,
                info.clones_voice
            );
            slot.info.push(info);
            slot.engines.get_mut().push(engine);
        }
        self.routes
            .push(languages.iter().map(|l| l.to_ascii_lowercase()).collect());
        Ok(self)
    }

    /// Engine index serving `language`, if a route claims it.
    fn routed_engine(&self, language: &str) -> Option<usize> {
        let language = language.to_ascii_lowercase();
        self.routes
            .iter()
            .position(|languages| languages.contains(&language))
            .map(|r| r + 1)
    }

    pub fn routes_language(&self, language: &str) -> bool {
        self.routed_engine(language).is_some()
    }

    /// Every routed language, in route order.
    pub fn routed_languages(&self) -> Vec<String> {
        self.routes.iter().flatten().cloned().collect()
    }

    fn info(&self, engine: usize) -> &EngineInfo {
        &self.slots[0].info[engine]
    }

    pub fn device_count(&self) -> usize {
        self.slots.len()
    }

    /// Device of the first engine, reported by health checks.
    pub fn primary_device(&self) -> Device {
        self.slots[0].device
    }

    pub fn engine_name(&self) -> &str {
        &self.info(0).name
    }

    pub fn all_loaded(&self) -> bool {
        self.slots
            .iter()
            .flat_map(|s| s.info.iter())
            .all(|info| info.loaded)
    }

    /// Wait up to `timeout` for a free device.
    fn lease(&self, timeout: Duration) -> Result<DeviceLease<'_>> {
        let started = Instant::now();
        let deadline = started + timeout;
        let mut free = self.free.lock();

        loop {
            if let Some(index) = free.pop() {
                let waited = started.elapsed();
                log::debug!(
                    "Leased device {index} ({}) after waiting {waited:?}",
                    self.slots[index].device
                );
                return Ok(DeviceLease {
                    state: self,
                    index,
                    acquired_at: Instant::now(),
                });
            }
            if self.available.wait_until(&mut free, deadline).timed_out() && free.is_empty() {
                let waited = started.elapsed();
                log::warn!("No device free after {waited:?}");
                return Err(TtsError::Timeout { waited });
            }
        }
    }

    fn release(&self, index: usize) {
        self.free.lock().push(index);
        self.available.notify_one();
    }
}

/// Exclusive use of one device. Returned to the pool on drop, including
/// when generation fails or panics.
struct DeviceLease<'a> {
    state: &'a EngineState,
    index: usize,
    acquired_at: Instant,
}

impl DeviceLease<'_> {
    fn generate(
        &self,
        engine: usize,
        text: &str,
        language: &str,
        references: &[VoiceReference],
    ) -> Result<RawAudio> {
        let slot = &self.state.slots[self.index];
        let name = &slot.info[engine].name;
        // Uncontended: the lease already grants exclusive use of this slot.
        let mut engines = slot.engines.lock();
        let raw = engines[engine]
            .synthesize(text, language, references)
            .map_err(|e| TtsError::Engine(format!("{name}: {e}")))?;
        if raw.sample_rate == 0 {
            return Err(TtsError::Engine(format!(
                "{name}: returned audio with a zero sample rate"
            )));
        }
        Ok(raw)
    }
}

impl Drop for DeviceLease<'_> {
    fn drop(&mut self) {
        log::debug!(
            "Released device {} after {:?}",
            self.index,
            self.acquired_at.elapsed()
        );
        self.state.release(self.index);
    }
}

/// Running totals since the synthesizer was created. Batch items count
/// individually. `timeouts` is a subset of `errors`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SynthesisStats {
    pub requests: u64,
    pub successes: u64,
    pub errors: u64,
    pub timeouts: u64,
    pub cache_hits: u64,
}

#[derive(Default)]
struct Counters {
    requests: AtomicU64,
    successes: AtomicU64,
    errors: AtomicU64,
    timeouts: AtomicU64,
    cache_hits: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> SynthesisStats {
        SynthesisStats {
            requests: self.requests.load(Ordering::Relaxed),
            successes: self.successes.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
        }
    }
}

/// Liveness report for a transport's health endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Health {
    pub engine_loaded: bool,
    pub device: String,
    pub voice_dir_exists: bool,
    pub engine: String,
    pub devices: usize,
    pub routed_languages: Vec<String>,
    pub cached_results: usize,
    pub stats: SynthesisStats,
}

/// Engine and language a request will be spoken with.
struct Plan {
    engine: usize,
    language: String,
}

/// Orchestrates one request end to end. Shared by single and batch calls.
pub struct Synthesizer {
    config: ServiceConfig,
    resolver: VoiceResolver,
    engines: EngineState,
    cache: Option<ResultCache>,
    counters: Counters,
}

impl Synthesizer {
    pub fn new(config: ServiceConfig, engines: EngineState) -> Result<Self> {
        config.validate()?;
        let resolver = VoiceResolver::from_config(&config);
        let cache = ResultCache::new(config.cache_entries);
        Ok(Self {
            config,
            resolver,
            engines,
            cache,
            counters: Counters::default(),
        })
    }

    pub fn with_engine(config: ServiceConfig, engine: Box<dyn SynthesisEngine>) -> Result<Self> {
        Self::new(config, EngineState::single(engine))
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn engines(&self) -> &EngineState {
        &self.engines
    }

    /// Synthesize one request.
    pub fn speak(&self, request: &SpeechRequest) -> Result<SynthesisResult> {
        Counters::bump(&self.counters.requests);
        let outcome = self.speak_uncounted(request);
        match &outcome {
            Ok(_) => Counters::bump(&self.counters.successes),
            Err(e) => {
                Counters::bump(&self.counters.errors);
                if matches!(e, TtsError::Timeout { .. }) {
                    Counters::bump(&self.counters.timeouts);
                }
            }
        }
        outcome
    }

    /// Count a request that unwound instead of returning.
    pub(crate) fn record_panic(&self) {
        Counters::bump(&self.counters.errors);
    }

    fn speak_uncounted(&self, request: &SpeechRequest) -> Result<SynthesisResult> {
        let started = Instant::now();
        let text = self.validate(request)?;
        let plan = self.plan(&request.language);
        let info = self.engines.info(plan.engine);

        let references = if info.clones_voice {
            self.resolver.resolve(&request.speaker_references)?
        } else {
            if !request.speaker_references.is_empty() {
                log::debug!(
                    "Engine '{}' speaks in its own voice; ignoring {} reference(s)",
                    info.name,
                    request.speaker_references.len()
                );
            }
            Vec::new()
        };

        let key = self
            .cache
            .as_ref()
            .map(|_| ResultCache::key(&text, &plan.language, &info.name, &references));
        if let (Some(cache), Some(key)) = (&self.cache, &key) {
            if let Some(hit) = cache.get(key) {
                Counters::bump(&self.counters.cache_hits);
                log::debug!("Cache hit for {:?}", text.as_str());
                return Ok(SynthesisResult::clone(&hit));
            }
        }

        let raw = {
            let lease = self.engines.lease(self.config.lock_timeout())?;
            lease.generate(plan.engine, text.as_str(), &plan.language, &references)?
        };
        let result = postprocess(raw)?;

        log::info!(
            "Synthesized {} chars ({}, '{}') into {:.2}s of audio in {:?}",
            text.char_count(),
            plan.language,
            info.name,
            result.duration_secs(),
            started.elapsed()
        );
        if let (Some(cache), Some(key)) = (&self.cache, key) {
            cache.insert(key, result.clone());
        }
        Ok(result)
    }

    /// Pick the engine for `language`. Nigerian languages without a routed
    /// engine are spoken by the primary engine in English.
    fn plan(&self, language: &str) -> Plan {
        if let Some(engine) = self.engines.routed_engine(language) {
            return Plan {
                engine,
                language: language.to_ascii_lowercase(),
            };
        }
        if MMS_LANGUAGES.iter().any(|l| l.eq_ignore_ascii_case(language)) {
            log::warn!(
                "No engine routed for {language:?}; speaking it with '{}' in {FALLBACK_LANGUAGE:?}",
                self.engines.engine_name()
            );
            return Plan {
                engine: 0,
                language: FALLBACK_LANGUAGE.to_string(),
            };
        }
        Plan {
            engine: 0,
            language: language.to_string(),
        }
    }

    /// Check request shape and limits, returning the normalized text.
    fn validate(&self, request: &SpeechRequest) -> Result<NormalizedText> {
        let trimmed = request.text.trim();
        if trimmed.is_empty() {
            return Err(TtsError::validation("text is required"));
        }
        let chars = trimmed.chars().count();
        if chars > self.config.max_text_chars {
            return Err(TtsError::validation(format!(
                "text is {chars} characters, the limit is {}",
                self.config.max_text_chars
            )));
        }
        if !self.config.supports_language(&request.language)
            && !self.engines.routes_language(&request.language)
        {
            return Err(TtsError::validation(format!(
                "unsupported language {:?}",
                request.language
            )));
        }

        let text = normalize(trimmed);
        if !text.is_speakable() {
            return Err(TtsError::validation("text has nothing to speak"));
        }
        log::debug!("Normalized {:?} -> {:?}", trimmed, text.as_str());
        Ok(text)
    }

    /// WAV files in the voice directory and whether each can be cloned.
    pub fn voices(&self) -> Result<Vec<VoiceInfo>> {
        self.resolver.list_voices()
    }

    pub fn stats(&self) -> SynthesisStats {
        self.counters.snapshot()
    }

    pub fn health(&self) -> Health {
        Health {
            engine_loaded: self.engines.all_loaded(),
            device: self.engines.primary_device().to_string(),
            voice_dir_exists: self.resolver.fallback_dir().is_dir(),
            engine: self.engines.engine_name().to_string(),
            devices: self.engines.device_count(),
            routed_languages: self.engines.routed_languages(),
            cached_results: self.cache.as_ref().map_or(0, ResultCache::len),
            stats: self.stats(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    use super::*;
    use crate::engines::formant::FormantEngine;
    use crate::EngineFailure;

    struct FailingEngine;

    impl SynthesisEngine for FailingEngine {
        fn name(&self) -> &str {
            "failing"
        }

        fn native_sample_rate(&self) -> u32 {
            24_000
        }

        fn synthesize(
            &mut self,
            _text: &str,
            _language: &str,
            _references: &[VoiceReference],
        ) -> std::result::Result<RawAudio, EngineFailure> {
            Err("could not parse reference audio".into())
        }
    }

    struct CountingEngine(Arc<AtomicUsize>);

    impl SynthesisEngine for CountingEngine {
        fn name(&self) -> &str {
            "counting"
        }

        fn native_sample_rate(&self) -> u32 {
            24_000
        }

        fn synthesize(
            &mut self,
            _text: &str,
            _language: &str,
            _references: &[VoiceReference],
        ) -> std::result::Result<RawAudio, EngineFailure> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(RawAudio {
                samples: vec![0.5; 2_400],
                sample_rate: 24_000,
            })
        }
    }

    /// Records the language and reference count of every call.
    struct RecordingEngine {
        name: &'static str,
        clones: bool,
        calls: Arc<Mutex<Vec<(String, usize)>>>,
    }

    impl RecordingEngine {
        fn boxed(
            name: &'static str,
            clones: bool,
            calls: &Arc<Mutex<Vec<(String, usize)>>>,
        ) -> Box<dyn SynthesisEngine> {
            Box::new(Self {
                name,
                clones,
                calls: Arc::clone(calls),
            })
        }
    }

    impl SynthesisEngine for RecordingEngine {
        fn name(&self) -> &str {
            self.name
        }

        fn native_sample_rate(&self) -> u32 {
            16_000
        }

        fn clones_voice(&self) -> bool {
            self.clones
        }

        fn synthesize(
            &mut self,
            _text: &str,
            language: &str,
            references: &[VoiceReference],
        ) -> std::result::Result<RawAudio, EngineFailure> {
            self.calls
                .lock()
                .push((language.to_string(), references.len()));
            Ok(RawAudio {
                samples: vec![0.3; 1_600],
                sample_rate: 16_000,
            })
        }
    }

    fn write_voice(dir: &Path) {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 16_000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(dir.join("lexi.wav"), spec).unwrap();
        for i in 0..16_000 * 6 {
            writer.write_sample(((i % 64) as i16 - 32) * 300).unwrap();
        }
        writer.finalize().unwrap();
    }

    fn config(dir: &Path) -> ServiceConfig {
        ServiceConfig::builder()
            .voice_dir(dir)
            .lock_timeout_ms(200u64)
            .build()
            .unwrap()
    }

    #[test]
    fn speak_produces_compliant_audio() {
        let dir = tempfile::tempdir().unwrap();
        write_voice(dir.path());
        let synth = Synthesizer::with_engine(
            config(dir.path()),
            Box::new(FormantEngine::new().with_gain(8.0)),
        )
        .unwrap();

        let result = synth
            .speak(&SpeechRequest::new("Today go sweet well-well!"))
            .unwrap();
        assert_eq!(result.sample_rate, 24_000);
        assert!(result.peak_dbfs <= -1.0);
        assert!(result.trailing_silence_ms <= 200.0);
    }

    #[test]
    fn engine_failures_surface_as_engine_errors() {
        let dir = tempfile::tempdir().unwrap();
        write_voice(dir.path());
        let synth = Synthesizer::with_engine(config(dir.path()), Box::new(FailingEngine)).unwrap();

        let err = synth.speak(&SpeechRequest::new("How you dey?")).unwrap_err();
        assert!(matches!(err, TtsError::Engine(ref m) if m.contains("reference audio")));

        // The device went back to the pool.
        let err = synth.speak(&SpeechRequest::new("How you dey?")).unwrap_err();
        assert!(matches!(err, TtsError::Engine(_)));
    }

    #[test]
    fn invalid_requests_never_reach_the_engine() {
        let dir = tempfile::tempdir().unwrap();
        write_voice(dir.path());
        let calls = Arc::new(AtomicUsize::new(0));
        let synth = Synthesizer::with_engine(
            config(dir.path()),
            Box::new(CountingEngine(calls.clone())),
        )
        .unwrap();

        for request in [
            SpeechRequest::new(""),
            SpeechRequest::new("   "),
            SpeechRequest::new("a".repeat(501)),
            SpeechRequest::new("How you dey?").with_language("xx"),
            SpeechRequest::new("?!"),
        ] {
            let err = synth.speak(&request).unwrap_err();
            assert!(matches!(err, TtsError::Validation(_)), "{request:?}: {err}");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        synth.speak(&SpeechRequest::new("a".repeat(500))).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn lease_times_out_when_every_device_is_busy() {
        let state = EngineState::single(Box::new(FormantEngine::new()));
        let held = state.lease(Duration::from_millis(10)).unwrap();

        let started = Instant::now();
        let err = state.lease(Duration::from_millis(50)).err().unwrap();
        assert!(matches!(err, TtsError::Timeout { .. }));
        assert!(started.elapsed() >= Duration::from_millis(50));

        drop(held);
        assert!(state.lease(Duration::from_millis(10)).is_ok());
    }

    #[test]
    fn pool_hands_out_distinct_devices() {
        let state = EngineState::new(vec![
            Box::new(FormantEngine::new()),
            Box::new(FormantEngine::new()),
        ])
        .unwrap();
        let a = state.lease(Duration::from_millis(10)).unwrap();
        let b = state.lease(Duration::from_millis(10)).unwrap();
        assert_ne!(a.index, b.index);
        assert!(state.lease(Duration::from_millis(10)).is_err());
    }

    #[test]
    fn empty_engine_list_is_rejected() {
        assert!(matches!(
            EngineState::new(Vec::new()),
            Err(TtsError::Configuration(_))
        ));
    }

    #[test]
    fn health_reports_engine_and_voice_dir() {
        let dir = tempfile::tempdir().unwrap();
        let synth =
            Synthesizer::with_engine(config(dir.path()), Box::new(FormantEngine::new())).unwrap();
        let health = synth.health();
        assert!(health.engine_loaded);
        assert_eq!(health.device, "cpu");
        assert!(health.voice_dir_exists);
        assert_eq!(health.engine, "formant");

        let synth = Synthesizer::with_engine(
            config(&dir.path().join("missing")),
            Box::new(FormantEngine::new()),
        )
        .unwrap();
        assert!(!synth.health().voice_dir_exists);
    }

    #[test]
    fn nigerian_languages_follow_their_route() {
        // No voices on disk: the routed engine does not need any.
        let dir = tempfile::tempdir().unwrap();
        let primary = Arc::new(Mutex::new(Vec::new()));
        let mms = Arc::new(Mutex::new(Vec::new()));
        let engines = EngineState::single(RecordingEngine::boxed("xtts", true, &primary))
            .route(&["pcm", "yor"], vec![RecordingEngine::boxed("mms", false, &mms)])
            .unwrap();
        let synth = Synthesizer::new(config(dir.path()), engines).unwrap();

        let result = synth
            .speak(&SpeechRequest::new("How you dey?").with_language("PCM"))
            .unwrap();
        assert_eq!(result.sample_rate, 24_000);
        synth
            .speak(&SpeechRequest::new("Ẹ kú àárọ̀").with_language("yor"))
            .unwrap();
        assert_eq!(
            *mms.lock(),
            vec![("pcm".to_string(), 0), ("yor".to_string(), 0)]
        );
        assert!(primary.lock().is_empty());

        // English still needs the cloning engine and its voices.
        let err = synth.speak(&SpeechRequest::new("Good morning")).unwrap_err();
        assert!(matches!(err, TtsError::Configuration(_)), "{err}");

        let health = synth.health();
        assert_eq!(health.routed_languages, ["pcm", "yor"]);
        assert_eq!(health.engine, "xtts");
    }

    #[test]
    fn unrouted_nigerian_language_is_spoken_in_english() {
        let dir = tempfile::tempdir().unwrap();
        write_voice(dir.path());
        let calls = Arc::new(Mutex::new(Vec::new()));
        let synth = Synthesizer::with_engine(
            config(dir.path()),
            RecordingEngine::boxed("xtts", true, &calls),
        )
        .unwrap();

        synth
            .speak(&SpeechRequest::new("Wetin dey happen?").with_language("pcm"))
            .unwrap();
        synth
            .speak(&SpeechRequest::new("Sannu da zuwa").with_language("hau"))
            .unwrap();
        assert_eq!(
            *calls.lock(),
            vec![("en".to_string(), 1), ("en".to_string(), 1)]
        );
    }

    #[test]
    fn route_needs_one_engine_per_device() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let state = EngineState::new(vec![
            Box::new(FormantEngine::new()),
            Box::new(FormantEngine::new()),
        ])
        .unwrap();
        let err = state
            .route(&["pcm"], vec![RecordingEngine::boxed("mms", false, &calls)])
            .err()
            .unwrap();
        assert!(matches!(err, TtsError::Configuration(_)));

        let state = EngineState::single(Box::new(FormantEngine::new()));
        let engines: Vec<Box<dyn SynthesisEngine>> = vec![Box::new(FormantEngine::new())];
        assert!(state.route(&[], engines).is_err());
    }

    #[test]
    fn repeated_requests_are_served_from_cache_and_counted() {
        let dir = tempfile::tempdir().unwrap();
        write_voice(dir.path());
        let calls = Arc::new(AtomicUsize::new(0));
        let synth = Synthesizer::with_engine(
            config(dir.path()),
            Box::new(CountingEngine(calls.clone())),
        )
        .unwrap();

        let first = synth.speak(&SpeechRequest::new("How you dey?")).unwrap();
        let second = synth.speak(&SpeechRequest::new("How  you dey?")).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(first.samples, second.samples);

        synth.speak(&SpeechRequest::new("How you dey?").with_language("fr")).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        synth.speak(&SpeechRequest::new("")).unwrap_err();

        let stats = synth.stats();
        assert_eq!(
            stats,
            SynthesisStats {
                requests: 4,
                successes: 3,
                errors: 1,
                timeouts: 0,
                cache_hits: 1,
            }
        );
        let health = synth.health();
        assert_eq!(health.cached_results, 2);
        assert_eq!(health.stats, stats);
    }

    #[test]
    fn zero_cache_entries_always_generates() {
        let dir = tempfile::tempdir().unwrap();
        write_voice(dir.path());
        let calls = Arc::new(AtomicUsize::new(0));
        let config = ServiceConfig::builder()
            .voice_dir(dir.path())
            .cache_entries(0usize)
            .build()
            .unwrap();
        let synth =
            Synthesizer::with_engine(config, Box::new(CountingEngine(calls.clone()))).unwrap();

        for _ in 0..3 {
            synth.speak(&SpeechRequest::new("How you dey?")).unwrap();
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(synth.stats().cache_hits, 0);
        assert_eq!(synth.health().cached_results, 0);
    }

    #[test]
    fn timeouts_are_counted_as_errors() {
        let dir = tempfile::tempdir().unwrap();
        write_voice(dir.path());
        let synth =
            Synthesizer::with_engine(config(dir.path()), Box::new(FormantEngine::new())).unwrap();

        let held = synth.engines.lease(Duration::from_millis(10)).unwrap();
        let err = synth.speak(&SpeechRequest::new("How you dey?")).unwrap_err();
        assert!(matches!(err, TtsError::Timeout { .. }));
        drop(held);

        let stats = synth.stats();
        assert_eq!((stats.requests, stats.errors, stats.timeouts), (1, 1, 1));
    }

    #[test]
    fn voices_lists_the_voice_dir() {
        let dir = tempfile::tempdir().unwrap();
        write_voice(dir.path());
        let synth =
            Synthesizer::with_engine(config(dir.path()), Box::new(FormantEngine::new())).unwrap();
        let voices = synth.voices().unwrap();
        assert_eq!(voices.len(), 1);
        assert_eq!(voices[0].id, "lexi");
        assert!(voices[0].usable);
    }
}
