use std::path::{Path, PathBuf};
use std::time::Instant;

use naija_tts::{
    engines::formant::FormantEngine, BatchItem, EngineState, ReturnFormat, ServiceConfig,
    SpeechRequest, SynthesisEngine, Synthesizer,
};

/// ONNX cloning model when built with `--features onnx` and `NAIJA_MODEL_DIR` is set,
/// the formant fallback otherwise.
fn engine() -> Result<Box<dyn SynthesisEngine>, Box<dyn std::error::Error>> {
    #[cfg(feature = "onnx")]
    {
        if let Ok(dir) = std::env::var("NAIJA_MODEL_DIR") {
            use naija_tts::engines::onnx::{OnnxCloneEngine, OnnxModelParams};

            let load_start = Instant::now();
            let engine = OnnxCloneEngine::load(Path::new(&dir), OnnxModelParams::default())?;
            println!("Model loaded in {:.2?}", load_start.elapsed());
            return Ok(Box::new(engine));
        }
    }
    Ok(Box::new(FormantEngine::new()))
}

/// Routes Pidgin to a single-speaker MMS export when `NAIJA_MMS_DIR` is set.
fn engines() -> Result<EngineState, Box<dyn std::error::Error>> {
    let state = EngineState::single(engine()?);
    #[cfg(feature = "onnx")]
    {
        if let Ok(dir) = std::env::var("NAIJA_MMS_DIR") {
            use naija_tts::engines::onnx::{OnnxCloneEngine, OnnxModelParams};

            let mms: Box<dyn SynthesisEngine> =
                Box::new(OnnxCloneEngine::load(Path::new(&dir), OnnxModelParams::default())?);
            return Ok(state.route(&["pcm"], vec![mms])?);
        }
    }
    Ok(state)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = ServiceConfig::load(config_path.as_deref())?;
    let synth = Synthesizer::new(config, engines()?)?;
    println!("Health: {}", serde_json::to_string(&synth.health())?);
    match synth.voices() {
        Ok(voices) => println!("Voices: {}", serde_json::to_string(&voices)?),
        Err(e) => println!("Voices unavailable: {e}"),
    }

    let out_dir = Path::new("output");
    std::fs::create_dir_all(out_dir)?;

    let text = "How you dey? Today go sweet well-well! Abeg, make we waka small small.";
    let synth_start = Instant::now();
    let result = synth.speak(&SpeechRequest::new(text))?;
    let synth_dur = synth_start.elapsed();

    let audio_duration = result.duration_secs();
    println!(
        "Synthesized {:.2}s audio in {:.2?} ({:.1}x real-time), peak {:.2} dBFS",
        audio_duration,
        synth_dur,
        audio_duration / synth_dur.as_secs_f64(),
        result.peak_dbfs
    );
    result.write_wav(&out_dir.join("speech.wav"))?;
    println!("Saved to output/speech.wav");

    let pidgin = SpeechRequest::new("Abeg, wetin una dey chop?").with_language("pcm");
    let pidgin = synth.speak(&pidgin)?;
    pidgin.write_wav(&out_dir.join("pidgin.wav"))?;
    println!("Saved to output/pidgin.wav");

    let items = vec![
        BatchItem::with_id("greeting", SpeechRequest::new("Good morning o! How your side?")),
        BatchItem::with_id("market", SpeechRequest::new("Wetin dey happen for market today?")),
        BatchItem::with_id("empty", SpeechRequest::new("")),
    ];
    for format in [ReturnFormat::Zip, ReturnFormat::Ndjson] {
        let artifact = synth.batch_speak_artifact(items.clone(), format)?;
        let path = artifact.write_to(out_dir)?;
        println!("Saved {} ({} bytes)", path.display(), artifact.bytes.len());
    }
    println!("Stats: {}", serde_json::to_string(&synth.stats())?);

    Ok(())
}
