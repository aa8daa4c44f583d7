/// Hotword listening service binary
///
/// Standalone service that listens for a keyword and records each phrase
/// spoken after it to a WAV file.

use hotword_listener::{
    AudioFormat, CaptureGate, DetectedCallback, EnergyScorer, HotwordSession, InputStream,
    PhraseRecorder, RecorderConfig, RecordingConsumer, ScorerConfig, SessionConfig,
};
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("hotword_listener=debug".parse().unwrap()),
        )
        .init();

    info!(
        "Starting hotword listening service v{}",
        hotword_listener::VERSION
    );

    let (scorer_config, recorder_config) = match load_config() {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    let format = AudioFormat::default();

    let scorer = match EnergyScorer::new(scorer_config, format) {
        Ok(scorer) => scorer,
        Err(e) => {
            error!("Failed to create scorer: {}", e);
            std::process::exit(1);
        }
    };

    let recorder = match PhraseRecorder::new(recorder_config, format) {
        Ok(recorder) => recorder,
        Err(e) => {
            error!("Failed to create recorder: {}", e);
            std::process::exit(1);
        }
    };

    let on_detected: DetectedCallback = Arc::new(|| info!("keyword detected"));
    let consumer: RecordingConsumer = Box::new(|path: &Path| {
        info!("phrase saved: {}", path.display());
    });

    let mut session = match HotwordSession::new(
        Box::new(scorer),
        recorder,
        vec![on_detected],
        Some(consumer),
        SessionConfig::default(),
    ) {
        Ok(session) => session,
        Err(e) => {
            error!("Failed to create session: {}", e);
            std::process::exit(1);
        }
    };

    // The input stream must outlive the session loop; it stops on drop.
    let _input = match InputStream::open(format, session.ring(), CaptureGate::new()) {
        Ok(stream) => stream,
        Err(e) => {
            error!("Failed to open audio input: {}", e);
            std::process::exit(1);
        }
    };

    let handle = session.handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown signal received");
            handle.cancel();
        }
    });

    info!("Listening for hotwords...");
    session.run().await;

    let stats = session.stats();
    info!(
        "Processed {} chunks, detected {} keywords",
        stats.chunks_processed, stats.keywords_detected
    );
    info!("Hotword listening service stopped");
}

/// Load configuration from environment variables.
fn load_config() -> Result<(ScorerConfig, RecorderConfig), Box<dyn std::error::Error>> {
    let model_paths: Vec<String> = std::env::var("HOTWORD_MODEL_PATHS")
        .map(|v| {
            v.split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default();

    let sensitivity = match std::env::var("HOTWORD_SENSITIVITY") {
        Ok(value) => vec![value.parse::<f32>()?],
        Err(_) => Vec::new(),
    };

    let audio_gain = std::env::var("HOTWORD_AUDIO_GAIN")
        .unwrap_or_else(|_| "1.0".to_string())
        .parse::<f32>()?;

    let scorer_config = ScorerConfig {
        model_paths,
        sensitivity,
        audio_gain,
        ..Default::default()
    };

    let mut recorder_config = RecorderConfig::default();
    if let Ok(dir) = std::env::var("HOTWORD_SAVE_DIR") {
        recorder_config.save_dir = dir.into();
    }

    Ok((scorer_config, recorder_config))
}
