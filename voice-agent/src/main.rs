//! Voice agent binary
//!
//! Wakes on a hotword, records the phrase spoken after it, transcribes
//! the recording, and answers through the configured chat backend.

use clap::Parser;
use hotword_listener::{
    CaptureGate, Chime, DetectedCallback, EnergyScorer, HotwordSession, InputStream,
    PhraseRecorder, RecordingConsumer,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use voice_agent::{AgentConfig, AsrRegistry, ChatRegistry, Conversation};

#[derive(Parser, Debug)]
#[command(version, about = "Hotword-driven voice assistant")]
struct Args {
    /// Path to the YAML config file
    #[arg(short, long, default_value = "config/config.yaml")]
    config: PathBuf,

    /// List available ASR engines and chat backends, then exit
    #[arg(long)]
    list_engines: bool,
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("voice_agent=debug".parse().unwrap())
                .add_directive("hotword_listener=debug".parse().unwrap()),
        )
        .init();

    let args = Args::parse();

    let asr_registry = AsrRegistry::builtin();
    let chat_registry = ChatRegistry::builtin();

    if args.list_engines {
        println!("ASR engines: {}", asr_registry.slugs().join(", "));
        println!("Chat backends: {}", chat_registry.slugs().join(", "));
        return;
    }

    info!("Starting voice agent v{}", voice_agent::VERSION);

    let config = if args.config.exists() {
        match AgentConfig::load(&args.config) {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to load configuration: {}", e);
                std::process::exit(1);
            }
        }
    } else {
        warn!(
            "Config file {} not found, using defaults",
            args.config.display()
        );
        AgentConfig::default()
    };

    let asr = match asr_registry.create(&config.asr) {
        Ok(asr) => asr,
        Err(e) => {
            error!("Failed to create ASR engine: {}", e);
            std::process::exit(1);
        }
    };

    let chat = match chat_registry.create(&config.chat) {
        Ok(chat) => chat,
        Err(e) => {
            error!("Failed to create chat backend: {}", e);
            std::process::exit(1);
        }
    };

    let conversation = Conversation::new(asr, chat);

    let detector = &config.detector;
    let format = detector.audio_format();

    let scorer = match EnergyScorer::new(detector.scorer_config(), format) {
        Ok(scorer) => scorer,
        Err(e) => {
            error!("Failed to create scorer: {}", e);
            std::process::exit(1);
        }
    };

    let recorder = match PhraseRecorder::new(detector.recorder_config(), format) {
        Ok(recorder) => recorder,
        Err(e) => {
            error!("Failed to create recorder: {}", e);
            std::process::exit(1);
        }
    };

    let gate = CaptureGate::new();
    let on_detected = detected_callback(detector.chime_path.as_deref(), &gate);

    // Recordings cross to the conversation task through a channel, so the
    // detection loop never waits on the network.
    let (tx, mut rx) = mpsc::unbounded_channel::<PathBuf>();
    let consumer: RecordingConsumer = Box::new(move |path: &Path| {
        if tx.send(path.to_path_buf()).is_err() {
            warn!("conversation pipeline is gone, dropping {}", path.display());
        }
    });

    let mut session = match HotwordSession::new(
        Box::new(scorer),
        recorder,
        vec![on_detected],
        Some(consumer),
        detector.session_config(),
    ) {
        Ok(session) => session,
        Err(e) => {
            error!("Failed to create session: {}", e);
            std::process::exit(1);
        }
    };

    // The input stream must outlive the session loop; it stops on drop.
    let _input = match InputStream::open(format, session.ring(), gate) {
        Ok(stream) => stream,
        Err(e) => {
            error!("Failed to open audio input: {}", e);
            std::process::exit(1);
        }
    };

    let pipeline = tokio::spawn(async move {
        while let Some(path) = rx.recv().await {
            if let Err(e) = conversation.converse(&path).await {
                error!("Conversation failed: {}", e);
            }
        }
    });

    let handle = session.handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown signal received");
            handle.cancel();
        }
    });

    info!("Listening for hotwords...");
    session.run().await;

    // Dropping the session drops the consumer, which closes the channel
    // and lets the pipeline drain and exit.
    drop(session);
    if let Err(e) = pipeline.await {
        error!("Conversation pipeline failed: {}", e);
    }

    info!("Voice agent stopped");
}

/// Build the keyword callback: play the configured chime, or just log.
///
/// Capture is muted while the chime plays so it cannot leak into the
/// phrase recording.
fn detected_callback(chime_path: Option<&Path>, gate: &CaptureGate) -> DetectedCallback {
    let Some(path) = chime_path else {
        return Arc::new(|| info!("Keyword detected"));
    };

    match Chime::load(path) {
        Ok(chime) => {
            let gate = gate.clone();
            Arc::new(move || {
                info!("Keyword detected");
                gate.mute();
                if let Err(e) = chime.play() {
                    warn!("Chime playback failed: {}", e);
                }
                gate.unmute();
            })
        }
        Err(e) => {
            warn!("Could not load chime {}: {}", path.display(), e);
            Arc::new(|| info!("Keyword detected"))
        }
    }
}
