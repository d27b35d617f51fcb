use std::time::Duration;

use anyhow::Result;

use voicekey::app::{DictationSession, SystemOutput};
use voicekey::audio::AudioCapture;
use voicekey::config::Config;
use voicekey::hook::HotkeyRegistry;
use voicekey::telemetry;
use voicekey::transcription::OpenAiTranscriber;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::load()?;
    println!("✓ Config loaded from ~/.voicekey.toml");

    // Initialize telemetry
    telemetry::init(config.telemetry.enabled, &config.telemetry.log_path)?;
    tracing::info!("voicekey starting");
    println!("✓ Telemetry initialized");

    // Collaborators
    let transcriber = OpenAiTranscriber::from_env(&config.transcription)?;
    println!("✓ Transcription client ready ({})", config.transcription.model);

    let capture = AudioCapture::new(&config.audio)?;
    println!("✓ Audio capture initialized");

    // Hotkey engine
    let registry = HotkeyRegistry::global().clone();
    registry.set_fire_delay(Duration::from_millis(config.hotkey.debounce_ms));

    let session = DictationSession::new(
        registry.clone(),
        &config,
        Box::new(capture),
        Box::new(transcriber),
        Box::new(SystemOutput),
    )?;
    session.activate()?;
    println!("✓ Hotkey registered: {}", config.hotkey.combo);

    tracing::info!(combo = %config.hotkey.combo, "dictation ready");
    println!("\nVoicekey is running. Hold and release the hotkey to dictate.");
    println!("Press Ctrl+C to exit.\n");

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown signal received");
    println!("\nShutting down...");

    registry.remove_all();
    Ok(())
}
