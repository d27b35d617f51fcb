//! Configuration loaded from `~/.voicekey.toml`.
//!
//! A default file is written on first run so every knob is visible and
//! editable without consulting documentation.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Hotkey combos and debounce
    pub hotkey: HotkeyConfig,
    /// Capture format and volume ducking
    pub audio: AudioConfig,
    /// Cloud transcription settings
    pub transcription: TranscriptionConfig,
    /// Log file settings
    pub telemetry: TelemetryConfig,
}

/// Hotkey section.
#[derive(Debug, Deserialize, Clone)]
pub struct HotkeyConfig {
    /// Dictation toggle combo, e.g. `"ctrl+alt+shift+q"`
    pub combo: String,
    /// Cancel key active while recording, e.g. `"esc"`
    pub cancel: String,
    /// Delay between full release and callback, in milliseconds
    pub debounce_ms: u64,
}

/// Audio section.
#[derive(Debug, Deserialize, Clone)]
pub struct AudioConfig {
    /// Sample rate recordings are resampled to before upload
    pub sample_rate: u32,
    /// Output volume multiplier applied while the microphone is hot
    pub duck_factor: f32,
    /// Where the most recent recording is kept for inspection
    pub last_recording: String,
}

/// Transcription section.
#[derive(Debug, Deserialize, Clone)]
pub struct TranscriptionConfig {
    /// API model name
    pub model: String,
    /// ISO 639-1 language hint
    pub language: String,
    /// Spelling/context hint passed with every request
    pub prompt: String,
    /// Environment variable holding the API key
    pub api_key_env: String,
}

/// Telemetry section.
#[derive(Debug, Deserialize, Clone)]
pub struct TelemetryConfig {
    /// Write logs to `log_path` instead of stderr
    pub enabled: bool,
    /// Log file location
    pub log_path: String,
}

impl Config {
    /// Loads config from `~/.voicekey.toml`, writing the default file
    /// first if none exists.
    ///
    /// # Errors
    /// Returns error if the file cannot be read, written, or parsed.
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if !config_path.exists() {
            Self::create_default(&config_path).context("failed to create default config")?;
        }

        let contents = fs::read_to_string(&config_path).context("failed to read config file")?;
        Self::parse(&contents)
    }

    fn parse(contents: &str) -> Result<Self> {
        toml::from_str(contents).context("failed to parse config TOML")
    }

    fn config_path() -> Result<PathBuf> {
        Ok(home_dir()?.join(".voicekey.toml"))
    }

    fn create_default(path: &Path) -> Result<()> {
        fs::write(path, DEFAULT_CONFIG).context("failed to write default config")?;
        Ok(())
    }

    /// Expand ~ in paths to home directory.
    ///
    /// # Errors
    /// Returns error if `HOME` is unset.
    pub fn expand_path(path: &str) -> Result<PathBuf> {
        if let Some(rest) = path.strip_prefix("~/") {
            Ok(home_dir()?.join(rest))
        } else {
            Ok(PathBuf::from(path))
        }
    }
}

/// `HOME` on Unix; plain cmd/PowerShell sessions set only `USERPROFILE`.
fn home_dir() -> Result<PathBuf> {
    home_from(|key| std::env::var(key))
}

fn home_from(var: impl Fn(&str) -> Result<String, std::env::VarError>) -> Result<PathBuf> {
    var("HOME")
        .or_else(|_| var("USERPROFILE"))
        .map(PathBuf::from)
        .context("neither HOME nor USERPROFILE is set")
}

const DEFAULT_CONFIG: &str = r#"[hotkey]
combo = "ctrl+alt+shift+q"
cancel = "esc"
debounce_ms = 20

[audio]
sample_rate = 24000
duck_factor = 0.3
last_recording = "~/.voicekey/last_recording.wav"

[transcription]
model = "gpt-4o-transcribe"
language = "en"
prompt = "Transcribe exactly what is said, with correct punctuation."
api_key_env = "OPENAI_API_KEY"

[telemetry]
enabled = true
log_path = "~/.voicekey/voicekey.log"
"#;
