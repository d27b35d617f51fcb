//! Blocking client for the OpenAI audio transcription endpoint.

use std::env;
use std::time::Duration;

use reqwest::blocking::multipart::{Form, Part};
use reqwest::blocking::Client;
use tracing::{debug, info};

use crate::config::TranscriptionConfig;

use super::{Transcribe, TranscriptionError};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Upper bound on one transcription round trip. Recordings are capped at
/// 30 seconds, so anything slower than this is a stuck connection.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Speech-to-text via the hosted transcription API.
pub struct OpenAiTranscriber {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    language: String,
    prompt: String,
}

impl OpenAiTranscriber {
    /// Builds a client with the API key read from the environment variable
    /// named in `config`.
    ///
    /// # Errors
    /// [`TranscriptionError::MissingApiKey`] if the variable is unset or
    /// empty; [`TranscriptionError::Http`] if the HTTP client cannot be
    /// built.
    pub fn from_env(config: &TranscriptionConfig) -> Result<Self, TranscriptionError> {
        let api_key = env::var(&config.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| TranscriptionError::MissingApiKey(config.api_key_env.clone()))?;
        Self::new(api_key, DEFAULT_BASE_URL, config)
    }

    fn new(
        api_key: String,
        base_url: &str,
        config: &TranscriptionConfig,
    ) -> Result<Self, TranscriptionError> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        info!(model = %config.model, language = %config.language, "transcription client ready");
        Ok(Self {
            client,
            api_key,
            base_url: base_url.trim_end_matches('/').to_owned(),
            model: config.model.clone(),
            language: config.language.clone(),
            prompt: config.prompt.clone(),
        })
    }
}

impl Transcribe for OpenAiTranscriber {
    fn transcribe(&self, wav_bytes: &[u8]) -> Result<String, TranscriptionError> {
        debug!(wav_len = wav_bytes.len(), "uploading recording");

        let file = Part::bytes(wav_bytes.to_vec())
            .file_name("audio.wav")
            .mime_str("audio/wav")?;
        let form = Form::new()
            .part("file", file)
            .text("model", self.model.clone())
            .text("language", self.language.clone())
            .text("response_format", "text")
            .text("prompt", self.prompt.clone());

        let response = self
            .client
            .post(format!("{}/audio/transcriptions", self.base_url))
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()?;

        let status = response.status();
        let body = response.text()?;
        if !status.is_success() {
            return Err(TranscriptionError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let text = body.trim().to_owned();
        info!(text_len = text.len(), "transcription received");
        Ok(text)
    }
}
