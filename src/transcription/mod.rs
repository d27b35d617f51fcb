//! Cloud speech-to-text.

/// OpenAI transcription API client
pub mod client;

pub use client::OpenAiTranscriber;

use thiserror::Error;

/// Errors that can occur during transcription.
#[derive(Debug, Error)]
pub enum TranscriptionError {
    /// The API key environment variable is unset or empty.
    #[error("missing API key: set the {0} environment variable")]
    MissingApiKey(String),

    /// The HTTP request itself failed.
    #[error("transcription request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The API answered with a non-success status.
    #[error("transcription API returned {status}: {body}")]
    Api {
        /// HTTP status code
        status: u16,
        /// Response body, for the log
        body: String,
    },
}

/// Trait for transcription operations (enables testing via mocking).
///
/// The dictation session holds this instead of the concrete client so
/// tests can drive the session with `MockTranscribe`.
#[cfg_attr(test, mockall::automock)]
pub trait Transcribe: Send + Sync {
    /// Transcribes a WAV recording to text.
    ///
    /// # Errors
    /// Returns error if the request fails or the API rejects it.
    fn transcribe(&self, wav_bytes: &[u8]) -> Result<String, TranscriptionError>;
}
