//! Synthetic keyboard output: text insertion, backspace, modifier release.
//!
//! Everything here posts events through the platform automation API, which
//! the hook engine recognizes as injected and passes through untouched.
//! Insertion targets whatever window currently owns keyboard focus.

use thiserror::Error;
use tracing::{error, info};

use crate::hook::KeyId;

#[cfg(not(any(windows, target_os = "macos")))]
mod fallback;
#[cfg(target_os = "macos")]
mod macos;
#[cfg(windows)]
mod windows;

#[cfg(not(any(windows, target_os = "macos")))]
use fallback as platform;
#[cfg(target_os = "macos")]
use macos as platform;
#[cfg(windows)]
use windows as platform;

/// Synthetic input failures.
#[derive(Debug, Error)]
pub enum InsertError {
    /// Nothing to type.
    #[error("text is empty")]
    EmptyText,

    /// The platform automation API rejected the event.
    #[error("failed to create input event: {0}")]
    EventCreation(String),

    /// This build has no synthetic-input backend.
    #[error("synthetic input not supported on this platform")]
    Unsupported,
}

/// Byte budget for logged text previews.
const PREVIEW_LIMIT: usize = 50;

/// Shortens `text` to a log-friendly preview: at most [`PREVIEW_LIMIT`]
/// bytes, cut on a char boundary, with `...` marking the truncation.
#[must_use]
pub fn preview(text: &str) -> String {
    if text.len() <= PREVIEW_LIMIT {
        return text.to_owned();
    }
    let mut cut = PREVIEW_LIMIT - 3;
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}...", &text[..cut])
}

/// Types `text` at the current cursor position.
///
/// # Errors
/// [`InsertError`] if the text is empty or the platform rejects the events.
/// Posting itself has no failure channel on any platform; if the focused
/// app has secure input enabled, the failure is silent.
pub fn insert_text(text: &str) -> Result<(), InsertError> {
    if text.is_empty() {
        error!("attempted to insert empty text");
        return Err(InsertError::EmptyText);
    }

    info!(
        text_len = text.len(),
        text_preview = %preview(text),
        "inserting text"
    );
    platform::insert_text(text)
}

/// Attempts to insert text, logging errors without panicking.
///
/// This is the primary interface for the dictation session; insertion
/// failures must not crash the app.
pub fn insert_text_safe(text: &str) -> bool {
    match insert_text(text) {
        Ok(()) => true,
        Err(e) => {
            error!(error = %e, text_len = text.len(), "text insertion failed");
            false
        }
    }
}

/// Sends one synthetic backspace keystroke (down then up).
///
/// # Errors
/// [`InsertError`] if the platform rejects the events.
pub fn send_backspace() -> Result<(), InsertError> {
    platform::send_backspace()
}

/// Posts synthetic key-up events for `keys`, releasing any left/right
/// variant of each.
///
/// Used before typing: the user's physical modifiers may still be held
/// when a combo fires, and a Ctrl that the OS believes is down would turn
/// the inserted characters into shortcuts.
pub fn release_keys(keys: &[KeyId]) {
    for &key in keys {
        match crate::hook::keys::variants(key) {
            Some(pair) => {
                for variant in pair {
                    platform::release_key(variant);
                }
            }
            None => platform::release_key(key),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preview_passes_short_text_through() {
        assert_eq!(preview("hello"), "hello");
        assert_eq!(preview(""), "");
        let text_50 = "a".repeat(50);
        assert_eq!(preview(&text_50), text_50);
    }

    #[test]
    fn preview_truncates_long_text() {
        let text_100 = "a".repeat(100);
        let short = preview(&text_100);
        assert!(short.len() <= PREVIEW_LIMIT);
        assert!(short.ends_with("..."));
        assert!(short.starts_with(&text_100[..short.len() - 3]));
    }

    #[test]
    fn preview_respects_utf8_boundaries() {
        let long_unicode = "👋".repeat(30);
        let short = preview(&long_unicode);
        assert!(short.ends_with("..."));
        assert!(short.len() < long_unicode.len());
    }

    #[test]
    fn insert_empty_text_is_an_error() {
        assert!(matches!(insert_text(""), Err(InsertError::EmptyText)));
        assert!(!insert_text_safe(""));
    }

    #[test]
    fn utf16_encoding_handles_surrogate_pairs() {
        let text = "Hello 👋 World 🌍";
        let utf16: Vec<u16> = text.encode_utf16().collect();
        // Two emoji, each a surrogate pair.
        assert_eq!(utf16.len(), text.chars().count() + 2);
    }
}
