//! Stub backend for platforms without a synthetic-input API binding.

use tracing::warn;

use crate::hook::KeyId;

use super::InsertError;

pub(super) fn insert_text(_text: &str) -> Result<(), InsertError> {
    warn!("text insertion not supported on this platform");
    Err(InsertError::Unsupported)
}

pub(super) fn send_backspace() -> Result<(), InsertError> {
    warn!("backspace not supported on this platform");
    Err(InsertError::Unsupported)
}

pub(super) fn release_key(_key: KeyId) {}
