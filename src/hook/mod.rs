//! Global hotkey hook engine.
//!
//! Intercepts every physical keyboard event system-wide through a single
//! pump thread, tracks per-combination held state, fires callbacks exactly
//! once when a fully-held combination is fully released, and can swallow
//! the triggering keystrokes before any other application sees them.
//!
//! The state machine and registry are platform-neutral; only the pump
//! backends under [`pump`] talk to the OS.

pub mod keys;
pub mod pump;
pub mod registry;
pub mod scheduler;
pub mod state;

pub use keys::KeyId;
pub use pump::RawKeyEvent;
pub use registry::{HotkeyHandle, HotkeyRegistry};

use thiserror::Error;

/// Errors surfaced by hotkey registration and pump lifecycle.
///
/// Registration-time errors are synchronous and all-or-nothing: a failed
/// `add` leaves the registry unchanged. Callback panics are not represented
/// here; they are caught and logged per firing without affecting the pump
/// or other hotkeys.
#[derive(Debug, Error)]
pub enum HotkeyError {
    /// A combo token did not resolve to any key on this keyboard layout.
    #[error("unrecognized key: {0:?}")]
    UnrecognizedKey(String),

    /// The combo string yields an empty key set.
    #[error("invalid combo: {0}")]
    InvalidCombo(String),

    /// The OS refused to install the keyboard interception hook.
    #[error("failed to install keyboard hook: {0}")]
    HookInstall(String),
}
