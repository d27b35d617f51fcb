//! Voicekey - push-to-release voice dictation
//!
//! A global hotkey engine (low-level keyboard hook, combo state machines,
//! debounced firing) driving a record → transcribe → type-at-cursor flow.
//! This library exports core modules for testing and potential future reuse.

/// Dictation session orchestration
pub mod app;
/// Audio capture and volume ducking
pub mod audio;
/// Configuration management
pub mod config;
/// Global hotkey engine
pub mod hook;
/// Synthetic keyboard output
pub mod input;
/// Elapsed-time logging
pub mod stopwatch;
/// Telemetry and crash logging
pub mod telemetry;
/// Cloud speech-to-text
pub mod transcription;
