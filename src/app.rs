//! Dictation session: ties the hotkey engine to capture, transcription,
//! and text output.
//!
//! One combo toggles the session. First full release starts recording
//! (duck volume, show a marker at the cursor, arm the cancel key); the
//! second stops it, uploads the audio, and types the transcript where the
//! marker was. Esc while recording throws the take away.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::{Context, Result};
use tracing::{debug, error, info, warn};

use crate::audio::{volume, Capture};
use crate::config::Config;
use crate::hook::{keys, HotkeyError, HotkeyHandle, HotkeyRegistry, KeyId};
use crate::input;
use crate::stopwatch::Stopwatch;
use crate::transcription::Transcribe;

/// Shown at the cursor while the microphone is hot.
const RECORDING_MARKER: &str = "🔴";
/// Shown at the cursor while the recording is being transcribed.
const PROCESSING_MARKER: &str = "⌛";

/// Where the session currently is in the record/transcribe cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Waiting for the toggle combo.
    Idle,
    /// Microphone hot, cancel key armed.
    Recording,
    /// Uploading and typing the transcript; toggles are ignored.
    Processing,
}

/// Sink for everything the session types into the focused window.
///
/// Production uses [`SystemOutput`]; tests substitute `MockTextOutput`.
#[cfg_attr(test, mockall::automock)]
pub trait TextOutput: Send + Sync {
    /// Types `text` at the cursor. Returns whether anything was sent.
    fn insert(&self, text: &str) -> bool;
    /// Sends one backspace keystroke.
    fn backspace(&self);
    /// Posts key-up events for `keys` so held modifiers cannot turn the
    /// typed output into shortcuts.
    fn release_keys(&self, keys: &[KeyId]);
}

/// [`TextOutput`] backed by the platform synthetic-input API.
pub struct SystemOutput;

impl TextOutput for SystemOutput {
    fn insert(&self, text: &str) -> bool {
        input::insert_text_safe(text)
    }

    fn backspace(&self) {
        if let Err(e) = input::send_backspace() {
            warn!(error = %e, "backspace failed");
        }
    }

    fn release_keys(&self, keys: &[KeyId]) {
        input::release_keys(keys);
    }
}

/// One push-to-release dictation session.
///
/// Shared behind an [`Arc`]; the hotkey callbacks hold a [`Weak`] so an
/// unregistered session can drop.
///
/// [`Weak`]: std::sync::Weak
pub struct DictationSession {
    registry: HotkeyRegistry,
    capture: Mutex<Box<dyn Capture>>,
    transcriber: Box<dyn Transcribe>,
    output: Box<dyn TextOutput>,
    state: Mutex<SessionState>,
    cancel_handle: Mutex<Option<HotkeyHandle>>,
    marker_shown: AtomicBool,
    combo: String,
    combo_keys: Vec<KeyId>,
    cancel_combo: String,
    duck_factor: f32,
    last_recording: Option<PathBuf>,
}

impl DictationSession {
    /// Builds a session over `registry` from `config` and the injected
    /// collaborators.
    ///
    /// # Errors
    /// Returns error if the configured combos do not parse or the
    /// last-recording path cannot be expanded.
    pub fn new(
        registry: HotkeyRegistry,
        config: &Config,
        capture: Box<dyn Capture>,
        transcriber: Box<dyn Transcribe>,
        output: Box<dyn TextOutput>,
    ) -> Result<Arc<Self>> {
        let combo_keys: Vec<KeyId> = keys::parse_combo(&config.hotkey.combo)
            .context("invalid toggle combo")?
            .into_iter()
            .collect();
        keys::parse_combo(&config.hotkey.cancel).context("invalid cancel combo")?;

        let last_recording = if config.audio.last_recording.is_empty() {
            None
        } else {
            Some(Config::expand_path(&config.audio.last_recording)?)
        };

        Ok(Arc::new(Self {
            registry,
            capture: Mutex::new(capture),
            transcriber,
            output,
            state: Mutex::new(SessionState::Idle),
            cancel_handle: Mutex::new(None),
            marker_shown: AtomicBool::new(false),
            combo: config.hotkey.combo.clone(),
            combo_keys,
            cancel_combo: config.hotkey.cancel.clone(),
            duck_factor: config.audio.duck_factor,
            last_recording,
        }))
    }

    /// Registers the toggle combo and returns its handle.
    ///
    /// # Errors
    /// [`HotkeyError`] if registration fails.
    pub fn activate(self: &Arc<Self>) -> Result<HotkeyHandle, HotkeyError> {
        let weak = Arc::downgrade(self);
        self.registry.add(&self.combo, move || {
            if let Some(session) = weak.upgrade() {
                session.toggle();
            }
        })
    }

    /// Current state.
    pub fn state(&self) -> SessionState {
        *self.lock_state()
    }

    fn lock_state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Advances the session one step: Idle starts a recording, Recording
    /// finishes one, Processing ignores the press.
    pub fn toggle(self: &Arc<Self>) {
        // The user's fingers may still be coming off the combo; make sure
        // the OS sees every modifier up before anything is typed.
        self.output.release_keys(&self.combo_keys);

        let mut state = self.lock_state();
        match *state {
            SessionState::Idle => self.start_recording(&mut state),
            SessionState::Recording => self.finish_recording(state),
            SessionState::Processing => {
                debug!("toggle ignored while processing");
            }
        }
    }

    fn start_recording(self: &Arc<Self>, state: &mut MutexGuard<'_, SessionState>) {
        info!("session: Idle → Recording");
        volume::duck(self.duck_factor);
        self.marker_shown
            .store(self.output.insert(RECORDING_MARKER), Ordering::SeqCst);

        let weak = Arc::downgrade(self);
        match self.registry.add(&self.cancel_combo, move || {
            if let Some(session) = weak.upgrade() {
                session.cancel();
            }
        }) {
            Ok(handle) => {
                *self.lock_cancel() = Some(handle);
            }
            Err(e) => {
                // Recording still works; there is just no cancel key.
                warn!(error = %e, "cancel hotkey registration failed");
            }
        }

        if let Err(e) = self.lock_capture().start() {
            error!(error = %e, "could not start recording");
            self.rollback_start();
            return;
        }
        **state = SessionState::Recording;
    }

    /// Undoes the visible side effects of a failed start.
    fn rollback_start(&self) {
        if let Some(handle) = self.lock_cancel().take() {
            self.registry.remove(handle);
        }
        if self.marker_shown.swap(false, Ordering::SeqCst) {
            self.output.backspace();
        }
        volume::restore();
    }

    fn finish_recording(self: &Arc<Self>, mut state: MutexGuard<'_, SessionState>) {
        info!("session: Recording → Processing");
        *state = SessionState::Processing;
        // Release the lock for the slow part; concurrent toggles see
        // Processing and back off.
        drop(state);

        if let Some(handle) = self.lock_cancel().take() {
            self.registry.remove(handle);
        }
        if self.marker_shown.swap(false, Ordering::SeqCst) {
            self.output.backspace();
        }
        let processing_shown = self.output.insert(PROCESSING_MARKER);

        let result = self.transcribe_current_take();

        if processing_shown {
            self.output.backspace();
        }
        match result {
            Ok(text) if text.is_empty() => info!("transcription empty; nothing to type"),
            Ok(text) => {
                self.output.insert(&text);
            }
            Err(e) => error!(error = %e, "dictation failed"),
        }

        *self.lock_state() = SessionState::Idle;
        info!("session: Processing → Idle");
    }

    /// Stops capture, restores volume, saves the take, and transcribes it.
    fn transcribe_current_take(&self) -> Result<String> {
        let stopped = self.lock_capture().stop();
        volume::restore();
        let wav = stopped.context("could not stop recording")?;

        if let Some(path) = &self.last_recording {
            if let Err(e) = save_recording(path, &wav) {
                warn!(error = %e, path = %path.display(), "could not save recording");
            }
        }

        let watch = Stopwatch::start("transcribe");
        let text = self.transcriber.transcribe(&wav)?;
        watch.finish();
        Ok(text)
    }

    /// Aborts the current recording without transcribing. No-op unless
    /// the session is recording.
    pub fn cancel(&self) {
        let mut state = self.lock_state();
        if *state != SessionState::Recording {
            debug!("cancel ignored; not recording");
            return;
        }
        info!("session: Recording → Idle (cancelled)");
        *state = SessionState::Idle;
        drop(state);

        if let Some(handle) = self.lock_cancel().take() {
            self.registry.remove(handle);
        }
        if self.marker_shown.swap(false, Ordering::SeqCst) {
            self.output.backspace();
        }
        if let Err(e) = self.lock_capture().stop() {
            warn!(error = %e, "could not stop cancelled recording");
        }
        volume::restore();
    }

    fn lock_capture(&self) -> MutexGuard<'_, Box<dyn Capture>> {
        self.capture.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_cancel(&self) -> MutexGuard<'_, Option<HotkeyHandle>> {
        self.cancel_handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

fn save_recording(path: &Path, wav: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).context("failed to create recording directory")?;
    }
    fs::write(path, wav).context("failed to write recording")?;
    debug!(path = %path.display(), bytes = wav.len(), "recording saved");
    Ok(())
}
