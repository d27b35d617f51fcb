//! Event pump thread management.
//!
//! The pump is the single point of contact with the OS keyboard
//! interception facility. Each platform backend installs its hook on a
//! dedicated thread, blocks in the native message wait, feeds decoded
//! transitions to the registry's dispatcher, and uninstalls the hook on
//! the way out. The registry starts the pump lazily with the first
//! registration and stops it when the last one is removed.

use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::thread::JoinHandle;
use std::time::Duration;

use super::keys::KeyId;
use super::registry::Dispatcher;
use super::HotkeyError;

#[cfg(not(any(windows, target_os = "macos")))]
mod fallback;
#[cfg(target_os = "macos")]
mod macos;
#[cfg(windows)]
mod windows;

#[cfg(target_os = "macos")]
pub(crate) use macos::{modifier_keycode, SYNTHETIC_EVENT_MARKER};

/// One decoded keyboard transition as delivered by a platform backend
/// (or simulated through [`super::HotkeyRegistry::dispatch`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawKeyEvent {
    /// The hardware key, possibly a left/right modifier variant.
    pub key: KeyId,
    /// Key-down transition.
    pub down: bool,
    /// Key-up transition.
    pub up: bool,
    /// The event was synthesized by an automation API rather than typed on
    /// physical hardware. Injected events pass through untouched.
    pub injected: bool,
}

impl RawKeyEvent {
    /// A physical key-down for `key`.
    #[must_use]
    pub const fn down(key: KeyId) -> Self {
        Self {
            key,
            down: true,
            up: false,
            injected: false,
        }
    }

    /// A physical key-up for `key`.
    #[must_use]
    pub const fn up(key: KeyId) -> Self {
        Self {
            key,
            down: false,
            up: true,
            injected: false,
        }
    }
}

/// How long shutdown waits for the pump thread to unhook and unwind
/// before detaching it.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(2);

/// Handle to the running pump thread, owned by the registry.
pub(crate) struct PumpHandle {
    stop: Option<Box<dyn FnOnce() + Send>>,
    done: Receiver<()>,
    join: Option<JoinHandle<()>>,
}

impl PumpHandle {
    pub(crate) fn new(
        stop: impl FnOnce() + Send + 'static,
        done: Receiver<()>,
        join: JoinHandle<()>,
    ) -> Self {
        Self {
            stop: Some(Box::new(stop)),
            done,
            join: Some(join),
        }
    }

    /// Signals the pump to exit its message loop and waits for the hook to
    /// be uninstalled. The wait is bounded: a wedged pump is reported and
    /// detached rather than blocking process exit indefinitely.
    pub(crate) fn stop(mut self) {
        if let Some(stop) = self.stop.take() {
            stop();
        }
        match self.done.recv_timeout(SHUTDOWN_TIMEOUT) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if let Some(join) = self.join.take() {
                    let _ = join.join();
                }
                tracing::debug!("event pump stopped");
            }
            Err(RecvTimeoutError::Timeout) => {
                tracing::warn!(
                    timeout_ms = SHUTDOWN_TIMEOUT.as_millis() as u64,
                    "event pump did not unwind in time; detaching"
                );
            }
        }
    }
}

/// Starts the platform pump thread and blocks until the hook is installed.
///
/// # Errors
/// [`HotkeyError::HookInstall`] if the OS refuses the hook; the thread has
/// already unwound when this returns.
pub(crate) fn spawn(dispatcher: Dispatcher) -> Result<PumpHandle, HotkeyError> {
    #[cfg(windows)]
    {
        windows::spawn(dispatcher)
    }
    #[cfg(target_os = "macos")]
    {
        macos::spawn(dispatcher)
    }
    #[cfg(not(any(windows, target_os = "macos")))]
    {
        fallback::spawn(dispatcher)
    }
}
