//! Pump backend for platforms without a supported interception hook.
//!
//! The thread installs nothing and delivers nothing; it parks on its stop
//! channel so registry lifecycle (lazy start, stop-on-empty, bounded
//! unwind) behaves identically everywhere. Raw events reach the registry
//! through `HotkeyRegistry::dispatch` instead — which is also how the test
//! suite simulates input.

use std::sync::mpsc;
use std::thread;

use super::PumpHandle;
use crate::hook::registry::Dispatcher;
use crate::hook::HotkeyError;

pub(super) fn spawn(dispatcher: Dispatcher) -> Result<PumpHandle, HotkeyError> {
    let (stop_tx, stop_rx) = mpsc::channel::<()>();
    let (done_tx, done_rx) = mpsc::channel();

    let join = thread::Builder::new()
        .name("hotkey-pump".to_owned())
        .spawn(move || {
            // Held for parity with real backends: the dispatcher keeps the
            // registry reachable for the lifetime of the pump.
            let _dispatcher = dispatcher;
            tracing::info!("event pump started (no system hook on this platform)");
            let _ = stop_rx.recv();
            tracing::info!("event pump stopping");
            let _ = done_tx.send(());
        })
        .map_err(|e| HotkeyError::HookInstall(e.to_string()))?;

    Ok(PumpHandle::new(
        move || {
            let _ = stop_tx.send(());
        },
        done_rx,
        join,
    ))
}
