//! macOS synthetic input via the `CGEvent` API.
//!
//! Every posted event carries the engine's synthetic marker in its
//! event-source user data, so the tap in the hook pump recognizes and
//! ignores our own output. Requires the Input Monitoring permission;
//! `event.post()` itself has no failure channel, so a revoked permission
//! or a secure-input field fails silently.

use core_graphics::event::{CGEvent, CGEventTapLocation, EventField};
use core_graphics::event_source::{CGEventSource, CGEventSourceStateID};
use tracing::debug;

use crate::hook::pump::{modifier_keycode, SYNTHETIC_EVENT_MARKER};
use crate::hook::KeyId;

use super::InsertError;

/// macOS hardware keycode for delete (backspace).
const KEYCODE_BACKSPACE: u16 = 51;

fn event_source() -> Result<CGEventSource, InsertError> {
    CGEventSource::new(CGEventSourceStateID::HIDSystemState)
        .map_err(|()| InsertError::EventCreation("CGEventSource creation failed".to_owned()))
}

fn keyboard_event(keycode: u16, down: bool) -> Result<CGEvent, InsertError> {
    let event = CGEvent::new_keyboard_event(event_source()?, keycode, down)
        .map_err(|()| InsertError::EventCreation("keyboard CGEvent creation failed".to_owned()))?;
    event.set_integer_value_field(EventField::EVENT_SOURCE_USER_DATA, SYNTHETIC_EVENT_MARKER);
    Ok(event)
}

pub(super) fn insert_text(text: &str) -> Result<(), InsertError> {
    // Dummy keycode; the unicode string overrides it.
    let event = keyboard_event(0, true)?;

    // The UTF-16 produced by encode_utf16 on a &str never contains
    // unpaired surrogates, which is what the unchecked setter requires.
    let utf16: Vec<u16> = text.encode_utf16().collect();
    event.set_string_from_utf16_unchecked(&utf16);

    event.post(CGEventTapLocation::HID);
    debug!(utf16_len = utf16.len(), "text CGEvent posted");
    Ok(())
}

pub(super) fn send_backspace() -> Result<(), InsertError> {
    keyboard_event(KEYCODE_BACKSPACE, true)?.post(CGEventTapLocation::HID);
    keyboard_event(KEYCODE_BACKSPACE, false)?.post(CGEventTapLocation::HID);
    debug!("backspace posted");
    Ok(())
}

pub(super) fn release_key(key: KeyId) {
    let Some(keycode) = modifier_keycode(key) else {
        debug!(key = key.raw(), "no release keycode for key; skipping");
        return;
    };
    match keyboard_event(keycode, false) {
        Ok(event) => event.post(CGEventTapLocation::HID),
        Err(e) => debug!(error = %e, "modifier release failed"),
    }
}
