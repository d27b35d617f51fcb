//! Windows synthetic input via `SendInput`.
//!
//! Events posted through `SendInput` arrive at low-level hooks with
//! `LLKHF_INJECTED` set, so the pump's pass-through check needs no extra
//! marker here. Text goes in as `KEYEVENTF_UNICODE` packets, one
//! down/up pair per UTF-16 code unit, which works regardless of the
//! active keyboard layout.

use tracing::{debug, warn};

use crate::hook::KeyId;

use super::InsertError;

const INPUT_KEYBOARD: u32 = 1;
const KEYEVENTF_KEYUP: u32 = 0x0002;
const KEYEVENTF_UNICODE: u32 = 0x0004;
const VK_BACK: u16 = 0x08;

#[repr(C)]
#[derive(Clone, Copy)]
struct KeybdInput {
    vk: u16,
    scan: u16,
    flags: u32,
    time: u32,
    extra_info: usize,
}

/// Mirrors the layout of the Win32 `INPUT` struct on 64-bit: a 4-byte
/// discriminant (padded to 8) followed by a 32-byte union sized for its
/// largest member, `MOUSEINPUT`.
#[repr(C)]
#[derive(Clone, Copy)]
struct Input {
    kind: u32,
    ki: KeybdInput,
    _pad: u64,
}

impl Input {
    const fn key(vk: u16, scan: u16, flags: u32) -> Self {
        Self {
            kind: INPUT_KEYBOARD,
            ki: KeybdInput {
                vk,
                scan,
                flags,
                time: 0,
                extra_info: 0,
            },
            _pad: 0,
        }
    }
}

#[link(name = "user32")]
extern "system" {
    fn SendInput(c_inputs: u32, p_inputs: *const Input, cb_size: i32) -> u32;
}

fn send(inputs: &[Input]) -> Result<(), InsertError> {
    #[allow(clippy::cast_possible_truncation)]
    let count = inputs.len() as u32;
    #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
    let size = std::mem::size_of::<Input>() as i32;
    // SAFETY: the slice outlives the call and each element matches the
    // declared cb_size.
    let sent = unsafe { SendInput(count, inputs.as_ptr(), size) };
    if sent == count {
        Ok(())
    } else {
        Err(InsertError::EventCreation(format!(
            "SendInput delivered {sent} of {count} events"
        )))
    }
}

pub(super) fn insert_text(text: &str) -> Result<(), InsertError> {
    let mut inputs = Vec::with_capacity(text.encode_utf16().count() * 2);
    for unit in text.encode_utf16() {
        inputs.push(Input::key(0, unit, KEYEVENTF_UNICODE));
        inputs.push(Input::key(0, unit, KEYEVENTF_UNICODE | KEYEVENTF_KEYUP));
    }
    send(&inputs)?;
    debug!(units = inputs.len() / 2, "unicode input sent");
    Ok(())
}

pub(super) fn send_backspace() -> Result<(), InsertError> {
    send(&[
        Input::key(VK_BACK, 0, 0),
        Input::key(VK_BACK, 0, KEYEVENTF_KEYUP),
    ])?;
    debug!("backspace sent");
    Ok(())
}

pub(super) fn release_key(key: KeyId) {
    #[allow(clippy::cast_possible_truncation)]
    let vk = key.raw() as u16;
    if let Err(e) = send(&[Input::key(vk, 0, KEYEVENTF_KEYUP)]) {
        warn!(error = %e, vk, "modifier release failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_struct_matches_win32_layout() {
        assert_eq!(std::mem::size_of::<Input>(), 40);
        assert_eq!(std::mem::align_of::<Input>(), 8);
    }
}
