//! Output-volume duck/restore.
//!
//! Best-effort: the dictation session lowers the system output volume
//! while the microphone is hot so playback does not bleed into the
//! recording, then puts it back. Failures are logged and otherwise
//! ignored; nothing in the engine depends on these calls succeeding.

use std::sync::{Mutex, PoisonError};

use tracing::{debug, warn};

/// Volume remembered by the last `duck`, consumed by `restore`.
static PREV_LEVEL: Mutex<Option<f32>> = Mutex::new(None);

/// Current master output level as a 0.0–1.0 scalar, if readable.
///
/// Queried fresh on every call in case the user switched output devices.
#[must_use]
pub fn get_level() -> Option<f32> {
    platform::get_level()
}

/// Sets the master output level, clamped to 0.0–1.0.
pub fn set_level(scalar: f32) {
    platform::set_level(scalar.clamp(0.0, 1.0));
}

/// Lowers the current output volume by `factor` (0–1) and remembers the
/// previous level. Does not make a quack sound.
pub fn duck(factor: f32) {
    let Some(current) = get_level() else {
        debug!("output volume not readable; skipping duck");
        return;
    };
    *PREV_LEVEL.lock().unwrap_or_else(PoisonError::into_inner) = Some(current);
    set_level(current * factor);
    debug!(from = current, factor, "output volume ducked");
}

/// Restores the volume captured by the last [`duck`], if any.
pub fn restore() {
    let prev = PREV_LEVEL
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .take();
    if let Some(level) = prev {
        set_level(level);
        debug!(to = level, "output volume restored");
    }
}

#[cfg(windows)]
mod platform {
    use super::warn;

    #[link(name = "winmm")]
    extern "system" {
        fn waveOutGetVolume(hwo: isize, pdw_volume: *mut u32) -> u32;
        fn waveOutSetVolume(hwo: isize, dw_volume: u32) -> u32;
    }

    const MMSYSERR_NOERROR: u32 = 0;

    pub(super) fn get_level() -> Option<f32> {
        let mut volume: u32 = 0;
        // SAFETY: device id 0 is the wave mapper; the pointer is valid.
        let result = unsafe { waveOutGetVolume(0, &mut volume) };
        if result == MMSYSERR_NOERROR {
            Some(f32::from((volume & 0xFFFF) as u16) / f32::from(u16::MAX))
        } else {
            warn!(result, "waveOutGetVolume failed");
            None
        }
    }

    pub(super) fn set_level(scalar: f32) {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let channel = (scalar * f32::from(u16::MAX)) as u32;
        let both = channel | (channel << 16);
        // SAFETY: plain OS call.
        let result = unsafe { waveOutSetVolume(0, both) };
        if result != MMSYSERR_NOERROR {
            warn!(result, "waveOutSetVolume failed");
        }
    }
}

#[cfg(target_os = "macos")]
mod platform {
    use super::warn;
    use std::process::Command;

    pub(super) fn get_level() -> Option<f32> {
        let output = Command::new("osascript")
            .args(["-e", "output volume of (get volume settings)"])
            .output()
            .ok()?;
        if !output.status.success() {
            warn!("osascript volume query failed");
            return None;
        }
        let percent: f32 = String::from_utf8_lossy(&output.stdout).trim().parse().ok()?;
        Some(percent / 100.0)
    }

    pub(super) fn set_level(scalar: f32) {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let percent = (scalar * 100.0).round() as u32;
        let script = format!("set volume output volume {percent}");
        match Command::new("osascript").args(["-e", &script]).status() {
            Ok(status) if status.success() => {}
            _ => warn!("osascript volume set failed"),
        }
    }
}

#[cfg(not(any(windows, target_os = "macos")))]
mod platform {
    use tracing::debug;

    pub(super) fn get_level() -> Option<f32> {
        debug!("output volume control not supported on this platform");
        None
    }

    pub(super) fn set_level(_scalar: f32) {}
}
