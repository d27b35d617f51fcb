//! macOS pump backend: `CGEventTap` on a dedicated `CFRunLoop` thread.
//!
//! The tap is created in `Default` (filtering) mode so a swallowed event
//! can be dropped by returning `None` from the callback. Hardware keycodes
//! are translated to the engine's virtual-key space here, modifiers as
//! their left/right variants — generic collapsing happens in dispatch.
//!
//! Requires the Input Monitoring permission; a denied tap surfaces as a
//! hook-install failure from the registration that started the pump.

use std::cell::RefCell;
use std::collections::HashSet;
use std::sync::mpsc::{self, Sender};
use std::thread;

use core_foundation::runloop::{kCFRunLoopCommonModes, CFRunLoop};
use core_graphics::event::{
    CGEvent, CGEventTap, CGEventTapLocation, CGEventTapOptions, CGEventTapPlacement, CGEventType,
    EventField,
};

use crate::hook::keys::KeyId;
use crate::hook::registry::Dispatcher;
use crate::hook::HotkeyError;

use super::{PumpHandle, RawKeyEvent};

/// Event-source user-data tag stamped on every synthetic event this
/// process posts. The tap passes tagged events through untouched so the
/// engine never reacts to its own typed output.
pub(crate) const SYNTHETIC_EVENT_MARKER: i64 = 0x564B_4859;

/// macOS hardware keycode → virtual-key id. Modifiers map to their
/// left/right variant codes.
const KEYCODE_MAP: &[(u16, u32)] = &[
    // Letters (ANSI layout positions)
    (0, 0x41),  // a
    (11, 0x42), // b
    (8, 0x43),  // c
    (2, 0x44),  // d
    (14, 0x45), // e
    (3, 0x46),  // f
    (5, 0x47),  // g
    (4, 0x48),  // h
    (34, 0x49), // i
    (38, 0x4A), // j
    (40, 0x4B), // k
    (37, 0x4C), // l
    (46, 0x4D), // m
    (45, 0x4E), // n
    (31, 0x4F), // o
    (35, 0x50), // p
    (12, 0x51), // q
    (15, 0x52), // r
    (1, 0x53),  // s
    (17, 0x54), // t
    (32, 0x55), // u
    (9, 0x56),  // v
    (13, 0x57), // w
    (7, 0x58),  // x
    (16, 0x59), // y
    (6, 0x5A),  // z
    // Digit row
    (29, 0x30),
    (18, 0x31),
    (19, 0x32),
    (20, 0x33),
    (21, 0x34),
    (23, 0x35),
    (22, 0x36),
    (26, 0x37),
    (28, 0x38),
    (25, 0x39),
    // Controls
    (53, 0x1B), // esc
    (49, 0x20), // space
    (48, 0x09), // tab
    (36, 0x0D), // return
    (51, 0x08), // delete (backspace)
    // Function row
    (122, 0x70),
    (120, 0x71),
    (99, 0x72),
    (118, 0x73),
    (96, 0x74),
    (97, 0x75),
    (98, 0x76),
    (100, 0x77),
    (101, 0x78),
    (109, 0x79),
    (103, 0x7A),
    (111, 0x7B),
    // Modifiers, as left/right variants
    (59, 0xA2),  // left control
    (62, 0xA3),  // right control
    (58, 0xA4),  // left option
    (61, 0xA5),  // right option
    (56, 0xA0),  // left shift
    (60, 0xA1),  // right shift
    (55, 0x5B),  // left command
    (54, 0x5C),  // right command
];

fn keycode_to_key(keycode: u16) -> Option<KeyId> {
    KEYCODE_MAP
        .iter()
        .find(|(mac, _)| *mac == keycode)
        .map(|(_, vk)| KeyId::from_raw(*vk))
}

/// Reverse lookup for synthetic modifier releases posted by the text
/// output path.
pub(crate) fn modifier_keycode(key: KeyId) -> Option<u16> {
    KEYCODE_MAP
        .iter()
        .find(|(_, vk)| *vk == key.raw() && matches!(*vk, 0xA0..=0xA5 | 0x5B | 0x5C))
        .map(|(mac, _)| *mac)
}

/// CFRunLoop is documented thread-safe; the wrapper only carries the loop
/// reference to the stopping thread.
struct RunLoopHandle(CFRunLoop);
unsafe impl Send for RunLoopHandle {}

pub(super) fn spawn(dispatcher: Dispatcher) -> Result<PumpHandle, HotkeyError> {
    let (ready_tx, ready_rx) = mpsc::channel();
    let (done_tx, done_rx) = mpsc::channel();

    let join = thread::Builder::new()
        .name("hotkey-pump".to_owned())
        .spawn(move || {
            run_pump(dispatcher, &ready_tx);
            let _ = done_tx.send(());
        })
        .map_err(|e| HotkeyError::HookInstall(e.to_string()))?;

    match ready_rx.recv() {
        Ok(Ok(RunLoopHandle(run_loop))) => Ok(PumpHandle::new(
            move || run_loop.stop(),
            done_rx,
            join,
        )),
        Ok(Err(message)) => {
            let _ = join.join();
            Err(HotkeyError::HookInstall(message))
        }
        Err(_) => {
            let _ = join.join();
            Err(HotkeyError::HookInstall(
                "pump thread exited before reporting readiness".to_owned(),
            ))
        }
    }
}

fn run_pump(dispatcher: Dispatcher, ready_tx: &Sender<Result<RunLoopHandle, String>>) {
    // FlagsChanged carries no down/up direction; track which physical
    // modifier keys are currently held and toggle.
    let held_mods: RefCell<HashSet<u16>> = RefCell::new(HashSet::new());

    let callback = move |_proxy, event_type: CGEventType, event: &CGEvent| -> Option<CGEvent> {
        handle_event(&dispatcher, &held_mods, event_type, event)
    };

    let tap = match CGEventTap::new(
        CGEventTapLocation::Session,
        CGEventTapPlacement::HeadInsertEventTap,
        CGEventTapOptions::Default,
        vec![
            CGEventType::KeyDown,
            CGEventType::KeyUp,
            CGEventType::FlagsChanged,
        ],
        callback,
    ) {
        Ok(tap) => tap,
        Err(()) => {
            let _ = ready_tx.send(Err(
                "failed to create event tap (is Input Monitoring permission granted?)".to_owned(),
            ));
            return;
        }
    };

    let source = match tap.mach_port.create_runloop_source(0) {
        Ok(source) => source,
        Err(_) => {
            let _ = ready_tx.send(Err("failed to create run loop source".to_owned()));
            return;
        }
    };

    let run_loop = CFRunLoop::get_current();
    unsafe {
        run_loop.add_source(&source, kCFRunLoopCommonModes);
    }
    tap.enable();
    tracing::info!("keyboard event tap installed");

    let _ = ready_tx.send(Ok(RunLoopHandle(run_loop)));

    // Blocks delivering tap callbacks until PumpHandle::stop stops the loop.
    CFRunLoop::run_current();

    tracing::info!("keyboard event tap removed");
    // The tap drops here, which uninstalls the hook.
}

fn handle_event(
    dispatcher: &Dispatcher,
    held_mods: &RefCell<HashSet<u16>>,
    event_type: CGEventType,
    event: &CGEvent,
) -> Option<CGEvent> {
    if event.get_integer_value_field(EventField::EVENT_SOURCE_USER_DATA)
        == SYNTHETIC_EVENT_MARKER
    {
        return Some(event.clone());
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let keycode = event.get_integer_value_field(EventField::KEYBOARD_EVENT_KEYCODE) as u16;
    let Some(key) = keycode_to_key(keycode) else {
        return Some(event.clone());
    };

    let (down, up) = match event_type {
        CGEventType::KeyDown => (true, false),
        CGEventType::KeyUp => (false, true),
        CGEventType::FlagsChanged => {
            let mut held = held_mods.borrow_mut();
            if held.insert(keycode) {
                (true, false)
            } else {
                held.remove(&keycode);
                (false, true)
            }
        }
        _ => return Some(event.clone()),
    };

    let swallow = dispatcher.dispatch(RawKeyEvent {
        key,
        down,
        up,
        injected: false,
    });

    if swallow {
        None
    } else {
        Some(event.clone())
    }
}
