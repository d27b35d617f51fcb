//! Windows pump backend: `WH_KEYBOARD_LL` low-level keyboard hook.
//!
//! The hook procedure runs on the pump thread, inside the OS input path,
//! and must return quickly — it only decodes the record, hands it to the
//! registry dispatcher, and reports the swallow decision. Events carrying
//! `LLKHF_INJECTED` (our own `SendInput` output included) pass through
//! without touching any hotkey state.

use std::ffi::c_void;
use std::ptr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc;
use std::sync::{Mutex, PoisonError};
use std::thread;

use crate::hook::keys::KeyId;
use crate::hook::registry::Dispatcher;
use crate::hook::HotkeyError;

use super::{PumpHandle, RawKeyEvent};

const WH_KEYBOARD_LL: i32 = 13;
const HC_ACTION: i32 = 0;
const WM_KEYDOWN: u32 = 0x0100;
const WM_KEYUP: u32 = 0x0101;
const WM_SYSKEYDOWN: u32 = 0x0104;
const WM_SYSKEYUP: u32 = 0x0105;
const WM_QUIT: u32 = 0x0012;
const LLKHF_INJECTED: u32 = 0x0000_0010;

#[link(name = "user32")]
extern "system" {
    fn SetWindowsHookExW(
        id_hook: i32,
        lpfn: unsafe extern "system" fn(i32, usize, isize) -> isize,
        h_mod: *const c_void,
        dw_thread_id: u32,
    ) -> isize;
    fn UnhookWindowsHookEx(h_hook: isize) -> i32;
    fn CallNextHookEx(h_hook: isize, n_code: i32, w_param: usize, l_param: isize) -> isize;
    fn GetMessageW(
        lp_msg: *mut Msg,
        h_wnd: *const c_void,
        w_msg_filter_min: u32,
        w_msg_filter_max: u32,
    ) -> i32;
    fn TranslateMessage(lp_msg: *const Msg) -> i32;
    fn DispatchMessageW(lp_msg: *const Msg) -> isize;
    fn PostThreadMessageW(id_thread: u32, msg: u32, w_param: usize, l_param: isize) -> i32;
    fn GetCurrentThreadId() -> u32;
}

#[link(name = "kernel32")]
extern "system" {
    fn GetLastError() -> u32;
}

#[repr(C)]
#[derive(Default)]
struct Msg {
    hwnd: usize,
    message: u32,
    w_param: usize,
    l_param: isize,
    time: u32,
    pt_x: i32,
    pt_y: i32,
}

#[repr(C)]
struct KbdLlHookStruct {
    vk_code: u32,
    scan_code: u32,
    flags: u32,
    time: u32,
    dw_extra_info: usize,
}

/// The hook procedure has no user-data parameter, so live dispatchers are
/// parked here. Each entry is tagged with its pump's generation: an
/// exiting pump thread removes only its own entry, so a detached pump
/// that finally unwinds cannot disable a newer one, and two registries
/// with separate pumps both keep dispatching.
static ACTIVE: Mutex<Vec<(u64, Dispatcher)>> = Mutex::new(Vec::new());
static NEXT_GENERATION: AtomicU64 = AtomicU64::new(0);

fn active_lock() -> std::sync::MutexGuard<'static, Vec<(u64, Dispatcher)>> {
    ACTIVE.lock().unwrap_or_else(PoisonError::into_inner)
}

fn register_dispatcher(generation: u64, dispatcher: Dispatcher) {
    active_lock().push((generation, dispatcher));
}

fn unregister_dispatcher(generation: u64) {
    active_lock().retain(|(owner, _)| *owner != generation);
}

unsafe extern "system" fn hook_proc(n_code: i32, w_param: usize, l_param: isize) -> isize {
    if n_code == HC_ACTION {
        // SAFETY: for WH_KEYBOARD_LL with HC_ACTION, l_param points to a
        // live KBDLLHOOKSTRUCT for the duration of the call.
        let record = unsafe { &*(l_param as *const KbdLlHookStruct) };
        let message = w_param as u32;
        let injected = record.flags & LLKHF_INJECTED != 0;

        if !injected {
            let event = RawKeyEvent {
                key: KeyId::from_raw(record.vk_code),
                down: matches!(message, WM_KEYDOWN | WM_SYSKEYDOWN),
                up: matches!(message, WM_KEYUP | WM_SYSKEYUP),
                injected: false,
            };
            // Clone out so no dispatch runs under the slot lock. With two
            // hooks installed every pump sees the event through each
            // proc; the state machines are idempotent per transition, so
            // the duplicate delivery changes nothing.
            let dispatchers: Vec<Dispatcher> = active_lock()
                .iter()
                .map(|(_, dispatcher)| dispatcher.clone())
                .collect();
            let mut swallow = false;
            for dispatcher in &dispatchers {
                swallow |= dispatcher.dispatch(event);
            }
            if swallow {
                // Nonzero stops propagation to every later hook and the
                // focused application.
                return 1;
            }
        }
    }
    unsafe { CallNextHookEx(0, n_code, w_param, l_param) }
}

pub(super) fn spawn(dispatcher: Dispatcher) -> Result<PumpHandle, HotkeyError> {
    let (ready_tx, ready_rx) = mpsc::channel();
    let (done_tx, done_rx) = mpsc::channel();

    let join = thread::Builder::new()
        .name("hotkey-pump".to_owned())
        .spawn(move || {
            let generation = NEXT_GENERATION.fetch_add(1, Ordering::Relaxed);
            register_dispatcher(generation, dispatcher);

            // SAFETY: hook_proc matches the LowLevelKeyboardProc contract;
            // a null module handle is valid for low-level hooks.
            let hook = unsafe { SetWindowsHookExW(WH_KEYBOARD_LL, hook_proc, ptr::null(), 0) };
            if hook == 0 {
                let code = unsafe { GetLastError() };
                unregister_dispatcher(generation);
                let _ = ready_tx.send(Err(code));
                let _ = done_tx.send(());
                return;
            }

            let thread_id = unsafe { GetCurrentThreadId() };
            let _ = ready_tx.send(Ok(thread_id));
            tracing::info!(thread_id, "keyboard hook installed");

            let mut msg = Msg::default();
            loop {
                // Blocks until the OS delivers input or WM_QUIT arrives;
                // GetMessageW returns 0 for WM_QUIT.
                let ret = unsafe { GetMessageW(&mut msg, ptr::null(), 0, 0) };
                if ret <= 0 {
                    break;
                }
                unsafe {
                    TranslateMessage(&msg);
                    DispatchMessageW(&msg);
                }
            }

            // Skipping this leaks the hook for the life of the process.
            if unsafe { UnhookWindowsHookEx(hook) } == 0 {
                tracing::error!("UnhookWindowsHookEx failed; hook may be leaked");
            }
            unregister_dispatcher(generation);
            tracing::info!("keyboard hook removed");
            let _ = done_tx.send(());
        })
        .map_err(|e| HotkeyError::HookInstall(e.to_string()))?;

    match ready_rx.recv() {
        Ok(Ok(thread_id)) => Ok(PumpHandle::new(
            move || {
                // Wakes GetMessageW so the loop can exit.
                // SAFETY: posting to a thread id is always safe; a stale id
                // is a no-op failure.
                unsafe {
                    PostThreadMessageW(thread_id, WM_QUIT, 0, 0);
                }
            },
            done_rx,
            join,
        )),
        Ok(Err(code)) => {
            let _ = join.join();
            Err(HotkeyError::HookInstall(format!(
                "SetWindowsHookExW failed (os error {code})"
            )))
        }
        Err(_) => {
            let _ = join.join();
            Err(HotkeyError::HookInstall(
                "pump thread exited before reporting readiness".to_owned(),
            ))
        }
    }
}
