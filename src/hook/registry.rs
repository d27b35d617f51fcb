//! Hotkey registry and pump lifecycle.
//!
//! One registry owns the set of live hotkeys and the pump thread. The
//! first registration starts the pump; removing the last hotkey stops it
//! and waits (bounded) for the hook to be uninstalled. All mutation is
//! serialized by a single lock with strictly bounded critical sections:
//! no I/O and no user callback runs while it is held, which is what makes
//! `remove` safe to call from inside a firing callback.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError, Weak};
use std::time::Duration;

use super::keys;
use super::pump::{self, PumpHandle, RawKeyEvent};
use super::scheduler::{self, Callback};
use super::state::HotkeyState;
use super::HotkeyError;

/// Default delay between a combo's full release and its callback running.
const DEFAULT_FIRE_DELAY: Duration = Duration::from_millis(20);

/// Token returned by [`HotkeyRegistry::add`], used to unregister.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HotkeyHandle {
    id: u64,
}

struct Registered {
    state: HotkeyState,
    callback: Callback,
}

struct RegistryInner {
    hotkeys: HashMap<u64, Registered>,
    next_id: u64,
    pump: Option<PumpHandle>,
    fire_delay: Duration,
}

/// Set of live global hotkeys plus the pump that feeds them.
///
/// Cloning yields another handle to the same registry. Use
/// [`HotkeyRegistry::global`] for the process-wide instance; independent
/// registries are mainly useful in tests.
#[derive(Clone)]
pub struct HotkeyRegistry {
    inner: Arc<Mutex<RegistryInner>>,
}

impl Default for HotkeyRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl HotkeyRegistry {
    /// Creates an empty registry with no pump running.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(RegistryInner {
                hotkeys: HashMap::new(),
                next_id: 0,
                pump: None,
                fire_delay: DEFAULT_FIRE_DELAY,
            })),
        }
    }

    /// The process-wide registry. Created on first use; at most one pump
    /// thread ever runs under it.
    pub fn global() -> &'static Self {
        static GLOBAL: OnceLock<HotkeyRegistry> = OnceLock::new();
        GLOBAL.get_or_init(Self::new)
    }

    fn lock(&self) -> MutexGuard<'_, RegistryInner> {
        // A poisoning panic can only come from a bug inside a bounded
        // critical section; the data is still consistent enough to serve.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Sets the debounce delay applied between full release and callback
    /// invocation. Affects subsequent firings.
    pub fn set_fire_delay(&self, delay: Duration) {
        self.lock().fire_delay = delay;
    }

    /// Registers `combo` (e.g. `"ctrl+alt+shift+q"`) with `callback`.
    ///
    /// Parsing is all-or-nothing and happens before any state changes. If
    /// the registry was empty the pump thread is started first; a hook
    /// installation failure leaves the registry unchanged.
    ///
    /// # Errors
    /// [`HotkeyError::UnrecognizedKey`], [`HotkeyError::InvalidCombo`] for
    /// bad combo strings; [`HotkeyError::HookInstall`] if the pump could
    /// not start.
    pub fn add(
        &self,
        combo: &str,
        callback: impl Fn() + Send + Sync + 'static,
    ) -> Result<HotkeyHandle, HotkeyError> {
        let combo_keys = keys::parse_combo(combo)?;

        let mut inner = self.lock();
        if inner.pump.is_none() {
            inner.pump = Some(pump::spawn(self.dispatcher())?);
        }

        let id = inner.next_id;
        inner.next_id += 1;
        inner.hotkeys.insert(
            id,
            Registered {
                state: HotkeyState::new(combo_keys),
                callback: Arc::new(callback),
            },
        );
        tracing::info!(combo, id, "hotkey registered");
        Ok(HotkeyHandle { id })
    }

    /// Unregisters one hotkey. When the last hotkey goes, the pump is
    /// signalled to stop and this call blocks (bounded) until the hook is
    /// uninstalled. Safe to call from within a firing callback, removing
    /// that callback's own hotkey included.
    pub fn remove(&self, handle: HotkeyHandle) {
        let pump = {
            let mut inner = self.lock();
            if inner.hotkeys.remove(&handle.id).is_none() {
                tracing::debug!(id = handle.id, "remove: unknown hotkey handle");
            } else {
                tracing::info!(id = handle.id, "hotkey unregistered");
            }
            if inner.hotkeys.is_empty() {
                inner.pump.take()
            } else {
                None
            }
        };
        // Stop outside the lock: the pump thread may be mid-dispatch and
        // about to take it.
        if let Some(pump) = pump {
            tracing::info!("last hotkey removed; stopping event pump");
            pump.stop();
        }
    }

    /// Unregisters every live hotkey and stops the pump. Full teardown for
    /// process shutdown.
    pub fn remove_all(&self) {
        let pump = {
            let mut inner = self.lock();
            let count = inner.hotkeys.len();
            inner.hotkeys.clear();
            if count > 0 {
                tracing::info!(count, "all hotkeys unregistered");
            }
            inner.pump.take()
        };
        if let Some(pump) = pump {
            pump.stop();
        }
    }

    /// Number of live hotkeys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().hotkeys.len()
    }

    /// True when no hotkey is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().hotkeys.is_empty()
    }

    /// Whether the pump thread currently exists.
    #[must_use]
    pub fn pump_running(&self) -> bool {
        self.lock().pump.is_some()
    }

    /// Weak dispatch path into this registry, handed to pump backends.
    pub(crate) fn dispatcher(&self) -> Dispatcher {
        Dispatcher {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Feeds one raw key transition to every registered hotkey and returns
    /// the combined swallow decision.
    ///
    /// This is the single dispatch path: platform pumps call it for real
    /// input, and tests call it to simulate input. Injected events pass
    /// through without touching any state. Left/right modifier variants
    /// are collapsed to generic form before the state machines see them.
    pub fn dispatch(&self, event: RawKeyEvent) -> bool {
        dispatch_on(&self.inner, event)
    }
}

/// Weak dispatch path handed to the pump thread. Weak so a pump that
/// outlives its registry (detached on shutdown timeout) cannot keep the
/// registry alive or dispatch into freed state.
#[derive(Clone)]
pub(crate) struct Dispatcher {
    inner: Weak<Mutex<RegistryInner>>,
}

impl Dispatcher {
    pub(crate) fn dispatch(&self, event: RawKeyEvent) -> bool {
        self.inner
            .upgrade()
            .is_some_and(|inner| dispatch_on(&inner, event))
    }
}

fn dispatch_on(inner: &Mutex<RegistryInner>, event: RawKeyEvent) -> bool {
    if event.injected {
        return false;
    }
    let key = keys::to_generic(event.key);

    let mut guard = inner.lock().unwrap_or_else(PoisonError::into_inner);
    let fire_delay = guard.fire_delay;
    let mut swallow = false;
    let mut fired: Vec<Callback> = Vec::new();
    // The lock is the snapshot: add/remove from other threads serialize
    // against this iteration, and callbacks are only scheduled after it
    // ends, so a callback unregistering mid-flight cannot corrupt it.
    for registered in guard.hotkeys.values_mut() {
        let outcome = registered.state.on_event(key, event.down, event.up);
        swallow |= outcome.swallow;
        if outcome.fired {
            fired.push(Arc::clone(&registered.callback));
        }
    }
    drop(guard);

    for callback in fired {
        scheduler::schedule(fire_delay, callback);
    }
    swallow
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hook::keys::{resolve, KeyId, ALT, CTRL, ESC, LCTRL, LSHIFT, RCTRL, SHIFT};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc;

    const FIRE_WAIT: Duration = Duration::from_secs(2);
    const QUIET_WAIT: Duration = Duration::from_millis(150);

    /// Registry with a short fire delay and a channel observing firings.
    fn registry_with_probe(combo: &str) -> (HotkeyRegistry, mpsc::Receiver<()>) {
        let registry = HotkeyRegistry::new();
        registry.set_fire_delay(Duration::from_millis(1));
        let (tx, rx) = mpsc::channel();
        registry
            .add(combo, move || {
                let _ = tx.send(());
            })
            .unwrap();
        (registry, rx)
    }

    fn press(registry: &HotkeyRegistry, key: KeyId) -> bool {
        registry.dispatch(RawKeyEvent::down(key))
    }

    fn release(registry: &HotkeyRegistry, key: KeyId) -> bool {
        registry.dispatch(RawKeyEvent::up(key))
    }

    #[test]
    fn add_rejects_bad_combos_without_side_effects() {
        let registry = HotkeyRegistry::new();
        assert!(matches!(
            registry.add("", || {}),
            Err(HotkeyError::InvalidCombo(_))
        ));
        assert!(matches!(
            registry.add("ctrl+nosuchkey", || {}),
            Err(HotkeyError::UnrecognizedKey(_))
        ));
        assert!(registry.is_empty());
        assert!(!registry.pump_running());
    }

    #[test]
    fn pump_lifecycle_follows_registrations() {
        let registry = HotkeyRegistry::new();
        assert!(!registry.pump_running());

        let first = registry.add("esc", || {}).unwrap();
        assert!(registry.pump_running());
        let second = registry.add("ctrl+q", || {}).unwrap();
        assert!(registry.pump_running());

        registry.remove(first);
        assert!(registry.pump_running(), "one hotkey still live");
        registry.remove(second);
        assert!(!registry.pump_running(), "last removal stops the pump");

        // A later registration starts a fresh pump.
        registry.add("esc", || {}).unwrap();
        assert!(registry.pump_running());
        registry.remove_all();
        assert!(!registry.pump_running());
    }

    #[test]
    fn full_cycle_fires_exactly_once() {
        let (registry, rx) = registry_with_probe("ctrl+alt+shift+q");
        let q = resolve("q").unwrap();

        // Press in arbitrary order; q's down is swallowed once armed.
        assert!(!press(&registry, SHIFT));
        assert!(!press(&registry, CTRL));
        assert!(!press(&registry, ALT));
        assert!(press(&registry, q), "completing down arms and is swallowed");
        assert!(press(&registry, q), "member down swallowed while active");

        // Release in a different order.
        assert!(!release(&registry, q));
        assert!(!release(&registry, SHIFT));
        assert!(!release(&registry, ALT));
        assert!(!release(&registry, CTRL));

        rx.recv_timeout(FIRE_WAIT).unwrap();
        assert!(
            rx.recv_timeout(QUIET_WAIT).is_err(),
            "exactly one firing per cycle"
        );
    }

    #[test]
    fn esc_hotkey_restarts_every_cycle() {
        let (registry, rx) = registry_with_probe("esc");

        for _ in 0..2 {
            press(&registry, ESC);
            release(&registry, ESC);
            rx.recv_timeout(FIRE_WAIT).unwrap();
        }
        assert!(rx.recv_timeout(QUIET_WAIT).is_err());
    }

    #[test]
    fn injected_events_never_touch_state() {
        let (registry, rx) = registry_with_probe("ctrl+q");
        let q = resolve("q").unwrap();

        let mut down = RawKeyEvent::down(CTRL);
        down.injected = true;
        assert!(!registry.dispatch(down), "injected events pass through");

        // If the injected ctrl had been recorded, this q would complete the
        // combo and be swallowed.
        assert!(!press(&registry, q), "combo must not arm from injected input");
        release(&registry, q);
        assert!(rx.recv_timeout(QUIET_WAIT).is_err(), "no firing");
    }

    #[test]
    fn left_and_right_variants_are_indistinguishable() {
        let (registry, rx) = registry_with_probe("ctrl+shift+q");
        let q = resolve("q").unwrap();

        press(&registry, RCTRL);
        press(&registry, LSHIFT);
        press(&registry, q);
        // Re-press through the *other* control variant; still swallowed.
        assert!(press(&registry, LCTRL));

        release(&registry, q);
        release(&registry, LSHIFT);
        release(&registry, RCTRL);
        rx.recv_timeout(FIRE_WAIT).unwrap();
    }

    #[test]
    fn removed_hotkey_goes_silent() {
        let registry = HotkeyRegistry::new();
        registry.set_fire_delay(Duration::from_millis(1));
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        let handle = registry
            .add("esc", move || {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        registry.remove(handle);

        assert!(!press(&registry, ESC), "no swallow after removal");
        assert!(!release(&registry, ESC));
        std::thread::sleep(QUIET_WAIT);
        assert_eq!(count.load(Ordering::SeqCst), 0, "no firing after removal");
    }

    #[test]
    fn overlapping_combos_fire_independently() {
        let registry = HotkeyRegistry::new();
        registry.set_fire_delay(Duration::from_millis(1));
        let (small_tx, small_rx) = mpsc::channel();
        let (large_tx, large_rx) = mpsc::channel();
        registry
            .add("ctrl+q", move || {
                let _ = small_tx.send(());
            })
            .unwrap();
        registry
            .add("ctrl+shift+q", move || {
                let _ = large_tx.send(());
            })
            .unwrap();
        let q = resolve("q").unwrap();

        press(&registry, CTRL);
        press(&registry, SHIFT);
        press(&registry, q);
        release(&registry, q);
        release(&registry, SHIFT);
        release(&registry, CTRL);

        small_rx.recv_timeout(FIRE_WAIT).unwrap();
        large_rx.recv_timeout(FIRE_WAIT).unwrap();
    }

    #[test]
    fn callback_can_remove_its_own_hotkey() {
        let registry = HotkeyRegistry::new();
        registry.set_fire_delay(Duration::from_millis(1));
        let (tx, rx) = mpsc::channel();

        let handle_slot: Arc<Mutex<Option<HotkeyHandle>>> = Arc::new(Mutex::new(None));
        let handle = {
            let registry = registry.clone();
            let handle_slot = Arc::clone(&handle_slot);
            registry
                .clone()
                .add("esc", move || {
                    if let Some(handle) = handle_slot.lock().unwrap().take() {
                        registry.remove(handle);
                    }
                    let _ = tx.send(());
                })
                .unwrap()
        };
        *handle_slot.lock().unwrap() = Some(handle);

        press(&registry, ESC);
        release(&registry, ESC);

        rx.recv_timeout(FIRE_WAIT).unwrap();
        // Wait for the self-removal (and pump shutdown) to settle.
        let deadline = std::time::Instant::now() + FIRE_WAIT;
        while registry.pump_running() && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        assert!(registry.is_empty());
        assert!(!registry.pump_running());
    }

    #[test]
    fn concurrent_registration_from_other_threads() {
        let registry = HotkeyRegistry::new();
        let mut threads = Vec::new();
        for i in 0_u8..4 {
            let registry = registry.clone();
            threads.push(std::thread::spawn(move || {
                let combo = format!("ctrl+{}", char::from(b'a' + i));
                registry.add(&combo, || {}).unwrap()
            }));
        }
        let handles: Vec<_> = threads.into_iter().map(|t| t.join().unwrap()).collect();
        assert_eq!(registry.len(), 4);
        for handle in handles {
            registry.remove(handle);
        }
        assert!(!registry.pump_running());
    }
}
