//! Per-hotkey state machine.
//!
//! Two states: `Idle` (not all combo keys held) and `Active` (the full
//! combo was observed held and has not been fully released since). The
//! callback fires on *full release*, not on the all-keys-down edge — the
//! combo can be held without mid-hold side effects, matching a
//! push-to-release interaction model.

use std::collections::HashSet;

use super::keys::KeyId;

/// Result of feeding one key transition to a hotkey's state machine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeyOutcome {
    /// The event should be suppressed from reaching other applications.
    pub swallow: bool,
    /// The combo completed a hold-and-release cycle; schedule the callback.
    pub fired: bool,
}

/// Held-key tracker for one registered combination.
///
/// Mutated only from the pump thread's dispatch path; the registry lock
/// serializes access from everywhere else. Keys arrive already collapsed
/// to generic form.
#[derive(Debug)]
pub struct HotkeyState {
    combo: HashSet<KeyId>,
    held: HashSet<KeyId>,
    active: bool,
}

impl HotkeyState {
    /// Creates the machine in `Idle` with nothing held.
    #[must_use]
    pub fn new(combo: HashSet<KeyId>) -> Self {
        Self {
            combo,
            held: HashSet::new(),
            active: false,
        }
    }

    /// Whether the combo is currently armed (fully held at least once
    /// since the last full release).
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.active
    }

    /// Feeds one key transition through the machine.
    ///
    /// Down-events of combo members are swallowed while the combo is
    /// active; everything else passes through. Repeated down-events for an
    /// already-held key are idempotent.
    pub fn on_event(&mut self, key: KeyId, down: bool, up: bool) -> KeyOutcome {
        if down {
            self.held.insert(key);
        } else if up {
            self.held.remove(&key);
        }

        if !self.active && self.combo.is_subset(&self.held) {
            self.active = true;
        }

        let mut fired = false;
        if self.active && self.held.is_disjoint(&self.combo) {
            // Every combo key has been released; one full cycle complete.
            self.active = false;
            self.held.clear();
            fired = true;
        }

        KeyOutcome {
            swallow: self.active && down && self.combo.contains(&key),
            fired,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hook::keys::{parse_combo, resolve, CTRL, ESC, SHIFT};

    fn machine(combo: &str) -> HotkeyState {
        HotkeyState::new(parse_combo(combo).unwrap())
    }

    fn press(state: &mut HotkeyState, key: KeyId) -> KeyOutcome {
        state.on_event(key, true, false)
    }

    fn release(state: &mut HotkeyState, key: KeyId) -> KeyOutcome {
        state.on_event(key, false, true)
    }

    #[test]
    fn activates_in_any_press_order() {
        for order in [
            ["ctrl", "shift", "q"],
            ["q", "ctrl", "shift"],
            ["shift", "q", "ctrl"],
        ] {
            let mut state = machine("ctrl+shift+q");
            for name in order {
                assert!(!state.is_active());
                press(&mut state, resolve(name).unwrap());
            }
            assert!(state.is_active());
        }
    }

    #[test]
    fn fires_once_on_full_release() {
        let mut state = machine("ctrl+q");
        let q = resolve("q").unwrap();
        press(&mut state, CTRL);
        press(&mut state, q);
        assert!(state.is_active());

        let first = release(&mut state, q);
        assert!(!first.fired, "still partially held");
        let second = release(&mut state, CTRL);
        assert!(second.fired);
        assert!(!state.is_active());
    }

    #[test]
    fn repress_before_full_release_does_not_fire() {
        let mut state = machine("ctrl+q");
        let q = resolve("q").unwrap();
        press(&mut state, CTRL);
        press(&mut state, q);

        // Release and re-press one member while the other stays held.
        assert!(!release(&mut state, q).fired);
        assert!(!press(&mut state, q).fired);
        assert!(state.is_active());

        assert!(!release(&mut state, q).fired);
        assert!(release(&mut state, CTRL).fired);
    }

    #[test]
    fn repeated_down_events_are_idempotent() {
        let mut state = machine("ctrl+q");
        let q = resolve("q").unwrap();
        press(&mut state, CTRL);
        for _ in 0..5 {
            assert!(!press(&mut state, q).fired);
        }
        assert!(state.is_active());
        release(&mut state, q);
        let outcome = release(&mut state, CTRL);
        assert!(outcome.fired);
    }

    #[test]
    fn swallow_only_combo_member_downs_while_active() {
        let mut state = machine("ctrl+q");
        let q = resolve("q").unwrap();
        let x = resolve("x").unwrap();

        // Arming: an incomplete down passes through; the completing down
        // is already swallowed.
        assert!(!press(&mut state, CTRL).swallow);
        assert!(press(&mut state, q).swallow);

        // Active: member downs swallowed, outsiders and ups pass through.
        assert!(press(&mut state, CTRL).swallow);
        assert!(press(&mut state, CTRL).swallow);
        assert!(!press(&mut state, x).swallow);
        assert!(!release(&mut state, x).swallow);
        assert!(!release(&mut state, q).swallow);
    }

    #[test]
    fn firing_release_is_not_swallowed() {
        let mut state = machine("esc");
        press(&mut state, ESC);
        assert!(state.is_active());
        let outcome = release(&mut state, ESC);
        assert!(outcome.fired);
        assert!(!outcome.swallow);
    }

    #[test]
    fn cycles_indefinitely() {
        let mut state = machine("esc");
        for _ in 0..3 {
            assert!(press(&mut state, ESC).swallow);
            assert!(release(&mut state, ESC).fired);
            assert!(!state.is_active());
        }
    }

    #[test]
    fn unrelated_keys_do_not_arm_the_combo() {
        let mut state = machine("ctrl+shift+q");
        press(&mut state, CTRL);
        press(&mut state, SHIFT);
        press(&mut state, resolve("x").unwrap());
        assert!(!state.is_active());
    }
}
