//! Key name resolution and modifier alias collapsing.
//!
//! Key identities use Windows virtual-key numbering on every platform; the
//! macOS pump translates hardware keycodes into this space at the edge.
//! Combos and held-key sets store modifiers in *generic* form only — the
//! left/right hardware variants are rewritten through [`to_generic`] before
//! anything downstream sees them.

use std::collections::HashSet;

use super::HotkeyError;

/// Opaque identifier for one hardware key (a virtual-key code).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeyId(u32);

impl KeyId {
    pub(crate) const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// The underlying virtual-key code.
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

/// Generic control modifier.
pub const CTRL: KeyId = KeyId(0x11);
/// Generic alt modifier.
pub const ALT: KeyId = KeyId(0x12);
/// Generic shift modifier.
pub const SHIFT: KeyId = KeyId(0x10);
/// Generic win/cmd modifier (shares the left-variant code).
pub const WIN: KeyId = KeyId(0x5B);
/// Escape.
pub const ESC: KeyId = KeyId(0x1B);

/// Left control variant.
pub const LCTRL: KeyId = KeyId(0xA2);
/// Right control variant.
pub const RCTRL: KeyId = KeyId(0xA3);
/// Left alt variant.
pub const LALT: KeyId = KeyId(0xA4);
/// Right alt variant.
pub const RALT: KeyId = KeyId(0xA5);
/// Left shift variant.
pub const LSHIFT: KeyId = KeyId(0xA0);
/// Right shift variant.
pub const RSHIFT: KeyId = KeyId(0xA1);
/// Left win/cmd variant (same code as the generic id).
pub const LWIN: KeyId = KeyId(0x5B);
/// Right win/cmd variant.
pub const RWIN: KeyId = KeyId(0x5C);

/// Variant → generic rewrite table. LWIN is its own generic form.
const MOD_ALIASES: &[(KeyId, KeyId)] = &[
    (LCTRL, CTRL),
    (RCTRL, CTRL),
    (LALT, ALT),
    (RALT, ALT),
    (LSHIFT, SHIFT),
    (RSHIFT, SHIFT),
    (RWIN, WIN),
];

/// Symbolic key names recognized by [`resolve`], lower-case.
const NAMED_KEYS: &[(&str, KeyId)] = &[
    ("ctrl", CTRL),
    ("alt", ALT),
    ("shift", SHIFT),
    ("win", WIN),
    ("cmd", WIN),
    ("super", WIN),
    ("meta", WIN),
    ("esc", ESC),
    ("space", KeyId(0x20)),
    ("tab", KeyId(0x09)),
    ("enter", KeyId(0x0D)),
    ("backspace", KeyId(0x08)),
    ("f1", KeyId(0x70)),
    ("f2", KeyId(0x71)),
    ("f3", KeyId(0x72)),
    ("f4", KeyId(0x73)),
    ("f5", KeyId(0x74)),
    ("f6", KeyId(0x75)),
    ("f7", KeyId(0x76)),
    ("f8", KeyId(0x77)),
    ("f9", KeyId(0x78)),
    ("f10", KeyId(0x79)),
    ("f11", KeyId(0x7A)),
    ("f12", KeyId(0x7B)),
];

/// Collapses a left/right modifier variant to its generic id.
///
/// Non-modifier keys pass through unchanged. Applied to every incoming raw
/// event so state machines never reason about left/right distinctions.
#[must_use]
pub fn to_generic(key: KeyId) -> KeyId {
    MOD_ALIASES
        .iter()
        .find(|(variant, _)| *variant == key)
        .map_or(key, |(_, generic)| *generic)
}

/// Returns the left/right hardware variants of a generic modifier, or
/// `None` for non-modifier keys. Used when synthesizing release events.
#[must_use]
pub fn variants(generic: KeyId) -> Option<[KeyId; 2]> {
    match generic {
        CTRL => Some([LCTRL, RCTRL]),
        ALT => Some([LALT, RALT]),
        SHIFT => Some([LSHIFT, RSHIFT]),
        WIN => Some([LWIN, RWIN]),
        _ => None,
    }
}

/// Resolves a human-readable key token ("ctrl", "a", "esc") to a key id.
///
/// Case-insensitive. Single printable characters go through the platform's
/// character-to-keycode translation for the current layout.
///
/// # Errors
/// [`HotkeyError::UnrecognizedKey`] if the token maps to nothing.
pub fn resolve(name: &str) -> Result<KeyId, HotkeyError> {
    let lower = name.to_lowercase();
    if let Some((_, key)) = NAMED_KEYS.iter().find(|(n, _)| *n == lower) {
        return Ok(*key);
    }
    let mut chars = lower.chars();
    if let (Some(c), None) = (chars.next(), chars.next()) {
        if let Some(key) = char_to_key(c) {
            return Ok(key);
        }
    }
    Err(HotkeyError::UnrecognizedKey(name.to_owned()))
}

/// Parses a `+`-joined combo string into a set of generic key ids.
///
/// Order is irrelevant and duplicate tokens collapse. All tokens are
/// resolved before anything else happens, so a bad combo mutates no state.
///
/// # Errors
/// [`HotkeyError::InvalidCombo`] for empty combos or empty tokens,
/// [`HotkeyError::UnrecognizedKey`] for unresolvable tokens.
pub fn parse_combo(text: &str) -> Result<HashSet<KeyId>, HotkeyError> {
    let mut combo = HashSet::new();
    for token in text.split('+') {
        let token = token.trim();
        if token.is_empty() {
            return Err(HotkeyError::InvalidCombo(format!(
                "empty token in {text:?}"
            )));
        }
        combo.insert(to_generic(resolve(token)?));
    }
    if combo.is_empty() {
        return Err(HotkeyError::InvalidCombo("combo has no keys".to_owned()));
    }
    Ok(combo)
}

/// Layout-aware character lookup via `VkKeyScanW`.
#[cfg(windows)]
fn char_to_key(c: char) -> Option<KeyId> {
    #[link(name = "user32")]
    extern "system" {
        fn VkKeyScanW(ch: u16) -> i16;
    }

    let mut units = [0_u16; 2];
    let encoded = c.encode_utf16(&mut units);
    if encoded.len() != 1 {
        return None;
    }
    // SAFETY: VkKeyScanW has no preconditions beyond a plain UTF-16 unit.
    let scan = unsafe { VkKeyScanW(encoded[0]) };
    if scan == -1 {
        None
    } else {
        // Low byte is the virtual-key code; high byte is shift state, which
        // combos do not encode.
        Some(KeyId(u32::from(scan as u16 & 0xFF)))
    }
}

/// ASCII identity lookup for platforms without a layout translation API
/// wired in. Letters and digits share their VK code with their ASCII value.
#[cfg(not(windows))]
fn char_to_key(c: char) -> Option<KeyId> {
    let upper = c.to_ascii_uppercase();
    if upper.is_ascii_uppercase() || upper.is_ascii_digit() {
        Some(KeyId(upper as u32))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_named_keys() {
        assert_eq!(resolve("ctrl").unwrap(), CTRL);
        assert_eq!(resolve("alt").unwrap(), ALT);
        assert_eq!(resolve("shift").unwrap(), SHIFT);
        assert_eq!(resolve("esc").unwrap(), ESC);
        assert_eq!(resolve("win").unwrap(), resolve("cmd").unwrap());
    }

    #[test]
    fn resolve_is_case_insensitive() {
        assert_eq!(resolve("CTRL").unwrap(), resolve("ctrl").unwrap());
        assert_eq!(resolve("Esc").unwrap(), ESC);
        assert_eq!(resolve("Q").unwrap(), resolve("q").unwrap());
    }

    #[test]
    fn resolve_single_characters() {
        assert_eq!(resolve("a").unwrap().raw(), 0x41);
        assert_eq!(resolve("z").unwrap().raw(), 0x5A);
        assert_eq!(resolve("7").unwrap().raw(), 0x37);
    }

    #[test]
    fn resolve_rejects_unknown_tokens() {
        assert!(matches!(
            resolve("notakey"),
            Err(HotkeyError::UnrecognizedKey(_))
        ));
        assert!(matches!(resolve(""), Err(HotkeyError::UnrecognizedKey(_))));
    }

    #[test]
    fn parse_combo_collapses_duplicates_and_ignores_order() {
        let a = parse_combo("ctrl+alt+q").unwrap();
        let b = parse_combo("q+CTRL+alt+ctrl").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 3);
    }

    #[test]
    fn parse_combo_rejects_degenerate_input() {
        assert!(matches!(parse_combo(""), Err(HotkeyError::InvalidCombo(_))));
        assert!(matches!(
            parse_combo("ctrl+"),
            Err(HotkeyError::InvalidCombo(_))
        ));
        assert!(matches!(
            parse_combo("ctrl+bogus"),
            Err(HotkeyError::UnrecognizedKey(_))
        ));
    }

    #[test]
    fn generic_collapse_covers_all_variants() {
        assert_eq!(to_generic(LCTRL), CTRL);
        assert_eq!(to_generic(RCTRL), CTRL);
        assert_eq!(to_generic(LALT), ALT);
        assert_eq!(to_generic(RALT), ALT);
        assert_eq!(to_generic(LSHIFT), SHIFT);
        assert_eq!(to_generic(RSHIFT), SHIFT);
        assert_eq!(to_generic(LWIN), WIN);
        assert_eq!(to_generic(RWIN), WIN);
    }

    #[test]
    fn generic_collapse_passes_ordinary_keys_through() {
        let q = resolve("q").unwrap();
        assert_eq!(to_generic(q), q);
        assert_eq!(to_generic(ESC), ESC);
    }

    #[test]
    fn variants_round_trip_through_generic() {
        for generic in [CTRL, ALT, SHIFT, WIN] {
            for variant in variants(generic).unwrap() {
                assert_eq!(to_generic(variant), generic);
            }
        }
        assert!(variants(ESC).is_none());
    }
}
