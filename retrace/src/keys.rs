//! Mapping from platform key codes to portable key names.
//!
//! The table is built once for the running platform and handed to the encoder;
//! lookups never mutate it. Character keys do not go through the table at all,
//! the character itself is the canonical name.

use crate::events::KeySymbol;
use rdev::Key;
use std::fmt;

/// Operating system family, used to pick platform specific key names
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Windows,
    MacOs,
    Linux,
}

impl Platform {
    /// The platform this binary was built for
    pub fn current() -> Self {
        if cfg!(target_os = "windows") {
            Platform::Windows
        } else if cfg!(target_os = "macos") {
            Platform::MacOs
        } else {
            Platform::Linux
        }
    }
}

/// A portable key name such as `"alt"`, `"f1"` or `"a"`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CanonicalKey(String);

impl CanonicalKey {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The character when this key is a single literal character
    pub fn as_char(&self) -> Option<char> {
        let mut chars = self.0.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => Some(c),
            _ => None,
        }
    }
}

impl From<char> for CanonicalKey {
    fn from(c: char) -> Self {
        Self(c.to_string())
    }
}

impl fmt::Display for CanonicalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Result of a key table lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyLookup {
    Found(CanonicalKey),
    /// The key has no canonical name; carries a description for diagnostics
    Unsupported(String),
}

// Names shared by every platform.
const BASE_KEYS: &[(Key, &str)] = &[
    (Key::Alt, "alt"),
    (Key::AltGr, "altright"),
    (Key::Backspace, "backspace"),
    (Key::CapsLock, "capslock"),
    (Key::ControlLeft, "ctrlleft"),
    (Key::ControlRight, "ctrlright"),
    (Key::Delete, "delete"),
    (Key::DownArrow, "down"),
    (Key::End, "end"),
    (Key::Escape, "esc"),
    (Key::F1, "f1"),
    (Key::F2, "f2"),
    (Key::F3, "f3"),
    (Key::F4, "f4"),
    (Key::F5, "f5"),
    (Key::F6, "f6"),
    (Key::F7, "f7"),
    (Key::F8, "f8"),
    (Key::F9, "f9"),
    (Key::F10, "f10"),
    (Key::F11, "f11"),
    (Key::F12, "f12"),
    (Key::Home, "home"),
    (Key::LeftArrow, "left"),
    (Key::MetaLeft, "winleft"),
    (Key::MetaRight, "winright"),
    (Key::PageDown, "pagedown"),
    (Key::PageUp, "pageup"),
    (Key::Return, "enter"),
    (Key::RightArrow, "right"),
    (Key::ShiftLeft, "shiftleft"),
    (Key::ShiftRight, "shiftright"),
    (Key::Space, "space"),
    (Key::Tab, "tab"),
    (Key::UpArrow, "up"),
    (Key::PrintScreen, "printscreen"),
    (Key::ScrollLock, "scrolllock"),
    (Key::Pause, "pause"),
    (Key::NumLock, "numlock"),
    (Key::Insert, "insert"),
    // Keypad
    (Key::KpReturn, "enter"),
    (Key::KpMinus, "subtract"),
    (Key::KpPlus, "add"),
    (Key::KpMultiply, "multiply"),
    (Key::KpDivide, "divide"),
    (Key::KpDelete, "decimal"),
    (Key::Kp0, "num0"),
    (Key::Kp1, "num1"),
    (Key::Kp2, "num2"),
    (Key::Kp3, "num3"),
    (Key::Kp4, "num4"),
    (Key::Kp5, "num5"),
    (Key::Kp6, "num6"),
    (Key::Kp7, "num7"),
    (Key::Kp8, "num8"),
    (Key::Kp9, "num9"),
    // Character keys reported without a character (key-up, or with modifiers held)
    (Key::KeyA, "a"),
    (Key::KeyB, "b"),
    (Key::KeyC, "c"),
    (Key::KeyD, "d"),
    (Key::KeyE, "e"),
    (Key::KeyF, "f"),
    (Key::KeyG, "g"),
    (Key::KeyH, "h"),
    (Key::KeyI, "i"),
    (Key::KeyJ, "j"),
    (Key::KeyK, "k"),
    (Key::KeyL, "l"),
    (Key::KeyM, "m"),
    (Key::KeyN, "n"),
    (Key::KeyO, "o"),
    (Key::KeyP, "p"),
    (Key::KeyQ, "q"),
    (Key::KeyR, "r"),
    (Key::KeyS, "s"),
    (Key::KeyT, "t"),
    (Key::KeyU, "u"),
    (Key::KeyV, "v"),
    (Key::KeyW, "w"),
    (Key::KeyX, "x"),
    (Key::KeyY, "y"),
    (Key::KeyZ, "z"),
    (Key::Num0, "0"),
    (Key::Num1, "1"),
    (Key::Num2, "2"),
    (Key::Num3, "3"),
    (Key::Num4, "4"),
    (Key::Num5, "5"),
    (Key::Num6, "6"),
    (Key::Num7, "7"),
    (Key::Num8, "8"),
    (Key::Num9, "9"),
    (Key::BackQuote, "`"),
    (Key::Minus, "-"),
    (Key::Equal, "="),
    (Key::LeftBracket, "["),
    (Key::RightBracket, "]"),
    (Key::SemiColon, ";"),
    (Key::Quote, "'"),
    (Key::BackSlash, "\\"),
    (Key::IntlBackslash, "\\"),
    (Key::Comma, ","),
    (Key::Dot, "."),
    (Key::Slash, "/"),
];

// macOS labels the modifier keys differently.
const MACOS_OVERRIDES: &[(Key, &str)] = &[
    (Key::Alt, "option"),
    (Key::AltGr, "optionright"),
    (Key::MetaLeft, "command"),
    (Key::MetaRight, "command"),
];

/// Immutable platform key code to canonical name table
#[derive(Debug, Clone)]
pub struct KeyTable {
    entries: Vec<(Key, &'static str)>,
}

impl KeyTable {
    /// Build the table for the given platform
    pub fn for_platform(platform: Platform) -> Self {
        let overrides: &[(Key, &str)] = match platform {
            Platform::MacOs => MACOS_OVERRIDES,
            Platform::Windows | Platform::Linux => &[],
        };

        let entries = BASE_KEYS
            .iter()
            .map(|&(key, name)| {
                let name = overrides
                    .iter()
                    .find(|(k, _)| *k == key)
                    .map_or(name, |&(_, n)| n);
                (key, name)
            })
            .collect();

        Self { entries }
    }

    /// Resolve a platform key code
    pub fn resolve_code(&self, key: Key) -> KeyLookup {
        match self.entries.iter().find(|(k, _)| *k == key) {
            Some(&(_, name)) => KeyLookup::Found(CanonicalKey::new(name)),
            None => KeyLookup::Unsupported(format!("{:?}", key)),
        }
    }

    /// Resolve any key symbol; characters map to themselves, except control
    /// characters which have no literal form
    pub fn resolve(&self, symbol: &KeySymbol) -> KeyLookup {
        match symbol {
            KeySymbol::Char(c) if c.is_control() => KeyLookup::Unsupported(format!("{:?}", c)),
            KeySymbol::Char(c) => KeyLookup::Found(CanonicalKey::from(*c)),
            KeySymbol::Code(key) => self.resolve_code(*key),
        }
    }
}
