use serde::{Deserialize, Serialize};

/// Represents a position on the screen
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

impl Position {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Represents the mouse button reported by the input hook
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
    /// Any other button (side buttons, vendor specific), with the raw id
    Other(u8),
}

/// The key identity delivered with a keyboard event
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum KeySymbol {
    /// A printable character produced by the key, layout already applied
    Char(char),

    /// A platform key code without a printable character
    Code(rdev::Key),
}

/// A raw input event as delivered by the input hook.
///
/// Consumed exactly once by the action encoder and never retained.
#[derive(Debug, Clone, PartialEq)]
pub enum RawInputEvent {
    MouseMove {
        x: i32,
        y: i32,
    },
    MouseButton {
        x: i32,
        y: i32,
        button: MouseButton,
        pressed: bool,
    },
    MouseScroll {
        x: i32,
        y: i32,
        dx: i64,
        dy: i64,
    },
    KeyDown {
        symbol: KeySymbol,
    },
    KeyUp {
        symbol: KeySymbol,
    },
}

impl RawInputEvent {
    /// The key symbol carried by keyboard events
    pub fn key_symbol(&self) -> Option<&KeySymbol> {
        match self {
            RawInputEvent::KeyDown { symbol } | RawInputEvent::KeyUp { symbol } => Some(symbol),
            _ => None,
        }
    }
}
