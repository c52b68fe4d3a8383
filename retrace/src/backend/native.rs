use super::AutomationBackend;
use crate::action::Button;
use crate::error::{Result, RetraceError};
use crate::keys::CanonicalKey;
use enigo::{
    Axis, Button as EnigoButton, Coordinate, Direction, Enigo, Key, Keyboard, Mouse,
    Settings as EnigoSettings,
};
use tracing::debug;

/// Input synthesis through the operating system, backed by `enigo`
pub struct EnigoBackend {
    enigo: Enigo,
}

impl EnigoBackend {
    pub fn new() -> Result<Self> {
        debug!("Connecting to the platform input synthesis API");
        let enigo = Enigo::new(&EnigoSettings::default())
            .map_err(|e| RetraceError::InitializationError(format!("input synthesis: {}", e)))?;
        Ok(Self { enigo })
    }
}

fn failure(action: impl Into<String>, reason: impl ToString) -> RetraceError {
    RetraceError::BackendSynthesisFailure {
        action: action.into(),
        reason: reason.to_string(),
    }
}

fn to_enigo_button(button: Button) -> EnigoButton {
    match button {
        Button::Left => EnigoButton::Left,
        Button::Right => EnigoButton::Right,
        Button::Middle => EnigoButton::Middle,
    }
}

/// Map a canonical key name onto a key the platform can synthesize
fn to_enigo_key(key: &CanonicalKey) -> Option<Key> {
    if let Some(c) = key.as_char() {
        return Some(Key::Unicode(c));
    }

    let key = match key.as_str() {
        "alt" | "altleft" | "altright" | "option" | "optionleft" | "optionright" => Key::Alt,
        "ctrl" | "ctrlleft" | "ctrlright" => Key::Control,
        "shift" | "shiftleft" | "shiftright" => Key::Shift,
        "win" | "winleft" | "winright" | "command" => Key::Meta,
        "backspace" => Key::Backspace,
        "capslock" => Key::CapsLock,
        "delete" => Key::Delete,
        "down" => Key::DownArrow,
        "end" => Key::End,
        "enter" | "return" => Key::Return,
        "esc" | "escape" => Key::Escape,
        "home" => Key::Home,
        "left" => Key::LeftArrow,
        "pagedown" => Key::PageDown,
        "pageup" => Key::PageUp,
        "right" => Key::RightArrow,
        "space" => Key::Space,
        "tab" => Key::Tab,
        "up" => Key::UpArrow,
        "f1" => Key::F1,
        "f2" => Key::F2,
        "f3" => Key::F3,
        "f4" => Key::F4,
        "f5" => Key::F5,
        "f6" => Key::F6,
        "f7" => Key::F7,
        "f8" => Key::F8,
        "f9" => Key::F9,
        "f10" => Key::F10,
        "f11" => Key::F11,
        "f12" => Key::F12,
        "add" => Key::Unicode('+'),
        "subtract" => Key::Unicode('-'),
        "multiply" => Key::Unicode('*'),
        "divide" => Key::Unicode('/'),
        "decimal" => Key::Unicode('.'),
        name => {
            let digit = name.strip_prefix("num")?.parse::<u32>().ok()?;
            Key::Unicode(char::from_digit(digit, 10)?)
        }
    };
    Some(key)
}

impl EnigoBackend {
    fn key(&mut self, action: &str, key: &CanonicalKey, direction: Direction) -> Result<()> {
        let enigo_key = to_enigo_key(key)
            .ok_or_else(|| failure(format!("{}('{}')", action, key), "key cannot be synthesized on this platform"))?;
        self.enigo
            .key(enigo_key, direction)
            .map_err(|e| failure(format!("{}('{}')", action, key), e))
    }

    fn button(&mut self, action: &str, x: i32, y: i32, button: Button, direction: Direction) -> Result<()> {
        let describe = || format!("{}({}, {}, '{}')", action, x, y, button.as_str());
        self.enigo
            .move_mouse(x, y, Coordinate::Abs)
            .map_err(|e| failure(describe(), e))?;
        self.enigo
            .button(to_enigo_button(button), direction)
            .map_err(|e| failure(describe(), e))
    }
}

impl AutomationBackend for EnigoBackend {
    fn move_cursor(&mut self, x: i32, y: i32) -> Result<()> {
        self.enigo
            .move_mouse(x, y, Coordinate::Abs)
            .map_err(|e| failure(format!("moveTo({}, {})", x, y), e))
    }

    fn button_down(&mut self, x: i32, y: i32, button: Button) -> Result<()> {
        self.button("mouseDown", x, y, button, Direction::Press)
    }

    fn button_up(&mut self, x: i32, y: i32, button: Button) -> Result<()> {
        self.button("mouseUp", x, y, button, Direction::Release)
    }

    fn scroll(&mut self, dy: i64) -> Result<()> {
        let describe = || format!("scroll({})", dy);
        let length = i32::try_from(dy).map_err(|e| failure(describe(), e))?;
        // enigo scrolls towards the user for positive lengths
        self.enigo
            .scroll(-length, Axis::Vertical)
            .map_err(|e| failure(describe(), e))
    }

    fn key_down(&mut self, key: &CanonicalKey) -> Result<()> {
        self.key("keyDown", key, Direction::Press)
    }

    fn key_up(&mut self, key: &CanonicalKey) -> Result<()> {
        self.key("keyUp", key, Direction::Release)
    }

    fn press(&mut self, key: &CanonicalKey) -> Result<()> {
        self.key("press", key, Direction::Click)
    }
}
