use crate::{
    events::{KeySymbol, MouseButton, Position, RawInputEvent},
    Result, RetraceError,
};
use rdev::{Button, Event, EventType, Key};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use tracing::{debug, error, info};

/// Converts `rdev` events into raw input events.
///
/// Button and wheel events carry no position, so the last pointer position is
/// tracked here. The character a key produced on key-down is remembered so the
/// release resolves to the same key whatever the modifier state is by then.
#[derive(Debug, Default)]
pub struct EventTranslator {
    position: Option<Position>,
    held: Vec<(Key, char)>,
}

impl EventTranslator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Translate one hook event. Returns `None` for pointer events that arrive
    /// before any position is known.
    pub fn translate(&mut self, event: &Event) -> Option<RawInputEvent> {
        match event.event_type {
            EventType::MouseMove { x, y } => {
                let position = Position::new(x as i32, y as i32);
                self.position = Some(position);
                Some(RawInputEvent::MouseMove { x: position.x, y: position.y })
            }
            EventType::ButtonPress(button) => self.button(button, true),
            EventType::ButtonRelease(button) => self.button(button, false),
            EventType::Wheel { delta_x, delta_y } => {
                let Position { x, y } = self.position?;
                Some(RawInputEvent::MouseScroll { x, y, dx: delta_x, dy: delta_y })
            }
            EventType::KeyPress(key) => {
                let symbol = match printable(event.name.as_deref()) {
                    Some(c) => {
                        self.held.retain(|(k, _)| *k != key);
                        self.held.push((key, c));
                        KeySymbol::Char(c)
                    }
                    None => KeySymbol::Code(key),
                };
                Some(RawInputEvent::KeyDown { symbol })
            }
            EventType::KeyRelease(key) => {
                let symbol = match self.held.iter().position(|(k, _)| *k == key) {
                    Some(index) => KeySymbol::Char(self.held.remove(index).1),
                    None => KeySymbol::Code(key),
                };
                Some(RawInputEvent::KeyUp { symbol })
            }
        }
    }

    fn button(&self, button: Button, pressed: bool) -> Option<RawInputEvent> {
        let Position { x, y } = self.position?;
        let button = match button {
            Button::Left => MouseButton::Left,
            Button::Right => MouseButton::Right,
            Button::Middle => MouseButton::Middle,
            Button::Unknown(id) => MouseButton::Other(id),
        };
        Some(RawInputEvent::MouseButton { x, y, button, pressed })
    }
}

/// The character of a key event, when it is a single visible character
fn printable(name: Option<&str>) -> Option<char> {
    let mut chars = name?.chars();
    let c = chars.next()?;
    if chars.next().is_some() || c.is_control() || c.is_whitespace() {
        return None;
    }
    Some(c)
}

/// The global input hook.
///
/// The underlying listener cannot be unregistered once installed; stopping
/// the hook only stops events from being delivered to the handler.
pub struct InputHook {
    stop_indicator: Arc<AtomicBool>,
}

impl InputHook {
    /// Install the hook and deliver every translated event to `handler` on
    /// the listener thread
    pub fn start<F>(mut handler: F) -> Result<Self>
    where
        F: FnMut(RawInputEvent) + Send + 'static,
    {
        let stop_indicator = Arc::new(AtomicBool::new(false));
        let callback_stop_indicator = Arc::clone(&stop_indicator);

        debug!("Setting up input listener...");
        std::thread::Builder::new()
            .name("retrace-input-hook".to_string())
            .spawn(move || {
                let mut translator = EventTranslator::new();
                if let Err(error) = rdev::listen(move |event| {
                    if callback_stop_indicator.load(Ordering::SeqCst) {
                        return;
                    }
                    if let Some(raw) = translator.translate(&event) {
                        handler(raw);
                    }
                }) {
                    error!("Failed to listen for events: {:?}", error);
                }
                info!("Input listener thread has finished");
            })
            .map_err(|e| RetraceError::InitializationError(format!("input hook thread: {}", e)))?;

        Ok(Self { stop_indicator })
    }

    pub fn stop(&self) {
        self.stop_indicator.store(true, Ordering::SeqCst);
        info!("Input hook stop signal sent. The underlying listener stays installed until the program exits.");
    }
}

impl Drop for InputHook {
    fn drop(&mut self) {
        self.stop_indicator.store(true, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::SystemTime;

    fn event(event_type: EventType, name: Option<&str>) -> Event {
        Event {
            time: SystemTime::now(),
            name: name.map(str::to_string),
            event_type,
        }
    }

    #[test]
    fn test_buttons_before_any_move_are_dropped() {
        let mut translator = EventTranslator::new();
        assert_eq!(translator.translate(&event(EventType::ButtonPress(Button::Left), None)), None);
        assert_eq!(
            translator.translate(&event(EventType::Wheel { delta_x: 0, delta_y: 1 }, None)),
            None
        );
    }

    #[test]
    fn test_buttons_use_last_pointer_position() {
        let mut translator = EventTranslator::new();
        translator.translate(&event(EventType::MouseMove { x: 10.6, y: 20.2 }, None));

        assert_eq!(
            translator.translate(&event(EventType::ButtonRelease(Button::Right), None)),
            Some(RawInputEvent::MouseButton { x: 10, y: 20, button: MouseButton::Right, pressed: false })
        );
        assert_eq!(
            translator.translate(&event(EventType::ButtonPress(Button::Unknown(8)), None)),
            Some(RawInputEvent::MouseButton { x: 10, y: 20, button: MouseButton::Other(8), pressed: true })
        );
        assert_eq!(
            translator.translate(&event(EventType::Wheel { delta_x: 0, delta_y: -3 }, None)),
            Some(RawInputEvent::MouseScroll { x: 10, y: 20, dx: 0, dy: -3 })
        );
    }

    #[test]
    fn test_key_release_resolves_to_pressed_character() {
        let mut translator = EventTranslator::new();
        assert_eq!(
            translator.translate(&event(EventType::KeyPress(Key::KeyA), Some("A"))),
            Some(RawInputEvent::KeyDown { symbol: KeySymbol::Char('A') })
        );
        assert_eq!(
            translator.translate(&event(EventType::KeyRelease(Key::KeyA), None)),
            Some(RawInputEvent::KeyUp { symbol: KeySymbol::Char('A') })
        );
        assert_eq!(
            translator.translate(&event(EventType::KeyRelease(Key::KeyA), None)),
            Some(RawInputEvent::KeyUp { symbol: KeySymbol::Code(Key::KeyA) })
        );
    }

    #[test]
    fn test_non_printable_names_use_key_code() {
        let mut translator = EventTranslator::new();
        for name in [None, Some("\r"), Some(" "), Some("\u{1b}"), Some("ab")] {
            assert_eq!(
                translator.translate(&event(EventType::KeyPress(Key::Return), name)),
                Some(RawInputEvent::KeyDown { symbol: KeySymbol::Code(Key::Return) })
            );
        }
    }
}
