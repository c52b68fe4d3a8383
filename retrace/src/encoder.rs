//! Translation of raw input events into capture actions.
//!
//! The encoder filters pointer jitter, rebuilds idle gaps as `Sleep` actions and
//! folds OS key-repeat into a single `Press`. It holds no reference to the
//! capture; callers pass the buffer the actions are written to.

use crate::action::{Action, Button};
use crate::capture::CaptureBuffer;
use crate::clock::Clock;
use crate::error::{Result, RetraceError};
use crate::events::{KeySymbol, MouseButton, Position, RawInputEvent};
use crate::keys::{CanonicalKey, KeyLookup, KeyTable};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Tuning of the encoder, read from settings when a recording starts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncoderConfig {
    /// Minimum pointer displacement, on either axis, before a move is kept
    pub move_sensitivity: u32,

    /// Idle gaps are truncated to a multiple of this before becoming a `Sleep`
    pub sleep_granularity: Duration,

    /// Events are ignored for this long after the recording starts
    pub start_delay: Duration,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            move_sensitivity: 21,
            sleep_granularity: Duration::from_millis(100),
            start_delay: Duration::ZERO,
        }
    }
}

/// Stateful converter from raw events to actions
pub struct ActionEncoder {
    keys: KeyTable,
    config: EncoderConfig,
    clock: Arc<dyn Clock>,
    recording: bool,
    armed_at: Option<Instant>,
    last_position: Option<Position>,
    last_sample: Option<Instant>,
}

impl ActionEncoder {
    pub fn new(keys: KeyTable, config: EncoderConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            keys,
            config,
            clock,
            recording: false,
            armed_at: None,
            last_position: None,
            last_sample: None,
        }
    }

    /// Start a recording session with the given configuration
    pub fn begin(&mut self, config: EncoderConfig) {
        let now = self.clock.now();
        self.armed_at = (!config.start_delay.is_zero()).then(|| now + config.start_delay);
        self.config = config;
        self.recording = true;
        self.last_position = None;
        self.last_sample = None;
    }

    /// Stop accepting events
    pub fn end(&mut self) {
        self.recording = false;
        self.armed_at = None;
    }

    /// Whether the session was started, whatever the start delay
    pub fn is_started(&self) -> bool {
        self.recording
    }

    /// Whether events are currently being encoded
    pub fn is_recording(&self) -> bool {
        self.recording && self.armed_at.map_or(true, |at| self.clock.now() >= at)
    }

    /// Encode one event into `capture`, returning the actions written.
    ///
    /// A coalesced key press is reported as the `Press` that replaced the
    /// earlier key-down. Returns nothing when not recording.
    pub fn encode(&mut self, event: &RawInputEvent, capture: &mut CaptureBuffer) -> Result<Vec<Action>> {
        if !self.is_recording() {
            return Ok(Vec::new());
        }

        let mut written = Vec::new();
        match event {
            RawInputEvent::MouseMove { x, y } => {
                self.encode_move(Position::new(*x, *y), capture, &mut written)
            }
            RawInputEvent::MouseButton { x, y, button, pressed } => {
                self.encode_button(Position::new(*x, *y), *button, *pressed, capture, &mut written)?
            }
            RawInputEvent::MouseScroll { dy, .. } => self.encode_scroll(*dy, capture, &mut written),
            RawInputEvent::KeyDown { symbol } => self.encode_key_down(symbol, capture, &mut written),
            RawInputEvent::KeyUp { symbol } => self.encode_key_up(symbol, capture, &mut written),
        }
        Ok(written)
    }

    fn push(capture: &mut CaptureBuffer, written: &mut Vec<Action>, action: Action) {
        written.push(action.clone());
        capture.append(action);
    }

    /// Emit the idle gap since the previous encoded event, if any
    fn encode_gap(&mut self, capture: &mut CaptureBuffer, written: &mut Vec<Action>) {
        let now = self.clock.now();
        let previous = self.last_sample.replace(now);
        let Some(previous) = previous else {
            return;
        };

        let gap = now.saturating_duration_since(previous);
        let step = self.config.sleep_granularity.as_millis().max(1);
        let millis = gap.as_millis() / step * step;
        if millis > 0 {
            Self::push(capture, written, Action::Sleep(Duration::from_millis(millis as u64)));
        }
    }

    fn exceeds_sensitivity(&self, position: Position) -> bool {
        let Some(last) = self.last_position else {
            return true;
        };
        let threshold = i64::from(self.config.move_sensitivity);
        let dx = (i64::from(position.x) - i64::from(last.x)).abs();
        let dy = (i64::from(position.y) - i64::from(last.y)).abs();
        dx >= threshold || dy >= threshold
    }

    fn encode_move(&mut self, position: Position, capture: &mut CaptureBuffer, written: &mut Vec<Action>) {
        self.encode_gap(capture, written);
        if self.exceeds_sensitivity(position) {
            self.last_position = Some(position);
            Self::push(capture, written, Action::Move { x: position.x, y: position.y });
        }
    }

    fn encode_button(
        &mut self,
        position: Position,
        button: MouseButton,
        pressed: bool,
        capture: &mut CaptureBuffer,
        written: &mut Vec<Action>,
    ) -> Result<()> {
        let button = match button {
            MouseButton::Left => Button::Left,
            MouseButton::Right => Button::Right,
            MouseButton::Middle => Button::Middle,
            MouseButton::Other(id) => {
                return Err(RetraceError::UnrecognizedButton(format!("button {}", id)));
            }
        };

        self.encode_gap(capture, written);
        let (x, y) = (position.x, position.y);
        let action = if pressed {
            Action::ButtonDown { x, y, button }
        } else {
            Action::ButtonUp { x, y, button }
        };
        Self::push(capture, written, action);
        Ok(())
    }

    fn encode_scroll(&mut self, dy: i64, capture: &mut CaptureBuffer, written: &mut Vec<Action>) {
        // Horizontal-only wheel events carry nothing to replay
        if dy == 0 {
            return;
        }
        self.encode_gap(capture, written);
        Self::push(capture, written, Action::Scroll { dy });
    }

    fn resolve(&self, symbol: &KeySymbol) -> std::result::Result<CanonicalKey, Action> {
        match self.keys.resolve(symbol) {
            KeyLookup::Found(key) => Ok(key),
            KeyLookup::Unsupported(description) => {
                let error = RetraceError::UnsupportedKey(description.clone());
                warn!(%error, "Recording key as a comment");
                Err(Action::comment(format!("unsupported key: {}", description)))
            }
        }
    }

    fn encode_key_down(&mut self, symbol: &KeySymbol, capture: &mut CaptureBuffer, written: &mut Vec<Action>) {
        let key = match self.resolve(symbol) {
            Ok(key) => key,
            Err(marker) => {
                self.encode_gap(capture, written);
                Self::push(capture, written, marker);
                return;
            }
        };

        // Key-repeat while held: the first repeat turns the key-down into a
        // press, later repeats are absorbed by that press.
        match capture.last() {
            Some(Action::KeyDown(held)) if *held == key => {
                debug!(key = %key, "Coalescing repeated key-down into a press");
                self.last_sample = Some(self.clock.now());
                let press = Action::Press(key);
                written.push(press.clone());
                capture.replace_last(press);
                return;
            }
            Some(Action::Press(held)) if *held == key => {
                self.last_sample = Some(self.clock.now());
                return;
            }
            _ => {}
        }

        self.encode_gap(capture, written);
        Self::push(capture, written, Action::KeyDown(key));
    }

    fn encode_key_up(&mut self, symbol: &KeySymbol, capture: &mut CaptureBuffer, written: &mut Vec<Action>) {
        self.encode_gap(capture, written);
        let action = match self.resolve(symbol) {
            Ok(key) => Action::KeyUp(key),
            Err(marker) => marker,
        };
        Self::push(capture, written, action);
    }
}
