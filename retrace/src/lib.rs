//! Macro recorder for mouse and keyboard input
//!
//! This crate records user input from a global input hook into a capture: a
//! human-readable, editable text file with one action per line, such as
//! `moveTo(120, 340)`, `press('a')` or `sleep(1.5)`. Captures are replayed
//! against the operating system's input synthesis any number of times.

pub mod action;
pub mod backend;
pub mod capture;
pub mod clock;
pub mod encoder;
pub mod error;
pub mod events;
pub mod keys;
pub mod recorder;
pub mod replay;
pub mod session;
pub mod settings;

pub use action::{parse_capture, Action, Button};
pub use backend::{default_backend_factory, AutomationBackend, BackendFactory, EnigoBackend};
pub use capture::{default_capture_path, CaptureBuffer, Preamble};
pub use clock::{Clock, ManualClock, MonotonicClock};
pub use encoder::{ActionEncoder, EncoderConfig};
pub use error::*;
pub use events::*;
pub use keys::{CanonicalKey, KeyLookup, KeyTable, Platform};
pub use recorder::*;
pub use replay::{
    CancelToken, PlaybackOutcome, PlaybackState, PlaybackStatus, Remaining, RepeatPolicy,
    ReplayEngine,
};
pub use session::{Hotkey, SessionController, Toggle};
pub use settings::{JsonSettingsStore, Settings, SettingsStore};
