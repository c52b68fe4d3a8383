//! Orchestration of recording and playback sessions.
//!
//! The controller is what the presentation layer talks to. It owns the
//! recorder and the replay engine, reads settings when a session starts, and
//! moves captures between them through the capture file.

use crate::action::parse_capture;
use crate::backend::BackendFactory;
use crate::capture::{read_capture, write_capture};
use crate::clock::{Clock, MonotonicClock};
use crate::error::{Result, RetraceError};
use crate::events::RawInputEvent;
use crate::keys::{CanonicalKey, KeyLookup, KeyTable, Platform};
use crate::recorder::Recorder;
use crate::replay::{PlaybackStatus, RepeatPolicy, ReplayEngine};
use crate::settings::Settings;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;
use tracing::{debug, info, instrument};

/// A hotkey recognised in the input stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hotkey {
    Record,
    Playback,
}

/// Result of a toggle request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Toggle {
    Started,
    Stopped,
}

pub struct SessionController {
    settings: Mutex<Settings>,
    keys: KeyTable,
    capture_path: PathBuf,
    recorder: Recorder,
    engine: ReplayEngine,
    held_hotkeys: Mutex<Vec<CanonicalKey>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

impl SessionController {
    pub fn new(settings: Settings, capture_path: impl Into<PathBuf>, backend: BackendFactory) -> Self {
        Self::with_clock(
            settings,
            capture_path,
            backend,
            Arc::new(MonotonicClock),
            Platform::current(),
        )
    }

    /// Controller with an explicit clock and key platform
    pub fn with_clock(
        settings: Settings,
        capture_path: impl Into<PathBuf>,
        backend: BackendFactory,
        clock: Arc<dyn Clock>,
        platform: Platform,
    ) -> Self {
        let keys = KeyTable::for_platform(platform);
        Self {
            settings: Mutex::new(settings),
            recorder: Recorder::new(keys.clone(), clock),
            keys,
            capture_path: capture_path.into(),
            engine: ReplayEngine::new(backend),
            held_hotkeys: Mutex::new(Vec::new()),
        }
    }

    pub fn capture_path(&self) -> &Path {
        &self.capture_path
    }

    pub fn recorder(&self) -> &Recorder {
        &self.recorder
    }

    pub fn settings(&self) -> Settings {
        lock(&self.settings).clone()
    }

    /// Replace the settings. Sessions already running keep the values they
    /// started with.
    pub fn update_settings(&self, settings: Settings) -> Result<()> {
        settings.validate()?;
        *lock(&self.settings) = settings;
        Ok(())
    }

    /// Route one event from the input hook.
    ///
    /// The recording hotkey's key-down is recorded as the stop trigger before
    /// being reported, and nothing is recorded after it until the recording is
    /// toggled, so the capture trims exactly the trigger. Hotkey releases and the playback hotkey are never recorded, and a held
    /// hotkey is reported once.
    pub fn handle_event(&self, event: &RawInputEvent) -> Option<Hotkey> {
        let Some(hotkey) = self.hotkey_of(event) else {
            self.recorder.handle(event);
            return None;
        };
        let (which, key) = hotkey;

        let mut held = lock(&self.held_hotkeys);
        match event {
            RawInputEvent::KeyDown { .. } => {
                if held.contains(&key) {
                    return None;
                }
                held.push(key);
                drop(held);
                if which == Hotkey::Record {
                    self.recorder.handle_stop_trigger(event);
                }
                debug!(?which, "Hotkey pressed");
                Some(which)
            }
            _ => {
                held.retain(|k| *k != key);
                None
            }
        }
    }

    fn hotkey_of(&self, event: &RawInputEvent) -> Option<(Hotkey, CanonicalKey)> {
        let symbol = event.key_symbol()?;
        let KeyLookup::Found(key) = self.keys.resolve(symbol) else {
            return None;
        };
        let settings = lock(&self.settings);
        if key == settings.recording_hotkey() {
            Some((Hotkey::Record, key))
        } else if key == settings.playback_hotkey() {
            Some((Hotkey::Playback, key))
        } else {
            None
        }
    }

    #[instrument(skip(self))]
    pub fn start_recording(&self) -> Result<()> {
        let config = lock(&self.settings).encoder_config();
        self.recorder.start(config)
    }

    /// Stop recording and persist the capture. Returns the capture file path.
    #[instrument(skip(self))]
    pub fn stop_recording(&self) -> Result<PathBuf> {
        let text = self.recorder.stop()?;
        write_capture(&self.capture_path, &text)?;
        Ok(self.capture_path.clone())
    }

    pub fn toggle_recording(&self) -> Result<Toggle> {
        if self.recorder.is_recording() {
            self.stop_recording()?;
            Ok(Toggle::Stopped)
        } else {
            self.start_recording()?;
            Ok(Toggle::Started)
        }
    }

    pub fn is_recording(&self) -> bool {
        self.recorder.is_recording()
    }

    /// Play the current capture with the repeat policy from settings
    pub fn start_playback(&self) -> Result<()> {
        let policy = lock(&self.settings).repeat_policy();
        self.start_playback_with(policy)
    }

    /// Play the current capture. Fails with `PlaybackActive` if a session is
    /// still playing.
    #[instrument(skip(self))]
    pub fn start_playback_with(&self, policy: RepeatPolicy) -> Result<()> {
        let text = read_capture(&self.capture_path)?;
        self.engine.start(&text, policy)
    }

    #[instrument(skip(self))]
    pub fn stop_playback(&self) {
        self.engine.stop();
    }

    /// Start playback, or stop the active session
    pub fn toggle_playback(&self) -> Result<Toggle> {
        if self.engine.is_running() {
            self.stop_playback();
            Ok(Toggle::Stopped)
        } else {
            self.start_playback()?;
            Ok(Toggle::Started)
        }
    }

    pub fn is_playing(&self) -> bool {
        self.engine.is_running()
    }

    pub fn playback_status(&self) -> watch::Receiver<PlaybackStatus> {
        self.engine.status()
    }

    /// Block until the current playback session has ended
    pub fn wait_for_playback(&self) {
        self.engine.wait();
    }

    /// Text of the current capture file
    pub fn capture_text(&self) -> Result<String> {
        read_capture(&self.capture_path)
    }

    /// Install a capture file as the current capture after checking that
    /// every line decodes
    #[instrument(skip(self))]
    pub fn load_capture(&self, path: &Path) -> Result<()> {
        let text = match read_capture(path) {
            Err(RetraceError::NoCaptureLoaded(_)) => {
                return Err(RetraceError::IoError(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("{} does not exist", path.display()),
                )));
            }
            other => other?,
        };
        let actions = parse_capture(&text)?;
        write_capture(&self.capture_path, &text)?;
        info!(actions = actions.len(), "Loaded capture from {:?}", path);
        Ok(())
    }

    /// Copy the current capture to `path`
    #[instrument(skip(self))]
    pub fn save_capture(&self, path: &Path) -> Result<()> {
        let text = read_capture(&self.capture_path)?;
        write_capture(path, &text)
    }
}
