//! User settings and their JSON key-value store.

use crate::encoder::EncoderConfig;
use crate::error::{Result, RetraceError};
use crate::keys::CanonicalKey;
use crate::replay::RepeatPolicy;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Settings read when a recording or playback session starts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    #[serde(rename = "Repeat Count")]
    pub repeat_count: u32,

    #[serde(rename = "Infinite Playback")]
    pub infinite_playback: bool,

    /// Move sensitivity threshold, in screen units
    #[serde(rename = "Mouse Speed")]
    pub mouse_speed: u32,

    /// Seconds between "record start" and the first captured event
    #[serde(rename = "Recording Timer")]
    pub recording_timer: u64,

    #[serde(rename = "Recording Hotkey")]
    pub recording_hotkey: String,

    #[serde(rename = "Playback Hotkey")]
    pub playback_hotkey: String,

    /// Milliseconds
    #[serde(rename = "Sleep Granularity")]
    pub sleep_granularity: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            repeat_count: 1,
            infinite_playback: false,
            mouse_speed: 21,
            recording_timer: 0,
            recording_hotkey: "f9".to_string(),
            playback_hotkey: "f10".to_string(),
            sleep_granularity: 100,
        }
    }
}

fn invalid(key: &str, reason: impl Into<String>) -> RetraceError {
    RetraceError::InvalidSetting {
        key: key.to_string(),
        reason: reason.into(),
    }
}

impl Settings {
    pub fn validate(&self) -> Result<()> {
        if self.repeat_count < 1 {
            return Err(invalid("Repeat Count", "must be at least 1"));
        }
        if self.sleep_granularity < 1 {
            return Err(invalid("Sleep Granularity", "must be at least 1 ms"));
        }
        if self.recording_hotkey.trim().is_empty() {
            return Err(invalid("Recording Hotkey", "must name a key"));
        }
        if self.playback_hotkey.trim().is_empty() {
            return Err(invalid("Playback Hotkey", "must name a key"));
        }
        if self.recording_hotkey == self.playback_hotkey {
            return Err(invalid(
                "Playback Hotkey",
                "must differ from the recording hotkey",
            ));
        }
        Ok(())
    }

    fn to_map(&self) -> Result<Map<String, Value>> {
        match serde_json::to_value(self)? {
            Value::Object(map) => Ok(map),
            other => Err(invalid("*", format!("settings serialized to {}", other))),
        }
    }

    /// Value of a setting, rendered as text
    pub fn get(&self, key: &str) -> Result<String> {
        let map = self.to_map()?;
        let value = map.get(key).ok_or_else(|| invalid(key, "unknown setting"))?;
        Ok(render(value))
    }

    /// Set a setting from text, checked against the setting's type and the
    /// validation rules. On error `self` is left unchanged.
    pub fn set(&mut self, key: &str, raw: &str) -> Result<()> {
        let mut map = self.to_map()?;
        let current = map.get(key).ok_or_else(|| invalid(key, "unknown setting"))?;

        let raw = raw.trim();
        let value = match current {
            Value::Bool(_) => raw
                .parse::<bool>()
                .map(Value::Bool)
                .map_err(|_| invalid(key, format!("`{}` is not true or false", raw)))?,
            Value::Number(_) => raw
                .parse::<u64>()
                .map(Value::from)
                .map_err(|_| invalid(key, format!("`{}` is not a non-negative integer", raw)))?,
            _ => Value::String(raw.to_string()),
        };
        map.insert(key.to_string(), value);

        let updated: Settings = serde_json::from_value(Value::Object(map))
            .map_err(|e| invalid(key, e.to_string()))?;
        updated.validate()?;
        debug!(key, value = raw, "Setting updated");
        *self = updated;
        Ok(())
    }

    /// All settings as (key, value) pairs, sorted by key
    pub fn entries(&self) -> Result<Vec<(String, String)>> {
        Ok(self
            .to_map()?
            .iter()
            .map(|(key, value)| (key.clone(), render(value)))
            .collect())
    }

    pub fn repeat_policy(&self) -> RepeatPolicy {
        if self.infinite_playback {
            RepeatPolicy::Infinite
        } else {
            RepeatPolicy::Finite(self.repeat_count)
        }
    }

    pub fn encoder_config(&self) -> EncoderConfig {
        EncoderConfig {
            move_sensitivity: self.mouse_speed,
            sleep_granularity: Duration::from_millis(self.sleep_granularity.max(1)),
            start_delay: Duration::from_secs(self.recording_timer),
        }
    }

    pub fn recording_hotkey(&self) -> CanonicalKey {
        CanonicalKey::new(self.recording_hotkey.clone())
    }

    pub fn playback_hotkey(&self) -> CanonicalKey {
        CanonicalKey::new(self.playback_hotkey.clone())
    }
}

fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Persistence of [`Settings`]
pub trait SettingsStore: Send + Sync {
    fn load(&self) -> Result<Settings>;
    fn save(&self, settings: &Settings) -> Result<()>;
}

/// Settings stored as a JSON document
#[derive(Debug, Clone)]
pub struct JsonSettingsStore {
    path: PathBuf,
}

impl JsonSettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<config dir>/retrace/settings.json`, or under the home directory when
    /// the platform has no config directory
    pub fn default_path() -> Result<PathBuf> {
        let base = dirs::config_dir()
            .or_else(dirs::home_dir)
            .ok_or_else(|| {
                RetraceError::InitializationError("no config or home directory".to_string())
            })?;
        Ok(base.join("retrace").join("settings.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SettingsStore for JsonSettingsStore {
    fn load(&self) -> Result<Settings> {
        if !self.path.exists() {
            debug!("No settings file at {:?}, using defaults", self.path);
            return Ok(Settings::default());
        }
        let text = fs::read_to_string(&self.path)?;
        let settings: Settings = serde_json::from_str(&text)?;
        settings.validate()?;
        Ok(settings)
    }

    fn save(&self, settings: &Settings) -> Result<()> {
        settings.validate()?;
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, serde_json::to_string_pretty(settings)?)?;
        info!("Settings saved to {:?}", self.path);
        Ok(())
    }
}
