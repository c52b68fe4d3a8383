//! The in-memory capture and its persisted text form.

use crate::action::Action;
use crate::error::{Result, RetraceError};
use chrono::{Local, NaiveDate};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Fixed header written before the recorded actions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preamble {
    lines: Vec<Action>,
}

impl Preamble {
    /// Preamble stamped with the given recording date
    pub fn dated(date: NaiveDate) -> Self {
        Self {
            lines: vec![
                Action::comment(format!("Created by retrace {}", env!("CARGO_PKG_VERSION"))),
                Action::comment(format!("on {}", date.format("%d %b %Y"))),
            ],
        }
    }

    /// Preamble stamped with today's date
    pub fn today() -> Self {
        Self::dated(Local::now().date_naive())
    }

    pub fn lines(&self) -> &[Action] {
        &self.lines
    }
}

/// Ordered actions of the recording in progress, behind the preamble
#[derive(Debug, Clone)]
pub struct CaptureBuffer {
    preamble: Preamble,
    actions: Vec<Action>,
    // Set by a trim, cleared by any later mutation, so repeated trims are no-ops
    trimmed: bool,
}

impl CaptureBuffer {
    pub fn new(preamble: Preamble) -> Self {
        Self {
            preamble,
            actions: Vec::new(),
            trimmed: false,
        }
    }

    pub fn append(&mut self, action: Action) {
        self.actions.push(action);
        self.trimmed = false;
    }

    /// Replace the most recent action, or append when there is none
    pub fn replace_last(&mut self, action: Action) {
        match self.actions.last_mut() {
            Some(last) => *last = action,
            None => self.actions.push(action),
        }
        self.trimmed = false;
    }

    pub fn last(&self) -> Option<&Action> {
        self.actions.last()
    }

    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Drop the event that stopped the recording, the button press that went
    /// with it when its release was never captured, and the idle time spent
    /// reaching for the stop control.
    ///
    /// Returns the number of removed actions. A second call without an
    /// intervening mutation removes nothing.
    pub fn trim_trailing_artifacts(&mut self) -> usize {
        if self.trimmed {
            return 0;
        }
        self.trimmed = true;

        let before = self.actions.len();
        if self.actions.pop().is_some() {
            self.pop_trailing_sleep();
            if matches!(self.actions.last(), Some(Action::ButtonDown { .. })) {
                self.actions.pop();
                self.pop_trailing_sleep();
            }
        }
        let removed = before - self.actions.len();
        debug!(removed, "Trimmed trailing recording artifacts");
        removed
    }

    fn pop_trailing_sleep(&mut self) {
        if matches!(self.actions.last(), Some(Action::Sleep(_))) {
            self.actions.pop();
        }
    }

    /// Preamble and actions, one per line
    pub fn serialize(&self) -> String {
        let mut text = String::new();
        for action in self.preamble.lines().iter().chain(&self.actions) {
            text.push_str(&action.to_string());
            text.push('\n');
        }
        text
    }

    /// Clear back to the bare preamble for the next recording
    pub fn reset(&mut self, preamble: Preamble) {
        self.preamble = preamble;
        self.actions.clear();
        self.trimmed = false;
    }
}

/// Default location of the capture file: `<temp dir>/retrace-YYYYMMDD`
pub fn default_capture_path() -> PathBuf {
    std::env::temp_dir().join(format!("retrace-{}", Local::now().format("%Y%m%d")))
}

/// Persist a serialized capture
pub fn write_capture(path: &Path, text: &str) -> Result<()> {
    info!("Saving capture to {:?}", path);
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, text)?;
    Ok(())
}

/// Read a persisted capture, reporting a missing file as `NoCaptureLoaded`
pub fn read_capture(path: &Path) -> Result<String> {
    match fs::read_to_string(path) {
        Ok(text) => Ok(text),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            Err(RetraceError::NoCaptureLoaded(path.to_path_buf()))
        }
        Err(e) => Err(e.into()),
    }
}
