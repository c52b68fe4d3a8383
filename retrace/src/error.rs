use std::path::PathBuf;
use thiserror::Error;

/// Error types for recording and replaying captures
#[derive(Debug, Error)]
pub enum RetraceError {
    /// Playback was requested but no capture file exists yet
    #[error("No capture loaded: {}", .0.display())]
    NoCaptureLoaded(PathBuf),

    /// The capture holds nothing but its preamble
    #[error("Empty capture: nothing was recorded")]
    EmptyCapture,

    /// A key with no canonical name. Recorded as a comment, never fatal.
    #[error("Unsupported key: {0}")]
    UnsupportedKey(String),

    /// A mouse button outside left/right/middle
    #[error("Mouse button not recognized: {0}")]
    UnrecognizedButton(String),

    /// The automation backend rejected an action during replay
    #[error("Backend failed to synthesize `{action}`: {reason}")]
    BackendSynthesisFailure { action: String, reason: String },

    /// A capture line that does not decode to an action
    #[error("Malformed capture at line {line} (`{content}`): {reason}")]
    MalformedCapture {
        line: usize,
        content: String,
        reason: String,
    },

    /// A setting that cannot be read or written with the given value
    #[error("Invalid setting `{key}`: {reason}")]
    InvalidSetting { key: String, reason: String },

    /// Error when creating the input hook or the automation backend
    #[error("Failed to initialize: {0}")]
    InitializationError(String),

    /// Illegal recording state transition or unusable recording state
    #[error("Recording error: {0}")]
    RecordingError(String),

    /// A playback session is already running
    #[error("A playback session is already running")]
    PlaybackActive,

    /// Error when serializing or deserializing JSON
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// I/O error while persisting or reading a capture or settings file
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Result type for retrace operations
pub type Result<T> = std::result::Result<T, RetraceError>;
