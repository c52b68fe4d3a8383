use crate::{
    capture::{CaptureBuffer, Preamble},
    clock::Clock,
    encoder::{ActionEncoder, EncoderConfig},
    events::RawInputEvent,
    keys::KeyTable,
    Action, Result, RetraceError,
};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::broadcast;
use tokio_stream::Stream;
use tracing::{debug, error, info, instrument};

mod hook;

pub use self::hook::{EventTranslator, InputHook};

struct RecorderState {
    encoder: ActionEncoder,
    capture: CaptureBuffer,
    // The stop trigger has been recorded; nothing else may follow it
    sealed: bool,
}

/// The action recorder.
///
/// Owns the encoder and the capture of the recording in progress. Events may
/// arrive from the input hook thread while the controller starts and stops
/// the recording, so both live behind one lock.
pub struct Recorder {
    state: Arc<Mutex<RecorderState>>,

    /// Every action written to the capture
    action_tx: broadcast::Sender<Action>,
}

impl Recorder {
    /// Create a new recorder
    pub fn new(keys: KeyTable, clock: Arc<dyn Clock>) -> Self {
        let state = RecorderState {
            encoder: ActionEncoder::new(keys, EncoderConfig::default(), clock),
            capture: CaptureBuffer::new(Preamble::today()),
            sealed: false,
        };
        let (action_tx, _) = broadcast::channel(100); // Buffer size of 100 actions

        Self {
            state: Arc::new(Mutex::new(state)),
            action_tx,
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, RecorderState>> {
        self.state
            .lock()
            .map_err(|e| RetraceError::RecordingError(format!("Failed to lock recorder state: {}", e)))
    }

    /// Get a stream of the actions written while recording
    pub fn action_stream(&self) -> impl Stream<Item = Action> {
        let mut rx = self.action_tx.subscribe();
        Box::pin(async_stream::stream! {
            loop {
                match rx.recv().await {
                    Ok(action) => yield action,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!(skipped, "Action stream subscriber lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    /// Start recording into a fresh capture
    #[instrument(skip(self))]
    pub fn start(&self, config: EncoderConfig) -> Result<()> {
        let mut state = self.lock()?;
        if state.encoder.is_started() {
            return Err(RetraceError::RecordingError(
                "A recording is already in progress".to_string(),
            ));
        }

        info!("Starting recording");
        state.capture.reset(Preamble::today());
        state.sealed = false;
        state.encoder.begin(config);
        Ok(())
    }

    /// Encode one raw event. Anomalies are logged and the recording goes on.
    pub fn handle(&self, event: &RawInputEvent) {
        self.encode(event, false);
    }

    /// Encode the event that will stop the recording and stop accepting
    /// events until [`Recorder::stop`], so the trigger stays the last action
    /// however late the stop itself arrives.
    pub fn handle_stop_trigger(&self, event: &RawInputEvent) {
        self.encode(event, true);
    }

    fn encode(&self, event: &RawInputEvent, seal: bool) {
        let mut guard = match self.lock() {
            Ok(guard) => guard,
            Err(e) => {
                error!(error = %e, "Dropping input event");
                return;
            }
        };
        let state = &mut *guard;
        if state.sealed {
            debug!(?event, "Recording already stopping, event dropped");
            return;
        }

        match state.encoder.encode(event, &mut state.capture) {
            Ok(written) => {
                for action in written {
                    // No subscribers is fine
                    let _ = self.action_tx.send(action);
                }
            }
            Err(e) => error!(error = %e, ?event, "Input event not recorded"),
        }
        if seal && state.encoder.is_started() {
            state.sealed = true;
        }
    }

    /// Stop recording and return the serialized capture.
    ///
    /// The trailing stop trigger is trimmed before serialization and the
    /// in-memory capture is cleared.
    #[instrument(skip(self))]
    pub fn stop(&self) -> Result<String> {
        let mut state = self.lock()?;
        if !state.encoder.is_started() {
            return Err(RetraceError::RecordingError(
                "No recording in progress".to_string(),
            ));
        }

        state.encoder.end();
        state.sealed = false;
        let removed = state.capture.trim_trailing_artifacts();
        let text = state.capture.serialize();
        info!(actions = state.capture.len(), removed, "Stopped recording");
        state.capture.reset(Preamble::today());
        Ok(text)
    }

    /// Whether a recording has been started and not yet stopped
    pub fn is_recording(&self) -> bool {
        self.lock().map(|s| s.encoder.is_started()).unwrap_or(false)
    }

    /// Actions recorded so far in the current recording
    pub fn snapshot(&self) -> Vec<Action> {
        self.lock()
            .map(|s| s.capture.actions().to_vec())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::Button;
    use crate::clock::ManualClock;
    use crate::events::{KeySymbol, MouseButton};
    use crate::keys::Platform;
    use std::time::Duration;
    use tokio_stream::StreamExt;

    fn recorder() -> (Recorder, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        let recorder = Recorder::new(KeyTable::for_platform(Platform::Linux), clock.clone());
        (recorder, clock)
    }

    fn click(x: i32, y: i32, pressed: bool) -> RawInputEvent {
        RawInputEvent::MouseButton { x, y, button: MouseButton::Left, pressed }
    }

    #[test]
    fn test_start_twice_is_an_error() {
        let (recorder, _) = recorder();
        recorder.start(EncoderConfig::default()).unwrap();
        assert!(matches!(
            recorder.start(EncoderConfig::default()),
            Err(RetraceError::RecordingError(_))
        ));
    }

    #[test]
    fn test_stop_without_start_is_an_error() {
        let (recorder, _) = recorder();
        assert!(matches!(recorder.stop(), Err(RetraceError::RecordingError(_))));
    }

    #[test]
    fn test_stop_trims_and_clears() {
        let (recorder, clock) = recorder();
        recorder.start(EncoderConfig::default()).unwrap();
        recorder.handle(&click(10, 10, true));
        clock.advance(Duration::from_secs(2));
        recorder.handle(&click(10, 10, false));
        recorder.handle(&click(300, 5, true));
        recorder.handle(&click(300, 5, false));

        let text = recorder.stop().unwrap();
        let body: Vec<&str> = text.lines().filter(|l| !l.starts_with('#')).collect();
        assert_eq!(body, vec!["mouseDown(10, 10, 'left')", "sleep(2)", "mouseUp(10, 10, 'left')"]);
        assert!(!recorder.is_recording());
        assert!(recorder.snapshot().is_empty());
    }

    #[test]
    fn test_events_before_start_are_ignored() {
        let (recorder, _) = recorder();
        recorder.handle(&click(1, 1, true));
        recorder.start(EncoderConfig::default()).unwrap();
        assert!(recorder.snapshot().is_empty());
    }

    #[test]
    fn test_unrecognized_button_does_not_stop_recording() {
        let (recorder, _) = recorder();
        recorder.start(EncoderConfig::default()).unwrap();
        recorder.handle(&RawInputEvent::MouseButton {
            x: 1,
            y: 1,
            button: MouseButton::Other(4),
            pressed: true,
        });
        recorder.handle(&click(2, 2, true));

        assert!(recorder.is_recording());
        assert_eq!(
            recorder.snapshot(),
            vec![Action::ButtonDown { x: 2, y: 2, button: Button::Left }]
        );
    }

    #[test]
    fn test_nothing_is_recorded_after_stop_trigger() {
        let (recorder, _) = recorder();
        recorder.start(EncoderConfig::default()).unwrap();
        recorder.handle(&click(10, 10, true));
        recorder.handle(&click(10, 10, false));
        recorder.handle_stop_trigger(&RawInputEvent::KeyDown {
            symbol: KeySymbol::Code(rdev::Key::F9),
        });
        recorder.handle(&RawInputEvent::MouseMove { x: 400, y: 400 });
        recorder.handle(&RawInputEvent::KeyUp { symbol: KeySymbol::Char('x') });

        assert!(recorder.is_recording());
        let text = recorder.stop().unwrap();
        let body: Vec<&str> = text.lines().filter(|l| !l.starts_with('#')).collect();
        assert_eq!(body, vec!["mouseDown(10, 10, 'left')", "mouseUp(10, 10, 'left')"]);

        recorder.start(EncoderConfig::default()).unwrap();
        recorder.handle(&click(1, 1, true));
        assert_eq!(recorder.snapshot().len(), 1);
    }

    #[test]
    fn test_stop_trigger_before_start_does_not_seal() {
        let (recorder, _) = recorder();
        recorder.handle_stop_trigger(&RawInputEvent::KeyDown {
            symbol: KeySymbol::Code(rdev::Key::F9),
        });
        recorder.start(EncoderConfig::default()).unwrap();
        recorder.handle(&click(1, 1, true));
        assert_eq!(recorder.snapshot().len(), 1);
    }

    #[tokio::test]
    async fn test_action_stream_publishes_written_actions() {
        let (recorder, _) = recorder();
        let mut stream = recorder.action_stream();

        recorder.start(EncoderConfig::default()).unwrap();
        recorder.handle(&RawInputEvent::MouseMove { x: 40, y: 50 });

        let action = tokio::time::timeout(Duration::from_secs(1), stream.next())
            .await
            .expect("stream should yield");
        assert_eq!(action, Some(Action::Move { x: 40, y: 50 }));
    }
}
