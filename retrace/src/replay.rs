//! Replay of a persisted capture on a dedicated worker thread.
//!
//! The engine is `Idle` until [`ReplayEngine::start`] hands it a capture. The
//! worker then plays full passes of the action sequence until the repeat
//! policy is exhausted, a backend call fails, or the session is cancelled, and
//! reports back through a watch channel.

use crate::action::{parse_capture, Action};
use crate::backend::{AutomationBackend, BackendFactory};
use crate::error::{Result, RetraceError};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, error, info, instrument, warn};

/// How many times a capture is played
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepeatPolicy {
    /// Play this many full passes; zero plays nothing
    Finite(u32),
    /// Play until cancelled
    Infinite,
}

/// Passes still to be played
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Remaining {
    Finite(u32),
    Infinite,
}

impl Remaining {
    fn is_exhausted(&self) -> bool {
        matches!(self, Remaining::Finite(0))
    }

    fn decrement(&mut self) {
        if let Remaining::Finite(n) = self {
            *n = n.saturating_sub(1);
        }
    }
}

impl From<RepeatPolicy> for Remaining {
    fn from(policy: RepeatPolicy) -> Self {
        match policy {
            RepeatPolicy::Finite(n) => Remaining::Finite(n),
            RepeatPolicy::Infinite => Remaining::Infinite,
        }
    }
}

impl fmt::Display for Remaining {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Remaining::Finite(n) => write!(f, "{}", n),
            Remaining::Infinite => f.write_str("infinite"),
        }
    }
}

/// Replay engine state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Idle,
    Running,
    /// Cancellation requested, worker finishing its current action
    Cancelled,
}

/// How the last playback session ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackOutcome {
    Completed,
    Cancelled,
    Failed(String),
}

/// Externally observable progress of the replay engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaybackStatus {
    pub state: PlaybackState,
    pub remaining: Remaining,
    pub completed_passes: u64,
    /// Set when a session ends, cleared when the next one starts
    pub outcome: Option<PlaybackOutcome>,
}

impl PlaybackStatus {
    fn idle() -> Self {
        Self {
            state: PlaybackState::Idle,
            remaining: Remaining::Finite(0),
            completed_passes: 0,
            outcome: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.state != PlaybackState::Idle
    }
}

/// Cooperative cancellation signal shared with the replay worker
#[derive(Clone)]
pub struct CancelToken {
    inner: Arc<CancelInner>,
}

struct CancelInner {
    cancelled: AtomicBool,
    notify: (Mutex<()>, Condvar),
}

impl CancelToken {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(CancelInner {
                cancelled: AtomicBool::new(false),
                notify: (Mutex::new(()), Condvar::new()),
            }),
        }
    }

    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::Release);
        let (lock, cvar) = &self.inner.notify;
        let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());
        cvar.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
    }

    /// Sleep for `duration` unless cancelled first. Returns `true` if cancelled.
    pub fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        let (lock, cvar) = &self.inner.notify;
        let mut guard = lock.lock().unwrap_or_else(|e| e.into_inner());
        loop {
            if self.is_cancelled() {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            guard = cvar
                .wait_timeout(guard, deadline - now)
                .map(|(guard, _)| guard)
                .unwrap_or_else(|e| e.into_inner().0);
        }
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

/// One running replay: the worker thread and its cancellation token
pub struct PlaybackSession {
    token: CancelToken,
    handle: JoinHandle<()>,
}

impl PlaybackSession {
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    fn join(self) {
        if self.handle.join().is_err() {
            error!("Replay worker panicked");
        }
    }
}

enum PassResult {
    Completed,
    Cancelled,
}

/// Execute one action against the backend
pub fn execute(backend: &mut dyn AutomationBackend, action: &Action, token: &CancelToken) -> Result<()> {
    match action {
        Action::Move { x, y } => backend.move_cursor(*x, *y),
        Action::ButtonDown { x, y, button } => backend.button_down(*x, *y, *button),
        Action::ButtonUp { x, y, button } => backend.button_up(*x, *y, *button),
        Action::Scroll { dy } => backend.scroll(*dy),
        Action::KeyDown(key) => backend.key_down(key),
        Action::KeyUp(key) => backend.key_up(key),
        Action::Press(key) => backend.press(key),
        Action::Sleep(duration) => {
            token.sleep(*duration);
            Ok(())
        }
        Action::Comment(_) => Ok(()),
    }
}

fn play_pass(actions: &[Action], backend: &mut dyn AutomationBackend, token: &CancelToken) -> Result<PassResult> {
    for action in actions {
        if token.is_cancelled() {
            return Ok(PassResult::Cancelled);
        }
        execute(backend, action, token)?;
    }
    Ok(PassResult::Completed)
}

/// Plays captures against an automation backend, one session at a time
pub struct ReplayEngine {
    backend: BackendFactory,
    active: Mutex<Option<PlaybackSession>>,
    status_tx: watch::Sender<PlaybackStatus>,
}

impl ReplayEngine {
    pub fn new(backend: BackendFactory) -> Self {
        let (status_tx, _) = watch::channel(PlaybackStatus::idle());
        Self {
            backend,
            active: Mutex::new(None),
            status_tx,
        }
    }

    /// Subscribe to status updates
    pub fn status(&self) -> watch::Receiver<PlaybackStatus> {
        self.status_tx.subscribe()
    }

    /// The current status
    pub fn current_status(&self) -> PlaybackStatus {
        self.status_tx.borrow().clone()
    }

    /// Whether a session is playing and has not been asked to stop
    pub fn is_running(&self) -> bool {
        self.lock_active()
            .as_ref()
            .is_some_and(|s| !s.is_finished() && !s.is_cancelled())
    }

    fn lock_active(&self) -> std::sync::MutexGuard<'_, Option<PlaybackSession>> {
        self.active.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Parse `capture_text` and start playing it on a worker thread.
    ///
    /// Fails with `EmptyCapture` when the capture holds no replayable action
    /// and with `PlaybackActive` when a session is still playing. A session
    /// that was cancelled but has not yet reached an action boundary is waited
    /// for, so two sessions never overlap.
    #[instrument(skip(self, capture_text))]
    pub fn start(&self, capture_text: &str, policy: RepeatPolicy) -> Result<()> {
        let actions = parse_capture(capture_text)?;
        if actions.iter().all(Action::is_comment) {
            return Err(RetraceError::EmptyCapture);
        }

        let mut active = self.lock_active();
        if let Some(previous) = active.take() {
            if !previous.is_finished() && !previous.is_cancelled() {
                *active = Some(previous);
                return Err(RetraceError::PlaybackActive);
            }
            previous.join();
        }

        let remaining = Remaining::from(policy);
        info!(actions = actions.len(), %remaining, "Starting playback");
        self.status_tx.send_replace(PlaybackStatus {
            state: PlaybackState::Running,
            remaining,
            completed_passes: 0,
            outcome: None,
        });

        let token = CancelToken::new();
        let worker_token = token.clone();
        let factory = Arc::clone(&self.backend);
        let status_tx = self.status_tx.clone();
        let actions: Arc<[Action]> = actions.into();

        let handle = std::thread::Builder::new()
            .name("retrace-replay".to_string())
            .spawn(move || run_session(actions, remaining, factory, worker_token, status_tx))?;

        *active = Some(PlaybackSession { token, handle });
        Ok(())
    }

    /// Request cancellation of the running session. Does not wait for it.
    #[instrument(skip(self))]
    pub fn stop(&self) {
        if let Some(session) = self.lock_active().as_ref() {
            if !session.is_finished() {
                info!("Cancelling playback");
                session.token.cancel();
                self.status_tx.send_modify(|status| {
                    if status.state == PlaybackState::Running {
                        status.state = PlaybackState::Cancelled;
                    }
                });
            }
        }
    }

    /// Block until the current session, if any, has ended
    pub fn wait(&self) {
        let session = self.lock_active().take();
        if let Some(session) = session {
            session.join();
        }
    }
}

impl Drop for ReplayEngine {
    fn drop(&mut self) {
        if let Some(session) = self.active.get_mut().unwrap_or_else(|e| e.into_inner()).take() {
            session.token.cancel();
            session.join();
        }
    }
}

fn run_session(
    actions: Arc<[Action]>,
    mut remaining: Remaining,
    factory: BackendFactory,
    token: CancelToken,
    status_tx: watch::Sender<PlaybackStatus>,
) {
    let outcome = match factory() {
        Ok(mut backend) => play_passes(&actions, backend.as_mut(), &mut remaining, &token, &status_tx),
        Err(e) => {
            error!(error = %e, "Failed to create automation backend");
            PlaybackOutcome::Failed(e.to_string())
        }
    };

    info!(?outcome, "Playback finished");
    status_tx.send_modify(|status| {
        status.state = PlaybackState::Idle;
        status.remaining = remaining;
        status.outcome = Some(outcome);
    });
}

fn play_passes(
    actions: &[Action],
    backend: &mut dyn AutomationBackend,
    remaining: &mut Remaining,
    token: &CancelToken,
    status_tx: &watch::Sender<PlaybackStatus>,
) -> PlaybackOutcome {
    while !remaining.is_exhausted() {
        match play_pass(actions, backend, token) {
            Ok(PassResult::Completed) => {
                remaining.decrement();
                let left = *remaining;
                status_tx.send_modify(|status| {
                    status.remaining = left;
                    status.completed_passes += 1;
                });
                info!(remaining = %left, "Playback pass completed");
            }
            Ok(PassResult::Cancelled) => {
                debug!("Playback cancelled between actions");
                return PlaybackOutcome::Cancelled;
            }
            Err(e) => {
                warn!(error = %e, "Playback pass aborted");
                return PlaybackOutcome::Failed(e.to_string());
            }
        }
    }

    if token.is_cancelled() {
        PlaybackOutcome::Cancelled
    } else {
        PlaybackOutcome::Completed
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::action::Button;
    use crate::keys::CanonicalKey;

    /// Backend that records the primitive calls it receives
    #[derive(Clone, Default)]
    pub(crate) struct RecordingBackend {
        pub calls: Arc<Mutex<Vec<String>>>,
    }

    impl RecordingBackend {
        pub fn factory(&self) -> BackendFactory {
            let backend = self.clone();
            Arc::new(move || Ok(Box::new(backend.clone()) as Box<dyn AutomationBackend>))
        }

        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn record(&self, call: String) -> Result<()> {
            self.calls.lock().unwrap().push(call);
            Ok(())
        }
    }

    impl AutomationBackend for RecordingBackend {
        fn move_cursor(&mut self, x: i32, y: i32) -> Result<()> {
            if x < 0 || y < 0 {
                return Err(RetraceError::BackendSynthesisFailure {
                    action: format!("moveTo({}, {})", x, y),
                    reason: "outside the screen".to_string(),
                });
            }
            self.record(format!("move {} {}", x, y))
        }

        fn button_down(&mut self, x: i32, y: i32, button: Button) -> Result<()> {
            self.record(format!("down {} {} {}", x, y, button.as_str()))
        }

        fn button_up(&mut self, x: i32, y: i32, button: Button) -> Result<()> {
            self.record(format!("up {} {} {}", x, y, button.as_str()))
        }

        fn scroll(&mut self, dy: i64) -> Result<()> {
            self.record(format!("scroll {}", dy))
        }

        fn key_down(&mut self, key: &CanonicalKey) -> Result<()> {
            self.record(format!("keydown {}", key))
        }

        fn key_up(&mut self, key: &CanonicalKey) -> Result<()> {
            self.record(format!("keyup {}", key))
        }

        fn press(&mut self, key: &CanonicalKey) -> Result<()> {
            self.record(format!("press {}", key))
        }
    }

    const CAPTURE: &str = "# header\nmoveTo(1, 2)\nmouseDown(1, 2, 'left')\nmouseUp(1, 2, 'left')\npress('a')\n";

    #[test]
    fn test_finite_repeat_plays_each_pass_in_order() {
        let backend = RecordingBackend::default();
        let engine = ReplayEngine::new(backend.factory());

        engine.start(CAPTURE, RepeatPolicy::Finite(3)).expect("playback should start");
        engine.wait();

        let pass = ["move 1 2", "down 1 2 left", "up 1 2 left", "press a"];
        let expected: Vec<String> = pass.iter().cycle().take(12).map(|s| s.to_string()).collect();
        assert_eq!(backend.calls(), expected);

        let status = engine.current_status();
        assert_eq!(status.state, PlaybackState::Idle);
        assert_eq!(status.remaining, Remaining::Finite(0));
        assert_eq!(status.completed_passes, 3);
        assert_eq!(status.outcome, Some(PlaybackOutcome::Completed));
    }

    #[test]
    fn test_infinite_playback_stops_on_cancel() {
        let backend = RecordingBackend::default();
        let engine = ReplayEngine::new(backend.factory());

        engine
            .start("moveTo(5, 5)\nsleep(0.02)\n", RepeatPolicy::Infinite)
            .expect("playback should start");
        std::thread::sleep(Duration::from_millis(100));
        assert!(engine.is_running());

        let asked = Instant::now();
        engine.stop();
        engine.wait();
        assert!(asked.elapsed() < Duration::from_secs(1));

        let status = engine.current_status();
        assert_eq!(status.state, PlaybackState::Idle);
        assert_eq!(status.remaining, Remaining::Infinite);
        assert_eq!(status.outcome, Some(PlaybackOutcome::Cancelled));
        assert!(!backend.calls().is_empty());
    }

    #[test]
    fn test_cancel_interrupts_long_sleep() {
        let backend = RecordingBackend::default();
        let engine = ReplayEngine::new(backend.factory());

        engine
            .start("sleep(30)\nmoveTo(5, 5)\n", RepeatPolicy::Finite(1))
            .expect("playback should start");
        std::thread::sleep(Duration::from_millis(50));

        let asked = Instant::now();
        engine.stop();
        engine.wait();
        assert!(asked.elapsed() < Duration::from_secs(5));
        assert!(backend.calls().is_empty());
        assert_eq!(engine.current_status().outcome, Some(PlaybackOutcome::Cancelled));
    }

    #[test]
    fn test_empty_capture_is_rejected() {
        let engine = ReplayEngine::new(RecordingBackend::default().factory());
        assert!(matches!(
            engine.start("# Created by retrace\n# on today\n", RepeatPolicy::Finite(1)),
            Err(RetraceError::EmptyCapture)
        ));
        assert_eq!(engine.current_status().state, PlaybackState::Idle);
    }

    #[test]
    fn test_malformed_capture_is_rejected() {
        let engine = ReplayEngine::new(RecordingBackend::default().factory());
        assert!(matches!(
            engine.start("moveTo(1, 2)\nrm -rf /\n", RepeatPolicy::Finite(1)),
            Err(RetraceError::MalformedCapture { line: 2, .. })
        ));
    }

    #[test]
    fn test_backend_failure_aborts_and_is_reported() {
        let backend = RecordingBackend::default();
        let engine = ReplayEngine::new(backend.factory());

        engine
            .start("press('a')\nmoveTo(-5, 3)\npress('b')\n", RepeatPolicy::Finite(2))
            .expect("playback should start");
        engine.wait();

        assert_eq!(backend.calls(), vec!["press a".to_string()]);
        let status = engine.current_status();
        assert_eq!(status.state, PlaybackState::Idle);
        assert_eq!(status.remaining, Remaining::Finite(2));
        assert!(matches!(status.outcome, Some(PlaybackOutcome::Failed(reason)) if reason.contains("moveTo(-5, 3)")));
    }

    #[test]
    fn test_second_start_while_playing_is_refused() {
        let engine = ReplayEngine::new(RecordingBackend::default().factory());
        engine
            .start("sleep(5)\n", RepeatPolicy::Finite(1))
            .expect("playback should start");

        assert!(matches!(
            engine.start("press('a')\n", RepeatPolicy::Finite(1)),
            Err(RetraceError::PlaybackActive)
        ));

        engine.stop();
        engine
            .start("press('a')\n", RepeatPolicy::Finite(1))
            .expect("a cancelled session should not block the next one");
        engine.wait();
        assert_eq!(engine.current_status().outcome, Some(PlaybackOutcome::Completed));
    }

    #[tokio::test]
    async fn test_status_channel_reports_completion() {
        let engine = ReplayEngine::new(RecordingBackend::default().factory());
        let mut status = engine.status();

        engine
            .start("press('a')\n", RepeatPolicy::Finite(1))
            .expect("playback should start");

        let finished = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if status.borrow_and_update().outcome.is_some() {
                    break;
                }
                status.changed().await.expect("engine alive");
            }
        })
        .await;
        assert!(finished.is_ok());
        assert_eq!(status.borrow().state, PlaybackState::Idle);
    }
}
