use crate::action::Button;
use crate::error::Result;
use crate::keys::CanonicalKey;
use std::sync::Arc;

mod native;

pub use self::native::EnigoBackend;

/// The common trait that input synthesis backends must implement.
///
/// Every primitive may fail, e.g. on coordinates outside the screen; the
/// replay engine reports the failure and abandons the pass.
pub trait AutomationBackend {
    /// Move the cursor to absolute screen coordinates
    fn move_cursor(&mut self, x: i32, y: i32) -> Result<()>;

    /// Press a mouse button at the given position
    fn button_down(&mut self, x: i32, y: i32, button: Button) -> Result<()>;

    /// Release a mouse button at the given position
    fn button_up(&mut self, x: i32, y: i32, button: Button) -> Result<()>;

    /// Scroll the wheel vertically; positive is away from the user
    fn scroll(&mut self, dy: i64) -> Result<()>;

    fn key_down(&mut self, key: &CanonicalKey) -> Result<()>;

    fn key_up(&mut self, key: &CanonicalKey) -> Result<()>;

    /// Press and release a key
    fn press(&mut self, key: &CanonicalKey) -> Result<()>;
}

/// Builds a backend on the thread that will drive it.
///
/// Some platform backends cannot move between threads, so the replay worker
/// constructs its own instance.
pub type BackendFactory = Arc<dyn Fn() -> Result<Box<dyn AutomationBackend>> + Send + Sync>;

/// Factory for the platform backend
pub fn default_backend_factory() -> BackendFactory {
    Arc::new(|| Ok(Box::new(EnigoBackend::new()?) as Box<dyn AutomationBackend>))
}
