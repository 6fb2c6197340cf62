//! Log capture for tests.
//!
//! `lrpc` logs through `tracing` with its `log` bridge enabled, so records
//! reach the global [`logtest::Logger`]. The logger is process-wide; tests
//! that assert on it should also be marked `#[serial]`.

use std::sync::{Mutex, MutexGuard, OnceLock, PoisonError};

use logtest::Logger;
use rstest::fixture;

/// Exclusive handle to the global logger.
pub struct LoggerHandle {
    guard: MutexGuard<'static, Logger>,
}

impl LoggerHandle {
    /// Acquire the global [`Logger`], discarding records left by earlier
    /// tests.
    #[must_use]
    pub fn new() -> Self {
        static LOGGER: OnceLock<Mutex<Logger>> = OnceLock::new();

        let logger = LOGGER.get_or_init(|| Mutex::new(Logger::start()));
        let mut guard = logger.lock().unwrap_or_else(PoisonError::into_inner);
        while guard.pop().is_some() {}

        Self { guard }
    }

    /// Drain captured records, returning those at `level` whose message
    /// contains `needle`.
    pub fn take_matching(&mut self, level: log::Level, needle: &str) -> Vec<String> {
        let mut found = Vec::new();
        while let Some(record) = self.guard.pop() {
            if record.level() == level && record.args().contains(needle) {
                found.push(record.args().to_owned());
            }
        }
        found
    }
}

impl Default for LoggerHandle {
    fn default() -> Self { Self::new() }
}

impl std::ops::Deref for LoggerHandle {
    type Target = Logger;

    fn deref(&self) -> &Self::Target { &self.guard }
}

impl std::ops::DerefMut for LoggerHandle {
    fn deref_mut(&mut self) -> &mut Self::Target { &mut self.guard }
}

#[allow(
    unused_braces,
    reason = "rustc false positive for single line rstest fixtures"
)]
#[fixture]
pub fn logger() -> LoggerHandle { LoggerHandle::new() }
