//! Shared application state for the environment server.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use sheetenv::episode::SpreadsheetEnv;

/// One environment shared by all request handlers.
///
/// Every `reset`, `step` and `close` runs under the same lock, so commands are
/// applied strictly one at a time.
#[derive(Clone)]
pub struct AppState {
    env: Arc<Mutex<SpreadsheetEnv>>,
}

impl AppState {
    pub fn new(env: SpreadsheetEnv) -> Self {
        Self {
            env: Arc::new(Mutex::new(env)),
        }
    }

    /// Run `f` with exclusive access to the environment on the blocking pool.
    /// Engine calls and connection backoff block, so they never run on the
    /// async workers.
    pub async fn with_env<T, F>(&self, f: F) -> anyhow::Result<T>
    where
        F: FnOnce(&mut SpreadsheetEnv) -> T + Send + 'static,
        T: Send + 'static,
    {
        let env = Arc::clone(&self.env);
        let value = tokio::task::spawn_blocking(move || {
            let mut guard = lock(&env);
            f(&mut guard)
        })
        .await?;
        Ok(value)
    }
}

/// A handler that panicked mid-command leaves the environment usable: the
/// state machine never holds a half-applied transition across calls.
fn lock(env: &Mutex<SpreadsheetEnv>) -> MutexGuard<'_, SpreadsheetEnv> {
    env.lock().unwrap_or_else(PoisonError::into_inner)
}
