//! The project-wide reader/writer lock and cooperative cancellation.
//!
//! `parking_lot`'s fair RwLock gives waiting writers preference over a stream
//! of readers and wakes waiters in order. Commands run through `with_writer`,
//! which logs the human-readable label and hands the body a cancellation
//! token to check between filesystem operations.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::{Mutex, RwLock};
use tracing::debug;

use crate::error::CardoError;

/// Cooperative cancellation flag for one writer-lock holder.
///
/// Readers are not interruptible; only command bodies check the token, at
/// their safe points between filesystem operations.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Fail with `Cancelled` when the token has been triggered.
    pub fn check(&self, label: &str) -> Result<(), CardoError> {
        if self.is_cancelled() {
            Err(CardoError::Cancelled(label.to_string()))
        } else {
            Ok(())
        }
    }
}

/// Project-scoped reader/writer lock owning the guarded state.
///
/// Many readers or exactly one writer; the writer decorator installs a fresh
/// cancellation token for the duration of the command.
#[derive(Debug, Default)]
pub struct ProjectLock<S> {
    inner: RwLock<S>,
    current_writer: Mutex<Option<CancellationToken>>,
}

impl<S> ProjectLock<S> {
    pub fn new(state: S) -> Self {
        Self { inner: RwLock::new(state), current_writer: Mutex::new(None) }
    }

    /// Cancel the writer currently holding the lock, if any. The writer fails
    /// with `Cancelled` at its next safe point.
    pub fn cancel_current_writer(&self) {
        if let Some(token) = self.current_writer.lock().as_ref() {
            token.cancel();
        }
    }

    /// Run a query under the reader lock.
    pub fn with_reader<T>(
        &self,
        body: impl FnOnce(&S) -> Result<T, CardoError>,
    ) -> Result<T, CardoError> {
        let guard = self.inner.read();
        body(&guard)
    }

    /// Run a mutation under the writer lock.
    ///
    /// The label names the command for diagnostics; the body receives a fresh
    /// cancellation token and must check it at its safe points.
    pub fn with_writer<T>(
        &self,
        label: &str,
        body: impl FnOnce(&mut S, &CancellationToken) -> Result<T, CardoError>,
    ) -> Result<T, CardoError> {
        let mut guard = self.inner.write();
        let token = CancellationToken::new();
        *self.current_writer.lock() = Some(token.clone());
        debug!(command = label, "writer lock acquired");
        let result = body(&mut guard, &token);
        *self.current_writer.lock() = None;
        debug!(command = label, ok = result.is_ok(), "writer lock released");
        result
    }
}
