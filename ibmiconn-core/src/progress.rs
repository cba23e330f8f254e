//! Progress reporting and cancellation for connect attempts.
//!
//! A connect attempt reports its stages through [`ProgressUpdate`] values and
//! user-facing notes through [`MessageKind`]-tagged messages. The caller can
//! abort the attempt through a [`CancelHandle`].

use std::sync::Arc;

use tokio::sync::watch;

/// Severity of a message emitted during a connect attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// Informational note
    Info,
    /// Something the user should look at, the attempt continues
    Warning,
    /// The attempt hit an error
    Error,
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Info => write!(f, "info"),
            Self::Warning => write!(f, "warning"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// A single progress step of a connect attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressUpdate {
    /// Human-readable status message
    pub message: String,
    /// Percentage increment contributed by this step, if known
    pub increment: Option<u8>,
}

impl ProgressUpdate {
    /// Creates a progress update with a message only.
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            increment: None,
        }
    }

    /// Creates a progress update with a message and an increment.
    pub fn step(message: impl Into<String>, increment: u8) -> Self {
        Self {
            message: message.into(),
            increment: Some(increment),
        }
    }
}

/// A handle for cancelling a connect attempt from another task.
///
/// Clones share the same signal. Once cancelled, a handle stays cancelled.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    signal: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    /// Creates a new, not yet cancelled, handle.
    #[must_use]
    pub fn new() -> Self {
        let (signal, _) = watch::channel(false);
        Self {
            signal: Arc::new(signal),
        }
    }

    /// Signals cancellation to everyone holding a clone of this handle.
    pub fn cancel(&self) {
        self.signal.send_replace(true);
    }

    /// Returns true if cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.signal.borrow()
    }

    /// Resolves once cancellation has been requested.
    pub async fn cancelled(&self) {
        let mut rx = self.signal.subscribe();
        // The sender lives as long as `self`, so this only returns on cancel.
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}

impl Default for CancelHandle {
    fn default() -> Self {
        Self::new()
    }
}
