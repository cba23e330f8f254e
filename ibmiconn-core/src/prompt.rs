//! UI collaborator contracts
//!
//! The core never draws dialogs itself. Everything the user has to see or
//! answer during the connection lifecycle goes through [`UserPrompter`], and
//! the editor tells the core about unsaved work through [`OpenResources`].

use async_trait::async_trait;

use crate::handle::ErrorCode;
use crate::progress::{MessageKind, ProgressUpdate};

/// User-facing prompts and notifications
#[async_trait]
pub trait UserPrompter: Send + Sync {
    /// Asks whether to reconnect after the connection dropped
    ///
    /// Returns `false` for "no" and for a dismissed prompt.
    async fn confirm_reconnect(&self, connection_name: &str) -> bool;

    /// Asks whether to try again after a failed connect attempt
    async fn confirm_retry(&self, connection_name: &str, detail: &str) -> bool;

    /// Shows a notice that blocks the requested action
    async fn blocking_notice(&self, text: &str);

    /// Shows a message emitted during a connect attempt
    async fn message(&self, kind: MessageKind, text: &str);

    /// Reports a progress step of a connect attempt
    async fn progress(&self, update: ProgressUpdate);

    /// Handles an environment problem found while connecting
    ///
    /// Returns `true` if the problem was dealt with.
    async fn handle_error(&self, code: &ErrorCode, data: &str) -> bool;
}

/// Tracks editor resources backed by the current connection
pub trait OpenResources: Send + Sync {
    /// Returns the names of open resources with unsaved changes
    fn unsaved_resources(&self) -> Vec<String>;
}

/// Resource tracker for hosts that never hold unsaved remote resources
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpenResources;

impl OpenResources for NoOpenResources {
    fn unsaved_resources(&self) -> Vec<String> {
        Vec::new()
    }
}
