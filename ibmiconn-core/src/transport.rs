//! Transport contract
//!
//! The core never speaks the wire protocol itself. A [`Transport`] opens a
//! [`RemoteChannel`] for a set of credentials; the channel runs shell
//! commands on the remote host and reports when it goes away.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::TransportResult;
use crate::models::Credentials;

/// Output of a remote command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code reported by the remote shell
    pub code: i32,
    /// Captured standard output
    pub stdout: String,
    /// Captured standard error
    pub stderr: String,
}

impl CommandOutput {
    /// Creates an output with the given exit code and no captured text
    #[must_use]
    pub const fn with_code(code: i32) -> Self {
        Self {
            code,
            stdout: String::new(),
            stderr: String::new(),
        }
    }

    /// Returns true if the command exited with code 0
    #[must_use]
    pub const fn success(&self) -> bool {
        self.code == 0
    }
}

/// An open session to a remote host
#[async_trait]
pub trait RemoteChannel: Send + Sync {
    /// Run a shell command on the remote host
    ///
    /// # Errors
    /// Returns `TransportError` if the command could not be executed at all;
    /// a non-zero exit code is reported through [`CommandOutput::code`]
    async fn run(&self, command: &str) -> TransportResult<CommandOutput>;

    /// Resolves once the underlying channel has gone away
    ///
    /// Resolves immediately if the channel is already gone.
    async fn closed(&self);

    /// Close the channel
    ///
    /// # Errors
    /// Returns `TransportError::Close` if teardown failed
    async fn close(&self) -> TransportResult<()>;
}

/// Opens remote channels
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open a channel and authenticate with the given credentials
    ///
    /// # Errors
    /// Returns `TransportError` for unreachable hosts, rejected credentials
    /// or failed negotiation
    async fn open(&self, credentials: &Credentials) -> TransportResult<Arc<dyn RemoteChannel>>;

    /// Returns the transport identifier (e.g., "ssh", "tcp")
    fn transport_id(&self) -> &'static str;
}
