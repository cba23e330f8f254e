//! Lifecycle states and connect options

use crate::models::Credentials;
use crate::progress::CancelHandle;

/// Where the orchestrator is in the connection lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LifecycleState {
    /// No current connection
    #[default]
    Idle,
    /// A connect attempt is in flight
    Connecting,
    /// The current connection is established
    Connected,
    /// The current connection is being torn down
    Disconnecting,
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
            Self::Disconnecting => write!(f, "disconnecting"),
        }
    }
}

/// Parameters of one [`connect`](super::ConnectionOrchestrator::connect) call
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    /// Credentials used for every attempt of this call
    pub credentials: Credentials,
    /// Offer the user another attempt after a failure
    pub reconnect_on_failure: bool,
    /// The call re-establishes a dropped connection
    pub is_reconnect: bool,
    /// Detect server capabilities even if cached
    pub reload_settings: bool,
    /// Aborts the attempt when raised
    pub cancel: CancelHandle,
}

impl ConnectOptions {
    /// Creates options for a single, non-retried attempt
    #[must_use]
    pub fn new(credentials: Credentials) -> Self {
        Self {
            credentials,
            reconnect_on_failure: false,
            is_reconnect: false,
            reload_settings: false,
            cancel: CancelHandle::new(),
        }
    }

    /// Offers retries after failed attempts
    #[must_use]
    pub const fn reconnect_on_failure(mut self, enabled: bool) -> Self {
        self.reconnect_on_failure = enabled;
        self
    }

    /// Marks the call as a reconnect
    #[must_use]
    pub const fn reconnect(mut self, is_reconnect: bool) -> Self {
        self.is_reconnect = is_reconnect;
        self
    }

    /// Forces capability detection
    #[must_use]
    pub const fn reload_settings(mut self, reload: bool) -> Self {
        self.reload_settings = reload;
        self
    }

    /// Uses an externally owned cancellation signal
    #[must_use]
    pub fn with_cancel(mut self, cancel: CancelHandle) -> Self {
        self.cancel = cancel;
        self
    }
}
