//! Event kinds published on the bus.

use serde::{Deserialize, Serialize};

/// Events published to subscribed features
///
/// The set is closed: kinds are lookup keys and are never built from
/// external input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EventKind {
    /// A connection was established and installed as current
    Connected,
    /// The current connection was torn down
    Disconnected,
    /// The deployment target of a workspace changed
    DeployLocation,
    /// A deployment finished
    Deploy,
}

impl EventKind {
    /// All event kinds
    pub const ALL: [Self; 4] = [
        Self::Connected,
        Self::Disconnected,
        Self::DeployLocation,
        Self::Deploy,
    ];

    /// Returns the event name used in logs
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::DeployLocation => "deployLocation",
            Self::Deploy => "deploy",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
