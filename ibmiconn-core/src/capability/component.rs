//! Remote components and server capability detection
//!
//! A remote component is a piece of server-side software the extension can
//! take advantage of when it is installed. Components are looked up through
//! the [`ComponentRegistry`] and checked once per negotiated connection; the
//! outcome is cached as [`ServerSettings`].

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::transport::RemoteChannel;

use super::registry::CapabilityRegistry;

/// Installation state of a remote component
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentState {
    /// Present and usable
    Installed,
    /// Not present on the server
    NotInstalled,
    /// The check itself failed
    Error,
}

/// A server-side component whose presence is detected at connect time
#[async_trait]
pub trait RemoteComponent: Send + Sync {
    /// Returns the component identifier used as registry key
    fn component_id(&self) -> &'static str;

    /// Checks the component's state over an open channel
    async fn check(&self, channel: &dyn RemoteChannel) -> ComponentState;
}

/// Registry of remote components keyed by component ID
pub type ComponentRegistry = CapabilityRegistry<dyn RemoteComponent>;

/// Server capabilities negotiated for a connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerSettings {
    /// Detected component states keyed by component ID
    #[serde(default)]
    pub components: BTreeMap<String, ComponentState>,
    /// When detection ran
    pub detected_at: DateTime<Utc>,
}

impl ServerSettings {
    /// Creates settings with no detected components
    #[must_use]
    pub fn empty() -> Self {
        Self {
            components: BTreeMap::new(),
            detected_at: Utc::now(),
        }
    }

    /// Returns true if the component was detected as installed
    #[must_use]
    pub fn is_installed(&self, component_id: &str) -> bool {
        self.components.get(component_id) == Some(&ComponentState::Installed)
    }
}

impl CapabilityRegistry<dyn RemoteComponent> {
    /// Creates a registry holding the built-in components
    #[must_use]
    pub fn with_defaults() -> Self {
        let registry = Self::new();
        let sql = Arc::new(SqlComponent);
        let shell = Arc::new(BashComponent);
        registry.register(sql.component_id(), sql);
        registry.register(shell.component_id(), shell);
        registry
    }

    /// Runs every registered component check, in identifier order
    pub async fn detect(&self, channel: &dyn RemoteChannel) -> ServerSettings {
        let mut settings = ServerSettings::empty();
        for (id, component) in self.entries() {
            let state = component.check(channel).await;
            debug!(component = %id, ?state, "Component checked");
            settings.components.insert(id, state);
        }
        settings
    }
}

/// Checks for a command by its exit code
async fn check_by_exit_code(channel: &dyn RemoteChannel, command: &str) -> ComponentState {
    match channel.run(command).await {
        Ok(output) if output.success() => ComponentState::Installed,
        Ok(_) => ComponentState::NotInstalled,
        Err(_) => ComponentState::Error,
    }
}

/// Db2 for i SQL server job program
#[derive(Debug, Clone, Copy, Default)]
pub struct SqlComponent;

#[async_trait]
impl RemoteComponent for SqlComponent {
    fn component_id(&self) -> &'static str {
        "sql"
    }

    async fn check(&self, channel: &dyn RemoteChannel) -> ComponentState {
        check_by_exit_code(
            channel,
            "/QOpenSys/usr/bin/system \"CHKOBJ OBJ(QSYS/QZDFMDB2) OBJTYPE(*PGM)\"",
        )
        .await
    }
}

/// Bash from the open-source package repository
#[derive(Debug, Clone, Copy, Default)]
pub struct BashComponent;

#[async_trait]
impl RemoteComponent for BashComponent {
    fn component_id(&self) -> &'static str {
        "bash"
    }

    async fn check(&self, channel: &dyn RemoteChannel) -> ComponentState {
        check_by_exit_code(channel, "test -x /QOpenSys/pkgs/bin/bash").await
    }
}
