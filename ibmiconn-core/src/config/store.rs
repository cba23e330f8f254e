//! Configuration façade
//!
//! The core loads and saves connection definitions and per-connection
//! configuration records only through [`ConfigStore`]. Backends are supplied
//! at construction time; [`MemoryConfigStore`] keeps everything in memory.

use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;

use crate::error::{ConfigError, ConfigResult};
use crate::models::StoredConnection;

use super::settings::ConnectionConfig;

/// Abstraction over configuration backends
///
/// Setters apply immediately to the in-memory representation; `save()`
/// flushes it to the backing medium.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Loads the backing medium into memory. Idempotent.
    ///
    /// # Errors
    /// Returns `ConfigError` if the medium exists but cannot be read or parsed
    async fn load(&self) -> ConfigResult<()>;

    /// Flushes the in-memory representation to the backing medium
    ///
    /// # Errors
    /// Returns `ConfigError` if the medium cannot be written
    async fn save(&self) -> ConfigResult<()>;

    /// Returns the record for a connection, or a default record if none exists
    fn get(&self, connection_name: &str) -> ConnectionConfig;

    /// Inserts or replaces the record named by `record.name`
    ///
    /// # Errors
    /// Returns `ConfigError::Validation` if the record is invalid
    async fn update(&self, record: ConnectionConfig) -> ConfigResult<()>;

    /// Removes a record, returning whether one existed
    async fn remove(&self, connection_name: &str) -> ConfigResult<bool>;

    /// Returns all stored connection definitions in insertion order
    fn connections(&self) -> Vec<StoredConnection>;

    /// Looks up a stored connection definition by name (case-insensitive)
    fn find_connection(&self, name: &str) -> Option<StoredConnection> {
        self.connections()
            .into_iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// Inserts or replaces a stored connection definition
    ///
    /// # Errors
    /// Returns `ConfigError::Validation` if the definition is invalid
    async fn upsert_connection(&self, connection: StoredConnection) -> ConfigResult<()>;

    /// Removes a stored connection definition and its record
    async fn remove_connection(&self, name: &str) -> ConfigResult<bool>;

    /// Returns the backend identifier
    fn backend_id(&self) -> &'static str;
}

/// In-memory state shared by the store implementations
#[derive(Debug, Default, Clone, PartialEq)]
pub(crate) struct ConfigState {
    pub connections: Vec<StoredConnection>,
    pub settings: Vec<ConnectionConfig>,
}

impl ConfigState {
    pub fn get(&self, name: &str) -> ConnectionConfig {
        self.settings
            .iter()
            .find(|c| c.name == name)
            .cloned()
            .unwrap_or_else(|| ConnectionConfig::new(name))
    }

    pub fn update(&mut self, record: ConnectionConfig) -> ConfigResult<()> {
        record.validate()?;
        match self.settings.iter_mut().find(|c| c.name == record.name) {
            Some(existing) => *existing = record,
            None => self.settings.push(record),
        }
        Ok(())
    }

    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.settings.len();
        self.settings.retain(|c| c.name != name);
        self.settings.len() != before
    }

    pub fn upsert_connection(&mut self, connection: StoredConnection) -> ConfigResult<()> {
        validate_stored_connection(&connection)?;
        match self
            .connections
            .iter_mut()
            .find(|c| c.name.eq_ignore_ascii_case(&connection.name))
        {
            Some(existing) => *existing = connection,
            None => self.connections.push(connection),
        }
        Ok(())
    }

    pub fn remove_connection(&mut self, name: &str) -> bool {
        let Some(index) = self
            .connections
            .iter()
            .position(|c| c.name.eq_ignore_ascii_case(name))
        else {
            return false;
        };
        let removed = self.connections.remove(index);
        self.remove(&removed.name);
        true
    }
}

/// Validates a stored connection definition
///
/// # Errors
///
/// Returns an error if the name, host or username is empty.
pub fn validate_stored_connection(connection: &StoredConnection) -> ConfigResult<()> {
    for (field, value) in [
        ("name", &connection.name),
        ("host", &connection.host),
        ("username", &connection.username),
    ] {
        if value.trim().is_empty() {
            return Err(ConfigError::Validation {
                field: field.to_string(),
                reason: format!("Connection {field} cannot be empty"),
            });
        }
    }
    Ok(())
}

/// A configuration store that never touches disk
#[derive(Debug, Default)]
pub struct MemoryConfigStore {
    state: RwLock<ConfigState>,
}

impl MemoryConfigStore {
    /// Creates an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store pre-populated with connection definitions
    #[must_use]
    pub fn with_connections(connections: Vec<StoredConnection>) -> Self {
        Self {
            state: RwLock::new(ConfigState {
                connections,
                settings: Vec::new(),
            }),
        }
    }
}

#[async_trait]
impl ConfigStore for MemoryConfigStore {
    async fn load(&self) -> ConfigResult<()> {
        Ok(())
    }

    async fn save(&self) -> ConfigResult<()> {
        Ok(())
    }

    fn get(&self, connection_name: &str) -> ConnectionConfig {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(connection_name)
    }

    async fn update(&self, record: ConnectionConfig) -> ConfigResult<()> {
        self.state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .update(record)
    }

    async fn remove(&self, connection_name: &str) -> ConfigResult<bool> {
        Ok(self
            .state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(connection_name))
    }

    fn connections(&self) -> Vec<StoredConnection> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .connections
            .clone()
    }

    async fn upsert_connection(&self, connection: StoredConnection) -> ConfigResult<()> {
        self.state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .upsert_connection(connection)
    }

    async fn remove_connection(&self, name: &str) -> ConfigResult<bool> {
        Ok(self
            .state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove_connection(name))
    }

    fn backend_id(&self) -> &'static str {
        "memory"
    }
}
