//! Storage façade
//!
//! [`Storage`] gives the core typed access to global state (recently used
//! connections, cached server settings) and to state scoped to the current
//! connection (source lists, profiles, deployments), both kept in one
//! [`StorageBackend`].

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::capability::ServerSettings;
use crate::error::{StorageError, StorageResult};

use super::backend::StorageBackend;

const LAST_CONNECTIONS_KEY: &str = "lastConnections";
const SERVER_SETTINGS_PREFIX: &str = "serverSettingsCache_";
const CONNECTION_PREFIX: &str = "settings-";

/// Maximum number of remembered current libraries per connection
pub const MAX_PREVIOUS_CUR_LIBS: usize = 10;

/// A recently used connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastConnection {
    /// Connection name
    pub name: String,
    /// When the connection was last established
    pub timestamp: DateTime<Utc>,
}

/// Library (or IFS path) → ordered member names
pub type SourceList = BTreeMap<String, Vec<String>>;

/// State kept per named connection
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConnectionRecord {
    #[serde(default)]
    source_list: SourceList,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    last_profile: Option<String>,
    #[serde(default)]
    previous_cur_libs: Vec<String>,
    #[serde(default)]
    deployments: BTreeMap<String, String>,
}

/// Typed storage façade over a [`StorageBackend`]
pub struct Storage {
    backend: Arc<dyn StorageBackend>,
    connection_name: RwLock<Option<String>>,
}

impl Storage {
    /// Creates a façade over the given backend
    #[must_use]
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self {
            backend,
            connection_name: RwLock::new(None),
        }
    }

    /// Returns the backend identifier
    #[must_use]
    pub fn backend_id(&self) -> &'static str {
        self.backend.backend_id()
    }

    /// Loads the backing medium
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    pub async fn load(&self) -> StorageResult<()> {
        self.backend.load().await
    }

    /// Flushes pending changes to the backing medium
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be written.
    pub async fn save(&self) -> StorageResult<()> {
        self.backend.save().await
    }

    // ========== Current connection pointer ==========

    /// Points connection-scoped state at `name`, or at nothing
    pub fn set_connection_name(&self, name: Option<String>) {
        debug!(connection = ?name, "Storage connection pointer changed");
        *self
            .connection_name
            .write()
            .unwrap_or_else(PoisonError::into_inner) = name;
    }

    /// Returns the connection that connection-scoped state refers to
    #[must_use]
    pub fn connection_name(&self) -> Option<String> {
        self.connection_name
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    // ========== Global state ==========

    /// Returns recently used connections, most recent first
    #[must_use]
    pub fn get_last_connections(&self) -> Vec<LastConnection> {
        self.read_or_default(LAST_CONNECTIONS_KEY)
    }

    /// Returns the most recently used connection name
    #[must_use]
    pub fn get_last_connection(&self) -> Option<String> {
        self.get_last_connections()
            .into_iter()
            .next()
            .map(|last| last.name)
    }

    /// Records `name` as the most recently used connection
    ///
    /// # Errors
    ///
    /// Returns an error if the list cannot be serialized.
    pub fn set_last_connection(&self, name: &str) -> StorageResult<()> {
        let mut list = self.get_last_connections();
        list.retain(|last| last.name != name);
        list.insert(
            0,
            LastConnection {
                name: name.to_string(),
                timestamp: Utc::now(),
            },
        );
        self.write(LAST_CONNECTIONS_KEY, &list)
    }

    /// Forgets a connection in the recently used list
    ///
    /// # Errors
    ///
    /// Returns an error if the list cannot be serialized.
    pub fn remove_last_connection(&self, name: &str) -> StorageResult<()> {
        let mut list = self.get_last_connections();
        list.retain(|last| last.name != name);
        self.write(LAST_CONNECTIONS_KEY, &list)
    }

    /// Returns cached server settings for a connection
    #[must_use]
    pub fn get_server_settings(&self, connection_name: &str) -> Option<ServerSettings> {
        self.read(&format!("{SERVER_SETTINGS_PREFIX}{connection_name}"))
    }

    /// Caches server settings for a connection
    ///
    /// # Errors
    ///
    /// Returns an error if the settings cannot be serialized.
    pub fn set_server_settings(
        &self,
        connection_name: &str,
        settings: &ServerSettings,
    ) -> StorageResult<()> {
        self.write(&format!("{SERVER_SETTINGS_PREFIX}{connection_name}"), settings)
    }

    /// Drops cached server settings for a connection
    pub fn delete_server_settings(&self, connection_name: &str) -> bool {
        self.backend
            .remove(&format!("{SERVER_SETTINGS_PREFIX}{connection_name}"))
    }

    // ========== Connection-scoped state ==========

    /// Returns the source list of the current connection
    #[must_use]
    pub fn get_source_list(&self) -> SourceList {
        self.connection_record().source_list
    }

    /// Replaces the source list of the current connection
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be serialized.
    pub fn set_source_list(&self, source_list: SourceList) -> StorageResult<()> {
        self.update_connection_record(|record| record.source_list = source_list)
    }

    /// Returns the last profile applied on the current connection
    #[must_use]
    pub fn get_last_profile(&self) -> Option<String> {
        self.connection_record().last_profile
    }

    /// Records the last profile applied on the current connection
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be serialized.
    pub fn set_last_profile(&self, profile: &str) -> StorageResult<()> {
        let profile = profile.to_string();
        self.update_connection_record(|record| record.last_profile = Some(profile))
    }

    /// Returns previously used current libraries, most recent first
    #[must_use]
    pub fn get_previous_cur_libs(&self) -> Vec<String> {
        self.connection_record().previous_cur_libs
    }

    /// Remembers a current library, keeping at most
    /// [`MAX_PREVIOUS_CUR_LIBS`] entries
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be serialized.
    pub fn add_previous_cur_lib(&self, library: &str) -> StorageResult<()> {
        let library = library.to_uppercase();
        self.update_connection_record(|record| {
            record.previous_cur_libs.retain(|lib| *lib != library);
            record.previous_cur_libs.insert(0, library);
            record.previous_cur_libs.truncate(MAX_PREVIOUS_CUR_LIBS);
        })
    }

    /// Returns workspace path → remote directory deployment mappings
    #[must_use]
    pub fn get_deployments(&self) -> BTreeMap<String, String> {
        self.connection_record().deployments
    }

    /// Sets (or, with `None`, clears) the deployment target of a workspace
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be serialized.
    pub fn set_deployment(&self, workspace: &str, remote_dir: Option<&str>) -> StorageResult<()> {
        let workspace = workspace.to_string();
        let remote_dir = remote_dir.map(str::to_string);
        self.update_connection_record(|record| match remote_dir {
            Some(dir) => {
                record.deployments.insert(workspace, dir);
            }
            None => {
                record.deployments.remove(&workspace);
            }
        })
    }

    /// Removes all state scoped to a connection, including cached settings
    pub fn delete_connection_state(&self, connection_name: &str) {
        self.backend
            .remove(&format!("{CONNECTION_PREFIX}{connection_name}"));
        self.delete_server_settings(connection_name);
    }

    // ========== Helpers ==========

    fn connection_key(&self) -> Option<String> {
        self.connection_name()
            .map(|name| format!("{CONNECTION_PREFIX}{name}"))
    }

    fn connection_record(&self) -> ConnectionRecord {
        self.connection_key()
            .map(|key| self.read_or_default(&key))
            .unwrap_or_default()
    }

    fn update_connection_record(
        &self,
        apply: impl FnOnce(&mut ConnectionRecord),
    ) -> StorageResult<()> {
        let Some(key) = self.connection_key() else {
            debug!("No current connection, connection-scoped write ignored");
            return Ok(());
        };
        let mut record: ConnectionRecord = self.read_or_default(&key);
        apply(&mut record);
        self.write(&key, &record)
    }

    fn read<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.backend.get(key)?;
        match serde_json::from_value(value) {
            Ok(decoded) => Some(decoded),
            Err(e) => {
                warn!(key, error = %e, "Ignoring undecodable storage value");
                None
            }
        }
    }

    fn read_or_default<T: DeserializeOwned + Default>(&self, key: &str) -> T {
        self.read(key).unwrap_or_default()
    }

    fn write<T: Serialize>(&self, key: &str, value: &T) -> StorageResult<()> {
        let value = serde_json::to_value(value).map_err(|e| StorageError::InvalidValue {
            key: key.to_string(),
            reason: e.to_string(),
        })?;
        self.backend.set(key, value);
        Ok(())
    }
}

impl std::fmt::Debug for Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Storage")
            .field("backend", &self.backend.backend_id())
            .field("connection_name", &self.connection_name())
            .finish()
    }
}
