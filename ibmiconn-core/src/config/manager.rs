//! TOML-backed configuration store
//!
//! This module provides the `TomlConfigStore` which keeps connection
//! definitions and per-connection configuration records in TOML files.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use tracing::debug;

use crate::error::{ConfigError, ConfigResult};
use crate::models::StoredConnection;

use super::settings::ConnectionConfig;
use super::store::{ConfigState, ConfigStore};

/// File names for configuration files
const CONNECTIONS_FILE: &str = "connections.toml";
const CONFIG_FILE: &str = "config.toml";

/// Wrapper for serializing a list of connection definitions
#[derive(Debug, Default, serde::Serialize, serde::Deserialize)]
struct ConnectionsFile {
    #[serde(default)]
    connections: Vec<StoredConnection>,
}

/// Wrapper for serializing per-connection configuration records
#[derive(Debug, Default, serde::Serialize, serde::Deserialize)]
struct SettingsFile {
    #[serde(default)]
    connection_settings: Vec<ConnectionConfig>,
}

/// Configuration store persisting to TOML files
///
/// Configuration is stored in `~/.config/ibmiconn/` by default.
#[derive(Debug)]
pub struct TomlConfigStore {
    /// Base directory for configuration files
    config_dir: PathBuf,
    state: RwLock<ConfigState>,
}

impl TomlConfigStore {
    /// Creates a store using the default configuration directory
    ///
    /// The default directory is `~/.config/ibmiconn/`
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration directory cannot be determined.
    pub fn new() -> ConfigResult<Self> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| ConfigError::NotFound(PathBuf::from("~/.config")))?
            .join("ibmiconn");
        Ok(Self::with_config_dir(config_dir))
    }

    /// Creates a store with a custom configuration directory
    ///
    /// This is useful for testing or non-standard configurations.
    #[must_use]
    pub fn with_config_dir(config_dir: PathBuf) -> Self {
        Self {
            config_dir,
            state: RwLock::new(ConfigState::default()),
        }
    }

    /// Returns the configuration directory path
    #[must_use]
    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    /// Ensures the configuration directory exists
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn ensure_config_dir(&self) -> ConfigResult<()> {
        if !self.config_dir.exists() {
            fs::create_dir_all(&self.config_dir).map_err(|e| {
                ConfigError::Write(format!(
                    "Failed to create config directory {}: {}",
                    self.config_dir.display(),
                    e
                ))
            })?;
        }
        Ok(())
    }

    fn snapshot(&self) -> ConfigState {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    // ========== Generic TOML Operations ==========

    /// Loads and parses a TOML file
    ///
    /// Returns the default value if the file doesn't exist.
    fn load_toml_file<T>(path: &Path) -> ConfigResult<T>
    where
        T: serde::de::DeserializeOwned + Default,
    {
        if !path.exists() {
            return Ok(T::default());
        }

        let content = fs::read_to_string(path)
            .map_err(|e| ConfigError::Parse(format!("Failed to read {}: {}", path.display(), e)))?;

        toml::from_str(&content)
            .map_err(|e| ConfigError::Parse(format!("Failed to parse {}: {}", path.display(), e)))
    }

    /// Saves data to a TOML file
    fn save_toml_file<T>(path: &Path, data: &T) -> ConfigResult<()>
    where
        T: serde::Serialize,
    {
        let content = toml::to_string_pretty(data)
            .map_err(|e| ConfigError::Serialize(format!("Failed to serialize: {e}")))?;

        fs::write(path, content)
            .map_err(|e| ConfigError::Write(format!("Failed to write {}: {}", path.display(), e)))
    }
}

#[async_trait]
impl ConfigStore for TomlConfigStore {
    async fn load(&self) -> ConfigResult<()> {
        let connections =
            Self::load_toml_file::<ConnectionsFile>(&self.config_dir.join(CONNECTIONS_FILE))?;
        let settings = Self::load_toml_file::<SettingsFile>(&self.config_dir.join(CONFIG_FILE))?;

        debug!(
            dir = %self.config_dir.display(),
            connections = connections.connections.len(),
            "Loaded configuration"
        );

        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.connections = connections.connections;
        state.settings = settings.connection_settings;
        Ok(())
    }

    async fn save(&self) -> ConfigResult<()> {
        self.ensure_config_dir()?;
        let state = self.snapshot();

        Self::save_toml_file(
            &self.config_dir.join(CONNECTIONS_FILE),
            &ConnectionsFile {
                connections: state.connections,
            },
        )?;
        Self::save_toml_file(
            &self.config_dir.join(CONFIG_FILE),
            &SettingsFile {
                connection_settings: state.settings,
            },
        )
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
        self.snapshot().connections
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
        "toml"
    }
}
