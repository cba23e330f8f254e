//! Per-connection configuration record
//!
//! This module defines the configuration negotiated for a connection and the
//! validation rules applied before a record is accepted by a store.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};

/// Configuration record for one named connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Connection name this record belongs to
    pub name: String,
    /// Home directory on the IFS
    #[serde(default = "default_home_directory")]
    pub home_directory: String,
    /// Current library for the job
    #[serde(default = "default_current_library")]
    pub current_library: String,
    /// User portion of the library list
    #[serde(default = "default_library_list")]
    pub library_list: Vec<String>,
    /// Library used for temporary objects
    #[serde(default = "default_temp_library")]
    pub temp_library: String,
    /// IFS directory used for temporary files
    #[serde(default = "default_temp_dir")]
    pub temp_dir: String,
    /// Auxiliary storage pool holding source files
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_asp: Option<String>,
    /// CCSID used when reading and writing source members
    #[serde(default = "default_source_file_ccsid")]
    pub source_file_ccsid: String,
    /// Clear the temp library and directory after connecting
    #[serde(default)]
    pub auto_clear_temp_data: bool,
    /// Use the SQL job for queries when the server supports it
    #[serde(default = "default_true")]
    pub enable_sql: bool,
    /// Refuse writes to remote objects
    #[serde(default)]
    pub read_only_mode: bool,
    /// User-defined variables substituted into remote commands
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub custom_variables: Vec<CustomVariable>,
    /// Saved library-list presets
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub connection_profiles: Vec<ConnectionProfile>,
}

/// A named value substituted into remote commands
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomVariable {
    /// Variable name, referenced as `&NAME`
    pub name: String,
    /// Substituted value
    pub value: String,
}

/// A saved library-list preset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionProfile {
    /// Profile name
    pub name: String,
    /// Current library to switch to
    pub current_library: String,
    /// Library list to switch to
    #[serde(default)]
    pub library_list: Vec<String>,
    /// Home directory to switch to
    #[serde(default = "default_home_directory")]
    pub home_directory: String,
}

fn default_home_directory() -> String {
    ".".to_string()
}

fn default_current_library() -> String {
    "QGPL".to_string()
}

fn default_library_list() -> Vec<String> {
    vec!["QGPL".to_string(), "QTEMP".to_string()]
}

fn default_temp_library() -> String {
    "ILEDITOR".to_string()
}

fn default_temp_dir() -> String {
    "/tmp".to_string()
}

fn default_source_file_ccsid() -> String {
    "*FILE".to_string()
}

const fn default_true() -> bool {
    true
}

impl ConnectionConfig {
    /// Creates a record with default values for the named connection
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            home_directory: default_home_directory(),
            current_library: default_current_library(),
            library_list: default_library_list(),
            temp_library: default_temp_library(),
            temp_dir: default_temp_dir(),
            source_asp: None,
            source_file_ccsid: default_source_file_ccsid(),
            auto_clear_temp_data: false,
            enable_sql: true,
            read_only_mode: false,
            custom_variables: Vec::new(),
            connection_profiles: Vec::new(),
        }
    }

    /// Applies a saved profile to this record
    ///
    /// Returns false if no profile with that name exists.
    pub fn apply_profile(&mut self, profile_name: &str) -> bool {
        let Some(profile) = self
            .connection_profiles
            .iter()
            .find(|p| p.name == profile_name)
            .cloned()
        else {
            return false;
        };
        self.current_library = profile.current_library;
        self.library_list = profile.library_list;
        self.home_directory = profile.home_directory;
        true
    }

    /// Validates the record
    ///
    /// # Errors
    ///
    /// Returns an error naming the first invalid field.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::Validation {
                field: "name".to_string(),
                reason: "Connection name cannot be empty".to_string(),
            });
        }

        if !is_valid_library_name(&self.current_library) {
            return Err(ConfigError::Validation {
                field: "current_library".to_string(),
                reason: format!("'{}' is not a valid library name", self.current_library),
            });
        }

        if !is_valid_library_name(&self.temp_library) {
            return Err(ConfigError::Validation {
                field: "temp_library".to_string(),
                reason: format!("'{}' is not a valid library name", self.temp_library),
            });
        }

        if let Some(bad) = self
            .library_list
            .iter()
            .find(|lib| !is_valid_library_name(lib))
        {
            return Err(ConfigError::Validation {
                field: "library_list".to_string(),
                reason: format!("'{bad}' is not a valid library name"),
            });
        }

        if self.home_directory != "." && !self.home_directory.starts_with('/') {
            return Err(ConfigError::Validation {
                field: "home_directory".to_string(),
                reason: "Home directory must be absolute".to_string(),
            });
        }

        Ok(())
    }
}

/// Returns true if `name` is a valid IBM i library (object) name
///
/// The check is case-insensitive: names are upper-cased by the system.
#[must_use]
pub fn is_valid_library_name(name: &str) -> bool {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^[A-Z#$@][A-Z0-9#$@_.]{0,9}$").expect("Invalid regex pattern"))
        .is_match(&name.to_uppercase())
}
