//! Configuration management
//!
//! This module provides the configuration façade ([`ConfigStore`]), its TOML
//! and in-memory backends, and the per-connection configuration record.

mod manager;
pub mod settings;
mod store;

pub use manager::TomlConfigStore;
pub use settings::{is_valid_library_name, ConnectionConfig, ConnectionProfile, CustomVariable};
pub use store::{validate_stored_connection, ConfigStore, MemoryConfigStore};
