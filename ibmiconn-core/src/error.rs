//! Error types for `IBM i Connect`
//!
//! This module defines the error types used throughout the core, covering
//! storage and configuration persistence, the transport contract, lifecycle
//! preconditions and event handler faults.
//!
//! Connection attempts never produce these errors: their outcome is reported
//! as a [`crate::handle::ConnectionResult`] value.

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for core operations
#[derive(Debug, Error)]
pub enum IbmiConnError {
    /// Storage façade errors
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Configuration façade errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Transport errors (channel open, command execution)
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Connection lifecycle errors
    #[error("Lifecycle error: {0}")]
    Lifecycle(#[from] LifecycleError),

    /// I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors related to durable key/value storage
#[derive(Debug, Error)]
pub enum StorageError {
    /// Failed to read the backing document
    #[error("Failed to read storage {path}: {reason}")]
    Read {
        /// Path of the backing document
        path: PathBuf,
        /// The reason for the failure
        reason: String,
    },

    /// Failed to write the backing document
    #[error("Failed to write storage: {0}")]
    Write(String),

    /// Stored value could not be decoded into the requested type
    #[error("Invalid value for key {key}: {reason}")]
    InvalidValue {
        /// The storage key
        key: String,
        /// The decoding error
        reason: String,
    },

    /// Failed to serialize a value
    #[error("Failed to serialize storage value: {0}")]
    Serialize(String),
}

/// Errors related to connection configuration records
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to parse configuration file
    #[error("Failed to parse configuration: {0}")]
    Parse(String),

    /// Invalid configuration value
    #[error("Invalid configuration value for {field}: {reason}")]
    Validation {
        /// The field that failed validation
        field: String,
        /// The reason for validation failure
        reason: String,
    },

    /// Configuration directory could not be determined
    #[error("Configuration directory not found: {0}")]
    NotFound(PathBuf),

    /// Failed to write configuration file
    #[error("Failed to write configuration: {0}")]
    Write(String),

    /// Failed to serialize configuration
    #[error("Failed to serialize configuration: {0}")]
    Serialize(String),
}

/// Errors reported by a transport or an open remote channel
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// Remote host could not be reached
    #[error("Host unreachable: {0}")]
    Unreachable(String),

    /// Authentication with remote host failed
    #[error("Authentication failed: {0}")]
    AuthFailed(String),

    /// Protocol negotiation failed after the channel was opened
    #[error("Negotiation failed: {0}")]
    Negotiation(String),

    /// Remote command could not be executed
    #[error("Command execution failed: {0}")]
    CommandFailed(String),

    /// The operation needs a live channel
    #[error("Not connected")]
    NotConnected,

    /// Operation is not supported by this transport
    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    /// Channel teardown failed
    #[error("Failed to close channel: {0}")]
    Close(String),
}

/// Errors surfaced by the connection orchestrator
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// Disconnect refused while resources backed by the connection are unsaved
    #[error("Cannot disconnect while unsaved resources are open: {}", .0.join(", "))]
    UnsavedResources(Vec<String>),

    /// The orchestrator was built without a required collaborator
    #[error("Missing collaborator: {0}")]
    MissingCollaborator(&'static str),
}

/// Error returned by an event handler
#[derive(Debug, Error)]
#[error("{0}")]
pub struct HandlerError(pub String);

impl HandlerError {
    /// Creates a handler error from any displayable message
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

impl From<StorageError> for HandlerError {
    fn from(err: StorageError) -> Self {
        Self(err.to_string())
    }
}

impl From<ConfigError> for HandlerError {
    fn from(err: ConfigError) -> Self {
        Self(err.to_string())
    }
}

impl From<TransportError> for HandlerError {
    fn from(err: TransportError) -> Self {
        Self(err.to_string())
    }
}

/// Result type alias for core operations
pub type Result<T> = std::result::Result<T, IbmiConnError>;

/// Result type alias for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for transport operations
pub type TransportResult<T> = std::result::Result<T, TransportError>;

/// Result type alias for lifecycle operations
pub type LifecycleResult<T> = std::result::Result<T, LifecycleError>;
