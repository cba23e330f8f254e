//! Storage backend trait definition
//!
//! This module defines the `StorageBackend` trait that every durable
//! key/value persistence implementation must implement.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::StorageResult;

/// Abstraction over key/value persistence backends
///
/// Reads and writes operate on an in-memory map and take effect
/// immediately; `save()` flushes the map to the backing medium. `load()`
/// must complete before the first read.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Load the backing medium into memory
    ///
    /// Calling this more than once is a no-op.
    ///
    /// # Errors
    /// Returns `StorageError` if the medium exists but cannot be read
    async fn load(&self) -> StorageResult<()>;

    /// Flush the in-memory map to the backing medium
    ///
    /// # Errors
    /// Returns `StorageError` if the medium cannot be written
    async fn save(&self) -> StorageResult<()>;

    /// Returns the value stored under `key`
    fn get(&self, key: &str) -> Option<Value>;

    /// Stores `value` under `key`
    fn set(&self, key: &str, value: Value);

    /// Removes `key`, returning whether it was present
    fn remove(&self, key: &str) -> bool;

    /// Returns all keys in sorted order
    fn keys(&self) -> Vec<String>;

    /// Returns the backend identifier (e.g., "json-file", "memory")
    fn backend_id(&self) -> &'static str;
}
