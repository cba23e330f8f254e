//! In-memory storage backend.

use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use serde_json::Value;

use crate::error::StorageResult;

use super::backend::StorageBackend;

/// A storage backend that keeps everything in memory
///
/// Used by tests and by hosts without durable storage. `load()` and
/// `save()` succeed without doing anything.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    values: RwLock<BTreeMap<String, Value>>,
}

impl MemoryBackend {
    /// Creates an empty backend
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    async fn load(&self) -> StorageResult<()> {
        Ok(())
    }

    async fn save(&self) -> StorageResult<()> {
        Ok(())
    }

    fn get(&self, key: &str) -> Option<Value> {
        self.values
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn set(&self, key: &str, value: Value) {
        self.values
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value);
    }

    fn remove(&self, key: &str) -> bool {
        self.values
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key)
            .is_some()
    }

    fn keys(&self) -> Vec<String> {
        self.values
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    fn backend_id(&self) -> &'static str {
        "memory"
    }
}
