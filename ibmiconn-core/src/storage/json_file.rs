//! JSON document storage backend
//!
//! Keeps the whole key/value map in one JSON object on disk, the same shape
//! an editor's global state file has.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::error::{StorageError, StorageResult};

use super::backend::StorageBackend;

/// Default file name inside the data directory
pub const STORAGE_FILE: &str = "storage.json";

/// Storage backend persisting to a single JSON document
#[derive(Debug)]
pub struct JsonFileBackend {
    path: PathBuf,
    values: RwLock<BTreeMap<String, Value>>,
    loaded: AtomicBool,
}

impl JsonFileBackend {
    /// Creates a backend for the given document path
    ///
    /// Nothing is read until [`StorageBackend::load`] is called.
    #[must_use]
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            values: RwLock::new(BTreeMap::new()),
            loaded: AtomicBool::new(false),
        }
    }

    /// Creates a backend in the default data directory
    /// (`~/.local/share/ibmiconn/storage.json` on Linux)
    ///
    /// # Errors
    ///
    /// Returns an error if the data directory cannot be determined.
    pub fn in_data_dir() -> StorageResult<Self> {
        let dir = dirs::data_dir().ok_or_else(|| StorageError::Read {
            path: PathBuf::from("~/.local/share"),
            reason: "Data directory not available".to_string(),
        })?;
        Ok(Self::new(dir.join("ibmiconn").join(STORAGE_FILE)))
    }

    /// Returns the document path
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl StorageBackend for JsonFileBackend {
    /// Reads the document; keys set in memory before the first load win
    /// over the ones on disk
    async fn load(&self) -> StorageResult<()> {
        if self.loaded.load(Ordering::SeqCst) {
            return Ok(());
        }

        let read = tokio::fs::read_to_string(&self.path).await;
        let mut values: BTreeMap<String, Value> = match read {
            Ok(content) if content.trim().is_empty() => BTreeMap::new(),
            Ok(content) => {
                serde_json::from_str(&content).map_err(|e| StorageError::Read {
                    path: self.path.clone(),
                    reason: e.to_string(),
                })?
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                return Err(StorageError::Read {
                    path: self.path.clone(),
                    reason: e.to_string(),
                })
            }
        };

        debug!(path = %self.path.display(), keys = values.len(), "Loaded storage");
        {
            let mut current = self.values.write().unwrap_or_else(PoisonError::into_inner);
            values.append(&mut current);
            *current = values;
        }
        self.loaded.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn save(&self) -> StorageResult<()> {
        // Never overwrite a document that was not read
        self.load().await?;

        let content = {
            let values = self.values.read().unwrap_or_else(PoisonError::into_inner);
            serde_json::to_string_pretty(&*values)
                .map_err(|e| StorageError::Serialize(e.to_string()))?
        };

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                StorageError::Write(format!("Failed to create {}: {}", parent.display(), e))
            })?;
        }

        tokio::fs::write(&self.path, content).await.map_err(|e| {
            StorageError::Write(format!("Failed to write {}: {}", self.path.display(), e))
        })
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
        "json-file"
    }
}
