//! Durable key/value storage
//!
//! This module provides the storage façade ([`Storage`]) and the backends it
//! can sit on: a JSON document on disk and an in-memory map.

mod backend;
mod json_file;
mod manager;
mod memory;

pub use backend::StorageBackend;
pub use json_file::{JsonFileBackend, STORAGE_FILE};
pub use manager::{LastConnection, SourceList, Storage, MAX_PREVIOUS_CUR_LIBS};
pub use memory::MemoryBackend;
