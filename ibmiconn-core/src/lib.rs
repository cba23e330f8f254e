//! `IBM i Connect` Core Library
//!
//! This crate provides the connection lifecycle core of the `IBM i Connect`
//! editor extension: the connection handle, the orchestrator that owns the
//! current connection, the event bus features subscribe to, and the storage
//! and configuration façades persisted around connection transitions.

pub mod capability;
pub mod config;
pub mod error;
pub mod events;
pub mod handle;
pub mod models;
pub mod orchestrator;
pub mod progress;
pub mod prompt;
pub mod storage;
pub mod testing;
pub mod transport;

pub use capability::{
    BashComponent, CapabilityRegistry, ComponentRegistry, ComponentState, RemoteComponent,
    ServerSettings, SqlComponent,
};
pub use config::{
    ConfigStore, ConnectionConfig, ConnectionProfile, CustomVariable, MemoryConfigStore,
    TomlConfigStore,
};
pub use error::{
    ConfigError, ConfigResult, HandlerError, IbmiConnError, LifecycleError, LifecycleResult,
    Result, StorageError, StorageResult, TransportError, TransportResult,
};
pub use events::{handler, EventBus, EventHandler, EventKind, FireReport};
pub use handle::{ConnectCallbacks, ConnectedOperation, ConnectionHandle, ConnectionResult, ErrorCode};
pub use models::{Credentials, StoredConnection};
pub use orchestrator::{ConnectOptions, ConnectionOrchestrator, LifecycleState, OrchestratorBuilder};
pub use progress::{CancelHandle, MessageKind, ProgressUpdate};
pub use prompt::{NoOpenResources, OpenResources, UserPrompter};
pub use storage::{JsonFileBackend, LastConnection, MemoryBackend, SourceList, Storage, StorageBackend};
pub use transport::{CommandOutput, RemoteChannel, Transport};
