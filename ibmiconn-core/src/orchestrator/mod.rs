//! Connection orchestration
//!
//! [`ConnectionOrchestrator`] is the single owner of the current connection.
//! Features observe it through the event bus and read the connection,
//! configuration and storage through its accessors.

mod builder;
mod manager;
mod state;

pub use builder::OrchestratorBuilder;
pub use manager::ConnectionOrchestrator;
pub use state::{ConnectOptions, LifecycleState};
