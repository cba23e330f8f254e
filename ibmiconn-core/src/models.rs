//! Core data models
//!
//! This module defines the connection definition and the credentials
//! submitted to a connect attempt.

mod connection;
mod credentials;

pub use connection::StoredConnection;
pub use credentials::{Credentials, DEFAULT_PORT};
