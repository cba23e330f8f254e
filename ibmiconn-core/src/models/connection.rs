//! Stored connection definition.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::credentials::{Credentials, DEFAULT_PORT};

/// A saved IBM i connection definition
///
/// Secrets are not part of the definition; the password is supplied at
/// connect time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredConnection {
    /// Unique human-readable name, also the connection's identity
    pub name: String,
    /// Remote host address (hostname or IP)
    pub host: String,
    /// Remote port number
    #[serde(default = "default_port")]
    pub port: u16,
    /// Username for authentication
    pub username: String,
    /// Private key used instead of a password
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_key_path: Option<String>,
    /// Timestamp when the definition was created
    pub created_at: DateTime<Utc>,
}

const fn default_port() -> u16 {
    DEFAULT_PORT
}

impl StoredConnection {
    /// Creates a new connection definition on the default port
    #[must_use]
    pub fn new(name: String, host: String, username: String) -> Self {
        Self {
            name,
            host,
            port: DEFAULT_PORT,
            username,
            private_key_path: None,
            created_at: Utc::now(),
        }
    }

    /// Builds connect credentials from this definition
    ///
    /// The optional password is the only secret; the key path is
    /// tilde-expanded.
    #[must_use]
    pub fn to_credentials(&self, password: Option<String>) -> Credentials {
        let mut creds = Credentials::new(&self.name, &self.host, &self.username).with_port(self.port);
        if let Some(path) = &self.private_key_path {
            creds = creds.with_private_key(path);
        }
        if let Some(password) = password {
            creds = creds.with_password(password);
        }
        creds
    }
}
