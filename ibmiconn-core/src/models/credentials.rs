//! Credentials submitted to a connect attempt.

use std::path::PathBuf;

use secrecy::SecretString;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Port used when a connection does not specify one
pub const DEFAULT_PORT: u16 = 22;

/// Credentials for a single connect attempt
///
/// The password is held as a `SecretString` and is never serialized; secrets
/// belong in a secret store, not in configuration or storage documents.
#[derive(Debug, Clone)]
pub struct Credentials {
    /// Connection name, used as the identity of the resulting handle
    pub name: String,
    /// Remote host address
    pub host: String,
    /// Remote port
    pub port: u16,
    /// Username for authentication
    pub username: String,
    /// Password (runtime only)
    pub password: Option<SecretString>,
    /// Private key file used instead of a password
    pub private_key: Option<PathBuf>,
}

/// Serializable representation of credentials (without secrets)
#[derive(Serialize, Deserialize)]
struct CredentialsSerde {
    name: String,
    host: String,
    #[serde(default)]
    port: u16,
    username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    private_key: Option<PathBuf>,
}

impl Serialize for Credentials {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        CredentialsSerde {
            name: self.name.clone(),
            host: self.host.clone(),
            port: self.port,
            username: self.username.clone(),
            private_key: self.private_key.clone(),
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Credentials {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let serde = CredentialsSerde::deserialize(deserializer)?;
        Ok(Self {
            name: serde.name,
            host: serde.host,
            port: serde.port,
            username: serde.username,
            password: None,
            private_key: serde.private_key,
        })
    }
}

impl Credentials {
    /// Creates credentials with the default port and no secret
    pub fn new(
        name: impl Into<String>,
        host: impl Into<String>,
        username: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            host: host.into(),
            port: DEFAULT_PORT,
            username: username.into(),
            password: None,
            private_key: None,
        }
    }

    /// Sets the password
    #[must_use]
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(SecretString::from(password.into()));
        self
    }

    /// Sets the port
    #[must_use]
    pub const fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Sets the private key path, expanding a leading `~`
    #[must_use]
    pub fn with_private_key(mut self, path: impl AsRef<str>) -> Self {
        let expanded = shellexpand::tilde(path.as_ref());
        self.private_key = Some(PathBuf::from(expanded.as_ref()));
        self
    }

    /// Returns the port to connect to, substituting the default for `0`
    #[must_use]
    pub const fn effective_port(&self) -> u16 {
        if self.port == 0 {
            DEFAULT_PORT
        } else {
            self.port
        }
    }

    /// Checks that the fields a connect attempt needs are present
    ///
    /// # Errors
    ///
    /// Returns a description of the first missing field.
    pub fn validate(&self) -> Result<(), String> {
        if self.host.trim().is_empty() {
            return Err("Host is required".to_string());
        }
        if self.username.trim().is_empty() {
            return Err("Username is required".to_string());
        }
        Ok(())
    }

    /// Exposes the password for use (should be used carefully)
    #[must_use]
    pub fn expose_password(&self) -> Option<&str> {
        self.password
            .as_ref()
            .map(secrecy::ExposeSecret::expose_secret)
    }

    /// Returns true if credentials carry a password
    #[must_use]
    pub const fn has_password(&self) -> bool {
        self.password.is_some()
    }
}

// Manual PartialEq implementation since SecretString doesn't implement it
impl PartialEq for Credentials {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.host == other.host
            && self.port == other.port
            && self.username == other.username
            && self.private_key == other.private_key
            && self.expose_password() == other.expose_password()
    }
}
