//! Connection configuration

use super::credentials::CredentialSource;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Default server port
pub const DEFAULT_PORT: u16 = 27017;

/// Default authentication database
pub const DEFAULT_AUTH_DATABASE: &str = "admin";

const DEFAULT_APP_NAME: &str = "mongo-rbac";

/// Tri-state `retryWrites` option: only an explicit choice reaches the URI
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetryWrites {
    /// Leave the server/driver default in place
    #[default]
    Unset,
    /// `retrywrites=false`
    Disabled,
    /// `retrywrites=true`
    Enabled,
}

impl RetryWrites {
    /// Explicit value, if any
    pub fn as_option(self) -> Option<bool> {
        match self {
            Self::Unset => None,
            Self::Disabled => Some(false),
            Self::Enabled => Some(true),
        }
    }
}

impl From<Option<bool>> for RetryWrites {
    fn from(value: Option<bool>) -> Self {
        match value {
            None => Self::Unset,
            Some(false) => Self::Disabled,
            Some(true) => Self::Enabled,
        }
    }
}

/// Flat connection settings as the host supplies them
///
/// Every field is optional on the wire; missing fields take their defaults.
/// Convert with `ConnectionConfig::try_from` to validate.
#[derive(Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RawConnectionConfig {
    /// Server host name or address
    pub host: String,
    /// Server port
    pub port: u16,
    /// User to authenticate as; empty disables authentication
    pub username: String,
    /// Password for `username`
    pub password: String,
    /// Database holding the user's credentials
    pub auth_database: String,
    /// Request TLS (`ssl=true` in the connection string)
    pub ssl: bool,
    /// Disable server certificate verification
    pub insecure_skip_verify: bool,
    /// Expected replica set name
    pub replica_set: String,
    /// CA bundle PEM
    pub certificate: Option<String>,
    /// Client certificate PEM
    pub cert_material: Option<String>,
    /// Client private key PEM
    pub key_material: Option<String>,
    /// Directory containing `ca.pem`, `cert.pem` and `key.pem`
    pub cert_path: Option<String>,
    /// Explicit `retrywrites` choice
    pub retrywrites: Option<bool>,
    /// TCP connect + handshake deadline, seconds
    pub connect_timeout_secs: Option<u64>,
    /// Per-command deadline, seconds
    pub command_timeout_secs: Option<u64>,
    /// Application name reported in the handshake
    pub app_name: Option<String>,
}

impl Default for RawConnectionConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: DEFAULT_PORT,
            username: String::new(),
            password: String::new(),
            auth_database: DEFAULT_AUTH_DATABASE.to_string(),
            ssl: false,
            insecure_skip_verify: false,
            replica_set: String::new(),
            certificate: None,
            cert_material: None,
            key_material: None,
            cert_path: None,
            retrywrites: None,
            connect_timeout_secs: None,
            command_timeout_secs: None,
            app_name: None,
        }
    }
}

impl fmt::Debug for RawConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawConnectionConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("auth_database", &self.auth_database)
            .field("ssl", &self.ssl)
            .field("insecure_skip_verify", &self.insecure_skip_verify)
            .field("replica_set", &self.replica_set)
            .field("certificate", &self.certificate.is_some())
            .field("cert_material", &self.cert_material.is_some())
            .field("key_material", &self.key_material.as_ref().map(|_| "<redacted>"))
            .field("cert_path", &self.cert_path)
            .field("retrywrites", &self.retrywrites)
            .finish()
    }
}

impl TryFrom<RawConnectionConfig> for ConnectionConfig {
    type Error = Error;

    fn try_from(raw: RawConnectionConfig) -> Result<Self> {
        let mut builder = ConnectionConfig::builder(raw.host, raw.port)
            .credentials(raw.username, raw.password)
            .auth_database(raw.auth_database)
            .ssl(raw.ssl)
            .insecure_skip_verify(raw.insecure_skip_verify)
            .retry_writes(raw.retrywrites.into());

        if !raw.replica_set.is_empty() {
            builder = builder.replica_set(raw.replica_set);
        }
        if let Some(ca) = raw.certificate {
            builder = builder.ca_pem(ca.into_bytes());
        }
        builder.cert = raw.cert_material.map(String::into_bytes);
        builder.key = raw.key_material.map(String::into_bytes);
        builder.cert_path = raw.cert_path.map(PathBuf::from);
        if let Some(secs) = raw.connect_timeout_secs {
            builder = builder.connect_timeout(Duration::from_secs(secs));
        }
        if let Some(secs) = raw.command_timeout_secs {
            builder = builder.command_timeout(Duration::from_secs(secs));
        }
        if let Some(name) = raw.app_name {
            builder = builder.app_name(name);
        }

        builder.build()
    }
}

/// Credentials used for SCRAM authentication
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    /// User name
    pub username: String,
    /// Password
    pub password: String,
    /// Database the user is defined in
    pub source: String,
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("source", &self.source)
            .finish()
    }
}

/// Validated connection configuration
///
/// Use [`ConnectionConfig::builder`] or `ConnectionConfig::try_from(raw)`.
#[derive(Clone)]
pub struct ConnectionConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// User name (empty: no authentication)
    pub username: String,
    /// Password
    pub password: String,
    /// Authentication database
    pub auth_database: String,
    /// Request TLS
    pub ssl: bool,
    /// Disable server certificate verification
    pub insecure_skip_verify: bool,
    /// Expected replica set name
    pub replica_set: Option<String>,
    /// `retrywrites` tri-state
    pub retry_writes: RetryWrites,
    /// TLS credential material source
    pub credential_source: CredentialSource,
    /// TCP connect + handshake deadline
    pub connect_timeout: Option<Duration>,
    /// Per-command deadline
    pub command_timeout: Option<Duration>,
    /// Application name reported in the handshake
    pub app_name: String,
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("auth_database", &self.auth_database)
            .field("ssl", &self.ssl)
            .field("insecure_skip_verify", &self.insecure_skip_verify)
            .field("replica_set", &self.replica_set)
            .field("retry_writes", &self.retry_writes)
            .field("credential_source", &self.credential_source)
            .field("connect_timeout", &self.connect_timeout)
            .field("command_timeout", &self.command_timeout)
            .field("app_name", &self.app_name)
            .finish()
    }
}

impl ConnectionConfig {
    /// Create a builder for the given server address
    ///
    /// # Examples
    ///
    /// ```ignore
    /// let config = ConnectionConfig::builder("localhost", 27017)
    ///     .credentials("admin", "secret")
    ///     .replica_set("rs0")
    ///     .build()?;
    /// ```
    pub fn builder(host: impl Into<String>, port: u16) -> ConnectionConfigBuilder {
        ConnectionConfigBuilder {
            host: host.into(),
            port,
            username: String::new(),
            password: String::new(),
            auth_database: DEFAULT_AUTH_DATABASE.to_string(),
            ssl: false,
            insecure_skip_verify: false,
            replica_set: None,
            retry_writes: RetryWrites::Unset,
            ca: None,
            cert: None,
            key: None,
            cert_path: None,
            connect_timeout: None,
            command_timeout: None,
            app_name: None,
        }
    }

    /// Credentials for authentication, if a user is configured
    pub fn credential(&self) -> Option<Credential> {
        if self.username.is_empty() {
            return None;
        }
        Some(Credential {
            username: self.username.clone(),
            password: self.password.clone(),
            source: self.auth_database.clone(),
        })
    }
}

/// Builder for [`ConnectionConfig`]
///
/// TLS material setters may be combined freely; [`build`](Self::build)
/// rejects combinations naming more than one source.
#[derive(Clone)]
pub struct ConnectionConfigBuilder {
    host: String,
    port: u16,
    username: String,
    password: String,
    auth_database: String,
    ssl: bool,
    insecure_skip_verify: bool,
    replica_set: Option<String>,
    retry_writes: RetryWrites,
    ca: Option<Vec<u8>>,
    cert: Option<Vec<u8>>,
    key: Option<Vec<u8>>,
    cert_path: Option<PathBuf>,
    connect_timeout: Option<Duration>,
    command_timeout: Option<Duration>,
    app_name: Option<String>,
}

impl ConnectionConfigBuilder {
    /// Set user name and password
    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = username.into();
        self.password = password.into();
        self
    }

    /// Set the authentication database (default: `admin`)
    pub fn auth_database(mut self, database: impl Into<String>) -> Self {
        self.auth_database = database.into();
        self
    }

    /// Request TLS
    pub fn ssl(mut self, enabled: bool) -> Self {
        self.ssl = enabled;
        self
    }

    /// ⚠️ **DANGER**: disable server certificate verification.
    pub fn insecure_skip_verify(mut self, skip: bool) -> Self {
        self.insecure_skip_verify = skip;
        self
    }

    /// Set the expected replica set name
    pub fn replica_set(mut self, name: impl Into<String>) -> Self {
        self.replica_set = Some(name.into());
        self
    }

    /// Set the `retrywrites` tri-state
    pub fn retry_writes(mut self, retry: RetryWrites) -> Self {
        self.retry_writes = retry;
        self
    }

    /// Trust the CA certificates in this PEM bundle
    pub fn ca_pem(mut self, pem: impl Into<Vec<u8>>) -> Self {
        self.ca = Some(pem.into());
        self
    }

    /// Present this inline client certificate and key
    pub fn client_identity_pem(
        mut self,
        cert: impl Into<Vec<u8>>,
        key: impl Into<Vec<u8>>,
    ) -> Self {
        self.cert = Some(cert.into());
        self.key = Some(key.into());
        self
    }

    /// Load TLS material from a directory
    pub fn cert_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.cert_path = Some(path.into());
        self
    }

    /// Set the connect + handshake deadline
    pub fn connect_timeout(mut self, duration: Duration) -> Self {
        self.connect_timeout = Some(duration);
        self
    }

    /// Set the per-command deadline
    pub fn command_timeout(mut self, duration: Duration) -> Self {
        self.command_timeout = Some(duration);
        self
    }

    /// Set the application name reported to the server
    pub fn app_name(mut self, name: impl Into<String>) -> Self {
        self.app_name = Some(name.into());
        self
    }

    /// Validate and build the configuration
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the host is empty or the TLS material
    /// names more than one source (see [`CredentialSource::from_parts`]).
    pub fn build(self) -> Result<ConnectionConfig> {
        if self.host.is_empty() {
            return Err(Error::Config("host must be specified".into()));
        }

        let credential_source =
            CredentialSource::from_parts(self.ca, self.cert, self.key, self.cert_path)?;

        let auth_database = if self.auth_database.is_empty() {
            DEFAULT_AUTH_DATABASE.to_string()
        } else {
            self.auth_database
        };

        Ok(ConnectionConfig {
            host: self.host,
            port: self.port,
            username: self.username,
            password: self.password,
            auth_database,
            ssl: self.ssl,
            insecure_skip_verify: self.insecure_skip_verify,
            replica_set: self.replica_set.filter(|r| !r.is_empty()),
            retry_writes: self.retry_writes,
            credential_source,
            connect_timeout: self.connect_timeout,
            command_timeout: self.command_timeout,
            app_name: self
                .app_name
                .unwrap_or_else(|| DEFAULT_APP_NAME.to_string()),
        })
    }
}
