//! Connection management
//!
//! This module handles:
//! * Connection configuration and its validation
//! * Resolution of TLS credential material (inline PEM, directory, CA only)
//! * TLS policy construction
//! * Transport (plain or TLS TCP), handshake and authentication

mod config;
mod conn;
mod credentials;
mod state;
mod tls;
mod transport;

pub use config::{
    ConnectionConfig, ConnectionConfigBuilder, Credential, RawConnectionConfig, RetryWrites,
    DEFAULT_AUTH_DATABASE, DEFAULT_PORT,
};
pub use conn::{Connection, HelloReply};
pub use credentials::{CredentialSource, PemMaterial, CA_FILE, CERT_FILE, KEY_FILE};
pub use state::ConnectionState;
pub use tls::{parse_server_name, RootTrust, TlsPolicy, TlsPolicyBuilder};
pub use transport::Transport;
