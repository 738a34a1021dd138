//! Error types for mongo-rbac

use std::io;
use thiserror::Error;

/// Main error type
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error on the transport
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// Invalid or contradictory configuration (credential sources, PEM material)
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Persisted identity token could not be decoded
    #[error("invalid role identity: {0}")]
    InvalidIdentity(String),

    /// Malformed wire message or unexpected reply shape
    #[error("protocol error: {0}")]
    Protocol(String),

    /// SCRAM conversation failed
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// The server answered a command with `ok: 0` or a write error
    #[error("server error {code} ({code_name}): {message}")]
    Server {
        /// Numeric server error code
        code: i32,
        /// Symbolic code name (may be empty)
        code_name: String,
        /// Server supplied message
        message: String,
    },

    /// Another error with a short human-readable prefix
    #[error("{context}: {source}")]
    Context {
        /// What was being attempted
        context: &'static str,
        /// Underlying error, unchanged
        #[source]
        source: Box<Error>,
    },

    /// Read found no role for a previously persisted identity
    #[error("role {role} does not exist in database {database}")]
    RoleNotFound {
        /// Role name
        role: String,
        /// Owning database
        database: String,
    },

    /// Delete completed but read-back still reports the role
    #[error("role {role} still exists in database {database} after delete")]
    StillExists {
        /// Role name
        role: String,
        /// Owning database
        database: String,
    },

    /// Role was created but the read-back that follows failed
    #[error("role {id} was created but could not be read back: {source}")]
    ReadBack {
        /// Identity token of the created role
        id: String,
        /// Read failure
        #[source]
        source: Box<Error>,
    },

    /// Update removed the role but could not create it again
    #[error("role {id} was removed but could not be recreated: {source}")]
    Recreate {
        /// Identity token of the removed role
        id: String,
        /// Create failure
        #[source]
        source: Box<Error>,
    },

    /// Connection closed by the server
    #[error("connection closed")]
    ConnectionClosed,

    /// Connection used in a state that does not allow the operation
    #[error("invalid state: expected {expected}, got {actual}")]
    InvalidState {
        /// Expected state
        expected: String,
        /// Actual state
        actual: String,
    },

    /// A connect or command deadline elapsed
    #[error("timed out during {0}")]
    Timeout(&'static str),

    /// Command document could not be encoded
    #[error("bson encoding error: {0}")]
    BsonEncode(#[from] bson::ser::Error),

    /// Reply document could not be decoded
    #[error("bson decoding error: {0}")]
    BsonDecode(#[from] bson::de::Error),
}

impl Error {
    /// Wrap this error with a short prefix
    pub fn context(self, context: &'static str) -> Self {
        Error::Context {
            context,
            source: Box::new(self),
        }
    }

    /// Strip any [`Error::Context`] layers
    pub fn root(&self) -> &Error {
        match self {
            Error::Context { source, .. } => source.root(),
            other => other,
        }
    }

    /// Configuration and state-corruption errors; never worth retrying
    pub fn is_config_error(&self) -> bool {
        matches!(
            self.root(),
            Error::Config(_) | Error::InvalidIdentity(_)
        )
    }

    /// The role was expected but is absent on the server
    pub fn is_not_found(&self) -> bool {
        matches!(self.root(), Error::RoleNotFound { .. })
    }

    /// Stable category label, used for metrics
    pub fn category(&self) -> &'static str {
        match self.root() {
            Error::Io(_) | Error::ConnectionClosed => "connection",
            Error::Config(_) => "config",
            Error::InvalidIdentity(_) => "identity",
            Error::Protocol(_) | Error::InvalidState { .. } => "protocol",
            Error::Authentication(_) => "authentication",
            Error::Server { .. } => "server",
            Error::RoleNotFound { .. } | Error::StillExists { .. } => "existence",
            Error::ReadBack { .. } | Error::Recreate { .. } => "partial",
            Error::Timeout(_) => "timeout",
            Error::BsonEncode(_) | Error::BsonDecode(_) => "encoding",
            Error::Context { .. } => "context",
        }
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_keeps_source_message() {
        let err = Error::Server {
            code: 51002,
            code_name: "RoleAlreadyExists".into(),
            message: "Role \"app@admin\" already exists".into(),
        }
        .context("could not create the role");

        let msg = err.to_string();
        assert!(msg.starts_with("could not create the role: "));
        assert!(msg.contains("Role \"app@admin\" already exists"));
        assert_eq!(err.category(), "server");
    }

    #[test]
    fn test_config_errors_are_classified() {
        assert!(Error::Config("cert_path must not be specified".into()).is_config_error());
        assert!(Error::InvalidIdentity("odd length".into())
            .context("decode")
            .is_config_error());
        assert!(!Error::ConnectionClosed.is_config_error());
    }

    #[test]
    fn test_not_found_is_distinct_from_server_error() {
        let missing = Error::RoleNotFound {
            role: "app".into(),
            database: "admin".into(),
        };
        assert!(missing.is_not_found());
        assert_eq!(missing.category(), "existence");
        assert!(!Error::Protocol("x".into()).is_not_found());
    }
}
