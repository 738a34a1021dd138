//! mongo-rbac: provision and reconcile MongoDB access-control objects
//!
//! The crate has two halves:
//!
//! * a secure client factory that turns a flat connection configuration
//!   (inline PEM material, a certificate directory, a CA bundle, or nothing)
//!   into an authenticated, optionally TLS-protected [`AdminClient`]
//! * a reconciliation engine that drives a role definition (privileges plus
//!   inherited roles) onto the server through create / read / update / delete,
//!   keeping a stable opaque identity across revisions
//!
//! ```no_run
//! # async fn example() -> mongo_rbac::Result<()> {
//! use mongo_rbac::{build_client, ConnectionConfig, Reconciler, RoleResource};
//!
//! let config = ConnectionConfig::builder("db.example.com", 27017)
//!     .credentials("admin", "secret")
//!     .ssl(true)
//!     .build()?;
//! let client = build_client(&config)?;
//!
//! let declared = RoleResource::new("readOnlyApp")
//!     .privilege("sales", "orders", ["find"]);
//! let created = Reconciler::new(&client).create(&declared).await?;
//! println!("persist this id: {}", created.id.unwrap_or_default());
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod auth;
pub mod client;
pub mod connection;
pub mod error;
pub mod metrics;
pub mod protocol;
pub mod reconcile;
pub mod role;

#[cfg(test)]
pub(crate) mod testing;

pub use client::{build_client, AdminClient, ClientBranch, ConnectionString};
pub use connection::{
    ConnectionConfig, ConnectionConfigBuilder, CredentialSource, RawConnectionConfig, RetryWrites,
    TlsPolicy,
};
pub use error::{Error, Result};
pub use reconcile::{Reconciler, RoleResource};
pub use role::{CommandRunner, RoleIdentity};
