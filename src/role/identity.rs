//! Stable external identity of a role
//!
//! A role is identified by the hex encoding of `database + "." + role`. The
//! decoded form is also the role's `_id` in `admin.system.roles`. Decoding
//! splits on the first `.`, so a database name must not contain one; role
//! names may.

use crate::{Error, Result};
use std::fmt;
use std::str::FromStr;

const SEPARATOR: char = '.';

/// Decoded identity of a role
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RoleIdentity {
    database: String,
    role: String,
}

impl RoleIdentity {
    /// Create an identity, rejecting names that would not round-trip
    ///
    /// # Errors
    ///
    /// [`Error::InvalidIdentity`] if either part is empty or the database
    /// contains `.`.
    pub fn new(database: impl Into<String>, role: impl Into<String>) -> Result<Self> {
        let database = database.into();
        let role = role.into();
        if database.is_empty() || role.is_empty() {
            return Err(Error::InvalidIdentity(
                "database and role name must both be non-empty".into(),
            ));
        }
        if database.contains(SEPARATOR) {
            return Err(Error::InvalidIdentity(format!(
                "database name '{}' must not contain '{}'",
                database, SEPARATOR
            )));
        }
        Ok(Self { database, role })
    }

    /// Owning database
    pub fn database(&self) -> &str {
        &self.database
    }

    /// Role name
    pub fn role(&self) -> &str {
        &self.role
    }

    /// `_id` of the role document in `admin.system.roles`
    pub fn server_id(&self) -> String {
        format!("{}{}{}", self.database, SEPARATOR, self.role)
    }

    /// Opaque token to persist
    pub fn encode(&self) -> String {
        hex::encode(self.server_id())
    }

    /// Parse a persisted token
    ///
    /// # Errors
    ///
    /// [`Error::InvalidIdentity`] if the token is not hex, not UTF-8, has no
    /// separator, or has an empty half.
    pub fn decode(token: &str) -> Result<Self> {
        let bytes = hex::decode(token).map_err(|e| {
            Error::InvalidIdentity(format!("unexpected format of id '{}': {}", token, e))
        })?;
        let decoded = String::from_utf8(bytes).map_err(|_| {
            Error::InvalidIdentity(format!("id '{}' does not decode to UTF-8", token))
        })?;

        match decoded.split_once(SEPARATOR) {
            Some((database, role)) if !database.is_empty() && !role.is_empty() => Ok(Self {
                database: database.to_string(),
                role: role.to_string(),
            }),
            _ => Err(Error::InvalidIdentity(format!(
                "unexpected format of id '{}', expected database.roleName",
                token
            ))),
        }
    }
}

impl fmt::Display for RoleIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

impl FromStr for RoleIdentity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::decode(s)
    }
}

/// Token for `(database, role)`
pub fn encode(database: &str, role: &str) -> Result<String> {
    Ok(RoleIdentity::new(database, role)?.encode())
}

/// Split a token into `(role, database)`
///
/// Note the order is the reverse of [`encode`]'s arguments.
pub fn decode(token: &str) -> Result<(String, String)> {
    let id = RoleIdentity::decode(token)?;
    Ok((id.role, id.database))
}
