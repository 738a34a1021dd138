//! In-memory shapes of roles, privileges and users

use serde::{Deserialize, Serialize};
use std::fmt;

/// A reference to a role: its name and owning database
///
/// Used both for inherited roles and for the roles granted to a user.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Role {
    /// Role name
    pub role: String,
    /// Owning database
    pub db: String,
}

impl Role {
    /// Create a role reference
    pub fn new(role: impl Into<String>, db: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            db: db.into(),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{ role : {} , db : {} }}", self.role, self.db)
    }
}

/// What a privilege applies to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resource {
    /// Database; empty matches every database
    #[serde(default)]
    pub db: String,
    /// Collection; empty matches every collection
    #[serde(default)]
    pub collection: String,
    /// `{ cluster: true }`, for cluster-wide actions
    #[serde(default, skip_serializing_if = "is_false")]
    pub cluster: bool,
    /// `{ anyResource: true }`, every resource on the server
    #[serde(default, rename = "anyResource", skip_serializing_if = "is_false")]
    pub any_resource: bool,
}

fn is_false(value: &bool) -> bool {
    !*value
}

impl Resource {
    /// Grant target `db.collection`
    pub fn new(db: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            db: db.into(),
            collection: collection.into(),
            cluster: false,
            any_resource: false,
        }
    }

    /// Whether this names a database and collection rather than the
    /// cluster or every resource
    pub fn is_namespace(&self) -> bool {
        !self.cluster && !self.any_resource
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{ db : {} , collection : {} }}", self.db, self.collection)
    }
}

/// A set of actions granted over a resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Privilege {
    /// Target
    pub resource: Resource,
    /// Action names, e.g. `find`, `insert`
    #[serde(default)]
    pub actions: Vec<String>,
}

impl Privilege {
    /// Grant `actions` on `db.collection`
    pub fn new<I, S>(db: impl Into<String>, collection: impl Into<String>, actions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            resource: Resource::new(db, collection),
            actions: actions.into_iter().map(Into::into).collect(),
        }
    }
}

impl fmt::Display for Privilege {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{ resource : {} , actions : [{}] }}",
            self.resource,
            self.actions.join(" ")
        )
    }
}

/// A database user with a password
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DbUser {
    /// User name
    pub name: String,
    /// Password
    pub password: String,
}

impl fmt::Debug for DbUser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DbUser")
            .field("name", &self.name)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Desired state of one role, as sent in `createRole`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleDefinition {
    /// Role name
    pub name: String,
    /// Owning database
    pub database: String,
    /// Granted privileges, in declaration order
    pub privileges: Vec<Privilege>,
    /// Inherited roles, in declaration order
    pub inherited_roles: Vec<Role>,
}

/// One entry of a `rolesInfo` reply
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ServerRole {
    /// Role name
    pub role: String,
    /// Owning database
    pub db: String,
    /// Privileges granted directly to the role
    #[serde(default)]
    pub privileges: Vec<Privilege>,
    /// Roles this role inherits from directly
    #[serde(default)]
    pub roles: Vec<Role>,
    /// Built-in roles cannot be modified
    #[serde(default, rename = "isBuiltin")]
    pub is_builtin: bool,
}

/// Read-back of a role as the server reports it
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
pub struct ServerRoleView {
    /// Matching roles; empty when the role does not exist
    #[serde(default)]
    pub roles: Vec<ServerRole>,
}

impl ServerRoleView {
    /// The first matching role, if any
    pub fn first(&self) -> Option<&ServerRole> {
        self.roles.first()
    }

    /// Whether the server reported no matching role
    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }
}
