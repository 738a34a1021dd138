//! Declared state of a role as the orchestration host stores it

use crate::role::model::{Privilege, Role, RoleDefinition, ServerRole};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Default owning database
pub const DEFAULT_DATABASE: &str = "admin";
/// Maximum number of `privilege` entries
pub const MAX_PRIVILEGES: usize = 10;
/// Maximum number of `inherited_role` entries
pub const MAX_INHERITED_ROLES: usize = 2;

fn default_database() -> String {
    DEFAULT_DATABASE.to_string()
}

/// One declared privilege
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrivilegeSpec {
    /// Database; empty matches every database
    #[serde(default)]
    pub db: String,
    /// Collection; empty matches every collection
    #[serde(default)]
    pub collection: String,
    /// Action names
    #[serde(default)]
    pub actions: Vec<String>,
}

/// One declared inherited role
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InheritedRoleSpec {
    /// Owning database; empty means the declaring role's database
    #[serde(default)]
    pub db: String,
    /// Role name
    pub role: String,
}

/// A role resource: declared fields plus the persisted identity
///
/// `id` is `None` until the role has been created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleResource {
    /// Persisted identity token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Owning database
    #[serde(default = "default_database")]
    pub database: String,
    /// Role name
    pub name: String,
    /// Granted privileges
    #[serde(default)]
    pub privilege: Vec<PrivilegeSpec>,
    /// Inherited roles
    #[serde(default)]
    pub inherited_role: Vec<InheritedRoleSpec>,
}

impl RoleResource {
    /// A role named `name` in the `admin` database, with nothing granted
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: None,
            database: default_database(),
            name: name.into(),
            privilege: Vec::new(),
            inherited_role: Vec::new(),
        }
    }

    /// Set the owning database
    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.database = database.into();
        self
    }

    /// Grant `actions` on `db.collection`
    pub fn privilege<I, S>(
        mut self,
        db: impl Into<String>,
        collection: impl Into<String>,
        actions: I,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.privilege.push(PrivilegeSpec {
            db: db.into(),
            collection: collection.into(),
            actions: actions.into_iter().map(Into::into).collect(),
        });
        self
    }

    /// Inherit `role` from `db`
    pub fn inherited_role(mut self, role: impl Into<String>, db: impl Into<String>) -> Self {
        self.inherited_role.push(InheritedRoleSpec {
            db: db.into(),
            role: role.into(),
        });
        self
    }

    /// Check the declared fields
    ///
    /// # Errors
    ///
    /// [`Error::Config`] naming the offending field.
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(Error::Config("name must not be empty".into()));
        }
        if self.database.is_empty() {
            return Err(Error::Config("database must not be empty".into()));
        }
        if self.database.contains('.') {
            return Err(Error::Config(format!(
                "database '{}' must not contain '.'",
                self.database
            )));
        }
        if self.privilege.len() > MAX_PRIVILEGES {
            return Err(Error::Config(format!(
                "privilege accepts at most {} entries, got {}",
                MAX_PRIVILEGES,
                self.privilege.len()
            )));
        }
        if self.inherited_role.len() > MAX_INHERITED_ROLES {
            return Err(Error::Config(format!(
                "inherited_role accepts at most {} entries, got {}",
                MAX_INHERITED_ROLES,
                self.inherited_role.len()
            )));
        }
        if self.inherited_role.iter().any(|r| r.role.is_empty()) {
            return Err(Error::Config("inherited_role.role must not be empty".into()));
        }
        Ok(())
    }

    /// Validate and convert to the definition sent to the server
    ///
    /// Duplicate entries are dropped, keeping the first occurrence.
    pub fn definition(&self) -> Result<RoleDefinition> {
        self.validate()?;

        let mut privileges: Vec<Privilege> = Vec::with_capacity(self.privilege.len());
        for p in &self.privilege {
            let privilege =
                Privilege::new(p.db.clone(), p.collection.clone(), p.actions.iter().cloned());
            if !privileges.contains(&privilege) {
                privileges.push(privilege);
            }
        }

        let mut inherited_roles: Vec<Role> = Vec::with_capacity(self.inherited_role.len());
        for r in &self.inherited_role {
            let db = if r.db.is_empty() { &self.database } else { &r.db };
            let role = Role::new(r.role.clone(), db.clone());
            if !inherited_roles.contains(&role) {
                inherited_roles.push(role);
            }
        }

        Ok(RoleDefinition {
            name: self.name.clone(),
            database: self.database.clone(),
            privileges,
            inherited_roles,
        })
    }

    /// State as observed on the server, carrying `id` unchanged
    ///
    /// Cluster and `anyResource` privileges cannot be declared here, so they
    /// are left out rather than read back as a grant on every namespace.
    pub fn from_server(id: String, role: &ServerRole) -> Self {
        Self {
            id: Some(id),
            database: role.db.clone(),
            name: role.role.clone(),
            privilege: role
                .privileges
                .iter()
                .filter(|p| {
                    let keep = p.resource.is_namespace();
                    if !keep {
                        tracing::warn!(privilege = %p, "skipping non-namespace privilege");
                    }
                    keep
                })
                .map(|p| PrivilegeSpec {
                    db: p.resource.db.clone(),
                    collection: p.resource.collection.clone(),
                    actions: p.actions.clone(),
                })
                .collect(),
            inherited_role: role
                .roles
                .iter()
                .map(|r| InheritedRoleSpec {
                    db: r.db.clone(),
                    role: r.role.clone(),
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_defaults() {
        let r: RoleResource = serde_json::from_str(r#"{ "name": "readOnlyApp" }"#).unwrap();
        assert_eq!(r.database, "admin");
        assert!(r.id.is_none());
        assert!(r.privilege.is_empty());
        assert!(r.inherited_role.is_empty());
    }

    #[test]
    fn test_deserialize_full() {
        let r: RoleResource = serde_json::from_str(
            r#"{
                "id": "61646d696e2e617070",
                "database": "admin",
                "name": "app",
                "privilege": [
                    { "db": "sales", "collection": "orders", "actions": ["find", "insert"] }
                ],
                "inherited_role": [ { "role": "read", "db": "reporting" } ]
            }"#,
        )
        .unwrap();
        assert_eq!(r.id.as_deref(), Some("61646d696e2e617070"));
        assert_eq!(r.privilege[0].actions, ["find", "insert"]);
        assert_eq!(r.inherited_role[0].role, "read");
    }

    #[test]
    fn test_limits() {
        let mut r = RoleResource::new("app");
        for i in 0..MAX_PRIVILEGES {
            r = r.privilege("sales", format!("c{}", i), ["find"]);
        }
        assert!(r.validate().is_ok());
        let r = r.privilege("sales", "one_more", ["find"]);
        assert!(r.validate().unwrap_err().to_string().contains("privilege"));

        let r = RoleResource::new("app")
            .inherited_role("read", "a")
            .inherited_role("read", "b")
            .inherited_role("read", "c");
        assert!(r.validate().unwrap_err().to_string().contains("inherited_role"));
    }

    #[test]
    fn test_invalid_names() {
        assert!(RoleResource::new("").validate().is_err());
        assert!(RoleResource::new("app").database("").validate().is_err());
        let err = RoleResource::new("app").database("a.b").validate().unwrap_err();
        assert!(err.is_config_error());
    }

    #[test]
    fn test_definition_defaults_inherited_db_and_dedupes() {
        let def = RoleResource::new("app")
            .database("sales")
            .privilege("sales", "orders", ["find"])
            .privilege("sales", "orders", ["find"])
            .inherited_role("read", "")
            .definition()
            .unwrap();
        assert_eq!(def.privileges.len(), 1);
        assert_eq!(def.inherited_roles, vec![Role::new("read", "sales")]);
    }

    #[test]
    fn test_from_server_skips_cluster_and_any_resource() {
        let role: ServerRole = bson::from_document(bson::doc! {
            "role": "ops",
            "db": "admin",
            "privileges": [
                { "resource": { "cluster": true }, "actions": ["serverStatus"] },
                { "resource": { "anyResource": true }, "actions": ["anyAction"] },
                { "resource": { "db": "", "collection": "" }, "actions": ["find"] },
            ],
            "roles": [],
        })
        .unwrap();

        let state = RoleResource::from_server("61646d696e2e6f7073".into(), &role);
        assert_eq!(state.privilege.len(), 1);
        assert_eq!(state.privilege[0].actions, ["find"]);
    }

}
