//! Drives the server toward a declared role definition
//!
//! The server has no partial update for roles, so an update removes the role
//! document and creates the role again. The two steps are not atomic: if the
//! create fails the role stays absent and [`Error::Recreate`] is returned. The
//! caller is expected to retry the whole update, and to make sure only one
//! reconcile runs per identity at a time.
//!
//! Cancellation is by dropping the returned future. Nothing already applied
//! is rolled back.

mod resource;

pub use resource::{
    InheritedRoleSpec, PrivilegeSpec, RoleResource, DEFAULT_DATABASE, MAX_INHERITED_ROLES,
    MAX_PRIVILEGES,
};

use crate::metrics::{counters, labels};
use crate::role::{self, CommandRunner, RoleIdentity, ServerRole};
use crate::{Error, Result};
use std::future::Future;
use tracing::Instrument;

/// Create, read, update and delete roles through a [`CommandRunner`]
pub struct Reconciler<'a, R: CommandRunner + ?Sized> {
    runner: &'a R,
}

impl<'a, R: CommandRunner + ?Sized> Reconciler<'a, R> {
    /// Borrow `runner` for the operations
    pub fn new(runner: &'a R) -> Self {
        Self { runner }
    }

    /// Create the declared role and return the state read back from the server
    ///
    /// The returned `id` is the token to persist.
    ///
    /// # Errors
    ///
    /// [`Error::Config`] for an invalid declaration; the server's error,
    /// prefixed, if the create is refused; [`Error::ReadBack`] if the role
    /// was created but could not be read.
    pub async fn create(&self, declared: &RoleResource) -> Result<RoleResource> {
        observe(
            "create",
            &declared.database,
            &declared.name,
            self.create_role(declared),
        )
        .await
    }

    /// Read the role identified by `token`
    ///
    /// # Errors
    ///
    /// [`Error::InvalidIdentity`] for a malformed token,
    /// [`Error::RoleNotFound`] if the server has no such role.
    pub async fn read(&self, token: &str) -> Result<RoleResource> {
        let id = RoleIdentity::decode(token)?;
        observe("read", id.database(), id.role(), self.read_role(&id)).await
    }

    /// Replace the role identified by `token` with `declared`
    ///
    /// The returned `id` equals `token` unless the declared name or database
    /// changed.
    ///
    /// # Errors
    ///
    /// As [`create`](Self::create), plus [`Error::Recreate`] when the old role
    /// was removed but the new one could not be created.
    pub async fn update(&self, token: &str, declared: &RoleResource) -> Result<RoleResource> {
        let id = RoleIdentity::decode(token)?;
        observe(
            "update",
            id.database(),
            id.role(),
            self.update_role(&id, declared),
        )
        .await
    }

    /// Delete the role identified by `token` and confirm it is gone
    ///
    /// # Errors
    ///
    /// [`Error::StillExists`] if the server still reports the role afterwards.
    pub async fn delete(&self, token: &str) -> Result<()> {
        let id = RoleIdentity::decode(token)?;
        observe("delete", id.database(), id.role(), self.delete_role(&id)).await
    }

    /// Adopt an existing role by its token
    ///
    /// # Errors
    ///
    /// [`Error::Config`] for a built-in role, which has no document to
    /// replace or remove.
    pub async fn import(&self, token: &str) -> Result<RoleResource> {
        let id = RoleIdentity::decode(token)?;
        observe("import", id.database(), id.role(), async {
            tracing::info!("importing role");
            let found = self.fetch_role(&id).await?;
            if found.is_builtin {
                return Err(Error::Config(format!(
                    "'{}' is a built-in role and cannot be managed",
                    id.server_id()
                )));
            }
            Ok(self.observed_state(&id, &found))
        })
        .await
    }

    /// First half of an update: delete the role document
    ///
    /// Returns the number of documents removed. Removing an absent role is
    /// not an error.
    pub async fn remove_existing(&self, id: &RoleIdentity) -> Result<i64> {
        let removed = role::delete_role_document(self.runner, id).await?;
        if removed == 0 {
            tracing::debug!(server_id = %id.server_id(), "no role document to remove");
        } else {
            tracing::info!(server_id = %id.server_id(), "role document removed");
        }
        Ok(removed)
    }

    async fn create_role(&self, declared: &RoleResource) -> Result<RoleResource> {
        let definition = declared.definition()?;
        let id = RoleIdentity::new(&definition.database, &definition.name)?;

        role::create_role(self.runner, &definition).await?;
        tracing::info!(
            privileges = definition.privileges.len(),
            inherited_roles = definition.inherited_roles.len(),
            "role created"
        );

        self.read_role(&id).await.map_err(|e| Error::ReadBack {
            id: id.encode(),
            source: Box::new(e),
        })
    }

    async fn fetch_role(&self, id: &RoleIdentity) -> Result<ServerRole> {
        let view = role::roles_info(self.runner, id).await?;
        view.roles.into_iter().next().ok_or_else(|| Error::RoleNotFound {
            role: id.role().to_string(),
            database: id.database().to_string(),
        })
    }

    async fn read_role(&self, id: &RoleIdentity) -> Result<RoleResource> {
        let found = self.fetch_role(id).await?;
        Ok(self.observed_state(id, &found))
    }

    fn observed_state(&self, id: &RoleIdentity, found: &ServerRole) -> RoleResource {
        let mut state = RoleResource::from_server(id.encode(), found);
        // The identity is authoritative for the declared fields
        state.database = id.database().to_string();
        state.name = id.role().to_string();
        tracing::debug!(
            privileges = state.privilege.len(),
            inherited_roles = state.inherited_role.len(),
            "role read"
        );
        state
    }

    async fn update_role(
        &self,
        id: &RoleIdentity,
        declared: &RoleResource,
    ) -> Result<RoleResource> {
        // Refuse before anything is removed
        declared.validate()?;

        self.remove_existing(id).await?;

        let state = match self.create_role(declared).await {
            Ok(state) => state,
            Err(e @ Error::ReadBack { .. }) => return Err(e),
            Err(e) => {
                tracing::warn!(error = %e, "role removed but not recreated");
                return Err(Error::Recreate {
                    id: id.encode(),
                    source: Box::new(e),
                });
            }
        };

        if state.id.as_deref() != Some(id.encode().as_str()) {
            tracing::info!(new_id = ?state.id, "role identity changed");
        }
        Ok(state)
    }

    async fn delete_role(&self, id: &RoleIdentity) -> Result<()> {
        self.remove_existing(id).await?;

        match self.read_role(id).await {
            Err(e) if e.is_not_found() => {
                tracing::info!("role deleted");
                Ok(())
            }
            Ok(_) => Err(Error::StillExists {
                role: id.role().to_string(),
                database: id.database().to_string(),
            }),
            Err(e) => Err(e),
        }
    }
}

/// Run one operation inside its span and count it
async fn observe<T, F>(operation: &'static str, database: &str, role: &str, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    counters::reconcile_started(operation);
    let result = fut
        .instrument(tracing::info_span!("reconcile", operation, database, role))
        .await;
    let outcome = match &result {
        Ok(_) => labels::OUTCOME_OK,
        Err(e) => e.category(),
    };
    counters::reconcile_completed(operation, outcome);
    if let Err(e) = &result {
        tracing::debug!(operation, error = %e, "reconcile failed");
    }
    result
}
