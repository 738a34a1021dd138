//! Commands that create, inspect and remove roles and users

use super::identity::RoleIdentity;
use super::model::{DbUser, Privilege, Role, RoleDefinition, ServerRoleView};
use crate::{Error, Result};
use async_trait::async_trait;
use bson::{doc, Bson, Document};

/// Database holding the role storage collection
pub const ADMIN_DATABASE: &str = "admin";
/// Role storage collection inside [`ADMIN_DATABASE`]
pub const ROLES_COLLECTION: &str = "system.roles";

/// Something that runs database commands
///
/// Implemented by [`AdminClient`](crate::AdminClient); tests substitute an
/// in-memory server.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `command` against `database` and return the reply
    ///
    /// Replies reporting failure must come back as [`Error::Server`].
    async fn run_command(&self, database: &str, command: Document) -> Result<Document>;
}

fn to_array<T: serde::Serialize>(items: &[T]) -> Result<Bson> {
    // An empty slice still yields an explicit empty array
    let values = items
        .iter()
        .map(bson::to_bson)
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(Bson::Array(values))
}

/// `createUser` command; `roles` is always present, empty if none are given
pub fn create_user_command(user: &DbUser, roles: &[Role]) -> Result<Document> {
    Ok(doc! {
        "createUser": user.name.as_str(),
        "pwd": user.password.as_str(),
        "roles": to_array(roles)?,
    })
}

/// Create `user` in `database` with `roles`
pub async fn create_user<R: CommandRunner + ?Sized>(
    runner: &R,
    user: &DbUser,
    roles: &[Role],
    database: &str,
) -> Result<()> {
    let command = create_user_command(user, roles)?;
    runner
        .run_command(database, command)
        .await
        .map_err(|e| e.context("could not create the user"))?;
    tracing::info!(user = %user.name, database, roles = roles.len(), "user created");
    Ok(())
}

/// `createRole` command; `privileges` and `roles` are always present
pub fn create_role_command(
    role: &str,
    inherited_roles: &[Role],
    privileges: &[Privilege],
) -> Result<Document> {
    Ok(doc! {
        "createRole": role,
        "privileges": to_array(privileges)?,
        "roles": to_array(inherited_roles)?,
    })
}

/// Create the role described by `definition` in its database
pub async fn create_role<R: CommandRunner + ?Sized>(
    runner: &R,
    definition: &RoleDefinition,
) -> Result<()> {
    let command = create_role_command(
        &definition.name,
        &definition.inherited_roles,
        &definition.privileges,
    )?;
    runner
        .run_command(&definition.database, command)
        .await
        .map_err(|e| e.context("could not create the role"))?;
    Ok(())
}

/// Fetch a role with its privileges
pub async fn roles_info<R: CommandRunner + ?Sized>(
    runner: &R,
    id: &RoleIdentity,
) -> Result<ServerRoleView> {
    let command = doc! {
        "rolesInfo": { "role": id.role(), "db": id.database() },
        "showPrivileges": true,
    };
    let reply = runner
        .run_command(id.database(), command)
        .await
        .map_err(|e| e.context("could not read the role"))?;
    Ok(bson::from_document(reply)?)
}

/// Delete the role document for `id` from `admin.system.roles`
///
/// Returns the number of documents removed (0 or 1).
pub async fn delete_role_document<R: CommandRunner + ?Sized>(
    runner: &R,
    id: &RoleIdentity,
) -> Result<i64> {
    let command = doc! {
        "delete": ROLES_COLLECTION,
        "deletes": [ { "q": { "_id": id.server_id() }, "limit": 1 } ],
    };
    let reply = runner
        .run_command(ADMIN_DATABASE, command)
        .await
        .map_err(|e| e.context("could not delete the role"))?;

    match reply.get("n") {
        Some(Bson::Int32(n)) => Ok(i64::from(*n)),
        Some(Bson::Int64(n)) => Ok(*n),
        Some(Bson::Double(n)) => Ok(*n as i64),
        _ => Err(Error::Protocol("delete reply has no count".into())),
    }
}
