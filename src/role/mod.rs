//! Role and privilege model, the identity codec, and the commands that act on roles

pub mod commands;
pub mod identity;
pub mod model;

pub use commands::{
    create_role, create_role_command, create_user, create_user_command, delete_role_document,
    roles_info, CommandRunner,
};
pub use identity::RoleIdentity;
pub use model::{DbUser, Privilege, Resource, Role, RoleDefinition, ServerRole, ServerRoleView};
