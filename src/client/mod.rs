//! Client handle construction and the command client it produces

mod admin_client;
pub mod connection_string;
mod factory;

pub use admin_client::AdminClient;
pub use connection_string::ConnectionString;
pub use factory::{build_client, ClientBranch};
