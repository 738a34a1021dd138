//! Integration tests for mongo-rbac
//!
//! These tests require a running MongoDB with access control enabled:
//!
//! ```bash
//! export MONGO_RBAC_TEST_HOST=localhost
//! export MONGO_RBAC_TEST_PORT=27017
//! export MONGO_RBAC_TEST_USER=admin
//! export MONGO_RBAC_TEST_PASSWORD=secret
//! cargo test --test integration -- --ignored --nocapture
//! ```

use mongo_rbac::reconcile::{Reconciler, RoleResource};
use mongo_rbac::{build_client, AdminClient, ConnectionConfig};
use std::env;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn live_client() -> Option<AdminClient> {
    init_tracing();
    let host = env::var("MONGO_RBAC_TEST_HOST").ok()?;
    let port = env::var("MONGO_RBAC_TEST_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(27017);

    let mut builder = ConnectionConfig::builder(host, port);
    if let Ok(user) = env::var("MONGO_RBAC_TEST_USER") {
        let password = env::var("MONGO_RBAC_TEST_PASSWORD").unwrap_or_default();
        builder = builder.credentials(user, password);
    }
    if let Ok(set) = env::var("MONGO_RBAC_TEST_REPLICA_SET") {
        builder = builder.replica_set(set);
    }
    let config = builder.build().expect("config");
    Some(build_client(&config).expect("client"))
}

#[tokio::test]
#[ignore] // Requires MongoDB running
async fn test_connect_and_ping() {
    let Some(client) = live_client() else {
        eprintln!("Skipping test: MONGO_RBAC_TEST_HOST not set");
        return;
    };

    client.ping().await.expect("ping");
    client.close().await.expect("close");
}

#[tokio::test]
#[ignore] // Requires MongoDB running
async fn test_role_lifecycle() {
    let Some(client) = live_client() else {
        eprintln!("Skipping test: MONGO_RBAC_TEST_HOST not set");
        return;
    };
    let reconciler = Reconciler::new(&client);
    let name = format!("mongo_rbac_it_{}", std::process::id());

    let declared = RoleResource::new(&name).privilege("sales", "orders", ["find"]);
    let created = reconciler.create(&declared).await.expect("create");
    let token = created.id.clone().expect("id");
    assert_eq!(created.privilege.len(), 1);

    let declared = declared
        .privilege("sales", "customers", ["find"])
        .inherited_role("read", "reporting");
    let updated = reconciler.update(&token, &declared).await.expect("update");
    assert_eq!(updated.id.as_deref(), Some(token.as_str()));
    assert_eq!(updated.privilege.len(), 2);
    assert_eq!(updated.inherited_role.len(), 1);

    reconciler.delete(&token).await.expect("delete");
    let err = reconciler.read(&token).await.expect_err("role is gone");
    assert!(err.is_not_found());
}
