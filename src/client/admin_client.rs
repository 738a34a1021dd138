//! Lazily connected command client

use super::connection_string::ConnectionString;
use super::factory::ClientBranch;
use crate::connection::{Connection, ConnectionConfig, ConnectionState, Credential, TlsPolicy};
use crate::role::CommandRunner;
use crate::{Error, Result};
use async_trait::async_trait;
use bson::{doc, Document};
use std::future::Future;
use std::time::Duration;
use tokio::sync::Mutex;

/// Client handle produced by [`build_client`](super::build_client)
///
/// Holds at most one connection, opened on the first command. A connection
/// that fails at the transport level, times out, or whose command future is
/// dropped is discarded; the next command opens a fresh one. Commands are
/// serialized.
pub struct AdminClient {
    address: ConnectionString,
    branch: ClientBranch,
    tls: Option<TlsPolicy>,
    credential: Option<Credential>,
    app_name: String,
    connect_timeout: Option<Duration>,
    command_timeout: Option<Duration>,
    conn: Mutex<Option<Connection>>,
}

impl std::fmt::Debug for AdminClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminClient")
            .field("address", &self.address.to_string())
            .field("branch", &self.branch)
            .field("tls", &self.tls)
            .field("credential", &self.credential)
            .finish_non_exhaustive()
    }
}

impl AdminClient {
    pub(super) fn new(
        address: ConnectionString,
        branch: ClientBranch,
        tls: Option<TlsPolicy>,
        config: &ConnectionConfig,
    ) -> Self {
        Self {
            address,
            branch,
            tls,
            credential: config.credential(),
            app_name: config.app_name.clone(),
            connect_timeout: config.connect_timeout,
            command_timeout: config.command_timeout,
            conn: Mutex::new(None),
        }
    }

    /// Branch the factory selected
    pub fn branch(&self) -> ClientBranch {
        self.branch
    }

    /// TLS policy, if the transport is encrypted
    pub fn tls_policy(&self) -> Option<&TlsPolicy> {
        self.tls.as_ref()
    }

    /// Assembled address and options
    pub fn connection_string(&self) -> &ConnectionString {
        &self.address
    }

    /// Run a command, connecting first if needed
    ///
    /// # Errors
    ///
    /// [`Error::Timeout`] when the connect or command deadline elapses,
    /// [`Error::Server`] when the server rejects the command, transport and
    /// authentication errors otherwise.
    pub async fn run_command(&self, database: &str, command: Document) -> Result<Document> {
        let mut slot = self.conn.lock().await;

        // Taken out of the slot for the duration of the call so a dropped
        // future also drops the connection.
        let mut conn = match slot.take() {
            Some(conn) if conn.state() == ConnectionState::Ready => conn,
            _ => self.connect().await?,
        };

        let result = with_deadline(
            self.command_timeout,
            "command",
            conn.run_command(database, command),
        )
        .await?;

        if conn.state() == ConnectionState::Ready {
            *slot = Some(conn);
        } else {
            tracing::debug!(state = %conn.state(), "discarding connection");
        }
        result
    }

    /// Round-trip a `ping`
    pub async fn ping(&self) -> Result<()> {
        self.run_command("admin", doc! { "ping": 1 }).await?;
        Ok(())
    }

    /// Close the open connection, if any
    ///
    /// The client stays usable; a later command reconnects.
    pub async fn close(&self) -> Result<()> {
        let conn = self.conn.lock().await.take();
        match conn {
            Some(conn) => conn.close().await,
            None => Ok(()),
        }
    }

    async fn connect(&self) -> Result<Connection> {
        let host = self.address.host.as_str();
        let port = self.address.port;
        let replica_set = self.address.option("replicaSet");

        tracing::debug!(host, port, tls = self.tls.is_some(), "connecting");
        with_deadline(self.connect_timeout, "connect", async {
            let mut conn = Connection::open(host, port, self.tls.as_ref()).await?;
            conn.startup(&self.app_name, replica_set, self.credential.as_ref())
                .await?;
            Ok::<_, Error>(conn)
        })
        .await?
    }
}

/// Bound `fut` by `deadline` if one is set
async fn with_deadline<T>(
    deadline: Option<Duration>,
    phase: &'static str,
    fut: impl Future<Output = T>,
) -> Result<T> {
    match deadline {
        Some(d) => tokio::time::timeout(d, fut)
            .await
            .map_err(|_| Error::Timeout(phase)),
        None => Ok(fut.await),
    }
}

#[async_trait]
impl CommandRunner for AdminClient {
    async fn run_command(&self, database: &str, command: Document) -> Result<Document> {
        AdminClient::run_command(self, database, command).await
    }
}
