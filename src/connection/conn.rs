//! Core connection type

use super::config::Credential;
use super::state::ConnectionState;
use super::tls::TlsPolicy;
use super::transport::Transport;
use crate::auth::{ScramClient, SCRAM_SHA_256};
use crate::protocol::constants::DB_FIELD;
use crate::protocol::{check_command_reply, decode_message, encode_message, OpMsg};
use crate::{Error, Result};
use bson::spec::BinarySubtype;
use bson::{doc, Binary, Bson, Document};
use bytes::{Buf, BytesMut};
use serde::Deserialize;
use std::io;
use std::sync::atomic::{AtomicI32, Ordering};
use std::time::Instant;
use tracing::Instrument;

/// Request ids are unique per process
static REQUEST_ID: AtomicI32 = AtomicI32::new(1);

/// First wire version that supports `OP_MSG`
const MIN_WIRE_VERSION: i32 = 6;

/// Server error code for an unknown command
const COMMAND_NOT_FOUND: i32 = 59;

fn next_request_id() -> i32 {
    REQUEST_ID.fetch_add(1, Ordering::Relaxed)
}

/// Subset of the `hello` reply the client relies on
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HelloReply {
    /// Node accepts writes
    #[serde(default, rename = "isWritablePrimary", alias = "ismaster")]
    pub is_writable_primary: bool,
    /// Replica set the node belongs to
    #[serde(default, rename = "setName")]
    pub set_name: Option<String>,
    /// Highest wire version the node speaks
    #[serde(default, rename = "maxWireVersion")]
    pub max_wire_version: i32,
}

/// A single authenticated command connection
pub struct Connection {
    transport: Transport,
    state: ConnectionState,
    read_buf: BytesMut,
    server: Option<HelloReply>,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("transport", &self.transport)
            .field("state", &self.state)
            .finish()
    }
}

impl Connection {
    /// Create connection from transport
    pub fn new(transport: Transport) -> Self {
        Self {
            transport,
            state: ConnectionState::Initial,
            read_buf: BytesMut::with_capacity(8192),
            server: None,
        }
    }

    /// Open a transport to `host:port` and wrap it
    pub async fn open(host: &str, port: u16, tls: Option<&TlsPolicy>) -> Result<Self> {
        let transport = Transport::connect(host, port, tls).await?;
        Ok(Self::new(transport))
    }

    /// Get current connection state
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Whether the transport is encrypted
    pub fn is_tls(&self) -> bool {
        self.transport.is_tls()
    }

    /// Server description from the handshake
    pub fn server(&self) -> Option<&HelloReply> {
        self.server.as_ref()
    }

    /// Perform the `hello` handshake and, when a credential is given, authenticate
    ///
    /// # Errors
    ///
    /// Fails when the server is too old for `OP_MSG`, when `replica_set` is set
    /// and the server reports a different set, or when authentication fails.
    pub async fn startup(
        &mut self,
        app_name: &str,
        replica_set: Option<&str>,
        credential: Option<&Credential>,
    ) -> Result<()> {
        async {
            self.state.transition(ConnectionState::Handshaking)?;

            let hello = self.hello(app_name).await?;
            if hello.max_wire_version < MIN_WIRE_VERSION {
                return Err(Error::Protocol(format!(
                    "server wire version {} is too old, {} or newer is required",
                    hello.max_wire_version, MIN_WIRE_VERSION
                )));
            }
            if let Some(expected) = replica_set {
                if hello.set_name.as_deref() != Some(expected) {
                    return Err(Error::Config(format!(
                        "replica set mismatch: configured '{}', server reports {:?}",
                        expected, hello.set_name
                    )));
                }
            }
            tracing::debug!(
                writable = hello.is_writable_primary,
                set_name = ?hello.set_name,
                wire_version = hello.max_wire_version,
                "handshake complete"
            );
            self.server = Some(hello);

            if let Some(credential) = credential {
                self.state.transition(ConnectionState::Authenticating)?;
                self.authenticate(credential).await?;
            }

            self.state.transition(ConnectionState::Ready)?;
            crate::metrics::counters::connection_established(self.is_tls());
            tracing::info!(tls = self.is_tls(), "startup complete");
            Ok(())
        }
        .instrument(tracing::info_span!(
            "startup",
            user = credential.map(|c| c.username.as_str()).unwrap_or(""),
        ))
        .await
    }

    /// Handshake with `hello`, or `isMaster` on servers older than 4.4.2
    async fn hello(&mut self, app_name: &str) -> Result<HelloReply> {
        let metadata = doc! {
            "application": { "name": app_name },
            "driver": { "name": env!("CARGO_PKG_NAME"), "version": env!("CARGO_PKG_VERSION") },
            "os": { "type": std::env::consts::OS },
        };
        let command = doc! { "hello": 1, "client": metadata.clone() };
        let reply = match self.round_trip("admin", command).await {
            Err(Error::Server { code: COMMAND_NOT_FOUND, .. }) => {
                tracing::debug!("server does not know hello, falling back to isMaster");
                let legacy = doc! { "isMaster": 1, "client": metadata };
                self.round_trip("admin", legacy).await?
            }
            other => other?,
        };
        Ok(bson::from_document(reply)?)
    }

    /// Run a SCRAM-SHA-256 conversation against the credential's source database
    async fn authenticate(&mut self, credential: &Credential) -> Result<()> {
        let mechanism = crate::metrics::labels::MECHANISM_SCRAM_SHA_256;
        crate::metrics::counters::auth_attempted(mechanism);

        let result = self.scram_conversation(credential).await;
        match &result {
            Ok(()) => tracing::debug!("SCRAM-SHA-256 authentication successful"),
            Err(e) => {
                crate::metrics::counters::auth_failed(mechanism, e.category());
                tracing::debug!(error = %e, "SCRAM-SHA-256 authentication failed");
            }
        }
        result
    }

    async fn scram_conversation(&mut self, credential: &Credential) -> Result<()> {
        let mut scram = ScramClient::new(credential.username.clone(), credential.password.clone());
        let db = credential.source.as_str();

        tracing::debug!("initiating SCRAM-SHA-256 authentication");
        let start = doc! {
            "saslStart": 1,
            "mechanism": SCRAM_SHA_256,
            "payload": binary(scram.client_first().into_bytes()),
            "autoAuthorize": 1,
            "options": { "skipEmptyExchange": true },
        };
        let reply = self.round_trip(db, start).await.map_err(auth_error)?;
        let conversation_id = reply
            .get("conversationId")
            .cloned()
            .ok_or_else(|| Error::Protocol("saslStart reply has no conversationId".into()))?;

        let server_first = payload_str(&reply)?;
        tracing::debug!("received SCRAM server first message");
        let (client_final, state) = scram
            .client_final(&server_first)
            .map_err(|e| Error::Authentication(format!("SCRAM error: {}", e)))?;

        let reply = self
            .round_trip(
                db,
                doc! {
                    "saslContinue": 1,
                    "conversationId": conversation_id.clone(),
                    "payload": binary(client_final.into_bytes()),
                },
            )
            .await
            .map_err(auth_error)?;

        let server_final = payload_str(&reply)?;
        scram
            .verify_server_final(&server_final, &state)
            .map_err(|e| Error::Authentication(format!("SCRAM verification failed: {}", e)))?;

        if !reply.get_bool("done").unwrap_or(false) {
            // Server did not honour skipEmptyExchange; finish with an empty step
            let reply = self
                .round_trip(
                    db,
                    doc! {
                        "saslContinue": 1,
                        "conversationId": conversation_id,
                        "payload": binary(Vec::new()),
                    },
                )
                .await
                .map_err(auth_error)?;
            if !reply.get_bool("done").unwrap_or(false) {
                return Err(Error::Authentication(
                    "SASL conversation did not complete".into(),
                ));
            }
        }

        Ok(())
    }

    /// Run a command against `database` and return the checked reply
    ///
    /// # Errors
    ///
    /// [`Error::Server`] when the reply reports failure; transport and
    /// protocol errors otherwise. After a transport or protocol error the
    /// connection is closed and must not be reused.
    pub async fn run_command(&mut self, database: &str, command: Document) -> Result<Document> {
        if self.state != ConnectionState::Ready {
            return Err(Error::InvalidState {
                expected: ConnectionState::Ready.to_string(),
                actual: self.state.to_string(),
            });
        }

        self.state.transition(ConnectionState::CommandInProgress)?;
        let result = self.round_trip(database, command).await;
        match &result {
            Ok(_) | Err(Error::Server { .. }) => {
                self.state.transition(ConnectionState::Ready)?;
            }
            Err(_) => {
                self.state.transition(ConnectionState::Closed)?;
            }
        }
        result
    }

    /// Send a command and read its reply, regardless of state
    async fn round_trip(&mut self, database: &str, mut command: Document) -> Result<Document> {
        let name = command.keys().next().cloned().unwrap_or_default();
        command.insert(DB_FIELD, database);

        let started = Instant::now();
        let request_id = next_request_id();
        self.send_message(request_id, &OpMsg::command(command))
            .await?;
        let msg = self.receive_reply(request_id).await?;
        crate::metrics::histograms::command_duration(name.clone(), started.elapsed());
        tracing::debug!(command = %name, database, "command round trip complete");

        check_command_reply(msg.body)
    }

    async fn send_message(&mut self, request_id: i32, msg: &OpMsg) -> Result<()> {
        let buf = encode_message(request_id, msg)?;
        self.transport.write_all(&buf).await?;
        self.transport.flush().await?;
        Ok(())
    }

    async fn receive_reply(&mut self, request_id: i32) -> Result<OpMsg> {
        loop {
            match decode_message(&self.read_buf) {
                Ok((header, msg, consumed)) => {
                    self.read_buf.advance(consumed);
                    if header.response_to != request_id {
                        return Err(Error::Protocol(format!(
                            "reply to request {} while waiting for {}",
                            header.response_to, request_id
                        )));
                    }
                    return Ok(msg);
                }
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                    let n = self.transport.read_buf(&mut self.read_buf).await?;
                    if n == 0 {
                        return Err(Error::ConnectionClosed);
                    }
                }
                Err(e) => return Err(Error::Protocol(e.to_string())),
            }
        }
    }

    /// Close the connection
    pub async fn close(mut self) -> Result<()> {
        self.state.transition(ConnectionState::Closed)?;
        self.transport.shutdown().await?;
        Ok(())
    }
}

fn binary(bytes: Vec<u8>) -> Bson {
    Bson::Binary(Binary {
        subtype: BinarySubtype::Generic,
        bytes,
    })
}

fn payload_str(reply: &Document) -> Result<String> {
    let payload = reply
        .get_binary_generic("payload")
        .map_err(|_| Error::Protocol("SASL reply has no binary payload".into()))?;
    String::from_utf8(payload.clone())
        .map_err(|e| Error::Authentication(format!("invalid UTF-8 in SASL payload: {}", e)))
}

/// Server-side refusals during the SASL exchange are authentication failures
fn auth_error(err: Error) -> Error {
    match err {
        Error::Server { message, .. } => Error::Authentication(message),
        other => other,
    }
}
