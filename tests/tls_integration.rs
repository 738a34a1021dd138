//! End-to-end TLS tests against an in-process server
//!
//! The server presents `fixtures/server.pem` (signed by `fixtures/ca.pem`),
//! requires a client certificate from the same CA, and answers `hello` and
//! `ping` over `OP_MSG`.

use bson::{doc, Document};
use bytes::{Buf, BytesMut};
use mongo_rbac::protocol::{decode_message, encode_message, OpMsg};
use mongo_rbac::{build_client, ClientBranch, ConnectionConfig, Error};
use rustls::server::WebPkiClientVerifier;
use rustls::{RootCertStore, ServerConfig};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_rustls::TlsAcceptor;

const CA: &[u8] = include_bytes!("fixtures/ca.pem");
const CLIENT_CERT: &[u8] = include_bytes!("fixtures/client.pem");
const CLIENT_KEY: &[u8] = include_bytes!("fixtures/client.key");
const SERVER_CERT: &[u8] = include_bytes!("fixtures/server.pem");
const SERVER_KEY: &[u8] = include_bytes!("fixtures/server.key");

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn server_config() -> Arc<ServerConfig> {
    let provider = Arc::new(rustls::crypto::aws_lc_rs::default_provider());

    let mut roots = RootCertStore::empty();
    for cert in rustls_pemfile::certs(&mut &CA[..]) {
        roots.add(cert.unwrap()).unwrap();
    }
    let verifier = WebPkiClientVerifier::builder_with_provider(Arc::new(roots), provider.clone())
        .build()
        .unwrap();

    let chain = rustls_pemfile::certs(&mut &SERVER_CERT[..])
        .collect::<Result<Vec<_>, _>>()
        .unwrap();
    let key = rustls_pemfile::private_key(&mut &SERVER_KEY[..])
        .unwrap()
        .unwrap();

    let config = ServerConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .unwrap()
        .with_client_cert_verifier(verifier)
        .with_single_cert(chain, key)
        .unwrap();
    Arc::new(config)
}

/// Outcome of each accepted handshake: `Ok(client certificate presented)`
type Handshakes = mpsc::UnboundedReceiver<Result<bool, String>>;

async fn start_tls_server() -> (u16, Handshakes) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let acceptor = TlsAcceptor::from(server_config());
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        while let Ok((tcp, _)) = listener.accept().await {
            let acceptor = acceptor.clone();
            let tx = tx.clone();
            tokio::spawn(async move {
                match acceptor.accept(tcp).await {
                    Ok(stream) => {
                        let presented = stream.get_ref().1.peer_certificates().is_some();
                        let _ = tx.send(Ok(presented));
                        serve(stream).await;
                    }
                    Err(e) => {
                        let _ = tx.send(Err(e.to_string()));
                    }
                }
            });
        }
    });

    (port, rx)
}

fn reply_to(command: &Document) -> Document {
    if command.contains_key("hello") {
        doc! { "ok": 1, "isWritablePrimary": true, "maxWireVersion": 21 }
    } else {
        doc! { "ok": 1 }
    }
}

async fn serve<S: AsyncRead + AsyncWrite + Unpin>(mut stream: S) {
    let mut buf = BytesMut::new();
    loop {
        match decode_message(&buf) {
            Ok((header, msg, consumed)) => {
                buf.advance(consumed);
                let mut frame = encode_message(0, &OpMsg::command(reply_to(&msg.body))).unwrap();
                frame[8..12].copy_from_slice(&header.request_id.to_le_bytes());
                if stream.write_all(&frame).await.is_err() {
                    return;
                }
            }
            Err(_) => match stream.read_buf(&mut buf).await {
                Ok(0) | Err(_) => return,
                Ok(_) => {}
            },
        }
    }
}

fn base(port: u16) -> mongo_rbac::ConnectionConfigBuilder {
    ConnectionConfig::builder("127.0.0.1", port)
        .connect_timeout(std::time::Duration::from_secs(5))
        .command_timeout(std::time::Duration::from_secs(5))
}

#[tokio::test]
async fn test_inline_certificate_mutual_tls() {
    init_tracing();
    let (port, mut handshakes) = start_tls_server().await;

    let config = base(port)
        .ca_pem(CA)
        .client_identity_pem(CLIENT_CERT, CLIENT_KEY)
        .build()
        .unwrap();
    let client = build_client(&config).unwrap();
    assert_eq!(client.branch(), ClientBranch::InlineCertificate);

    client.ping().await.unwrap();
    assert_eq!(handshakes.recv().await.unwrap(), Ok(true));
    client.close().await.unwrap();
}

#[tokio::test]
async fn test_directory_mutual_tls() {
    init_tracing();
    let (port, mut handshakes) = start_tls_server().await;

    let dir = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/certdir");
    let config = base(port).cert_path(dir).build().unwrap();
    let client = build_client(&config).unwrap();
    assert_eq!(client.branch(), ClientBranch::CertificateDirectory);

    client.ping().await.unwrap();
    assert_eq!(handshakes.recv().await.unwrap(), Ok(true));
}

#[tokio::test]
async fn test_ca_only_is_refused_by_a_server_requiring_client_certificates() {
    init_tracing();
    let (port, mut handshakes) = start_tls_server().await;

    let config = base(port).ca_pem(CA).build().unwrap();
    let client = build_client(&config).unwrap();
    assert_eq!(client.branch(), ClientBranch::CaOnly);

    assert!(client.ping().await.is_err());
    assert!(handshakes.recv().await.unwrap().is_err());
}

#[tokio::test]
async fn test_server_certificate_from_another_ca_is_rejected() {
    init_tracing();
    let (port, _handshakes) = start_tls_server().await;

    // The client certificate is not a CA, so nothing it "signs" is trusted
    let config = base(port)
        .ca_pem(CLIENT_CERT)
        .client_identity_pem(CLIENT_CERT, CLIENT_KEY)
        .build()
        .unwrap();
    let client = build_client(&config).unwrap();

    let err = client.ping().await.unwrap_err();
    assert!(matches!(err, Error::Config(ref m) if m.contains("TLS handshake failed")), "{err:?}");
}

#[tokio::test]
async fn test_skip_verify_accepts_untrusted_server() {
    init_tracing();
    let (port, mut handshakes) = start_tls_server().await;

    let config = base(port)
        .ca_pem(CLIENT_CERT)
        .client_identity_pem(CLIENT_CERT, CLIENT_KEY)
        .insecure_skip_verify(true)
        .build()
        .unwrap();
    let client = build_client(&config).unwrap();

    client.ping().await.unwrap();
    assert_eq!(handshakes.recv().await.unwrap(), Ok(true));
}
