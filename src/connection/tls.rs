//! TLS policy construction
//!
//! A [`TlsPolicy`] is derived fresh for each client from PEM material. Trust
//! is one of: an explicit CA pool, the system roots, or (when no CA material
//! exists, or verification was explicitly waived) no verification at all.
//! An empty CA never silently falls back to the system roots.

use super::credentials::PemMaterial;
use crate::{Error, Result};
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::CryptoProvider;
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use rustls_pemfile::Item;
use rustls_pki_types::{CertificateDer, PrivateKeyDer, ServerName, UnixTime};
use std::sync::Arc;

/// How the server certificate is checked
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RootTrust {
    /// Against CA certificates supplied in the configuration
    CaPool,
    /// Against the platform's trust store
    System,
    /// Not checked
    Unverified,
}

/// Resolved TLS trust and identity for one client
#[derive(Clone)]
pub struct TlsPolicy {
    trust: RootTrust,
    ca_certificates: usize,
    client_identity: bool,
    client_config: Arc<ClientConfig>,
}

impl TlsPolicy {
    /// Create a new TLS policy builder.
    ///
    /// # Examples
    ///
    /// ```ignore
    /// let tls = TlsPolicy::builder()
    ///     .ca_pem(std::fs::read("ca.pem")?)
    ///     .client_identity_pem(cert, key)
    ///     .build()?;
    /// ```
    pub fn builder() -> TlsPolicyBuilder {
        TlsPolicyBuilder::default()
    }

    /// Build a policy from resolved PEM material
    ///
    /// Empty CA bytes, or material that demands it, produce an unverified
    /// policy; `skip_verify` forces one.
    pub fn from_material(material: &PemMaterial, skip_verify: bool) -> Result<Self> {
        let mut builder = Self::builder()
            .ca_pem(material.ca.clone())
            .danger_accept_invalid_certs(skip_verify || material.skip_verify);
        if material.has_client_identity() {
            builder = builder.client_identity_pem(material.cert.clone(), material.key.clone());
        }
        builder.build()
    }

    /// The rustls configuration used for the handshake
    pub fn client_config(&self) -> Arc<ClientConfig> {
        self.client_config.clone()
    }

    /// How the server certificate is checked
    pub fn trust(&self) -> RootTrust {
        self.trust
    }

    /// Whether the server certificate is verified at all
    pub fn verifies_server(&self) -> bool {
        self.trust != RootTrust::Unverified
    }

    /// Number of CA certificates parsed from the configured bundle
    pub fn ca_certificates(&self) -> usize {
        self.ca_certificates
    }

    /// Whether a client certificate is presented
    pub fn has_client_identity(&self) -> bool {
        self.client_identity
    }
}

impl std::fmt::Debug for TlsPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsPolicy")
            .field("trust", &self.trust)
            .field("ca_certificates", &self.ca_certificates)
            .field("client_identity", &self.client_identity)
            .field("client_config", &"<ClientConfig>")
            .finish()
    }
}

/// Builder for [`TlsPolicy`]
#[derive(Default)]
pub struct TlsPolicyBuilder {
    ca_pem: Vec<u8>,
    system_roots: bool,
    client_cert_pem: Option<Vec<u8>>,
    client_key_pem: Option<Vec<u8>>,
    danger_accept_invalid_certs: bool,
}

impl TlsPolicyBuilder {
    /// Trust every certificate in this PEM bundle
    ///
    /// Leaving it empty without [`system_roots`](Self::system_roots) disables
    /// verification.
    pub fn ca_pem(mut self, pem: impl Into<Vec<u8>>) -> Self {
        self.ca_pem = pem.into();
        self
    }

    /// Trust the platform's root certificates when no CA bundle is given
    pub fn system_roots(mut self) -> Self {
        self.system_roots = true;
        self
    }

    /// Present a client certificate chain and private key
    pub fn client_identity_pem(
        mut self,
        cert: impl Into<Vec<u8>>,
        key: impl Into<Vec<u8>>,
    ) -> Self {
        self.client_cert_pem = Some(cert.into());
        self.client_key_pem = Some(key.into());
        self
    }

    /// ⚠️ **DANGER**: Accept invalid certificates.
    ///
    /// This disables certificate validation entirely, making the connection
    /// vulnerable to man-in-the-middle attacks.
    pub fn danger_accept_invalid_certs(mut self, accept: bool) -> Self {
        self.danger_accept_invalid_certs = accept;
        self
    }

    /// Build the TLS policy.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if:
    /// - the CA bundle contains no parsable certificate
    /// - the client certificate or key cannot be parsed, or do not match
    /// - no system root certificate could be loaded when those were requested
    pub fn build(self) -> Result<TlsPolicy> {
        let provider = crypto_provider();

        // A malformed bundle is fatal even when verification is off
        let pool = if self.ca_pem.is_empty() {
            None
        } else {
            Some(parse_ca_pool(&self.ca_pem)?)
        };

        let (trust, roots, ca_certificates) = if self.danger_accept_invalid_certs {
            let count = pool.map_or(0, |(_, count)| count);
            (RootTrust::Unverified, None, count)
        } else if let Some((store, count)) = pool {
            (RootTrust::CaPool, Some(store), count)
        } else if self.system_roots {
            (RootTrust::System, Some(load_system_roots()?), 0)
        } else {
            (RootTrust::Unverified, None, 0)
        };

        if trust == RootTrust::Unverified {
            tracing::warn!("TLS server certificate verification is disabled");
        }

        let builder = ClientConfig::builder_with_provider(provider.clone())
            .with_safe_default_protocol_versions()
            .map_err(|e| Error::Config(format!("TLS protocol setup failed: {}", e)))?;

        let builder = match roots {
            Some(store) => builder.with_root_certificates(store),
            None => builder
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(NoServerVerification(provider))),
        };

        let (client_config, client_identity) = match (self.client_cert_pem, self.client_key_pem) {
            (Some(cert), Some(key)) => {
                let (chain, key) = parse_client_identity(&cert, &key)?;
                let config = builder.with_client_auth_cert(chain, key).map_err(|e| {
                    Error::Config(format!("invalid client certificate/key pair: {}", e))
                })?;
                (config, true)
            }
            _ => (builder.with_no_client_auth(), false),
        };

        Ok(TlsPolicy {
            trust,
            ca_certificates,
            client_identity,
            client_config: Arc::new(client_config),
        })
    }
}

fn crypto_provider() -> Arc<CryptoProvider> {
    CryptoProvider::get_default()
        .cloned()
        .unwrap_or_else(|| Arc::new(rustls::crypto::aws_lc_rs::default_provider()))
}

/// Append every PEM certificate in `pem` to a fresh root store
fn parse_ca_pool(pem: &[u8]) -> Result<(RootCertStore, usize)> {
    let mut reader = std::io::Cursor::new(pem);
    let mut root_store = RootCertStore::empty();
    let mut found_certs = 0;

    loop {
        match rustls_pemfile::read_one(&mut reader) {
            Ok(Some(Item::X509Certificate(cert))) => {
                let (added, _ignored) = root_store.add_parsable_certificates(std::iter::once(cert));
                found_certs += added;
            }
            Ok(Some(_)) => {
                // Skip non-certificate items (private keys, etc.)
            }
            Ok(None) => break,
            Err(_) => {
                return Err(Error::Config(
                    "failed to parse CA certificate PEM".to_string(),
                ));
            }
        }
    }

    if found_certs == 0 {
        return Err(Error::Config(
            "no valid CA certificates found in PEM material".to_string(),
        ));
    }

    Ok((root_store, found_certs))
}

fn parse_client_identity(
    cert_pem: &[u8],
    key_pem: &[u8],
) -> Result<(Vec<CertificateDer<'static>>, PrivateKeyDer<'static>)> {
    let chain = rustls_pemfile::certs(&mut std::io::Cursor::new(cert_pem))
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::Config(format!("failed to parse client certificate PEM: {}", e)))?;
    if chain.is_empty() {
        return Err(Error::Config(
            "no certificate found in client certificate material".to_string(),
        ));
    }

    let key = rustls_pemfile::private_key(&mut std::io::Cursor::new(key_pem))
        .map_err(|e| Error::Config(format!("failed to parse client key PEM: {}", e)))?
        .ok_or_else(|| Error::Config("no private key found in key material".to_string()))?;

    Ok((chain, key))
}

fn load_system_roots() -> Result<RootCertStore> {
    let result = rustls_native_certs::load_native_certs();

    let mut store = RootCertStore::empty();
    for cert in result.certs {
        let _ = store.add_parsable_certificates(std::iter::once(cert));
    }

    if store.is_empty() {
        if !result.errors.is_empty() {
            tracing::debug!(errors = result.errors.len(), "native root certificates unavailable");
        }
        store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    }

    if store.is_empty() {
        return Err(Error::Config(
            "failed to load any system root certificates".to_string(),
        ));
    }

    Ok(store)
}

/// Accepts any server certificate while still checking handshake signatures
#[derive(Debug)]
struct NoServerVerification(Arc<CryptoProvider>);

impl ServerCertVerifier for NoServerVerification {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(
            message,
            cert,
            dss,
            &self.0.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(
            message,
            cert,
            dss,
            &self.0.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.0.signature_verification_algorithms.supported_schemes()
    }
}

/// Validate a hostname for TLS SNI (Server Name Indication).
///
/// # Arguments
///
/// * `hostname` - Hostname or IP address (without port)
///
/// # Errors
///
/// Returns an error if the hostname is invalid.
pub fn parse_server_name(hostname: &str) -> Result<ServerName<'static>> {
    let hostname = hostname.trim_end_matches('.');

    if hostname.is_empty() || hostname.len() > 253 {
        return Err(Error::Config(format!(
            "Invalid hostname for TLS: '{}'",
            hostname
        )));
    }

    let is_ip = hostname.parse::<std::net::IpAddr>().is_ok();
    if !is_ip
        && !hostname
            .chars()
            .all(|c| c.is_alphanumeric() || c == '-' || c == '.')
    {
        return Err(Error::Config(format!(
            "Invalid hostname for TLS: '{}'",
            hostname
        )));
    }

    ServerName::try_from(hostname.to_string())
        .map_err(|_| Error::Config(format!("Invalid hostname for TLS: '{}'", hostname)))
}
