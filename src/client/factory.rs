//! The single entry point that turns a configuration into a client handle

use super::admin_client::AdminClient;
use super::connection_string::ConnectionString;
use crate::connection::{ConnectionConfig, CredentialSource, TlsPolicy};
use crate::{Error, Result};
use std::fmt;

/// Which kind of TLS material a client was built from
///
/// Exactly one branch applies to any configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientBranch {
    /// Inline certificate and key (plus optional CA)
    InlineCertificate,
    /// `ca.pem` / `cert.pem` / `key.pem` read from a directory
    CertificateDirectory,
    /// CA bundle only, no client certificate
    CaOnly,
    /// No TLS material at all
    NoTls,
}

impl ClientBranch {
    /// Select the branch for a credential source
    pub fn select(source: &CredentialSource) -> Self {
        match source {
            CredentialSource::Inline { .. } => Self::InlineCertificate,
            CredentialSource::Directory(_) => Self::CertificateDirectory,
            CredentialSource::None { ca: Some(_) } => Self::CaOnly,
            CredentialSource::None { ca: None } => Self::NoTls,
        }
    }

    /// Stable name, for logs
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InlineCertificate => "inline_certificate",
            Self::CertificateDirectory => "certificate_directory",
            Self::CaOnly => "ca_only",
            Self::NoTls => "no_tls",
        }
    }
}

impl fmt::Display for ClientBranch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Build a client handle for `config`
///
/// No network I/O happens here; the first command connects. Errors are
/// limited to configuration and PEM parsing problems.
///
/// Branches, first match wins:
/// 1. inline certificate and key: TLS with that client identity
/// 2. certificate directory: TLS from the files found there
/// 3. CA only: TLS trusting exactly that CA, no client identity
/// 4. nothing: plain TCP, or TLS against the system roots if `ssl` is set
///
/// In branches 1 to 3 an empty CA disables server verification.
///
/// # Errors
///
/// [`Error::Config`] for incomplete material, unreadable files, or PEM that
/// does not parse.
pub fn build_client(config: &ConnectionConfig) -> Result<AdminClient> {
    let source = &config.credential_source;
    let branch = ClientBranch::select(source);

    let tls = match branch {
        ClientBranch::InlineCertificate
        | ClientBranch::CertificateDirectory
        | ClientBranch::CaOnly => {
            let material = source.resolve()?;
            if branch == ClientBranch::InlineCertificate && !material.has_client_identity() {
                return Err(Error::Config(
                    "cert_material and key_material must be specified together".into(),
                ));
            }
            Some(TlsPolicy::from_material(
                &material,
                config.insecure_skip_verify,
            )?)
        }
        ClientBranch::NoTls if config.ssl => Some(
            TlsPolicy::builder()
                .system_roots()
                .danger_accept_invalid_certs(config.insecure_skip_verify)
                .build()?,
        ),
        ClientBranch::NoTls => None,
    };

    let address = ConnectionString::from_config(config);
    tracing::info!(
        address = %address,
        branch = %branch,
        tls = tls.is_some(),
        verify = tls.as_ref().map(TlsPolicy::verifies_server).unwrap_or(false),
        client_certificate = tls.as_ref().map(TlsPolicy::has_client_identity).unwrap_or(false),
        "client configured"
    );

    Ok(AdminClient::new(address, branch, tls, config))
}
