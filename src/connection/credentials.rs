//! Credential material resolution
//!
//! TLS material can come from exactly one place: nowhere (optionally a CA
//! bundle), inline PEM blobs, or a directory holding `ca.pem`, `cert.pem`
//! and `key.pem`. [`CredentialSource`] encodes that choice so a configuration
//! naming two sources cannot be represented.

use crate::{Error, Result};
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// CA bundle file name inside a certificate directory
pub const CA_FILE: &str = "ca.pem";
/// Client certificate file name inside a certificate directory
pub const CERT_FILE: &str = "cert.pem";
/// Client key file name inside a certificate directory
pub const KEY_FILE: &str = "key.pem";

/// Where TLS credential material comes from
#[derive(Clone, PartialEq, Eq)]
pub enum CredentialSource {
    /// No client certificate; an optional CA bundle
    None {
        /// CA bundle PEM
        ca: Option<Vec<u8>>,
    },
    /// Inline PEM blobs; certificate and key always come together
    Inline {
        /// CA bundle PEM
        ca: Option<Vec<u8>>,
        /// Client certificate chain PEM
        cert: Vec<u8>,
        /// Client private key PEM
        key: Vec<u8>,
    },
    /// Directory containing `ca.pem`, `cert.pem` and `key.pem`
    Directory(PathBuf),
}

impl Default for CredentialSource {
    fn default() -> Self {
        CredentialSource::None { ca: None }
    }
}

impl fmt::Debug for CredentialSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None { ca } => f
                .debug_struct("None")
                .field("ca", &ca.as_ref().map(|c| c.len()))
                .finish(),
            Self::Inline { ca, cert, .. } => f
                .debug_struct("Inline")
                .field("ca", &ca.as_ref().map(|c| c.len()))
                .field("cert", &cert.len())
                .field("key", &"<redacted>")
                .finish(),
            Self::Directory(path) => f.debug_tuple("Directory").field(path).finish(),
        }
    }
}

impl CredentialSource {
    /// Build the source from the flat optional fields of a configuration
    ///
    /// Empty values count as absent.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if only one of certificate and key is
    /// supplied, or if inline material and `cert_path` are both supplied.
    pub fn from_parts(
        ca: Option<Vec<u8>>,
        cert: Option<Vec<u8>>,
        key: Option<Vec<u8>>,
        cert_path: Option<PathBuf>,
    ) -> Result<Self> {
        let ca = ca.filter(|c| !c.is_empty());
        let cert = cert.filter(|c| !c.is_empty());
        let key = key.filter(|k| !k.is_empty());
        let cert_path = cert_path.filter(|p| !p.as_os_str().is_empty());

        if cert.is_some() || key.is_some() {
            let (Some(cert), Some(key)) = (cert, key) else {
                return Err(Error::Config(
                    "cert_material and key_material must be specified together".into(),
                ));
            };
            if cert_path.is_some() {
                return Err(Error::Config("cert_path must not be specified".into()));
            }
            return Ok(Self::Inline { ca, cert, key });
        }

        if let Some(path) = cert_path {
            if ca.is_some() {
                tracing::warn!(
                    cert_path = %path.display(),
                    "certificate is ignored when cert_path is set; {} from the directory is used",
                    CA_FILE
                );
            }
            return Ok(Self::Directory(path));
        }

        Ok(Self::None { ca })
    }

    /// Short name of the source, for logs
    pub fn kind(&self) -> &'static str {
        match self {
            Self::None { ca: Some(_) } => "ca_only",
            Self::None { ca: None } => "none",
            Self::Inline { .. } => "inline",
            Self::Directory(_) => "directory",
        }
    }

    /// Load the raw PEM buffers for this source
    ///
    /// For a directory, a missing `ca.pem` is tolerated. Missing `cert.pem`
    /// and `key.pem` are tolerated together and make the resulting material
    /// request an unverified connection; one without the other is an error.
    pub fn resolve(&self) -> Result<PemMaterial> {
        match self {
            Self::None { ca } => Ok(PemMaterial {
                ca: ca.clone().unwrap_or_default(),
                ..PemMaterial::default()
            }),
            Self::Inline { ca, cert, key } => Ok(PemMaterial {
                ca: ca.clone().unwrap_or_default(),
                cert: cert.clone(),
                key: key.clone(),
                skip_verify: false,
            }),
            Self::Directory(dir) => read_directory(dir),
        }
    }
}

/// Raw PEM buffers, each possibly empty
#[derive(Clone, Default, PartialEq, Eq)]
pub struct PemMaterial {
    /// CA bundle
    pub ca: Vec<u8>,
    /// Client certificate chain
    pub cert: Vec<u8>,
    /// Client private key
    pub key: Vec<u8>,
    /// Verification must be disabled regardless of `ca`
    pub skip_verify: bool,
}

impl PemMaterial {
    /// Certificate and key are both present
    pub fn has_client_identity(&self) -> bool {
        !self.cert.is_empty() && !self.key.is_empty()
    }
}

impl fmt::Debug for PemMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PemMaterial")
            .field("ca", &self.ca.len())
            .field("cert", &self.cert.len())
            .field("key", &"<redacted>")
            .field("skip_verify", &self.skip_verify)
            .finish()
    }
}

fn read_directory(dir: &Path) -> Result<PemMaterial> {
    if !dir.is_dir() {
        return Err(Error::Config(format!(
            "cert_path '{}' is not a directory",
            dir.display()
        )));
    }

    let ca = read_optional(&dir.join(CA_FILE))?;
    let cert = read_optional(&dir.join(CERT_FILE))?;
    let key = read_optional(&dir.join(KEY_FILE))?;

    if cert.is_empty() != key.is_empty() {
        return Err(Error::Config(format!(
            "{} and {} must both be present in cert_path '{}'",
            CERT_FILE,
            KEY_FILE,
            dir.display()
        )));
    }

    // No client identity in the directory means no verification either, even
    // when a CA is present. This is weaker than the inline source.
    let skip_verify = cert.is_empty();
    if skip_verify {
        tracing::warn!(
            cert_path = %dir.display(),
            ca_present = !ca.is_empty(),
            "no client certificate in cert_path, server certificate verification is disabled"
        );
    }

    Ok(PemMaterial {
        ca,
        cert,
        key,
        skip_verify,
    })
}

fn read_optional(path: &Path) -> Result<Vec<u8>> {
    match fs::read(path) {
        Ok(bytes) => Ok(bytes),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(Error::Config(format!(
            "failed to read '{}': {}",
            path.display(),
            e
        ))),
    }
}
