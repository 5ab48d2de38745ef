use std::path::Path;
use std::sync::Arc;

use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::{ClientConfig, RootCertStore};
use tracing::debug;

use super::verifier::SkipServerVerification;
use super::TransportConfig;
use crate::domain::{DomainError, DomainResult};

const CLIENT_CERT_FILE: &str = "tls.crt";
const CLIENT_KEY_FILE: &str = "tls.key";

/// Certificate chain and private key presented for mutual TLS
#[derive(Debug)]
pub struct ClientIdentity {
    cert_chain: Vec<CertificateDer<'static>>,
    key: PrivateKeyDer<'static>,
}

impl Clone for ClientIdentity {
    fn clone(&self) -> Self {
        Self {
            cert_chain: self.cert_chain.clone(),
            key: self.key.clone_key(),
        }
    }
}

impl ClientIdentity {
    /// Load `tls.crt` and `tls.key` from `dir`.
    pub fn load_dir(dir: &Path) -> DomainResult<Self> {
        let cert_path = dir.join(CLIENT_CERT_FILE);
        let key_path = dir.join(CLIENT_KEY_FILE);

        let cert_pem = read_file(&cert_path)?;
        let cert_chain = rustls_pemfile::certs(&mut cert_pem.as_slice())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| {
                DomainError::TlsMaterial(format!("invalid PEM in {}: {}", cert_path.display(), e))
            })?;
        if cert_chain.is_empty() {
            return Err(DomainError::TlsMaterial(format!(
                "no certificate found in {}",
                cert_path.display()
            )));
        }

        let key_pem = read_file(&key_path)?;
        let key = rustls_pemfile::private_key(&mut key_pem.as_slice())
            .map_err(|e| {
                DomainError::TlsMaterial(format!("invalid PEM in {}: {}", key_path.display(), e))
            })?
            .ok_or_else(|| {
                DomainError::TlsMaterial(format!("no private key found in {}", key_path.display()))
            })?;

        Ok(Self { cert_chain, key })
    }
}

/// Resolved security posture of an upstream channel
#[derive(Debug, Clone)]
pub enum TransportSecurity {
    Plaintext,
    /// TLS without server certificate validation
    Insecure { identity: Option<ClientIdentity> },
    /// TLS validated against `roots`, either a configured CA bundle or the
    /// public web PKI
    CaPinned { roots: Arc<RootCertStore> },
    MutualTls {
        roots: Arc<RootCertStore>,
        identity: ClientIdentity,
    },
}

impl TransportSecurity {
    /// Resolve the posture and load all key material.
    ///
    /// Skipping server validation takes precedence over a CA bundle.
    pub fn resolve(config: &TransportConfig) -> DomainResult<Self> {
        if !config.use_tls {
            return Ok(Self::Plaintext);
        }

        let identity = config
            .client_cert_path
            .as_deref()
            .map(ClientIdentity::load_dir)
            .transpose()?;

        if config.skip_server_cert_validation {
            return Ok(Self::Insecure { identity });
        }

        let roots = match &config.ca_cert_path {
            Some(path) => load_ca_bundle(path)?,
            None => RootCertStore {
                roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
            },
        };
        let roots = Arc::new(roots);

        Ok(match identity {
            Some(identity) => Self::MutualTls { roots, identity },
            None => Self::CaPinned { roots },
        })
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Plaintext => "plaintext",
            Self::Insecure { .. } => "tls-insecure",
            Self::CaPinned { .. } => "tls",
            Self::MutualTls { .. } => "mtls",
        }
    }

    fn identity(&self) -> Option<&ClientIdentity> {
        match self {
            Self::Insecure { identity } => identity.as_ref(),
            Self::MutualTls { identity, .. } => Some(identity),
            _ => None,
        }
    }

    /// rustls client configuration with ALPN `h2`, or `None` for plaintext.
    pub fn client_config(&self) -> DomainResult<Option<ClientConfig>> {
        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let builder = ClientConfig::builder_with_provider(provider.clone())
            .with_safe_default_protocol_versions()
            .map_err(|e| DomainError::TlsMaterial(e.to_string()))?;

        let builder = match self {
            Self::Plaintext => return Ok(None),
            Self::Insecure { .. } => builder
                .dangerous()
                .with_custom_certificate_verifier(SkipServerVerification::new(provider)),
            Self::CaPinned { roots } | Self::MutualTls { roots, .. } => {
                builder.with_root_certificates(roots.clone())
            }
        };

        let mut config = match self.identity() {
            Some(identity) => builder
                .with_client_auth_cert(identity.cert_chain.clone(), identity.key.clone_key())
                .map_err(|e| DomainError::TlsMaterial(format!("invalid client identity: {}", e)))?,
            None => builder.with_no_client_auth(),
        };
        config.alpn_protocols = vec![b"h2".to_vec()];

        Ok(Some(config))
    }
}

fn read_file(path: &Path) -> DomainResult<Vec<u8>> {
    std::fs::read(path)
        .map_err(|e| DomainError::TlsMaterial(format!("cannot read {}: {}", path.display(), e)))
}

fn load_ca_bundle(path: &Path) -> DomainResult<RootCertStore> {
    let pem = read_file(path)?;
    let mut roots = RootCertStore::empty();

    for cert in rustls_pemfile::certs(&mut pem.as_slice()) {
        let cert = cert.map_err(|e| {
            DomainError::TlsMaterial(format!("invalid PEM in {}: {}", path.display(), e))
        })?;
        roots.add(cert).map_err(|e| {
            DomainError::TlsMaterial(format!("invalid CA certificate in {}: {}", path.display(), e))
        })?;
    }

    if roots.is_empty() {
        return Err(DomainError::TlsMaterial(format!(
            "no certificate found in {}",
            path.display()
        )));
    }

    debug!(path = %path.display(), count = roots.len(), "Loaded CA bundle");
    Ok(roots)
}
