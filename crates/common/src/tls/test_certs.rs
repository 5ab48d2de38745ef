use std::path::Path;
use std::sync::Arc;

use rcgen::{
    BasicConstraints, Certificate, CertificateParams, DnType, IsCa, KeyPair, KeyUsagePurpose,
};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};

/// Throwaway CA plus a leaf for `localhost` / `127.0.0.1` signed by it
pub(crate) struct TestPki {
    ca_cert: Certificate,
    leaf_cert: Certificate,
    leaf_key: KeyPair,
}

impl TestPki {
    pub(crate) fn new() -> Self {
        let ca_key = KeyPair::generate().unwrap();
        let mut ca_params = CertificateParams::new(Vec::<String>::new()).unwrap();
        ca_params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        ca_params
            .distinguished_name
            .push(DnType::CommonName, "device controller test ca");
        ca_params.key_usages = vec![
            KeyUsagePurpose::KeyCertSign,
            KeyUsagePurpose::CrlSign,
            KeyUsagePurpose::DigitalSignature,
        ];
        let ca_cert = ca_params.self_signed(&ca_key).unwrap();

        let leaf_key = KeyPair::generate().unwrap();
        let leaf_params =
            CertificateParams::new(vec!["localhost".to_string(), "127.0.0.1".to_string()])
                .unwrap();
        let leaf_cert = leaf_params.signed_by(&leaf_key, &ca_cert, &ca_key).unwrap();

        Self {
            ca_cert,
            leaf_cert,
            leaf_key,
        }
    }

    pub(crate) fn ca_pem(&self) -> String {
        self.ca_cert.pem()
    }

    pub(crate) fn leaf_pem(&self) -> String {
        self.leaf_cert.pem()
    }

    pub(crate) fn leaf_key_pem(&self) -> String {
        self.leaf_key.serialize_pem()
    }

    pub(crate) fn server_config(&self) -> Arc<rustls::ServerConfig> {
        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let chain: Vec<CertificateDer<'static>> = vec![self.leaf_cert.der().clone()];
        let key = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(self.leaf_key.serialize_der()));

        let mut config = rustls::ServerConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()
            .unwrap()
            .with_no_client_auth()
            .with_single_cert(chain, key)
            .unwrap();
        config.alpn_protocols = vec![b"h2".to_vec()];
        Arc::new(config)
    }
}

/// Write the leaf pair as `tls.crt` / `tls.key` into `dir`
pub(crate) fn write_client_dir(dir: &Path, pki: &TestPki) {
    std::fs::write(dir.join("tls.crt"), pki.leaf_pem()).unwrap();
    std::fs::write(dir.join("tls.key"), pki.leaf_key_pem()).unwrap();
}
