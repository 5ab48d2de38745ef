use std::path::PathBuf;
use std::time::Duration;

/// Where and how to reach one upstream dependency
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub host: String,
    pub port: u16,
    pub use_tls: bool,
    /// PEM bundle used as the only trust root
    pub ca_cert_path: Option<PathBuf>,
    /// Directory holding `tls.crt` and `tls.key`
    pub client_cert_path: Option<PathBuf>,
    pub skip_server_cert_validation: bool,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
}

impl TransportConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            use_tls: true,
            ca_cert_path: None,
            client_cert_path: None,
            skip_server_cert_validation: false,
            connect_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(10),
        }
    }

    pub fn authority(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
