use std::io;
use std::sync::Arc;

use hyper_util::rt::TokioIo;
use rustls::pki_types::ServerName;
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;
use tonic::transport::{Channel, Endpoint, Uri};
use tracing::info;

use super::{TransportConfig, TransportSecurity};
use crate::domain::{DomainError, DomainResult};

/// Builds lazily-connecting gRPC channels to one upstream dependency.
///
/// Key material is loaded and validated in [`SecureChannelFactory::new`];
/// connection errors only surface on the first call made over the channel.
pub struct SecureChannelFactory {
    config: TransportConfig,
    security: TransportSecurity,
}

impl SecureChannelFactory {
    pub fn new(config: TransportConfig) -> DomainResult<Self> {
        let security = TransportSecurity::resolve(&config)?;
        Ok(Self { config, security })
    }

    pub fn security(&self) -> &TransportSecurity {
        &self.security
    }

    pub fn build_channel(&self) -> DomainResult<Channel> {
        let authority = self.config.authority();

        let Some(tls) = self.security.client_config()? else {
            let endpoint = self.endpoint(format!("http://{}", authority))?;
            info!(target_authority = %authority, security = "plaintext", "Built upstream channel");
            return Ok(endpoint.connect_lazy());
        };

        let dialer = TlsDialer {
            connector: TlsConnector::from(Arc::new(tls)),
            server_name: ServerName::try_from(self.config.host.clone()).map_err(|e| {
                DomainError::InvalidConfiguration(format!(
                    "invalid TLS server name {}: {}",
                    self.config.host, e
                ))
            })?,
            authority: authority.clone(),
        };

        let endpoint = self.endpoint(format!("https://{}", authority))?;
        info!(
            target_authority = %authority,
            security = self.security.kind(),
            "Built upstream channel"
        );

        Ok(
            endpoint.connect_with_connector_lazy(tower::service_fn(move |_: Uri| {
                let dialer = dialer.clone();
                async move { dialer.dial().await.map(TokioIo::new) }
            })),
        )
    }

    fn endpoint(&self, uri: String) -> DomainResult<Endpoint> {
        Ok(Endpoint::from_shared(uri)
            .map_err(|e| {
                DomainError::InvalidConfiguration(format!(
                    "invalid upstream address {}: {}",
                    self.config.authority(),
                    e
                ))
            })?
            .connect_timeout(self.config.connect_timeout)
            .timeout(self.config.request_timeout))
    }
}

/// Resolve the transport security for `config` and build its channel.
pub fn build_channel(config: TransportConfig) -> DomainResult<Channel> {
    SecureChannelFactory::new(config)?.build_channel()
}

#[derive(Clone)]
struct TlsDialer {
    connector: TlsConnector,
    server_name: ServerName<'static>,
    authority: String,
}

impl TlsDialer {
    async fn dial(&self) -> io::Result<TlsStream<TcpStream>> {
        let tcp = TcpStream::connect(&self.authority).await?;
        tcp.set_nodelay(true)?;
        self.connector.connect(self.server_name.clone(), tcp).await
    }
}
