//! Reusable gRPC server runner with request logging and reflection.
//!
//! # Example
//!
//! ```ignore
//! use common::grpc::{run_grpc_server, GrpcServerConfig};
//! use tonic::service::Routes;
//!
//! let routes = Routes::new(ConnectionServer::new(handler));
//!
//! run_grpc_server(config, routes, &[relay_proto::FILE_DESCRIPTOR_SET], token).await?;
//! ```

use std::net::SocketAddr;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tonic::service::Routes;
use tonic::transport::Server;
use tracing::{debug, info};

use super::{GrpcLoggingConfig, GrpcLoggingLayer};

/// Configuration for the gRPC server.
#[derive(Debug, Clone)]
pub struct GrpcServerConfig {
    pub host: String,
    pub port: u16,
    pub logging_config: GrpcLoggingConfig,
}

impl Default for GrpcServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 6020,
            logging_config: GrpcLoggingConfig::default(),
        }
    }
}

impl GrpcServerConfig {
    pub fn socket_addr(&self) -> anyhow::Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("invalid gRPC listen address {}:{}", self.host, self.port))
    }
}

/// Build the reflection service from file descriptor sets.
fn build_reflection_service(
    descriptors: &[&'static [u8]],
) -> anyhow::Result<
    tonic_reflection::server::ServerReflectionServer<
        impl tonic_reflection::server::ServerReflection,
    >,
> {
    let mut builder = tonic_reflection::server::Builder::configure();
    for descriptor in descriptors {
        builder = builder.register_encoded_file_descriptor_set(descriptor);
    }

    builder
        .build_v1()
        .context("failed to build reflection service")
}

/// Run a gRPC server with the provided routes until the token is cancelled.
///
/// Every call passes through the logging layer; reflection is registered for
/// the given descriptor sets.
pub async fn run_grpc_server(
    config: GrpcServerConfig,
    routes: Routes,
    reflection_descriptors: &[&'static [u8]],
    cancellation_token: CancellationToken,
) -> anyhow::Result<()> {
    let addr = config.socket_addr()?;
    let reflection_service = build_reflection_service(reflection_descriptors)?;
    let logging_layer = GrpcLoggingLayer::new(config.logging_config.clone());

    info!(address = %addr, "Launching gRPC server");

    // add_routes must be called before add_service, as add_service transitions to Router
    let serve = Server::builder()
        .layer(logging_layer)
        .add_routes(routes)
        .add_service(reflection_service)
        .serve_with_shutdown(addr, async move {
            cancellation_token.cancelled().await;
            debug!("gRPC server shutdown signal received");
        });

    match serve.await {
        Ok(()) => {
            debug!("gRPC server stopped gracefully");
            Ok(())
        }
        Err(e) => {
            tracing::error!("gRPC server error: {}", e);
            Err(e.into())
        }
    }
}
