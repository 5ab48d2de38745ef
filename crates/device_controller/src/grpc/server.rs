use std::sync::Arc;

use common::grpc::{run_grpc_server, GrpcServerConfig};
use relay_proto::device_controller::v1::connection_server::ConnectionServer;
use tokio_util::sync::CancellationToken;
use tonic::service::Routes;

use super::ConnectionHandler;

/// Descriptor sets registered with gRPC reflection
pub const REFLECTION_DESCRIPTORS: &[&[u8]] = &[relay_proto::FILE_DESCRIPTOR_SET];

/// Build the routes served on the gRPC listener.
pub fn build_device_controller_routes(handler: Arc<ConnectionHandler>) -> Routes {
    Routes::new(ConnectionServer::from_arc(handler))
}

/// Run the device-facing gRPC listener until the token is cancelled.
pub async fn run_device_controller_grpc_server(
    config: GrpcServerConfig,
    handler: Arc<ConnectionHandler>,
    cancellation_token: CancellationToken,
) -> anyhow::Result<()> {
    let routes = build_device_controller_routes(handler);
    run_grpc_server(config, routes, REFLECTION_DESCRIPTORS, cancellation_token).await
}
