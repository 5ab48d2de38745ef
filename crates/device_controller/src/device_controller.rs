use std::sync::Arc;
use std::time::Duration;

use common::auth::Authorizer;
use common::grpc::GrpcServerConfig;
use relay_proto::device_controller::v1::connection_server::Connection;
use relay_runner::AppProcess;
use tracing::debug;

use crate::domain::{
    forwarding_pipeline, AdmissionService, ForwardingConfig, ForwardingDispatcher, Forwarder,
    LatencyAuthority, SelectionService, SessionManager,
};
use crate::gateway::{run_http_gateway, HttpGatewayConfig};
use crate::grpc::{run_device_controller_grpc_server, ConnectionHandler};

pub struct DeviceControllerConfig {
    pub grpc: GrpcServerConfig,
    pub http: HttpGatewayConfig,
    pub threshold_ms: u32,
    pub forwarding: ForwardingConfig,
    pub upstream_request_timeout: Duration,
}

/// The device controller module: gRPC listener, HTTP gateway and the
/// forwarding dispatcher around one shared Connection handler.
pub struct DeviceController {
    handler: Arc<ConnectionHandler>,
    dispatcher: ForwardingDispatcher,
    grpc_config: GrpcServerConfig,
    http_config: HttpGatewayConfig,
}

impl DeviceController {
    pub fn new(
        config: DeviceControllerConfig,
        authorizer: Arc<Authorizer>,
        session_manager: Arc<dyn SessionManager>,
        latency_authority: Arc<dyn LatencyAuthority>,
    ) -> Self {
        debug!(
            threshold_ms = config.threshold_ms,
            queue_capacity = config.forwarding.queue_capacity,
            max_in_flight = config.forwarding.max_in_flight,
            "Initializing device controller module"
        );

        let forwarder = Arc::new(Forwarder::new(
            session_manager,
            latency_authority,
            config.upstream_request_timeout,
        ));
        let (queue, dispatcher) = forwarding_pipeline(forwarder, &config.forwarding);

        let admission_service = Arc::new(AdmissionService::new(config.threshold_ms, Arc::new(queue)));
        let handler = Arc::new(ConnectionHandler::new(
            admission_service,
            SelectionService::new(),
            authorizer,
        ));

        Self {
            handler,
            dispatcher,
            grpc_config: config.grpc,
            http_config: config.http,
        }
    }

    /// Named processes for the runner: gRPC listener, HTTP gateway, forwarding dispatcher.
    pub fn into_runner_processes(self) -> Vec<(&'static str, AppProcess)> {
        let grpc_handler = Arc::clone(&self.handler);
        let grpc_config = self.grpc_config;
        let grpc: AppProcess = Box::new(move |ctx| {
            Box::pin(async move { run_device_controller_grpc_server(grpc_config, grpc_handler, ctx).await })
        });

        let http_handler: Arc<dyn Connection> = self.handler;
        let http_config = self.http_config;
        let http: AppProcess = Box::new(move |ctx| {
            Box::pin(async move { run_http_gateway(http_config, http_handler, ctx).await })
        });

        let dispatcher = self.dispatcher;
        let forwarding: AppProcess = Box::new(move |ctx| Box::pin(dispatcher.run(ctx)));

        vec![
            ("grpc-server", grpc),
            ("http-gateway", http),
            ("forwarding-dispatcher", forwarding),
        ]
    }
}
