mod config;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use common::auth::{AuthorizationPolicy, Authorizer, DeviceTokenConfig, JwtDeviceTokenProvider};
use common::grpc::{GrpcLoggingConfig, GrpcServerConfig};
use common::telemetry::{init_telemetry, shutdown_telemetry, TelemetryConfig, TelemetryProviders};
use common::tls::{SecureChannelFactory, TransportConfig};
use crate::config::ServiceConfig;
use device_controller::domain::{
    ForwardingConfig, GrpcLatencyAuthority, GrpcLoginAuthority, LoginCredentials,
    LoginSessionManager,
};
use device_controller::gateway::HttpGatewayConfig;
use device_controller::{DeviceController, DeviceControllerConfig};
use relay_runner::Runner;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    let config = match ServiceConfig::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    // Tracing and optional OpenTelemetry export for traces and logs
    let telemetry_providers: Option<TelemetryProviders> = match init_telemetry(&TelemetryConfig {
        service_name: config.otel_service_name.clone(),
        otel_endpoint: config.otel_endpoint.clone(),
        otel_enabled: config.otel_enabled,
        log_level: config.log_level.clone(),
    }) {
        Ok(providers) => providers,
        Err(e) => {
            eprintln!("Failed to initialize telemetry: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = config.validate() {
        error!("Invalid configuration: {:#}", e);
        std::process::exit(1);
    }
    config.log_summary();

    let device_controller = match build_device_controller(&config).await {
        Ok(controller) => controller,
        Err(e) => {
            error!("Failed to initialize device controller: {:#}", e);
            std::process::exit(1);
        }
    };

    let mut runner = Runner::new();
    for (name, process) in device_controller.into_runner_processes() {
        runner = runner.with_named_process(name, process);
    }

    runner = runner
        .with_closer(move || {
            Box::pin(async move {
                info!("Running cleanup tasks...");
                shutdown_telemetry(telemetry_providers);
                info!("Cleanup complete");
                Ok(())
            })
        })
        .with_closer_timeout(Duration::from_secs(10));

    runner.run().await;
}

async fn build_device_controller(config: &ServiceConfig) -> anyhow::Result<DeviceController> {
    let policy = AuthorizationPolicy::load(&config.auth_config_path)
        .context("failed to load authorization policy")?;
    let token_provider = Arc::new(JwtDeviceTokenProvider::new(DeviceTokenConfig::new(
        config.auth_secret.clone(),
    )));
    let authorizer = Arc::new(Authorizer::new(&config.auth_header, token_provider, policy));

    let cluster_factory = SecureChannelFactory::new(upstream_transport(
        config,
        &config.cluster_api_hostname,
        config.cluster_api_port,
        true,
    ))
    .context("failed to prepare cluster API transport")?;
    let login_factory = SecureChannelFactory::new(upstream_transport(
        config,
        &config.login_hostname,
        config.login_port,
        config.use_tls_for_login,
    ))
    .context("failed to prepare login API transport")?;

    info!(
        cluster_api_security = cluster_factory.security().kind(),
        login_api_security = login_factory.security().kind(),
        "Upstream transport resolved"
    );

    let cluster_channel = cluster_factory
        .build_channel()
        .context("failed to build cluster API channel")?;
    let login_channel = login_factory
        .build_channel()
        .context("failed to build login API channel")?;

    let session_manager = Arc::new(LoginSessionManager::new(
        Arc::new(GrpcLoginAuthority::new(login_channel)),
        LoginCredentials {
            email: config.email.clone(),
            password: config.password.clone(),
        },
        config.login_timeout(),
    ));
    session_manager
        .login()
        .await
        .context("initial login to the login API failed")?;

    let controller_config = DeviceControllerConfig {
        grpc: GrpcServerConfig {
            host: config.grpc_host.clone(),
            port: config.grpc_port,
            logging_config: GrpcLoggingConfig::from_comma_separated(&config.grpc_ignored_paths),
        },
        http: HttpGatewayConfig {
            host: config.grpc_host.clone(),
            port: config.http_port,
            auth_header: config.auth_header.clone(),
        },
        threshold_ms: config.threshold_ms,
        forwarding: ForwardingConfig {
            queue_capacity: config.forwarding_queue_capacity,
            max_in_flight: config.forwarding_max_in_flight,
        },
        upstream_request_timeout: config.upstream_request_timeout(),
    };

    Ok(DeviceController::new(
        controller_config,
        authorizer,
        session_manager,
        Arc::new(GrpcLatencyAuthority::new(cluster_channel)),
    ))
}

fn upstream_transport(config: &ServiceConfig, host: &str, port: u16, use_tls: bool) -> TransportConfig {
    let mut transport = TransportConfig::new(host, port);
    transport.use_tls = use_tls;
    transport.ca_cert_path = config.ca_cert_path.clone();
    transport.client_cert_path = config.client_cert_path.clone();
    transport.skip_server_cert_validation = config.skip_server_cert_validation;
    transport.request_timeout = config.upstream_request_timeout();
    transport
}
