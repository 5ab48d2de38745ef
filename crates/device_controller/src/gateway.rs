//! HTTP/JSON gateway for the Connection service.
//!
//! Every route rebuilds a gRPC request from the HTTP headers and calls the
//! same in-process handler as the gRPC listener, so authorization, validation
//! and forwarding behave identically on both ports.
//!
//! | route | gRPC method |
//! |---|---|
//! | `GET /v1/ping` | `Ping` |
//! | `POST /v1/latency/register` | `RegisterLatency` |
//! | `POST /v1/cluster/select` | `SelectCluster` |

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderMap, HeaderName, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use relay_proto::device_controller::v1::connection_server::Connection;
use relay_proto::device_controller::v1::{
    Empty, RegisterLatencyRequest, SelectClusterRequest,
};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tonic::metadata::MetadataMap;
use tonic::{Code, Status};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct HttpGatewayConfig {
    pub host: String,
    pub port: u16,
    /// Credential header, also allowed in CORS preflight
    pub auth_header: String,
}

impl Default for HttpGatewayConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 6021,
            auth_header: "authorization".to_string(),
        }
    }
}

impl HttpGatewayConfig {
    pub fn socket_addr(&self) -> anyhow::Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("invalid HTTP listen address {}:{}", self.host, self.port))
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RegisterLatencyBody {
    pub organization_id: String,
    pub device_group_id: String,
    pub device_id: String,
    pub latency: i32,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SelectClusterBody {
    pub organization_id: String,
    pub device_group_id: String,
    pub device_id: String,
    pub latencies: Vec<i32>,
}

#[derive(Debug, Serialize)]
pub struct SuccessReply {}

#[derive(Debug, Serialize)]
pub struct RegisterLatencyReply {
    /// `OK` or `LATENCY_CHECK_REQUIRED`
    pub result: &'static str,
}

#[derive(Debug, Serialize)]
pub struct SelectedClusterReply {
    pub cluster_index: i32,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    code: i32,
    message: String,
}

/// A gRPC status rendered as an HTTP error response
#[derive(Debug)]
pub struct GatewayError(Status);

impl From<Status> for GatewayError {
    fn from(status: Status) -> Self {
        Self(status)
    }
}

// Undecodable bodies get the same envelope as a failed validation
impl From<JsonRejection> for GatewayError {
    fn from(rejection: JsonRejection) -> Self {
        Self(Status::invalid_argument(rejection.body_text()))
    }
}

pub fn http_status_for(code: Code) -> StatusCode {
    match code {
        Code::InvalidArgument => StatusCode::BAD_REQUEST,
        Code::Unauthenticated => StatusCode::UNAUTHORIZED,
        Code::PermissionDenied => StatusCode::FORBIDDEN,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = http_status_for(self.0.code());
        let body = ErrorBody {
            code: i32::from(self.0.code()),
            message: self.0.message().to_string(),
        };
        (status, Json(body)).into_response()
    }
}

type SharedConnection = Arc<dyn Connection>;

fn grpc_request<T>(headers: HeaderMap, message: T) -> tonic::Request<T> {
    let mut request = tonic::Request::new(message);
    *request.metadata_mut() = MetadataMap::from_headers(headers);
    request
}

async fn ping(
    State(connection): State<SharedConnection>,
    headers: HeaderMap,
) -> Result<Json<SuccessReply>, GatewayError> {
    connection.ping(grpc_request(headers, Empty {})).await?;
    Ok(Json(SuccessReply {}))
}

async fn register_latency(
    State(connection): State<SharedConnection>,
    headers: HeaderMap,
    body: Result<Json<RegisterLatencyBody>, JsonRejection>,
) -> Result<Json<RegisterLatencyReply>, GatewayError> {
    let Json(body) = body?;
    let reply = connection
        .register_latency(grpc_request(
            headers,
            RegisterLatencyRequest {
                organization_id: body.organization_id,
                device_group_id: body.device_group_id,
                device_id: body.device_id,
                latency: body.latency,
            },
        ))
        .await?
        .into_inner();

    Ok(Json(RegisterLatencyReply {
        result: reply.result().as_str_name(),
    }))
}

async fn select_cluster(
    State(connection): State<SharedConnection>,
    headers: HeaderMap,
    body: Result<Json<SelectClusterBody>, JsonRejection>,
) -> Result<Json<SelectedClusterReply>, GatewayError> {
    let Json(body) = body?;
    let reply = connection
        .select_cluster(grpc_request(
            headers,
            SelectClusterRequest {
                organization_id: body.organization_id,
                device_group_id: body.device_group_id,
                device_id: body.device_id,
                latencies: body.latencies,
            },
        ))
        .await?
        .into_inner();

    Ok(Json(SelectedClusterReply {
        cluster_index: reply.cluster_index,
    }))
}

/// CORS policy: echo the caller origin, allow the gateway's methods and the
/// credential header. A preflight without `Origin` gets no
/// `Access-Control-Allow-Origin`, so browsers treat it as denied.
pub fn cors_layer(auth_header: &str) -> CorsLayer {
    let mut headers = vec![CONTENT_TYPE, ACCEPT, AUTHORIZATION];
    if let Ok(name) = HeaderName::try_from(auth_header) {
        if !headers.contains(&name) {
            headers.push(name);
        }
    }

    CorsLayer::new()
        .allow_origin(AllowOrigin::mirror_request())
        .allow_methods([
            Method::GET,
            Method::HEAD,
            Method::POST,
            Method::PUT,
            Method::DELETE,
        ])
        .allow_headers(headers)
}

/// Build the gateway router around a Connection implementation.
pub fn build_gateway_router(connection: SharedConnection, config: &HttpGatewayConfig) -> Router {
    Router::new()
        .route("/v1/ping", get(ping))
        .route("/v1/latency/register", post(register_latency))
        .route("/v1/cluster/select", post(select_cluster))
        .with_state(connection)
        .layer(cors_layer(&config.auth_header))
        .layer(TraceLayer::new_for_http())
}

/// Serve the gateway until the token is cancelled.
pub async fn run_http_gateway(
    config: HttpGatewayConfig,
    connection: SharedConnection,
    cancellation_token: CancellationToken,
) -> anyhow::Result<()> {
    let addr = config.socket_addr()?;
    let router = build_gateway_router(connection, &config);

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind HTTP gateway on {}", addr))?;

    info!(address = %addr, "Launching HTTP gateway");

    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            cancellation_token.cancelled().await;
            debug!("HTTP gateway shutdown signal received");
        })
        .await
        .context("HTTP gateway error")?;

    debug!("HTTP gateway stopped gracefully");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(http_status_for(Code::InvalidArgument), StatusCode::BAD_REQUEST);
        assert_eq!(http_status_for(Code::Unauthenticated), StatusCode::UNAUTHORIZED);
        assert_eq!(http_status_for(Code::PermissionDenied), StatusCode::FORBIDDEN);
        assert_eq!(http_status_for(Code::Unavailable), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(http_status_for(Code::Internal), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_headers_become_metadata() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", "Bearer abc".parse().unwrap());
        let request = grpc_request(headers, Empty {});
        assert_eq!(request.metadata().get("authorization").unwrap(), "Bearer abc");
    }

    #[test]
    fn test_missing_body_fields_default_to_empty() {
        let body: RegisterLatencyBody = serde_json::from_str(r#"{"device_id":"dev-1"}"#).unwrap();
        assert_eq!(body.device_id, "dev-1");
        assert!(body.organization_id.is_empty());
        assert_eq!(body.latency, 0);
    }
}
