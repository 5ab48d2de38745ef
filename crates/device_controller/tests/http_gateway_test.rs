use std::sync::{Arc, Mutex};

use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use common::auth::{
    AuthorizationPolicy, Authorizer, DeviceClaims, DeviceTokenConfig, JwtDeviceTokenProvider,
};
use device_controller::domain::{
    AdmissionService, ForwardingSink, LatencyReading, SelectionService,
};
use device_controller::gateway::{build_gateway_router, HttpGatewayConfig};
use device_controller::grpc::ConnectionHandler;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde_json::{json, Value};
use tower::ServiceExt;

const SECRET: &str = "gateway-test-secret";

const POLICY: &str = r#"{
    "allows_all": false,
    "permissions": {
        "/device_controller.v1.Connection/RegisterLatency": { "must": ["DEVICE"] },
        "/device_controller.v1.Connection/SelectCluster": { "must": ["DEVICE"] }
    }
}"#;

/// Records submitted readings instead of forwarding them
#[derive(Default)]
struct RecordingSink {
    readings: Mutex<Vec<LatencyReading>>,
}

impl ForwardingSink for RecordingSink {
    fn submit(&self, reading: LatencyReading) {
        self.readings.lock().unwrap().push(reading);
    }
}

struct Harness {
    router: Router,
    sink: Arc<RecordingSink>,
}

fn harness() -> Harness {
    let sink = Arc::new(RecordingSink::default());
    let provider = Arc::new(JwtDeviceTokenProvider::new(DeviceTokenConfig::new(SECRET)));
    let policy = AuthorizationPolicy::from_json(POLICY).unwrap();
    let authorizer = Arc::new(Authorizer::new("authorization", provider, policy));

    let handler = Arc::new(ConnectionHandler::new(
        Arc::new(AdmissionService::new(100, sink.clone())),
        SelectionService::new(),
        authorizer,
    ));

    Harness {
        router: build_gateway_router(handler, &HttpGatewayConfig::default()),
        sink,
    }
}

fn device_token(secret: &str, primitives: &[&str]) -> String {
    let now = chrono::Utc::now().timestamp() as usize;
    let claims = DeviceClaims {
        sub: "dev-1".to_string(),
        organization_id: "org-1".to_string(),
        device_group_id: "group-1".to_string(),
        primitives: primitives.iter().map(|p| p.to_string()).collect(),
        exp: now + 3600,
        iat: now,
    };
    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .unwrap()
}

fn post_json(uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn register_body(latency: i32) -> Value {
    json!({
        "organization_id": "org-1",
        "device_group_id": "group-1",
        "device_id": "dev-1",
        "latency": latency,
    })
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_ping_without_credentials() {
    let harness = harness();
    let response = harness
        .router
        .oneshot(
            Request::builder()
                .uri("/v1/ping")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await, json!({}));
}

#[tokio::test]
async fn test_register_latency_over_threshold() {
    let harness = harness();
    let token = device_token(SECRET, &["DEVICE"]);

    let response = harness
        .router
        .oneshot(post_json("/v1/latency/register", Some(&token), register_body(120)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        json_body(response).await,
        json!({ "result": "LATENCY_CHECK_REQUIRED" })
    );

    let readings = harness.sink.readings.lock().unwrap();
    assert_eq!(readings.len(), 1);
    assert_eq!(readings[0].measure(), 120);
}

#[tokio::test]
async fn test_register_latency_within_threshold() {
    let harness = harness();
    let token = device_token(SECRET, &["DEVICE"]);

    let response = harness
        .router
        .oneshot(post_json("/v1/latency/register", Some(&token), register_body(45)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await, json!({ "result": "OK" }));
}

#[tokio::test]
async fn test_select_cluster() {
    let harness = harness();
    let token = device_token(SECRET, &["DEVICE"]);

    let response = harness
        .router
        .oneshot(post_json(
            "/v1/cluster/select",
            Some(&token),
            json!({
                "organization_id": "org-1",
                "device_group_id": "group-1",
                "device_id": "dev-1",
                "latencies": [120, 45, 300, 45],
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await, json!({ "cluster_index": 1 }));
    assert!(harness.sink.readings.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_invalid_request_is_bad_request() {
    let harness = harness();
    let token = device_token(SECRET, &["DEVICE"]);

    let response = harness
        .router
        .oneshot(post_json(
            "/v1/latency/register",
            Some(&token),
            json!({ "device_group_id": "group-1", "device_id": "dev-1", "latency": 10 }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["code"], 3);
    assert_eq!(body["message"], "organization_id cannot be empty");
    assert!(harness.sink.readings.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_empty_latency_list_is_bad_request() {
    let harness = harness();
    let token = device_token(SECRET, &["DEVICE"]);

    let response = harness
        .router
        .oneshot(post_json(
            "/v1/cluster/select",
            Some(&token),
            json!({
                "organization_id": "org-1",
                "device_group_id": "group-1",
                "device_id": "dev-1",
                "latencies": [],
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_missing_credential_is_unauthorized() {
    let harness = harness();
    let response = harness
        .router
        .oneshot(post_json("/v1/latency/register", None, register_body(45)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(json_body(response).await["code"], 16);
}

#[tokio::test]
async fn test_wrong_secret_is_unauthorized() {
    let harness = harness();
    let token = device_token("some-other-secret", &["DEVICE"]);

    let response = harness
        .router
        .oneshot(post_json("/v1/latency/register", Some(&token), register_body(45)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_missing_primitive_is_forbidden() {
    let harness = harness();
    let token = device_token(SECRET, &["PROFILE"]);

    let response = harness
        .router
        .oneshot(post_json("/v1/latency/register", Some(&token), register_body(45)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(json_body(response).await["code"], 7);
}

#[tokio::test]
async fn test_cors_preflight() {
    let harness = harness();
    let response = harness
        .router
        .oneshot(
            Request::builder()
                .method(Method::OPTIONS)
                .uri("/v1/latency/register")
                .header(header::ORIGIN, "https://console.example.com")
                .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert!(response.status().is_success());
    let headers = response.headers();
    assert_eq!(
        headers[header::ACCESS_CONTROL_ALLOW_ORIGIN],
        "https://console.example.com"
    );

    let methods = headers[header::ACCESS_CONTROL_ALLOW_METHODS]
        .to_str()
        .unwrap()
        .to_ascii_uppercase();
    for method in ["GET", "HEAD", "POST", "PUT", "DELETE"] {
        assert!(methods.contains(method), "missing {} in {}", method, methods);
    }

    let allowed = headers[header::ACCESS_CONTROL_ALLOW_HEADERS]
        .to_str()
        .unwrap()
        .to_ascii_lowercase();
    for name in ["content-type", "accept", "authorization"] {
        assert!(allowed.contains(name), "missing {} in {}", name, allowed);
    }
}

#[tokio::test]
async fn test_cors_echoes_origin_on_simple_request() {
    let harness = harness();
    let response = harness
        .router
        .oneshot(
            Request::builder()
                .uri("/v1/ping")
                .header(header::ORIGIN, "http://device.local")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
        "http://device.local"
    );
}

fn post_raw(uri: &str, token: &str, body: &'static str) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .body(Body::from(body))
        .unwrap()
}

#[tokio::test]
async fn test_malformed_json_uses_error_envelope() {
    let harness = harness();
    let token = device_token(SECRET, &["DEVICE"]);

    let response = harness
        .router
        .oneshot(post_raw("/v1/latency/register", &token, r#"{"device_id": "dev-1","#))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["code"], 3);
    assert!(!body["message"].as_str().unwrap().is_empty());
    assert!(harness.sink.readings.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_latency_outside_i32_uses_error_envelope() {
    let harness = harness();
    let token = device_token(SECRET, &["DEVICE"]);

    let response = harness
        .router
        .oneshot(post_raw(
            "/v1/latency/register",
            &token,
            r#"{"organization_id":"org-1","device_group_id":"group-1","device_id":"dev-1","latency":4294967296}"#,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["code"], 3);
    assert!(harness.sink.readings.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_select_cluster_wrong_list_type_uses_error_envelope() {
    let harness = harness();
    let token = device_token(SECRET, &["DEVICE"]);

    let response = harness
        .router
        .oneshot(post_raw(
            "/v1/cluster/select",
            &token,
            r#"{"organization_id":"org-1","device_group_id":"group-1","device_id":"dev-1","latencies":"fast"}"#,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["code"], 3);
}

#[tokio::test]
async fn test_preflight_without_origin_grants_no_origin() {
    let harness = harness();
    let response = harness
        .router
        .oneshot(
            Request::builder()
                .method(Method::OPTIONS)
                .uri("/v1/latency/register")
                .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert!(response
        .headers()
        .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
        .is_none());
}

#[tokio::test]
async fn test_preflight_allows_custom_credential_header() {
    let sink = Arc::new(RecordingSink::default());
    let provider = Arc::new(JwtDeviceTokenProvider::new(DeviceTokenConfig::new(SECRET)));
    let authorizer = Arc::new(Authorizer::new(
        "x-device-token",
        provider,
        AuthorizationPolicy::from_json(POLICY).unwrap(),
    ));
    let handler = Arc::new(ConnectionHandler::new(
        Arc::new(AdmissionService::new(100, sink)),
        SelectionService::new(),
        authorizer,
    ));
    let config = HttpGatewayConfig {
        auth_header: "x-device-token".to_string(),
        ..HttpGatewayConfig::default()
    };

    let response = build_gateway_router(handler, &config)
        .oneshot(
            Request::builder()
                .method(Method::OPTIONS)
                .uri("/v1/latency/register")
                .header(header::ORIGIN, "https://console.example.com")
                .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    let allowed = response.headers()[header::ACCESS_CONTROL_ALLOW_HEADERS]
        .to_str()
        .unwrap()
        .to_ascii_lowercase();
    assert!(allowed.contains("x-device-token"), "missing header in {}", allowed);
    assert!(allowed.contains("authorization"));
}
