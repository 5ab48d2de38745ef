use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Result};
use config::{Config, ConfigError, Environment};
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServiceConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    // Listeners
    /// Bind host for both the gRPC listener and the HTTP gateway
    #[serde(default = "default_grpc_host")]
    pub grpc_host: String,

    #[serde(default = "default_grpc_port")]
    pub grpc_port: u16,

    #[serde(default = "default_http_port")]
    pub http_port: u16,

    /// gRPC paths to ignore in logging (comma-separated)
    #[serde(default = "default_grpc_ignored_paths")]
    pub grpc_ignored_paths: String,

    // Admission
    /// Latencies strictly above this value require a latency check
    #[serde(default = "default_threshold_ms")]
    pub threshold_ms: u32,

    // Upstream cluster API
    #[serde(default)]
    pub cluster_api_hostname: String,

    #[serde(default = "default_cluster_api_port")]
    pub cluster_api_port: u16,

    // Upstream login API
    #[serde(default)]
    pub login_hostname: String,

    #[serde(default = "default_login_port")]
    pub login_port: u16,

    #[serde(default = "default_use_tls_for_login")]
    pub use_tls_for_login: bool,

    #[serde(default)]
    pub email: String,

    #[serde(default)]
    pub password: String,

    // Device authorization
    /// Header carrying the device token
    #[serde(default = "default_auth_header")]
    pub auth_header: String,

    /// HS256 secret used to verify device tokens
    #[serde(default)]
    pub auth_secret: String,

    /// JSON authorization policy file
    #[serde(default)]
    pub auth_config_path: String,

    // Transport security
    /// PEM CA bundle pinned for upstream connections
    #[serde(default)]
    pub ca_cert_path: Option<PathBuf>,

    /// Directory holding tls.crt and tls.key for mutual TLS
    #[serde(default)]
    pub client_cert_path: Option<PathBuf>,

    #[serde(default = "default_skip_server_cert_validation")]
    pub skip_server_cert_validation: bool,

    // Forwarding
    #[serde(default = "default_upstream_request_timeout_secs")]
    pub upstream_request_timeout_secs: u64,

    #[serde(default = "default_login_timeout_secs")]
    pub login_timeout_secs: u64,

    #[serde(default = "default_forwarding_queue_capacity")]
    pub forwarding_queue_capacity: usize,

    #[serde(default = "default_forwarding_max_in_flight")]
    pub forwarding_max_in_flight: usize,

    // OpenTelemetry
    #[serde(default = "default_otel_endpoint")]
    pub otel_endpoint: String,

    #[serde(default = "default_otel_enabled")]
    pub otel_enabled: bool,

    #[serde(default = "default_otel_service_name")]
    pub otel_service_name: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_grpc_host() -> String {
    "0.0.0.0".to_string()
}

fn default_grpc_port() -> u16 {
    6020
}

fn default_http_port() -> u16 {
    6021
}

fn default_grpc_ignored_paths() -> String {
    "/grpc.reflection.".to_string()
}

fn default_threshold_ms() -> u32 {
    100
}

fn default_cluster_api_port() -> u16 {
    8000
}

fn default_login_port() -> u16 {
    31683
}

fn default_use_tls_for_login() -> bool {
    true
}

fn default_auth_header() -> String {
    "authorization".to_string()
}

fn default_skip_server_cert_validation() -> bool {
    true
}

fn default_upstream_request_timeout_secs() -> u64 {
    10
}

fn default_login_timeout_secs() -> u64 {
    10
}

fn default_forwarding_queue_capacity() -> usize {
    1024
}

fn default_forwarding_max_in_flight() -> usize {
    32
}

fn default_otel_endpoint() -> String {
    "http://localhost:4317".to_string()
}

fn default_otel_enabled() -> bool {
    false
}

fn default_otel_service_name() -> String {
    "device-controller".to_string()
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_environment(Environment::with_prefix("DEVICE_CONTROLLER"))
    }

    fn from_environment(environment: Environment) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(environment)
            .build()?
            .try_deserialize()
    }

    /// Reject settings the service cannot start with.
    pub fn validate(&self) -> Result<()> {
        if self.grpc_port == 0 {
            bail!("grpc_port must be positive");
        }
        if self.http_port == 0 {
            bail!("http_port must be positive");
        }
        if self.grpc_port == self.http_port {
            bail!("grpc_port and http_port must differ");
        }
        if self.threshold_ms == 0 {
            bail!("threshold_ms must be positive");
        }
        if self.cluster_api_hostname.trim().is_empty() {
            bail!("cluster_api_hostname is required");
        }
        if self.cluster_api_port == 0 {
            bail!("cluster_api_port must be positive");
        }
        if self.login_hostname.trim().is_empty() {
            bail!("login_hostname is required");
        }
        if self.login_port == 0 {
            bail!("login_port must be positive");
        }
        if self.email.is_empty() || self.password.is_empty() {
            bail!("email and password are required for the login API");
        }
        if self.auth_secret.is_empty() {
            bail!("auth_secret is required");
        }
        if self.auth_config_path.trim().is_empty() {
            bail!("auth_config_path is required");
        }
        if self.auth_header.trim().is_empty() {
            bail!("auth_header cannot be empty");
        }
        if self.upstream_request_timeout_secs == 0 || self.login_timeout_secs == 0 {
            bail!("upstream timeouts must be positive");
        }
        if self.forwarding_queue_capacity == 0 || self.forwarding_max_in_flight == 0 {
            bail!("forwarding queue capacity and max in flight must be positive");
        }
        Ok(())
    }

    pub fn upstream_request_timeout(&self) -> Duration {
        Duration::from_secs(self.upstream_request_timeout_secs)
    }

    pub fn login_timeout(&self) -> Duration {
        Duration::from_secs(self.login_timeout_secs)
    }

    pub fn log_summary(&self) {
        info!(
            grpc_address = %format!("{}:{}", self.grpc_host, self.grpc_port),
            http_address = %format!("{}:{}", self.grpc_host, self.http_port),
            threshold_ms = self.threshold_ms,
            cluster_api = %format!("{}:{}", self.cluster_api_hostname, self.cluster_api_port),
            login_api = %format!("{}:{}", self.login_hostname, self.login_port),
            use_tls_for_login = self.use_tls_for_login,
            email = %self.email,
            password = "********",
            auth_header = %self.auth_header,
            auth_config_path = %self.auth_config_path,
            ca_cert_path = ?self.ca_cert_path,
            client_cert_path = ?self.client_cert_path,
            skip_server_cert_validation = self.skip_server_cert_validation,
            upstream_request_timeout_secs = self.upstream_request_timeout_secs,
            login_timeout_secs = self.login_timeout_secs,
            forwarding_queue_capacity = self.forwarding_queue_capacity,
            forwarding_max_in_flight = self.forwarding_max_in_flight,
            otel_enabled = self.otel_enabled,
            "Service configuration"
        );
    }
}
