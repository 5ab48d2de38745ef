use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Instant;
use tower::{Layer, Service};
use tracing::{error, info, warn, Instrument, Span};

/// Configuration for gRPC request logging
#[derive(Clone, Debug)]
pub struct GrpcLoggingConfig {
    /// Path prefixes that are not logged (e.g., "/grpc.reflection.")
    pub ignored_paths: Vec<String>,
}

impl Default for GrpcLoggingConfig {
    fn default() -> Self {
        Self {
            ignored_paths: vec!["/grpc.reflection.".to_string()],
        }
    }
}

impl GrpcLoggingConfig {
    pub fn new(ignored_paths: Vec<String>) -> Self {
        Self { ignored_paths }
    }

    /// Parse a comma-separated list of path prefixes.
    pub fn from_comma_separated(paths: &str) -> Self {
        Self::new(
            paths
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
        )
    }

    fn should_ignore(&self, path: &str) -> bool {
        self.ignored_paths
            .iter()
            .any(|prefix| path.starts_with(prefix))
    }
}

/// Split a gRPC path `/package.Service/Method` into service and method.
pub fn split_grpc_path(path: &str) -> (&str, &str) {
    let trimmed = path.trim_start_matches('/');
    match trimmed.split_once('/') {
        Some((service, method)) => (service, method),
        None => (trimmed, ""),
    }
}

/// Tower layer for logging gRPC requests
#[derive(Clone)]
pub struct GrpcLoggingLayer {
    config: GrpcLoggingConfig,
}

impl GrpcLoggingLayer {
    pub fn new(config: GrpcLoggingConfig) -> Self {
        Self { config }
    }
}

impl<S> Layer<S> for GrpcLoggingLayer {
    type Service = GrpcLoggingService<S>;

    fn layer(&self, service: S) -> Self::Service {
        GrpcLoggingService {
            inner: service,
            config: self.config.clone(),
        }
    }
}

/// Service that logs one line per gRPC call with its outcome and duration
#[derive(Clone)]
pub struct GrpcLoggingService<S> {
    inner: S,
    config: GrpcLoggingConfig,
}

impl<S, ReqBody, ResBody> Service<http::Request<ReqBody>> for GrpcLoggingService<S>
where
    S: Service<http::Request<ReqBody>, Response = http::Response<ResBody>>,
    S::Error: std::fmt::Display,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: http::Request<ReqBody>) -> Self::Future {
        let path = req.uri().path().to_string();
        let should_ignore = self.config.should_ignore(&path);
        let start = Instant::now();
        let future = self.inner.call(req);

        // Keep log lines correlated with the caller's span
        let span = Span::current();

        Box::pin(
            async move {
                let result = future.await;
                if should_ignore {
                    return result;
                }

                let duration_ms = start.elapsed().as_millis();
                let (service, method) = split_grpc_path(&path);

                match &result {
                    Ok(response) => {
                        // Unary errors travel in headers; trailers-only responses omit grpc-status on success
                        let grpc_status = response
                            .headers()
                            .get("grpc-status")
                            .and_then(|v| v.to_str().ok())
                            .unwrap_or("0")
                            .to_string();

                        if grpc_status == "0" {
                            info!(
                                rpc.service = %service,
                                rpc.method = %method,
                                http_status = %response.status().as_u16(),
                                grpc_status = %grpc_status,
                                duration_ms = %duration_ms,
                                "{} - {}ms",
                                path,
                                duration_ms
                            );
                        } else {
                            warn!(
                                rpc.service = %service,
                                rpc.method = %method,
                                http_status = %response.status().as_u16(),
                                grpc_status = %grpc_status,
                                duration_ms = %duration_ms,
                                "{} - {}ms - gRPC status: {}",
                                path,
                                duration_ms,
                                grpc_status
                            );
                        }
                    }
                    Err(e) => {
                        error!(
                            rpc.service = %service,
                            rpc.method = %method,
                            duration_ms = %duration_ms,
                            error = %e,
                            "{} - {}ms - ERROR: {}",
                            path,
                            duration_ms,
                            e
                        );
                    }
                }

                result
            }
            .instrument(span),
        )
    }
}
