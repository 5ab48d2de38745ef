pub mod auth;
pub mod domain;
pub mod garde;
pub mod grpc;
pub mod telemetry;
pub mod tls;
