pub mod device_controller;
pub mod domain;
pub mod gateway;
pub mod grpc;

pub use device_controller::*;
