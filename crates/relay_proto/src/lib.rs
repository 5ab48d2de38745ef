//! Generated protobuf messages and tonic services for the device latency relay.
//!
//! - `device_controller::v1` is the surface this service exposes to devices.
//! - `cluster_api::v1` and `login_api::v1` are the upstream services it calls.

/// Encoded file descriptor set covering every package in this crate, for gRPC reflection.
pub const FILE_DESCRIPTOR_SET: &[u8] =
    include_bytes!(concat!(env!("OUT_DIR"), "/relay_descriptor.bin"));

pub mod device_controller {
    pub mod v1 {
        tonic::include_proto!("device_controller.v1");
    }
}

pub mod cluster_api {
    pub mod v1 {
        tonic::include_proto!("cluster_api.v1");
    }
}

pub mod login_api {
    pub mod v1 {
        tonic::include_proto!("login_api.v1");
    }
}
