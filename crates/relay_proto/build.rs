//! Build script for generating tonic clients and servers from the Protocol Buffer
//! definitions under `proto/`.

use std::env;
use std::path::PathBuf;

const PROTOS: &[&str] = &[
    "../../proto/device_controller_v1.proto",
    "../../proto/cluster_api_v1.proto",
    "../../proto/login_api_v1.proto",
];

fn main() -> Result<(), Box<dyn std::error::Error>> {
    for proto in PROTOS {
        println!("cargo:rerun-if-changed={proto}");
    }

    // Use the vendored protoc unless the environment already provides one
    if env::var_os("PROTOC").is_none() {
        env::set_var("PROTOC", protoc_bin_vendored::protoc_bin_path()?);
    }

    let out_dir = PathBuf::from(env::var("OUT_DIR")?);

    tonic_build::configure()
        .build_client(true)
        .build_server(true)
        .file_descriptor_set_path(out_dir.join("relay_descriptor.bin"))
        .compile_protos(PROTOS, &["../../proto"])?;

    Ok(())
}
