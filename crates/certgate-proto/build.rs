//! Build script for certgate-proto
//!
//! Compiles the agglayer protobuf definitions using tonic-build.

fn main() -> Result<(), Box<dyn std::error::Error>> {
    if std::env::var_os("PROTOC").is_none() {
        std::env::set_var("PROTOC", protoc_bin_vendored::protoc_bin_path()?);
    }

    let proto_root = "../../proto";

    let protos = [
        "agglayer/interop/types/v1/bridge_exit.proto",
        "agglayer/interop/types/v1/imported_bridge_exit.proto",
        "agglayer/interop/types/v1/aggchain.proto",
        "agglayer/node/types/v1/certificate.proto",
        "agglayer/node/types/v1/certificate_header.proto",
        "agglayer/node/types/v1/certificate_id.proto",
        "agglayer/node/v1/certificate_submission.proto",
        "agglayer/node/v1/node_state.proto",
    ];

    let proto_paths: Vec<_> = protos
        .iter()
        .map(|p| format!("{}/{}", proto_root, p))
        .collect();

    tonic_build::configure()
        .build_server(true)
        .build_client(true)
        .compile_protos(&proto_paths, &[proto_root])?;

    Ok(())
}
