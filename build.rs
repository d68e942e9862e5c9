use std::error::Error;

fn main() -> Result<(), Box<dyn Error>> {
    if std::env::var_os("PROTOC").is_none() {
        std::env::set_var("PROTOC", protoc_bin_vendored::protoc_bin_path()?);
    }

    tonic_build::configure().build_server(true).compile(
        &[
            "proto/flwr/proto/fleet.proto",
            "proto/flwr/proto/transport.proto",
        ],
        &["proto"],
    )?;
    Ok(())
}
