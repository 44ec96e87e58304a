fn main() -> Result<(), Box<dyn std::error::Error>> {
    tonic_build::configure()
        .build_client(true)
        .build_server(true)
        .compile(&["proto/dra_v1beta1.proto"], &["proto"])?;
    println!("cargo:rerun-if-changed=proto/dra_v1beta1.proto");
    Ok(())
}
