fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Tell Cargo that if the given file changes, to rerun this build script.
    println!("cargo:rerun-if-changed=proto/email.proto");
    println!("cargo:rerun-if-env-changed=GIT_COMMIT");

    tonic_build::configure()
        .build_server(true)
        .build_client(true)
        .type_attribute(".", "#[derive(serde::Serialize, serde::Deserialize)]")
        .compile_protos(&["proto/email.proto"], &["proto"])?;
    Ok(())
}
