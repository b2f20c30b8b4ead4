use std::io::ErrorKind;
use std::path::Path;
use std::{fs, io};
use tonic_build;

const PROTO_DIR: &str = "./protos/";
const GENERATED_DIR: &str = "./generated/";

fn main() -> io::Result<()> {
    println!("cargo:rerun-if-changed=protos/exchange.proto");
    build_proto()?;
    Ok(())
}

fn build_proto() -> io::Result<()> {
    idempotent_create_dir(GENERATED_DIR)?;
    tonic_build::configure()
        .out_dir(GENERATED_DIR)
        .compile(&["./protos/exchange.proto"], &[PROTO_DIR])
}

fn idempotent_create_dir<P: AsRef<Path>>(path: P) -> io::Result<()> {
    match fs::create_dir(path) {
        Ok(_) => Ok(()),
        Err(e) => match e.kind() {
            ErrorKind::AlreadyExists => Ok(()),
            _ => Err(e),
        },
    }
}
