// build.rs

use std::env;

fn main() {
    // Release builds may stamp a version (e.g. a git describe) over the crate version.
    let version = env::var("MCRELAY_VERSION")
        .unwrap_or_else(|_| env::var("CARGO_PKG_VERSION").unwrap_or_else(|_| "dev".to_string()));

    println!("cargo:rustc-env=CARGO_PKG_VERSION={version}");
    println!("cargo:rerun-if-env-changed=MCRELAY_VERSION");
}
