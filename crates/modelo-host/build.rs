//! Build script for modelo-host.
//!
//! Configures linker paths and runtime library discovery for the embedded
//! Python interpreter and, optionally, the Cython-built model module.
//!
//! # What This Script Does
//!
//! 1. **Python RPATH**: Embeds the library directory reported by
//!    `pyo3-build-config` so the binary finds `libpython` at runtime without
//!    `LD_LIBRARY_PATH` (relevant for conda and other non-system installs).
//!
//! 2. **Model Module** (feature `linked-model` only): Adds a link search path
//!    for `libmodel_module`, links it, and embeds an rpath for it. The `lib`
//!    prefix produced by the model's `setup.py` is what makes
//!    `-lmodel_module` resolve.
//!
//! # Environment
//!
//! | Variable | Purpose |
//! |----------|---------|
//! | `MODELO_MODEL_LIB_DIR` | Directory containing `libmodel_module` (default: `<workspace>/model`) |
//!
//! # Cargo Directives
//!
//! - `cargo:rustc-link-search`: Build-time library search path
//! - `cargo:rustc-link-lib`: The model module library
//! - `cargo:rustc-link-arg`: Linker arguments for RPATH
//! - `cargo:rerun-if-changed` / `cargo:rerun-if-env-changed`: Rebuild triggers

use std::env;
use std::path::PathBuf;

fn main() {
    let target_os = env::var("CARGO_CFG_TARGET_OS").unwrap_or_default();

    // Embed rpath to libpython so tests and the binary run from target/
    if let Some(lib_dir) = pyo3_build_config::get().lib_dir.as_deref() {
        emit_rpath(&target_os, lib_dir);
    }

    if env::var_os("CARGO_FEATURE_LINKED_MODEL").is_some() {
        let model_lib_dir = match env::var("MODELO_MODEL_LIB_DIR") {
            Ok(dir) => PathBuf::from(dir),
            Err(_) => {
                let manifest_dir = env::var("CARGO_MANIFEST_DIR").unwrap();
                PathBuf::from(manifest_dir).join("..").join("..").join("model")
            }
        };

        // Tell the linker where to find libmodel_module at build time
        println!(
            "cargo:rustc-link-search=native={}",
            model_lib_dir.display()
        );
        println!("cargo:rustc-link-lib=dylib=model_module");

        // Relative path for deployed binaries, absolute path for development
        match target_os.as_str() {
            "linux" => println!("cargo:rustc-link-arg=-Wl,-rpath,$ORIGIN/../lib"),
            "macos" => println!("cargo:rustc-link-arg=-Wl,-rpath,@executable_path/../lib"),
            _ => {}
        }
        emit_rpath(&target_os, &model_lib_dir.display().to_string());
    }

    println!("cargo:rerun-if-env-changed=MODELO_MODEL_LIB_DIR");
    println!("cargo:rerun-if-changed=build.rs");
}

/// Emit an absolute rpath entry on platforms that support one.
///
/// Windows resolves DLLs through `PATH` instead, so nothing is emitted there.
fn emit_rpath(target_os: &str, dir: &str) {
    if matches!(target_os, "linux" | "macos") {
        println!("cargo:rustc-link-arg=-Wl,-rpath,{}", dir);
    }
}
