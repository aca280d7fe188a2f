//! Compiles the sandbox's GLSL shaders to SPIR-V with `glslc`.
//!
//! The compiler is taken from `$VULKAN_SDK/bin` when set, otherwise from
//! `PATH`. Without it the build still succeeds and the sandbox reports the
//! missing `.spv` files at startup.

use std::env;
use std::path::{Path, PathBuf};
use std::process::Command;

const SHADERS: [&str; 2] = ["quad.vert", "quad.frag"];

fn glslc() -> PathBuf {
    println!("cargo:rerun-if-env-changed=VULKAN_SDK");
    match env::var_os("VULKAN_SDK") {
        Some(sdk) => {
            let exe = if cfg!(target_os = "windows") { "glslc.exe" } else { "glslc" };
            Path::new(&sdk).join("bin").join(exe)
        }
        None => PathBuf::from("glslc"),
    }
}

fn main() {
    let out_dir = PathBuf::from(env::var_os("OUT_DIR").expect("cargo sets OUT_DIR"));
    let compiler = glslc();

    for name in SHADERS {
        let source = Path::new("shaders").join(name);
        println!("cargo:rerun-if-changed={}", source.display());

        let output = out_dir.join(format!("{}.spv", name));
        match Command::new(&compiler).arg(&source).arg("-o").arg(&output).status() {
            Ok(status) if status.success() => {}
            Ok(status) => panic!("glslc failed on {} ({})", source.display(), status),
            Err(e) => {
                println!(
                    "cargo:warning=glslc not found ({}), {} not compiled",
                    e,
                    source.display()
                );
            }
        }
    }
}
