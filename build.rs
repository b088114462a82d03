// Compiles the GLSL shader sources to SPIR-V with glslc (Vulkan SDK).
//
// The binary loads the .spv files at run time, so a missing glslc only
// warns here; the build itself still succeeds.

use std::path::Path;
use std::process::Command;

fn main() {
    println!("cargo:rerun-if-changed=shaders/");

    compile_shader("shaders/cube.vert", "shaders/cube.vert.spv");
    compile_shader("shaders/cube.frag", "shaders/cube.frag.spv");
}

fn compile_shader(input: &str, output: &str) {
    let result = Command::new("glslc")
        .arg(Path::new(input))
        .arg("-o")
        .arg(Path::new(output))
        .status();

    match result {
        Ok(status) if status.success() => {
            println!("Compiled {} -> {}", input, output);
        }
        Ok(status) => {
            panic!("Failed to compile {}: exit code {:?}", input, status.code());
        }
        Err(e) => {
            println!("cargo:warning=glslc not found ({}), skipping shader compilation", e);
            println!("cargo:warning=compile manually: glslc {} -o {}", input, output);
        }
    }
}
