// SPDX-License-Identifier: CEPL-1.0

#[cfg(feature = "builtin-shaders")]
fn main() {
    use std::{env, fs, path::PathBuf};

    let out = PathBuf::from(env::var("OUT_DIR").expect("OUT_DIR"));
    let src_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").expect("CARGO_MANIFEST_DIR"))
        .join("../../shaders");

    let comp = shaderc::Compiler::new().expect("shaderc compiler");
    let mut opts = shaderc::CompileOptions::new().expect("shaderc options");
    opts.set_target_env(
        shaderc::TargetEnv::Vulkan,
        shaderc::EnvVersion::Vulkan1_0 as u32,
    );
    opts.set_optimization_level(shaderc::OptimizationLevel::Performance);

    for (name, kind) in [
        ("tri.vert", shaderc::ShaderKind::Vertex),
        ("tri.frag", shaderc::ShaderKind::Fragment),
    ] {
        let path = src_dir.join(name);
        println!("cargo:rerun-if-changed={}", path.display());
        let src = fs::read_to_string(&path)
            .unwrap_or_else(|e| panic!("read {}: {e}", path.display()));
        let spv = comp
            .compile_into_spirv(&src, kind, name, "main", Some(&opts))
            .unwrap_or_else(|e| panic!("compile {name}: {e}"));
        fs::write(out.join(format!("{name}.spv")), spv.as_binary_u8())
            .unwrap_or_else(|e| panic!("write {name}.spv: {e}"));
    }
    println!("cargo:rerun-if-changed=build.rs");
}

#[cfg(not(feature = "builtin-shaders"))]
fn main() {}
