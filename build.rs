//! Build script for llama-session.
//!
//! With the `native` feature this script:
//! 1. Compiles llama.cpp via cmake
//! 2. Generates Rust bindings via bindgen
//!
//! Without it nothing is built and only the engine-agnostic session layer is available.

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-env-changed=LLAMA_CPP_DIR");

    #[cfg(feature = "native")]
    {
        let source_dir = native::source_dir();
        native::compile_llama_cpp(&source_dir)?;
        native::generate_bindings(&source_dir)?;
    }

    Ok(())
}

#[cfg(feature = "native")]
mod native {
    use std::env;
    use std::path::PathBuf;

    /// Location of the llama.cpp checkout, `llama.cpp/` unless `LLAMA_CPP_DIR` is set.
    pub fn source_dir() -> PathBuf {
        env::var("LLAMA_CPP_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("llama.cpp"))
    }

    /// Compile the llama.cpp static library via cmake.
    pub fn compile_llama_cpp(source_dir: &PathBuf) -> Result<(), Box<dyn std::error::Error>> {
        let mut cmake_config = cmake::Config::new(source_dir);

        cmake_config
            .define("BUILD_SHARED_LIBS", "OFF")
            .define("LLAMA_BUILD_TESTS", "OFF")
            .define("LLAMA_BUILD_EXAMPLES", "OFF")
            .define("LLAMA_STATIC", "ON");

        #[cfg(feature = "cuda")]
        {
            cmake_config.define("LLAMA_CUBLAS", "ON");
            if let Ok(archs) = env::var("LLAMA_SESSION_CUDA_ARCHITECTURES") {
                cmake_config.define("CMAKE_CUDA_ARCHITECTURES", &archs);
                println!("cargo:warning=Building with CUDA support (architectures: {})", archs);
            } else {
                println!("cargo:warning=Building with CUDA support (native architectures)");
            }
        }

        #[cfg(not(feature = "cuda"))]
        {
            cmake_config.define("LLAMA_CUBLAS", "OFF");
        }

        #[cfg(feature = "metal")]
        {
            cmake_config.define("LLAMA_METAL", "ON");
            println!("cargo:warning=Building with Metal support");
        }

        #[cfg(not(feature = "metal"))]
        {
            cmake_config.define("LLAMA_METAL", "OFF");
        }

        // Only the library targets are needed
        cmake_config.build_target("llama");
        let dst = cmake_config.build();

        println!("cargo:rustc-link-search=native={}/build", dst.display());
        println!("cargo:rustc-link-search=native={}/lib", dst.display());
        println!("cargo:rustc-link-search=native={}/lib64", dst.display());

        // ggml objects are linked into libllama
        println!("cargo:rustc-link-lib=static=llama");

        #[cfg(target_os = "linux")]
        println!("cargo:rustc-link-lib=stdc++");

        #[cfg(target_os = "macos")]
        {
            println!("cargo:rustc-link-lib=c++");
            println!("cargo:rustc-link-lib=framework=Foundation");
            println!("cargo:rustc-link-lib=framework=Accelerate");

            #[cfg(feature = "metal")]
            {
                println!("cargo:rustc-link-lib=framework=Metal");
                println!("cargo:rustc-link-lib=framework=MetalKit");
                println!("cargo:rustc-link-lib=framework=MetalPerformanceShaders");
            }
        }

        #[cfg(feature = "cuda")]
        {
            println!("cargo:rustc-link-lib=cuda");
            println!("cargo:rustc-link-lib=cublas");
            println!("cargo:rustc-link-lib=culibos");
            println!("cargo:rustc-link-lib=cudart");
            println!("cargo:rustc-link-lib=cublasLt");
        }

        println!("cargo:rerun-if-changed={}", source_dir.display());

        Ok(())
    }

    /// Generate Rust bindings for llama.h via bindgen.
    pub fn generate_bindings(source_dir: &PathBuf) -> Result<(), Box<dyn std::error::Error>> {
        let header = source_dir.join("llama.h");

        #[allow(unused_mut)]
        let mut builder = bindgen::Builder::default();

        // LLAMA_MAX_DEVICES depends on the CUDA define
        #[cfg(feature = "cuda")]
        {
            builder = builder.clang_arg("-DGGML_USE_CUBLAS");
        }

        let bindings = builder
            .header(header.to_string_lossy())
            .clang_arg(format!("-I{}", source_dir.display()))
            // llama.h is a C header
            .clang_arg("-x")
            .clang_arg("c")
            .allowlist_function("llama_.*")
            .allowlist_type("llama_.*")
            .allowlist_var("LLAMA_.*")
            .derive_debug(true)
            .derive_default(true)
            .derive_copy(true)
            // Layout tests fail across environments
            .layout_tests(false)
            .use_core()
            .generate()
            .map_err(|e| format!("Failed to generate bindings: {}", e))?;

        let out_path = PathBuf::from(env::var("OUT_DIR")?);
        bindings.write_to_file(out_path.join("bindings.rs"))?;

        println!("cargo:rerun-if-changed={}", header.display());

        Ok(())
    }
}
