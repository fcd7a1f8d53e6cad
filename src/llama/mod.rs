//! llama.cpp backend.
//!
//! Implements [`Engine`] on top of the bundled llama.cpp C API:
//! - Memory safety via RAII (Drop implementations)
//! - Contexts keep the model weights alive
//! - Null returns from llama.cpp become `None`, which the session turns into errors

mod context;
mod model;
mod params;

pub use context::LlamaContext;
pub use model::LlamaModel;

use std::ffi::CStr;
use std::path::Path;
use std::sync::Once;

use crate::config::SessionConfig;
use crate::engine::{Engine, Token};
use crate::error::Result;
use crate::params::NativeParams;
use crate::session::InferenceSession;

#[allow(non_upper_case_globals)]
#[allow(non_camel_case_types)]
#[allow(non_snake_case)]
#[allow(dead_code)]
#[allow(clippy::all)]
mod bindings {
    include!(concat!(env!("OUT_DIR"), "/bindings.rs"));
}

use bindings::{llama_backend_free, llama_backend_init};

static INIT: Once = Once::new();

/// Initialize the llama.cpp backend.
///
/// Called automatically when loading the first model, but can be called
/// explicitly if desired. It's safe to call multiple times.
pub fn backend_init() {
    INIT.call_once(|| {
        unsafe {
            llama_backend_init(false);
        }
        tracing::debug!("llama.cpp backend initialized");
    });
}

/// Whether [`backend_init`] has run in this process.
pub fn backend_initialized() -> bool {
    INIT.is_completed()
}

/// Free the llama.cpp backend.
///
/// # Safety
///
/// After calling this function, no llama.cpp functions should be called.
pub unsafe fn backend_free() {
    llama_backend_free();
    tracing::debug!("llama.cpp backend freed");
}

/// The bundled llama.cpp engine.
#[derive(Debug, Clone, Copy)]
pub struct LlamaCpp {
    _private: (),
}

impl LlamaCpp {
    /// Does not touch llama.cpp; the backend is initialized on first model load.
    pub fn new() -> Self {
        Self { _private: () }
    }
}

impl Default for LlamaCpp {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine for LlamaCpp {
    type Model = LlamaModel;
    type Context = LlamaContext;

    fn default_params(&self) -> NativeParams {
        params::default_params()
    }

    fn load_model_from_file(&self, path: &CStr, params: &NativeParams) -> Option<LlamaModel> {
        LlamaModel::load_from_file(path, params)
    }

    fn new_context_with_model(
        &self,
        model: &LlamaModel,
        params: &NativeParams,
    ) -> Option<LlamaContext> {
        LlamaContext::new(model, params)
    }

    fn free_context(&self, context: LlamaContext) {
        drop(context);
    }

    fn free_model(&self, model: LlamaModel) {
        drop(model);
    }

    fn max_devices(&self) -> usize {
        bindings::LLAMA_MAX_DEVICES as usize
    }

    fn n_ctx(&self, context: &LlamaContext) -> i32 {
        context.n_ctx()
    }

    fn tokenize(
        &self,
        context: &mut LlamaContext,
        text: &CStr,
        tokens: &mut [Token],
        add_bos: bool,
    ) -> i32 {
        context.tokenize(text, tokens, add_bos)
    }

    fn eval(
        &self,
        context: &mut LlamaContext,
        tokens: &[Token],
        n_past: i32,
        n_threads: i32,
    ) -> i32 {
        context.eval(tokens, n_past, n_threads)
    }
}

/// A session backed by the bundled llama.cpp.
pub type LlamaSession = InferenceSession<LlamaCpp>;

impl InferenceSession<LlamaCpp> {
    /// Load `path` with llama.cpp. See [`InferenceSession::create_with`].
    pub fn create(path: impl AsRef<Path>, config: SessionConfig) -> Result<Self> {
        Self::create_with(LlamaCpp::new(), path, config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SessionError;

    #[test]
    fn test_create_nonexistent_file() {
        let result = LlamaSession::create("/nonexistent/model.bin", SessionConfig::default());
        assert!(matches!(result, Err(SessionError::ModelNotFound(p)) if p == Path::new("/nonexistent/model.bin")));
    }

    #[test]
    fn test_max_devices_matches_build() {
        let max = LlamaCpp::new().max_devices();
        assert!(max >= 1);
        #[cfg(feature = "cuda")]
        assert_eq!(max, crate::MAX_DEVICES);
    }

    #[test]
    fn test_create_rejects_garbage_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("garbage.gguf");
        std::fs::write(&path, b"definitely not a model").unwrap();

        let result = LlamaSession::create(&path, SessionConfig::default());
        assert!(matches!(result, Err(SessionError::LoadFailed(_))));
    }
}
