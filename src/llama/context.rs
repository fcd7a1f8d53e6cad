//! Safe wrapper for llama_context.

use std::ffi::CStr;
use std::ptr::NonNull;
use std::sync::Arc;

use super::bindings::{
    llama_context, llama_eval, llama_free, llama_n_ctx, llama_new_context_with_model,
    llama_tokenize,
};
use super::model::{LlamaModel, RawModel};
use super::params::with_raw;
use crate::engine::Token;
use crate::params::NativeParams;

/// A llama.cpp inference context.
///
/// Holds a reference to the model weights so the model outlives the context.
/// The context is not thread-safe; only one thread should use it at a time.
pub struct LlamaContext {
    ptr: NonNull<llama_context>,
    _model: Arc<RawModel>,
}

// SAFETY: LlamaContext is Send because we hold ownership and ensure single-threaded access.
// Note: llama_context is NOT thread-safe, so Sync is not implemented.
unsafe impl Send for LlamaContext {}

impl LlamaContext {
    /// Create a context for `model`. Returns `None` if llama.cpp returns null.
    pub(crate) fn new(model: &LlamaModel, params: &NativeParams) -> Option<Self> {
        let raw_model = model.share();
        let ptr = with_raw(params, |raw| unsafe {
            llama_new_context_with_model(raw_model.as_ptr(), raw)
        });

        NonNull::new(ptr).map(|ptr| Self {
            ptr,
            _model: raw_model,
        })
    }

    /// Get the context size (number of tokens).
    pub fn n_ctx(&self) -> i32 {
        unsafe { llama_n_ctx(self.ptr.as_ptr()) }
    }

    /// Tokenize into `tokens`, returning the count or the negated required size.
    pub(crate) fn tokenize(&mut self, text: &CStr, tokens: &mut [Token], add_bos: bool) -> i32 {
        let capacity = i32::try_from(tokens.len()).unwrap_or(i32::MAX);
        unsafe {
            llama_tokenize(
                self.ptr.as_ptr(),
                text.as_ptr(),
                tokens.as_mut_ptr(),
                capacity,
                add_bos,
            )
        }
    }

    pub(crate) fn eval(&mut self, tokens: &[Token], n_past: i32, n_threads: i32) -> i32 {
        unsafe {
            llama_eval(
                self.ptr.as_ptr(),
                tokens.as_ptr(),
                tokens.len() as i32,
                n_past,
                n_threads,
            )
        }
    }
}

impl Drop for LlamaContext {
    fn drop(&mut self) {
        tracing::debug!("Freeing llama context");
        unsafe {
            llama_free(self.ptr.as_ptr());
        }
    }
}
