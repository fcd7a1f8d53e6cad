//! The native engine interface a session drives.
//!
//! [`Engine`] is a one-to-one image of the C entry points the session needs.
//! The `native` feature provides `llama::LlamaCpp`; tests
//! plug in recording fakes.

use std::ffi::CStr;

use crate::config::MAX_DEVICES;
use crate::params::NativeParams;

/// A token id in the model's vocabulary.
pub type Token = i32;

/// Native inference engine entry points.
///
/// `Model` and `Context` are owned handles. Implementations must not make
/// them `Clone` or `Copy`: the free functions take them by value, and that is
/// what stops a handle from being released twice.
pub trait Engine {
    /// Owned handle to a loaded model.
    type Model;

    /// Owned handle to an execution context.
    type Context;

    /// The engine's default context parameters.
    fn default_params(&self) -> NativeParams;

    /// Load a model file. `None` means the engine rejected it.
    fn load_model_from_file(&self, path: &CStr, params: &NativeParams) -> Option<Self::Model>;

    /// Create a context for `model`. `None` means the engine failed.
    fn new_context_with_model(
        &self,
        model: &Self::Model,
        params: &NativeParams,
    ) -> Option<Self::Context>;

    /// Release a context. Called exactly once per context, before its model is freed.
    fn free_context(&self, context: Self::Context);

    /// Release a model. Called exactly once per successfully loaded model.
    fn free_model(&self, model: Self::Model);

    /// Number of devices this engine build can split a model across.
    fn max_devices(&self) -> usize {
        MAX_DEVICES
    }

    /// Context window of `context` in tokens.
    fn n_ctx(&self, context: &Self::Context) -> i32;

    /// Tokenize `text` into `tokens`.
    ///
    /// Returns the number of tokens written, or the negated number of tokens
    /// required when `tokens` is too small.
    fn tokenize(
        &self,
        context: &mut Self::Context,
        text: &CStr,
        tokens: &mut [Token],
        add_bos: bool,
    ) -> i32;

    /// Run the model over `tokens` starting at position `n_past`.
    /// Returns 0 on success.
    fn eval(
        &self,
        context: &mut Self::Context,
        tokens: &[Token],
        n_past: i32,
        n_threads: i32,
    ) -> i32;
}
