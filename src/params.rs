//! Native parameter record and config translation.

use crate::config::{SessionConfig, TensorSplit};

/// The engine's context parameter record, field for field.
///
/// Engines hand out their defaults through [`Engine::default_params`] and
/// receive a translated copy on both construction calls.
///
/// [`Engine::default_params`]: crate::Engine::default_params
#[derive(Debug, Clone, PartialEq)]
pub struct NativeParams {
    pub seed: u32,
    pub n_ctx: i32,
    pub n_batch: i32,
    pub n_gpu_layers: i32,
    pub main_gpu: i32,
    /// Owned here; borrowed as a raw pointer only inside a native call.
    pub tensor_split: Option<TensorSplit>,
    pub rope_freq_base: f32,
    pub rope_freq_scale: f32,
    pub low_vram: bool,
    pub mul_mat_q: bool,
    pub f16_kv: bool,
    pub logits_all: bool,
    pub vocab_only: bool,
    pub use_mmap: bool,
    pub use_mlock: bool,
    pub embedding: bool,
}

/// Overwrite every field of the engine `defaults` with the value from `config`.
///
/// Infallible. Nothing is clamped or dropped; bad combinations are left for
/// the engine to reject at load time.
pub fn translate(config: &SessionConfig, defaults: NativeParams) -> NativeParams {
    let mut params = defaults;
    params.seed = config.seed;
    params.n_ctx = config.n_ctx;
    params.n_batch = config.n_batch;
    params.n_gpu_layers = config.n_gpu_layers;
    params.main_gpu = config.main_gpu;
    params.tensor_split = config.tensor_split.clone();
    params.rope_freq_base = config.rope_freq_base;
    params.rope_freq_scale = config.rope_freq_scale;
    params.low_vram = config.low_vram;
    params.mul_mat_q = config.mul_mat_q;
    params.f16_kv = config.f16_kv;
    params.logits_all = config.logits_all;
    params.vocab_only = config.vocab_only;
    params.use_mmap = config.use_mmap;
    params.use_mlock = config.use_mlock;
    params.embedding = config.embedding;
    params
}
