//! Conversion between `NativeParams` and raw `llama_context_params`.

use std::ptr;

use super::bindings::{llama_context_default_params, llama_context_params};
use crate::config::TensorSplit;
use crate::params::NativeParams;

/// Read llama.cpp's default context parameters.
pub(crate) fn default_params() -> NativeParams {
    let raw = unsafe { llama_context_default_params() };
    NativeParams {
        seed: raw.seed,
        n_ctx: raw.n_ctx,
        n_batch: raw.n_batch,
        n_gpu_layers: raw.n_gpu_layers,
        main_gpu: raw.main_gpu,
        // The default is a null pointer
        tensor_split: None,
        rope_freq_base: raw.rope_freq_base,
        rope_freq_scale: raw.rope_freq_scale,
        low_vram: raw.low_vram,
        mul_mat_q: raw.mul_mat_q,
        f16_kv: raw.f16_kv,
        logits_all: raw.logits_all,
        vocab_only: raw.vocab_only,
        use_mmap: raw.use_mmap,
        use_mlock: raw.use_mlock,
        embedding: raw.embedding,
    }
}

/// Build raw params and hand them to `f`.
///
/// The tensor split is copied into a stack array that lives until `f`
/// returns; the raw struct must not escape the closure.
pub(crate) fn with_raw<R>(params: &NativeParams, f: impl FnOnce(llama_context_params) -> R) -> R {
    let split = params.tensor_split.as_ref().map(TensorSplit::to_padded);

    let mut raw = unsafe { llama_context_default_params() };
    raw.seed = params.seed;
    raw.n_ctx = params.n_ctx;
    raw.n_batch = params.n_batch;
    raw.n_gpu_layers = params.n_gpu_layers;
    raw.main_gpu = params.main_gpu;
    raw.tensor_split = split.as_ref().map_or(ptr::null(), |s| s.as_ptr());
    raw.rope_freq_base = params.rope_freq_base;
    raw.rope_freq_scale = params.rope_freq_scale;
    raw.low_vram = params.low_vram;
    raw.mul_mat_q = params.mul_mat_q;
    raw.f16_kv = params.f16_kv;
    raw.logits_all = params.logits_all;
    raw.vocab_only = params.vocab_only;
    raw.use_mmap = params.use_mmap;
    raw.use_mlock = params.use_mlock;
    raw.embedding = params.embedding;

    f(raw)
}
