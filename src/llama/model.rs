//! Safe wrapper for llama_model.

use std::ffi::CStr;
use std::ptr::NonNull;
use std::sync::Arc;

use super::bindings::{llama_free_model, llama_load_model_from_file, llama_model};
use super::backend_init;
use super::params::with_raw;
use crate::params::NativeParams;

/// Owns the raw model pointer and frees it on drop.
pub(crate) struct RawModel {
    ptr: NonNull<llama_model>,
}

// SAFETY: llama_model is read-only after loading; contexts only read weights.
unsafe impl Send for RawModel {}

// SAFETY: see above, shared access never mutates the model.
unsafe impl Sync for RawModel {}

impl RawModel {
    pub(crate) fn as_ptr(&self) -> *mut llama_model {
        self.ptr.as_ptr()
    }
}

impl Drop for RawModel {
    fn drop(&mut self) {
        tracing::debug!("Freeing llama model");
        unsafe {
            llama_free_model(self.ptr.as_ptr());
        }
    }
}

/// A loaded llama.cpp model.
///
/// Not `Clone`. Contexts created from it keep the weights alive, so the
/// native model is freed when both this handle and every context built from
/// it are gone.
pub struct LlamaModel {
    raw: Arc<RawModel>,
}

impl LlamaModel {
    /// Load a model file. Returns `None` if llama.cpp returns null.
    pub(crate) fn load_from_file(path: &CStr, params: &NativeParams) -> Option<Self> {
        // Initialize backend if not already done
        backend_init();

        let ptr = with_raw(params, |raw| unsafe {
            llama_load_model_from_file(path.as_ptr(), raw)
        });

        NonNull::new(ptr).map(|ptr| Self {
            raw: Arc::new(RawModel { ptr }),
        })
    }

    pub(crate) fn share(&self) -> Arc<RawModel> {
        Arc::clone(&self.raw)
    }
}
