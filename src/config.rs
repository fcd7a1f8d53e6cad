//! Session configuration.
//!
//! `SessionConfig` is the host-side description of how a model should be
//! loaded. Its defaults match the engine's own context defaults.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

/// Seed value that tells the engine to pick a random seed.
pub const DEFAULT_SEED: u32 = 0xFFFF_FFFF;

/// Maximum number of devices a tensor split can address.
pub const MAX_DEVICES: usize = 16;

/// Errors produced while building or loading a configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The configuration document is not valid JSON for a `SessionConfig`.
    #[error("invalid configuration document: {0}")]
    Json(#[from] serde_json::Error),

    /// Tensor split names more devices than the engine supports.
    #[error("tensor split has {len} entries, at most {max} devices are supported")]
    TooManyDevices { len: usize, max: usize },

    /// A field is outside its allowed range.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Per-device weights for spreading offloaded layers across GPUs.
///
/// Holds at most [`MAX_DEVICES`] entries. The weights are only turned into a
/// raw pointer for the duration of a native call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f32>", into = "Vec<f32>")]
pub struct TensorSplit(Vec<f32>);

impl TensorSplit {
    /// Create a split from per-device weights.
    pub fn new(weights: Vec<f32>) -> Result<Self, ConfigError> {
        if weights.len() > MAX_DEVICES {
            return Err(ConfigError::TooManyDevices {
                len: weights.len(),
                max: MAX_DEVICES,
            });
        }
        Ok(Self(weights))
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Copy the weights into a fixed array, zero-padded to [`MAX_DEVICES`].
    pub fn to_padded(&self) -> [f32; MAX_DEVICES] {
        let mut out = [0.0; MAX_DEVICES];
        out[..self.0.len()].copy_from_slice(&self.0);
        out
    }
}

impl TryFrom<Vec<f32>> for TensorSplit {
    type Error = ConfigError;

    fn try_from(weights: Vec<f32>) -> Result<Self, Self::Error> {
        Self::new(weights)
    }
}

impl From<TensorSplit> for Vec<f32> {
    fn from(split: TensorSplit) -> Self {
        split.0
    }
}

/// Parameters for loading a model and creating its context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// RNG seed, [`DEFAULT_SEED`] for random.
    pub seed: u32,

    /// Context window size in tokens.
    pub n_ctx: i32,

    /// Prompt processing batch size.
    pub n_batch: i32,

    /// Number of layers to store in VRAM (0 = CPU only).
    pub n_gpu_layers: i32,

    /// The GPU used for scratch and small tensors.
    pub main_gpu: i32,

    /// How to split layers across multiple GPUs.
    pub tensor_split: Option<TensorSplit>,

    /// RoPE base frequency.
    pub rope_freq_base: f32,

    /// RoPE frequency scaling factor.
    pub rope_freq_scale: f32,

    /// Reduce VRAM usage at the cost of performance.
    pub low_vram: bool,

    /// Use the experimental mul_mat_q kernels.
    pub mul_mat_q: bool,

    /// Use fp16 for the KV cache instead of fp32.
    pub f16_kv: bool,

    /// Evaluation computes logits for every token, not just the last one.
    pub logits_all: bool,

    /// Only load the vocabulary, no weights.
    pub vocab_only: bool,

    /// Use mmap if possible.
    pub use_mmap: bool,

    /// Force the system to keep the model in RAM.
    pub use_mlock: bool,

    /// Embedding mode only.
    pub embedding: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            seed: DEFAULT_SEED,
            n_ctx: 512,
            n_batch: 512,
            n_gpu_layers: 0,
            main_gpu: 0,
            tensor_split: None,
            rope_freq_base: 10000.0,
            rope_freq_scale: 1.0,
            low_vram: false,
            mul_mat_q: false,
            f16_kv: true,
            logits_all: false,
            vocab_only: false,
            use_mmap: true,
            use_mlock: false,
            embedding: false,
        }
    }
}

impl SessionConfig {
    /// Create a config with a specific context size.
    pub fn with_context_size(n_ctx: i32) -> Self {
        Self {
            n_ctx,
            ..Default::default()
        }
    }

    /// Create a config that offloads `n_gpu_layers` layers to the main GPU.
    pub fn for_gpu(n_gpu_layers: i32) -> Self {
        Self {
            n_gpu_layers,
            ..Default::default()
        }
    }

    /// Parse a JSON document. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `LLAMA_*` environment variable overrides.
    ///
    /// Recognised: `LLAMA_SEED`, `LLAMA_N_CTX`, `LLAMA_N_BATCH`,
    /// `LLAMA_N_GPU_LAYERS`, `LLAMA_MAIN_GPU`. Values that don't parse are
    /// ignored.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    fn with_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(seed) = parse_override(&lookup, "LLAMA_SEED") {
            self.seed = seed;
        }
        if let Some(n_ctx) = parse_override(&lookup, "LLAMA_N_CTX") {
            self.n_ctx = n_ctx;
        }
        if let Some(n_batch) = parse_override(&lookup, "LLAMA_N_BATCH") {
            self.n_batch = n_batch;
        }
        if let Some(layers) = parse_override(&lookup, "LLAMA_N_GPU_LAYERS") {
            self.n_gpu_layers = layers;
        }
        if let Some(gpu) = parse_override(&lookup, "LLAMA_MAIN_GPU") {
            self.main_gpu = gpu;
        }
        self
    }

    /// Check value ranges.
    ///
    /// Session creation does not call this; out-of-range values are left for
    /// the engine to reject.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.n_ctx < 1 {
            return Err(ConfigError::Invalid(format!(
                "n_ctx must be at least 1, got {}",
                self.n_ctx
            )));
        }
        if self.n_batch < 1 {
            return Err(ConfigError::Invalid(format!(
                "n_batch must be at least 1, got {}",
                self.n_batch
            )));
        }
        if self.n_gpu_layers < 0 {
            return Err(ConfigError::Invalid(format!(
                "n_gpu_layers must not be negative, got {}",
                self.n_gpu_layers
            )));
        }
        if self.main_gpu < 0 || self.main_gpu as usize >= MAX_DEVICES {
            return Err(ConfigError::Invalid(format!(
                "main_gpu must be in 0..{}, got {}",
                MAX_DEVICES, self.main_gpu
            )));
        }
        Ok(())
    }
}

fn parse_override<T, F>(lookup: &F, key: &str) -> Option<T>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("Ignoring {}={:?}: not a valid number", key, raw);
            None
        }
    }
}
