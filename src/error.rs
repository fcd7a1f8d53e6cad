//! Error types for session operations.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::config::ConfigError;

/// Which native construction call failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStage {
    /// `llama_load_model_from_file` returned null.
    Model,
    /// `llama_new_context_with_model` returned null.
    Context,
}

impl fmt::Display for LoadStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadStage::Model => write!(f, "model load"),
            LoadStage::Context => write!(f, "context creation"),
        }
    }
}

/// Errors that can occur while creating or driving an inference session.
#[derive(Error, Debug)]
pub enum SessionError {
    /// The model path does not name an existing, readable file.
    /// No native call was made.
    #[error("model not found: '{}'", .0.display())]
    ModelNotFound(PathBuf),

    /// The engine rejected the model or could not build a context for it.
    ///
    /// The engine does not report why; it usually logs the cause itself
    /// (corrupt file, unsupported format, not enough memory).
    #[error("failed to load model: {0} failed")]
    LoadFailed(LoadStage),

    /// More tokens than the configured context window.
    #[error("input too long: {tokens} tokens, context window is {max}")]
    InputTooLong { tokens: usize, max: usize },

    /// The configuration asks for something this engine build can't do.
    /// Checked before any native call.
    #[error(transparent)]
    InvalidConfig(#[from] ConfigError),

    /// Failed to tokenize input.
    #[error("tokenization failed: {0}")]
    Tokenization(String),

    /// Native evaluation returned a non-zero status.
    #[error("eval failed with status {0}")]
    Eval(i32),

    /// The session has already been released.
    #[error("session has been released")]
    Released,
}

/// Result type alias for session operations.
pub type Result<T> = std::result::Result<T, SessionError>;
