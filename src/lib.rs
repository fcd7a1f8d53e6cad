//! llama-session: a safe session wrapper around the llama.cpp inference engine.
//!
//! An [`InferenceSession`] owns one loaded model and one execution context.
//! Creating it translates a [`SessionConfig`] into the engine's parameter
//! record, checks the model file exists, then loads the model and creates
//! the context. Both native handles are freed exactly once, on
//! [`InferenceSession::release`] or on drop.
//!
//! The engine sits behind the [`Engine`] trait. Building with the `native`
//! feature compiles the bundled llama.cpp and provides [`llama::LlamaCpp`]
//! and the [`llama::LlamaSession`] alias:
//!
//! ```ignore
//! use llama_session::{llama::LlamaSession, SessionConfig};
//!
//! let mut session = LlamaSession::create("models/7b-q4_0.gguf", SessionConfig::default())?;
//! let tokens = session.tokenize("Hello", true)?;
//! session.eval(&tokens, 4)?;
//! ```
//!
//! Calls block the current thread. Sessions are `Send` but not `Sync`.

mod config;
mod engine;
mod error;
mod params;
mod session;

#[cfg(feature = "native")]
pub mod llama;

pub use config::{ConfigError, SessionConfig, TensorSplit, DEFAULT_SEED, MAX_DEVICES};
pub use engine::{Engine, Token};
pub use error::{LoadStage, Result, SessionError};
pub use params::{translate, NativeParams};
pub use session::{InferenceSession, SessionState};
