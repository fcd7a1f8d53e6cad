//! Inference session: one loaded model plus one execution context.

use std::cell::Cell;
use std::ffi::CString;
use std::fs::File;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::config::{ConfigError, SessionConfig};
use crate::engine::{Engine, Token};
use crate::error::{LoadStage, Result, SessionError};
use crate::params::translate;

/// Lifecycle state of a session.
///
/// A session only exists once both native construction calls have
/// succeeded, so there is no observable "uninitialized" state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Native handles are live; tokenize and eval are allowed.
    Ready,
    /// Native handles have been freed.
    Released,
}

struct Handles<E: Engine> {
    model: E::Model,
    context: E::Context,
}

/// A loaded model and its execution context.
///
/// The session owns both native handles and frees them exactly once, either
/// through [`release`](Self::release) or when it is dropped.
///
/// A session can be moved to another thread but is never `Sync`: the engine
/// context must not be used from two threads at once.
pub struct InferenceSession<E: Engine> {
    engine: E,
    handles: Option<Handles<E>>,
    config: SessionConfig,
    path: PathBuf,
    n_ctx: usize,
    n_past: usize,
    _not_sync: PhantomData<Cell<()>>,
}

impl<E: Engine> InferenceSession<E> {
    /// Load the model at `path` and create a context for it.
    ///
    /// # Errors
    ///
    /// - [`SessionError::ModelNotFound`] if `path` is not an existing, readable
    ///   file. The engine is not called at all.
    /// - [`SessionError::InvalidConfig`] if the tensor split names more devices
    ///   than [`Engine::max_devices`]. The engine is not called.
    /// - [`SessionError::LoadFailed`] if the engine returns no model or no
    ///   context. A model loaded before a failed context creation is freed
    ///   before returning.
    pub fn create_with(engine: E, path: impl AsRef<Path>, config: SessionConfig) -> Result<Self> {
        let path = path.as_ref();

        if !is_readable_file(path) {
            return Err(SessionError::ModelNotFound(path.to_path_buf()));
        }

        if let Some(split) = &config.tensor_split {
            let max = engine.max_devices();
            if split.len() > max {
                return Err(ConfigError::TooManyDevices {
                    len: split.len(),
                    max,
                }
                .into());
            }
        }

        // A path with an interior NUL can't have opened above
        let c_path = CString::new(path.as_os_str().as_encoded_bytes())
            .map_err(|_| SessionError::ModelNotFound(path.to_path_buf()))?;
        let params = translate(&config, engine.default_params());

        let model = engine
            .load_model_from_file(&c_path, &params)
            .ok_or(SessionError::LoadFailed(LoadStage::Model))?;
        info!("Loaded model from {}", path.display());

        let context = match engine.new_context_with_model(&model, &params) {
            Some(context) => context,
            None => {
                warn!("Context creation failed, freeing model {}", path.display());
                engine.free_model(model);
                return Err(SessionError::LoadFailed(LoadStage::Context));
            }
        };

        let n_ctx = engine.n_ctx(&context).max(0) as usize;
        debug!("Created llama context (n_ctx={}, n_batch={})", n_ctx, config.n_batch);

        Ok(Self {
            engine,
            handles: Some(Handles { model, context }),
            config,
            path: path.to_path_buf(),
            n_ctx,
            n_past: 0,
            _not_sync: PhantomData,
        })
    }

    pub fn state(&self) -> SessionState {
        if self.handles.is_some() {
            SessionState::Ready
        } else {
            SessionState::Released
        }
    }

    /// The configuration this session was created with.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Path of the loaded model file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Context window size in tokens, as reported by the engine.
    pub fn n_ctx(&self) -> usize {
        self.n_ctx
    }

    /// Number of tokens evaluated since creation or the last [`reset`](Self::reset).
    pub fn n_past(&self) -> usize {
        self.n_past
    }

    /// Free the context and then the model.
    ///
    /// Safe to call any number of times; only the first call frees anything.
    /// Dropping the session calls this too.
    pub fn release(&mut self) {
        if let Some(Handles { model, context }) = self.handles.take() {
            debug!("Freeing llama context");
            self.engine.free_context(context);
            debug!("Freeing llama model");
            self.engine.free_model(model);
            self.n_past = 0;
        }
    }

    /// Tokenize `text`.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::InputTooLong`] when the text needs more tokens
    /// than the context window holds.
    pub fn tokenize(&mut self, text: &str, add_bos: bool) -> Result<Vec<Token>> {
        let n_ctx = self.n_ctx;
        let handles = self.handles.as_mut().ok_or(SessionError::Released)?;

        let c_text = CString::new(text).map_err(|_| {
            SessionError::Tokenization("text contains an interior NUL byte".to_string())
        })?;

        let mut tokens: Vec<Token> = vec![0; n_ctx];
        let n = self
            .engine
            .tokenize(&mut handles.context, &c_text, &mut tokens, add_bos);

        if n < 0 {
            return Err(SessionError::InputTooLong {
                tokens: n.unsigned_abs() as usize,
                max: n_ctx,
            });
        }

        tokens.truncate(n as usize);
        Ok(tokens)
    }

    /// Evaluate `tokens` after the ones already in the context.
    ///
    /// Tokens are fed to the engine in chunks of at most `n_batch`. On a
    /// failed chunk, earlier chunks stay counted in [`n_past`](Self::n_past).
    ///
    /// # Errors
    ///
    /// - [`SessionError::InputTooLong`] if the tokens don't fit in the
    ///   remaining context window. Nothing is evaluated.
    /// - [`SessionError::Eval`] if the engine returns a non-zero status.
    pub fn eval(&mut self, tokens: &[Token], n_threads: usize) -> Result<()> {
        let handles = self.handles.as_mut().ok_or(SessionError::Released)?;

        if tokens.is_empty() {
            return Ok(());
        }

        let end = self.n_past + tokens.len();
        if end > self.n_ctx {
            return Err(SessionError::InputTooLong {
                tokens: end,
                max: self.n_ctx,
            });
        }

        let n_threads = i32::try_from(n_threads).unwrap_or(i32::MAX);
        let n_batch = self.config.n_batch.max(1) as usize;

        for chunk in tokens.chunks(n_batch) {
            let status = self.engine.eval(
                &mut handles.context,
                chunk,
                self.n_past as i32,
                n_threads,
            );
            if status != 0 {
                return Err(SessionError::Eval(status));
            }
            self.n_past += chunk.len();
        }

        Ok(())
    }

    /// Start over at position 0. Later evaluations overwrite the KV cache.
    pub fn reset(&mut self) {
        self.n_past = 0;
    }
}

impl<E: Engine> Drop for InferenceSession<E> {
    fn drop(&mut self) {
        self.release();
    }
}

impl<E: Engine> std::fmt::Debug for InferenceSession<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InferenceSession")
            .field("path", &self.path)
            .field("state", &self.state())
            .field("n_ctx", &self.n_ctx)
            .field("n_past", &self.n_past)
            .finish()
    }
}

/// True if `path` opens for reading and is a regular file.
fn is_readable_file(path: &Path) -> bool {
    File::open(path)
        .and_then(|file| file.metadata())
        .map(|meta| meta.is_file())
        .unwrap_or(false)
}
