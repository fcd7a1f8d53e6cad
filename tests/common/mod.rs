//! Recording fake engine shared by the integration tests.

#![allow(dead_code)]

use std::collections::HashSet;
use std::ffi::CStr;
use std::path::Path;
use std::sync::{Arc, Mutex};

use llama_session::{Engine, NativeParams, Token, DEFAULT_SEED, MAX_DEVICES};
use tempfile::NamedTempFile;

/// One native call as seen by the fake engine.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    DefaultParams,
    LoadModel { path: String, params: NativeParams },
    NewContext { model: u32, params: NativeParams },
    FreeContext(u32),
    FreeModel(u32),
    NCtx(u32),
    Tokenize { context: u32, text: String, capacity: usize },
    Eval { context: u32, n_tokens: usize, n_past: i32, n_threads: i32 },
}

pub struct FakeModel(u32);

pub struct FakeContext {
    id: u32,
    n_ctx: i32,
}

#[derive(Default)]
struct State {
    calls: Vec<Call>,
    next_id: u32,
    live_models: HashSet<u32>,
    live_contexts: HashSet<u32>,
    fail_load: bool,
    fail_context: bool,
    max_devices: Option<usize>,
    /// Fail the eval call with this index (0-based) with the given status.
    fail_eval: Option<(usize, i32)>,
    evals: usize,
}

/// Fake engine that records every call and panics on a double free.
#[derive(Clone, Default)]
pub struct RecordingEngine {
    state: Arc<Mutex<State>>,
}

impl RecordingEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_load() -> Self {
        let engine = Self::new();
        engine.state.lock().unwrap().fail_load = true;
        engine
    }

    pub fn failing_context() -> Self {
        let engine = Self::new();
        engine.state.lock().unwrap().fail_context = true;
        engine
    }

    /// Engine built for at most `max` devices.
    pub fn with_max_devices(max: usize) -> Self {
        let engine = Self::new();
        engine.state.lock().unwrap().max_devices = Some(max);
        engine
    }

    pub fn fail_eval_at(&self, index: usize, status: i32) {
        self.state.lock().unwrap().fail_eval = Some((index, status));
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn live_handles(&self) -> (usize, usize) {
        let state = self.state.lock().unwrap();
        (state.live_models.len(), state.live_contexts.len())
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls().iter().filter(|c| pred(c)).count()
    }

    fn record(&self, call: Call) {
        self.state.lock().unwrap().calls.push(call);
    }
}

impl Engine for RecordingEngine {
    type Model = FakeModel;
    type Context = FakeContext;

    fn default_params(&self) -> NativeParams {
        self.record(Call::DefaultParams);
        NativeParams {
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

    fn load_model_from_file(&self, path: &CStr, params: &NativeParams) -> Option<FakeModel> {
        self.record(Call::LoadModel {
            path: path.to_string_lossy().into_owned(),
            params: params.clone(),
        });
        let mut state = self.state.lock().unwrap();
        if state.fail_load {
            return None;
        }
        state.next_id += 1;
        let id = state.next_id;
        state.live_models.insert(id);
        Some(FakeModel(id))
    }

    fn new_context_with_model(
        &self,
        model: &FakeModel,
        params: &NativeParams,
    ) -> Option<FakeContext> {
        self.record(Call::NewContext {
            model: model.0,
            params: params.clone(),
        });
        let mut state = self.state.lock().unwrap();
        assert!(state.live_models.contains(&model.0), "context for a freed model");
        if state.fail_context {
            return None;
        }
        state.next_id += 1;
        let id = state.next_id;
        state.live_contexts.insert(id);
        Some(FakeContext {
            id,
            n_ctx: params.n_ctx,
        })
    }

    fn free_context(&self, context: FakeContext) {
        self.record(Call::FreeContext(context.id));
        let removed = self.state.lock().unwrap().live_contexts.remove(&context.id);
        assert!(removed, "context {} freed twice", context.id);
    }

    fn free_model(&self, model: FakeModel) {
        self.record(Call::FreeModel(model.0));
        let removed = self.state.lock().unwrap().live_models.remove(&model.0);
        assert!(removed, "model {} freed twice", model.0);
    }

    fn max_devices(&self) -> usize {
        self.state
            .lock()
            .unwrap()
            .max_devices
            .unwrap_or(MAX_DEVICES)
    }

    fn n_ctx(&self, context: &FakeContext) -> i32 {
        self.record(Call::NCtx(context.id));
        context.n_ctx
    }

    /// One token per byte, plus one for BOS.
    fn tokenize(
        &self,
        context: &mut FakeContext,
        text: &CStr,
        tokens: &mut [Token],
        add_bos: bool,
    ) -> i32 {
        self.record(Call::Tokenize {
            context: context.id,
            text: text.to_string_lossy().into_owned(),
            capacity: tokens.len(),
        });

        let mut out: Vec<Token> = Vec::new();
        if add_bos {
            out.push(1);
        }
        out.extend(text.to_bytes().iter().map(|b| *b as Token + 100));

        if out.len() > tokens.len() {
            return -(out.len() as i32);
        }
        tokens[..out.len()].copy_from_slice(&out);
        out.len() as i32
    }

    fn eval(
        &self,
        context: &mut FakeContext,
        tokens: &[Token],
        n_past: i32,
        n_threads: i32,
    ) -> i32 {
        self.record(Call::Eval {
            context: context.id,
            n_tokens: tokens.len(),
            n_past,
            n_threads,
        });
        let mut state = self.state.lock().unwrap();
        let index = state.evals;
        state.evals += 1;
        match state.fail_eval {
            Some((at, status)) if at == index => status,
            _ => 0,
        }
    }
}

/// A file on disk that stands in for a model.
pub fn model_file() -> NamedTempFile {
    let file = tempfile::Builder::new()
        .suffix(".gguf")
        .tempfile()
        .expect("create temp model file");
    std::fs::write(file.path(), b"GGUF\x02\x00\x00\x00").expect("write temp model file");
    file
}

pub fn path_string(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
