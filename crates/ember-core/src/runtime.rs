//! Model/context ownership and the host-facing serialized facade.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use ember_abi::{ContextOptions, InferenceEngine, LlmError, SamplerOptions};

/// The host-facing runtime: one engine, at most one loaded model/context
/// pair, at most one generation session, all behind a single lock.
///
/// Every public operation holds the lock for its whole duration — the
/// design trades throughput for never observing the model/context/sampler
/// graph in a torn state. The cancellation flag is the one exception: it is
/// written by [`stop_generation`](Self::stop_generation) and
/// [`unload_model`](Self::unload_model) *before* they take the lock, so the
/// engine's abort callback can observe it from inside a decode call that is
/// itself running under the lock.
pub struct LlmRuntime<E: InferenceEngine> {
    inner: Mutex<Inner<E>>,
    cancel: Arc<AtomicBool>,
}

pub(crate) struct Inner<E: InferenceEngine> {
    pub(crate) engine: E,
    pub(crate) backend_ready: bool,
    pub(crate) loaded: Option<Loaded<E>>,
    pub(crate) last_error: Option<String>,
}

/// Everything that lives and dies with one loaded model.
///
/// Field declaration order is load-bearing: Rust drops fields top-down, so
/// the sampler goes first, then the context, and the model last. A sampler
/// or context can therefore never outlive the model whose vocabulary it
/// borrows from inside the engine.
pub(crate) struct Loaded<E: InferenceEngine> {
    pub(crate) session: GenState<E::Sampler>,
    pub(crate) context: E::Context,
    pub(crate) context_len: usize,
    pub(crate) threads: i32,
    pub(crate) threads_batch: i32,
    pub(crate) model: E::Model,
}

/// Incremental-session bookkeeping. `sampler.is_some()` *is* the Active
/// state; there is no separate flag that could disagree with it.
pub(crate) struct GenState<S> {
    pub(crate) sampler: Option<S>,
    pub(crate) generated: u32,
    pub(crate) max_tokens: u32,
    pub(crate) started: Instant,
    pub(crate) last_tps: f64,
}

impl<S> GenState<S> {
    fn empty() -> Self {
        Self {
            sampler: None,
            generated: 0,
            max_tokens: 0,
            started: Instant::now(),
            last_tps: 0.0,
        }
    }
}

impl<E: InferenceEngine> LlmRuntime<E> {
    pub fn new(engine: E) -> Self {
        Self {
            inner: Mutex::new(Inner {
                engine,
                backend_ready: false,
                loaded: None,
                last_error: None,
            }),
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// One-time process-wide engine setup. Idempotent; always succeeds.
    pub fn init_backend(&self) -> bool {
        let mut inner = self.inner.lock().unwrap();
        inner.ensure_backend();
        true
    }

    /// Load a model and create its execution context, tearing down any
    /// previously loaded pair (and its session) first. `context_len <= 0`
    /// selects 2048; `threads <= 0` selects 4.
    pub fn load_model(&self, path: &Path, context_len: i32, threads: i32) -> bool {
        let mut inner = self.inner.lock().unwrap();
        match inner.load(&self.cancel, path, context_len, threads) {
            Ok(()) => true,
            Err(e) => {
                eprintln!("❌ [runtime] Load failed: {e}");
                inner.last_error = Some(e.to_string());
                false
            }
        }
    }

    /// Release the session, context, and model. Safe when nothing is loaded.
    pub fn unload_model(&self) {
        self.cancel.store(true, Ordering::Relaxed);
        let mut inner = self.inner.lock().unwrap();
        if inner.loaded.take().is_some() {
            println!("🧹 [runtime] Model unloaded");
        }
    }

    /// One-shot generation: prime the prompt (no chat templating) and run
    /// the decode loop to completion in this call. On failure the returned
    /// text is a human-readable `error: …` string.
    pub fn generate(&self, prompt: &str, opts: &SamplerOptions, max_tokens: i32) -> String {
        let mut inner = self.inner.lock().unwrap();
        match inner.one_shot(&self.cancel, prompt, opts, max_tokens) {
            Ok(text) => text,
            Err(e) => {
                inner.last_error = Some(e.to_string());
                format!("error: {e}")
            }
        }
    }

    /// Begin an incremental session: template + tokenize + prime the
    /// prompt, then build the sampler chain. `false` leaves the session
    /// idle with no partial state.
    pub fn start_generation(&self, prompt: &str, opts: &SamplerOptions, max_tokens: i32) -> bool {
        let mut inner = self.inner.lock().unwrap();
        match inner.start(&self.cancel, prompt, opts, max_tokens) {
            Ok(()) => true,
            Err(e) => {
                eprintln!("❌ [session] Start failed: {e}");
                inner.last_error = Some(e.to_string());
                false
            }
        }
    }

    /// Advance the active session by at most one token. Returns the decoded
    /// fragment, or an empty string once the session has terminated (or was
    /// never active).
    pub fn next_token(&self) -> String {
        let mut inner = self.inner.lock().unwrap();
        inner.step(&self.cancel)
    }

    /// Tokens per second measured over the current or most recent session;
    /// `0.0` when nothing has been measured yet.
    pub fn last_throughput(&self) -> f64 {
        let inner = self.inner.lock().unwrap();
        inner
            .loaded
            .as_ref()
            .map(|l| l.session.last_tps)
            .unwrap_or(0.0)
    }

    /// Cooperatively cancel the active session. The flag is set before the
    /// lock is taken so an in-flight decode observes it immediately; the
    /// sampler is then released under the lock. Idempotent.
    pub fn stop_generation(&self) {
        self.cancel.store(true, Ordering::Relaxed);
        let mut inner = self.inner.lock().unwrap();
        if let Some(loaded) = inner.loaded.as_mut() {
            if loaded.session.sampler.take().is_some() {
                println!("⏹️ [session] Stopped");
            }
        }
    }

    /// Drive a full incremental session in this call, invoking `on_delta`
    /// for every non-empty fragment. The lock is re-acquired per step, so a
    /// concurrent [`stop_generation`](Self::stop_generation) also takes
    /// effect between steps. Returns the accumulated text, or `None` when
    /// the session could not start.
    pub fn generate_stream<F>(
        &self,
        prompt: &str,
        opts: &SamplerOptions,
        max_tokens: i32,
        mut on_delta: F,
    ) -> Option<String>
    where
        F: FnMut(&str),
    {
        if !self.start_generation(prompt, opts, max_tokens) {
            return None;
        }
        let mut out = String::new();
        loop {
            let piece = self.next_token();
            if piece.is_empty() {
                break;
            }
            on_delta(&piece);
            out.push_str(&piece);
        }
        Some(out)
    }

    /// Rendering of the most recent failure, for hosts that only see the
    /// sentinel return values.
    pub fn last_error(&self) -> Option<String> {
        self.inner.lock().unwrap().last_error.clone()
    }
}

impl<E: InferenceEngine> Inner<E> {
    pub(crate) fn ensure_backend(&mut self) {
        if !self.backend_ready {
            self.engine.backend_init();
            self.backend_ready = true;
        }
    }

    fn load(
        &mut self,
        cancel: &Arc<AtomicBool>,
        path: &Path,
        context_len: i32,
        threads: i32,
    ) -> Result<(), LlmError> {
        self.ensure_backend();

        // Full teardown before anything new is built; a failed load must
        // leave the runtime empty, not holding the previous model.
        self.loaded = None;
        cancel.store(false, Ordering::Relaxed);

        println!("📦 [runtime] Loading model: {}", path.display());
        let model = self.engine.load_model(path)?;

        let opts = ContextOptions::resolve(context_len, threads);
        let mut context = self.engine.create_context(&model, &opts)?;

        self.engine
            .set_threads(&mut context, opts.threads, opts.threads_batch);
        self.engine.bind_abort_flag(&mut context, Arc::clone(cancel));
        self.engine.clear_memory(&mut context);

        self.loaded = Some(Loaded {
            session: GenState::empty(),
            context,
            context_len: opts.context_len as usize,
            threads: opts.threads,
            threads_batch: opts.threads_batch,
            model,
        });
        Ok(())
    }
}
