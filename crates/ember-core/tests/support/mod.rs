//! Scripted engine double shared by the integration tests. Tokenization is
//! one token per whitespace-separated word (ids 100, 101, ...), sampling
//! replays a scripted id sequence and falls back to the end-of-generation
//! id once the script runs dry. Every call is recorded in a shared log so
//! tests can assert on call order, buffer sizing, and handle teardown.
#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};

use ember_abi::{ChatTurn, ContextOptions, InferenceEngine, LlmError, Result, Token};
use ember_core::LlmRuntime;

/// Id that terminates generation naturally.
pub const EOG: i32 = 2;

#[derive(Clone, Default)]
pub struct EngineScript {
    pub fail_load: Option<String>,
    pub fail_context: Option<String>,
    pub fail_sampler: Option<String>,
    pub no_vocab: bool,
    pub template: Option<String>,
    /// Token ids the sampler yields, in order.
    pub sampled: Vec<i32>,
    /// Ids whose piece renders to zero bytes.
    pub silent: Vec<i32>,
    /// Fail the nth decode call (0 = the prompt prime) with a scripted error.
    pub fail_decode_at: Option<usize>,
    /// Set the bound abort flag during the nth decode call, standing in for
    /// the engine's abort callback observing a concurrent stop.
    pub set_flag_at_decode: Option<usize>,
}

#[derive(Default)]
pub struct CallLog {
    pub backend_inits: usize,
    pub clears: usize,
    pub thread_sets: Vec<(i32, i32)>,
    /// Batch sizes of every decode call, in order.
    pub decode_batches: Vec<usize>,
    /// Destination sizes of every tokenize call, in order.
    pub tokenize_buf_lens: Vec<usize>,
    pub tokenized_texts: Vec<String>,
    /// Destination sizes of every template render call, in order.
    pub render_buf_lens: Vec<usize>,
    pub chain_stages: Vec<String>,
    pub accepted: Vec<i32>,
    pub models_dropped: usize,
    pub contexts_dropped: usize,
    pub samplers_dropped: usize,
}

pub struct ScriptedEngine {
    script: EngineScript,
    log: Arc<Mutex<CallLog>>,
}

pub struct MockModel {
    script: EngineScript,
    log: Arc<Mutex<CallLog>>,
}

pub struct MockContext {
    script: EngineScript,
    log: Arc<Mutex<CallLog>>,
    pub flag: Option<Arc<AtomicBool>>,
    decodes: usize,
}

pub struct MockSampler {
    sampled: Vec<i32>,
    cursor: usize,
    log: Arc<Mutex<CallLog>>,
}

impl Drop for MockModel {
    fn drop(&mut self) {
        self.log.lock().unwrap().models_dropped += 1;
    }
}

impl Drop for MockContext {
    fn drop(&mut self) {
        self.log.lock().unwrap().contexts_dropped += 1;
    }
}

impl Drop for MockSampler {
    fn drop(&mut self) {
        self.log.lock().unwrap().samplers_dropped += 1;
    }
}

impl InferenceEngine for ScriptedEngine {
    type Model = MockModel;
    type Context = MockContext;
    type Sampler = MockSampler;

    fn backend_init(&mut self) {
        self.log.lock().unwrap().backend_inits += 1;
    }

    fn load_model(&mut self, _path: &Path) -> Result<MockModel> {
        if let Some(msg) = &self.script.fail_load {
            return Err(LlmError::ModelLoadFailed(msg.clone()));
        }
        Ok(MockModel {
            script: self.script.clone(),
            log: Arc::clone(&self.log),
        })
    }

    fn create_context(&mut self, _model: &MockModel, _opts: &ContextOptions) -> Result<MockContext> {
        if let Some(msg) = &self.script.fail_context {
            return Err(LlmError::ContextCreateFailed(msg.clone()));
        }
        Ok(MockContext {
            script: self.script.clone(),
            log: Arc::clone(&self.log),
            flag: None,
            decodes: 0,
        })
    }

    fn set_threads(&self, _ctx: &mut MockContext, threads: i32, threads_batch: i32) {
        self.log.lock().unwrap().thread_sets.push((threads, threads_batch));
    }

    fn bind_abort_flag(&self, ctx: &mut MockContext, flag: Arc<AtomicBool>) {
        ctx.flag = Some(flag);
    }

    fn clear_memory(&self, _ctx: &mut MockContext) {
        self.log.lock().unwrap().clears += 1;
    }

    fn vocab_available(&self, model: &MockModel) -> bool {
        !model.script.no_vocab
    }

    fn chat_template(&self, model: &MockModel) -> Option<String> {
        model.script.template.clone()
    }

    fn render_template(
        &self,
        _model: &MockModel,
        template: &str,
        turns: &[ChatTurn],
        _add_assistant: bool,
        buf: &mut [u8],
    ) -> i32 {
        self.log.lock().unwrap().render_buf_lens.push(buf.len());
        let joined: Vec<&str> = turns.iter().map(|t| t.content.as_str()).collect();
        let rendered = format!("{template}|{}", joined.join("|"));
        let bytes = rendered.as_bytes();
        if bytes.len() >= buf.len() {
            return bytes.len() as i32;
        }
        buf[..bytes.len()].copy_from_slice(bytes);
        bytes.len() as i32
    }

    fn tokenize(&self, _model: &MockModel, text: &str, out: &mut [Token]) -> i32 {
        {
            let mut log = self.log.lock().unwrap();
            log.tokenize_buf_lens.push(out.len());
            log.tokenized_texts.push(text.to_string());
        }
        let needed = text.split_whitespace().count();
        if needed == 0 {
            return 0;
        }
        if out.len() < needed {
            return -(needed as i32);
        }
        for (i, slot) in out.iter_mut().take(needed).enumerate() {
            *slot = Token(100 + i as i32);
        }
        needed as i32
    }

    fn token_to_piece(&self, model: &MockModel, token: Token, buf: &mut [u8]) -> i32 {
        if model.script.silent.contains(&token.raw()) {
            return 0;
        }
        let piece = format!("<{}>", token.raw());
        let bytes = piece.as_bytes();
        buf[..bytes.len()].copy_from_slice(bytes);
        bytes.len() as i32
    }

    fn is_end_of_generation(&self, _model: &MockModel, token: Token) -> bool {
        token.raw() == EOG
    }

    fn decode(&self, ctx: &mut MockContext, tokens: &[Token]) -> Result<()> {
        let index = ctx.decodes;
        ctx.decodes += 1;
        self.log.lock().unwrap().decode_batches.push(tokens.len());
        if ctx.script.set_flag_at_decode == Some(index) {
            if let Some(flag) = &ctx.flag {
                flag.store(true, std::sync::atomic::Ordering::Relaxed);
            }
        }
        if ctx.script.fail_decode_at == Some(index) {
            return Err(LlmError::DecodeFailed("scripted decode failure".into()));
        }
        Ok(())
    }

    fn new_sampler_chain(&self) -> Result<MockSampler> {
        if let Some(msg) = &self.script.fail_sampler {
            return Err(LlmError::SamplerCreateFailed(msg.clone()));
        }
        Ok(MockSampler {
            sampled: self.script.sampled.clone(),
            cursor: 0,
            log: Arc::clone(&self.log),
        })
    }

    fn chain_add_top_k(&self, _chain: &mut MockSampler, k: i32) {
        self.log.lock().unwrap().chain_stages.push(format!("top_k:{k}"));
    }

    fn chain_add_top_p(&self, _chain: &mut MockSampler, p: f32, min_keep: usize) {
        self.log
            .lock()
            .unwrap()
            .chain_stages
            .push(format!("top_p:{p}:{min_keep}"));
    }

    fn chain_add_temperature(&self, _chain: &mut MockSampler, t: f32) {
        self.log.lock().unwrap().chain_stages.push(format!("temp:{t}"));
    }

    fn chain_add_dist(&self, _chain: &mut MockSampler, _seed: u32) {
        self.log.lock().unwrap().chain_stages.push("dist".to_string());
    }

    fn sample(&self, _ctx: &mut MockContext, chain: &mut MockSampler) -> Token {
        let id = chain.sampled.get(chain.cursor).copied().unwrap_or(EOG);
        chain.cursor += 1;
        Token(id)
    }

    fn accept(&self, _chain: &mut MockSampler, token: Token) {
        self.log.lock().unwrap().accepted.push(token.raw());
    }
}

/// Runtime around a fresh scripted engine plus the shared call log.
pub fn runtime_with(script: EngineScript) -> (LlmRuntime<ScriptedEngine>, Arc<Mutex<CallLog>>) {
    let log = Arc::new(Mutex::new(CallLog::default()));
    let engine = ScriptedEngine {
        script,
        log: Arc::clone(&log),
    };
    (LlmRuntime::new(engine), log)
}

/// Same, with a model already loaded at the default context length.
pub fn loaded_runtime(script: EngineScript) -> (LlmRuntime<ScriptedEngine>, Arc<Mutex<CallLog>>) {
    let (rt, log) = runtime_with(script);
    assert!(rt.load_model(Path::new("model.gguf"), 0, 0));
    (rt, log)
}
