//! `InferenceEngine` implementation backed by llama.cpp.

use std::ffi::CString;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use ember_abi::{ChatTurn, ContextOptions, InferenceEngine, LlmError, Result, Token};

use crate::context::LlamaContext;
use crate::ffi;
use crate::model::LlamaModel;
use crate::sampler::SamplerChain;

/// The native backend. Stateless itself; all handles live in the
/// associated types.
#[derive(Default)]
pub struct LlamaCppEngine;

impl InferenceEngine for LlamaCppEngine {
    type Model = LlamaModel;
    type Context = LlamaContext;
    type Sampler = SamplerChain;

    fn backend_init(&mut self) {
        unsafe { ffi::init_backend() };
    }

    fn load_model(&mut self, path: &Path) -> Result<Self::Model> {
        LlamaModel::load(path).map_err(LlmError::ModelLoadFailed)
    }

    fn create_context(
        &mut self,
        model: &Self::Model,
        opts: &ContextOptions,
    ) -> Result<Self::Context> {
        LlamaContext::create(model, opts).map_err(LlmError::ContextCreateFailed)
    }

    fn set_threads(&self, ctx: &mut Self::Context, threads: i32, threads_batch: i32) {
        ctx.set_threads(threads, threads_batch);
    }

    fn bind_abort_flag(&self, ctx: &mut Self::Context, flag: Arc<AtomicBool>) {
        ctx.bind_abort_flag(flag);
    }

    fn clear_memory(&self, ctx: &mut Self::Context) {
        ctx.clear_memory();
    }

    fn vocab_available(&self, model: &Self::Model) -> bool {
        model.vocab_available()
    }

    fn chat_template(&self, model: &Self::Model) -> Option<String> {
        model.chat_template()
    }

    fn render_template(
        &self,
        model: &Self::Model,
        template: &str,
        turns: &[ChatTurn],
        add_assistant: bool,
        buf: &mut [u8],
    ) -> i32 {
        // CStrings must stay alive across the FFI call.
        let mut c_turns = Vec::with_capacity(turns.len());
        for turn in turns {
            let role = match CString::new(turn.role.as_str()) {
                Ok(c) => c,
                Err(_) => return -1,
            };
            let content = match CString::new(turn.content.as_str()) {
                Ok(c) => c,
                Err(_) => return -1,
            };
            c_turns.push((role, content));
        }
        model.render_template_into(template, &c_turns, add_assistant, buf)
    }

    fn tokenize(&self, model: &Self::Model, text: &str, out: &mut [Token]) -> i32 {
        let mut ids = vec![0i32; out.len()];
        let n = model.tokenize_into(text, &mut ids);
        if n > 0 {
            for (slot, id) in out.iter_mut().zip(ids.iter().take(n as usize)) {
                *slot = Token(*id);
            }
        }
        n
    }

    fn token_to_piece(&self, model: &Self::Model, token: Token, buf: &mut [u8]) -> i32 {
        model.token_to_piece_into(token, buf)
    }

    fn is_end_of_generation(&self, model: &Self::Model, token: Token) -> bool {
        model.is_eog(token)
    }

    fn decode(&self, ctx: &mut Self::Context, tokens: &[Token]) -> Result<()> {
        ctx.decode(tokens).map_err(LlmError::DecodeFailed)
    }

    fn new_sampler_chain(&self) -> Result<Self::Sampler> {
        SamplerChain::new().map_err(LlmError::SamplerCreateFailed)
    }

    fn chain_add_top_k(&self, chain: &mut Self::Sampler, k: i32) {
        chain.add_top_k(k);
    }

    fn chain_add_top_p(&self, chain: &mut Self::Sampler, p: f32, min_keep: usize) {
        chain.add_top_p(p, min_keep);
    }

    fn chain_add_temperature(&self, chain: &mut Self::Sampler, t: f32) {
        chain.add_temperature(t);
    }

    fn chain_add_dist(&self, chain: &mut Self::Sampler, seed: u32) {
        chain.add_dist(seed);
    }

    fn sample(&self, ctx: &mut Self::Context, chain: &mut Self::Sampler) -> Token {
        chain.sample(ctx)
    }

    fn accept(&self, chain: &mut Self::Sampler, token: Token) {
        chain.accept(token);
    }
}
