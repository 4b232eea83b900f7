use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use crate::chat::ChatTurn;
use crate::error::Result;
use crate::sampling::ContextOptions;
use crate::token::Token;

/// Backend-agnostic interface to an inference engine.
///
/// The session core owns exactly one engine value and drives everything
/// through it; the associated types let each backend keep its own handle
/// representations (raw pointers, test doubles) without the core caring.
/// Drop of a `Context` or `Sampler` must release whatever the engine
/// allocated for it, and a `Context` must never be used after its `Model`
/// is gone — the core enforces that ordering structurally.
///
/// Two calls follow the llama.cpp size-probe convention rather than
/// returning `Result`s, because the probe itself is the contract:
/// [`tokenize`](Self::tokenize) and [`render_template`](Self::render_template)
/// report the exact required size when the destination is too small, and the
/// caller regrows once and retries.
pub trait InferenceEngine {
    type Model;
    type Context;
    type Sampler;

    /// Process-wide runtime setup. Called at most once per process by the
    /// core; backends with their own global state should still guard it.
    fn backend_init(&mut self);

    /// Load model weights for CPU execution. No partial state on failure.
    fn load_model(&mut self, path: &Path) -> Result<Self::Model>;

    /// Create an execution context bound to `model`.
    fn create_context(&mut self, model: &Self::Model, opts: &ContextOptions)
    -> Result<Self::Context>;

    /// Re-apply decode thread counts on an existing context.
    fn set_threads(&self, ctx: &mut Self::Context, threads: i32, threads_batch: i32);

    /// Install `flag` as the context's abort observer. The engine polls it
    /// from inside decode calls; reads are lock-free by design.
    fn bind_abort_flag(&self, ctx: &mut Self::Context, flag: Arc<AtomicBool>);

    /// Clear the context's execution memory (KV state) without destroying it.
    fn clear_memory(&self, ctx: &mut Self::Context);

    /// Whether the model's vocabulary view is usable.
    fn vocab_available(&self, model: &Self::Model) -> bool;

    /// The model's declared chat template, if it has one.
    fn chat_template(&self, model: &Self::Model) -> Option<String>;

    /// Render `turns` through `template` into `buf`. Returns the total
    /// rendered length in bytes; a value `>= buf.len()` means the output did
    /// not fit and the caller must regrow to exactly that length and retry.
    /// Non-positive means the template could not be rendered.
    fn render_template(
        &self,
        model: &Self::Model,
        template: &str,
        turns: &[ChatTurn],
        add_assistant: bool,
        buf: &mut [u8],
    ) -> i32;

    /// Tokenize `text` (special/control tokens enabled) into `out`. Returns
    /// the token count, or `-count` when `out` is too small, where `count`
    /// is the exact number of tokens required.
    fn tokenize(&self, model: &Self::Model, text: &str, out: &mut [Token]) -> i32;

    /// Convert one token to its UTF-8 fragment bytes. Returns the byte
    /// count; non-positive means the token renders to nothing.
    fn token_to_piece(&self, model: &Self::Model, token: Token, buf: &mut [u8]) -> i32;

    /// Whether `token` signals natural end of generation.
    fn is_end_of_generation(&self, model: &Self::Model, token: Token) -> bool;

    /// Decode `tokens` as one batch, extending the context's sequence.
    fn decode(&self, ctx: &mut Self::Context, tokens: &[Token]) -> Result<()>;

    // ---- sampler chain stages ------------------------------------------
    //
    // The core assembles the chain itself so stage order stays its
    // decision; backends only provide the individual transforms.

    fn new_sampler_chain(&self) -> Result<Self::Sampler>;
    fn chain_add_top_k(&self, chain: &mut Self::Sampler, k: i32);
    fn chain_add_top_p(&self, chain: &mut Self::Sampler, p: f32, min_keep: usize);
    fn chain_add_temperature(&self, chain: &mut Self::Sampler, t: f32);
    fn chain_add_dist(&self, chain: &mut Self::Sampler, seed: u32);

    /// Draw the next token from the context's current logits.
    fn sample(&self, ctx: &mut Self::Context, chain: &mut Self::Sampler) -> Token;

    /// Feed the drawn token back into the chain's internal state.
    fn accept(&self, chain: &mut Self::Sampler, token: Token);
}
