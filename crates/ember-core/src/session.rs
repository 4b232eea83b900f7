//! The generation session state machine: one decode step per external call
//! on the incremental path, or the whole loop at once on the one-shot path.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use ember_abi::{InferenceEngine, LlmError, SamplerOptions};

use crate::runtime::{Inner, Loaded};
use crate::{prompt, sampler};

/// Fallback generation bound when the caller passes `max_tokens <= 0`.
const DEFAULT_MAX_TOKENS: u32 = 256;

/// Per-token text fragments rarely exceed a handful of bytes; 256 matches
/// the widest pieces real vocabularies produce.
const PIECE_BUF_LEN: usize = 256;

impl<E: InferenceEngine> Inner<E> {
    /// Transition Idle → Active: reset the flag and counters, clear
    /// execution memory, prime the templated prompt in one batch, build the
    /// sampler chain. Any failure leaves the session Idle with no partial
    /// state — the chain is only installed as the very last step.
    pub(crate) fn start(
        &mut self,
        cancel: &AtomicBool,
        prompt_text: &str,
        opts: &SamplerOptions,
        max_tokens: i32,
    ) -> Result<(), LlmError> {
        let Inner { engine, loaded, .. } = self;
        let loaded = loaded.as_mut().ok_or(LlmError::NotLoaded)?;
        let Loaded {
            session,
            context,
            context_len,
            threads,
            threads_batch,
            model,
        } = loaded;

        cancel.store(false, Ordering::Relaxed);
        session.sampler = None;
        session.generated = 0;
        session.max_tokens = if max_tokens > 0 {
            max_tokens as u32
        } else {
            DEFAULT_MAX_TOKENS
        };
        session.last_tps = 0.0;
        session.started = Instant::now();

        engine.clear_memory(context);
        engine.set_threads(context, *threads, *threads_batch);

        if !engine.vocab_available(model) {
            return Err(LlmError::VocabularyUnavailable);
        }

        let tokens = prompt::prepare(&*engine, model, prompt_text, *context_len, true)?;
        engine.decode(context, &tokens)?;

        session.sampler = Some(sampler::build_chain(&*engine, opts)?);
        println!(
            "🧠 [session] Primed {} prompt tokens (max {} out)",
            tokens.len(),
            session.max_tokens
        );
        Ok(())
    }

    /// Advance an Active session by at most one token and return its text
    /// fragment. Empty return = session not Active, terminal condition hit
    /// this call, or the drawn token rendered to zero bytes (which neither
    /// counts against the budget nor terminates).
    pub(crate) fn step(&mut self, cancel: &AtomicBool) -> String {
        let Inner {
            engine,
            loaded,
            last_error,
            ..
        } = self;
        let Some(loaded) = loaded.as_mut() else {
            return String::new();
        };
        let Loaded {
            session,
            context,
            model,
            ..
        } = loaded;

        if session.sampler.is_none() {
            return String::new();
        }
        if cancel.load(Ordering::Relaxed) || session.generated >= session.max_tokens {
            session.sampler = None;
            return String::new();
        }
        let Some(chain) = session.sampler.as_mut() else {
            return String::new();
        };

        let token = engine.sample(context, chain);
        engine.accept(chain, token);

        if engine.is_end_of_generation(model, token) {
            session.sampler = None;
            return String::new();
        }

        let mut buf = [0u8; PIECE_BUF_LEN];
        let n = engine.token_to_piece(model, token, &mut buf);
        if n <= 0 {
            // Zero-byte fragment: no progress, no termination.
            return String::new();
        }

        if let Err(e) = engine.decode(context, &[token]) {
            eprintln!("❌ [session] Decode failed mid-step: {e}");
            *last_error = Some(e.to_string());
            session.sampler = None;
            return String::new();
        }

        session.generated += 1;
        let elapsed = session.started.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            session.last_tps = session.generated as f64 / elapsed;
        }
        String::from_utf8_lossy(&buf[..n as usize]).into_owned()
    }

    /// One-shot generation: prime the raw prompt (no templating) and run
    /// the per-token loop to termination in this call. The chain lives on
    /// this frame and is dropped unconditionally at loop exit; the
    /// incremental session's counters and throughput are never touched.
    pub(crate) fn one_shot(
        &mut self,
        cancel: &AtomicBool,
        prompt_text: &str,
        opts: &SamplerOptions,
        max_tokens: i32,
    ) -> Result<String, LlmError> {
        let Inner { engine, loaded, .. } = self;
        let loaded = loaded.as_mut().ok_or(LlmError::NotLoaded)?;
        let Loaded {
            context,
            context_len,
            model,
            ..
        } = loaded;

        cancel.store(false, Ordering::Relaxed);
        engine.clear_memory(context);

        let tokens = prompt::prepare(&*engine, model, prompt_text, *context_len, false)?;
        engine.decode(context, &tokens)?;

        let mut chain = sampler::build_chain(&*engine, opts)?;
        let mut out = String::new();
        for _ in 0..max_tokens.max(0) {
            if cancel.load(Ordering::Relaxed) {
                break;
            }
            let token = engine.sample(context, &mut chain);
            engine.accept(&mut chain, token);
            if engine.is_end_of_generation(model, token) {
                break;
            }
            let mut buf = [0u8; PIECE_BUF_LEN];
            let n = engine.token_to_piece(model, token, &mut buf);
            if n > 0 {
                out.push_str(&String::from_utf8_lossy(&buf[..n as usize]));
            }
            if engine.decode(context, &[token]).is_err() {
                break;
            }
        }
        Ok(out)
    }
}
