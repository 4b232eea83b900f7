//! Prompt preparation: chat templating plus tokenization, both built on the
//! engine's probe-then-resize sizing convention.

use ember_abi::{ChatTurn, InferenceEngine, LlmError, Token};

/// What one sized-buffer attempt reported.
enum Probe {
    /// Final answer; payload is the attempt's raw return value.
    Done(i32),
    /// Destination too small; payload is the exact element count required.
    Grow(usize),
}

/// Result of [`fill_with_exact_resize`].
enum Fill {
    Final(i32),
    /// The reported requirement exceeded `cap` before any retry happened.
    OverCap(usize),
}

/// Run `op` against `buf`; when it reports an exact required size, resize to
/// exactly that size and retry once — never a loop. A `cap` bounds the
/// regrowth: requirements beyond it fail without retrying. Both the
/// tokenizer and the template renderer speak this convention, they just
/// encode "too small" differently, which their closures translate.
fn fill_with_exact_resize<T: Clone>(
    buf: &mut Vec<T>,
    fill: T,
    cap: Option<usize>,
    mut op: impl FnMut(&mut [T]) -> Probe,
) -> Fill {
    let required = match op(buf) {
        Probe::Done(n) => return Fill::Final(n),
        Probe::Grow(required) => required,
    };
    if let Some(cap) = cap {
        if required > cap {
            return Fill::OverCap(required);
        }
    }
    buf.resize(required, fill);
    match op(buf) {
        Probe::Done(n) => Fill::Final(n),
        // A second undersize report breaks the exact-size contract; treat
        // it as a permanent failure rather than retrying again.
        Probe::Grow(_) => Fill::Final(-1),
    }
}

/// Initial tokenizer buffer: ~4 bytes per token is a safe guess for most
/// vocabularies; the exact-resize retry covers the rest.
fn token_buf_guess(text_len: usize, context_len: usize) -> usize {
    (text_len / 4).max(16).min(context_len.max(1))
}

/// Render `raw` as a single user turn through the model's chat template and
/// tokenize the result (special tokens enabled). With `apply_template`
/// false, or when the model declares no template, the raw text is tokenized
/// unmodified.
///
/// Errors: [`LlmError::PromptTooLong`] when the exact required token count
/// exceeds `context_len`, [`LlmError::TokenizationFailed`] when the
/// tokenizer reports nothing usable.
pub fn prepare<E: InferenceEngine>(
    engine: &E,
    model: &E::Model,
    raw: &str,
    context_len: usize,
    apply_template: bool,
) -> Result<Vec<Token>, LlmError> {
    let text = if apply_template {
        render_user_turn(engine, model, raw)
    } else {
        raw.to_string()
    };
    tokenize_exact(engine, model, &text, context_len)
}

/// Apply the model's template to one "user" turn, if the model has one.
/// The renderer reports its required size only through an overflowing
/// return value (`res >= buf.len()`), never up front. Falls back to the
/// raw text whenever rendering reports nothing.
fn render_user_turn<E: InferenceEngine>(engine: &E, model: &E::Model, raw: &str) -> String {
    let Some(template) = engine.chat_template(model) else {
        return raw.to_string();
    };
    let turns = [ChatTurn::user(raw)];

    let mut buf = vec![0u8; raw.len() * 2 + 256];
    let res = fill_with_exact_resize(&mut buf, 0u8, None, |b| {
        let len = b.len();
        match engine.render_template(model, &template, &turns, true, b) {
            res if res > 0 && res as usize >= len => Probe::Grow(res as usize + 1),
            res => Probe::Done(res),
        }
    });
    match res {
        Fill::Final(n) if n > 0 => String::from_utf8_lossy(&buf[..n as usize]).into_owned(),
        _ => raw.to_string(),
    }
}

/// Tokenize with the negative-count-means-required-size convention.
fn tokenize_exact<E: InferenceEngine>(
    engine: &E,
    model: &E::Model,
    text: &str,
    context_len: usize,
) -> Result<Vec<Token>, LlmError> {
    let mut tokens = vec![Token(0); token_buf_guess(text.len(), context_len)];
    let res = fill_with_exact_resize(&mut tokens, Token(0), Some(context_len), |b| {
        match engine.tokenize(model, text, b) {
            n if n < 0 => Probe::Grow((-n) as usize),
            n => Probe::Done(n),
        }
    });
    match res {
        Fill::OverCap(required) => Err(LlmError::PromptTooLong {
            required,
            context_len,
        }),
        Fill::Final(n) if n > 0 => {
            tokens.truncate(n as usize);
            Ok(tokens)
        }
        Fill::Final(_) => Err(LlmError::TokenizationFailed),
    }
}
