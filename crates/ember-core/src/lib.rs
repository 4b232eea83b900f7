//! Session lifecycle and incremental-generation core.
//!
//! One [`LlmRuntime`] owns at most one loaded model + execution context and
//! at most one generation session at a time. Every public operation is
//! serialized behind a single lock; the only state readable outside it is
//! the cancellation flag, which the engine's abort callback polls
//! mid-decode. The inference engine itself is reached exclusively through
//! the [`ember_abi::InferenceEngine`] trait.

pub mod prompt;
pub mod runtime;
pub mod sampler;
mod session;

pub use ember_abi::{ChatTurn, LlmError, Role, SamplerOptions, Token};
pub use runtime::LlmRuntime;
