//! Native llama.cpp backend for the session runtime.
//!
//! Everything here is behind the `llama` feature so the rest of the
//! workspace builds and tests without a native toolchain. All `unsafe`
//! stays inside this crate; callers only see the `InferenceEngine` impl.

#[cfg(feature = "llama")]
mod context;
#[cfg(feature = "llama")]
mod engine;
#[cfg(feature = "llama")]
mod ffi;
#[cfg(feature = "llama")]
mod model;
#[cfg(feature = "llama")]
mod sampler;

#[cfg(feature = "llama")]
pub use context::LlamaContext;
#[cfg(feature = "llama")]
pub use engine::LlamaCppEngine;
#[cfg(feature = "llama")]
pub use model::LlamaModel;
#[cfg(feature = "llama")]
pub use sampler::SamplerChain;
