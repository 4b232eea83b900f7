use serde::{Deserialize, Serialize};

/// User-tunable sampling knobs passed from the host to the session core.
///
/// Zero or negative values mean "use the default", not "disable": the host
/// boundary this crate serves has no way to express absence, so the floors
/// below are applied before a chain is ever built.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SamplerOptions {
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: i32,
}

impl SamplerOptions {
    pub const DEFAULT_TEMPERATURE: f32 = 0.7;
    pub const DEFAULT_TOP_P: f32 = 0.9;
    pub const DEFAULT_TOP_K: i32 = 40;

    /// Returns a copy with every non-positive knob replaced by its default.
    pub fn floored(&self) -> Self {
        Self {
            temperature: if self.temperature > 0.0 {
                self.temperature
            } else {
                Self::DEFAULT_TEMPERATURE
            },
            top_p: if self.top_p > 0.0 {
                self.top_p
            } else {
                Self::DEFAULT_TOP_P
            },
            top_k: if self.top_k > 0 {
                self.top_k
            } else {
                Self::DEFAULT_TOP_K
            },
        }
    }
}

impl Default for SamplerOptions {
    fn default() -> Self {
        Self {
            temperature: Self::DEFAULT_TEMPERATURE,
            top_p: Self::DEFAULT_TOP_P,
            top_k: Self::DEFAULT_TOP_K,
        }
    }
}

/// Context-creation knobs resolved by the model manager before a context
/// exists. Batch size is always `min(512, context_len)`.
#[derive(Debug, Clone, Copy)]
pub struct ContextOptions {
    pub context_len: u32,
    pub batch_size: u32,
    pub threads: i32,
    pub threads_batch: i32,
}

impl ContextOptions {
    pub const DEFAULT_CONTEXT_LEN: u32 = 2048;
    pub const DEFAULT_THREADS: i32 = 4;
    pub const MAX_BATCH: u32 = 512;

    /// Resolve raw host-supplied values (`<= 0` selects the default).
    pub fn resolve(context_len: i32, threads: i32) -> Self {
        let context_len = if context_len > 0 {
            context_len as u32
        } else {
            Self::DEFAULT_CONTEXT_LEN
        };
        let threads = if threads > 0 {
            threads
        } else {
            Self::DEFAULT_THREADS
        };
        Self {
            context_len,
            batch_size: Self::MAX_BATCH.min(context_len),
            threads,
            threads_batch: threads,
        }
    }
}
