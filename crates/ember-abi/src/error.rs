use thiserror::Error;

/// Failure taxonomy for the session runtime. All of these are local,
/// recoverable conditions: the caller re-invokes `load_model` or
/// `start_generation` after fixing the input, nothing aborts the process.
#[derive(Debug, Clone, Error)]
pub enum LlmError {
    #[error("model not loaded")]
    NotLoaded,

    #[error("model load failed: {0}")]
    ModelLoadFailed(String),

    #[error("context creation failed: {0}")]
    ContextCreateFailed(String),

    #[error("prompt needs {required} tokens but the context holds {context_len}")]
    PromptTooLong { required: usize, context_len: usize },

    #[error("tokenization failed")]
    TokenizationFailed,

    #[error("decode failed: {0}")]
    DecodeFailed(String),

    #[error("vocabulary unavailable")]
    VocabularyUnavailable,

    #[error("sampler chain creation failed: {0}")]
    SamplerCreateFailed(String),
}

pub type Result<T> = std::result::Result<T, LlmError>;
