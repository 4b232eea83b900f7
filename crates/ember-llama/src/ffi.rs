// Process-wide llama backend init/shutdown plus parameter defaults.
// Context- and model-specific wrappers live in their own modules.

use std::sync::OnceLock;

use llama_cpp_sys_2::{
    llama_backend_free, llama_backend_init, llama_context_default_params, llama_context_params,
    llama_model_default_params, llama_model_params,
};
use once_cell::sync::Lazy;

/// one-time flags to prevent double init/deinit
static INIT_CALLED: OnceLock<()> = OnceLock::new();
static DEINIT_CALLED: OnceLock<()> = OnceLock::new();

/// Physical core count, resolved once.
static CORES: Lazy<i32> = Lazy::new(|| num_cpus::get().max(1) as i32);

#[inline]
pub(crate) fn trace(msg: &str) {
    #[cfg(feature = "ffi-trace")]
    println!("{msg}");
    #[cfg(not(feature = "ffi-trace"))]
    let _ = msg;
}

/// Call exactly once near process start.
pub unsafe fn init_backend() {
    if INIT_CALLED.set(()).is_ok() {
        trace("🧠 [FFI] llama_backend_init()");
        llama_backend_init();
    } else {
        trace("↩️ [FFI] init_backend() called again, ignored");
    }
}

/// Optional: call once on clean shutdown.
pub unsafe fn deinit_backend() {
    if DEINIT_CALLED.set(()).is_ok() {
        trace("🧹 [FFI] llama_backend_free()");
        llama_backend_free();
    } else {
        trace("↩️ [FFI] deinit_backend() called again, ignored");
    }
}

/// Default model params (start from upstream defaults to stay future-proof).
pub fn default_model_params() -> llama_model_params {
    let mut p = unsafe { llama_model_default_params() };

    // Keep mmap for fast load; verify tensor shapes.
    p.use_mmap = true;
    p.check_tensors = true;

    p
}

/// Context params for single-stream CPU decoding. `n_ctx` and `n_batch`
/// come from the caller; thread counts default to the physical core count
/// unless overridden later via `llama_set_n_threads`.
pub fn context_params(n_ctx: u32, n_batch: u32) -> llama_context_params {
    let mut p = unsafe { llama_context_default_params() };

    p.n_ctx = n_ctx;
    p.n_batch = n_batch;
    p.n_ubatch = 1;
    p.n_seq_max = 1;

    p.n_threads = *CORES;
    p.n_threads_batch = *CORES;

    p.embeddings = false;
    p.offload_kqv = false;

    p
}
