use std::os::raw::c_void;
use std::ptr::NonNull;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use llama_cpp_sys_2::{
    llama_batch_get_one, llama_context, llama_decode, llama_free, llama_get_memory,
    llama_memory_clear, llama_new_context_with_model, llama_set_abort_callback,
    llama_set_n_threads,
};

use ember_abi::{ContextOptions, Token};

use crate::ffi;
use crate::model::LlamaModel;

/// Keeps the shared stop flag alive for as long as llama.cpp may invoke
/// the abort callback with a pointer to it.
struct AbortHook {
    flag: Arc<AtomicBool>,
}

unsafe extern "C" fn abort_requested(data: *mut c_void) -> bool {
    if data.is_null() {
        return false;
    }
    let hook = &*(data as *const AbortHook);
    hook.flag.load(Ordering::Relaxed)
}

/// Safe wrapper around `llama_context*`. Mutation lives here; the model
/// handle stays immutable.
pub struct LlamaContext {
    ctx: NonNull<llama_context>,
    abort: Option<Box<AbortHook>>,
}

impl LlamaContext {
    /// Create an execution context bound to `model`.
    pub fn create(model: &LlamaModel, opts: &ContextOptions) -> Result<Self, String> {
        let params = ffi::context_params(opts.context_len, opts.batch_size);
        let ptr = unsafe { llama_new_context_with_model(model.as_ptr(), params) };
        let ctx = NonNull::new(ptr)
            .ok_or_else(|| "llama_new_context_with_model returned null".to_string())?;
        Ok(Self { ctx, abort: None })
    }

    #[inline]
    pub fn as_ptr(&self) -> *mut llama_context {
        self.ctx.as_ptr()
    }

    pub fn set_threads(&mut self, threads: i32, threads_batch: i32) {
        unsafe { llama_set_n_threads(self.as_ptr(), threads, threads_batch) };
    }

    /// Install `flag` as this context's abort observer. Decode calls poll
    /// it and bail out mid-batch when it flips to true.
    pub fn bind_abort_flag(&mut self, flag: Arc<AtomicBool>) {
        let hook = Box::new(AbortHook { flag });
        let data = &*hook as *const AbortHook as *mut c_void;
        unsafe { llama_set_abort_callback(self.as_ptr(), Some(abort_requested), data) };
        // Replace after registration so the old hook outlives any decode
        // that might still be observing it.
        self.abort = Some(hook);
    }

    /// Clear the KV state without destroying the context.
    pub fn clear_memory(&mut self) {
        unsafe {
            let mem = llama_get_memory(self.as_ptr());
            llama_memory_clear(mem, true);
        }
    }

    /// Decode `tokens` as a single batch, extending the sequence.
    pub fn decode(&mut self, tokens: &[Token]) -> Result<(), String> {
        let mut ids: Vec<i32> = tokens.iter().map(|t| t.raw()).collect();
        let batch = unsafe { llama_batch_get_one(ids.as_mut_ptr(), ids.len() as i32) };
        let rc = unsafe { llama_decode(self.as_ptr(), batch) };
        if rc != 0 {
            Err(format!("llama_decode failed with code {rc}"))
        } else {
            Ok(())
        }
    }
}

impl Drop for LlamaContext {
    fn drop(&mut self) {
        ffi::trace("🧹 [FFI] llama_free(context)");
        // Detach the callback before the hook allocation goes away.
        unsafe {
            llama_set_abort_callback(self.as_ptr(), None, std::ptr::null_mut());
            llama_free(self.ctx.as_ptr());
        }
    }
}

// SAFETY: the session core guards every context behind one mutex, so the
// handle moves between threads but is never used from two at once.
unsafe impl Send for LlamaContext {}
