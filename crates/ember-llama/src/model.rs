use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::path::Path;
use std::ptr::NonNull;

use llama_cpp_sys_2::{
    llama_chat_message, llama_free_model, llama_load_model_from_file, llama_model,
    llama_model_chat_template, llama_model_get_vocab, llama_token_to_piece, llama_tokenize,
    llama_vocab, llama_vocab_is_eog,
};

use ember_abi::Token;

use crate::ffi;

/// Safe wrapper around `llama_model*`.
pub struct LlamaModel {
    model: NonNull<llama_model>,
}

impl LlamaModel {
    /// Load model weights from disk. Caller owns the returned handle.
    pub fn load(path: &Path) -> Result<Self, String> {
        let path_str = path.to_str().ok_or("model path is not valid UTF-8")?;
        ffi::trace(&format!("📦 [FFI] load_model: {path_str}"));
        let c_path = CString::new(path_str).map_err(|_| "model path has interior NUL")?;
        let ptr = unsafe { llama_load_model_from_file(c_path.as_ptr(), ffi::default_model_params()) };
        NonNull::new(ptr)
            .map(|model| Self { model })
            .ok_or_else(|| "llama_load_model_from_file returned null".to_string())
    }

    #[inline]
    pub fn as_ptr(&self) -> *mut llama_model {
        self.model.as_ptr()
    }

    #[inline]
    pub(crate) fn vocab(&self) -> *const llama_vocab {
        unsafe { llama_model_get_vocab(self.as_ptr()) }
    }

    pub fn vocab_available(&self) -> bool {
        !self.vocab().is_null()
    }

    /// The model's default chat template from GGUF metadata, if present.
    pub fn chat_template(&self) -> Option<String> {
        let ptr = unsafe { llama_model_chat_template(self.as_ptr(), std::ptr::null::<c_char>()) };
        if ptr.is_null() {
            return None;
        }
        let s = unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned();
        if s.is_empty() { None } else { Some(s) }
    }

    /// Raw tokenize into `out`, special and control tokens enabled.
    /// Returns the token count, or `-needed` when `out` is too small.
    pub fn tokenize_into(&self, text: &str, out: &mut [i32]) -> i32 {
        let c_text = match CString::new(text) {
            Ok(c) => c,
            Err(_) => return 0,
        };
        unsafe {
            llama_tokenize(
                self.vocab(),
                c_text.as_ptr(),
                c_text.as_bytes().len() as i32,
                out.as_mut_ptr(),
                out.len() as i32,
                /* add_special   */ true,
                /* parse_special */ true,
            )
        }
    }

    /// Render `turns` through `template` into `buf`. Returns the rendered
    /// length in bytes; `>= buf.len()` means the output did not fit.
    pub fn render_template_into(
        &self,
        template: &str,
        turns: &[(CString, CString)],
        add_assistant: bool,
        buf: &mut [u8],
    ) -> i32 {
        let c_tmpl = match CString::new(template) {
            Ok(c) => c,
            Err(_) => return -1,
        };
        let c_msgs: Vec<llama_chat_message> = turns
            .iter()
            .map(|(role, content)| llama_chat_message {
                role: role.as_ptr(),
                content: content.as_ptr(),
            })
            .collect();
        unsafe {
            llama_cpp_sys_2::llama_chat_apply_template(
                c_tmpl.as_ptr(),
                c_msgs.as_ptr(),
                c_msgs.len(),
                add_assistant,
                buf.as_mut_ptr() as *mut c_char,
                buf.len() as i32,
            )
        }
    }

    /// Convert one token to its UTF-8 piece bytes. Non-positive return
    /// means the token renders to nothing.
    pub fn token_to_piece_into(&self, token: Token, buf: &mut [u8]) -> i32 {
        unsafe {
            llama_token_to_piece(
                self.vocab(),
                token.raw(),
                buf.as_mut_ptr() as *mut c_char,
                buf.len() as i32,
                /* lstrip  */ 0,
                /* special */ true,
            )
        }
    }

    pub fn is_eog(&self, token: Token) -> bool {
        unsafe { llama_vocab_is_eog(self.vocab(), token.raw()) }
    }
}

impl Drop for LlamaModel {
    fn drop(&mut self) {
        ffi::trace("🧹 [FFI] llama_free_model()");
        unsafe { llama_free_model(self.model.as_ptr()) };
    }
}

// SAFETY: llama.cpp models are immutable after load; all mutable state
// lives in LlamaContext, and the session core serializes access anyway.
unsafe impl Send for LlamaModel {}
unsafe impl Sync for LlamaModel {}
