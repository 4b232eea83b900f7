//! RAII wrapper over a llama.cpp sampler chain. The chain owns its
//! stages, so freeing the chain frees everything added to it.

use std::ptr::NonNull;

use llama_cpp_sys_2::{
    llama_sampler, llama_sampler_accept, llama_sampler_chain_add,
    llama_sampler_chain_default_params, llama_sampler_chain_init, llama_sampler_free,
    llama_sampler_init_dist, llama_sampler_init_temp, llama_sampler_init_top_k,
    llama_sampler_init_top_p, llama_sampler_sample,
};

use ember_abi::Token;

use crate::context::LlamaContext;

pub struct SamplerChain {
    chain: NonNull<llama_sampler>,
}

impl SamplerChain {
    pub fn new() -> Result<Self, String> {
        let params = unsafe { llama_sampler_chain_default_params() };
        let ptr = unsafe { llama_sampler_chain_init(params) };
        NonNull::new(ptr)
            .map(|chain| Self { chain })
            .ok_or_else(|| "llama_sampler_chain_init returned null".to_string())
    }

    #[inline]
    fn as_ptr(&self) -> *mut llama_sampler {
        self.chain.as_ptr()
    }

    pub fn add_top_k(&mut self, k: i32) {
        unsafe { llama_sampler_chain_add(self.as_ptr(), llama_sampler_init_top_k(k)) };
    }

    pub fn add_top_p(&mut self, p: f32, min_keep: usize) {
        unsafe { llama_sampler_chain_add(self.as_ptr(), llama_sampler_init_top_p(p, min_keep)) };
    }

    pub fn add_temperature(&mut self, t: f32) {
        unsafe { llama_sampler_chain_add(self.as_ptr(), llama_sampler_init_temp(t)) };
    }

    pub fn add_dist(&mut self, seed: u32) {
        unsafe { llama_sampler_chain_add(self.as_ptr(), llama_sampler_init_dist(seed)) };
    }

    /// Draw the next token from the context's current logits.
    pub fn sample(&mut self, ctx: &mut LlamaContext) -> Token {
        let id = unsafe { llama_sampler_sample(self.as_ptr(), ctx.as_ptr(), -1) };
        Token(id)
    }

    /// Feed the drawn token back into the chain's internal state.
    pub fn accept(&mut self, token: Token) {
        unsafe { llama_sampler_accept(self.as_ptr(), token.raw()) };
    }
}

impl Drop for SamplerChain {
    fn drop(&mut self) {
        unsafe { llama_sampler_free(self.chain.as_ptr()) };
    }
}

// SAFETY: chains hold no thread-affine state and the session core never
// touches one from two threads at once.
unsafe impl Send for SamplerChain {}
