//! Sampler pipeline: assembles the fixed-order chain of sampling transforms.

use std::time::{SystemTime, UNIX_EPOCH};

use ember_abi::{InferenceEngine, LlmError, SamplerOptions};

/// Build the sampler chain for one generation. Stage order is fixed and
/// significant: top-k first, then nucleus (top-p, keeping at least one
/// candidate), then temperature scaling, then the stochastic draw. The
/// caller owns the returned chain and drops it on every terminal
/// transition.
pub fn build_chain<E: InferenceEngine>(
    engine: &E,
    opts: &SamplerOptions,
) -> Result<E::Sampler, LlmError> {
    let p = opts.floored();
    let mut chain = engine.new_sampler_chain()?;
    engine.chain_add_top_k(&mut chain, p.top_k);
    engine.chain_add_top_p(&mut chain, p.top_p, 1);
    engine.chain_add_temperature(&mut chain, p.temperature);
    engine.chain_add_dist(&mut chain, clock_seed());
    Ok(chain)
}

/// Seed from the wall clock: generations are non-reproducible by design,
/// no seed parameter is exposed anywhere in the API.
fn clock_seed() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u32)
        .unwrap_or(0)
}
