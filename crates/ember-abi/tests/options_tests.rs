use ember_abi::{ContextOptions, SamplerOptions};

#[test]
fn sampler_floors_replace_nonpositive_knobs() {
    let floored = SamplerOptions {
        temperature: 0.0,
        top_p: -0.5,
        top_k: 0,
    }
    .floored();
    assert_eq!(floored.temperature, SamplerOptions::DEFAULT_TEMPERATURE);
    assert_eq!(floored.top_p, SamplerOptions::DEFAULT_TOP_P);
    assert_eq!(floored.top_k, SamplerOptions::DEFAULT_TOP_K);
}

#[test]
fn sampler_floors_keep_positive_knobs() {
    let kept = SamplerOptions {
        temperature: 1.3,
        top_p: 0.42,
        top_k: 7,
    }
    .floored();
    assert_eq!(kept.temperature, 1.3);
    assert_eq!(kept.top_p, 0.42);
    assert_eq!(kept.top_k, 7);
}

#[test]
fn context_defaults_apply_when_nonpositive() {
    let opts = ContextOptions::resolve(0, -1);
    assert_eq!(opts.context_len, 2048);
    assert_eq!(opts.batch_size, 512);
    assert_eq!(opts.threads, 4);
    assert_eq!(opts.threads_batch, 4);
}

#[test]
fn batch_size_never_exceeds_the_context() {
    let opts = ContextOptions::resolve(128, 8);
    assert_eq!(opts.batch_size, 128);
    assert_eq!(opts.threads, 8);

    let wide = ContextOptions::resolve(8192, 8);
    assert_eq!(wide.batch_size, 512);
}
