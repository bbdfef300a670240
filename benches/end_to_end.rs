//! End-to-end latency benchmark for the search pipeline.
//!
//! Measures each stage for a single candidate:
//! 1. Topology synthesis
//! 2. Lowering (shape replay + buffer assignment)
//! 3. HLS rendering
//! 4. Parallel batch of 64 candidates

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use hwnas::config::Config;
use hwnas::emit::{Emitter, HlsEmitter};
use hwnas::lower::lower;
use hwnas::synth::{Candidate, Synthesizer};

fn candidate(config: &Config, seed: u64) -> Candidate {
    let mut synth = Synthesizer::seeded(config.clone(), seed).expect("valid config");
    synth.synthesize().expect("synthesis succeeds")
}

fn bench_synthesize(c: &mut Criterion) {
    let config = Config::default();
    let mut group = c.benchmark_group("synthesize");
    group.bench_function("depth_8", |b| {
        let mut synth = Synthesizer::seeded(config.clone(), 0).expect("valid config");
        b.iter(|| black_box(synth.synthesize()))
    });
    let deep = Config {
        max_depth: 32,
        input_size: 224,
        ..Config::default()
    };
    group.bench_function("depth_32", |b| {
        let mut synth = Synthesizer::seeded(deep.clone(), 0).expect("valid config");
        b.iter(|| black_box(synth.synthesize()))
    });
    group.finish();
}

fn bench_lower(c: &mut Criterion) {
    let config = Config::default();
    let cand = candidate(&config, 42);
    c.bench_function("lower", |b| {
        b.iter(|| {
            lower(
                black_box(&cand.architecture),
                config.initial_shape(),
                config.buffer_plan(),
            )
        })
    });
}

fn bench_render(c: &mut Criterion) {
    let config = Config::default();
    let cand = candidate(&config, 42);
    let program = lower(&cand.architecture, config.initial_shape(), config.buffer_plan())
        .expect("synthesized candidates lower");
    let emitter = HlsEmitter::new();
    c.bench_function("render_hls", |b| b.iter(|| emitter.render(black_box(&program))));
}

fn bench_sample(c: &mut Criterion) {
    let config = Config::default();
    let mut group = c.benchmark_group("sample");
    group.sample_size(20);
    group.bench_function("64_candidates", |b| {
        b.iter(|| hwnas::api::sample(black_box(&config), 0, 64))
    });
    group.finish();
}

criterion_group!(benches, bench_synthesize, bench_lower, bench_render, bench_sample);
criterion_main!(benches);
