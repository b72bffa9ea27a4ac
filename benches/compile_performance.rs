//! Compile Performance Benchmarks
//!
//! Benchmarks for the full compile pipeline and its stages on scores of
//! growing size. A score compiler sits on the interactive path of a
//! render tool, so compiling a few thousand events should stay well under
//! the time it takes to render them.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use neume::prelude::*;

const EVENT_COUNTS: [usize; 4] = [16, 128, 1024, 4096];

/// A flat melody: one wave event per note, waits in between.
fn flat_score(events: usize) -> String {
    let mut s = String::new();
    for i in 0..events {
        let freq = 110.0 + (i % 24) as f64 * 20.0;
        s.push_str(&format!("W f{} a0.4 t0.2 \\0.1 ", freq));
    }
    s
}

/// FM stacks: every event carries a two-level modulator graph.
fn modulated_score(events: usize) -> String {
    let mut s = String::new();
    for i in 0..events {
        let freq = 110.0 + (i % 24) as f64 * 20.0;
        s.push_str(&format!(
            "W f{} a0.4 t0.2 f![ W r2 a1 p![ W r0.5 ] ] \\0.1 ",
            freq
        ));
    }
    s
}

/// Composite chains: each carrier is extended twice in place.
fn composite_score(events: usize) -> String {
    let mut s = String::new();
    for i in 0..events {
        let freq = 110.0 + (i % 24) as f64 * 20.0;
        s.push_str(&format!("W f{} t0.1 ; t0.1 w=tri ; t0.1 w=saw \\0.2 ", freq));
    }
    s
}

fn compiler() -> Compiler {
    Compiler::new().with_options(CompilerOptions::default().silent().with_seed(1))
}

fn bench_flat_scores(c: &mut Criterion) {
    let mut group = c.benchmark_group("compile/flat");
    let compiler = compiler();

    for events in EVENT_COUNTS {
        let src = flat_score(events);
        group.throughput(Throughput::Elements(events as u64));
        group.bench_with_input(BenchmarkId::new("events", events), &src, |b, src| {
            b.iter(|| black_box(compiler.compile_str("bench", src).unwrap()));
        });
    }

    group.finish();
}

fn bench_modulated_scores(c: &mut Criterion) {
    let mut group = c.benchmark_group("compile/modulated");
    let compiler = compiler();

    for events in EVENT_COUNTS {
        let src = modulated_score(events);
        group.throughput(Throughput::Elements(events as u64));
        group.bench_with_input(BenchmarkId::new("events", events), &src, |b, src| {
            b.iter(|| black_box(compiler.compile_str("bench", src).unwrap()));
        });
    }

    group.finish();
}

fn bench_composite_scores(c: &mut Criterion) {
    let mut group = c.benchmark_group("compile/composite");
    let compiler = compiler();

    for events in EVENT_COUNTS {
        let src = composite_score(events);
        group.throughput(Throughput::Elements(events as u64));
        group.bench_with_input(BenchmarkId::new("events", events), &src, |b, src| {
            b.iter(|| black_box(compiler.compile_str("bench", src).unwrap()));
        });
    }

    group.finish();
}

fn bench_summary_and_json(c: &mut Criterion) {
    let mut group = c.benchmark_group("output");
    let compiler = compiler();
    let program = compiler
        .compile_str("bench", &modulated_score(1024))
        .unwrap()
        .program;

    group.bench_function("summary_1024", |b| {
        b.iter(|| black_box(program.summary()));
    });

    group.bench_function("json_1024", |b| {
        b.iter(|| black_box(program.to_json().unwrap()));
    });

    group.finish();
}

criterion_group!(
    compile_benches,
    bench_flat_scores,
    bench_modulated_scores,
    bench_composite_scores,
);

criterion_group!(output_benches, bench_summary_and_json,);

criterion_main!(compile_benches, output_benches);
