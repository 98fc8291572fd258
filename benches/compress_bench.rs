//! Benchmarks for the compression engine.

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use kv_cache_compress::engine::attention::{token_importance, Aggregation};
use kv_cache_compress::engine::compressor::{CompressionConfig, Compressor};
use kv_cache_compress::engine::matrix::Matrix;
use kv_cache_compress::engine::selection::select_tokens;

fn pseudo_matrix(rows: usize, cols: usize, seed: u64) -> Matrix {
    let mut state = seed;
    let data = (0..rows)
        .map(|_| {
            (0..cols)
                .map(|_| {
                    state = state
                        .wrapping_mul(6364136223846793005)
                        .wrapping_add(1442695040888963407);
                    (state >> 33) as f64 / (1u64 << 30) as f64 - 1.0
                })
                .collect()
        })
        .collect();
    Matrix::from_rows(data).unwrap()
}

fn bench_attention_scoring(c: &mut Criterion) {
    let keys = pseudo_matrix(2048, 64, 1);
    let queries = pseudo_matrix(8, 64, 2);

    c.bench_function("importance_2k_tokens_8_queries_serial", |b| {
        b.iter(|| {
            let imp = token_importance(
                black_box(&queries),
                black_box(&keys),
                Aggregation::Mean,
                usize::MAX,
                None,
            );
            black_box(imp)
        })
    });

    c.bench_function("importance_2k_tokens_8_queries_parallel", |b| {
        b.iter(|| {
            let imp = token_importance(
                black_box(&queries),
                black_box(&keys),
                Aggregation::Mean,
                1,
                None,
            );
            black_box(imp)
        })
    });
}

fn bench_selection(c: &mut Criterion) {
    let mut state = 99u64;
    let importance: Vec<f64> = (0..100_000)
        .map(|_| {
            state = state
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            (state >> 33) as f64 / (1u64 << 31) as f64
        })
        .collect();

    c.bench_function("select_100k_tokens_at_0.9", |b| {
        b.iter(|| {
            let sel = select_tokens(black_box(&importance), 0.9);
            black_box(sel)
        })
    });
}

fn bench_compress_end_to_end(c: &mut Criterion) {
    let keys = pseudo_matrix(1024, 64, 11);
    let values = pseudo_matrix(1024, 64, 12);
    let queries = pseudo_matrix(4, 64, 13);
    let compressor = Compressor::default();
    let config = CompressionConfig::default();

    c.bench_function("compress_1k_tokens_dim64", |b| {
        b.iter(|| {
            let result = compressor.compress(
                black_box(&keys),
                black_box(&values),
                black_box(&queries),
                &config,
            );
            black_box(result)
        })
    });
}

criterion_group!(
    benches,
    bench_attention_scoring,
    bench_selection,
    bench_compress_end_to_end,
);
criterion_main!(benches);
