//! Benchmarks for combined kernel evaluation
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use kernelmix::{
    CombinedFeatures, CombinedKernel, FeatureRef, GaussianKernel, KernelMachine, LinearKernel,
    Parallel, SparseFeatures,
};
use std::sync::Arc;

// ============================================================================
// Helper Functions
// ============================================================================

fn modality(n: usize, dim: usize, seed: usize) -> FeatureRef {
    let rows: Vec<Vec<f64>> = (0..n)
        .map(|i| {
            (0..dim)
                .map(|k| (((i + seed) * 7919 + k * 104_729) % 1000) as f64 / 500.0 - 1.0)
                .collect()
        })
        .collect();
    Arc::new(SparseFeatures::from_dense_rows(&rows))
}

fn combined_kernel(n: usize, parallel: Parallel) -> CombinedKernel {
    let features = CombinedFeatures::from_components(vec![modality(n, 32, 1), modality(n, 16, 2)])
        .expect("components have equal length")
        .into_shared();

    let mut kernel = CombinedKernel::new().with_parallel(parallel);
    kernel
        .append_kernel(Box::new(LinearKernel::new()), 1.0)
        .expect("finite weight");
    kernel
        .append_kernel(Box::new(GaussianKernel::new(0.1)), 0.5)
        .expect("finite weight");
    kernel
        .init(features.clone(), features)
        .expect("features match kernels");
    kernel
}

// ============================================================================
// Batch vs Per-Example Scoring
// ============================================================================

fn bench_batch_vs_serial(c: &mut Criterion) {
    let n = 2_000;
    let support: Vec<usize> = (0..n).step_by(10).collect();
    let alphas: Vec<f64> = support
        .iter()
        .map(|&i| if i % 20 == 0 { 1.0 } else { -1.0 })
        .collect();
    let queries: Vec<usize> = (0..n).collect();

    let mut group = c.benchmark_group("classify_2000_queries");
    group.sample_size(10);
    group.throughput(Throughput::Elements(n as u64));

    let serial = KernelMachine::new(
        combined_kernel(n, Parallel::serial()),
        support.clone(),
        alphas.clone(),
        0.0,
    )
    .expect("matching support arrays");
    group.bench_function("per_example", |b| {
        b.iter(|| {
            queries
                .iter()
                .map(|&q| serial.classify_example(black_box(q)))
                .collect::<Vec<_>>()
        })
    });

    for threads in [1usize, 2, 4, 8] {
        let parallel = Parallel::new(threads).expect("positive thread count");
        let mut machine = KernelMachine::new(
            combined_kernel(n, parallel),
            support.clone(),
            alphas.clone(),
            0.0,
        )
        .expect("matching support arrays");
        group.bench_with_input(BenchmarkId::new("batch", threads), &threads, |b, _| {
            b.iter(|| machine.classify(black_box(&queries)))
        });
    }

    group.finish();
}

fn bench_pairwise(c: &mut Criterion) {
    let kernel = combined_kernel(500, Parallel::serial());
    c.bench_function("combined_compute_500x500", |b| {
        b.iter(|| {
            let mut sum = 0.0;
            for x in 0..500 {
                for y in 0..500 {
                    sum += kernel.compute(black_box(x), black_box(y));
                }
            }
            sum
        })
    });
}

criterion_group!(benches, bench_batch_vs_serial, bench_pairwise);
criterion_main!(benches);
