//! Benchmarks for hybridpool's CPU/GPU request hot paths.
//!
//! Run with: cargo bench

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use hybridpool::gpu::DummyGraphicsApi;
use hybridpool::segment::dummy::DummySegment;
use hybridpool::{PoolConfig, PoolHandle, StreamId};

fn test_config() -> PoolConfig {
    PoolConfig {
        cpu_budget: 256 << 20,
        gpu_budget: 256 << 20,
        enable_auditor_loop: false,
        ..PoolConfig::default()
    }
}

fn new_handle() -> PoolHandle {
    let segment = Arc::new(DummySegment::new());
    let graphics = Arc::new(DummyGraphicsApi::new());
    PoolHandle::with_graphics(segment, graphics, test_config()).unwrap()
}

fn bench_cpu_request_reuse(c: &mut Criterion) {
    let pool = new_handle();

    let mut group = c.benchmark_group("cpu_request_reuse");
    for size in [64usize, 4096, 65536] {
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            b.iter(|| {
                let buffer = pool.get_buffer_from_shared_pool_direct(size as u64).unwrap();
                black_box(&buffer);
                drop(buffer);
            })
        });
    }
    group.finish();
}

fn bench_cpu_request_growth(c: &mut Criterion) {
    c.bench_function("cpu_request_growth_1000x_4096", |b| {
        b.iter(|| {
            let pool = new_handle();
            let mut buffers = Vec::with_capacity(1000);
            for _ in 0..1000 {
                buffers.push(pool.get_buffer_from_shared_pool_direct(4096).unwrap());
            }
            black_box(&buffers);
        })
    });
}

fn bench_stream_gated_fallback(c: &mut Criterion) {
    let pool = new_handle();
    pool.activate_stream(StreamId(1), false);

    c.bench_function("stream_gated_local_fallback_4096", |b| {
        b.iter(|| {
            let buffer = pool.get_buffer_from_pool(StreamId(1), 4096);
            black_box(&buffer);
        })
    });
}

fn bench_gpu_request_reuse(c: &mut Criterion) {
    let pool = new_handle();

    c.bench_function("gpu_request_reuse_1mb", |b| {
        b.iter(|| {
            let buffer = pool.get_gpu_buffer_from_pool(1 << 20, false).unwrap();
            black_box(&buffer);
            drop(buffer);
        })
    });
}

fn bench_concurrent_attach(c: &mut Criterion) {
    c.bench_function("attach_then_detach", |b| {
        b.iter(|| {
            let handle = new_handle();
            black_box(&handle);
        })
    });
}

criterion_group!(
    benches,
    bench_cpu_request_reuse,
    bench_cpu_request_growth,
    bench_stream_gated_fallback,
    bench_gpu_request_reuse,
    bench_concurrent_attach
);
criterion_main!(benches);
