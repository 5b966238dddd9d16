//! Cluster Geometry Benchmark
//!
//! How core count, tile size and L1 buffer depth affect throughput at the
//! harness length.

#![allow(missing_docs)]
#![allow(clippy::unwrap_used)]
use chacha20_cluster::{chacha20_encrypt, cluster_init, CipherParams, ClusterConf};
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::hint::black_box;

const LEN: usize = 100_000;

// =============================================================================
// BENCHMARKS
// =============================================================================

fn bench_cores(c: &mut Criterion) {
    let mut group = c.benchmark_group("Cluster Cores");
    group.throughput(Throughput::Bytes(LEN as u64));
    let params = CipherParams::default();
    let mut input = vec![0u8; LEN];

    for cores in [1, 2, 4, 8] {
        let mut handle = cluster_init(&ClusterConf {
            cores,
            ..ClusterConf::default()
        })
        .unwrap();
        group.bench_function(BenchmarkId::from_parameter(cores), |b| {
            b.iter(|| chacha20_encrypt(black_box(&mut input), &params, &mut handle).unwrap());
        });
    }
    group.finish();
}

fn bench_tiles(c: &mut Criterion) {
    let mut group = c.benchmark_group("Cluster Tiles");
    group.throughput(Throughput::Bytes(LEN as u64));
    let params = CipherParams::default();
    let mut input = vec![0u8; LEN];

    // Scenarios:
    // - 512B tiles: DMA turnover dominates
    // - 4KB tiles: default geometry
    // - 16KB tiles with triple buffering: fewest barriers
    let geometries = [(512, 2), (4096, 2), (4096, 3), (16 * 1024, 3)];

    for (tile_size, l1_buffers) in geometries {
        let mut handle = cluster_init(&ClusterConf {
            tile_size,
            l1_buffers,
            ..ClusterConf::default()
        })
        .unwrap();
        group.bench_function(format!("{tile_size}B x{l1_buffers}"), |b| {
            b.iter(|| chacha20_encrypt(black_box(&mut input), &params, &mut handle).unwrap());
        });
    }
    group.finish();
}

criterion_group!(benches, bench_cores, bench_tiles);
criterion_main!(benches);
