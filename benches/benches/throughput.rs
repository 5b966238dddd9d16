//! ChaCha20 Cluster Criterion Benchmark
//!
//! Cluster offload (L2 and external RAM) against both serial references
//! across the plaintext sizes the harness sweeps.

#![allow(clippy::pedantic, clippy::nursery)]
#![allow(clippy::unwrap_used, clippy::expect_used)]

use chacha20_cluster::{
    chacha20_encrypt, chacha20_encrypt_ram, cluster_init, encrypt_serial, encrypt_serial_orig,
    CipherParams, ClusterConf, RamConf, RamDevice,
};
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::prelude::*;
use std::hint::black_box;

const KB: usize = 1024;

fn random_params() -> CipherParams {
    let mut key = [0u8; 32];
    let mut nonce = [0u8; 12];
    rand::rng().fill(&mut key[..]);
    rand::rng().fill(&mut nonce[..]);
    CipherParams::new(key, nonce)
}

// =============================================================================
// BENCHMARK 1: SERIAL REFERENCES
// =============================================================================

fn bench_serial(c: &mut Criterion) {
    let mut group = c.benchmark_group("1-Serial");
    let params = random_params();

    for size in [KB, 16 * KB, 100_000] {
        let mut input = vec![0u8; size];
        rand::rng().fill(&mut input[..]);
        group.throughput(Throughput::Bytes(size as u64));

        group.bench_function(BenchmarkId::new("portable", size), |b| {
            b.iter(|| encrypt_serial(black_box(&mut input), &params).unwrap());
        });
        group.bench_function(BenchmarkId::new("chacha20-crate", size), |b| {
            b.iter(|| encrypt_serial_orig(black_box(&mut input), &params).unwrap());
        });
    }
    group.finish();
}

// =============================================================================
// BENCHMARK 2: CLUSTER (L2)
// =============================================================================

fn bench_cluster(c: &mut Criterion) {
    let mut group = c.benchmark_group("2-Cluster-L2");
    let params = random_params();
    let mut handle = cluster_init(&ClusterConf::default()).unwrap();

    for size in [KB, 16 * KB, 100_000] {
        let mut input = vec![0u8; size];
        rand::rng().fill(&mut input[..]);
        group.throughput(Throughput::Bytes(size as u64));

        group.bench_function(BenchmarkId::from_parameter(size), |b| {
            b.iter(|| chacha20_encrypt(black_box(&mut input), &params, &mut handle).unwrap());
        });
    }
    group.finish();
}

// =============================================================================
// BENCHMARK 3: CLUSTER (EXTERNAL RAM)
// =============================================================================

fn bench_cluster_ram(c: &mut Criterion) {
    let mut group = c.benchmark_group("3-Cluster-RAM");
    let params = random_params();
    let mut handle = cluster_init(&ClusterConf::default()).unwrap();
    let ram = RamDevice::open(&RamConf::default()).unwrap();

    for size in [KB, 16 * KB, 100_000] {
        let region = ram.alloc(size).unwrap();
        let mut input = vec![0u8; size];
        rand::rng().fill(&mut input[..]);
        ram.write(&region, 0, &input).unwrap();
        group.throughput(Throughput::Bytes(size as u64));

        group.bench_function(BenchmarkId::from_parameter(size), |b| {
            b.iter(|| {
                chacha20_encrypt_ram(black_box(&region), size, &params, &mut handle, &ram).unwrap();
            });
        });
        ram.free(region).unwrap();
    }
    group.finish();
}

criterion_group!(benches, bench_serial, bench_cluster, bench_cluster_ram);
criterion_main!(benches);
