//! Merkle snapshot construction and proof benchmarks.
//!
//! Run with: cargo bench --bench merkle

use cognosis::core::hash::PaymentKeyHash;
use cognosis::proof::{HolderBalance, MerkleTree};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

fn holders(count: usize) -> Vec<HolderBalance> {
    (0..count)
        .map(|i| {
            let mut pkh = [0u8; 28];
            pkh[..8].copy_from_slice(&(i as u64).to_be_bytes());
            HolderBalance {
                address: format!("addr_{:08}", count - i),
                payment_key_hash: PaymentKeyHash(pkh),
                balance: 1_000 + i as u64,
            }
        })
        .collect()
}

fn bench_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("merkle_build");
    for size in [100usize, 1_000, 10_000] {
        let input = holders(size);
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &input, |b, input| {
            b.iter(|| MerkleTree::build(black_box(input)))
        });
    }
    group.finish();
}

fn bench_proof(c: &mut Criterion) {
    let input = holders(10_000);
    let tree = MerkleTree::build(&input).unwrap();
    let target = input[4_321].clone();
    let proof = tree.generate_proof(&target).unwrap();

    c.bench_function("merkle_generate_proof_10k", |b| {
        b.iter(|| tree.generate_proof(black_box(&target)))
    });
    c.bench_function("merkle_verify_proof_10k", |b| b.iter(|| black_box(&proof).verify()));
}

criterion_group!(benches, bench_build, bench_proof);
criterion_main!(benches);
