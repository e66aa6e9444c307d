//! Benchmarks for the block integrity checks.
//!
//! - CRC-32, CRC-64 and SHA-256 throughput across data sizes
//! - Incremental updates with small chunks, as the streaming decoder feeds them

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use oxixz_core::check::{Check, CheckKind};
use std::hint::black_box;

fn text_like(size: usize) -> Vec<u8> {
    let text = b"The quick brown fox jumps over the lazy dog. ";
    text.iter().copied().cycle().take(size).collect()
}

const CHECKS: [CheckKind; 3] = [CheckKind::Crc32, CheckKind::Crc64, CheckKind::Sha256];

/// Single-shot check over one buffer.
fn bench_check_sizes(c: &mut Criterion) {
    let mut group = c.benchmark_group("check_sizes");

    for size in [16usize, 256, 4 * 1024, 64 * 1024, 1024 * 1024] {
        let data = text_like(size);
        group.throughput(Throughput::Bytes(size as u64));

        for kind in CHECKS {
            group.bench_with_input(BenchmarkId::new(kind.name(), size), &data, |b, data| {
                b.iter(|| {
                    let mut check = Check::new(kind);
                    check.update(black_box(data));
                    black_box(check.finish());
                });
            });
        }
    }

    group.finish();
}

/// Same data fed in chunks.
fn bench_check_incremental(c: &mut Criterion) {
    let mut group = c.benchmark_group("check_incremental");
    let data = text_like(64 * 1024);
    group.throughput(Throughput::Bytes(data.len() as u64));

    for chunk_size in [7usize, 64, 4096] {
        for kind in CHECKS {
            group.bench_with_input(
                BenchmarkId::new(kind.name(), chunk_size),
                &data,
                |b, data| {
                    b.iter(|| {
                        let mut check = Check::new(kind);
                        for chunk in data.chunks(chunk_size) {
                            check.update(black_box(chunk));
                        }
                        black_box(check.finish());
                    });
                },
            );
        }
    }

    group.finish();
}

criterion_group!(benches, bench_check_sizes, bench_check_incremental);
criterion_main!(benches);
