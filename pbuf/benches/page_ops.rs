use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use pbuf::{BufferConfig, MemoryStorage, VirtualPageManager};
use std::sync::Arc;

fn seed_content(size: usize) -> Vec<u8> {
    (0..size).map(|i| b"abcdefghij"[i % 10]).collect()
}

fn bench_insert(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let mut group = c.benchmark_group("vpm_insert_at");
    for size in [4 * 1024, 64 * 1024, 1024 * 1024] {
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            b.iter(|| {
                rt.block_on(async {
                    let content = seed_content(size);
                    let mut vpm =
                        VirtualPageManager::new(BufferConfig::default(), Arc::new(MemoryStorage::new()));
                    vpm.initialize_from_content(&content).await;
                    vpm.insert_at(black_box(size as u64 / 2), black_box(b"inserted text"))
                        .await
                        .unwrap();
                })
            });
        });
    }
    group.finish();
}

fn bench_read_range(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let mut group = c.benchmark_group("vpm_read_range");
    for size in [4 * 1024, 64 * 1024, 1024 * 1024] {
        let content = seed_content(size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &content, |b, content| {
            b.iter(|| {
                rt.block_on(async {
                    let mut vpm =
                        VirtualPageManager::new(BufferConfig::default(), Arc::new(MemoryStorage::new()));
                    vpm.initialize_from_content(content).await;
                    black_box(vpm.read_range(0, content.len() as u64).await);
                })
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_insert, bench_read_range);
criterion_main!(benches);
