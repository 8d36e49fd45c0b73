use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use mediadupe::cache::FingerprintStore;
use mediadupe::duplicates::{DuplicateAggregator, HashGroups};
use mediadupe::scanner::{BatchProcessor, Digest, Hasher};
use mediadupe::session::{ScanCoordinator, ScanSettings};
use mediadupe::store::MemoryStore;
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;

// A library of `count` files where every tenth file repeats an earlier one.
fn setup_library(count: usize) -> (TempDir, Arc<MemoryStore>) {
    let temp_dir = TempDir::new().unwrap();
    let store = Arc::new(MemoryStore::new());
    for i in 0..count {
        let path = temp_dir.path().join(format!("media_{i}.jpg"));
        let content = format!("media content {}", if i % 10 == 0 { 0 } else { i });
        fs::write(&path, content).expect("Failed to write media file");
        store.add_item(i as u64 + 1, path);
    }
    (temp_dir, store)
}

// 1. Hashing
fn bench_hasher(c: &mut Criterion) {
    let mut group = c.benchmark_group("hasher");
    let hasher = Hasher::new();

    for size_kb in [4, 1024, 16384] {
        let temp_dir = TempDir::new().unwrap();
        let file_path = temp_dir.path().join("bench.bin");
        fs::write(&file_path, vec![b'm'; size_kb * 1024]).expect("Failed to write bench file");

        group.bench_with_input(format!("blake3_{size_kb}KB"), &file_path, |b, path| {
            b.iter(|| black_box(hasher.hash_file(path)));
        });
    }
    group.finish();
}

// 2. Folding partial groupings
fn bench_aggregator(c: &mut Criterion) {
    let pages: Vec<HashGroups> = (0..100u64)
        .map(|page| {
            HashGroups::from_pairs(
                (0..50u64).map(|i| (Digest::of_bytes(&[(i % 37) as u8]), page * 50 + i)),
            )
        })
        .collect();

    c.bench_function("aggregate_100_pages_of_50", |b| {
        b.iter(|| {
            let mut aggregator = DuplicateAggregator::new();
            for page in &pages {
                aggregator.fold(page);
            }
            black_box(aggregator.duplicates())
        })
    });
}

// 3. One batch, cold and with cached fingerprints
fn bench_batch(c: &mut Criterion) {
    let (_dir, store) = setup_library(200);
    let mut group = c.benchmark_group("process_batch");

    group.bench_function("cold_200", |b| {
        b.iter_batched(
            || {
                let fingerprints = Arc::new(FingerprintStore::new(Arc::new(MemoryStore::new())));
                BatchProcessor::new(store.clone(), fingerprints)
            },
            |processor| black_box(processor.process_batch(0, 200).unwrap()),
            BatchSize::SmallInput,
        )
    });

    let fingerprints = Arc::new(FingerprintStore::new(store.clone()));
    let warm = BatchProcessor::new(store.clone(), fingerprints);
    warm.process_batch(0, 200).unwrap();
    group.bench_function("warm_200", |b| {
        b.iter(|| black_box(warm.process_batch(0, 200).unwrap()))
    });
    group.finish();
}

// 4. Full scan through the coordinator
fn bench_scan(c: &mut Criterion) {
    let (_dir, store) = setup_library(500);
    let settings = ScanSettings {
        page_size: 50,
        ..ScanSettings::default()
    };
    let coordinator = ScanCoordinator::new(store, settings).unwrap();

    c.bench_function("scan_500_items_page_50", |b| {
        b.iter(|| {
            coordinator.start(false).unwrap();
            black_box(coordinator.run(None, None).unwrap())
        })
    });
}

criterion_group!(benches, bench_hasher, bench_aggregator, bench_batch, bench_scan);
criterion_main!(benches);
