use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use cuckoo_filter::{CuckooFilter, TableKind};
use rand::{RngCore, SeedableRng};
use rand_xorshift::XorShiftRng;

const ITEM_COUNT: usize = 100_000;

fn new_filter(table_kind: TableKind) -> CuckooFilter {
    let fingerprint_bit_count = match table_kind {
        TableKind::Single => 8,
        TableKind::Packed => 9,
    };
    CuckooFilter::new(4, fingerprint_bit_count, ITEM_COUNT, table_kind)
}

fn random_keys(count: usize) -> Vec<[u8; 32]> {
    let mut rng = XorShiftRng::seed_from_u64(0xdead_beef);
    (0..count)
        .map(|_| {
            let mut key = [0; 32];
            rng.fill_bytes(&mut key);
            key
        })
        .collect()
}

fn bench_insert(c: &mut Criterion) {
    for &(table_kind, name) in &[(TableKind::Single, "single"), (TableKind::Packed, "packed")] {
        let keys = random_keys(ITEM_COUNT / 2);
        c.bench_function(&format!("bench insert {}", name), |b| {
            b.iter_batched_ref(
                || {
                    let mut filter = new_filter(table_kind);
                    for key in &keys {
                        filter.insert(key);
                    }
                    filter
                },
                |filter| filter.insert(b"0xDEADBEEF"),
                BatchSize::PerIteration,
            )
        });
    }
}

fn bench_lookup(c: &mut Criterion) {
    for &(table_kind, name) in &[(TableKind::Single, "single"), (TableKind::Packed, "packed")] {
        let mut filter = new_filter(table_kind);
        for key in random_keys(ITEM_COUNT / 2) {
            filter.insert(&key);
        }
        let probes = random_keys(1024);
        let mut index = 0;
        c.bench_function(&format!("bench lookup {}", name), |b| {
            b.iter(|| {
                index = (index + 1) % probes.len();
                filter.contains(&probes[index])
            })
        });
    }
}

fn bench_clear(c: &mut Criterion) {
    for &(table_kind, name) in &[(TableKind::Single, "single"), (TableKind::Packed, "packed")] {
        let mut filter = new_filter(table_kind);
        c.bench_function(&format!("bench clear {}", name), |b| {
            b.iter(|| filter.clear())
        });
    }
}

criterion_group!(benches, bench_insert, bench_lookup, bench_clear);
criterion_main!(benches);
