use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use meta::Meta;
use sstable::{Record, SSTableReader, SSTableWriter};
use tempfile::tempdir;

const N_KEYS: usize = 10_000;
const VALUE_SIZE: usize = 100;

fn build_records() -> Vec<Record> {
    (0..N_KEYS)
        .map(|i| Record {
            key: format!("key{:08}", i).into_bytes(),
            value: vec![b'x'; VALUE_SIZE],
            seq: i as u64,
            meta: Meta::put(meta::VALUE_TYPE_STRING),
        })
        .collect()
}

fn sstable_write_benchmark(c: &mut Criterion) {
    c.bench_function("sstable_write_10k", |b| {
        b.iter_batched(
            || {
                let dir = tempdir().unwrap();
                let path = dir.path().join("bench.sst");
                (dir, path, build_records())
            },
            |(_dir, path, records)| {
                SSTableWriter::write(&path, N_KEYS, 0.01, records.into_iter()).unwrap();
            },
            BatchSize::SmallInput,
        );
    });
}

fn sstable_get_hit_benchmark(c: &mut Criterion) {
    c.bench_function("sstable_get_hit_10k", |b| {
        b.iter_batched(
            || {
                let dir = tempdir().unwrap();
                let path = dir.path().join("bench.sst");
                SSTableWriter::write(&path, N_KEYS, 0.01, build_records().into_iter()).unwrap();
                let reader = SSTableReader::open(&path).unwrap();
                (dir, reader)
            },
            |(_dir, reader)| {
                for i in 0..N_KEYS {
                    let key = format!("key{:08}", i).into_bytes();
                    assert!(reader.get(&key).unwrap().is_some());
                }
            },
            BatchSize::LargeInput,
        );
    });
}

fn sstable_get_miss_benchmark(c: &mut Criterion) {
    c.bench_function("sstable_get_miss_10k", |b| {
        b.iter_batched(
            || {
                let dir = tempdir().unwrap();
                let path = dir.path().join("bench.sst");
                SSTableWriter::write(&path, N_KEYS, 0.01, build_records().into_iter()).unwrap();
                let reader = SSTableReader::open(&path).unwrap();
                (dir, reader)
            },
            |(_dir, reader)| {
                for i in 0..N_KEYS {
                    let key = format!("missing{:08}", i).into_bytes();
                    assert!(reader.get(&key).unwrap().is_none());
                }
            },
            BatchSize::LargeInput,
        );
    });
}

criterion_group!(
    benches,
    sstable_write_benchmark,
    sstable_get_hit_benchmark,
    sstable_get_miss_benchmark
);
criterion_main!(benches);
