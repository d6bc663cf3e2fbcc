use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use engine::{Engine, EngineConfig};
use tempfile::tempdir;

const N_KEYS: usize = 5_000;
const VALUE_SIZE: usize = 100;

fn engine_put_benchmark(c: &mut Criterion) {
    c.bench_function("engine_put_5k", |b| {
        b.iter_batched(
            || {
                let dir = tempdir().unwrap();
                let wal_path = dir.path().join("wal.log");
                let sst_dir = dir.path().join("sst");
                let engine = Engine::new(&wal_path, &sst_dir, EngineConfig { wal_sync: false, ..EngineConfig::default() }).unwrap();
                (dir, engine)
            },
            |(_dir, engine)| {
                for i in 0..N_KEYS {
                    engine.put_string(format!("key{:08}", i).into_bytes(), vec![b'x'; VALUE_SIZE]).unwrap();
                }
            },
            BatchSize::SmallInput,
        );
    });
}

fn engine_get_benchmark(c: &mut Criterion) {
    let dir = tempdir().unwrap();
    let wal_path = dir.path().join("wal.log");
    let sst_dir = dir.path().join("sst");
    let engine = Engine::new(&wal_path, &sst_dir, EngineConfig { wal_sync: false, ..EngineConfig::default() }).unwrap();
    for i in 0..N_KEYS {
        engine.put_string(format!("key{:08}", i).into_bytes(), vec![b'x'; VALUE_SIZE]).unwrap();
    }
    engine.force_flush().unwrap();

    c.bench_function("engine_get_5k_after_flush", |b| {
        b.iter(|| {
            for i in 0..N_KEYS {
                let key = format!("key{:08}", i).into_bytes();
                assert!(engine.get_string(&key).unwrap().is_some());
            }
        });
    });
}

criterion_group!(benches, engine_put_benchmark, engine_get_benchmark);
criterion_main!(benches);
