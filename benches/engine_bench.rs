use criterion::{black_box, criterion_group, criterion_main, Criterion};
use kvs_cache::{Cache, KvStore, MemoryEngine, SledKvsEngine, STORE_QUALNAME};
use tempfile::TempDir;

/// 基准测试：记录调用的 store，三种引擎
fn bench_store(c: &mut Criterion) {
    let memory = Cache::new(MemoryEngine::new()).unwrap();
    c.bench_function("memory store", |b| {
        b.iter(|| memory.store(black_box("value")).unwrap())
    });

    let temp_dir = TempDir::new().unwrap();
    let kvs = Cache::new(KvStore::open(temp_dir.path()).unwrap()).unwrap();
    c.bench_function("kvs store", |b| {
        b.iter(|| kvs.store(black_box("value")).unwrap())
    });

    let temp_dir = TempDir::new().unwrap();
    let sled_cache = Cache::new(SledKvsEngine::new(sled::open(temp_dir.path()).unwrap())).unwrap();
    c.bench_function("sled store", |b| {
        b.iter(|| sled_cache.store(black_box("value")).unwrap())
    });
}

/// 基准测试：回放 1000 次调用
fn bench_replay(c: &mut Criterion) {
    let temp_dir = TempDir::new().unwrap();
    let cache = Cache::new(KvStore::open(temp_dir.path()).unwrap()).unwrap();
    for i in 0..1000 {
        cache.store(i).unwrap();
    }
    c.bench_function("kvs replay 1000", |b| {
        b.iter(|| black_box(cache.replay(STORE_QUALNAME).unwrap()))
    });
}

criterion_group!(benches, bench_store, bench_replay);
criterion_main!(benches);
