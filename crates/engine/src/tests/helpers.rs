use crate::{Engine, EngineConfig};
use std::path::Path;
use std::time::{Duration, Instant};

/// Opens an engine under `dir` with a config tuned for fast, deterministic
/// tests: a tiny flush threshold (tests can trigger a rotation with a
/// handful of writes) and sync-on-append disabled (tests don't need
/// durability against power loss).
pub fn test_engine(dir: &Path) -> Engine {
    test_engine_with(dir, EngineConfig {
        flush_threshold: 64,
        flush_chan_buff_size: 4,
        size_multiplier: 2,
        bloom_fp_rate: 0.01,
        wal_sync: false,
        cache_capacity: 1024,
    })
}

pub fn test_engine_with(dir: &Path, config: EngineConfig) -> Engine {
    Engine::new(dir.join("wal.log"), dir.join("sst"), config).unwrap()
}

/// Polls `cond` until it returns `true` or `timeout` elapses, for assertions
/// that depend on the background flusher having caught up. Panics on
/// timeout so a stalled flusher fails the test loudly instead of silently
/// passing on an unflushed state.
pub fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) {
    let start = Instant::now();
    loop {
        if cond() {
            return;
        }
        assert!(start.elapsed() < timeout, "condition did not become true in time");
        std::thread::sleep(Duration::from_millis(10));
    }
}
