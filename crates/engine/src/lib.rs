//! # Engine — storage engine
//!
//! The central orchestrator that ties together the [`memtable`], [`wal`],
//! [`sstable`] and [`manifest`] crates into a concurrent, multi-level
//! LSM-tree key-value store.
//!
//! ## Architecture
//!
//! ```text
//! Caller (router/server, many threads)
//!   |
//!   v
//! ┌─────────────────────────────────────────────────────┐
//! │                       ENGINE                        │
//! │                                                      │
//! │ write.rs → journal append → memtable upsert          │
//! │              |                                       │
//! │              | (memtable rotates itself on overflow) │
//! │              v                                       │
//! │         flush.rs (background thread)                 │
//! │              | writes SST, commits manifest          │
//! │              v                                       │
//! │         level.rs → LevelManager (L0, L1, ...)        │
//! │                                                       │
//! │ read.rs → memtable → LevelManager (first match wins) │
//! │                                                       │
//! │ compaction.rs → merges an over-capacity level with    │
//! │                 the one below it                      │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! ## Concurrency
//!
//! Every public method takes `&self`: the memtable and level manager are
//! internally synchronized (lock-free pointer-swap and `RwLock`,
//! respectively), the journal writer and manifest sit behind a `Mutex`
//! each, and the sequence counter is an `AtomicU64`. This lets the router
//! layer call `Engine` from many request-handling threads at once without
//! an outer lock.
//!
//! ## Crash safety
//!
//! Every write is appended to the journal before the memtable update. A
//! sealed memtable segment is only released once its SSTable has been
//! written and the manifest commit naming it has returned — see
//! [`flush`]'s module docs. Tables and the manifest are both written via
//! temp-file-then-rename.

mod compaction;
mod flush;
mod level;
mod read;
mod recovery;
mod write;

use anyhow::Result;
use flush::Flusher;
use level::LevelManager;
use manifest::Manifest;
use memtable::Memtable;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use wal::WalWriter;

/// Maximum allowed key size in bytes (64 KiB).
pub const MAX_KEY_SIZE: usize = 64 * 1024;
/// Maximum allowed value size in bytes (10 MiB).
pub const MAX_VALUE_SIZE: usize = 10 * 1024 * 1024;

/// Tunables the engine needs that would otherwise require depending on the
/// `config` crate's TOML document directly. The top-level binary
/// (`server`/`cli`) parses configuration and constructs one of these; the
/// storage layer itself knows nothing about TOML or environment variables.
#[derive(Debug, Clone, Copy)]
pub struct EngineConfig {
    /// Memtable byte-size threshold that triggers a segment rotation.
    pub flush_threshold: usize,
    /// Rotation channel capacity; once the flusher falls this far behind, the
    /// writer that triggers the next rotation blocks (back-pressure).
    pub flush_chan_buff_size: usize,
    /// Level capacity base: level k holds `size_multiplier * 4^k` tables
    /// before it's due for compaction.
    pub size_multiplier: u64,
    /// Target false-positive rate for each table's bloom filter.
    pub bloom_fp_rate: f64,
    /// If `true`, every journal append calls `fsync` before returning.
    pub wal_sync: bool,
    /// Decoded blocks cached per table reader. `0` disables the cache.
    pub cache_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            flush_threshold: 4 * 1024 * 1024,
            flush_chan_buff_size: 8,
            size_multiplier: 4,
            bloom_fp_rate: 0.01,
            wal_sync: true,
            cache_capacity: 1024,
        }
    }
}

/// The central storage engine orchestrating the memtable, journal, sorted
/// tables and manifest.
///
/// # Write path (`put_string`/`delete`)
///
/// 1. Allocate the next sequence number.
/// 2. Append the record to the journal; block until durable.
/// 3. Upsert into the memtable (tombstone for delete).
///
/// The memtable rotates its own active segment past `flush_threshold` and
/// hands the sealed segment to the background flusher — the write path
/// never waits on SSTable I/O.
///
/// # Read path (`get_string`)
///
/// 1. Check the memtable (freshest data, includes unflushed tombstones).
/// 2. Check the level manager, newest table first within each level.
///
/// # Recovery
///
/// On construction ([`Engine::new`]), the journal is replayed into a fresh
/// memtable and every table the manifest lists is reopened into the level
/// manager.
pub struct Engine {
    pub(crate) mem: Arc<Memtable>,
    pub(crate) levels: Arc<LevelManager>,
    pub(crate) manifest: Arc<Mutex<Manifest>>,
    pub(crate) wal_writer: Mutex<WalWriter>,
    pub(crate) wal_path: PathBuf,
    pub(crate) sst_dir: PathBuf,
    pub(crate) seq: AtomicU64,
    pub(crate) bloom_fp_rate: f64,
    pub(crate) cache_capacity: usize,
    _flusher: Flusher,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("seq", &self.seq())
            .field("wal_path", &self.wal_path)
            .field("sst_dir", &self.sst_dir)
            .field("memtable_entries", &self.mem.len())
            .field("memtable_size", &self.mem.approx_size())
            .field("sstable_count", &self.levels.table_count())
            .finish()
    }
}

impl Engine {
    /// Creates a new engine, performing full recovery from the journal and
    /// the manifest's table catalog, then starts the background flusher.
    ///
    /// # Recovery steps
    ///
    /// 1. Create the data directory if it doesn't exist.
    /// 2. Clean up leftover `.sst.tmp` files from an interrupted flush.
    /// 3. Load the manifest and reopen every table it lists.
    /// 4. Spawn the background flusher — *before* replaying the journal, so
    ///    the rotation channel already has a consumer. A journal large
    ///    enough to force more memtable rotations during replay than
    ///    `flush_chan_buff_size` would otherwise block forever on the
    ///    rotation channel's bounded `send`, since nothing truncates the
    ///    journal and a restart always replays it in full.
    /// 5. Replay the journal into the memtable.
    /// 6. Open the journal writer in append mode.
    /// 7. Take the sequence counter as the max across the journal, the
    ///    loaded tables, and the manifest's own `persistent_id`.
    pub fn new<P1: AsRef<Path>, P2: AsRef<Path>>(
        wal_path: P1,
        sst_dir: P2,
        config: EngineConfig,
    ) -> Result<Self> {
        let wal_path = wal_path.as_ref().to_path_buf();
        let sst_dir = sst_dir.as_ref().to_path_buf();

        std::fs::create_dir_all(&sst_dir)?;
        recovery::cleanup_tmp_files(&sst_dir);

        let mem = Arc::new(Memtable::new(config.flush_threshold, config.flush_chan_buff_size));

        let manifest = Manifest::load(&sst_dir)?;
        let levels = Arc::new(LevelManager::new(config.size_multiplier));
        let table_seq =
            recovery::load_tables_from_manifest(&manifest, &sst_dir, &levels, config.cache_capacity)?;
        let manifest_persistent_id = manifest.persistent_id();
        let manifest = Arc::new(Mutex::new(manifest));

        let flusher = Flusher::spawn(
            mem.rotation_receiver(),
            Arc::clone(&mem),
            Arc::clone(&levels),
            Arc::clone(&manifest),
            sst_dir.clone(),
            config.bloom_fp_rate,
            config.cache_capacity,
        );

        let wal_seq = recovery::replay_wal_and_build(&wal_path, &mem)?;
        let wal_writer = WalWriter::create(&wal_path, config.wal_sync)?;

        let seq = wal_seq.max(table_seq).max(manifest_persistent_id);

        Ok(Self {
            mem,
            levels,
            manifest,
            wal_writer: Mutex::new(wal_writer),
            wal_path,
            sst_dir,
            seq: AtomicU64::new(seq),
            bloom_fp_rate: config.bloom_fp_rate,
            cache_capacity: config.cache_capacity,
            _flusher: flusher,
        })
    }

    /// Returns the current monotonic sequence number (the seq of the most
    /// recent write, or the recovered high-water mark if none has happened
    /// yet this process).
    #[must_use]
    pub fn seq(&self) -> u64 {
        self.seq.load(Ordering::SeqCst)
    }

    /// Total number of tables across every level.
    #[must_use]
    pub fn sstable_count(&self) -> usize {
        self.levels.table_count()
    }

    /// Number of tables at a specific level.
    #[must_use]
    pub fn sstable_count_at(&self, level: u32) -> usize {
        self.levels.count_at(level)
    }

    /// Number of entries held in the memtable (active segment plus any
    /// sealed immutables not yet flushed).
    #[must_use]
    pub fn memtable_entries(&self) -> usize {
        self.mem.len()
    }

    /// Approximate byte size of the memtable's active segment.
    #[must_use]
    pub fn memtable_size(&self) -> usize {
        self.mem.approx_size()
    }
}

/// Best-effort flush on drop: seals whatever is left in the memtable's
/// active segment so the flusher (still running at this point — it only
/// stops once `_flusher` itself drops, later in field order) gets one more
/// chance to write it out before the process exits. Not flushing here isn't
/// a correctness risk either way; the journal already has the data and
/// replay rebuilds the memtable from it on the next startup.
impl Drop for Engine {
    fn drop(&mut self) {
        self.mem.force_rotate();
    }
}

#[cfg(test)]
mod tests;
