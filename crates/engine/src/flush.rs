//! Background flusher: drains sealed memtable segments into level-0 tables
//! without blocking foreground writers.
//!
//! A single worker thread awaits new segments on the memtable's rotation
//! channel. For each one it allocates a table id from the manifest, writes
//! a sorted table, registers the table at level 0 in both the manifest and
//! the in-memory [`LevelManager`], and only then releases the segment from
//! the memtable's immutable list — the contract the flusher is held to:
//! the engine must not consider a flushed segment's data "only on disk"
//! until the manifest write for it has committed.

use crate::level::LevelManager;
use crossbeam_channel::{Receiver, RecvTimeoutError};
use manifest::{Manifest, TableInfo};
use memtable::{Memtable, Segment};
use sstable::{Record, SSTableWriter};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

/// How often the worker wakes up to check for a shutdown request while the
/// rotation channel is idle.
const POLL_INTERVAL: Duration = Duration::from_millis(200);

pub struct Flusher {
    handle: Option<JoinHandle<()>>,
    running: Arc<AtomicBool>,
}

impl Flusher {
    /// Spawns the background worker. The worker keeps its own `Arc<Memtable>`
    /// clone, so it cannot rely on the rotation channel disconnecting to know
    /// when to stop (it would be the one keeping it alive) — `Flusher::drop`
    /// instead flips `running` and the worker notices within `POLL_INTERVAL`.
    pub fn spawn(
        rotation_rx: Receiver<Arc<Segment>>,
        mem: Arc<Memtable>,
        levels: Arc<LevelManager>,
        manifest: Arc<Mutex<Manifest>>,
        sst_dir: PathBuf,
        bloom_fp_rate: f64,
        cache_capacity: usize,
    ) -> Self {
        let running = Arc::new(AtomicBool::new(true));
        let running_in_thread = Arc::clone(&running);

        let handle = std::thread::spawn(move || {
            // A pending segment is always drained before the worker checks
            // whether it's been asked to stop, so a last-second rotation
            // made during shutdown (see `Engine`'s `Drop`) is never skipped.
            loop {
                let segment = match rotation_rx.recv_timeout(POLL_INTERVAL) {
                    Ok(segment) => segment,
                    Err(RecvTimeoutError::Timeout) => {
                        if !running_in_thread.load(Ordering::Relaxed) {
                            break;
                        }
                        continue;
                    }
                    Err(RecvTimeoutError::Disconnected) => break,
                };
                if let Err(err) = Self::flush_segment(
                    &segment,
                    &mem,
                    &levels,
                    &manifest,
                    &sst_dir,
                    bloom_fp_rate,
                    cache_capacity,
                ) {
                    tracing::error!(error = %err, "flusher: failed to flush sealed segment");
                }
            }
            tracing::debug!("flusher: worker exiting");
        });

        Self {
            handle: Some(handle),
            running,
        }
    }

    fn flush_segment(
        segment: &Arc<Segment>,
        mem: &Memtable,
        levels: &LevelManager,
        manifest: &Mutex<Manifest>,
        sst_dir: &std::path::Path,
        bloom_fp_rate: f64,
        cache_capacity: usize,
    ) -> anyhow::Result<()> {
        if segment.is_empty() {
            mem.release_segment(segment);
            return Ok(());
        }

        let table_id = manifest.lock().unwrap().next_table_id()?;
        let file_name = format!("L0_{table_id:020}.sst");
        let path = sst_dir.join(&file_name);

        let records = segment
            .iter()
            .map(|e| Record {
                key: e.key().clone(),
                value: e.value().value.clone(),
                seq: e.value().seq,
                meta: e.value().meta,
            })
            .collect::<Vec<_>>();
        let entry_count = records.len();

        let table_meta = SSTableWriter::write(&path, entry_count, bloom_fp_rate, records.into_iter())?;

        {
            let mut guard = manifest.lock().unwrap();
            guard.add_table(TableInfo {
                id: table_id,
                file_path: file_name,
                level: 0,
                size: table_meta.file_size,
            })?;
            guard.set_persistent_id(table_meta.max_seq)?;
        }

        let reader = sstable::SSTableReader::open_with_cache(&path, cache_capacity)?;
        levels.add_table(0, table_id, reader);

        // Only now is it safe to stop serving this data out of the memtable.
        mem.release_segment(segment);
        tracing::info!(table_id, entries = entry_count, "flusher: sealed segment committed to level 0");
        Ok(())
    }
}

impl Drop for Flusher {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
