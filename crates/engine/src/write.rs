//! Write path: `put_string()`, `delete()`, `force_flush()`.
//!
//! Durability order per write: allocate a sequence number, append the
//! journal entry and block until it's durable, then upsert into the
//! memtable. The memtable rotates its own active segment once it crosses
//! `flush_threshold` and hands the sealed segment to the background
//! flusher — the write path here never waits on SSTable I/O.

use anyhow::{ensure, Result};
use meta::VALUE_TYPE_STRING;
use std::sync::atomic::Ordering;
use wal::WalRecord;

use crate::{Engine, MAX_KEY_SIZE, MAX_VALUE_SIZE};

impl Engine {
    /// Inserts a key-value pair, returning the sequence number assigned to
    /// the write.
    pub fn put_string(&self, key: Vec<u8>, value: Vec<u8>) -> Result<u64> {
        ensure!(!key.is_empty(), "key must not be empty");
        ensure!(
            key.len() <= MAX_KEY_SIZE,
            "key too large: {} bytes (max {})",
            key.len(),
            MAX_KEY_SIZE
        );
        ensure!(
            value.len() <= MAX_VALUE_SIZE,
            "value too large: {} bytes (max {})",
            value.len(),
            MAX_VALUE_SIZE
        );

        let seq = self.next_seq()?;
        self.wal_writer.lock().unwrap().append(&WalRecord::Put {
            seq,
            key: key.clone(),
            value: value.clone(),
        })?;
        self.mem.put(key, value, seq, VALUE_TYPE_STRING);
        Ok(seq)
    }

    /// Deletes a key by writing a tombstone, returning the sequence number
    /// assigned to the delete.
    pub fn delete(&self, key: Vec<u8>) -> Result<u64> {
        ensure!(!key.is_empty(), "key must not be empty");
        ensure!(
            key.len() <= MAX_KEY_SIZE,
            "key too large: {} bytes (max {})",
            key.len(),
            MAX_KEY_SIZE
        );

        let seq = self.next_seq()?;
        self.wal_writer
            .lock()
            .unwrap()
            .append(&WalRecord::Del { seq, key: key.clone() })?;
        self.mem.delete(key, seq);
        Ok(seq)
    }

    /// Seals the memtable's active segment regardless of size and waits for
    /// nothing further — the background flusher still does the actual
    /// SSTable write asynchronously. A no-op if the active segment is empty.
    pub fn force_flush(&self) -> Result<()> {
        self.mem.force_rotate();
        Ok(())
    }

    fn next_seq(&self) -> Result<u64> {
        let prev = self.seq.fetch_add(1, Ordering::SeqCst);
        prev.checked_add(1)
            .ok_or_else(|| anyhow::anyhow!("sequence number overflow (u64::MAX reached)"))
    }
}
