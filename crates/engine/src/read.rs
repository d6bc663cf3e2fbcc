//! Read path: `get_string()`, plus a debug-only `scan()` kept for the CLI.
//!
//! Point lookups check the memtable first (always freshest data, including
//! tombstones not yet flushed), then fall through to the level manager.
//! A tombstone at either layer short-circuits the lookup as absent without
//! consulting anything older.

use anyhow::Result;

use crate::Engine;

impl Engine {
    /// Looks up a key, returning `Some((seq, value))` if a live value exists.
    ///
    /// # Errors
    ///
    /// Returns an error if a sorted-table read fails (corruption, I/O).
    pub fn get_string(&self, key: &[u8]) -> Result<Option<(u64, Vec<u8>)>> {
        if let Some(entry) = self.mem.get(key) {
            return Ok(if entry.is_tombstone() {
                None
            } else {
                Some((entry.seq, entry.value))
            });
        }

        match self.levels.get(key)? {
            Some(rec) if rec.meta.is_delete() => Ok(None),
            Some(rec) => Ok(Some((rec.seq, rec.value))),
            None => Ok(None),
        }
    }

    /// Range scan merging the memtable and every level, ascending key order,
    /// tombstones filtered and the highest-seq entry per key kept. Not part
    /// of the engine facade the consensus/router layers depend on — a
    /// debug affordance the CLI's `SCAN` command uses directly.
    ///
    /// * `start` — inclusive lower bound; pass `b""` for the beginning.
    /// * `end` — exclusive upper bound; pass `b""` for no upper bound.
    pub fn scan(&self, start: &[u8], end: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        use std::collections::BTreeMap;

        let in_range = |key: &[u8]| (start.is_empty() || key >= start) && (end.is_empty() || key < end);

        let mut merged: BTreeMap<Vec<u8>, (u64, Option<Vec<u8>>)> = BTreeMap::new();

        for key in self.levels.merged_keys()? {
            if !in_range(&key) {
                continue;
            }
            if let Some(rec) = self.levels.get(&key)? {
                let live = if rec.meta.is_delete() { None } else { Some(rec.value) };
                merged.insert(key, (rec.seq, live));
            }
        }

        for (key, entry) in self.mem.merged_snapshot() {
            if !in_range(&key) {
                continue;
            }
            let replace = match merged.get(&key) {
                Some((seq, _)) => entry.seq > *seq,
                None => true,
            };
            if replace {
                let live = if entry.is_tombstone() { None } else { Some(entry.value) };
                merged.insert(key, (entry.seq, live));
            }
        }

        Ok(merged
            .into_iter()
            .filter_map(|(key, (_, value))| value.map(|v| (key, v)))
            .collect())
    }
}
