//! # Memtable
//!
//! A concurrent, sorted, in-memory write buffer for the storage engine.
//!
//! The memtable is the first point of contact for every write operation. It
//! buffers recent `PUT` and `DELETE` operations in a lock-free sorted map
//! before they are flushed to immutable on-disk sorted tables.
//!
//! ## Key properties
//! - **Sorted order**: snapshots are always in ascending key order (required
//!   for SST flush).
//! - **Sequence-number gated**: stale writes (lower-or-equal sequence number)
//!   are silently dropped, which matters once writes to the same key can race
//!   across threads (the journal append is serialized, but the memtable
//!   upsert that follows it is not — see the crate-level concurrency note).
//! - **Tombstone support**: deletes are recorded as empty-value entries whose
//!   `meta` carries the delete bit.
//! - **Rotation**: on crossing `flush_threshold` bytes, the active segment is
//!   atomically swapped for a fresh one and published on a bounded channel
//!   for the flusher to consume. Exactly one writer performs a given
//!   rotation; everyone else waits for it to become visible and retries.
//!
//! ## Example
//! ```rust
//! use memtable::Memtable;
//!
//! let m = Memtable::new(1 << 20, 4);
//! m.put(b"hello".to_vec(), b"world".to_vec(), 1, meta::VALUE_TYPE_STRING);
//! assert_eq!(m.get(b"hello").unwrap().value, b"world".to_vec());
//!
//! m.delete(b"hello".to_vec(), 2);
//! assert!(m.get(b"hello").unwrap().is_tombstone());
//! ```

use crossbeam_channel::{bounded, Receiver, Sender};
use crossbeam_skiplist::SkipMap;
use meta::Meta;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};

/// A single entry in the memtable.
///
/// `value` is empty for tombstones; `meta.is_delete()` is the authoritative
/// way to tell a tombstone from a live empty-value write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueEntry {
    /// Sequence number assigned at write time.
    pub seq: u64,
    /// Packed operation/value-type metadata.
    pub meta: Meta,
    /// Payload bytes; empty for tombstones.
    pub value: Vec<u8>,
}

impl ValueEntry {
    pub fn is_tombstone(&self) -> bool {
        self.meta.is_delete()
    }
}

/// One sorted segment: either the currently-active write target or a sealed
/// immutable awaiting flush.
pub type Segment = SkipMap<Vec<u8>, ValueEntry>;

/// Concurrent, sorted, rotating write buffer.
///
/// The active segment is a lock-free [`SkipMap`] reached through a
/// [`RwLock`] pointer swap — readers take the read lock only long enough to
/// clone the `Arc`, then traverse the map without blocking writers or other
/// readers. Rotation is gated by a version counter: writers race a
/// `compare_exchange` on the version to decide a single winner, who performs
/// the swap and publishes the sealed segment on the bounded rotation
/// channel; losers spin until the new version is visible, then retry their
/// insert against the fresh active segment.
pub struct Memtable {
    active: RwLock<Arc<Segment>>,
    immutables: Mutex<Vec<Arc<Segment>>>,
    approx_size: AtomicUsize,
    version: AtomicU64,
    flush_threshold: usize,
    rotation_tx: Sender<Arc<Segment>>,
    rotation_rx: Receiver<Arc<Segment>>,
}

impl Memtable {
    /// Creates an empty memtable.
    ///
    /// * `flush_threshold` — approximate byte size that triggers a rotation.
    /// * `flush_chan_buff_size` — capacity of the rotation channel; once the
    ///   flusher falls this far behind, the next rotation blocks the writer
    ///   that triggers it (back-pressure, by design).
    pub fn new(flush_threshold: usize, flush_chan_buff_size: usize) -> Self {
        let (tx, rx) = bounded(flush_chan_buff_size.max(1));
        Self {
            active: RwLock::new(Arc::new(SkipMap::new())),
            immutables: Mutex::new(Vec::new()),
            approx_size: AtomicUsize::new(0),
            version: AtomicU64::new(0),
            flush_threshold,
            rotation_tx: tx,
            rotation_rx: rx,
        }
    }

    /// A cloneable handle to the rotation channel; the flusher owns one of
    /// these and blocks on `recv()`.
    pub fn rotation_receiver(&self) -> Receiver<Arc<Segment>> {
        self.rotation_rx.clone()
    }

    fn current(&self) -> (Arc<Segment>, u64) {
        let guard = self.active.read().unwrap();
        (guard.clone(), self.version.load(Ordering::SeqCst))
    }

    /// Attempts to become the single rotator for `expected_version`. Returns
    /// `true` if this call performed the rotation.
    fn try_rotate(&self, expected_version: u64) -> bool {
        if self
            .version
            .compare_exchange(
                expected_version,
                expected_version + 1,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_err()
        {
            return false;
        }
        let sealed = {
            let mut guard = self.active.write().unwrap();
            std::mem::replace(&mut *guard, Arc::new(SkipMap::new()))
        };
        self.approx_size.store(0, Ordering::SeqCst);
        self.immutables.lock().unwrap().push(sealed.clone());
        // Bounded send: blocks (and so back-pressures this writer) once the
        // flusher has fallen behind.
        let _ = self.rotation_tx.send(sealed);
        true
    }

    fn wait_for_rotation(&self, stale_version: u64) {
        while self.version.load(Ordering::SeqCst) == stale_version {
            std::thread::yield_now();
        }
    }

    fn entry_size(key: &[u8], value: &[u8]) -> usize {
        key.len() + value.len()
    }

    /// Inserts or replaces `key`, rotating first if the active segment is
    /// already past threshold. Stale writes (`seq` <= an existing entry's
    /// `seq` for the same key) are silently dropped.
    fn upsert(&self, key: Vec<u8>, value: Vec<u8>, seq: u64, meta: Meta) {
        loop {
            let (active, version) = self.current();
            if self.approx_size.load(Ordering::SeqCst) >= self.flush_threshold {
                if self.try_rotate(version) {
                    continue;
                }
                self.wait_for_rotation(version);
                continue;
            }

            if let Some(existing) = active.get(&key) {
                if existing.value().seq >= seq {
                    return;
                }
            }

            let delta = Self::entry_size(&key, &value);
            active.insert(key, ValueEntry { seq, meta, value });
            self.approx_size.fetch_add(delta, Ordering::SeqCst);
            return;
        }
    }

    /// Upsert of a live value. Ties into the engine's write path at the
    /// "upsert into memtable" step of the put path.
    pub fn put(&self, key: Vec<u8>, value: Vec<u8>, seq: u64, value_type: u8) {
        self.upsert(key, value, seq, Meta::put(value_type));
    }

    /// Upsert of a tombstone.
    pub fn delete(&self, key: Vec<u8>, seq: u64) {
        self.upsert(key, Vec::new(), seq, Meta::delete());
    }

    /// Newest entry for `key`, consulting the active segment, then the
    /// immutable list in reverse chronological order.
    pub fn get(&self, key: &[u8]) -> Option<ValueEntry> {
        {
            let active = self.active.read().unwrap();
            if let Some(e) = active.get(key) {
                return Some(e.value().clone());
            }
        }
        let immutables = self.immutables.lock().unwrap();
        for seg in immutables.iter().rev() {
            if let Some(e) = seg.get(key) {
                return Some(e.value().clone());
            }
        }
        None
    }

    /// An immutable, key-ordered snapshot of the active segment only (the
    /// segment a flush targets once it is sealed by rotation).
    pub fn snapshot(&self) -> Vec<(Vec<u8>, ValueEntry)> {
        let active = self.active.read().unwrap();
        active
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect()
    }

    /// A merged, key-ordered snapshot across the active segment and every
    /// sealed immutable not yet flushed, keeping the newest entry per key.
    /// Used by the engine's debug-only range scan.
    pub fn merged_snapshot(&self) -> Vec<(Vec<u8>, ValueEntry)> {
        use std::collections::BTreeMap;
        let mut merged: BTreeMap<Vec<u8>, ValueEntry> = BTreeMap::new();
        let immutables = self.immutables.lock().unwrap();
        for seg in immutables.iter() {
            for e in seg.iter() {
                merged
                    .entry(e.key().clone())
                    .and_modify(|cur| {
                        if e.value().seq > cur.seq {
                            *cur = e.value().clone();
                        }
                    })
                    .or_insert_with(|| e.value().clone());
            }
        }
        let active = self.active.read().unwrap();
        for e in active.iter() {
            merged
                .entry(e.key().clone())
                .and_modify(|cur| {
                    if e.value().seq > cur.seq {
                        *cur = e.value().clone();
                    }
                })
                .or_insert_with(|| e.value().clone());
        }
        merged.into_iter().collect()
    }

    /// Approximate byte size of the active segment only.
    pub fn approx_size(&self) -> usize {
        self.approx_size.load(Ordering::SeqCst)
    }

    /// `true` if the active segment and every sealed immutable are empty.
    pub fn is_empty(&self) -> bool {
        self.active.read().unwrap().is_empty()
            && self
                .immutables
                .lock()
                .unwrap()
                .iter()
                .all(|seg| seg.is_empty())
    }

    /// Forces a rotation of the active segment regardless of its size.
    /// No-op (returns `false`) if the active segment is currently empty.
    pub fn force_rotate(&self) -> bool {
        loop {
            let (active, version) = self.current();
            if active.is_empty() {
                return false;
            }
            if self.try_rotate(version) {
                return true;
            }
            self.wait_for_rotation(version);
        }
    }

    /// Drops a sealed segment from the immutable list once its flush has
    /// been durably committed (SST written and the manifest updated). Ties
    /// into the flusher's "don't release the immutable until the manifest
    /// write commits" rule — matched by pointer identity, not content, since
    /// two segments could otherwise compare equal.
    pub fn release_segment(&self, segment: &Arc<Segment>) {
        let mut immutables = self.immutables.lock().unwrap();
        if let Some(pos) = immutables.iter().position(|s| Arc::ptr_eq(s, segment)) {
            immutables.remove(pos);
        }
    }

    /// Number of entries across the active segment and sealed immutables.
    pub fn len(&self) -> usize {
        let active_len = self.active.read().unwrap().len();
        let immutable_len: usize = self
            .immutables
            .lock()
            .unwrap()
            .iter()
            .map(|seg| seg.len())
            .sum();
        active_len + immutable_len
    }
}

#[cfg(test)]
mod tests;
