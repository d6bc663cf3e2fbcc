//! # Sorted table
//!
//! Immutable, on-disk storage files for the storage engine.
//!
//! When the in-memory [`memtable::Memtable`] exceeds its size threshold the
//! engine flushes it to disk as a sorted table. Tables are *write-once,
//! read-many* — once created they are never modified (only replaced during
//! compaction).
//!
//! ## File layout
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │ DATA SECTION, grouped into fixed-size blocks of                │
//! │ RECORDS_PER_BLOCK records each, sorted by key:                 │
//! │                                                                │
//! │   keyLen(u32) | key | valueLen(u32) | value | seq(u64) | meta(u64) │
//! ├───────────────────────────────────────────────────────────────┤
//! │ INDEX SECTION, one entry per block, first-key sorted:          │
//! │                                                                │
//! │   keyLen(u32) | firstKey | blockOffset(u64) | blockSize(u32)   │
//! │   | blockIndex(u32)                                            │
//! ├───────────────────────────────────────────────────────────────┤
//! │ TRAILER: indexSize(u32), the last 4 bytes of the file           │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! There is no magic number and no per-record checksum — the record body is
//! bit-exact and carries no room for one; durability against silent
//! corruption is the journal's job, not the table's. The bloom filter is
//! stored separately, as a `<path>.bloom` sidecar next to the table file, so
//! writing one is an independent atomic rename from writing the table. A
//! reader that binary-searches the index only ever touches the one block a
//! key could live in, never the whole file.

mod format;
mod merge;
mod reader;
mod writer;

pub use format::{IndexEntry, Record, RECORDS_PER_BLOCK};
pub use merge::MergeIterator;
pub use reader::SSTableReader;
pub use writer::{SSTableWriter, TableMeta};
