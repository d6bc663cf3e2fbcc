//! Sorted-table binary record and index format.
//!
//! Record block (bit-exact, little-endian), repeated once per entry:
//! `keyLen:u32 | key | valueLen:u32 | value | seq:u64 | meta:u64`.
//!
//! Index section at the tail, repeated once per block:
//! `keyLen:u32 | key | blockOffset:u64 | blockSize:u32 | blockIndex:u32`
//! (`key` here is the first key of the block).
//!
//! Last 4 bytes of the file: `indexSize:u32`, the size of the index section
//! only (not counting the trailing `indexSize` field itself).
//!
//! Records are grouped into blocks of [`RECORDS_PER_BLOCK`] so the reader can
//! binary-search the index on block-first-keys and read only the matching
//! block, instead of scanning the whole file.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use meta::Meta;
use std::io::{self, Read, Write};

/// Number of records grouped into one indexed block.
pub const RECORDS_PER_BLOCK: usize = 16;

/// Size in bytes of the trailing `indexSize: u32` field.
pub const TRAILER_BYTES: u64 = 4;

/// One decoded data record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
    pub seq: u64,
    pub meta: Meta,
}

/// Writes a record and returns the number of bytes written.
pub fn write_record<W: Write>(w: &mut W, rec: &Record) -> io::Result<u64> {
    let mut n = 0u64;
    w.write_u32::<LittleEndian>(rec.key.len() as u32)?;
    n += 4;
    w.write_all(&rec.key)?;
    n += rec.key.len() as u64;
    w.write_u32::<LittleEndian>(rec.value.len() as u32)?;
    n += 4;
    w.write_all(&rec.value)?;
    n += rec.value.len() as u64;
    w.write_u64::<LittleEndian>(rec.seq)?;
    n += 8;
    w.write_u64::<LittleEndian>(rec.meta.as_u64())?;
    n += 8;
    Ok(n)
}

/// Reads a single record from `r`. Returns `Ok(None)` on clean EOF before any
/// byte of a new record has been consumed.
pub fn read_record<R: Read>(r: &mut R) -> io::Result<Option<Record>> {
    let key_len = match r.read_u32::<LittleEndian>() {
        Ok(v) => v as usize,
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    };
    let mut key = vec![0u8; key_len];
    r.read_exact(&mut key)?;
    let val_len = r.read_u32::<LittleEndian>()? as usize;
    let mut value = vec![0u8; val_len];
    r.read_exact(&mut value)?;
    let seq = r.read_u64::<LittleEndian>()?;
    let meta = Meta::from_u64(r.read_u64::<LittleEndian>()?);
    Ok(Some(Record {
        key,
        value,
        seq,
        meta,
    }))
}

/// One entry in the trailing block index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    /// First key of the block.
    pub first_key: Vec<u8>,
    pub block_offset: u64,
    pub block_size: u32,
    pub block_index: u32,
}

pub fn write_index_entry<W: Write>(w: &mut W, entry: &IndexEntry) -> io::Result<u64> {
    let mut n = 0u64;
    w.write_u32::<LittleEndian>(entry.first_key.len() as u32)?;
    n += 4;
    w.write_all(&entry.first_key)?;
    n += entry.first_key.len() as u64;
    w.write_u64::<LittleEndian>(entry.block_offset)?;
    n += 8;
    w.write_u32::<LittleEndian>(entry.block_size)?;
    n += 4;
    w.write_u32::<LittleEndian>(entry.block_index)?;
    n += 4;
    Ok(n)
}

pub fn read_index_entry<R: Read>(r: &mut R) -> io::Result<IndexEntry> {
    let key_len = r.read_u32::<LittleEndian>()? as usize;
    let mut first_key = vec![0u8; key_len];
    r.read_exact(&mut first_key)?;
    let block_offset = r.read_u64::<LittleEndian>()?;
    let block_size = r.read_u32::<LittleEndian>()?;
    let block_index = r.read_u32::<LittleEndian>()?;
    Ok(IndexEntry {
        first_key,
        block_offset,
        block_size,
        block_index,
    })
}
