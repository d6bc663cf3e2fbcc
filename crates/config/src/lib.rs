//! # config — boot-time configuration for the storage node
//!
//! Two layers, matching spec.md §6.2:
//!
//!   - a TOML document ([`ConfigDocument`]) covering everything that has a
//!     sane shared default — memtable/persistence/raft/server/logger
//!     tuning — loaded with [`Config::load`];
//!   - a handful of environment variables that identify *this* process on
//!     the network and therefore can't ship a default in a file shared
//!     across nodes: advertise address, replication factor, virtual-node
//!     count, the public peer map, and optional membership service
//!     endpoints.
//!
//! Both `cli` and `server` call [`Config::load`] so the two binaries never
//! drift on how a setting is named or defaulted.

mod env;
mod error;

pub use error::ConfigError;

use serde::Deserialize;
use std::path::Path;

/// Tuning for the in-memory write buffer.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct MemtableConfig {
    pub flush_threshold: usize,
    pub flush_chan_buff_size: usize,
}

impl Default for MemtableConfig {
    fn default() -> Self {
        Self { flush_threshold: 4 * 1024 * 1024, flush_chan_buff_size: 8 }
    }
}

/// Tuning for the sorted-table levels.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct SstableConfig {
    pub size_multiplier: u64,
    pub compact_threshold: usize,
}

impl Default for SstableConfig {
    fn default() -> Self {
        Self { size_multiplier: 4, compact_threshold: 4 }
    }
}

/// Block cache sizing.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { capacity: 1024 }
    }
}

/// Bloom filter target false-positive rate.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct BloomFilterConfig {
    pub fp_rate: f64,
}

impl Default for BloomFilterConfig {
    fn default() -> Self {
        Self { fp_rate: 0.01 }
    }
}

/// On-disk layout and compaction tuning.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    pub path: String,
    pub sstable: SstableConfig,
    pub cache: CacheConfig,
    pub bloom_filter: BloomFilterConfig,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self { path: "data".to_string(), sstable: SstableConfig::default(), cache: CacheConfig::default(), bloom_filter: BloomFilterConfig::default() }
    }
}

/// One entry of `raft.peers` in the TOML document: a consensus-group
/// member's id and the address its transport is reachable at.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RaftPeerConfig {
    pub id: String,
    pub address: String,
}

/// Consensus group tuning.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RaftConfig {
    pub id: String,
    pub peers: Vec<RaftPeerConfig>,
    pub election_tick: u32,
    pub heartbeat_tick: u32,
    pub check_quorum: bool,
    pub pre_vote: bool,
}

impl Default for RaftConfig {
    fn default() -> Self {
        Self { id: String::new(), peers: Vec::new(), election_tick: 10, heartbeat_tick: 2, check_quorum: true, pre_vote: true }
    }
}

/// HTTP surface tuning.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: 7878 }
    }
}

/// Logging tuning, consumed by `tracing_subscriber`'s `EnvFilter`/fmt-or-json
/// layer selection.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggerConfig {
    pub level: String,
    pub json: bool,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), json: false }
    }
}

/// The full TOML document described in spec.md §6.2. Every field has a
/// default, so a partial or even empty file is valid.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ConfigDocument {
    pub memtable: MemtableConfig,
    pub persistence: PersistenceConfig,
    pub raft: RaftConfig,
    pub server: ServerConfig,
    pub logger: LoggerConfig,
}

/// A peer's address on the public API surface — what the hash ring and
/// router route to, as distinct from `raft.peers`' internal consensus
/// addresses (the two may coincide, but nothing requires it).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerAddress {
    pub id: String,
    pub address: String,
}

/// Fully assembled configuration: the TOML document plus the
/// environment-sourced, per-process identity settings.
#[derive(Debug, Clone)]
pub struct Config {
    pub document: ConfigDocument,
    pub advertise_address: String,
    pub replication_factor: usize,
    pub virtual_nodes: usize,
    pub peer_map: Vec<PeerAddress>,
    pub membership_endpoints: Vec<String>,
}

impl Config {
    /// Reads and parses `path` as the TOML document, then layers the
    /// required environment variables on top:
    ///
    ///   - `RIPTIDE_ADVERTISE_ADDR` — this node's address as seen by peers.
    ///   - `RIPTIDE_REPLICATION_FACTOR` — replica count per key.
    ///   - `RIPTIDE_VIRTUAL_NODES` — hash ring points per node.
    ///   - `RIPTIDE_PEER_MAP` — `id=address,id=address,...` for every node
    ///     in the cluster, including this one.
    ///   - `RIPTIDE_MEMBERSHIP_ENDPOINTS` — optional, comma-separated.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io { path: path.display().to_string(), source })?;
        let document: ConfigDocument = toml::from_str(&raw).map_err(|source| ConfigError::Parse { path: path.display().to_string(), source })?;
        Self::from_document(document)
    }

    /// As [`Config::load`], but takes an already-parsed document — used by
    /// tests and by callers that assemble the document some other way.
    pub fn from_document(document: ConfigDocument) -> Result<Self, ConfigError> {
        Ok(Self {
            document,
            advertise_address: env::required("RIPTIDE_ADVERTISE_ADDR")?,
            replication_factor: env::required_parsed("RIPTIDE_REPLICATION_FACTOR")?,
            virtual_nodes: env::required_parsed("RIPTIDE_VIRTUAL_NODES")?,
            peer_map: env::required_peer_map("RIPTIDE_PEER_MAP")?,
            membership_endpoints: env::optional_list("RIPTIDE_MEMBERSHIP_ENDPOINTS"),
        })
    }
}
