//! # Router
//!
//! Translates a key into a target replica sequence and dispatches reads and
//! writes against it, preferring the local engine and falling back to
//! remote peers on failure.
//!
//! The router depends on two capability traits rather than concrete engine
//! or transport types ([`LocalKv`], [`RemoteClient`]) so it has no
//! compile-time dependency on the storage engine or the HTTP client —
//! breaking the router/engine/consensus dependency cycle the same way the
//! rest of this workspace isolates concerns behind a trait at the seam.

mod http_client;

pub use http_client::HttpRemoteClient;

use anyhow::{anyhow, Result};
use ring::HashRing;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Capability the router needs from the local storage engine.
pub trait LocalKv: Send + Sync {
    fn put(&self, key: &[u8], value: &[u8]) -> Result<()>;
    fn delete(&self, key: &[u8]) -> Result<()>;
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;
}

/// Capability the router needs to reach a remote peer.
pub trait RemoteClient: Send + Sync {
    fn put(&self, addr: &str, key: &[u8], value: &[u8]) -> Result<()>;
    fn delete(&self, addr: &str, key: &[u8]) -> Result<()>;
    fn get(&self, addr: &str, key: &[u8]) -> Result<Option<Vec<u8>>>;
}

/// Routes point reads and writes across a replicated keyspace.
pub struct Router {
    local_address: String,
    ring: RwLock<Arc<HashRing>>,
    replication_factor: usize,
    local: Arc<dyn LocalKv>,
    remote: Arc<dyn RemoteClient>,
    liveness: RwLock<HashMap<String, bool>>,
}

impl Router {
    #[must_use]
    pub fn new(
        local_address: impl Into<String>,
        ring: HashRing,
        replication_factor: usize,
        local: Arc<dyn LocalKv>,
        remote: Arc<dyn RemoteClient>,
    ) -> Self {
        Self {
            local_address: local_address.into(),
            ring: RwLock::new(Arc::new(ring)),
            replication_factor,
            local,
            remote,
            liveness: RwLock::new(HashMap::new()),
        }
    }

    /// Swaps in a freshly built ring, e.g. after a membership change.
    pub fn update_ring(&self, new_ring: HashRing) {
        *self.ring.write().unwrap() = Arc::new(new_ring);
    }

    /// Marks a peer address live or dead. An address with no recorded
    /// liveness is treated as live by `targets`.
    pub fn set_liveness(&self, addr: impl Into<String>, live: bool) {
        self.liveness.write().unwrap().insert(addr.into(), live);
    }

    fn is_live(&self, addr: &str) -> bool {
        self.liveness.read().unwrap().get(addr).copied().unwrap_or(true)
    }

    /// Computes the ordered target sequence for `key`: successors up to
    /// `max(RF, ring size)`, filtered to live addresses, deduplicated,
    /// truncated to RF, with the local address rotated to the front if
    /// present.
    #[must_use]
    pub fn targets(&self, key: &[u8]) -> Vec<String> {
        let ring = Arc::clone(&self.ring.read().unwrap());
        let fanout = self.replication_factor.max(ring.len());
        let mut candidates: Vec<String> = ring
            .successors(key, fanout)
            .into_iter()
            .filter(|addr| self.is_live(addr))
            .collect();
        candidates.truncate(self.replication_factor);

        if let Some(pos) = candidates.iter().position(|a| a == &self.local_address) {
            candidates.swap(0, pos);
        }
        candidates
    }

    /// Whether the local node belongs to `key`'s live replica set.
    #[must_use]
    pub fn is_local_replica(&self, key: &[u8]) -> bool {
        self.targets(key).iter().any(|a| a == &self.local_address)
    }

    /// Writes `key`/`value` to the first target that accepts it.
    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        let targets = self.targets(key);
        let mut last_err = None;
        for target in &targets {
            let result = if target == &self.local_address {
                self.local.put(key, value)
            } else {
                self.remote.put(target, key, value)
            };
            match result {
                Ok(()) => return Ok(()),
                Err(e) => {
                    tracing::warn!(target = %target, error = %e, "router: put target failed");
                    last_err = Some(e);
                }
            }
        }
        Err(last_err.unwrap_or_else(|| anyhow!("no replica targets available for key")))
    }

    /// Deletes `key` at the first target that accepts it.
    pub fn delete(&self, key: &[u8]) -> Result<()> {
        let targets = self.targets(key);
        let mut last_err = None;
        for target in &targets {
            let result = if target == &self.local_address {
                self.local.delete(key)
            } else {
                self.remote.delete(target, key)
            };
            match result {
                Ok(()) => return Ok(()),
                Err(e) => {
                    tracing::warn!(target = %target, error = %e, "router: delete target failed");
                    last_err = Some(e);
                }
            }
        }
        Err(last_err.unwrap_or_else(|| anyhow!("no replica targets available for key")))
    }

    /// Reads `key`, preferring a local answer if local is in the replica
    /// set; otherwise tries remotes in order and returns the first
    /// successful (found or not-found) answer.
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let targets = self.targets(key);
        if targets.first().map(|a| a == &self.local_address).unwrap_or(false) {
            return self.local.get(key);
        }

        let mut last_err = None;
        for target in &targets {
            let result = if target == &self.local_address {
                self.local.get(key)
            } else {
                self.remote.get(target, key)
            };
            match result {
                Ok(v) => return Ok(v),
                Err(e) => {
                    tracing::warn!(target = %target, error = %e, "router: get target failed");
                    last_err = Some(e);
                }
            }
        }
        Err(last_err.unwrap_or_else(|| anyhow!("no replica targets available for key")))
    }
}
