//! # Ring — consistent hash ring
//!
//! Deterministic mapping of keys to an ordered set of node addresses, with
//! smooth rebalancing when nodes are added or removed.
//!
//! Each node address contributes `replicas` virtual points at
//! `H("addr#i")` for `i` in `[0, replicas)`, using a stable 32-bit
//! checksum (`crc32fast`) as the hash. Points are kept in a sorted
//! `Vec<(hash, addr)>`; the owner of a key is the first point at or after
//! `H(key)`, wrapping around to the start of the ring.

use std::collections::BTreeSet;

fn hash_bytes(bytes: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(bytes);
    hasher.finalize()
}

/// A consistent hash ring over a set of node addresses.
#[derive(Debug, Clone)]
pub struct HashRing {
    replicas: usize,
    /// Sorted by hash; ties broken by address for determinism.
    points: Vec<(u32, String)>,
    nodes: BTreeSet<String>,
}

impl HashRing {
    /// Creates an empty ring with `replicas` virtual points per node.
    #[must_use]
    pub fn new(replicas: usize) -> Self {
        Self { replicas, points: Vec::new(), nodes: BTreeSet::new() }
    }

    /// Builds a ring from a static set of node addresses in one shot —
    /// the path used when no membership watcher is configured and the
    /// ring is built once at boot from the static peer list.
    #[must_use]
    pub fn build<I, S>(replicas: usize, nodes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut ring = Self::new(replicas);
        for node in nodes {
            ring.add_node(node.into());
        }
        ring
    }

    /// Number of distinct node addresses currently on the ring.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    #[must_use]
    pub fn nodes(&self) -> Vec<String> {
        self.nodes.iter().cloned().collect()
    }

    /// Adds a node's virtual points to the ring. A no-op if the address is
    /// already present.
    pub fn add_node(&mut self, addr: impl Into<String>) {
        let addr = addr.into();
        if !self.nodes.insert(addr.clone()) {
            return;
        }
        for i in 0..self.replicas {
            let point_hash = hash_bytes(format!("{addr}#{i}").as_bytes());
            self.points.push((point_hash, addr.clone()));
        }
        self.points.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
    }

    /// Removes a node and all of its virtual points. A no-op if absent.
    pub fn remove_node(&mut self, addr: &str) {
        if !self.nodes.remove(addr) {
            return;
        }
        self.points.retain(|(_, a)| a != addr);
    }

    /// Returns the owning node for `key`: the address at the first point
    /// whose hash is `>= H(key)`, wrapping to index 0 if none is.
    #[must_use]
    pub fn owner(&self, key: &[u8]) -> Option<String> {
        if self.points.is_empty() {
            return None;
        }
        let key_hash = hash_bytes(key);
        let idx = self.points.partition_point(|(h, _)| *h < key_hash);
        let idx = if idx == self.points.len() { 0 } else { idx };
        Some(self.points[idx].1.clone())
    }

    /// Walks the ring starting at `Owner(key)`, collecting up to `n`
    /// distinct addresses (fewer if the ring has fewer distinct nodes).
    #[must_use]
    pub fn successors(&self, key: &[u8], n: usize) -> Vec<String> {
        if self.points.is_empty() || n == 0 {
            return Vec::new();
        }
        let key_hash = hash_bytes(key);
        let start = self.points.partition_point(|(h, _)| *h < key_hash);
        let start = if start == self.points.len() { 0 } else { start };

        let mut out = Vec::with_capacity(n.min(self.nodes.len()));
        let mut seen = BTreeSet::new();
        for i in 0..self.points.len() {
            let (_, addr) = &self.points[(start + i) % self.points.len()];
            if seen.insert(addr.clone()) {
                out.push(addr.clone());
                if out.len() == n {
                    break;
                }
            }
        }
        out
    }
}

impl Default for HashRing {
    fn default() -> Self {
        Self::new(0)
    }
}

#[cfg(test)]
mod tests;
