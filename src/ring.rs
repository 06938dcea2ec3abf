//! Consistent-hash ring for client-side sharding.
//!
//! Each node contributes `replicas` virtual points keyed by
//! `crc32("<uuid>:<replica-index>")`. A key routes to the node owning the
//! ring position found by binary search on `crc32(shard_key)`, with the
//! insertion index clamped to the last entry rather than wrapping.

/// Default number of virtual points per node.
pub const DEFAULT_REPLICAS: usize = 160;

/// A consistent-hash ring mapping shard keys to nodes.
#[derive(Debug)]
pub struct HashRing<T> {
    nodes: Vec<T>,
    replicas: usize,
    /// Sorted virtual point hashes.
    keys: Vec<u32>,
    /// Node index owning the virtual point, parallel to `keys`.
    owners: Vec<usize>,
}

impl<T> HashRing<T> {
    pub fn new(replicas: usize) -> Self {
        Self {
            nodes: Vec::new(),
            replicas,
            keys: Vec::new(),
            owners: Vec::new(),
        }
    }

    /// Build a ring with [`DEFAULT_REPLICAS`] points per node from
    /// `(uuid, node)` pairs.
    pub fn with_nodes(nodes: impl IntoIterator<Item = (String, T)>) -> Self {
        let mut ring = Self::new(DEFAULT_REPLICAS);
        for (uuid, node) in nodes {
            ring.add_node(&uuid, node);
        }
        ring
    }

    /// Add a node identified by `uuid` (typically the endpoint string).
    pub fn add_node(&mut self, uuid: &str, node: T) {
        let owner = self.nodes.len();
        self.nodes.push(node);
        for replica in 0..self.replicas {
            let point = crc32fast::hash(format!("{}:{}", uuid, replica).as_bytes());
            let at = self.keys.partition_point(|k| *k <= point);
            self.keys.insert(at, point);
            self.owners.insert(at, owner);
        }
    }

    /// Index of the node owning `shard_key`, stable while the node set is
    /// unchanged.
    pub fn node_index(&self, shard_key: &str) -> Option<usize> {
        if self.keys.is_empty() {
            return None;
        }
        let point = crc32fast::hash(shard_key.as_bytes());
        let mut at = self.keys.partition_point(|k| *k <= point);
        // clamp past-the-end to the last virtual point
        at = at.min(self.keys.len() - 1);
        Some(self.owners[at])
    }

    pub fn node_for(&self, shard_key: &str) -> Option<&T> {
        self.node_index(shard_key).map(|i| &self.nodes[i])
    }

    pub fn nodes(&self) -> &[T] {
        &self.nodes
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }
}

/// Extract the shard key: the first `{…}` group when present and
/// non-empty, otherwise the whole key.
pub fn shard_key(key: &str) -> &str {
    if let Some(open) = key.find('{')
        && let Some(close) = key[open + 1..].find('}')
        && close > 0
    {
        return &key[open + 1..open + 1 + close];
    }
    key
}
