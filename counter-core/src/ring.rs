//! Consistent-hash ring router.
//!
//! Pure computation: given a set of shard identifiers and a page key,
//! returns the shard responsible for that key. No I/O, no locking of its
//! own — callers that need concurrent mutation (the [`crate::shard::ShardPool`])
//! wrap a `Ring` in a lock and swap it atomically.

use crate::error::EngineError;
use std::collections::BTreeMap;
use std::ops::Bound;

/// Virtual nodes smooth key distribution across shards; this is the
/// `virtual_nodes` knob's effect made concrete in the ring's entry count.
fn hash128(s: &str) -> u128 {
    let digest = md5::compute(s.as_bytes());
    u128::from_be_bytes(digest.0)
}

/// An ordered consistent-hash ring: `(hash, shard_id)` pairs sorted
/// ascending by hash, one physical shard represented by `virtual_nodes`
/// entries.
#[derive(Debug, Clone, Default)]
pub struct Ring {
    entries: BTreeMap<u128, String>,
}

impl Ring {
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Build a ring from scratch. `shards` must not contain duplicates —
    /// the caller is responsible for that.
    pub fn with_shards<I, S>(shards: I, virtual_nodes: u32) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut ring = Self::new();
        for shard in shards {
            ring.add_shard(shard.as_ref(), virtual_nodes);
        }
        ring
    }

    /// Insert all `virtual_nodes` entries for `id`. Calling this twice for
    /// the same `id` produces duplicate entries; the caller must not do
    /// that (see `remove_shard` to undo a prior `add_shard` first).
    pub fn add_shard(&mut self, id: &str, virtual_nodes: u32) {
        for i in 0..virtual_nodes {
            let vnode_key = format!("{id}#{i}");
            self.entries.insert(hash128(&vnode_key), id.to_string());
        }
    }

    /// Delete every ring entry whose shard equals `id`. Silently succeeds
    /// if `id` isn't present.
    pub fn remove_shard(&mut self, id: &str) {
        self.entries.retain(|_, shard| shard != id);
    }

    /// Resolve `key` to its owning shard: the smallest ring hash strictly
    /// greater than `hash(key)`, wrapping to the first entry if none.
    pub fn resolve(&self, key: &str) -> Result<&str, EngineError> {
        if self.entries.is_empty() {
            return Err(EngineError::EmptyRing);
        }
        let hash = hash128(key);
        let shard = self
            .entries
            .range((Bound::Excluded(hash), Bound::Unbounded))
            .next()
            .or_else(|| self.entries.iter().next())
            .map(|(_, shard)| shard.as_str())
            .expect("ring is non-empty, checked above");
        Ok(shard)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}
