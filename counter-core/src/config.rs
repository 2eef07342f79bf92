//! Typed, environment-agnostic configuration for the counter engine.
//! Turning environment strings into this struct is `counter-service`'s
//! job; `counter-core` never reads `std::env` itself.

use std::time::Duration;

/// Configuration knobs the engine and shard pool are built from.
#[derive(Debug, Clone)]
pub struct Config {
    /// Shard identifiers; populates both the ring and the pool.
    pub shards: Vec<String>,
    /// Ring positions per shard. Higher = more balanced, more memory.
    pub virtual_nodes: u32,
    /// Period of the background flusher.
    pub flush_interval: Duration,
    /// Freshness window for cache entries. Required — left undeclared,
    /// its absence should be a startup error in `counter-service`, not a
    /// silent default.
    pub cache_ttl: Duration,
    /// Per-call shard I/O timeout.
    pub shard_timeout: Duration,
}

impl Config {
    pub const DEFAULT_VIRTUAL_NODES: u32 = 100;
    pub const DEFAULT_FLUSH_INTERVAL_SECONDS: u64 = 30;
    pub const DEFAULT_SHARD_TIMEOUT_SECONDS: u64 = 5;
}
