//! Error taxonomy for the counter engine.

/// Errors surfaced by the ring router, shard pool, and counter engine.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// A lookup was attempted against a ring with no shards registered.
    /// Fatal at request scope.
    #[error("no shards registered in the ring")]
    EmptyRing,

    /// The ring resolved `key` to a shard whose client failed to
    /// initialize at startup and was therefore omitted from the pool.
    #[error("shard `{0}` has no initialized client")]
    ShardUnavailable(String),

    /// A specific shard call (`INCRBY`/`GET`) failed or timed out.
    #[error("I/O error on shard `{shard}`: {source}")]
    ShardIoError {
        shard: String,
        source: anyhow::Error,
    },

    /// The engine is past its terminal flush; new writes are refused.
    #[error("engine is shutting down")]
    ShuttingDown,
}
