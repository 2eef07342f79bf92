//! Shard pool: owns one client per shard, routes operations through the
//! ring, and exposes `INCRBY`/`GET` counter semantics.

use crate::error::EngineError;
use crate::ring::Ring;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// The abstract backend counter store each shard is treated as: an
/// atomic add-and-return and a read that reports absence as zero. The
/// concrete wire protocol is out of scope — this trait is the seam.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Atomic add-and-return; creates the key as 0 if absent.
    async fn incrby(&self, key: &str, delta: u64) -> anyhow::Result<i64>;

    /// Current value, or `None` if the key is absent (the engine treats
    /// absence as 0, but this layer keeps the distinction).
    async fn get(&self, key: &str) -> anyhow::Result<Option<i64>>;
}

/// Produces one [`CounterStore`] handle per shard identifier at pool
/// construction time. Kept as a trait (rather than a bare closure) so
/// production and test pools can swap connection strategies.
#[async_trait]
pub trait ShardConnector: Send + Sync {
    async fn connect(&self, shard_id: &str) -> anyhow::Result<Arc<dyn CounterStore>>;
}

/// Extract the host portion of a shard identifier, e.g. the host of
/// `redis://h:6379/0` is `h`. Used as the `served_via` provenance label on
/// a cache miss.
pub fn host_of(shard_id: &str) -> String {
    let after_scheme = shard_id
        .split_once("//")
        .map(|(_, rest)| rest)
        .unwrap_or(shard_id);
    after_scheme
        .split(|c| c == ':' || c == '/')
        .next()
        .unwrap_or(after_scheme)
        .to_string()
}

/// Owns per-shard clients and the ring that routes to them.
pub struct ShardPool {
    ring: RwLock<Ring>,
    clients: HashMap<String, Arc<dyn CounterStore>>,
    timeout: Duration,
}

impl ShardPool {
    /// Attempt to initialize a client for each of `shard_ids`. A shard
    /// whose connector fails is logged and omitted from both the pool and
    /// the ring, so no key can ever resolve to a dead client; callers
    /// decide whether zero surviving shards is itself fatal.
    pub async fn new(
        shard_ids: &[String],
        virtual_nodes: u32,
        timeout: Duration,
        connector: &dyn ShardConnector,
    ) -> Self {
        let mut ring = Ring::new();
        let mut clients = HashMap::new();

        for id in shard_ids {
            match connector.connect(id).await {
                Ok(client) => {
                    ring.add_shard(id, virtual_nodes);
                    clients.insert(id.clone(), client);
                }
                Err(err) => {
                    tracing::warn!(
                        shard = %id,
                        error = %err,
                        "failed to initialize shard client; dropping shard from pool and ring"
                    );
                }
            }
        }

        Self {
            ring: RwLock::new(ring),
            clients,
            timeout,
        }
    }

    pub fn resolve(&self, key: &str) -> Result<String, EngineError> {
        self.ring.read().resolve(key).map(|s| s.to_string())
    }

    fn client_for(&self, shard: &str) -> Result<Arc<dyn CounterStore>, EngineError> {
        self.clients
            .get(shard)
            .cloned()
            .ok_or_else(|| EngineError::ShardUnavailable(shard.to_string()))
    }

    /// Resolve `key`'s shard and issue an atomic add-by-`delta`. Not
    /// retried at this layer — the caller decides.
    pub async fn increment(&self, key: &str, delta: u64) -> Result<(), EngineError> {
        let shard = self.resolve(key)?;
        let client = self.client_for(&shard)?;

        tokio::time::timeout(self.timeout, client.incrby(key, delta))
            .await
            .map_err(|_| EngineError::ShardIoError {
                shard: shard.clone(),
                source: anyhow::anyhow!("incrby timed out after {:?}", self.timeout),
            })?
            .map_err(|source| EngineError::ShardIoError {
                shard: shard.clone(),
                source,
            })?;

        Ok(())
    }

    /// Resolve `key`'s shard and read its current value, reporting the
    /// shard identifier that served it. A missing counter reads as 0.
    pub async fn get(&self, key: &str) -> Result<(i64, String), EngineError> {
        let shard = self.resolve(key)?;
        let client = self.client_for(&shard)?;

        let value = tokio::time::timeout(self.timeout, client.get(key))
            .await
            .map_err(|_| EngineError::ShardIoError {
                shard: shard.clone(),
                source: anyhow::anyhow!("get timed out after {:?}", self.timeout),
            })?
            .map_err(|source| EngineError::ShardIoError {
                shard: shard.clone(),
                source,
            })?;

        Ok((value.unwrap_or(0), shard))
    }

    pub fn shard_count(&self) -> usize {
        self.clients.len()
    }
}

/// Production [`CounterStore`] backed by a single Redis-compatible node.
/// `ConnectionManager` is cheap to clone and internally multiplexed, so
/// it is meant to be handed out to concurrent callers rather than gated
/// behind one exclusive lock; this keeps a small pool of them (checked
/// out per call, returned afterward, growing past `POOL_SIZE` under
/// burst load) so concurrent increments/gets to the same shard don't
/// serialize on each other.
pub struct RedisCounterStore {
    client: redis::Client,
    connections: tokio::sync::RwLock<Vec<redis::aio::ConnectionManager>>,
}

impl RedisCounterStore {
    const POOL_SIZE: usize = 10;

    pub async fn connect(url: &str) -> anyhow::Result<Self> {
        let client = redis::Client::open(url)?;
        let mut connections = Vec::with_capacity(Self::POOL_SIZE);
        for _ in 0..Self::POOL_SIZE {
            connections.push(client.get_connection_manager().await?);
        }
        Ok(Self {
            client,
            connections: tokio::sync::RwLock::new(connections),
        })
    }

    async fn checkout(&self) -> anyhow::Result<redis::aio::ConnectionManager> {
        let mut pool = self.connections.write().await;
        match pool.pop() {
            Some(conn) => Ok(conn),
            None => Ok(self.client.get_connection_manager().await?),
        }
    }

    async fn checkin(&self, conn: redis::aio::ConnectionManager) {
        let mut pool = self.connections.write().await;
        if pool.len() < Self::POOL_SIZE {
            pool.push(conn);
        }
    }
}

#[async_trait]
impl CounterStore for RedisCounterStore {
    async fn incrby(&self, key: &str, delta: u64) -> anyhow::Result<i64> {
        use redis::AsyncCommands;
        let mut conn = self.checkout().await?;
        let result = conn.incr(key, delta).await;
        self.checkin(conn).await;
        Ok(result?)
    }

    async fn get(&self, key: &str) -> anyhow::Result<Option<i64>> {
        use redis::AsyncCommands;
        let mut conn = self.checkout().await?;
        let result = conn.get(key).await;
        self.checkin(conn).await;
        Ok(result?)
    }
}

/// Connects every shard identifier as a Redis URL via [`RedisCounterStore`].
pub struct RedisShardConnector;

#[async_trait]
impl ShardConnector for RedisShardConnector {
    async fn connect(&self, shard_id: &str) -> anyhow::Result<Arc<dyn CounterStore>> {
        let store = RedisCounterStore::connect(shard_id).await?;
        Ok(Arc::new(store))
    }
}
