//! The write-back cache and buffer: absorbs writes with minimal latency,
//! flushes them in batches, serves reads from a short-lived memory cache,
//! and preserves count monotonicity.

use crate::config::Config;
use crate::error::EngineError;
use crate::shard::ShardPool;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tokio::task::JoinHandle;

/// `Created -> Started -> Stopping -> Stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Created,
    Started,
    Stopping,
    Stopped,
}

#[derive(Debug, Clone, Copy)]
struct CacheEntry {
    count: i64,
    stamp: Instant,
}

/// The counter engine. Construct with [`CounterEngine::new`], then call
/// [`CounterEngine::start`] to begin the periodic flusher and
/// [`CounterEngine::stop`] to drain it on shutdown.
pub struct CounterEngine {
    shard_pool: Arc<ShardPool>,
    buffer: Mutex<HashMap<String, u64>>,
    cache: Mutex<HashMap<String, CacheEntry>>,
    /// Serializes concurrent `flush()` calls so exactly one drains the
    /// buffer at a time; a caller that arrives mid-flush simply waits for
    /// the in-flight flush rather than racing it.
    flush_gate: tokio::sync::Mutex<()>,
    flush_interval: Duration,
    cache_ttl: Duration,
    lifecycle: Mutex<Lifecycle>,
    flusher: Mutex<Option<JoinHandle<()>>>,
    shutdown: Notify,
}

impl CounterEngine {
    pub fn new(shard_pool: Arc<ShardPool>, config: &Config) -> Arc<Self> {
        Arc::new(Self {
            shard_pool,
            buffer: Mutex::new(HashMap::new()),
            cache: Mutex::new(HashMap::new()),
            flush_gate: tokio::sync::Mutex::new(()),
            flush_interval: config.flush_interval,
            cache_ttl: config.cache_ttl,
            lifecycle: Mutex::new(Lifecycle::Created),
            flusher: Mutex::new(None),
            shutdown: Notify::new(),
        })
    }

    fn lifecycle(&self) -> Lifecycle {
        *self.lifecycle.lock()
    }

    /// Increment `buffer[key]` by 1. Constant-time, never blocks on I/O.
    pub fn record_visit(&self, key: &str) -> Result<(), EngineError> {
        if self.lifecycle() == Lifecycle::Stopped {
            return Err(EngineError::ShuttingDown);
        }
        let mut buffer = self.buffer.lock();
        *buffer.entry(key.to_string()).or_insert(0) += 1;
        Ok(())
    }

    fn buffered(&self, key: &str) -> u64 {
        self.buffer.lock().get(key).copied().unwrap_or(0)
    }

    /// Drain the buffer into the shard pool in one batch. Serialized
    /// against other concurrent callers via `flush_gate`.
    pub async fn flush(&self) -> Result<(), EngineError> {
        let _gate = self.flush_gate.lock().await;

        let snapshot: HashMap<String, u64> = {
            let mut buffer = self.buffer.lock();
            std::mem::take(&mut *buffer)
        };
        if snapshot.is_empty() {
            return Ok(());
        }

        // Advance the local cache before issuing remote increments: a
        // reader can now see these deltas as persisted even while the
        // shard write is still in flight, which is what keeps reads
        // monotonic across a flush.
        {
            let now = Instant::now();
            let mut cache = self.cache.lock();
            for (key, delta) in &snapshot {
                let entry = cache
                    .entry(key.clone())
                    .or_insert(CacheEntry { count: 0, stamp: now });
                entry.count += *delta as i64;
            }
        }

        for (key, delta) in snapshot {
            if let Err(err) = self.shard_pool.increment(&key, delta).await {
                // Best-effort durability: the buffer was already drained,
                // so a failed increment here is a known durability gap,
                // not something this layer retries.
                tracing::error!(
                    key = %key,
                    delta,
                    error = %err,
                    "shard increment failed during flush; delta not retried"
                );
            }
        }

        Ok(())
    }

    /// The read path: serve from the cache when warm, otherwise flush and
    /// refresh from the shard pool first.
    pub async fn query(&self, key: &str) -> Result<(i64, String), EngineError> {
        if self.lifecycle() == Lifecycle::Stopped {
            return Err(EngineError::ShuttingDown);
        }

        // A key with no cache entry yet gets one synthesized on the spot,
        // stamped "now" rather than epoch, mirroring the original's
        // `reset()` (called from `get()` on a cache miss). That makes the
        // entry warm immediately, so a key's first-ever query is served
        // from memory instead of forcing a shard round trip.
        let cached = {
            let mut cache = self.cache.lock();
            *cache.entry(key.to_string()).or_insert_with(|| CacheEntry {
                count: 0,
                stamp: Instant::now(),
            })
        };

        let is_stale = cached.stamp.elapsed() > self.cache_ttl;

        if is_stale {
            self.flush().await?;
            let (fresh, served_via) = self.shard_pool.get(key).await?;
            self.cache.lock().insert(
                key.to_string(),
                CacheEntry {
                    count: fresh,
                    stamp: Instant::now(),
                },
            );
            let pending = self.buffered(key);
            Ok((fresh + pending as i64, served_via))
        } else {
            let pending = self.buffered(key);
            Ok((cached.count + pending as i64, "in_memory".to_string()))
        }
    }

    /// Start the periodic flusher: sleep `flush_interval`, call `flush`,
    /// repeat, until `stop()` cancels it.
    pub fn start(self: &Arc<Self>) {
        *self.lifecycle.lock() = Lifecycle::Started;

        let engine = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(engine.flush_interval);
            // The first tick fires immediately; the flusher is defined to
            // sleep first, so consume that tick without flushing.
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        if let Err(err) = engine.flush().await {
                            tracing::error!(error = %err, "periodic flush failed");
                        }
                    }
                    _ = engine.shutdown.notified() => break,
                }
            }
        });
        *self.flusher.lock() = Some(handle);
    }

    /// Cancel the periodic flusher and perform one final flush before
    /// returning, so every delta accepted before shutdown is issued to
    /// its shard.
    pub async fn stop(&self) -> Result<(), EngineError> {
        *self.lifecycle.lock() = Lifecycle::Stopping;
        self.shutdown.notify_one();

        let handle = self.flusher.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }

        let result = self.flush().await;
        *self.lifecycle.lock() = Lifecycle::Stopped;
        result
    }
}

#[cfg(test)]
mod tests;
