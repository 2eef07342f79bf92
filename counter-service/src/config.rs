//! Environment-variable configuration loading: required keys fail startup
//! with a clear error, optional ones fall back to a documented default.

use anyhow::{Context, Result};
use counter_core::Config as EngineConfig;
use std::time::Duration;

pub struct Settings {
    pub engine: EngineConfig,
    pub listen_addr: String,
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        let shards = env_required("COUNTER_SHARDS")?
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>();
        if shards.is_empty() {
            anyhow::bail!("COUNTER_SHARDS must list at least one shard address");
        }

        let virtual_nodes = env_parsed_or("COUNTER_VIRTUAL_NODES", EngineConfig::DEFAULT_VIRTUAL_NODES)?;
        let flush_interval = Duration::from_secs(env_parsed_or(
            "COUNTER_FLUSH_INTERVAL_SECONDS",
            EngineConfig::DEFAULT_FLUSH_INTERVAL_SECONDS,
        )?);
        let shard_timeout = Duration::from_secs(env_parsed_or(
            "COUNTER_SHARD_TIMEOUT_SECONDS",
            EngineConfig::DEFAULT_SHARD_TIMEOUT_SECONDS,
        )?);

        // Unlike the other knobs, the cache TTL has no default: guessing
        // one here would paper over a missing piece of real configuration
        // rather than surface it at startup.
        let cache_ttl_seconds: u64 = env_required("COUNTER_CACHE_TTL_SECONDS")?
            .parse()
            .context("COUNTER_CACHE_TTL_SECONDS must be an integer number of seconds")?;
        let cache_ttl = Duration::from_secs(cache_ttl_seconds);

        let listen_addr = std::env::var("COUNTER_LISTEN_ADDR")
            .unwrap_or_else(|_| "127.0.0.1:3000".to_string());

        Ok(Self {
            engine: EngineConfig {
                shards,
                virtual_nodes,
                flush_interval,
                cache_ttl,
                shard_timeout,
            },
            listen_addr,
        })
    }
}

fn env_required(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("{key} must be set"))
}

fn env_parsed_or<T: std::str::FromStr>(key: &str, default: T) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .parse()
            .map_err(|e| anyhow::anyhow!("{key} is not valid: {e}")),
        Err(_) => Ok(default),
    }
}
