//! Write-coalescing visit counter engine with sharded backing storage.
//!
//! Three components, leaves first: [`ring`] maps a page key to a shard via
//! consistent hashing, [`shard`] owns one client per shard and exposes
//! counter semantics, and [`engine`] is the write-back cache and buffer that
//! ties them together. See each module for the invariants it maintains.

pub mod config;
pub mod engine;
pub mod error;
pub mod ring;
pub mod shard;

pub use config::Config;
pub use engine::CounterEngine;
pub use error::EngineError;
pub use ring::Ring;
pub use shard::{CounterStore, ShardConnector, ShardPool};
