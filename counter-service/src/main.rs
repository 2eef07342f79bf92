//! Entry point: loads configuration from the environment, wires the shard
//! pool and counter engine together, and serves the HTTP surface until a
//! shutdown signal triggers a final flush.

use anyhow::{Context, Result};
use clap::Parser;
use counter_core::shard::RedisShardConnector;
use counter_core::{CounterEngine, ShardPool};
use counter_service::{api, config};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "counter-service")]
#[command(about = "Write-coalescing visit counter")]
struct Cli {
    /// Overrides COUNTER_LISTEN_ADDR.
    #[arg(short, long)]
    addr: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let settings = config::Settings::from_env().context("loading configuration from environment")?;
    let listen_addr = cli.addr.unwrap_or_else(|| settings.listen_addr.clone());

    tracing::info!(
        shards = settings.engine.shards.len(),
        virtual_nodes = settings.engine.virtual_nodes,
        flush_interval = ?settings.engine.flush_interval,
        cache_ttl = ?settings.engine.cache_ttl,
        "starting counter-service"
    );

    let pool = ShardPool::new(
        &settings.engine.shards,
        settings.engine.virtual_nodes,
        settings.engine.shard_timeout,
        &RedisShardConnector,
    )
    .await;
    if pool.shard_count() == 0 {
        anyhow::bail!("no shard clients initialized successfully; refusing to start");
    }
    let pool = Arc::new(pool);

    let engine = CounterEngine::new(pool, &settings.engine);
    engine.start();

    let app = api::router(Arc::clone(&engine));
    let listener = tokio::net::TcpListener::bind(&listen_addr)
        .await
        .with_context(|| format!("binding {listen_addr}"))?;
    tracing::info!(addr = %listen_addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving HTTP")?;

    tracing::info!("shutdown signal received, performing final flush");
    engine.stop().await.context("final flush on shutdown")?;

    Ok(())
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("failed to install ctrl-c handler");
}
