use std::sync::Arc;

use anyhow::Result;
use sqlx::postgres::PgPoolOptions;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::EnvFilter;

use plateful_common::Config;
use plateful_graph::{GraphClient, GraphWriter};
use plateful_outbox::{OutboxStore, OwnerLocks};
use plateful_sync::b2b::B2BPipeline;
use plateful_sync::b2c::B2CPipeline;
use plateful_sync::source::SourceReader;
use plateful_sync::{CompletionTracker, Router, SyncWorker};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("plateful=info".parse()?))
        .init();

    info!("Plateful graph sync worker starting...");

    let config = Config::from_env();

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await?;

    let store = OutboxStore::new(pool.clone());
    store.migrate().await?;

    let client = GraphClient::connect(
        &config.neo4j_uri,
        &config.neo4j_user,
        &config.neo4j_password,
    )
    .await?;
    let writer = Arc::new(GraphWriter::new(client));

    let source = SourceReader::new(pool.clone());
    let locks = OwnerLocks::new(pool.clone());
    let router = Router::new(
        B2CPipeline::new(source.clone(), writer.clone(), locks.clone()),
        B2BPipeline::new(source, writer, locks),
    );
    let completion = CompletionTracker::new(
        store.clone(),
        config.max_attempts,
        config.backoff_base,
        config.backoff_cap,
    );

    let worker = SyncWorker::new(
        store,
        router,
        completion,
        config.worker_id.clone(),
        config.batch_size,
        config.poll_interval,
        config.lease_duration,
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown signal received, draining current batch");
            let _ = shutdown_tx.send(true);
        }
    });

    worker.run(shutdown_rx).await;
    Ok(())
}
