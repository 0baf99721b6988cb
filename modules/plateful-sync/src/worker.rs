//! The claim loop: poll the outbox, hand each claimed event to the router,
//! record outcomes, repeat. One cooperative loop per worker process; multiple
//! processes compete on the same table via skip-locked claiming.

use std::time::Duration;

use tokio::sync::watch;
use tracing::{info, warn};

use plateful_common::SYNCED_AGGREGATE_TYPES;
use plateful_outbox::OutboxStore;

use crate::completion::CompletionTracker;
use crate::router::Router;

pub struct SyncWorker {
    store: OutboxStore,
    router: Router,
    completion: CompletionTracker,
    worker_id: String,
    batch_size: i64,
    poll_interval: Duration,
    lease_duration: Duration,
}

impl SyncWorker {
    pub fn new(
        store: OutboxStore,
        router: Router,
        completion: CompletionTracker,
        worker_id: String,
        batch_size: i64,
        poll_interval: Duration,
        lease_duration: Duration,
    ) -> Self {
        Self {
            store,
            router,
            completion,
            worker_id,
            batch_size,
            poll_interval,
            lease_duration,
        }
    }

    /// Claim and fully process one batch. Events run sequentially in claim
    /// order so same-entity events keep their sequence within the batch.
    /// Returns the number of events handled.
    pub async fn tick(&self) -> Result<usize, sqlx::Error> {
        let batch = self
            .store
            .claim_batch(
                SYNCED_AGGREGATE_TYPES,
                self.batch_size,
                self.lease_duration,
                &self.worker_id,
            )
            .await?;

        let claimed = batch.len();
        for event in batch {
            let outcome = self.router.dispatch(&event).await;
            if let Err(e) = self.completion.record(&event, outcome).await {
                // The status update failed; the lease will expire and the
                // event will be redelivered. Idempotent rebuilds make the
                // duplicate run harmless.
                warn!(event_id = event.id, error = %e, "Failed to record event outcome");
            }
        }
        Ok(claimed)
    }

    /// Run until `shutdown` flips to true. Cooperative: a shutdown signal
    /// stops new claims, but the batch in flight always drains; no event is
    /// abandoned mid-rebuild.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(worker_id = self.worker_id.as_str(), "Sync worker started");

        while !*shutdown.borrow() {
            match self.tick().await {
                Ok(0) => {
                    tokio::select! {
                        _ = tokio::time::sleep(self.poll_interval) => {}
                        _ = shutdown.changed() => {}
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    // Claiming failed (Postgres hiccup). Back off one poll
                    // interval and try again; never crash the loop.
                    warn!(error = %e, "Claim failed, retrying after poll interval");
                    tokio::select! {
                        _ = tokio::time::sleep(self.poll_interval) => {}
                        _ = shutdown.changed() => {}
                    }
                }
            }
        }

        info!(worker_id = self.worker_id.as_str(), "Sync worker drained and stopped");
    }
}
