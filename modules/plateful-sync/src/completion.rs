//! Records event outcomes back onto the outbox: success, retry with backoff,
//! or immediate dead-letter for permanent failures.

use std::time::Duration;

use tracing::{debug, warn};

use plateful_common::{OutboxEvent, SyncError};
use plateful_outbox::OutboxStore;

pub struct CompletionTracker {
    store: OutboxStore,
    max_attempts: i32,
    backoff_base: Duration,
    backoff_cap: Duration,
}

impl CompletionTracker {
    pub fn new(
        store: OutboxStore,
        max_attempts: i32,
        backoff_base: Duration,
        backoff_cap: Duration,
    ) -> Self {
        Self {
            store,
            max_attempts,
            backoff_base,
            backoff_cap,
        }
    }

    /// Turn a pipeline outcome into a status transition. Every claimed event
    /// ends in exactly one of done / failed / dead; nothing is dropped. The
    /// event's own `claimed_by` rides along so a worker that outlived its
    /// lease cannot regress a row another worker already settled.
    pub async fn record(
        &self,
        event: &OutboxEvent,
        outcome: Result<(), SyncError>,
    ) -> Result<(), sqlx::Error> {
        let claimed_by = event.claimed_by.as_deref().unwrap_or_default();
        match outcome {
            Ok(()) => {
                debug!(event_id = event.id, "Event processed");
                self.store.mark_done(event.id, claimed_by).await
            }
            Err(e) if e.is_permanent() => {
                warn!(event_id = event.id, error = %e, "Permanent failure, dead-lettering");
                self.store.mark_dead(event.id, claimed_by, &e.to_string()).await
            }
            Err(e) => {
                let delay = backoff_delay(self.backoff_base, self.backoff_cap, event.attempt_count);
                warn!(
                    event_id = event.id,
                    attempt = event.attempt_count + 1,
                    retry_in_secs = delay.as_secs(),
                    error = %e,
                    "Transient failure, rescheduling"
                );
                self.store
                    .mark_failed(event.id, claimed_by, &e.to_string(), delay, self.max_attempts)
                    .await
            }
        }
    }
}

/// Exponential backoff: base * 2^prior_attempts, capped.
fn backoff_delay(base: Duration, cap: Duration, prior_attempts: i32) -> Duration {
    let shift = prior_attempts.clamp(0, 16) as u32;
    base.saturating_mul(1u32 << shift).min(cap)
}
