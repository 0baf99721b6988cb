use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::time::Duration;
use tracing::{debug, warn};

use plateful_common::{EventStatus, NewOutboxEvent, OutboxEvent};

/// Read/lock/mark interface over the `outbox_events` table.
#[derive(Clone)]
pub struct OutboxStore {
    pool: PgPool,
}

/// Raw `outbox_events` row. Status is converted to the typed enum at the
/// adapter boundary.
#[derive(Debug, sqlx::FromRow)]
struct OutboxRow {
    id: i64,
    aggregate_type: String,
    aggregate_id: String,
    source_table: String,
    operation: String,
    payload: Option<serde_json::Value>,
    status: String,
    attempt_count: i32,
    claimed_by: Option<String>,
    claimed_at: Option<DateTime<Utc>>,
    lease_expires_at: Option<DateTime<Utc>>,
    next_attempt_at: Option<DateTime<Utc>>,
    last_error: Option<String>,
    created_at: DateTime<Utc>,
}

impl OutboxRow {
    fn into_event(self) -> Result<OutboxEvent, sqlx::Error> {
        let status = EventStatus::parse(&self.status).ok_or_else(|| {
            sqlx::Error::Decode(format!("unknown outbox status {:?}", self.status).into())
        })?;
        Ok(OutboxEvent {
            id: self.id,
            aggregate_type: self.aggregate_type,
            aggregate_id: self.aggregate_id,
            source_table: self.source_table,
            operation: self.operation,
            payload: self.payload,
            status,
            attempt_count: self.attempt_count,
            claimed_by: self.claimed_by,
            claimed_at: self.claimed_at,
            lease_expires_at: self.lease_expires_at,
            next_attempt_at: self.next_attempt_at,
            last_error: self.last_error,
            created_at: self.created_at,
        })
    }
}

impl OutboxStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Run the embedded SQL migrations (outbox table only; source tables are
    /// owned by the upstream application).
    pub async fn migrate(&self) -> Result<(), sqlx::Error> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(sqlx::Error::from)?;
        Ok(())
    }

    /// Claim a batch of events for this worker.
    ///
    /// Eligible rows are pending, failed-and-due-for-retry, or carrying an
    /// expired lease from a crashed worker. `FOR UPDATE SKIP LOCKED` makes
    /// concurrent workers partition the pending set instead of blocking:
    /// a row locked by another in-flight claim is simply not returned.
    pub async fn claim_batch(
        &self,
        aggregate_types: &[&str],
        limit: i64,
        lease: Duration,
        claimed_by: &str,
    ) -> Result<Vec<OutboxEvent>, sqlx::Error> {
        let types: Vec<String> = aggregate_types.iter().map(|s| s.to_string()).collect();
        let rows = sqlx::query_as::<_, OutboxRow>(
            r#"
            WITH claimable AS (
                SELECT id
                FROM outbox_events
                WHERE aggregate_type = ANY($1)
                  AND (
                       status = 'pending'
                    OR (status = 'failed' AND next_attempt_at <= now())
                    OR (status = 'claimed' AND lease_expires_at < now())
                  )
                ORDER BY created_at, id
                LIMIT $2
                FOR UPDATE SKIP LOCKED
            )
            UPDATE outbox_events e
            SET status = 'claimed',
                claimed_by = $3,
                claimed_at = now(),
                lease_expires_at = now() + make_interval(secs => $4),
                next_attempt_at = NULL
            FROM claimable c
            WHERE e.id = c.id
            RETURNING e.*
            "#,
        )
        .bind(&types)
        .bind(limit)
        .bind(claimed_by)
        .bind(lease.as_secs_f64())
        .fetch_all(&self.pool)
        .await?;

        let mut events = rows
            .into_iter()
            .map(OutboxRow::into_event)
            .collect::<Result<Vec<_>, _>>()?;
        // UPDATE ... RETURNING does not guarantee row order; restore the
        // oldest-first contract so same-entity events replay in sequence.
        events.sort_by(|a, b| (a.created_at, a.id).cmp(&(b.created_at, b.id)));

        if !events.is_empty() {
            debug!(claimed = events.len(), claimed_by, "Claimed outbox batch");
        }
        Ok(events)
    }

    /// Terminal success. Only applies while the caller still holds the claim:
    /// a worker whose lease expired mid-flight reports into the void, because
    /// the row has moved on (reclaimed, done, or replayed by an operator).
    pub async fn mark_done(&self, id: i64, claimed_by: &str) -> Result<(), sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE outbox_events
            SET status = 'done',
                claimed_by = NULL,
                claimed_at = NULL,
                lease_expires_at = NULL,
                last_error = NULL
            WHERE id = $1 AND status = 'claimed' AND claimed_by = $2
            "#,
        )
        .bind(id)
        .bind(claimed_by)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            warn!(event_id = id, claimed_by, "Stale mark_done ignored, claim no longer held");
        }
        Ok(())
    }

    /// Transient failure: release the claim and reschedule after `retry_in`.
    /// Once the attempt count reaches `max_attempts` the event goes to the
    /// dead-letter state instead and stays there for operator intervention.
    /// Guarded by `claimed_by` the same way as [`OutboxStore::mark_done`].
    pub async fn mark_failed(
        &self,
        id: i64,
        claimed_by: &str,
        error: &str,
        retry_in: Duration,
        max_attempts: i32,
    ) -> Result<(), sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE outbox_events
            SET attempt_count = attempt_count + 1,
                status = CASE
                    WHEN attempt_count + 1 >= $5 THEN 'dead'
                    ELSE 'failed'
                END,
                next_attempt_at = CASE
                    WHEN attempt_count + 1 >= $5 THEN NULL
                    ELSE now() + make_interval(secs => $4)
                END,
                claimed_by = NULL,
                claimed_at = NULL,
                lease_expires_at = NULL,
                last_error = $3
            WHERE id = $1 AND status = 'claimed' AND claimed_by = $2
            "#,
        )
        .bind(id)
        .bind(claimed_by)
        .bind(error)
        .bind(retry_in.as_secs_f64())
        .bind(max_attempts)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            warn!(event_id = id, claimed_by, "Stale mark_failed ignored, claim no longer held");
        }
        Ok(())
    }

    /// Permanent failure: dead-letter immediately, no retry scheduled. The
    /// attempt that discovered the problem still counts.
    pub async fn mark_dead(&self, id: i64, claimed_by: &str, error: &str) -> Result<(), sqlx::Error> {
        warn!(event_id = id, error, "Dead-lettering outbox event");
        let result = sqlx::query(
            r#"
            UPDATE outbox_events
            SET attempt_count = attempt_count + 1,
                status = 'dead',
                next_attempt_at = NULL,
                claimed_by = NULL,
                claimed_at = NULL,
                lease_expires_at = NULL,
                last_error = $3
            WHERE id = $1 AND status = 'claimed' AND claimed_by = $2
            "#,
        )
        .bind(id)
        .bind(claimed_by)
        .bind(error)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            warn!(event_id = id, claimed_by, "Stale mark_dead ignored, claim no longer held");
        }
        Ok(())
    }

    /// Append a new event. Used by tests and by upstream writers that share
    /// this crate; production inserts normally happen in the upstream
    /// application's own transaction.
    pub async fn enqueue(&self, event: &NewOutboxEvent) -> Result<i64, sqlx::Error> {
        let id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO outbox_events
                (aggregate_type, aggregate_id, source_table, operation, payload)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id
            "#,
        )
        .bind(&event.aggregate_type)
        .bind(&event.aggregate_id)
        .bind(&event.source_table)
        .bind(event.operation.as_str())
        .bind(&event.payload)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    /// Fetch one event by id, regardless of status.
    pub async fn get(&self, id: i64) -> Result<Option<OutboxEvent>, sqlx::Error> {
        let row = sqlx::query_as::<_, OutboxRow>("SELECT * FROM outbox_events WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(OutboxRow::into_event).transpose()
    }

    /// Dead-lettered events, oldest first. Operator surface: these are never
    /// silently dropped and stay until replayed or purged by hand.
    pub async fn list_dead(&self, limit: i64) -> Result<Vec<OutboxEvent>, sqlx::Error> {
        let rows = sqlx::query_as::<_, OutboxRow>(
            r#"
            SELECT * FROM outbox_events
            WHERE status = 'dead'
            ORDER BY created_at, id
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(OutboxRow::into_event).collect()
    }

    /// Requeue a dead event after the underlying condition is fixed. Resets
    /// the attempt counter; returns false if the event was not dead.
    pub async fn replay(&self, id: i64) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE outbox_events
            SET status = 'pending',
                attempt_count = 0,
                next_attempt_at = NULL,
                last_error = NULL
            WHERE id = $1 AND status = 'dead'
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
