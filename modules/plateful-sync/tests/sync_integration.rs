//! End-to-end worker tests: Postgres (source of record + outbox) and Neo4j
//! containers, events flowing claim -> route -> rebuild -> mark.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use sqlx::PgPool;
use testcontainers::{ContainerAsync, GenericImage};

use plateful_common::{EventStatus, NewOutboxEvent, Operation, OwnerLabel};
use plateful_graph::testutil::neo4j_container;
use plateful_graph::{GraphClient, GraphReader, GraphWriter};
use plateful_outbox::testutil::postgres_container;
use plateful_outbox::{OutboxStore, OwnerLocks};
use plateful_sync::b2b::B2BPipeline;
use plateful_sync::b2c::B2CPipeline;
use plateful_sync::source::SourceReader;
use plateful_sync::{CompletionTracker, Router, SyncWorker};

struct Harness {
    _pg: ContainerAsync<GenericImage>,
    _neo4j: ContainerAsync<GenericImage>,
    pool: PgPool,
    client: GraphClient,
    store: OutboxStore,
    worker: SyncWorker,
    reader: GraphReader,
}

async fn harness() -> Harness {
    let (pg, pool) = postgres_container().await;
    let (neo4j, client) = neo4j_container().await;

    let store = OutboxStore::new(pool.clone());
    let writer = Arc::new(GraphWriter::new(client.clone()));
    let source = SourceReader::new(pool.clone());
    let locks = OwnerLocks::new(pool.clone());
    let router = Router::new(
        B2CPipeline::new(source.clone(), writer.clone(), locks.clone()),
        B2BPipeline::new(source, writer, locks),
    );
    let completion = CompletionTracker::new(store.clone(), 3, Duration::ZERO, Duration::ZERO);
    let worker = SyncWorker::new(
        store.clone(),
        router,
        completion,
        "test-worker".into(),
        10,
        Duration::from_millis(50),
        Duration::from_secs(60),
    );

    Harness {
        _pg: pg,
        _neo4j: neo4j,
        pool,
        reader: GraphReader::new(client.clone()),
        client,
        store,
        worker,
    }
}

fn ts(hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 8, 1, hour, 0, 0).unwrap()
}

fn b2c_event(customer_id: &str, op: Operation) -> NewOutboxEvent {
    NewOutboxEvent {
        aggregate_type: "b2c_interaction".into(),
        aggregate_id: customer_id.into(),
        source_table: "recipe_history".into(),
        operation: op,
        payload: None,
    }
}

fn b2b_event(vendor_user_id: &str, op: Operation) -> NewOutboxEvent {
    NewOutboxEvent {
        aggregate_type: "b2b_interaction".into(),
        aggregate_id: vendor_user_id.into(),
        source_table: "match_feedback".into(),
        operation: op,
        payload: None,
    }
}

async fn seed_customer(pool: &PgPool, id: &str) {
    sqlx::query("INSERT INTO b2c_customers (id, email) VALUES ($1, $2)")
        .bind(id)
        .bind(format!("{id}@example.com"))
        .execute(pool)
        .await
        .unwrap();
}

async fn add_history(pool: &PgPool, user: &str, recipe: &str, kind: &str, at: DateTime<Utc>) {
    sqlx::query(
        "INSERT INTO recipe_history (user_id, recipe_id, event_type, event_at) VALUES ($1, $2, $3, $4)",
    )
    .bind(user)
    .bind(recipe)
    .bind(kind)
    .bind(at)
    .execute(pool)
    .await
    .unwrap();
}

async fn add_rating(pool: &PgPool, user: &str, recipe: &str, rating: i32, at: DateTime<Utc>) {
    sqlx::query(
        "INSERT INTO recipe_ratings (b2c_customer_id, recipe_id, rating, created_at) VALUES ($1, $2, $3, $4)",
    )
    .bind(user)
    .bind(recipe)
    .bind(rating)
    .bind(at)
    .execute(pool)
    .await
    .unwrap();
}

#[tokio::test]
async fn c1_r1_scenario_builds_exactly_two_edges() {
    let h = harness().await;
    seed_customer(&h.pool, "c1").await;
    add_history(&h.pool, "c1", "r1", "viewed", ts(1)).await;
    add_rating(&h.pool, "c1", "r1", 5, ts(2)).await;

    let id = h.store.enqueue(&b2c_event("c1", Operation::Upsert)).await.unwrap();
    assert_eq!(h.worker.tick().await.unwrap(), 1);

    let edges = h.reader.edge_summary(OwnerLabel::B2CCustomer, "c1").await.unwrap();
    assert_eq!(edges.len(), 2);
    assert_eq!(edges[0].rel, "RATED");
    assert_eq!(edges[0].target_id, "r1");
    assert_eq!(edges[0].rating, Some(5));
    assert_eq!(edges[1].rel, "VIEWED");
    assert_eq!(edges[1].target_id, "r1");
    assert_eq!(edges[1].count, Some(1));

    let event = h.store.get(id).await.unwrap().unwrap();
    assert_eq!(event.status, EventStatus::Done);
}

#[tokio::test]
async fn dropped_history_rows_remove_their_edges() {
    let h = harness().await;
    seed_customer(&h.pool, "c1").await;
    add_history(&h.pool, "c1", "r1", "viewed", ts(1)).await;
    add_history(&h.pool, "c1", "r2", "cooked", ts(2)).await;

    h.store.enqueue(&b2c_event("c1", Operation::Upsert)).await.unwrap();
    h.worker.tick().await.unwrap();
    assert_eq!(
        h.reader.edge_summary(OwnerLabel::B2CCustomer, "c1").await.unwrap().len(),
        2
    );

    // r2 drops out of the history; the rebuild must not leave its edge behind.
    sqlx::query("DELETE FROM recipe_history WHERE recipe_id = 'r2'")
        .execute(&h.pool)
        .await
        .unwrap();
    h.store.enqueue(&b2c_event("c1", Operation::Upsert)).await.unwrap();
    h.worker.tick().await.unwrap();

    let edges = h.reader.edge_summary(OwnerLabel::B2CCustomer, "c1").await.unwrap();
    assert_eq!(edges.len(), 1);
    assert_eq!(edges[0].rel, "VIEWED");
    assert_eq!(edges[0].target_id, "r1");
}

#[tokio::test]
async fn reprocessing_the_same_state_is_idempotent() {
    let h = harness().await;
    seed_customer(&h.pool, "c1").await;
    add_history(&h.pool, "c1", "r1", "viewed", ts(1)).await;
    add_rating(&h.pool, "c1", "r1", 4, ts(2)).await;

    h.store.enqueue(&b2c_event("c1", Operation::Upsert)).await.unwrap();
    h.worker.tick().await.unwrap();
    let first = h.reader.edge_summary(OwnerLabel::B2CCustomer, "c1").await.unwrap();

    // Same source state, two more deliveries of equivalent events.
    h.store.enqueue(&b2c_event("c1", Operation::Upsert)).await.unwrap();
    h.store.enqueue(&b2c_event("c1", Operation::Upsert)).await.unwrap();
    h.worker.tick().await.unwrap();
    let second = h.reader.edge_summary(OwnerLabel::B2CCustomer, "c1").await.unwrap();

    assert_eq!(first, second);
}

#[tokio::test]
async fn delete_event_detaches_all_owned_edges() {
    let h = harness().await;
    seed_customer(&h.pool, "c1").await;
    add_history(&h.pool, "c1", "r1", "viewed", ts(1)).await;

    h.store.enqueue(&b2c_event("c1", Operation::Upsert)).await.unwrap();
    h.worker.tick().await.unwrap();

    // Source record removed upstream, delete notification follows.
    sqlx::query("DELETE FROM b2c_customers WHERE id = 'c1'")
        .execute(&h.pool)
        .await
        .unwrap();
    sqlx::query("DELETE FROM recipe_history WHERE user_id = 'c1'")
        .execute(&h.pool)
        .await
        .unwrap();
    let id = h.store.enqueue(&b2c_event("c1", Operation::Delete)).await.unwrap();
    h.worker.tick().await.unwrap();

    assert!(h.reader.edge_summary(OwnerLabel::B2CCustomer, "c1").await.unwrap().is_empty());
    assert!(!h.reader.node_exists(OwnerLabel::B2CCustomer, "c1").await.unwrap());
    assert_eq!(
        h.store.get(id).await.unwrap().unwrap().status,
        EventStatus::Done
    );
}

#[tokio::test]
async fn stale_delete_for_existing_customer_is_noop_success() {
    let h = harness().await;
    seed_customer(&h.pool, "c1").await;
    add_history(&h.pool, "c1", "r1", "viewed", ts(1)).await;

    h.store.enqueue(&b2c_event("c1", Operation::Upsert)).await.unwrap();
    h.worker.tick().await.unwrap();

    let id = h.store.enqueue(&b2c_event("c1", Operation::Delete)).await.unwrap();
    h.worker.tick().await.unwrap();

    assert_eq!(h.store.get(id).await.unwrap().unwrap().status, EventStatus::Done);
    // Edges untouched by the stale delete.
    assert_eq!(
        h.reader.edge_summary(OwnerLabel::B2CCustomer, "c1").await.unwrap().len(),
        1
    );
}

#[tokio::test]
async fn malformed_operation_dead_letters_on_first_attempt() {
    let h = harness().await;
    seed_customer(&h.pool, "c1").await;

    // Bypass the typed enqueue to simulate a corrupt upstream row.
    let id = sqlx::query_scalar::<_, i64>(
        r#"
        INSERT INTO outbox_events (aggregate_type, aggregate_id, source_table, operation)
        VALUES ('b2c_interaction', 'c1', 'recipe_history', 'banana')
        RETURNING id
        "#,
    )
    .fetch_one(&h.pool)
    .await
    .unwrap();

    h.worker.tick().await.unwrap();

    let event = h.store.get(id).await.unwrap().unwrap();
    assert_eq!(event.status, EventStatus::Dead);
    assert_eq!(event.attempt_count, 1);
    assert!(event.next_attempt_at.is_none(), "no retry scheduled");

    // A second tick finds nothing to claim.
    assert_eq!(h.worker.tick().await.unwrap(), 0);
}

#[tokio::test]
async fn b2b_latest_match_decision_wins() {
    let h = harness().await;
    sqlx::query("INSERT INTO vendor_users (id, email, role) VALUES ('v1', 'v1@vendor.test', 'buyer')")
        .execute(&h.pool)
        .await
        .unwrap();
    sqlx::query(
        "INSERT INTO vendor_user_actions (vendor_user_id, product_id, action_type, created_at)
         VALUES ('v1', 'p1', 'view_product', $1), ('v1', 'p1', 'view_product', $2)",
    )
    .bind(ts(1))
    .bind(ts(2))
    .execute(&h.pool)
    .await
    .unwrap();
    sqlx::query(
        "INSERT INTO match_feedback
            (vendor_user_id, source_product_id, target_product_id, feedback_type, reason, created_at)
         VALUES ('v1', 's1', 't1', 'approved', NULL, $1),
                ('v1', 's1', 't1', 'rejected', 'wrong size', $2)",
    )
    .bind(ts(3))
    .bind(ts(4))
    .execute(&h.pool)
    .await
    .unwrap();

    h.store.enqueue(&b2b_event("v1", Operation::Upsert)).await.unwrap();
    h.worker.tick().await.unwrap();

    let edges = h.reader.edge_summary(OwnerLabel::VendorUser, "v1").await.unwrap();
    assert_eq!(edges.len(), 2);
    assert_eq!(edges[0].rel, "REJECTED_MATCH");
    assert_eq!(edges[0].target_id, "t1");
    assert_eq!(edges[0].reason.as_deref(), Some("wrong size"));
    assert_eq!(edges[0].source_product_id.as_deref(), Some("s1"));
    assert_eq!(edges[1].rel, "VIEWED_PRODUCT");
    assert_eq!(edges[1].target_id, "p1");
    assert_eq!(edges[1].count, Some(2));
}

#[tokio::test]
async fn concurrent_rebuilds_of_one_owner_converge() {
    let h = harness().await;
    seed_customer(&h.pool, "c1").await;
    add_history(&h.pool, "c1", "r1", "viewed", ts(1)).await;
    add_history(&h.pool, "c1", "r2", "cooked", ts(2)).await;
    add_rating(&h.pool, "c1", "r1", 4, ts(3)).await;

    h.store.enqueue(&b2c_event("c1", Operation::Upsert)).await.unwrap();
    h.store.enqueue(&b2c_event("c1", Operation::Upsert)).await.unwrap();
    let batch = h
        .store
        .claim_batch(&["b2c_interaction"], 10, Duration::from_secs(60), "t")
        .await
        .unwrap();
    assert_eq!(batch.len(), 2);

    // Two pipelines processing the same customer at once, as two workers
    // would: the per-owner lock forces the rebuilds to run one after the
    // other, so neither replace sees a half-written edge set.
    let writer = Arc::new(GraphWriter::new(h.client.clone()));
    let a = B2CPipeline::new(
        SourceReader::new(h.pool.clone()),
        writer.clone(),
        OwnerLocks::new(h.pool.clone()),
    );
    let b = B2CPipeline::new(
        SourceReader::new(h.pool.clone()),
        writer,
        OwnerLocks::new(h.pool.clone()),
    );
    let (ra, rb) = tokio::join!(a.process(&batch[0]), b.process(&batch[1]));
    ra.unwrap();
    rb.unwrap();

    let edges = h.reader.edge_summary(OwnerLabel::B2CCustomer, "c1").await.unwrap();
    let pairs: Vec<(&str, &str)> = edges
        .iter()
        .map(|e| (e.rel.as_str(), e.target_id.as_str()))
        .collect();
    assert_eq!(
        pairs,
        vec![("COOKED", "r2"), ("RATED", "r1"), ("VIEWED", "r1")]
    );
}

#[tokio::test]
async fn b2b_and_b2c_rebuilds_do_not_cross_owners() {
    let h = harness().await;
    seed_customer(&h.pool, "c1").await;
    sqlx::query(
        "INSERT INTO customer_product_interactions
            (b2c_customer_id, product_id, interaction_type, interaction_timestamp)
         VALUES ('c1', 'p1', 'viewed', $1)",
    )
    .bind(ts(1))
    .execute(&h.pool)
    .await
    .unwrap();
    sqlx::query("INSERT INTO vendor_users (id) VALUES ('v1')")
        .execute(&h.pool)
        .await
        .unwrap();
    sqlx::query(
        "INSERT INTO vendor_user_actions (vendor_user_id, product_id, action_type, created_at)
         VALUES ('v1', 'p1', 'view_product', $1)",
    )
    .bind(ts(2))
    .execute(&h.pool)
    .await
    .unwrap();

    h.store.enqueue(&b2c_event("c1", Operation::Upsert)).await.unwrap();
    h.store.enqueue(&b2b_event("v1", Operation::Upsert)).await.unwrap();
    h.worker.tick().await.unwrap();

    // Both owners point at the same Product node; rebuilding one owner must
    // not disturb the other's edge.
    sqlx::query("DELETE FROM vendor_user_actions WHERE vendor_user_id = 'v1'")
        .execute(&h.pool)
        .await
        .unwrap();
    h.store.enqueue(&b2b_event("v1", Operation::Upsert)).await.unwrap();
    h.worker.tick().await.unwrap();

    assert!(h.reader.edge_summary(OwnerLabel::VendorUser, "v1").await.unwrap().is_empty());
    let c1 = h.reader.edge_summary(OwnerLabel::B2CCustomer, "c1").await.unwrap();
    assert_eq!(c1.len(), 1);
    assert_eq!(c1[0].rel, "VIEWED_PRODUCT");
}
