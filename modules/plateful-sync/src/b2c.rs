//! B2C aggregation pipeline: rebuilds a customer's full interaction edge set
//! from the source rows, then replaces it in the graph atomically.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use plateful_common::{
    DesiredEdge, EdgeProps, Operation, OutboxEvent, Owner, OwnerLabel, RelType, SyncError,
};
use plateful_graph::GraphWriter;
use plateful_outbox::OwnerLocks;

use crate::source::{
    ProductInteractionRow, RecipeHistoryRow, RecipeRatingRow, SavedRecipeRow, SourceReader,
};

const LOCK_NAMESPACE: &str = "b2c";

pub struct B2CPipeline {
    source: SourceReader,
    writer: Arc<GraphWriter>,
    locks: OwnerLocks,
}

impl B2CPipeline {
    pub fn new(source: SourceReader, writer: Arc<GraphWriter>, locks: OwnerLocks) -> Self {
        Self {
            source,
            writer,
            locks,
        }
    }

    /// Rebuild (or detach) the customer named by the event. Idempotent: the
    /// outcome depends only on the current source rows, not on how many times
    /// or in what order events for this customer were processed.
    pub async fn process(&self, event: &OutboxEvent) -> Result<(), SyncError> {
        let customer_id = event.aggregate_id.trim();
        if customer_id.is_empty() {
            return Err(SyncError::MalformedPayload(format!(
                "event {} has an empty aggregate id",
                event.id
            )));
        }
        let op = event.operation()?;

        // Serializes read-compute-replace per customer across all workers.
        let guard = self
            .locks
            .acquire(LOCK_NAMESPACE, customer_id)
            .await
            .map_err(SyncError::SourceRead)?;
        let result = self.rebuild(customer_id, op).await;
        guard.release().await;
        result
    }

    async fn rebuild(&self, customer_id: &str, op: Operation) -> Result<(), SyncError> {
        let customer = self.source.customer(customer_id).await?;

        let Some(customer) = customer else {
            return match op {
                Operation::Delete => {
                    info!(customer_id, "Customer gone from source, detaching edges");
                    self.writer
                        .detach_delete(OwnerLabel::B2CCustomer, customer_id)
                        .await?;
                    Ok(())
                }
                Operation::Upsert => {
                    warn!(customer_id, "Customer missing in source of record, skipping");
                    Ok(())
                }
            };
        };

        if op == Operation::Delete {
            // Stale or duplicate delete notification: the record is back (or
            // never left). The next upsert event owns the rebuild.
            debug!(customer_id, "Delete event for existing customer, no-op");
            return Ok(());
        }

        let history = self.source.recipe_history(customer_id).await?;
        let saved = self.source.saved_recipes(customer_id).await?;
        let ratings = self.source.recipe_ratings(customer_id).await?;
        let products = self.source.product_interactions(customer_id).await?;

        let mut edges = build_recipe_edges(&history, &saved, &ratings);
        edges.extend(build_product_edges(&products));

        let owner = Owner::Customer {
            id: customer.id,
            email: customer.email,
            full_name: customer.full_name,
            updated_at: customer.updated_at,
        };
        self.writer
            .replace_edge_set(&owner, &RelType::B2C_SCOPE, &edges)
            .await?;

        info!(customer_id, edges = edges.len(), "Rebuilt B2C edge set");
        Ok(())
    }
}

#[derive(Default)]
struct RecipeAgg {
    views: i64,
    last_view_at: Option<DateTime<Utc>>,
    cooks: i64,
    last_cook_at: Option<DateTime<Utc>>,
    first_saved_at: Option<DateTime<Utc>>,
    saved: bool,
    rating: Option<(DateTime<Utc>, i64)>,
}

/// One edge per (recipe, relationship) implied by the rows. BTreeMap keeps
/// the output order stable so repeated rebuilds are byte-identical.
pub fn build_recipe_edges(
    history: &[RecipeHistoryRow],
    saved: &[SavedRecipeRow],
    ratings: &[RecipeRatingRow],
) -> Vec<DesiredEdge> {
    let mut agg: BTreeMap<String, RecipeAgg> = BTreeMap::new();

    for row in history {
        let entry = agg.entry(row.recipe_id.clone()).or_default();
        match row.event_type.as_str() {
            "viewed" => {
                entry.views += 1;
                entry.last_view_at = max_ts(entry.last_view_at, row.event_at);
            }
            "cooked" => {
                entry.cooks += 1;
                entry.last_cook_at = max_ts(entry.last_cook_at, row.event_at);
            }
            _ => {}
        }
    }

    for row in saved {
        let entry = agg.entry(row.recipe_id.clone()).or_default();
        entry.saved = true;
        entry.first_saved_at = min_ts(entry.first_saved_at, row.saved_at);
    }

    for row in ratings {
        let entry = agg.entry(row.recipe_id.clone()).or_default();
        // Latest rating wins; ties by the higher value so duplicate rows with
        // identical timestamps still aggregate deterministically.
        let candidate = (row.created_at, row.rating as i64);
        if entry.rating.map_or(true, |cur| candidate > cur) {
            entry.rating = Some(candidate);
        }
    }

    let mut edges = Vec::new();
    for (recipe_id, a) in agg {
        if a.views > 0 {
            edges.push(edge(&recipe_id, RelType::Viewed, EdgeProps {
                count: Some(a.views),
                last_at: a.last_view_at,
                ..Default::default()
            }));
        }
        if a.cooks > 0 {
            edges.push(edge(&recipe_id, RelType::Cooked, EdgeProps {
                count: Some(a.cooks),
                last_at: a.last_cook_at,
                ..Default::default()
            }));
        }
        if a.saved {
            edges.push(edge(&recipe_id, RelType::Saved, EdgeProps {
                first_saved_at: a.first_saved_at,
                ..Default::default()
            }));
        }
        if let Some((at, rating)) = a.rating {
            edges.push(edge(&recipe_id, RelType::Rated, EdgeProps {
                rating: Some(rating),
                last_at: Some(at),
                ..Default::default()
            }));
        }
    }
    edges
}

#[derive(Default)]
struct ProductAgg {
    views: i64,
    last_view_at: Option<DateTime<Utc>>,
    purchases: i64,
    last_purchase_at: Option<DateTime<Utc>>,
    quantity_total: i64,
    price_total: f64,
    saved: bool,
    rating: Option<(DateTime<Utc>, i64)>,
}

pub fn build_product_edges(interactions: &[ProductInteractionRow]) -> Vec<DesiredEdge> {
    let mut agg: BTreeMap<String, ProductAgg> = BTreeMap::new();

    for row in interactions {
        let entry = agg.entry(row.product_id.clone()).or_default();
        let ts = row.interaction_timestamp;
        match row.interaction_type.as_str() {
            "viewed" => {
                entry.views += 1;
                entry.last_view_at = max_ts(entry.last_view_at, ts);
            }
            "purchased" => {
                entry.purchases += 1;
                entry.last_purchase_at = max_ts(entry.last_purchase_at, ts);
                entry.quantity_total += row.quantity.unwrap_or(0) as i64;
                entry.price_total += row.price_paid.unwrap_or(0.0);
            }
            "saved" => entry.saved = true,
            _ => {}
        }
        if let Some(rating) = row.rating {
            let candidate = (ts, rating as i64);
            if entry.rating.map_or(true, |cur| candidate > cur) {
                entry.rating = Some(candidate);
            }
        }
    }

    let mut edges = Vec::new();
    for (product_id, a) in agg {
        if a.views > 0 {
            edges.push(edge(&product_id, RelType::ViewedProduct, EdgeProps {
                count: Some(a.views),
                last_at: a.last_view_at,
                ..Default::default()
            }));
        }
        if a.purchases > 0 {
            edges.push(edge(&product_id, RelType::Purchased, EdgeProps {
                count: Some(a.purchases),
                last_at: a.last_purchase_at,
                quantity_total: Some(a.quantity_total),
                price_total: Some(a.price_total),
                ..Default::default()
            }));
        }
        if a.saved {
            edges.push(edge(&product_id, RelType::SavedProduct, EdgeProps::default()));
        }
        if let Some((at, rating)) = a.rating {
            edges.push(edge(&product_id, RelType::RatedProduct, EdgeProps {
                rating: Some(rating),
                last_at: Some(at),
                ..Default::default()
            }));
        }
    }
    edges
}

fn edge(target_id: &str, rel: RelType, props: EdgeProps) -> DesiredEdge {
    DesiredEdge {
        target_id: target_id.to_string(),
        rel,
        props,
    }
}

fn max_ts(current: Option<DateTime<Utc>>, new: DateTime<Utc>) -> Option<DateTime<Utc>> {
    Some(current.map_or(new, |c| c.max(new)))
}

fn min_ts(current: Option<DateTime<Utc>>, new: DateTime<Utc>) -> Option<DateTime<Utc>> {
    Some(current.map_or(new, |c| c.min(new)))
}
