//! B2B aggregation pipeline: rebuilds a vendor user's product-view and
//! match-feedback edge set. Mirrors the B2C pipeline, scoped to the vendor
//! user's own edges only.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use plateful_common::{
    DesiredEdge, EdgeProps, Operation, OutboxEvent, Owner, OwnerLabel, RelType, SyncError,
};
use plateful_graph::GraphWriter;
use plateful_outbox::OwnerLocks;

use crate::source::{MatchFeedbackRow, SourceReader, VendorActionRow};

const LOCK_NAMESPACE: &str = "b2b";

pub struct B2BPipeline {
    source: SourceReader,
    writer: Arc<GraphWriter>,
    locks: OwnerLocks,
}

impl B2BPipeline {
    pub fn new(source: SourceReader, writer: Arc<GraphWriter>, locks: OwnerLocks) -> Self {
        Self {
            source,
            writer,
            locks,
        }
    }

    pub async fn process(&self, event: &OutboxEvent) -> Result<(), SyncError> {
        let vendor_user_id = event.aggregate_id.trim();
        if vendor_user_id.is_empty() {
            return Err(SyncError::MalformedPayload(format!(
                "event {} has an empty aggregate id",
                event.id
            )));
        }
        let op = event.operation()?;

        let guard = self
            .locks
            .acquire(LOCK_NAMESPACE, vendor_user_id)
            .await
            .map_err(SyncError::SourceRead)?;
        let result = self.rebuild(vendor_user_id, op).await;
        guard.release().await;
        result
    }

    async fn rebuild(&self, vendor_user_id: &str, op: Operation) -> Result<(), SyncError> {
        let user = self.source.vendor_user(vendor_user_id).await?;

        let Some(user) = user else {
            return match op {
                Operation::Delete => {
                    info!(vendor_user_id, "Vendor user gone from source, detaching edges");
                    self.writer
                        .detach_delete(OwnerLabel::VendorUser, vendor_user_id)
                        .await?;
                    Ok(())
                }
                Operation::Upsert => {
                    warn!(vendor_user_id, "Vendor user missing in source of record, skipping");
                    Ok(())
                }
            };
        };

        if op == Operation::Delete {
            debug!(vendor_user_id, "Delete event for existing vendor user, no-op");
            return Ok(());
        }

        let actions = self.source.vendor_actions(vendor_user_id).await?;
        let feedback = self.source.match_feedback(vendor_user_id).await?;

        let mut edges = build_view_edges(&actions);
        edges.extend(build_match_edges(&feedback));

        let owner = Owner::VendorUser {
            id: user.id,
            email: user.email,
            role: user.role,
            updated_at: user.updated_at,
        };
        self.writer
            .replace_edge_set(&owner, &RelType::B2B_SCOPE, &edges)
            .await?;

        info!(vendor_user_id, edges = edges.len(), "Rebuilt B2B edge set");
        Ok(())
    }
}

/// Product-view edges from `vendor_user_actions` rows.
pub fn build_view_edges(actions: &[VendorActionRow]) -> Vec<DesiredEdge> {
    let mut agg: BTreeMap<String, (i64, Option<DateTime<Utc>>)> = BTreeMap::new();

    for row in actions {
        if row.action_type != "view_product" {
            continue;
        }
        let Some(product_id) = &row.product_id else {
            continue;
        };
        let entry = agg.entry(product_id.clone()).or_default();
        entry.0 += 1;
        entry.1 = Some(entry.1.map_or(row.created_at, |c| c.max(row.created_at)));
    }

    agg.into_iter()
        .map(|(product_id, (count, last_at))| DesiredEdge {
            target_id: product_id,
            rel: RelType::ViewedProduct,
            props: EdgeProps {
                count: Some(count),
                last_at,
                ..Default::default()
            },
        })
        .collect()
}

/// Match-decision edges from `match_feedback` rows. Edge identity is
/// (vendor user, target product, type), so decisions collapse per target:
/// the latest feedback row wins, and exactly one of APPROVED_MATCH /
/// REJECTED_MATCH survives. Ties on timestamp break by source product id so
/// rebuilds are deterministic regardless of row order.
pub fn build_match_edges(feedback: &[MatchFeedbackRow]) -> Vec<DesiredEdge> {
    let mut latest: BTreeMap<String, &MatchFeedbackRow> = BTreeMap::new();

    for row in feedback {
        if row.feedback_type != "approved" && row.feedback_type != "rejected" {
            continue;
        }
        latest
            .entry(row.target_product_id.clone())
            .and_modify(|cur| {
                let newer = (row.created_at, &row.source_product_id)
                    > (cur.created_at, &cur.source_product_id);
                if newer {
                    *cur = row;
                }
            })
            .or_insert(row);
    }

    latest
        .into_iter()
        .map(|(target_id, row)| {
            let (rel, reason) = if row.feedback_type == "approved" {
                (RelType::ApprovedMatch, None)
            } else {
                (RelType::RejectedMatch, row.reason.clone())
            };
            DesiredEdge {
                target_id,
                rel,
                props: EdgeProps {
                    last_at: Some(row.created_at),
                    source_product_id: Some(row.source_product_id.clone()),
                    reason,
                    ..Default::default()
                },
            }
        })
        .collect()
}
