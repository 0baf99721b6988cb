use chrono::{DateTime, Utc};
use neo4rs::{query, Query};
use tracing::{debug, info};

use plateful_common::{DesiredEdge, Owner, OwnerLabel, RelType};

use crate::GraphClient;

/// Write-side wrapper for the graph. Applies edge-set replacements and
/// detach-deletes; shared by both aggregation pipelines.
pub struct GraphWriter {
    client: GraphClient,
}

impl GraphWriter {
    pub fn new(client: GraphClient) -> Self {
        Self { client }
    }

    /// Reconcile the owner's outgoing edges to exactly `desired`, inside one
    /// transaction: upsert the owner node, drop edges of in-scope types whose
    /// target is no longer desired, then upsert every desired edge with its
    /// property map replaced wholesale. All-or-nothing: a failed statement
    /// rolls the whole call back, so a partial edge set is never visible.
    pub async fn replace_edge_set(
        &self,
        owner: &Owner,
        scope: &[RelType],
        desired: &[DesiredEdge],
    ) -> Result<(), neo4rs::Error> {
        let label = owner.label().as_str();
        let mut queries: Vec<Query> = Vec::with_capacity(1 + scope.len() + desired.len());

        queries.push(owner_upsert(owner));

        for rel in scope {
            let keep: Vec<String> = desired
                .iter()
                .filter(|e| e.rel == *rel)
                .map(|e| e.target_id.clone())
                .collect();
            queries.push(
                query(&format!(
                    "MATCH (u:{label} {{id: $id}})-[r:{rel}]->(t:{target})
                     WHERE NOT t.id IN $keep
                     DELETE r",
                    label = label,
                    rel = rel.as_str(),
                    target = rel.target_label(),
                ))
                .param("id", owner.id())
                .param("keep", keep),
            );
        }

        for edge in desired {
            queries.push(edge_upsert(label, owner.id(), edge));
        }

        let mut txn = self.client.graph.start_txn().await?;
        if let Err(e) = txn.run_queries(queries).await {
            txn.rollback().await.ok();
            return Err(e);
        }
        txn.commit().await?;

        debug!(
            owner = owner.id(),
            label,
            edges = desired.len(),
            "Replaced edge set"
        );
        Ok(())
    }

    /// Remove an owner node together with every edge incident to it. Used
    /// when the source record is gone; a single statement, atomic on its own.
    pub async fn detach_delete(
        &self,
        label: OwnerLabel,
        owner_id: &str,
    ) -> Result<(), neo4rs::Error> {
        let q = query(&format!(
            "MATCH (u:{} {{id: $id}}) DETACH DELETE u",
            label.as_str()
        ))
        .param("id", owner_id);

        self.client.graph.run(q).await?;
        info!(owner = owner_id, label = label.as_str(), "Detach-deleted owner");
        Ok(())
    }
}

fn owner_upsert(owner: &Owner) -> Query {
    match owner {
        Owner::Customer {
            id,
            email,
            full_name,
            updated_at,
        } => query(
            "MERGE (u:B2CCustomer {id: $id})
             SET u.email = $email, u.full_name = $full_name,
                 u.updated_at = CASE WHEN $updated_at IS NULL THEN null ELSE datetime($updated_at) END",
        )
        .param("id", id.as_str())
        .param("email", email.clone())
        .param("full_name", full_name.clone())
        .param("updated_at", updated_at.as_ref().map(format_datetime)),
        Owner::VendorUser {
            id,
            email,
            role,
            updated_at,
        } => query(
            "MERGE (u:VendorUser {id: $id})
             SET u.email = $email, u.role = $role,
                 u.updated_at = CASE WHEN $updated_at IS NULL THEN null ELSE datetime($updated_at) END",
        )
        .param("id", id.as_str())
        .param("email", email.clone())
        .param("role", role.clone())
        .param("updated_at", updated_at.as_ref().map(format_datetime)),
    }
}

/// MERGE target and edge, then replace the edge's property map. Null-valued
/// entries in a map assignment are dropped by the server, so absent props
/// disappear rather than lingering from a previous rebuild.
fn edge_upsert(owner_label: &str, owner_id: &str, edge: &DesiredEdge) -> Query {
    let p = &edge.props;
    query(&format!(
        "MATCH (u:{label} {{id: $id}})
         MERGE (t:{target} {{id: $target_id}})
         MERGE (u)-[r:{rel}]->(t)
         SET r = {{
             count: $count,
             last_at: CASE WHEN $last_at IS NULL THEN null ELSE datetime($last_at) END,
             rating: $rating,
             first_saved_at: CASE WHEN $first_saved_at IS NULL THEN null ELSE datetime($first_saved_at) END,
             quantity_total: $quantity_total,
             price_total: $price_total,
             source_product_id: $source_product_id,
             reason: $reason
         }}",
        label = owner_label,
        target = edge.rel.target_label(),
        rel = edge.rel.as_str(),
    ))
    .param("id", owner_id)
    .param("target_id", edge.target_id.as_str())
    .param("count", p.count)
    .param("last_at", p.last_at.as_ref().map(format_datetime))
    .param("rating", p.rating)
    .param(
        "first_saved_at",
        p.first_saved_at.as_ref().map(format_datetime),
    )
    .param("quantity_total", p.quantity_total)
    .param("price_total", p.price_total)
    .param("source_product_id", p.source_product_id.clone())
    .param("reason", p.reason.clone())
}

fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339()
}
