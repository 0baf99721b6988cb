use neo4rs::query;

use plateful_common::OwnerLabel;

use crate::GraphClient;

/// One outgoing edge of an owner, flattened for inspection.
#[derive(Debug, Clone, PartialEq)]
pub struct EdgeSummary {
    pub rel: String,
    pub target_id: String,
    pub count: Option<i64>,
    pub rating: Option<i64>,
    pub source_product_id: Option<String>,
    pub reason: Option<String>,
}

/// Read-side helpers. Used by tests and operator tooling; the sync path
/// itself never reads the graph back (it always derives the desired state
/// from the relational source).
pub struct GraphReader {
    client: GraphClient,
}

impl GraphReader {
    pub fn new(client: GraphClient) -> Self {
        Self { client }
    }

    /// All outgoing edges of an owner, ordered by (type, target).
    pub async fn edge_summary(
        &self,
        label: OwnerLabel,
        owner_id: &str,
    ) -> Result<Vec<EdgeSummary>, neo4rs::Error> {
        let q = query(&format!(
            "MATCH (u:{} {{id: $id}})-[r]->(t)
             RETURN type(r) AS rel, t.id AS target_id,
                    r.count AS count, r.rating AS rating,
                    r.source_product_id AS source_product_id, r.reason AS reason
             ORDER BY rel, target_id",
            label.as_str()
        ))
        .param("id", owner_id);

        let mut edges = Vec::new();
        let mut stream = self.client.graph.execute(q).await?;
        while let Some(row) = stream.next().await? {
            edges.push(EdgeSummary {
                rel: row.get("rel").unwrap_or_default(),
                target_id: row.get("target_id").unwrap_or_default(),
                count: row.get::<Option<i64>>("count").ok().flatten(),
                rating: row.get::<Option<i64>>("rating").ok().flatten(),
                source_product_id: row
                    .get::<Option<String>>("source_product_id")
                    .ok()
                    .flatten(),
                reason: row.get::<Option<String>>("reason").ok().flatten(),
            });
        }
        Ok(edges)
    }

    /// Whether a node with the given label and id exists.
    pub async fn node_exists(
        &self,
        label: OwnerLabel,
        owner_id: &str,
    ) -> Result<bool, neo4rs::Error> {
        let q = query(&format!(
            "MATCH (u:{} {{id: $id}}) RETURN u.id AS id LIMIT 1",
            label.as_str()
        ))
        .param("id", owner_id);

        let mut stream = self.client.graph.execute(q).await?;
        Ok(stream.next().await?.is_some())
    }
}
