//! Integration tests for edge-set replacement against a real Neo4j.

use plateful_common::{DesiredEdge, EdgeProps, Owner, OwnerLabel, RelType};
use plateful_graph::testutil::neo4j_container;
use plateful_graph::{GraphReader, GraphWriter};

fn customer(id: &str) -> Owner {
    Owner::Customer {
        id: id.into(),
        email: Some(format!("{id}@example.com")),
        full_name: None,
        updated_at: None,
    }
}

fn viewed(target: &str, count: i64) -> DesiredEdge {
    DesiredEdge {
        target_id: target.into(),
        rel: RelType::Viewed,
        props: EdgeProps {
            count: Some(count),
            last_at: Some(chrono::Utc::now()),
            ..Default::default()
        },
    }
}

fn rated(target: &str, rating: i64) -> DesiredEdge {
    DesiredEdge {
        target_id: target.into(),
        rel: RelType::Rated,
        props: EdgeProps {
            rating: Some(rating),
            last_at: Some(chrono::Utc::now()),
            ..Default::default()
        },
    }
}

#[tokio::test]
async fn replace_removes_edges_missing_from_desired_set() {
    let (_neo4j, client) = neo4j_container().await;
    let writer = GraphWriter::new(client.clone());
    let reader = GraphReader::new(client);
    let owner = customer("c1");

    writer
        .replace_edge_set(
            &owner,
            &RelType::B2C_SCOPE,
            &[viewed("r1", 2), viewed("r2", 1), rated("r1", 4)],
        )
        .await
        .unwrap();

    // r2 dropped out of the history; its VIEWED edge must not linger.
    writer
        .replace_edge_set(&owner, &RelType::B2C_SCOPE, &[viewed("r1", 3), rated("r1", 4)])
        .await
        .unwrap();

    let edges = reader
        .edge_summary(OwnerLabel::B2CCustomer, "c1")
        .await
        .unwrap();
    let pairs: Vec<(&str, &str)> = edges
        .iter()
        .map(|e| (e.rel.as_str(), e.target_id.as_str()))
        .collect();
    assert_eq!(pairs, vec![("RATED", "r1"), ("VIEWED", "r1")]);
    assert_eq!(edges[1].count, Some(3), "VIEWED props replaced wholesale");
}

#[tokio::test]
async fn properties_are_replaced_not_merged() {
    let (_neo4j, client) = neo4j_container().await;
    let writer = GraphWriter::new(client.clone());
    let reader = GraphReader::new(client);
    let owner = customer("c1");

    let mut edge = viewed("r1", 5);
    edge.props.rating = Some(3); // stray field from a previous shape
    writer
        .replace_edge_set(&owner, &RelType::B2C_SCOPE, &[edge])
        .await
        .unwrap();

    writer
        .replace_edge_set(&owner, &RelType::B2C_SCOPE, &[viewed("r1", 6)])
        .await
        .unwrap();

    let edges = reader
        .edge_summary(OwnerLabel::B2CCustomer, "c1")
        .await
        .unwrap();
    assert_eq!(edges.len(), 1);
    assert_eq!(edges[0].count, Some(6));
    assert_eq!(edges[0].rating, None, "old property did not survive the rewrite");
}

#[tokio::test]
async fn replace_scopes_to_one_owner() {
    let (_neo4j, client) = neo4j_container().await;
    let writer = GraphWriter::new(client.clone());
    let reader = GraphReader::new(client);

    writer
        .replace_edge_set(&customer("c1"), &RelType::B2C_SCOPE, &[viewed("r1", 1)])
        .await
        .unwrap();
    writer
        .replace_edge_set(&customer("c2"), &RelType::B2C_SCOPE, &[viewed("r1", 9)])
        .await
        .unwrap();

    // Emptying c1's edge set leaves c2 untouched.
    writer
        .replace_edge_set(&customer("c1"), &RelType::B2C_SCOPE, &[])
        .await
        .unwrap();

    assert!(reader
        .edge_summary(OwnerLabel::B2CCustomer, "c1")
        .await
        .unwrap()
        .is_empty());
    let c2 = reader
        .edge_summary(OwnerLabel::B2CCustomer, "c2")
        .await
        .unwrap();
    assert_eq!(c2.len(), 1);
    assert_eq!(c2[0].count, Some(9));
}

#[tokio::test]
async fn owner_upsert_sets_profile_properties() {
    let (_neo4j, client) = neo4j_container().await;
    let writer = GraphWriter::new(client.clone());
    let owner = Owner::Customer {
        id: "c1".into(),
        email: Some("c1@example.com".into()),
        full_name: Some("Casey One".into()),
        updated_at: Some(chrono::Utc::now()),
    };

    writer
        .replace_edge_set(&owner, &RelType::B2C_SCOPE, &[])
        .await
        .unwrap();

    let q = neo4rs::query(
        "MATCH (u:B2CCustomer {id: $id})
         RETURN u.full_name AS full_name, u.updated_at IS NOT NULL AS has_updated_at",
    )
    .param("id", "c1");
    let mut stream = client.inner().execute(q).await.unwrap();
    let row = stream.next().await.unwrap().unwrap();
    assert_eq!(row.get::<String>("full_name").unwrap(), "Casey One");
    assert!(row.get::<bool>("has_updated_at").unwrap());
}

#[tokio::test]
async fn detach_delete_removes_owner_and_edges() {
    let (_neo4j, client) = neo4j_container().await;
    let writer = GraphWriter::new(client.clone());
    let reader = GraphReader::new(client);

    writer
        .replace_edge_set(
            &customer("c1"),
            &RelType::B2C_SCOPE,
            &[viewed("r1", 1), rated("r2", 5)],
        )
        .await
        .unwrap();

    writer
        .detach_delete(OwnerLabel::B2CCustomer, "c1")
        .await
        .unwrap();

    assert!(!reader
        .node_exists(OwnerLabel::B2CCustomer, "c1")
        .await
        .unwrap());
    assert!(reader
        .edge_summary(OwnerLabel::B2CCustomer, "c1")
        .await
        .unwrap()
        .is_empty());
}
