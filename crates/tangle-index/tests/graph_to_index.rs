//! End-to-end flow: graph writes propagate into the search index

use std::sync::Arc;

use serde_json::json;
use tangle_core::{ApplicationScope, Direction, Edge, Entity, GraphConfig, Id, MarkedEdge};
use tangle_index::{EdgeContext, IndexingPipeline, MemoryGateway};
use tangle_store::{EdgeStore, EntityStore, MemoryEdgeStore, MemoryEntityStore, Sweeper};

const WRITE_ALIAS: &str = "idx_write";

/// Contexts an entity is indexed under: one per live incoming edge
async fn incoming_contexts(
    edges: &MemoryEdgeStore,
    scope: &ApplicationScope,
    node: &Id,
    edge_type: &str,
) -> Vec<EdgeContext> {
    let page = edges
        .query_edges(scope, node, edge_type, Direction::Incoming, None, 100)
        .await
        .unwrap();
    page.edges
        .iter()
        .map(|edge| EdgeContext::new(edge.edge.source_id.clone(), edge.edge.edge_type.clone()))
        .collect()
}

#[tokio::test]
async fn entity_write_reaches_index_per_edge_context() {
    let edges = MemoryEdgeStore::new();
    let entities = MemoryEntityStore::new();
    let gateway = Arc::new(MemoryGateway::new());
    let pipeline = IndexingPipeline::new(gateway.clone(), GraphConfig::default());

    let scope = ApplicationScope::new(Id::new("application"));
    let user = Id::new("user");
    let team = Id::new("group");
    let org = Id::new("group");

    let entity = Entity::new(user.clone()).with_property("name", json!("ada"));
    entities.put_entity(&scope, entity).await.unwrap();

    // The user hangs off two containers; each edge is an index context
    edges
        .write_edge(
            &scope,
            MarkedEdge::new(Edge::new(team.clone(), "has_member", user.clone(), 100)),
        )
        .await
        .unwrap();
    edges
        .write_edge(
            &scope,
            MarkedEdge::new(Edge::new(org.clone(), "has_member", user.clone(), 101)),
        )
        .await
        .unwrap();

    let stored = entities
        .get_entity(&scope, &user, None)
        .await
        .unwrap()
        .unwrap();
    let contexts = incoming_contexts(&edges, &scope, &user, "has_member").await;
    assert_eq!(contexts.len(), 2);

    pipeline
        .index_entity(&scope, &stored, &contexts, WRITE_ALIAS)
        .await
        .unwrap();
    let report = pipeline.flush().await.unwrap();

    assert!(report.is_clean());
    assert_eq!(report.indexed.len(), 2);
    assert_eq!(gateway.document_count(), 2);
    for document_id in &report.indexed {
        let doc = gateway.document(WRITE_ALIAS, document_id).unwrap();
        assert_eq!(doc.data.get("name"), Some(&json!("ada")));
    }
}

#[tokio::test]
async fn tombstoned_edge_drops_its_index_context() {
    let edges = MemoryEdgeStore::new();
    let entities = MemoryEntityStore::new();
    let gateway = Arc::new(MemoryGateway::new());
    let pipeline = IndexingPipeline::new(gateway.clone(), GraphConfig::default());

    let scope = ApplicationScope::new(Id::new("application"));
    let user = Id::new("user");
    let team = Id::new("group");

    entities
        .put_entity(&scope, Entity::new(user.clone()))
        .await
        .unwrap();
    let edge = Edge::new(team.clone(), "has_member", user.clone(), 100);
    edges
        .write_edge(&scope, MarkedEdge::new(edge.clone()))
        .await
        .unwrap();

    assert_eq!(
        incoming_contexts(&edges, &scope, &user, "has_member")
            .await
            .len(),
        1
    );

    edges.mark_edge_deleted(&scope, &edge).await.unwrap();

    // The tombstoned edge no longer contributes a context
    let contexts = incoming_contexts(&edges, &scope, &user, "has_member").await;
    assert!(contexts.is_empty());

    let stored = entities
        .get_entity(&scope, &user, None)
        .await
        .unwrap()
        .unwrap();
    pipeline
        .index_entity(&scope, &stored, &contexts, WRITE_ALIAS)
        .await
        .unwrap();
    let report = pipeline.flush().await.unwrap();
    assert!(report.indexed.is_empty());
    assert_eq!(gateway.document_count(), 0);
}

#[tokio::test]
async fn entity_delete_cascades_without_blocking_the_write() {
    let edges = Arc::new(MemoryEdgeStore::new());
    let entities = Arc::new(MemoryEntityStore::new());

    let scope = ApplicationScope::new(Id::new("application"));
    let user = Id::new("user");
    let team = Id::new("group");

    entities
        .put_entity(&scope, Entity::new(user.clone()))
        .await
        .unwrap();
    edges
        .write_edge(
            &scope,
            MarkedEdge::new(Edge::new(user.clone(), "member_of", team.clone(), 100)),
        )
        .await
        .unwrap();

    entities.delete_entity(&scope, &user).await.unwrap();
    assert!(entities
        .get_entity(&scope, &user, None)
        .await
        .unwrap()
        .is_none());

    // Edge flags are untouched until the sweeper runs
    let before = edges.scan_edges(&scope, &user).await.unwrap();
    assert!(!before[0].is_source_node_deleted);

    let sweeper = Sweeper::new(
        edges.clone(),
        entities.clone(),
        std::time::Duration::from_secs(60),
    );
    let stats = sweeper.sweep_once().await.unwrap();
    assert_eq!(stats.nodes_cascaded, 1);
    assert_eq!(stats.edges_flagged, 1);

    let after = edges.scan_edges(&scope, &user).await.unwrap();
    assert!(after[0].is_source_node_deleted);
}
