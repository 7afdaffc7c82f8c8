//! In-memory store backends
//!
//! Reference implementation of the store semantics. Edge records live in a
//! `DashMap` keyed by (scope, edge key), so the last-writer-wins merge runs
//! under the entry guard: writes to the same key serialize, writes to
//! different keys never contend. This is the write-time compare-and-set
//! that keeps concurrent duplicate inserts from ever producing two live
//! edges for one (source, type, target) triple.

use crate::error::{StoreError, StoreResult};
use crate::traits::{EdgeCursor, EdgePage, EdgeStore, EntityStore, WriteOutcome};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::cmp::Reverse;
use std::sync::Mutex;
use std::time::Duration;
use tangle_core::limits::{
    validate_edge_type, validate_kind, validate_page_size, validate_property_count,
    validate_property_value,
};
use tangle_core::{ApplicationScope, Direction, Edge, EdgeKey, Entity, Id, MarkedEdge};
use tracing::{debug, info};

/// Stored state for one edge key
#[derive(Debug, Clone)]
struct EdgeRecord {
    timestamp: i64,
    is_deleted: bool,
    is_source_node_deleted: bool,
    is_target_node_deleted: bool,
    expires_in: Option<Duration>,
    /// Wall-clock anchor for expiry; edge timestamps are ordering keys,
    /// not wall-clock values
    written_at: DateTime<Utc>,
}

impl EdgeRecord {
    fn expired(&self, now: DateTime<Utc>) -> bool {
        match self.expires_in {
            Some(expires_in) => now
                .signed_duration_since(self.written_at)
                .to_std()
                .map(|elapsed| elapsed >= expires_in)
                .unwrap_or(false),
            None => false,
        }
    }

    fn to_marked(&self, key: &EdgeKey) -> MarkedEdge {
        MarkedEdge {
            edge: Edge::new(
                key.source_id.clone(),
                key.edge_type.clone(),
                key.target_id.clone(),
                self.timestamp,
            ),
            is_deleted: self.is_deleted,
            is_source_node_deleted: self.is_source_node_deleted,
            is_target_node_deleted: self.is_target_node_deleted,
            expires_in: self.expires_in,
        }
    }
}

/// In-memory edge store
pub struct MemoryEdgeStore {
    edges: DashMap<(ApplicationScope, EdgeKey), EdgeRecord>,
}

impl MemoryEdgeStore {
    pub fn new() -> Self {
        Self {
            edges: DashMap::new(),
        }
    }

    fn matches(key: &EdgeKey, node: &Id, direction: Direction) -> bool {
        match direction {
            Direction::Outgoing => &key.source_id == node,
            Direction::Incoming => &key.target_id == node,
            Direction::Both => &key.source_id == node || &key.target_id == node,
        }
    }

    /// Tie-break key for pagination: unique per edge, stable across calls
    fn tie(key: &EdgeKey) -> String {
        key.to_string()
    }
}

impl Default for MemoryEdgeStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EdgeStore for MemoryEdgeStore {
    async fn write_edge(
        &self,
        scope: &ApplicationScope,
        edge: MarkedEdge,
    ) -> StoreResult<WriteOutcome> {
        validate_edge_type(&edge.edge.edge_type)?;

        let key = edge.key();
        let entry = self.edges.entry((scope.clone(), key.clone()));

        let outcome = match entry {
            dashmap::mapref::entry::Entry::Occupied(mut occupied) => {
                let record = occupied.get_mut();
                if record.timestamp >= edge.timestamp() {
                    debug!(edge = %key, existing = record.timestamp, incoming = edge.timestamp(), "write superseded");
                    WriteOutcome::Superseded
                } else {
                    record.timestamp = edge.timestamp();
                    record.is_deleted = edge.is_deleted;
                    record.expires_in = edge.expires_in;
                    record.written_at = Utc::now();
                    // node-deleted flags are set once, never reverted
                    record.is_source_node_deleted |= edge.is_source_node_deleted;
                    record.is_target_node_deleted |= edge.is_target_node_deleted;
                    WriteOutcome::Applied
                }
            }
            dashmap::mapref::entry::Entry::Vacant(vacant) => {
                vacant.insert(EdgeRecord {
                    timestamp: edge.timestamp(),
                    is_deleted: edge.is_deleted,
                    is_source_node_deleted: edge.is_source_node_deleted,
                    is_target_node_deleted: edge.is_target_node_deleted,
                    expires_in: edge.expires_in,
                    written_at: Utc::now(),
                });
                WriteOutcome::Applied
            }
        };

        Ok(outcome)
    }

    async fn mark_edge_deleted(&self, scope: &ApplicationScope, edge: &Edge) -> StoreResult<()> {
        let key = edge.key();
        match self.edges.entry((scope.clone(), key.clone())) {
            dashmap::mapref::entry::Entry::Occupied(mut occupied) => {
                let record = occupied.get_mut();
                record.is_deleted = true;
                // Tombstone lands at or after the last write so older
                // write retries lose the last-writer-wins race.
                record.timestamp = record.timestamp.max(edge.timestamp);
                debug!(edge = %key, timestamp = record.timestamp, "edge tombstoned");
                Ok(())
            }
            dashmap::mapref::entry::Entry::Vacant(_) => {
                Err(StoreError::EdgeNotFound(key.to_string()))
            }
        }
    }

    async fn query_edges(
        &self,
        scope: &ApplicationScope,
        node: &Id,
        edge_type: &str,
        direction: Direction,
        cursor: Option<EdgeCursor>,
        page_size: usize,
    ) -> StoreResult<EdgePage> {
        validate_page_size(page_size)?;
        let now = Utc::now();

        let mut matches: Vec<(i64, String, MarkedEdge)> = self
            .edges
            .iter()
            .filter(|entry| {
                let (entry_scope, key) = entry.key();
                entry_scope == scope
                    && key.edge_type == edge_type
                    && Self::matches(key, node, direction)
            })
            .filter(|entry| !entry.value().is_deleted && !entry.value().expired(now))
            .map(|entry| {
                let (_, key) = entry.key();
                (
                    entry.value().timestamp,
                    Self::tie(key),
                    entry.value().to_marked(key),
                )
            })
            .collect();

        matches.sort_by(|a, b| (Reverse(a.0), &a.1).cmp(&(Reverse(b.0), &b.1)));

        // Resume strictly after the cursor position
        if let Some(cursor) = cursor {
            matches.retain(|(ts, tie, _)| {
                *ts < cursor.timestamp || (*ts == cursor.timestamp && *tie > cursor.tie)
            });
        }

        let has_more = matches.len() > page_size;
        matches.truncate(page_size);

        let next_cursor = if has_more {
            matches.last().map(|(ts, tie, _)| EdgeCursor {
                timestamp: *ts,
                tie: tie.clone(),
            })
        } else {
            None
        };

        Ok(EdgePage {
            edges: matches.into_iter().map(|(_, _, edge)| edge).collect(),
            cursor: next_cursor,
        })
    }

    async fn scan_edges(
        &self,
        scope: &ApplicationScope,
        node: &Id,
    ) -> StoreResult<Vec<MarkedEdge>> {
        let mut edges: Vec<MarkedEdge> = self
            .edges
            .iter()
            .filter(|entry| {
                let (entry_scope, key) = entry.key();
                entry_scope == scope && Self::matches(key, node, Direction::Both)
            })
            .map(|entry| entry.value().to_marked(&entry.key().1))
            .collect();

        edges.sort_by(|a, b| b.timestamp().cmp(&a.timestamp()));
        Ok(edges)
    }

    async fn expire_edges(&self, now: DateTime<Utc>) -> StoreResult<usize> {
        let mut expired = 0;
        for mut entry in self.edges.iter_mut() {
            let record = entry.value_mut();
            if !record.is_deleted && record.expired(now) {
                record.is_deleted = true;
                expired += 1;
            }
        }
        if expired > 0 {
            info!(count = expired, "expired edges tombstoned");
        }
        Ok(expired)
    }

    async fn mark_node_edges(&self, scope: &ApplicationScope, node: &Id) -> StoreResult<usize> {
        let mut flagged = 0;
        for mut entry in self.edges.iter_mut() {
            let (entry_scope, key) = entry.key();
            if entry_scope != scope {
                continue;
            }
            let source = &key.source_id == node;
            let target = &key.target_id == node;
            if !source && !target {
                continue;
            }
            let record = entry.value_mut();
            let mut changed = false;
            if source && !record.is_source_node_deleted {
                record.is_source_node_deleted = true;
                changed = true;
            }
            if target && !record.is_target_node_deleted {
                record.is_target_node_deleted = true;
                changed = true;
            }
            if changed {
                flagged += 1;
            }
        }
        debug!(node = %node, count = flagged, "node-deleted flags cascaded");
        Ok(flagged)
    }
}

/// Append-only version chain for one (scope, id)
#[derive(Debug, Default)]
struct VersionChain {
    versions: Vec<Entity>,
    deleted: bool,
}

/// In-memory entity store
pub struct MemoryEntityStore {
    entities: DashMap<(ApplicationScope, Id), VersionChain>,
    deleted_queue: Mutex<Vec<(ApplicationScope, Id)>>,
}

impl MemoryEntityStore {
    pub fn new() -> Self {
        Self {
            entities: DashMap::new(),
            deleted_queue: Mutex::new(Vec::new()),
        }
    }
}

impl Default for MemoryEntityStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EntityStore for MemoryEntityStore {
    async fn put_entity(&self, scope: &ApplicationScope, entity: Entity) -> StoreResult<u64> {
        validate_kind(&entity.id.kind)?;
        validate_property_count(entity.properties.len())?;
        for (field, value) in &entity.properties {
            validate_property_value(field, serde_json::to_string(value)?.len())?;
        }

        let mut chain = self
            .entities
            .entry((scope.clone(), entity.id.clone()))
            .or_default();

        let version = chain.versions.len() as u64 + 1;
        let mut snapshot = entity;
        snapshot.version = version;
        chain.versions.push(snapshot);
        // A put after a logical delete revives the entity
        chain.deleted = false;

        Ok(version)
    }

    async fn get_entity(
        &self,
        scope: &ApplicationScope,
        id: &Id,
        version: Option<u64>,
    ) -> StoreResult<Option<Entity>> {
        let chain = match self.entities.get(&(scope.clone(), id.clone())) {
            Some(chain) => chain,
            None => return Ok(None),
        };

        match version {
            // Prior versions stay readable after a logical delete so
            // readers that started before the delete are unaffected.
            Some(v) if v >= 1 => Ok(chain.versions.get(v as usize - 1).cloned()),
            Some(_) => Ok(None),
            None => {
                if chain.deleted {
                    Ok(None)
                } else {
                    Ok(chain.versions.last().cloned())
                }
            }
        }
    }

    async fn delete_entity(&self, scope: &ApplicationScope, id: &Id) -> StoreResult<()> {
        let mut chain = self
            .entities
            .get_mut(&(scope.clone(), id.clone()))
            .ok_or_else(|| StoreError::EntityNotFound(id.to_string()))?;

        if chain.deleted {
            return Ok(());
        }
        chain.deleted = true;
        drop(chain);

        let mut queue = self
            .deleted_queue
            .lock()
            .map_err(|e| StoreError::Internal(format!("Lock error: {}", e)))?;
        queue.push((scope.clone(), id.clone()));
        debug!(entity = %id, "entity logically deleted, cascade queued");
        Ok(())
    }

    async fn drain_deleted_nodes(&self) -> StoreResult<Vec<(ApplicationScope, Id)>> {
        let mut queue = self
            .deleted_queue
            .lock()
            .map_err(|e| StoreError::Internal(format!("Lock error: {}", e)))?;
        Ok(std::mem::take(&mut *queue))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    fn scope() -> ApplicationScope {
        ApplicationScope::new(Id::new("application"))
    }

    fn live(edge: Edge) -> MarkedEdge {
        MarkedEdge::new(edge)
    }

    #[tokio::test]
    async fn test_write_edge_last_writer_wins() {
        let store = MemoryEdgeStore::new();
        let scope = scope();
        let a = Id::new("user");
        let b = Id::new("post");

        let first = store
            .write_edge(&scope, live(Edge::new(a.clone(), "likes", b.clone(), 100)))
            .await
            .unwrap();
        assert_eq!(first, WriteOutcome::Applied);

        let newer = store
            .write_edge(&scope, live(Edge::new(a.clone(), "likes", b.clone(), 105)))
            .await
            .unwrap();
        assert_eq!(newer, WriteOutcome::Applied);

        // Older retry is a successful no-op
        let older = store
            .write_edge(&scope, live(Edge::new(a.clone(), "likes", b.clone(), 100)))
            .await
            .unwrap();
        assert_eq!(older, WriteOutcome::Superseded);

        let page = store
            .query_edges(&scope, &a, "likes", Direction::Outgoing, None, 10)
            .await
            .unwrap();
        assert_eq!(page.edges.len(), 1);
        assert_eq!(page.edges[0].timestamp(), 105);
        assert!(!page.edges[0].is_deleted);
    }

    #[tokio::test]
    async fn test_concurrent_writes_converge() {
        let store = Arc::new(MemoryEdgeStore::new());
        let scope = scope();
        let a = Id::new("user");
        let b = Id::new("post");

        let mut handles = Vec::new();
        for ts in 100..120 {
            let store = store.clone();
            let scope = scope.clone();
            let (a, b) = (a.clone(), b.clone());
            handles.push(tokio::spawn(async move {
                store
                    .write_edge(&scope, MarkedEdge::new(Edge::new(a, "likes", b, ts)))
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let page = store
            .query_edges(&scope, &a, "likes", Direction::Outgoing, None, 10)
            .await
            .unwrap();
        assert_eq!(page.edges.len(), 1);
        assert_eq!(page.edges[0].timestamp(), 119);
    }

    #[tokio::test]
    async fn test_tombstone_hidden_from_queries() {
        let store = MemoryEdgeStore::new();
        let scope = scope();
        let a = Id::new("user");
        let b = Id::new("post");
        let edge = Edge::new(a.clone(), "likes", b.clone(), 100);

        store.write_edge(&scope, live(edge.clone())).await.unwrap();
        store
            .mark_edge_deleted(&scope, &Edge::new(a.clone(), "likes", b.clone(), 110))
            .await
            .unwrap();

        let page = store
            .query_edges(&scope, &a, "likes", Direction::Outgoing, None, 10)
            .await
            .unwrap();
        assert!(page.edges.is_empty());

        // Low-level scan still sees the tombstone
        let scanned = store.scan_edges(&scope, &a).await.unwrap();
        assert_eq!(scanned.len(), 1);
        assert!(scanned[0].is_deleted);
        assert_eq!(scanned[0].timestamp(), 110);
    }

    #[tokio::test]
    async fn test_delete_survives_older_write_retry() {
        let store = MemoryEdgeStore::new();
        let scope = scope();
        let a = Id::new("user");
        let b = Id::new("post");

        store
            .write_edge(&scope, live(Edge::new(a.clone(), "likes", b.clone(), 100)))
            .await
            .unwrap();
        store
            .mark_edge_deleted(&scope, &Edge::new(a.clone(), "likes", b.clone(), 100))
            .await
            .unwrap();

        // Retry of the original write: older-or-equal timestamp, loses
        let outcome = store
            .write_edge(&scope, live(Edge::new(a.clone(), "likes", b.clone(), 100)))
            .await
            .unwrap();
        assert_eq!(outcome, WriteOutcome::Superseded);

        let page = store
            .query_edges(&scope, &a, "likes", Direction::Outgoing, None, 10)
            .await
            .unwrap();
        assert!(page.edges.is_empty());
    }

    #[tokio::test]
    async fn test_mark_deleted_unknown_edge() {
        let store = MemoryEdgeStore::new();
        let result = store
            .mark_edge_deleted(&scope(), &Edge::new(Id::new("user"), "likes", Id::new("post"), 1))
            .await;
        assert!(matches!(result, Err(StoreError::EdgeNotFound(_))));
    }

    #[tokio::test]
    async fn test_query_pagination() {
        let store = MemoryEdgeStore::new();
        let scope = scope();
        let a = Id::new("user");

        for ts in 1..=5 {
            store
                .write_edge(&scope, live(Edge::new(a.clone(), "follows", Id::new("user"), ts)))
                .await
                .unwrap();
        }

        let mut seen = Vec::new();
        let mut cursor = None;
        loop {
            let page = store
                .query_edges(&scope, &a, "follows", Direction::Outgoing, cursor, 2)
                .await
                .unwrap();
            seen.extend(page.edges.iter().map(MarkedEdge::timestamp));
            match page.cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        assert_eq!(seen, vec![5, 4, 3, 2, 1]);
    }

    #[tokio::test]
    async fn test_direction_filters() {
        let store = MemoryEdgeStore::new();
        let scope = scope();
        let a = Id::new("user");
        let b = Id::new("user");

        store
            .write_edge(&scope, live(Edge::new(a.clone(), "follows", b.clone(), 1)))
            .await
            .unwrap();
        store
            .write_edge(&scope, live(Edge::new(b.clone(), "follows", a.clone(), 2)))
            .await
            .unwrap();

        let outgoing = store
            .query_edges(&scope, &a, "follows", Direction::Outgoing, None, 10)
            .await
            .unwrap();
        assert_eq!(outgoing.edges.len(), 1);
        assert_eq!(outgoing.edges[0].edge.source_id, a);

        let incoming = store
            .query_edges(&scope, &a, "follows", Direction::Incoming, None, 10)
            .await
            .unwrap();
        assert_eq!(incoming.edges.len(), 1);
        assert_eq!(incoming.edges[0].edge.target_id, a);

        let both = store
            .query_edges(&scope, &a, "follows", Direction::Both, None, 10)
            .await
            .unwrap();
        assert_eq!(both.edges.len(), 2);
    }

    #[tokio::test]
    async fn test_expire_edges_idempotent() {
        let store = MemoryEdgeStore::new();
        let scope = scope();
        let a = Id::new("user");
        let b = Id::new("post");

        let edge = MarkedEdge::new(Edge::new(a.clone(), "likes", b.clone(), 100))
            .with_expiry(Duration::ZERO);
        store.write_edge(&scope, edge).await.unwrap();

        // Expired edges are filtered at read time even before a sweep
        let page = store
            .query_edges(&scope, &a, "likes", Direction::Outgoing, None, 10)
            .await
            .unwrap();
        assert!(page.edges.is_empty());

        let first = store.expire_edges(Utc::now()).await.unwrap();
        assert_eq!(first, 1);

        // Re-running over already-tombstoned edges is a no-op
        let second = store.expire_edges(Utc::now()).await.unwrap();
        assert_eq!(second, 0);
    }

    #[tokio::test]
    async fn test_mark_node_edges_sets_flags_once() {
        let store = MemoryEdgeStore::new();
        let scope = scope();
        let a = Id::new("user");
        let b = Id::new("post");
        let c = Id::new("post");

        store
            .write_edge(&scope, live(Edge::new(a.clone(), "likes", b.clone(), 1)))
            .await
            .unwrap();
        store
            .write_edge(&scope, live(Edge::new(c.clone(), "mentions", a.clone(), 2)))
            .await
            .unwrap();

        let flagged = store.mark_node_edges(&scope, &a).await.unwrap();
        assert_eq!(flagged, 2);

        let scanned = store.scan_edges(&scope, &a).await.unwrap();
        for edge in &scanned {
            if edge.edge.source_id == a {
                assert!(edge.is_source_node_deleted);
            }
            if edge.edge.target_id == a {
                assert!(edge.is_target_node_deleted);
            }
        }

        // Second cascade changes nothing
        let again = store.mark_node_edges(&scope, &a).await.unwrap();
        assert_eq!(again, 0);
    }

    #[tokio::test]
    async fn test_entity_versions_append_only() {
        let store = MemoryEntityStore::new();
        let scope = scope();
        let id = Id::new("user");

        let v1 = store
            .put_entity(&scope, Entity::new(id.clone()).with_property("name", json!("ada")))
            .await
            .unwrap();
        let v2 = store
            .put_entity(&scope, Entity::new(id.clone()).with_property("name", json!("grace")))
            .await
            .unwrap();
        assert_eq!((v1, v2), (1, 2));

        let latest = store.get_entity(&scope, &id, None).await.unwrap().unwrap();
        assert_eq!(latest.string("name"), Some("grace"));
        assert_eq!(latest.version, 2);

        let old = store
            .get_entity(&scope, &id, Some(1))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(old.string("name"), Some("ada"));
    }

    #[tokio::test]
    async fn test_entity_logical_delete() {
        let store = MemoryEntityStore::new();
        let scope = scope();
        let id = Id::new("user");

        store
            .put_entity(&scope, Entity::new(id.clone()))
            .await
            .unwrap();
        store.delete_entity(&scope, &id).await.unwrap();

        assert!(store.get_entity(&scope, &id, None).await.unwrap().is_none());
        // Prior version still readable
        assert!(store
            .get_entity(&scope, &id, Some(1))
            .await
            .unwrap()
            .is_some());

        let drained = store.drain_deleted_nodes().await.unwrap();
        assert_eq!(drained, vec![(scope.clone(), id.clone())]);
        assert!(store.drain_deleted_nodes().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_put_entity_rejects_oversized_property_value() {
        let store = MemoryEntityStore::new();
        let scope = scope();
        let id = Id::new("user");

        let blob = "x".repeat(tangle_core::limits::MAX_PROPERTY_VALUE_LEN + 1);
        let result = store
            .put_entity(&scope, Entity::new(id.clone()).with_property("blob", json!(blob)))
            .await;
        assert!(matches!(result, Err(StoreError::Validation(_))));

        // Nothing is stored when validation fails
        assert!(store.get_entity(&scope, &id, None).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_put_entity_rejects_empty_kind() {
        let store = MemoryEntityStore::new();
        let result = store.put_entity(&scope(), Entity::new(Id::new(""))).await;
        assert!(matches!(result, Err(StoreError::Validation(_))));
    }

    #[tokio::test]
    async fn test_delete_unknown_entity() {
        let store = MemoryEntityStore::new();
        let result = store.delete_entity(&scope(), &Id::new("user")).await;
        assert!(matches!(result, Err(StoreError::EntityNotFound(_))));
    }
}
