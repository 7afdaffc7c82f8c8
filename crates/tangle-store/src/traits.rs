//! Store trait definitions

use crate::error::StoreResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tangle_core::{ApplicationScope, Direction, Edge, Entity, Id, MarkedEdge};

/// Outcome of a `write_edge` call.
///
/// A write that loses the last-writer-wins race is a successful no-op, not
/// an error: the store already holds a record for the key with an
/// equal-or-greater timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The edge was inserted or replaced the prior record
    Applied,
    /// An equal-or-newer record already existed; nothing changed
    Superseded,
}

/// Opaque resume point for `query_edges`.
///
/// Encodes the (timestamp, tie-break) position of the last edge returned;
/// pagination order is timestamp descending, tie-break ascending, so the
/// position is total even when timestamps collide.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeCursor {
    pub(crate) timestamp: i64,
    pub(crate) tie: String,
}

/// One page of edges plus the cursor to fetch the next page
#[derive(Debug, Clone)]
pub struct EdgePage {
    pub edges: Vec<MarkedEdge>,
    /// `None` when the result set is exhausted
    pub cursor: Option<EdgeCursor>,
}

/// Durable, queryable record of relationships with mark-based deletion
#[async_trait]
pub trait EdgeStore: Send + Sync {
    /// Insert or overwrite the edge at its (source, type, target) key.
    ///
    /// Last-writer-wins by timestamp; an existing record with an
    /// equal-or-greater timestamp makes this a no-op. Writes to different
    /// keys proceed fully concurrently; writes to the same key serialize
    /// through a per-key compare-and-set.
    async fn write_edge(
        &self,
        scope: &ApplicationScope,
        edge: MarkedEdge,
    ) -> StoreResult<WriteOutcome>;

    /// Tombstone the edge at the given key, at a timestamp no earlier than
    /// its last write. The physical record is retained.
    ///
    /// Fails with `EdgeNotFound` if the key has never been written.
    async fn mark_edge_deleted(&self, scope: &ApplicationScope, edge: &Edge) -> StoreResult<()>;

    /// Query live edges touching `node`, in descending timestamp order.
    ///
    /// Tombstones are filtered at read time. Restartable via the returned
    /// cursor; logically unbounded through cursor chaining.
    async fn query_edges(
        &self,
        scope: &ApplicationScope,
        node: &Id,
        edge_type: &str,
        direction: Direction,
        cursor: Option<EdgeCursor>,
        page_size: usize,
    ) -> StoreResult<EdgePage>;

    /// Low-level scan of every edge touching `node`, tombstones included.
    ///
    /// For compaction and replication; traversal callers use `query_edges`.
    async fn scan_edges(
        &self,
        scope: &ApplicationScope,
        node: &Id,
    ) -> StoreResult<Vec<MarkedEdge>>;

    /// Tombstone edges whose expiry has elapsed as of `now`.
    ///
    /// Idempotent; re-running over already-tombstoned edges is a no-op.
    /// Returns the number of edges newly tombstoned.
    async fn expire_edges(&self, now: DateTime<Utc>) -> StoreResult<usize>;

    /// Set the source/target node-deleted flag on every edge referencing
    /// `node`. Flags are set once and never reverted.
    ///
    /// Returns the number of edges newly flagged.
    async fn mark_node_edges(&self, scope: &ApplicationScope, node: &Id) -> StoreResult<usize>;
}

/// Versioned storage of entity property snapshots
#[async_trait]
pub trait EntityStore: Send + Sync {
    /// Append a new version for the entity; prior versions are never
    /// mutated in place. Returns the assigned version.
    async fn put_entity(&self, scope: &ApplicationScope, entity: Entity) -> StoreResult<u64>;

    /// Fetch an entity snapshot; the latest version when `version` is
    /// unspecified. Returns `None` for unknown ids and after logical
    /// deletion.
    async fn get_entity(
        &self,
        scope: &ApplicationScope,
        id: &Id,
        version: Option<u64>,
    ) -> StoreResult<Option<Entity>>;

    /// Logically delete the entity. Later `get_entity` calls return `None`;
    /// the edge-side node-deleted flags are cascaded lazily by the sweeper,
    /// not synchronously here, since edge fan-out can be large.
    async fn delete_entity(&self, scope: &ApplicationScope, id: &Id) -> StoreResult<()>;

    /// Drain the queue of logically deleted nodes awaiting the edge-flag
    /// cascade. Consumed by the sweeper.
    async fn drain_deleted_nodes(&self) -> StoreResult<Vec<(ApplicationScope, Id)>>;
}
