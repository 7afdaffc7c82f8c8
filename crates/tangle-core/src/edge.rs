//! Edge (directed relationship) types

use crate::id::Id;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Direction for edge queries relative to a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Outgoing,
    Incoming,
    Both,
}

/// Logical identity of an edge: the (source, type, target) triple.
///
/// The store guarantees at most one visible edge per key; concurrent writes
/// to the same key converge via last-writer-wins on timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EdgeKey {
    pub source_id: Id,
    pub edge_type: String,
    pub target_id: Id,
}

impl EdgeKey {
    pub fn new(source_id: Id, edge_type: impl Into<String>, target_id: Id) -> Self {
        Self {
            source_id,
            edge_type: edge_type.into(),
            target_id,
        }
    }

    /// The endpoint on the other side of `node`, if the key touches it
    pub fn other(&self, node: &Id) -> Option<&Id> {
        if &self.source_id == node {
            Some(&self.target_id)
        } else if &self.target_id == node {
            Some(&self.source_id)
        } else {
            None
        }
    }
}

impl std::fmt::Display for EdgeKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-[{}]->{}", self.source_id, self.edge_type, self.target_id)
    }
}

/// A directed, typed, timestamped relationship between two entity ids.
///
/// Uniquely identified by the full 4-tuple. The timestamp is a write-ordering
/// key, not a wall-clock guarantee; for a given [`EdgeKey`] the greater
/// timestamp wins when resolving duplicate inserts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub source_id: Id,
    pub edge_type: String,
    pub target_id: Id,
    pub timestamp: i64,
}

impl Edge {
    pub fn new(
        source_id: Id,
        edge_type: impl Into<String>,
        target_id: Id,
        timestamp: i64,
    ) -> Self {
        Self {
            source_id,
            edge_type: edge_type.into(),
            target_id,
            timestamp,
        }
    }

    /// The logical (source, type, target) key of this edge
    pub fn key(&self) -> EdgeKey {
        EdgeKey::new(
            self.source_id.clone(),
            self.edge_type.clone(),
            self.target_id.clone(),
        )
    }
}

impl std::fmt::Display for Edge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}-[{} @{}]->{}",
            self.source_id, self.edge_type, self.timestamp, self.target_id
        )
    }
}

/// An edge together with its deletion and expiry markers.
///
/// An edge with `is_deleted = true` is a tombstone: retained physically for
/// scans and compaction, excluded from all read-path traversal. The node
/// deletion flags are derived, set once when an endpoint entity is logically
/// deleted, and never reverted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkedEdge {
    pub edge: Edge,

    /// Tombstone marker
    pub is_deleted: bool,

    /// Source entity was logically deleted after this edge was written
    pub is_source_node_deleted: bool,

    /// Target entity was logically deleted after this edge was written
    pub is_target_node_deleted: bool,

    /// Duration after which the edge is logically gone even without an
    /// explicit delete
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<Duration>,
}

impl MarkedEdge {
    /// A live, never-expiring edge
    pub fn new(edge: Edge) -> Self {
        Self {
            edge,
            is_deleted: false,
            is_source_node_deleted: false,
            is_target_node_deleted: false,
            expires_in: None,
        }
    }

    /// Set the expiry duration
    pub fn with_expiry(mut self, expires_in: Duration) -> Self {
        self.expires_in = Some(expires_in);
        self
    }

    /// Mark as a tombstone
    pub fn deleted(mut self) -> Self {
        self.is_deleted = true;
        self
    }

    pub fn key(&self) -> EdgeKey {
        self.edge.key()
    }

    pub fn timestamp(&self) -> i64 {
        self.edge.timestamp
    }
}
