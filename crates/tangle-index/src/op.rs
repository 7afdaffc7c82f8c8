//! Index operations: the ephemeral unit of work between graph and index

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};
use std::time::Duration;
use tangle_core::{ApplicationScope, Id};

/// Whether a document is written or removed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpKind {
    Upsert,
    Delete,
}

/// Deterministic document identity.
///
/// Derived from scope + entity + edge context, never the entity id alone:
/// the same entity reached through different edges gets one document per
/// context.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentId(String);

impl DocumentId {
    pub fn new(scope: &ApplicationScope, entity_id: &Id, context: &EdgeContext) -> Self {
        Self(format!(
            "{}.{}.{}.{}",
            scope.application.uuid, entity_id, context.node, context.edge_type
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DocumentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The edge context an entity is indexed under: the node it hangs off and
/// the edge type connecting them
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EdgeContext {
    pub node: Id,
    pub edge_type: String,
}

impl EdgeContext {
    pub fn new(node: Id, edge_type: impl Into<String>) -> Self {
        Self {
            node,
            edge_type: edge_type.into(),
        }
    }
}

/// One entity version prepared for the search index.
///
/// Ephemeral: created per write, consumed by exactly one bulk submission,
/// then discarded. Equality and hashing cover (document_id, write_alias,
/// data) so a batching window can drop a repeated submission of an
/// unchanged document.
#[derive(Debug, Clone)]
pub struct IndexOperation {
    pub kind: OpKind,
    pub write_alias: String,
    pub document_id: DocumentId,
    pub data: BTreeMap<String, serde_json::Value>,
    /// Absolute expiration; translated to a relative TTL at submission time
    pub expiration: Option<DateTime<Utc>>,
}

impl PartialEq for IndexOperation {
    fn eq(&self, other: &Self) -> bool {
        self.document_id == other.document_id
            && self.write_alias == other.write_alias
            && self.data == other.data
    }
}

impl Eq for IndexOperation {}

impl Hash for IndexOperation {
    fn hash<H: Hasher>(&self, state: &mut H) {
        // data is covered by Eq but not hashed; equal operations share a
        // document id and alias, which is enough for hash consistency
        self.document_id.hash(state);
        self.write_alias.hash(state);
    }
}

impl IndexOperation {
    pub fn upsert(
        write_alias: impl Into<String>,
        document_id: DocumentId,
        data: BTreeMap<String, serde_json::Value>,
    ) -> Self {
        Self {
            kind: OpKind::Upsert,
            write_alias: write_alias.into(),
            document_id,
            data,
            expiration: None,
        }
    }

    pub fn delete(write_alias: impl Into<String>, document_id: DocumentId) -> Self {
        Self {
            kind: OpKind::Delete,
            write_alias: write_alias.into(),
            document_id,
            data: BTreeMap::new(),
            expiration: None,
        }
    }

    pub fn with_expiration(mut self, expiration: DateTime<Utc>) -> Self {
        self.expiration = Some(expiration);
        self
    }

    /// Translate the absolute expiration into the gateway wire form.
    ///
    /// The index engine interprets its TTL argument as a duration from
    /// indexing time, so the relative TTL is computed at submission, never
    /// stored. An expiration at or before `now` must not produce a negative
    /// TTL (undefined behavior in the engine); the operation becomes a
    /// delete instead.
    pub fn resolve(&self, now: DateTime<Utc>) -> ResolvedOperation {
        let (kind, relative_ttl) = match self.expiration {
            None => (self.kind, None),
            Some(expiration) => match (expiration - now).to_std() {
                Ok(ttl) if !ttl.is_zero() => (self.kind, Some(ttl)),
                // Zero or negative: expire immediately
                _ => (OpKind::Delete, None),
            },
        };
        ResolvedOperation {
            kind,
            write_alias: self.write_alias.clone(),
            document_id: self.document_id.clone(),
            data: self.data.clone(),
            relative_ttl,
        }
    }
}

/// Gateway wire form of an index operation: absolute expiration replaced by
/// the relative TTL computed at submission time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedOperation {
    pub kind: OpKind,
    pub write_alias: String,
    pub document_id: DocumentId,
    pub data: BTreeMap<String, serde_json::Value>,
    pub relative_ttl: Option<Duration>,
}

/// Per-document result of a bulk submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentResult {
    pub document_id: DocumentId,
    pub outcome: DocumentOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentOutcome {
    Accepted,
    Rejected(String),
}

impl DocumentResult {
    pub fn accepted(document_id: DocumentId) -> Self {
        Self {
            document_id,
            outcome: DocumentOutcome::Accepted,
        }
    }

    pub fn rejected(document_id: DocumentId, reason: impl Into<String>) -> Self {
        Self {
            document_id,
            outcome: DocumentOutcome::Rejected(reason.into()),
        }
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self.outcome, DocumentOutcome::Accepted)
    }
}
