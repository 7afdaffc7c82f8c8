//! Node identity and scope types

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque identifier for a graph node: a uuid plus a type tag.
///
/// Equality is by value over both parts. The `kind` doubles as the entity
/// type tag; typed views of an entity are constructed on demand from it
/// rather than through subclassing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Id {
    pub uuid: Uuid,
    pub kind: String,
}

impl Id {
    /// Create a new id with a random uuid
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            kind: kind.into(),
        }
    }

    /// Create an id from an existing uuid
    pub fn from_parts(uuid: Uuid, kind: impl Into<String>) -> Self {
        Self {
            uuid,
            kind: kind.into(),
        }
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }
}

impl std::fmt::Display for Id {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.kind, self.uuid)
    }
}

/// Owning scope for entities and edges.
///
/// Every store and pipeline operation takes an explicit scope; there is no
/// implicit global application state.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ApplicationScope {
    /// The application this scope belongs to
    pub application: Id,
}

impl ApplicationScope {
    pub fn new(application: Id) -> Self {
        Self { application }
    }
}

impl std::fmt::Display for ApplicationScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.application)
    }
}
