//! Entity (versioned property bag) types

use crate::id::Id;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// An entity in the graph: a versioned bag of typed properties.
///
/// Owned by exactly one (scope, id) pair. Mutations never overwrite in
/// place; the store appends a new version and readers started before the
/// write keep seeing the version they began with. The type tag lives on
/// `id.kind`; typed views are the accessor methods, built on demand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Unique identifier (uuid + type tag)
    pub id: Id,

    /// Version assigned by the entity store; 0 until first put
    #[serde(default)]
    pub version: u64,

    /// Properties keyed by field name
    #[serde(default)]
    pub properties: HashMap<String, serde_json::Value>,

    /// Optional absolute expiration for the derived index document
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiration: Option<DateTime<Utc>>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl Entity {
    /// Create a new, unversioned entity
    pub fn new(id: Id) -> Self {
        let now = Utc::now();
        Self {
            id,
            version: 0,
            properties: HashMap::new(),
            expiration: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Set a property, replacing any prior value for the field
    pub fn set_property(&mut self, field: impl Into<String>, value: serde_json::Value) {
        self.properties.insert(field.into(), value);
        self.updated_at = Utc::now();
    }

    /// Builder-style property setter
    pub fn with_property(mut self, field: impl Into<String>, value: serde_json::Value) -> Self {
        self.set_property(field, value);
        self
    }

    /// Builder-style expiration setter
    pub fn with_expiration(mut self, expiration: DateTime<Utc>) -> Self {
        self.expiration = Some(expiration);
        self
    }

    /// Typed view: a string property
    pub fn string(&self, field: &str) -> Option<&str> {
        self.properties.get(field).and_then(|v| v.as_str())
    }

    /// Typed view: an integer property
    pub fn integer(&self, field: &str) -> Option<i64> {
        self.properties.get(field).and_then(|v| v.as_i64())
    }

    /// Typed view: a boolean property
    pub fn boolean(&self, field: &str) -> Option<bool> {
        self.properties.get(field).and_then(|v| v.as_bool())
    }

    pub fn kind(&self) -> &str {
        self.id.kind()
    }
}
