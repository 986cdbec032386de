//! # Storage Module
//!
//! Narrow ports between the count cache and its host graph, plus the
//! redb-backed host.
//!
//! The cache never walks the host on its own. It reads and writes vertex
//! properties through [`PropertyStore`] and, for rebuilds only, lists edges
//! through [`EdgeSource`].

mod redb_graph;

pub use redb_graph::RedbGraph;

use crate::{EdgeRecord, RelcountError, VertexId};
use serde::{Deserialize, Serialize};

// =============================================================================
// PROPERTY VALUES
// =============================================================================

/// A vertex property value as the cache stores it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PropertyValue {
    /// Integer count (per-entry persistence).
    Count(i64),
    /// Opaque blob (single-property persistence).
    Bytes(Vec<u8>),
}

/// Set (`Some`) or remove (`None`) one vertex property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyChange {
    pub key: String,
    pub value: Option<PropertyValue>,
}

impl PropertyChange {
    #[must_use]
    pub fn set(key: impl Into<String>, value: PropertyValue) -> Self {
        Self {
            key: key.into(),
            value: Some(value),
        }
    }

    #[must_use]
    pub fn remove(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: None,
        }
    }
}

// =============================================================================
// HOST PORTS
// =============================================================================

/// Per-vertex key/value properties of the host.
pub trait PropertyStore {
    /// Properties of `vertex` whose key starts with `prefix`, sorted by key.
    fn properties(
        &self,
        vertex: VertexId,
        prefix: &str,
    ) -> Result<Vec<(String, PropertyValue)>, RelcountError>;

    /// Apply `changes` to `vertex` atomically.
    fn apply_properties(
        &mut self,
        vertex: VertexId,
        changes: Vec<PropertyChange>,
    ) -> Result<(), RelcountError>;
}

/// Read access to the host's edges.
pub trait EdgeSource {
    /// Every vertex with at least one edge, ascending.
    fn vertices(&self) -> Result<Vec<VertexId>, RelcountError>;

    /// Edges touching `vertex`, ascending by edge id. A self-loop appears
    /// once.
    fn edges_of(&self, vertex: VertexId) -> Result<Vec<EdgeRecord>, RelcountError>;
}
