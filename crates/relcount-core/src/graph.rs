//! # In-Memory Host Graph
//!
//! A minimal property graph that implements both host ports. Used by tests,
//! benchmarks and embedders that keep their graph in memory.
//!
//! All data structures use `BTreeMap` for deterministic ordering. Every
//! mutation returns the [`EdgeChange`] the cache needs to hear about.

use crate::ingestor::EdgeChange;
use crate::storage::{EdgeSource, PropertyChange, PropertyStore, PropertyValue};
use crate::{EdgeId, EdgeRecord, RelcountError, VertexId};
use std::collections::{BTreeMap, BTreeSet};

/// In-memory host graph.
#[derive(Debug, Clone, Default)]
pub struct Graph {
    edges: BTreeMap<EdgeId, EdgeRecord>,
    adjacency: BTreeMap<VertexId, BTreeSet<EdgeId>>,
    properties: BTreeMap<VertexId, BTreeMap<String, PropertyValue>>,
    next_edge_id: u64,
}

impl Graph {
    /// Create an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an edge and return the change to feed to the cache.
    pub fn add_edge(
        &mut self,
        label: impl Into<String>,
        start: VertexId,
        end: VertexId,
        properties: Vec<(String, String)>,
    ) -> EdgeChange {
        let id = EdgeId(self.next_edge_id);
        self.next_edge_id = self.next_edge_id.saturating_add(1);
        let edge = EdgeRecord::new(id, label, start, end, properties);
        self.adjacency.entry(start).or_default().insert(id);
        self.adjacency.entry(end).or_default().insert(id);
        self.edges.insert(id, edge.clone());
        EdgeChange::Created(edge)
    }

    /// Remove an edge.
    pub fn remove_edge(&mut self, id: EdgeId) -> Result<EdgeChange, RelcountError> {
        let edge = self
            .edges
            .remove(&id)
            .ok_or(RelcountError::EdgeNotFound(id))?;
        for vertex in [edge.start, edge.end] {
            if let Some(ids) = self.adjacency.get_mut(&vertex) {
                ids.remove(&id);
                if ids.is_empty() {
                    self.adjacency.remove(&vertex);
                }
            }
        }
        Ok(EdgeChange::Deleted(edge))
    }

    /// Replace the properties of an edge.
    pub fn update_edge(
        &mut self,
        id: EdgeId,
        properties: Vec<(String, String)>,
    ) -> Result<EdgeChange, RelcountError> {
        let edge = self
            .edges
            .get_mut(&id)
            .ok_or(RelcountError::EdgeNotFound(id))?;
        let before = edge.clone();
        edge.properties = properties;
        Ok(EdgeChange::Updated {
            before,
            after: edge.clone(),
        })
    }

    /// Remove a vertex with all its edges and properties.
    ///
    /// Returns the deletions of the removed edges, so the caches of the
    /// other endpoints can follow.
    pub fn remove_vertex(&mut self, vertex: VertexId) -> Vec<EdgeChange> {
        let ids: Vec<EdgeId> = self
            .adjacency
            .get(&vertex)
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default();
        let changes = ids
            .into_iter()
            .filter_map(|id| self.remove_edge(id).ok())
            .collect();
        self.properties.remove(&vertex);
        changes
    }

    #[must_use]
    pub fn edge(&self, id: EdgeId) -> Option<&EdgeRecord> {
        self.edges.get(&id)
    }

    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    #[must_use]
    pub fn vertex_count(&self) -> usize {
        self.adjacency.len()
    }
}

impl PropertyStore for Graph {
    fn properties(
        &self,
        vertex: VertexId,
        prefix: &str,
    ) -> Result<Vec<(String, PropertyValue)>, RelcountError> {
        Ok(self
            .properties
            .get(&vertex)
            .map(|props| {
                props
                    .range(prefix.to_string()..)
                    .take_while(|(k, _)| k.starts_with(prefix))
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect()
            })
            .unwrap_or_default())
    }

    fn apply_properties(
        &mut self,
        vertex: VertexId,
        changes: Vec<PropertyChange>,
    ) -> Result<(), RelcountError> {
        let props = self.properties.entry(vertex).or_default();
        for change in changes {
            match change.value {
                Some(value) => {
                    props.insert(change.key, value);
                }
                None => {
                    props.remove(&change.key);
                }
            }
        }
        if props.is_empty() {
            self.properties.remove(&vertex);
        }
        Ok(())
    }
}

impl EdgeSource for Graph {
    fn vertices(&self) -> Result<Vec<VertexId>, RelcountError> {
        Ok(self.adjacency.keys().copied().collect())
    }

    fn edges_of(&self, vertex: VertexId) -> Result<Vec<EdgeRecord>, RelcountError> {
        Ok(self
            .adjacency
            .get(&vertex)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| self.edges.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default())
    }
}

// =============================================================================
// TESTS
// =============================================================================
