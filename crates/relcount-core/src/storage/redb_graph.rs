//! # redb-backed Host Graph
//!
//! A disk-backed host graph using the redb embedded database. It keeps edges,
//! an adjacency index and vertex properties, and implements both cache ports,
//! so cached counts persist next to the edges they summarize.
//!
//! redb provides:
//! - ACID transactions
//! - Crash safety (copy-on-write B-trees)
//! - MVCC (concurrent readers, single writer)

use crate::ingestor::EdgeChange;
use crate::storage::{EdgeSource, PropertyChange, PropertyStore, PropertyValue};
use crate::{EdgeId, EdgeRecord, RelcountError, VertexId};
use redb::{Database, ReadableDatabase, ReadableTable, ReadableTableMetadata, TableDefinition};
use std::collections::BTreeSet;
use std::path::Path;

/// Table for edges: EdgeId(u64) -> serialized EdgeRecord bytes
const EDGES: TableDefinition<u64, &[u8]> = TableDefinition::new("edges");

/// Table for adjacency: (vertex_id, edge_id) -> endpoint role
const ADJACENCY: TableDefinition<(u64, u64), u8> = TableDefinition::new("adjacency");

/// Table for vertex properties: (vertex_id, key) -> serialized PropertyValue
const VERTEX_PROPERTIES: TableDefinition<(u64, &str), &[u8]> =
    TableDefinition::new("vertex_properties");

/// Table for metadata: key string -> value u64
const METADATA: TableDefinition<&str, u64> = TableDefinition::new("metadata");

const ROLE_START: u8 = 0;
const ROLE_END: u8 = 1;
const ROLE_LOOP: u8 = 2;

fn io(e: impl std::fmt::Display) -> RelcountError {
    RelcountError::IoError(e.to_string())
}

/// A disk-backed host graph using redb.
pub struct RedbGraph {
    /// The redb database handle.
    db: Database,
    /// Next available edge ID.
    next_edge_id: u64,
}

impl std::fmt::Debug for RedbGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbGraph")
            .field("next_edge_id", &self.next_edge_id)
            .finish_non_exhaustive()
    }
}

impl RedbGraph {
    /// Open or create a graph database at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, RelcountError> {
        let db = Database::create(path.as_ref()).map_err(io)?;

        // Initialize tables if they don't exist
        {
            let write_txn = db.begin_write().map_err(io)?;
            let _ = write_txn.open_table(EDGES).map_err(io)?;
            let _ = write_txn.open_table(ADJACENCY).map_err(io)?;
            let _ = write_txn.open_table(VERTEX_PROPERTIES).map_err(io)?;
            let _ = write_txn.open_table(METADATA).map_err(io)?;
            write_txn.commit().map_err(io)?;
        }

        let next_edge_id = {
            let read_txn = db.begin_read().map_err(io)?;
            let table = read_txn.open_table(METADATA).map_err(io)?;
            table
                .get("next_edge_id")
                .map_err(io)?
                .map(|v| v.value())
                .unwrap_or(0)
        };

        Ok(Self { db, next_edge_id })
    }

    /// Compact the database file.
    pub fn compact(&mut self) -> Result<(), RelcountError> {
        self.db.compact().map_err(io)?;
        Ok(())
    }

    // =========================================================================
    // EDGE MUTATIONS
    // =========================================================================

    /// Add an edge and return the change to feed to the cache.
    pub fn add_edge(
        &mut self,
        label: impl Into<String>,
        start: VertexId,
        end: VertexId,
        properties: Vec<(String, String)>,
    ) -> Result<EdgeChange, RelcountError> {
        let id = EdgeId(self.next_edge_id);
        let edge = EdgeRecord::new(id, label, start, end, properties);
        let bytes = postcard::to_allocvec(&edge)
            .map_err(|e| RelcountError::SerializationError(e.to_string()))?;

        let write_txn = self.db.begin_write().map_err(io)?;
        {
            let mut edges = write_txn.open_table(EDGES).map_err(io)?;
            let mut adjacency = write_txn.open_table(ADJACENCY).map_err(io)?;
            let mut meta = write_txn.open_table(METADATA).map_err(io)?;

            edges.insert(id.0, bytes.as_slice()).map_err(io)?;
            if edge.is_loop() {
                adjacency.insert((start.0, id.0), ROLE_LOOP).map_err(io)?;
            } else {
                adjacency.insert((start.0, id.0), ROLE_START).map_err(io)?;
                adjacency.insert((end.0, id.0), ROLE_END).map_err(io)?;
            }
            meta.insert("next_edge_id", id.0.saturating_add(1))
                .map_err(io)?;
        }
        write_txn.commit().map_err(io)?;

        self.next_edge_id = id.0.saturating_add(1);
        Ok(EdgeChange::Created(edge))
    }

    /// Remove an edge.
    pub fn remove_edge(&mut self, id: EdgeId) -> Result<EdgeChange, RelcountError> {
        let edge = self.edge(id)?.ok_or(RelcountError::EdgeNotFound(id))?;

        let write_txn = self.db.begin_write().map_err(io)?;
        {
            let mut edges = write_txn.open_table(EDGES).map_err(io)?;
            let mut adjacency = write_txn.open_table(ADJACENCY).map_err(io)?;
            edges.remove(id.0).map_err(io)?;
            adjacency.remove((edge.start.0, id.0)).map_err(io)?;
            adjacency.remove((edge.end.0, id.0)).map_err(io)?;
        }
        write_txn.commit().map_err(io)?;

        Ok(EdgeChange::Deleted(edge))
    }

    /// Replace the properties of an edge.
    pub fn update_edge(
        &mut self,
        id: EdgeId,
        properties: Vec<(String, String)>,
    ) -> Result<EdgeChange, RelcountError> {
        let before = self.edge(id)?.ok_or(RelcountError::EdgeNotFound(id))?;
        let mut after = before.clone();
        after.properties = properties;
        let bytes = postcard::to_allocvec(&after)
            .map_err(|e| RelcountError::SerializationError(e.to_string()))?;

        let write_txn = self.db.begin_write().map_err(io)?;
        {
            let mut edges = write_txn.open_table(EDGES).map_err(io)?;
            edges.insert(id.0, bytes.as_slice()).map_err(io)?;
        }
        write_txn.commit().map_err(io)?;

        Ok(EdgeChange::Updated { before, after })
    }

    // =========================================================================
    // READS
    // =========================================================================

    /// Look up an edge by id.
    pub fn edge(&self, id: EdgeId) -> Result<Option<EdgeRecord>, RelcountError> {
        let read_txn = self.db.begin_read().map_err(io)?;
        let edges = read_txn.open_table(EDGES).map_err(io)?;
        let Some(data) = edges.get(id.0).map_err(io)? else {
            return Ok(None);
        };
        let edge = postcard::from_bytes(data.value())
            .map_err(|e| RelcountError::DeserializationError(e.to_string()))?;
        Ok(Some(edge))
    }

    /// Total number of edges.
    pub fn edge_count(&self) -> Result<usize, RelcountError> {
        let read_txn = self.db.begin_read().map_err(io)?;
        let edges = read_txn.open_table(EDGES).map_err(io)?;
        Ok(edges.len().map_err(io)? as usize)
    }

    /// Vertices that carry at least one property starting with `prefix`.
    pub fn vertices_with_properties(&self, prefix: &str) -> Result<Vec<VertexId>, RelcountError> {
        let read_txn = self.db.begin_read().map_err(io)?;
        let table = read_txn.open_table(VERTEX_PROPERTIES).map_err(io)?;
        let mut vertices = BTreeSet::new();
        for entry in table.iter().map_err(io)? {
            let (key, _) = entry.map_err(io)?;
            let (vertex, name) = key.value();
            if name.starts_with(prefix) {
                vertices.insert(VertexId(vertex));
            }
        }
        Ok(vertices.into_iter().collect())
    }
}

// =============================================================================
// HOST PORTS
// =============================================================================

impl PropertyStore for RedbGraph {
    fn properties(
        &self,
        vertex: VertexId,
        prefix: &str,
    ) -> Result<Vec<(String, PropertyValue)>, RelcountError> {
        let read_txn = self.db.begin_read().map_err(io)?;
        let table = read_txn.open_table(VERTEX_PROPERTIES).map_err(io)?;

        let mut result = Vec::new();
        for entry in table.range((vertex.0, prefix)..).map_err(io)? {
            let (key, value) = entry.map_err(io)?;
            let (owner, name) = key.value();
            if owner != vertex.0 || !name.starts_with(prefix) {
                break;
            }
            let value: PropertyValue = postcard::from_bytes(value.value())
                .map_err(|e| RelcountError::DeserializationError(e.to_string()))?;
            result.push((name.to_string(), value));
        }
        Ok(result)
    }

    fn apply_properties(
        &mut self,
        vertex: VertexId,
        changes: Vec<PropertyChange>,
    ) -> Result<(), RelcountError> {
        if changes.is_empty() {
            return Ok(());
        }
        let write_txn = self.db.begin_write().map_err(io)?;
        {
            let mut table = write_txn.open_table(VERTEX_PROPERTIES).map_err(io)?;
            for change in changes {
                match change.value {
                    Some(value) => {
                        let bytes = postcard::to_allocvec(&value)
                            .map_err(|e| RelcountError::SerializationError(e.to_string()))?;
                        table
                            .insert((vertex.0, change.key.as_str()), bytes.as_slice())
                            .map_err(io)?;
                    }
                    None => {
                        table
                            .remove((vertex.0, change.key.as_str()))
                            .map_err(io)?;
                    }
                }
            }
        }
        write_txn.commit().map_err(io)?;
        Ok(())
    }
}

impl EdgeSource for RedbGraph {
    fn vertices(&self) -> Result<Vec<VertexId>, RelcountError> {
        let read_txn = self.db.begin_read().map_err(io)?;
        let adjacency = read_txn.open_table(ADJACENCY).map_err(io)?;
        let mut vertices = BTreeSet::new();
        for entry in adjacency.iter().map_err(io)? {
            let (key, _) = entry.map_err(io)?;
            vertices.insert(VertexId(key.value().0));
        }
        Ok(vertices.into_iter().collect())
    }

    fn edges_of(&self, vertex: VertexId) -> Result<Vec<EdgeRecord>, RelcountError> {
        let read_txn = self.db.begin_read().map_err(io)?;
        let adjacency = read_txn.open_table(ADJACENCY).map_err(io)?;
        let edges = read_txn.open_table(EDGES).map_err(io)?;

        let mut result = Vec::new();
        for entry in adjacency
            .range((vertex.0, 0u64)..=(vertex.0, u64::MAX))
            .map_err(io)?
        {
            let (key, _role) = entry.map_err(io)?;
            let (_vertex, edge_id) = key.value();
            let Some(data) = edges.get(edge_id).map_err(io)? else {
                continue;
            };
            let edge: EdgeRecord = postcard::from_bytes(data.value())
                .map_err(|e| RelcountError::DeserializationError(e.to_string()))?;
            result.push(edge);
        }
        Ok(result)
    }
}

// =============================================================================
// TESTS
// =============================================================================
