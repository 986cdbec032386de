//! # Formats Module
//!
//! Persisted layout of vertex caches in host properties.

mod persistence;

pub use persistence::{
    PersistenceHeader, VertexSnapshot, decode_properties, encode_properties, snapshot_from_bytes,
    snapshot_to_bytes,
};
