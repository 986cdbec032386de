//! # relcount-core
//!
//! A per-vertex relationship count cache for property graphs.
//!
//! Every vertex keeps a small table of counts keyed by relationship
//! *descriptors* (label, direction and tag constraints). When a label and
//! direction collect too many distinct combinations, the compactor folds
//! them into wildcarded generalizations, trading exact granularity for a
//! bounded footprint. Queries are answered exactly, or refused with
//! `AmbiguousCount` when compaction has taken away the requested detail.
//!
//! ## Layout
//!
//! - `descriptor`, `lattice`: the descriptor model and its partial order
//! - `store`, `compactor`, `query`: one vertex's counts
//! - `mutation`, `aggregates`, `ingestor`, `policy`: keeping counts current
//! - `cache`, `formats`, `storage`, `graph`: persisting into a host graph
//! - `export`, `system`: verification and metrics
//!
//! ## Constraints
//!
//! - Synchronous, single-threaded per vertex, no async
//! - Deterministic: `BTreeMap` everywhere, no float arithmetic
//! - The host's vertex properties are the only persistent state

// =============================================================================
// MODULES
// =============================================================================

pub mod aggregates;
pub mod cache;
pub mod compactor;
pub mod config;
pub mod descriptor;
pub mod export;
pub mod formats;
pub mod graph;
pub mod ingestor;
pub mod lattice;
pub mod mutation;
pub mod policy;
pub mod primitives;
pub mod query;
pub mod storage;
pub mod store;
pub mod system;
pub mod types;

// =============================================================================
// RE-EXPORTS: Core Types (from types module)
// =============================================================================

pub use types::{Direction, EdgeId, EdgeRecord, RelcountError, VertexId, Viewpoint};

// =============================================================================
// RE-EXPORTS: Cache Engine
// =============================================================================

pub use aggregates::AggregateIndex;
pub use cache::CountCache;
pub use compactor::{CompactionReport, Compactor, FrequentlyChanging, GeneralizationStrategy};
pub use config::{CompactionScope, Materialization, PersistenceFormat, RelcountConfig};
pub use descriptor::{Descriptor, TagValue};
pub use export::{
    CanonicalExport, CanonicalHeader, canonical_checksum, export_canonical, import_canonical,
    restore_canonical, verify_canonical,
};
pub use graph::Graph;
pub use ingestor::{EdgeChange, Ingestor};
pub use lattice::{Query, QueryMode};
pub use mutation::{CacheMaintainer, VertexCache, VertexEvent};
pub use policy::{
    ExtractAll, ExtractKeys, ExtractionPolicy, IncludeAll, IncludeLabels, InclusionPolicy,
    OneForEach, WeighingPolicy, WeightProperty,
};
pub use query::QueryEngine;
pub use storage::{EdgeSource, PropertyChange, PropertyStore, PropertyValue, RedbGraph};
pub use store::{CountEntry, CountStore};

// =============================================================================
// RE-EXPORTS: Formats (from formats module)
// =============================================================================

pub use formats::{PersistenceHeader, VertexSnapshot, snapshot_from_bytes, snapshot_to_bytes};

// =============================================================================
// RE-EXPORTS: System (from system module)
// =============================================================================

pub use system::CacheMetrics;
