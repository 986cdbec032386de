//! # Cache Metrics
//!
//! Summary figures over every vertex cache of a host, used by the
//! `status` command and for spotting vertices near their compaction
//! threshold.
//!
//! Ratios are fixed-point integers; the crate does no float arithmetic.

use crate::cache::CountCache;
use crate::storage::{EdgeSource, PropertyStore};
use crate::RelcountError;
use serde::{Deserialize, Serialize};

/// Metrics collected from a host's vertex caches.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheMetrics {
    /// Vertices with at least one edge.
    pub vertex_count: usize,
    /// Vertices whose cache holds at least one entry.
    pub cached_vertex_count: usize,
    /// Stored entries across all vertices.
    pub entry_count: usize,
    /// Entries carrying at least one wildcard.
    pub general_entry_count: usize,
    /// Sum of all stored counts (each edge is counted at both endpoints).
    pub total_count: u64,
    /// Power-set counters across all vertices.
    pub aggregate_count: usize,
    /// Saturated label/direction groups across all vertices.
    pub saturated_group_count: usize,
    /// Entries in the largest label/direction group of any vertex.
    pub largest_group: usize,
    /// `largest_group` as per-mille of the compaction threshold.
    pub threshold_pressure_permille: u64,
}

impl CacheMetrics {
    /// Create new metrics with all zeros.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Walk every vertex of `host` and summarize its cache.
    pub fn collect<H: PropertyStore + EdgeSource + ?Sized>(
        cache: &CountCache,
        host: &H,
    ) -> Result<Self, RelcountError> {
        let mut metrics = Self::empty();
        for vertex in host.vertices()? {
            metrics.vertex_count += 1;
            let vertex_cache = cache.load(host, vertex)?;
            let store = vertex_cache.store();
            if !store.is_empty() {
                metrics.cached_vertex_count += 1;
            }
            metrics.entry_count += store.len();
            metrics.general_entry_count += store
                .entries()
                .filter(|e| e.descriptor.is_general())
                .count();
            metrics.total_count = metrics.total_count.saturating_add(store.total());
            metrics.largest_group = store
                .groups()
                .values()
                .copied()
                .fold(metrics.largest_group, usize::max);
            if let Some(index) = vertex_cache.aggregates() {
                metrics.aggregate_count += index.len();
                metrics.saturated_group_count += index.saturated().count();
            }
        }

        let threshold = cache.config().compaction_threshold.max(1) as u64;
        metrics.threshold_pressure_permille =
            (metrics.largest_group as u64).saturating_mul(1000) / threshold;
        Ok(metrics)
    }
}

// =============================================================================
// TESTS
// =============================================================================
