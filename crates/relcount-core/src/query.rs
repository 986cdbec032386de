//! # Query Module
//!
//! Resolves a (possibly partial or wildcarded) query against one vertex
//! cache, returning an exact count or `AmbiguousCount`.
//!
//! - Literal queries hit the exact entry first (`O(log n)`)
//! - Aggregate queries use the power-set index when it can answer
//! - Otherwise entries are scanned: excluded entries are skipped, covered
//!   entries summed, and anything in between means compaction took away the
//!   requested granularity
//!
//! Stored entries are pairwise disjoint, so summation never double counts.

use crate::aggregates::AggregateIndex;
use crate::descriptor::Descriptor;
use crate::lattice::{Query, QueryMode};
use crate::store::CountStore;
use crate::RelcountError;

/// Read-only view over one vertex cache.
#[derive(Debug, Clone, Copy)]
pub struct QueryEngine<'a> {
    store: &'a CountStore,
    aggregates: Option<&'a AggregateIndex>,
}

impl<'a> QueryEngine<'a> {
    /// Query the primary store only.
    #[must_use]
    pub fn new(store: &'a CountStore) -> Self {
        Self {
            store,
            aggregates: None,
        }
    }

    /// Query the primary store, consulting `aggregates` first for
    /// aggregate queries.
    #[must_use]
    pub fn with_aggregates(store: &'a CountStore, aggregates: &'a AggregateIndex) -> Self {
        Self {
            store,
            aggregates: Some(aggregates),
        }
    }

    /// Count the edges selected by `query`.
    pub fn count(&self, query: &Query) -> Result<u64, RelcountError> {
        let descriptor = &query.descriptor;

        if query.mode == QueryMode::Literal && descriptor.is_literal() {
            let exact = self.store.get(descriptor);
            if exact > 0 {
                return Ok(exact);
            }
        }

        if query.mode == QueryMode::Aggregate {
            if let Some(count) = self.aggregates.and_then(|index| index.get(descriptor)) {
                return Ok(count);
            }
        }

        let mut total = 0u64;
        for (entry, count) in self.store.enumerate() {
            if query.excludes(entry) {
                continue;
            }
            if !query.covers(entry) {
                tracing::trace!(query = %descriptor, entry = %entry, "query needs folded granularity");
                return Err(RelcountError::AmbiguousCount {
                    query: descriptor.encode(),
                });
            }
            total = total.saturating_add(count);
        }
        Ok(total)
    }

    /// Aggregate count: absent keys are unconstrained.
    pub fn count_aggregate(&self, descriptor: &Descriptor) -> Result<u64, RelcountError> {
        self.count(&Query::aggregate(descriptor.clone()))
    }

    /// Literal count: absent keys must be absent on the edge.
    pub fn count_literal(&self, descriptor: &Descriptor) -> Result<u64, RelcountError> {
        self.count(&Query::literal(descriptor.clone()))
    }
}

// =============================================================================
// TESTS
// =============================================================================
