//! # Cache Maintainer
//!
//! Applies per-vertex mutation events to a vertex cache, then compacts once.
//!
//! All mutations are:
//! - Synchronous and run to completion
//! - Applied in delivery order
//! - Validated up front: a batch with one malformed event changes nothing

use crate::aggregates::AggregateIndex;
use crate::compactor::{CompactionReport, Compactor, GeneralizationStrategy};
use crate::config::{Materialization, RelcountConfig};
use crate::descriptor::Descriptor;
use crate::ingestor::Ingestor;
use crate::query::QueryEngine;
use crate::store::CountStore;
use crate::{Direction, RelcountError};
use serde::{Deserialize, Serialize};

// =============================================================================
// EVENTS
// =============================================================================

/// A change to the edges of one vertex, as seen from that vertex.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum VertexEvent {
    /// An edge with these tags appeared.
    Created {
        label: String,
        direction: Direction,
        tags: Vec<(String, String)>,
        weight: u64,
    },
    /// An edge with these tags disappeared.
    Deleted {
        label: String,
        direction: Direction,
        tags: Vec<(String, String)>,
        weight: u64,
    },
    /// The tags of an existing edge changed.
    PropertiesChanged {
        label: String,
        direction: Direction,
        before: Vec<(String, String)>,
        after: Vec<(String, String)>,
        weight: u64,
    },
}

impl VertexEvent {
    /// Creation event with weight 1.
    #[must_use]
    pub fn created<K: Into<String>, V: Into<String>>(
        label: impl Into<String>,
        direction: Direction,
        tags: impl IntoIterator<Item = (K, V)>,
    ) -> Self {
        VertexEvent::Created {
            label: label.into(),
            direction,
            tags: owned(tags),
            weight: 1,
        }
    }

    /// Deletion event with weight 1.
    #[must_use]
    pub fn deleted<K: Into<String>, V: Into<String>>(
        label: impl Into<String>,
        direction: Direction,
        tags: impl IntoIterator<Item = (K, V)>,
    ) -> Self {
        VertexEvent::Deleted {
            label: label.into(),
            direction,
            tags: owned(tags),
            weight: 1,
        }
    }

    /// Same event, another weight.
    #[must_use]
    pub fn with_weight(mut self, w: u64) -> Self {
        match &mut self {
            VertexEvent::Created { weight, .. }
            | VertexEvent::Deleted { weight, .. }
            | VertexEvent::PropertiesChanged { weight, .. } => *weight = w,
        }
        self
    }

    #[must_use]
    pub fn label(&self) -> &str {
        match self {
            VertexEvent::Created { label, .. }
            | VertexEvent::Deleted { label, .. }
            | VertexEvent::PropertiesChanged { label, .. } => label,
        }
    }

    #[must_use]
    pub fn direction(&self) -> Direction {
        match self {
            VertexEvent::Created { direction, .. }
            | VertexEvent::Deleted { direction, .. }
            | VertexEvent::PropertiesChanged { direction, .. } => *direction,
        }
    }

    #[must_use]
    pub fn weight(&self) -> u64 {
        match self {
            VertexEvent::Created { weight, .. }
            | VertexEvent::Deleted { weight, .. }
            | VertexEvent::PropertiesChanged { weight, .. } => *weight,
        }
    }

    /// Every tag list the event carries.
    pub fn tag_sets(&self) -> Vec<&[(String, String)]> {
        match self {
            VertexEvent::Created { tags, .. } | VertexEvent::Deleted { tags, .. } => {
                vec![tags.as_slice()]
            }
            VertexEvent::PropertiesChanged { before, after, .. } => {
                vec![before.as_slice(), after.as_slice()]
            }
        }
    }
}

fn owned<K: Into<String>, V: Into<String>>(
    tags: impl IntoIterator<Item = (K, V)>,
) -> Vec<(String, String)> {
    tags.into_iter().map(|(k, v)| (k.into(), v.into())).collect()
}

fn same_tag_set(a: &[(String, String)], b: &[(String, String)]) -> bool {
    let mut a = a.to_vec();
    let mut b = b.to_vec();
    a.sort();
    b.sort();
    a == b
}

// =============================================================================
// VERTEX CACHE
// =============================================================================

/// Complete cache state of one vertex.
#[derive(Debug, Clone)]
pub struct VertexCache {
    pub(crate) store: CountStore,
    pub(crate) aggregates: Option<AggregateIndex>,
}

impl VertexCache {
    /// Empty cache; `aggregates` is present in power-set mode.
    #[must_use]
    pub fn new(aggregates: Option<AggregateIndex>) -> Self {
        Self {
            store: CountStore::new(),
            aggregates,
        }
    }

    #[must_use]
    pub fn store(&self) -> &CountStore {
        &self.store
    }

    #[must_use]
    pub fn aggregates(&self) -> Option<&AggregateIndex> {
        self.aggregates.as_ref()
    }

    /// Query engine over this cache.
    #[must_use]
    pub fn engine(&self) -> QueryEngine<'_> {
        match &self.aggregates {
            Some(index) => QueryEngine::with_aggregates(&self.store, index),
            None => QueryEngine::new(&self.store),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.store.is_empty() && self.aggregates.as_ref().is_none_or(AggregateIndex::is_empty)
    }

    /// Drop every entry and aggregate.
    pub fn clear(&mut self) {
        self.store.clear();
        if let Some(index) = &mut self.aggregates {
            index.clear();
        }
    }
}

// =============================================================================
// MAINTAINER
// =============================================================================

/// Applies event batches to vertex caches.
#[derive(Debug)]
pub struct CacheMaintainer {
    compactor: Compactor,
    materialization: Materialization,
    aggregate_limit: usize,
}

impl CacheMaintainer {
    /// Create a maintainer with the default generalization strategy.
    pub fn new(config: &RelcountConfig) -> Result<Self, RelcountError> {
        config.validate()?;
        Ok(Self {
            compactor: Compactor::new(config.compaction_threshold, config.compaction_scope),
            materialization: config.materialization,
            aggregate_limit: config.aggregate_limit,
        })
    }

    /// Create a maintainer with a custom generalization strategy.
    pub fn with_strategy(
        config: &RelcountConfig,
        strategy: impl GeneralizationStrategy + Send + Sync + 'static,
    ) -> Result<Self, RelcountError> {
        config.validate()?;
        Ok(Self {
            compactor: Compactor::with_strategy(
                config.compaction_threshold,
                config.compaction_scope,
                strategy,
            ),
            materialization: config.materialization,
            aggregate_limit: config.aggregate_limit,
        })
    }

    /// A fresh cache shaped for this maintainer's materialization.
    #[must_use]
    pub fn new_cache(&self) -> VertexCache {
        match self.materialization {
            Materialization::Literal => VertexCache::new(None),
            Materialization::PowerSet => {
                VertexCache::new(Some(AggregateIndex::new(self.aggregate_limit)))
            }
        }
    }

    #[must_use]
    pub fn compactor(&self) -> &Compactor {
        &self.compactor
    }

    /// Apply a batch of events in order, then compact once.
    pub fn apply(
        &self,
        cache: &mut VertexCache,
        events: &[VertexEvent],
    ) -> Result<CompactionReport, RelcountError> {
        for event in events {
            Ingestor::validate(event)?;
        }
        for event in events {
            self.apply_one(cache, event)?;
        }
        Ok(self.compactor.compact(&mut cache.store))
    }

    /// Discard the cache and replay `events`.
    pub fn rebuild(
        &self,
        cache: &mut VertexCache,
        events: &[VertexEvent],
    ) -> Result<CompactionReport, RelcountError> {
        cache.clear();
        self.apply(cache, events)
    }

    fn apply_one(&self, cache: &mut VertexCache, event: &VertexEvent) -> Result<(), RelcountError> {
        let label = event.label();
        let direction = event.direction();
        let weight = event.weight();
        let delta = i64::try_from(weight)
            .map_err(|_| RelcountError::InvalidEvent(format!("weight {} too large", weight)))?;

        match event {
            VertexEvent::Created { tags, .. } => {
                cache
                    .store
                    .increment(&Descriptor::literal(label, direction, tags.iter().cloned()), delta);
                if let Some(index) = &mut cache.aggregates {
                    index.record(label, direction, tags, weight);
                }
            }
            VertexEvent::Deleted { tags, .. } => {
                Self::remove(cache, label, direction, tags, weight);
                if let Some(index) = &mut cache.aggregates {
                    index.retract(label, direction, tags, weight);
                }
            }
            VertexEvent::PropertiesChanged { before, after, .. } => {
                if same_tag_set(before, after) {
                    return Ok(());
                }
                Self::remove(cache, label, direction, before, weight);
                cache
                    .store
                    .increment(&Descriptor::literal(label, direction, after.iter().cloned()), delta);
                if let Some(index) = &mut cache.aggregates {
                    index.change(label, direction, before, after, weight);
                }
            }
        }
        Ok(())
    }

    fn remove(
        cache: &mut VertexCache,
        label: &str,
        direction: Direction,
        tags: &[(String, String)],
        weight: u64,
    ) {
        let literal = Descriptor::literal(label, direction, tags.iter().cloned());
        if !cache.store.decrement(&literal, weight) {
            tracing::warn!(
                descriptor = %literal,
                weight,
                "relationship count cache out of sync; decrement ignored"
            );
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
