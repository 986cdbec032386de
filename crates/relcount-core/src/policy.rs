//! # Ingestion Policies
//!
//! Pluggable decisions the ingestor makes for every host edge:
//!
//! - [`InclusionPolicy`]: is the edge counted at all?
//! - [`ExtractionPolicy`]: which of its properties become cache tags?
//! - [`WeighingPolicy`]: how much does it count for?
//!
//! Each is a trait with a blanket implementation for closures, so ad hoc
//! policies need no named type.

use crate::{EdgeRecord, Viewpoint};

// =============================================================================
// INCLUSION
// =============================================================================

/// Decides whether an edge is counted.
pub trait InclusionPolicy: Send + Sync {
    fn include(&self, edge: &EdgeRecord) -> bool;
}

impl<F> InclusionPolicy for F
where
    F: Fn(&EdgeRecord) -> bool + Send + Sync,
{
    fn include(&self, edge: &EdgeRecord) -> bool {
        self(edge)
    }
}

/// Count every edge.
#[derive(Debug, Clone, Copy, Default)]
pub struct IncludeAll;

impl InclusionPolicy for IncludeAll {
    fn include(&self, _edge: &EdgeRecord) -> bool {
        true
    }
}

/// Count only edges with one of the given labels.
#[derive(Debug, Clone, Default)]
pub struct IncludeLabels(pub Vec<String>);

impl InclusionPolicy for IncludeLabels {
    fn include(&self, edge: &EdgeRecord) -> bool {
        self.0.iter().any(|label| *label == edge.label)
    }
}

// =============================================================================
// EXTRACTION
// =============================================================================

/// Turns edge properties into cache tags for one endpoint.
pub trait ExtractionPolicy: Send + Sync {
    fn extract(&self, edge: &EdgeRecord, viewpoint: Viewpoint) -> Vec<(String, String)>;
}

impl<F> ExtractionPolicy for F
where
    F: Fn(&EdgeRecord, Viewpoint) -> Vec<(String, String)> + Send + Sync,
{
    fn extract(&self, edge: &EdgeRecord, viewpoint: Viewpoint) -> Vec<(String, String)> {
        self(edge, viewpoint)
    }
}

/// Every property, in edge order.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExtractAll;

impl ExtractionPolicy for ExtractAll {
    fn extract(&self, edge: &EdgeRecord, _viewpoint: Viewpoint) -> Vec<(String, String)> {
        edge.properties.clone()
    }
}

/// Only the listed keys, in edge order.
#[derive(Debug, Clone, Default)]
pub struct ExtractKeys(pub Vec<String>);

impl ExtractionPolicy for ExtractKeys {
    fn extract(&self, edge: &EdgeRecord, _viewpoint: Viewpoint) -> Vec<(String, String)> {
        edge.properties
            .iter()
            .filter(|(k, _)| self.0.contains(k))
            .cloned()
            .collect()
    }
}

// =============================================================================
// WEIGHING
// =============================================================================

/// Weight of an edge seen from one endpoint. Must be positive.
pub trait WeighingPolicy: Send + Sync {
    fn weigh(&self, edge: &EdgeRecord, viewpoint: Viewpoint) -> u64;
}

impl<F> WeighingPolicy for F
where
    F: Fn(&EdgeRecord, Viewpoint) -> u64 + Send + Sync,
{
    fn weigh(&self, edge: &EdgeRecord, viewpoint: Viewpoint) -> u64 {
        self(edge, viewpoint)
    }
}

/// Every edge counts once.
#[derive(Debug, Clone, Copy, Default)]
pub struct OneForEach;

impl WeighingPolicy for OneForEach {
    fn weigh(&self, _edge: &EdgeRecord, _viewpoint: Viewpoint) -> u64 {
        1
    }
}

/// Weight read from an integer edge property; 1 when missing or unparsable.
#[derive(Debug, Clone)]
pub struct WeightProperty(pub String);

impl WeighingPolicy for WeightProperty {
    fn weigh(&self, edge: &EdgeRecord, _viewpoint: Viewpoint) -> u64 {
        edge.property(&self.0)
            .and_then(|v| v.trim().parse::<u64>().ok())
            .filter(|w| *w > 0)
            .unwrap_or(1)
    }
}

// =============================================================================
// TESTS
// =============================================================================
