//! # Ingestor Module
//!
//! Event validation and edge-change resolution.
//!
//! - Validate vertex events before any cache mutation
//! - Reject malformed input
//! - Turn host edge changes into per-vertex events through the inclusion,
//!   extraction and weighing policies

use crate::mutation::VertexEvent;
use crate::policy::{
    ExtractAll, ExtractionPolicy, IncludeAll, InclusionPolicy, OneForEach, WeighingPolicy,
};
use crate::primitives::{MAX_LABEL_LENGTH, MAX_TAG_KEY_LENGTH, MAX_TAG_VALUE_LENGTH, MAX_TAGS};
use crate::{EdgeRecord, RelcountError, VertexId, Viewpoint};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// A change to one host edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EdgeChange {
    Created(EdgeRecord),
    Deleted(EdgeRecord),
    Updated {
        before: EdgeRecord,
        after: EdgeRecord,
    },
}

/// The Ingestor validates events and resolves edge changes.
pub struct Ingestor {
    inclusion: Box<dyn InclusionPolicy>,
    extraction: Box<dyn ExtractionPolicy>,
    weighing: Box<dyn WeighingPolicy>,
}

impl fmt::Debug for Ingestor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ingestor").finish_non_exhaustive()
    }
}

impl Default for Ingestor {
    fn default() -> Self {
        Self::new()
    }
}

impl Ingestor {
    /// Include every edge, extract every property, weigh each edge 1.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inclusion: Box::new(IncludeAll),
            extraction: Box::new(ExtractAll),
            weighing: Box::new(OneForEach),
        }
    }

    #[must_use]
    pub fn with_inclusion(mut self, policy: impl InclusionPolicy + 'static) -> Self {
        self.inclusion = Box::new(policy);
        self
    }

    #[must_use]
    pub fn with_extraction(mut self, policy: impl ExtractionPolicy + 'static) -> Self {
        self.extraction = Box::new(policy);
        self
    }

    #[must_use]
    pub fn with_weighing(mut self, policy: impl WeighingPolicy + 'static) -> Self {
        self.weighing = Box::new(policy);
        self
    }

    // =========================================================================
    // VALIDATION
    // =========================================================================

    /// Validate a vertex event.
    ///
    /// An event is valid if:
    /// - The label is non-empty and within length limits
    /// - The direction is `Outgoing` or `Incoming`
    /// - The weight is positive and fits a signed delta
    /// - Every tag list has at most `MAX_TAGS` tags, no repeated key, and
    ///   non-empty keys; keys and values are within length limits
    ///
    /// Returns `RelcountError::InvalidEvent` if validation fails.
    pub fn validate(event: &VertexEvent) -> Result<(), RelcountError> {
        let label = event.label();
        if label.is_empty() {
            return Err(invalid("empty label"));
        }
        if label.len() > MAX_LABEL_LENGTH {
            return Err(invalid("label too long"));
        }
        if !event.direction().is_concrete() {
            return Err(invalid("events must be OUTGOING or INCOMING"));
        }
        let weight = event.weight();
        if weight == 0 || i64::try_from(weight).is_err() {
            return Err(invalid("weight out of range"));
        }

        for tags in event.tag_sets() {
            if tags.len() > MAX_TAGS {
                return Err(invalid("too many tags"));
            }
            let mut keys = BTreeSet::new();
            for (key, value) in tags {
                if key.is_empty() {
                    return Err(invalid("empty tag key"));
                }
                if key.len() > MAX_TAG_KEY_LENGTH {
                    return Err(invalid("tag key too long"));
                }
                if value.len() > MAX_TAG_VALUE_LENGTH {
                    return Err(invalid("tag value too long"));
                }
                if !keys.insert(key.as_str()) {
                    return Err(RelcountError::InvalidEvent(format!(
                        "repeated tag key '{}'",
                        key
                    )));
                }
            }
        }
        Ok(())
    }

    // =========================================================================
    // RESOLUTION
    // =========================================================================

    /// Per-vertex events for one edge change, in endpoint order.
    ///
    /// A self-loop yields two events on the same vertex, one `Incoming` and
    /// one `Outgoing`. An update whose inclusion flips becomes a deletion or
    /// a creation; an update that moves the edge (label or endpoints) becomes
    /// both.
    #[must_use]
    pub fn resolve(&self, change: &EdgeChange) -> Vec<(VertexId, VertexEvent)> {
        match change {
            EdgeChange::Created(edge) => self.created(edge),
            EdgeChange::Deleted(edge) => self.deleted(edge),
            EdgeChange::Updated { before, after } => self.updated(before, after),
        }
    }

    /// Creation events for an edge, used by rebuilds.
    #[must_use]
    pub fn created(&self, edge: &EdgeRecord) -> Vec<(VertexId, VertexEvent)> {
        if !self.inclusion.include(edge) {
            return Vec::new();
        }
        edge.viewpoints()
            .into_iter()
            .map(|vp| {
                let event = VertexEvent::Created {
                    label: edge.label.clone(),
                    direction: vp.direction,
                    tags: self.extraction.extract(edge, vp),
                    weight: self.weighing.weigh(edge, vp),
                };
                (vp.vertex, event)
            })
            .collect()
    }

    fn deleted(&self, edge: &EdgeRecord) -> Vec<(VertexId, VertexEvent)> {
        if !self.inclusion.include(edge) {
            return Vec::new();
        }
        edge.viewpoints()
            .into_iter()
            .map(|vp| {
                let event = VertexEvent::Deleted {
                    label: edge.label.clone(),
                    direction: vp.direction,
                    tags: self.extraction.extract(edge, vp),
                    weight: self.weighing.weigh(edge, vp),
                };
                (vp.vertex, event)
            })
            .collect()
    }

    fn updated(&self, before: &EdgeRecord, after: &EdgeRecord) -> Vec<(VertexId, VertexEvent)> {
        let was = self.inclusion.include(before);
        let is = self.inclusion.include(after);
        let moved = before.label != after.label
            || before.start != after.start
            || before.end != after.end;

        match (was, is) {
            (false, false) => Vec::new(),
            (true, false) => self.deleted(before),
            (false, true) => self.created(after),
            (true, true) if moved => {
                let mut events = self.deleted(before);
                events.extend(self.created(after));
                events
            }
            (true, true) => before
                .viewpoints()
                .into_iter()
                .flat_map(|vp| self.changed_at(before, after, vp))
                .collect(),
        }
    }

    fn changed_at(
        &self,
        before: &EdgeRecord,
        after: &EdgeRecord,
        vp: Viewpoint,
    ) -> Vec<(VertexId, VertexEvent)> {
        let old_weight = self.weighing.weigh(before, vp);
        let new_weight = self.weighing.weigh(after, vp);
        let old_tags = self.extraction.extract(before, vp);
        let new_tags = self.extraction.extract(after, vp);

        if old_weight == new_weight {
            return vec![(
                vp.vertex,
                VertexEvent::PropertiesChanged {
                    label: before.label.clone(),
                    direction: vp.direction,
                    before: old_tags,
                    after: new_tags,
                    weight: new_weight,
                },
            )];
        }
        vec![
            (
                vp.vertex,
                VertexEvent::Deleted {
                    label: before.label.clone(),
                    direction: vp.direction,
                    tags: old_tags,
                    weight: old_weight,
                },
            ),
            (
                vp.vertex,
                VertexEvent::Created {
                    label: after.label.clone(),
                    direction: vp.direction,
                    tags: new_tags,
                    weight: new_weight,
                },
            ),
        ]
    }
}

fn invalid(reason: &str) -> RelcountError {
    RelcountError::InvalidEvent(reason.to_string())
}

// =============================================================================
// TESTS
// =============================================================================
