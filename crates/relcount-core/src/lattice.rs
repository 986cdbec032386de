//! # Generalization Lattice
//!
//! Set semantics of descriptors and the relations the store, the compactor
//! and the query engine build on.
//!
//! Every descriptor denotes a set of edges. Per key the set is a product of
//! per-key constraints:
//!
//! | Tag at key      | Stored / literal reading | Aggregate reading |
//! |-----------------|--------------------------|-------------------|
//! | `Literal(v)`    | value is `v`             | value is `v`      |
//! | `Any`           | any value or absent      | any value or absent |
//! | key not present | key absent               | unconstrained     |
//!
//! Subset and disjointness of two descriptors therefore reduce to per-key
//! checks over the union of their keys, plus label and direction.

use crate::descriptor::{Descriptor, TagValue};
use crate::Direction;
use std::collections::BTreeSet;

// =============================================================================
// QUERY
// =============================================================================

/// How absent keys of a query descriptor are read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum QueryMode {
    /// Absent keys are unconstrained ("how many edges with k1=v1, whatever
    /// else they carry").
    Aggregate,
    /// Absent keys must be absent ("how many edges with exactly these tags").
    Literal,
}

/// A descriptor together with its reading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub descriptor: Descriptor,
    pub mode: QueryMode,
}

impl Query {
    #[must_use]
    pub fn aggregate(descriptor: Descriptor) -> Self {
        Self {
            descriptor,
            mode: QueryMode::Aggregate,
        }
    }

    #[must_use]
    pub fn literal(descriptor: Descriptor) -> Self {
        Self {
            descriptor,
            mode: QueryMode::Literal,
        }
    }

    /// Every edge counted by `entry` is also selected by this query.
    #[must_use]
    pub fn covers(&self, entry: &Descriptor) -> bool {
        is_subset(entry, QueryMode::Literal, &self.descriptor, self.mode)
    }

    /// `entry` and this query share at least one possible edge.
    #[must_use]
    pub fn overlaps(&self, entry: &Descriptor) -> bool {
        !is_disjoint(entry, QueryMode::Literal, &self.descriptor, self.mode)
    }

    /// `entry` and this query cannot share an edge.
    #[must_use]
    pub fn excludes(&self, entry: &Descriptor) -> bool {
        is_disjoint(entry, QueryMode::Literal, &self.descriptor, self.mode)
    }
}

// =============================================================================
// DESCRIPTOR RELATIONS (stored reading on both sides)
// =============================================================================

impl Descriptor {
    /// Every edge described by `other` is also described by `self`.
    /// Reflexive.
    #[must_use]
    pub fn is_more_general_than(&self, other: &Descriptor) -> bool {
        is_subset(other, QueryMode::Literal, self, QueryMode::Literal)
    }

    /// More general than `other` and not equivalent to it.
    #[must_use]
    pub fn is_strictly_more_general_than(&self, other: &Descriptor) -> bool {
        self.is_more_general_than(other) && !other.is_more_general_than(self)
    }

    /// Inverse of `is_more_general_than`.
    #[must_use]
    pub fn is_more_specific_than(&self, other: &Descriptor) -> bool {
        other.is_more_general_than(self)
    }

    /// No edge can be described by both.
    #[must_use]
    pub fn is_mutually_exclusive(&self, other: &Descriptor) -> bool {
        is_disjoint(self, QueryMode::Literal, other, QueryMode::Literal)
    }

    /// Candidate matching against a query descriptor.
    ///
    /// Labels equal, direction equal or the query is `Both`, and every query
    /// tag is met by the same concrete value or a wildcard on the candidate.
    /// Query wildcards match anything, including absence; a query without
    /// tags matches every candidate of its label and direction.
    #[must_use]
    pub fn matches(&self, query: &Descriptor) -> bool {
        !is_disjoint(self, QueryMode::Literal, query, QueryMode::Aggregate)
    }
}

// =============================================================================
// SET ALGEBRA
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Constraint<'a> {
    Equals(&'a str),
    Any,
    Undefined,
}

fn constraint<'a>(desc: &'a Descriptor, key: &str, mode: QueryMode) -> Constraint<'a> {
    match desc.tag(key) {
        Some(TagValue::Literal(v)) => Constraint::Equals(v),
        Some(TagValue::Any) => Constraint::Any,
        None => match mode {
            QueryMode::Aggregate => Constraint::Any,
            QueryMode::Literal => Constraint::Undefined,
        },
    }
}

fn all_keys<'a>(a: &'a Descriptor, b: &'a Descriptor) -> BTreeSet<&'a str> {
    a.keys().chain(b.keys()).collect()
}

fn direction_subset(inner: Direction, outer: Direction) -> bool {
    outer == Direction::Both || inner == outer
}

fn direction_disjoint(a: Direction, b: Direction) -> bool {
    a.is_concrete() && b.is_concrete() && a != b
}

/// `inner` (read with `inner_mode`) is a subset of `outer` (read with `outer_mode`).
fn is_subset(
    inner: &Descriptor,
    inner_mode: QueryMode,
    outer: &Descriptor,
    outer_mode: QueryMode,
) -> bool {
    if inner.label() != outer.label() || !direction_subset(inner.direction(), outer.direction()) {
        return false;
    }
    all_keys(inner, outer).into_iter().all(|key| {
        let outer_c = constraint(outer, key, outer_mode);
        outer_c == Constraint::Any || constraint(inner, key, inner_mode) == outer_c
    })
}

fn is_disjoint(a: &Descriptor, a_mode: QueryMode, b: &Descriptor, b_mode: QueryMode) -> bool {
    if a.label() != b.label() || direction_disjoint(a.direction(), b.direction()) {
        return true;
    }
    all_keys(a, b).into_iter().any(|key| {
        let ca = constraint(a, key, a_mode);
        let cb = constraint(b, key, b_mode);
        ca != Constraint::Any && cb != Constraint::Any && ca != cb
    })
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn lit(tags: &[(&str, &str)]) -> Descriptor {
        Descriptor::literal("test", Direction::Outgoing, tags.iter().copied())
    }

    #[test]
    fn wildcard_is_more_general_than_its_literals() {
        let wild = lit(&[("k1", "v1")]).generalize_one_tag("k1");
        assert!(wild.is_more_general_than(&lit(&[("k1", "v1")])));
        assert!(wild.is_more_general_than(&lit(&[])));
        assert!(wild.is_strictly_more_general_than(&lit(&[("k1", "v2")])));
        assert!(!wild.is_more_general_than(&lit(&[("k1", "v1"), ("k2", "v2")])));
    }

    #[test]
    fn relations_ignore_tag_order() {
        let ab = lit(&[("a", "1"), ("b", "2")]);
        let ba = lit(&[("b", "2"), ("a", "1")]);
        assert!(ab.is_more_general_than(&ba));
        assert!(ba.is_more_general_than(&ab));
        assert!(!ab.is_strictly_more_general_than(&ba));
    }

    #[test]
    fn literals_with_different_keys_are_exclusive() {
        assert!(lit(&[("k1", "v1")]).is_mutually_exclusive(&lit(&[("k1", "v2")])));
        assert!(lit(&[("k1", "v1")]).is_mutually_exclusive(&lit(&[])));
        assert!(lit(&[("k1", "v1")]).is_mutually_exclusive(&lit(&[("k1", "v1"), ("k2", "v2")])));
        assert!(!lit(&[("k1", "v1")]).is_mutually_exclusive(&lit(&[("k1", "v1")])));
    }

    #[test]
    fn partial_wildcards_overlap() {
        let a = lit(&[("k1", "v1")]).generalize_one_tag("k2");
        let b = lit(&[("k2", "v2")]).generalize_one_tag("k1");
        assert!(!a.is_mutually_exclusive(&b));
        assert!(!a.is_more_general_than(&b));
        assert!(!b.is_more_general_than(&a));
    }

    #[test]
    fn direction_and_label_separate_groups() {
        let out = lit(&[]);
        let inc = lit(&[]).with_direction(Direction::Incoming);
        let other = Descriptor::new("other", Direction::Outgoing);
        assert!(out.is_mutually_exclusive(&inc));
        assert!(out.is_mutually_exclusive(&other));
        assert!(out.matches(&Descriptor::new("test", Direction::Both)));
        assert!(!out.matches(&inc));
    }

    #[test]
    fn matches_follows_query_tags_only() {
        let candidate = lit(&[("k1", "v1"), ("k2", "v2")]);
        assert!(candidate.matches(&Descriptor::new("test", Direction::Outgoing)));
        assert!(candidate.matches(&lit(&[("k1", "v1")])));
        assert!(candidate.matches(&lit(&[("k1", "v1")]).with_any("k3")));
        assert!(!candidate.matches(&lit(&[("k1", "v2")])));
        assert!(!candidate.matches(&lit(&[("k3", "v3")])));
        // Candidate wildcard meets any query value.
        assert!(candidate.generalize_one_tag("k1").matches(&lit(&[("k1", "zzz")])));
    }

    #[test]
    fn aggregate_query_covers_specialisations() {
        let q = Query::aggregate(lit(&[("k1", "v1")]));
        assert!(q.covers(&lit(&[("k1", "v1")])));
        assert!(q.covers(&lit(&[("k1", "v1"), ("k2", "x")])));
        assert!(q.covers(&lit(&[("k1", "v1")]).generalize_one_tag("k2")));
        assert!(!q.covers(&lit(&[("k1", "v1")]).generalize_one_tag("k1")));
        assert!(q.overlaps(&lit(&[]).generalize_one_tag("k1")));
        assert!(q.excludes(&lit(&[("k1", "v2")])));
    }

    #[test]
    fn literal_query_requires_absent_keys() {
        let q = Query::literal(lit(&[("k1", "v1")]));
        assert!(q.covers(&lit(&[("k1", "v1")])));
        assert!(q.excludes(&lit(&[("k1", "v1"), ("k2", "x")])));
        // A wildcard entry on k2 may contain edges without k2.
        assert!(q.overlaps(&lit(&[("k1", "v1")]).generalize_one_tag("k2")));
        assert!(!q.covers(&lit(&[("k1", "v1")]).generalize_one_tag("k2")));
    }

    #[test]
    fn zero_tag_and_wildcarded_aggregate_queries_are_equivalent() {
        let bare = Query::aggregate(Descriptor::new("test", Direction::Outgoing));
        let wild = Query::aggregate(Descriptor::new("test", Direction::Outgoing).with_any("k1"));
        for entry in [lit(&[]), lit(&[("k1", "a")]), lit(&[("k2", "b")]).with_any("k1")] {
            assert_eq!(bare.covers(&entry), wild.covers(&entry));
        }
    }
}
