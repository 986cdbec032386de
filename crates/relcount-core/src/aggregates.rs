//! # Aggregate Index
//!
//! Optional power-set materialization: for every edge, one counter per
//! subset of its tags (keys sorted, aggregate reading). Aggregate queries
//! without wildcards are then a single lookup instead of a scan.
//!
//! The index is bounded per label/direction. A group that would exceed
//! `limit` entries, that sees an edge with more than
//! `MAX_MATERIALIZED_TAGS` tags, or whose counters fall out of sync is
//! *saturated*: its counters are dropped and reads fall back to the primary
//! store until the next rebuild.

use crate::descriptor::{Descriptor, TagValue};
use crate::primitives::MAX_MATERIALIZED_TAGS;
use crate::Direction;
use std::collections::{BTreeMap, BTreeSet};

type Group = (String, Direction);

/// Power-set counters of one vertex.
#[derive(Debug, Clone)]
pub struct AggregateIndex {
    counts: BTreeMap<String, (Descriptor, u64)>,
    sizes: BTreeMap<Group, usize>,
    saturated: BTreeSet<Group>,
    limit: usize,
}

impl AggregateIndex {
    /// Create an empty index holding at most `limit` counters per group.
    #[must_use]
    pub fn new(limit: usize) -> Self {
        Self {
            counts: BTreeMap::new(),
            sizes: BTreeMap::new(),
            saturated: BTreeSet::new(),
            limit,
        }
    }

    // =========================================================================
    // MAINTENANCE
    // =========================================================================

    /// Count an edge under every subset of its tags.
    pub fn record(&mut self, label: &str, direction: Direction, tags: &[(String, String)], weight: u64) {
        let group = (label.to_string(), direction);
        if self.saturated.contains(&group) {
            return;
        }
        if tags.len() > MAX_MATERIALIZED_TAGS {
            self.saturate(group, "edge carries too many tags");
            return;
        }
        let all = subsets(label, direction, tags);
        self.add_all(&group, all, weight);
    }

    /// Remove an edge from every subset of its tags.
    pub fn retract(&mut self, label: &str, direction: Direction, tags: &[(String, String)], weight: u64) {
        let group = (label.to_string(), direction);
        if self.saturated.contains(&group) {
            return;
        }
        if tags.len() > MAX_MATERIALIZED_TAGS {
            self.saturate(group, "edge carries too many tags");
            return;
        }
        let all = subsets(label, direction, tags);
        self.sub_all(&group, all, weight);
    }

    /// Move an edge from `before` to `after`, touching only the subsets
    /// that differ.
    pub fn change(
        &mut self,
        label: &str,
        direction: Direction,
        before: &[(String, String)],
        after: &[(String, String)],
        weight: u64,
    ) {
        let group = (label.to_string(), direction);
        if self.saturated.contains(&group) {
            return;
        }
        if before.len() > MAX_MATERIALIZED_TAGS || after.len() > MAX_MATERIALIZED_TAGS {
            self.saturate(group, "edge carries too many tags");
            return;
        }
        let old = subsets(label, direction, before);
        let new = subsets(label, direction, after);
        let old_keys: BTreeSet<String> = old.iter().map(Descriptor::encode).collect();
        let new_keys: BTreeSet<String> = new.iter().map(Descriptor::encode).collect();

        let removed = old
            .into_iter()
            .filter(|d| !new_keys.contains(&d.encode()))
            .collect();
        let added = new
            .into_iter()
            .filter(|d| !old_keys.contains(&d.encode()))
            .collect();
        if self.sub_all(&group, removed, weight) {
            self.add_all(&group, added, weight);
        }
    }

    fn add_all(&mut self, group: &Group, descriptors: Vec<Descriptor>, weight: u64) {
        let mut overflow = false;
        for desc in descriptors {
            let canonical = desc.encode();
            match self.counts.get_mut(&canonical) {
                Some((_, count)) => match count.checked_add(weight) {
                    Some(sum) => *count = sum,
                    None => overflow = true,
                },
                None => {
                    self.counts.insert(canonical, (desc, weight));
                    *self.sizes.entry(group.clone()).or_insert(0) += 1;
                }
            }
        }
        if overflow {
            self.saturate(group.clone(), "aggregate counter overflow");
            return;
        }
        if self.sizes.get(group).copied().unwrap_or(0) > self.limit {
            self.saturate(group.clone(), "aggregate limit exceeded");
        }
    }

    /// Returns false if the group got saturated on the way.
    fn sub_all(&mut self, group: &Group, descriptors: Vec<Descriptor>, weight: u64) -> bool {
        let in_sync = descriptors.iter().all(|d| {
            self.counts
                .get(&d.encode())
                .is_some_and(|(_, count)| *count >= weight)
        });
        if !in_sync {
            self.saturate(group.clone(), "aggregate counters out of sync");
            return false;
        }
        for desc in descriptors {
            let canonical = desc.encode();
            let emptied = match self.counts.get_mut(&canonical) {
                Some((_, count)) => {
                    *count -= weight;
                    *count == 0
                }
                None => false,
            };
            if emptied {
                self.counts.remove(&canonical);
                if let Some(size) = self.sizes.get_mut(group) {
                    *size = size.saturating_sub(1);
                }
            }
        }
        true
    }

    /// Drop the counters of `group` and stop maintaining it.
    pub fn saturate(&mut self, group: Group, reason: &str) {
        tracing::warn!(
            label = %group.0,
            direction = %group.1,
            reason,
            "aggregate index saturated; falling back to summation"
        );
        self.counts
            .retain(|_, (d, _)| d.label() != group.0 || d.direction() != group.1);
        self.sizes.remove(&group);
        self.saturated.insert(group);
    }

    /// Remove every counter and saturation marker.
    pub fn clear(&mut self) {
        self.counts.clear();
        self.sizes.clear();
        self.saturated.clear();
    }

    // =========================================================================
    // READS
    // =========================================================================

    /// Aggregate count for `query`, or `None` if the index cannot answer.
    ///
    /// Wildcarded query tags are dropped: in the aggregate reading a
    /// wildcard and an absent key select the same edges.
    #[must_use]
    pub fn get(&self, query: &Descriptor) -> Option<u64> {
        let literal: Vec<(String, String)> = query
            .tags()
            .iter()
            .filter_map(|(k, v)| v.as_literal().map(|v| (k.clone(), v.to_string())))
            .collect();
        let directions: &[Direction] = match query.direction() {
            Direction::Both => &[Direction::Outgoing, Direction::Incoming],
            Direction::Outgoing => &[Direction::Outgoing],
            Direction::Incoming => &[Direction::Incoming],
        };
        let mut total = 0u64;
        for direction in directions {
            if self
                .saturated
                .contains(&(query.label().to_string(), *direction))
            {
                return None;
            }
            let key = aggregate_descriptor(query.label(), *direction, literal.iter()).encode();
            total = total.saturating_add(self.counts.get(&key).map_or(0, |(_, c)| *c));
        }
        Some(total)
    }

    /// Counters in canonical order.
    pub fn entries(&self) -> impl Iterator<Item = (&Descriptor, u64)> {
        self.counts.values().map(|(d, c)| (d, *c))
    }

    /// Saturated groups in order.
    pub fn saturated(&self) -> impl Iterator<Item = &(String, Direction)> {
        self.saturated.iter()
    }

    #[must_use]
    pub fn is_saturated(&self, label: &str, direction: Direction) -> bool {
        self.saturated.contains(&(label.to_string(), direction))
    }

    /// Whether the group holds counters or is saturated.
    #[must_use]
    pub fn tracks(&self, label: &str, direction: Direction) -> bool {
        let group = (label.to_string(), direction);
        self.saturated.contains(&group) || self.sizes.get(&group).is_some_and(|n| *n > 0)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty() && self.saturated.is_empty()
    }

    // =========================================================================
    // LOADING
    // =========================================================================

    /// Re-insert a persisted counter.
    pub fn restore(&mut self, descriptor: Descriptor, count: u64) {
        if count == 0 || descriptor.tags().iter().any(|(_, v)| v.is_any()) {
            return;
        }
        let group = descriptor.group();
        if self.saturated.contains(&group) {
            return;
        }
        let sorted = descriptor.sorted();
        let canonical = sorted.encode();
        if !self.counts.contains_key(&canonical) {
            *self.sizes.entry(group).or_insert(0) += 1;
        }
        self.counts.insert(canonical, (sorted, count));
    }

    /// Re-insert a persisted saturation marker.
    pub fn restore_saturated(&mut self, label: &str, direction: Direction) {
        let group = (label.to_string(), direction);
        self.counts
            .retain(|_, (d, _)| d.label() != group.0 || d.direction() != group.1);
        self.sizes.remove(&group);
        self.saturated.insert(group);
    }
}

fn aggregate_descriptor<'a>(
    label: &str,
    direction: Direction,
    tags: impl Iterator<Item = &'a (String, String)>,
) -> Descriptor {
    let mut sorted: Vec<&(String, String)> = tags.collect();
    sorted.sort();
    sorted
        .into_iter()
        .fold(Descriptor::new(label, direction), |d, (k, v)| {
            d.with(k.clone(), TagValue::Literal(v.clone()))
        })
}

/// Every subset of `tags`, each as a key-sorted descriptor.
fn subsets(label: &str, direction: Direction, tags: &[(String, String)]) -> Vec<Descriptor> {
    let mut sorted: Vec<&(String, String)> = tags.iter().collect();
    sorted.sort();
    (0u32..(1u32 << sorted.len()))
        .map(|mask| {
            let chosen = sorted
                .iter()
                .enumerate()
                .filter(|(i, _)| mask & (1 << i) != 0)
                .map(|(_, t)| *t);
            aggregate_descriptor(label, direction, chosen)
        })
        .collect()
}

// =============================================================================
// TESTS
// =============================================================================
