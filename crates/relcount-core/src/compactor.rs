//! # Compactor
//!
//! Bounds the number of entries a vertex cache holds by merging sibling
//! entries into wildcard generalizations.
//!
//! ## Trigger
//!
//! A group (one label/direction, or the whole vertex under
//! `CompactionScope::Vertex`) is over threshold when it holds `>= N`
//! entries. Compaction repeats until every group is below `N` or no legal
//! merge is left.
//!
//! ## Merge Rules
//!
//! - A merge replaces every entry a generalization covers with one entry
//!   holding their sum.
//! - A generalization that partially overlaps a surviving entry is never
//!   used, so stored entries stay pairwise disjoint.
//! - Every merge removes at least one entry, so compaction terminates.

use crate::config::CompactionScope;
use crate::descriptor::{Descriptor, TagValue};
use crate::store::{CountEntry, CountStore};
use crate::Direction;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

// =============================================================================
// STRATEGY
// =============================================================================

/// Produces a candidate generalization for an over-threshold group.
pub trait GeneralizationStrategy {
    /// Propose a generalization covering at least two entries of `group`
    /// (insertion order), or `None`. Candidates rejected by `legal` must
    /// not be returned.
    fn propose(
        &self,
        group: &[&CountEntry],
        legal: &dyn Fn(&Descriptor) -> bool,
    ) -> Option<Descriptor>;
}

/// Generalize the keys whose values change most often first.
///
/// Per label/direction and key:
///
/// ```text
/// frequency = (distinct values + undefined marker + wildcarded weight)
///             / (total weight + 1)
/// ```
///
/// Keys are visited by descending frequency. For each key the strategy tries
/// the key alone, then the key joined to every key set tried before in the
/// same label/direction, and returns the candidate covering the most entries
/// for the first key set that yields one.
#[derive(Debug, Clone, Copy, Default)]
pub struct FrequentlyChanging;

#[derive(Debug)]
struct KeyFrequency {
    group: (String, Direction),
    group_rank: usize,
    key: String,
    key_rank: usize,
    numerator: u64,
    denominator: u64,
}

impl KeyFrequency {
    /// Descending frequency, then first-seen group, then first-seen key.
    fn order(&self, other: &Self) -> Ordering {
        let lhs = u128::from(other.numerator) * u128::from(self.denominator);
        let rhs = u128::from(self.numerator) * u128::from(other.denominator);
        lhs.cmp(&rhs)
            .then(self.group_rank.cmp(&other.group_rank))
            .then(self.key_rank.cmp(&other.key_rank))
            .then_with(|| self.key.cmp(&other.key))
    }
}

#[derive(Default)]
struct KeyStats {
    rank: usize,
    values: BTreeSet<String>,
    present: usize,
    wildcards: u64,
}

#[derive(Default)]
struct GroupStats {
    rank: usize,
    entries: usize,
    weight: u64,
    keys: BTreeMap<String, KeyStats>,
}

fn change_frequencies(group: &[&CountEntry]) -> Vec<KeyFrequency> {
    let mut stats: BTreeMap<(String, Direction), GroupStats> = BTreeMap::new();
    for entry in group {
        let next_rank = stats.len();
        let g = stats
            .entry(entry.descriptor.group())
            .or_insert_with(|| GroupStats {
                rank: next_rank,
                ..GroupStats::default()
            });
        g.entries += 1;
        g.weight = g.weight.saturating_add(entry.count);
        for (key, value) in entry.descriptor.tags() {
            let next_key_rank = g.keys.len();
            let k = g.keys.entry(key.clone()).or_insert_with(|| KeyStats {
                rank: next_key_rank,
                ..KeyStats::default()
            });
            k.present += 1;
            match value {
                TagValue::Literal(v) => {
                    k.values.insert(v.clone());
                }
                TagValue::Any => k.wildcards = k.wildcards.saturating_add(entry.count),
            }
        }
    }

    let mut frequencies = Vec::new();
    for (group_key, g) in stats {
        for (key, k) in g.keys {
            let undefined = u64::from(k.present < g.entries);
            frequencies.push(KeyFrequency {
                group: group_key.clone(),
                group_rank: g.rank,
                key,
                key_rank: k.rank,
                numerator: (k.values.len() as u64)
                    .saturating_add(undefined)
                    .saturating_add(k.wildcards),
                denominator: g.weight.saturating_add(1),
            });
        }
    }
    frequencies.sort_by(KeyFrequency::order);
    frequencies
}

impl GeneralizationStrategy for FrequentlyChanging {
    fn propose(
        &self,
        group: &[&CountEntry],
        legal: &dyn Fn(&Descriptor) -> bool,
    ) -> Option<Descriptor> {
        let mut used: BTreeMap<(String, Direction), Vec<Vec<String>>> = BTreeMap::new();

        for frequency in change_frequencies(group) {
            let tried = used.entry(frequency.group.clone()).or_default();
            let mut key_sets = vec![vec![frequency.key.clone()]];
            for set in tried.iter() {
                if !set.contains(&frequency.key) {
                    let mut joined = set.clone();
                    joined.push(frequency.key.clone());
                    key_sets.push(joined);
                }
            }
            tried.extend(key_sets.iter().cloned());

            for key_set in &key_sets {
                if let Some(best) = best_candidate(group, &frequency.group, key_set, legal) {
                    return Some(best);
                }
            }
        }
        None
    }
}

/// The legal generalization covering the most (> 1) entries when `key_set`
/// is wildcarded on one of the group's entries. First one wins ties.
fn best_candidate(
    group: &[&CountEntry],
    label_direction: &(String, Direction),
    key_set: &[String],
    legal: &dyn Fn(&Descriptor) -> bool,
) -> Option<Descriptor> {
    let mut best: Option<(usize, Descriptor)> = None;
    let mut seen = BTreeSet::new();
    for candidate in group
        .iter()
        .filter(|e| e.descriptor.label() == label_direction.0)
        .filter(|e| e.descriptor.direction() == label_direction.1)
    {
        let generalized = candidate
            .descriptor
            .generalize_tags(key_set.iter().map(String::as_str));
        if !seen.insert(generalized.sorted()) {
            continue;
        }
        let covered = group
            .iter()
            .filter(|e| e.descriptor.is_more_specific_than(&generalized))
            .count();
        let to_beat = best.as_ref().map_or(1, |(n, _)| *n);
        if covered > to_beat && legal(&generalized) {
            best = Some((covered, generalized));
        }
    }
    best.map(|(_, d)| d)
}

// =============================================================================
// COMPACTOR
// =============================================================================

/// Outcome of one compaction pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompactionReport {
    /// Number of merges performed.
    pub merges: usize,
    /// True if every group ended below the threshold.
    pub settled: bool,
}

/// Threshold-based compaction engine.
pub struct Compactor {
    threshold: usize,
    scope: CompactionScope,
    strategy: Box<dyn GeneralizationStrategy + Send + Sync>,
}

impl fmt::Debug for Compactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Compactor")
            .field("threshold", &self.threshold)
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}

impl Compactor {
    /// Create a compactor with the default strategy.
    ///
    /// `threshold` is expected to be validated by `RelcountConfig`.
    #[must_use]
    pub fn new(threshold: usize, scope: CompactionScope) -> Self {
        Self::with_strategy(threshold, scope, FrequentlyChanging)
    }

    /// Create a compactor with a custom generalization strategy.
    #[must_use]
    pub fn with_strategy(
        threshold: usize,
        scope: CompactionScope,
        strategy: impl GeneralizationStrategy + Send + Sync + 'static,
    ) -> Self {
        Self {
            threshold,
            scope,
            strategy: Box::new(strategy),
        }
    }

    #[must_use]
    pub fn threshold(&self) -> usize {
        self.threshold
    }

    #[must_use]
    pub fn scope(&self) -> CompactionScope {
        self.scope
    }

    /// Compact `store` until settled or stuck.
    pub fn compact(&self, store: &mut CountStore) -> CompactionReport {
        let mut report = CompactionReport::default();
        loop {
            let groups = self.over_threshold(store);
            if groups.is_empty() {
                report.settled = true;
                return report;
            }

            let mut merged = false;
            for group in &groups {
                let members: Vec<&CountEntry> = group.iter().collect();
                let legal = |g: &Descriptor| is_legal(store, g);
                let Some(generalization) = self.strategy.propose(&members, &legal) else {
                    continue;
                };
                let covered: Vec<Descriptor> = store
                    .entries()
                    .filter(|e| generalization.is_more_general_than(&e.descriptor))
                    .map(|e| e.descriptor.clone())
                    .collect();
                if covered.len() < 2 || !is_legal(store, &generalization) {
                    continue;
                }
                let Some(total) = store.merge(&generalization, &covered) else {
                    continue;
                };
                tracing::debug!(
                    generalization = %generalization,
                    merged = covered.len(),
                    total,
                    "compacted cache entries"
                );
                report.merges += 1;
                merged = true;
                break;
            }

            if !merged {
                tracing::warn!(
                    threshold = self.threshold,
                    entries = store.len(),
                    "compaction threshold cannot be reached; cache stays above it"
                );
                return report;
            }
        }
    }

    /// Entries of every group at or above the threshold, in insertion order.
    ///
    /// A group needs two entries to merge anything, so a single entry is
    /// never over the threshold.
    fn over_threshold(&self, store: &CountStore) -> Vec<Vec<CountEntry>> {
        let bound = self.threshold.max(2);
        match self.scope {
            CompactionScope::Vertex => {
                if store.len() >= bound {
                    vec![store.entries().cloned().collect()]
                } else {
                    Vec::new()
                }
            }
            CompactionScope::LabelDirection => store
                .groups()
                .into_iter()
                .filter(|(_, n)| *n >= bound)
                .map(|(group, _)| {
                    store
                        .entries()
                        .filter(|e| e.descriptor.group() == group)
                        .cloned()
                        .collect()
                })
                .collect(),
        }
    }
}

/// Every stored entry is either covered by `generalization` or disjoint
/// from it.
fn is_legal(store: &CountStore, generalization: &Descriptor) -> bool {
    generalization.direction().is_concrete()
        && store.entries().all(|e| {
            generalization.is_more_general_than(&e.descriptor)
                || generalization.is_mutually_exclusive(&e.descriptor)
        })
}

// =============================================================================
// TESTS
// =============================================================================
