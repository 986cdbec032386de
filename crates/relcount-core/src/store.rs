//! # Count Store
//!
//! Per-vertex mapping from descriptor to a positive count.
//!
//! Entries live in an arena keyed by an insertion sequence number, with a
//! secondary index from canonical string to sequence. Enumeration follows
//! insertion order; lookups by canonical string are `O(log n)`.
//!
//! ## Invariants
//!
//! - Every stored count is `> 0`; an entry reaching zero is removed.
//! - At most one entry per canonical string.
//! - Mutations of a descriptor that a stored generalization covers are
//!   folded into that generalization.

use crate::descriptor::Descriptor;
use crate::Direction;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A stored `(descriptor, count)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountEntry {
    pub descriptor: Descriptor,
    pub count: u64,
}

/// Per-vertex count store.
#[derive(Debug, Clone, Default)]
pub struct CountStore {
    entries: BTreeMap<u64, CountEntry>,
    index: BTreeMap<String, u64>,
    next_seq: u64,
}

impl CountStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // =========================================================================
    // POINT MUTATIONS
    // =========================================================================

    /// Add `delta` to the entry for `descriptor`.
    ///
    /// Positive deltas land on the exact entry, else on a stored entry that
    /// covers `descriptor`, else on a new entry. Negative deltas behave as
    /// [`CountStore::decrement`]. Returns `true` iff a new entry was created.
    pub fn increment(&mut self, descriptor: &Descriptor, delta: i64) -> bool {
        match delta {
            0 => false,
            d if d > 0 => self.add(descriptor, d.unsigned_abs()),
            d => {
                self.decrement(descriptor, d.unsigned_abs());
                false
            }
        }
    }

    fn add(&mut self, descriptor: &Descriptor, delta: u64) -> bool {
        let existing = self
            .resolve(descriptor)
            .and_then(|seq| self.entries.get_mut(&seq));
        if let Some(entry) = existing {
            match entry.count.checked_add(delta) {
                Some(count) => entry.count = count,
                None => tracing::warn!(
                    descriptor = %entry.descriptor,
                    count = entry.count,
                    delta,
                    "count overflow; increment dropped"
                ),
            }
            return false;
        }
        self.insert_new(descriptor.clone(), delta);
        true
    }

    /// Subtract `delta` from the exact or covering entry.
    ///
    /// A missing entry, a zero delta or a delta larger than the stored count
    /// leaves the store untouched and returns `false`. An entry reaching zero
    /// is removed.
    pub fn decrement(&mut self, descriptor: &Descriptor, delta: u64) -> bool {
        if delta == 0 {
            return false;
        }
        let Some(seq) = self.resolve(descriptor) else {
            return false;
        };
        let Some(entry) = self.entries.get_mut(&seq) else {
            return false;
        };
        if entry.count < delta {
            return false;
        }
        entry.count -= delta;
        if entry.count == 0 {
            self.remove_seq(seq);
        }
        true
    }

    /// Exact lookup by canonical string; 0 if absent.
    #[must_use]
    pub fn get(&self, descriptor: &Descriptor) -> u64 {
        self.get_encoded(&descriptor.encode())
    }

    /// Exact lookup by an already encoded canonical string.
    #[must_use]
    pub fn get_encoded(&self, canonical: &str) -> u64 {
        self.index
            .get(canonical)
            .and_then(|seq| self.entries.get(seq))
            .map(|e| e.count)
            .unwrap_or(0)
    }

    /// Remove the entry for `descriptor` and every stored strict
    /// generalization of it. Returns the total count removed.
    pub fn delete(&mut self, descriptor: &Descriptor) -> u64 {
        let canonical = descriptor.encode();
        let doomed: Vec<u64> = self
            .entries
            .iter()
            .filter(|(_, e)| {
                e.descriptor.encode() == canonical
                    || e.descriptor.is_strictly_more_general_than(descriptor)
            })
            .map(|(seq, _)| *seq)
            .collect();
        doomed
            .into_iter()
            .filter_map(|seq| self.remove_seq(seq))
            .map(|e| e.count)
            .fold(0, u64::saturating_add)
    }

    // =========================================================================
    // BULK OPERATIONS
    // =========================================================================

    /// Replace `members` by one entry for `generalization` holding their sum.
    ///
    /// Members that are not stored contribute nothing. Returns the merged
    /// count, or `None` with the store untouched if the sum does not fit
    /// in a `u64`.
    pub fn merge(&mut self, generalization: &Descriptor, members: &[Descriptor]) -> Option<u64> {
        let seqs: Vec<u64> = members
            .iter()
            .filter_map(|m| self.index.get(&m.encode()).copied())
            .collect();
        let Some(total) = seqs
            .iter()
            .filter_map(|seq| self.entries.get(seq))
            .try_fold(0u64, |acc, e| acc.checked_add(e.count))
        else {
            tracing::warn!(generalization = %generalization, "merged count would overflow; merge skipped");
            return None;
        };
        for seq in seqs {
            self.remove_seq(seq);
        }
        if total > 0 {
            self.restore(generalization.clone(), total);
        }
        Some(total)
    }

    /// Insert or add to the exact entry, without folding into
    /// generalizations. Used when loading a persisted cache.
    pub fn restore(&mut self, descriptor: Descriptor, count: u64) {
        if count == 0 {
            return;
        }
        let canonical = descriptor.encode();
        match self.index.get(&canonical).and_then(|seq| self.entries.get_mut(seq)) {
            Some(entry) => match entry.count.checked_add(count) {
                Some(sum) => entry.count = sum,
                None => tracing::warn!(
                    descriptor = %entry.descriptor,
                    count = entry.count,
                    added = count,
                    "count overflow; restored count dropped"
                ),
            },
            None => self.insert_new(descriptor, count),
        }
    }

    /// Remove every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.index.clear();
    }

    // =========================================================================
    // INSPECTION
    // =========================================================================

    /// Entries in insertion order.
    ///
    /// Each call reflects the current state of the store.
    pub fn enumerate(&self) -> impl Iterator<Item = (&Descriptor, u64)> {
        self.entries.values().map(|e| (&e.descriptor, e.count))
    }

    /// Stored entries in insertion order.
    pub fn entries(&self) -> impl Iterator<Item = &CountEntry> {
        self.entries.values()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sum of all stored counts.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.entries.values().map(|e| e.count).fold(0, u64::saturating_add)
    }

    /// Number of entries per label/direction.
    #[must_use]
    pub fn groups(&self) -> BTreeMap<(String, Direction), usize> {
        let mut groups = BTreeMap::new();
        for entry in self.entries.values() {
            *groups.entry(entry.descriptor.group()).or_insert(0) += 1;
        }
        groups
    }

    // =========================================================================
    // INTERNAL
    // =========================================================================

    /// Sequence of the exact entry, else of the first entry covering
    /// `descriptor`.
    fn resolve(&self, descriptor: &Descriptor) -> Option<u64> {
        if let Some(seq) = self.index.get(&descriptor.encode()) {
            return Some(*seq);
        }
        self.entries
            .iter()
            .find(|(_, e)| e.descriptor.is_more_general_than(descriptor))
            .map(|(seq, _)| *seq)
    }

    fn insert_new(&mut self, descriptor: Descriptor, count: u64) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.index.insert(descriptor.encode(), seq);
        self.entries.insert(seq, CountEntry { descriptor, count });
    }

    fn remove_seq(&mut self, seq: u64) -> Option<CountEntry> {
        let entry = self.entries.remove(&seq)?;
        self.index.remove(&entry.descriptor.encode());
        Some(entry)
    }
}

// =============================================================================
// TESTS
// =============================================================================
