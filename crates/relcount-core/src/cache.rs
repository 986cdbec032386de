//! # Count Cache
//!
//! The entry point for embedders. `CountCache` ties the pieces together:
//! it turns host edge changes into per-vertex events, loads the affected
//! vertex caches from host properties, applies the events, compacts, and
//! writes back only the properties that changed.
//!
//! The cache holds no per-vertex state between calls. The host's vertex
//! properties are the single source of truth.

use crate::compactor::{CompactionReport, GeneralizationStrategy};
use crate::config::RelcountConfig;
use crate::descriptor::{Descriptor, TagValue};
use crate::formats::{VertexSnapshot, decode_properties, encode_properties};
use crate::ingestor::{EdgeChange, Ingestor};
use crate::lattice::Query;
use crate::mutation::{CacheMaintainer, VertexCache, VertexEvent};
use crate::storage::{EdgeSource, PropertyChange, PropertyStore, PropertyValue};
use crate::{Direction, RelcountError, VertexId};
use std::collections::BTreeMap;

/// Per-vertex relationship count cache over a host graph.
#[derive(Debug)]
pub struct CountCache {
    config: RelcountConfig,
    maintainer: CacheMaintainer,
    ingestor: Ingestor,
}

impl CountCache {
    /// Create a cache with the default strategy and policies.
    pub fn new(config: RelcountConfig) -> Result<Self, RelcountError> {
        let maintainer = CacheMaintainer::new(&config)?;
        Ok(Self {
            config,
            maintainer,
            ingestor: Ingestor::new(),
        })
    }

    /// Create a cache with a custom generalization strategy.
    pub fn with_strategy(
        config: RelcountConfig,
        strategy: impl GeneralizationStrategy + Send + Sync + 'static,
    ) -> Result<Self, RelcountError> {
        let maintainer = CacheMaintainer::with_strategy(&config, strategy)?;
        Ok(Self {
            config,
            maintainer,
            ingestor: Ingestor::new(),
        })
    }

    /// Replace the inclusion/extraction/weighing policies.
    #[must_use]
    pub fn with_ingestor(mut self, ingestor: Ingestor) -> Self {
        self.ingestor = ingestor;
        self
    }

    #[must_use]
    pub fn config(&self) -> &RelcountConfig {
        &self.config
    }

    #[must_use]
    pub fn ingestor(&self) -> &Ingestor {
        &self.ingestor
    }

    // =========================================================================
    // QUERIES
    // =========================================================================

    /// Count the edges of `vertex` matching the constraints, in the
    /// aggregate reading: keys not mentioned are unconstrained.
    pub fn count<H, K>(
        &self,
        host: &H,
        vertex: VertexId,
        label: &str,
        direction: Direction,
        constraints: impl IntoIterator<Item = (K, TagValue)>,
    ) -> Result<u64, RelcountError>
    where
        H: PropertyStore + ?Sized,
        K: Into<String>,
    {
        let descriptor = build_descriptor(label, direction, constraints);
        self.query(host, vertex, &Query::aggregate(descriptor))
    }

    /// Count the edges of `vertex` carrying exactly the given tags and no
    /// others.
    pub fn count_literal<H, K>(
        &self,
        host: &H,
        vertex: VertexId,
        label: &str,
        direction: Direction,
        constraints: impl IntoIterator<Item = (K, TagValue)>,
    ) -> Result<u64, RelcountError>
    where
        H: PropertyStore + ?Sized,
        K: Into<String>,
    {
        let descriptor = build_descriptor(label, direction, constraints);
        self.query(host, vertex, &Query::literal(descriptor))
    }

    /// Run an arbitrary query against one vertex cache.
    pub fn query<H: PropertyStore + ?Sized>(
        &self,
        host: &H,
        vertex: VertexId,
        query: &Query,
    ) -> Result<u64, RelcountError> {
        let cache = self.load(host, vertex)?;
        cache.engine().count(query)
    }

    /// Every cached entry of `vertex`, in insertion order.
    pub fn cached_counts<H: PropertyStore + ?Sized>(
        &self,
        host: &H,
        vertex: VertexId,
    ) -> Result<Vec<(Descriptor, u64)>, RelcountError> {
        let cache = self.load(host, vertex)?;
        Ok(cache
            .store()
            .enumerate()
            .map(|(d, c)| (d.clone(), c))
            .collect())
    }

    // =========================================================================
    // MAINTENANCE
    // =========================================================================

    /// Feed one host edge change to the caches of its endpoints.
    pub fn handle<H: PropertyStore + ?Sized>(
        &self,
        host: &mut H,
        change: &EdgeChange,
    ) -> Result<CompactionReport, RelcountError> {
        let mut per_vertex: BTreeMap<VertexId, Vec<VertexEvent>> = BTreeMap::new();
        for (vertex, event) in self.ingestor.resolve(change) {
            per_vertex.entry(vertex).or_default().push(event);
        }

        let mut report = CompactionReport {
            merges: 0,
            settled: true,
        };
        for (vertex, events) in per_vertex {
            let r = self.apply(host, vertex, &events)?;
            report.merges += r.merges;
            report.settled &= r.settled;
        }
        Ok(report)
    }

    /// Apply a batch of events to one vertex cache.
    ///
    /// Nothing is written if any event is invalid.
    pub fn apply<H: PropertyStore + ?Sized>(
        &self,
        host: &mut H,
        vertex: VertexId,
        events: &[VertexEvent],
    ) -> Result<CompactionReport, RelcountError> {
        let mut cache = self.load(host, vertex)?;
        let report = self.maintainer.apply(&mut cache, events)?;
        self.save(host, vertex, &cache)?;
        Ok(report)
    }

    /// Discard and rebuild the cache of every vertex with edges.
    ///
    /// Returns the number of vertices rebuilt.
    pub fn rebuild<H: PropertyStore + EdgeSource + ?Sized>(
        &self,
        host: &mut H,
    ) -> Result<usize, RelcountError> {
        let vertices = host.vertices()?;
        for vertex in &vertices {
            self.rebuild_vertex(host, *vertex)?;
        }
        tracing::info!(vertices = vertices.len(), "relationship count caches rebuilt");
        Ok(vertices.len())
    }

    /// Discard and rebuild the cache of one vertex from its edges.
    pub fn rebuild_vertex<H: PropertyStore + EdgeSource + ?Sized>(
        &self,
        host: &mut H,
        vertex: VertexId,
    ) -> Result<CompactionReport, RelcountError> {
        let events: Vec<VertexEvent> = host
            .edges_of(vertex)?
            .iter()
            .flat_map(|edge| self.ingestor.created(edge))
            .filter(|(v, _)| *v == vertex)
            .map(|(_, event)| event)
            .collect();

        let mut cache = self.maintainer.new_cache();
        let report = self.maintainer.rebuild(&mut cache, &events)?;
        self.save(host, vertex, &cache)?;
        Ok(report)
    }

    /// Remove every cached property of `vertex`.
    pub fn evict<H: PropertyStore + ?Sized>(
        &self,
        host: &mut H,
        vertex: VertexId,
    ) -> Result<(), RelcountError> {
        let changes = host
            .properties(vertex, &self.config.property_prefix)?
            .into_iter()
            .map(|(key, _)| PropertyChange::remove(key))
            .collect();
        host.apply_properties(vertex, changes)
    }

    // =========================================================================
    // LOAD / SAVE
    // =========================================================================

    /// Load the cache of `vertex` from host properties.
    pub fn load<H: PropertyStore + ?Sized>(
        &self,
        host: &H,
        vertex: VertexId,
    ) -> Result<VertexCache, RelcountError> {
        let prefix = &self.config.property_prefix;
        let properties = host.properties(vertex, prefix)?;
        let snapshot = decode_properties(&properties, self.config.persistence, prefix)?;
        let mut cache = self.maintainer.new_cache();
        snapshot.restore_into(&mut cache);
        Ok(cache)
    }

    /// Write `cache` back, touching only properties whose value changed.
    fn save<H: PropertyStore + ?Sized>(
        &self,
        host: &mut H,
        vertex: VertexId,
        cache: &VertexCache,
    ) -> Result<(), RelcountError> {
        self.write_snapshot(host, vertex, &VertexSnapshot::capture(cache))
    }

    /// Persist `snapshot` as the cache of `vertex`, replacing what is there.
    pub fn write_snapshot<H: PropertyStore + ?Sized>(
        &self,
        host: &mut H,
        vertex: VertexId,
        snapshot: &VertexSnapshot,
    ) -> Result<(), RelcountError> {
        let prefix = &self.config.property_prefix;
        let mut desired = encode_properties(snapshot, self.config.persistence, prefix)?;
        let current = host.properties(vertex, prefix)?;
        let changes = diff(current, &mut desired);
        if changes.is_empty() {
            return Ok(());
        }
        tracing::trace!(vertex = %vertex, changes = changes.len(), "writing cached counts");
        host.apply_properties(vertex, changes)
    }
}

fn build_descriptor<K: Into<String>>(
    label: &str,
    direction: Direction,
    constraints: impl IntoIterator<Item = (K, TagValue)>,
) -> Descriptor {
    constraints
        .into_iter()
        .fold(Descriptor::new(label, direction), |d, (k, v)| d.with(k, v))
}

/// Property changes turning `current` into `desired`.
fn diff(
    current: Vec<(String, PropertyValue)>,
    desired: &mut BTreeMap<String, PropertyValue>,
) -> Vec<PropertyChange> {
    let mut changes = Vec::new();
    for (key, value) in current {
        match desired.remove(&key) {
            Some(wanted) if wanted == value => {}
            Some(wanted) => changes.push(PropertyChange::set(key, wanted)),
            None => changes.push(PropertyChange::remove(key)),
        }
    }
    changes.extend(
        std::mem::take(desired)
            .into_iter()
            .map(|(key, value)| PropertyChange::set(key, value)),
    );
    changes
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Materialization, PersistenceFormat};
    use crate::graph::Graph;
    use crate::policy::ExtractKeys;

    fn props(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn cache_with_threshold(threshold: usize) -> CountCache {
        let config = RelcountConfig::default()
            .with_compaction_threshold(threshold)
            .expect("threshold");
        CountCache::new(config).expect("cache")
    }

    fn any<K: Into<String>>(key: K) -> (String, TagValue) {
        (key.into(), TagValue::Any)
    }

    #[test]
    fn counts_follow_edge_changes() {
        let cache = cache_with_threshold(20);
        let mut graph = Graph::new();

        let a = VertexId(1);
        for target in 2..5 {
            let change = graph.add_edge("KNOWS", a, VertexId(target), props(&[("since", "2020")]));
            cache.handle(&mut graph, &change).expect("handle");
        }

        let none: [(String, TagValue); 0] = [];
        assert_eq!(
            cache
                .count(&graph, a, "KNOWS", Direction::Outgoing, none)
                .expect("count"),
            3
        );
        assert_eq!(
            cache
                .count(&graph, VertexId(2), "KNOWS", Direction::Incoming, [any("since")])
                .expect("count"),
            1
        );
        assert_eq!(
            cache
                .count(&graph, a, "KNOWS", Direction::Both, [("since", TagValue::from("2020"))])
                .expect("count"),
            3
        );

        let change = graph.remove_edge(crate::EdgeId(0)).expect("remove");
        cache.handle(&mut graph, &change).expect("handle");
        assert_eq!(
            cache
                .count_literal(&graph, a, "KNOWS", Direction::Outgoing, [("since", TagValue::from("2020"))])
                .expect("count"),
            2
        );
        assert!(graph.properties(VertexId(2), "_RC_").expect("props").is_empty());
    }

    #[test]
    fn compaction_makes_literal_counts_ambiguous() {
        let cache = cache_with_threshold(3);
        let mut graph = Graph::new();
        let a = VertexId(1);
        for (i, v) in ["x", "y", "z"].iter().enumerate() {
            let change = graph.add_edge("R", a, VertexId(10 + i as u64), props(&[("k", *v)]));
            cache.handle(&mut graph, &change).expect("handle");
        }

        let cached = cache.cached_counts(&graph, a).expect("inspect");
        assert_eq!(cached.len(), 1);
        assert_eq!(cached[0].1, 3);
        assert!(cached[0].0.is_general());

        let err = cache
            .count_literal(&graph, a, "R", Direction::Outgoing, [("k", TagValue::from("x"))])
            .expect_err("ambiguous");
        assert!(err.is_ambiguous());
        assert_eq!(
            cache
                .count(&graph, a, "R", Direction::Outgoing, [any("k")])
                .expect("count"),
            3
        );
    }

    #[test]
    fn cached_counts_keep_insertion_order() {
        let cache = cache_with_threshold(20);
        let mut graph = Graph::new();
        for (i, v) in ["z", "a", "m"].iter().enumerate() {
            let change = graph.add_edge("R", VertexId(1), VertexId(10 + i as u64), props(&[("k", *v)]));
            cache.handle(&mut graph, &change).expect("handle");
        }

        let order: Vec<String> = cache
            .cached_counts(&graph, VertexId(1))
            .expect("inspect")
            .iter()
            .map(|(d, _)| d.encode())
            .collect();
        assert_eq!(order, vec!["R#OUTGOING#k#z", "R#OUTGOING#k#a", "R#OUTGOING#k#m"]);
    }

    #[test]
    fn power_set_counts_a_cache_written_without_counters() {
        let literal = cache_with_threshold(20);
        let power = CountCache::new(
            RelcountConfig::default().with_materialization(Materialization::PowerSet),
        )
        .expect("cache");
        let mut graph = Graph::new();
        let change = graph.add_edge("R", VertexId(1), VertexId(2), props(&[("k", "z")]));
        literal.handle(&mut graph, &change).expect("handle");

        let k_z = || [("k", TagValue::from("z"))];
        assert_eq!(
            power
                .count(&graph, VertexId(1), "R", Direction::Outgoing, k_z())
                .expect("count"),
            1
        );

        let change = graph.add_edge("R", VertexId(1), VertexId(3), props(&[("k", "z")]));
        power.handle(&mut graph, &change).expect("handle");
        assert_eq!(
            power
                .count(&graph, VertexId(1), "R", Direction::Outgoing, k_z())
                .expect("count"),
            2
        );
        assert_eq!(
            power
                .count(&graph, VertexId(3), "R", Direction::Incoming, k_z())
                .expect("count"),
            1
        );
    }

    #[test]
    fn rebuild_matches_incremental_maintenance() {
        let cache = cache_with_threshold(4);
        let mut incremental = Graph::new();
        for i in 0..10u64 {
            let value = format!("v{}", i % 3);
            let change = incremental.add_edge(
                "R",
                VertexId(i % 2),
                VertexId(100 + i),
                props(&[("k", value.as_str()), ("j", "same")]),
            );
            cache.handle(&mut incremental, &change).expect("handle");
        }
        let before = cache.cached_counts(&incremental, VertexId(0)).expect("inspect");

        let mut rebuilt = incremental.clone();
        for vertex in rebuilt.vertices().expect("vertices") {
            cache.evict(&mut rebuilt, vertex).expect("evict");
        }
        assert_eq!(cache.rebuild(&mut rebuilt).expect("rebuild"), 12);

        let after = cache.cached_counts(&rebuilt, VertexId(0)).expect("inspect");
        let total = |entries: &[(Descriptor, u64)]| entries.iter().map(|(_, c)| c).sum::<u64>();
        assert_eq!(total(&after), 5);
        let canonical = |entries: &[(Descriptor, u64)]| {
            let mut v: Vec<(String, u64)> = entries.iter().map(|(d, c)| (d.encode(), *c)).collect();
            v.sort();
            v
        };
        assert_eq!(canonical(&before), canonical(&after));
    }

    #[test]
    fn rebuild_is_deterministic() {
        let cache = cache_with_threshold(3);
        let mut graph = Graph::new();
        for i in 0..8u64 {
            let a = format!("a{}", i % 4);
            let b = format!("b{}", i % 2);
            graph.add_edge("R", VertexId(1), VertexId(10 + i), props(&[("a", a.as_str()), ("b", b.as_str())]));
        }
        let mut first = graph.clone();
        let mut second = graph.clone();
        cache.rebuild(&mut first).expect("rebuild");
        cache.rebuild(&mut second).expect("rebuild");
        assert_eq!(
            first.properties(VertexId(1), "_RC_").expect("props"),
            second.properties(VertexId(1), "_RC_").expect("props")
        );
    }

    #[test]
    fn invalid_events_write_nothing() {
        let cache = cache_with_threshold(20);
        let mut graph = Graph::new();
        let result = cache.apply(
            &mut graph,
            VertexId(1),
            &[
                VertexEvent::created("R", Direction::Outgoing, [("k", "v")]),
                VertexEvent::created("", Direction::Outgoing, [("k", "v")]),
            ],
        );
        assert!(matches!(result, Err(RelcountError::InvalidEvent(_))));
        assert!(graph.properties(VertexId(1), "_RC_").expect("props").is_empty());
    }

    #[test]
    fn evict_removes_only_cache_properties() {
        let cache = cache_with_threshold(20);
        let mut graph = Graph::new();
        graph
            .apply_properties(
                VertexId(1),
                vec![PropertyChange::set("name", PropertyValue::Count(7))],
            )
            .expect("apply");
        let change = graph.add_edge("R", VertexId(1), VertexId(2), vec![]);
        cache.handle(&mut graph, &change).expect("handle");

        cache.evict(&mut graph, VertexId(1)).expect("evict");
        assert!(cache.cached_counts(&graph, VertexId(1)).expect("inspect").is_empty());
        assert_eq!(graph.properties(VertexId(1), "name").expect("props").len(), 1);
    }

    #[test]
    fn single_property_and_power_set_round_trip_through_host() {
        let config = RelcountConfig::default()
            .with_compaction_threshold(3)
            .expect("threshold")
            .with_materialization(Materialization::PowerSet)
            .with_persistence(PersistenceFormat::SingleProperty);
        let cache = CountCache::new(config).expect("cache");
        let mut graph = Graph::new();
        for (i, v) in ["x", "y", "z", "x"].iter().enumerate() {
            let change = graph.add_edge("R", VertexId(1), VertexId(10 + i as u64), props(&[("k", *v)]));
            cache.handle(&mut graph, &change).expect("handle");
        }

        assert_eq!(graph.properties(VertexId(1), "_RC_").expect("props").len(), 1);
        assert_eq!(
            cache
                .count(&graph, VertexId(1), "R", Direction::Outgoing, [("k", TagValue::from("x"))])
                .expect("count"),
            2
        );
    }

    #[test]
    fn extraction_policy_limits_tags() {
        let cache = cache_with_threshold(20)
            .with_ingestor(Ingestor::new().with_extraction(ExtractKeys(vec!["k".to_string()])));
        let mut graph = Graph::new();
        let change = graph.add_edge("R", VertexId(1), VertexId(2), props(&[("k", "v"), ("noise", "n")]));
        cache.handle(&mut graph, &change).expect("handle");

        let cached = cache.cached_counts(&graph, VertexId(1)).expect("inspect");
        assert_eq!(cached.len(), 1);
        assert_eq!(cached[0].0.keys().count(), 1);
    }

    #[test]
    fn diff_touches_only_changed_keys() {
        let current = vec![
            ("_RC_a".to_string(), PropertyValue::Count(1)),
            ("_RC_b".to_string(), PropertyValue::Count(2)),
            ("_RC_c".to_string(), PropertyValue::Count(3)),
        ];
        let mut desired = BTreeMap::new();
        desired.insert("_RC_a".to_string(), PropertyValue::Count(1));
        desired.insert("_RC_b".to_string(), PropertyValue::Count(5));
        desired.insert("_RC_d".to_string(), PropertyValue::Count(4));

        let changes = diff(current, &mut desired);
        assert_eq!(
            changes,
            vec![
                PropertyChange::set("_RC_b", PropertyValue::Count(5)),
                PropertyChange::remove("_RC_c"),
                PropertyChange::set("_RC_d", PropertyValue::Count(4)),
            ]
        );
    }
}
