//! # Validation Tier Tests (T0-T3)
//!
//! If ANY tier fails, the cache is INVALID.
//!
//! ## Tiers
//! - T0: Descriptor Integrity
//! - T1: Counting Scenarios (threshold 5)
//! - T2: In-Memory Host
//! - T3: redb Host

use relcount_core::{
    CacheMaintainer, CountCache, CountStore, Descriptor, Direction, EdgeChange, Graph,
    RelcountConfig, RelcountError, TagValue, VertexEvent, VertexId,
};

fn lit(tags: &[(&str, &str)]) -> Descriptor {
    Descriptor::literal("test", Direction::Outgoing, tags.iter().copied())
}

fn no_tags() -> [(&'static str, TagValue); 0] {
    []
}

fn props(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

// =============================================================================
// TIER T0: DESCRIPTOR INTEGRITY
// =============================================================================

mod t0_descriptor_integrity {
    use super::*;

    /// T0.1: Canonical strings survive decoding.
    #[test]
    fn canonical_round_trip() {
        let d = Descriptor::new("KNOWS", Direction::Incoming)
            .with("since", "2020")
            .with_any("city");
        let decoded = Descriptor::decode(&d.encode()).expect("decode");
        assert_eq!(decoded, d);
    }

    /// T0.2: Corrupt canonical strings are rejected.
    #[test]
    fn corrupt_canonical_rejected() {
        for bad in ["", "#OUTGOING", "label#SIDEWAYS", "label#OUTGOING#dangling"] {
            assert!(
                matches!(Descriptor::decode(bad), Err(RelcountError::InvalidDescriptor(_))),
                "{:?} accepted",
                bad
            );
        }
    }

    /// T0.3: A wildcard covers every value of its key.
    #[test]
    fn wildcard_covers_values() {
        let general = lit(&[]).with_any("k1");
        assert!(general.is_more_general_than(&lit(&[("k1", "v1")])));
        assert!(!lit(&[("k1", "v1")]).is_more_general_than(&general));
        assert!(lit(&[("k1", "v1")]).is_mutually_exclusive(&lit(&[("k1", "v2")])));
    }
}

// =============================================================================
// TIER T1: COUNTING SCENARIOS
// =============================================================================

mod t1_counting_scenarios {
    use super::*;

    fn maintainer() -> CacheMaintainer {
        let config = RelcountConfig::default()
            .with_compaction_threshold(5)
            .expect("threshold");
        CacheMaintainer::new(&config).expect("maintainer")
    }

    fn created(value: &str, weight: u64) -> VertexEvent {
        VertexEvent::created("test", Direction::Outgoing, [("k1", value)]).with_weight(weight)
    }

    fn scenario_a_events() -> Vec<VertexEvent> {
        vec![
            created("v1", 14),
            created("v2", 1),
            created("v3", 2),
            created("v4", 3),
        ]
    }

    /// T1.A: Four literals stay exact below the threshold.
    #[test]
    fn scenario_a_below_threshold() {
        let m = maintainer();
        let mut cache = m.new_cache();
        let report = m.apply(&mut cache, &scenario_a_events()).expect("apply");
        assert_eq!(report.merges, 0);

        let engine = cache.engine();
        assert_eq!(engine.count_aggregate(&lit(&[])).expect("aggregate"), 20);
        for (value, count) in [("v1", 14), ("v2", 1), ("v3", 2), ("v4", 3)] {
            assert_eq!(
                engine.count_literal(&lit(&[("k1", value)])).expect("literal"),
                count
            );
        }
    }

    /// T1.B: A fifth literal triggers compaction into one wildcard entry.
    #[test]
    fn scenario_b_fifth_literal_compacts() {
        let m = maintainer();
        let mut cache = m.new_cache();
        let mut events = scenario_a_events();
        events.push(created("v5", 4));
        let report = m.apply(&mut cache, &events).expect("apply");
        assert_eq!(report.merges, 1);

        assert_eq!(cache.store().len(), 1);
        assert_eq!(cache.store().get(&lit(&[]).with_any("k1")), 24);

        let engine = cache.engine();
        let err = engine
            .count_literal(&lit(&[("k1", "v1")]))
            .expect_err("ambiguous");
        assert!(err.is_ambiguous());
        assert!(err.to_string().starts_with("Unable to count relationships matching"));
        assert_eq!(engine.count_aggregate(&lit(&[])).expect("aggregate"), 24);
    }

    /// T1.C: Two keys, the most frequently changing one goes first.
    #[test]
    fn scenario_c_two_keys() {
        let m = maintainer();
        let mut cache = m.new_cache();
        let mut events = Vec::new();
        for k1 in ["v1", "v2"] {
            for k2 in ["w1", "w2", "w3", "w4"] {
                events.push(VertexEvent::created(
                    "test",
                    Direction::Outgoing,
                    [("k1", k1), ("k2", k2)],
                ));
            }
        }
        m.apply(&mut cache, &events).expect("apply");

        assert_eq!(cache.store().len(), 2);
        assert_eq!(cache.store().get(&lit(&[("k1", "v1")]).with_any("k2")), 4);
        assert_eq!(cache.store().get(&lit(&[("k1", "v2")]).with_any("k2")), 4);

        let engine = cache.engine();
        assert_eq!(engine.count_aggregate(&lit(&[])).expect("aggregate"), 8);
        assert_eq!(
            engine
                .count_aggregate(&lit(&[("k1", "v1")]))
                .expect("aggregate"),
            4
        );
        assert!(engine.count_aggregate(&lit(&[("k2", "w1")])).is_err());
    }

    /// T1.D: Decrements never go below zero.
    #[test]
    fn scenario_d_decrements() {
        let mut store = CountStore::new();
        assert!(!store.decrement(&lit(&[("k1", "v1")]), 1));
        assert!(store.is_empty());

        store.increment(&lit(&[("k1", "v1")]), 2);
        assert!(!store.decrement(&lit(&[("k1", "v1")]), 3));
        assert_eq!(store.get(&lit(&[("k1", "v1")])), 2);

        assert!(store.decrement(&lit(&[("k1", "v1")]), 2));
        assert_eq!(store.get(&lit(&[("k1", "v1")])), 0);
        assert_eq!(store.enumerate().count(), 0);
    }

    /// T1.E: Edits of merged combinations fold into the wildcard.
    #[test]
    fn merged_combinations_fold_into_wildcard() {
        let m = maintainer();
        let mut cache = m.new_cache();
        let mut events = scenario_a_events();
        events.push(created("v5", 4));
        m.apply(&mut cache, &events).expect("apply");
        m.apply(
            &mut cache,
            &[
                created("v6", 1),
                VertexEvent::deleted("test", Direction::Outgoing, [("k1", "v1")]),
            ],
        )
        .expect("apply");

        assert_eq!(cache.store().len(), 1);
        assert_eq!(cache.store().get(&lit(&[]).with_any("k1")), 24);
    }
}

// =============================================================================
// TIER T2: IN-MEMORY HOST
// =============================================================================

mod t2_in_memory_host {
    use super::*;

    fn cache() -> CountCache {
        let config = RelcountConfig::default()
            .with_compaction_threshold(5)
            .expect("threshold");
        CountCache::new(config).expect("cache")
    }

    /// T2.1: Both endpoints see the edge, in opposite directions.
    #[test]
    fn both_endpoints_are_counted() {
        let cache = cache();
        let mut graph = Graph::new();
        let change = graph.add_edge("KNOWS", VertexId(1), VertexId(2), props(&[("k", "v")]));
        cache.handle(&mut graph, &change).expect("handle");

        assert_eq!(
            cache
                .count(&graph, VertexId(1), "KNOWS", Direction::Outgoing, no_tags())
                .expect("count"),
            1
        );
        assert_eq!(
            cache
                .count(&graph, VertexId(2), "KNOWS", Direction::Incoming, no_tags())
                .expect("count"),
            1
        );
        assert_eq!(
            cache
                .count(&graph, VertexId(2), "KNOWS", Direction::Outgoing, no_tags())
                .expect("count"),
            0
        );
    }

    /// T2.2: A self-loop counts once in each direction.
    #[test]
    fn self_loop_counts_both_directions() {
        let cache = cache();
        let mut graph = Graph::new();
        let change = graph.add_edge("SELF", VertexId(7), VertexId(7), vec![]);
        cache.handle(&mut graph, &change).expect("handle");

        assert_eq!(
            cache
                .count(&graph, VertexId(7), "SELF", Direction::Both, no_tags())
                .expect("count"),
            2
        );
        assert_eq!(
            cache
                .count(&graph, VertexId(7), "SELF", Direction::Incoming, no_tags())
                .expect("count"),
            1
        );
    }

    /// T2.3: Property updates move the count between combinations.
    #[test]
    fn property_update_moves_count() {
        let cache = cache();
        let mut graph = Graph::new();
        let change = graph.add_edge("R", VertexId(1), VertexId(2), props(&[("k", "old")]));
        cache.handle(&mut graph, &change).expect("handle");
        let change = graph
            .update_edge(relcount_core::EdgeId(0), props(&[("k", "new")]))
            .expect("update");
        cache.handle(&mut graph, &change).expect("handle");

        let count = |value: &str| {
            cache
                .count_literal(
                    &graph,
                    VertexId(1),
                    "R",
                    Direction::Outgoing,
                    [("k", TagValue::from(value))],
                )
                .expect("count")
        };
        assert_eq!(count("old"), 0);
        assert_eq!(count("new"), 1);
    }

    /// T2.4: Removing a vertex leaves its neighbours consistent.
    #[test]
    fn vertex_removal_updates_neighbours() {
        let cache = cache();
        let mut graph = Graph::new();
        for target in 2..5 {
            let change = graph.add_edge("R", VertexId(1), VertexId(target), vec![]);
            cache.handle(&mut graph, &change).expect("handle");
        }
        let change = graph.add_edge("R", VertexId(2), VertexId(3), vec![]);
        cache.handle(&mut graph, &change).expect("handle");

        for change in graph.remove_vertex(VertexId(1)) {
            cache.handle(&mut graph, &change).expect("handle");
        }
        cache.evict(&mut graph, VertexId(1)).expect("evict");

        assert_eq!(
            cache
                .count(&graph, VertexId(3), "R", Direction::Both, no_tags())
                .expect("count"),
            1
        );
        assert!(cache.cached_counts(&graph, VertexId(1)).expect("inspect").is_empty());
    }

    /// T2.5: A rebuild agrees with incremental maintenance fed the same
    /// edges in another order, entry for entry and answer for answer.
    #[test]
    fn rebuild_agrees_with_incremental() {
        let cache = cache();
        let value = |i: u64| format!("v{}", i % 6);

        let mut incremental = Graph::new();
        for i in (0..12u64).rev() {
            let v = value(i);
            let change = incremental.add_edge(
                "R",
                VertexId(1),
                VertexId(100 + i),
                props(&[("k", v.as_str())]),
            );
            cache.handle(&mut incremental, &change).expect("handle");
        }
        let mut rebuilt = Graph::new();
        for i in 0..12u64 {
            let v = value(i);
            rebuilt.add_edge("R", VertexId(1), VertexId(100 + i), props(&[("k", v.as_str())]));
        }
        cache.rebuild(&mut rebuilt).expect("rebuild");

        let entries = |graph: &Graph| {
            let mut entries: Vec<(String, u64)> = cache
                .cached_counts(graph, VertexId(1))
                .expect("inspect")
                .into_iter()
                .map(|(d, c)| (d.encode(), c))
                .collect();
            entries.sort();
            entries
        };
        assert_eq!(entries(&incremental), entries(&rebuilt));
        assert_eq!(entries(&rebuilt), vec![("R#OUTGOING#k#*".to_string(), 12)]);

        for i in 0..6u64 {
            let query = [("k", TagValue::from(value(i)))];
            let a = cache.count(&incremental, VertexId(1), "R", Direction::Outgoing, query.clone());
            let b = cache.count(&rebuilt, VertexId(1), "R", Direction::Outgoing, query);
            assert!(a.expect_err("folded").is_ambiguous());
            assert!(b.expect_err("folded").is_ambiguous());
        }
        for graph in [&incremental, &rebuilt] {
            assert_eq!(
                cache
                    .count(graph, VertexId(1), "R", Direction::Outgoing, no_tags())
                    .expect("count"),
                12
            );
            assert_eq!(
                cache
                    .count(graph, VertexId(104), "R", Direction::Incoming, no_tags())
                    .expect("count"),
                1
            );
        }
    }
}

// =============================================================================
// TIER T3: REDB HOST
// =============================================================================

mod t3_redb_host {
    use super::*;
    use relcount_core::{EdgeId, PersistenceFormat, RedbGraph};
    use tempfile::tempdir;

    /// T3.1: Cached counts persist across reopen.
    #[test]
    fn counts_survive_reopen() {
        let temp = tempdir().expect("temp dir");
        let db_path = temp.path().join("test.redb");
        let cache = CountCache::new(RelcountConfig::default()).expect("cache");

        {
            let mut graph = RedbGraph::open(&db_path).expect("open db");
            for target in 2..6 {
                let change = graph
                    .add_edge("KNOWS", VertexId(1), VertexId(target), props(&[("k", "v")]))
                    .expect("add edge");
                cache.handle(&mut graph, &change).expect("handle");
            }
        }

        let graph = RedbGraph::open(&db_path).expect("reopen db");
        assert_eq!(
            cache
                .count(
                    &graph,
                    VertexId(1),
                    "KNOWS",
                    Direction::Outgoing,
                    [("k", TagValue::from("v"))]
                )
                .expect("count"),
            4
        );
    }

    /// T3.2: Deleting edges empties the cache properties again.
    #[test]
    fn deletions_clear_properties() {
        let temp = tempdir().expect("temp dir");
        let config = RelcountConfig::default().with_persistence(PersistenceFormat::SingleProperty);
        let cache = CountCache::new(config).expect("cache");
        let mut graph = RedbGraph::open(temp.path().join("test.redb")).expect("open db");

        let change = graph
            .add_edge("R", VertexId(1), VertexId(2), vec![])
            .expect("add edge");
        cache.handle(&mut graph, &change).expect("handle");
        assert_eq!(
            graph
                .vertices_with_properties("_RC_")
                .expect("vertices")
                .len(),
            2
        );

        let change = graph.remove_edge(EdgeId(0)).expect("remove");
        assert!(matches!(change, EdgeChange::Deleted(_)));
        cache.handle(&mut graph, &change).expect("handle");
        assert!(
            graph
                .vertices_with_properties("_RC_")
                .expect("vertices")
                .is_empty()
        );
    }

    /// T3.3: Rebuild over redb matches the in-memory host.
    #[test]
    fn rebuild_matches_in_memory() {
        let temp = tempdir().expect("temp dir");
        let config = RelcountConfig::default()
            .with_compaction_threshold(3)
            .expect("threshold");
        let cache = CountCache::new(config).expect("cache");
        let mut disk = RedbGraph::open(temp.path().join("test.redb")).expect("open db");
        let mut memory = Graph::new();

        for i in 0..9u64 {
            let value = format!("v{}", i % 4);
            disk.add_edge("R", VertexId(1), VertexId(10 + i), props(&[("k", value.as_str())]))
                .expect("add edge");
            memory.add_edge("R", VertexId(1), VertexId(10 + i), props(&[("k", value.as_str())]));
        }
        cache.rebuild(&mut disk).expect("rebuild");
        cache.rebuild(&mut memory).expect("rebuild");

        assert_eq!(
            relcount_core::canonical_checksum(&cache, &disk).expect("checksum"),
            relcount_core::canonical_checksum(&cache, &memory).expect("checksum")
        );
    }
}
