//! # CLI Command Tests
//!
//! Drive the command functions against a temporary redb database.

#![allow(clippy::unwrap_used, clippy::panic)]

use relcount::cli::{
    ApplySummary, Context, CountRequest, cmd_evict, cmd_export, cmd_init, run_apply, run_count,
    run_import, run_inspect, run_status, run_verify,
};
use relcount_core::{CountCache, RelcountConfig, RelcountError, canonical_checksum};
use std::path::PathBuf;
use tempfile::TempDir;

fn context(dir: &TempDir, threshold: usize) -> Context {
    let config = RelcountConfig::default()
        .with_compaction_threshold(threshold)
        .expect("threshold");
    Context {
        db_path: dir.path().join("graph.redb"),
        cache: CountCache::new(config).expect("cache"),
        json_mode: false,
    }
}

fn write_changes(dir: &TempDir, name: &str, json: &str) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, json).expect("write change file");
    path
}

const THREE_FRIENDS: &str = r#"[
    {"op": "create", "label": "KNOWS", "start": 1, "end": 2, "properties": {"kind": "a"}},
    {"op": "create", "label": "KNOWS", "start": 1, "end": 3, "properties": {"kind": "b"}},
    {"op": "create", "label": "KNOWS", "start": 1, "end": 4, "properties": {"kind": "c"}}
]"#;

fn count(
    ctx: &Context,
    vertex: u64,
    direction: &str,
    tags: &[&str],
) -> Result<u64, RelcountError> {
    let tags: Vec<String> = tags.iter().map(|t| t.to_string()).collect();
    let request = CountRequest::parse(vertex, "KNOWS", direction, &tags, &[], false)?;
    run_count(ctx, &request)
}

#[test]
fn apply_then_count_from_cache() {
    let dir = tempfile::tempdir().expect("temp dir");
    let ctx = context(&dir, 20);
    let file = write_changes(&dir, "changes.json", THREE_FRIENDS);

    let summary = run_apply(&ctx, &file).expect("apply");
    assert_eq!(
        summary,
        ApplySummary {
            created: 3,
            updated: 0,
            deleted: 0,
            merges: 0,
            unsettled: 0,
        }
    );

    assert_eq!(count(&ctx, 1, "out", &[]).expect("count"), 3);
    assert_eq!(count(&ctx, 1, "out", &["kind=a"]).expect("count"), 1);
    assert_eq!(count(&ctx, 2, "in", &[]).expect("count"), 1);
    assert_eq!(count(&ctx, 2, "out", &[]).expect("count"), 0);
}

#[test]
fn compacted_cache_refuses_folded_detail() {
    let dir = tempfile::tempdir().expect("temp dir");
    let ctx = context(&dir, 2);
    let file = write_changes(&dir, "changes.json", THREE_FRIENDS);

    let summary = run_apply(&ctx, &file).expect("apply");
    assert!(summary.merges >= 1);

    let snapshot = run_inspect(&ctx, 1).expect("inspect");
    assert_eq!(
        snapshot.entries,
        vec![("KNOWS#OUTGOING#kind#*".to_string(), 3)]
    );

    // The whole label is still answered from the merged entry.
    assert_eq!(count(&ctx, 1, "out", &[]).expect("count"), 3);
    assert_eq!(count(&ctx, 2, "in", &["kind=a"]).expect("count"), 1);

    let err = count(&ctx, 1, "out", &["kind=b"]).expect_err("refused");
    assert!(err.is_ambiguous());
}

#[test]
fn updates_and_deletes_move_counts() {
    let dir = tempfile::tempdir().expect("temp dir");
    let ctx = context(&dir, 20);
    let file = write_changes(
        &dir,
        "changes.json",
        r#"[
            {"op": "create", "label": "KNOWS", "start": 1, "end": 2, "properties": {"kind": "a"}},
            {"op": "create", "label": "KNOWS", "start": 1, "end": 3, "properties": {"kind": "b"}},
            {"op": "update", "edge": 0, "properties": {"kind": "b"}},
            {"op": "delete", "edge": 1}
        ]"#,
    );

    let summary = run_apply(&ctx, &file).expect("apply");
    assert_eq!((summary.created, summary.updated, summary.deleted), (2, 1, 1));

    assert_eq!(count(&ctx, 1, "out", &["kind=b"]).expect("count"), 1);
    assert_eq!(count(&ctx, 1, "out", &["kind=a"]).expect("count"), 0);
    assert_eq!(count(&ctx, 3, "in", &[]).expect("count"), 0);
    assert!(run_inspect(&ctx, 3).expect("inspect").is_empty());
}

#[test]
fn self_loop_counts_in_both_directions() {
    let dir = tempfile::tempdir().expect("temp dir");
    let ctx = context(&dir, 20);
    let file = write_changes(
        &dir,
        "loop.json",
        r#"[{"op": "create", "label": "KNOWS", "start": 5, "end": 5}]"#,
    );
    run_apply(&ctx, &file).expect("apply");

    assert_eq!(count(&ctx, 5, "out", &[]).expect("count"), 1);
    assert_eq!(count(&ctx, 5, "in", &[]).expect("count"), 1);
    assert_eq!(count(&ctx, 5, "both", &[]).expect("count"), 2);
}

#[test]
fn failed_change_keeps_earlier_ones() {
    let dir = tempfile::tempdir().expect("temp dir");
    let ctx = context(&dir, 20);
    let file = write_changes(
        &dir,
        "changes.json",
        r#"[
            {"op": "create", "label": "KNOWS", "start": 1, "end": 2},
            {"op": "delete", "edge": 42}
        ]"#,
    );

    let err = run_apply(&ctx, &file).expect_err("missing edge");
    assert!(matches!(err, RelcountError::EdgeNotFound(_)));
    assert_eq!(count(&ctx, 1, "out", &[]).expect("count"), 1);
}

#[test]
fn rebuild_matches_incremental_state() {
    let dir = tempfile::tempdir().expect("temp dir");
    let ctx = context(&dir, 2);
    let file = write_changes(&dir, "changes.json", THREE_FRIENDS);
    run_apply(&ctx, &file).expect("apply");

    let before = {
        let graph = ctx.open().expect("open");
        canonical_checksum(&ctx.cache, &graph).expect("checksum")
    };
    let after = {
        let mut graph = ctx.open().expect("open");
        ctx.cache.rebuild(&mut graph).expect("rebuild");
        canonical_checksum(&ctx.cache, &graph).expect("checksum")
    };
    assert_eq!(before, after);
}

#[test]
fn status_reports_metrics() {
    let dir = tempfile::tempdir().expect("temp dir");
    let ctx = context(&dir, 2);
    let file = write_changes(&dir, "changes.json", THREE_FRIENDS);
    run_apply(&ctx, &file).expect("apply");

    let (edges, metrics) = run_status(&ctx).expect("status");
    assert_eq!(edges, 3);
    assert_eq!(metrics.vertex_count, 4);
    assert_eq!(metrics.cached_vertex_count, 4);
    assert_eq!(metrics.general_entry_count, 1);
}

#[test]
fn export_import_verify() {
    let dir = tempfile::tempdir().expect("temp dir");
    let ctx = context(&dir, 20);
    let file = write_changes(&dir, "changes.json", THREE_FRIENDS);
    run_apply(&ctx, &file).expect("apply");

    let export = dir.path().join("caches.rcex");
    cmd_export(&ctx, &export).expect("export");
    assert!(run_verify(&ctx, &export).expect("verify"));

    cmd_evict(&ctx, 1).expect("evict");
    assert!(!run_verify(&ctx, &export).expect("verify"));
    assert_eq!(count(&ctx, 1, "out", &[]).expect("count"), 0);

    assert_eq!(run_import(&ctx, &export).expect("import"), 4);
    assert!(run_verify(&ctx, &export).expect("verify"));
    assert_eq!(count(&ctx, 1, "out", &[]).expect("count"), 3);
}

#[test]
fn init_refuses_existing_database_without_force() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("graph.redb");

    cmd_init(&path, false).expect("first init");
    assert!(path.exists());
    assert!(cmd_init(&path, false).is_err());
    cmd_init(&path, true).expect("forced init");
}

#[test]
fn missing_change_file_is_an_error() {
    let dir = tempfile::tempdir().expect("temp dir");
    let ctx = context(&dir, 20);
    let err = run_apply(&ctx, &dir.path().join("absent.json")).expect_err("missing");
    assert!(matches!(err, RelcountError::IoError(_)));
}

#[test]
fn count_request_validates_arguments() {
    assert!(CountRequest::parse(1, "KNOWS", "sideways", &[], &[], false).is_err());
    assert!(CountRequest::parse(1, "KNOWS", "out", &["kind".to_string()], &[], false).is_err());

    let request = CountRequest::parse(
        1,
        "KNOWS",
        "in",
        &["kind=a=b".to_string()],
        &["since".to_string()],
        true,
    )
    .expect("parse");
    assert_eq!(
        request.query.descriptor.tag("kind").and_then(|v| v.as_literal()),
        Some("a=b")
    );
    assert!(request.query.descriptor.tag("since").expect("any").is_any());
}
