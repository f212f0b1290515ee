//! Throttling and cooperative cancellation timing.

use std::time::Instant;

use hearth_core::{
    CancelToken, CoreError, ErrorKind, GraphConfig, GraphEdge, GraphNode, EdgeType, MiningStatus,
    NodeKind, mine_rules,
};
use hearth_e2e_tests::harness::{TestEngine, TestGraph, relaxed_mining};
use hearth_e2e_tests::mocks::{BASE_TS, follows};

#[test]
fn run_inside_throttle_window_is_skipped() {
    let mut harness = TestEngine::relaxed();
    for event in follows(("light.kitchen", "on"), ("switch.fan", "on"), 10, 5_000, 60_000) {
        harness.engine.ingest(event).unwrap();
    }

    let t0 = BASE_TS + 10_000_000;
    let first = harness
        .engine
        .mine_and_create_candidates(t0, true, None)
        .unwrap();
    assert_eq!(first.report.status, MiningStatus::Completed);

    // throttle_sec − ε later: skipped
    let throttle_ms = harness.engine.config().miner.throttle_sec as i64 * 1000;
    let just_inside = t0 + throttle_ms - 1_000;
    let skipped = harness
        .engine
        .mine_and_create_candidates(just_inside, false, None)
        .unwrap();
    assert_eq!(skipped.report.status, MiningStatus::Skipped);
    assert!(skipped.report.retry_in_sec.is_some());

    // force=true runs unconditionally
    let forced = harness
        .engine
        .mine_and_create_candidates(just_inside, true, None)
        .unwrap();
    assert_eq!(forced.report.status, MiningStatus::Completed);

    // Past the window it runs again without force
    let past = t0 + 2 * throttle_ms + 1_000;
    let reopened = harness
        .engine
        .mine_and_create_candidates(past, false, None)
        .unwrap();
    assert_eq!(reopened.report.status, MiningStatus::Completed);
}

#[test]
fn zone_runs_share_the_throttle_window() {
    let mut harness = TestEngine::relaxed();
    for event in follows(("light.kitchen", "on"), ("switch.fan", "on"), 10, 5_000, 60_000) {
        harness.engine.ingest(event).unwrap();
    }
    let t0 = BASE_TS + 10_000_000;
    harness
        .engine
        .mine_and_create_candidates(t0, true, None)
        .unwrap();

    let zone_run = harness
        .engine
        .mine_and_create_candidates(t0 + 1_000, false, Some("zone:kitchen"))
        .unwrap();
    assert_eq!(zone_run.report.status, MiningStatus::Skipped);
}

#[test]
fn cancelled_prune_returns_within_100ms() {
    let harness = TestGraph::with_config(GraphConfig {
        max_nodes: 5_000,
        max_edges: 10_000,
        ..Default::default()
    });
    // A graph big enough that a full prune does real work
    for i in 0..2_000 {
        harness
            .store
            .upsert_node(&GraphNode::new(
                format!("n{i}"),
                NodeKind::Entity,
                format!("n{i}"),
                1_000,
                (i % 100) as f64 / 100.0,
            ))
            .unwrap();
    }
    for i in 0..1_999 {
        harness
            .store
            .upsert_edge(&GraphEdge::new(
                format!("n{i}"),
                EdgeType::Affects,
                format!("n{}", i + 1),
                1_000,
                1.0,
            ))
            .unwrap();
    }

    let cancel = CancelToken::new();
    cancel.cancel();
    let started = Instant::now();
    let err = harness.store.prune(1_000, &cancel).unwrap_err();
    let elapsed = started.elapsed();

    assert_eq!(err.kind(), ErrorKind::Cancelled);
    assert!(
        elapsed.as_millis() <= 100,
        "cancelled prune took {}ms",
        elapsed.as_millis()
    );
}

#[test]
fn cancelled_mining_returns_quickly_and_cleanly() {
    let events = follows(("light.kitchen", "on"), ("switch.fan", "on"), 50, 5_000, 60_000);
    let cancel = CancelToken::new();
    cancel.cancel();

    let started = Instant::now();
    let err = mine_rules(&events, &relaxed_mining(), BASE_TS, &cancel).unwrap_err();
    let elapsed = started.elapsed();

    assert_eq!(err.kind(), ErrorKind::Cancelled);
    assert!(elapsed.as_millis() <= 100, "cancelled pass took {}ms", elapsed.as_millis());
}

#[test]
fn cancelled_neighborhood_returns_quickly() {
    let harness = TestGraph::new();
    harness
        .store
        .upsert_node(&GraphNode::new("hub", NodeKind::Entity, "hub", 1_000, 1.0))
        .unwrap();
    let cancel = CancelToken::new();
    cancel.cancel();

    let started = Instant::now();
    let err = harness
        .store
        .neighborhood("hub", 3, None, None, 1_000, &cancel)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Cancelled);
    assert!(started.elapsed().as_millis() <= 100);
}

#[test]
fn failed_mining_run_preserves_previous_rules() {
    let mut harness = TestEngine::relaxed();
    for event in follows(("light.kitchen", "on"), ("switch.fan", "on"), 10, 5_000, 60_000) {
        harness.engine.ingest(event).unwrap();
    }
    harness
        .engine
        .mine_and_create_candidates(BASE_TS + 10_000_000, true, None)
        .unwrap();
    let rules_before = harness.engine.patterns(20);
    assert!(!rules_before.is_empty());

    // Cancel the engine: the next run fails but the rules file stands
    harness.engine.cancel_token().cancel();
    let result = harness
        .engine
        .mine_and_create_candidates(BASE_TS + 20_000_000, true, None);
    assert!(result.is_err());
    let rules_after = harness.engine.patterns(20);
    assert_eq!(rules_before.len(), rules_after.len());
}
