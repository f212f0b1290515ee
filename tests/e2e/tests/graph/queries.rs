//! Graph query API behavior: filters, clamps, paging, patterns.

use hearth_core::{
    CancelToken, EdgeType, GetStateFilters, GraphApi, GraphEdge, GraphNode, NodeKind, NodeSort,
    SortOrder,
};
use hearth_e2e_tests::harness::{TestEngine, TestGraph};
use hearth_e2e_tests::mocks::{BASE_TS, follows};

fn node(id: &str, kind: NodeKind, score: f64) -> GraphNode {
    GraphNode::new(id, kind, id, 1_000, score)
}

#[test]
fn empty_graph_neighborhood_returns_empty_without_error() {
    let harness = TestGraph::new();
    let api = GraphApi::new(&harness.store);
    let filters = GetStateFilters {
        center: Some("nothing.here".to_string()),
        hops: Some(2),
        ..Default::default()
    };
    let result = api.get_state(&filters, 1_000, &CancelToken::new()).unwrap();
    assert!(result.nodes.is_empty());
    assert!(result.edges.is_empty());
}

#[test]
fn get_state_filters_by_kind_and_domain() {
    let harness = TestGraph::new();
    harness
        .store
        .upsert_node(&node("light.a", NodeKind::Entity, 0.9).with_domain("light"))
        .unwrap();
    harness
        .store
        .upsert_node(&node("switch.b", NodeKind::Entity, 0.8).with_domain("switch"))
        .unwrap();
    harness
        .store
        .upsert_node(&node("zone:kitchen", NodeKind::Zone, 1.0))
        .unwrap();

    let api = GraphApi::new(&harness.store);

    let zones_only = api
        .get_state(
            &GetStateFilters {
                kinds: Some(vec![NodeKind::Zone]),
                ..Default::default()
            },
            1_000,
            &CancelToken::new(),
        )
        .unwrap();
    assert_eq!(zones_only.nodes.len(), 1);
    assert_eq!(zones_only.nodes[0].id, "zone:kitchen");

    let lights_only = api
        .get_state(
            &GetStateFilters {
                domains: Some(vec!["light".to_string()]),
                ..Default::default()
            },
            1_000,
            &CancelToken::new(),
        )
        .unwrap();
    assert_eq!(lights_only.nodes.len(), 1);
    assert_eq!(lights_only.nodes[0].id, "light.a");
}

#[test]
fn get_nodes_pages_are_stable_and_bounded() {
    let harness = TestGraph::new();
    for i in 0..25 {
        harness
            .store
            .upsert_node(&node(&format!("n{i:02}"), NodeKind::Entity, i as f64 / 25.0))
            .unwrap();
    }
    let api = GraphApi::new(&harness.store);

    let first = api
        .get_nodes_page(1, 10, NodeSort::Label, SortOrder::Asc)
        .unwrap();
    let second = api
        .get_nodes_page(2, 10, NodeSort::Label, SortOrder::Asc)
        .unwrap();
    let third = api
        .get_nodes_page(3, 10, NodeSort::Label, SortOrder::Asc)
        .unwrap();
    assert_eq!(first.nodes.len(), 10);
    assert_eq!(second.nodes.len(), 10);
    assert_eq!(third.nodes.len(), 5);
    assert_eq!(first.total, 25);
    // No overlap between pages
    assert_eq!(first.nodes.last().unwrap().id, "n09");
    assert_eq!(second.nodes.first().unwrap().id, "n10");

    // Oversized page size clamps to 100
    let clamped = api
        .get_nodes_page(1, 10_000, NodeSort::Score, SortOrder::Desc)
        .unwrap();
    assert_eq!(clamped.per_page, 100);
}

#[test]
fn neighborhood_respects_hop_radius() {
    let harness = TestGraph::new();
    for id in ["a", "b", "c", "d"] {
        harness.store.upsert_node(&node(id, NodeKind::Entity, 1.0)).unwrap();
    }
    for (from, to) in [("a", "b"), ("b", "c"), ("c", "d")] {
        harness
            .store
            .upsert_edge(&GraphEdge::new(from, EdgeType::Affects, to, 1_000, 1.0))
            .unwrap();
    }
    let api = GraphApi::new(&harness.store);
    for (hops, expected) in [(1u8, 2usize), (2, 3), (3, 4)] {
        let result = api
            .get_state(
                &GetStateFilters {
                    center: Some("a".to_string()),
                    hops: Some(hops),
                    ..Default::default()
                },
                1_000,
                &CancelToken::new(),
            )
            .unwrap();
        assert_eq!(result.nodes.len(), expected, "at {hops} hops");
    }
}

#[test]
fn patterns_view_is_capped_and_sorted() {
    let mut harness = TestEngine::relaxed();
    for event in follows(("light.kitchen", "on"), ("switch.fan", "on"), 10, 5_000, 60_000) {
        harness.engine.ingest(event).unwrap();
    }
    harness
        .engine
        .mine_and_create_candidates(BASE_TS + 10_000_000, true, None)
        .unwrap();

    let patterns = harness.engine.patterns(50);
    assert!(patterns.len() <= 20, "hard cap at 20");
    assert!(!patterns.is_empty());
    for pair in patterns.windows(2) {
        assert!(pair[0].score >= pair[1].score);
    }
}
