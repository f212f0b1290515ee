//! Graph store invariants: capacity pruning, edge closure, decay
//! monotonicity, upsert round-trips, referential integrity.

use std::collections::HashSet;

use hearth_core::{
    CancelToken, EdgeType, GraphConfig, GraphEdge, GraphNode, NodeKind, Provenance,
};
use hearth_e2e_tests::harness::TestGraph;

const HOUR_MS: i64 = 3_600_000;

fn node(id: &str, score: f64, ts: i64) -> GraphNode {
    GraphNode::new(id, NodeKind::Entity, id, ts, score)
}

#[test]
fn s4_capacity_bounded_pruning() {
    // 600 nodes with scores i/600 and no edges
    let harness = TestGraph::new();
    let now = 1_000;
    for i in 0..600 {
        harness
            .store
            .upsert_node(&node(&format!("n{i:03}"), i as f64 / 600.0, now))
            .unwrap();
    }

    let report = harness.store.prune(now, &CancelToken::new()).unwrap();
    assert_eq!(report.nodes_removed, 100);

    let stats = harness.store.stats().unwrap();
    assert_eq!(stats.nodes, 500, "I4: node count within bound");
    for survivor in harness.store.get_nodes(None, None, None).unwrap() {
        assert!(
            survivor.score >= 100.0 / 600.0 - 1e-9,
            "survivor {} below cut",
            survivor.id
        );
    }
}

#[test]
fn i4_every_edge_endpoint_exists_after_prune() {
    let config = GraphConfig {
        max_nodes: 10,
        max_edges: 30,
        ..Default::default()
    };
    let harness = TestGraph::with_config(config);
    let now = 1_000;
    for i in 0..30 {
        harness
            .store
            .upsert_node(&node(&format!("n{i}"), i as f64 / 30.0, now))
            .unwrap();
    }
    for i in 0..29 {
        harness
            .store
            .upsert_edge(&GraphEdge::new(
                format!("n{i}"),
                EdgeType::Affects,
                format!("n{}", i + 1),
                now,
                1.0,
            ))
            .unwrap();
    }

    harness.store.prune(now, &CancelToken::new()).unwrap();

    let surviving_ids: HashSet<String> = harness
        .store
        .get_nodes(None, None, None)
        .unwrap()
        .into_iter()
        .map(|n| n.id)
        .collect();
    assert!(surviving_ids.len() <= 10);
    for edge in harness.store.get_edges(None, None, None, None).unwrap() {
        assert!(surviving_ids.contains(&edge.from), "dangling from {}", edge.from);
        assert!(surviving_ids.contains(&edge.to), "dangling to {}", edge.to);
    }
}

#[test]
fn i6_neighborhood_edge_closure() {
    let harness = TestGraph::new();
    let now = 1_000;
    // Hub with spokes plus a spoke-to-spoke edge
    harness.store.upsert_node(&node("hub", 1.0, now)).unwrap();
    for i in 0..8 {
        harness
            .store
            .upsert_node(&node(&format!("leaf{i}"), 0.1 + i as f64 / 10.0, now))
            .unwrap();
        harness
            .store
            .upsert_edge(&GraphEdge::new(
                "hub",
                EdgeType::Affects,
                format!("leaf{i}"),
                now,
                1.0,
            ))
            .unwrap();
    }
    harness
        .store
        .upsert_edge(&GraphEdge::new("leaf0", EdgeType::Correlates, "leaf1", now, 0.5))
        .unwrap();

    for (max_nodes, max_edges) in [(None, None), (Some(4), None), (Some(4), Some(2))] {
        let (nodes, edges) = harness
            .store
            .neighborhood("hub", 1, max_nodes, max_edges, now, &CancelToken::new())
            .unwrap();
        let ids: HashSet<&str> = nodes.iter().map(|n| n.id.as_str()).collect();
        for edge in &edges {
            assert!(
                ids.contains(edge.from.as_str()) && ids.contains(edge.to.as_str()),
                "edge {} escapes the node set under limits {:?}",
                edge.id,
                (max_nodes, max_edges)
            );
        }
    }
}

#[test]
fn i7_effective_score_monotone_without_writes() {
    let n = node("x", 1.0, 0);
    let mut previous = f64::INFINITY;
    for hours in [0, 1, 6, 12, 24, 48, 96] {
        let score = n.effective_score(hours * HOUR_MS, 24.0);
        assert!(score <= previous, "score rose at {hours}h");
        assert!(score <= n.score);
        assert!(score >= 0.0);
        previous = score;
    }
    // One half-life halves
    assert!((n.effective_score(24 * HOUR_MS, 24.0) - 0.5).abs() < 1e-9);
}

#[test]
fn r1_upsert_then_get_identity() {
    let harness = TestGraph::new();
    let mut meta = serde_json::Map::new();
    meta.insert("room".to_string(), serde_json::Value::from("kitchen"));
    let original = GraphNode::new("light.kitchen", NodeKind::Entity, "Kitchen light", 42, 0.8)
        .with_domain("light")
        .with_tags(vec!["ceiling".to_string(), "dimmable".to_string()])
        .with_source(Provenance::new("ingress", "state_changed", "first observation"))
        .with_meta(meta);
    harness.store.upsert_node(&original).unwrap();
    let read_back = harness.store.get_node("light.kitchen").unwrap().unwrap();
    assert_eq!(read_back, original);

    harness
        .store
        .upsert_node(&node("zone:kitchen", 1.0, 42))
        .unwrap();
    let edge = GraphEdge::new("light.kitchen", EdgeType::InZone, "zone:kitchen", 42, 0.9)
        .with_evidence(Provenance::new("ingress", "area", "registry"));
    harness.store.upsert_edge(&edge).unwrap();
    let edges = harness
        .store
        .get_edges(Some("light.kitchen"), None, None, None)
        .unwrap();
    assert_eq!(edges, vec![edge]);
}

#[test]
fn pii_never_reaches_the_store() {
    let harness = TestGraph::new();
    let tainted = GraphNode::new(
        "person.owner",
        NodeKind::Person,
        "reach me at alice@example.com or 555-123-4567",
        1_000,
        1.0,
    );
    harness.store.upsert_node(&tainted).unwrap();
    let read_back = harness.store.get_node("person.owner").unwrap().unwrap();
    assert!(!read_back.label.contains("alice@example.com"));
    assert!(!read_back.label.contains("555-123-4567"));
    assert!(read_back.label.contains("[REDACTED]"));
}

#[test]
fn weak_connected_nodes_survive_pruning() {
    let harness = TestGraph::new();
    let now = 1_000;
    harness.store.upsert_node(&node("weak", 0.01, now)).unwrap();
    harness.store.upsert_node(&node("anchor", 1.0, now)).unwrap();
    harness
        .store
        .upsert_edge(&GraphEdge::new("weak", EdgeType::Affects, "anchor", now, 1.0))
        .unwrap();

    harness.store.prune(now, &CancelToken::new()).unwrap();
    assert!(harness.store.get_node("weak").unwrap().is_some());

    // Once its edge decays away, the weak node goes too
    let much_later = now + 10 * 24 * HOUR_MS;
    harness.store.prune(much_later, &CancelToken::new()).unwrap();
    assert!(harness.store.get_node("weak").unwrap().is_none());
}
