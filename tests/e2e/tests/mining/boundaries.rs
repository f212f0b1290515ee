//! Mining boundary behaviors: empty streams, degenerate sessions,
//! unknown zones, context stratification.

use std::collections::BTreeMap;

use hearth_core::{CancelToken, Event, MiningStatus, mine_rules, mine_with_context};
use hearth_e2e_tests::harness::{TestEngine, relaxed_mining};
use hearth_e2e_tests::mocks::{BASE_TS, follows, in_zone};

#[test]
fn empty_stream_yields_zero_rules_and_completes() {
    let mut harness = TestEngine::relaxed();
    let outcome = harness
        .engine
        .mine_and_create_candidates(BASE_TS, true, None)
        .unwrap();
    assert_eq!(outcome.report.status, MiningStatus::Completed);
    assert_eq!(outcome.report.rules, 0);
    assert_eq!(outcome.candidates_created, 0);
}

#[test]
fn single_event_session_yields_zero_rules() {
    let outcome = mine_rules(
        &[Event::new(BASE_TS, "light.kitchen", "on")],
        &relaxed_mining(),
        BASE_TS,
        &CancelToken::new(),
    )
    .unwrap();
    assert!(outcome.rules.is_empty());
    assert_eq!(outcome.stats.sessions, 1);
}

#[test]
fn unknown_zone_yields_zero_rules() {
    let mut harness = TestEngine::relaxed();
    for event in follows(("light.kitchen", "on"), ("switch.fan", "on"), 10, 5_000, 60_000) {
        harness.engine.ingest(event).unwrap();
    }
    let outcome = harness
        .engine
        .mine_and_create_candidates(BASE_TS + 10_000_000, true, Some("zone:nowhere"))
        .unwrap();
    assert_eq!(outcome.report.rules, 0);
    assert_eq!(outcome.candidates_created, 0);
}

#[test]
fn zone_scoping_excludes_other_zones() {
    let mut harness = TestEngine::relaxed();
    let kitchen = in_zone(
        follows(("light.kitchen", "on"), ("switch.fan", "on"), 10, 5_000, 60_000),
        "kitchen",
    );
    let bedroom = in_zone(
        follows(("light.bedroom", "on"), ("media_player.radio", "playing"), 10, 4_000, 61_000),
        "bedroom",
    );
    for event in kitchen.into_iter().chain(bedroom) {
        harness.engine.ingest(event).unwrap();
    }

    let outcome = harness
        .engine
        .mine_and_create_candidates(BASE_TS + 10_000_000, true, Some("zone:kitchen"))
        .unwrap();
    assert!(outcome.candidates_created > 0);
    for candidate in harness.engine.list_candidates(None) {
        assert!(!candidate.evidence.a.contains("bedroom"));
        assert!(!candidate.evidence.b.contains("bedroom"));
    }
}

#[test]
fn context_stratification_tags_bucket_rules() {
    let mut events = Vec::new();
    for event in follows(("light.kitchen", "on"), ("switch.fan", "on"), 10, 5_000, 60_000) {
        let mut ctx = BTreeMap::new();
        ctx.insert("time_of_day".to_string(), "evening".to_string());
        events.push(event.with_context(ctx));
    }
    let mut config = relaxed_mining();
    config.context_features = vec!["time_of_day".to_string()];

    let outcome = mine_with_context(&events, &config, BASE_TS, &CancelToken::new()).unwrap();
    let tagged: Vec<_> = outcome.rules.iter().filter(|r| r.context.is_some()).collect();
    assert!(!tagged.is_empty());
    for rule in tagged {
        assert!(rule.a.ends_with("@time_of_day:evening"));
        assert!(rule.b.ends_with("@time_of_day:evening"));
    }
}
