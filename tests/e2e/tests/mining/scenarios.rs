//! Mining scenario tests: discovery, self-loop exclusion, debounce.

use hearth_core::{CancelToken, Event, MiningConfig, mine_rules};
use hearth_e2e_tests::mocks::{BASE_TS, chatter, follows};

fn relaxed() -> MiningConfig {
    MiningConfig {
        min_support_a: 2,
        min_support_b: 2,
        min_hits: 2,
        min_confidence: 0.3,
        min_confidence_lb: 0.0,
        min_lift: 0.5,
        min_leverage: 0.0,
        ..Default::default()
    }
}

#[test]
fn s1_two_session_discovery() {
    // Two sessions (gap > 2 min), each light.kitchen:on then
    // switch.fan:on five seconds later.
    let events = follows(
        ("light.kitchen", "on"),
        ("switch.fan", "on"),
        2,
        5_000,
        10 * 60_000,
    );
    let outcome = mine_rules(&events, &relaxed(), BASE_TS, &CancelToken::new()).unwrap();

    let forward: Vec<_> = outcome
        .rules
        .iter()
        .filter(|r| r.a == "light.kitchen:on")
        .collect();
    assert_eq!(forward.len(), 1, "exactly one forward rule");
    let rule = forward[0];
    assert_eq!(rule.b, "switch.fan:on");
    assert_eq!(rule.n_a, 2);
    assert_eq!(rule.n_ab, 2);
    assert_eq!(rule.confidence, 1.0);
    assert_eq!(rule.dt_sec, 30);
}

#[test]
fn s2_self_loop_excluded() {
    // 20 events of one key in one session; defaults keep self-rules out
    let events = chatter("light.kitchen", "on", 20, 10_000);
    let outcome = mine_rules(&events, &MiningConfig::default(), BASE_TS, &CancelToken::new())
        .unwrap();
    assert!(outcome.rules.is_empty());
}

#[test]
fn s3_debounce_collapses_chatter() {
    // 100 flaps at 500 ms; cooldown 2 s keeps 25; one fan event follows
    let mut events = chatter("light.kitchen", "on", 100, 500);
    let last_ts = events.last().unwrap().ts_ms;
    events.push(Event::new(last_ts + 1_000, "switch.fan", "on"));

    let mut config = relaxed();
    config.entity_cooldown_sec.insert("light.kitchen".to_string(), 2);
    config.min_support_b = 1;
    config.min_hits = 1;

    let outcome = mine_rules(&events, &config, BASE_TS, &CancelToken::new()).unwrap();
    assert_eq!(outcome.stats.events_deduped, 26, "25 light + 1 fan survive");

    let rule = outcome
        .rules
        .iter()
        .find(|r| r.a == "light.kitchen:on" && r.b == "switch.fan:on")
        .expect("fan rule exists");
    assert_eq!(rule.n_a, 25, "nA equals the debounced count");
}

#[test]
fn i3_metric_sanity_on_all_emitted_rules() {
    let events = follows(("light.kitchen", "on"), ("switch.fan", "on"), 10, 5_000, 60_000);
    let outcome = mine_rules(&events, &relaxed(), BASE_TS, &CancelToken::new()).unwrap();
    assert!(!outcome.rules.is_empty());
    for rule in &outcome.rules {
        assert!(rule.confidence_lb >= 0.0);
        assert!(rule.confidence_lb <= rule.confidence);
        assert!(rule.confidence <= 1.0);
        assert!(rule.n_ab <= rule.n_a);
    }
}

#[test]
fn best_window_dedupe_keeps_one_rule_per_pair() {
    let events = follows(("light.kitchen", "on"), ("switch.fan", "on"), 10, 5_000, 60_000);
    let outcome = mine_rules(&events, &relaxed(), BASE_TS, &CancelToken::new()).unwrap();
    let mut seen = std::collections::HashSet::new();
    for rule in &outcome.rules {
        assert!(
            seen.insert((rule.a.clone(), rule.b.clone())),
            "pair {} → {} appeared twice",
            rule.a,
            rule.b
        );
    }
}

#[test]
fn rules_rank_by_score_descending() {
    let mut events = follows(("light.kitchen", "on"), ("switch.fan", "on"), 10, 5_000, 60_000);
    events.extend(follows(
        ("binary_sensor.door", "on"),
        ("light.hall", "on"),
        6,
        3_000,
        90_000,
    ));
    let outcome = mine_rules(&events, &relaxed(), BASE_TS, &CancelToken::new()).unwrap();
    assert!(outcome.rules.len() >= 2);
    for pair in outcome.rules.windows(2) {
        assert!(pair[0].score() >= pair[1].score());
    }
}
