//! Candidate lifecycle: S5 dedupe, terminal idempotence (R2), events,
//! restart stickiness.

use hearth_core::{CandidateState, CoreConfig, Decision, Engine, ErrorKind, CoreError};
use hearth_e2e_tests::harness::{TestEngine, relaxed_mining};
use hearth_e2e_tests::mocks::{BASE_TS, follows};

fn feed_pattern(engine: &mut Engine) {
    for event in follows(("light.kitchen", "on"), ("switch.fan", "on"), 10, 5_000, 60_000) {
        engine.ingest(event).unwrap();
    }
}

#[test]
fn s5_dismissed_pattern_never_recreated() {
    let mut harness = TestEngine::relaxed();
    feed_pattern(&mut harness.engine);

    let outcome = harness
        .engine
        .mine_and_create_candidates(BASE_TS + 10_000_000, true, None)
        .unwrap();
    assert!(outcome.candidates_created > 0);

    // Dismiss everything
    let mut dismissed_at = Vec::new();
    for candidate in harness.engine.list_candidates(Some(CandidateState::Pending)) {
        harness
            .engine
            .decide_candidate(
                &candidate.candidate_id,
                Decision::Dismissed,
                Some("not wanted".to_string()),
                BASE_TS + 11_000_000,
            )
            .unwrap();
        dismissed_at.push(candidate.candidate_id);
    }

    // The miner re-discovers the same patterns
    let rerun = harness
        .engine
        .mine_and_create_candidates(BASE_TS + 20_000_000, true, None)
        .unwrap();
    assert!(rerun.report.rules > 0, "rules are still emitted");
    assert_eq!(rerun.candidates_created, 0, "no candidate is re-created");
    assert!(rerun.already_decided > 0);

    // Dismissed candidates are untouched
    for candidate_id in dismissed_at {
        let all = harness.engine.list_candidates(None);
        let stored = all
            .iter()
            .find(|c| c.candidate_id == candidate_id)
            .unwrap();
        assert_eq!(stored.state, CandidateState::Dismissed);
        assert_eq!(stored.updated_at_ms, BASE_TS + 11_000_000);
    }
}

#[test]
fn r2_terminal_states_are_idempotent() {
    let mut harness = TestEngine::relaxed();
    feed_pattern(&mut harness.engine);
    harness
        .engine
        .mine_and_create_candidates(BASE_TS + 10_000_000, true, None)
        .unwrap();

    let candidate = harness
        .engine
        .list_candidates(Some(CandidateState::Pending))
        .into_iter()
        .next()
        .unwrap();
    harness
        .engine
        .decide_candidate(&candidate.candidate_id, Decision::Dismissed, None, BASE_TS)
        .unwrap();

    // Re-deciding in any direction conflicts and changes nothing
    for decision in [Decision::Accepted, Decision::Dismissed] {
        let err = harness
            .engine
            .decide_candidate(&candidate.candidate_id, decision, None, BASE_TS + 1)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }
    let all = harness.engine.list_candidates(None);
    let stored = all
        .iter()
        .find(|c| c.candidate_id == candidate.candidate_id)
        .unwrap();
    assert_eq!(stored.state, CandidateState::Dismissed);
}

#[test]
fn decisions_publish_lifecycle_events() {
    let mut harness = TestEngine::relaxed();
    feed_pattern(&mut harness.engine);
    let subscription = harness.engine.subscribe("observer");

    harness
        .engine
        .mine_and_create_candidates(BASE_TS + 10_000_000, true, None)
        .unwrap();
    let candidate = harness
        .engine
        .list_candidates(Some(CandidateState::Pending))
        .into_iter()
        .next()
        .unwrap();
    harness
        .engine
        .decide_candidate(&candidate.candidate_id, Decision::Accepted, None, BASE_TS)
        .unwrap();

    let tags: Vec<&str> = subscription.drain().iter().map(|e| e.tag()).collect();
    assert!(tags.contains(&"candidate_created"));
    assert!(tags.contains(&"candidate_accepted"));
}

#[test]
fn dismissals_survive_process_restart() {
    let dir = tempfile::tempdir().unwrap();
    let config = || CoreConfig {
        data_dir: Some(dir.path().to_path_buf()),
        miner: relaxed_mining(),
        ..Default::default()
    };

    // First process: discover and dismiss
    {
        let mut engine = Engine::open(config()).unwrap();
        feed_pattern(&mut engine);
        engine
            .mine_and_create_candidates(BASE_TS + 10_000_000, true, None)
            .unwrap();
        for candidate in engine.list_candidates(Some(CandidateState::Pending)) {
            engine
                .decide_candidate(&candidate.candidate_id, Decision::Dismissed, None, BASE_TS)
                .unwrap();
        }
        engine.shutdown().unwrap();
    }

    // Second process: same pattern, still no new candidates
    {
        let mut engine = Engine::open(config()).unwrap();
        feed_pattern(&mut engine);
        let outcome = engine
            .mine_and_create_candidates(BASE_TS + 30_000_000, true, None)
            .unwrap();
        assert_eq!(outcome.candidates_created, 0);
        assert!(outcome.already_decided > 0);
        assert!(
            engine
                .list_candidates(Some(CandidateState::Pending))
                .is_empty()
        );
    }
}

#[test]
fn candidates_carry_rule_evidence() {
    let mut harness = TestEngine::relaxed();
    feed_pattern(&mut harness.engine);
    harness
        .engine
        .mine_and_create_candidates(BASE_TS + 10_000_000, true, None)
        .unwrap();

    for candidate in harness.engine.list_candidates(None) {
        assert!(!candidate.pattern_id.is_empty());
        assert!(candidate.pattern_id.starts_with("p:"));
        assert!(candidate.evidence.confidence > 0.0);
        assert_eq!(candidate.metadata.discovery_method, "habitus");
        assert_eq!(candidate.evidence.pattern_id(), candidate.pattern_id);
    }
}
