//! A→B rule mining algorithms
//!
//! The pipeline: domain/entity filtering, per-key debounce, session
//! segmentation, support-based candidate pairs, windowed hit counting over
//! per-key time indexes, then quality metrics and threshold filtering.
//! Hit counting is binary search over sorted timestamp vectors, so a pass
//! is `O(pairs · |A| · log |B|)` rather than a scan per pair.

use std::collections::HashMap;

use tracing::{debug, info};

use crate::cancel::CancelToken;
use crate::event::{Event, split_key};

use super::model::{MiningConfig, Rule, RuleEvidence};
use super::{MinerError, Result};

/// z-score for the one-sided 95% Wilson bound.
const WILSON_Z: f64 = 1.96;

// ============================================================================
// OUTCOME
// ============================================================================

/// Counters describing one mining pass.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct MiningStats {
    /// Events offered to the pass
    pub events_in: usize,
    /// Events surviving domain/entity filters
    pub events_filtered: usize,
    /// Events surviving debounce
    pub events_deduped: usize,
    /// Sessions after gap segmentation
    pub sessions: usize,
    /// Antecedent candidates
    pub a_candidates: usize,
    /// Consequent candidates
    pub b_candidates: usize,
    /// (A, B, Δt) combinations evaluated
    pub pairs_evaluated: usize,
    /// Rules surviving all filters
    pub rules_found: usize,
    /// Days spanned by the debounced stream
    pub observation_period_days: u32,
}

/// Rules plus pass counters.
#[derive(Debug, Clone, Default)]
pub struct MiningOutcome {
    /// Kept rules, best score first
    pub rules: Vec<Rule>,
    /// Pass counters
    pub stats: MiningStats,
}

// ============================================================================
// MATH
// ============================================================================

/// One-sided 95% Wilson score lower bound for `successes / trials`.
pub fn wilson_lower_bound(successes: u64, trials: u64) -> f64 {
    if trials == 0 {
        return 0.0;
    }
    let n = trials as f64;
    let p = successes as f64 / n;
    let z = WILSON_Z;
    let denominator = 1.0 + z * z / n;
    let center_adjusted = p + z * z / (2.0 * n);
    let margin = z * ((p * (1.0 - p) + z * z / (4.0 * n)) / n).sqrt();
    ((center_adjusted - margin) / denominator).max(0.0)
}

/// `[p25, p50, p75, p90, p99]` of the given samples, linear interpolation.
///
/// Empty input yields an empty vector.
pub fn latency_quantiles(samples: &[f64]) -> Vec<f64> {
    if samples.is_empty() {
        return Vec::new();
    }
    let mut sorted = samples.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    [0.25, 0.50, 0.75, 0.90, 0.99]
        .iter()
        .map(|q| quantile(&sorted, *q))
        .collect()
}

fn quantile(sorted: &[f64], q: f64) -> f64 {
    if sorted.len() == 1 {
        return sorted[0];
    }
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    if lo == hi {
        sorted[lo]
    } else {
        sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
    }
}

// ============================================================================
// PREPROCESSING
// ============================================================================

/// Apply domain and entity include/exclude filters.
fn filter_events(events: &[Event], config: &MiningConfig) -> Vec<Event> {
    let filtered: Vec<Event> = events
        .iter()
        .filter(|e| {
            if let Some(include) = &config.include_domains {
                if !include.contains(&e.domain) {
                    return false;
                }
            }
            if let Some(exclude) = &config.exclude_domains {
                if exclude.contains(&e.domain) {
                    return false;
                }
            }
            if let Some(include) = &config.include_entities {
                if !include.contains(&e.entity_id) {
                    return false;
                }
            }
            if let Some(exclude) = &config.exclude_entities {
                if exclude.contains(&e.entity_id) {
                    return false;
                }
            }
            true
        })
        .cloned()
        .collect();

    debug!(
        before = events.len(),
        after = filtered.len(),
        "domain/entity filtering"
    );
    filtered
}

/// Drop flapping events: within one key, events closer than the entity's
/// cooldown to the previously kept event are removed. Chronological
/// order, ties broken by insertion order (stable sort).
fn debounce_events(mut events: Vec<Event>, config: &MiningConfig) -> Vec<Event> {
    events.sort_by_key(|e| e.ts_ms);

    let before = events.len();
    let mut last_kept: HashMap<String, i64> = HashMap::new();
    let mut kept = Vec::with_capacity(events.len());

    for event in events {
        let key = event.key();
        let cooldown_ms = config.cooldown_ms(&event.entity_id);
        match last_kept.get(&key) {
            Some(last) if event.ts_ms - last < cooldown_ms => {}
            _ => {
                last_kept.insert(key, event.ts_ms);
                kept.push(event);
            }
        }
    }

    debug!(before, after = kept.len(), "debounce");
    kept
}

/// Segment a chronologically sorted stream into sessions: a new session
/// starts whenever the gap to the previous event exceeds the gap setting.
pub(crate) fn segment_sessions(events: &[Event], gap_ms: i64) -> Vec<std::ops::Range<usize>> {
    let mut sessions = Vec::new();
    if events.is_empty() {
        return sessions;
    }
    let mut start = 0;
    for i in 1..events.len() {
        if events[i].ts_ms - events[i - 1].ts_ms > gap_ms {
            sessions.push(start..i);
            start = i;
        }
    }
    sessions.push(start..events.len());
    sessions
}

/// Sorted timestamp index per event key.
fn build_indices(events: &[Event]) -> HashMap<String, Vec<i64>> {
    let mut indices: HashMap<String, Vec<i64>> = HashMap::new();
    for event in events {
        indices.entry(event.key()).or_default().push(event.ts_ms);
    }
    for times in indices.values_mut() {
        times.sort_unstable();
    }
    indices
}

// ============================================================================
// HIT COUNTING
// ============================================================================

/// Count A→B hits within `(tA, tA + dt_ms]` and collect evidence.
///
/// A hit records the *first* B in the window. Returns
/// `(hits, hit_examples, miss_examples)` with example lists capped.
fn count_ab_hits(
    a_times: &[i64],
    b_times: &[i64],
    dt_ms: i64,
    max_examples: usize,
) -> (u64, Vec<(i64, i64, i64)>, Vec<i64>) {
    let mut hits = 0u64;
    let mut hit_examples = Vec::new();
    let mut miss_examples = Vec::new();

    for &t_a in a_times {
        // First B strictly after tA
        let start = b_times.partition_point(|&t| t <= t_a);
        if start < b_times.len() && b_times[start] <= t_a + dt_ms {
            let t_b = b_times[start];
            hits += 1;
            if hit_examples.len() < max_examples {
                hit_examples.push((t_a, t_b, t_b - t_a));
            }
        } else if miss_examples.len() < max_examples {
            miss_examples.push(t_a);
        }
    }

    (hits, hit_examples, miss_examples)
}

/// Baseline probability of B landing in a random window of `dt_ms` over
/// the observation period (window-count estimate).
fn baseline_p_b(b_count: u64, period_ms: i64, dt_ms: i64) -> f64 {
    if period_ms <= 0 || dt_ms <= 0 {
        return 0.0;
    }
    let num_windows = (period_ms / dt_ms).max(1);
    (b_count as f64 / num_windows as f64).min(1.0)
}

// ============================================================================
// MINING
// ============================================================================

/// Mine A→B rules from an event stream.
///
/// Windows are enumerated per pair and deduplicated afterwards: each
/// `(A, B)` keeps only its best-scoring window, so a pair yields at most
/// one rule.
pub fn mine_rules(
    events: &[Event],
    config: &MiningConfig,
    now_ms: i64,
    cancel: &CancelToken,
) -> Result<MiningOutcome> {
    info!(events = events.len(), "starting A→B rule mining");

    let mut stats = MiningStats {
        events_in: events.len(),
        ..Default::default()
    };

    let filtered = filter_events(events, config);
    stats.events_filtered = filtered.len();
    let events = debounce_events(filtered, config);
    stats.events_deduped = events.len();
    stats.sessions = segment_sessions(&events, config.session_gap_ms()).len();

    if events.len() < config.min_support_a {
        debug!(events = events.len(), "too few events after preprocessing");
        return Ok(MiningOutcome { rules: Vec::new(), stats });
    }

    let indices = build_indices(&events);
    let a_candidates: Vec<&String> = indices
        .iter()
        .filter(|(_, times)| times.len() >= config.min_support_a)
        .map(|(key, _)| key)
        .collect();
    let b_candidates: Vec<&String> = indices
        .iter()
        .filter(|(_, times)| times.len() >= config.min_support_b)
        .map(|(key, _)| key)
        .collect();
    stats.a_candidates = a_candidates.len();
    stats.b_candidates = b_candidates.len();

    if a_candidates.is_empty() || b_candidates.is_empty() {
        return Ok(MiningOutcome { rules: Vec::new(), stats });
    }

    let period_ms = events.last().map(|e| e.ts_ms).unwrap_or(0)
        - events.first().map(|e| e.ts_ms).unwrap_or(0);
    let observation_period_days = ((period_ms / 86_400_000).max(1)) as u32;
    stats.observation_period_days = observation_period_days;

    // Best rule per (A, B) across all windows
    let mut best: HashMap<(String, String), Rule> = HashMap::new();

    for &dt_sec in &config.windows_sec {
        let dt_ms = i64::from(dt_sec) * 1000;
        for a_key in &a_candidates {
            cancel.check().map_err(|_| MinerError::Cancelled)?;
            for b_key in &b_candidates {
                if config.exclude_self_rules && a_key == b_key {
                    continue;
                }
                if config.exclude_same_entity && split_key(a_key).0 == split_key(b_key).0 {
                    continue;
                }
                stats.pairs_evaluated += 1;

                let a_times = &indices[*a_key];
                let b_times = &indices[*b_key];
                let (n_ab, hit_examples, miss_examples) =
                    count_ab_hits(a_times, b_times, dt_ms, config.max_evidence_examples);

                if n_ab < config.min_hits {
                    continue;
                }

                let n_a = a_times.len() as u64;
                let n_b = b_times.len() as u64;
                let confidence = n_ab as f64 / n_a as f64;
                let confidence_lb = wilson_lower_bound(n_ab, n_a);
                let baseline = baseline_p_b(n_b, period_ms, dt_ms);
                let lift = confidence / baseline.max(0.001);
                let leverage = confidence - baseline;
                let conviction = if confidence < 1.0 && baseline < 1.0 {
                    Some((1.0 - baseline) / (1.0 - confidence))
                } else {
                    None
                };

                if confidence < config.min_confidence
                    || confidence_lb < config.min_confidence_lb
                    || lift < config.min_lift
                    || leverage < config.min_leverage
                {
                    continue;
                }

                let latencies: Vec<f64> = hit_examples
                    .iter()
                    .map(|(_, _, latency_ms)| *latency_ms as f64 / 1000.0)
                    .collect();
                let rule = Rule {
                    a: (*a_key).clone(),
                    b: (*b_key).clone(),
                    dt_sec,
                    n_a,
                    n_b,
                    n_ab,
                    confidence,
                    confidence_lb,
                    lift,
                    leverage,
                    conviction,
                    baseline_p_b: baseline,
                    observation_period_days,
                    created_at_ms: now_ms,
                    evidence: Some(RuleEvidence {
                        hits: hit_examples,
                        misses: miss_examples,
                        latency_quantiles: latency_quantiles(&latencies),
                        extra: Default::default(),
                    }),
                    zone: None,
                    context: None,
                    extra: Default::default(),
                };

                let slot = ((*a_key).clone(), (*b_key).clone());
                match best.get(&slot) {
                    Some(existing) if existing.score() >= rule.score() => {}
                    _ => {
                        best.insert(slot, rule);
                    }
                }
            }
        }
    }

    let mut rules: Vec<Rule> = best.into_values().collect();
    rules.sort_by(|x, y| {
        y.score()
            .partial_cmp(&x.score())
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    rules.truncate(config.max_rules);
    stats.rules_found = rules.len();

    info!(rules = rules.len(), pairs = stats.pairs_evaluated, "mining complete");
    Ok(MiningOutcome { rules, stats })
}

/// Mine with optional context stratification.
///
/// With `context_features` configured, events are additionally bucketed by
/// the joined feature values and mined once per bucket; bucket rules are
/// tagged `A@ctx → B@ctx`. Global rules are always mined.
pub fn mine_with_context(
    events: &[Event],
    config: &MiningConfig,
    now_ms: i64,
    cancel: &CancelToken,
) -> Result<MiningOutcome> {
    if config.context_features.is_empty() {
        return mine_rules(events, config, now_ms, cancel);
    }

    info!(features = ?config.context_features, "mining with context stratification");

    let mut buckets: HashMap<String, Vec<Event>> = HashMap::new();
    for event in events {
        if let Some(ctx_key) = context_bucket(event, &config.context_features) {
            buckets.entry(ctx_key).or_default().push(event.clone());
        }
    }

    let mut outcome = mine_rules(events, config, now_ms, cancel)?;

    for (ctx_key, ctx_events) in buckets {
        if ctx_events.len() < config.min_support_a {
            continue;
        }
        debug!(context = %ctx_key, events = ctx_events.len(), "mining context bucket");
        let ctx_outcome = mine_rules(&ctx_events, config, now_ms, cancel)?;
        for mut rule in ctx_outcome.rules {
            rule.a = format!("{}@{}", rule.a, ctx_key);
            rule.b = format!("{}@{}", rule.b, ctx_key);
            rule.context = Some(ctx_key.clone());
            outcome.rules.push(rule);
        }
    }

    outcome.rules.sort_by(|x, y| {
        y.score()
            .partial_cmp(&x.score())
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    outcome.rules.truncate(config.max_rules);
    outcome.stats.rules_found = outcome.rules.len();
    Ok(outcome)
}

/// Bucket key for an event under the configured features, e.g.
/// `time_of_day:evening;weekday:4`.
fn context_bucket(event: &Event, features: &[String]) -> Option<String> {
    let context = event.context.as_ref()?;
    let parts: Vec<String> = features
        .iter()
        .filter_map(|f| context.get(f).map(|v| format!("{f}:{v}")))
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join(";"))
    }
}

// ============================================================================
// TESTS
// ============================================================================
