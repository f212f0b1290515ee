//! Candidate & Suggestion Store
//!
//! Mined rules become user-decidable candidates with a strict lifecycle:
//!
//! ```text
//! pending ──accept──→ accepted
//!    │
//!    └──dismiss──→ dismissed
//! ```
//!
//! `accepted` and `dismissed` are terminal. Dismissals are sticky across
//! restarts: a pattern id that was ever decided is never re-created, the
//! caller is told a decision exists instead.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{info, warn};
use uuid::Uuid;

use crate::dispatch::{CoreEvent, Dispatcher};
use crate::error::{CoreError, ErrorKind};
use crate::miner::Rule;

// ============================================================================
// ERRORS
// ============================================================================

/// Candidate store error type
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum CandidateError {
    /// Unknown candidate id
    #[error("candidate not found: {0}")]
    NotFound(String),
    /// The candidate is already in a terminal state
    #[error("candidate {candidate_id} already {state}, cannot re-decide")]
    Conflict {
        /// The candidate
        candidate_id: String,
        /// Its terminal state
        state: CandidateState,
    },
    /// Persistence failure
    #[error("candidate store IO error: {0}")]
    Io(#[from] std::io::Error),
    /// Malformed persisted file
    #[error("candidate store parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

impl CoreError for CandidateError {
    fn kind(&self) -> ErrorKind {
        match self {
            CandidateError::NotFound(_) => ErrorKind::NotFound,
            CandidateError::Conflict { .. } => ErrorKind::Conflict,
            CandidateError::Io(_) | CandidateError::Parse(_) => ErrorKind::StorageFailure,
        }
    }
}

/// Candidate result type
pub type Result<T> = std::result::Result<T, CandidateError>;

// ============================================================================
// MODEL
// ============================================================================

/// Lifecycle state of a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CandidateState {
    /// Awaiting a user decision
    Pending,
    /// Adopted by the user
    Accepted,
    /// Rejected by the user; sticky
    Dismissed,
}

impl CandidateState {
    /// Whether this state admits no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, CandidateState::Accepted | CandidateState::Dismissed)
    }

    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            CandidateState::Pending => "pending",
            CandidateState::Accepted => "accepted",
            CandidateState::Dismissed => "dismissed",
        }
    }
}

impl std::fmt::Display for CandidateState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A user decision on a pending candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    /// Adopt the candidate
    Accepted,
    /// Reject the candidate
    Dismissed,
}

/// How a candidate was discovered and scoped.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CandidateMetadata {
    /// Zone restriction, when mined zone-scoped
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zone_filter: Option<String>,
    /// Producer, e.g. `habitus` or `habitus_zone`
    pub discovery_method: String,
    /// Unknown fields, preserved
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A user-decidable wrapper around a mined rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    /// Unique id
    pub candidate_id: String,
    /// Stable id of the rule shape; dedupe key
    pub pattern_id: String,
    /// Lifecycle state
    pub state: CandidateState,
    /// The rule backing this candidate
    pub evidence: Rule,
    /// Discovery metadata
    pub metadata: CandidateMetadata,
    /// Creation time, epoch milliseconds
    pub created_at_ms: i64,
    /// Last transition time, epoch milliseconds
    pub updated_at_ms: i64,
    /// Reason supplied with the decision, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Unknown fields, preserved
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// What happened when a rule was offered to the store.
#[derive(Debug, Clone, PartialEq)]
pub enum CreateOutcome {
    /// A fresh candidate was created
    Created(Candidate),
    /// The pattern was already decided; nothing was created
    AlreadyDecided {
        /// The pattern
        pattern_id: String,
        /// The standing decision
        state: CandidateState,
    },
    /// A pending candidate for the pattern already exists
    AlreadyPending {
        /// The existing candidate
        candidate_id: String,
    },
}

// ============================================================================
// STORE
// ============================================================================

/// File-backed candidate store with lifecycle enforcement.
pub struct CandidateStore {
    path: PathBuf,
    candidates: Vec<Candidate>,
    by_pattern: HashMap<String, usize>,
    dispatcher: Option<Arc<Dispatcher>>,
}

impl CandidateStore {
    /// Open the store at `path`, loading any existing candidate file.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let candidates: Vec<Candidate> = if path.exists() {
            match std::fs::read_to_string(path) {
                Ok(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                    warn!(error = %e, "failed to parse candidate file, starting empty");
                    Vec::new()
                }),
                Err(e) => {
                    warn!(error = %e, "failed to read candidate file, starting empty");
                    Vec::new()
                }
            }
        } else {
            Vec::new()
        };

        let by_pattern = candidates
            .iter()
            .enumerate()
            .map(|(i, c)| (c.pattern_id.clone(), i))
            .collect();

        Ok(Self {
            path: path.to_path_buf(),
            candidates,
            by_pattern,
            dispatcher: None,
        })
    }

    /// Attach the dispatcher lifecycle events are published to.
    pub fn set_dispatcher(&mut self, dispatcher: Arc<Dispatcher>) {
        self.dispatcher = Some(dispatcher);
    }

    fn publish(&self, event: CoreEvent) {
        if let Some(dispatcher) = &self.dispatcher {
            dispatcher.publish(event);
        }
    }

    fn persist(&self) -> Result<()> {
        let serialized = serde_json::to_string_pretty(&self.candidates)?;
        std::fs::write(&self.path, serialized)?;
        Ok(())
    }

    /// Offer a mined rule to the store.
    ///
    /// Decided patterns are never re-created (sticky dismissals); an
    /// existing pending candidate is reported rather than duplicated.
    pub fn create_from_rule(
        &mut self,
        rule: &Rule,
        discovery_method: &str,
        now_ms: i64,
    ) -> Result<CreateOutcome> {
        let pattern_id = rule.pattern_id();

        if let Some(&index) = self.by_pattern.get(&pattern_id) {
            let existing = &self.candidates[index];
            if existing.state.is_terminal() {
                return Ok(CreateOutcome::AlreadyDecided {
                    pattern_id,
                    state: existing.state,
                });
            }
            return Ok(CreateOutcome::AlreadyPending {
                candidate_id: existing.candidate_id.clone(),
            });
        }

        let candidate = Candidate {
            candidate_id: format!("cand_{}", Uuid::new_v4()),
            pattern_id: pattern_id.clone(),
            state: CandidateState::Pending,
            evidence: rule.clone(),
            metadata: CandidateMetadata {
                zone_filter: rule.zone.clone(),
                discovery_method: discovery_method.to_string(),
                extra: Map::new(),
            },
            created_at_ms: now_ms,
            updated_at_ms: now_ms,
            reason: None,
            extra: Map::new(),
        };

        self.by_pattern.insert(pattern_id, self.candidates.len());
        self.candidates.push(candidate.clone());
        self.persist()?;

        info!(
            candidate_id = %candidate.candidate_id,
            pattern_id = %candidate.pattern_id,
            "candidate created"
        );
        self.publish(CoreEvent::CandidateCreated {
            candidate_id: candidate.candidate_id.clone(),
            pattern_id: candidate.pattern_id.clone(),
        });
        Ok(CreateOutcome::Created(candidate))
    }

    /// Apply a user decision to a pending candidate.
    pub fn decide(
        &mut self,
        candidate_id: &str,
        decision: Decision,
        reason: Option<String>,
        now_ms: i64,
    ) -> Result<Candidate> {
        let index = self
            .candidates
            .iter()
            .position(|c| c.candidate_id == candidate_id)
            .ok_or_else(|| CandidateError::NotFound(candidate_id.to_string()))?;

        if self.candidates[index].state.is_terminal() {
            return Err(CandidateError::Conflict {
                candidate_id: candidate_id.to_string(),
                state: self.candidates[index].state,
            });
        }

        {
            let candidate = &mut self.candidates[index];
            candidate.state = match decision {
                Decision::Accepted => CandidateState::Accepted,
                Decision::Dismissed => CandidateState::Dismissed,
            };
            candidate.updated_at_ms = now_ms;
            candidate.reason = reason;
        }
        self.persist()?;

        let candidate = self.candidates[index].clone();
        info!(
            candidate_id = %candidate.candidate_id,
            state = %candidate.state,
            "candidate decided"
        );
        let event = match decision {
            Decision::Accepted => CoreEvent::CandidateAccepted {
                candidate_id: candidate.candidate_id.clone(),
                pattern_id: candidate.pattern_id.clone(),
            },
            Decision::Dismissed => CoreEvent::CandidateDismissed {
                candidate_id: candidate.candidate_id.clone(),
                pattern_id: candidate.pattern_id.clone(),
            },
        };
        self.publish(event);
        Ok(candidate)
    }

    /// List candidates, optionally filtered by state, newest first.
    pub fn list(&self, state: Option<CandidateState>) -> Vec<Candidate> {
        let mut result: Vec<Candidate> = self
            .candidates
            .iter()
            .filter(|c| state.is_none_or(|s| c.state == s))
            .cloned()
            .collect();
        result.sort_by_key(|c| std::cmp::Reverse(c.created_at_ms));
        result
    }

    /// Fetch a candidate by id.
    pub fn get(&self, candidate_id: &str) -> Option<&Candidate> {
        self.candidates
            .iter()
            .find(|c| c.candidate_id == candidate_id)
    }

    /// The standing decision on a pattern, if one exists.
    pub fn pattern_decision(&self, pattern_id: &str) -> Option<CandidateState> {
        self.by_pattern
            .get(pattern_id)
            .map(|&i| self.candidates[i].state)
    }

    /// Total candidates in the store.
    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn rule() -> Rule {
        Rule {
            a: "light.kitchen:on".to_string(),
            b: "switch.fan:on".to_string(),
            dt_sec: 30,
            n_a: 20,
            n_b: 15,
            n_ab: 14,
            confidence: 0.7,
            confidence_lb: 0.47,
            lift: 3.1,
            leverage: 0.47,
            conviction: None,
            baseline_p_b: 0.22,
            observation_period_days: 3,
            created_at_ms: 0,
            evidence: None,
            zone: None,
            context: None,
            extra: Map::new(),
        }
    }

    fn store() -> (tempfile::TempDir, CandidateStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = CandidateStore::open(&dir.path().join("candidates.json")).unwrap();
        (dir, store)
    }

    #[test]
    fn test_create_and_list() {
        let (_dir, mut store) = store();
        let outcome = store.create_from_rule(&rule(), "habitus", 1_000).unwrap();
        let CreateOutcome::Created(candidate) = outcome else {
            panic!("expected creation");
        };
        assert_eq!(candidate.state, CandidateState::Pending);
        assert_eq!(candidate.metadata.discovery_method, "habitus");
        assert_eq!(store.list(None).len(), 1);
        assert_eq!(store.list(Some(CandidateState::Pending)).len(), 1);
        assert!(store.list(Some(CandidateState::Accepted)).is_empty());
    }

    #[test]
    fn test_accept_is_terminal() {
        let (_dir, mut store) = store();
        let CreateOutcome::Created(candidate) =
            store.create_from_rule(&rule(), "habitus", 1_000).unwrap()
        else {
            panic!()
        };

        let decided = store
            .decide(&candidate.candidate_id, Decision::Accepted, None, 2_000)
            .unwrap();
        assert_eq!(decided.state, CandidateState::Accepted);
        assert_eq!(decided.updated_at_ms, 2_000);

        // Re-deciding a terminal candidate is a conflict
        let err = store
            .decide(&candidate.candidate_id, Decision::Dismissed, None, 3_000)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_eq!(
            store.get(&candidate.candidate_id).unwrap().state,
            CandidateState::Accepted
        );
    }

    #[test]
    fn test_dismissal_dedupe_is_sticky() {
        // I5 / S5: a dismissed pattern is never re-created
        let (_dir, mut store) = store();
        let CreateOutcome::Created(candidate) =
            store.create_from_rule(&rule(), "habitus", 1_000).unwrap()
        else {
            panic!()
        };
        store
            .decide(&candidate.candidate_id, Decision::Dismissed, Some("too noisy".into()), 2_000)
            .unwrap();

        // The miner re-discovers the same pattern
        let outcome = store.create_from_rule(&rule(), "habitus", 3_000).unwrap();
        assert_eq!(
            outcome,
            CreateOutcome::AlreadyDecided {
                pattern_id: rule().pattern_id(),
                state: CandidateState::Dismissed,
            }
        );
        assert_eq!(store.len(), 1);
        // The dismissed candidate is unchanged
        let stored = store.get(&candidate.candidate_id).unwrap();
        assert_eq!(stored.state, CandidateState::Dismissed);
        assert_eq!(stored.updated_at_ms, 2_000);
    }

    #[test]
    fn test_pending_dedupe() {
        let (_dir, mut store) = store();
        let CreateOutcome::Created(candidate) =
            store.create_from_rule(&rule(), "habitus", 1_000).unwrap()
        else {
            panic!()
        };
        let outcome = store.create_from_rule(&rule(), "habitus", 2_000).unwrap();
        assert_eq!(
            outcome,
            CreateOutcome::AlreadyPending {
                candidate_id: candidate.candidate_id,
            }
        );
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_decisions_survive_restart() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("candidates.json");
        let candidate_id = {
            let mut store = CandidateStore::open(&path).unwrap();
            let CreateOutcome::Created(candidate) =
                store.create_from_rule(&rule(), "habitus", 1_000).unwrap()
            else {
                panic!()
            };
            store
                .decide(&candidate.candidate_id, Decision::Dismissed, None, 2_000)
                .unwrap();
            candidate.candidate_id
        };

        // Fresh process: dismissal still sticks
        let mut store = CandidateStore::open(&path).unwrap();
        assert_eq!(
            store.get(&candidate_id).unwrap().state,
            CandidateState::Dismissed
        );
        let outcome = store.create_from_rule(&rule(), "habitus", 9_000).unwrap();
        assert!(matches!(outcome, CreateOutcome::AlreadyDecided { .. }));
    }

    #[test]
    fn test_unknown_candidate_is_not_found() {
        let (_dir, mut store) = store();
        let err = store
            .decide("cand_ghost", Decision::Accepted, None, 1_000)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_lifecycle_events_reach_dispatcher() {
        let (_dir, mut store) = store();
        let dispatcher = Arc::new(Dispatcher::new(16));
        let sub = dispatcher.subscribe("test");
        store.set_dispatcher(dispatcher);

        let CreateOutcome::Created(candidate) =
            store.create_from_rule(&rule(), "habitus", 1_000).unwrap()
        else {
            panic!()
        };
        store
            .decide(&candidate.candidate_id, Decision::Accepted, None, 2_000)
            .unwrap();

        let tags: Vec<&str> = sub.drain().iter().map(|e| e.tag()).collect();
        assert_eq!(tags, vec!["candidate_created", "candidate_accepted"]);
    }

    #[test]
    fn test_unknown_fields_survive_restart() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("candidates.json");
        {
            let mut store = CandidateStore::open(&path).unwrap();
            store.create_from_rule(&rule(), "habitus", 1_000).unwrap();
        }
        // A newer writer adds a field
        let mut parsed: Vec<serde_json::Value> =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        parsed[0]["future_field"] = serde_json::json!(42);
        std::fs::write(&path, serde_json::to_string(&parsed).unwrap()).unwrap();

        // We rewrite the file and the field survives
        let mut store = CandidateStore::open(&path).unwrap();
        let candidate_id = store.list(None)[0].candidate_id.clone();
        store
            .decide(&candidate_id, Decision::Accepted, None, 2_000)
            .unwrap();
        let parsed: Vec<serde_json::Value> =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(parsed[0]["future_field"], 42);
    }
}
