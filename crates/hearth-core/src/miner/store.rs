//! Miner persistence
//!
//! Three files under the miner directory:
//! - `discovered_rules.json` - rule list, overwritten on every run
//! - `events_cache.jsonl` - most recent events for replay/debugging
//! - `miner_state.json` - `{last_run_ms, total_events_processed}`
//!
//! Unknown fields in any of these files survive a read-modify-write
//! cycle, so newer writers can extend the layout without breaking us.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::event::Event;

use super::Result;
use super::model::Rule;

/// Events kept in the on-disk cache.
const MAX_CACHED_EVENTS: usize = 10_000;

/// Persistent miner state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MinerState {
    /// When the last successful run completed
    pub last_run_ms: Option<i64>,
    /// Events processed by the last run
    pub total_events_processed: u64,
    /// Unknown fields, preserved
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// On-disk rules file layout.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct RulesFile {
    version: u32,
    generated_at_ms: i64,
    total_rules: usize,
    rules: Vec<Rule>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

/// File-backed store for rules, replay events, and miner state.
#[derive(Debug)]
pub struct MinerFileStore {
    rules_path: PathBuf,
    events_path: PathBuf,
    state_path: PathBuf,
    rules: Vec<Rule>,
    state: MinerState,
    rules_extra: Map<String, Value>,
}

impl MinerFileStore {
    /// Open the store under `dir`, loading any existing files.
    pub fn open(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        let mut store = Self {
            rules_path: dir.join("discovered_rules.json"),
            events_path: dir.join("events_cache.jsonl"),
            state_path: dir.join("miner_state.json"),
            rules: Vec::new(),
            state: MinerState::default(),
            rules_extra: Map::new(),
        };
        store.load_state();
        store.load_rules();
        Ok(store)
    }

    fn load_state(&mut self) {
        if !self.state_path.exists() {
            return;
        }
        match std::fs::read_to_string(&self.state_path)
            .map_err(display_to_string)
            .and_then(|raw| serde_json::from_str::<MinerState>(&raw).map_err(display_to_string))
        {
            Ok(state) => self.state = state,
            Err(e) => warn!(error = %e, "failed to load miner state"),
        }
    }

    fn load_rules(&mut self) {
        if !self.rules_path.exists() {
            return;
        }
        match std::fs::read_to_string(&self.rules_path)
            .map_err(display_to_string)
            .and_then(|raw| serde_json::from_str::<RulesFile>(&raw).map_err(display_to_string))
        {
            Ok(file) => {
                self.rules = file.rules;
                self.rules_extra = file.extra;
            }
            Err(e) => {
                warn!(error = %e, "failed to load rules file");
                self.rules = Vec::new();
            }
        }
    }

    /// Replace and persist the rule set. The file is overwritten whole;
    /// nothing is written when serialization fails, so a failed run never
    /// clobbers the previous rules.
    pub fn save_rules(&mut self, rules: Vec<Rule>, now_ms: i64) -> Result<()> {
        let file = RulesFile {
            version: 1,
            generated_at_ms: now_ms,
            total_rules: rules.len(),
            rules,
            extra: self.rules_extra.clone(),
        };
        let serialized = serde_json::to_string_pretty(&file)?;
        std::fs::write(&self.rules_path, serialized)?;
        self.rules = file.rules;
        info!(rules = self.rules.len(), path = %self.rules_path.display(), "saved rules");
        Ok(())
    }

    /// Current rules, best score first.
    pub fn rules(&self) -> Vec<Rule> {
        let mut rules = self.rules.clone();
        rules.sort_by(|x, y| {
            y.score()
                .partial_cmp(&x.score())
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        rules
    }

    /// Cache the processed events (most recent 10 000) as JSONL.
    pub fn cache_events(&mut self, events: &[Event]) -> Result<()> {
        let start = events.len().saturating_sub(MAX_CACHED_EVENTS);
        let mut out = String::new();
        for event in &events[start..] {
            out.push_str(&serde_json::to_string(event)?);
            out.push('\n');
        }
        std::fs::write(&self.events_path, out)?;
        self.state.total_events_processed = (events.len() - start) as u64;
        self.save_state()
    }

    /// Load cached events back, skipping unparsable lines.
    pub fn load_cached_events(&self) -> Result<Vec<Event>> {
        if !self.events_path.exists() {
            return Ok(Vec::new());
        }
        let raw = std::fs::read_to_string(&self.events_path)?;
        let mut events = Vec::new();
        for line in raw.lines().filter(|l| !l.trim().is_empty()) {
            match serde_json::from_str::<Event>(line) {
                Ok(event) => events.push(event),
                Err(e) => warn!(error = %e, "skipping bad cached event line"),
            }
        }
        Ok(events)
    }

    /// Record a completed run.
    pub fn mark_run(&mut self, now_ms: i64) -> Result<()> {
        self.state.last_run_ms = Some(now_ms);
        self.save_state()
    }

    /// Persistent miner state.
    pub fn state(&self) -> &MinerState {
        &self.state
    }

    fn save_state(&self) -> Result<()> {
        let serialized = serde_json::to_string_pretty(&self.state)?;
        std::fs::write(&self.state_path, serialized)?;
        Ok(())
    }

    /// Remove every persisted file and reset in-memory state.
    pub fn clear(&mut self) -> Result<()> {
        for path in [&self.rules_path, &self.events_path, &self.state_path] {
            if path.exists() {
                std::fs::remove_file(path)?;
            }
        }
        self.rules.clear();
        self.rules_extra.clear();
        self.state = MinerState::default();
        Ok(())
    }
}

fn display_to_string<E: std::fmt::Display>(e: E) -> String {
    e.to_string()
}
