//! Configuration
//!
//! One `CoreConfig` covering every recognised option, grouped by
//! subsystem. Loaded from a JSON file; unknown fields are ignored so older
//! binaries can read configs written by newer ones. Every field has a
//! default, so an empty object (or no file at all) yields a working
//! configuration.

use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::miner::MiningConfig;

/// Configuration error type
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// IO error reading the config file
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// Malformed JSON in the config file
    #[error("Invalid config: {0}")]
    Parse(#[from] serde_json::Error),
    /// Platform directories could not be resolved
    #[error("Could not determine project directories")]
    NoProjectDirs,
}

impl crate::error::CoreError for ConfigError {
    fn kind(&self) -> crate::error::ErrorKind {
        match self {
            ConfigError::Parse(_) => crate::error::ErrorKind::InvalidInput,
            _ => crate::error::ErrorKind::StorageFailure,
        }
    }
}

// ============================================================================
// GRAPH
// ============================================================================

/// Bounds and decay settings for the brain graph store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    /// Capacity bound for nodes
    pub max_nodes: usize,
    /// Capacity bound for edges
    pub max_edges: usize,
    /// Prune threshold on effective (decayed) node score
    pub node_min_score: f64,
    /// Prune threshold on effective (decayed) edge weight
    pub edge_min_weight: f64,
    /// Node score half-life in hours
    pub node_half_life_h: f64,
    /// Edge weight half-life in hours
    pub edge_half_life_h: f64,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            max_nodes: 500,
            max_edges: 1500,
            node_min_score: 0.1,
            edge_min_weight: 0.1,
            node_half_life_h: 24.0,
            edge_half_life_h: 12.0,
        }
    }
}

// ============================================================================
// NEURONS
// ============================================================================

/// Settings for the neural pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NeuronSettings {
    /// Mood snapshots kept for smoothing
    pub mood_history: usize,
    /// Trailing snapshots averaged into each raw mood value
    pub smoothing_window: usize,
    /// Minutes until a generated suggestion expires
    pub suggestion_ttl_min: i64,
}

impl Default for NeuronSettings {
    fn default() -> Self {
        Self {
            mood_history: 10,
            smoothing_window: 3,
            suggestion_ttl_min: 30,
        }
    }
}

// ============================================================================
// SYNAPSES
// ============================================================================

/// Settings for the synapse network.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SynapseSettings {
    /// Hebbian learning rate (eta)
    pub learning_rate: f64,
    /// Weight decay per day of inactivity
    pub decay_rate: f64,
    /// Connections below this absolute weight are pruned
    pub prune_threshold: f64,
    /// Magnitude of the feedback reward signal
    pub reward_magnitude: f64,
    /// Hours of inactivity before decay applies
    pub inactivity_hours: f64,
}

impl Default for SynapseSettings {
    fn default() -> Self {
        Self {
            learning_rate: 0.01,
            decay_rate: 0.001,
            prune_threshold: 0.01,
            reward_magnitude: 0.1,
            inactivity_hours: 24.0,
        }
    }
}

// ============================================================================
// DISPATCH
// ============================================================================

/// Settings for the in-process dispatcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchSettings {
    /// Bounded queue capacity per subscriber
    pub queue_capacity: usize,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self { queue_capacity: 256 }
    }
}

// ============================================================================
// EVENTS
// ============================================================================

/// Settings for event ingress.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EventSettings {
    /// Events retained in the replay ring for the miner
    pub replay_capacity: usize,
    /// How far backwards a timestamp may jump before rejection (ms)
    pub monotonic_tolerance_ms: i64,
    /// Bound on the per-key debounce table
    pub debounce_keys: usize,
}

impl Default for EventSettings {
    fn default() -> Self {
        Self {
            replay_capacity: 10_000,
            monotonic_tolerance_ms: 5 * 60 * 1000,
            debounce_keys: 4096,
        }
    }
}

// ============================================================================
// CORE CONFIG
// ============================================================================

/// Root configuration for the Hearth core.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// Data directory; platform default when absent
    pub data_dir: Option<PathBuf>,
    /// Household local-time offset from UTC, in hours. Event context
    /// tags and the time-of-day neuron both bucket with this offset, so
    /// mined `time_of_day` strata and the pipeline agree on what
    /// "evening" means.
    pub utc_offset_hours: f64,
    /// Brain graph store
    pub graph: GraphConfig,
    /// Habitus miner (full mining parameters plus throttle)
    pub miner: MiningConfig,
    /// Neural pipeline
    pub neurons: NeuronSettings,
    /// Synapse network
    pub synapses: SynapseSettings,
    /// Dispatcher
    pub dispatch: DispatchSettings,
    /// Event ingress
    pub events: EventSettings,
}

impl CoreConfig {
    /// Load configuration from a JSON file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Load from `path` when it exists, defaults otherwise.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Resolve the data directory, creating it if necessary.
    ///
    /// Uses the configured path when present, otherwise the platform data
    /// dir. On Unix the directory is restricted to owner-only.
    pub fn resolve_data_dir(&self) -> Result<PathBuf, ConfigError> {
        let dir = match &self.data_dir {
            Some(p) => p.clone(),
            None => {
                let proj_dirs =
                    ProjectDirs::from("io", "hearth", "core").ok_or(ConfigError::NoProjectDirs)?;
                proj_dirs.data_dir().to_path_buf()
            }
        };
        std::fs::create_dir_all(&dir)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o700);
            let _ = std::fs::set_permissions(&dir, perms);
        }
        Ok(dir)
    }
}
