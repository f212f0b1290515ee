//! Test harness
//!
//! Isolated engine and store instances per test, each on its own temp
//! directory, cleaned up on drop.

use std::path::PathBuf;

use hearth_core::{CoreConfig, Engine, GraphConfig, GraphStore, MiningConfig};
use tempfile::TempDir;

/// Mining thresholds reduced so small fixtures produce rules.
pub fn relaxed_mining() -> MiningConfig {
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

/// An engine bound to a temp data directory.
pub struct TestEngine {
    _dir: TempDir,
    /// The engine under test
    pub engine: Engine,
    /// Data directory path, for reopening stores directly
    pub data_dir: PathBuf,
}

impl TestEngine {
    /// Engine with default configuration.
    pub fn new() -> Self {
        Self::with_config(CoreConfig::default())
    }

    /// Engine with reduced mining thresholds.
    pub fn relaxed() -> Self {
        Self::with_config(CoreConfig {
            miner: relaxed_mining(),
            ..Default::default()
        })
    }

    /// Engine with an explicit configuration (data dir is overridden).
    pub fn with_config(mut config: CoreConfig) -> Self {
        let dir = TempDir::new().expect("temp dir");
        let data_dir = dir.path().to_path_buf();
        config.data_dir = Some(data_dir.clone());
        let engine = Engine::open(config).expect("engine open");
        Self {
            _dir: dir,
            engine,
            data_dir,
        }
    }
}

impl Default for TestEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// A bare graph store on a temp directory.
pub struct TestGraph {
    _dir: TempDir,
    /// The store under test
    pub store: GraphStore,
}

impl TestGraph {
    /// Store with default capacity bounds.
    pub fn new() -> Self {
        Self::with_config(GraphConfig::default())
    }

    /// Store with explicit bounds.
    pub fn with_config(config: GraphConfig) -> Self {
        let dir = TempDir::new().expect("temp dir");
        let store = GraphStore::open(&dir.path().join("graph.db"), config).expect("store open");
        Self { _dir: dir, store }
    }
}

impl Default for TestGraph {
    fn default() -> Self {
        Self::new()
    }
}
