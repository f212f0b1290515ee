//! Habitus Miner
//!
//! Temporal rule mining over the household event stream: discovers
//! patterns of the form "when A happens, B usually follows within Δt",
//! scores them with a Wilson lower bound, lift, and leverage, and hands
//! the survivors to the candidate store. Supports zone-scoped runs with
//! per-zone governance and optional context stratification.

mod mining;
mod model;
mod service;
mod store;
mod zone;

pub use mining::{
    MiningOutcome, MiningStats, latency_quantiles, mine_rules, mine_with_context,
    wilson_lower_bound,
};
pub use model::{MiningConfig, Rule, RuleEvidence};
pub use service::{
    HabitusMiner, MiningReport, MiningStatus, RuleExplanation, RulesFilter, RulesSummary,
};
pub use store::{MinerFileStore, MinerState};
pub use zone::{
    SafetyBlocked, TopSuggestion, ZoneGovernance, ZoneMiner, ZoneMiningResult, ZoneMiningStats,
};

use crate::error::{CoreError, ErrorKind};

/// Miner error type
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum MinerError {
    /// Run rejected inside the throttle window
    #[error("mining throttled; retry in {retry_in_sec}s")]
    Throttled {
        /// Seconds until the next run is allowed
        retry_in_sec: u64,
    },
    /// Run cancelled cooperatively
    #[error("mining cancelled")]
    Cancelled,
    /// Persistence failure in the miner file store
    #[error("miner store IO error: {0}")]
    Io(#[from] std::io::Error),
    /// Malformed persisted state
    #[error("miner store parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

impl CoreError for MinerError {
    fn kind(&self) -> ErrorKind {
        match self {
            MinerError::Throttled { .. } => ErrorKind::Throttled,
            MinerError::Cancelled => ErrorKind::Cancelled,
            MinerError::Io(_) => ErrorKind::StorageFailure,
            MinerError::Parse(_) => ErrorKind::StorageFailure,
        }
    }
}

/// Miner result type
pub type Result<T> = std::result::Result<T, MinerError>;
