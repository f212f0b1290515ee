//! Brain Graph
//!
//! Bounded, time-decayed property graph over the household: entities,
//! zones, devices, and concepts as nodes; `in_zone`, `affects`,
//! `triggered_by` and friends as edges. Salience decays exponentially and
//! pruning keeps the graph inside hard capacity bounds, so it stays a
//! working set rather than an archive.

mod api;
mod migrations;
mod model;
mod store;

pub use api::{
    GetNodesPage, GetStateFilters, GetStateResult, GraphApi, NodeSort, PatternSummary, SortOrder,
};
pub use migrations::{MIGRATIONS, Migration, apply_migrations};
pub use model::{
    EdgeType, GraphEdge, GraphNode, NodeKind, Provenance, edge_id, effective_value, redact_pii,
};
pub use store::{GraphStore, GraphStoreConfig, PruneReport, Result, StorageError, StoreStats};
