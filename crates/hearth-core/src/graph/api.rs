//! Transport-agnostic graph query contracts
//!
//! The shapes a collaborator (HTTP, IPC, CLI) exposes to users: filtered
//! state dumps, paged node listings, and mined-pattern summaries. Limits
//! are clamped here so no transport can ask the store for more than the
//! documented bounds.

use serde::{Deserialize, Serialize};

use crate::cancel::CancelToken;
use crate::miner::Rule;

use super::model::{EdgeType, GraphEdge, GraphNode, NodeKind};
use super::store::{GraphStore, Result, StorageError};

/// Hard ceiling on nodes returned by a state query.
const MAX_STATE_NODES: usize = 500;
/// Hard ceiling on edges returned by a state query.
const MAX_STATE_EDGES: usize = 1500;
/// Hard ceiling on page size for node listings.
const MAX_PER_PAGE: usize = 100;
/// Hard ceiling on pattern summaries.
const MAX_PATTERNS: usize = 20;

// ============================================================================
// GET STATE
// ============================================================================

/// Filters accepted by [`GraphApi::get_state`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GetStateFilters {
    /// Restrict to these node kinds
    pub kinds: Option<Vec<NodeKind>>,
    /// Restrict to these domains
    pub domains: Option<Vec<String>>,
    /// Center node for a neighborhood query
    pub center: Option<String>,
    /// Neighborhood radius, 1..=3 (default 1 when `center` is set)
    pub hops: Option<u8>,
    /// Node limit, clamped to 500
    pub limit_nodes: Option<usize>,
    /// Edge limit, clamped to 1500
    pub limit_edges: Option<usize>,
}

/// Result of a state query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetStateResult {
    /// Matching nodes
    pub nodes: Vec<GraphNode>,
    /// Matching edges
    pub edges: Vec<GraphEdge>,
    /// When this snapshot was generated
    pub generated_at_ms: i64,
}

// ============================================================================
// GET NODES (PAGED)
// ============================================================================

/// Sort key for node listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeSort {
    /// Order by raw score
    #[default]
    Score,
    /// Order by label
    Label,
    /// Order by last write
    UpdatedAt,
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    /// Ascending
    Asc,
    /// Descending
    #[default]
    Desc,
}

/// One page of nodes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetNodesPage {
    /// Page contents
    pub nodes: Vec<GraphNode>,
    /// 1-based page number
    pub page: usize,
    /// Page size after clamping
    pub per_page: usize,
    /// Total nodes in the store
    pub total: usize,
}

// ============================================================================
// PATTERNS
// ============================================================================

/// Compact view of a mined rule for graph consumers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternSummary {
    /// Antecedent event key
    pub a: String,
    /// Consequent event key
    pub b: String,
    /// Window in seconds
    pub dt_sec: u32,
    /// P(B|A)
    pub confidence: f64,
    /// Lift over baseline
    pub lift: f64,
    /// Combined ranking score
    pub score: f64,
}

impl From<&Rule> for PatternSummary {
    fn from(rule: &Rule) -> Self {
        Self {
            a: rule.a.clone(),
            b: rule.b.clone(),
            dt_sec: rule.dt_sec,
            confidence: rule.confidence,
            lift: rule.lift,
            score: rule.score(),
        }
    }
}

// ============================================================================
// API
// ============================================================================

/// Query facade over a [`GraphStore`].
pub struct GraphApi<'a> {
    store: &'a GraphStore,
}

impl<'a> GraphApi<'a> {
    /// Wrap a store.
    pub fn new(store: &'a GraphStore) -> Self {
        Self { store }
    }

    /// Filtered snapshot of the graph (§6.2 `GetState`).
    ///
    /// With `center` set this is a neighborhood query; a center missing
    /// from the graph yields an empty snapshot rather than an error, so
    /// empty graphs answer queries gracefully.
    pub fn get_state(
        &self,
        filters: &GetStateFilters,
        now_ms: i64,
        cancel: &CancelToken,
    ) -> Result<GetStateResult> {
        let limit_nodes = filters
            .limit_nodes
            .unwrap_or(MAX_STATE_NODES)
            .min(MAX_STATE_NODES);
        let limit_edges = filters
            .limit_edges
            .unwrap_or(MAX_STATE_EDGES)
            .min(MAX_STATE_EDGES);

        let (nodes, edges) = match &filters.center {
            Some(center) => {
                let hops = filters.hops.unwrap_or(1);
                match self.store.neighborhood(
                    center,
                    hops,
                    Some(limit_nodes),
                    Some(limit_edges),
                    now_ms,
                    cancel,
                ) {
                    Ok(pair) => pair,
                    Err(StorageError::NotFound(_)) => (Vec::new(), Vec::new()),
                    Err(e) => return Err(e),
                }
            }
            None => {
                let nodes = self.store.get_nodes(
                    filters.kinds.as_deref(),
                    filters.domains.as_deref(),
                    Some(limit_nodes),
                )?;
                let edges = self.store.get_edges(None, None, None, Some(limit_edges))?;
                (nodes, edges)
            }
        };

        Ok(GetStateResult {
            nodes,
            edges,
            generated_at_ms: now_ms,
        })
    }

    /// Paged node listing (§6.2 `GetNodes`).
    pub fn get_nodes_page(
        &self,
        page: usize,
        per_page: usize,
        sort: NodeSort,
        order: SortOrder,
    ) -> Result<GetNodesPage> {
        let page = page.max(1);
        let per_page = per_page.clamp(1, MAX_PER_PAGE);

        let mut nodes = self.store.get_nodes(None, None, None)?;
        let total = nodes.len();

        nodes.sort_by(|a, b| {
            let ord = match sort {
                NodeSort::Score => a
                    .score
                    .partial_cmp(&b.score)
                    .unwrap_or(std::cmp::Ordering::Equal),
                NodeSort::Label => a.label.cmp(&b.label),
                NodeSort::UpdatedAt => a.updated_at_ms.cmp(&b.updated_at_ms),
            };
            match order {
                SortOrder::Asc => ord,
                SortOrder::Desc => ord.reverse(),
            }
        });

        let start = (page - 1).saturating_mul(per_page).min(total);
        let end = (start + per_page).min(total);
        Ok(GetNodesPage {
            nodes: nodes[start..end].to_vec(),
            page,
            per_page,
            total,
        })
    }

    /// Top mined patterns (§6.2 `Patterns`), at most 20.
    pub fn patterns(rules: &[Rule], limit: usize) -> Vec<PatternSummary> {
        let limit = limit.clamp(1, MAX_PATTERNS);
        let mut summaries: Vec<PatternSummary> = rules.iter().map(PatternSummary::from).collect();
        summaries.sort_by(|x, y| {
            y.score
                .partial_cmp(&x.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        summaries.truncate(limit);
        summaries
    }

    /// Edges of a given type touching a node, ordered by weight.
    pub fn edges_of(
        &self,
        node_id: &str,
        edge_type: EdgeType,
        limit: Option<usize>,
    ) -> Result<Vec<GraphEdge>> {
        self.store
            .get_edges(Some(node_id), None, Some(&[edge_type]), limit)
    }
}
