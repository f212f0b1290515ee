//! SQLite-backed graph store with bounded capacity and automatic pruning
//!
//! Single-writer, many-reader: one writer connection and one reader
//! connection, each behind a mutex. Every read operation runs inside a
//! transaction so long reads observe a consistent snapshot. Neighborhood
//! expansion is strictly batched - two edge queries per hop plus one bulk
//! node fetch and one bulk edge fetch at the end; per-node follow-up
//! queries are not permitted here.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use rusqlite::{Connection, OptionalExtension, params};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::cancel::CancelToken;
use crate::error::{CoreError, ErrorKind};

use super::migrations;
use super::model::{EdgeType, GraphEdge, GraphNode, NodeKind, Provenance};

/// Store configuration is the graph section of the core config.
pub type GraphStoreConfig = crate::config::GraphConfig;

/// Delay before the single internal retry of a transient write failure.
const WRITE_RETRY_DELAY: Duration = Duration::from_millis(250);

// ============================================================================
// ERROR TYPES
// ============================================================================

/// Storage error type
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
    /// Node not found
    #[error("Node not found: {0}")]
    NotFound(String),
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// Out-of-range parameter
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
    /// Initialization error
    #[error("Initialization error: {0}")]
    Init(String),
    /// Operation cancelled cooperatively
    #[error("Operation cancelled")]
    Cancelled,
}

impl CoreError for StorageError {
    fn kind(&self) -> ErrorKind {
        match self {
            StorageError::Database(_) | StorageError::Io(_) | StorageError::Init(_) => {
                ErrorKind::StorageFailure
            }
            StorageError::NotFound(_) => ErrorKind::NotFound,
            StorageError::InvalidParameter(_) => ErrorKind::InvalidInput,
            StorageError::Cancelled => ErrorKind::Cancelled,
        }
    }
}

/// Storage result type
pub type Result<T> = std::result::Result<T, StorageError>;

// ============================================================================
// REPORT TYPES
// ============================================================================

/// Counts removed by a prune pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PruneReport {
    /// Nodes removed (weak plus capacity trim)
    pub nodes_removed: usize,
    /// Edges removed (weak, capacity trim, and orphaned)
    pub edges_removed: usize,
}

/// Current store statistics.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct StoreStats {
    /// Node count
    pub nodes: usize,
    /// Edge count
    pub edges: usize,
    /// Node capacity bound
    pub max_nodes: usize,
    /// Edge capacity bound
    pub max_edges: usize,
}

// ============================================================================
// STORE
// ============================================================================

/// SQLite-backed bounded graph store.
pub struct GraphStore {
    writer: Mutex<Connection>,
    reader: Mutex<Connection>,
    config: GraphStoreConfig,
}

impl GraphStore {
    /// Apply PRAGMAs to a connection.
    fn configure_connection(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA temp_store = MEMORY;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )?;
        Ok(())
    }

    /// Open (or create) the store at `path`.
    pub fn open(path: &Path, config: GraphStoreConfig) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let writer_conn = Connection::open(path)?;
        #[cfg(unix)]
        if path.exists() {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            let _ = std::fs::set_permissions(path, perms);
        }
        Self::configure_connection(&writer_conn)?;
        migrations::apply_migrations(&writer_conn)?;

        let reader_conn = Connection::open(path)?;
        Self::configure_connection(&reader_conn)?;

        info!(path = %path.display(), "brain graph store opened");
        Ok(Self {
            writer: Mutex::new(writer_conn),
            reader: Mutex::new(reader_conn),
            config,
        })
    }

    /// The store's capacity/decay configuration.
    pub fn config(&self) -> &GraphStoreConfig {
        &self.config
    }

    /// Run a write closure with a single retry on transient failure.
    fn with_write<T>(&self, op: impl Fn(&Connection) -> rusqlite::Result<T>) -> Result<T> {
        let writer = self
            .writer
            .lock()
            .map_err(|_| StorageError::Init("writer lock poisoned".into()))?;
        match op(&writer) {
            Ok(v) => Ok(v),
            Err(first) if is_transient(&first) => {
                warn!(error = %first, "transient write failure, retrying once");
                std::thread::sleep(WRITE_RETRY_DELAY);
                op(&writer).map_err(StorageError::Database)
            }
            Err(e) => Err(StorageError::Database(e)),
        }
    }

    // ------------------------------------------------------------------
    // Upserts
    // ------------------------------------------------------------------

    /// Insert or update a node. Idempotent on `id`.
    pub fn upsert_node(&self, node: &GraphNode) -> Result<bool> {
        let rows = self.with_write(|conn| {
            conn.execute(
                "INSERT OR REPLACE INTO nodes
                 (id, kind, label, updated_at_ms, score, domain, source_json, tags_json, meta_json)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    node.id,
                    node.kind.as_str(),
                    node.label,
                    node.updated_at_ms,
                    node.score,
                    node.domain,
                    node.source
                        .as_ref()
                        .map(|s| serde_json::to_string(s).unwrap_or_default()),
                    if node.tags.is_empty() {
                        None
                    } else {
                        serde_json::to_string(&node.tags).ok()
                    },
                    if node.meta.is_empty() {
                        None
                    } else {
                        serde_json::to_string(&node.meta).ok()
                    },
                ],
            )
        })?;
        Ok(rows > 0)
    }

    /// Insert or update an edge. Idempotent on `id`.
    pub fn upsert_edge(&self, edge: &GraphEdge) -> Result<bool> {
        let rows = self.with_write(|conn| {
            conn.execute(
                "INSERT OR REPLACE INTO edges
                 (id, from_node, to_node, edge_type, updated_at_ms, weight, evidence_json, meta_json)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    edge.id,
                    edge.from,
                    edge.to,
                    edge.edge_type.as_str(),
                    edge.updated_at_ms,
                    edge.weight,
                    edge.evidence
                        .as_ref()
                        .map(|e| serde_json::to_string(e).unwrap_or_default()),
                    if edge.meta.is_empty() {
                        None
                    } else {
                        serde_json::to_string(&edge.meta).ok()
                    },
                ],
            )
        })?;
        Ok(rows > 0)
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// Fetch a node by id.
    pub fn get_node(&self, node_id: &str) -> Result<Option<GraphNode>> {
        let reader = self
            .reader
            .lock()
            .map_err(|_| StorageError::Init("reader lock poisoned".into()))?;
        reader
            .query_row("SELECT * FROM nodes WHERE id = ?1", params![node_id], node_from_row)
            .optional()
            .map_err(StorageError::Database)
    }

    /// Fetch nodes with optional kind/domain filters, ordered by raw
    /// score descending.
    pub fn get_nodes(
        &self,
        kinds: Option<&[NodeKind]>,
        domains: Option<&[String]>,
        limit: Option<usize>,
    ) -> Result<Vec<GraphNode>> {
        let mut reader = self
            .reader
            .lock()
            .map_err(|_| StorageError::Init("reader lock poisoned".into()))?;
        let tx = reader.transaction()?;

        let mut query = String::from("SELECT * FROM nodes WHERE 1=1");
        let mut args: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(kinds) = kinds.filter(|k| !k.is_empty()) {
            query.push_str(&format!(" AND kind IN ({})", placeholders(kinds.len())));
            for kind in kinds {
                args.push(Box::new(kind.as_str().to_string()));
            }
        }
        if let Some(domains) = domains.filter(|d| !d.is_empty()) {
            query.push_str(&format!(" AND domain IN ({})", placeholders(domains.len())));
            for domain in domains {
                args.push(Box::new(domain.clone()));
            }
        }
        query.push_str(" ORDER BY score DESC, updated_at_ms DESC");
        if let Some(limit) = limit {
            query.push_str(" LIMIT ?");
            args.push(Box::new(limit as i64));
        }

        let nodes = {
            let mut stmt = tx.prepare(&query)?;
            let rows = stmt.query_map(rusqlite::params_from_iter(args.iter().map(|b| b.as_ref())), node_from_row)?;
            rows.collect::<rusqlite::Result<Vec<_>>>()?
        };
        tx.finish()?;
        Ok(nodes)
    }

    /// Fetch edges with optional endpoint/type filters, ordered by raw
    /// weight descending.
    pub fn get_edges(
        &self,
        from: Option<&str>,
        to: Option<&str>,
        types: Option<&[EdgeType]>,
        limit: Option<usize>,
    ) -> Result<Vec<GraphEdge>> {
        let mut reader = self
            .reader
            .lock()
            .map_err(|_| StorageError::Init("reader lock poisoned".into()))?;
        let tx = reader.transaction()?;

        let mut query = String::from("SELECT * FROM edges WHERE 1=1");
        let mut args: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(from) = from {
            query.push_str(" AND from_node = ?");
            args.push(Box::new(from.to_string()));
        }
        if let Some(to) = to {
            query.push_str(" AND to_node = ?");
            args.push(Box::new(to.to_string()));
        }
        if let Some(types) = types.filter(|t| !t.is_empty()) {
            query.push_str(&format!(" AND edge_type IN ({})", placeholders(types.len())));
            for t in types {
                args.push(Box::new(t.as_str().to_string()));
            }
        }
        query.push_str(" ORDER BY weight DESC, updated_at_ms DESC");
        if let Some(limit) = limit {
            query.push_str(" LIMIT ?");
            args.push(Box::new(limit as i64));
        }

        let edges = {
            let mut stmt = tx.prepare(&query)?;
            let rows = stmt.query_map(rusqlite::params_from_iter(args.iter().map(|b| b.as_ref())), edge_from_row)?;
            rows.collect::<rusqlite::Result<Vec<_>>>()?
        };
        tx.finish()?;
        Ok(edges)
    }

    /// Entity ids connected to `zone_id` by an `in_zone` edge.
    pub fn zone_members(&self, zone_id: &str) -> Result<Vec<String>> {
        let edges = self.get_edges(None, Some(zone_id), Some(&[EdgeType::InZone]), None)?;
        Ok(edges.into_iter().map(|e| e.from).collect())
    }

    /// Ids of all `zone`-kind nodes.
    pub fn zone_ids(&self) -> Result<Vec<String>> {
        Ok(self
            .get_nodes(Some(&[NodeKind::Zone]), None, None)?
            .into_iter()
            .map(|n| n.id)
            .collect())
    }

    // ------------------------------------------------------------------
    // Neighborhood
    // ------------------------------------------------------------------

    /// Nodes and edges within `hops` of `center`, limits applied by
    /// salience. Every returned edge has both endpoints in the returned
    /// node set.
    ///
    /// Expansion is two bulk queries per hop (outbound ∪ inbound) plus a
    /// single bulk node fetch and a single bulk edge fetch at the end.
    pub fn neighborhood(
        &self,
        center: &str,
        hops: u8,
        max_nodes: Option<usize>,
        max_edges: Option<usize>,
        now_ms: i64,
        cancel: &CancelToken,
    ) -> Result<(Vec<GraphNode>, Vec<GraphEdge>)> {
        if !(1..=3).contains(&hops) {
            return Err(StorageError::InvalidParameter(format!(
                "hops must be in 1..=3, got {hops}"
            )));
        }

        let mut reader = self
            .reader
            .lock()
            .map_err(|_| StorageError::Init("reader lock poisoned".into()))?;
        let tx = reader.transaction()?;

        let center_exists: bool = tx
            .query_row("SELECT 1 FROM nodes WHERE id = ?1", params![center], |_| Ok(()))
            .optional()?
            .is_some();
        if !center_exists {
            return Err(StorageError::NotFound(center.to_string()));
        }

        let mut visited: HashSet<String> = HashSet::from([center.to_string()]);
        let mut current: Vec<String> = vec![center.to_string()];

        for _ in 0..hops {
            cancel.check().map_err(|_| StorageError::Cancelled)?;
            if current.is_empty() {
                break;
            }

            let ph = placeholders(current.len());
            let mut next_layer: HashSet<String> = HashSet::new();

            // Outbound then inbound, one bulk query each
            for (sql, pick_to) in [
                (format!("SELECT from_node, to_node FROM edges WHERE from_node IN ({ph})"), true),
                (format!("SELECT from_node, to_node FROM edges WHERE to_node IN ({ph})"), false),
            ] {
                let mut stmt = tx.prepare(&sql)?;
                let rows = stmt.query_map(
                    rusqlite::params_from_iter(current.iter()),
                    |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
                )?;
                for row in rows {
                    let (from, to) = row?;
                    let neighbor = if pick_to { to } else { from };
                    if !visited.contains(&neighbor) {
                        next_layer.insert(neighbor);
                    }
                }
            }

            visited.extend(next_layer.iter().cloned());
            current = next_layer.into_iter().collect();
        }

        // One bulk node fetch for the whole visited set
        let mut nodes: Vec<GraphNode> = {
            let ph = placeholders(visited.len());
            let mut stmt = tx.prepare(&format!("SELECT * FROM nodes WHERE id IN ({ph})"))?;
            let rows = stmt.query_map(rusqlite::params_from_iter(visited.iter()), node_from_row)?;
            rows.collect::<rusqlite::Result<Vec<_>>>()?
        };

        if let Some(max_nodes) = max_nodes {
            if nodes.len() > max_nodes {
                nodes.sort_by(|a, b| {
                    let sa = a.effective_score(now_ms, self.config.node_half_life_h);
                    let sb = b.effective_score(now_ms, self.config.node_half_life_h);
                    sb.partial_cmp(&sa)
                        .unwrap_or(std::cmp::Ordering::Equal)
                        .then(b.updated_at_ms.cmp(&a.updated_at_ms))
                });
                nodes.truncate(max_nodes);
            }
        }
        let final_ids: HashSet<&str> = nodes.iter().map(|n| n.id.as_str()).collect();

        cancel.check().map_err(|_| StorageError::Cancelled)?;

        // One bulk edge fetch restricted to the final node set
        let mut edges: Vec<GraphEdge> = {
            let ph = placeholders(final_ids.len());
            let sql = format!(
                "SELECT * FROM edges WHERE from_node IN ({ph}) AND to_node IN ({ph})"
            );
            let mut stmt = tx.prepare(&sql)?;
            let rows = stmt.query_map(
                rusqlite::params_from_iter(final_ids.iter().chain(final_ids.iter())),
                edge_from_row,
            )?;
            rows.collect::<rusqlite::Result<Vec<_>>>()?
        };

        if let Some(max_edges) = max_edges {
            if edges.len() > max_edges {
                edges.sort_by(|a, b| {
                    let wa = a.effective_weight(now_ms, self.config.edge_half_life_h);
                    let wb = b.effective_weight(now_ms, self.config.edge_half_life_h);
                    wb.partial_cmp(&wa)
                        .unwrap_or(std::cmp::Ordering::Equal)
                        .then(b.updated_at_ms.cmp(&a.updated_at_ms))
                });
                edges.truncate(max_edges);
            }
        }

        tx.finish()?;
        Ok((nodes, edges))
    }

    // ------------------------------------------------------------------
    // Pruning
    // ------------------------------------------------------------------

    /// Remove low-salience rows and enforce capacity bounds.
    ///
    /// Weak edges (`effective_weight < edge_min_weight`) go first, then
    /// the edge capacity trim; weak nodes (below threshold AND zero
    /// incident edges) next, then the node capacity trim, which also
    /// removes the trimmed nodes' edges. One full scan per table.
    pub fn prune(&self, now_ms: i64, cancel: &CancelToken) -> Result<PruneReport> {
        let mut writer = self
            .writer
            .lock()
            .map_err(|_| StorageError::Init("writer lock poisoned".into()))?;
        let tx = writer.transaction()?;
        let mut report = PruneReport::default();

        // ========== Single pass over edges ==========
        let mut all_edges: Vec<(String, f64, i64)> = Vec::new();
        let mut weak_edge_ids: Vec<String> = Vec::new();
        {
            let mut stmt = tx.prepare("SELECT id, weight, updated_at_ms FROM edges")?;
            let rows = stmt.query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, f64>(1)?,
                    row.get::<_, i64>(2)?,
                ))
            })?;
            for row in rows {
                let (id, weight, updated_at_ms) = row?;
                let effective = super::model::effective_value(
                    weight,
                    updated_at_ms,
                    now_ms,
                    self.config.edge_half_life_h,
                );
                if effective < self.config.edge_min_weight {
                    weak_edge_ids.push(id.clone());
                }
                all_edges.push((id, effective, updated_at_ms));
            }
        }

        cancel.check().map_err(|_| StorageError::Cancelled)?;

        report.edges_removed += delete_by_ids(&tx, "edges", &weak_edge_ids)?;
        let weak_set: HashSet<&String> = weak_edge_ids.iter().collect();
        let mut surviving: Vec<&(String, f64, i64)> =
            all_edges.iter().filter(|(id, _, _)| !weak_set.contains(id)).collect();

        if surviving.len() > self.config.max_edges {
            surviving.sort_by(|a, b| {
                b.1.partial_cmp(&a.1)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then(b.2.cmp(&a.2))
            });
            let trim: Vec<String> = surviving[self.config.max_edges..]
                .iter()
                .map(|(id, _, _)| id.clone())
                .collect();
            report.edges_removed += delete_by_ids(&tx, "edges", &trim)?;
        }

        cancel.check().map_err(|_| StorageError::Cancelled)?;

        // ========== Single pass over nodes ==========
        let mut all_nodes: Vec<(String, f64, i64)> = Vec::new();
        let mut weak_node_ids: Vec<String> = Vec::new();
        {
            let mut stmt = tx.prepare(
                "SELECT n.id, n.score, n.updated_at_ms,
                        (SELECT COUNT(*) FROM edges
                         WHERE from_node = n.id OR to_node = n.id) AS edge_count
                 FROM nodes n",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, f64>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, i64>(3)?,
                ))
            })?;
            for row in rows {
                let (id, score, updated_at_ms, edge_count) = row?;
                let effective = super::model::effective_value(
                    score,
                    updated_at_ms,
                    now_ms,
                    self.config.node_half_life_h,
                );
                if effective < self.config.node_min_score && edge_count == 0 {
                    weak_node_ids.push(id.clone());
                }
                all_nodes.push((id, effective, updated_at_ms));
            }
        }

        cancel.check().map_err(|_| StorageError::Cancelled)?;

        report.nodes_removed += delete_by_ids(&tx, "nodes", &weak_node_ids)?;
        let weak_set: HashSet<&String> = weak_node_ids.iter().collect();
        let mut surviving: Vec<&(String, f64, i64)> =
            all_nodes.iter().filter(|(id, _, _)| !weak_set.contains(id)).collect();

        if surviving.len() > self.config.max_nodes {
            surviving.sort_by(|a, b| {
                b.1.partial_cmp(&a.1)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then(b.2.cmp(&a.2))
            });
            let trim: Vec<String> = surviving[self.config.max_nodes..]
                .iter()
                .map(|(id, _, _)| id.clone())
                .collect();

            // Referential integrity: incident edges leave with their nodes
            for chunk in trim.chunks(256) {
                let ph = placeholders(chunk.len());
                let sql = format!(
                    "DELETE FROM edges WHERE from_node IN ({ph}) OR to_node IN ({ph})"
                );
                report.edges_removed += tx.execute(
                    &sql,
                    rusqlite::params_from_iter(chunk.iter().chain(chunk.iter())),
                )?;
            }
            report.nodes_removed += delete_by_ids(&tx, "nodes", &trim)?;
        }

        tx.commit()?;
        debug!(
            nodes_removed = report.nodes_removed,
            edges_removed = report.edges_removed,
            "prune complete"
        );
        Ok(report)
    }

    /// Current row counts and capacity bounds.
    pub fn stats(&self) -> Result<StoreStats> {
        let reader = self
            .reader
            .lock()
            .map_err(|_| StorageError::Init("reader lock poisoned".into()))?;
        let nodes: i64 = reader.query_row("SELECT COUNT(*) FROM nodes", [], |r| r.get(0))?;
        let edges: i64 = reader.query_row("SELECT COUNT(*) FROM edges", [], |r| r.get(0))?;
        Ok(StoreStats {
            nodes: nodes as usize,
            edges: edges as usize,
            max_nodes: self.config.max_nodes,
            max_edges: self.config.max_edges,
        })
    }
}

// ============================================================================
// ROW MAPPING
// ============================================================================

fn node_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<GraphNode> {
    let source_json: Option<String> = row.get("source_json")?;
    let tags_json: Option<String> = row.get("tags_json")?;
    let meta_json: Option<String> = row.get("meta_json")?;
    Ok(GraphNode {
        id: row.get("id")?,
        kind: NodeKind::parse_name(&row.get::<_, String>("kind")?),
        label: row.get("label")?,
        domain: row.get("domain")?,
        updated_at_ms: row.get("updated_at_ms")?,
        score: row.get("score")?,
        tags: tags_json
            .and_then(|t| serde_json::from_str(&t).ok())
            .unwrap_or_default(),
        source: source_json.and_then(|s| serde_json::from_str::<Provenance>(&s).ok()),
        meta: meta_json
            .and_then(|m| serde_json::from_str(&m).ok())
            .unwrap_or_default(),
    })
}

fn edge_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<GraphEdge> {
    let evidence_json: Option<String> = row.get("evidence_json")?;
    let meta_json: Option<String> = row.get("meta_json")?;
    Ok(GraphEdge {
        id: row.get("id")?,
        from: row.get("from_node")?,
        to: row.get("to_node")?,
        edge_type: EdgeType::parse_name(&row.get::<_, String>("edge_type")?),
        updated_at_ms: row.get("updated_at_ms")?,
        weight: row.get("weight")?,
        evidence: evidence_json.and_then(|e| serde_json::from_str::<Provenance>(&e).ok()),
        meta: meta_json
            .and_then(|m| serde_json::from_str(&m).ok())
            .unwrap_or_default(),
    })
}

fn placeholders(n: usize) -> String {
    let mut s = String::with_capacity(n * 2);
    for i in 0..n {
        if i > 0 {
            s.push(',');
        }
        s.push('?');
    }
    s
}

fn delete_by_ids(tx: &rusqlite::Transaction<'_>, table: &str, ids: &[String]) -> Result<usize> {
    let mut removed = 0;
    for chunk in ids.chunks(256) {
        let sql = format!("DELETE FROM {table} WHERE id IN ({})", placeholders(chunk.len()));
        removed += tx.execute(&sql, rusqlite::params_from_iter(chunk.iter()))?;
    }
    Ok(removed)
}

fn is_transient(err: &rusqlite::Error) -> bool {
    matches!(
        err.sqlite_error_code(),
        Some(rusqlite::ErrorCode::DatabaseBusy) | Some(rusqlite::ErrorCode::DatabaseLocked)
    )
}

// ============================================================================
// TESTS
// ============================================================================
