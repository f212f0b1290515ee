//! Database Migrations
//!
//! Schema migration definitions for the brain graph store.

/// Migration definitions
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "Initial graph schema: nodes, edges, salience indexes",
        up: MIGRATION_V1_UP,
    },
    Migration {
        version: 2,
        description: "Composite indexes for filtered reads and pruning",
        up: MIGRATION_V2_UP,
    },
];

/// A database migration
#[derive(Debug, Clone)]
pub struct Migration {
    /// Version number
    pub version: u32,
    /// Description
    pub description: &'static str,
    /// SQL to apply
    pub up: &'static str,
}

/// V1: nodes and edges with referential integrity
const MIGRATION_V1_UP: &str = r#"
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER NOT NULL,
    applied_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS nodes (
    id TEXT PRIMARY KEY,
    kind TEXT NOT NULL,
    label TEXT NOT NULL,
    updated_at_ms INTEGER NOT NULL,
    score REAL NOT NULL,
    domain TEXT,
    source_json TEXT,
    tags_json TEXT,
    meta_json TEXT
);

CREATE TABLE IF NOT EXISTS edges (
    id TEXT PRIMARY KEY,
    from_node TEXT NOT NULL,
    to_node TEXT NOT NULL,
    edge_type TEXT NOT NULL,
    updated_at_ms INTEGER NOT NULL,
    weight REAL NOT NULL,
    evidence_json TEXT,
    meta_json TEXT,
    FOREIGN KEY (from_node) REFERENCES nodes (id) ON DELETE CASCADE,
    FOREIGN KEY (to_node) REFERENCES nodes (id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_nodes_kind ON nodes (kind);
CREATE INDEX IF NOT EXISTS idx_nodes_domain ON nodes (domain);
CREATE INDEX IF NOT EXISTS idx_nodes_updated ON nodes (updated_at_ms);
CREATE INDEX IF NOT EXISTS idx_nodes_score ON nodes (score);

CREATE INDEX IF NOT EXISTS idx_edges_from ON edges (from_node);
CREATE INDEX IF NOT EXISTS idx_edges_to ON edges (to_node);
CREATE INDEX IF NOT EXISTS idx_edges_type ON edges (edge_type);
CREATE INDEX IF NOT EXISTS idx_edges_updated ON edges (updated_at_ms);
CREATE INDEX IF NOT EXISTS idx_edges_weight ON edges (weight);

INSERT INTO schema_version (version, applied_at) VALUES (1, datetime('now'));
"#;

/// V2: composite indexes matching the hot filter shapes
const MIGRATION_V2_UP: &str = r#"
CREATE INDEX IF NOT EXISTS idx_nodes_kind_domain ON nodes (kind, domain);
CREATE INDEX IF NOT EXISTS idx_nodes_kind_score ON nodes (kind, score);
CREATE INDEX IF NOT EXISTS idx_edges_type_weight ON edges (edge_type, weight);

UPDATE schema_version SET version = 2, applied_at = datetime('now');
"#;

/// Get current schema version from database
pub fn get_current_version(conn: &rusqlite::Connection) -> rusqlite::Result<u32> {
    conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )
    .or(Ok(0))
}

/// Apply pending migrations
pub fn apply_migrations(conn: &rusqlite::Connection) -> rusqlite::Result<u32> {
    let current_version = get_current_version(conn)?;
    let mut applied = 0;

    for migration in MIGRATIONS {
        if migration.version > current_version {
            tracing::info!(
                "Applying migration v{}: {}",
                migration.version,
                migration.description
            );
            conn.execute_batch(migration.up)?;
            applied += 1;
        }
    }

    Ok(applied)
}
