//! Brain graph data models with privacy-first constraints
//!
//! Every free-text field that enters the graph passes through PII
//! redaction (emails, IPv4 addresses, phone numbers, URLs become
//! `[REDACTED]`) and is clamped to 100 characters. Tags and metadata are
//! bounded so a single noisy producer cannot bloat the store.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// Maximum length of any free-text field after redaction
const MAX_TEXT_LEN: usize = 100;
/// Maximum number of tags per node
const MAX_TAGS: usize = 10;
/// Maximum length of a single tag
const MAX_TAG_LEN: usize = 50;
/// Maximum number of metadata keys
const MAX_META_KEYS: usize = 10;
/// Maximum length of a metadata key
const MAX_META_KEY_LEN: usize = 50;
/// Total serialized metadata budget in bytes
const MAX_META_BYTES: usize = 2048;

// ============================================================================
// KINDS
// ============================================================================

/// Kinds of graph nodes.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    /// A home-automation entity (light, switch, sensor, ...)
    #[default]
    Entity,
    /// A spatial zone (room, floor, area)
    Zone,
    /// A physical device backing one or more entities
    Device,
    /// A household member
    Person,
    /// An abstract concept surfaced by mining
    Concept,
    /// An internal module of the co-pilot
    Module,
    /// A notable event promoted into the graph
    Event,
}

impl NodeKind {
    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Entity => "entity",
            NodeKind::Zone => "zone",
            NodeKind::Device => "device",
            NodeKind::Person => "person",
            NodeKind::Concept => "concept",
            NodeKind::Module => "module",
            NodeKind::Event => "event",
        }
    }

    /// Parse from string name
    pub fn parse_name(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "zone" => NodeKind::Zone,
            "device" => NodeKind::Device,
            "person" => NodeKind::Person,
            "concept" => NodeKind::Concept,
            "module" => NodeKind::Module,
            "event" => NodeKind::Event,
            _ => NodeKind::Entity,
        }
    }
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Kinds of graph edges.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EdgeType {
    /// Entity is a member of a zone
    InZone,
    /// Device or person controls an entity
    Controls,
    /// One node influences another
    #[default]
    Affects,
    /// Statistically correlated behavior
    Correlates,
    /// Mined causal succession (consequent → antecedent)
    TriggeredBy,
    /// Co-occurrence inside a short observation window
    ObservedWith,
    /// Free-form reference
    Mentions,
}

impl EdgeType {
    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeType::InZone => "in_zone",
            EdgeType::Controls => "controls",
            EdgeType::Affects => "affects",
            EdgeType::Correlates => "correlates",
            EdgeType::TriggeredBy => "triggered_by",
            EdgeType::ObservedWith => "observed_with",
            EdgeType::Mentions => "mentions",
        }
    }

    /// Parse from string name
    pub fn parse_name(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "in_zone" => EdgeType::InZone,
            "controls" => EdgeType::Controls,
            "correlates" => EdgeType::Correlates,
            "triggered_by" => EdgeType::TriggeredBy,
            "observed_with" => EdgeType::ObservedWith,
            "mentions" => EdgeType::Mentions,
            _ => EdgeType::Affects,
        }
    }
}

impl std::fmt::Display for EdgeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// PROVENANCE
// ============================================================================

/// Where a node or edge came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
    /// Producer kind, e.g. `miner`, `ingress`
    pub kind: String,
    /// Reference into the producer's namespace
    #[serde(rename = "ref")]
    pub reference: String,
    /// One-line human summary
    pub summary: String,
}

impl Provenance {
    /// Build a provenance record, redacting and clamping all fields.
    pub fn new(
        kind: impl Into<String>,
        reference: impl Into<String>,
        summary: impl Into<String>,
    ) -> Self {
        Self {
            kind: redact_pii(&kind.into()),
            reference: redact_pii(&reference.into()),
            summary: redact_pii(&summary.into()),
        }
    }
}

// ============================================================================
// NODE
// ============================================================================

/// A node in the brain graph with bounded, redacted metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    /// Stable, globally unique id
    pub id: String,
    /// Node kind
    pub kind: NodeKind,
    /// Display label (redacted, ≤100 chars)
    pub label: String,
    /// Optional domain (for entity nodes)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    /// Last write timestamp in epoch milliseconds
    pub updated_at_ms: i64,
    /// Raw salience score; never negative
    pub score: f64,
    /// Tags (≤10, each ≤50 chars)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    /// Provenance of the node
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<Provenance>,
    /// Bounded scalar metadata (≤10 keys, ≤2 KiB serialized)
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub meta: Map<String, Value>,
}

impl GraphNode {
    /// Create a sanitized node. Label is redacted and clamped, tags and
    /// meta are bounded, and the score is clamped to be non-negative.
    pub fn new(
        id: impl Into<String>,
        kind: NodeKind,
        label: impl Into<String>,
        updated_at_ms: i64,
        score: f64,
    ) -> Self {
        Self {
            id: id.into(),
            kind,
            label: redact_pii(&label.into()),
            domain: None,
            updated_at_ms,
            score: score.max(0.0),
            tags: Vec::new(),
            source: None,
            meta: Map::new(),
        }
    }

    /// Set the domain.
    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(redact_pii(&domain.into()));
        self
    }

    /// Set tags, applying redaction and bounds.
    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = sanitize_tags(tags);
        self
    }

    /// Set provenance.
    pub fn with_source(mut self, source: Provenance) -> Self {
        self.source = Some(source);
        self
    }

    /// Set metadata, applying redaction and bounds.
    pub fn with_meta(mut self, meta: Map<String, Value>) -> Self {
        self.meta = sanitize_meta(meta);
        self
    }

    /// Current salience after exponential decay.
    ///
    /// `effective = score · 2^(-age_hours / half_life_hours)`; never above
    /// the raw score, even for future-dated writes.
    pub fn effective_score(&self, now_ms: i64, half_life_hours: f64) -> f64 {
        effective_value(self.score, self.updated_at_ms, now_ms, half_life_hours)
    }
}

// ============================================================================
// EDGE
// ============================================================================

/// An edge in the brain graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphEdge {
    /// Stable id, derived from endpoints and type
    pub id: String,
    /// Source node id
    pub from: String,
    /// Target node id
    pub to: String,
    /// Edge type
    pub edge_type: EdgeType,
    /// Last write timestamp in epoch milliseconds
    pub updated_at_ms: i64,
    /// Raw weight; never negative
    pub weight: f64,
    /// Evidence backing the edge
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evidence: Option<Provenance>,
    /// Bounded scalar metadata
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub meta: Map<String, Value>,
}

impl GraphEdge {
    /// Create a sanitized edge with a derived id.
    pub fn new(
        from: impl Into<String>,
        edge_type: EdgeType,
        to: impl Into<String>,
        updated_at_ms: i64,
        weight: f64,
    ) -> Self {
        let from = from.into();
        let to = to.into();
        Self {
            id: edge_id(&from, edge_type, &to),
            from,
            to,
            edge_type,
            updated_at_ms,
            weight: weight.max(0.0),
            evidence: None,
            meta: Map::new(),
        }
    }

    /// Set evidence.
    pub fn with_evidence(mut self, evidence: Provenance) -> Self {
        self.evidence = Some(evidence);
        self
    }

    /// Set metadata, applying redaction and bounds.
    pub fn with_meta(mut self, meta: Map<String, Value>) -> Self {
        self.meta = sanitize_meta(meta);
        self
    }

    /// Current weight after exponential decay.
    pub fn effective_weight(&self, now_ms: i64, half_life_hours: f64) -> f64 {
        effective_value(self.weight, self.updated_at_ms, now_ms, half_life_hours)
    }
}

/// Stable edge id: `"e:" + hex(sha256(from|type|to))[..16]`.
pub fn edge_id(from: &str, edge_type: EdgeType, to: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(from.as_bytes());
    hasher.update(b"|");
    hasher.update(edge_type.as_str().as_bytes());
    hasher.update(b"|");
    hasher.update(to.as_bytes());
    let digest = hasher.finalize();
    let hex: String = digest.iter().map(|b| format!("{:02x}", b)).collect();
    format!("e:{}", &hex[..16])
}

/// Exponential half-life decay shared by node scores and edge weights.
pub fn effective_value(raw: f64, updated_at_ms: i64, now_ms: i64, half_life_hours: f64) -> f64 {
    let age_hours = (now_ms - updated_at_ms) as f64 / 3_600_000.0;
    if age_hours <= 0.0 || half_life_hours <= 0.0 {
        return raw;
    }
    raw * (2.0_f64).powf(-age_hours / half_life_hours)
}

// ============================================================================
// SANITIZATION
// ============================================================================

/// Redact PII patterns (emails, IPv4, phone numbers, URLs) and clamp to
/// 100 characters.
pub fn redact_pii(text: &str) -> String {
    let mut out = redact_urls(text);
    out = redact_emails(&out);
    out = redact_ipv4(&out);
    out = redact_phones(&out);
    truncate_chars(&out, MAX_TEXT_LEN)
}

fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

fn redact_urls(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    loop {
        let hit = ["https://", "http://"]
            .iter()
            .filter_map(|p| rest.find(p))
            .min();
        match hit {
            Some(start) => {
                out.push_str(&rest[..start]);
                out.push_str("[REDACTED]");
                let tail = &rest[start..];
                let end = tail.find(char::is_whitespace).unwrap_or(tail.len());
                rest = &tail[end..];
            }
            None => {
                out.push_str(rest);
                return out;
            }
        }
    }
}

fn redact_emails(text: &str) -> String {
    let is_local = |c: char| c.is_alphanumeric() || "._%+-".contains(c);
    let is_domain = |c: char| c.is_alphanumeric() || ".-".contains(c);

    let mut out = String::with_capacity(text.len());
    for token in split_keeping_separators(text) {
        if token.len() == 1 && !token.chars().next().is_some_and(is_local) {
            out.push_str(token);
            continue;
        }
        let looks_like_email = token.split_once('@').is_some_and(|(local, domain)| {
            !local.is_empty()
                && local.chars().all(is_local)
                && domain.chars().all(is_domain)
                && domain.rsplit_once('.').is_some_and(|(host, tld)| {
                    !host.is_empty() && tld.len() >= 2 && tld.chars().all(char::is_alphabetic)
                })
        });
        if looks_like_email {
            out.push_str("[REDACTED]");
        } else {
            out.push_str(token);
        }
    }
    out
}

fn redact_ipv4(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for token in split_keeping_separators(text) {
        let octets: Vec<&str> = token.split('.').collect();
        let is_ip = octets.len() == 4
            && octets.iter().all(|o| {
                !o.is_empty() && o.len() <= 3 && o.chars().all(|c| c.is_ascii_digit())
            });
        if is_ip {
            out.push_str("[REDACTED]");
        } else {
            out.push_str(token);
        }
    }
    out
}

fn redact_phones(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for token in split_keeping_separators(text) {
        let digits: String = token.chars().filter(|c| c.is_ascii_digit()).collect();
        let shape_ok = token.chars().all(|c| c.is_ascii_digit() || c == '-');
        if shape_ok && digits.len() == 10 && phone_groups_ok(token) {
            out.push_str("[REDACTED]");
        } else {
            out.push_str(token);
        }
    }
    out
}

/// Accepts `##########`, `###-###-####`, and partial-dash variants.
fn phone_groups_ok(token: &str) -> bool {
    let groups: Vec<&str> = token.split('-').collect();
    match groups.len() {
        1 => groups[0].len() == 10,
        2 | 3 => {
            let lens: Vec<usize> = groups.iter().map(|g| g.len()).collect();
            lens == [3, 7] || lens == [6, 4] || lens == [3, 3, 4]
        }
        _ => false,
    }
}

/// Split into runs of whitespace and non-whitespace, preserving both.
fn split_keeping_separators(text: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut in_ws: Option<bool> = None;
    for (i, c) in text.char_indices() {
        let ws = c.is_whitespace();
        match in_ws {
            Some(prev) if prev != ws => {
                parts.push(&text[start..i]);
                start = i;
                in_ws = Some(ws);
            }
            None => in_ws = Some(ws),
            _ => {}
        }
    }
    if start < text.len() {
        parts.push(&text[start..]);
    }
    parts
}

fn sanitize_tags(tags: Vec<String>) -> Vec<String> {
    tags.into_iter()
        .take(MAX_TAGS)
        .map(|t| truncate_chars(&redact_pii(&t), MAX_TAG_LEN))
        .collect()
}

/// Bound metadata: scalar values only, ≤10 keys, ≤2 KiB serialized.
fn sanitize_meta(meta: Map<String, Value>) -> Map<String, Value> {
    let mut out = Map::new();
    let mut total = 0usize;
    for (key, value) in meta.into_iter() {
        if out.len() >= MAX_META_KEYS {
            break;
        }
        if key.len() > MAX_META_KEY_LEN {
            continue;
        }
        let value = match value {
            Value::String(s) => Value::String(redact_pii(&s)),
            v @ (Value::Number(_) | Value::Bool(_)) => v,
            _ => continue,
        };
        let entry_size = key.len() + value.to_string().len() + 8;
        if total + entry_size > MAX_META_BYTES {
            break;
        }
        total += entry_size;
        out.insert(key, value);
    }
    out
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_roundtrip() {
        for kind in [
            NodeKind::Entity,
            NodeKind::Zone,
            NodeKind::Device,
            NodeKind::Person,
            NodeKind::Concept,
            NodeKind::Module,
            NodeKind::Event,
        ] {
            assert_eq!(NodeKind::parse_name(kind.as_str()), kind);
        }
        for edge_type in [
            EdgeType::InZone,
            EdgeType::Controls,
            EdgeType::Affects,
            EdgeType::Correlates,
            EdgeType::TriggeredBy,
            EdgeType::ObservedWith,
            EdgeType::Mentions,
        ] {
            assert_eq!(EdgeType::parse_name(edge_type.as_str()), edge_type);
        }
    }

    #[test]
    fn test_redacts_email() {
        assert_eq!(
            redact_pii("owner is alice@example.com ok"),
            "owner is [REDACTED] ok"
        );
    }

    #[test]
    fn test_redacts_ipv4() {
        assert_eq!(redact_pii("hub at 192.168.1.23 online"), "hub at [REDACTED] online");
        // Entity-style dotted names survive
        assert_eq!(redact_pii("light.kitchen"), "light.kitchen");
    }

    #[test]
    fn test_redacts_url() {
        assert_eq!(
            redact_pii("see https://example.com/path?q=1 for details"),
            "see [REDACTED] for details"
        );
    }

    #[test]
    fn test_redacts_phone() {
        assert_eq!(redact_pii("call 555-123-4567 now"), "call [REDACTED] now");
        assert_eq!(redact_pii("call 5551234567 now"), "call [REDACTED] now");
        // Timestamps and short numbers survive
        assert_eq!(redact_pii("room 1234"), "room 1234");
    }

    #[test]
    fn test_label_clamped_to_100_chars() {
        let long = "x".repeat(300);
        let node = GraphNode::new("n", NodeKind::Entity, long, 0, 1.0);
        assert_eq!(node.label.chars().count(), 100);
    }

    #[test]
    fn test_tags_bounded() {
        let tags: Vec<String> = (0..20).map(|i| format!("tag-{}{}", i, "y".repeat(80))).collect();
        let node = GraphNode::new("n", NodeKind::Entity, "label", 0, 1.0).with_tags(tags);
        assert_eq!(node.tags.len(), 10);
        assert!(node.tags.iter().all(|t| t.chars().count() <= 50));
    }

    #[test]
    fn test_meta_bounded() {
        let mut meta = Map::new();
        for i in 0..20 {
            meta.insert(format!("k{}", i), Value::from(i));
        }
        meta.insert("nested".to_string(), serde_json::json!({"a": 1}));
        let node = GraphNode::new("n", NodeKind::Entity, "label", 0, 1.0).with_meta(meta);
        assert!(node.meta.len() <= 10);
        assert!(!node.meta.contains_key("nested"));
    }

    #[test]
    fn test_score_never_negative() {
        let node = GraphNode::new("n", NodeKind::Entity, "label", 0, -3.0);
        assert_eq!(node.score, 0.0);
    }

    #[test]
    fn test_effective_score_decays() {
        let node = GraphNode::new("n", NodeKind::Entity, "label", 0, 1.0);
        let h = 3_600_000;
        // One half-life (24h) halves the score
        let decayed = node.effective_score(24 * h, 24.0);
        assert!((decayed - 0.5).abs() < 1e-9);
        // Monotone non-increasing without writes (I7)
        assert!(node.effective_score(25 * h, 24.0) < decayed);
        // Never above raw score, even before updated_at
        assert_eq!(node.effective_score(-h, 24.0), 1.0);
    }

    #[test]
    fn test_edge_id_is_stable() {
        let a = edge_id("light.kitchen", EdgeType::InZone, "zone:kitchen");
        let b = edge_id("light.kitchen", EdgeType::InZone, "zone:kitchen");
        assert_eq!(a, b);
        assert!(a.starts_with("e:"));
        assert_eq!(a.len(), 18);
        // Direction matters
        let c = edge_id("zone:kitchen", EdgeType::InZone, "light.kitchen");
        assert_ne!(a, c);
    }

    #[test]
    fn test_edge_weight_decay_half_life_12h() {
        let edge = GraphEdge::new("a", EdgeType::Affects, "b", 0, 1.0);
        let decayed = edge.effective_weight(12 * 3_600_000, 12.0);
        assert!((decayed - 0.5).abs() < 1e-9);
    }
}
