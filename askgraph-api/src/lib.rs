//! Shared data types and the `GraphStore` collaborator contract.
//!
//! Everything the query engine needs from a backing store lives here:
//! the property value sum type, the `Node`/`Edge` records, and the
//! `GraphStore` trait. Storage implementations and the query engine
//! both depend on this crate and nothing else in the workspace.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Stable identifier for a node or an edge.
pub type EntityId = Uuid;

/// A typed scalar (or list of scalars) stored under a property name.
///
/// This is a closed sum type: every value in the graph is one of these
/// variants, and comparisons between variants go through the explicit
/// coercion helpers instead of runtime type sniffing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum PropertyValue {
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Timestamp(DateTime<Utc>),
    List(Vec<PropertyValue>),
}

impl PropertyValue {
    /// Numeric view of the value, if one exists.
    ///
    /// Ints and floats convert directly; strings convert when they
    /// parse as a number. Everything else is `None`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            PropertyValue::Int(i) => Some(*i as f64),
            PropertyValue::Float(f) => Some(*f),
            PropertyValue::String(s) => s.trim().parse::<f64>().ok(),
            PropertyValue::Bool(_)
            | PropertyValue::Timestamp(_)
            | PropertyValue::List(_) => None,
        }
    }

    /// Renders the value the way it appears in query text.
    ///
    /// Used for string-coerced comparisons and for variable
    /// substitution, so it must be stable: no debug formatting.
    pub fn to_display_string(&self) -> String {
        match self {
            PropertyValue::String(s) => s.clone(),
            PropertyValue::Int(i) => i.to_string(),
            PropertyValue::Float(f) => f.to_string(),
            PropertyValue::Bool(b) => b.to_string(),
            PropertyValue::Timestamp(t) => t.to_rfc3339(),
            PropertyValue::List(items) => items
                .iter()
                .map(|v| v.to_display_string())
                .collect::<Vec<_>>()
                .join(", "),
        }
    }

    /// True for the values `exists`-style checks treat as absent:
    /// empty/blank strings, zero, empty lists.
    pub fn is_blank(&self) -> bool {
        match self {
            PropertyValue::String(s) => s.trim().is_empty(),
            PropertyValue::Int(i) => *i == 0,
            PropertyValue::Float(f) => *f == 0.0,
            PropertyValue::Bool(_) | PropertyValue::Timestamp(_) => false,
            PropertyValue::List(items) => items.is_empty(),
        }
    }
}

/// Property map shared by nodes and edges.
pub type PropertyMap = BTreeMap<String, PropertyValue>;

/// A labeled entity with a property map.
///
/// The id is assigned at creation and never changes. Labels are free
/// text and matched case-insensitively everywhere.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: EntityId,
    pub label: String,
    pub properties: PropertyMap,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Node {
    pub fn new(label: impl Into<String>, properties: PropertyMap) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            label: label.into(),
            properties,
            created_at: now,
            updated_at: now,
        }
    }

    /// Case-insensitive label check.
    pub fn has_label(&self, label: &str) -> bool {
        self.label.eq_ignore_ascii_case(label)
    }

    /// The `name` property as text, if present. Node references in
    /// query text resolve against this.
    pub fn name(&self) -> Option<String> {
        self.properties.get("name").map(|v| v.to_display_string())
    }
}

/// A directed, typed relation between two nodes.
///
/// Direction is source → target, but several traversal operations
/// also match target → source and treat the edge as bidirectional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub id: EntityId,
    pub source: EntityId,
    pub target: EntityId,
    pub rel_type: String,
    pub properties: PropertyMap,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Edge {
    pub fn new(
        source: EntityId,
        target: EntityId,
        rel_type: impl Into<String>,
        properties: PropertyMap,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            source,
            target,
            rel_type: rel_type.into(),
            properties,
            created_at: now,
            updated_at: now,
        }
    }

    /// Case-insensitive relation-type check.
    pub fn has_type(&self, rel_type: &str) -> bool {
        self.rel_type.eq_ignore_ascii_case(rel_type)
    }

    /// True if the edge touches the given node on either end.
    pub fn touches(&self, node: EntityId) -> bool {
        self.source == node || self.target == node
    }

    /// The opposite endpoint, if `node` is one of the two ends.
    pub fn other_end(&self, node: EntityId) -> Option<EntityId> {
        if self.source == node {
            Some(self.target)
        } else if self.target == node {
            Some(self.source)
        } else {
            None
        }
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Errors surfaced by `GraphStore` implementations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("node {0} not found")]
    NodeNotFound(EntityId),

    #[error("edge {0} not found")]
    EdgeNotFound(EntityId),

    #[error("edge endpoint {0} does not exist")]
    MissingEndpoint(EntityId),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("persistence error: {0}")]
    Persistence(String),
}

/// Outcome of a `load`/`save` call: a flag plus a human-readable
/// message suitable for surfacing to the caller verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreReport {
    pub ok: bool,
    pub message: String,
}

impl StoreReport {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            ok: true,
            message: message.into(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            message: message.into(),
        }
    }
}

/// The single source of truth for graph state.
///
/// Implementations must serialize every public read and write behind
/// one coarse mutual-exclusion region: the query engine assumes each
/// call observes and produces a consistent graph, and never assumes
/// finer-grained locking.
pub trait GraphStore: Send + Sync {
    /// Inserts a node. The node's id must be fresh.
    fn add_node(&self, node: Node) -> StoreResult<Node>;

    /// Inserts an edge. Fails with `MissingEndpoint` if either
    /// endpoint node does not exist at call time.
    fn add_edge(&self, edge: Edge) -> StoreResult<Edge>;

    fn get_node(&self, id: EntityId) -> Option<Node>;

    /// Every edge incident to the node, outgoing and incoming, in
    /// insertion order.
    fn get_edges_for_node(&self, id: EntityId) -> Vec<Edge>;

    /// Nodes whose label matches case-insensitively, in insertion
    /// order.
    fn get_nodes_by_label(&self, label: &str) -> Vec<Node>;

    fn get_all_nodes(&self) -> Vec<Node>;

    fn get_all_edges(&self) -> Vec<Edge>;

    /// Merges the given properties into a node's map, overwriting
    /// keys that already exist, and bumps `updated_at`. The id and
    /// label are immutable.
    fn update_node_properties(&self, id: EntityId, properties: PropertyMap) -> StoreResult<Node>;

    /// Merges the given properties into an edge's map and bumps
    /// `updated_at`.
    fn update_edge_properties(&self, id: EntityId, properties: PropertyMap) -> StoreResult<Edge>;

    /// Removes a node and cascades to all incident edges. Returns the
    /// number of edges removed by the cascade.
    fn remove_node(&self, id: EntityId) -> StoreResult<usize>;

    fn remove_edge(&self, id: EntityId) -> StoreResult<()>;

    /// Loads graph state from the backing medium, replacing the
    /// in-memory contents on success.
    fn load(&self) -> StoreReport;

    /// Flushes graph state to the backing medium.
    fn save(&self) -> StoreReport;
}
