//! The uniform result record every query produces.

use askgraph_api::{Edge, Node, PropertyMap};
use serde::{Deserialize, Serialize};

/// Per-label slice of the schema summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelSummary {
    pub label: String,
    pub count: usize,
    /// Union of property names seen on nodes with this label.
    pub properties: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeTypeSummary {
    pub rel_type: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaSummary {
    pub labels: Vec<LabelSummary>,
    pub edge_types: Vec<EdgeTypeSummary>,
}

/// What a successful query hands back, when it hands anything back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Payload {
    Node(Node),
    Nodes(Vec<Node>),
    Edge(Edge),
    Edges(Vec<Edge>),
    /// Node sequence of a path, start to end.
    Path(Vec<Node>),
    Count(u64),
    /// `None` is the documented no-value outcome for avg/min/max over
    /// an empty set; it is distinct from zero.
    Aggregate(Option<f64>),
    /// Flattened records from virtual joins and group-by.
    Records(Vec<PropertyMap>),
    Schema(SchemaSummary),
    /// Per-operation results of a batch.
    Batch(Vec<QueryResult>),
}

/// Success flag, human-readable message, optional error, optional
/// payload. Failed results always carry a non-empty error; an empty
/// find is a success with an empty payload, never a failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub success: bool,
    pub message: String,
    pub error: Option<String>,
    pub data: Option<Payload>,
}

impl QueryResult {
    pub fn ok(message: impl Into<String>, data: Option<Payload>) -> Self {
        Self {
            success: true,
            message: message.into(),
            error: None,
            data,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        let error = error.into();
        Self {
            success: false,
            message: format!("query failed: {error}"),
            error: Some(error),
            data: None,
        }
    }

    /// Convenience for tests and embedders: the nodes of the payload,
    /// if the payload carries nodes.
    pub fn nodes(&self) -> &[Node] {
        match &self.data {
            Some(Payload::Nodes(nodes)) | Some(Payload::Path(nodes)) => nodes,
            Some(Payload::Node(node)) => std::slice::from_ref(node),
            _ => &[],
        }
    }

    pub fn edges(&self) -> &[Edge] {
        match &self.data {
            Some(Payload::Edges(edges)) => edges,
            Some(Payload::Edge(edge)) => std::slice::from_ref(edge),
            _ => &[],
        }
    }

    pub fn count(&self) -> Option<u64> {
        match &self.data {
            Some(Payload::Count(n)) => Some(*n),
            _ => None,
        }
    }

    pub fn aggregate(&self) -> Option<f64> {
        match &self.data {
            Some(Payload::Aggregate(v)) => *v,
            _ => None,
        }
    }

    pub fn records(&self) -> &[PropertyMap] {
        match &self.data {
            Some(Payload::Records(records)) => records,
            _ => &[],
        }
    }
}
