//! Subquery evaluation: nested queries embedded as condition values.
//!
//! A subquery runs through the same dispatcher as a top-level query,
//! one recursion level deeper. Its result is flattened into a value
//! list that the enclosing condition tests with EXISTS/IN/ANY/ALL or
//! an aggregate comparison. The recursion depth is bounded so that a
//! pathological nesting fails cleanly instead of blowing the stack.

use crate::ast::Query;
use crate::conditions;
use crate::error::Result;
use crate::result::{Payload, QueryResult};
use askgraph_api::PropertyValue;

/// Maximum nesting depth for subqueries. Queries deeper than this
/// fail with a depth error.
pub const MAX_SUBQUERY_DEPTH: usize = 16;

/// Flattened result of a nested query: the value list for membership
/// tests, plus the single aggregate number when the subquery was an
/// aggregate.
#[derive(Debug, Clone, Default)]
pub struct SubqueryOutcome {
    pub values: Vec<PropertyValue>,
    pub aggregate: Option<f64>,
}

impl SubqueryOutcome {
    /// The single number an aggregate comparison tests against: the
    /// aggregate result when present, otherwise a lone numeric value.
    pub fn single_numeric(&self) -> Option<f64> {
        if self.aggregate.is_some() {
            return self.aggregate;
        }
        match self.values.as_slice() {
            [only] => only.as_f64(),
            _ => None,
        }
    }
}

/// Executes nested queries. Implemented by the dispatcher; the
/// indirection breaks the dependency cycle between condition
/// evaluation and query execution.
pub trait SubqueryEngine {
    fn run_subquery(&self, query: &Query, depth: usize) -> Result<SubqueryOutcome>;
}

/// Flattens a query result into the value list the condition
/// operators consume.
///
/// - count → the count as a single integer
/// - aggregate → the aggregate number, when there is one
/// - node list → one named property per node when the subquery
///   projected one, the full property set otherwise
/// - record list → every record value
pub fn extract_values(result: &QueryResult, projection: Option<&str>) -> SubqueryOutcome {
    let mut outcome = SubqueryOutcome::default();
    let Some(payload) = &result.data else {
        return outcome;
    };
    match payload {
        Payload::Count(n) => {
            outcome.values.push(PropertyValue::Int(*n as i64));
            outcome.aggregate = Some(*n as f64);
        }
        Payload::Aggregate(value) => {
            if let Some(v) = value {
                outcome.values.push(PropertyValue::Float(*v));
            }
            outcome.aggregate = *value;
        }
        Payload::Node(node) => {
            collect_node_values(&mut outcome.values, &node.properties, projection);
        }
        Payload::Nodes(nodes) | Payload::Path(nodes) => {
            for node in nodes {
                collect_node_values(&mut outcome.values, &node.properties, projection);
            }
        }
        Payload::Edge(edge) => {
            collect_node_values(&mut outcome.values, &edge.properties, projection);
        }
        Payload::Edges(edges) => {
            for edge in edges {
                collect_node_values(&mut outcome.values, &edge.properties, projection);
            }
        }
        Payload::Records(records) => {
            for record in records {
                outcome.values.extend(record.values().cloned());
            }
        }
        Payload::Schema(_) | Payload::Batch(_) => {}
    }
    outcome
}

fn collect_node_values(
    values: &mut Vec<PropertyValue>,
    props: &askgraph_api::PropertyMap,
    projection: Option<&str>,
) {
    match projection {
        Some(property) if property != "*" => {
            if let Some(value) = conditions::lookup_property(props, property) {
                values.push(value);
            }
        }
        _ => values.extend(props.values().cloned()),
    }
}

/// EXISTS semantics: at least one value that is not blank, zero, or
/// an empty list.
pub fn has_present_value(values: &[PropertyValue]) -> bool {
    values.iter().any(|v| !v.is_blank())
}

/// Membership by the same equality rule conditions use: numeric
/// epsilon equality when both sides coerce, case-insensitive string
/// equality otherwise.
pub fn value_in_list(candidate: &PropertyValue, values: &[PropertyValue]) -> bool {
    values.iter().any(|v| conditions::values_equal(candidate, v))
}
