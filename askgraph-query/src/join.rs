//! Virtual joins: computed, non-persisted relationships between two
//! node populations.
//!
//! A join pairs every source-label node with a target set derived by
//! one of three rules (edge-type traversal, shared-property
//! comparison, reachability), applies the join conditions to the
//! targets, and emits one flattened record per surviving pair.

use crate::ast::{JoinRule, JoinSpec, Operator};
use crate::conditions::{self, ConditionContext};
use crate::error::{Error, Result};
use askgraph_api::{EntityId, GraphStore, Node, PropertyMap, PropertyValue};
use std::cmp::Ordering;
use std::collections::{HashSet, VecDeque};

/// Executes a virtual join and returns the flattened pair records.
pub fn virtual_join(
    store: &dyn GraphStore,
    spec: &JoinSpec,
    ctx: &ConditionContext<'_>,
) -> Result<Vec<PropertyMap>> {
    let sources = store.get_nodes_by_label(&spec.source_label);
    let mut records = Vec::new();

    for source in &sources {
        let targets = match &spec.rule {
            JoinRule::EdgeType(rel) => reachable_targets(
                store,
                source.id,
                &spec.target_label,
                Some(rel),
                spec.max_steps.unwrap_or(1),
                spec.bidirectional,
            ),
            JoinRule::SharedProperty { property, operator } => {
                shared_property_targets(store, source, spec, property, *operator)?
            }
            // Reachability: bounded when a step limit is present,
            // otherwise the unrestricted fallback.
            JoinRule::Reachable => reachable_targets(
                store,
                source.id,
                &spec.target_label,
                None,
                spec.max_steps.unwrap_or(usize::MAX),
                true,
            ),
        };

        for target in targets {
            if !conditions::evaluate(&target.properties, &spec.conditions, ctx)? {
                continue;
            }
            records.push(flatten_pair(source, &target));
        }
    }
    Ok(records)
}

/// Bounded BFS collecting target-label nodes. With a relation type
/// the walk only uses edges of that type. Directed unless
/// `bidirectional`; the start node is never its own target.
fn reachable_targets(
    store: &dyn GraphStore,
    from: EntityId,
    target_label: &str,
    rel: Option<&str>,
    max_steps: usize,
    bidirectional: bool,
) -> Vec<Node> {
    let mut visited: HashSet<EntityId> = HashSet::new();
    visited.insert(from);
    let mut queue: VecDeque<(EntityId, usize)> = VecDeque::new();
    queue.push_back((from, 0));
    let mut found = Vec::new();

    while let Some((current, steps)) = queue.pop_front() {
        if steps >= max_steps {
            continue;
        }
        for edge in store.get_edges_for_node(current) {
            if let Some(rel) = rel {
                if !edge.has_type(rel) {
                    continue;
                }
            }
            let next = if edge.source == current {
                edge.target
            } else if bidirectional {
                edge.source
            } else {
                continue;
            };
            if !visited.insert(next) {
                continue;
            }
            if let Some(node) = store.get_node(next) {
                if node.has_label(target_label) {
                    found.push(node);
                }
            }
            queue.push_back((next, steps + 1));
        }
    }
    found
}

fn shared_property_targets(
    store: &dyn GraphStore,
    source: &Node,
    spec: &JoinSpec,
    property: &str,
    operator: Operator,
) -> Result<Vec<Node>> {
    let Some(source_value) = conditions::lookup_property(&source.properties, property) else {
        return Ok(Vec::new());
    };
    let mut targets = Vec::new();
    for target in store.get_nodes_by_label(&spec.target_label) {
        if target.id == source.id {
            continue;
        }
        let Some(target_value) = conditions::lookup_property(&target.properties, property) else {
            continue;
        };
        if property_pair_matches(&source_value, &target_value, operator)? {
            targets.push(target);
        }
    }
    Ok(targets)
}

fn property_pair_matches(
    source: &PropertyValue,
    target: &PropertyValue,
    operator: Operator,
) -> Result<bool> {
    Ok(match operator {
        Operator::Eq => conditions::values_equal(source, target),
        Operator::Ne => !conditions::values_equal(source, target),
        Operator::Gt => conditions::compare_values(source, target) == Ordering::Greater,
        Operator::Lt => conditions::compare_values(source, target) == Ordering::Less,
        Operator::Ge => conditions::compare_values(source, target) != Ordering::Less,
        Operator::Le => conditions::compare_values(source, target) != Ordering::Greater,
        other => {
            return Err(Error::Unsupported(format!(
                "join operator {other:?} on shared properties"
            )))
        }
    })
}

/// One record per pair: both entities' properties under `source_` /
/// `target_` prefixes, plus ids and labels for reference.
fn flatten_pair(source: &Node, target: &Node) -> PropertyMap {
    let mut record = PropertyMap::new();
    record.insert(
        "source_id".to_string(),
        PropertyValue::String(source.id.to_string()),
    );
    record.insert(
        "source_label".to_string(),
        PropertyValue::String(source.label.clone()),
    );
    record.insert(
        "target_id".to_string(),
        PropertyValue::String(target.id.to_string()),
    );
    record.insert(
        "target_label".to_string(),
        PropertyValue::String(target.label.clone()),
    );
    for (key, value) in &source.properties {
        record.insert(format!("source_{key}"), value.clone());
    }
    for (key, value) in &target.properties {
        record.insert(format!("target_{key}"), value.clone());
    }
    record
}
