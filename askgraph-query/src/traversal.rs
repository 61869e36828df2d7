//! Breadth-first traversal over the store's adjacency relation.
//!
//! All three operations are iterative; nothing here recurses, so
//! traversal depth is bounded by the queue, not the stack. Edges are
//! visited in adjacency-list order and the first path found wins:
//! results are shortest by hop count, not lexicographically minimal.
//!
//! Shortest-path and within-steps treat edges as undirected by also
//! matching target → source. The advanced path follows edge
//! direction, which is why it carries the bidirectional retry.

use askgraph_api::{EntityId, GraphStore, Node};
use std::collections::{HashSet, VecDeque};

/// Edge-type filters shared by the bounded traversals: an optional
/// allow type and an optional deny type, both case-insensitive.
#[derive(Debug, Clone, Default)]
pub struct EdgeFilter {
    pub via: Option<String>,
    pub avoid: Option<String>,
}

impl EdgeFilter {
    pub fn accepts(&self, rel_type: &str) -> bool {
        if let Some(via) = &self.via {
            if !rel_type.eq_ignore_ascii_case(via) {
                return false;
            }
        }
        if let Some(avoid) = &self.avoid {
            if rel_type.eq_ignore_ascii_case(avoid) {
                return false;
            }
        }
        true
    }
}

/// Standard BFS shortest path, undirected.
///
/// Returns the node-id sequence from `from` to `to`; a single-node
/// path when they are equal; empty when unreachable. The queue
/// carries the full path so reconstruction is free.
pub fn shortest_path(store: &dyn GraphStore, from: EntityId, to: EntityId) -> Vec<EntityId> {
    if from == to {
        return vec![from];
    }
    let mut visited: HashSet<EntityId> = HashSet::new();
    visited.insert(from);
    let mut queue: VecDeque<Vec<EntityId>> = VecDeque::new();
    queue.push_back(vec![from]);

    while let Some(path) = queue.pop_front() {
        let current = *path.last().expect("queue paths are never empty");
        for edge in store.get_edges_for_node(current) {
            let Some(next) = edge.other_end(current) else {
                continue;
            };
            if !visited.insert(next) {
                continue;
            }
            let mut extended = path.clone();
            extended.push(next);
            if next == to {
                return extended;
            }
            queue.push_back(extended);
        }
    }
    Vec::new()
}

/// Bounded-radius enumeration: every node matching `label` reachable
/// within `max_steps` hops, excluding the start node. Edge types are
/// filtered through `filter`; traversal is undirected.
pub fn within_steps(
    store: &dyn GraphStore,
    from: EntityId,
    label: &str,
    max_steps: usize,
    filter: &EdgeFilter,
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
            if !filter.accepts(&edge.rel_type) {
                continue;
            }
            let Some(next) = edge.other_end(current) else {
                continue;
            };
            if !visited.insert(next) {
                continue;
            }
            if let Some(node) = store.get_node(next) {
                if node.has_label(label) {
                    found.push(node);
                }
            }
            queue.push_back((next, steps + 1));
        }
    }
    found
}

/// Constrained path-finding: directed BFS with edge-type filters and
/// a step limit, terminating on reaching `to`.
///
/// When no path is found and `bidirectional` is set, retries once
/// with the endpoints swapped and the flag cleared. That is a single
/// extra attempt, an approximation of symmetric search rather than a
/// true bidirectional BFS.
pub fn advanced_path(
    store: &dyn GraphStore,
    from: EntityId,
    to: EntityId,
    filter: &EdgeFilter,
    max_steps: Option<usize>,
    bidirectional: bool,
) -> Vec<EntityId> {
    if from == to {
        return vec![from];
    }
    let limit = max_steps.unwrap_or(usize::MAX);
    let mut visited: HashSet<EntityId> = HashSet::new();
    visited.insert(from);
    let mut queue: VecDeque<Vec<EntityId>> = VecDeque::new();
    queue.push_back(vec![from]);

    while let Some(path) = queue.pop_front() {
        if path.len() - 1 >= limit {
            continue;
        }
        let current = *path.last().expect("queue paths are never empty");
        for edge in store.get_edges_for_node(current) {
            if edge.source != current {
                // Directed: only follow outgoing edges here.
                continue;
            }
            if !filter.accepts(&edge.rel_type) {
                continue;
            }
            let next = edge.target;
            if !visited.insert(next) {
                continue;
            }
            let mut extended = path.clone();
            extended.push(next);
            if next == to {
                return extended;
            }
            queue.push_back(extended);
        }
    }

    if bidirectional {
        return advanced_path(store, to, from, filter, max_steps, false);
    }
    Vec::new()
}

#[cfg(test)]
mod tests {
    use super::*;
    use askgraph_api::{Edge, Node, PropertyMap, PropertyValue};
    use askgraph_storage::MemoryGraph;

    fn add_node(store: &MemoryGraph, name: &str) -> EntityId {
        let mut props = PropertyMap::new();
        props.insert("name".into(), PropertyValue::String(name.into()));
        store.add_node(Node::new("person", props)).unwrap().id
    }

    fn connect(store: &MemoryGraph, from: EntityId, to: EntityId, rel: &str) {
        store
            .add_edge(Edge::new(from, to, rel, PropertyMap::new()))
            .unwrap();
    }

    #[test]
    fn path_to_self_is_single_node() {
        let store = MemoryGraph::new();
        let a = add_node(&store, "a");
        assert_eq!(shortest_path(&store, a, a), vec![a]);
    }

    #[test]
    fn disconnected_nodes_yield_empty_path() {
        let store = MemoryGraph::new();
        let a = add_node(&store, "a");
        let b = add_node(&store, "b");
        assert!(shortest_path(&store, a, b).is_empty());
    }

    #[test]
    fn shortest_path_picks_fewest_hops() {
        let store = MemoryGraph::new();
        let a = add_node(&store, "a");
        let b = add_node(&store, "b");
        let c = add_node(&store, "c");
        let d = add_node(&store, "d");
        // Long way round: a-b-c-d. Short cut: a-d.
        connect(&store, a, b, "knows");
        connect(&store, b, c, "knows");
        connect(&store, c, d, "knows");
        connect(&store, a, d, "knows");
        assert_eq!(shortest_path(&store, a, d), vec![a, d]);
    }

    #[test]
    fn shortest_path_is_undirected() {
        let store = MemoryGraph::new();
        let a = add_node(&store, "a");
        let b = add_node(&store, "b");
        connect(&store, b, a, "knows");
        assert_eq!(shortest_path(&store, a, b), vec![a, b]);
    }

    #[test]
    fn within_steps_excludes_start_and_respects_bound() {
        let store = MemoryGraph::new();
        let a = add_node(&store, "a");
        let b = add_node(&store, "b");
        let c = add_node(&store, "c");
        let d = add_node(&store, "d");
        connect(&store, a, b, "knows");
        connect(&store, b, c, "knows");
        connect(&store, c, d, "knows");

        let filter = EdgeFilter::default();
        let reachable = within_steps(&store, a, "person", 2, &filter);
        let names: Vec<_> = reachable.iter().filter_map(|n| n.name()).collect();
        assert_eq!(names, vec!["b", "c"]);
    }

    #[test]
    fn within_steps_honors_via_and_avoid() {
        let store = MemoryGraph::new();
        let a = add_node(&store, "a");
        let b = add_node(&store, "b");
        let c = add_node(&store, "c");
        connect(&store, a, b, "knows");
        connect(&store, a, c, "blocks");

        let via = EdgeFilter {
            via: Some("knows".into()),
            avoid: None,
        };
        let found = within_steps(&store, a, "person", 2, &via);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name().as_deref(), Some("b"));

        let avoid = EdgeFilter {
            via: None,
            avoid: Some("blocks".into()),
        };
        let found = within_steps(&store, a, "person", 2, &avoid);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name().as_deref(), Some("b"));
    }

    #[test]
    fn advanced_path_is_directed_until_retry() {
        let store = MemoryGraph::new();
        let a = add_node(&store, "a");
        let b = add_node(&store, "b");
        connect(&store, b, a, "knows");

        let filter = EdgeFilter::default();
        // Directed a->b does not exist.
        assert!(advanced_path(&store, a, b, &filter, None, false).is_empty());
        // The bidirectional retry swaps endpoints and finds b->a.
        assert_eq!(
            advanced_path(&store, a, b, &filter, None, true),
            vec![b, a]
        );
    }

    #[test]
    fn advanced_path_respects_step_limit() {
        let store = MemoryGraph::new();
        let a = add_node(&store, "a");
        let b = add_node(&store, "b");
        let c = add_node(&store, "c");
        connect(&store, a, b, "knows");
        connect(&store, b, c, "knows");

        let filter = EdgeFilter::default();
        assert!(advanced_path(&store, a, c, &filter, Some(1), false).is_empty());
        assert_eq!(
            advanced_path(&store, a, c, &filter, Some(2), false),
            vec![a, b, c]
        );
    }
}
