//! In-memory reference implementation of [`GraphStore`].
//!
//! The whole graph lives behind one `Mutex`: every public read or
//! write holds it for its full duration. That is a deliberate
//! simplicity-over-throughput choice for an embedded single-process
//! store; moving to reader-writer locking is a future improvement,
//! not a requirement of the engine.
//!
//! Persistence is a JSON snapshot of the full node and edge sets.
//! The snapshot is a stand-in collaborator: the engine only needs
//! `load`/`save` with a status report, not a particular format.

use askgraph_api::{
    Edge, EntityId, GraphStore, Node, PropertyMap, StoreError, StoreReport, StoreResult,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Everything guarded by the store lock.
///
/// `node_order` / `edge_order` preserve insertion order so that
/// listing operations and adjacency walks are deterministic; the
/// traversal engine's tie-breaking depends on that.
#[derive(Debug, Default)]
struct GraphState {
    nodes: HashMap<EntityId, Node>,
    edges: HashMap<EntityId, Edge>,
    node_order: Vec<EntityId>,
    edge_order: Vec<EntityId>,
    /// label (lowercased) -> node ids in insertion order.
    label_index: HashMap<String, Vec<EntityId>>,
    /// node id -> incident edge ids (both directions) in insertion order.
    adjacency: HashMap<EntityId, Vec<EntityId>>,
}

impl GraphState {
    fn insert_node(&mut self, node: Node) {
        self.label_index
            .entry(node.label.to_lowercase())
            .or_default()
            .push(node.id);
        self.node_order.push(node.id);
        self.nodes.insert(node.id, node);
    }

    fn insert_edge(&mut self, edge: Edge) {
        self.adjacency.entry(edge.source).or_default().push(edge.id);
        if edge.target != edge.source {
            self.adjacency.entry(edge.target).or_default().push(edge.id);
        }
        self.edge_order.push(edge.id);
        self.edges.insert(edge.id, edge);
    }

    fn detach_edge(&mut self, edge: &Edge) {
        for end in [edge.source, edge.target] {
            if let Some(ids) = self.adjacency.get_mut(&end) {
                ids.retain(|id| *id != edge.id);
            }
        }
        self.edge_order.retain(|id| *id != edge.id);
    }

    fn remove_node_entry(&mut self, id: EntityId, node: &Node) {
        if let Some(ids) = self.label_index.get_mut(&node.label.to_lowercase()) {
            ids.retain(|n| *n != id);
        }
        self.node_order.retain(|n| *n != id);
        self.adjacency.remove(&id);
        self.nodes.remove(&id);
    }
}

/// Serialized form of the graph for `load`/`save`.
#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    nodes: Vec<Node>,
    edges: Vec<Edge>,
}

/// Coarse-locked in-memory graph store.
///
/// Constructed either purely in memory or bound to a snapshot file
/// that `load`/`save` read and write.
#[derive(Debug)]
pub struct MemoryGraph {
    state: Mutex<GraphState>,
    path: Option<PathBuf>,
}

impl Default for MemoryGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryGraph {
    /// A store with no backing file. `save` and `load` are no-ops
    /// that report success.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(GraphState::default()),
            path: None,
        }
    }

    /// A store bound to a snapshot file. The file is not read until
    /// `load` is called.
    pub fn with_path(path: impl AsRef<Path>) -> Self {
        Self {
            state: Mutex::new(GraphState::default()),
            path: Some(path.as_ref().to_path_buf()),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn write_snapshot(&self, path: &Path, snapshot: &Snapshot) -> StoreResult<()> {
        let json = serde_json::to_string(snapshot)
            .map_err(|e| StoreError::Persistence(e.to_string()))?;
        std::fs::write(path, json)?;
        Ok(())
    }

    fn read_snapshot(&self, path: &Path) -> StoreResult<Snapshot> {
        let json = std::fs::read_to_string(path)?;
        serde_json::from_str(&json).map_err(|e| StoreError::Persistence(e.to_string()))
    }
}

impl GraphStore for MemoryGraph {
    fn add_node(&self, node: Node) -> StoreResult<Node> {
        let mut state = self.state.lock().unwrap();
        state.insert_node(node.clone());
        Ok(node)
    }

    fn add_edge(&self, edge: Edge) -> StoreResult<Edge> {
        let mut state = self.state.lock().unwrap();
        if !state.nodes.contains_key(&edge.source) {
            return Err(StoreError::MissingEndpoint(edge.source));
        }
        if !state.nodes.contains_key(&edge.target) {
            return Err(StoreError::MissingEndpoint(edge.target));
        }
        state.insert_edge(edge.clone());
        Ok(edge)
    }

    fn get_node(&self, id: EntityId) -> Option<Node> {
        let state = self.state.lock().unwrap();
        state.nodes.get(&id).cloned()
    }

    fn get_edges_for_node(&self, id: EntityId) -> Vec<Edge> {
        let state = self.state.lock().unwrap();
        state
            .adjacency
            .get(&id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|eid| state.edges.get(eid).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn get_nodes_by_label(&self, label: &str) -> Vec<Node> {
        let state = self.state.lock().unwrap();
        state
            .label_index
            .get(&label.to_lowercase())
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| state.nodes.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn get_all_nodes(&self) -> Vec<Node> {
        let state = self.state.lock().unwrap();
        state
            .node_order
            .iter()
            .filter_map(|id| state.nodes.get(id).cloned())
            .collect()
    }

    fn get_all_edges(&self) -> Vec<Edge> {
        let state = self.state.lock().unwrap();
        state
            .edge_order
            .iter()
            .filter_map(|id| state.edges.get(id).cloned())
            .collect()
    }

    fn update_node_properties(&self, id: EntityId, properties: PropertyMap) -> StoreResult<Node> {
        let mut state = self.state.lock().unwrap();
        let node = state
            .nodes
            .get_mut(&id)
            .ok_or(StoreError::NodeNotFound(id))?;
        node.properties.extend(properties);
        node.updated_at = chrono_now();
        Ok(node.clone())
    }

    fn update_edge_properties(&self, id: EntityId, properties: PropertyMap) -> StoreResult<Edge> {
        let mut state = self.state.lock().unwrap();
        let edge = state
            .edges
            .get_mut(&id)
            .ok_or(StoreError::EdgeNotFound(id))?;
        edge.properties.extend(properties);
        edge.updated_at = chrono_now();
        Ok(edge.clone())
    }

    fn remove_node(&self, id: EntityId) -> StoreResult<usize> {
        let mut state = self.state.lock().unwrap();
        let node = state
            .nodes
            .get(&id)
            .cloned()
            .ok_or(StoreError::NodeNotFound(id))?;

        let incident: Vec<Edge> = state
            .adjacency
            .get(&id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|eid| state.edges.get(eid).cloned())
                    .collect()
            })
            .unwrap_or_default();
        for edge in &incident {
            state.detach_edge(edge);
            state.edges.remove(&edge.id);
        }

        state.remove_node_entry(id, &node);
        Ok(incident.len())
    }

    fn remove_edge(&self, id: EntityId) -> StoreResult<()> {
        let mut state = self.state.lock().unwrap();
        let edge = state
            .edges
            .get(&id)
            .cloned()
            .ok_or(StoreError::EdgeNotFound(id))?;
        state.detach_edge(&edge);
        state.edges.remove(&id);
        Ok(())
    }

    fn load(&self) -> StoreReport {
        let Some(path) = &self.path else {
            return StoreReport::ok("in-memory store, nothing to load");
        };
        if !path.exists() {
            return StoreReport::ok(format!("no snapshot at {}, starting empty", path.display()));
        }
        let snapshot = match self.read_snapshot(path) {
            Ok(s) => s,
            Err(e) => return StoreReport::failed(format!("load failed: {e}")),
        };

        let mut state = self.state.lock().unwrap();
        *state = GraphState::default();
        let (node_count, edge_count) = (snapshot.nodes.len(), snapshot.edges.len());
        for node in snapshot.nodes {
            state.insert_node(node);
        }
        for edge in snapshot.edges {
            // A snapshot edge whose endpoints vanished is dropped
            // rather than poisoning the whole load.
            if state.nodes.contains_key(&edge.source) && state.nodes.contains_key(&edge.target) {
                state.insert_edge(edge);
            } else {
                log::warn!("dropping snapshot edge {} with missing endpoint", edge.id);
            }
        }
        StoreReport::ok(format!(
            "loaded {node_count} nodes and {edge_count} edges from {}",
            path.display()
        ))
    }

    fn save(&self) -> StoreReport {
        let Some(path) = &self.path else {
            return StoreReport::ok("in-memory store, nothing to save");
        };
        let snapshot = {
            let state = self.state.lock().unwrap();
            Snapshot {
                nodes: state
                    .node_order
                    .iter()
                    .filter_map(|id| state.nodes.get(id).cloned())
                    .collect(),
                edges: state
                    .edge_order
                    .iter()
                    .filter_map(|id| state.edges.get(id).cloned())
                    .collect(),
            }
        };
        match self.write_snapshot(path, &snapshot) {
            Ok(()) => StoreReport::ok(format!(
                "saved {} nodes and {} edges to {}",
                snapshot.nodes.len(),
                snapshot.edges.len(),
                path.display()
            )),
            Err(e) => StoreReport::failed(format!("save failed: {e}")),
        }
    }
}

fn chrono_now() -> chrono::DateTime<chrono::Utc> {
    chrono::Utc::now()
}
