//! The dispatcher: routes a structured query to its handler and
//! shapes every outcome into the uniform result record.
//!
//! Handlers share one pipeline for node queries: fetch by label,
//! filter through the condition evaluator, then order / offset /
//! limit. Mutating handlers flush the store afterwards; a failed
//! flush never revokes the in-memory mutation, it is logged and
//! surfaced as a warning in the result message.

use crate::aggregate;
use crate::ast::{literal_value, Condition, NodeRef, Query, QueryKind};
use crate::conditions::{self, ConditionContext};
use crate::error::{Error, Result};
use crate::join;
use crate::parser;
use crate::result::{EdgeTypeSummary, LabelSummary, Payload, QueryResult, SchemaSummary};
use crate::subquery::{self, SubqueryEngine, SubqueryOutcome, MAX_SUBQUERY_DEPTH};
use crate::traversal::{self, EdgeFilter};
use crate::variables::{self, VariableTable};
use askgraph_api::{Edge, GraphStore, Node, PropertyMap};
use std::collections::BTreeMap;

/// Executes queries against one store with one variable table.
///
/// Borrowed, not owned: the embedding layer holds the store and the
/// table and hands out executors per query.
pub struct Executor<'a> {
    store: &'a dyn GraphStore,
    variables: &'a VariableTable,
}

impl<'a> Executor<'a> {
    pub fn new(store: &'a dyn GraphStore, variables: &'a VariableTable) -> Self {
        Self { store, variables }
    }

    /// The full text pipeline: parse, substitute variables, execute.
    /// Every error becomes a failed result; this never returns `Err`.
    pub fn run(&self, text: &str) -> QueryResult {
        let mut query = match parser::parse(text) {
            Ok(query) => query,
            Err(err) => return QueryResult::failed(err.to_string()),
        };
        variables::substitute(&mut query, self.variables);
        match self.execute(&query, 0) {
            Ok(result) => result,
            Err(err) => QueryResult::failed(err.to_string()),
        }
    }

    /// Dispatches one structured query at the given nesting depth.
    pub fn execute(&self, query: &Query, depth: usize) -> Result<QueryResult> {
        if depth > MAX_SUBQUERY_DEPTH {
            return Err(Error::DepthExceeded(MAX_SUBQUERY_DEPTH));
        }
        log::debug!("executing {} at depth {depth}", query.kind.name());

        match query.kind {
            QueryKind::CreateNode => self.create_node(query),
            QueryKind::CreateEdge => self.create_edge(query),
            QueryKind::FindNodes => self.find_nodes(query, depth),
            QueryKind::FindEdges => self.find_edges(query, depth),
            QueryKind::FindPath => self.find_path(query),
            QueryKind::FindWithinSteps => self.find_within_steps(query, depth),
            QueryKind::UpdateNodes => self.update_nodes(query, depth),
            QueryKind::UpdateEdges => self.update_edges(query, depth),
            QueryKind::DeleteNodes => self.delete_nodes(query, depth),
            QueryKind::DeleteEdges => self.delete_edges(query, depth),
            QueryKind::Count => self.count(query, depth),
            QueryKind::Aggregate => self.aggregate(query, depth),
            QueryKind::DefineVariable => self.define_variable(query),
            QueryKind::Batch => self.batch(query, depth),
            QueryKind::VirtualJoin => self.virtual_join(query, depth),
            QueryKind::GroupBy => self.group_by(query, depth),
            QueryKind::OrderBy => self.order_by(query, depth),
            QueryKind::Having => Err(Error::Unsupported(
                "having outside a group query".to_string(),
            )),
            QueryKind::ShowSchema => self.show_schema(),
        }
    }

    fn require_label<'q>(&self, query: &'q Query) -> Result<&'q str> {
        query
            .label
            .as_deref()
            .ok_or_else(|| Error::Syntax(format!("{} needs a label", query.kind.name())))
    }

    /// Resolves a textual node reference to a stored node by matching
    /// the `name` property case-insensitively, narrowed by label when
    /// the reference carries one.
    fn resolve_node_ref(&self, node_ref: &NodeRef) -> Result<Node> {
        let candidates = match &node_ref.label {
            Some(label) => self.store.get_nodes_by_label(label),
            None => self.store.get_all_nodes(),
        };
        candidates
            .into_iter()
            .find(|node| {
                node.name()
                    .map(|name| name.eq_ignore_ascii_case(&node_ref.name))
                    .unwrap_or(false)
            })
            .ok_or_else(|| Error::Reference(format!("no node named '{}'", node_ref.name)))
    }

    fn filter_nodes(
        &self,
        nodes: Vec<Node>,
        conditions: &[Condition],
        depth: usize,
    ) -> Result<Vec<Node>> {
        if conditions.is_empty() {
            return Ok(nodes);
        }
        let ctx = ConditionContext {
            engine: self,
            depth,
        };
        let mut kept = Vec::with_capacity(nodes.len());
        for node in nodes {
            if conditions::evaluate(&node.properties, conditions, &ctx)? {
                kept.push(node);
            }
        }
        Ok(kept)
    }

    fn matching_nodes(&self, query: &Query, depth: usize) -> Result<Vec<Node>> {
        let label = self.require_label(query)?;
        let nodes = self.store.get_nodes_by_label(label);
        self.filter_nodes(nodes, &query.conditions, depth)
    }

    /// Raw `name=value` pairs coerced into a typed property map.
    fn properties_map(&self, pairs: &[(String, String)]) -> PropertyMap {
        pairs
            .iter()
            .map(|(key, value)| (key.to_lowercase(), literal_value(value)))
            .collect()
    }

    /// Flushes after a mutation. The mutation has already happened;
    /// a failed flush only taints the message.
    fn flushed_message(&self, base: String) -> String {
        let report = self.store.save();
        if report.ok {
            base
        } else {
            log::warn!("flush after mutation failed: {}", report.message);
            format!("{base} (warning: flush failed: {})", report.message)
        }
    }

    fn create_node(&self, query: &Query) -> Result<QueryResult> {
        let label = self.require_label(query)?;
        let props = self.properties_map(&query.properties);
        let node = self.store.add_node(Node::new(label, props))?;
        let shown = node.name().unwrap_or_else(|| node.id.to_string());
        let message = self.flushed_message(format!("created {label} '{shown}'"));
        Ok(QueryResult::ok(message, Some(Payload::Node(node))))
    }

    fn create_edge(&self, query: &Query) -> Result<QueryResult> {
        let source_ref = query
            .source
            .as_ref()
            .ok_or_else(|| Error::Syntax("connect needs a source".to_string()))?;
        let target_ref = query
            .target
            .as_ref()
            .ok_or_else(|| Error::Syntax("connect needs a target".to_string()))?;
        let source = self.resolve_node_ref(source_ref)?;
        let target = self.resolve_node_ref(target_ref)?;
        let rel = query.edge_type.as_deref().unwrap_or("related_to");
        let props = self.properties_map(&query.properties);
        let edge = self
            .store
            .add_edge(Edge::new(source.id, target.id, rel, props))?;
        let message = self.flushed_message(format!(
            "connected '{}' to '{}' as {rel}",
            source_ref.name, target_ref.name
        ));
        Ok(QueryResult::ok(message, Some(Payload::Edge(edge))))
    }

    fn find_nodes(&self, query: &Query, depth: usize) -> Result<QueryResult> {
        let label = self.require_label(query)?;
        let mut nodes = self.matching_nodes(query, depth)?;
        if !query.order_by.is_empty() {
            aggregate::order_nodes(&mut nodes, &query.order_by);
        }
        let nodes = apply_window(nodes, query.offset, query.limit);
        let message = format!("found {} {label} node(s)", nodes.len());
        Ok(QueryResult::ok(message, Some(Payload::Nodes(nodes))))
    }

    fn find_edges(&self, query: &Query, depth: usize) -> Result<QueryResult> {
        let edges = self.matching_edges(query, depth)?;
        let message = format!("found {} edge(s)", edges.len());
        Ok(QueryResult::ok(message, Some(Payload::Edges(edges))))
    }

    fn matching_edges(&self, query: &Query, depth: usize) -> Result<Vec<Edge>> {
        let mut edges = self.store.get_all_edges();
        if let Some(rel) = &query.edge_type {
            edges.retain(|edge| edge.has_type(rel));
        }
        if query.conditions.is_empty() {
            return Ok(edges);
        }
        let ctx = ConditionContext {
            engine: self,
            depth,
        };
        let mut kept = Vec::with_capacity(edges.len());
        for edge in edges {
            if conditions::evaluate(&edge.properties, &query.conditions, &ctx)? {
                kept.push(edge);
            }
        }
        Ok(kept)
    }

    fn find_path(&self, query: &Query) -> Result<QueryResult> {
        let source_ref = query
            .source
            .as_ref()
            .ok_or_else(|| Error::Syntax("find path needs a source".to_string()))?;
        let target_ref = query
            .target
            .as_ref()
            .ok_or_else(|| Error::Syntax("find path needs a target".to_string()))?;
        let source = self.resolve_node_ref(source_ref)?;
        let target = self.resolve_node_ref(target_ref)?;

        let constrained = query.edge_type.is_some()
            || query.avoid_edge_type.is_some()
            || query.max_steps.is_some()
            || query.bidirectional;
        let ids = if constrained {
            let filter = EdgeFilter {
                via: query.edge_type.clone(),
                avoid: query.avoid_edge_type.clone(),
            };
            traversal::advanced_path(
                self.store,
                source.id,
                target.id,
                &filter,
                query.max_steps,
                query.bidirectional,
            )
        } else {
            traversal::shortest_path(self.store, source.id, target.id)
        };

        if ids.is_empty() {
            let message = format!(
                "no path from '{}' to '{}'",
                source_ref.name, target_ref.name
            );
            return Ok(QueryResult::ok(message, Some(Payload::Path(Vec::new()))));
        }
        let nodes: Vec<Node> = ids
            .iter()
            .filter_map(|id| self.store.get_node(*id))
            .collect();
        let message = format!(
            "path from '{}' to '{}' in {} step(s)",
            source_ref.name,
            target_ref.name,
            nodes.len().saturating_sub(1)
        );
        Ok(QueryResult::ok(message, Some(Payload::Path(nodes))))
    }

    fn find_within_steps(&self, query: &Query, depth: usize) -> Result<QueryResult> {
        let label = self.require_label(query)?;
        let source_ref = query
            .source
            .as_ref()
            .ok_or_else(|| Error::Syntax("within-steps needs a start node".to_string()))?;
        let source = self.resolve_node_ref(source_ref)?;
        let max_steps = query.max_steps.unwrap_or(1);
        let filter = EdgeFilter {
            via: query.edge_type.clone(),
            avoid: query.avoid_edge_type.clone(),
        };
        let nodes = traversal::within_steps(self.store, source.id, label, max_steps, &filter);
        let nodes = self.filter_nodes(nodes, &query.conditions, depth)?;
        let message = format!(
            "found {} {label} node(s) within {max_steps} step(s) of '{}'",
            nodes.len(),
            source_ref.name
        );
        Ok(QueryResult::ok(message, Some(Payload::Nodes(nodes))))
    }

    fn update_nodes(&self, query: &Query, depth: usize) -> Result<QueryResult> {
        let nodes = self.matching_nodes(query, depth)?;
        let props = self.properties_map(&query.properties);
        let mut updated = 0usize;
        for node in &nodes {
            self.store.update_node_properties(node.id, props.clone())?;
            updated += 1;
        }
        let message = self.flushed_message(format!("updated {updated} node(s)"));
        Ok(QueryResult::ok(
            message,
            Some(Payload::Count(updated as u64)),
        ))
    }

    fn update_edges(&self, query: &Query, depth: usize) -> Result<QueryResult> {
        let edges = self.matching_edges(query, depth)?;
        let props = self.properties_map(&query.properties);
        let mut updated = 0usize;
        for edge in &edges {
            self.store.update_edge_properties(edge.id, props.clone())?;
            updated += 1;
        }
        let message = self.flushed_message(format!("updated {updated} edge(s)"));
        Ok(QueryResult::ok(
            message,
            Some(Payload::Count(updated as u64)),
        ))
    }

    fn delete_nodes(&self, query: &Query, depth: usize) -> Result<QueryResult> {
        let targets = match &query.source {
            Some(node_ref) => vec![self.resolve_node_ref(node_ref)?],
            None => {
                let nodes = self.matching_nodes(query, depth)?;
                // `delete Alice` without the node keyword: the word
                // parses as a label, so when it matches no label and
                // there is nothing else to narrow by, try it as a
                // node name.
                if nodes.is_empty() && query.conditions.is_empty() {
                    let label = self.require_label(query)?;
                    match self.resolve_node_ref(&NodeRef::named(label)) {
                        Ok(node) => vec![node],
                        Err(_) => nodes,
                    }
                } else {
                    nodes
                }
            }
        };
        let mut cascaded = 0usize;
        for node in &targets {
            cascaded += self.store.remove_node(node.id)?;
        }
        let message = self.flushed_message(format!(
            "deleted {} node(s) and {cascaded} incident edge(s)",
            targets.len()
        ));
        Ok(QueryResult::ok(
            message,
            Some(Payload::Count(targets.len() as u64)),
        ))
    }

    fn delete_edges(&self, query: &Query, depth: usize) -> Result<QueryResult> {
        let edges = match (&query.source, &query.target) {
            (Some(source_ref), Some(target_ref)) => {
                let source = self.resolve_node_ref(source_ref)?;
                let target = self.resolve_node_ref(target_ref)?;
                self.store
                    .get_edges_for_node(source.id)
                    .into_iter()
                    .filter(|edge| edge.touches(target.id))
                    .filter(|edge| {
                        query
                            .edge_type
                            .as_deref()
                            .map(|rel| edge.has_type(rel))
                            .unwrap_or(true)
                    })
                    .collect()
            }
            _ => self.matching_edges(query, depth)?,
        };
        for edge in &edges {
            self.store.remove_edge(edge.id)?;
        }
        let message = self.flushed_message(format!("deleted {} edge(s)", edges.len()));
        Ok(QueryResult::ok(
            message,
            Some(Payload::Count(edges.len() as u64)),
        ))
    }

    fn count(&self, query: &Query, depth: usize) -> Result<QueryResult> {
        let label = self.require_label(query)?;
        let nodes = self.matching_nodes(query, depth)?;
        let message = format!("counted {} {label} node(s)", nodes.len());
        Ok(QueryResult::ok(
            message,
            Some(Payload::Count(nodes.len() as u64)),
        ))
    }

    fn aggregate(&self, query: &Query, depth: usize) -> Result<QueryResult> {
        let spec = query
            .aggregate
            .as_ref()
            .ok_or_else(|| Error::Syntax("aggregate needs a function and property".to_string()))?;
        let nodes = self.matching_nodes(query, depth)?;
        let outcome = aggregate::aggregate_over(
            nodes.iter().map(|node| &node.properties),
            spec.function,
            &spec.property,
        );
        let mut message = match outcome.value {
            Some(value) => format!("{} of {} is {value}", spec.function.name(), spec.property),
            None => format!(
                "{} of {} has no value over an empty set",
                spec.function.name(),
                spec.property
            ),
        };
        if outcome.skipped > 0 {
            message.push_str(&format!(" ({} non-numeric value(s) skipped)", outcome.skipped));
        }
        Ok(QueryResult::ok(message, Some(Payload::Aggregate(outcome.value))))
    }

    fn define_variable(&self, query: &Query) -> Result<QueryResult> {
        let name = query
            .variable_name
            .as_deref()
            .ok_or_else(|| Error::Syntax("define variable needs a name".to_string()))?;
        let raw = query
            .variable_value
            .as_deref()
            .ok_or_else(|| Error::Syntax("define variable needs a value".to_string()))?;
        let value = literal_value(raw);
        self.variables.define(name, value.clone());
        let message = format!("defined ${name} = {}", value.to_display_string());
        Ok(QueryResult::ok(message, None))
    }

    /// Executes batch items in order. A failed item becomes a failed
    /// entry in the batch payload; later items still run.
    fn batch(&self, query: &Query, depth: usize) -> Result<QueryResult> {
        let mut results = Vec::with_capacity(query.batch.len());
        let mut failures = 0usize;
        for item in &query.batch {
            let result = match self.execute(item, depth) {
                Ok(result) => result,
                Err(err) => QueryResult::failed(err.to_string()),
            };
            if !result.success {
                failures += 1;
            }
            results.push(result);
        }
        let message = if failures == 0 {
            format!("ran {} statement(s)", results.len())
        } else {
            format!("ran {} statement(s), {failures} failed", results.len())
        };
        Ok(QueryResult::ok(message, Some(Payload::Batch(results))))
    }

    fn virtual_join(&self, query: &Query, depth: usize) -> Result<QueryResult> {
        let spec = query
            .join
            .as_ref()
            .ok_or_else(|| Error::Syntax("join needs source and target labels".to_string()))?;
        let ctx = ConditionContext {
            engine: self,
            depth,
        };
        let records = join::virtual_join(self.store, spec, &ctx)?;
        let message = format!(
            "joined {} to {}: {} pair(s)",
            spec.source_label,
            spec.target_label,
            records.len()
        );
        Ok(QueryResult::ok(message, Some(Payload::Records(records))))
    }

    fn group_by(&self, query: &Query, depth: usize) -> Result<QueryResult> {
        let nodes = self.matching_nodes(query, depth)?;
        let mut records = aggregate::group_nodes(&nodes, &query.group_by);
        if !query.having.is_empty() {
            let ctx = ConditionContext {
                engine: self,
                depth,
            };
            let mut kept = Vec::with_capacity(records.len());
            for record in records {
                // Having filters the computed group records, not the
                // underlying nodes.
                if conditions::evaluate(&record, &query.having, &ctx)? {
                    kept.push(record);
                }
            }
            records = kept;
        }
        let message = format!("{} group(s)", records.len());
        Ok(QueryResult::ok(message, Some(Payload::Records(records))))
    }

    fn order_by(&self, query: &Query, depth: usize) -> Result<QueryResult> {
        let mut nodes = self.matching_nodes(query, depth)?;
        aggregate::order_nodes(&mut nodes, &query.order_by);
        let nodes = apply_window(nodes, query.offset, query.limit);
        let message = format!("ordered {} node(s)", nodes.len());
        Ok(QueryResult::ok(message, Some(Payload::Nodes(nodes))))
    }

    fn show_schema(&self) -> Result<QueryResult> {
        let mut labels: BTreeMap<String, (usize, std::collections::BTreeSet<String>)> =
            BTreeMap::new();
        for node in self.store.get_all_nodes() {
            let entry = labels.entry(node.label.to_lowercase()).or_default();
            entry.0 += 1;
            entry.1.extend(node.properties.keys().cloned());
        }
        let mut edge_types: BTreeMap<String, usize> = BTreeMap::new();
        for edge in self.store.get_all_edges() {
            *edge_types.entry(edge.rel_type.to_lowercase()).or_default() += 1;
        }
        let summary = SchemaSummary {
            labels: labels
                .into_iter()
                .map(|(label, (count, properties))| LabelSummary {
                    label,
                    count,
                    properties: properties.into_iter().collect(),
                })
                .collect(),
            edge_types: edge_types
                .into_iter()
                .map(|(rel_type, count)| EdgeTypeSummary { rel_type, count })
                .collect(),
        };
        let message = format!(
            "{} label(s), {} edge type(s)",
            summary.labels.len(),
            summary.edge_types.len()
        );
        Ok(QueryResult::ok(message, Some(Payload::Schema(summary))))
    }
}

impl SubqueryEngine for Executor<'_> {
    fn run_subquery(&self, query: &Query, depth: usize) -> Result<SubqueryOutcome> {
        let result = self.execute(query, depth)?;
        Ok(subquery::extract_values(
            &result,
            query.projection.as_deref(),
        ))
    }
}

fn apply_window(nodes: Vec<Node>, offset: Option<usize>, limit: Option<usize>) -> Vec<Node> {
    let mut iter = nodes.into_iter().skip(offset.unwrap_or(0));
    match limit {
        Some(limit) => iter.by_ref().take(limit).collect(),
        None => iter.collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use askgraph_storage::MemoryGraph;

    fn db() -> (MemoryGraph, VariableTable) {
        (MemoryGraph::new(), VariableTable::new())
    }

    fn run(store: &MemoryGraph, vars: &VariableTable, text: &str) -> QueryResult {
        Executor::new(store, vars).run(text)
    }

    fn seed_people(store: &MemoryGraph, vars: &VariableTable) {
        for statement in [
            "create person name=\"Alice\", age=30, city=\"Berlin\"",
            "create person name=\"Bob\", age=25, city=\"Paris\"",
            "create person name=\"Carol\", age=35, city=\"Berlin\"",
        ] {
            assert!(run(store, vars, statement).success, "seed failed: {statement}");
        }
    }

    #[test]
    fn create_then_find_with_conditions() {
        let (store, vars) = db();
        seed_people(&store, &vars);

        let result = run(&store, &vars, "find person where age > 26 and city = \"Berlin\"");
        assert!(result.success);
        let names: Vec<_> = result.nodes().iter().filter_map(|n| n.name()).collect();
        assert_eq!(names, vec!["Alice", "Carol"]);
    }

    #[test]
    fn or_conditions_widen_the_match() {
        let (store, vars) = db();
        seed_people(&store, &vars);
        let result = run(&store, &vars, "find person where age < 26 or city = \"Berlin\"");
        assert_eq!(result.nodes().len(), 3);
    }

    #[test]
    fn connect_and_find_path() {
        let (store, vars) = db();
        seed_people(&store, &vars);
        assert!(run(&store, &vars, "connect Alice to Bob as knows").success);
        assert!(run(&store, &vars, "connect Bob to Carol as knows").success);

        let result = run(&store, &vars, "find path from Alice to Carol");
        assert!(result.success);
        let names: Vec<_> = result.nodes().iter().filter_map(|n| n.name()).collect();
        assert_eq!(names, vec!["Alice", "Bob", "Carol"]);
    }

    #[test]
    fn missing_path_is_success_with_empty_payload() {
        let (store, vars) = db();
        seed_people(&store, &vars);
        let result = run(&store, &vars, "find path from Alice to Carol");
        assert!(result.success);
        assert!(result.nodes().is_empty());
        assert!(result.message.contains("no path"));
    }

    #[test]
    fn unknown_node_reference_fails_with_error() {
        let (store, vars) = db();
        let result = run(&store, &vars, "find path from Ghost to Nobody");
        assert!(!result.success);
        assert!(result.error.as_deref().unwrap_or("").contains("Ghost"));
    }

    #[test]
    fn within_steps_via_edge_type() {
        let (store, vars) = db();
        seed_people(&store, &vars);
        run(&store, &vars, "connect Alice to Bob as knows");
        run(&store, &vars, "connect Bob to Carol as blocks");

        let result = run(&store, &vars, "find person within 2 steps of Alice via knows");
        let names: Vec<_> = result.nodes().iter().filter_map(|n| n.name()).collect();
        assert_eq!(names, vec!["Bob"]);
    }

    #[test]
    fn update_then_verify() {
        let (store, vars) = db();
        seed_people(&store, &vars);
        let result = run(&store, &vars, "update person set age=31 where name = \"Alice\"");
        assert!(result.success);
        assert_eq!(result.count(), Some(1));

        let check = run(&store, &vars, "find person where age = 31");
        assert_eq!(check.nodes().len(), 1);
        assert_eq!(check.nodes()[0].name().as_deref(), Some("Alice"));
    }

    #[test]
    fn delete_node_cascades() {
        let (store, vars) = db();
        seed_people(&store, &vars);
        run(&store, &vars, "connect Alice to Bob as knows");
        let result = run(&store, &vars, "delete node Alice");
        assert!(result.success);
        assert!(result.message.contains("1 incident edge(s)"));
        assert_eq!(run(&store, &vars, "count person").count(), Some(2));
        assert!(run(&store, &vars, "find edges").edges().is_empty());
    }

    #[test]
    fn bare_delete_falls_back_to_a_node_name() {
        let (store, vars) = db();
        seed_people(&store, &vars);
        run(&store, &vars, "connect Alice to Bob as knows");

        let result = run(&store, &vars, "delete Alice");
        assert!(result.success);
        assert_eq!(run(&store, &vars, "count person").count(), Some(2));
        assert!(run(&store, &vars, "find edges").edges().is_empty());

        // A real label still wins over the name fallback.
        let result = run(&store, &vars, "delete person");
        assert!(result.success);
        assert_eq!(run(&store, &vars, "count person").count(), Some(0));
    }

    #[test]
    fn count_and_aggregates() {
        let (store, vars) = db();
        seed_people(&store, &vars);
        assert_eq!(run(&store, &vars, "count person").count(), Some(3));
        assert_eq!(
            run(&store, &vars, "avg age of person").aggregate(),
            Some(30.0)
        );
        assert_eq!(
            run(&store, &vars, "max age of people").aggregate(),
            Some(35.0)
        );
    }

    #[test]
    fn empty_set_aggregate_has_no_value() {
        let (store, vars) = db();
        let result = run(&store, &vars, "avg age of person");
        assert!(result.success);
        assert_eq!(result.aggregate(), None);
        assert!(result.message.contains("no value"));

        let sum = run(&store, &vars, "sum age of person");
        assert_eq!(sum.aggregate(), Some(0.0));
    }

    #[test]
    fn variables_flow_through_queries() {
        let (store, vars) = db();
        seed_people(&store, &vars);
        assert!(run(&store, &vars, "define variable city = \"Berlin\"").success);
        let result = run(&store, &vars, "find person where city = \"$city\"");
        assert_eq!(result.nodes().len(), 2);

        // Unknown variables stay as literal text and match nothing.
        let result = run(&store, &vars, "find person where city = \"$nowhere\"");
        assert!(result.success);
        assert!(result.nodes().is_empty());
    }

    #[test]
    fn subquery_membership() {
        let (store, vars) = db();
        seed_people(&store, &vars);
        run(&store, &vars, "create employee name=\"Alice\", salary=100");
        let result = run(
            &store,
            &vars,
            "find person where name in (select name from employee)",
        );
        assert_eq!(result.nodes().len(), 1);
        assert_eq!(result.nodes()[0].name().as_deref(), Some("Alice"));
    }

    #[test]
    fn aggregate_comparison_subquery() {
        let (store, vars) = db();
        seed_people(&store, &vars);
        let result = run(
            &store,
            &vars,
            "find person where age > (avg(age) from person)",
        );
        assert_eq!(result.nodes().len(), 1);
        assert_eq!(result.nodes()[0].name().as_deref(), Some("Carol"));
    }

    #[test]
    fn batch_keeps_going_after_a_failure() {
        let (store, vars) = db();
        let result = run(
            &store,
            &vars,
            "create person name=\"A\"; find path from X to Y; create person name=\"B\"",
        );
        assert!(result.success);
        match &result.data {
            Some(Payload::Batch(items)) => {
                assert_eq!(items.len(), 3);
                assert!(items[0].success);
                assert!(!items[1].success);
                assert!(items[2].success);
            }
            other => panic!("expected batch payload, got {other:?}"),
        }
        assert_eq!(run(&store, &vars, "count person").count(), Some(2));
    }

    #[test]
    fn group_by_with_having() {
        let (store, vars) = db();
        seed_people(&store, &vars);
        let result = run(&store, &vars, "group person by city having count > 1");
        assert!(result.success);
        let records = result.records();
        assert_eq!(records.len(), 1);
        assert_eq!(
            records[0].get("city"),
            Some(&askgraph_api::PropertyValue::String("Berlin".into()))
        );
    }

    #[test]
    fn order_by_with_window() {
        let (store, vars) = db();
        seed_people(&store, &vars);
        let result = run(&store, &vars, "order person by age desc limit 2");
        let names: Vec<_> = result.nodes().iter().filter_map(|n| n.name()).collect();
        assert_eq!(names, vec!["Carol", "Alice"]);
    }

    #[test]
    fn schema_summary() {
        let (store, vars) = db();
        seed_people(&store, &vars);
        run(&store, &vars, "connect Alice to Bob as knows");
        let result = run(&store, &vars, "show schema");
        match &result.data {
            Some(Payload::Schema(summary)) => {
                assert_eq!(summary.labels.len(), 1);
                assert_eq!(summary.labels[0].label, "person");
                assert_eq!(summary.labels[0].count, 3);
                assert_eq!(summary.edge_types.len(), 1);
                assert_eq!(summary.edge_types[0].rel_type, "knows");
            }
            other => panic!("expected schema payload, got {other:?}"),
        }
    }

    #[test]
    fn having_outside_a_group_is_unsupported() {
        let (store, vars) = db();
        let result = run(&store, &vars, "having count > 1");
        assert!(!result.success);
        assert!(result
            .error
            .as_deref()
            .unwrap_or("")
            .contains("unsupported"));
    }

    #[test]
    fn runaway_subquery_depth_fails_cleanly() {
        let (store, vars) = db();
        let mut query = Query::new(QueryKind::Count);
        query.label = Some("person".into());
        let executor = Executor::new(&store, &vars);
        let err = executor.execute(&query, MAX_SUBQUERY_DEPTH + 1).unwrap_err();
        assert!(matches!(err, Error::DepthExceeded(_)));
    }
}
