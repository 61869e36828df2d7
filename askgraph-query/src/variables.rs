//! The variable table and `$name` substitution.
//!
//! Variables are defined by `define variable` queries, looked up
//! sigil- and case-insensitively, and substituted into every
//! text-bearing field of a parsed query before dispatch. Unknown
//! variables are left in place: substitution is best-effort and never
//! fails a query on its own.

use crate::ast::{Condition, ConditionValue, JoinRule, NodeRef, Query};
use askgraph_api::PropertyValue;
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::{OnceLock, RwLock};

fn variable_token_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\$[A-Za-z_][A-Za-z0-9_]*").unwrap())
}

/// Canonical lookup key: sigil stripped, lowercased.
fn normalize(name: &str) -> String {
    name.trim().trim_start_matches('$').to_lowercase()
}

/// Name → value table shared by all queries on one database handle.
///
/// Reads happen concurrently during query execution; defines are
/// serialized through the write half of the lock, the same policy as
/// graph mutations. Contents are never persisted.
#[derive(Debug, Default)]
pub struct VariableTable {
    inner: RwLock<BTreeMap<String, PropertyValue>>,
}

impl VariableTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defines or redefines a variable. The name may carry a `$`
    /// sigil or not; both forms address the same entry.
    pub fn define(&self, name: &str, value: PropertyValue) {
        let mut inner = self.inner.write().unwrap();
        inner.insert(normalize(name), value);
    }

    pub fn get(&self, name: &str) -> Option<PropertyValue> {
        let inner = self.inner.read().unwrap();
        inner.get(&normalize(name)).cloned()
    }

    pub fn get_all(&self) -> BTreeMap<String, PropertyValue> {
        let inner = self.inner.read().unwrap();
        inner.clone()
    }

    pub fn clear(&self) {
        let mut inner = self.inner.write().unwrap();
        inner.clear();
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Replaces every `$name` token in the text with the stringified
/// variable value. Tokens naming unknown variables stay as written.
pub fn substitute_text(text: &str, table: &VariableTable) -> String {
    variable_token_pattern()
        .replace_all(text, |caps: &regex::Captures<'_>| {
            let token = &caps[0];
            match table.get(token) {
                Some(value) => value.to_display_string(),
                None => token.to_string(),
            }
        })
        .into_owned()
}

fn substitute_opt(field: &mut Option<String>, table: &VariableTable) {
    if let Some(text) = field {
        *text = substitute_text(text, table);
    }
}

fn substitute_ref(field: &mut Option<NodeRef>, table: &VariableTable) {
    if let Some(node_ref) = field {
        if let Some(label) = &mut node_ref.label {
            *label = substitute_text(label, table);
        }
        node_ref.name = substitute_text(&node_ref.name, table);
    }
}

fn substitute_conditions(conditions: &mut [Condition], table: &VariableTable) {
    for condition in conditions {
        condition.property = substitute_text(&condition.property, table);
        match &mut condition.value {
            ConditionValue::Text(text) => *text = substitute_text(text, table),
            ConditionValue::Subquery(sub) => substitute(sub, table),
        }
    }
}

/// Walks every text-bearing field of the query, including nested
/// subqueries and batch items, replacing `$name` tokens.
///
/// Idempotent: once a token is replaced it is gone, and unknown
/// tokens are reproduced verbatim, so a second pass is a no-op.
pub fn substitute(query: &mut Query, table: &VariableTable) {
    substitute_opt(&mut query.label, table);
    substitute_ref(&mut query.source, table);
    substitute_ref(&mut query.target, table);
    substitute_opt(&mut query.edge_type, table);
    substitute_opt(&mut query.avoid_edge_type, table);
    substitute_opt(&mut query.projection, table);
    substitute_opt(&mut query.variable_value, table);

    for (key, value) in &mut query.properties {
        *key = substitute_text(key, table);
        *value = substitute_text(value, table);
    }
    substitute_conditions(&mut query.conditions, table);
    substitute_conditions(&mut query.having, table);

    if let Some(spec) = &mut query.aggregate {
        spec.property = substitute_text(&spec.property, table);
    }
    for key in &mut query.group_by {
        *key = substitute_text(key, table);
    }
    for order in &mut query.order_by {
        order.property = substitute_text(&order.property, table);
    }
    if let Some(join) = &mut query.join {
        join.source_label = substitute_text(&join.source_label, table);
        join.target_label = substitute_text(&join.target_label, table);
        if let JoinRule::EdgeType(rel) = &mut join.rule {
            *rel = substitute_text(rel, table);
        }
        if let JoinRule::SharedProperty { property, .. } = &mut join.rule {
            *property = substitute_text(property, table);
        }
        substitute_conditions(&mut join.conditions, table);
    }
    for sub in &mut query.batch {
        substitute(sub, table);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Connective, Operator, QueryKind};

    #[test]
    fn lookup_ignores_sigil_and_case() {
        let table = VariableTable::new();
        table.define("$Role", PropertyValue::String("dev".into()));
        assert_eq!(
            table.get("role"),
            Some(PropertyValue::String("dev".into()))
        );
        assert_eq!(
            table.get("$ROLE"),
            Some(PropertyValue::String("dev".into()))
        );
    }

    #[test]
    fn unknown_tokens_stay_in_place() {
        let table = VariableTable::new();
        assert_eq!(substitute_text("x = $missing", &table), "x = $missing");
    }

    #[test]
    fn tokens_inside_quotes_are_replaced() {
        let table = VariableTable::new();
        table.define("role", PropertyValue::String("dev".into()));
        assert_eq!(substitute_text("\"$role\"", &table), "\"dev\"");
    }

    #[test]
    fn substitution_is_idempotent() {
        let table = VariableTable::new();
        table.define("role", PropertyValue::String("dev".into()));
        table.define("min_age", PropertyValue::Int(21));

        let mut query = Query::new(QueryKind::FindNodes);
        query.label = Some("person".into());
        query.conditions.push(Condition::new(
            Connective::And,
            "role",
            Operator::Eq,
            ConditionValue::Text("$role".into()),
        ));
        query.conditions.push(Condition::new(
            Connective::And,
            "age",
            Operator::Gt,
            ConditionValue::Text("$min_age".into()),
        ));
        query.conditions.push(Condition::new(
            Connective::And,
            "team",
            Operator::Eq,
            ConditionValue::Text("$undefined".into()),
        ));

        substitute(&mut query, &table);
        let once = query.clone();
        substitute(&mut query, &table);
        assert_eq!(query, once);

        let values: Vec<_> = once
            .conditions
            .iter()
            .map(|c| match &c.value {
                ConditionValue::Text(t) => t.clone(),
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(values, vec!["dev", "21", "$undefined"]);
    }
}
