//! Aggregation, grouping, and ordering over filtered entity sets.
//!
//! Numeric coercion accepts ints, floats, and parseable numeric
//! strings; everything else is skipped and counted so the result
//! message can say how many values were ignored. The empty-set
//! policy is deliberate and asymmetric: sum and count yield zero,
//! avg/min/max yield no value at all.

use crate::ast::{AggregateFn, OrderKey, SortDirection};
use crate::conditions;
use askgraph_api::{Node, PropertyMap, PropertyValue};
use ordered_float::OrderedFloat;
use std::collections::BTreeMap;

/// Result of one aggregate run: the value (None only for avg/min/max
/// over an empty set), plus how many candidates were skipped as
/// non-numeric.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateOutcome {
    pub value: Option<f64>,
    pub considered: usize,
    pub skipped: usize,
}

/// Applies an aggregate function to one property across a property
/// map per entity.
pub fn aggregate_over<'a>(
    entities: impl Iterator<Item = &'a PropertyMap>,
    function: AggregateFn,
    property: &str,
) -> AggregateOutcome {
    let mut values: Vec<f64> = Vec::new();
    let mut skipped = 0usize;
    for props in entities {
        match conditions::lookup_property(props, property).and_then(|v| v.as_f64()) {
            Some(v) => values.push(v),
            None => skipped += 1,
        }
    }
    if skipped > 0 {
        log::warn!("aggregate on '{property}' skipped {skipped} non-numeric values");
    }

    let considered = values.len();
    let value = match function {
        AggregateFn::Count => Some(considered as f64),
        AggregateFn::Sum => Some(values.iter().sum()),
        AggregateFn::Avg => {
            if values.is_empty() {
                None
            } else {
                Some(values.iter().sum::<f64>() / values.len() as f64)
            }
        }
        AggregateFn::Min => values
            .iter()
            .copied()
            .min_by_key(|v| OrderedFloat(*v)),
        AggregateFn::Max => values
            .iter()
            .copied()
            .max_by_key(|v| OrderedFloat(*v)),
    };
    AggregateOutcome {
        value,
        considered,
        skipped,
    }
}

/// Partitions nodes by a tuple of property values and computes the
/// per-group record: the key properties, a `count`, and
/// `<prop>_min` / `<prop>_avg` / `<prop>_max` for each grouped
/// property that coerces numerically.
///
/// A missing property counts as a null tuple member, so nodes
/// lacking a key still form a group rather than vanishing.
pub fn group_nodes(nodes: &[Node], keys: &[String]) -> Vec<PropertyMap> {
    // BTreeMap keyed by rendered tuple keeps group order stable.
    let mut groups: BTreeMap<Vec<String>, Vec<&Node>> = BTreeMap::new();
    for node in nodes {
        let tuple: Vec<String> = keys
            .iter()
            .map(|key| {
                conditions::lookup_property(&node.properties, key)
                    .map(|v| v.to_display_string())
                    .unwrap_or_else(|| "null".to_string())
            })
            .collect();
        groups.entry(tuple).or_default().push(node);
    }

    let mut records = Vec::with_capacity(groups.len());
    for (tuple, members) in groups {
        let mut record = PropertyMap::new();
        for (key, value) in keys.iter().zip(tuple) {
            record.insert(key.clone(), PropertyValue::String(value));
        }
        record.insert("count".to_string(), PropertyValue::Int(members.len() as i64));
        for key in keys {
            for (suffix, function) in [
                ("min", AggregateFn::Min),
                ("avg", AggregateFn::Avg),
                ("max", AggregateFn::Max),
            ] {
                let outcome =
                    aggregate_over(members.iter().map(|n| &n.properties), function, key);
                if let Some(value) = outcome.value {
                    record.insert(format!("{key}_{suffix}"), PropertyValue::Float(value));
                }
            }
        }
        records.push(record);
    }
    records
}

/// Stable multi-key sort, left-to-right key precedence, ascending or
/// descending per key. Entities missing a sort key order after those
/// that have it.
pub fn order_nodes(nodes: &mut [Node], keys: &[OrderKey]) {
    nodes.sort_by(|a, b| {
        for key in keys {
            let va = conditions::lookup_property(&a.properties, &key.property);
            let vb = conditions::lookup_property(&b.properties, &key.property);
            let ordering = match (va, vb) {
                (Some(x), Some(y)) => conditions::compare_values(&x, &y),
                (Some(_), None) => std::cmp::Ordering::Less,
                (None, Some(_)) => std::cmp::Ordering::Greater,
                (None, None) => std::cmp::Ordering::Equal,
            };
            let ordering = match key.direction {
                SortDirection::Asc => ordering,
                SortDirection::Desc => ordering.reverse(),
            };
            if ordering != std::cmp::Ordering::Equal {
                return ordering;
            }
        }
        std::cmp::Ordering::Equal
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn props(pairs: &[(&str, PropertyValue)]) -> PropertyMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn person(name: &str, age: PropertyValue, dept: &str) -> Node {
        Node::new(
            "person",
            props(&[
                ("name", PropertyValue::String(name.into())),
                ("age", age),
                ("dept", PropertyValue::String(dept.into())),
            ]),
        )
    }

    #[test]
    fn empty_set_policy() {
        let maps: Vec<PropertyMap> = Vec::new();
        assert_eq!(
            aggregate_over(maps.iter(), AggregateFn::Sum, "age").value,
            Some(0.0)
        );
        assert_eq!(
            aggregate_over(maps.iter(), AggregateFn::Count, "age").value,
            Some(0.0)
        );
        assert_eq!(aggregate_over(maps.iter(), AggregateFn::Avg, "age").value, None);
        assert_eq!(aggregate_over(maps.iter(), AggregateFn::Min, "age").value, None);
        assert_eq!(aggregate_over(maps.iter(), AggregateFn::Max, "age").value, None);
    }

    #[test]
    fn numeric_strings_count_and_junk_is_skipped() {
        let maps = vec![
            props(&[("age", PropertyValue::Int(30))]),
            props(&[("age", PropertyValue::String("20".into()))]),
            props(&[("age", PropertyValue::String("old".into()))]),
            props(&[("name", PropertyValue::String("no age".into()))]),
        ];
        let outcome = aggregate_over(maps.iter(), AggregateFn::Sum, "age");
        assert_eq!(outcome.value, Some(50.0));
        assert_eq!(outcome.considered, 2);
        assert_eq!(outcome.skipped, 2);
    }

    #[test]
    fn grouping_treats_missing_as_null() {
        let nodes = vec![
            person("a", PropertyValue::Int(30), "sales"),
            person("b", PropertyValue::Int(20), "sales"),
            Node::new("person", props(&[("age", PropertyValue::Int(40))])),
        ];
        let records = group_nodes(&nodes, &["dept".to_string()]);
        assert_eq!(records.len(), 2);
        let null_group = records
            .iter()
            .find(|r| r.get("dept") == Some(&PropertyValue::String("null".into())))
            .unwrap();
        assert_eq!(null_group.get("count"), Some(&PropertyValue::Int(1)));
        let sales = records
            .iter()
            .find(|r| r.get("dept") == Some(&PropertyValue::String("sales".into())))
            .unwrap();
        assert_eq!(sales.get("count"), Some(&PropertyValue::Int(2)));
    }

    #[test]
    fn order_is_stable_and_multi_key() {
        let mut nodes = vec![
            person("b", PropertyValue::Int(30), "sales"),
            person("a", PropertyValue::Int(30), "sales"),
            person("c", PropertyValue::Int(20), "ops"),
        ];
        order_nodes(
            &mut nodes,
            &[
                OrderKey {
                    property: "age".into(),
                    direction: SortDirection::Desc,
                },
                OrderKey {
                    property: "name".into(),
                    direction: SortDirection::Asc,
                },
            ],
        );
        let names: Vec<_> = nodes.iter().filter_map(|n| n.name()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }
}
