//! Condition evaluation for node and edge filters.
//!
//! The combination rule is three-way and load-bearing:
//! - AND conditions only: every one must pass.
//! - OR conditions only: at least one must pass.
//! - Both present: every AND must pass *and* at least one OR must.
//! - No conditions: pass.
//!
//! Comparison semantics degrade instead of aborting: a comparison
//! across incompatible types falls back to case-insensitive string
//! comparison, and a malformed operand fails just that condition.

use crate::ast::{strip_quotes, Condition, ConditionValue, Connective, Operator, Query};
use crate::error::{Error, Result};
use crate::subquery::{self, SubqueryEngine};
use askgraph_api::{PropertyMap, PropertyValue};
use chrono::NaiveDate;
use regex::Regex;
use std::cmp::Ordering;

const FLOAT_EPSILON: f64 = 1e-9;

/// Everything a condition needs beyond the entity itself: the engine
/// that runs nested queries, and the current recursion depth.
pub struct ConditionContext<'a> {
    pub engine: &'a dyn SubqueryEngine,
    pub depth: usize,
}

/// Looks up a property by name, tolerating two legacy storage shapes:
/// a colon-suffixed key (`age:`), and a `properties` text blob of
/// `key: value` pairs. Both fallbacks exist for data written by older
/// importers and are compatibility paths, not the primary shape.
pub fn lookup_property(props: &PropertyMap, name: &str) -> Option<PropertyValue> {
    for (key, value) in props {
        if key.eq_ignore_ascii_case(name) {
            return Some(value.clone());
        }
    }
    let suffixed = format!("{name}:");
    for (key, value) in props {
        if key.eq_ignore_ascii_case(&suffixed) {
            return Some(value.clone());
        }
    }
    if let Some(PropertyValue::String(blob)) = props.get("properties") {
        for pair in blob.split([',', ';']) {
            let mut halves = pair.splitn(2, [':', '=']);
            if let (Some(key), Some(value)) = (halves.next(), halves.next()) {
                if key.trim().eq_ignore_ascii_case(name) {
                    return Some(PropertyValue::String(value.trim().to_string()));
                }
            }
        }
    }
    None
}

/// The evaluator entry point: applies the three-way AND/OR rule over
/// the condition set against one entity's properties.
pub fn evaluate(
    props: &PropertyMap,
    conditions: &[Condition],
    ctx: &ConditionContext<'_>,
) -> Result<bool> {
    if conditions.is_empty() {
        return Ok(true);
    }

    let mut saw_and = false;
    let mut saw_or = false;
    let mut all_and_pass = true;
    let mut any_or_pass = false;

    for condition in conditions {
        let pass = evaluate_one(props, condition, ctx)?;
        match condition.connective {
            Connective::And => {
                saw_and = true;
                all_and_pass &= pass;
            }
            Connective::Or => {
                saw_or = true;
                any_or_pass |= pass;
            }
        }
    }

    Ok(match (saw_and, saw_or) {
        (true, true) => all_and_pass && any_or_pass,
        (true, false) => all_and_pass,
        (false, true) => any_or_pass,
        (false, false) => true,
    })
}

fn evaluate_one(
    props: &PropertyMap,
    condition: &Condition,
    ctx: &ConditionContext<'_>,
) -> Result<bool> {
    if condition.operator.wants_subquery() {
        let query = match &condition.value {
            ConditionValue::Subquery(query) => query,
            // `in (1, 2, 3)`: membership against a literal list.
            ConditionValue::Text(text)
                if matches!(condition.operator, Operator::In | Operator::NotIn) =>
            {
                return evaluate_literal_membership(props, condition, text);
            }
            ConditionValue::Text(text) => {
                return Err(Error::Type(format!(
                    "operator {:?} requires a subquery, got literal '{text}'",
                    condition.operator
                )))
            }
        };
        return evaluate_subquery_condition(props, condition, query, ctx);
    }

    let expected_raw = match &condition.value {
        ConditionValue::Text(text) => text.as_str(),
        ConditionValue::Subquery(_) => {
            return Err(Error::Type(format!(
                "operator {:?} does not accept a subquery value",
                condition.operator
            )))
        }
    };
    let expected = strip_quotes(expected_raw);

    let Some(actual) = lookup_property(props, &condition.property) else {
        return Ok(false);
    };

    Ok(match condition.operator {
        Operator::Eq => eq_match(&actual, expected),
        Operator::Ne => !eq_match(&actual, expected),
        Operator::Gt => ordered_match(&actual, expected, |o| o == Ordering::Greater),
        Operator::Lt => ordered_match(&actual, expected, |o| o == Ordering::Less),
        Operator::Ge => ordered_match(&actual, expected, |o| o != Ordering::Less),
        Operator::Le => ordered_match(&actual, expected, |o| o != Ordering::Greater),
        Operator::Contains => contains_match(&actual, expected),
        Operator::Like => like_match(&actual.to_display_string(), expected),
        Operator::StartsWith => actual
            .to_display_string()
            .to_lowercase()
            .starts_with(&expected.to_lowercase()),
        Operator::EndsWith => actual
            .to_display_string()
            .to_lowercase()
            .ends_with(&expected.to_lowercase()),
        Operator::Upper => actual.to_display_string().to_uppercase() == expected,
        Operator::Lower => actual.to_display_string().to_lowercase() == expected,
        Operator::Trim => actual
            .to_display_string()
            .trim()
            .eq_ignore_ascii_case(expected),
        Operator::Length => length_match(&actual, expected),
        Operator::Substring => actual
            .to_display_string()
            .to_lowercase()
            .contains(&expected.to_lowercase()),
        Operator::Replace => replace_match(&actual.to_display_string(), expected),
        // Subquery operators are handled above.
        _ => false,
    })
}

fn evaluate_subquery_condition(
    props: &PropertyMap,
    condition: &Condition,
    query: &Query,
    ctx: &ConditionContext<'_>,
) -> Result<bool> {
    let outcome = ctx.engine.run_subquery(query, ctx.depth + 1)?;
    let candidate = lookup_property(props, &condition.property);

    Ok(match condition.operator {
        Operator::Exists => subquery::has_present_value(&outcome.values),
        Operator::NotExists => !subquery::has_present_value(&outcome.values),
        Operator::In => match &candidate {
            Some(value) => subquery::value_in_list(value, &outcome.values),
            None => false,
        },
        Operator::NotIn => match &candidate {
            Some(value) => !subquery::value_in_list(value, &outcome.values),
            None => true,
        },
        Operator::Any => candidate_elements(&candidate)
            .iter()
            .any(|v| subquery::value_in_list(v, &outcome.values)),
        Operator::All => {
            let elements = candidate_elements(&candidate);
            !elements.is_empty()
                && elements
                    .iter()
                    .all(|v| subquery::value_in_list(v, &outcome.values))
        }
        Operator::EqAggregate
        | Operator::GtAggregate
        | Operator::LtAggregate
        | Operator::GeAggregate
        | Operator::LeAggregate => {
            let Some(target) = outcome.single_numeric() else {
                return Ok(false);
            };
            let Some(value) = candidate.as_ref().and_then(PropertyValue::as_f64) else {
                return Ok(false);
            };
            match condition.operator {
                Operator::EqAggregate => (value - target).abs() < FLOAT_EPSILON,
                Operator::GtAggregate => value > target,
                Operator::LtAggregate => value < target,
                Operator::GeAggregate => value >= target,
                Operator::LeAggregate => value <= target,
                _ => unreachable!(),
            }
        }
        _ => false,
    })
}

/// IN / NOT IN against a literal value list instead of a subquery.
/// A missing property is not in any list.
fn evaluate_literal_membership(
    props: &PropertyMap,
    condition: &Condition,
    text: &str,
) -> Result<bool> {
    let list = match crate::ast::literal_value(text) {
        PropertyValue::List(items) => items,
        single => vec![single],
    };
    let member = match lookup_property(props, &condition.property) {
        Some(value) => subquery::value_in_list(&value, &list),
        None => false,
    };
    Ok(match condition.operator {
        Operator::NotIn => !member,
        _ => member,
    })
}

/// A candidate for any/all checks may itself be a list; a scalar acts
/// as a one-element list and a missing property as an empty one.
fn candidate_elements(candidate: &Option<PropertyValue>) -> Vec<PropertyValue> {
    match candidate {
        Some(PropertyValue::List(items)) => items.clone(),
        Some(value) => vec![value.clone()],
        None => Vec::new(),
    }
}

/// Equality with the documented coercions: date-only equality for
/// timestamps, epsilon-tolerant float equality for numerics, and
/// case-insensitive string equality as the generic fallback.
pub fn eq_match(actual: &PropertyValue, expected: &str) -> bool {
    match actual {
        PropertyValue::Timestamp(ts) => {
            if let Some(date) = parse_date(expected) {
                return ts.date_naive() == date;
            }
            ts.to_rfc3339().eq_ignore_ascii_case(expected)
        }
        PropertyValue::Int(_) | PropertyValue::Float(_) => {
            if let (Some(a), Ok(b)) = (actual.as_f64(), expected.trim().parse::<f64>()) {
                return (a - b).abs() < FLOAT_EPSILON;
            }
            actual.to_display_string().eq_ignore_ascii_case(expected)
        }
        _ => actual.to_display_string().eq_ignore_ascii_case(expected),
    }
}

/// Equality between two typed values, used by list membership and
/// shared-property joins. Same coercion ladder as `eq_match`.
pub fn values_equal(a: &PropertyValue, b: &PropertyValue) -> bool {
    if let (Some(x), Some(y)) = (a.as_f64(), b.as_f64()) {
        return (x - y).abs() < FLOAT_EPSILON;
    }
    a.to_display_string()
        .eq_ignore_ascii_case(&b.to_display_string())
}

/// Ordering between two typed values: native when numeric on both
/// sides, case-insensitive string comparison otherwise.
pub fn compare_values(a: &PropertyValue, b: &PropertyValue) -> Ordering {
    if let (Some(x), Some(y)) = (a.as_f64(), b.as_f64()) {
        return x.partial_cmp(&y).unwrap_or(Ordering::Equal);
    }
    a.to_display_string()
        .to_lowercase()
        .cmp(&b.to_display_string().to_lowercase())
}

fn ordered_match(actual: &PropertyValue, expected: &str, accept: impl Fn(Ordering) -> bool) -> bool {
    let ordering = match actual {
        PropertyValue::Timestamp(ts) => match parse_datetime(expected) {
            Some(other) => ts.cmp(&other),
            None => return false,
        },
        _ => {
            if let (Some(a), Ok(b)) = (actual.as_f64(), expected.trim().parse::<f64>()) {
                a.partial_cmp(&b).unwrap_or(Ordering::Equal)
            } else {
                actual
                    .to_display_string()
                    .to_lowercase()
                    .cmp(&expected.to_lowercase())
            }
        }
    };
    accept(ordering)
}

/// List membership for list values, substring otherwise.
fn contains_match(actual: &PropertyValue, expected: &str) -> bool {
    match actual {
        PropertyValue::List(items) => items.iter().any(|item| eq_match(item, expected)),
        _ => actual
            .to_display_string()
            .to_lowercase()
            .contains(&expected.to_lowercase()),
    }
}

/// Compiles a `%`/`_` wildcard pattern into an anchored,
/// case-insensitive regex. All other pattern characters match
/// literally.
pub fn compile_like(pattern: &str) -> Option<Regex> {
    let mut source = String::with_capacity(pattern.len() + 8);
    source.push_str("(?i)^");
    for c in pattern.chars() {
        match c {
            '%' => source.push_str(".*"),
            '_' => source.push('.'),
            _ => source.push_str(&regex::escape(&c.to_string())),
        }
    }
    source.push('$');
    Regex::new(&source).ok()
}

fn like_match(actual: &str, pattern: &str) -> bool {
    match compile_like(pattern) {
        Some(re) => re.is_match(actual),
        None => false,
    }
}

fn length_match(actual: &PropertyValue, expected: &str) -> bool {
    let Ok(expected_len) = expected.trim().parse::<usize>() else {
        return false;
    };
    let actual_len = match actual {
        PropertyValue::List(items) => items.len(),
        _ => actual.to_display_string().chars().count(),
    };
    actual_len == expected_len
}

/// Expected format `old=>new=>result`: the property with `old`
/// replaced by `new` must equal `result`. Malformed operands fail
/// the condition rather than the query.
fn replace_match(actual: &str, expected: &str) -> bool {
    let parts: Vec<&str> = expected.splitn(3, "=>").collect();
    if parts.len() != 3 {
        log::debug!("replace operand '{expected}' is not old=>new=>result");
        return false;
    }
    actual
        .replace(parts[0].trim(), parts[1].trim())
        .eq_ignore_ascii_case(parts[2].trim())
}

fn parse_date(text: &str) -> Option<NaiveDate> {
    let t = text.trim();
    if let Ok(date) = NaiveDate::parse_from_str(t, "%Y-%m-%d") {
        return Some(date);
    }
    parse_datetime(t).map(|dt| dt.date_naive())
}

fn parse_datetime(text: &str) -> Option<chrono::DateTime<chrono::Utc>> {
    chrono::DateTime::parse_from_rfc3339(text.trim())
        .ok()
        .map(|dt| dt.with_timezone(&chrono::Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subquery::SubqueryOutcome;
    use chrono::{TimeZone, Utc};

    struct NoSubqueries;
    impl SubqueryEngine for NoSubqueries {
        fn run_subquery(&self, _query: &Query, _depth: usize) -> Result<SubqueryOutcome> {
            panic!("test conditions must not reach the subquery engine")
        }
    }

    fn ctx() -> ConditionContext<'static> {
        static ENGINE: NoSubqueries = NoSubqueries;
        ConditionContext {
            engine: &ENGINE,
            depth: 0,
        }
    }

    fn props(pairs: &[(&str, PropertyValue)]) -> PropertyMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn cond(connective: Connective, property: &str, operator: Operator, value: &str) -> Condition {
        Condition::new(
            connective,
            property,
            operator,
            ConditionValue::Text(value.to_string()),
        )
    }

    #[test]
    fn empty_condition_set_passes() {
        let entity = props(&[("age", PropertyValue::Int(30))]);
        assert!(evaluate(&entity, &[], &ctx()).unwrap());
    }

    #[test]
    fn and_only_requires_all() {
        let entity = props(&[
            ("age", PropertyValue::Int(30)),
            ("name", PropertyValue::String("Alice".into())),
        ]);
        let passing = [
            cond(Connective::And, "age", Operator::Gt, "25"),
            cond(Connective::And, "name", Operator::Eq, "alice"),
        ];
        assert!(evaluate(&entity, &passing, &ctx()).unwrap());

        let failing = [
            cond(Connective::And, "age", Operator::Gt, "25"),
            cond(Connective::And, "name", Operator::Eq, "bob"),
        ];
        assert!(!evaluate(&entity, &failing, &ctx()).unwrap());
    }

    #[test]
    fn or_only_requires_one() {
        let entity = props(&[("age", PropertyValue::Int(20))]);
        let set = [
            cond(Connective::Or, "age", Operator::Gt, "25"),
            cond(Connective::Or, "age", Operator::Lt, "21"),
        ];
        assert!(evaluate(&entity, &set, &ctx()).unwrap());

        let none = [
            cond(Connective::Or, "age", Operator::Gt, "25"),
            cond(Connective::Or, "age", Operator::Eq, "99"),
        ];
        assert!(!evaluate(&entity, &none, &ctx()).unwrap());
    }

    #[test]
    fn mixed_needs_all_ands_and_one_or() {
        let entity = props(&[
            ("age", PropertyValue::Int(30)),
            ("city", PropertyValue::String("Berlin".into())),
        ]);
        let pass = [
            cond(Connective::And, "age", Operator::Gt, "25"),
            cond(Connective::Or, "city", Operator::Eq, "berlin"),
            cond(Connective::Or, "city", Operator::Eq, "paris"),
        ];
        assert!(evaluate(&entity, &pass, &ctx()).unwrap());

        // AND passes but no OR does: mixed rule fails.
        let fail = [
            cond(Connective::And, "age", Operator::Gt, "25"),
            cond(Connective::Or, "city", Operator::Eq, "paris"),
        ];
        assert!(!evaluate(&entity, &fail, &ctx()).unwrap());
    }

    #[test]
    fn numeric_equality_is_epsilon_tolerant() {
        let entity = props(&[("score", PropertyValue::Float(0.1 + 0.2))]);
        let set = [cond(Connective::And, "score", Operator::Eq, "0.3")];
        assert!(evaluate(&entity, &set, &ctx()).unwrap());
    }

    #[test]
    fn timestamp_equality_is_date_only() {
        let ts = Utc.with_ymd_and_hms(2024, 5, 17, 14, 30, 0).unwrap();
        let entity = props(&[("joined", PropertyValue::Timestamp(ts))]);
        let set = [cond(Connective::And, "joined", Operator::Eq, "2024-05-17")];
        assert!(evaluate(&entity, &set, &ctx()).unwrap());
    }

    #[test]
    fn incompatible_comparison_falls_back_to_strings() {
        let entity = props(&[("name", PropertyValue::String("beta".into()))]);
        let set = [cond(Connective::And, "name", Operator::Gt, "alpha")];
        assert!(evaluate(&entity, &set, &ctx()).unwrap());
    }

    #[test]
    fn contains_handles_lists_and_substrings() {
        let entity = props(&[
            (
                "tags",
                PropertyValue::List(vec![
                    PropertyValue::String("rust".into()),
                    PropertyValue::String("db".into()),
                ]),
            ),
            ("bio", PropertyValue::String("Graph hacker".into())),
        ]);
        assert!(evaluate(
            &entity,
            &[cond(Connective::And, "tags", Operator::Contains, "rust")],
            &ctx()
        )
        .unwrap());
        assert!(evaluate(
            &entity,
            &[cond(Connective::And, "bio", Operator::Contains, "HACK")],
            &ctx()
        )
        .unwrap());
    }

    #[test]
    fn like_escapes_regex_metacharacters() {
        let entity = props(&[("code", PropertyValue::String("a.b-1".into()))]);
        assert!(evaluate(
            &entity,
            &[cond(Connective::And, "code", Operator::Like, "a.b%")],
            &ctx()
        )
        .unwrap());
        // The dot is literal: "axb-1" must not match "a.b%".
        let entity2 = props(&[("code", PropertyValue::String("axb-1".into()))]);
        assert!(!evaluate(
            &entity2,
            &[cond(Connective::And, "code", Operator::Like, "a.b%")],
            &ctx()
        )
        .unwrap());
        // Underscore is a single-character wildcard.
        assert!(evaluate(
            &entity2,
            &[cond(Connective::And, "code", Operator::Like, "a_b-_")],
            &ctx()
        )
        .unwrap());
    }

    #[test]
    fn missing_property_fails_the_condition() {
        let entity = props(&[("age", PropertyValue::Int(30))]);
        let set = [cond(Connective::And, "height", Operator::Gt, "1")];
        assert!(!evaluate(&entity, &set, &ctx()).unwrap());
    }

    #[test]
    fn legacy_blob_lookup() {
        let entity = props(&[(
            "properties",
            PropertyValue::String("dept: sales, floor: 3".into()),
        )]);
        let set = [cond(Connective::And, "dept", Operator::Eq, "sales")];
        assert!(evaluate(&entity, &set, &ctx()).unwrap());
    }

    #[test]
    fn literal_in_list_membership() {
        let entity = props(&[("age", PropertyValue::Int(30))]);
        let set = [cond(Connective::And, "age", Operator::In, "[25, 30, 35]")];
        assert!(evaluate(&entity, &set, &ctx()).unwrap());
        let set = [cond(Connective::And, "age", Operator::NotIn, "[25, 35]")];
        assert!(evaluate(&entity, &set, &ctx()).unwrap());
        // Missing property: IN fails, NOT IN passes.
        let set = [cond(Connective::And, "height", Operator::In, "[1, 2]")];
        assert!(!evaluate(&entity, &set, &ctx()).unwrap());
    }

    #[test]
    fn colon_suffixed_key_lookup() {
        let entity = props(&[("age:", PropertyValue::Int(42))]);
        let set = [cond(Connective::And, "age", Operator::Eq, "42")];
        assert!(evaluate(&entity, &set, &ctx()).unwrap());
    }
}
