//! The surface-syntax parser: one line of controlled natural
//! language in, one structured query out.
//!
//! The grammar is keyword-routed rather than grammar-driven: the
//! leading verb picks a handler, and each handler slices the rest of
//! the line into clauses (`where`, `order by`, `limit`, …) found
//! outside quotes and parentheses. `$variable` tokens survive
//! parsing untouched, including inside quoted strings, so that
//! substitution later is lossless.
//!
//! Plural labels are normalized through a fixed table of known
//! words. Unlisted plurals pass through unchanged; general
//! `s`-stripping is deliberately not attempted, since guessing wrong
//! would silently change which label a query matches.

use crate::ast::{
    split_top_level, strip_quotes, AggregateFn, AggregateSpec, Condition, ConditionValue,
    Connective, JoinRule, JoinSpec, NodeRef, Operator, OrderKey, Query, QueryKind, SortDirection,
};
use crate::error::{Error, Result};
use regex::Regex;
use std::sync::OnceLock;

/// Irregular plural → singular table. Fixed allow-list: anything not
/// listed passes through as written.
const PLURAL_TABLE: &[(&str, &str)] = &[
    ("people", "person"),
    ("persons", "person"),
    ("users", "user"),
    ("employees", "employee"),
    ("managers", "manager"),
    ("customers", "customer"),
    ("companies", "company"),
    ("cities", "city"),
    ("countries", "country"),
    ("children", "child"),
    ("men", "man"),
    ("women", "woman"),
    ("movies", "movie"),
    ("books", "book"),
    ("products", "product"),
    ("orders", "order"),
    ("projects", "project"),
    ("tasks", "task"),
    ("teams", "team"),
    ("departments", "department"),
    ("devices", "device"),
    ("servers", "server"),
    ("services", "service"),
    ("students", "student"),
    ("teachers", "teacher"),
    ("friends", "friend"),
    ("nodes", "node"),
];

/// Canonical singular form of a label, via the known-word table.
pub fn normalize_label(word: &str) -> String {
    let lower = word.trim().to_lowercase();
    for (plural, singular) in PLURAL_TABLE {
        if lower == *plural {
            return (*singular).to_string();
        }
    }
    lower
}

/// Parses one line of query text into a structured query.
///
/// Semicolon-separated input becomes a batch query. Input that
/// matches no pattern still yields a best-effort label-only find;
/// only empty input is a syntax error.
pub fn parse(text: &str) -> Result<Query> {
    let text = text.trim();
    if text.is_empty() {
        return Err(Error::Syntax("empty query".into()));
    }

    let statements = split_top_level(text, ';');
    if statements.len() > 1 {
        let mut query = Query::new(QueryKind::Batch);
        for statement in statements {
            query.batch.push(parse(&statement)?);
        }
        return Ok(query);
    }

    let lower = text.to_lowercase();
    log::debug!("parsing query: {text}");

    if lower.starts_with("show schema") {
        return Ok(Query::new(QueryKind::ShowSchema));
    }
    if let Some(rest) = strip_prefix_ci(text, "define variable") {
        return parse_define_variable(rest);
    }
    if let Some(rest) = strip_prefix_ci(text, "connect") {
        return parse_connect(rest);
    }
    if let Some(rest) = strip_prefix_ci(text, "create edge") {
        let rest = strip_prefix_ci(rest, "from").unwrap_or(rest);
        return parse_connect(rest);
    }
    if let Some(rest) = strip_prefix_ci(text, "create") {
        return parse_create_node(rest);
    }
    if let Some(rest) = strip_prefix_ci(text, "find") {
        return parse_find(rest);
    }
    if let Some(rest) = strip_prefix_ci(text, "get") {
        return parse_find(rest);
    }
    if let Some(rest) = strip_prefix_ci(text, "update") {
        return parse_update(rest);
    }
    if let Some(rest) = strip_prefix_ci(text, "delete") {
        return parse_delete(rest);
    }
    if let Some(rest) = strip_prefix_ci(text, "remove") {
        return parse_delete(rest);
    }
    if let Some(rest) = strip_prefix_ci(text, "count") {
        return parse_count(rest);
    }
    if let Some(query) = parse_aggregate_verb(text)? {
        return Ok(query);
    }
    if let Some(rest) = strip_prefix_ci(text, "group") {
        return parse_group(rest);
    }
    if let Some(rest) = strip_prefix_ci(text, "order") {
        return parse_order(rest);
    }
    if let Some(rest) = strip_prefix_ci(text, "sort") {
        return parse_order(rest);
    }
    if let Some(rest) = strip_prefix_ci(text, "join") {
        return parse_join(rest);
    }
    if strip_prefix_ci(text, "having").is_some() {
        // Recognized but only meaningful inside a group query; the
        // dispatcher reports it as unsupported.
        return Ok(Query::new(QueryKind::Having));
    }

    // Best-effort fallback: treat the first word as a label and find
    // by it. Input is never silently dropped.
    let word = text.split_whitespace().next().unwrap_or_default();
    log::debug!("no pattern matched, falling back to label-only find for '{word}'");
    let mut query = Query::new(QueryKind::FindNodes);
    query.label = Some(normalize_label(word));
    Ok(query)
}

/// Case-insensitive keyword prefix strip; the keyword must end at a
/// word boundary. Splitting at the keyword length is only legal when
/// that byte offset is a character boundary, which non-ASCII input
/// can violate.
fn strip_prefix_ci<'a>(text: &'a str, keyword: &str) -> Option<&'a str> {
    if text.len() < keyword.len() || !text.is_char_boundary(keyword.len()) {
        return None;
    }
    let (head, tail) = text.split_at(keyword.len());
    if !head.eq_ignore_ascii_case(keyword) {
        return None;
    }
    if let Some(next) = tail.chars().next() {
        if !next.is_whitespace() {
            return None;
        }
    }
    Some(tail.trim_start())
}

/// Splits a statement tail into a head plus `(keyword, text)` parts,
/// matching keywords only at word boundaries outside quotes and
/// parentheses. Keywords are tried longest-first so `order by` wins
/// over a hypothetical `order`.
fn segment(text: &str, keywords: &[&str]) -> (String, Vec<(String, String)>) {
    let bytes = text.as_bytes();
    let mut sorted: Vec<&str> = keywords.to_vec();
    sorted.sort_by_key(|k| std::cmp::Reverse(k.len()));

    let mut matches: Vec<(usize, usize, String)> = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<u8> = None;
    let mut i = 0usize;
    while i < bytes.len() {
        let b = bytes[i];
        match quote {
            Some(q) => {
                if b == q {
                    quote = None;
                }
            }
            None => match b {
                b'"' | b'\'' => quote = Some(b),
                b'(' | b'[' => depth += 1,
                b')' | b']' => depth = depth.saturating_sub(1),
                _ => {
                    let at_boundary = i == 0 || bytes[i - 1].is_ascii_whitespace();
                    if depth == 0 && at_boundary {
                        for kw in &sorted {
                            let end = i + kw.len();
                            if end <= bytes.len()
                                && bytes[i..end].eq_ignore_ascii_case(kw.as_bytes())
                                && (end == bytes.len() || bytes[end].is_ascii_whitespace())
                            {
                                matches.push((i, end, kw.to_string()));
                                i = end;
                                break;
                            }
                        }
                    }
                }
            },
        }
        i += 1;
    }

    let head_end = matches.first().map(|(start, _, _)| *start).unwrap_or(bytes.len());
    let head = text[..head_end].trim().to_string();
    let mut parts = Vec::with_capacity(matches.len());
    for (idx, (_, end, kw)) in matches.iter().enumerate() {
        let next_start = matches
            .get(idx + 1)
            .map(|(start, _, _)| *start)
            .unwrap_or(bytes.len());
        parts.push((kw.clone(), text[*end..next_start].trim().to_string()));
    }
    (head, parts)
}

fn part<'a>(parts: &'a [(String, String)], keyword: &str) -> Option<&'a str> {
    parts
        .iter()
        .find(|(kw, _)| kw == keyword)
        .map(|(_, text)| text.as_str())
}

fn parse_usize(text: &str, what: &str) -> Result<usize> {
    text.split_whitespace()
        .next()
        .and_then(|t| t.parse::<usize>().ok())
        .ok_or_else(|| Error::Syntax(format!("expected a number for {what}, got '{text}'")))
}

/// A node reference: `label "Name"`, `"Name"`, `Name`, or
/// `label Name`. Quotes win; otherwise a single word is a bare name
/// and two or more words are label + name.
fn parse_node_ref(text: &str) -> Result<NodeRef> {
    let t = text.trim();
    if t.is_empty() {
        return Err(Error::Syntax("empty node reference".into()));
    }
    if let Some(quote_pos) = t.find(['"', '\'']) {
        let quote = t.as_bytes()[quote_pos] as char;
        let rest = &t[quote_pos + 1..];
        let Some(end) = rest.find(quote) else {
            return Err(Error::Syntax(format!("unterminated quote in '{t}'")));
        };
        let label = t[..quote_pos].trim();
        return Ok(NodeRef {
            label: if label.is_empty() {
                None
            } else {
                Some(normalize_label(label))
            },
            name: rest[..end].to_string(),
        });
    }
    let words: Vec<&str> = t.split_whitespace().collect();
    if words.len() == 1 {
        return Ok(NodeRef::named(words[0]));
    }
    Ok(NodeRef {
        label: Some(normalize_label(words[0])),
        name: words[1..].join(" "),
    })
}

/// `name=value, other="text"` pairs; values keep their quotes.
fn parse_properties(text: &str) -> Result<Vec<(String, String)>> {
    let mut pairs = Vec::new();
    for piece in split_top_level(text, ',') {
        let Some(eq) = find_top_level(&piece, "=") else {
            return Err(Error::Syntax(format!("expected name=value, got '{piece}'")));
        };
        let key = piece[..eq].trim().to_string();
        let value = piece[eq + 1..].trim().to_string();
        if key.is_empty() || value.is_empty() {
            return Err(Error::Syntax(format!("expected name=value, got '{piece}'")));
        }
        pairs.push((key, value));
    }
    Ok(pairs)
}

/// Position of a needle outside quotes and parentheses.
fn find_top_level(text: &str, needle: &str) -> Option<usize> {
    let bytes = text.as_bytes();
    let nb = needle.as_bytes();
    let mut depth = 0usize;
    let mut quote: Option<u8> = None;
    let mut i = 0usize;
    while i + nb.len() <= bytes.len() {
        let b = bytes[i];
        match quote {
            Some(q) => {
                if b == q {
                    quote = None;
                }
            }
            None => match b {
                b'"' | b'\'' => quote = Some(b),
                b'(' | b'[' => depth += 1,
                b')' | b']' => depth = depth.saturating_sub(1),
                _ => {
                    if depth == 0 && bytes[i..i + nb.len()].eq_ignore_ascii_case(nb) {
                        return Some(i);
                    }
                }
            },
        }
        i += 1;
    }
    None
}

fn parse_define_variable(rest: &str) -> Result<Query> {
    let (name, value) = if let Some(eq) = find_top_level(rest, "=") {
        (&rest[..eq], &rest[eq + 1..])
    } else if let Some(as_pos) = find_top_level(rest, " as ") {
        (&rest[..as_pos], &rest[as_pos + 4..])
    } else {
        return Err(Error::Syntax(format!(
            "expected 'define variable name = value', got '{rest}'"
        )));
    };
    let name = name.trim().trim_start_matches('$');
    if name.is_empty() {
        return Err(Error::Syntax("variable name is empty".into()));
    }
    let mut query = Query::new(QueryKind::DefineVariable);
    query.variable_name = Some(name.to_string());
    query.variable_value = Some(value.trim().to_string());
    Ok(query)
}

fn parse_connect(rest: &str) -> Result<Query> {
    let (head, parts) = segment(rest, &["to", "as", "type", "with"]);
    let Some(target_text) = part(&parts, "to") else {
        return Err(Error::Syntax(format!(
            "expected 'connect <source> to <target>', got '{rest}'"
        )));
    };
    let mut query = Query::new(QueryKind::CreateEdge);
    query.source = Some(parse_node_ref(&head)?);
    query.target = Some(parse_node_ref(target_text)?);
    if let Some(rel) = part(&parts, "as").or_else(|| part(&parts, "type")) {
        query.edge_type = Some(rel.trim().to_lowercase());
    }
    if let Some(props) = part(&parts, "with") {
        // `with type <rel>` or `with <props>`.
        if let Some(rel) = strip_prefix_ci(props, "type") {
            query.edge_type = Some(rel.trim().to_lowercase());
        } else {
            query.properties = parse_properties(props)?;
        }
    }
    Ok(query)
}

fn parse_create_node(rest: &str) -> Result<Query> {
    let rest = strip_prefix_ci(rest, "node").unwrap_or(rest);
    let mut words = rest.splitn(2, char::is_whitespace);
    let Some(label) = words.next().filter(|w| !w.is_empty()) else {
        return Err(Error::Syntax("create needs a label".into()));
    };
    let mut query = Query::new(QueryKind::CreateNode);
    query.label = Some(normalize_label(label));
    if let Some(tail) = words.next() {
        let tail = tail.trim();
        let tail = strip_prefix_ci(tail, "with").unwrap_or(tail);
        if !tail.is_empty() {
            query.properties = parse_properties(tail)?;
        }
    }
    Ok(query)
}

fn parse_find(rest: &str) -> Result<Query> {
    if let Some(path_rest) = strip_prefix_ci(rest, "path") {
        return parse_find_path(path_rest);
    }

    // `type` is only a clause keyword for edge finds; on node finds
    // it stays available as a property name in the where clause.
    let first_word = rest.split_whitespace().next().unwrap_or_default();
    let edges = first_word.eq_ignore_ascii_case("edges")
        || first_word.eq_ignore_ascii_case("edge")
        || first_word.eq_ignore_ascii_case("connections");
    let keywords: &[&str] = if edges {
        &[
            "where", "within", "order by", "sort by", "limit", "offset", "via", "avoiding",
            "type", "of type",
        ]
    } else {
        &[
            "where", "within", "order by", "sort by", "limit", "offset", "via", "avoiding",
        ]
    };
    let (head, parts) = segment(rest, keywords);

    // `find <label> within N steps of <node>`.
    if let Some(within_text) = part(&parts, "within") {
        return parse_within_steps(&head, within_text, &parts);
    }

    let label_word = head.split_whitespace().next().unwrap_or_default();
    let mut query = if edges {
        let mut q = Query::new(QueryKind::FindEdges);
        if let Some(rel) = part(&parts, "type").or_else(|| part(&parts, "of type")) {
            q.edge_type = Some(rel.trim().to_lowercase());
        }
        q
    } else {
        let mut q = Query::new(QueryKind::FindNodes);
        if label_word.is_empty() {
            return Err(Error::Syntax("find needs a label".into()));
        }
        q.label = Some(normalize_label(label_word));
        q
    };

    if let Some(where_text) = part(&parts, "where") {
        query.conditions = parse_where(where_text)?;
    }
    if let Some(order_text) = part(&parts, "order by").or_else(|| part(&parts, "sort by")) {
        query.order_by = parse_order_keys(order_text)?;
    }
    if let Some(limit_text) = part(&parts, "limit") {
        query.limit = Some(parse_usize(limit_text, "limit")?);
    }
    if let Some(offset_text) = part(&parts, "offset") {
        query.offset = Some(parse_usize(offset_text, "offset")?);
    }
    Ok(query)
}

fn parse_find_path(rest: &str) -> Result<Query> {
    let rest = strip_prefix_ci(rest, "from").unwrap_or(rest);
    let (head, parts) = segment(rest, &["to", "via", "avoiding", "within", "bidirectional"]);
    let Some(target_text) = part(&parts, "to") else {
        return Err(Error::Syntax(format!(
            "expected 'find path from <source> to <target>', got '{rest}'"
        )));
    };
    let mut query = Query::new(QueryKind::FindPath);
    query.source = Some(parse_node_ref(&head)?);
    query.target = Some(parse_node_ref(target_text)?);
    if let Some(rel) = part(&parts, "via") {
        query.edge_type = Some(rel.trim().to_lowercase());
    }
    if let Some(rel) = part(&parts, "avoiding") {
        query.avoid_edge_type = Some(rel.trim().to_lowercase());
    }
    if let Some(within_text) = part(&parts, "within") {
        query.max_steps = Some(parse_usize(within_text, "step limit")?);
    }
    if part(&parts, "bidirectional").is_some() {
        query.bidirectional = true;
    }
    Ok(query)
}

fn parse_within_steps(head: &str, within_text: &str, parts: &[(String, String)]) -> Result<Query> {
    let label_word = head.split_whitespace().next().unwrap_or_default();
    if label_word.is_empty() {
        return Err(Error::Syntax("find within needs a label".into()));
    }
    // `N steps of <node>`.
    let (steps_part, of_parts) = segment(within_text, &["of"]);
    let Some(ref_text) = part(&of_parts, "of") else {
        return Err(Error::Syntax(format!(
            "expected 'within N steps of <node>', got '{within_text}'"
        )));
    };
    let mut query = Query::new(QueryKind::FindWithinSteps);
    query.label = Some(normalize_label(label_word));
    query.max_steps = Some(parse_usize(&steps_part, "step count")?);
    query.source = Some(parse_node_ref(ref_text)?);
    if let Some(rel) = part(parts, "via") {
        query.edge_type = Some(rel.trim().to_lowercase());
    }
    if let Some(rel) = part(parts, "avoiding") {
        query.avoid_edge_type = Some(rel.trim().to_lowercase());
    }
    if let Some(where_text) = part(parts, "where") {
        query.conditions = parse_where(where_text)?;
    }
    Ok(query)
}

fn parse_update(rest: &str) -> Result<Query> {
    let (head, parts) = segment(rest, &["set", "where", "type"]);
    let label_word = head.split_whitespace().next().unwrap_or_default();
    if label_word.is_empty() {
        return Err(Error::Syntax("update needs a label".into()));
    }

    let edges = label_word.eq_ignore_ascii_case("edges") || label_word.eq_ignore_ascii_case("edge");
    let mut query = Query::new(if edges {
        QueryKind::UpdateEdges
    } else {
        QueryKind::UpdateNodes
    });
    if edges {
        if let Some(rel) = part(&parts, "type") {
            query.edge_type = Some(rel.trim().to_lowercase());
        }
    } else {
        query.label = Some(normalize_label(label_word));
    }

    let props_text = match part(&parts, "set") {
        Some(text) => text.to_string(),
        // `update person age=31 where …` without the set keyword.
        None => head
            .split_whitespace()
            .skip(1)
            .collect::<Vec<_>>()
            .join(" "),
    };
    if props_text.trim().is_empty() {
        return Err(Error::Syntax("update needs at least one name=value".into()));
    }
    query.properties = parse_properties(&props_text)?;
    if let Some(where_text) = part(&parts, "where") {
        query.conditions = parse_where(where_text)?;
    }
    Ok(query)
}

fn parse_delete(rest: &str) -> Result<Query> {
    if let Some(edge_rest) = strip_prefix_ci(rest, "edge").or_else(|| strip_prefix_ci(rest, "edges"))
    {
        let edge_rest = strip_prefix_ci(edge_rest, "from").unwrap_or(edge_rest);
        let (head, parts) = segment(edge_rest, &["to", "type", "where"]);
        let mut query = Query::new(QueryKind::DeleteEdges);
        if let Some(target_text) = part(&parts, "to") {
            query.source = Some(parse_node_ref(&head)?);
            query.target = Some(parse_node_ref(target_text)?);
        }
        if let Some(rel) = part(&parts, "type") {
            query.edge_type = Some(rel.trim().to_lowercase());
        }
        if let Some(where_text) = part(&parts, "where") {
            query.conditions = parse_where(where_text)?;
        }
        if query.source.is_none() && query.edge_type.is_none() && query.conditions.is_empty() {
            return Err(Error::Syntax(
                "delete edges needs endpoints, a type, or a where clause".into(),
            ));
        }
        return Ok(query);
    }

    if let Some(node_rest) = strip_prefix_ci(rest, "node") {
        let mut query = Query::new(QueryKind::DeleteNodes);
        query.source = Some(parse_node_ref(node_rest)?);
        return Ok(query);
    }

    let (head, parts) = segment(rest, &["where"]);
    let label_word = head.split_whitespace().next().unwrap_or_default();
    if label_word.is_empty() {
        return Err(Error::Syntax("delete needs a label or node reference".into()));
    }
    let mut query = Query::new(QueryKind::DeleteNodes);
    query.label = Some(normalize_label(label_word));
    if let Some(where_text) = part(&parts, "where") {
        query.conditions = parse_where(where_text)?;
    }
    Ok(query)
}

fn parse_count(rest: &str) -> Result<Query> {
    let (head, parts) = segment(rest, &["where"]);
    let label_word = head.split_whitespace().next().unwrap_or_default();
    if label_word.is_empty() {
        return Err(Error::Syntax("count needs a label".into()));
    }
    let mut query = Query::new(QueryKind::Count);
    query.label = Some(normalize_label(label_word));
    if let Some(where_text) = part(&parts, "where") {
        query.conditions = parse_where(where_text)?;
    }
    Ok(query)
}

/// `avg age of person where …` and friends.
fn parse_aggregate_verb(text: &str) -> Result<Option<Query>> {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let re = PATTERN.get_or_init(|| {
        Regex::new(
            r"(?i)^(sum|total|avg|average|mean|min|minimum|lowest|max|maximum|highest)\s+(\S+)\s+(?:of|from|for)\s+(\S+)(?:\s+where\s+(.+))?$",
        )
        .unwrap()
    });
    let Some(caps) = re.captures(text) else {
        return Ok(None);
    };
    let function = AggregateFn::from_word(&caps[1])
        .ok_or_else(|| Error::Syntax(format!("unknown aggregate verb '{}'", &caps[1])))?;
    let mut query = Query::new(QueryKind::Aggregate);
    query.aggregate = Some(AggregateSpec {
        function,
        property: caps[2].to_lowercase(),
    });
    query.label = Some(normalize_label(&caps[3]));
    if let Some(where_text) = caps.get(4) {
        query.conditions = parse_where(where_text.as_str())?;
    }
    Ok(Some(query))
}

fn parse_group(rest: &str) -> Result<Query> {
    let (head, parts) = segment(rest, &["by", "where", "having"]);
    let label_word = head.split_whitespace().next().unwrap_or_default();
    if label_word.is_empty() {
        return Err(Error::Syntax("group needs a label".into()));
    }
    let Some(by_text) = part(&parts, "by") else {
        return Err(Error::Syntax("group needs 'by <property, …>'".into()));
    };
    let mut query = Query::new(QueryKind::GroupBy);
    query.label = Some(normalize_label(label_word));
    query.group_by = split_top_level(by_text, ',')
        .into_iter()
        .map(|k| k.to_lowercase())
        .collect();
    if query.group_by.is_empty() {
        return Err(Error::Syntax("group needs at least one property".into()));
    }
    if let Some(where_text) = part(&parts, "where") {
        query.conditions = parse_where(where_text)?;
    }
    if let Some(having_text) = part(&parts, "having") {
        query.having = parse_where(having_text)?;
    }
    Ok(query)
}

fn parse_order(rest: &str) -> Result<Query> {
    let (head, parts) = segment(rest, &["by", "where", "limit", "offset"]);
    let label_word = head.split_whitespace().next().unwrap_or_default();
    if label_word.is_empty() {
        return Err(Error::Syntax("order needs a label".into()));
    }
    let Some(by_text) = part(&parts, "by") else {
        return Err(Error::Syntax("order needs 'by <property [asc|desc], …>'".into()));
    };
    let mut query = Query::new(QueryKind::OrderBy);
    query.label = Some(normalize_label(label_word));
    query.order_by = parse_order_keys(by_text)?;
    if let Some(where_text) = part(&parts, "where") {
        query.conditions = parse_where(where_text)?;
    }
    if let Some(limit_text) = part(&parts, "limit") {
        query.limit = Some(parse_usize(limit_text, "limit")?);
    }
    if let Some(offset_text) = part(&parts, "offset") {
        query.offset = Some(parse_usize(offset_text, "offset")?);
    }
    Ok(query)
}

fn parse_order_keys(text: &str) -> Result<Vec<OrderKey>> {
    let mut keys = Vec::new();
    for piece in split_top_level(text, ',') {
        let mut words = piece.split_whitespace();
        let Some(property) = words.next() else {
            continue;
        };
        let direction = match words.next() {
            Some(w) if w.eq_ignore_ascii_case("desc") || w.eq_ignore_ascii_case("descending") => {
                SortDirection::Desc
            }
            Some(w) if w.eq_ignore_ascii_case("asc") || w.eq_ignore_ascii_case("ascending") => {
                SortDirection::Asc
            }
            Some(w) => {
                return Err(Error::Syntax(format!(
                    "expected asc or desc after '{property}', got '{w}'"
                )))
            }
            None => SortDirection::Asc,
        };
        keys.push(OrderKey {
            property: property.to_lowercase(),
            direction,
        });
    }
    if keys.is_empty() {
        return Err(Error::Syntax("order by needs at least one property".into()));
    }
    Ok(keys)
}

fn parse_join(rest: &str) -> Result<Query> {
    let (head, parts) = segment(
        rest,
        &["to", "with", "via", "on", "using", "within", "bidirectional", "where"],
    );
    let source_word = head.split_whitespace().next().unwrap_or_default();
    if source_word.is_empty() {
        return Err(Error::Syntax("join needs a source label".into()));
    }
    let Some(target_text) = part(&parts, "to").or_else(|| part(&parts, "with")) else {
        return Err(Error::Syntax(
            "expected 'join <label> to <label> …'".into(),
        ));
    };
    let target_word = target_text.split_whitespace().next().unwrap_or_default();
    if target_word.is_empty() {
        return Err(Error::Syntax("join needs a target label".into()));
    }

    let max_steps = match part(&parts, "within") {
        Some(text) => Some(parse_usize(text, "step limit")?),
        None => None,
    };
    let rule = if let Some(rel) = part(&parts, "via") {
        JoinRule::EdgeType(rel.trim().to_lowercase())
    } else if let Some(prop) = part(&parts, "on") {
        let operator = match part(&parts, "using") {
            Some(op_text) => comparison_operator(op_text.trim())?,
            None => Operator::Eq,
        };
        JoinRule::SharedProperty {
            property: prop.trim().to_lowercase(),
            operator,
        }
    } else {
        JoinRule::Reachable
    };

    let conditions = match part(&parts, "where") {
        Some(where_text) => parse_where(where_text)?,
        None => Vec::new(),
    };

    let mut query = Query::new(QueryKind::VirtualJoin);
    query.join = Some(JoinSpec {
        source_label: normalize_label(source_word),
        target_label: normalize_label(target_word),
        rule,
        max_steps,
        bidirectional: part(&parts, "bidirectional").is_some(),
        conditions,
    });
    Ok(query)
}

fn comparison_operator(symbol: &str) -> Result<Operator> {
    match symbol {
        "=" | "==" => Ok(Operator::Eq),
        "!=" | "<>" => Ok(Operator::Ne),
        ">" => Ok(Operator::Gt),
        "<" => Ok(Operator::Lt),
        ">=" => Ok(Operator::Ge),
        "<=" => Ok(Operator::Le),
        _ => Err(Error::Syntax(format!("unknown comparison operator '{symbol}'"))),
    }
}

/// Splits a where clause into conditions at top-level `and`/`or`.
/// Each condition is tagged with the connective that preceded it;
/// the first condition takes the connective that follows it, so
/// `a or b` tags both clauses OR rather than leaving `a` in the
/// AND set. A lone clause defaults to AND.
pub fn parse_where(text: &str) -> Result<Vec<Condition>> {
    let mut conditions = Vec::new();
    let mut connective: Option<Connective> = None;
    let mut remaining = text.trim();

    loop {
        let and_pos = find_connective(remaining, "and");
        let or_pos = find_connective(remaining, "or");
        let (clause, next_connective, rest) = match (and_pos, or_pos) {
            (Some(a), Some(o)) if a < o => {
                (&remaining[..a], Some(Connective::And), &remaining[a + 5..])
            }
            (Some(_), Some(o)) => (&remaining[..o], Some(Connective::Or), &remaining[o + 4..]),
            (Some(a), None) => (&remaining[..a], Some(Connective::And), &remaining[a + 5..]),
            (None, Some(o)) => (&remaining[..o], Some(Connective::Or), &remaining[o + 4..]),
            (None, None) => (remaining, None, ""),
        };
        let tag = connective
            .or(next_connective)
            .unwrap_or(Connective::And);
        conditions.push(parse_clause(clause.trim(), tag)?);
        match next_connective {
            Some(next) => {
                connective = Some(next);
                remaining = rest.trim();
            }
            None => break,
        }
    }
    Ok(conditions)
}

/// Position of ` and ` / ` or ` as a standalone word outside quotes
/// and parentheses. Returns the index of the space before the word.
fn find_connective(text: &str, word: &str) -> Option<usize> {
    let padded = format!(" {word} ");
    find_top_level(text, &padded)
}

fn parse_clause(clause: &str, connective: Connective) -> Result<Condition> {
    if clause.is_empty() {
        return Err(Error::Syntax("empty condition".into()));
    }

    if let Some(inner) = subquery_after_keyword(clause, "not exists") {
        return Ok(Condition::new(
            connective,
            "",
            Operator::NotExists,
            ConditionValue::Subquery(Box::new(parse_subquery(inner)?)),
        ));
    }
    if let Some(inner) = subquery_after_keyword(clause, "exists") {
        return Ok(Condition::new(
            connective,
            "",
            Operator::Exists,
            ConditionValue::Subquery(Box::new(parse_subquery(inner)?)),
        ));
    }

    let (property, operator, value_raw) = split_operator(clause)?;
    let property = strip_quotes(property).to_lowercase();
    let value_raw = value_raw.trim();

    // A parenthesized value may be a nested query.
    if value_raw.starts_with('(') && value_raw.ends_with(')') {
        let inner = value_raw[1..value_raw.len() - 1].trim();
        if let Ok(sub) = parse_subquery(inner) {
            let operator = promote_for_subquery(operator, &sub)?;
            return Ok(Condition::new(
                connective,
                property,
                operator,
                ConditionValue::Subquery(Box::new(sub)),
            ));
        }
        // Not a subquery: a literal list like `in (1, 2, 3)`.
        if matches!(operator, Operator::In | Operator::NotIn) {
            let list = format!("[{inner}]");
            return Ok(Condition::new(
                connective,
                property,
                operator,
                ConditionValue::Text(list),
            ));
        }
    }

    Ok(Condition::new(
        connective,
        property,
        operator,
        ConditionValue::Text(value_raw.to_string()),
    ))
}

/// Maps a plain comparison operator onto its subquery-aware form:
/// equality against a value list is membership, ordered comparisons
/// against an aggregate query compare with the aggregate result.
fn promote_for_subquery(operator: Operator, sub: &Query) -> Result<Operator> {
    if operator.wants_subquery() {
        return Ok(operator);
    }
    let aggregate_like =
        matches!(sub.kind, QueryKind::Aggregate | QueryKind::Count) || sub.aggregate.is_some();
    match operator {
        Operator::Eq if !aggregate_like => Ok(Operator::In),
        Operator::Ne if !aggregate_like => Ok(Operator::NotIn),
        _ => operator.to_aggregate().ok_or_else(|| {
            Error::Syntax(format!("operator {operator:?} cannot take a subquery"))
        }),
    }
}

fn subquery_after_keyword<'a>(clause: &'a str, keyword: &str) -> Option<&'a str> {
    let rest = strip_prefix_ci(clause, keyword)?;
    let rest = rest.trim();
    if rest.starts_with('(') && rest.ends_with(')') {
        Some(rest[1..rest.len() - 1].trim())
    } else {
        None
    }
}

/// Finds the operator in a single clause. Word operators are matched
/// at word boundaries; symbol operators longest-first so `>=` wins
/// over `>`.
fn split_operator(clause: &str) -> Result<(&str, Operator, &str)> {
    const WORD_OPS: &[(&str, Operator)] = &[
        (" not in ", Operator::NotIn),
        (" not_in ", Operator::NotIn),
        (" in ", Operator::In),
        (" contains ", Operator::Contains),
        (" like ", Operator::Like),
        (" starts with ", Operator::StartsWith),
        (" starts_with ", Operator::StartsWith),
        (" ends with ", Operator::EndsWith),
        (" ends_with ", Operator::EndsWith),
        (" upper ", Operator::Upper),
        (" lower ", Operator::Lower),
        (" trim ", Operator::Trim),
        (" length ", Operator::Length),
        (" substring ", Operator::Substring),
        (" replace ", Operator::Replace),
        (" any ", Operator::Any),
        (" all ", Operator::All),
    ];
    const SYMBOL_OPS: &[(&str, Operator)] = &[
        (">=", Operator::Ge),
        ("<=", Operator::Le),
        ("!=", Operator::Ne),
        ("<>", Operator::Ne),
        ("=", Operator::Eq),
        (">", Operator::Gt),
        ("<", Operator::Lt),
    ];

    // Earliest match wins so `a = any (…)` picks `=` … which `any`
    // then refines below.
    let mut best: Option<(usize, usize, Operator)> = None;
    for (token, op) in WORD_OPS {
        if let Some(pos) = find_top_level(clause, token) {
            if best.map(|(b, _, _)| pos < b).unwrap_or(true) {
                best = Some((pos, token.len(), *op));
            }
        }
    }
    for (token, op) in SYMBOL_OPS {
        if let Some(pos) = find_top_level(clause, token) {
            if best.map(|(b, _, _)| pos < b).unwrap_or(true) {
                best = Some((pos, token.len(), *op));
            }
        }
    }
    let Some((pos, len, mut operator)) = best else {
        return Err(Error::Syntax(format!("no operator in condition '{clause}'")));
    };

    let property = clause[..pos].trim();
    let mut value = clause[pos + len..].trim();

    // `= any (…)` / `= all (…)`: the word after the symbol refines
    // the operator.
    if operator == Operator::Eq {
        if let Some(rest) = strip_prefix_ci(value, "any") {
            operator = Operator::Any;
            value = rest;
        } else if let Some(rest) = strip_prefix_ci(value, "all") {
            operator = Operator::All;
            value = rest;
        }
    }

    if property.is_empty() || value.is_empty() {
        return Err(Error::Syntax(format!("malformed condition '{clause}'")));
    }
    Ok((property, operator, value))
}

/// Parses the inside of a parenthesized subquery. Four shapes:
/// `select <prop|*> from <label> [where …]`, `find …`, `count …`,
/// and `<agg>(prop) from <label> [where …]`.
pub fn parse_subquery(inner: &str) -> Result<Query> {
    let inner = inner.trim();

    static SELECT: OnceLock<Regex> = OnceLock::new();
    let select = SELECT.get_or_init(|| {
        Regex::new(r"(?i)^select\s+(\S+)\s+from\s+(\S+)(?:\s+where\s+(.+))?$").unwrap()
    });
    if let Some(caps) = select.captures(inner) {
        let mut query = Query::new(QueryKind::FindNodes);
        let projection = caps[1].to_lowercase();
        query.projection = if projection == "*" {
            None
        } else {
            Some(projection)
        };
        query.label = Some(normalize_label(&caps[2]));
        if let Some(where_text) = caps.get(3) {
            query.conditions = parse_where(where_text.as_str())?;
        }
        return Ok(query);
    }

    static AGGREGATE: OnceLock<Regex> = OnceLock::new();
    let aggregate = AGGREGATE.get_or_init(|| {
        Regex::new(r"(?i)^(sum|avg|min|max|count)\s*\(\s*([\w$*]*)\s*\)\s+from\s+(\S+)(?:\s+where\s+(.+))?$")
            .unwrap()
    });
    if let Some(caps) = aggregate.captures(inner) {
        let function = AggregateFn::from_word(&caps[1])
            .ok_or_else(|| Error::Syntax(format!("unknown aggregate '{}'", &caps[1])))?;
        let property = caps[2].to_lowercase();
        let label = normalize_label(&caps[3]);
        let where_text = caps.get(4).map(|m| m.as_str().to_string());

        if function == AggregateFn::Count && (property.is_empty() || property == "*") {
            let mut query = Query::new(QueryKind::Count);
            query.label = Some(label);
            if let Some(w) = where_text {
                query.conditions = parse_where(&w)?;
            }
            return Ok(query);
        }
        let mut query = Query::new(QueryKind::Aggregate);
        query.aggregate = Some(AggregateSpec { function, property });
        query.label = Some(label);
        if let Some(w) = where_text {
            query.conditions = parse_where(&w)?;
        }
        return Ok(query);
    }

    if strip_prefix_ci(inner, "find").is_some()
        || strip_prefix_ci(inner, "count").is_some()
        || strip_prefix_ci(inner, "get").is_some()
    {
        return parse(inner);
    }

    Err(Error::Syntax(format!("unrecognized subquery '{inner}'")))
}
