//! The structured query produced by the parser and consumed by the
//! dispatcher.
//!
//! One `Query` record covers every query kind; the kind tag decides
//! which fields are meaningful. Conditions are explicit tagged
//! records (connective + property + operator + value) rather than an
//! encoded string key, so the evaluator never re-parses anything.

use askgraph_api::PropertyValue;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueryKind {
    CreateNode,
    CreateEdge,
    FindNodes,
    FindEdges,
    FindPath,
    FindWithinSteps,
    UpdateNodes,
    UpdateEdges,
    DeleteNodes,
    DeleteEdges,
    Count,
    Aggregate,
    DefineVariable,
    Batch,
    VirtualJoin,
    GroupBy,
    OrderBy,
    Having,
    ShowSchema,
}

impl QueryKind {
    pub fn name(&self) -> &'static str {
        match self {
            QueryKind::CreateNode => "create-node",
            QueryKind::CreateEdge => "create-edge",
            QueryKind::FindNodes => "find-nodes",
            QueryKind::FindEdges => "find-edges",
            QueryKind::FindPath => "find-path",
            QueryKind::FindWithinSteps => "find-within-steps",
            QueryKind::UpdateNodes => "update-nodes",
            QueryKind::UpdateEdges => "update-edges",
            QueryKind::DeleteNodes => "delete-nodes",
            QueryKind::DeleteEdges => "delete-edges",
            QueryKind::Count => "count",
            QueryKind::Aggregate => "aggregate",
            QueryKind::DefineVariable => "define-variable",
            QueryKind::Batch => "batch",
            QueryKind::VirtualJoin => "virtual-join",
            QueryKind::GroupBy => "group-by",
            QueryKind::OrderBy => "order-by",
            QueryKind::Having => "having",
            QueryKind::ShowSchema => "show-schema",
        }
    }
}

/// Whether a condition joins the AND set or the OR set.
///
/// A condition with no explicit connective in the source text
/// defaults to And.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Connective {
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operator {
    Eq,
    Ne,
    Gt,
    Lt,
    Ge,
    Le,
    Contains,
    Like,
    StartsWith,
    EndsWith,
    Upper,
    Lower,
    Trim,
    Length,
    Substring,
    Replace,
    Exists,
    NotExists,
    In,
    NotIn,
    Any,
    All,
    EqAggregate,
    GtAggregate,
    LtAggregate,
    GeAggregate,
    LeAggregate,
}

impl Operator {
    /// Operators whose value must be a nested query.
    pub fn wants_subquery(&self) -> bool {
        matches!(
            self,
            Operator::Exists
                | Operator::NotExists
                | Operator::In
                | Operator::NotIn
                | Operator::Any
                | Operator::All
                | Operator::EqAggregate
                | Operator::GtAggregate
                | Operator::LtAggregate
                | Operator::GeAggregate
                | Operator::LeAggregate
        )
    }

    /// The aggregate-comparison twin of a plain comparison operator.
    pub fn to_aggregate(self) -> Option<Operator> {
        match self {
            Operator::Eq => Some(Operator::EqAggregate),
            Operator::Gt => Some(Operator::GtAggregate),
            Operator::Lt => Some(Operator::LtAggregate),
            Operator::Ge => Some(Operator::GeAggregate),
            Operator::Le => Some(Operator::LeAggregate),
            _ => None,
        }
    }
}

/// A condition value: literal text as written in the query (quotes
/// preserved so variable substitution stays lossless), or a nested
/// structured query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ConditionValue {
    Text(String),
    Subquery(Box<Query>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub connective: Connective,
    pub property: String,
    pub operator: Operator,
    pub value: ConditionValue,
}

impl Condition {
    pub fn new(
        connective: Connective,
        property: impl Into<String>,
        operator: Operator,
        value: ConditionValue,
    ) -> Self {
        Self {
            connective,
            property: property.into(),
            operator,
            value,
        }
    }
}

/// A node reference as written in query text: an optional label
/// prefix plus a name, e.g. `person "Alice"` or just `Alice`.
///
/// Resolution matches the `name` property case-insensitively; when a
/// label is present it must match as well.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRef {
    pub label: Option<String>,
    pub name: String,
}

impl NodeRef {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            label: None,
            name: name.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AggregateFn {
    Sum,
    Avg,
    Min,
    Max,
    Count,
}

impl AggregateFn {
    pub fn name(&self) -> &'static str {
        match self {
            AggregateFn::Sum => "sum",
            AggregateFn::Avg => "avg",
            AggregateFn::Min => "min",
            AggregateFn::Max => "max",
            AggregateFn::Count => "count",
        }
    }

    pub fn from_word(word: &str) -> Option<Self> {
        match word.to_lowercase().as_str() {
            "sum" | "total" => Some(AggregateFn::Sum),
            "avg" | "average" | "mean" => Some(AggregateFn::Avg),
            "min" | "minimum" | "lowest" => Some(AggregateFn::Min),
            "max" | "maximum" | "highest" => Some(AggregateFn::Max),
            "count" => Some(AggregateFn::Count),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateSpec {
    pub function: AggregateFn,
    pub property: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderKey {
    pub property: String,
    pub direction: SortDirection,
}

/// How a virtual join pairs source nodes with target nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum JoinRule {
    /// Bounded BFS following only edges of this relation type.
    EdgeType(String),
    /// Pairwise property comparison with a configurable operator.
    SharedProperty { property: String, operator: Operator },
    /// Reachability over any edge type; bounded when the join carries
    /// a step limit, otherwise unrestricted.
    Reachable,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinSpec {
    pub source_label: String,
    pub target_label: String,
    pub rule: JoinRule,
    pub max_steps: Option<usize>,
    pub bidirectional: bool,
    pub conditions: Vec<Condition>,
}

/// The parsed, executable representation of one line of query text.
///
/// Constructed once by the parser, mutated in place by variable
/// substitution, then read-only for the dispatcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub kind: QueryKind,
    pub label: Option<String>,
    pub source: Option<NodeRef>,
    pub target: Option<NodeRef>,
    pub edge_type: Option<String>,
    pub avoid_edge_type: Option<String>,
    /// Raw `name=value` pairs for create/update; values keep their
    /// quotes until execution coerces them.
    pub properties: Vec<(String, String)>,
    pub conditions: Vec<Condition>,
    /// `select <property> from …` projection for subqueries.
    pub projection: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
    pub max_steps: Option<usize>,
    pub bidirectional: bool,
    pub aggregate: Option<AggregateSpec>,
    pub group_by: Vec<String>,
    pub order_by: Vec<OrderKey>,
    /// Conditions over computed group aggregates, never raw
    /// entity properties.
    pub having: Vec<Condition>,
    pub batch: Vec<Query>,
    pub join: Option<JoinSpec>,
    pub variable_name: Option<String>,
    pub variable_value: Option<String>,
}

impl Query {
    pub fn new(kind: QueryKind) -> Self {
        Self {
            kind,
            label: None,
            source: None,
            target: None,
            edge_type: None,
            avoid_edge_type: None,
            properties: Vec::new(),
            conditions: Vec::new(),
            projection: None,
            limit: None,
            offset: None,
            max_steps: None,
            bidirectional: false,
            aggregate: None,
            group_by: Vec::new(),
            order_by: Vec::new(),
            having: Vec::new(),
            batch: Vec::new(),
            join: None,
            variable_name: None,
            variable_value: None,
        }
    }
}

/// Removes one layer of matching quotes from a raw token.
pub fn strip_quotes(raw: &str) -> &str {
    let t = raw.trim();
    if t.len() >= 2 {
        let bytes = t.as_bytes();
        let (first, last) = (bytes[0], bytes[t.len() - 1]);
        if (first == b'"' && last == b'"') || (first == b'\'' && last == b'\'') {
            return &t[1..t.len() - 1];
        }
    }
    t
}

/// Coerces a raw literal token into a typed property value.
///
/// Quoted text is always a string. Bare tokens try bool, int, float,
/// then RFC 3339 timestamp; a `[a, b, c]` token becomes a list of
/// recursively coerced elements. Anything else stays a string.
pub fn literal_value(raw: &str) -> PropertyValue {
    let t = raw.trim();
    if t.len() >= 2 {
        let bytes = t.as_bytes();
        let (first, last) = (bytes[0], bytes[t.len() - 1]);
        if (first == b'"' && last == b'"') || (first == b'\'' && last == b'\'') {
            return PropertyValue::String(t[1..t.len() - 1].to_string());
        }
        if first == b'[' && last == b']' {
            let inner = &t[1..t.len() - 1];
            let items = split_top_level(inner, ',')
                .into_iter()
                .map(|part| literal_value(&part))
                .collect();
            return PropertyValue::List(items);
        }
    }
    if t.eq_ignore_ascii_case("true") {
        return PropertyValue::Bool(true);
    }
    if t.eq_ignore_ascii_case("false") {
        return PropertyValue::Bool(false);
    }
    if let Ok(i) = t.parse::<i64>() {
        return PropertyValue::Int(i);
    }
    if let Ok(f) = t.parse::<f64>() {
        return PropertyValue::Float(f);
    }
    if let Ok(ts) = chrono::DateTime::parse_from_rfc3339(t) {
        return PropertyValue::Timestamp(ts.with_timezone(&chrono::Utc));
    }
    PropertyValue::String(t.to_string())
}

/// Splits on a delimiter, ignoring occurrences inside quotes,
/// parentheses, or brackets.
pub fn split_top_level(text: &str, delimiter: char) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    for c in text.chars() {
        match quote {
            Some(q) => {
                current.push(c);
                if c == q {
                    quote = None;
                }
            }
            None => match c {
                '"' | '\'' => {
                    quote = Some(c);
                    current.push(c);
                }
                '(' | '[' => {
                    depth += 1;
                    current.push(c);
                }
                ')' | ']' => {
                    depth = depth.saturating_sub(1);
                    current.push(c);
                }
                _ if c == delimiter && depth == 0 => {
                    parts.push(current.trim().to_string());
                    current.clear();
                }
                _ => current.push(c),
            },
        }
    }
    if !current.trim().is_empty() {
        parts.push(current.trim().to_string());
    }
    parts
}
