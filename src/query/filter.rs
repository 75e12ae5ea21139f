//! Store-native filter fragments.
//!
//! A [`Filter`] is what an [`super::Operator`] hands to the persistence boundary. It renders to a
//! MongoDB-style JSON query ([`Filter::to_document`]) and can be evaluated against a [`Record`]
//! ([`Filter::matches`]) by stores without a native query engine. Both forms share the value
//! comparison helpers in this module with the in-memory operator evaluation.

use std::cmp::Ordering;

use regex::{Regex, RegexBuilder};
use serde_json::{json, Map, Value as Json};

use crate::types::{Record, Value};

/// Ordering comparison kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Gt,
    Lt,
    Gte,
    Lte,
}

impl CompareOp {
    /// Query-language key (`$gt`, ...).
    pub fn key(self) -> &'static str {
        match self {
            CompareOp::Gt => "$gt",
            CompareOp::Lt => "$lt",
            CompareOp::Gte => "$gte",
            CompareOp::Lte => "$lte",
        }
    }

    fn accepts(self, ord: Ordering) -> bool {
        match self {
            CompareOp::Gt => ord == Ordering::Greater,
            CompareOp::Lt => ord == Ordering::Less,
            CompareOp::Gte => ord != Ordering::Less,
            CompareOp::Lte => ord != Ordering::Greater,
        }
    }
}

/// A query fragment over dotted field paths.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Matches every document.
    All,
    /// Matches no document.
    Nothing,
    Eq { field: String, value: Value },
    Ne { field: String, value: Value },
    In { field: String, values: Vec<Value> },
    NotIn { field: String, values: Vec<Value> },
    /// Pattern match against string fields. `pattern` is already escaped and anchored.
    Regex {
        field: String,
        pattern: String,
        case_insensitive: bool,
        negated: bool,
    },
    /// Ordering. `value` is the coerced operand; `raw` is the operand as given, which text fields
    /// are compared against.
    Compare {
        field: String,
        op: CompareOp,
        value: Value,
        raw: Value,
    },
    And(Vec<Filter>),
}

impl Filter {
    /// Conjunction that drops `All` members and collapses trivial cases.
    pub fn and(filters: impl IntoIterator<Item = Filter>) -> Filter {
        let mut parts = Vec::new();
        for f in filters {
            match f {
                Filter::All => {}
                Filter::Nothing => return Filter::Nothing,
                Filter::And(inner) => parts.extend(inner),
                other => parts.push(other),
            }
        }
        match parts.len() {
            0 => Filter::All,
            1 => parts.remove(0),
            _ => Filter::And(parts),
        }
    }

    /// Render as a MongoDB-style query document.
    pub fn to_document(&self) -> Json {
        match self {
            Filter::All => json!({}),
            Filter::Nothing => json!({ "$expr": false }),
            Filter::Eq { field, value } => single(field, to_query_json(value)),
            Filter::Ne { field, value } => single(field, json!({ "$ne": to_query_json(value) })),
            Filter::In { field, values } => single(field, json!({ "$in": list(values) })),
            Filter::NotIn { field, values } => single(field, json!({ "$nin": list(values) })),
            Filter::Regex {
                field,
                pattern,
                case_insensitive,
                negated,
            } => {
                let mut re = Map::new();
                re.insert("$regex".to_string(), Json::String(pattern.clone()));
                if *case_insensitive {
                    re.insert("$options".to_string(), Json::String("i".to_string()));
                }
                if *negated {
                    single(field, json!({ "$not": Json::Object(re) }))
                } else {
                    single(field, Json::Object(re))
                }
            }
            Filter::Compare { field, op, value, .. } => single(field, single(op.key(), to_query_json(value))),
            Filter::And(parts) => json!({ "$and": parts.iter().map(Filter::to_document).collect::<Vec<_>>() }),
        }
    }

    /// Evaluate against a record. Missing fields read as null.
    ///
    /// Patterns are compiled on every call; use [`Filter::compile`] to test many records.
    pub fn matches(&self, record: &Record) -> bool {
        let lookup = |field: &str| field_value(record, field);
        match self {
            Filter::All => true,
            Filter::Nothing => false,
            Filter::Eq { field, value } => value_matches(lookup(field), value),
            Filter::Ne { field, value } => !value_matches(lookup(field), value),
            Filter::In { field, values } => member_of(lookup(field), values),
            Filter::NotIn { field, values } => !member_of(lookup(field), values),
            Filter::Regex {
                field,
                pattern,
                case_insensitive,
                negated,
            } => pattern_matches(text_regex(pattern, *case_insensitive).as_ref(), lookup(field), *negated),
            Filter::Compare { field, op, value, raw } => compare_values(*op, lookup(field), value, raw),
            Filter::And(parts) => parts.iter().all(|p| p.matches(record)),
        }
    }

    /// Compile every pattern once, for evaluating the filter against many records.
    pub fn compile(&self) -> CompiledFilter {
        CompiledFilter { root: Node::of(self) }
    }
}

/// A [`Filter`] with its regex patterns compiled. Selects exactly what [`Filter::matches`] does.
#[derive(Debug, Clone)]
pub struct CompiledFilter {
    root: Node,
}

#[derive(Debug, Clone)]
enum Node {
    Plain(Filter),
    Pattern {
        field: String,
        regex: Option<Regex>,
        negated: bool,
    },
    And(Vec<Node>),
}

impl Node {
    fn of(filter: &Filter) -> Node {
        match filter {
            Filter::Regex {
                field,
                pattern,
                case_insensitive,
                negated,
            } => Node::Pattern {
                field: field.clone(),
                regex: text_regex(pattern, *case_insensitive),
                negated: *negated,
            },
            Filter::And(parts) => Node::And(parts.iter().map(Node::of).collect()),
            other => Node::Plain(other.clone()),
        }
    }

    fn matches(&self, record: &Record) -> bool {
        match self {
            Node::Plain(f) => f.matches(record),
            Node::Pattern { field, regex, negated } => pattern_matches(regex.as_ref(), field_value(record, field), *negated),
            Node::And(parts) => parts.iter().all(|p| p.matches(record)),
        }
    }
}

impl CompiledFilter {
    pub fn matches(&self, record: &Record) -> bool {
        self.root.matches(record)
    }
}

/// Build the matcher for an escaped, anchored text pattern. `None` when it does not compile.
pub(crate) fn text_regex(pattern: &str, case_insensitive: bool) -> Option<Regex> {
    RegexBuilder::new(pattern).case_insensitive(case_insensitive).build().ok()
}

/// An uncompilable pattern matches nothing.
pub(crate) fn pattern_matches(regex: Option<&Regex>, field_value: &Value, negated: bool) -> bool {
    regex.is_some_and(|re| text_matches(field_value, |s| re.is_match(s))) != negated
}

/// Value at a dotted path, null when absent.
pub(crate) fn field_value<'a>(record: &'a Record, field: &str) -> &'a Value {
    const NULL: &Value = &Value::Null;
    record.get_path(field).unwrap_or(NULL)
}

fn single(field: &str, condition: Json) -> Json {
    let mut m = Map::new();
    m.insert(field.to_string(), condition);
    Json::Object(m)
}

fn list(values: &[Value]) -> Json {
    Json::Array(values.iter().map(to_query_json).collect())
}

/// JSON form of a query operand; dates use the extended-JSON `$date` wrapper.
pub fn to_query_json(value: &Value) -> Json {
    match value {
        Value::Date(_) => json!({ "$date": value.to_text() }),
        Value::Array(items) => list(items),
        Value::Document(map) => Json::Object(map.iter().map(|(k, v)| (k.clone(), to_query_json(v))).collect()),
        other => other.to_json(),
    }
}

/// Equality as a document store applies it: a scalar operand matches an array field when any
/// element is equal.
pub(crate) fn value_matches(field_value: &Value, operand: &Value) -> bool {
    match (field_value, operand) {
        (Value::Array(items), op) if !matches!(op, Value::Array(_)) => items.iter().any(|i| i.loose_eq(op)),
        (fv, op) => fv.loose_eq(op),
    }
}

pub(crate) fn member_of(field_value: &Value, candidates: &[Value]) -> bool {
    candidates.iter().any(|c| value_matches(field_value, c))
}

/// Apply a text predicate to a string field, or to any string element of an array field.
fn text_matches(field_value: &Value, pred: impl Fn(&str) -> bool) -> bool {
    match field_value {
        Value::Utf8(s) => pred(s),
        Value::Array(items) => items.iter().any(|i| matches!(i, Value::Utf8(s) if pred(s))),
        _ => false,
    }
}

/// Ordering comparison.
///
/// Numbers compare numerically against the coerced `operand`, and only with numbers. Dates
/// compare chronologically when the operand coerced to a date. Every other scalar compares its
/// text form lexically with the text of `raw`, the operand as given. Null, array and document
/// field values never match.
pub(crate) fn compare_values(op: CompareOp, field_value: &Value, operand: &Value, raw: &Value) -> bool {
    if operand.is_null() || raw.is_null() {
        return false;
    }
    let ord = match (field_value, operand) {
        (Value::Null | Value::Array(_) | Value::Document(_), _) => return false,
        (fv, _) if fv.is_number() => match (fv.as_f64(), operand.as_f64()) {
            (Some(a), Some(b)) => a.partial_cmp(&b),
            _ => None,
        },
        (Value::Date(a), Value::Date(b)) => Some(a.cmp(b)),
        (fv, _) => Some(fv.to_text().cmp(&raw.to_text())),
    };
    ord.is_some_and(|o| op.accepts(o))
}
