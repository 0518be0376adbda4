//! Criteria operator vocabulary.

use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;

/// Separator joining the columns of a composite key into one criteria key.
pub const COMPOSITE_SEPARATOR: &str = "~~~";

/// Keys matching this are raw SQL expressions rather than property names.
static RAW_KEY: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"[ ?<>=()'"`]|^\d"#).unwrap());

/// Comparison and logical operators accepted in criteria.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    And,
    Or,
    Not,
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    In,
    Nin,
    Like,
    ILike,
    Re,
    Exists,
    Overlap,
    Contains,
    Contained,
}

impl Operator {
    pub fn parse(key: &str) -> Option<Operator> {
        Some(match key {
            "$and" => Operator::And,
            "$or" => Operator::Or,
            "$not" => Operator::Not,
            "$eq" => Operator::Eq,
            "$ne" => Operator::Ne,
            "$gt" => Operator::Gt,
            "$gte" => Operator::Gte,
            "$lt" => Operator::Lt,
            "$lte" => Operator::Lte,
            "$in" => Operator::In,
            "$nin" => Operator::Nin,
            "$like" => Operator::Like,
            "$ilike" => Operator::ILike,
            "$re" => Operator::Re,
            "$exists" => Operator::Exists,
            "$overlap" => Operator::Overlap,
            "$contains" => Operator::Contains,
            "$contained" => Operator::Contained,
            _ => return None,
        })
    }

    /// `$and`, `$or` and `$not` combine criteria instead of comparing a value.
    pub fn is_group(self) -> bool {
        matches!(self, Operator::And | Operator::Or | Operator::Not)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Operator::And => "$and",
            Operator::Or => "$or",
            Operator::Not => "$not",
            Operator::Eq => "$eq",
            Operator::Ne => "$ne",
            Operator::Gt => "$gt",
            Operator::Gte => "$gte",
            Operator::Lt => "$lt",
            Operator::Lte => "$lte",
            Operator::In => "$in",
            Operator::Nin => "$nin",
            Operator::Like => "$like",
            Operator::ILike => "$ilike",
            Operator::Re => "$re",
            Operator::Exists => "$exists",
            Operator::Overlap => "$overlap",
            Operator::Contains => "$contains",
            Operator::Contained => "$contained",
        }
    }
}

/// Whether `key` is any known operator.
pub fn is_operator(key: &str) -> bool {
    Operator::parse(key).is_some()
}

/// Whether `key` is a known operator other than `$and`/`$or`/`$not`.
pub fn is_value_operator(key: &str) -> bool {
    Operator::parse(key).is_some_and(|op| !op.is_group())
}

pub fn is_group_operator(key: &str) -> bool {
    Operator::parse(key).is_some_and(Operator::is_group)
}

/// Whether `key` looks like an operator but is not one we know.
pub fn is_unknown_operator(key: &str) -> bool {
    key.starts_with('$') && !is_operator(key)
}

/// Object whose keys are all value operators, e.g. `{"$gt": 1, "$lt": 5}`.
pub fn is_operator_map(value: &Value) -> bool {
    match value {
        Value::Object(map) => !map.is_empty() && map.keys().all(|k| is_value_operator(k)),
        _ => false,
    }
}

pub fn is_raw_key(key: &str) -> bool {
    RAW_KEY.is_match(key)
}

/// Values usable as a primary key on their own.
pub fn is_scalar(value: &Value) -> bool {
    matches!(
        value,
        Value::Null | Value::Bool(_) | Value::Number(_) | Value::String(_)
    )
}

/// Split a composite criteria key into its column keys.
pub fn split_composite(key: &str) -> Vec<&str> {
    key.split(COMPOSITE_SEPARATOR).collect()
}

/// Join column keys into one composite criteria key.
pub fn composite_key(columns: &[String]) -> String {
    columns.join(COMPOSITE_SEPARATOR)
}
