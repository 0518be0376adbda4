//! Compiles processed criteria into SQL expressions.
//!
//! Criteria reaching this point already carry column keys (`a0.name`,
//! composite `a0.org_id~~~a0.id`, raw SQL keys) produced by criteria
//! processing. Every value is bound as a parameter.

use serde_json::Value;

use crate::criteria::operators::{is_raw_key, split_composite, Operator};
use crate::error::{QueryError, QueryResult};
use crate::sql::expr::conjunction;
use crate::sql::{
    fragment, lower, param, qualified, raw_sql, tuple, BinaryOperator, Dialect, Expr, ExprExt,
    Query, SqlDialect,
};

/// Accumulated WHERE or HAVING state of a builder.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Processed criteria map.
    Criteria(Value),
    /// SQL with `?` markers.
    Raw { sql: String, params: Vec<Value> },
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
    /// `(columns) IN (query)`
    InSubquery { columns: Vec<String>, query: Box<Query> },
}

impl Predicate {
    /// Combine with `other` under AND, flattening nested ANDs.
    pub fn and(self, other: Predicate) -> Predicate {
        match self {
            Predicate::And(mut items) => {
                items.push(other);
                Predicate::And(items)
            }
            existing => Predicate::And(vec![existing, other]),
        }
    }

    /// Combine with `other` under OR, flattening nested ORs.
    pub fn or(self, other: Predicate) -> Predicate {
        match self {
            Predicate::Or(mut items) => {
                items.push(other);
                Predicate::Or(items)
            }
            existing => Predicate::Or(vec![existing, other]),
        }
    }
}

pub(crate) struct ConditionCompiler<'a> {
    dialect: Dialect,
    strip: Option<&'a str>,
}

impl<'a> ConditionCompiler<'a> {
    pub fn new(dialect: Dialect) -> Self {
        Self { dialect, strip: None }
    }

    /// Drop `alias.` from column keys; used by statements without aliases.
    pub fn strip_alias(mut self, alias: &'a str) -> Self {
        self.strip = Some(alias);
        self
    }

    pub fn predicate(&self, predicate: &Predicate) -> QueryResult<Option<Expr>> {
        match predicate {
            Predicate::Criteria(value) => self.criteria(value),
            Predicate::Raw { sql, params } => {
                Ok(Some(Expr::Paren(Box::new(fragment(sql, params.clone())))))
            }
            Predicate::And(items) => {
                let exprs = self.predicates(items)?;
                Ok(conjunction(exprs.into_iter().map(Expr::grouped).collect()))
            }
            Predicate::Or(items) => Ok(disjunction(self.predicates(items)?)),
            Predicate::InSubquery { columns, query } => {
                let columns = columns.iter().map(|c| self.column(c)).collect();
                Ok(Some(tuple(columns).in_subquery((**query).clone())))
            }
        }
    }

    fn predicates(&self, items: &[Predicate]) -> QueryResult<Vec<Expr>> {
        let mut exprs = Vec::with_capacity(items.len());
        for item in items {
            exprs.extend(self.predicate(item)?);
        }
        Ok(exprs)
    }

    /// Compile a criteria map; `None` when it has no conditions.
    pub fn criteria(&self, value: &Value) -> QueryResult<Option<Expr>> {
        match value {
            Value::Object(map) => {
                let mut exprs = Vec::with_capacity(map.len());
                for (key, value) in map {
                    exprs.extend(self.entry(key, value)?);
                }
                Ok(conjunction(exprs))
            }
            Value::Array(items) => self.group(items, Operator::And),
            other => Err(QueryError::invalid_criteria(format!(
                "expected an object of conditions, got {}",
                other
            ))),
        }
    }

    fn entry(&self, key: &str, value: &Value) -> QueryResult<Option<Expr>> {
        match Operator::parse(key) {
            Some(op @ (Operator::And | Operator::Or)) => match value {
                Value::Array(items) => self.group(items, op),
                Value::Object(_) => self.criteria(value),
                other => Err(QueryError::invalid_criteria(format!(
                    "{} expects a list of conditions, got {}",
                    key, other
                ))),
            },
            Some(Operator::Not) => Ok(self
                .criteria(value)?
                .map(|expr| Expr::Paren(Box::new(expr)).not())),
            Some(op) => Err(QueryError::invalid_criteria(format!(
                "operator {} must be applied to a field",
                op.as_str()
            ))),
            None if is_raw_key(key) => self.raw(key, value).map(Some),
            None => self.compare(self.column(key), value).map(Some),
        }
    }

    fn group(&self, items: &[Value], op: Operator) -> QueryResult<Option<Expr>> {
        let mut exprs = Vec::with_capacity(items.len());
        for item in items {
            exprs.extend(self.criteria(item)?);
        }
        Ok(match op {
            Operator::Or => disjunction(exprs),
            _ => conjunction(exprs.into_iter().map(group_or).collect()),
        })
    }

    fn raw(&self, key: &str, value: &Value) -> QueryResult<Expr> {
        match value {
            Value::Array(params) if key.contains('?') || params.is_empty() => {
                Ok(fragment(key, params.clone()))
            }
            _ => self.compare(raw_sql(key), value),
        }
    }

    /// Column expression for a (possibly composite) criteria key.
    pub fn column(&self, key: &str) -> Expr {
        let columns = split_composite(key)
            .into_iter()
            .map(|k| {
                let k = match self.strip {
                    Some(alias) => k
                        .strip_prefix(alias)
                        .and_then(|rest| rest.strip_prefix('.'))
                        .unwrap_or(k),
                    None => k,
                };
                qualified(k)
            })
            .collect();
        tuple(columns)
    }

    fn compare(&self, target: Expr, value: &Value) -> QueryResult<Expr> {
        match value {
            Value::Null => Ok(target.is_null()),
            Value::Array(items) => {
                if matches!(target, Expr::Tuple(_)) && !items.iter().all(Value::is_array) {
                    Ok(target.eq(row(value)))
                } else {
                    Ok(target.in_list(items.iter().map(row).collect()))
                }
            }
            Value::Object(ops) => {
                let mut exprs = Vec::with_capacity(ops.len());
                for (op, operand) in ops {
                    let parsed = Operator::parse(op).ok_or_else(|| {
                        QueryError::invalid_criteria(format!(
                            "unexpected key '{}' in conditions of a column",
                            op
                        ))
                    })?;
                    exprs.push(self.operator(target.clone(), parsed, operand)?);
                }
                conjunction(exprs).ok_or_else(|| {
                    QueryError::invalid_criteria("empty operator object")
                })
            }
            scalar => Ok(target.eq(param(scalar.clone()))),
        }
    }

    fn operator(&self, target: Expr, op: Operator, value: &Value) -> QueryResult<Expr> {
        let dialect = self.dialect;
        Ok(match op {
            Operator::Eq => self.compare(target, value)?,
            Operator::Ne => match value {
                Value::Null => target.is_not_null(),
                Value::Array(items) => target.not_in_list(items.iter().map(row).collect()),
                _ => target.ne(param(value.clone())),
            },
            Operator::Gt => target.gt(param(value.clone())),
            Operator::Gte => target.gte(param(value.clone())),
            Operator::Lt => target.lt(param(value.clone())),
            Operator::Lte => target.lte(param(value.clone())),
            Operator::In => target.in_list(list(value)),
            Operator::Nin => target.not_in_list(list(value)),
            Operator::Like => target.like(param(value.clone())),
            Operator::ILike if dialect.supports_ilike() => {
                target.binary(BinaryOperator::ILike, param(value.clone()))
            }
            Operator::ILike => lower(target).like(lower(param(value.clone()))),
            Operator::Re => {
                if dialect.regex_syntax().is_none() {
                    return Err(QueryError::unsupported(dialect.name(), "$re"));
                }
                Expr::Regex {
                    expr: Box::new(target),
                    pattern: Box::new(param(value.clone())),
                }
            }
            Operator::Exists => match value {
                Value::Bool(false) => target.is_null(),
                _ => target.is_not_null(),
            },
            Operator::Overlap | Operator::Contains | Operator::Contained => {
                if !dialect.supports_array_operators() {
                    return Err(QueryError::unsupported(dialect.name(), op.as_str()));
                }
                let binary = match op {
                    Operator::Overlap => BinaryOperator::Overlap,
                    Operator::Contains => BinaryOperator::Contains,
                    _ => BinaryOperator::Contained,
                };
                target.binary(binary, param(value.clone()))
            }
            Operator::Not => Expr::Paren(Box::new(self.compare(target, value)?)).not(),
            Operator::And | Operator::Or => {
                return Err(QueryError::invalid_criteria(format!(
                    "{} cannot be nested inside a column condition",
                    op.as_str()
                )))
            }
        })
    }
}

/// Join with OR; more than one term is parenthesized.
fn disjunction(exprs: Vec<Expr>) -> Option<Expr> {
    let many = exprs.len() > 1;
    let joined = exprs
        .into_iter()
        .map(Expr::grouped)
        .reduce(|acc, e| acc.or(e))?;
    Some(if many { Expr::Paren(Box::new(joined)) } else { joined })
}

fn group_or(expr: Expr) -> Expr {
    match expr {
        Expr::BinaryOp {
            op: BinaryOperator::Or,
            ..
        } => Expr::Paren(Box::new(expr)),
        other => other,
    }
}

/// A bound value, or a row of bound values for composite keys.
fn row(value: &Value) -> Expr {
    match value {
        Value::Array(items) => tuple(items.iter().map(|v| param(v.clone())).collect()),
        other => param(other.clone()),
    }
}

fn list(value: &Value) -> Vec<Expr> {
    match value {
        Value::Array(items) => items.iter().map(row).collect(),
        other => vec![param(other.clone())],
    }
}
