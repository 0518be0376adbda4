//! A complete statement of any kind, ready to serialize.

use serde_json::Value;

use super::dialect::Dialect;
use super::dml::{Delete, Insert, Truncate, Update};
use super::query::Query;
use super::token::TokenStream;

/// Any statement the query builder can assemble.
#[derive(Debug, Clone)]
pub enum Statement {
    Select(Query),
    Insert(Insert),
    Update(Update),
    Delete(Delete),
    Truncate(Truncate),
}

impl Statement {
    pub fn to_tokens(&self, dialect: Dialect) -> TokenStream {
        match self {
            Statement::Select(query) => query.to_tokens_for_dialect(dialect),
            Statement::Insert(insert) => insert.to_tokens(dialect),
            Statement::Update(update) => update.to_tokens(dialect),
            Statement::Delete(delete) => delete.to_tokens(dialect),
            Statement::Truncate(truncate) => truncate.to_tokens(dialect),
        }
    }

    /// SQL text with dialect placeholders.
    pub fn to_sql(&self, dialect: Dialect) -> String {
        self.to_tokens(dialect).serialize(dialect)
    }

    /// Bound values in placeholder order.
    pub fn params(&self, dialect: Dialect) -> Vec<Value> {
        self.to_tokens(dialect).params()
    }
}

impl From<Query> for Statement {
    fn from(query: Query) -> Self {
        Statement::Select(query)
    }
}
