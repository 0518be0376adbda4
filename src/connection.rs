//! Connection seam for running compiled queries.
//!
//! The compiler never talks to a database itself. Drivers implement
//! [`Connection`] and receive the SQL, the bound parameters and the
//! transaction context the builder was given.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::instrument;

use crate::error::QueryError;
use crate::query::{QueryBuilder, QueryKind};
use crate::sql::PlaceholderStyle;

/// A row as column name to value.
pub type Row = Map<String, Value>;

/// SQL text with its parameters, in placeholder order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompiledQuery {
    pub sql: String,
    pub params: Vec<Value>,
    pub placeholders: PlaceholderStyle,
}

/// What the caller expects back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecuteMode {
    /// Every row.
    All,
    /// The first row, if any.
    Get,
    /// Affected row count and generated key.
    Run,
}

impl ExecuteMode {
    /// Default mode for a statement kind.
    pub fn for_kind(kind: QueryKind) -> Self {
        match kind {
            QueryKind::Select => ExecuteMode::All,
            QueryKind::Count => ExecuteMode::Get,
            _ => ExecuteMode::Run,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutcome {
    Rows(Vec<Row>),
    Row(Option<Row>),
    Affected { rows: u64, insert_id: Option<Value> },
}

/// Handle of an open transaction, passed through to the driver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionContext {
    pub id: String,
    pub read_only: bool,
}

impl TransactionContext {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            read_only: false,
        }
    }

    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }
}

/// Errors reported by a driver.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConnectionError {
    #[error("connection closed")]
    Closed,

    #[error("statement failed: {0}")]
    Statement(String),

    #[error("transaction '{0}' is not open")]
    UnknownTransaction(String),
}

/// Errors from [`QueryBuilder::execute`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExecuteError {
    #[error(transparent)]
    Query(#[from] QueryError),

    #[error(transparent)]
    Connection(#[from] ConnectionError),
}

/// Runs compiled queries.
///
/// # Example
///
/// ```ignore
/// struct Logging;
///
/// #[async_trait]
/// impl Connection for Logging {
///     async fn execute(
///         &self,
///         query: &CompiledQuery,
///         mode: ExecuteMode,
///         ctx: Option<&TransactionContext>,
///     ) -> Result<QueryOutcome, ConnectionError> {
///         println!("{}", query.sql);
///         Ok(QueryOutcome::Rows(vec![]))
///     }
/// }
/// ```
#[async_trait]
pub trait Connection: Send + Sync {
    async fn execute(
        &self,
        query: &CompiledQuery,
        mode: ExecuteMode,
        ctx: Option<&TransactionContext>,
    ) -> Result<QueryOutcome, ConnectionError>;
}

impl QueryBuilder<'_> {
    /// Compile and run through `connection`; `mode` defaults by statement kind.
    #[instrument(
        skip(self, connection, mode),
        fields(entity = %self.entity, kind = tracing::field::Empty, mode = tracing::field::Empty)
    )]
    pub async fn execute(
        &mut self,
        connection: &dyn Connection,
        mode: Option<ExecuteMode>,
    ) -> Result<QueryOutcome, ExecuteError> {
        let compiled = self.compile()?;
        let kind = self.kind.unwrap_or(QueryKind::Select);
        let mode = mode.unwrap_or_else(|| ExecuteMode::for_kind(kind));

        let span = tracing::Span::current();
        span.record("kind", tracing::field::debug(kind));
        span.record("mode", tracing::field::debug(mode));

        let outcome = connection.execute(&compiled, mode, self.transaction.as_ref()).await?;
        Ok(outcome)
    }
}
