//! DML (Data Manipulation Language) support.
//!
//! This module provides types for generating DML statements
//! (INSERT, UPDATE, DELETE, TRUNCATE) across different SQL dialects.
//! Upserts are expressed once as [`OnConflict`] and rendered in the
//! dialect's native form: `ON CONFLICT`, `ON DUPLICATE KEY UPDATE` /
//! `INSERT IGNORE`, or a `MERGE` over a `VALUES` source.
//!
//! # Examples
//!
//! ```ignore
//! use criteria_sql::dml::{Insert, Update, Delete};
//! use criteria_sql::expr::{col, param, ExprExt};
//!
//! let insert = Insert::into("users")
//!     .columns(["name", "email"])
//!     .values([param("Alice"), param("alice@example.com")]);
//!
//! let update = Update::table("users")
//!     .set("status", param("active"))
//!     .filter(col("id").eq(param(1)));
//!
//! let delete = Delete::from("users").filter(col("status").eq(param("inactive")));
//! ```

use super::dialect::{Dialect, SqlDialect, UpsertStyle};
use super::expr::{Expr, ExprExt};
use super::query::TableRef;
use super::token::{Token, TokenStream};

/// Alias of the VALUES source in MERGE-based upserts.
pub const MERGE_SOURCE_ALIAS: &str = "tsource";

fn emit_output(ts: &mut TokenStream, pseudo_table: Token, columns: &[String]) {
    ts.space().push(Token::Output).space();
    ts.comma_separated(columns, |ts, column| {
        ts.push(pseudo_table.clone())
            .push(Token::Dot)
            .ident(column.as_str());
    });
}

fn emit_returning(ts: &mut TokenStream, columns: &[String]) {
    ts.space().push(Token::Returning).space();
    ts.comma_separated(columns, |ts, column| {
        ts.ident(column.as_str());
    });
}

fn emit_column_list(ts: &mut TokenStream, columns: &[String]) {
    ts.lparen();
    ts.comma_separated(columns, |ts, column| {
        ts.ident(column.as_str());
    });
    ts.rparen();
}

fn emit_rows(ts: &mut TokenStream, rows: &[Vec<Expr>], dialect: Dialect) {
    ts.push(Token::Values).space();
    ts.comma_separated(rows, |ts, row| {
        ts.lparen();
        ts.comma_separated(row, |ts, value| {
            ts.append(&value.to_tokens_for_dialect(dialect));
        });
        ts.rparen();
    });
}

// ============================================================================
// INSERT
// ============================================================================

/// INSERT statement.
#[derive(Debug, Clone)]
#[must_use = "DML statements have no effect until converted to SQL with to_sql()"]
pub struct Insert {
    pub table: TableRef,
    pub columns: Vec<String>,
    pub values: Vec<Vec<Expr>>,
    pub on_conflict: Option<OnConflict>,
    pub returning: Vec<String>,
    /// Explicit values are written into an identity column.
    pub identity_insert: bool,
}

impl Insert {
    /// Create a new INSERT statement.
    pub fn into(table: impl Into<String>) -> Self {
        Self {
            table: TableRef::new(&table.into()),
            columns: Vec::new(),
            values: Vec::new(),
            on_conflict: None,
            returning: Vec::new(),
            identity_insert: false,
        }
    }

    /// Set the schema.
    pub fn schema(mut self, schema: Option<&str>) -> Self {
        self.table = self.table.with_schema(schema);
        self
    }

    /// Set the columns to insert.
    pub fn columns(mut self, cols: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.columns = cols.into_iter().map(|c| c.into()).collect();
        self
    }

    /// Add a row of values.
    pub fn values(mut self, vals: impl IntoIterator<Item = impl Into<Expr>>) -> Self {
        self.values.push(vals.into_iter().map(|v| v.into()).collect());
        self
    }

    pub fn on_conflict(mut self, conflict: OnConflict) -> Self {
        self.on_conflict = Some(conflict);
        self
    }

    pub fn returning(mut self, cols: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.returning = cols.into_iter().map(|c| c.into()).collect();
        self
    }

    pub fn identity_insert(mut self, on: bool) -> Self {
        self.identity_insert = on;
        self
    }

    /// Generate SQL for a specific dialect.
    pub fn to_sql(&self, dialect: Dialect) -> String {
        self.to_tokens(dialect).serialize(dialect)
    }

    /// Convert to token stream.
    pub fn to_tokens(&self, dialect: Dialect) -> TokenStream {
        let statement = match (&self.on_conflict, dialect.upsert_style()) {
            (Some(conflict), UpsertStyle::Merge) => self.merge_tokens(conflict, dialect),
            _ => self.insert_tokens(dialect),
        };

        if self.identity_insert {
            dialect.wrap_identity_insert(&self.table.name_tokens(dialect), statement)
        } else {
            statement
        }
    }

    fn insert_tokens(&self, dialect: Dialect) -> TokenStream {
        let mut ts = TokenStream::new();
        let style = dialect.upsert_style();

        ts.push(Token::Insert).space();
        if let (Some(conflict), UpsertStyle::OnDuplicateKey) = (&self.on_conflict, style) {
            if conflict.action == ConflictAction::DoNothing {
                ts.push(Token::Ignore).space();
            }
        }
        ts.push(Token::Into).space();
        ts.append(&self.table.name_tokens(dialect));

        if self.columns.is_empty() {
            if style == UpsertStyle::OnDuplicateKey {
                ts.space().push(Token::Raw("() VALUES ()".into()));
            } else {
                if !self.returning.is_empty() && dialect.uses_output_clause() {
                    emit_output(&mut ts, Token::Inserted, &self.returning);
                }
                ts.space().push(Token::Default).space().push(Token::Values);
            }
        } else {
            ts.space();
            emit_column_list(&mut ts, &self.columns);

            // T-SQL: OUTPUT goes before VALUES
            if !self.returning.is_empty() && dialect.uses_output_clause() {
                emit_output(&mut ts, Token::Inserted, &self.returning);
            }

            ts.space();
            emit_rows(&mut ts, &self.values, dialect);
        }

        if let Some(conflict) = &self.on_conflict {
            match style {
                UpsertStyle::OnConflict => {
                    ts.space().append(&conflict.on_conflict_tokens(dialect));
                }
                UpsertStyle::OnDuplicateKey => {
                    if let ConflictAction::DoUpdate(set) = &conflict.action {
                        ts.space()
                            .push(Token::On)
                            .space()
                            .push(Token::Raw("DUPLICATE KEY".into()))
                            .space()
                            .push(Token::Update)
                            .space();
                        ts.comma_separated(set, |ts, (column, value)| {
                            ts.ident(column.as_str()).space().push(Token::Eq).space();
                            match value {
                                ConflictValue::Excluded(source) => {
                                    ts.push(Token::Values)
                                        .lparen()
                                        .ident(source.as_str())
                                        .rparen();
                                }
                                ConflictValue::Value(expr) => {
                                    ts.append(&expr.to_tokens_for_dialect(dialect));
                                }
                            }
                        });
                    }
                }
                UpsertStyle::Merge | UpsertStyle::None => {}
            }
        }

        // RETURNING (PostgreSQL/DuckDB)
        if !self.returning.is_empty() && dialect.supports_returning() && !dialect.uses_output_clause()
        {
            emit_returning(&mut ts, &self.returning);
        }

        ts
    }

    /// `MERGE INTO t USING (VALUES ...) AS tsource (cols) ON ... WHEN ...;`
    fn merge_tokens(&self, conflict: &OnConflict, dialect: Dialect) -> TokenStream {
        let mut ts = TokenStream::new();
        let target = self.table.name_tokens(dialect);
        let source_col = |column: &str| {
            Expr::Column {
                table: Some(MERGE_SOURCE_ALIAS.into()),
                column: column.into(),
            }
        };

        ts.push(Token::Merge)
            .space()
            .push(Token::Into)
            .space()
            .append(&target)
            .space()
            .push(Token::Using)
            .space()
            .lparen();
        emit_rows(&mut ts, &self.values, dialect);
        ts.rparen()
            .space()
            .push(Token::As)
            .space()
            .ident(MERGE_SOURCE_ALIAS)
            .space();
        emit_column_list(&mut ts, &self.columns);

        // ON target.k = tsource.k AND ...
        ts.space().push(Token::On).space();
        for (i, column) in conflict.target.iter().enumerate() {
            if i > 0 {
                ts.space().push(Token::And).space();
            }
            ts.append(&target)
                .push(Token::Dot)
                .ident(column.as_str())
                .space()
                .push(Token::Eq)
                .space()
                .append(&source_col(column).to_tokens_for_dialect(dialect));
        }

        if let ConflictAction::DoUpdate(set) = &conflict.action {
            ts.space()
                .push(Token::When)
                .space()
                .push(Token::Matched)
                .space()
                .push(Token::Then)
                .space()
                .push(Token::Update)
                .space()
                .push(Token::Set)
                .space();
            ts.comma_separated(set, |ts, (column, value)| {
                ts.ident(column.as_str()).space().push(Token::Eq).space();
                let value = match value {
                    ConflictValue::Excluded(source) => source_col(source),
                    ConflictValue::Value(expr) => expr.clone(),
                };
                ts.append(&value.to_tokens_for_dialect(dialect));
            });
        }

        ts.space()
            .push(Token::When)
            .space()
            .push(Token::Not)
            .space()
            .push(Token::Matched)
            .space()
            .push(Token::Then)
            .space()
            .push(Token::Insert)
            .space();
        emit_column_list(&mut ts, &self.columns);
        ts.space().push(Token::Values).space().lparen();
        ts.comma_separated(&self.columns, |ts, column| {
            ts.append(&source_col(column).to_tokens_for_dialect(dialect));
        });
        ts.rparen();

        if !self.returning.is_empty() && dialect.uses_output_clause() {
            emit_output(&mut ts, Token::Inserted, &self.returning);
        }

        // MERGE must be terminated
        ts.push(Token::Semicolon);
        ts
    }
}

/// Upsert behaviour for an INSERT.
#[derive(Debug, Clone, PartialEq)]
pub struct OnConflict {
    /// Conflict target columns (unique or primary key).
    pub target: Vec<String>,
    pub action: ConflictAction,
    /// Only update rows matching this condition (`ON CONFLICT ... WHERE`).
    pub filter: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConflictAction {
    DoNothing,
    DoUpdate(Vec<(String, ConflictValue)>),
}

/// Value assigned to a column when an upsert hits an existing row.
#[derive(Debug, Clone, PartialEq)]
pub enum ConflictValue {
    /// The value proposed for insertion into the named column.
    Excluded(String),
    Value(Expr),
}

impl OnConflict {
    /// Create ON CONFLICT DO NOTHING.
    pub fn do_nothing(target: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            target: target.into_iter().map(Into::into).collect(),
            action: ConflictAction::DoNothing,
            filter: None,
        }
    }

    /// Create ON CONFLICT DO UPDATE.
    pub fn do_update(
        target: impl IntoIterator<Item = impl Into<String>>,
        set: Vec<(String, ConflictValue)>,
    ) -> Self {
        Self {
            target: target.into_iter().map(Into::into).collect(),
            action: ConflictAction::DoUpdate(set),
            filter: None,
        }
    }

    pub fn filter(mut self, condition: Expr) -> Self {
        self.filter = Some(condition);
        self
    }

    fn on_conflict_tokens(&self, dialect: Dialect) -> TokenStream {
        let mut ts = TokenStream::new();

        ts.push(Token::On).space().push(Token::Conflict).space();
        if !self.target.is_empty() {
            emit_column_list(&mut ts, &self.target);
            ts.space();
        }
        ts.push(Token::Do).space();

        match &self.action {
            ConflictAction::DoNothing => {
                ts.push(Token::Nothing);
            }
            ConflictAction::DoUpdate(set) => {
                ts.push(Token::Update).space().push(Token::Set).space();
                ts.comma_separated(set, |ts, (column, value)| {
                    ts.ident(column.as_str()).space().push(Token::Eq).space();
                    match value {
                        ConflictValue::Excluded(source) => {
                            ts.push(Token::Raw("excluded".into()))
                                .push(Token::Dot)
                                .ident(source.as_str());
                        }
                        ConflictValue::Value(expr) => {
                            ts.append(&expr.to_tokens_for_dialect(dialect));
                        }
                    }
                });
                if let Some(filter) = &self.filter {
                    ts.space()
                        .push(Token::Where)
                        .space()
                        .append(&filter.to_tokens_for_dialect(dialect));
                }
            }
        }

        ts
    }
}

// ============================================================================
// UPDATE
// ============================================================================

/// UPDATE statement.
#[derive(Debug, Clone)]
#[must_use = "DML statements have no effect until converted to SQL with to_sql()"]
pub struct Update {
    pub table: TableRef,
    pub set: Vec<(String, Expr)>,
    pub filter: Option<Expr>,
    pub returning: Vec<String>,
}

impl Update {
    /// Create a new UPDATE statement.
    pub fn table(table: impl Into<String>) -> Self {
        Self {
            table: TableRef::new(&table.into()),
            set: Vec::new(),
            filter: None,
            returning: Vec::new(),
        }
    }

    pub fn schema(mut self, schema: Option<&str>) -> Self {
        self.table = self.table.with_schema(schema);
        self
    }

    /// Add a SET clause.
    pub fn set(mut self, column: impl Into<String>, value: impl Into<Expr>) -> Self {
        self.set.push((column.into(), value.into()));
        self
    }

    /// Add WHERE condition (ANDed with existing conditions).
    pub fn filter(mut self, expr: Expr) -> Self {
        self.filter = Some(match self.filter {
            Some(existing) => existing.and(expr),
            None => expr,
        });
        self
    }

    pub fn returning(mut self, cols: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.returning = cols.into_iter().map(|c| c.into()).collect();
        self
    }

    pub fn to_sql(&self, dialect: Dialect) -> String {
        self.to_tokens(dialect).serialize(dialect)
    }

    pub fn to_tokens(&self, dialect: Dialect) -> TokenStream {
        let mut ts = TokenStream::new();

        ts.push(Token::Update)
            .space()
            .append(&self.table.name_tokens(dialect))
            .space()
            .push(Token::Set)
            .space();
        ts.comma_separated(&self.set, |ts, (column, value)| {
            ts.ident(column.as_str())
                .space()
                .push(Token::Eq)
                .space()
                .append(&value.to_tokens_for_dialect(dialect));
        });

        if !self.returning.is_empty() && dialect.uses_output_clause() {
            emit_output(&mut ts, Token::Inserted, &self.returning);
        }

        if let Some(filter) = &self.filter {
            ts.space()
                .push(Token::Where)
                .space()
                .append(&filter.to_tokens_for_dialect(dialect));
        }

        if !self.returning.is_empty() && dialect.supports_returning() && !dialect.uses_output_clause()
        {
            emit_returning(&mut ts, &self.returning);
        }

        ts
    }
}

// ============================================================================
// DELETE
// ============================================================================

/// DELETE statement.
#[derive(Debug, Clone)]
#[must_use = "DML statements have no effect until converted to SQL with to_sql()"]
pub struct Delete {
    pub table: TableRef,
    pub filter: Option<Expr>,
    pub returning: Vec<String>,
}

impl Delete {
    /// Create a new DELETE statement.
    pub fn from(table: impl Into<String>) -> Self {
        Self {
            table: TableRef::new(&table.into()),
            filter: None,
            returning: Vec::new(),
        }
    }

    pub fn schema(mut self, schema: Option<&str>) -> Self {
        self.table = self.table.with_schema(schema);
        self
    }

    /// Add WHERE condition (ANDed with existing conditions).
    pub fn filter(mut self, expr: Expr) -> Self {
        self.filter = Some(match self.filter {
            Some(existing) => existing.and(expr),
            None => expr,
        });
        self
    }

    pub fn returning(mut self, cols: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.returning = cols.into_iter().map(|c| c.into()).collect();
        self
    }

    pub fn to_sql(&self, dialect: Dialect) -> String {
        self.to_tokens(dialect).serialize(dialect)
    }

    pub fn to_tokens(&self, dialect: Dialect) -> TokenStream {
        let mut ts = TokenStream::new();

        ts.push(Token::Delete)
            .space()
            .push(Token::From)
            .space()
            .append(&self.table.name_tokens(dialect));

        if !self.returning.is_empty() && dialect.uses_output_clause() {
            emit_output(&mut ts, Token::Deleted, &self.returning);
        }

        if let Some(filter) = &self.filter {
            ts.space()
                .push(Token::Where)
                .space()
                .append(&filter.to_tokens_for_dialect(dialect));
        }

        if !self.returning.is_empty() && dialect.supports_returning() && !dialect.uses_output_clause()
        {
            emit_returning(&mut ts, &self.returning);
        }

        ts
    }
}

// ============================================================================
// TRUNCATE
// ============================================================================

/// TRUNCATE statement.
#[derive(Debug, Clone)]
#[must_use = "DML statements have no effect until converted to SQL with to_sql()"]
pub struct Truncate {
    pub table: TableRef,
}

impl Truncate {
    pub fn table(table: impl Into<String>) -> Self {
        Self {
            table: TableRef::new(&table.into()),
        }
    }

    pub fn schema(mut self, schema: Option<&str>) -> Self {
        self.table = self.table.with_schema(schema);
        self
    }

    pub fn to_tokens(&self, dialect: Dialect) -> TokenStream {
        dialect.emit_truncate(&self.table.name_tokens(dialect))
    }

    pub fn to_sql(&self, dialect: Dialect) -> String {
        self.to_tokens(dialect).serialize(dialect)
    }
}

// ============================================================================
// Tests
// ============================================================================
