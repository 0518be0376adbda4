//! SQL Dialect definitions and formatting rules.
//!
//! This module provides a trait-based abstraction for SQL dialect differences.
//! Each dialect implements `SqlDialect` to handle its specific syntax:
//!
//! - Identifier quoting: `"` (PG/DuckDB), `` ` `` (MySQL), `[]` (T-SQL)
//! - Placeholders: `?`, `$n`, `@pn`
//! - Pagination: LIMIT/OFFSET vs OFFSET FETCH vs TOP
//! - Upserts, row locks, identity inserts and TRUNCATE
//!
//! Everything outside those override points is shared rendering logic.
//!
//! # Usage
//!
//! ```ignore
//! use criteria_sql::dialect::{Dialect, SqlDialect};
//!
//! let dialect = Dialect::Postgres;
//! let quoted = dialect.quote_identifier("user");  // "user"
//! ```
//!
//! | Feature | PostgreSQL | SQL Server | MySQL | DuckDB | Snowflake | Redshift |
//! |---------|-----------|------------|-------|--------|-----------|----------|
//! | Upsert | ON CONFLICT | MERGE | ON DUPLICATE KEY | ON CONFLICT | MERGE | ❌ |
//! | Row locks | FOR UPDATE | table hints | FOR UPDATE | ❌ | ❌ | ❌ |
//! | NULLS FIRST/LAST | ✓ | ❌ | ❌ | ✓ | ✓ | ✓ |
//! | RETURNING | ✓ | OUTPUT | ❌ | ✓ | ❌ | ❌ |
//! | ILIKE | ✓ | ❌ | ❌ | ✓ | ✓ | ✓ |

mod duckdb;
pub mod helpers;
mod mysql;
mod postgres;
mod redshift;
mod snowflake;
mod tsql;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub use duckdb::DuckDb;
pub use mysql::MySql;
pub use postgres::Postgres;
pub use redshift::Redshift;
pub use snowflake::Snowflake;
pub use tsql::TSql;

use super::query::LockClause;
use super::token::TokenStream;

/// How bound parameters are written into the SQL text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaceholderStyle {
    /// `?`
    QuestionMark,
    /// `$1`, `$2`, ...
    Dollar,
    /// `@p1`, `@p2`, ...
    AtP,
}

impl PlaceholderStyle {
    /// Render the placeholder for the 1-based `position`.
    pub fn render(self, position: usize) -> String {
        match self {
            PlaceholderStyle::QuestionMark => "?".into(),
            PlaceholderStyle::Dollar => format!("${}", position),
            PlaceholderStyle::AtP => format!("@p{}", position),
        }
    }
}

/// Native upsert syntax family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertStyle {
    /// `ON CONFLICT (...) DO NOTHING | DO UPDATE SET ... [WHERE ...]`
    OnConflict,
    /// `INSERT IGNORE` / `ON DUPLICATE KEY UPDATE`
    OnDuplicateKey,
    /// `MERGE INTO ... USING (VALUES ...)`
    Merge,
    /// No upsert support.
    None,
}

/// How `$re` is expressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegexSyntax {
    /// Infix operator: `x ~ ?`, `x REGEXP ?`
    Operator(&'static str),
    /// Function call: `regexp_matches(x, ?)`
    Function(&'static str),
}

/// SQL dialect trait - defines how SQL constructs are rendered.
///
/// Implementations handle dialect-specific syntax differences.
/// The default implementations follow ANSI SQL where possible.
pub trait SqlDialect: std::fmt::Debug {
    /// Dialect name for display/logging.
    fn name(&self) -> &'static str;

    // =========================================================================
    // Identifier and Literal Quoting
    // =========================================================================

    /// Quote an identifier (table, column, alias).
    ///
    /// - PostgreSQL/DuckDB: `"identifier"`
    /// - MySQL: `` `identifier` ``
    /// - T-SQL: `[identifier]`
    fn quote_identifier(&self, ident: &str) -> String;

    /// Quote a string literal. Only used for inline display output.
    fn quote_string(&self, s: &str) -> String {
        helpers::quote_string_single(s)
    }

    /// Format a boolean literal.
    fn format_bool(&self, b: bool) -> &'static str;

    /// Placeholder style for bound parameters.
    fn placeholder_style(&self) -> PlaceholderStyle {
        PlaceholderStyle::QuestionMark
    }

    // =========================================================================
    // Pagination and Ordering
    // =========================================================================

    /// Emit LIMIT/OFFSET or equivalent pagination clause.
    ///
    /// - PostgreSQL/DuckDB/MySQL: `LIMIT n OFFSET m` (default)
    /// - T-SQL: `OFFSET m ROWS FETCH NEXT n ROWS ONLY` (override)
    fn emit_limit_offset(&self, limit: Option<u64>, offset: Option<u64>) -> TokenStream {
        helpers::emit_limit_offset_standard(limit, offset)
    }

    /// Whether this dialect requires ORDER BY for OFFSET/LIMIT.
    fn requires_order_by_for_offset(&self) -> bool {
        false
    }

    /// Whether a bare limit is written as `SELECT TOP (n)`.
    fn uses_top_for_limit(&self) -> bool {
        false
    }

    /// Whether this dialect supports NULLS FIRST/LAST in ORDER BY.
    ///
    /// When false, null ordering is emulated with a CASE term.
    fn supports_nulls_ordering(&self) -> bool {
        true
    }

    // =========================================================================
    // Operators
    // =========================================================================

    fn supports_ilike(&self) -> bool {
        false
    }

    /// Regular expression match syntax, `None` when unsupported.
    fn regex_syntax(&self) -> Option<RegexSyntax> {
        None
    }

    /// Whether `&&`, `@>` and `<@` array operators are available.
    fn supports_array_operators(&self) -> bool {
        false
    }

    // =========================================================================
    // DML
    // =========================================================================

    /// Whether this dialect supports RETURNING clause.
    fn supports_returning(&self) -> bool {
        false
    }

    /// Whether returned rows come from an OUTPUT clause (T-SQL).
    fn uses_output_clause(&self) -> bool {
        false
    }

    fn upsert_style(&self) -> UpsertStyle {
        UpsertStyle::OnConflict
    }

    /// Whether an UPDATE/DELETE subquery over its own table must be wrapped
    /// in a derived table (MySQL error 1093).
    fn requires_derived_table_for_self_subquery(&self) -> bool {
        false
    }

    /// Emit a TRUNCATE statement for an already rendered table reference.
    fn emit_truncate(&self, table: &TokenStream) -> TokenStream {
        helpers::emit_truncate_standard(table)
    }

    /// Bracket an INSERT that writes explicit identity values.
    fn wrap_identity_insert(&self, _table: &TokenStream, statement: TokenStream) -> TokenStream {
        statement
    }

    // =========================================================================
    // Row Locking
    // =========================================================================

    fn supports_row_locking(&self) -> bool {
        true
    }

    /// Lock clause appended after the query (`FOR UPDATE ...`).
    fn emit_lock_clause(&self, lock: &LockClause) -> TokenStream {
        helpers::emit_lock_clause_standard(lock)
    }

    /// Table hint rendered right after the FROM table (T-SQL).
    fn lock_table_hint(&self, _lock: &LockClause) -> Option<TokenStream> {
        None
    }
}

/// Supported SQL dialects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    #[default]
    DuckDb,
    TSql,
    MySql,
    Postgres,
    Snowflake,
    Redshift,
}

impl Dialect {
    /// Get the dialect implementation.
    pub fn dialect(&self) -> &'static dyn SqlDialect {
        match self {
            Dialect::DuckDb => &DuckDb,
            Dialect::Postgres => &Postgres,
            Dialect::TSql => &TSql,
            Dialect::MySql => &MySql,
            Dialect::Snowflake => &Snowflake,
            Dialect::Redshift => &Redshift,
        }
    }

    pub fn all() -> [Dialect; 6] {
        [
            Dialect::DuckDb,
            Dialect::Postgres,
            Dialect::MySql,
            Dialect::TSql,
            Dialect::Snowflake,
            Dialect::Redshift,
        ]
    }
}

// Implement SqlDialect for Dialect enum by delegating to concrete types
impl SqlDialect for Dialect {
    fn name(&self) -> &'static str {
        self.dialect().name()
    }

    fn quote_identifier(&self, ident: &str) -> String {
        self.dialect().quote_identifier(ident)
    }

    fn quote_string(&self, s: &str) -> String {
        self.dialect().quote_string(s)
    }

    fn format_bool(&self, b: bool) -> &'static str {
        self.dialect().format_bool(b)
    }

    fn placeholder_style(&self) -> PlaceholderStyle {
        self.dialect().placeholder_style()
    }

    fn emit_limit_offset(&self, limit: Option<u64>, offset: Option<u64>) -> TokenStream {
        self.dialect().emit_limit_offset(limit, offset)
    }

    fn requires_order_by_for_offset(&self) -> bool {
        self.dialect().requires_order_by_for_offset()
    }

    fn uses_top_for_limit(&self) -> bool {
        self.dialect().uses_top_for_limit()
    }

    fn supports_nulls_ordering(&self) -> bool {
        self.dialect().supports_nulls_ordering()
    }

    fn supports_ilike(&self) -> bool {
        self.dialect().supports_ilike()
    }

    fn regex_syntax(&self) -> Option<RegexSyntax> {
        self.dialect().regex_syntax()
    }

    fn supports_array_operators(&self) -> bool {
        self.dialect().supports_array_operators()
    }

    fn supports_returning(&self) -> bool {
        self.dialect().supports_returning()
    }

    fn uses_output_clause(&self) -> bool {
        self.dialect().uses_output_clause()
    }

    fn upsert_style(&self) -> UpsertStyle {
        self.dialect().upsert_style()
    }

    fn requires_derived_table_for_self_subquery(&self) -> bool {
        self.dialect().requires_derived_table_for_self_subquery()
    }

    fn emit_truncate(&self, table: &TokenStream) -> TokenStream {
        self.dialect().emit_truncate(table)
    }

    fn wrap_identity_insert(&self, table: &TokenStream, statement: TokenStream) -> TokenStream {
        self.dialect().wrap_identity_insert(table, statement)
    }

    fn supports_row_locking(&self) -> bool {
        self.dialect().supports_row_locking()
    }

    fn emit_lock_clause(&self, lock: &LockClause) -> TokenStream {
        self.dialect().emit_lock_clause(lock)
    }

    fn lock_table_hint(&self, lock: &LockClause) -> Option<TokenStream> {
        self.dialect().lock_table_hint(lock)
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for Dialect {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Dialect::all()
            .into_iter()
            .find(|d| d.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown dialect '{}'", s))
    }
}
