//! DuckDB SQL dialect.
//!
//! DuckDB is PostgreSQL-compatible with extensions:
//! - ANSI identifier quoting (`"`)
//! - `?` placeholders
//! - ON CONFLICT upserts and RETURNING
//! - `regexp_matches()` instead of a regex operator
//! - No row-level locking (single-writer MVCC)

use super::helpers;
use super::{RegexSyntax, SqlDialect};

/// DuckDB SQL dialect.
#[derive(Debug, Clone, Copy)]
pub struct DuckDb;

impl SqlDialect for DuckDb {
    fn name(&self) -> &'static str {
        "duckdb"
    }

    fn quote_identifier(&self, ident: &str) -> String {
        helpers::quote_double(ident)
    }

    fn format_bool(&self, b: bool) -> &'static str {
        helpers::format_bool_literal(b)
    }

    // Uses default emit_limit_offset (LIMIT ... OFFSET ...)

    fn supports_ilike(&self) -> bool {
        true
    }

    fn regex_syntax(&self) -> Option<RegexSyntax> {
        Some(RegexSyntax::Function("regexp_matches"))
    }

    fn supports_returning(&self) -> bool {
        true
    }

    fn supports_row_locking(&self) -> bool {
        false
    }
}
