//! Snowflake SQL dialect.
//!
//! Snowflake features:
//! - ANSI identifier quoting (`"`)
//! - MERGE for upserts
//! - `REGEXP_LIKE()` for regex matching
//! - No row-level locks

use super::helpers;
use super::{RegexSyntax, SqlDialect, UpsertStyle};

/// Snowflake SQL dialect.
#[derive(Debug, Clone, Copy)]
pub struct Snowflake;

impl SqlDialect for Snowflake {
    fn name(&self) -> &'static str {
        "snowflake"
    }

    fn quote_identifier(&self, ident: &str) -> String {
        helpers::quote_double(ident)
    }

    fn format_bool(&self, b: bool) -> &'static str {
        helpers::format_bool_literal(b)
    }

    fn supports_ilike(&self) -> bool {
        true
    }

    fn regex_syntax(&self) -> Option<RegexSyntax> {
        Some(RegexSyntax::Function("REGEXP_LIKE"))
    }

    fn upsert_style(&self) -> UpsertStyle {
        UpsertStyle::Merge
    }

    fn supports_row_locking(&self) -> bool {
        false
    }
}
