//! Amazon Redshift dialect.
//!
//! Redshift speaks the PostgreSQL wire protocol but lacks most of its
//! write-side extensions:
//! - No ON CONFLICT / MERGE-based upsert here
//! - No RETURNING
//! - No row-level locks (serializable isolation only)

use super::helpers;
use super::{PlaceholderStyle, RegexSyntax, SqlDialect, UpsertStyle};

/// Amazon Redshift dialect.
#[derive(Debug, Clone, Copy)]
pub struct Redshift;

impl SqlDialect for Redshift {
    fn name(&self) -> &'static str {
        "redshift"
    }

    fn quote_identifier(&self, ident: &str) -> String {
        helpers::quote_double(ident)
    }

    fn format_bool(&self, b: bool) -> &'static str {
        helpers::format_bool_literal(b)
    }

    fn placeholder_style(&self) -> PlaceholderStyle {
        PlaceholderStyle::Dollar
    }

    fn supports_ilike(&self) -> bool {
        true
    }

    fn regex_syntax(&self) -> Option<RegexSyntax> {
        Some(RegexSyntax::Operator("~"))
    }

    fn upsert_style(&self) -> UpsertStyle {
        UpsertStyle::None
    }

    fn supports_row_locking(&self) -> bool {
        false
    }
}
