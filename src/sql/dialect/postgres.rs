//! PostgreSQL dialect.
//!
//! - ANSI identifier quoting (`"`)
//! - Numbered `$n` placeholders
//! - ON CONFLICT upserts, RETURNING
//! - `~` regex operator, `&&`/`@>`/`<@` array operators
//! - FOR UPDATE / FOR SHARE with OF, NOWAIT and SKIP LOCKED

use super::helpers;
use super::{PlaceholderStyle, RegexSyntax, SqlDialect};
use crate::sql::token::{Token, TokenStream};

/// PostgreSQL dialect.
#[derive(Debug, Clone, Copy)]
pub struct Postgres;

impl SqlDialect for Postgres {
    fn name(&self) -> &'static str {
        "postgres"
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

    fn supports_array_operators(&self) -> bool {
        true
    }

    fn supports_returning(&self) -> bool {
        true
    }

    fn emit_truncate(&self, table: &TokenStream) -> TokenStream {
        let mut ts = helpers::emit_truncate_standard(table);
        ts.space()
            .push(Token::Raw("RESTART IDENTITY".into()))
            .space()
            .push(Token::Cascade);
        ts
    }
}
