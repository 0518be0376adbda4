//! T-SQL (SQL Server / Azure SQL) dialect.
//!
//! T-SQL has significant differences from ANSI:
//! - Square bracket identifier quoting (`[name]`)
//! - `@p1` style parameters
//! - OFFSET FETCH for pagination (requires ORDER BY), TOP for a bare limit
//! - N'...' prefix for Unicode strings
//! - OUTPUT instead of RETURNING
//! - MERGE for upserts
//! - Table hints (`WITH (UPDLOCK)`) instead of FOR UPDATE
//! - SET IDENTITY_INSERT around explicit identity values

use super::helpers;
use super::{PlaceholderStyle, SqlDialect, UpsertStyle};
use crate::sql::query::LockClause;
use crate::sql::token::{Token, TokenStream};

/// T-SQL (SQL Server) dialect.
#[derive(Debug, Clone, Copy)]
pub struct TSql;

impl TSql {
    fn identity_insert(table: &TokenStream, on: bool) -> TokenStream {
        let mut ts = TokenStream::new();
        ts.push(Token::Set)
            .space()
            .push(Token::Raw("IDENTITY_INSERT".into()))
            .space()
            .append(table)
            .space()
            .push(Token::Raw(if on { "ON" } else { "OFF" }.into()))
            .push(Token::Semicolon);
        ts
    }
}

impl SqlDialect for TSql {
    fn name(&self) -> &'static str {
        "tsql"
    }

    fn quote_identifier(&self, ident: &str) -> String {
        helpers::quote_bracket(ident)
    }

    fn quote_string(&self, s: &str) -> String {
        // N prefix only when the literal needs it
        if !s.is_ascii() {
            helpers::quote_string_unicode(s)
        } else {
            helpers::quote_string_single(s)
        }
    }

    fn format_bool(&self, b: bool) -> &'static str {
        helpers::format_bool_numeric(b)
    }

    fn placeholder_style(&self) -> PlaceholderStyle {
        PlaceholderStyle::AtP
    }

    fn emit_limit_offset(&self, limit: Option<u64>, offset: Option<u64>) -> TokenStream {
        helpers::emit_limit_offset_tsql(limit, offset)
    }

    fn requires_order_by_for_offset(&self) -> bool {
        true
    }

    fn uses_top_for_limit(&self) -> bool {
        true
    }

    fn supports_nulls_ordering(&self) -> bool {
        // T-SQL 2022+ supports NULLS FIRST/LAST, but older versions don't
        false
    }

    fn supports_returning(&self) -> bool {
        true
    }

    fn uses_output_clause(&self) -> bool {
        true
    }

    fn upsert_style(&self) -> UpsertStyle {
        UpsertStyle::Merge
    }

    fn wrap_identity_insert(&self, table: &TokenStream, statement: TokenStream) -> TokenStream {
        let mut ts = Self::identity_insert(table, true);
        ts.space().append(&statement);
        if statement.last() != Some(&Token::Semicolon) {
            ts.push(Token::Semicolon);
        }
        ts.space().append(&Self::identity_insert(table, false));
        ts
    }

    fn emit_lock_clause(&self, _lock: &LockClause) -> TokenStream {
        TokenStream::new()
    }

    fn lock_table_hint(&self, lock: &LockClause) -> Option<TokenStream> {
        Some(helpers::emit_table_hint_tsql(lock))
    }
}
