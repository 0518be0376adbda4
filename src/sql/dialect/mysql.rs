//! MySQL dialect.
//!
//! MySQL differences from ANSI:
//! - Backtick identifier quoting (`` `name` ``)
//! - Boolean is TINYINT(1), returns 1/0
//! - `INSERT IGNORE` / `ON DUPLICATE KEY UPDATE` for upserts
//! - No RETURNING clause (use LAST_INSERT_ID())
//! - No NULLS FIRST/LAST
//! - An UPDATE/DELETE cannot select from its own table in a subquery
//!   unless that subquery is materialized as a derived table

use super::helpers;
use super::{RegexSyntax, SqlDialect, UpsertStyle};
use crate::sql::query::{LockClause, LockStrength, LockWait};
use crate::sql::token::{Token, TokenStream};

/// MySQL dialect.
#[derive(Debug, Clone, Copy)]
pub struct MySql;

impl SqlDialect for MySql {
    fn name(&self) -> &'static str {
        "mysql"
    }

    fn quote_identifier(&self, ident: &str) -> String {
        helpers::quote_backtick(ident)
    }

    fn format_bool(&self, b: bool) -> &'static str {
        helpers::format_bool_numeric(b)
    }

    fn supports_nulls_ordering(&self) -> bool {
        false
    }

    fn regex_syntax(&self) -> Option<RegexSyntax> {
        Some(RegexSyntax::Operator("REGEXP"))
    }

    fn upsert_style(&self) -> UpsertStyle {
        UpsertStyle::OnDuplicateKey
    }

    fn requires_derived_table_for_self_subquery(&self) -> bool {
        true
    }

    fn emit_lock_clause(&self, lock: &LockClause) -> TokenStream {
        // The classic shared-lock spelling; FOR SHARE is only needed for its modifiers
        if lock.strength == LockStrength::Share
            && lock.wait == LockWait::Wait
            && lock.tables.is_empty()
        {
            let mut ts = TokenStream::new();
            ts.push(Token::Raw("LOCK IN SHARE MODE".into()));
            return ts;
        }
        helpers::emit_lock_clause_standard(lock)
    }
}
