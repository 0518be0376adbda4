//! Shared helper functions for SQL dialect implementations.
//!
//! This module provides reusable building blocks that dialects can compose
//! to implement the `SqlDialect` trait with minimal duplication.

use serde_json::Value;

use super::super::query::{LockClause, LockStrength, LockWait};
use super::super::token::{Token, TokenStream};

// =============================================================================
// Identifier Quoting
// =============================================================================

/// Quote identifier with double quotes (ANSI style).
/// Used by: Postgres, DuckDB, Snowflake, Redshift
pub fn quote_double(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Quote identifier with backticks.
/// Used by: MySQL
pub fn quote_backtick(ident: &str) -> String {
    format!("`{}`", ident.replace('`', "``"))
}

/// Quote identifier with square brackets.
/// Used by: T-SQL (SQL Server, Azure Synapse)
pub fn quote_bracket(ident: &str) -> String {
    format!("[{}]", ident.replace(']', "]]"))
}

// =============================================================================
// String Quoting
// =============================================================================

/// Quote string with single quotes (standard SQL).
pub fn quote_string_single(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

/// Quote string with N prefix for Unicode (T-SQL).
pub fn quote_string_unicode(s: &str) -> String {
    format!("N'{}'", s.replace('\'', "''"))
}

// =============================================================================
// Boolean Formatting
// =============================================================================

/// Format boolean as literal true/false.
/// Used by: Postgres, DuckDB, Snowflake, Redshift
pub fn format_bool_literal(b: bool) -> &'static str {
    if b {
        "true"
    } else {
        "false"
    }
}

/// Format boolean as numeric 1/0.
/// Used by: T-SQL, MySQL
pub fn format_bool_numeric(b: bool) -> &'static str {
    if b {
        "1"
    } else {
        "0"
    }
}

// =============================================================================
// Pagination
// =============================================================================

fn param_u64(n: u64) -> Token {
    Token::Param(Value::from(n))
}

/// Emit LIMIT ... OFFSET ... (standard SQL).
/// Used by: Postgres, DuckDB, MySQL, Snowflake, Redshift
pub fn emit_limit_offset_standard(limit: Option<u64>, offset: Option<u64>) -> TokenStream {
    let mut ts = TokenStream::new();

    if let Some(lim) = limit {
        ts.push(Token::Limit).space().push(param_u64(lim));
    }

    if let Some(off) = offset {
        if limit.is_some() {
            ts.space();
        }
        ts.push(Token::Offset).space().push(param_u64(off));
    }

    ts
}

/// Emit OFFSET ... ROWS FETCH NEXT ... ROWS ONLY (T-SQL style).
/// Note: Requires ORDER BY clause in T-SQL
pub fn emit_limit_offset_tsql(limit: Option<u64>, offset: Option<u64>) -> TokenStream {
    let mut ts = TokenStream::new();

    let off = offset.unwrap_or(0);
    ts.push(Token::Offset)
        .space()
        .push(param_u64(off))
        .space()
        .push(Token::Rows);

    if let Some(lim) = limit {
        ts.space()
            .push(Token::Fetch)
            .space()
            .push(Token::Next)
            .space()
            .push(param_u64(lim))
            .space()
            .push(Token::Rows)
            .space()
            .push(Token::Only);
    }

    ts
}

// =============================================================================
// Row Locking
// =============================================================================

/// Emit `FOR UPDATE|SHARE [OF a, b] [NOWAIT|SKIP LOCKED]`.
/// Used by: Postgres, MySQL (write locks)
pub fn emit_lock_clause_standard(lock: &LockClause) -> TokenStream {
    let mut ts = TokenStream::new();
    ts.push(Token::For).space();
    match lock.strength {
        LockStrength::Update => ts.push(Token::Update),
        LockStrength::Share => ts.push(Token::Share),
    };

    if !lock.tables.is_empty() {
        ts.space().push(Token::Of).space();
        ts.comma_separated(&lock.tables, |ts, table| {
            ts.ident(table.as_str());
        });
    }

    match lock.wait {
        LockWait::Wait => {}
        LockWait::NoWait => {
            ts.space().push(Token::NoWait);
        }
        LockWait::SkipLocked => {
            ts.space().push(Token::SkipLocked);
        }
    }

    ts
}

/// Emit a T-SQL table hint: `WITH (UPDLOCK)`, `WITH (HOLDLOCK, NOWAIT)`, ...
pub fn emit_table_hint_tsql(lock: &LockClause) -> TokenStream {
    let mut hints = vec![match lock.strength {
        LockStrength::Update => "UPDLOCK",
        LockStrength::Share => "HOLDLOCK",
    }];
    match lock.wait {
        LockWait::Wait => {}
        LockWait::NoWait => hints.push("NOWAIT"),
        LockWait::SkipLocked => hints.push("READPAST"),
    }

    let mut ts = TokenStream::new();
    ts.push(Token::Raw("WITH".into()))
        .space()
        .lparen()
        .push(Token::Raw(hints.join(", ")))
        .rparen();
    ts
}

// =============================================================================
// Truncate
// =============================================================================

/// Emit `TRUNCATE TABLE <table>`.
pub fn emit_truncate_standard(table: &TokenStream) -> TokenStream {
    let mut ts = TokenStream::new();
    ts.push(Token::Truncate)
        .space()
        .push(Token::Table)
        .space()
        .append(table);
    ts
}
