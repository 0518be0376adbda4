//! SQL generation module.
//!
//! This module provides a type-safe SQL builder that generates multi-dialect SQL.
//! It includes:
//!
//! - [`query`] - SELECT query builder
//! - [`expr`] - Expression AST and builder DSL
//! - [`dml`] - Data Manipulation Language (INSERT, UPDATE, DELETE, TRUNCATE, upserts)
//! - [`statement`] - Any of the above as one renderable value
//! - [`token`] - Token types for SQL generation
//! - [`dialect`] - SQL dialect implementations

pub mod dialect;
pub mod dml;
pub mod expr;
pub mod query;
pub mod statement;
pub mod token;


// Re-export commonly used types at the sql module level
pub use dialect::{Dialect, PlaceholderStyle, SqlDialect, UpsertStyle};
pub use expr::{
    col, count, count_distinct, fragment, func, lit_int, lit_null, lower, min, param, qualified,
    raw_sql, star, table_col, table_star, tuple, BinaryOperator, Expr, ExprExt, Literal,
    UnaryOperator,
};
pub use query::{
    Join, JoinType, LimitOffset, LockClause, LockStrength, LockWait, NullsOrder, OrderByExpr,
    Query, SelectExpr, SortDir, TableRef, TableSource,
};
pub use statement::Statement;
pub use token::{Token, TokenStream};

// Re-export DML types
pub use dml::{ConflictAction, ConflictValue, Delete, Insert, OnConflict, Truncate, Update};
