//! # criteria-sql
//!
//! Compiles ORM-style JSON criteria against entity metadata into
//! parameterized multi-dialect SQL.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │        Entity metadata (MetadataProvider)                │
//! │   properties, relations, pivot tables, discriminators    │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [criteria]
//! ┌─────────────────────────────────────────────────────────┐
//! │   CriteriaNode tree ── process ──▶ column-keyed criteria │
//! │                                    + joins and aliases   │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [query]
//! ┌─────────────────────────────────────────────────────────┐
//! │   QueryBuilder: finalize (populate, pagination,          │
//! │   modification subqueries) and assemble                  │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [sql]
//! ┌─────────────────────────────────────────────────────────┐
//! │   Statement AST ──▶ TokenStream ──▶ SQL text + params    │
//! └─────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod connection;
pub mod criteria;
pub mod error;
pub mod metadata;
pub mod query;
pub mod sql;

/// Re-exports for convenient usage.
pub mod prelude {
    pub use crate::connection::{
        CompiledQuery, Connection, ConnectionError, ExecuteError, ExecuteMode, QueryOutcome, Row,
        TransactionContext,
    };
    pub use crate::error::{ErrorKind, QueryError, QueryResult};
    pub use crate::metadata::{
        EntityMetadata, EntityProperty, MetadataProvider, MetadataRegistry, ReferenceKind,
    };
    pub use crate::query::{
        CompilerOptions, Field, JoinKind, LockMode, MergeData, PopulateFilter, PopulateWhere,
        QueryBuilder, QueryFlag, QueryKind,
    };
    pub use crate::sql::{Dialect, PlaceholderStyle, SqlDialect, Statement};
}

pub use error::{QueryError, QueryResult};
pub use query::QueryBuilder;
pub use sql::Dialect;
