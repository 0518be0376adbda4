//! Query builder.
//!
//! A [`QueryBuilder`] accumulates one statement: the operation, criteria,
//! joins, ordering, paging, locks and upsert options. Terminal calls
//! finalize it once and assemble a [`Statement`](crate::sql::Statement).
//!
//! # Pipeline
//!
//! ```text
//! builder calls ──▶ criteria processing ──▶ finalize ──▶ assemble ──▶ SQL + params
//!                   (joins, aliases)        (populate,    (sql AST)
//!                                            wrappers)
//! ```

pub mod aliases;
mod assemble;
mod builder;
pub mod condition;
pub mod enums;
mod finalize;
pub mod joins;
mod wrapper;

pub use aliases::{Alias, AliasRegistry};
pub use builder::{Field, QueryBuilder};
pub use condition::Predicate;
pub use enums::{
    CompilerOptions, JoinKind, LockMode, MergeData, PopulateFilter, PopulateWhere, QueryFlag,
    QueryKind,
};
pub use joins::{JoinRegistry, JoinSpec};
