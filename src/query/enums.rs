//! Query builder enums and compiler options.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::sql::query::{LockStrength, LockWait};
use crate::sql::Dialect;

/// Statement kind a builder produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryKind {
    Select,
    Count,
    Insert,
    Update,
    Delete,
    Truncate,
}

impl QueryKind {
    pub fn as_str(self) -> &'static str {
        match self {
            QueryKind::Select => "select",
            QueryKind::Count => "count",
            QueryKind::Insert => "insert",
            QueryKind::Update => "update",
            QueryKind::Delete => "delete",
            QueryKind::Truncate => "truncate",
        }
    }

    /// Whether column references carry table aliases.
    pub fn is_read(self) -> bool {
        matches!(self, QueryKind::Select | QueryKind::Count)
    }
}

/// How a join is rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum JoinKind {
    #[default]
    Left,
    Inner,
    /// Join of a many-to-many pivot table only.
    Pivot,
    /// Left join rendered inside its parent's parentheses.
    NestedLeft,
    /// Inner join rendered inside its parent's parentheses.
    NestedInner,
}

impl JoinKind {
    /// Whether the join is rendered within another join's group.
    pub fn is_nested(self) -> bool {
        matches!(self, JoinKind::NestedLeft | JoinKind::NestedInner)
    }
}

/// Internal builder switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum QueryFlag {
    /// Wrap limit/offset in a primary-key subquery.
    Paginate,
    /// Never paginate, even with to-many joins.
    DisablePaginate,
    /// Update through `pk IN (subquery)` because the criteria needs joins.
    UpdateSubQuery,
    /// Delete through `pk IN (subquery)` because the criteria needs joins.
    DeleteSubQuery,
    /// Join every inverse one-to-one relation of the root.
    AutoJoinOneToOneOwner,
    /// Keep inner joins under left joins flat.
    DisableNestedInnerJoin,
}

/// Row locking strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LockMode {
    #[default]
    None,
    /// Version check; adds no SQL to the query.
    Optimistic,
    PessimisticRead,
    PessimisticWrite,
    /// Write lock skipping locked rows.
    PessimisticPartialWrite,
    /// Write lock failing on locked rows.
    PessimisticWriteOrFail,
    /// Read lock skipping locked rows.
    PessimisticPartialRead,
    /// Read lock failing on locked rows.
    PessimisticReadOrFail,
}

impl LockMode {
    pub fn is_pessimistic(self) -> bool {
        self.clause().is_some()
    }

    /// Lock strength and wait policy for pessimistic modes.
    pub fn clause(self) -> Option<(LockStrength, LockWait)> {
        match self {
            LockMode::None | LockMode::Optimistic => None,
            LockMode::PessimisticRead => Some((LockStrength::Share, LockWait::Wait)),
            LockMode::PessimisticWrite => Some((LockStrength::Update, LockWait::Wait)),
            LockMode::PessimisticPartialWrite => Some((LockStrength::Update, LockWait::SkipLocked)),
            LockMode::PessimisticWriteOrFail => Some((LockStrength::Update, LockWait::NoWait)),
            LockMode::PessimisticPartialRead => Some((LockStrength::Share, LockWait::SkipLocked)),
            LockMode::PessimisticReadOrFail => Some((LockStrength::Share, LockWait::NoWait)),
        }
    }
}

/// What an upsert writes when the conflict target matches.
#[derive(Debug, Clone, PartialEq)]
pub enum MergeData {
    /// Every inserted column except the conflict target.
    All,
    /// These properties, taking the proposed insert values.
    Fields(Vec<String>),
    /// Explicit property values.
    Values(Map<String, Value>),
}

/// Where populate conditions apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PopulateWhere {
    /// Joined relations are loaded unfiltered.
    #[default]
    All,
    /// Filters on joined aliases move into the join conditions.
    Infer,
}

/// Populate-where setting for a single builder.
#[derive(Debug, Clone, PartialEq)]
pub enum PopulateFilter {
    Policy(PopulateWhere),
    /// Explicit criteria compiled into join conditions.
    Criteria(Value),
}

impl From<PopulateWhere> for PopulateFilter {
    fn from(policy: PopulateWhere) -> Self {
        PopulateFilter::Policy(policy)
    }
}

impl From<Value> for PopulateFilter {
    fn from(criteria: Value) -> Self {
        PopulateFilter::Criteria(criteria)
    }
}

/// Options shared by every builder, loaded from the `[compiler]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerOptions {
    pub dialect: Dialect,
    pub populate_where: PopulateWhere,
    /// Join inverse one-to-one relations of the root by default.
    pub auto_join_one_to_one_owner: bool,
    /// Wrap limit/offset in a subquery when to-many joins are present.
    pub paginate: bool,
}

impl Default for CompilerOptions {
    fn default() -> Self {
        Self {
            dialect: Dialect::default(),
            populate_where: PopulateWhere::All,
            auto_join_one_to_one_owner: false,
            paginate: true,
        }
    }
}

impl CompilerOptions {
    pub fn for_dialect(dialect: Dialect) -> Self {
        Self {
            dialect,
            ..Default::default()
        }
    }
}
