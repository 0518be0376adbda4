//! Error types for criteria compilation.
//!
//! Every failure is raised while building or finalizing a query, before any
//! I/O happens. Each variant belongs to exactly one [`ErrorKind`].

use thiserror::Error;

/// Result type for compiler operations.
pub type QueryResult<T> = Result<T, QueryError>;

/// Broad error categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The criteria or call sequence is invalid for the entity model.
    Validation,
    /// The query references something the session or metadata does not have.
    Configuration,
    /// The statement cannot be assembled from the collected state.
    Compilation,
    /// The target dialect lacks a requested capability.
    Unsupported,
}

/// Errors raised while building or finalizing a query.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum QueryError {
    // === Validation ===
    /// Entity is not registered in the metadata.
    #[error("entity '{0}' not found")]
    UnknownEntity(String),

    /// Criteria key does not resolve to a property.
    #[error("trying to query by not existing property {entity}.{property}")]
    UnknownProperty { entity: String, property: String },

    /// Operators are not allowed inside an embeddable sub-map.
    #[error("using operators inside embeddables is not allowed, move the operator above the embedded property name ({entity}.{property})")]
    OperatorInEmbeddable { entity: String, property: String },

    /// Embeddable sub-map references a key the embeddable does not define.
    #[error("invalid query for embeddable {entity}.{property}: unknown key '{key}'")]
    InvalidEmbeddableQuery {
        entity: String,
        property: String,
        key: String,
    },

    #[error("unknown operator '{0}'")]
    UnknownOperator(String),

    /// A method was called before the one it depends on.
    #[error("`{method}()` requires `{required}()` to be called first")]
    MissingPredecessor {
        method: &'static str,
        required: &'static str,
    },

    #[error("invalid criteria: {0}")]
    InvalidCriteria(String),

    #[error("query builder is already finalized, clone it before making changes")]
    AlreadyFinalized,

    #[error("operation is already set to {current}, cannot switch to {requested}")]
    OperationAlreadySet {
        current: &'static str,
        requested: &'static str,
    },

    #[error("alias '{0}' is already in use")]
    AliasInUse(String),

    // === Configuration ===
    #[error("trying to join via unknown alias '{alias}', available aliases: {}", available.join(", "))]
    UnknownAlias {
        alias: String,
        available: Vec<String>,
    },

    #[error("property {entity}.{property} is not a relation")]
    NotARelation { entity: String, property: String },

    #[error("an open transaction is required for this lock mode")]
    TransactionRequired,

    #[error("cannot obtain optimistic lock on unversioned entity {0}")]
    NotVersioned(String),

    // === Compilation ===
    #[error("no table name for entity '{0}'")]
    MissingTable(String),

    #[error("no fields selected")]
    MissingFields,

    #[error("no data provided for {0}")]
    MissingData(&'static str),

    #[error("merge requires an explicit conflict target")]
    MissingConflictTarget,

    // === Unsupported ===
    #[error("{feature} is not supported by the {dialect} dialect")]
    Unsupported {
        dialect: &'static str,
        feature: String,
    },
}

impl QueryError {
    /// The category this error belongs to.
    pub fn kind(&self) -> ErrorKind {
        match self {
            QueryError::UnknownEntity(_)
            | QueryError::UnknownProperty { .. }
            | QueryError::OperatorInEmbeddable { .. }
            | QueryError::InvalidEmbeddableQuery { .. }
            | QueryError::UnknownOperator(_)
            | QueryError::MissingPredecessor { .. }
            | QueryError::InvalidCriteria(_)
            | QueryError::AlreadyFinalized
            | QueryError::OperationAlreadySet { .. }
            | QueryError::AliasInUse(_) => ErrorKind::Validation,

            QueryError::UnknownAlias { .. }
            | QueryError::NotARelation { .. }
            | QueryError::TransactionRequired
            | QueryError::NotVersioned(_) => ErrorKind::Configuration,

            QueryError::MissingTable(_)
            | QueryError::MissingFields
            | QueryError::MissingData(_)
            | QueryError::MissingConflictTarget => ErrorKind::Compilation,

            QueryError::Unsupported { .. } => ErrorKind::Unsupported,
        }
    }

    pub fn unknown_property(entity: impl Into<String>, property: impl Into<String>) -> Self {
        Self::UnknownProperty {
            entity: entity.into(),
            property: property.into(),
        }
    }

    pub fn unsupported(dialect: &'static str, feature: impl Into<String>) -> Self {
        Self::Unsupported {
            dialect,
            feature: feature.into(),
        }
    }

    pub fn invalid_criteria(message: impl Into<String>) -> Self {
        Self::InvalidCriteria(message.into())
    }
}
