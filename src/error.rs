use thiserror::Error;

/// Errors returned by the closure-table APIs.
#[derive(Debug, Error)]
pub enum ClosureTableError {
    #[error("closure-table supports PostgreSQL and SQLite connections only")]
    UnsupportedBackend,

    /// The node does not exist or is hidden by a soft delete.
    #[error("node {0} not found")]
    NotFound(i32),

    #[error("node {descendant} is not a descendant of {ancestor}")]
    PathNotFound { ancestor: i32, descendant: i32 },

    #[error("moving node {node} under {parent} would create a cycle")]
    Cycle { node: i32, parent: i32 },

    #[error("position {position} under {parent:?} is already taken")]
    Conflict { parent: Option<i32>, position: i32 },

    /// Storage failure. The transaction has been rolled back; callers
    /// must re-check state before retrying.
    #[error("database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("payload error: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("closure-table invariant violation: {0}")]
    Invariant(String),
}

impl ClosureTableError {
    pub fn invariant(detail: impl Into<String>) -> Self {
        Self::Invariant(detail.into())
    }
}

pub type Result<T, E = ClosureTableError> = std::result::Result<T, E>;
