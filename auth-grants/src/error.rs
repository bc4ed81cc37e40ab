use crate::models::Grant;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GrantError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A live grant already covers the requested triple.
    #[error("Duplicate grant: {conflicting}")]
    DuplicateGrant { conflicting: Box<Grant> },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Storage error: {0}")]
    StorageError(String),

    /// The store aborted a transaction that raced with another writer.
    /// Re-running it from the start is safe.
    #[error("Transaction conflict: {0}")]
    SerializationConflict(String),

    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

impl GrantError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    /// The grant that blocked a create, if this is a duplicate conflict.
    pub fn conflicting_grant(&self) -> Option<&Grant> {
        match self {
            Self::DuplicateGrant { conflicting } => Some(conflicting),
            _ => None,
        }
    }

    /// True for failures that came from the store rather than from the caller.
    pub fn is_store_failure(&self) -> bool {
        matches!(
            self,
            Self::Database(_)
                | Self::StorageError(_)
                | Self::SerializationConflict(_)
                | Self::Timeout(_)
        )
    }

    pub fn is_serialization_conflict(&self) -> bool {
        matches!(self, Self::SerializationConflict(_))
    }
}

pub type Result<T> = std::result::Result<T, GrantError>;
