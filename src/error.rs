use thiserror::Error;

use crate::models::EntityType;

/// Failures on the local mutation path. Any of these means the mutation
/// was rejected as a whole: nothing reached the store or the queue.
#[derive(Error, Debug)]
pub enum JournalError {
    #[error("Invalid {entity_type} data: {message}")]
    Validation {
        entity_type: EntityType,
        message: String,
    },

    #[error("Referenced {entity_type} {id} does not exist")]
    Reference { entity_type: EntityType, id: String },

    #[error("{entity_type} {id} not found")]
    NotFound { entity_type: EntityType, id: String },

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Lock poisoned: {0}")]
    Lock(String),
}

impl JournalError {
    pub fn validation(entity_type: EntityType, message: impl Into<String>) -> Self {
        JournalError::Validation {
            entity_type,
            message: message.into(),
        }
    }

    /// Rejected before any durable write (as opposed to a failed write)
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            JournalError::Validation { .. }
                | JournalError::Reference { .. }
                | JournalError::NotFound { .. }
        )
    }
}

impl<T> From<std::sync::PoisonError<T>> for JournalError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        JournalError::Lock(err.to_string())
    }
}

pub type JournalResult<T> = Result<T, JournalError>;
