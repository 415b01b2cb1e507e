use common::EntityId;
use domain::{DomainError, EventId, ValidationErrors};
use thiserror::Error;

/// Errors that can occur in repositories and units of work.
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// A required input was missing or empty. Raised before any store I/O.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A paging parameter was below 1.
    #[error("{parameter} must be at least 1, got {value}")]
    OutOfRange { parameter: &'static str, value: u32 },

    /// The operation requires a row that does not exist.
    #[error("{entity_type} not found: {id}")]
    NotFound {
        entity_type: &'static str,
        id: EntityId,
    },

    /// The entity's invariants do not hold.
    #[error("Validation failed: {0}")]
    ValidationFailed(ValidationErrors),

    /// A domain rule other than validation rejected the operation.
    #[error(transparent)]
    Domain(DomainError),

    /// Staged changes could not be persisted. The transaction was rolled back.
    #[error("Transaction failed and was rolled back: {0}")]
    TransactionFailure(#[source] Box<PersistenceError>),

    /// Events could not be delivered. The committed data stands.
    #[error("Event dispatch failed after commit: {0}")]
    DispatchFailure(#[from] DispatchError),

    /// A staged write collided with the current state of the store.
    #[error("Write conflict: {0}")]
    Conflict(String),

    /// The caller cancelled before the data was committed.
    #[error("Operation cancelled before commit")]
    Cancelled,

    /// The unit of work has no repository for the requested entity type.
    #[error("No repository registered for {0}")]
    UnregisteredRepository(&'static str),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A row or payload could not be (de)serialized.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl PersistenceError {
    /// Returns true for failures that were rolled back before anything became durable.
    pub fn is_rolled_back(&self) -> bool {
        matches!(
            self,
            PersistenceError::TransactionFailure(_) | PersistenceError::Cancelled
        )
    }
}

impl From<DomainError> for PersistenceError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::Validation(errors) => PersistenceError::ValidationFailed(errors),
            DomainError::Serialization(e) => PersistenceError::Serialization(e),
            other => PersistenceError::Domain(other),
        }
    }
}

/// Errors reported by a domain event dispatcher.
#[derive(Debug, Clone, Error)]
pub enum DispatchError {
    /// A handler rejected an event.
    #[error("Handler {handler} failed on {event_type} ({event_id}): {message}")]
    HandlerFailed {
        handler: String,
        event_type: String,
        event_id: EventId,
        message: String,
    },

    /// The delivery channel could not be reached.
    #[error("Event transport unavailable: {0}")]
    Unavailable(String),
}

/// Result type for persistence operations.
pub type Result<T> = std::result::Result<T, PersistenceError>;
