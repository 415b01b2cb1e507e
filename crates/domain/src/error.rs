//! Domain error types.

use thiserror::Error;

use crate::validation::ValidationErrors;

/// Errors that can occur during domain operations.
#[derive(Debug, Error)]
pub enum DomainError {
    /// An entity's invariants do not hold after a lifecycle transition.
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationErrors),

    /// The requested behavior is not allowed in the entity's current state.
    #[error("Invalid state transition: cannot {action} a {entity_type} in {current_state} state")]
    InvalidStateTransition {
        entity_type: &'static str,
        current_state: String,
        action: &'static str,
    },

    /// A domain event payload could not be serialized.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl DomainError {
    /// Returns the violated rules when this is a validation failure.
    pub fn validation_errors(&self) -> Option<&ValidationErrors> {
        match self {
            DomainError::Validation(errors) => Some(errors),
            DomainError::InvalidStateTransition { .. } | DomainError::Serialization(_) => None,
        }
    }
}
