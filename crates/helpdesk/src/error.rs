use domain::DomainError;
use persistence::PersistenceError;
use thiserror::Error;

use crate::config::ConfigError;

/// Errors that stop the runner.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database connection error: {0}")]
    Connection(#[from] sqlx::Error),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error(transparent)]
    Domain(#[from] DomainError),
}
