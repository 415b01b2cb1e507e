//! Application configuration loaded from environment variables.

use thiserror::Error;

/// Which store backs the repositories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Memory,
    Postgres,
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("unknown STORE_BACKEND {0:?}, expected \"memory\" or \"postgres\"")]
    UnknownBackend(String),

    #[error("STORE_BACKEND=postgres requires DATABASE_URL")]
    MissingDatabaseUrl,
}

/// Runner configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `STORE_BACKEND`: `memory` or `postgres` (default: `memory`)
/// - `DATABASE_URL`: PostgreSQL connection string
/// - `DATABASE_MAX_CONNECTIONS`: pool size (default: `5`)
/// - `DEFAULT_PAGE_SIZE`: rows per search page (default: `10`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `LOG_FORMAT`: `pretty` or `json` (default: `pretty`)
#[derive(Debug, Clone)]
pub struct Config {
    pub store_backend: StoreBackend,
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub default_page_size: u32,
    pub log_level: String,
    pub log_format: LogFormat,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration through `lookup`, which returns the value of a variable if set.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let store_backend = match lookup("STORE_BACKEND").as_deref().map(str::trim) {
            None | Some("") => defaults.store_backend,
            Some(value) if value.eq_ignore_ascii_case("memory") => StoreBackend::Memory,
            Some(value) if value.eq_ignore_ascii_case("postgres") => StoreBackend::Postgres,
            Some(other) => return Err(ConfigError::UnknownBackend(other.to_string())),
        };
        let database_url = lookup("DATABASE_URL").filter(|url| !url.trim().is_empty());
        if store_backend == StoreBackend::Postgres && database_url.is_none() {
            return Err(ConfigError::MissingDatabaseUrl);
        }

        let log_format = match lookup("LOG_FORMAT") {
            Some(value) if value.eq_ignore_ascii_case("json") => LogFormat::Json,
            _ => LogFormat::Pretty,
        };

        Ok(Self {
            store_backend,
            database_url,
            database_max_connections: positive(lookup("DATABASE_MAX_CONNECTIONS"))
                .unwrap_or(defaults.database_max_connections),
            default_page_size: positive(lookup("DEFAULT_PAGE_SIZE"))
                .unwrap_or(defaults.default_page_size),
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
            log_format,
        })
    }
}

fn positive(value: Option<String>) -> Option<u32> {
    value
        .and_then(|v| v.trim().parse::<u32>().ok())
        .filter(|n| *n > 0)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store_backend: StoreBackend::Memory,
            database_url: None,
            database_max_connections: 5,
            default_page_size: persistence::DEFAULT_PAGE_SIZE,
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
        }
    }
}
