//! Error types for twofingers.

use serde_json::Value;
use thiserror::Error;

/// Errors raised while building or running fixture queries.
#[derive(Debug, Error)]
pub enum DbError {
    /// Could not reach the database.
    #[error("Connection error: {0}")]
    Connection(String),

    /// The database rejected the statement.
    #[error("Error in SQL query: {message}\n{sql}")]
    Query { sql: String, message: String },

    /// A fetch that needs a row found none.
    #[error("No results from database for query:\n{sql}")]
    EmptyResult { sql: String },

    /// `meta(name)` was called for an entity the config does not define.
    #[error("Unknown meta entity: '{0}'")]
    UnknownMeta(String),
}

impl DbError {
    /// Create a query error carrying the failing statement.
    pub fn query(sql: impl Into<String>, message: impl ToString) -> Self {
        Self::Query {
            sql: sql.into(),
            message: message.to_string(),
        }
    }

    /// The SQL text attached to this error, if any.
    pub fn sql(&self) -> Option<&str> {
        match self {
            Self::Query { sql, .. } | Self::EmptyResult { sql } => Some(sql),
            _ => None,
        }
    }
}

/// Failures reported by the assertion engine.
///
/// The first two variants are authoring mistakes in the test itself;
/// the last two are the real "response does not match" signal.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AssertError {
    #[error("Expected must be an object or array, got {kind}")]
    InvalidExpectedShape { kind: &'static str },

    #[error("Wrong actual ({kind}) at '{path}'. Must be an object or array")]
    InvalidActualShape { path: String, kind: &'static str },

    #[error("No such property/key '{key}' in actual response (at '{path}')")]
    MissingField { path: String, key: String },

    #[error("Invalid {path}: expected {expected}, got {actual}")]
    ValueMismatch {
        path: String,
        key: String,
        expected: Value,
        actual: Value,
    },
}

impl AssertError {
    /// Dotted path of the offending field (empty for the root).
    pub fn path(&self) -> &str {
        match self {
            Self::InvalidExpectedShape { .. } => "",
            Self::InvalidActualShape { path, .. }
            | Self::MissingField { path, .. }
            | Self::ValueMismatch { path, .. } => path,
        }
    }

    /// Key of the offending field, when the failure is tied to one.
    pub fn key(&self) -> Option<&str> {
        match self {
            Self::MissingField { key, .. } | Self::ValueMismatch { key, .. } => Some(key),
            _ => None,
        }
    }
}

/// Errors while loading or reading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Config file not found (looked in: {0})")]
    NotFound(String),

    #[error("Parameter not found: {0}")]
    MissingKey(String),
}

/// Result type alias for database operations.
pub type DbResult<T> = Result<T, DbError>;

/// Result type alias for assertions.
pub type AssertResult = Result<(), AssertError>;

/// Result type alias for configuration access.
pub type ConfigResult<T> = Result<T, ConfigError>;
