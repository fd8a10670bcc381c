//! Error types for quarry

use thiserror::Error;

/// The main error type for quarry operations
#[derive(Error, Debug)]
pub enum Error {
    /// A required top-level clause (FROM, INTO, table, SET, VALUES, WHERE) is absent
    #[error("{statement} requires {clause}")]
    MissingClause {
        statement: &'static str,
        clause: &'static str,
    },

    /// A column reference is not a well-formed identifier
    #[error("Invalid column name: '{name}'")]
    InvalidColumnName { name: String },

    /// A `column AS alias` entry has a malformed alias
    #[error("Invalid column alias: '{alias}'")]
    InvalidColumnAlias { alias: String },

    /// A WHERE/HAVING/JOIN condition violates its operator's contract
    #[error("Invalid condition: {message}")]
    InvalidCondition { message: String },

    /// A comparison operator outside the supported set
    #[error("Unsupported operator: '{operator}'")]
    InvalidOperator { operator: String },

    /// The dialect factory was given an unknown engine name
    #[error("Unsupported database type: '{name}'")]
    UnsupportedDatabaseType { name: String },

    /// A raw SQL helper was called with blank SQL
    #[error("Raw SQL for {context} must not be empty")]
    EmptyRawSql { context: &'static str },

    /// The sanitizer rejected an identifier
    #[error("Invalid identifier: '{name}'")]
    InvalidIdentifier { name: String },

    /// The target dialect cannot express an IR fragment
    #[error("{feature} is not supported by {dialect}")]
    UnsupportedFeature {
        dialect: &'static str,
        feature: String,
    },

    /// Invalid query configuration
    #[error("Invalid query: {message}")]
    InvalidQuery { message: String },

    /// Connection pool failure
    #[error("Pool error: {message}")]
    Pool { message: String },

    /// Missing or malformed pool configuration
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Timed out waiting for a pooled connection
    #[error("Timed out waiting for a database connection")]
    PoolTimeout,

    /// Database connection or execution error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Convenience Result type for quarry operations
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create a new missing clause error
    pub fn missing_clause(statement: &'static str, clause: &'static str) -> Self {
        Self::MissingClause { statement, clause }
    }

    /// Create a new invalid column name error
    pub fn invalid_column_name(name: impl Into<String>) -> Self {
        Self::InvalidColumnName { name: name.into() }
    }

    /// Create a new invalid column alias error
    pub fn invalid_column_alias(alias: impl Into<String>) -> Self {
        Self::InvalidColumnAlias {
            alias: alias.into(),
        }
    }

    /// Create a new invalid condition error
    pub fn invalid_condition(message: impl Into<String>) -> Self {
        Self::InvalidCondition {
            message: message.into(),
        }
    }

    /// Create a new invalid operator error
    pub fn invalid_operator(operator: impl Into<String>) -> Self {
        Self::InvalidOperator {
            operator: operator.into(),
        }
    }

    /// Create a new unsupported database type error
    pub fn unsupported_database(name: impl Into<String>) -> Self {
        Self::UnsupportedDatabaseType { name: name.into() }
    }

    /// Create a new invalid identifier error
    pub fn invalid_identifier(name: impl Into<String>) -> Self {
        Self::InvalidIdentifier { name: name.into() }
    }

    /// Create a new unsupported feature error
    pub fn unsupported(dialect: &'static str, feature: impl Into<String>) -> Self {
        Self::UnsupportedFeature {
            dialect,
            feature: feature.into(),
        }
    }

    /// Create a new invalid query error
    pub fn invalid_query(message: impl Into<String>) -> Self {
        Self::InvalidQuery {
            message: message.into(),
        }
    }

    /// Create a new pool error
    pub fn pool(message: impl Into<String>) -> Self {
        Self::Pool {
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// True for errors raised by validation before any SQL is rendered
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::MissingClause { .. }
                | Self::InvalidColumnName { .. }
                | Self::InvalidColumnAlias { .. }
                | Self::InvalidCondition { .. }
                | Self::InvalidOperator { .. }
                | Self::EmptyRawSql { .. }
                | Self::InvalidIdentifier { .. }
        )
    }
}
