//! Error types for kyroref.
//!
//! All errors are strongly typed using thiserror. Configuration and
//! validation failures are detected before a transition touches any state,
//! so every error leaves the caller's snapshot exactly as it was.

use thiserror::Error;

/// Errors detected while building a store from schema declarations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("Schema '{schema}' references undeclared schema '{target}' via field '{field}'")]
    UndeclaredTarget {
        schema: String,
        field: String,
        target: String,
    },

    #[error("Schema '{schema}' declares its 'id' field as a reference")]
    IdFieldReference {
        schema: String,
    },

    #[error("Invalid configuration: {message}")]
    Parse {
        message: String,
    },
}

/// Errors caused by malformed entity payloads.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("No 'id' field found in entity of schema '{schema}'")]
    MissingIdentifier {
        schema: String,
    },

    #[error("Entity of schema '{schema}' is not an object")]
    NotAnObject {
        schema: String,
    },

    #[error("Field '{field}' of schema '{schema}' holds a value that cannot be a reference")]
    InvalidReference {
        schema: String,
        field: String,
    },

    #[error("Payload nests entities deeper than {max_depth} levels at schema '{schema}'")]
    NestingTooDeep {
        schema: String,
        max_depth: usize,
    },
}

/// Top-level error type for kyroref.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Schema '{schema}' is unknown. Known schemas are [{}]", known.join(", "))]
    UnknownSchema {
        schema: String,
        known: Vec<String>,
    },

    #[error("Channel disconnected: {path}")]
    Disconnected {
        path: String,
    },

    #[error("Operation timed out after {duration_ms}ms")]
    Timeout {
        duration_ms: u64,
    },

    #[error("Internal error: {message}")]
    Internal {
        message: String,
    },
}

impl StoreError {
    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Creates an unknown-schema error listing the schemas that do exist.
    #[must_use]
    pub fn unknown_schema<'a>(schema: &str, known: impl IntoIterator<Item = &'a str>) -> Self {
        Self::UnknownSchema {
            schema: schema.to_string(),
            known: known.into_iter().map(str::to_string).collect(),
        }
    }

    /// Returns true if this is a configuration error.
    #[must_use]
    pub const fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }

    /// Returns true if this is a validation error.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Returns true if an operation named a schema that was never declared.
    #[must_use]
    pub const fn is_unknown_schema(&self) -> bool {
        matches!(self, Self::UnknownSchema { .. })
    }

    /// Returns true if this error is retryable.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        // Everything else is caller input and fails the same way again.
        matches!(self, Self::Timeout { .. })
    }
}

/// Result type alias for kyroref operations.
pub type StoreResult<T> = Result<T, StoreError>;
